//! Batch and transaction command handlers

use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde_json::Value;
use tracing::info;

use keystash_core::{
    BatchProcessor, Config, DataStorage, Operation, TransactionProcessor, TransactionState,
};

use crate::output::Output;

/// Run the operations in a batch file
///
/// With `transaction`, any failure undoes the whole file. Either way the
/// command fails if any operation failed, after printing the per-operation
/// report.
pub async fn run(
    storage: &DataStorage<Value>,
    config: &Config,
    file: PathBuf,
    transaction: bool,
    output: &Output,
) -> Result<()> {
    let operations = read_operations(&file)?;
    if operations.is_empty() {
        output.message("No operations to run.");
        return Ok(());
    }
    info!(
        "Running {} operation(s) from {:?} (transaction: {})",
        operations.len(),
        file,
        transaction
    );

    let (result, rolled_back) = if transaction {
        let mut tx = TransactionProcessor::with_options(storage, config.batch_options());
        for operation in operations {
            match operation {
                Operation::Save { key, value } => tx.save(key, value)?,
                Operation::Delete { key } => tx.delete(key)?,
            };
        }
        let result = tx
            .commit()
            .await
            .context("Transaction failed and could not be fully rolled back")?;
        (result, tx.state() == TransactionState::RolledBack)
    } else {
        let processor = BatchProcessor::with_options(storage, config.batch_options());
        (processor.execute_batch(operations).await, false)
    };

    output.print_batch_result(&result, rolled_back);

    if !result.success {
        bail!("{} of {} operation(s) failed", result.failed(), result.operations.len());
    }
    Ok(())
}

/// Load several keys at once
pub async fn load_many(
    storage: &DataStorage<Value>,
    config: &Config,
    keys: Vec<String>,
    output: &Output,
) -> Result<()> {
    let processor = BatchProcessor::with_options(storage, config.batch_options());
    let values = processor.batch_load(keys.iter().cloned()).await;
    output.print_loaded(&keys, &values);
    Ok(())
}

/// Read a JSON array of operations from a file, or stdin for "-"
fn read_operations(path: &Path) -> Result<Vec<Operation<Value>>> {
    let content = if path == Path::new("-") {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read operations from stdin")?;
        buf
    } else {
        std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read batch file: {:?}", path))?
    };

    parse_operations(&content)
}

fn parse_operations(content: &str) -> Result<Vec<Operation<Value>>> {
    serde_json::from_str(content).context(
        "Batch file must be a JSON array of {\"op\": \"save\", \"key\": .., \"value\": ..} \
         or {\"op\": \"delete\", \"key\": ..} objects",
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use keystash_core::{BackendKind, MemoryBackend};
    use serde_json::json;
    use tempfile::TempDir;

    use crate::output::OutputFormat;

    fn memory_config() -> Config {
        Config {
            backend: BackendKind::Memory,
            ..Config::default()
        }
    }

    #[test]
    fn test_parse_operations() {
        let ops = parse_operations(
            r#"[
                {"op": "save", "key": "a", "value": {"n": 1}},
                {"op": "delete", "key": "b"}
            ]"#,
        )
        .unwrap();

        assert_eq!(ops, vec![
            Operation::save("a", json!({"n": 1})),
            Operation::delete("b"),
        ]);
    }

    #[test]
    fn test_parse_operations_rejects_unknown_op() {
        assert!(parse_operations(r#"[{"op": "rename", "key": "a"}]"#).is_err());
        assert!(parse_operations(r#"{"op": "delete", "key": "a"}"#).is_err());
    }

    #[tokio::test]
    async fn test_run_batch_file() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("ops.json");
        std::fs::write(
            &file,
            r#"[
                {"op": "save", "key": "a", "value": 1},
                {"op": "save", "key": "b", "value": 2},
                {"op": "delete", "key": "a"}
            ]"#,
        )
        .unwrap();

        let storage: DataStorage<Value> = DataStorage::new(MemoryBackend::new()).unwrap();
        run(&storage, &memory_config(), file, false, &Output::new(OutputFormat::Quiet))
            .await
            .unwrap();

        let all = storage.get_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all["b"], json!(2));
    }

    #[tokio::test]
    async fn test_failed_transaction_leaves_store_untouched() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("ops.json");
        // The null save fails validation, so the whole file is undone
        std::fs::write(
            &file,
            r#"[
                {"op": "save", "key": "a", "value": "changed"},
                {"op": "save", "key": "bad", "value": null}
            ]"#,
        )
        .unwrap();

        let storage: DataStorage<Value> =
            DataStorage::new(MemoryBackend::with_entries([("a", json!("orig"))])).unwrap();
        let err = run(&storage, &memory_config(), file, true, &Output::new(OutputFormat::Quiet))
            .await
            .unwrap_err();

        assert!(err.to_string().contains("1 of 2"));
        assert_eq!(storage.load("a").await.unwrap(), Some(json!("orig")));
        assert_eq!(storage.load("bad").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_missing_batch_file() {
        let storage: DataStorage<Value> = DataStorage::new(MemoryBackend::new()).unwrap();
        let result = run(
            &storage,
            &memory_config(),
            PathBuf::from("/nonexistent/ops.json"),
            false,
            &Output::new(OutputFormat::Quiet),
        )
        .await;
        assert!(result.is_err());
    }
}
