//! Status command handler

use anyhow::{Context, Result};
use serde_json::Value;

use keystash_core::{BackendKind, Config, DataStorage};

use crate::output::{Output, OutputFormat};

/// Show backend, data location and key count
pub async fn show(storage: &DataStorage<Value>, config: &Config, output: &Output) -> Result<()> {
    let keys = storage
        .get_all()
        .await
        .context("Failed to read store")?
        .len();
    let data_file = match config.backend {
        BackendKind::File => Some(config.data_file_path()),
        BackendKind::Memory => None,
    };
    let data_size = data_file
        .as_ref()
        .and_then(|path| std::fs::metadata(path).ok())
        .map(|m| m.len());

    match output.format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "backend": storage.backend_name(),
                    "emit_mode": storage.emit_mode(),
                    "data_file": data_file,
                    "data_size": data_size,
                    "keys": keys,
                    "max_batch_size": config.max_batch_size,
                    "batch_delay_ms": config.batch_delay_ms
                })
            );
        }
        OutputFormat::Quiet => {
            println!("{}", keys);
        }
        OutputFormat::Human => {
            println!("Keystash Status");
            println!("===============");
            println!();
            println!("Backend:   {}", storage.backend_name());
            println!("Emit mode: {}", storage.emit_mode());
            if let Some(path) = &data_file {
                println!("Data file: {}", path.display());
                match data_size {
                    Some(size) => println!("Size:      {}", format_size(size)),
                    None => println!("Size:      (not created yet)"),
                }
            }
            println!("Keys:      {}", keys);
            println!();
            println!(
                "Batches of {} operation(s), {}ms apart",
                config.max_batch_size, config.batch_delay_ms
            );
        }
    }

    Ok(())
}

fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;

    if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
