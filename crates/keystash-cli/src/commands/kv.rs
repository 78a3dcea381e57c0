//! Single-key command handlers

use anyhow::{bail, Context, Result};
use serde_json::Value;

use keystash_core::DataStorage;

use crate::output::Output;
use crate::prompt::confirm;

/// Print the value under a key
pub async fn get(storage: &DataStorage<Value>, key: String, output: &Output) -> Result<()> {
    let value = storage
        .load(&key)
        .await
        .with_context(|| format!("Failed to load {}", key))?;

    output.print_value(&key, value.as_ref());
    Ok(())
}

/// Store a JSON value
pub async fn set(
    storage: &DataStorage<Value>,
    key: String,
    raw: String,
    output: &Output,
) -> Result<()> {
    let value = parse_value(&raw)?;
    storage
        .save(&key, &value)
        .await
        .with_context(|| format!("Failed to save {}", key))?;

    output.success(&format!("Saved {}", key));
    Ok(())
}

/// Remove a key
pub async fn delete(storage: &DataStorage<Value>, key: String, output: &Output) -> Result<()> {
    storage
        .delete(&key)
        .await
        .with_context(|| format!("Failed to delete {}", key))?;

    output.success(&format!("Deleted {}", key));
    Ok(())
}

/// List every entry
pub async fn list(storage: &DataStorage<Value>, output: &Output) -> Result<()> {
    let entries = storage.get_all().await.context("Failed to read store")?;
    output.print_entries(&entries);
    Ok(())
}

/// Remove every key, asking first in interactive mode
pub async fn clear(storage: &DataStorage<Value>, yes: bool, output: &Output) -> Result<()> {
    if !yes {
        if !output.should_prompt() {
            bail!("Refusing to clear without --yes");
        }
        if !confirm("Remove every key?")? {
            output.message("Cancelled.");
            return Ok(());
        }
    }

    storage.clear().await.context("Failed to clear store")?;
    output.success("Cleared all keys");
    Ok(())
}

/// Parse a command-line value as JSON
///
/// Input that is not valid JSON is stored as a plain string, so
/// `keystash set name alice` works without extra quoting.
pub fn parse_value(raw: &str) -> Result<Value> {
    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    if value.is_null() {
        bail!("Cannot store null; use `keystash delete` to remove a key");
    }
    Ok(value)
}
