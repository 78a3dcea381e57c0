//! Output formatting for CLI
//!
//! Provides consistent output formatting across all commands:
//! - Human-readable default output
//! - JSON output (--json flag)
//! - Quiet mode for scripting (--quiet flag)

use std::collections::{BTreeMap, HashMap};

use serde_json::Value;

use keystash_core::BatchResult;

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable output (default)
    Human,
    /// JSON output
    Json,
    /// Quiet mode - minimal output
    Quiet,
}

impl OutputFormat {
    /// Create format from CLI flags
    pub fn from_flags(json: bool, quiet: bool) -> Self {
        if quiet {
            OutputFormat::Quiet
        } else if json {
            OutputFormat::Json
        } else {
            OutputFormat::Human
        }
    }
}

/// Output helper for consistent formatting
pub struct Output {
    /// The output format
    pub format: OutputFormat,
}

impl Output {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Print one stored value
    pub fn print_value(&self, key: &str, value: Option<&Value>) {
        match self.format {
            OutputFormat::Human => match value {
                Some(value) => println!("{}", pretty(value)),
                None => println!("Key not found: {}", key),
            },
            OutputFormat::Json => {
                println!("{}", serde_json::json!({"key": key, "value": value}));
            }
            OutputFormat::Quiet => {
                if let Some(value) = value {
                    println!("{}", value);
                }
            }
        }
    }

    /// Print every entry of the store
    pub fn print_entries(&self, entries: &BTreeMap<String, Value>) {
        match self.format {
            OutputFormat::Human => {
                if entries.is_empty() {
                    println!("No keys found.");
                    return;
                }
                let width = entries.keys().map(|k| k.len()).max().unwrap_or(0).min(30);
                for (key, value) in entries {
                    println!(
                        "{:width$} | {}",
                        truncate(key, 30),
                        truncate(&value.to_string(), 60),
                        width = width
                    );
                }
                println!("\n{} key(s)", entries.len());
            }
            OutputFormat::Json => {
                println!("{}", pretty(&serde_json::json!(entries)));
            }
            OutputFormat::Quiet => {
                for key in entries.keys() {
                    println!("{}", key);
                }
            }
        }
    }

    /// Print the outcome of a batch load, in request order
    pub fn print_loaded(&self, keys: &[String], values: &HashMap<String, Option<Value>>) {
        match self.format {
            OutputFormat::Human => {
                for key in keys {
                    match values.get(key).and_then(Option::as_ref) {
                        Some(value) => println!("{} = {}", key, truncate(&value.to_string(), 60)),
                        None => println!("{} (not found)", key),
                    }
                }
            }
            OutputFormat::Json => {
                let map: BTreeMap<&String, &Option<Value>> = values.iter().collect();
                println!("{}", pretty(&serde_json::json!(map)));
            }
            OutputFormat::Quiet => {
                for key in keys {
                    if let Some(Some(value)) = values.get(key) {
                        println!("{}", value);
                    }
                }
            }
        }
    }

    /// Print a batch or transaction outcome
    pub fn print_batch_result(&self, result: &BatchResult<Value>, rolled_back: bool) {
        match self.format {
            OutputFormat::Human => {
                for entry in &result.operations {
                    let marker = if entry.success { "✓" } else { "✗" };
                    match &entry.error {
                        Some(error) => println!(
                            "{} {} {}: {}",
                            marker,
                            entry.operation.kind(),
                            entry.operation.key(),
                            error
                        ),
                        None => println!(
                            "{} {} {}",
                            marker,
                            entry.operation.kind(),
                            entry.operation.key()
                        ),
                    }
                }
                println!();
                println!(
                    "{} succeeded, {} failed",
                    result.succeeded(),
                    result.failed()
                );
                if rolled_back {
                    println!("Transaction rolled back; no changes were kept.");
                }
            }
            OutputFormat::Json => {
                let mut json = serde_json::json!(result);
                json["rolled_back"] = Value::Bool(rolled_back);
                println!("{}", pretty(&json));
            }
            OutputFormat::Quiet => {
                for error in &result.errors {
                    println!("{}", error);
                }
            }
        }
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        match self.format {
            OutputFormat::Human => println!("✓ {}", message),
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({"status": "success", "message": message})
                );
            }
            OutputFormat::Quiet => {}
        }
    }

    /// Check if we should prompt for confirmation
    pub fn should_prompt(&self) -> bool {
        self.format == OutputFormat::Human
    }

    /// Print an informational message
    pub fn message(&self, msg: &str) {
        match self.format {
            OutputFormat::Human => println!("{}", msg),
            OutputFormat::Json => {
                println!("{}", serde_json::json!({"message": msg}));
            }
            OutputFormat::Quiet => {}
        }
    }
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

/// Truncate a string to max length, adding "..." if truncated
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_flags() {
        assert_eq!(OutputFormat::from_flags(false, false), OutputFormat::Human);
        assert_eq!(OutputFormat::from_flags(true, false), OutputFormat::Json);
        assert_eq!(OutputFormat::from_flags(false, true), OutputFormat::Quiet);
        // Quiet takes precedence
        assert_eq!(OutputFormat::from_flags(true, true), OutputFormat::Quiet);
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("this is a long string", 10), "this is...");
        assert_eq!(truncate("ééééééééééé", 5), "éé...");
    }

    #[test]
    fn test_should_prompt_only_for_humans() {
        assert!(Output::new(OutputFormat::Human).should_prompt());
        assert!(!Output::new(OutputFormat::Json).should_prompt());
        assert!(!Output::new(OutputFormat::Quiet).should_prompt());
    }
}
