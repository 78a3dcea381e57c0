//! Config command handlers

use std::path::PathBuf;

use anyhow::{bail, Context, Result};

use keystash_core::Config;

use crate::output::{Output, OutputFormat};

const VALID_KEYS: &str =
    "data_dir, backend, file_name, emit_mode, max_batch_size, batch_delay_ms, log_file";

/// Show current configuration
pub fn show(config_path: Option<&PathBuf>, output: &Output) -> Result<()> {
    let config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;

    match output.format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "data_dir": config.data_dir,
                    "backend": config.backend,
                    "file_name": config.file_name,
                    "emit_mode": config.emit_mode,
                    "max_batch_size": config.max_batch_size,
                    "batch_delay_ms": config.batch_delay_ms,
                    "log_file": config.log_file
                })
            );
        }
        OutputFormat::Quiet => {
            println!("{}", config.data_file_path().display());
        }
        OutputFormat::Human => {
            let effective_path = config_path
                .cloned()
                .unwrap_or_else(Config::config_file_path);
            println!("Configuration:");
            println!("  data_dir:       {}", config.data_dir.display());
            println!("  backend:        {}", config.backend);
            println!("  file_name:      {}", config.file_name);
            println!("  emit_mode:      {}", config.emit_mode);
            println!("  max_batch_size: {}", config.max_batch_size);
            println!("  batch_delay_ms: {}", config.batch_delay_ms);
            println!(
                "  log_file:       {}",
                config
                    .log_file
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "(not set)".to_string())
            );
            println!();
            println!("Config file: {}", effective_path.display());
        }
    }

    Ok(())
}

/// Set a configuration value
pub fn set(
    key: String,
    value: String,
    config_path: Option<&PathBuf>,
    output: &Output,
) -> Result<()> {
    let mut config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;

    apply(&mut config, &key, &value)?;

    // Save to the CLI-specified path or default
    let save_path = config_path
        .cloned()
        .unwrap_or_else(Config::config_file_path);
    config
        .save_to_path(&save_path)
        .context("Failed to save configuration")?;

    output.success(&format!("Set {} = {}", key, value));

    Ok(())
}

fn apply(config: &mut Config, key: &str, value: &str) -> Result<()> {
    match key {
        "data_dir" => {
            config.data_dir = value.into();
        }
        "backend" => {
            config.backend = value.parse().map_err(anyhow::Error::msg)?;
        }
        "file_name" => {
            if value.is_empty() {
                bail!("file_name must not be empty");
            }
            config.file_name = value.to_string();
        }
        "emit_mode" => {
            config.emit_mode = value.parse().map_err(anyhow::Error::msg)?;
        }
        "max_batch_size" => {
            config.max_batch_size = value
                .parse()
                .context("Invalid value for max_batch_size. Use a positive integer.")?;
        }
        "batch_delay_ms" => {
            config.batch_delay_ms = value
                .parse()
                .context("Invalid value for batch_delay_ms. Use milliseconds.")?;
        }
        "log_file" => {
            config.log_file = if value.is_empty() || value == "none" {
                None
            } else {
                Some(value.into())
            };
        }
        _ => {
            bail!(
                "Unknown configuration key: '{}'\nValid keys: {}",
                key,
                VALID_KEYS
            );
        }
    }
    Ok(())
}
