//! Keystash CLI
//!
//! Command-line interface for keystash - typed key-value storage with
//! batched and transactional writes.

use std::fs::File;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use keystash_core::{Config, DataStorage};

mod commands;
mod output;
mod prompt;

use output::{Output, OutputFormat};

#[derive(Parser)]
#[command(name = "keystash")]
#[command(about = "Keystash - key-value storage with batches and transactions")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to config file (overrides KEYSTASH_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Quiet mode - minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the value stored under a key
    Get {
        key: String,
    },
    /// Store a JSON value under a key
    Set {
        key: String,
        /// Value as JSON (e.g. '"text"', '42', '{"a": 1}')
        value: String,
    },
    /// Remove a key
    #[command(alias = "rm")]
    Delete {
        key: String,
    },
    /// List every key and value
    #[command(alias = "ls")]
    List,
    /// Remove every key
    Clear {
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// Run a JSON file of save/delete operations
    Batch {
        /// File holding a JSON array of operations ("-" for stdin)
        file: PathBuf,
        /// Undo every operation if any one fails
        #[arg(short, long)]
        transaction: bool,
    },
    /// Load several keys at once
    LoadMany {
        #[arg(required = true)]
        keys: Vec<String>,
    },
    /// Show backend, data location and key count
    Status,
    /// Show or set configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key (data_dir, backend, file_name, emit_mode,
        /// max_batch_size, batch_delay_ms, log_file)
        key: String,
        /// Configuration value
        value: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let output = Output::new(OutputFormat::from_flags(cli.json, cli.quiet));
    let config_path = cli.config.as_ref();

    // Config commands work even when the stored config is unusable
    if let Commands::Config { command } = &cli.command {
        return match command.clone() {
            Some(ConfigCommands::Show) | None => commands::config::show(config_path, &output),
            Some(ConfigCommands::Set { key, value }) => {
                commands::config::set(key, value, config_path, &output)
            }
        };
    }

    let config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;
    init_logging(&config, cli.verbose);

    let storage: DataStorage<Value> =
        DataStorage::open(&config).context("Failed to open storage")?;
    debug!("Using {} backend", storage.backend_name());

    match cli.command {
        Commands::Get { key } => commands::kv::get(&storage, key, &output).await,
        Commands::Set { key, value } => commands::kv::set(&storage, key, value, &output).await,
        Commands::Delete { key } => commands::kv::delete(&storage, key, &output).await,
        Commands::List => commands::kv::list(&storage, &output).await,
        Commands::Clear { yes } => commands::kv::clear(&storage, yes, &output).await,
        Commands::Batch { file, transaction } => {
            commands::batch::run(&storage, &config, file, transaction, &output).await
        }
        Commands::LoadMany { keys } => {
            commands::batch::load_many(&storage, &config, keys, &output).await
        }
        Commands::Status => commands::status::show(&storage, &config, &output).await,
        Commands::Config { .. } => unreachable!(), // Handled above
    }
}

/// Install the tracing subscriber
///
/// Level comes from `-v` or KEYSTASH_LOG. Without either, only warnings are
/// shown. Logs go to `log_file` when configured, stderr otherwise.
fn init_logging(config: &Config, verbose: u8) {
    let log_level = match verbose {
        0 => std::env::var("KEYSTASH_LOG").unwrap_or_else(|_| "warn".to_string()),
        1 => "debug".to_string(),
        _ => "trace".to_string(),
    };

    let env_filter = EnvFilter::new(format!(
        "keystash_core={},keystash_cli={}",
        log_level, log_level
    ));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false);

    // Ignore error if already initialized
    match &config.log_file {
        Some(path) => match File::create(path) {
            Ok(file) => {
                let _ = builder.with_ansi(false).with_writer(file).try_init();
            }
            Err(e) => {
                eprintln!("Warning: Could not create log file {:?}: {}", path, e);
                let _ = builder.with_writer(std::io::stderr).try_init();
            }
        },
        None => {
            let _ = builder.with_writer(std::io::stderr).try_init();
        }
    }
}
