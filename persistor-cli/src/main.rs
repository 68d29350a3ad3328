/*!
Persistor CLI - inspect, verify and purge persistor stores.

A store is addressed by a URI (`json:<path>`, `bin:<path>`, `aes:<path>`,
`kv:<path>`) plus the logical key the container saved it under.
*/

use clap::{Parser, Subcommand};
use persistor_core::{
    create_backend_from_config, Backend, DataEntitiesContainer, PersistError, PersistentContainer,
    StorageConfig,
};
use tabled::{Table, Tabled};
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "persistor")]
#[command(about = "CLI for persistor stores")]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Store URI, e.g. json:save.json, aes:save.aes, kv:prefs.json
    #[arg(short, long, env = "PERSISTOR_STORE")]
    store: String,

    /// Logical key of the container
    #[arg(short, long, global = true, default_value = "PersistentContainer")]
    key: String,

    /// Passphrase for encrypted stores (defaults to the key)
    #[arg(long, global = true, env = "PERSISTOR_PASSPHRASE")]
    passphrase: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the records held in the store
    Show,
    /// Decode the store and report whether it is readable
    Verify,
    /// Delete the store for the key
    Purge {
        /// Skip confirmation prompt
        #[arg(short, long)]
        force: bool,
    },
}

#[derive(Tabled)]
struct RecordInfo {
    #[tabled(rename = "Entity ID")]
    id: String,
    #[tabled(rename = "Format")]
    format: String,
    #[tabled(rename = "Size")]
    size: String,
    #[tabled(rename = "Saved")]
    saved_at: String,
}

fn main() -> Result<(), anyhow::Error> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let storage_config = create_storage_config(&cli)?;
    let backend = create_backend_from_config(storage_config)?;
    info!(store = %backend.describe(), key = %cli.key, "Opened store");

    match cli.command {
        Commands::Show => show_store(backend.as_ref(), &cli.key)?,
        Commands::Verify => verify_store(backend.as_ref(), &cli.key)?,
        Commands::Purge { force } => purge_store(backend, &cli.key, force)?,
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug"))
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn create_storage_config(cli: &Cli) -> Result<StorageConfig, anyhow::Error> {
    let mut config = StorageConfig::from_uri(&cli.store)?;
    if let Some(passphrase) = &cli.passphrase {
        config = config.with_passphrase(passphrase.clone());
    }
    config.validate()?;
    Ok(config)
}

fn load_store(backend: &dyn Backend, key: &str) -> Result<Option<DataEntitiesContainer>, anyhow::Error> {
    match backend.load(key) {
        Ok(store) => Ok(store),
        Err(PersistError::Crypto(reason)) => {
            error!("✗ Store could not be decrypted: {}", reason);
            Err(anyhow::anyhow!("Wrong key or passphrase for '{key}'"))
        }
        Err(e) => {
            error!("✗ Failed to load store: {}", e);
            Err(e.into())
        }
    }
}

fn show_store(backend: &dyn Backend, key: &str) -> Result<(), anyhow::Error> {
    let Some(store) = load_store(backend, key)? else {
        println!("No store found for key '{key}'");
        return Ok(());
    };

    println!("Store: {}", backend.describe());
    println!("  Key: {key}");
    println!("  Format Version: {}", store.format_version);
    println!("  Saved: {}", format_timestamp(store.saved_at.timestamp()));

    if store.data_entities.is_empty() {
        println!("No records found");
        return Ok(());
    }

    let saved_at = format_timestamp(store.saved_at.timestamp());
    let records: Vec<RecordInfo> = store
        .data_entities
        .iter()
        .map(|record| RecordInfo {
            id: record.entity_id.to_string(),
            format: record.payload.format().name().to_string(),
            size: format_size(record.payload.len() as u64),
            saved_at: saved_at.clone(),
        })
        .collect();

    println!("{}", Table::new(records));
    Ok(())
}

fn verify_store(backend: &dyn Backend, key: &str) -> Result<(), anyhow::Error> {
    match load_store(backend, key)? {
        Some(store) => {
            println!(
                "✓ Store is valid: {} record(s), format version {}",
                store.data_entities.len(),
                store.format_version
            );
            Ok(())
        }
        None => Err(anyhow::anyhow!("No store found for key '{key}'")),
    }
}

fn purge_store(backend: Box<dyn Backend>, key: &str, force: bool) -> Result<(), anyhow::Error> {
    if !backend.exists(key) {
        println!("No store found for key '{key}'; nothing to purge");
        return Ok(());
    }

    if !force {
        print!("Are you sure you want to purge store '{key}'? (y/N): ");
        use std::io::{self, Write};
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;

        if !input.trim().to_lowercase().starts_with('y') {
            println!("Purge cancelled");
            return Ok(());
        }
    }

    let mut container = PersistentContainer::new(key).with_backend(backend);
    container.purge()?;
    println!("✓ Store purged successfully");
    Ok(())
}

fn format_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[unit_index])
    } else {
        format!("{:.1} {}", size, UNITS[unit_index])
    }
}

fn format_timestamp(timestamp: i64) -> String {
    use chrono::{Local, TimeZone};

    match Local.timestamp_opt(timestamp, 0) {
        chrono::LocalResult::Single(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        _ => timestamp.to_string(),
    }
}
