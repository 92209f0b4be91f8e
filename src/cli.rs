use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::domain::{Transaction, TransactionType};
use crate::metrics;
use crate::services::import_export::{self, ExportFormat};
use crate::services::TransactionFilter;
use crate::{create_app, AppState};

#[derive(Parser)]
#[command(name = "synapse-ledger")]
#[command(about = "Synapse Ledger - in-memory transaction store", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a file of sample transactions
    Sample {
        /// Output JSON file
        #[arg(value_name = "OUT")]
        output: PathBuf,
    },

    /// Load a JSON file and print aggregate statistics
    Stats {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Load a JSON file and list matching transactions, most recent first
    Query {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Transaction type (debit, credit, transfer)
        #[arg(long = "type")]
        transaction_type: Option<TransactionType>,

        /// Only transactions after this RFC 3339 timestamp
        #[arg(long)]
        after: Option<DateTime<Utc>>,

        /// Only transactions before this RFC 3339 timestamp
        #[arg(long)]
        before: Option<DateTime<Utc>>,

        /// Only amounts strictly greater than this
        #[arg(long)]
        min_amount: Option<BigDecimal>,

        /// Only transactions carrying this tag
        #[arg(long)]
        tag: Option<String>,

        /// Only transactions from the last 24 hours
        #[arg(long)]
        recent: bool,
    },

    /// Load a JSON file and write it back out as JSON or CSV
    Export {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        #[arg(value_name = "OUT")]
        output: PathBuf,

        /// Output format (json, csv)
        #[arg(short, long, default_value = "json")]
        format: ExportFormat,
    },

    /// Load a JSON file and export its recent transactions to the export directory
    ExportRecent {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Configuration validation
    Config,
}

pub async fn run(cli: Cli, config: &Config) -> anyhow::Result<()> {
    match cli.command {
        Commands::Sample { output } => handle_sample(config, &output).await,
        Commands::Stats { file } => handle_stats(config, &file).await,
        Commands::Query {
            file,
            transaction_type,
            after,
            before,
            min_amount,
            tag,
            recent,
        } => {
            let mut filter = if recent {
                TransactionFilter::recent()
            } else {
                TransactionFilter::new()
            };
            if let Some(transaction_type) = transaction_type {
                filter = filter.with_type(transaction_type);
            }
            if let Some(after) = after {
                filter = filter.after(after);
            }
            if let Some(before) = before {
                filter = filter.before(before);
            }
            if let Some(min_amount) = min_amount {
                filter = filter.amount_greater_than(min_amount);
            }
            if let Some(tag) = tag {
                filter = filter.with_tag(tag);
            }
            handle_query(config, &file, &filter).await
        }
        Commands::Export {
            file,
            output,
            format,
        } => handle_export(config, &file, &output, format).await,
        Commands::ExportRecent { file } => handle_export_recent(config, &file).await,
        Commands::Config => handle_config_validate(config),
    }
}

async fn load(config: &Config, file: &Path) -> anyhow::Result<AppState> {
    let app = create_app(config);
    // detached; stops with the runtime
    app.store.spawn_cache_sweeper();
    let report = app.import_export.import_and_save(file).await?;

    for failure in &report.failed {
        println!(
            "✗ entry {} ({}): {}",
            failure.index,
            failure.id.as_deref().unwrap_or("-"),
            failure.error
        );
    }
    tracing::info!(
        "Loaded {} of {} transactions from {}",
        report.saved.len(),
        report.attempted(),
        file.display()
    );

    Ok(app)
}

pub async fn handle_sample(config: &Config, output: &Path) -> anyhow::Result<()> {
    let app = create_app(config);
    let samples = import_export::sample_transactions()?;
    let path = app
        .import_export
        .export_to_file(samples, output, ExportFormat::Json)
        .await?;

    println!("✓ Sample transactions written to {}", path.display());
    Ok(())
}

pub async fn handle_stats(config: &Config, file: &Path) -> anyhow::Result<()> {
    let app = load(config, file).await?;
    let stats = app.store.stats();
    let cache = app.store.cache_stats();

    println!("Transactions: {}", stats.total_count);
    println!("  Balance:    {}", stats.total_amount);
    println!("  Gross:      {}", stats.gross_amount);
    println!("  Average:    {}", stats.average_amount);
    for transaction_type in TransactionType::ALL {
        println!(
            "  {:<10}  {}",
            transaction_type.code(),
            stats.count_for(transaction_type)
        );
    }
    println!(
        "Cache: {} entries, {} hits, {} misses, {} evictions",
        cache.current_size, cache.hits, cache.misses, cache.evictions
    );

    metrics::log_snapshot(app.metrics.as_ref());
    Ok(())
}

pub async fn handle_query(
    config: &Config,
    file: &Path,
    filter: &TransactionFilter,
) -> anyhow::Result<()> {
    let app = load(config, file).await?;
    let matches: Vec<Transaction> = app.store.find(filter).collect();

    if matches.is_empty() {
        println!("No matching transactions");
        return Ok(());
    }

    println!(
        "{:<38} {:<26} {:<10} {:>14} {}",
        "Id", "Timestamp", "Type", "Amount", "Description"
    );
    println!("{}", "-".repeat(110));
    for tx in matches {
        println!(
            "{:<38} {:<26} {:<10} {:>14} {}",
            tx.id(),
            tx.timestamp().format("%Y-%m-%d %H:%M:%S"),
            tx.transaction_type(),
            tx.formatted_amount(),
            tx.description()
        );
    }

    Ok(())
}

pub async fn handle_export(
    config: &Config,
    file: &Path,
    output: &Path,
    format: ExportFormat,
) -> anyhow::Result<()> {
    let app = load(config, file).await?;
    let path = app
        .import_export
        .export_to_file(app.store.snapshot(), output, format)
        .await?;

    println!("✓ Exported {} transactions to {}", app.store.len(), path.display());
    Ok(())
}

pub async fn handle_export_recent(config: &Config, file: &Path) -> anyhow::Result<()> {
    let app = load(config, file).await?;
    tokio::fs::create_dir_all(&config.export_dir).await?;
    let path = app.import_export.export_recent(&config.export_dir).await?;

    println!("✓ Recent transactions exported to {}", path.display());
    Ok(())
}

pub fn handle_config_validate(config: &Config) -> anyhow::Result<()> {
    tracing::info!("Validating configuration...");

    println!("Configuration:");
    println!("  Cache capacity:    {}", config.store.cache_capacity);
    println!("  Cache TTL:         {:?}", config.store.cache_ttl);
    println!("  Cache sweep:       {:?}", config.store.sweep_interval);
    println!("  Bulk workers:      {}", config.store.bulk_workers);
    println!("  Export directory:  {}", config.export_dir.display());

    tracing::info!("Configuration is valid");
    println!("✓ Configuration is valid");

    Ok(())
}
