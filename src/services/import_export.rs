use bigdecimal::BigDecimal;
use chrono::{Duration, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use uuid::Uuid;

use crate::domain::{Transaction, TransactionDraft, TransactionMetadata, TransactionType};
use crate::error::AppError;
use crate::services::handle::OperationHandle;
use crate::services::store::{BulkFailure, BulkSaveReport, TransactionStore};
use crate::validation::ValidationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Csv,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Csv => "csv",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "csv" => Ok(ExportFormat::Csv),
            other => Err(ValidationError::new(
                "format",
                format!("unsupported export format: {}", other),
            )),
        }
    }
}

/// CSV row representation; tags and metadata are flattened to strings.
#[derive(Serialize)]
struct TransactionCsvRow {
    id: String,
    description: String,
    amount: String,
    timestamp: String,
    #[serde(rename = "type")]
    transaction_type: &'static str,
    tags: String,
    source: String,
    category: String,
}

impl From<&Transaction> for TransactionCsvRow {
    fn from(tx: &Transaction) -> Self {
        TransactionCsvRow {
            id: tx.id().to_string(),
            description: tx.description().to_string(),
            amount: tx.amount().to_string(),
            timestamp: tx.timestamp().to_rfc3339(),
            transaction_type: tx.transaction_type().code(),
            tags: tx.tags().join(";"),
            source: tx.metadata().source.clone().unwrap_or_default(),
            category: tx.metadata().category.clone().unwrap_or_default(),
        }
    }
}

/// Pretty-printed JSON array.
pub fn to_json(transactions: &[Transaction]) -> Result<String, AppError> {
    Ok(serde_json::to_string_pretty(transactions)?)
}

/// Parses a JSON array of transactions. The outer document must be an array;
/// each element is parsed on its own so one bad entry does not sink the rest.
pub fn parse_json(json: &str) -> Result<Vec<Result<TransactionDraft, AppError>>, AppError> {
    let values: Vec<serde_json::Value> = serde_json::from_str(json)?;

    Ok(values
        .into_iter()
        .map(|value| serde_json::from_value::<TransactionDraft>(value).map_err(AppError::from))
        .collect())
}

pub fn to_csv(transactions: &[Transaction]) -> Result<String, AppError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for tx in transactions {
        writer.serialize(TransactionCsvRow::from(tx))?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| AppError::Io(e.into_error()))?;
    String::from_utf8(bytes).map_err(|e| AppError::Internal(format!("utf8 error: {}", e)))
}

pub fn render(transactions: &[Transaction], format: ExportFormat) -> Result<String, AppError> {
    match format {
        ExportFormat::Json => to_json(transactions),
        ExportFormat::Csv => to_csv(transactions),
    }
}

/// Moves transactions between files and a [`TransactionStore`]. File work runs
/// off the calling task and returns an [`OperationHandle`].
#[derive(Clone)]
pub struct ImportExportService {
    store: TransactionStore,
}

impl ImportExportService {
    pub fn new(store: TransactionStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &TransactionStore {
        &self.store
    }

    pub fn export_to_file(
        &self,
        transactions: Vec<Transaction>,
        path: impl Into<PathBuf>,
        format: ExportFormat,
    ) -> OperationHandle<PathBuf> {
        let path = path.into();

        OperationHandle::spawn("export", self.store.metrics().clone(), async move {
            tracing::info!(
                "Exporting {} transactions to {}",
                transactions.len(),
                path.display()
            );

            let body = render(&transactions, format)?;
            tokio::fs::write(&path, body).await.map_err(|e| {
                tracing::error!("Failed to export transactions to {}: {}", path.display(), e);
                AppError::Io(e)
            })?;

            tracing::info!("Successfully exported transactions to {}", path.display());
            Ok(path)
        })
    }

    pub fn import_from_file(
        &self,
        path: impl Into<PathBuf>,
    ) -> OperationHandle<Vec<Result<TransactionDraft, AppError>>> {
        let path = path.into();

        OperationHandle::spawn("import", self.store.metrics().clone(), async move {
            read_drafts(&path).await
        })
    }

    /// Reads a JSON file and saves every entry through the bulk path. Entries
    /// that fail to parse are reported alongside validation failures, indexed
    /// by their position in the file.
    pub fn import_and_save(&self, path: impl Into<PathBuf>) -> OperationHandle<BulkSaveReport> {
        let path = path.into();
        let store = self.store.clone();

        OperationHandle::spawn("import_and_save", self.store.metrics().clone(), async move {
            let parsed = read_drafts(&path).await?;

            let mut positions = Vec::with_capacity(parsed.len());
            let mut drafts = Vec::with_capacity(parsed.len());
            let mut parse_failures = Vec::new();
            for (index, entry) in parsed.into_iter().enumerate() {
                match entry {
                    Ok(draft) => {
                        positions.push(index);
                        drafts.push(draft);
                    }
                    Err(error) => {
                        tracing::warn!("Skipping unreadable entry {} in {}: {}", index, path.display(), error);
                        parse_failures.push(BulkFailure {
                            index,
                            id: None,
                            error,
                        });
                    }
                }
            }

            let mut report = store.save_bulk_async(drafts).await?;
            for failure in &mut report.failed {
                failure.index = positions[failure.index];
            }
            report.failed.extend(parse_failures);
            report.failed.sort_by_key(|failure| failure.index);

            Ok(report)
        })
    }

    /// Writes the store's recent transactions to a timestamped JSON file in
    /// `directory`.
    pub fn export_recent(&self, directory: impl AsRef<Path>) -> OperationHandle<PathBuf> {
        let file_name = format!(
            "transactions_{}.{}",
            Utc::now().format("%Y-%m-%dT%H-%M-%S"),
            ExportFormat::Json.extension()
        );
        let path = directory.as_ref().join(file_name);

        self.export_to_file(self.store.recent_transactions(), path, ExportFormat::Json)
    }
}

async fn read_drafts(path: &Path) -> Result<Vec<Result<TransactionDraft, AppError>>, AppError> {
    tracing::info!("Importing transactions from {}", path.display());

    let json = tokio::fs::read_to_string(path).await.map_err(|e| {
        tracing::error!("Failed to import transactions from {}: {}", path.display(), e);
        AppError::Io(e)
    })?;
    let drafts = parse_json(&json)?;

    tracing::info!(
        "Successfully read {} entries from {}",
        drafts.len(),
        path.display()
    );
    Ok(drafts)
}

/// A small mixed set of transactions for demos.
pub fn sample_transactions() -> Result<Vec<Transaction>, ValidationError> {
    let now = Utc::now();

    Ok(vec![
        Transaction::new(
            Uuid::new_v4().to_string(),
            "Coffee purchase",
            BigDecimal::from_str("4.50").map_err(|e| ValidationError::new("amount", e.to_string()))?,
            now - Duration::hours(2),
            TransactionType::Debit,
            vec!["food".to_string(), "coffee".to_string()],
            TransactionMetadata::with_source("mobile-app"),
        )?,
        Transaction::new(
            Uuid::new_v4().to_string(),
            "Salary deposit",
            BigDecimal::from(3500),
            now - Duration::days(1),
            TransactionType::Credit,
            vec!["salary".to_string(), "income".to_string()],
            TransactionMetadata::default(),
        )?,
        Transaction::new(
            Uuid::new_v4().to_string(),
            "Transfer to savings",
            BigDecimal::from(500),
            now - Duration::hours(6),
            TransactionType::Transfer,
            vec!["savings".to_string(), "transfer".to_string()],
            TransactionMetadata::with_source("web-app"),
        )?,
    ])
}
