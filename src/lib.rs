pub mod cli;
pub mod config;
pub mod domain;
pub mod error;
pub mod metrics;
pub mod services;
pub mod validation;

use std::sync::Arc;

use crate::config::Config;
use crate::metrics::InMemoryMetrics;
use crate::services::{ImportExportService, TransactionStore};

pub use crate::domain::{Transaction, TransactionDraft, TransactionMetadata, TransactionType};
pub use crate::error::{AppError, AppResult};
pub use crate::services::{OperationHandle, TransactionFilter, TransactionStats};
pub use crate::validation::ValidationError;

/// Store plus the collaborators wired around it.
#[derive(Clone)]
pub struct AppState {
    pub store: TransactionStore,
    pub metrics: Arc<InMemoryMetrics>,
    pub import_export: ImportExportService,
}

pub fn create_app(config: &Config) -> AppState {
    let metrics = Arc::new(InMemoryMetrics::new());
    let store = TransactionStore::new(&config.store, metrics.clone());
    let import_export = ImportExportService::new(store.clone());

    AppState {
        store,
        metrics,
        import_export,
    }
}
