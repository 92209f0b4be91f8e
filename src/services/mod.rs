pub mod cache;
pub mod filter;
pub mod handle;
pub mod import_export;
pub mod stats;
pub mod store;

pub use cache::{BoundedCache, CacheStats};
pub use filter::{FilterTerm, TransactionFilter};
pub use handle::OperationHandle;
pub use import_export::{ExportFormat, ImportExportService};
pub use stats::TransactionStats;
pub use store::{BulkFailure, BulkSaveReport, StoreConfig, TransactionStore};
