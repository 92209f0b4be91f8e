pub mod transaction;

pub use transaction::{Transaction, TransactionDraft, TransactionMetadata, TransactionType};
