//! Authoritative in-memory transaction store.
//!
//! The map of record id to [`Transaction`] is the single source of truth. A
//! [`BoundedCache`] sits in front of it for lookups, and every mutation is
//! reported to a [`MetricsSink`]. Map and cache updates for one id happen
//! while that id's map shard is locked, so readers never see the cache
//! disagree with a completed write or delete.

use bigdecimal::BigDecimal;
use dashmap::DashMap;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

use crate::domain::{Transaction, TransactionDraft};
use crate::error::AppError;
use crate::metrics::{self, MetricsSink, BULK_FAILED, PROCESSING_TIME};
use crate::services::cache::{BoundedCache, CacheStats};
use crate::services::filter::TransactionFilter;
use crate::services::handle::OperationHandle;
use crate::services::stats::TransactionStats;

pub const DEFAULT_CACHE_CAPACITY: usize = 10_000;
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(30 * 60);
pub const DEFAULT_BULK_WORKERS: usize = 4;
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);
pub const RECENT_LIMIT: usize = 100;
const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreConfig {
    pub cache_capacity: usize,
    pub cache_ttl: Duration,
    pub bulk_workers: usize,
    pub sweep_interval: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            cache_ttl: DEFAULT_CACHE_TTL,
            bulk_workers: DEFAULT_BULK_WORKERS,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

/// Outcome of one bulk item that did not land.
#[derive(Debug)]
pub struct BulkFailure {
    /// Position of the item in the submitted batch.
    pub index: usize,
    pub id: Option<String>,
    pub error: AppError,
}

#[derive(Debug, Default)]
pub struct BulkSaveReport {
    pub saved: Vec<Transaction>,
    pub failed: Vec<BulkFailure>,
}

impl BulkSaveReport {
    pub fn attempted(&self) -> usize {
        self.saved.len() + self.failed.len()
    }

    pub fn is_complete_success(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Clone)]
pub struct TransactionStore {
    records: Arc<DashMap<String, Transaction>>,
    cache: Arc<BoundedCache<String, Transaction>>,
    metrics: Arc<dyn MetricsSink>,
    config: StoreConfig,
}

impl TransactionStore {
    pub fn new(config: &StoreConfig, metrics: Arc<dyn MetricsSink>) -> Self {
        tracing::info!(
            "Transaction store created (cache capacity {}, ttl {:?}, bulk workers {})",
            config.cache_capacity,
            config.cache_ttl,
            config.bulk_workers
        );

        Self {
            records: Arc::new(DashMap::new()),
            cache: Arc::new(BoundedCache::new(config.cache_capacity, config.cache_ttl)),
            metrics,
            config: config.clone(),
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn metrics(&self) -> &Arc<dyn MetricsSink> {
        &self.metrics
    }

    /// Inserts or replaces the record with the same id.
    pub fn save(&self, tx: Transaction) -> Transaction {
        let started = Instant::now();
        tracing::debug!("Saving transaction: {}", tx.id());

        {
            let _guard = self.records.entry(tx.id().to_string()).insert(tx.clone());
            self.cache.insert(tx.id().to_string(), tx.clone());
        }

        metrics::record_saved(self.metrics.as_ref(), &tx);
        self.metrics.record_duration(PROCESSING_TIME, started.elapsed());

        tracing::info!("Transaction saved successfully: {}", tx.id());
        tx
    }

    /// Validates and saves a draft.
    pub fn save_draft(&self, draft: TransactionDraft) -> Result<Transaction, AppError> {
        let tx = Transaction::try_from(draft)?;
        Ok(self.save(tx))
    }

    /// Same effect as [`TransactionStore::save`], executed on a Tokio worker.
    /// Outside a runtime nothing is saved and the handle resolves to
    /// [`AppError::Internal`].
    pub fn save_async(&self, tx: Transaction) -> OperationHandle<Transaction> {
        let store = self.clone();
        OperationHandle::spawn("save", self.metrics.clone(), async move { Ok(store.save(tx)) })
    }

    pub fn find_by_id(&self, id: &str) -> Option<Transaction> {
        let key = id.to_string();

        if let Some(cached) = self.cache.get(&key) {
            tracing::debug!("Cache hit for transaction: {}", id);
            return Some(cached);
        }

        tracing::debug!("Cache miss for transaction: {}", id);
        let entry = self.records.get(id)?;
        let tx = entry.value().clone();
        // shard read lock still held: no delete can slip in between
        self.cache.insert(key, tx.clone());
        Some(tx)
    }

    /// Removes the record from the map and cache. Returns whether it existed.
    pub fn delete(&self, id: &str) -> bool {
        // cache entry goes while the shard write lock is held
        let removed = self.records.remove_if(id, |key, _| {
            self.cache.invalidate(key);
            true
        });

        match removed {
            Some((_, tx)) => {
                metrics::record_deleted(self.metrics.as_ref(), &tx);
                tracing::info!("Transaction deleted: {}", id);
                true
            }
            None => {
                tracing::warn!("Transaction not found for deletion: {}", id);
                false
            }
        }
    }

    /// Matching records from a point-in-time copy of the map, most recent
    /// first. Iterating again requires calling `find` again.
    pub fn find(&self, filter: &TransactionFilter) -> std::vec::IntoIter<Transaction> {
        let mut matches: Vec<Transaction> = self
            .records
            .iter()
            .filter(|entry| filter.matches(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();

        matches.sort_by(|a, b| b.timestamp().cmp(&a.timestamp()));
        matches.into_iter()
    }

    /// Up to 100 transactions from the last 24 hours, most recent first.
    pub fn recent_transactions(&self) -> Vec<Transaction> {
        self.find(&TransactionFilter::recent())
            .take(RECENT_LIMIT)
            .collect()
    }

    /// Applies save semantics to every draft on at most `bulk_workers`
    /// concurrent tasks. Each item succeeds or fails on its own; the report
    /// lists both in submission order. Like `save_async`, it needs a Tokio
    /// runtime to run.
    pub fn save_bulk_async(&self, drafts: Vec<TransactionDraft>) -> OperationHandle<BulkSaveReport> {
        let store = self.clone();
        let workers = self.config.bulk_workers.max(1);

        OperationHandle::spawn("save_bulk", self.metrics.clone(), async move {
            tracing::info!("Saving {} transactions in bulk", drafts.len());
            let started = Instant::now();

            let mut outcomes: Vec<(usize, Option<String>, Result<Transaction, AppError>)> =
                stream::iter(drafts.into_iter().enumerate())
                    .map(|(index, draft)| {
                        let store = store.clone();
                        let id = Some(draft.id.clone());
                        async move {
                            let result = match tokio::spawn(async move { store.save_draft(draft) }).await {
                                Ok(result) => result,
                                Err(join_error) => Err(AppError::TaskFailed(join_error.to_string())),
                            };
                            (index, id, result)
                        }
                    })
                    .buffer_unordered(workers)
                    .collect()
                    .await;

            outcomes.sort_by_key(|(index, _, _)| *index);

            let mut report = BulkSaveReport::default();
            for (index, id, result) in outcomes {
                match result {
                    Ok(tx) => report.saved.push(tx),
                    Err(error) => {
                        store.metrics.increment(BULK_FAILED);
                        tracing::warn!(
                            "Bulk item {} ({}) rejected: {}",
                            index,
                            id.as_deref().unwrap_or("<no id>"),
                            error
                        );
                        report.failed.push(BulkFailure { index, id, error });
                    }
                }
            }

            tracing::info!(
                "Bulk save completed: {} saved, {} failed in {:?}",
                report.saved.len(),
                report.failed.len(),
                started.elapsed()
            );
            Ok(report)
        })
    }

    /// Point-in-time copy of every record, in no particular order.
    pub fn snapshot(&self) -> Vec<Transaction> {
        self.records
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn stats(&self) -> TransactionStats {
        TransactionStats::from_records(&self.snapshot())
    }

    /// Signed sum of all amounts.
    pub fn calculate_balance(&self) -> BigDecimal {
        self.records
            .iter()
            .map(|entry| entry.value().signed_amount())
            .fold(BigDecimal::from(0), |acc, amount| acc + amount)
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Periodically drops expired cache entries. The task runs until aborted.
    /// Must be called from within a Tokio runtime.
    pub fn spawn_cache_sweeper(&self) -> JoinHandle<()> {
        let cache = self.cache.clone();
        let interval = self.config.sweep_interval.max(MIN_SWEEP_INTERVAL);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let purged = cache.purge_expired();
                if purged > 0 {
                    tracing::debug!("Cache sweep removed {} expired entries", purged);
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{TransactionMetadata, TransactionType};
    use crate::metrics::{InMemoryMetrics, TRANSACTIONS_DELETED, TRANSACTIONS_SAVED};
    use chrono::Utc;
    use std::str::FromStr;

    fn store_with(config: StoreConfig) -> (TransactionStore, Arc<InMemoryMetrics>) {
        let metrics = Arc::new(InMemoryMetrics::new());
        (TransactionStore::new(&config, metrics.clone()), metrics)
    }

    fn tx(id: &str, ty: TransactionType, amount: &str) -> Transaction {
        Transaction::new(
            id,
            format!("transaction {}", id),
            BigDecimal::from_str(amount).unwrap(),
            Utc::now(),
            ty,
            vec![],
            TransactionMetadata::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_save_then_find() {
        let (store, metrics) = store_with(StoreConfig::default());
        let saved = store.save(tx("a", TransactionType::Credit, "10"));

        assert_eq!(store.find_by_id("a"), Some(saved));
        assert_eq!(store.len(), 1);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.counter(TRANSACTIONS_SAVED), 1);
        assert_eq!(snapshot.counter("transactions.by.type.credit"), 1);
        assert_eq!(snapshot.timer(PROCESSING_TIME).map(|t| t.count), Some(1));
    }

    #[test]
    fn test_save_replaces_by_id() {
        let (store, _) = store_with(StoreConfig::default());
        store.save(tx("a", TransactionType::Credit, "10"));
        let replacement = store.save(tx("a", TransactionType::Debit, "20"));

        assert_eq!(store.len(), 1);
        assert_eq!(store.find_by_id("a"), Some(replacement));
    }

    #[test]
    fn test_delete_missing_id() {
        let (store, metrics) = store_with(StoreConfig::default());
        store.save(tx("a", TransactionType::Credit, "10"));

        assert!(!store.delete("missing"));
        assert_eq!(store.len(), 1);
        assert_eq!(metrics.snapshot().counter(TRANSACTIONS_DELETED), 0);
    }

    #[test]
    fn test_delete_clears_cache() {
        let (store, metrics) = store_with(StoreConfig::default());
        store.save(tx("a", TransactionType::Credit, "10"));
        assert!(store.find_by_id("a").is_some());

        assert!(store.delete("a"));
        assert_eq!(store.find_by_id("a"), None);
        assert_eq!(store.cache_stats().current_size, 0);
        assert_eq!(metrics.snapshot().counter(TRANSACTIONS_DELETED), 1);
    }

    #[test]
    fn test_cache_miss_falls_back_to_map() {
        let (store, _) = store_with(StoreConfig {
            cache_capacity: 1,
            ..StoreConfig::default()
        });
        store.save(tx("a", TransactionType::Credit, "10"));
        store.save(tx("b", TransactionType::Credit, "20"));

        let stats = store.cache_stats();
        assert_eq!(stats.evictions, 1);
        assert_eq!(stats.current_size, 1);

        assert!(store.find_by_id("a").is_some());
        let stats = store.cache_stats();
        assert_eq!(stats.misses, 1);

        // repopulated on the miss
        assert!(store.find_by_id("a").is_some());
        assert_eq!(store.cache_stats().hits, 1);
    }

    #[test]
    fn test_balance_is_signed() {
        let (store, _) = store_with(StoreConfig::default());
        store.save(tx("c", TransactionType::Credit, "100"));
        store.save(tx("d", TransactionType::Debit, "30"));
        store.save(tx("t", TransactionType::Transfer, "20"));

        assert_eq!(store.calculate_balance(), BigDecimal::from(90));
        assert_eq!(store.stats().total_amount, BigDecimal::from(90));
    }

    #[tokio::test]
    async fn test_save_async() {
        let (store, _) = store_with(StoreConfig::default());
        let saved = store
            .save_async(tx("a", TransactionType::Transfer, "5"))
            .await
            .unwrap();

        assert_eq!(store.find_by_id("a"), Some(saved));
    }

    #[tokio::test]
    async fn test_bulk_isolates_failures() {
        let (store, metrics) = store_with(StoreConfig::default());
        let mut bad: TransactionDraft = tx("bad", TransactionType::Debit, "1").into();
        bad.amount = BigDecimal::from(0);

        let drafts = vec![
            tx("one", TransactionType::Credit, "1").into(),
            bad,
            tx("two", TransactionType::Credit, "2").into(),
        ];

        let report = store.save_bulk_async(drafts).await.unwrap();
        assert_eq!(report.saved.len(), 2);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].index, 1);
        assert_eq!(report.failed[0].id.as_deref(), Some("bad"));
        assert_eq!(report.failed[0].error.field(), Some("amount"));
        assert_eq!(store.len(), 2);
        assert_eq!(metrics.snapshot().counter(BULK_FAILED), 1);
    }

    #[test]
    fn test_save_async_outside_runtime_saves_nothing() {
        let (store, _) = store_with(StoreConfig::default());
        let handle = store.save_async(tx("a", TransactionType::Credit, "1"));

        let err = futures::executor::block_on(handle).unwrap_err();
        assert!(matches!(err, AppError::Internal(_)));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_sweeper_survives_zero_interval() {
        let (store, _) = store_with(StoreConfig {
            cache_ttl: Duration::from_millis(5),
            sweep_interval: Duration::ZERO,
            ..StoreConfig::default()
        });
        store.save(tx("a", TransactionType::Credit, "1"));

        let sweeper = store.spawn_cache_sweeper();
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(!sweeper.is_finished());
        assert_eq!(store.cache_stats().current_size, 0);
        sweeper.abort();
    }
}
