//! Counters and timers for store operations.
//!
//! The store pushes into a [`MetricsSink`]; [`InMemoryMetrics`] is the default
//! sink and keeps everything in process for diagnostics read-back.

use dashmap::DashMap;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::domain::Transaction;

pub const TRANSACTIONS_SAVED: &str = "transactions.saved";
pub const TRANSACTIONS_DELETED: &str = "transactions.deleted";
pub const TRANSACTIONS_BY_TYPE_PREFIX: &str = "transactions.by.type.";
pub const BULK_FAILED: &str = "transactions.bulk.failed";
pub const ASYNC_FAILED: &str = "transactions.async.failed";
pub const PROCESSING_TIME: &str = "transaction.processing.time";

pub trait MetricsSink: Send + Sync {
    fn increment(&self, name: &str);

    fn record_duration(&self, name: &str, duration: Duration);

    fn snapshot(&self) -> MetricsSnapshot;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TimerSnapshot {
    pub count: u64,
    pub total_micros: u64,
    pub max_micros: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub counters: BTreeMap<String, u64>,
    pub timers: BTreeMap<String, TimerSnapshot>,
}

impl MetricsSnapshot {
    /// Current value of a counter; zero if it was never incremented.
    pub fn counter(&self, name: &str) -> u64 {
        self.counters.get(name).copied().unwrap_or(0)
    }

    pub fn timer(&self, name: &str) -> Option<&TimerSnapshot> {
        self.timers.get(name)
    }
}

#[derive(Default)]
struct Timer {
    count: AtomicU64,
    total_micros: AtomicU64,
    max_micros: AtomicU64,
}

impl Timer {
    fn record(&self, duration: Duration) {
        let micros = u64::try_from(duration.as_micros()).unwrap_or(u64::MAX);
        self.count.fetch_add(1, Ordering::Relaxed);
        self.total_micros.fetch_add(micros, Ordering::Relaxed);
        self.max_micros.fetch_max(micros, Ordering::Relaxed);
    }

    fn snapshot(&self) -> TimerSnapshot {
        TimerSnapshot {
            count: self.count.load(Ordering::Relaxed),
            total_micros: self.total_micros.load(Ordering::Relaxed),
            max_micros: self.max_micros.load(Ordering::Relaxed),
        }
    }
}

#[derive(Default)]
pub struct InMemoryMetrics {
    counters: DashMap<String, AtomicU64>,
    timers: DashMap<String, Timer>,
}

impl InMemoryMetrics {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MetricsSink for InMemoryMetrics {
    fn increment(&self, name: &str) {
        if let Some(counter) = self.counters.get(name) {
            counter.fetch_add(1, Ordering::Relaxed);
            return;
        }
        self.counters
            .entry(name.to_string())
            .or_default()
            .fetch_add(1, Ordering::Relaxed);
    }

    fn record_duration(&self, name: &str, duration: Duration) {
        if let Some(timer) = self.timers.get(name) {
            timer.record(duration);
            return;
        }
        self.timers.entry(name.to_string()).or_default().record(duration);
    }

    fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            counters: self
                .counters
                .iter()
                .map(|entry| (entry.key().clone(), entry.value().load(Ordering::Relaxed)))
                .collect(),
            timers: self
                .timers
                .iter()
                .map(|entry| (entry.key().clone(), entry.value().snapshot()))
                .collect(),
        }
    }
}

pub fn record_saved(sink: &dyn MetricsSink, tx: &Transaction) {
    sink.increment(TRANSACTIONS_SAVED);
    sink.increment(&format!(
        "{}{}",
        TRANSACTIONS_BY_TYPE_PREFIX,
        tx.transaction_type().code()
    ));
    tracing::debug!("Recorded transaction saved metric for: {}", tx.id());
}

pub fn record_deleted(sink: &dyn MetricsSink, tx: &Transaction) {
    sink.increment(TRANSACTIONS_DELETED);
    tracing::debug!("Recorded transaction deleted metric for: {}", tx.id());
}

/// Emits the current counters and timers as one structured event.
pub fn log_snapshot(sink: &dyn MetricsSink) {
    let snapshot = sink.snapshot();
    let processing = snapshot.timer(PROCESSING_TIME).cloned().unwrap_or_default();

    tracing::info!(
        saved = snapshot.counter(TRANSACTIONS_SAVED),
        deleted = snapshot.counter(TRANSACTIONS_DELETED),
        bulk_failed = snapshot.counter(BULK_FAILED),
        async_failed = snapshot.counter(ASYNC_FAILED),
        processing_count = processing.count,
        processing_total_micros = processing.total_micros,
        counters = ?snapshot.counters,
        "Transaction store metrics"
    );
}
