use bigdecimal::BigDecimal;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use synapse_ledger::config::Config;
use synapse_ledger::metrics::{
    InMemoryMetrics, MetricsSink, BULK_FAILED, TRANSACTIONS_DELETED, TRANSACTIONS_SAVED,
};
use synapse_ledger::services::{StoreConfig, TransactionStore};
use synapse_ledger::{
    create_app, AppError, Transaction, TransactionDraft, TransactionFilter, TransactionMetadata,
    TransactionType,
};

fn setup_store(config: StoreConfig) -> (TransactionStore, Arc<InMemoryMetrics>) {
    let metrics = Arc::new(InMemoryMetrics::new());
    let store = TransactionStore::new(&config, metrics.clone());
    (store, metrics)
}

fn dec(s: &str) -> BigDecimal {
    BigDecimal::from_str(s).unwrap()
}

fn transaction_at(
    id: &str,
    ty: TransactionType,
    amount: &str,
    timestamp: DateTime<Utc>,
) -> Transaction {
    Transaction::new(
        id,
        format!("Test transaction {}", id),
        dec(amount),
        timestamp,
        ty,
        vec!["test".to_string()],
        TransactionMetadata::with_source("integration-test"),
    )
    .unwrap()
}

fn transaction(id: &str, ty: TransactionType, amount: &str) -> Transaction {
    transaction_at(id, ty, amount, Utc::now())
}

#[test]
fn test_save_and_find_round_trip() {
    let (store, metrics) = setup_store(StoreConfig::default());
    let tx = transaction("tx-1", TransactionType::Credit, "42.10");

    store.save(tx.clone());

    assert_eq!(store.find_by_id("tx-1"), Some(tx));
    assert_eq!(metrics.snapshot().counter(TRANSACTIONS_SAVED), 1);
}

#[test]
fn test_invalid_amount_never_reaches_the_store() {
    let (store, _) = setup_store(StoreConfig::default());

    for amount in ["0", "-5.00", "1.234"] {
        let draft = TransactionDraft {
            id: "bad".to_string(),
            description: "Invalid amount".to_string(),
            amount: dec(amount),
            timestamp: Utc::now(),
            transaction_type: TransactionType::Debit,
            tags: vec![],
            metadata: TransactionMetadata::default(),
        };

        let error = store.save_draft(draft).unwrap_err();
        assert_eq!(error.field(), Some("amount"));
    }

    assert!(store.is_empty());
    assert_eq!(store.find_by_id("bad"), None);
}

#[test]
fn test_delete_missing_returns_false() {
    let (store, metrics) = setup_store(StoreConfig::default());

    assert!(!store.delete("nope"));
    assert_eq!(metrics.snapshot().counter(TRANSACTIONS_DELETED), 0);
}

#[test]
fn test_delete_leaves_no_stale_cache_entry() {
    let (store, _) = setup_store(StoreConfig::default());
    store.save(transaction("tx-1", TransactionType::Debit, "10"));
    // warm the cache
    assert!(store.find_by_id("tx-1").is_some());

    assert!(store.delete("tx-1"));

    assert_eq!(store.find_by_id("tx-1"), None);
    assert_eq!(store.cache_stats().current_size, 0);
}

#[test]
fn test_empty_stats() {
    let (store, _) = setup_store(StoreConfig::default());
    let stats = store.stats();

    assert_eq!(stats.total_count, 0);
    assert_eq!(stats.total_amount, BigDecimal::from(0));
    assert_eq!(stats.average_amount, BigDecimal::from(0));
    assert!(stats.type_distribution.is_empty());
}

#[test]
fn test_stats_sign_debits_only() {
    let (store, _) = setup_store(StoreConfig::default());
    store.save(transaction("c", TransactionType::Credit, "100"));
    store.save(transaction("d", TransactionType::Debit, "30"));
    store.save(transaction("t", TransactionType::Transfer, "20"));

    let stats = store.stats();
    assert_eq!(stats.total_count, 3);
    assert_eq!(stats.total_amount, dec("90"));
    assert_eq!(stats.average_amount.to_string(), "50.00");
    assert_eq!(stats.count_for(TransactionType::Debit), 1);
    assert_eq!(store.calculate_balance(), dec("90"));
}

#[test]
fn test_filter_orders_most_recent_first() {
    let (store, _) = setup_store(StoreConfig::default());
    let now = Utc::now();
    store.save(transaction_at("old", TransactionType::Credit, "75", now - ChronoDuration::hours(3)));
    store.save(transaction_at("new", TransactionType::Credit, "60", now - ChronoDuration::hours(1)));
    store.save(transaction_at("small", TransactionType::Credit, "50", now));
    store.save(transaction_at("debit", TransactionType::Debit, "500", now));

    let filter = TransactionFilter::new()
        .with_type(TransactionType::Credit)
        .amount_greater_than(dec("50"));
    let ids: Vec<String> = store
        .find(&filter)
        .map(|tx| tx.id().to_string())
        .collect();

    assert_eq!(ids, vec!["new".to_string(), "old".to_string()]);
}

#[test]
fn test_recent_transactions_skip_old_records() {
    let (store, _) = setup_store(StoreConfig::default());
    let now = Utc::now();
    store.save(transaction_at("today", TransactionType::Credit, "1", now - ChronoDuration::hours(2)));
    store.save(transaction_at("last-week", TransactionType::Credit, "1", now - ChronoDuration::days(7)));

    let recent = store.recent_transactions();
    assert_eq!(recent.len(), 1);
    assert_eq!(recent[0].id(), "today");
}

#[test]
fn test_recent_transactions_are_capped() {
    let (store, _) = setup_store(StoreConfig::default());
    let now = Utc::now();
    for i in 0..150 {
        store.save(transaction_at(
            &format!("tx-{}", i),
            TransactionType::Debit,
            "1",
            now - ChronoDuration::seconds(i),
        ));
    }

    let recent = store.recent_transactions();
    assert_eq!(recent.len(), 100);
    assert_eq!(recent[0].id(), "tx-0");
}

#[test]
fn test_cache_eviction_falls_back_to_map() {
    let (store, _) = setup_store(StoreConfig {
        cache_capacity: 2,
        ..StoreConfig::default()
    });
    for id in ["a", "b", "c"] {
        store.save(transaction(id, TransactionType::Credit, "1"));
    }

    let stats = store.cache_stats();
    assert_eq!(stats.current_size, 2);
    assert_eq!(stats.evictions, 1);

    // evicted from the cache but still authoritative in the map
    assert!(store.find_by_id("a").is_some());
    assert_eq!(store.cache_stats().misses, 1);
    assert_eq!(store.len(), 3);
}

#[tokio::test]
async fn test_bulk_save_reports_invalid_items() {
    let (store, metrics) = setup_store(StoreConfig::default());
    let mut invalid: TransactionDraft = transaction("bad", TransactionType::Debit, "1").into();
    invalid.description = "   ".to_string();

    let drafts = vec![
        transaction("ok-1", TransactionType::Credit, "1").into(),
        transaction("ok-2", TransactionType::Credit, "2").into(),
        invalid,
    ];

    let report = store.save_bulk_async(drafts).await.unwrap();

    assert_eq!(report.attempted(), 3);
    assert!(!report.is_complete_success());
    assert_eq!(report.saved.len(), 2);
    assert_eq!(report.failed[0].index, 2);
    assert_eq!(report.failed[0].error.field(), Some("description"));
    assert_eq!(store.len(), 2);
    assert_eq!(metrics.snapshot().counter(BULK_FAILED), 1);
}

#[tokio::test]
async fn test_timeout_does_not_roll_back_bulk_save() {
    let (store, _) = setup_store(StoreConfig::default());
    let drafts: Vec<TransactionDraft> = (0..500)
        .map(|i| transaction(&format!("tx-{}", i), TransactionType::Credit, "1").into())
        .collect();

    match store.save_bulk_async(drafts).wait_timeout(Duration::ZERO).await {
        Ok(report) => assert_eq!(report.saved.len(), 500),
        Err(error) => assert!(matches!(error, AppError::Timeout(_))),
    }

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while store.len() < 500 && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(store.len(), 500);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_saves_to_distinct_ids() {
    let (store, metrics) = setup_store(StoreConfig::default());

    let writers: Vec<_> = (0..8)
        .map(|writer| {
            let store = store.clone();
            tokio::spawn(async move {
                for i in 0..50 {
                    let id = format!("w{}-{}", writer, i);
                    store
                        .save_async(transaction(&id, TransactionType::Transfer, "3.50"))
                        .await
                        .unwrap();
                }
            })
        })
        .collect();

    for writer in writers {
        writer.await.unwrap();
    }

    assert_eq!(store.len(), 400);
    assert_eq!(metrics.snapshot().counter(TRANSACTIONS_SAVED), 400);
    assert_eq!(metrics.snapshot().counter("transactions.by.type.transfer"), 400);
    assert!(store.find_by_id("w7-49").is_some());
}

#[tokio::test]
async fn test_cache_sweeper_drops_expired_entries() {
    let (store, _) = setup_store(StoreConfig {
        cache_ttl: Duration::from_millis(20),
        sweep_interval: Duration::from_millis(10),
        ..StoreConfig::default()
    });
    store.save(transaction("a", TransactionType::Credit, "1"));
    let sweeper = store.spawn_cache_sweeper();

    tokio::time::sleep(Duration::from_millis(200)).await;
    sweeper.abort();

    let stats = store.cache_stats();
    assert_eq!(stats.current_size, 0);
    assert_eq!(stats.evictions, 1);
    assert!(store.find_by_id("a").is_some());
}

#[tokio::test]
async fn test_create_app_shares_one_store() {
    let app = create_app(&Config::default());
    app.store.save(transaction("shared", TransactionType::Credit, "5"));

    assert!(app.import_export.store().find_by_id("shared").is_some());
    assert_eq!(app.metrics.snapshot().counter(TRANSACTIONS_SAVED), 1);
}
