use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::EnvFilter;
use tx_outbox::{
    DistributedLock, DomainEvent, EventBus, InMemoryBroker, InMemoryLock, InMemoryOutboxStore,
    LogBus, OutboxConfig, OutboxError, OutboxStatus, PayloadCodec, RelayHandle, RelayProcessor,
    TopicRouter, TransactionManager, TransactionalEventBus,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn commit_events(store: &Arc<InMemoryOutboxStore>, event_types: &[&str]) {
    let manager = TransactionManager::with_outbox(store.clone(), PayloadCodec::Json);
    let bus = TransactionalEventBus::new(LogBus::new());
    manager
        .run(|_| {
            for (i, event_type) in event_types.iter().enumerate() {
                bus.publish(DomainEvent::new(format!("agg-{i}"), *event_type, "{}"))?;
            }
            Ok::<_, OutboxError>(())
        })
        .unwrap();
}

async fn wait_until(mut done: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
    while !done() {
        assert!(tokio::time::Instant::now() < deadline, "condition not reached in time");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

// =============================================================================
// Lock gating
// =============================================================================

#[tokio::test]
async fn only_the_lock_holder_dispatches() {
    init_tracing();
    let store = Arc::new(InMemoryOutboxStore::new());
    let broker = Arc::new(InMemoryBroker::new());
    commit_events(&store, &["OrderCreated", "PaymentSucceeded"]);

    let lock_a = InMemoryLock::new();
    let lock_b = lock_a.replica();
    let ttl = Duration::from_secs(30);

    let mut a = RelayProcessor::new(store.clone(), broker.clone(), TopicRouter::default())
        .unwrap()
        .with_lock(Arc::new(lock_a.clone()), "outbox-relay", ttl);
    let mut b = RelayProcessor::new(store.clone(), broker.clone(), TopicRouter::default())
        .unwrap()
        .with_lock(Arc::new(lock_b.clone()), "outbox-relay", ttl);

    // Replica A is mid-tick elsewhere: hold its lease.
    assert!(lock_a.acquire("outbox-relay", ttl).unwrap());
    let skipped = b.tick().await.unwrap();
    assert!(skipped.skipped);
    assert_eq!(b.cursor(), None);

    let report = a.tick().await.unwrap();
    assert_eq!(report.dispatched(), 2);
    report.settle().await;

    // A stays the active relay until it lets go.
    assert!(b.tick().await.unwrap().skipped);
    a.release_lock();

    // B now gets the lease but everything is already processed.
    let after = b.tick().await.unwrap();
    assert!(!after.skipped);
    assert_eq!(after.dispatched(), 0);
    assert_eq!(broker.len(), 2);
}

#[tokio::test]
async fn standby_replica_does_not_resend_in_flight_records() {
    init_tracing();
    let store = Arc::new(InMemoryOutboxStore::new());
    let broker = Arc::new(InMemoryBroker::new());
    broker.set_latency(Some(Duration::from_millis(100)));
    commit_events(&store, &["OrderCreated"]);

    let lock = InMemoryLock::new();
    let ttl = Duration::from_secs(30);
    let mut a = RelayProcessor::new(store.clone(), broker.clone(), TopicRouter::default())
        .unwrap()
        .with_lock(Arc::new(lock.clone()), "outbox-relay", ttl);
    let mut b = RelayProcessor::new(store.clone(), broker.clone(), TopicRouter::default())
        .unwrap()
        .with_lock(Arc::new(lock.replica()), "outbox-relay", ttl);

    let in_flight = a.tick().await.unwrap();
    assert_eq!(in_flight.dispatched(), 1);

    let standby = b.tick().await.unwrap();
    assert!(standby.skipped);
    assert_eq!(standby.dispatched(), 0);

    assert_eq!(in_flight.settle().await.processed, 1);
    assert_eq!(broker.len(), 1);
}

#[tokio::test]
async fn expired_lease_lets_another_replica_take_over() {
    let store = Arc::new(InMemoryOutboxStore::new());
    let broker = Arc::new(InMemoryBroker::new());
    commit_events(&store, &["InventoryReserved"]);

    let crashed = InMemoryLock::new();
    let survivor = crashed.replica();
    assert!(crashed.acquire("outbox-relay", Duration::from_millis(20)).unwrap());

    let mut relay = RelayProcessor::new(store.clone(), broker.clone(), TopicRouter::default())
        .unwrap()
        .with_lock(Arc::new(survivor), "outbox-relay", Duration::from_secs(30));

    assert!(relay.tick().await.unwrap().skipped);
    tokio::time::sleep(Duration::from_millis(40)).await;

    let settled = relay.tick().await.unwrap().settle().await;
    assert_eq!(settled.processed, 1);
    assert_eq!(broker.messages_for("inventory-events").len(), 1);
}

// =============================================================================
// Runner
// =============================================================================

#[tokio::test]
async fn runner_recovers_after_store_outage() {
    init_tracing();
    let store = Arc::new(InMemoryOutboxStore::new());
    let broker = Arc::new(InMemoryBroker::new());
    let relay =
        RelayProcessor::new(store.clone(), broker.clone(), TopicRouter::default()).unwrap();

    store.fail_queries(true);
    commit_events(&store, &["OrderCreated"]);
    let handle = RelayHandle::spawn(relay, Duration::from_millis(5));

    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(broker.is_empty());

    store.fail_queries(false);
    wait_until(|| broker.len() == 1).await;
    wait_until(|| {
        store
            .find_by_status(OutboxStatus::Processed)
            .map(|r| r.len() == 1)
            .unwrap_or(false)
    })
    .await;

    let stats = handle.stop().await;
    assert!(stats.failed_ticks >= 1);
    assert_eq!(stats.dispatched, 1);
}

#[tokio::test]
async fn configured_runner_uses_configured_routing() {
    let store = Arc::new(InMemoryOutboxStore::new());
    let broker = Arc::new(InMemoryBroker::new());
    let config = OutboxConfig::from_json_str(
        r#"{
            "relay": { "polling_interval_ms": 5, "batch_size": 1 },
            "routing": { "default_topic": "misc", "explicit": { "UserSignedUp": "users" } }
        }"#,
    )
    .unwrap();
    commit_events(&store, &["UserSignedUp", "ReportGenerated", "OrderCreated"]);

    let lock: Arc<dyn DistributedLock> = Arc::new(InMemoryLock::new());
    let relay = RelayProcessor::from_config(store.clone(), broker.clone(), &config, Some(lock))
        .unwrap();
    let handle = RelayHandle::from_config(relay, &config).unwrap();

    wait_until(|| broker.len() == 3).await;
    let stats = handle.stop().await;

    assert!(stats.ticks >= 3);
    assert_eq!(broker.messages_for("users").len(), 1);
    assert_eq!(broker.messages_for("misc").len(), 1);
    assert_eq!(broker.messages_for("order-events").len(), 1);
}

#[tokio::test]
async fn stop_does_not_wait_for_slow_acks() {
    let store = Arc::new(InMemoryOutboxStore::new());
    let broker = Arc::new(InMemoryBroker::new());
    broker.set_latency(Some(Duration::from_millis(100)));
    commit_events(&store, &["OrderCreated"]);

    let relay =
        RelayProcessor::new(store.clone(), broker.clone(), TopicRouter::default()).unwrap();
    let handle = RelayHandle::spawn(relay, Duration::from_secs(60));
    tokio::time::sleep(Duration::from_millis(10)).await;

    let stats = handle.stop().await;
    assert_eq!(stats.dispatched, 1);
    assert!(broker.is_empty());

    wait_until(|| broker.len() == 1).await;
    wait_until(|| store.find_by_status(OutboxStatus::Pending).map(|r| r.is_empty()).unwrap_or(false))
        .await;
}
