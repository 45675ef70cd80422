mod support;

use std::sync::{Arc, Mutex};

use support::{order_created, Harness, OrderCreated, PaymentFailed, PlaceOrderError};
use tx_outbox::relay::EVENT_ID_HEADER;
use tx_outbox::{
    DomainEvent, EventBus, InMemoryOutboxStore, LogBus, OutboxError, OutboxRecord, OutboxStatus,
    OutboxStore, PayloadCodec, RecordId, TransactionManager, TransactionalEventBus, TypedEvent,
};

// =============================================================================
// Capture
// =============================================================================

#[tokio::test]
async fn committed_event_is_relayed_to_order_topic() {
    let h = Harness::new();
    h.place_order("order-1").unwrap();

    let pending = h.store.find_by_status(OutboxStatus::Pending).unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].event_type, "OrderCreated");
    assert!(h.broker.is_empty());
    assert!(h.delivered().is_empty());

    let mut relay = h.relay();
    let settled = relay.tick().await.unwrap().settle().await;
    assert_eq!(settled.processed, 1);

    let sent = h.broker.messages_for("order-events");
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].key, "order-1");
    let record = h.store.get(pending[0].id).unwrap().unwrap();
    assert_eq!(record.status, OutboxStatus::Processed);
    assert!(record.processed_at.is_some());
}

#[test]
fn rolled_back_transaction_leaves_no_record() {
    let h = Harness::new();
    let result: Result<(), PlaceOrderError> = h.manager.run(|tx| {
        tx.put_row("order-1", "created");
        h.bus.publish(order_created("order-1"))?;
        Err(PlaceOrderError::OutOfStock)
    });

    assert!(matches!(result, Err(PlaceOrderError::OutOfStock)));
    assert!(h.store.is_empty());
    assert!(h.store.row("order-1").is_none());
    assert!(h.delivered().is_empty());
}

#[test]
fn publish_without_transaction_is_delivered_directly() {
    let h = Harness::new();
    h.bus.publish(order_created("order-1")).unwrap();

    assert!(h.store.is_empty());
    assert_eq!(h.delivered(), vec!["OrderCreated"]);
}

#[test]
fn nothing_reaches_the_bus_before_commit() {
    let h = Harness::new();
    let mut tx = h.manager.begin().unwrap();
    tx.scope(|tx| {
        tx.put_row("order-1", "created");
        h.bus.publish(order_created("order-1")).unwrap();
        h.bus
            .publish(
                DomainEvent::from_typed(&PaymentFailed {
                    payment_id: "pay-1".into(),
                    reason: "card declined".into(),
                })
                .unwrap(),
            )
            .unwrap();
    });

    assert!(h.delivered().is_empty());
    assert!(h.store.is_empty());

    tx.commit().unwrap();
    assert!(h.delivered().is_empty());
    assert_eq!(h.store.len(), 2);
    assert_eq!(h.store.row("order-1").as_deref(), Some("created"));
}

#[test]
fn failed_outbox_write_fails_the_business_transaction() {
    let h = Harness::new();
    h.store.fail_saves(true);

    let err = h.place_order("order-1").unwrap_err();
    assert!(matches!(err, OutboxError::Store(_)));
    assert!(h.store.row("order-1").is_none());
    assert!(h.store.is_empty());
}

#[test]
fn transaction_without_outbox_writer_refuses_to_drop_events() {
    let store = Arc::new(InMemoryOutboxStore::new());
    let manager = TransactionManager::new(store.clone());
    let lines = Arc::new(Mutex::new(Vec::new()));
    let bus = TransactionalEventBus::new(LogBus::with_buffer(lines.clone()));

    let err = manager
        .run(|tx| {
            tx.put_row("order-1", "created");
            bus.publish(order_created("order-1"))?;
            Ok::<_, OutboxError>(())
        })
        .unwrap_err();

    assert!(matches!(err, OutboxError::Uncaptured(1)));
    assert!(store.is_empty());
    assert!(store.row("order-1").is_none());
    assert!(lines.lock().unwrap().is_empty());
}

#[tokio::test]
async fn async_business_code_is_captured() {
    let h = Harness::new();
    let bus = &h.bus;
    let mut tx = h.manager.begin().unwrap();
    tx.scope_async(|tx| async move {
        tx.put_row("order-7", "created");
        tokio::task::yield_now().await;
        bus.publish_async(order_created("order-7")).await.unwrap();
    })
    .await;
    assert!(h.store.is_empty());
    tx.commit().unwrap();

    assert_eq!(h.store.len(), 1);
    assert!(h.delivered().is_empty());
}

#[test]
fn events_in_one_transaction_keep_publish_order() {
    let h = Harness::new();
    h.manager
        .run(|_| {
            h.bus.publish_batch(vec![
                DomainEvent::new("order-1", "OrderCreated", "{}"),
                DomainEvent::new("order-1", "OrderConfirmed", "{}"),
                DomainEvent::new("order-1", "OrderShipped", "{}"),
            ])?;
            Ok::<_, OutboxError>(())
        })
        .unwrap();

    let types: Vec<_> = h
        .store
        .find_pending_events(10)
        .unwrap()
        .into_iter()
        .map(|r| r.event_type)
        .collect();
    assert_eq!(types, vec!["OrderCreated", "OrderConfirmed", "OrderShipped"]);
}

// =============================================================================
// Relay
// =============================================================================

#[tokio::test]
async fn failed_delivery_is_terminal_and_passed_by_cursor() {
    let h = Harness::new();
    h.place_order("order-1").unwrap();
    h.broker.fail_when(|m| m.topic == "order-events");

    let mut relay = h.relay();
    let report = relay.tick().await.unwrap();
    let cursor = report.cursor;
    assert_eq!(report.settle().await.failed, 1);

    let record = h.store.all().unwrap().remove(0);
    assert_eq!(record.status, OutboxStatus::Failed);
    assert_eq!(record.retry_count, 1);
    assert_eq!(cursor, Some(record.id));

    h.broker.clear_failures();
    let next = relay.tick().await.unwrap();
    assert_eq!(next.dispatched(), 0);
    assert!(h.broker.is_empty());
}

#[tokio::test]
async fn one_failure_does_not_block_the_batch() {
    let h = Harness::new();
    for i in 0..5 {
        h.place_order(&format!("order-{i}")).unwrap();
    }
    h.broker.fail_when(|m| m.key == "order-2");

    let settled = h.relay().tick().await.unwrap().settle().await;
    assert_eq!(settled.processed, 4);
    assert_eq!(settled.failed, 1);
    assert_eq!(h.broker.len(), 4);
}

#[tokio::test]
async fn batches_of_one_hundred() {
    let h = Harness::new();
    for i in 0..150 {
        h.place_order(&format!("order-{i}")).unwrap();
    }
    let ids: Vec<RecordId> = h.store.all().unwrap().iter().map(|r| r.id).collect();

    let mut relay = h.relay();
    let first = relay.tick().await.unwrap();
    assert_eq!(first.dispatched(), 100);
    assert_eq!(relay.cursor(), Some(ids[99]));
    first.settle().await;

    let second = relay.tick().await.unwrap();
    assert_eq!(second.dispatched(), 50);
    assert_eq!(relay.cursor(), Some(ids[149]));
    second.settle().await;

    assert_eq!(h.store.find_by_status(OutboxStatus::Processed).unwrap().len(), 150);
    assert_eq!(h.broker.len(), 150);
}

#[tokio::test]
async fn cursor_never_moves_backwards() {
    let h = Harness::new();
    let mut relay = h.relay();
    let mut last = relay.cursor();

    for round in 0..5 {
        for i in 0..round {
            h.place_order(&format!("order-{round}-{i}")).unwrap();
        }
        let report = relay.tick().await.unwrap();
        assert!(report.cursor >= last);
        last = report.cursor;
        report.settle().await;
    }

    let idle = relay.tick().await.unwrap();
    assert_eq!(idle.cursor, last);
}

#[tokio::test]
async fn restarted_relay_resumes_after_processed_records() {
    let h = Harness::new();
    h.place_order("order-1").unwrap();
    h.relay().tick().await.unwrap().settle().await;

    h.place_order("order-2").unwrap();
    let mut restarted = h.relay();
    let settled = restarted.tick().await.unwrap().settle().await;

    assert_eq!(settled.processed, 1);
    let keys: Vec<_> = h.broker.messages().into_iter().map(|m| m.key).collect();
    assert_eq!(keys, vec!["order-1", "order-2"]);
}

#[tokio::test]
async fn headers_identify_the_event_and_ledger_row() {
    let h = Harness::new();
    let event = order_created("order-1");
    let event_id = event.event_id();
    h.manager
        .run(|_| {
            h.bus.publish(event)?;
            Ok::<_, OutboxError>(())
        })
        .unwrap();

    h.relay().tick().await.unwrap().settle().await;

    let message = h.broker.messages().remove(0);
    let record = h.store.all().unwrap().remove(0);
    assert_eq!(message.header(EVENT_ID_HEADER), Some(event_id.to_string().as_str()));
    assert_eq!(message.header("eventType"), Some("OrderCreated"));
    assert_eq!(message.header("aggregateId"), Some("order-1"));
    assert_eq!(message.header("outboxId"), Some(record.id.to_string().as_str()));
    assert_eq!(message.payload, record.serialized_payload);
}

// =============================================================================
// Ledger contract
// =============================================================================

#[test]
fn repeated_processed_update_is_idempotent() {
    let h = Harness::new();
    h.place_order("order-1").unwrap();
    let id = h.store.all().unwrap()[0].id;

    h.store.update_status(id, OutboxStatus::Processed).unwrap();
    let once = h.store.get(id).unwrap().unwrap();
    h.store.update_status(id, OutboxStatus::Processed).unwrap();
    let twice = h.store.get(id).unwrap().unwrap();

    assert_eq!(once, twice);
}

#[test]
fn stored_payload_round_trips_with_either_codec() {
    for codec in [PayloadCodec::Json, PayloadCodec::Compact] {
        let h = Harness::with_codec(codec);
        let event = order_created("order-9").with_correlation_id("req-1");
        let original = event.clone();
        h.manager
            .run(|_| {
                h.bus.publish(event)?;
                Ok::<_, OutboxError>(())
            })
            .unwrap();

        let record: OutboxRecord = h.store.all().unwrap().remove(0);
        let decoded = codec.decode(&record).unwrap();

        assert_eq!(decoded, original);
        assert_eq!(decoded.aggregate_id(), "order-9");
        assert_eq!(decoded.event_type(), OrderCreated::EVENT_TYPE);
        assert_eq!(decoded.payload(), original.payload());
        assert_eq!(decoded.correlation_id(), Some("req-1"));
        assert_eq!(decoded.decode::<OrderCreated>().unwrap().total_cents, 4200);
    }
}
