use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use serde_json::json;

use relay_core::app::{Delivery, MessageHandler, SweepGuard, Tick};
use relay_core::domain::{Message, ProjectId, RelayError};
use relay_core::impls::{InMemoryLedger, InMemoryTransport};
use relay_core::ports::{FixedClock, Ledger, Transport};
use relay_core::{RelayBuilder, RelayConfig};

/// Fails the first `failures` deliveries.
struct FlakyDelete {
    failures: AtomicU32,
    deleted: AtomicU32,
}

#[async_trait]
impl MessageHandler for FlakyDelete {
    async fn handle(&self, _message: &Message) -> Result<(), RelayError> {
        if self.failures.load(Ordering::SeqCst) > 0 {
            self.failures.fetch_sub(1, Ordering::SeqCst);
            return Err(RelayError::Handler("index cluster unavailable".to_string()));
        }
        self.deleted.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test]
async fn failed_delivery_is_recovered_by_the_verifier() {
    let ledger = Arc::new(InMemoryLedger::new());
    let transport = Arc::new(InMemoryTransport::new());
    let relay = RelayBuilder::new(RelayConfig::default())
        .ledger(ledger.clone())
        .transport(transport.clone())
        .build()
        .unwrap();

    let handler = Arc::new(FlakyDelete {
        failures: AtomicU32::new(1),
        deleted: AtomicU32::new(0),
    });
    let listener = relay.listener(handler.clone());
    let mut inbox = transport.subscribe("project-topic/delete");
    let scheduler = relay.scheduler(SweepGuard::new());

    relay.project_publisher().delete(ProjectId::new()).await.unwrap();

    // first delivery fails and leaves the message abandoned
    let first = inbox.try_recv().unwrap();
    assert!(matches!(listener.process(&first).await.unwrap(), Delivery::Failed(_)));

    // the sweep puts it back on the bus
    let Tick::Swept(report) = scheduler.run_once().await else {
        panic!("sweep should run");
    };
    assert_eq!(report.republished, 1);

    let retried = inbox.try_recv().unwrap();
    assert_eq!(retried, first);
    assert_eq!(listener.process(&retried).await.unwrap(), Delivery::Completed);
    assert_eq!(handler.deleted.load(Ordering::SeqCst), 1);

    // nothing left to recover
    let Tick::Swept(report) = scheduler.run_once().await else {
        panic!("sweep should run");
    };
    assert_eq!(report.scanned, 0);
    assert!(inbox.try_recv().is_none());
}

#[tokio::test]
async fn crashed_listener_is_retried_once_its_lock_expires() {
    let clock = FixedClock::new(Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap());
    let ledger = Arc::new(InMemoryLedger::with_clock(clock.clone()));
    let transport = Arc::new(InMemoryTransport::new());
    let relay = RelayBuilder::new(RelayConfig::default())
        .ledger(ledger.clone())
        .transport(transport.clone())
        .build()
        .unwrap();
    let keys = relay.keys().clone();
    let verifier = relay.verifier();

    // a listener took the lock, wrote its record, then died
    let message = Message::new("index-routing-topic/close", json!("route-1"));
    let lock_ttl = relay.config().staleness_interval();
    ledger
        .set_nx(
            &keys.block_code(message.channel(), message.content()),
            "1",
            Some(lock_ttl),
        )
        .await
        .unwrap();
    ledger
        .hash_set(
            keys.running_tasks_key(),
            &keys.task_key(message.channel(), message.content()),
            r#"{"channel":"index-routing-topic/close","content":"route-1","attempts":1}"#,
        )
        .await
        .unwrap();

    let report = verifier.sweep().await.unwrap();
    assert_eq!(report.in_progress, 1);
    assert!(transport.sent().is_empty());

    clock.advance(chrono::Duration::from_std(lock_ttl).unwrap());

    let report = verifier.sweep().await.unwrap();
    assert_eq!(report.republished, 1);
    assert_eq!(transport.sent(), vec![message]);
}

#[tokio::test]
async fn dead_letter_bound_stops_endless_retries() {
    let ledger = Arc::new(InMemoryLedger::new());
    let transport = Arc::new(InMemoryTransport::new());
    let config = RelayConfig {
        max_attempts: Some(2),
        ..RelayConfig::default()
    };
    let relay = RelayBuilder::new(config)
        .ledger(ledger.clone())
        .transport(transport.clone())
        .build()
        .unwrap();
    let handler = Arc::new(FlakyDelete {
        failures: AtomicU32::new(u32::MAX),
        deleted: AtomicU32::new(0),
    });
    let listener = relay.listener(handler);
    let verifier = relay.verifier();
    let mut inbox = transport.subscribe("project-topic/close-and-delete");

    relay
        .project_publisher()
        .close_and_delete(ProjectId::new())
        .await
        .unwrap();

    let mut outcomes = Vec::new();
    for _ in 0..5 {
        let Some(message) = inbox.try_recv() else {
            break;
        };
        outcomes.push(listener.process(&message).await.unwrap());
        verifier.sweep().await.unwrap();
    }

    assert!(matches!(outcomes[0], Delivery::Failed(_)));
    assert!(matches!(outcomes[1], Delivery::Failed(_)));
    assert_eq!(outcomes[2], Delivery::DeadLettered);
    assert_eq!(outcomes.len(), 3);
    assert_eq!(
        transport
            .sent_to("project-topic/close-and-delete/dead-letter")
            .len(),
        1
    );
    assert!(
        ledger
            .hash_get_all(relay.keys().running_tasks_key())
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn spawned_listeners_and_scheduler_shut_down_cleanly() {
    let ledger = Arc::new(InMemoryLedger::new());
    let transport = Arc::new(InMemoryTransport::new());
    let config = RelayConfig {
        staleness_interval_secs: 1,
        ..RelayConfig::default()
    };
    let relay = RelayBuilder::new(config)
        .ledger(ledger.clone())
        .transport(transport.clone())
        .build()
        .unwrap();
    let handler = Arc::new(FlakyDelete {
        failures: AtomicU32::new(1),
        deleted: AtomicU32::new(0),
    });
    let listener = Arc::new(relay.listener(handler.clone()));
    let listeners = relay_core::app::ListenerGroup::spawn(
        listener,
        vec![transport.subscribe("project-topic/delete")],
    );
    let scheduler = relay.scheduler(SweepGuard::new()).spawn();

    transport
        .send(Message::new("project-topic/delete", json!("p-9")))
        .await
        .unwrap();

    for _ in 0..50 {
        if handler.deleted.load(Ordering::SeqCst) == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    scheduler.shutdown_and_join().await;
    listeners.shutdown_and_join().await;
    assert_eq!(handler.deleted.load(Ordering::SeqCst), 1);
}
