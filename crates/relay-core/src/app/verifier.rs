//! IdleMessageVerifier - 止まったメッセージの検出と再配送
//!
//! # フロー（1 回の sweep）
//! 1. running-task の hash-map を一括で読む（スナップショット）
//! 2. 各エントリをデコードして `(channel, content)` を取り出す
//! 3. Block-Code Lock と Encoded-State Marker の存在を確認
//! 4. どちらも無ければ（Abandoned）元の channel にそのまま送り直す
//!
//! verifier は ledger を一切書き換えない。読み取りと再送だけなので、
//! listener の書き込みと並行に走らせても安全。同じ状態で 2 回 sweep すれば
//! 2 回再送する（at-least-once であって exactly-once ではない）。
//!
//! # 失敗時の扱い
//! - hash-map の読み込み失敗: sweep 全体を中断して Err（次回の sweep で再試行）
//! - エントリのデコード失敗: warn を出してそのエントリだけスキップ
//! - 個別の存在確認・再送の失敗: ログを出して次のエントリへ

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::domain::entry::{ParsedEntry, RunningTaskRecord};
use crate::domain::errors::RelayError;
use crate::domain::keys::LedgerKeys;
use crate::domain::state::MessageState;
use crate::ports::{Ledger, Transport};

/// Counters for one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub scanned: usize,
    pub republished: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub malformed: usize,
    /// Entries whose lookup or republish failed; retried next sweep.
    pub failed: usize,
}

pub struct IdleMessageVerifier {
    ledger: Arc<dyn Ledger>,
    transport: Arc<dyn Transport>,
    keys: LedgerKeys,
}

impl IdleMessageVerifier {
    pub fn new(ledger: Arc<dyn Ledger>, transport: Arc<dyn Transport>, keys: LedgerKeys) -> Self {
        Self {
            ledger,
            transport,
            keys,
        }
    }

    pub fn keys(&self) -> &LedgerKeys {
        &self.keys
    }

    pub async fn sweep(&self) -> Result<SweepReport, RelayError> {
        let running = self
            .ledger
            .hash_get_all(self.keys.running_tasks_key())
            .await?;

        let mut report = SweepReport {
            scanned: running.len(),
            ..SweepReport::default()
        };

        for (key, raw) in &running {
            let record = match ParsedEntry::parse(key, raw) {
                ParsedEntry::Parsed(record) => record,
                ParsedEntry::Malformed { key, error } => {
                    warn!(key = %key, error = %error, "skipping malformed running-task entry");
                    report.malformed += 1;
                    continue;
                }
            };

            match self.reconcile(&record).await {
                Ok(MessageState::Abandoned) => report.republished += 1,
                Ok(MessageState::Running) => report.in_progress += 1,
                Ok(MessageState::Completed) => report.completed += 1,
                Ok(MessageState::Unknown) => {}
                Err(e) => {
                    warn!(
                        channel = %record.channel,
                        error = %e,
                        "could not reconcile running task, will retry next sweep"
                    );
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }

    /// Classify one record and republish it when abandoned.
    async fn reconcile(&self, record: &RunningTaskRecord) -> Result<MessageState, RelayError> {
        let block = self.keys.block_code(&record.channel, &record.content);
        let state = self.keys.encoded_state(&record.channel, &record.content);

        let block_exists = self.ledger.exists(&block).await?;
        let state_exists = self.ledger.exists(&state).await?;
        let verdict = MessageState::classify(true, block_exists, state_exists);

        if verdict.needs_republish() {
            let delivered = self.transport.send(record.to_message()).await?;
            info!(
                channel = %record.channel,
                attempts = record.attempts,
                delivered,
                "retrying idle message"
            );
        } else {
            debug!(channel = %record.channel, state = ?verdict, "running task not idle");
        }

        Ok(verdict)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::message::Message;
    use crate::impls::{InMemoryLedger, InMemoryTransport};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

    /// Counts WARN events seen while installed.
    #[derive(Clone, Default)]
    struct WarnCounter(Arc<AtomicUsize>);

    impl WarnCounter {
        fn count(&self) -> usize {
            self.0.load(Ordering::SeqCst)
        }
    }

    impl<S: tracing::Subscriber> Layer<S> for WarnCounter {
        fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
            if *event.metadata().level() == tracing::Level::WARN {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    struct Fixture {
        ledger: Arc<InMemoryLedger>,
        transport: Arc<InMemoryTransport>,
        verifier: IdleMessageVerifier,
        keys: LedgerKeys,
    }

    fn fixture() -> Fixture {
        let ledger = Arc::new(InMemoryLedger::new());
        let transport = Arc::new(InMemoryTransport::new());
        let keys = LedgerKeys::default();
        let verifier = IdleMessageVerifier::new(ledger.clone(), transport.clone(), keys.clone());
        Fixture {
            ledger,
            transport,
            verifier,
            keys,
        }
    }

    impl Fixture {
        async fn insert_running(&self, channel: &str, content: serde_json::Value) {
            let raw = serde_json::to_string(&RunningTaskRecord::new(channel, content.clone()))
                .unwrap();
            self.ledger
                .hash_set(
                    self.keys.running_tasks_key(),
                    &self.keys.task_key(channel, &content),
                    &raw,
                )
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn abandoned_record_is_republished_once() {
        let f = fixture();
        f.insert_running("C", json!("X")).await;
        let mut sub = f.transport.subscribe("C");

        let report = f.verifier.sweep().await.unwrap();

        assert_eq!(report.republished, 1);
        assert_eq!(f.transport.sent(), vec![Message::new("C", json!("X"))]);
        assert_eq!(sub.try_recv(), Some(Message::new("C", json!("X"))));
        assert_eq!(sub.try_recv(), None);
    }

    #[tokio::test]
    async fn held_lock_suppresses_republish() {
        let f = fixture();
        f.insert_running("C", json!("X")).await;
        f.ledger
            .set(&f.keys.block_code("C", &json!("X")), "1", None)
            .await
            .unwrap();

        let report = f.verifier.sweep().await.unwrap();

        assert_eq!(report.in_progress, 1);
        assert_eq!(report.republished, 0);
        assert!(f.transport.sent().is_empty());
    }

    #[tokio::test]
    async fn completion_marker_suppresses_republish() {
        let f = fixture();
        f.insert_running("C", json!("X")).await;
        f.ledger
            .set(&f.keys.encoded_state("C", &json!("X")), "done", None)
            .await
            .unwrap();

        let report = f.verifier.sweep().await.unwrap();

        assert_eq!(report.completed, 1);
        assert!(f.transport.sent().is_empty());
        // stale records are left for the listener side to prune
        let running = f.ledger.hash_get_all(f.keys.running_tasks_key()).await.unwrap();
        assert_eq!(running.len(), 1);
    }

    #[tokio::test]
    async fn repeated_sweeps_republish_each_time() {
        let f = fixture();
        f.insert_running("C", json!("X")).await;

        f.verifier.sweep().await.unwrap();
        f.verifier.sweep().await.unwrap();

        assert_eq!(f.transport.sent().len(), 2);
    }

    #[tokio::test]
    async fn malformed_entry_is_skipped_with_one_warning() {
        let warnings = WarnCounter::default();
        let _subscriber = tracing::subscriber::set_default(
            tracing_subscriber::registry().with(warnings.clone()),
        );
        let f = fixture();
        f.insert_running("C", json!("X")).await;
        f.ledger
            .hash_set(f.keys.running_tasks_key(), "garbage", "{not json")
            .await
            .unwrap();

        let report = f.verifier.sweep().await.unwrap();

        assert_eq!(report.scanned, 2);
        assert_eq!(report.republished, 1);
        assert_eq!(report.malformed, 1);
        assert_eq!(f.transport.sent(), vec![Message::new("C", json!("X"))]);
        assert_eq!(warnings.count(), 1);
    }

    #[tokio::test]
    async fn empty_ledger_is_a_quiet_sweep() {
        let f = fixture();

        let report = f.verifier.sweep().await.unwrap();

        assert_eq!(report, SweepReport::default());
        assert!(f.transport.sent().is_empty());
    }

    #[tokio::test]
    async fn ledger_read_failure_aborts_sweep() {
        let f = fixture();
        f.insert_running("C", json!("X")).await;
        f.ledger.fail_reads(true);

        let err = f.verifier.sweep().await.unwrap_err();
        assert!(matches!(err, RelayError::Ledger(_)));
        assert!(f.transport.sent().is_empty());

        f.ledger.fail_reads(false);
        let report = f.verifier.sweep().await.unwrap();
        assert_eq!(report.republished, 1);
    }

    #[tokio::test]
    async fn republish_failure_leaves_record_untouched() {
        let f = fixture();
        f.insert_running("C", json!("X")).await;
        f.transport.fail_sends(true);

        let report = f.verifier.sweep().await.unwrap();

        assert_eq!(report.failed, 1);
        assert_eq!(report.republished, 0);
        let running = f.ledger.hash_get_all(f.keys.running_tasks_key()).await.unwrap();
        assert_eq!(running.len(), 1);

        f.transport.fail_sends(false);
        assert_eq!(f.verifier.sweep().await.unwrap().republished, 1);
    }

    #[tokio::test]
    async fn republish_targets_each_stored_channel() {
        let f = fixture();
        f.insert_running("project-topic/delete", json!("p-1")).await;
        f.insert_running("index-routing-topic/close", json!("r-1")).await;
        f.ledger
            .set(
                &f.keys.block_code("index-routing-topic/close", &json!("r-1")),
                "1",
                None,
            )
            .await
            .unwrap();

        let report = f.verifier.sweep().await.unwrap();

        assert_eq!(report.republished, 1);
        assert_eq!(report.in_progress, 1);
        assert_eq!(f.transport.sent_to("project-topic/delete").len(), 1);
        assert!(f.transport.sent_to("index-routing-topic/close").is_empty());
    }
}
