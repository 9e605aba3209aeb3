//! Listener - 受信メッセージの処理と ledger への進捗記録
//!
//! verifier が正しく判定できるかどうかは、ここでの書き込み順序に依存する。
//!
//! # フロー（1 メッセージ）
//! 1. Block-Code Lock を `set_nx` で取得（TTL = staleness interval）
//!    - 値は取得ごとの ULID トークン。解放は `del_if_eq` で自分のトークンの時だけ
//!    - 取れなければ他の listener が処理中なのでスキップ
//! 2. Encoded-State Marker があれば重複配送。lock と record を片付けて終了
//! 3. lock を持った状態で running-task record を書く（attempts + 1）
//!    - record より先に lock が見えるので、verifier が処理中のものを
//!      abandoned と誤判定することはない
//! 4. handler 実行
//!    - 成功: marker を書く → record 削除 → lock 削除
//!    - 失敗: lock だけ削除。record は残るので verifier が再配送する
//!
//! `max_attempts` を設定した場合、上限を超えたメッセージは handler に渡さず
//! `"<channel>/dead-letter"` に送って record を消す。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use ulid::Ulid;

use crate::domain::entry::{ParsedEntry, RunningTaskRecord};
use crate::domain::errors::RelayError;
use crate::domain::keys::LedgerKeys;
use crate::domain::message::Message;
use crate::ports::{Ledger, Subscription, Transport};

const DEAD_LETTER_SUFFIX: &str = "dead-letter";

/// Business logic run for each delivered message.
///
/// Deliveries are at-least-once, so implementations must be idempotent.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, message: &Message) -> Result<(), RelayError>;
}

/// What happened to one delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Completed,
    /// Handler failed; the record stays so the verifier retries it.
    Failed(String),
    /// Another listener holds the lock.
    Busy,
    /// Already completed earlier; handler not run again.
    Duplicate,
    DeadLettered,
}

#[derive(Debug, Clone)]
pub struct ListenerSettings {
    pub keys: LedgerKeys,
    pub lock_ttl: Duration,
    pub marker_ttl: Duration,
    pub max_attempts: Option<u32>,
}

pub struct MessageListener {
    ledger: Arc<dyn Ledger>,
    transport: Arc<dyn Transport>,
    handler: Arc<dyn MessageHandler>,
    settings: ListenerSettings,
}

impl MessageListener {
    pub fn new(
        ledger: Arc<dyn Ledger>,
        transport: Arc<dyn Transport>,
        handler: Arc<dyn MessageHandler>,
        settings: ListenerSettings,
    ) -> Self {
        Self {
            ledger,
            transport,
            handler,
            settings,
        }
    }

    pub fn dead_letter_topic(channel: &str) -> String {
        format!("{channel}/{DEAD_LETTER_SUFFIX}")
    }

    /// Process one message and record progress in the ledger.
    ///
    /// Ledger errors abort processing. Whatever lock was taken expires after
    /// `lock_ttl`, after which the verifier sees the message as abandoned.
    pub async fn process(&self, message: &Message) -> Result<Delivery, RelayError> {
        let keys = &self.settings.keys;
        let channel = message.channel();
        let content = message.content();
        let block = keys.block_code(channel, content);
        let state = keys.encoded_state(channel, content);
        let task = keys.task_key(channel, content);
        let running = keys.running_tasks_key();

        let token = Ulid::new().to_string();
        if !self
            .ledger
            .set_nx(&block, &token, Some(self.settings.lock_ttl))
            .await?
        {
            debug!(channel, key = %block, "message is being processed elsewhere");
            return Ok(Delivery::Busy);
        }

        if self.ledger.exists(&state).await? {
            self.ledger.hash_del(running, &task).await?;
            self.release(channel, &block, &token).await?;
            debug!(channel, "duplicate delivery of a completed message");
            return Ok(Delivery::Duplicate);
        }

        let attempts = self.previous_attempts(running, &task).await? + 1;
        if let Some(max) = self.settings.max_attempts
            && attempts > max
        {
            let dead = Message::new(Self::dead_letter_topic(channel), content.clone());
            self.transport.send(dead).await?;
            self.ledger.hash_del(running, &task).await?;
            self.release(channel, &block, &token).await?;
            error!(channel, attempts, max, "giving up on message, sent to dead-letter");
            return Ok(Delivery::DeadLettered);
        }

        let mut record = RunningTaskRecord::from_message(message);
        record.attempts = attempts;
        let encoded = serde_json::to_string(&record)?;
        self.ledger.hash_set(running, &task, &encoded).await?;

        match self.handler.handle(message).await {
            Ok(()) => {
                let completed_at = Utc::now().to_rfc3339();
                self.ledger
                    .set(&state, &completed_at, Some(self.settings.marker_ttl))
                    .await?;
                self.ledger.hash_del(running, &task).await?;
                self.release(channel, &block, &token).await?;
                debug!(channel, attempts, "message processed");
                Ok(Delivery::Completed)
            }
            Err(e) => {
                self.release(channel, &block, &token).await?;
                warn!(channel, attempts, error = %e, "handler failed, left for retry");
                Ok(Delivery::Failed(e.to_string()))
            }
        }
    }

    /// Drop the lock only if it is still ours. After an overrun past
    /// `lock_ttl` it may belong to the listener handling the retry.
    async fn release(&self, channel: &str, block: &str, token: &str) -> Result<(), RelayError> {
        if !self.ledger.del_if_eq(block, token).await? {
            warn!(channel, key = block, "lock expired before release, left to its new owner");
        }
        Ok(())
    }

    async fn previous_attempts(&self, running: &str, task: &str) -> Result<u32, RelayError> {
        let Some(raw) = self.ledger.hash_get(running, task).await? else {
            return Ok(0);
        };
        match ParsedEntry::parse(task, &raw) {
            ParsedEntry::Parsed(record) => Ok(record.attempts),
            ParsedEntry::Malformed { error, .. } => {
                warn!(key = task, error = %error, "overwriting malformed running-task record");
                Ok(0)
            }
        }
    }

    /// Receive loop for one subscription.
    ///
    /// Stops when shutdown is requested or the transport closes the
    /// subscription. In-flight processing is never cancelled.
    pub async fn run(&self, mut subscription: Subscription, mut shutdown: watch::Receiver<bool>) {
        info!(topic = subscription.topic(), "listener started");
        loop {
            if *shutdown.borrow() {
                break;
            }

            let message = tokio::select! {
                changed = shutdown.changed() => {
                    // sender dropped counts as shutdown
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                message = subscription.recv() => message,
            };

            let Some(message) = message else {
                break;
            };

            if let Err(e) = self.process(&message).await {
                error!(channel = message.channel(), error = %e, "failed to record message progress");
            }
        }
        info!(topic = subscription.topic(), "listener stopped");
    }
}

/// Listener tasks, one per subscription.
/// - `shutdown_and_join()` で全タスクの終了を待てる
pub struct ListenerGroup {
    shutdown_tx: watch::Sender<bool>,
    joins: Vec<JoinHandle<()>>,
}

impl ListenerGroup {
    pub fn spawn(listener: Arc<MessageListener>, subscriptions: Vec<Subscription>) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let joins = subscriptions
            .into_iter()
            .map(|subscription| {
                let listener = Arc::clone(&listener);
                let rx = shutdown_rx.clone();
                tokio::spawn(async move { listener.run(subscription, rx).await })
            })
            .collect();

        Self { shutdown_tx, joins }
    }

    pub fn request_shutdown(&self) {
        // receivers may already be gone
        let _ = self.shutdown_tx.send(true);
    }

    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        for join in self.joins {
            let _ = join.await;
        }
    }
}
