//! InMemoryTransport - 開発・テスト用の pub/sub
//!
//! # 実装詳細
//! - topic ごとに購読者（mpsc::UnboundedSender）のリストを持つ
//! - send は受け渡しまで同期的。購読者側の処理は待たない
//! - 受信側が drop された購読者は send 時に掃除する
//! - 送ったメッセージはすべて `sent()` に記録（テスト・CLI レポート用）

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::trace;

use crate::domain::errors::RelayError;
use crate::domain::message::Message;
use crate::ports::{Subscription, Transport};

#[derive(Default)]
struct TransportState {
    subscribers: HashMap<String, Vec<mpsc::UnboundedSender<Message>>>,
    sent: Vec<Message>,
}

#[derive(Default)]
pub struct InMemoryTransport {
    state: Mutex<TransportState>,
    fail_sends: AtomicBool,
}

impl InMemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, topic: &str) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock()
            .subscribers
            .entry(topic.to_string())
            .or_default()
            .push(tx);
        Subscription::new(topic, rx)
    }

    /// Every message this transport accepted, in send order.
    pub fn sent(&self) -> Vec<Message> {
        self.lock().sent.clone()
    }

    /// Messages accepted for one topic.
    pub fn sent_to(&self, topic: &str) -> Vec<Message> {
        self.lock()
            .sent
            .iter()
            .filter(|m| m.channel() == topic)
            .cloned()
            .collect()
    }

    /// Make every send fail until switched off again.
    pub fn fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    // no await happens while the guard is held
    fn lock(&self) -> MutexGuard<'_, TransportState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl Transport for InMemoryTransport {
    async fn send(&self, message: Message) -> Result<usize, RelayError> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(RelayError::Transport(format!(
                "bus unavailable, dropped message for {}",
                message.channel()
            )));
        }

        let mut state = self.lock();
        let mut delivered = 0;
        if let Some(subscribers) = state.subscribers.get_mut(message.channel()) {
            subscribers.retain(|tx| {
                let ok = tx.send(message.clone()).is_ok();
                delivered += usize::from(ok);
                ok
            });
        }
        trace!(channel = message.channel(), delivered, "message transported");
        state.sent.push(message);
        Ok(delivered)
    }
}
