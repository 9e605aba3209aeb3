//! InMemoryLedger - 開発・テスト用の ledger
//!
//! # 実装詳細
//! - 文字列キーと hash キーを別々の HashMap で管理
//! - TTL はアクセス時に Clock と比較して遅延削除
//! - `fail_reads(true)` で読み込み障害（Redis タイムアウト相当）を再現できる

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::domain::errors::RelayError;
use crate::ports::{Clock, Ledger, SystemClock};

struct Entry {
    value: String,
    expires_at: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct LedgerState {
    strings: HashMap<String, Entry>,
    hashes: HashMap<String, HashMap<String, String>>,
}

impl LedgerState {
    /// Drop `key` if its TTL has passed, then report whether it is live.
    fn live(&mut self, key: &str, now: DateTime<Utc>) -> Option<&Entry> {
        let expired = self
            .strings
            .get(key)
            .and_then(|e| e.expires_at)
            .is_some_and(|at| at <= now);
        if expired {
            self.strings.remove(key);
        }
        self.strings.get(key)
    }
}

pub struct InMemoryLedger<C = SystemClock> {
    state: Mutex<LedgerState>,
    clock: C,
    fail_reads: AtomicBool,
}

impl InMemoryLedger<SystemClock> {
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }
}

impl Default for InMemoryLedger<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> InMemoryLedger<C> {
    pub fn with_clock(clock: C) -> Self {
        Self {
            state: Mutex::new(LedgerState::default()),
            clock,
            fail_reads: AtomicBool::new(false),
        }
    }

    /// Make every read fail until switched off again.
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    fn check_reads(&self) -> Result<(), RelayError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(RelayError::Ledger("connection reset by peer".to_string()));
        }
        Ok(())
    }

    fn expiry(&self, ttl: Option<Duration>) -> Result<Option<DateTime<Utc>>, RelayError> {
        ttl.map(|ttl| {
            chrono::Duration::from_std(ttl)
                .map(|ttl| self.clock.now() + ttl)
                .map_err(|e| RelayError::Ledger(format!("ttl out of range: {e}")))
        })
        .transpose()
    }
}

#[async_trait]
impl<C: Clock> Ledger for InMemoryLedger<C> {
    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>, RelayError> {
        self.check_reads()?;
        let state = self.state.lock().await;
        Ok(state.hashes.get(key).cloned().unwrap_or_default())
    }

    async fn exists(&self, key: &str) -> Result<bool, RelayError> {
        self.check_reads()?;
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        Ok(state.live(key, now).is_some() || state.hashes.contains_key(key))
    }

    async fn get(&self, key: &str) -> Result<Option<String>, RelayError> {
        self.check_reads()?;
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        Ok(state.live(key, now).map(|e| e.value.clone()))
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), RelayError> {
        let expires_at = self.expiry(ttl)?;
        let mut state = self.state.lock().await;
        state.strings.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn set_nx(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<bool, RelayError> {
        let expires_at = self.expiry(ttl)?;
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        if state.live(key, now).is_some() {
            return Ok(false);
        }
        state.strings.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at,
            },
        );
        Ok(true)
    }

    async fn del(&self, key: &str) -> Result<bool, RelayError> {
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        let existed = state.live(key, now).is_some();
        state.strings.remove(key);
        Ok(existed || state.hashes.remove(key).is_some())
    }

    async fn del_if_eq(&self, key: &str, value: &str) -> Result<bool, RelayError> {
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        if state.live(key, now).is_none_or(|e| e.value != value) {
            return Ok(false);
        }
        state.strings.remove(key);
        Ok(true)
    }

    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<String>, RelayError> {
        self.check_reads()?;
        let state = self.state.lock().await;
        Ok(state.hashes.get(key).and_then(|h| h.get(field)).cloned())
    }

    async fn hash_set(&self, key: &str, field: &str, value: &str) -> Result<(), RelayError> {
        let mut state = self.state.lock().await;
        state
            .hashes
            .entry(key.to_string())
            .or_default()
            .insert(field.to_string(), value.to_string());
        Ok(())
    }

    async fn hash_del(&self, key: &str, field: &str) -> Result<bool, RelayError> {
        let mut state = self.state.lock().await;
        let Some(hash) = state.hashes.get_mut(key) else {
            return Ok(false);
        };
        let removed = hash.remove(field).is_some();
        // Redis drops a hash once its last field is gone
        if hash.is_empty() {
            state.hashes.remove(key);
        }
        Ok(removed)
    }
}
