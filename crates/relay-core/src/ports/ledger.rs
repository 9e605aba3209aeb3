//! Ledger port - 共有 key-value ストア（本番は Redis 想定）
//!
//! running-task の hash-map と、派生キー（Block-Code Lock / Encoded-State
//! Marker）を保持する帳簿。
//!
//! # 一貫性の前提
//! - 単一キーの操作はアトミック（値の部分読みはない）
//! - キーをまたいだ一貫性は要求しない。verifier は「判定の途中で
//!   Completed になった」レースを許容する（最悪 1 回余分に再配送）

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::errors::RelayError;

#[async_trait]
pub trait Ledger: Send + Sync {
    /// Snapshot read of a whole hash-map. A missing key is an empty map.
    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>, RelayError>;

    async fn exists(&self, key: &str) -> Result<bool, RelayError>;

    async fn get(&self, key: &str) -> Result<Option<String>, RelayError>;

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), RelayError>;

    /// Set only if the key is absent. Returns whether this call created it.
    async fn set_nx(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<bool, RelayError>;

    /// Returns whether the key existed.
    async fn del(&self, key: &str) -> Result<bool, RelayError>;

    /// Delete `key` only while it still holds `value`, as one atomic step.
    /// Returns whether this call deleted it.
    async fn del_if_eq(&self, key: &str, value: &str) -> Result<bool, RelayError>;

    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<String>, RelayError>;

    async fn hash_set(&self, key: &str, field: &str, value: &str) -> Result<(), RelayError>;

    /// Returns whether the field existed.
    async fn hash_del(&self, key: &str, field: &str) -> Result<bool, RelayError>;
}
