//! Impls - ports の開発用・テスト用実装
//!
//! # 含まれる実装
//! - **InMemoryLedger**: TTL 付きの key-value / hash ストア
//! - **InMemoryTransport**: topic 単位の pub/sub
//!
//! 本番用（Redis など）の実装はこのクレートには含めない。

pub mod inmem_ledger;
pub mod inmem_transport;

pub use self::inmem_ledger::InMemoryLedger;
pub use self::inmem_transport::InMemoryTransport;
