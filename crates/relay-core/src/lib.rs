//! relay-core
//!
//! サービス間通知（project / index-route のライフサイクルイベント）を
//! at-least-once で届けるための relay。
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（message, keys, entry, state, ids, errors）
//! - **ports**: 抽象化レイヤー（Ledger, Transport, Clock）
//! - **app**: アプリケーションロジック（builder, publisher, listener, verifier, scheduler）
//! - **impls**: 実装（InMemoryLedger, InMemoryTransport など開発用）
//! - **config**: RelayConfig（TOML から読み込み）

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod ports;

pub use app::{IdleMessageVerifier, MessagePublisher, Relay, RelayBuilder, SweepReport};
pub use config::RelayConfig;
pub use domain::{Message, RelayError};
