//! App - アプリケーション層
//!
//! ports を組み合わせて relay のロジックを実装する。
//!
//! # 主要コンポーネント
//! - **RelayBuilder**: 構築とワイヤリング（設定・キー規約の共有）
//! - **Publisher**: チャンネルへのイベント送信（fire-and-forget）
//! - **MessageListener**: 受信処理と ledger への進捗記録
//! - **IdleMessageVerifier**: 止まったメッセージの検出と再配送
//! - **SweepScheduler**: verifier の定期実行（同時実行は 1 本まで）

pub mod builder;
pub mod listener;
pub mod publisher;
pub mod scheduler;
pub mod verifier;

pub use self::builder::{BuildError, Relay, RelayBuilder};
pub use self::listener::{Delivery, ListenerGroup, ListenerSettings, MessageHandler, MessageListener};
pub use self::publisher::{IndexRoutingPublisher, MessagePublisher, ProjectPublisher};
pub use self::scheduler::{SchedulerHandle, SweepGuard, SweepPermit, SweepScheduler, Tick};
pub use self::verifier::{IdleMessageVerifier, SweepReport};
