//! Ports - 抽象化レイヤー
//!
//! Hexagonal Architecture の「ポート」。外部システム（Redis, メッセージバス）
//! へのインターフェースを trait として定義し、テストではインメモリ実装に
//! 差し替える。
//!
//! # 設計原則
//! - Ledger（key-value ストア）が進捗の正本
//! - Transport は fire-and-forget（下流の成否は知らない）

pub mod clock;
pub mod ledger;
pub mod transport;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::ledger::Ledger;
pub use self::transport::{Subscription, Transport};
