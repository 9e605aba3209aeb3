//! Domain model (messages, ledger keys, running-task records, states, ...).
//!
//! - message: Channel / Message（wire topic の組み立て）
//! - keys: ledger キーの命名規約（block code / encoded state / task key）
//! - entry: running-task record と寛容なデコード
//! - state: メッセージ単位の三状態判定
//! - ids: ProjectId / IndexRouteId
//! - errors: RelayError と ErrorKind

pub mod entry;
pub mod errors;
pub mod ids;
pub mod keys;
pub mod message;
pub mod state;

pub use entry::{ParsedEntry, RunningTaskRecord};
pub use errors::{ErrorKind, RelayError};
pub use ids::{IndexRouteId, ProjectId};
pub use keys::LedgerKeys;
pub use message::{Channel, Message};
pub use state::MessageState;
