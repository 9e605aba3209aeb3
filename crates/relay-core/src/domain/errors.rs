//! Errors - エラー型と分類
//!
//! sweep / listener / publisher のどこで起きた失敗かを variant で区別し、
//! 運用上の扱い（リトライするか）は `ErrorKind` で判断する。

use thiserror::Error;

/// ErrorKind は実行エラーの運用分類
///
/// - Transient: 一時的なエラー（次の sweep / 再配送で回復しうる）
/// - Permanent: 恒久的なエラー（リトライしても無意味）
/// - Infrastructure: ledger / transport の障害
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transient,
    Permanent,
    Infrastructure,
}

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("ledger error: {0}")]
    Ledger(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("handler failed: {0}")]
    Handler(String),

    #[error("invalid config: {0}")]
    Config(String),
}

impl RelayError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RelayError::Ledger(_) | RelayError::Transport(_) => ErrorKind::Infrastructure,
            RelayError::Handler(_) => ErrorKind::Transient,
            RelayError::Codec(_) | RelayError::Config(_) => ErrorKind::Permanent,
        }
    }
}
