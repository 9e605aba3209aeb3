//! RelayBuilder - relay の構築とワイヤリング
//!
//! # 使用例
//! ```ignore
//! let relay = RelayBuilder::new(config)
//!     .ledger(ledger)
//!     .transport(transport)
//!     .build()?;
//!
//! let projects = relay.project_publisher();
//! let listener = relay.listener(handler);
//! let scheduler = relay.scheduler(SweepGuard::new());
//! ```
//!
//! # Fail-fast 設計
//! - ledger / transport の設定漏れは build() 時に BuildError
//! - 設定値の検証（RelayConfig::validate）も build() で行う
//! - listener と verifier は必ず同じ `LedgerKeys` と staleness interval を使う

use std::sync::Arc;

use crate::config::RelayConfig;
use crate::domain::errors::RelayError;
use crate::domain::keys::LedgerKeys;
use crate::domain::message::Channel;
use crate::ports::{Ledger, Transport};

use super::listener::{ListenerSettings, MessageHandler, MessageListener};
use super::publisher::{IndexRoutingPublisher, ProjectPublisher};
use super::scheduler::{SweepGuard, SweepScheduler};
use super::verifier::IdleMessageVerifier;

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("no ledger configured")]
    MissingLedger,

    #[error("no transport configured")]
    MissingTransport,

    #[error(transparent)]
    InvalidConfig(#[from] RelayError),
}

pub struct RelayBuilder {
    config: RelayConfig,
    ledger: Option<Arc<dyn Ledger>>,
    transport: Option<Arc<dyn Transport>>,
}

impl RelayBuilder {
    pub fn new(config: RelayConfig) -> Self {
        Self {
            config,
            ledger: None,
            transport: None,
        }
    }

    pub fn ledger(mut self, ledger: Arc<dyn Ledger>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn build(self) -> Result<Relay, BuildError> {
        self.config.validate()?;
        let ledger = self.ledger.ok_or(BuildError::MissingLedger)?;
        let transport = self.transport.ok_or(BuildError::MissingTransport)?;
        let keys = self.config.keys();
        Ok(Relay {
            config: self.config,
            keys,
            ledger,
            transport,
        })
    }
}

/// Wired collaborators sharing one ledger, transport and key scheme.
pub struct Relay {
    config: RelayConfig,
    keys: LedgerKeys,
    ledger: Arc<dyn Ledger>,
    transport: Arc<dyn Transport>,
}

impl Relay {
    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    pub fn keys(&self) -> &LedgerKeys {
        &self.keys
    }

    pub fn project_publisher(&self) -> ProjectPublisher {
        ProjectPublisher::new(
            Channel::new(self.config.project_topic.clone()),
            Arc::clone(&self.transport),
        )
    }

    pub fn index_routing_publisher(&self) -> IndexRoutingPublisher {
        IndexRoutingPublisher::new(
            Channel::new(self.config.index_routing_topic.clone()),
            Arc::clone(&self.transport),
        )
    }

    pub fn listener(&self, handler: Arc<dyn MessageHandler>) -> MessageListener {
        MessageListener::new(
            Arc::clone(&self.ledger),
            Arc::clone(&self.transport),
            handler,
            ListenerSettings {
                keys: self.keys.clone(),
                lock_ttl: self.config.staleness_interval(),
                marker_ttl: self.config.marker_ttl(),
                max_attempts: self.config.max_attempts,
            },
        )
    }

    pub fn verifier(&self) -> IdleMessageVerifier {
        IdleMessageVerifier::new(
            Arc::clone(&self.ledger),
            Arc::clone(&self.transport),
            self.keys.clone(),
        )
    }

    pub fn scheduler(&self, guard: SweepGuard) -> SweepScheduler {
        SweepScheduler::new(
            Arc::new(self.verifier()),
            guard,
            self.config.staleness_interval(),
        )
    }
}
