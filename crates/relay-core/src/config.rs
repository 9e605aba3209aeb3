//! RelayConfig - relay 全体の設定
//!
//! `staleness_interval_secs` は listener の lock TTL と verifier の sweep 周期の
//! 両方に使う。別々の値にすると、listener の猶予が切れる前に verifier が
//! abandoned と判定するレースが起きる。

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::domain::errors::RelayError;
use crate::domain::keys::LedgerKeys;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RelayConfig {
    pub staleness_interval_secs: u64,
    pub marker_ttl_secs: u64,
    pub key_prefix: String,
    pub running_tasks_key: String,
    /// `None` retries forever.
    pub max_attempts: Option<u32>,
    pub project_topic: String,
    pub index_routing_topic: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            staleness_interval_secs: 60,
            marker_ttl_secs: 24 * 60 * 60,
            key_prefix: "relay".to_string(),
            running_tasks_key: "running-tasks".to_string(),
            max_attempts: None,
            project_topic: "project-topic".to_string(),
            index_routing_topic: "index-routing-topic".to_string(),
        }
    }
}

impl RelayConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, RelayError> {
        let config: RelayConfig =
            toml::from_str(raw).map_err(|e| RelayError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, RelayError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| RelayError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&raw)
    }

    pub fn validate(&self) -> Result<(), RelayError> {
        if self.staleness_interval_secs == 0 {
            return Err(RelayError::Config(
                "staleness_interval_secs must be greater than zero".to_string(),
            ));
        }
        if self.key_prefix.is_empty() || self.running_tasks_key.is_empty() {
            return Err(RelayError::Config(
                "key_prefix and running_tasks_key must not be empty".to_string(),
            ));
        }
        if self.max_attempts == Some(0) {
            return Err(RelayError::Config(
                "max_attempts must be at least 1 when set".to_string(),
            ));
        }
        Ok(())
    }

    pub fn staleness_interval(&self) -> Duration {
        Duration::from_secs(self.staleness_interval_secs)
    }

    pub fn marker_ttl(&self) -> Duration {
        Duration::from_secs(self.marker_ttl_secs)
    }

    pub fn keys(&self) -> LedgerKeys {
        LedgerKeys::new(self.key_prefix.clone(), self.running_tasks_key.clone())
    }
}
