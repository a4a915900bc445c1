//! DKG runtime configuration.
//!
//! Loaded from TOML or JSON, then overridden from the environment. The DKG
//! timeout is not configured here: it is a ledger constant.

use crate::errors::{DkgError, DkgResult};
use quorum_core::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment override for the poll interval, in seconds
pub const ENV_POLL_INTERVAL: &str = "QUORUM_POLL_INTERVAL_SECS";
/// Environment override for the key service retry pause, in seconds
pub const ENV_KEY_SERVICE_RETRY: &str = "QUORUM_KEY_SERVICE_RETRY_SECS";
/// Environment override for the node data directory
pub const ENV_NODE_DATA_PATH: &str = "QUORUM_NODE_DATA_PATH";
/// Environment override for the transport key name
pub const ENV_ETH_KEY_NAME: &str = "QUORUM_ETH_KEY_NAME";

/// Node-local DKG settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DkgRuntimeConfig {
    /// Pause between ledger polls
    pub poll_interval_secs: u64,
    /// Fixed pause between retries of an unreachable key service
    pub key_service_retry_secs: u64,
    /// Root directory for persisted key bundles
    pub node_data_path: PathBuf,
    /// Name of this node's transport key inside the key service
    pub eth_key_name: String,
}

impl Default for DkgRuntimeConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 30,
            key_service_retry_secs: 5,
            node_data_path: PathBuf::from("/skale_node_data"),
            eth_key_name: String::new(),
        }
    }
}

impl DkgRuntimeConfig {
    /// Pause between ledger polls
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Retry policy for the key service boundary: unbounded, fixed pause
    pub fn key_service_retry(&self) -> RetryPolicy {
        RetryPolicy::unbounded_fixed(Duration::from_secs(self.key_service_retry_secs))
    }

    /// Load from a `.toml` or `.json` file
    pub fn load_from_file(path: &Path) -> DkgResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| DkgError::config(format!("Failed to read config file: {e}")))?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => toml::from_str(&content)
                .map_err(|e| DkgError::config(format!("Invalid TOML: {e}"))),
            Some("json") => serde_json::from_str(&content)
                .map_err(|e| DkgError::config(format!("Invalid JSON: {e}"))),
            _ => Err(DkgError::config("Unsupported file format")),
        }
    }

    /// Apply environment overrides
    pub fn merge_with_env(&mut self) -> DkgResult<()> {
        self.merge_with_vars(|key| std::env::var(key).ok())
    }

    fn merge_with_vars(&mut self, var: impl Fn(&str) -> Option<String>) -> DkgResult<()> {
        if let Some(value) = var(ENV_POLL_INTERVAL) {
            self.poll_interval_secs = value
                .parse()
                .map_err(|_| DkgError::config(format!("Invalid number in {ENV_POLL_INTERVAL}")))?;
        }
        if let Some(value) = var(ENV_KEY_SERVICE_RETRY) {
            self.key_service_retry_secs = value.parse().map_err(|_| {
                DkgError::config(format!("Invalid number in {ENV_KEY_SERVICE_RETRY}"))
            })?;
        }
        if let Some(value) = var(ENV_NODE_DATA_PATH) {
            self.node_data_path = PathBuf::from(value);
        }
        if let Some(value) = var(ENV_ETH_KEY_NAME) {
            self.eth_key_name = value;
        }
        Ok(())
    }

    /// Reject settings the runtime cannot work with
    pub fn validate(&self) -> DkgResult<()> {
        if self.poll_interval_secs == 0 {
            return Err(DkgError::config("poll_interval_secs must be non-zero"));
        }
        if self.key_service_retry_secs == 0 {
            return Err(DkgError::config("key_service_retry_secs must be non-zero"));
        }
        if self.eth_key_name.is_empty() {
            return Err(DkgError::config("eth_key_name is required"));
        }
        Ok(())
    }

    /// File, then environment, then validation
    pub fn load(path: &Path) -> DkgResult<Self> {
        let mut config = Self::load_from_file(path)?;
        config.merge_with_env()?;
        config.validate()?;
        Ok(config)
    }
}
