//! Client configuration

use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use alloy::primitives::Address;
use serde::{Deserialize, Serialize};
use tokenvault_error::{Result, TokenVaultError};

/// Environment variable naming a JSON config file
pub const ENV_CONFIG_PATH: &str = "TOKENVAULT_CONFIG";
/// Overrides [`ClientConfig::default_chain_id`]
pub const ENV_DEFAULT_CHAIN_ID: &str = "TOKENVAULT_DEFAULT_CHAIN_ID";
/// Overrides [`ClientConfig::receipt_poll_interval_ms`]
pub const ENV_RECEIPT_POLL_INTERVAL_MS: &str = "TOKENVAULT_RECEIPT_POLL_INTERVAL_MS";
/// Overrides [`ClientConfig::confirmation_timeout_secs`]
pub const ENV_CONFIRMATION_TIMEOUT_SECS: &str = "TOKENVAULT_CONFIRMATION_TIMEOUT_SECS";
/// Overrides [`ClientConfig::http_timeout_secs`]
pub const ENV_HTTP_TIMEOUT_SECS: &str = "TOKENVAULT_HTTP_TIMEOUT_SECS";
/// Overrides the vault address of the default chain
pub const ENV_VAULT_ADDRESS: &str = "TOKENVAULT_VAULT_ADDRESS";

/// Per-chain contract address overrides
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContractOverride {
    /// Vault contract
    pub vault: Option<Address>,
    /// Supported tokens by symbol
    pub tokens: BTreeMap<String, Address>,
}

/// Runtime configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Chain used when the wallet reports nothing usable
    pub default_chain_id: u64,
    /// Delay between receipt polls
    pub receipt_poll_interval_ms: u64,
    /// How long to wait for a receipt before giving up
    pub confirmation_timeout_secs: u64,
    /// Timeout for the read-only HTTP provider
    pub http_timeout_secs: u64,
    /// Contract overrides keyed by chain id
    pub contracts: BTreeMap<u64, ContractOverride>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            default_chain_id: 11155111,
            receipt_poll_interval_ms: 1_000,
            confirmation_timeout_secs: 120,
            http_timeout_secs: 30,
            contracts: BTreeMap::new(),
        }
    }
}

fn parse_var<T: FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| TokenVaultError::ConfigError(format!("{name}: cannot parse '{value}'")))
}

impl ClientConfig {
    /// Parses and validates a JSON document
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| TokenVaultError::ConfigError(format!("invalid config JSON: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a JSON config file; a missing file yields the defaults
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(json) => Self::from_json_str(&json),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(TokenVaultError::ConfigError(format!("cannot read {}: {e}", path.display()))),
        }
    }

    /// Loads `.env` if present, then the file named by `TOKENVAULT_CONFIG`
    /// (if any), then applies `TOKENVAULT_*` overrides
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`ClientConfig::from_env`] over an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match lookup(ENV_CONFIG_PATH) {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };

        if let Some(v) = lookup(ENV_DEFAULT_CHAIN_ID) {
            config.default_chain_id = parse_var(ENV_DEFAULT_CHAIN_ID, &v)?;
        }
        if let Some(v) = lookup(ENV_RECEIPT_POLL_INTERVAL_MS) {
            config.receipt_poll_interval_ms = parse_var(ENV_RECEIPT_POLL_INTERVAL_MS, &v)?;
        }
        if let Some(v) = lookup(ENV_CONFIRMATION_TIMEOUT_SECS) {
            config.confirmation_timeout_secs = parse_var(ENV_CONFIRMATION_TIMEOUT_SECS, &v)?;
        }
        if let Some(v) = lookup(ENV_HTTP_TIMEOUT_SECS) {
            config.http_timeout_secs = parse_var(ENV_HTTP_TIMEOUT_SECS, &v)?;
        }
        if let Some(v) = lookup(ENV_VAULT_ADDRESS) {
            let vault: Address = parse_var(ENV_VAULT_ADDRESS, &v)?;
            config.contracts.entry(config.default_chain_id).or_default().vault = Some(vault);
        }

        config.validate()?;
        Ok(config)
    }

    /// Checks internal consistency
    pub fn validate(&self) -> Result<()> {
        if self.default_chain_id == 0 {
            return Err(TokenVaultError::ConfigError("default_chain_id must be non-zero".into()));
        }
        if self.receipt_poll_interval_ms == 0 {
            return Err(TokenVaultError::ConfigError("receipt_poll_interval_ms must be non-zero".into()));
        }
        if self.confirmation_timeout_secs == 0 {
            return Err(TokenVaultError::ConfigError("confirmation_timeout_secs must be non-zero".into()));
        }
        if self.confirmation_timeout_secs.saturating_mul(1_000) < self.receipt_poll_interval_ms {
            return Err(TokenVaultError::ConfigError(
                "confirmation_timeout_secs is shorter than one receipt poll".into(),
            ));
        }
        if self.http_timeout_secs == 0 {
            return Err(TokenVaultError::ConfigError("http_timeout_secs must be non-zero".into()));
        }
        Ok(())
    }

    /// Receipt poll interval
    pub fn receipt_poll_interval(&self) -> Duration {
        Duration::from_millis(self.receipt_poll_interval_ms)
    }

    /// Confirmation timeout
    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_secs(self.confirmation_timeout_secs)
    }

    /// HTTP provider timeout
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}
