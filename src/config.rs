//! Service configuration loaded from a TOML file.
//!
//! ```toml
//! listen = "0.0.0.0:8080"
//! api_key = "change-me"
//! stop_timeout_secs = 10
//!
//! [worker]
//! command = "node"
//! args = ["bot.js"]
//!
//! [policy]
//! tolerance = "0.05"
//! minimum_total = "0.001"
//!
//! [[policy.recipients]]
//! label = "U60"
//! address = "bc1q..."
//! share = "0.60"
//! ```

use crate::domain::policy::SplitPolicy;
use crate::domain::worker::WorkerSpec;
use crate::error::ConfigError;
use crate::infrastructure::esplora::DEFAULT_ESPLORA_URL;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

const SHARE_SUM_EPSILON: Decimal = dec!(0.000001);

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_stop_timeout_secs")]
    pub stop_timeout_secs: u64,
    pub worker: WorkerSpec,
    pub policy: PolicyConfig,
    #[serde(default)]
    pub balances: BalancesConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyConfig {
    pub tolerance: Decimal,
    #[serde(default)]
    pub minimum_total: Decimal,
    pub recipients: Vec<Recipient>,
}

/// One monitored address and the share of the payment it must receive.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Recipient {
    pub label: String,
    pub address: String,
    pub share: Decimal,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BalancesConfig {
    #[serde(default = "default_esplora_url")]
    pub esplora_url: String,
    #[serde(default = "default_request_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for BalancesConfig {
    fn default() -> Self {
        Self {
            esplora_url: default_esplora_url(),
            timeout_secs: default_request_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LedgerConfig {
    /// CSV file for profit reports. Reports are kept in memory when unset.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

fn default_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

const fn default_stop_timeout_secs() -> u64 {
    10
}

const fn default_request_timeout_secs() -> u64 {
    10
}

fn default_esplora_url() -> String {
    DEFAULT_ESPLORA_URL.to_string()
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&raw).map_err(|source| ConfigError::TomlParse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.worker.command.trim().is_empty() {
            return Err(ConfigError::Invalid("worker.command is empty".to_string()));
        }
        self.policy.validate()
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.balances.timeout_secs)
    }
}

impl PolicyConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        if self.recipients.is_empty() {
            return invalid("policy.recipients is empty".to_string());
        }
        if self.tolerance < Decimal::ZERO || self.tolerance >= Decimal::ONE {
            return invalid(format!(
                "policy.tolerance must be in [0, 1), got {}",
                self.tolerance
            ));
        }
        if self.minimum_total < Decimal::ZERO {
            return invalid(format!(
                "policy.minimum_total must not be negative, got {}",
                self.minimum_total
            ));
        }

        let mut seen = HashSet::new();
        for r in &self.recipients {
            if r.label.trim().is_empty() {
                return invalid("recipient label is empty".to_string());
            }
            if !seen.insert(r.label.as_str()) {
                return invalid(format!("duplicate recipient label '{}'", r.label));
            }
            if r.address.trim().is_empty() {
                return invalid(format!("recipient '{}' has no address", r.label));
            }
            if r.share <= Decimal::ZERO || r.share > Decimal::ONE {
                return invalid(format!(
                    "recipient '{}' share must be in (0, 1], got {}",
                    r.label, r.share
                ));
            }
        }

        let sum: Decimal = self.recipients.iter().map(|r| r.share).sum();
        if (sum - Decimal::ONE).abs() > SHARE_SUM_EPSILON {
            return invalid(format!("recipient shares sum to {sum}, expected 1"));
        }
        Ok(())
    }

    pub fn split_policy(&self) -> SplitPolicy {
        SplitPolicy::new(
            self.recipients.iter().map(|r| (r.label.clone(), r.share)),
            self.tolerance,
            self.minimum_total,
        )
    }

    /// Label to address mapping for the balance source.
    pub fn addresses(&self) -> BTreeMap<String, String> {
        self.recipients
            .iter()
            .map(|r| (r.label.clone(), r.address.clone()))
            .collect()
    }
}
