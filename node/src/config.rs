//! Node configuration with TOML file support.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use guard_contracts::VerificationPolicy;
use guard_protocol::config::{DEFAULT_METRICS_PORT, DEFAULT_RPC_PORT};

use crate::screening::RiskLevel;

/// Configuration for a Guard node.
///
/// Loaded from a TOML file via [`NodeConfig::from_toml_file`], then
/// overridden by CLI flags and `GUARD_*` environment variables.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Data directory for ledger storage.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Port for the REST / JSON-RPC / WebSocket API.
    #[serde(default = "default_rpc_port")]
    pub rpc_port: u16,

    /// Port for the Prometheus metrics endpoint.
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    /// Identity that becomes owner and sole relayer when the ledger is
    /// created. Ignored once the ledger exists.
    #[serde(default)]
    pub owner: String,

    /// Which records a relayer may re-verify.
    #[serde(default)]
    pub verification_policy: VerificationPolicy,

    /// Log format: "pretty" or "json".
    #[serde(default = "default_log_format")]
    pub log_format: String,

    /// Log level filter: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// How `/screen` turns a risk level into ledger calls.
    #[serde(default)]
    pub screening: ScreeningConfig,
}

/// Risk-screening settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreeningConfig {
    /// Levels at or above this are held for owner review.
    #[serde(default = "default_hold_threshold")]
    pub hold_threshold: RiskLevel,

    /// Verify low-risk submissions immediately instead of leaving them pending.
    #[serde(default)]
    pub auto_clear_low_risk: bool,

    /// Identity the node acts as when screening. Defaults to the owner.
    #[serde(default)]
    pub relayer: Option<String>,
}

// ── Serde default helpers ──────────────────────────────────────────────

fn default_data_dir() -> PathBuf {
    PathBuf::from("./guard_data")
}

fn default_rpc_port() -> u16 {
    DEFAULT_RPC_PORT
}

fn default_metrics_port() -> u16 {
    DEFAULT_METRICS_PORT
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_hold_threshold() -> RiskLevel {
    RiskLevel::High
}

// ── Impl ───────────────────────────────────────────────────────────────

impl NodeConfig {
    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("invalid config file {}", path.display()))
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }

    /// Serialize the configuration to a TOML string.
    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Where the sled database lives.
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("db")
    }

    /// The identity screening acts as.
    pub fn screening_relayer(&self) -> &str {
        self.screening.relayer.as_deref().unwrap_or(&self.owner)
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            rpc_port: default_rpc_port(),
            metrics_port: default_metrics_port(),
            owner: String::new(),
            verification_policy: VerificationPolicy::default(),
            log_format: default_log_format(),
            log_level: default_log_level(),
            screening: ScreeningConfig::default(),
        }
    }
}

impl Default for ScreeningConfig {
    fn default() -> Self {
        Self {
            hold_threshold: default_hold_threshold(),
            auto_clear_low_risk: false,
            relayer: None,
        }
    }
}
