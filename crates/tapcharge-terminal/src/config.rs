//! Terminal configuration loading and management.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tapcharge_core::ConfirmationPolicy;

use crate::error::TerminalError;

/// Full configuration for a payment terminal.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TerminalConfig {
    /// Merchant and ledger identities, signing key.
    #[serde(default)]
    pub identity: IdentityConfig,

    /// Relay set used for transfer confirmations.
    #[serde(default)]
    pub relay: RelayConfig,

    /// Confirmation window and automatic rechecks.
    #[serde(default)]
    pub confirmation: ConfirmationPolicy,

    /// Callback HTTP client settings.
    #[serde(default)]
    pub http: HttpConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct IdentityConfig {
    /// Ledger identity that receives internal transfers.
    #[serde(default)]
    pub destination: String,
    /// Public key the ledger signs its confirmation records with.
    #[serde(default)]
    pub ledger_identity: String,
    /// Hex-encoded 32-byte signing seed. Takes precedence over `keypair_path`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signing_seed: Option<String>,
    /// Path to the signing seed file; generated on first use.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keypair_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RelayConfig {
    /// Relay URLs listed in every transfer assertion.
    #[serde(default)]
    pub urls: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Request timeout for callbacks (milliseconds).
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error) or a full filter directive.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format (text, json).
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_timeout_ms() -> u64 {
    10_000
}
fn default_log_level() -> String {
    "info".into()
}
fn default_log_format() -> String {
    "text".into()
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl TerminalConfig {
    /// Load config from a TOML file, falling back to defaults when the file
    /// or individual fields are missing.
    pub fn load(path: &Path) -> Result<Self, TerminalError> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            let config: TerminalConfig = toml::from_str(&contents)?;
            Ok(config)
        } else {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            Ok(Self::default())
        }
    }

    /// Save the current config to a TOML file.
    pub fn save(&self, path: &Path) -> Result<(), TerminalError> {
        let contents = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, contents)?;
        Ok(())
    }
}
