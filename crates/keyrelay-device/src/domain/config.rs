//! Device configuration schema.
//!
//! [`AppConfig`] is the single source of truth for runtime settings.  It is
//! read from either of two on-disk formats (see `infrastructure::storage`):
//!
//! - **TOML** (`keyrelay.toml`), the native format:
//!
//! ```toml
//! [auth]
//! username = "admin"
//! userpass = "secret"
//!
//! [http]
//! port = 80
//! pagename = "console"
//!
//! [hid]
//! device = "/dev/hidg0"
//! ready_timeout_ms = 1000
//! ```
//!
//! - **Legacy `key=value`** (`config.txt`), as written for the older
//!   firmware.  Only the four flat keys `username`, `userpass`,
//!   `slack_webhook` and `pagename` are understood there.
//!
//! Every field carries a `#[serde(default = "...")]`, so a partial file (or
//! no file at all) still yields a usable config.  [`AppConfig::validate`]
//! then rejects the combinations that cannot run.

use std::path::PathBuf;
use std::time::Duration;

use keyrelay_core::domain::{LockoutPolicy, DEFAULT_MAX_FAILED_ATTEMPTS};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Error type for loading and checking configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config parsed but cannot be used.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level device configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppConfig {
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub alerts: AlertConfig,
    #[serde(default)]
    pub lockout: LockoutConfig,
    #[serde(default)]
    pub hid: HidConfig,
}

/// Credentials for the control page.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthConfig {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub userpass: String,
    /// Realm sent in the `WWW-Authenticate` challenge.
    #[serde(default = "default_realm")]
    pub realm: String,
}

/// Listener settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HttpConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Path segment of the control page.  Empty serves it at `/`.
    #[serde(default)]
    pub pagename: String,
}

/// Outbound alert settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AlertConfig {
    /// Webhook URL, or a path on `hooks.slack.com`.  Empty disables alerts.
    #[serde(default)]
    pub slack_webhook: String,
}

/// Brute-force protection thresholds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LockoutConfig {
    #[serde(default = "default_max_failed_attempts")]
    pub max_failed_attempts: u32,
    #[serde(default = "default_block_duration_secs")]
    pub block_duration_secs: u64,
    /// How often expired blocks are purged.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

/// HID gadget output settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HidConfig {
    #[serde(default = "default_hid_device")]
    pub device: PathBuf,
    /// Delay between a press report and its release.
    #[serde(default = "default_settle_ms")]
    pub press_settle_ms: u64,
    /// Delay between a release and the next press.
    #[serde(default = "default_settle_ms")]
    pub release_settle_ms: u64,
    /// Upper bound on waiting for the endpoint to become ready.  `0` waits
    /// forever.
    #[serde(default = "default_ready_timeout_ms")]
    pub ready_timeout_ms: u64,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_realm() -> String {
    "Device Auth Realm".to_string()
}
fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    80
}
fn default_max_failed_attempts() -> u32 {
    DEFAULT_MAX_FAILED_ATTEMPTS
}
fn default_block_duration_secs() -> u64 {
    60 * 60
}
fn default_sweep_interval_secs() -> u64 {
    300
}
fn default_hid_device() -> PathBuf {
    PathBuf::from("/dev/hidg0")
}
fn default_settle_ms() -> u64 {
    5
}
fn default_ready_timeout_ms() -> u64 {
    1000
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            username: String::new(),
            userpass: String::new(),
            realm: default_realm(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            pagename: String::new(),
        }
    }
}

impl Default for LockoutConfig {
    fn default() -> Self {
        Self {
            max_failed_attempts: default_max_failed_attempts(),
            block_duration_secs: default_block_duration_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

impl Default for HidConfig {
    fn default() -> Self {
        Self {
            device: default_hid_device(),
            press_settle_ms: default_settle_ms(),
            release_settle_ms: default_settle_ms(),
            ready_timeout_ms: default_ready_timeout_ms(),
        }
    }
}

// ── Derived views ─────────────────────────────────────────────────────────────

impl HttpConfig {
    /// Request path of the control page: `/` or `/{pagename}`.
    pub fn page_path(&self) -> String {
        let name = self.pagename.trim_matches('/');
        if name.is_empty() {
            "/".to_string()
        } else {
            format!("/{name}")
        }
    }
}

impl LockoutConfig {
    pub fn policy(&self) -> LockoutPolicy {
        LockoutPolicy {
            max_failed_attempts: self.max_failed_attempts,
            block_duration: Duration::from_secs(self.block_duration_secs),
        }
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

impl HidConfig {
    /// `None` means wait for readiness without a bound.
    pub fn ready_timeout(&self) -> Option<Duration> {
        (self.ready_timeout_ms > 0).then(|| Duration::from_millis(self.ready_timeout_ms))
    }
}

impl AppConfig {
    /// Flat key lookup over the settings the legacy format knows about.
    ///
    /// Unknown keys (and unset values) come back as an empty string.
    pub fn get(&self, key: &str) -> String {
        match key {
            "username" => self.auth.username.clone(),
            "userpass" => self.auth.userpass.clone(),
            "slack_webhook" => self.alerts.slack_webhook.clone(),
            "pagename" => self.http.pagename.clone(),
            _ => String::new(),
        }
    }

    /// Parses the legacy `key=value` format.
    ///
    /// A line is used only when it contains `=` after its first character.
    /// The key is taken verbatim and the value is trimmed.  Later lines
    /// override earlier ones.
    pub fn from_legacy_str(content: &str) -> Self {
        let mut config = AppConfig::default();
        for line in content.lines() {
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            if key.is_empty() {
                continue;
            }
            let value = value.trim().to_string();
            match key {
                "username" => config.auth.username = value,
                "userpass" => config.auth.userpass = value,
                "slack_webhook" => config.alerts.slack_webhook = value,
                "pagename" => config.http.pagename = value,
                other => debug!(key = other, "ignoring unknown legacy config key"),
            }
        }
        config
    }

    /// Rejects configurations the service cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if either credential is empty or the
    /// failed-attempt threshold is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.auth.username.is_empty() || self.auth.userpass.is_empty() {
            return Err(ConfigError::Invalid(
                "auth.username and auth.userpass must both be set".to_string(),
            ));
        }
        if self.lockout.max_failed_attempts == 0 {
            return Err(ConfigError::Invalid(
                "lockout.max_failed_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
