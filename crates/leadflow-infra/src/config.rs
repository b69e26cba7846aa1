//! Application configuration loader for Leadflow.
//!
//! Reads `leadflow.toml` and deserializes it into [`AppConfig`]. Falls back
//! to defaults when the file is missing or malformed. Provider credentials
//! never live in the file; they are read once from the environment into
//! [`ProviderCredentials`].

use std::path::{Path, PathBuf};

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use leadflow_types::config::EngineConfig;

use crate::delivery::twilio::TwilioCredentials;

/// Top-level `leadflow.toml` contents.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub delivery: DeliveryConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite URL. Defaults to `<data_dir>/leadflow.db`.
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Seconds between background ticks. `0` disables the background loop.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Due enrollments processed per tick.
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            batch_size: default_batch_size(),
        }
    }
}

fn default_interval_secs() -> u64 {
    60
}

fn default_batch_size() -> u32 {
    100
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    /// Per-request timeout for provider HTTP calls.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub resend_base_url: Option<String>,
    #[serde(default)]
    pub twilio_base_url: Option<String>,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            resend_base_url: None,
            twilio_base_url: None,
        }
    }
}

fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,
    /// Export spans to stdout through OpenTelemetry.
    #[serde(default)]
    pub otel: bool,
}

/// Resolve the data directory.
///
/// Priority:
/// 1. `LEADFLOW_DATA_DIR` environment variable
/// 2. `~/.leadflow`
pub fn default_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("LEADFLOW_DATA_DIR") {
        return PathBuf::from(dir);
    }

    if let Some(home) = dirs::home_dir() {
        return home.join(".leadflow");
    }

    PathBuf::from(".leadflow")
}

/// Default config file location inside a data directory.
pub fn default_config_path(data_dir: &Path) -> PathBuf {
    data_dir.join("leadflow.toml")
}

/// Load configuration from `path`.
///
/// - If the file does not exist, returns [`AppConfig::default()`].
/// - If the file exists but fails to parse, logs a warning and returns the default.
pub async fn load_config(path: &Path) -> AppConfig {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config found at {}, using defaults", path.display());
            return AppConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", path.display());
            return AppConfig::default();
        }
    };

    match toml::from_str::<AppConfig>(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!("Failed to parse {}: {err}, using defaults", path.display());
            AppConfig::default()
        }
    }
}

/// Email and SMS provider credentials.
pub struct ProviderCredentials {
    pub resend_api_key: Option<SecretString>,
    pub twilio_account_sid: Option<String>,
    pub twilio_auth_token: Option<SecretString>,
    pub twilio_phone_number: Option<String>,
}

impl ProviderCredentials {
    /// Read credentials from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read credentials through `lookup`. Blank values count as missing.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        Self {
            resend_api_key: get("RESEND_API_KEY").map(SecretString::from),
            twilio_account_sid: get("TWILIO_ACCOUNT_SID"),
            twilio_auth_token: get("TWILIO_AUTH_TOKEN").map(SecretString::from),
            twilio_phone_number: get("TWILIO_PHONE_NUMBER"),
        }
    }

    /// Split into the Resend key and the Twilio credentials. Twilio is only
    /// configured when all three parts are present.
    pub fn into_parts(self) -> (Option<SecretString>, Option<TwilioCredentials>) {
        let twilio = match (
            self.twilio_account_sid,
            self.twilio_auth_token,
            self.twilio_phone_number,
        ) {
            (Some(account_sid), Some(auth_token), Some(from_number)) => Some(TwilioCredentials {
                account_sid,
                auth_token,
                from_number,
            }),
            _ => None,
        };
        (self.resend_api_key, twilio)
    }
}
