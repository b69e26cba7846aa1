//! Engine configuration types.
//!
//! `EngineConfig` is constructed once at process start (see
//! `leadflow-infra::config`) and handed to the runner by value. Nothing in
//! the engine reads the process environment.

use serde::{Deserialize, Serialize};

/// Tunables and defaults for workflow execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Upper bound on leads processed in one run, whether given as explicit
    /// IDs or resolved from the audience filter.
    #[serde(default = "default_max_leads_per_run")]
    pub max_leads_per_run: u32,

    /// Sender name used when an email step does not set `fromName`.
    #[serde(default = "default_from_name")]
    pub default_from_name: String,

    /// Sender address used when an email step does not set `fromEmail`.
    #[serde(default = "default_from_email")]
    pub default_from_email: String,

    /// Footer appended to SMS messages with `includeOptOut`.
    #[serde(default = "default_sms_opt_out_text")]
    pub sms_opt_out_text: String,

    /// Minutes a failed step waits before the scheduler retries it.
    #[serde(default = "default_retry_delay_minutes")]
    pub retry_delay_minutes: u32,
}

fn default_max_leads_per_run() -> u32 {
    1000
}

fn default_from_name() -> String {
    "Admissions Team".to_string()
}

fn default_from_email() -> String {
    "admissions@example.com".to_string()
}

fn default_sms_opt_out_text() -> String {
    "Reply STOP to unsubscribe.".to_string()
}

fn default_retry_delay_minutes() -> u32 {
    60
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_leads_per_run: default_max_leads_per_run(),
            default_from_name: default_from_name(),
            default_from_email: default_from_email(),
            sms_opt_out_text: default_sms_opt_out_text(),
            retry_delay_minutes: default_retry_delay_minutes(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_config_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.max_leads_per_run, 1000);
        assert_eq!(config.sms_opt_out_text, "Reply STOP to unsubscribe.");
        assert_eq!(config.retry_delay_minutes, 60);
    }

    #[test]
    fn test_engine_config_deserialize_partial() {
        let config: EngineConfig = toml::from_str(
            r#"
max_leads_per_run = 250
default_from_name = "Northside College"
"#,
        )
        .unwrap();
        assert_eq!(config.max_leads_per_run, 250);
        assert_eq!(config.default_from_name, "Northside College");
        assert_eq!(config.default_from_email, "admissions@example.com");
    }
}
