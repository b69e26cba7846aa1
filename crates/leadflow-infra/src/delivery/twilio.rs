//! Twilio SMS provider.
//!
//! Sends through the Messages resource of the 2010-04-01 REST API using
//! account SID / auth token basic authentication and a form-encoded body.

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use leadflow_core::delivery::{DeliveryReceipt, SmsMessage, SmsSender};
use leadflow_types::error::DeliveryError;

use super::{build_client, provider_error};

const PROVIDER: &str = "twilio";

pub const DEFAULT_BASE_URL: &str = "https://api.twilio.com";

/// Account credentials and sender number.
pub struct TwilioCredentials {
    pub account_sid: String,
    pub auth_token: SecretString,
    pub from_number: String,
}

pub struct TwilioSmsSender {
    client: reqwest::Client,
    credentials: Option<TwilioCredentials>,
    base_url: String,
}

impl TwilioSmsSender {
    pub fn new(
        credentials: Option<TwilioCredentials>,
        timeout: Duration,
    ) -> Result<Self, DeliveryError> {
        Ok(Self {
            client: build_client(timeout)?,
            credentials,
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn is_configured(&self) -> bool {
        self.credentials.is_some()
    }

    fn messages_url(&self, account_sid: &str) -> String {
        format!(
            "{}/2010-04-01/Accounts/{account_sid}/Messages.json",
            self.base_url
        )
    }
}

#[derive(Debug, Deserialize)]
struct TwilioResponse {
    #[serde(default)]
    sid: Option<String>,
}

impl SmsSender for TwilioSmsSender {
    async fn send(&self, message: &SmsMessage) -> Result<DeliveryReceipt, DeliveryError> {
        let Some(creds) = &self.credentials else {
            return Err(DeliveryError::NotConfigured {
                provider: PROVIDER.to_string(),
                message: "TWILIO_ACCOUNT_SID, TWILIO_AUTH_TOKEN and TWILIO_PHONE_NUMBER must be set"
                    .to_string(),
            });
        };

        let form = [
            ("To", message.to.as_str()),
            ("From", creds.from_number.as_str()),
            ("Body", message.body.as_str()),
        ];

        let response = self
            .client
            .post(self.messages_url(&creds.account_sid))
            .basic_auth(&creds.account_sid, Some(creds.auth_token.expose_secret()))
            .form(&form)
            .send()
            .await
            .map_err(|e| DeliveryError::Transport(format!("twilio request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(provider_error(PROVIDER, response).await);
        }

        let body: TwilioResponse = response.json().await.map_err(|e| DeliveryError::Provider {
            provider: PROVIDER.to_string(),
            message: format!("failed to parse response: {e}"),
        })?;

        tracing::debug!(to = %message.to, sid = ?body.sid, "sms accepted by twilio");
        Ok(DeliveryReceipt {
            provider_message_id: body.sid,
        })
    }
}
