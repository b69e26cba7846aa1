//! Resend email provider.
//!
//! Sends through `POST {base_url}/emails` with bearer authentication. The
//! API key is held as a [`SecretString`] and only exposed when building the
//! request header.

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use leadflow_core::delivery::{DeliveryReceipt, EmailMessage, EmailSender};
use leadflow_types::error::DeliveryError;

use super::{build_client, provider_error};

const PROVIDER: &str = "resend";

pub const DEFAULT_BASE_URL: &str = "https://api.resend.com";

pub struct ResendEmailSender {
    client: reqwest::Client,
    api_key: Option<SecretString>,
    base_url: String,
}

impl ResendEmailSender {
    pub fn new(api_key: Option<SecretString>, timeout: Duration) -> Result<Self, DeliveryError> {
        Ok(Self {
            client: build_client(timeout)?,
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    /// Override the base URL (used for tests and proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }
}

#[derive(Debug, Serialize)]
struct ResendRequest<'a> {
    from: String,
    to: [&'a str; 1],
    subject: &'a str,
    html: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_to: Option<&'a str>,
}

impl<'a> ResendRequest<'a> {
    fn from_message(message: &'a EmailMessage) -> Self {
        Self {
            from: format!("{} <{}>", message.from_name, message.from_email),
            to: [message.to.as_str()],
            subject: &message.subject,
            html: &message.html,
            reply_to: message.reply_to.as_deref(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ResendResponse {
    #[serde(default)]
    id: Option<String>,
}

impl EmailSender for ResendEmailSender {
    async fn send(&self, message: &EmailMessage) -> Result<DeliveryReceipt, DeliveryError> {
        let Some(api_key) = &self.api_key else {
            return Err(DeliveryError::NotConfigured {
                provider: PROVIDER.to_string(),
                message: "RESEND_API_KEY is not set".to_string(),
            });
        };

        let response = self
            .client
            .post(format!("{}/emails", self.base_url))
            .bearer_auth(api_key.expose_secret())
            .json(&ResendRequest::from_message(message))
            .send()
            .await
            .map_err(|e| DeliveryError::Transport(format!("resend request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(provider_error(PROVIDER, response).await);
        }

        let body: ResendResponse = response.json().await.map_err(|e| DeliveryError::Provider {
            provider: PROVIDER.to_string(),
            message: format!("failed to parse response: {e}"),
        })?;

        tracing::debug!(to = %message.to, id = ?body.id, "email accepted by resend");
        Ok(DeliveryReceipt {
            provider_message_id: body.id,
        })
    }
}
