//! Outbound delivery providers.
//!
//! [`ResendEmailSender`] and [`TwilioSmsSender`] implement the engine's
//! `EmailSender` / `SmsSender` capabilities over HTTP. Both accept missing
//! credentials at construction time and report `NotConfigured` on send, so
//! a process without SMS credentials still serves email-only workflows.

pub mod resend;
pub mod twilio;

pub use resend::ResendEmailSender;
pub use twilio::TwilioSmsSender;

use std::time::Duration;

use leadflow_types::error::DeliveryError;

/// Shared HTTP client construction for provider adapters.
fn build_client(timeout: Duration) -> Result<reqwest::Client, DeliveryError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| DeliveryError::Transport(format!("failed to create HTTP client: {e}")))
}

/// Map a non-success provider response into a `Provider` error carrying the body.
async fn provider_error(provider: &str, response: reqwest::Response) -> DeliveryError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    DeliveryError::Provider {
        provider: provider.to_string(),
        message: format!("HTTP {status}: {body}"),
    }
}
