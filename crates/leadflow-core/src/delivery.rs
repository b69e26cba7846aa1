//! Outbound delivery capabilities (ports).
//!
//! The engine sends email and SMS through these traits. Implementations live
//! in `leadflow-infra` (Resend, Twilio); tests inject recording fakes.

use leadflow_types::error::DeliveryError;

/// A fully personalized email ready to send.
#[derive(Debug, Clone, PartialEq)]
pub struct EmailMessage {
    pub from_name: String,
    pub from_email: String,
    pub to: String,
    pub subject: String,
    pub html: String,
    pub reply_to: Option<String>,
}

/// A fully personalized SMS ready to send. The sender number belongs to the
/// provider configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct SmsMessage {
    pub to: String,
    pub body: String,
}

/// Provider acknowledgement of an accepted message.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeliveryReceipt {
    /// Provider-side message identifier, when returned.
    pub provider_message_id: Option<String>,
}

/// Email delivery capability.
///
/// Returns [`DeliveryError::NotConfigured`] when credentials are missing;
/// callers treat that as fatal for the whole invocation.
pub trait EmailSender: Send + Sync {
    fn send(
        &self,
        message: &EmailMessage,
    ) -> impl std::future::Future<Output = Result<DeliveryReceipt, DeliveryError>> + Send;
}

/// SMS delivery capability.
pub trait SmsSender: Send + Sync {
    fn send(
        &self,
        message: &SmsMessage,
    ) -> impl std::future::Future<Output = Result<DeliveryReceipt, DeliveryError>> + Send;
}
