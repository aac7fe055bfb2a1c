//! Channel transport adapters.
//!
//! Thin boundary clients to the external email and push providers. Every
//! failure (timeout, non-2xx, malformed response) is reported through the
//! send result with `success: false`; nothing is raised past this boundary.
//! Retry policy belongs to the delivery worker.

mod email;
mod push;
mod unconfigured;

pub use email::HttpEmailTransport;
pub use push::HttpPushTransport;
pub use unconfigured::UnconfiguredTransport;

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::config::TransportConfig;
use crate::notification::Metadata;

/// Errors raised while talking to a provider. Converted into a failed send
/// result before leaving the adapter.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The underlying HTTP request failed (network, DNS, timeout, etc.)
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The provider returned a non-2xx status code
    #[error("Provider returned HTTP {status}")]
    HttpStatus {
        status: u16,
        body: Option<serde_json::Value>,
    },

    /// The adapter cannot be built from the given settings
    #[error("Transport configuration error: {0}")]
    Config(String),
}

impl TransportError {
    /// Provider response body, when the provider answered at all
    pub fn response(&self) -> Option<serde_json::Value> {
        match self {
            TransportError::HttpStatus { body, .. } => body.clone(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmailMessage {
    pub to: Vec<String>,
    pub subject: String,
    pub html_body: String,
    pub text_body: String,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct EmailSendResult {
    pub success: bool,
    pub provider_message_id: Option<String>,
    pub error: Option<String>,
    /// Raw provider response, stored on the delivery as-is
    pub response: Option<serde_json::Value>,
}

impl EmailSendResult {
    pub fn sent(provider_message_id: Option<String>, response: Option<serde_json::Value>) -> Self {
        Self {
            success: true,
            provider_message_id,
            error: None,
            response,
        }
    }

    pub fn failed(error: impl Into<String>, response: Option<serde_json::Value>) -> Self {
        Self {
            success: false,
            provider_message_id: None,
            error: Some(error.into()),
            response,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PushMessage {
    pub device_tokens: Vec<String>,
    pub title: String,
    pub body: String,
    pub data: Metadata,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct PushSendResult {
    pub success: bool,
    pub sent_count: u32,
    pub failed_count: u32,
    pub provider_message_id: Option<String>,
    pub error: Option<String>,
    pub response: Option<serde_json::Value>,
}

impl PushSendResult {
    pub fn failed(
        error: impl Into<String>,
        failed_count: u32,
        response: Option<serde_json::Value>,
    ) -> Self {
        Self {
            success: false,
            sent_count: 0,
            failed_count,
            provider_message_id: None,
            error: Some(error.into()),
            response,
        }
    }
}

/// Transactional email provider boundary.
#[async_trait]
pub trait EmailTransport: Send + Sync {
    /// Adapter name for logs
    fn name(&self) -> &'static str;

    async fn send(&self, message: &EmailMessage) -> EmailSendResult;
}

/// Push provider boundary. All tokens in one message are one logical attempt.
#[async_trait]
pub trait PushTransport: Send + Sync {
    fn name(&self) -> &'static str;

    async fn send(&self, message: &PushMessage) -> PushSendResult;
}

/// Build both transports from configuration.
///
/// A channel without an endpoint gets an `UnconfiguredTransport`, so its
/// deliveries fail and retry through the normal path instead of aborting
/// startup.
pub fn create_transports(
    config: &TransportConfig,
) -> Result<(Arc<dyn EmailTransport>, Arc<dyn PushTransport>), TransportError> {
    let email: Arc<dyn EmailTransport> = match &config.email_api_endpoint {
        Some(endpoint) if !endpoint.is_empty() => {
            tracing::info!(transport = "email", endpoint = %endpoint, "Creating HTTP email transport");
            Arc::new(HttpEmailTransport::new(
                endpoint.clone(),
                config.email_api_key.clone(),
                config.email_from.clone(),
                config.timeout(),
            )?)
        }
        _ => {
            tracing::warn!(transport = "email", "No email endpoint configured, email deliveries will fail");
            Arc::new(UnconfiguredTransport::new("email"))
        }
    };

    let push: Arc<dyn PushTransport> = match &config.push_api_endpoint {
        Some(endpoint) if !endpoint.is_empty() => {
            tracing::info!(transport = "push", endpoint = %endpoint, "Creating HTTP push transport");
            Arc::new(HttpPushTransport::new(
                endpoint.clone(),
                config.push_api_key.clone(),
                config.timeout(),
                config.push_ttl_seconds,
            )?)
        }
        _ => {
            tracing::warn!(transport = "push", "No push endpoint configured, push deliveries will fail");
            Arc::new(UnconfiguredTransport::new("push"))
        }
    };

    Ok((email, push))
}

/// Read a response body as JSON, falling back to a JSON string for non-JSON
/// bodies. Empty bodies yield `None`.
pub(crate) async fn read_body(response: reqwest::Response) -> Option<serde_json::Value> {
    let text = response.text().await.ok()?;
    if text.trim().is_empty() {
        return None;
    }
    Some(serde_json::from_str(&text).unwrap_or(serde_json::Value::String(text)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_transports_without_endpoints() {
        let (email, push) = create_transports(&TransportConfig::default()).unwrap();
        assert_eq!(email.name(), "unconfigured");
        assert_eq!(push.name(), "unconfigured");
    }

    #[test]
    fn test_create_transports_with_endpoints() {
        let config = TransportConfig {
            email_api_endpoint: Some("https://mail.example.com/v1/send".into()),
            push_api_endpoint: Some("https://push.example.com/send".into()),
            ..Default::default()
        };
        let (email, push) = create_transports(&config).unwrap();
        assert_eq!(email.name(), "http_email");
        assert_eq!(push.name(), "http_push");
    }

    #[test]
    fn test_http_status_error_keeps_body() {
        let err = TransportError::HttpStatus {
            status: 502,
            body: Some(serde_json::json!({"message": "bad gateway"})),
        };
        assert_eq!(err.to_string(), "Provider returned HTTP 502");
        assert_eq!(err.response().unwrap()["message"], "bad gateway");
    }
}
