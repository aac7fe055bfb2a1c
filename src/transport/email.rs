use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use super::{read_body, EmailMessage, EmailSendResult, EmailTransport, TransportError};

/// Transactional email over a JSON HTTP API.
///
/// Posts `{from, to, subject, html, text}` with a bearer key and reads the
/// provider message id from the `id` field of the response.
pub struct HttpEmailTransport {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    from: String,
}

impl HttpEmailTransport {
    pub fn new(
        endpoint: String,
        api_key: Option<String>,
        from: String,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        if endpoint.is_empty() {
            return Err(TransportError::Config("email endpoint is empty".into()));
        }

        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            endpoint,
            api_key,
            from,
        })
    }

    async fn try_send(
        &self,
        message: &EmailMessage,
    ) -> Result<Option<serde_json::Value>, TransportError> {
        let payload = json!({
            "from": self.from,
            "to": message.to,
            "subject": message.subject,
            "html": message.html_body,
            "text": message.text_body,
        });

        let mut request = self.client.post(&self.endpoint).json(&payload);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        let body = read_body(response).await;

        if !status.is_success() {
            return Err(TransportError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }
}

#[async_trait]
impl EmailTransport for HttpEmailTransport {
    fn name(&self) -> &'static str {
        "http_email"
    }

    async fn send(&self, message: &EmailMessage) -> EmailSendResult {
        if message.to.is_empty() {
            return EmailSendResult::failed("no recipient address", None);
        }

        match self.try_send(message).await {
            Ok(body) => {
                let message_id = body
                    .as_ref()
                    .and_then(|b| b.get("id"))
                    .and_then(|id| id.as_str())
                    .map(String::from);
                tracing::debug!(provider_message_id = ?message_id, "Email accepted by provider");
                EmailSendResult::sent(message_id, body)
            }
            Err(e) => {
                tracing::warn!(endpoint = %self.endpoint, error = %e, "Email send failed");
                let response = e.response();
                EmailSendResult::failed(e.to_string(), response)
            }
        }
    }
}
