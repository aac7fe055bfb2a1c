use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{read_body, PushMessage, PushSendResult, PushTransport, TransportError};

/// Push delivery over an FCM-style multicast HTTP API.
///
/// All device tokens of a delivery go out in one request; the attempt
/// succeeds when the provider accepts at least one of them.
pub struct HttpPushTransport {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    ttl_seconds: u64,
}

impl HttpPushTransport {
    pub fn new(
        endpoint: String,
        api_key: Option<String>,
        timeout: Duration,
        ttl_seconds: u64,
    ) -> Result<Self, TransportError> {
        if endpoint.is_empty() {
            return Err(TransportError::Config("push endpoint is empty".into()));
        }

        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            endpoint,
            api_key,
            ttl_seconds,
        })
    }

    fn payload(&self, message: &PushMessage) -> Value {
        // Providers require string values in the data payload
        let data: serde_json::Map<String, Value> = message
            .data
            .iter()
            .map(|(k, v)| {
                let s = match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (k.clone(), Value::String(s))
            })
            .collect();

        json!({
            "registration_ids": message.device_tokens,
            "notification": {
                "title": message.title,
                "body": message.body,
            },
            "data": data,
            "priority": "high",
            "time_to_live": self.ttl_seconds,
        })
    }

    async fn try_send(&self, message: &PushMessage) -> Result<Option<Value>, TransportError> {
        let mut request = self.client.post(&self.endpoint).json(&self.payload(message));
        if let Some(key) = &self.api_key {
            request = request.header(reqwest::header::AUTHORIZATION, format!("key={}", key));
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

/// Interpret a 2xx multicast response.
///
/// Missing `success`/`failure` counters mean the provider accepted every
/// token.
fn interpret_response(body: Option<Value>, token_count: u32) -> PushSendResult {
    let counter = |field: &str| {
        body.as_ref()
            .and_then(|b| b.get(field))
            .and_then(Value::as_u64)
            .map(|n| n.min(u32::MAX as u64) as u32)
    };

    let sent_count = counter("success").unwrap_or(token_count);
    let failed_count = counter("failure").unwrap_or(token_count.saturating_sub(sent_count));

    let provider_message_id = body
        .as_ref()
        .and_then(|b| b.get("multicast_id"))
        .and_then(|id| match id {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        });

    let success = sent_count > 0;
    PushSendResult {
        success,
        sent_count,
        failed_count,
        provider_message_id,
        error: (!success).then(|| format!("provider rejected all {} device tokens", failed_count)),
        response: body,
    }
}

#[async_trait]
impl PushTransport for HttpPushTransport {
    fn name(&self) -> &'static str {
        "http_push"
    }

    async fn send(&self, message: &PushMessage) -> PushSendResult {
        let token_count = message.device_tokens.len() as u32;
        if token_count == 0 {
            return PushSendResult::failed("no device tokens", 0, None);
        }

        match self.try_send(message).await {
            Ok(body) => {
                let result = interpret_response(body, token_count);
                tracing::debug!(
                    sent = result.sent_count,
                    failed = result.failed_count,
                    "Push request answered by provider"
                );
                result
            }
            Err(e) => {
                tracing::warn!(endpoint = %self.endpoint, error = %e, "Push send failed");
                let response = e.response();
                PushSendResult::failed(e.to_string(), token_count, response)
            }
        }
    }
}
