use async_trait::async_trait;

use super::{
    EmailMessage, EmailSendResult, EmailTransport, PushMessage, PushSendResult, PushTransport,
};

/// Stand-in for a channel with no provider endpoint. Every send fails.
pub struct UnconfiguredTransport {
    channel: &'static str,
}

impl UnconfiguredTransport {
    pub fn new(channel: &'static str) -> Self {
        Self { channel }
    }

    fn error(&self) -> String {
        format!("{} transport not configured", self.channel)
    }
}

#[async_trait]
impl EmailTransport for UnconfiguredTransport {
    fn name(&self) -> &'static str {
        "unconfigured"
    }

    async fn send(&self, _message: &EmailMessage) -> EmailSendResult {
        EmailSendResult::failed(self.error(), None)
    }
}

#[async_trait]
impl PushTransport for UnconfiguredTransport {
    fn name(&self) -> &'static str {
        "unconfigured"
    }

    async fn send(&self, message: &PushMessage) -> PushSendResult {
        PushSendResult::failed(self.error(), message.device_tokens.len() as u32, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::Metadata;

    #[tokio::test]
    async fn test_always_fails() {
        let transport = UnconfiguredTransport::new("email");
        let result = EmailTransport::send(
            &transport,
            &EmailMessage {
                to: vec!["a@example.com".into()],
                subject: "s".into(),
                html_body: "h".into(),
                text_body: "t".into(),
            },
        )
        .await;
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("email transport not configured"));

        let transport = UnconfiguredTransport::new("push");
        let result = PushTransport::send(
            &transport,
            &PushMessage {
                device_tokens: vec!["tok".into()],
                title: "t".into(),
                body: "b".into(),
                data: Metadata::new(),
            },
        )
        .await;
        assert!(!result.success);
        assert_eq!(result.failed_count, 1);
    }
}
