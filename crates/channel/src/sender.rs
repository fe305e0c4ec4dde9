use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, info};

use atendia_core::config::{ChannelConfig, ChannelMode};

const SEND_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Error)]
pub enum SendError {
    #[error("channel is not configured: {0}")]
    NotConfigured(String),
    #[error("outbound request failed: {0}")]
    Transport(String),
    #[error("bridge rejected message with HTTP {status}: {body}")]
    Rejected { status: u16, body: String },
}

#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn send(&self, recipient: &str, text: &str) -> Result<(), SendError>;
}

/// Drops outbound messages after logging them. Used when no channel is configured.
#[derive(Default)]
pub struct NoopSender;

#[async_trait]
impl MessageSender for NoopSender {
    async fn send(&self, recipient: &str, text: &str) -> Result<(), SendError> {
        info!(
            event_name = "egress.noop.discarded",
            recipient,
            chars = text.chars().count(),
            "no channel configured; outbound message discarded"
        );
        Ok(())
    }
}

/// Posts `{ "to", "message" }` to a messaging bridge with a bearer token.
pub struct HttpBridgeSender {
    http: reqwest::Client,
    outbound_url: String,
    token: SecretString,
}

impl HttpBridgeSender {
    pub fn new(outbound_url: impl Into<String>, token: SecretString) -> Result<Self, SendError> {
        let http = reqwest::Client::builder()
            .timeout(SEND_TIMEOUT)
            .build()
            .map_err(|error| SendError::Transport(error.to_string()))?;
        Ok(Self { http, outbound_url: outbound_url.into(), token })
    }
}

#[async_trait]
impl MessageSender for HttpBridgeSender {
    async fn send(&self, recipient: &str, text: &str) -> Result<(), SendError> {
        let response = self
            .http
            .post(&self.outbound_url)
            .bearer_auth(self.token.expose_secret())
            .json(&json!({ "to": recipient, "message": text }))
            .send()
            .await
            .map_err(|error| SendError::Transport(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SendError::Rejected { status: status.as_u16(), body });
        }

        debug!(event_name = "egress.bridge.sent", recipient, "outbound message delivered to bridge");
        Ok(())
    }
}

pub fn sender_from_config(config: &ChannelConfig) -> Result<Arc<dyn MessageSender>, SendError> {
    match config.mode {
        ChannelMode::Noop => Ok(Arc::new(NoopSender)),
        ChannelMode::Bridge => {
            let url = config.outbound_url.clone().ok_or_else(|| {
                SendError::NotConfigured("channel.outbound_url is required in bridge mode".into())
            })?;
            let token = config.token.clone().ok_or_else(|| {
                SendError::NotConfigured("channel.token is required in bridge mode".into())
            })?;
            Ok(Arc::new(HttpBridgeSender::new(url, token)?))
        }
    }
}

#[cfg(test)]
mod tests {
    use secrecy::SecretString;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::{HttpBridgeSender, MessageSender, SendError};

    #[tokio::test]
    async fn bridge_sender_posts_with_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/send"))
            .and(header("authorization", "Bearer bridge-secret"))
            .and(body_json(json!({"to": "5491112345678@c.us", "message": "¡Hola!"})))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let sender = HttpBridgeSender::new(
            format!("{}/send", server.uri()),
            SecretString::from("bridge-secret".to_string()),
        )
        .expect("sender");

        sender.send("5491112345678@c.us", "¡Hola!").await.expect("send");
    }

    #[tokio::test]
    async fn bridge_rejection_is_reported_with_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("not linked"))
            .mount(&server)
            .await;

        let sender =
            HttpBridgeSender::new(server.uri(), SecretString::from("t".to_string())).expect("sender");

        let error = sender.send("5491112345678@c.us", "hola").await.expect_err("rejected");
        assert!(matches!(error, SendError::Rejected { status: 503, ref body } if body == "not linked"));
    }
}
