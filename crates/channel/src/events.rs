use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

/// Suffix the messaging network uses for group identifiers.
pub const GROUP_SUFFIX: &str = "@g.us";
pub const BROADCAST_ID: &str = "status@broadcast";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundEnvelope {
    pub envelope_id: String,
    pub message: InboundMessage,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundMessage {
    /// Stable identifier of the correspondent, also the reply address.
    pub sender: String,
    pub text: String,
    pub is_group: bool,
    pub is_broadcast: bool,
    pub from_self: bool,
}

impl InboundMessage {
    pub fn direct(sender: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            text: text.into(),
            is_group: false,
            is_broadcast: false,
            from_self: false,
        }
    }
}

/// JSON body a messaging bridge posts for each received message.
#[derive(Clone, Debug, Deserialize)]
pub struct BridgePayload {
    #[serde(default)]
    pub id: Option<String>,
    pub from: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub is_group: bool,
    #[serde(default)]
    pub is_status: bool,
    #[serde(default)]
    pub from_me: bool,
}

impl BridgePayload {
    pub fn into_envelope(self, fallback_id: impl FnOnce() -> String) -> InboundEnvelope {
        let is_group = self.is_group || self.from.ends_with(GROUP_SUFFIX);
        let is_broadcast = self.is_status || self.from == BROADCAST_ID;
        InboundEnvelope {
            envelope_id: self.id.unwrap_or_else(fallback_id),
            message: InboundMessage {
                sender: self.from,
                text: self.body,
                is_group,
                is_broadcast,
                from_self: self.from_me,
            },
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IgnoreReason {
    FromSelf,
    Group,
    Broadcast,
    EmptyText,
}

impl IgnoreReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FromSelf => "from_self",
            Self::Group => "group",
            Self::Broadcast => "broadcast",
            Self::EmptyText => "empty_text",
        }
    }
}

/// Only direct, non-empty messages from other people reach the handler.
pub fn screen(message: &InboundMessage) -> Result<(), IgnoreReason> {
    if message.from_self {
        return Err(IgnoreReason::FromSelf);
    }
    if message.is_broadcast {
        return Err(IgnoreReason::Broadcast);
    }
    if message.is_group || message.sender.ends_with(GROUP_SUFFIX) {
        return Err(IgnoreReason::Group);
    }
    if message.text.trim().is_empty() {
        return Err(IgnoreReason::EmptyText);
    }
    Ok(())
}

#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("message handling failed: {0}")]
    Failed(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, message: InboundMessage) -> Result<(), HandlerError>;
}
