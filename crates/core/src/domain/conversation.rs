use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Only the most recent messages are kept; older ones are dropped, not summarized.
pub const MAX_HISTORY_MESSAGES: usize = 20;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(pub i64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub role: MessageRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ConversationMessage {
    pub fn new(role: MessageRole, content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self { role, content: content.into(), timestamp }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    pub correspondent: String,
    pub messages: Vec<ConversationMessage>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    pub fn new(id: ConversationId, correspondent: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self { id, correspondent: correspondent.into(), messages: Vec::new(), updated_at: now }
    }

    pub fn push(&mut self, message: ConversationMessage) {
        self.updated_at = message.timestamp;
        self.messages.push(message);
        if self.messages.len() > MAX_HISTORY_MESSAGES {
            let overflow = self.messages.len() - MAX_HISTORY_MESSAGES;
            self.messages.drain(..overflow);
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::{
        Conversation, ConversationId, ConversationMessage, MessageRole, MAX_HISTORY_MESSAGES,
    };

    #[test]
    fn history_is_a_bounded_fifo() {
        let mut conversation = Conversation::new(ConversationId(1), "5491100000000@c.us", Utc::now());
        for index in 0..(MAX_HISTORY_MESSAGES + 7) {
            let role = if index % 2 == 0 { MessageRole::User } else { MessageRole::Assistant };
            conversation.push(ConversationMessage::new(role, format!("m{index}"), Utc::now()));
            assert!(conversation.messages.len() <= MAX_HISTORY_MESSAGES);
        }

        assert_eq!(conversation.messages.len(), MAX_HISTORY_MESSAGES);
        assert_eq!(conversation.messages[0].content, "m7");
        assert_eq!(
            conversation.messages.last().map(|message| message.content.as_str()),
            Some("m26")
        );
    }

    #[test]
    fn messages_serialize_with_lowercase_roles() {
        let message = ConversationMessage::new(MessageRole::Assistant, "hola", Utc::now());
        let json = serde_json::to_value(&message).expect("serialize");
        assert_eq!(json["role"], "assistant");
        assert_eq!(json["content"], "hola");
    }
}
