use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use atendia_core::config::{LlmConfig, LlmProvider};
use atendia_core::domain::conversation::{ConversationMessage, MessageRole};

use crate::anthropic::AnthropicClient;
use crate::openai::OpenAiClient;

/// A tool the model may invoke, described with a JSON schema for its arguments.
#[derive(Clone, Debug, PartialEq)]
pub struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub input_schema: Value,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ToolResult {
    pub call_id: String,
    pub content: String,
}

/// One entry of the working history sent to the model.
#[derive(Clone, Debug, PartialEq)]
pub enum ChatTurn {
    User(String),
    Assistant(String),
    ToolRequest { text: Option<String>, calls: Vec<ToolCall> },
    ToolResults(Vec<ToolResult>),
}

impl From<&ConversationMessage> for ChatTurn {
    fn from(message: &ConversationMessage) -> Self {
        match message.role {
            MessageRole::User => Self::User(message.content.clone()),
            MessageRole::Assistant => Self::Assistant(message.content.clone()),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ModelResponse {
    FinalText(String),
    ToolInvocations { text: Option<String>, calls: Vec<ToolCall> },
    Empty,
}

impl ModelResponse {
    /// Tool calls win over text; blank text counts as no text.
    pub fn from_parts(text: Option<String>, calls: Vec<ToolCall>) -> Self {
        let text = text.filter(|text| !text.trim().is_empty());
        match (text, calls.is_empty()) {
            (text, false) => Self::ToolInvocations { text, calls },
            (Some(text), true) => Self::FinalText(text),
            (None, true) => Self::Empty,
        }
    }
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(
        &self,
        system: &str,
        tools: &[ToolSpec],
        history: &[ChatTurn],
    ) -> Result<ModelResponse>;
}

pub fn build_client(config: &LlmConfig) -> Result<Arc<dyn LlmClient>> {
    Ok(match config.provider {
        LlmProvider::Anthropic => Arc::new(AnthropicClient::new(config)?),
        LlmProvider::OpenAi | LlmProvider::Ollama => Arc::new(OpenAiClient::new(config)?),
    })
}
