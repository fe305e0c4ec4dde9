//! Anthropic Messages API client.
//!
//! Tool calls travel as `tool_use` content blocks on assistant messages and their
//! outputs as `tool_result` blocks on the following user message.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use tracing::debug;

use atendia_core::config::LlmConfig;

use crate::llm::{ChatTurn, LlmClient, ModelResponse, ToolCall, ToolSpec};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct AnthropicClient {
    http: reqwest::Client,
    base_url: String,
    api_key: SecretString,
    model: String,
    max_tokens: u32,
}

impl AnthropicClient {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| anyhow!("llm.api_key is required for the anthropic provider"))?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("failed to build anthropic http client")?;

        Ok(Self {
            http,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            api_key,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
        })
    }
}

pub fn build_request_body(
    model: &str,
    max_tokens: u32,
    system: &str,
    tools: &[ToolSpec],
    history: &[ChatTurn],
) -> Value {
    let tools: Vec<Value> = tools
        .iter()
        .map(|tool| {
            json!({
                "name": tool.name,
                "description": tool.description,
                "input_schema": tool.input_schema,
            })
        })
        .collect();

    json!({
        "model": model,
        "max_tokens": max_tokens,
        "system": system,
        "tools": tools,
        "messages": history.iter().map(turn_to_json).collect::<Vec<_>>(),
    })
}

fn turn_to_json(turn: &ChatTurn) -> Value {
    match turn {
        ChatTurn::User(text) => json!({ "role": "user", "content": text }),
        ChatTurn::Assistant(text) => json!({ "role": "assistant", "content": text }),
        ChatTurn::ToolRequest { text, calls } => {
            let mut content = Vec::with_capacity(calls.len() + 1);
            if let Some(text) = text {
                content.push(json!({ "type": "text", "text": text }));
            }
            content.extend(calls.iter().map(|call| {
                json!({
                    "type": "tool_use",
                    "id": call.id,
                    "name": call.name,
                    "input": call.arguments,
                })
            }));
            json!({ "role": "assistant", "content": content })
        }
        ChatTurn::ToolResults(results) => {
            let content: Vec<Value> = results
                .iter()
                .map(|result| {
                    json!({
                        "type": "tool_result",
                        "tool_use_id": result.call_id,
                        "content": result.content,
                    })
                })
                .collect();
            json!({ "role": "user", "content": content })
        }
    }
}

pub fn parse_response(body: &Value) -> Result<ModelResponse> {
    let blocks = body["content"]
        .as_array()
        .ok_or_else(|| anyhow!("anthropic response is missing the `content` array"))?;

    let mut text_parts = Vec::new();
    let mut calls = Vec::new();
    for block in blocks {
        match block["type"].as_str().unwrap_or_default() {
            "text" => {
                if let Some(text) = block["text"].as_str() {
                    text_parts.push(text.to_string());
                }
            }
            "tool_use" => calls.push(ToolCall {
                id: block["id"].as_str().unwrap_or_default().to_string(),
                name: block["name"].as_str().unwrap_or_default().to_string(),
                arguments: block["input"].clone(),
            }),
            other => debug!(block_type = other, "ignoring anthropic content block"),
        }
    }

    let text = (!text_parts.is_empty()).then(|| text_parts.join("\n"));
    Ok(ModelResponse::from_parts(text, calls))
}

#[async_trait]
impl LlmClient for AnthropicClient {
    async fn complete(
        &self,
        system: &str,
        tools: &[ToolSpec],
        history: &[ChatTurn],
    ) -> Result<ModelResponse> {
        let body = build_request_body(&self.model, self.max_tokens, system, tools, history);
        let url = format!("{}/messages", self.base_url);
        debug!(model = %self.model, turns = history.len(), "sending anthropic completion request");

        let response = self
            .http
            .post(&url)
            .header("x-api-key", self.api_key.expose_secret())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .context("request to anthropic failed")?;

        let status = response.status();
        let text = response.text().await.context("failed to read anthropic response")?;
        if !status.is_success() {
            return Err(anyhow!("anthropic returned HTTP {status}: {text}"));
        }

        let json: Value = serde_json::from_str(&text).context("anthropic returned invalid JSON")?;
        parse_response(&json)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{build_request_body, parse_response};
    use crate::llm::{ChatTurn, ModelResponse, ToolCall, ToolResult};
    use crate::tools::catalog;

    #[test]
    fn request_body_carries_system_tools_and_tool_turns() {
        let history = vec![
            ChatTurn::User("¿Tenés turno el lunes?".to_string()),
            ChatTurn::ToolRequest {
                text: None,
                calls: vec![ToolCall {
                    id: "toolu_1".to_string(),
                    name: "check_availability".to_string(),
                    arguments: json!({"date": "2026-10-19"}),
                }],
            },
            ChatTurn::ToolResults(vec![ToolResult {
                call_id: "toolu_1".to_string(),
                content: "{\"available\":true}".to_string(),
            }]),
        ];

        let body = build_request_body("claude-test", 512, "sistema", &catalog(), &history);

        assert_eq!(body["system"], "sistema");
        assert_eq!(body["max_tokens"], 512);
        assert_eq!(body["tools"].as_array().map(Vec::len), Some(4));
        assert_eq!(body["messages"][1]["role"], "assistant");
        assert_eq!(body["messages"][1]["content"][0]["type"], "tool_use");
        assert_eq!(body["messages"][2]["role"], "user");
        assert_eq!(body["messages"][2]["content"][0]["tool_use_id"], "toolu_1");
    }

    #[test]
    fn tool_use_response_becomes_invocations() {
        let body = json!({
            "stop_reason": "tool_use",
            "content": [
                {"type": "text", "text": "Me fijo la agenda."},
                {"type": "tool_use", "id": "toolu_9", "name": "check_availability", "input": {"date": "2026-10-19"}}
            ]
        });

        let ModelResponse::ToolInvocations { text, calls } = parse_response(&body).expect("parse")
        else {
            panic!("expected tool invocations");
        };
        assert_eq!(text.as_deref(), Some("Me fijo la agenda."));
        assert_eq!(calls[0].id, "toolu_9");
        assert_eq!(calls[0].arguments["date"], "2026-10-19");
    }

    #[test]
    fn text_only_and_empty_responses_are_classified() {
        let text = json!({"content": [{"type": "text", "text": "¡Listo!"}]});
        assert_eq!(parse_response(&text).expect("parse"), ModelResponse::FinalText("¡Listo!".to_string()));

        let empty = json!({"content": []});
        assert_eq!(parse_response(&empty).expect("parse"), ModelResponse::Empty);

        assert!(parse_response(&json!({"error": "boom"})).is_err());
    }
}
