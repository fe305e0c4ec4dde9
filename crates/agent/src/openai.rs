//! Chat-completions client for OpenAI and OpenAI-compatible endpoints such as Ollama.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use tracing::debug;

use atendia_core::config::{LlmConfig, LlmProvider};

use crate::llm::{ChatTurn, LlmClient, ModelResponse, ToolCall, ToolSpec};

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const OLLAMA_BASE_URL: &str = "http://localhost:11434";

pub struct OpenAiClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: Option<SecretString>,
    model: String,
    max_tokens: u32,
}

impl OpenAiClient {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("failed to build chat-completions http client")?;

        Ok(Self {
            http,
            endpoint: endpoint_for(config.provider, config.base_url.as_deref()),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
        })
    }
}

/// Ollama serves the compatible API under `/v1`; a bare host is completed accordingly.
fn endpoint_for(provider: LlmProvider, base_url: Option<&str>) -> String {
    let default = match provider {
        LlmProvider::Ollama => OLLAMA_BASE_URL,
        _ => OPENAI_BASE_URL,
    };
    let base = base_url.unwrap_or(default).trim_end_matches('/');
    if provider == LlmProvider::Ollama && !base.ends_with("/v1") {
        format!("{base}/v1/chat/completions")
    } else {
        format!("{base}/chat/completions")
    }
}

pub fn build_request_body(
    model: &str,
    max_tokens: u32,
    system: &str,
    tools: &[ToolSpec],
    history: &[ChatTurn],
) -> Value {
    let mut messages = vec![json!({ "role": "system", "content": system })];
    for turn in history {
        match turn {
            ChatTurn::User(text) => messages.push(json!({ "role": "user", "content": text })),
            ChatTurn::Assistant(text) => {
                messages.push(json!({ "role": "assistant", "content": text }))
            }
            ChatTurn::ToolRequest { text, calls } => {
                let tool_calls: Vec<Value> = calls
                    .iter()
                    .map(|call| {
                        json!({
                            "id": call.id,
                            "type": "function",
                            "function": {
                                "name": call.name,
                                "arguments": call.arguments.to_string(),
                            },
                        })
                    })
                    .collect();
                messages.push(json!({
                    "role": "assistant",
                    "content": text,
                    "tool_calls": tool_calls,
                }));
            }
            ChatTurn::ToolResults(results) => {
                messages.extend(results.iter().map(|result| {
                    json!({
                        "role": "tool",
                        "tool_call_id": result.call_id,
                        "content": result.content,
                    })
                }));
            }
        }
    }

    let tools: Vec<Value> = tools
        .iter()
        .map(|tool| {
            json!({
                "type": "function",
                "function": {
                    "name": tool.name,
                    "description": tool.description,
                    "parameters": tool.input_schema,
                },
            })
        })
        .collect();

    json!({
        "model": model,
        "max_tokens": max_tokens,
        "messages": messages,
        "tools": tools,
    })
}

pub fn parse_response(body: &Value) -> Result<ModelResponse> {
    let message = body["choices"]
        .get(0)
        .map(|choice| &choice["message"])
        .ok_or_else(|| anyhow!("chat-completions response has no choices"))?;

    let text = message["content"].as_str().map(str::to_string);
    let calls = message["tool_calls"]
        .as_array()
        .map(|calls| {
            calls
                .iter()
                .map(|call| {
                    let function = &call["function"];
                    // Arguments arrive as a JSON string; unparseable text is kept so the
                    // dispatcher can report it as malformed.
                    let arguments = match &function["arguments"] {
                        Value::String(raw) => {
                            serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.clone()))
                        }
                        other => other.clone(),
                    };
                    ToolCall {
                        id: call["id"].as_str().unwrap_or_default().to_string(),
                        name: function["name"].as_str().unwrap_or_default().to_string(),
                        arguments,
                    }
                })
                .collect()
        })
        .unwrap_or_default();

    Ok(ModelResponse::from_parts(text, calls))
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete(
        &self,
        system: &str,
        tools: &[ToolSpec],
        history: &[ChatTurn],
    ) -> Result<ModelResponse> {
        let body = build_request_body(&self.model, self.max_tokens, system, tools, history);
        debug!(model = %self.model, endpoint = %self.endpoint, "sending chat-completions request");

        let mut request = self.http.post(&self.endpoint).json(&body);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key.expose_secret());
        }

        let response = request.send().await.context("chat-completions request failed")?;
        let status = response.status();
        let text = response.text().await.context("failed to read chat-completions response")?;
        if !status.is_success() {
            return Err(anyhow!("chat-completions endpoint returned HTTP {status}: {text}"));
        }

        let json: Value =
            serde_json::from_str(&text).context("chat-completions endpoint returned invalid JSON")?;
        parse_response(&json)
    }
}
