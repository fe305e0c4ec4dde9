//! Agent runtime: turns one patient message into one reply.
//!
//! The model only ever talks; every fact it relays comes from a tool call against the
//! booking ledger. The loop is bounded in rounds and in time, and every degraded path
//! ends in a fixed Spanish reply chosen by the guardrail policy.
//!
//! - `llm` is the provider-neutral model interface, with `anthropic` and `openai`
//!   (also serving Ollama) as the concrete clients.
//! - `prompt` renders the system context from live configuration.
//! - `tools` is the booking tool catalog and dispatcher.
//! - `runtime` drives the loop.

pub mod anthropic;
pub mod guardrails;
pub mod llm;
pub mod openai;
pub mod prompt;
pub mod runtime;
pub mod tools;

pub use guardrails::{GuardrailDecision, GuardrailIntent, GuardrailPolicy};
pub use llm::{build_client, ChatTurn, LlmClient, ModelResponse, ToolCall, ToolResult, ToolSpec};
pub use runtime::{AgentError, AgentRuntime, TurnOutcome, TurnReply};
