use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::time::timeout;
use tracing::{info, warn};

use atendia_core::domain::conversation::{ConversationMessage, MessageRole};
use atendia_db::{BookingLedger, LedgerError};

use crate::guardrails::{GuardrailIntent, GuardrailPolicy};
use crate::llm::{ChatTurn, LlmClient, ModelResponse, ToolResult, ToolSpec};
use crate::prompt::system_context;
use crate::tools::{catalog, writes_ledger, ToolExecutor};

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("model call failed: {0:#}")]
    Model(anyhow::Error),
    #[error("{stage} exceeded the {limit:?} turn timeout")]
    Timeout { stage: &'static str, limit: Duration },
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TurnOutcome {
    Completed,
    RoundLimit,
    EmptyResponse,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TurnReply {
    pub text: String,
    pub rounds: u32,
    pub outcome: TurnOutcome,
}

/// Drives one inbound message through the bounded model/tool loop.
///
/// The runtime never touches the conversation store; the caller records the inbound
/// message and the returned reply.
pub struct AgentRuntime {
    llm: Arc<dyn LlmClient>,
    ledger: Arc<BookingLedger>,
    guardrails: GuardrailPolicy,
    tools: Vec<ToolSpec>,
}

impl AgentRuntime {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        ledger: Arc<BookingLedger>,
        guardrails: GuardrailPolicy,
    ) -> Self {
        Self { llm, ledger, guardrails, tools: catalog() }
    }

    pub fn guardrails(&self) -> &GuardrailPolicy {
        &self.guardrails
    }

    pub async fn handle_message(
        &self,
        correspondent: &str,
        history: &[ConversationMessage],
        text: &str,
    ) -> Result<TurnReply, AgentError> {
        let settings = self.ledger.practice_settings().await?;
        let system = system_context(&settings, self.ledger.clock().now());

        let mut working = self.seed_history(history);
        working.push(ChatTurn::User(text.to_string()));

        let executor = ToolExecutor::new(&self.ledger, &self.guardrails, correspondent);
        let mut rounds = 0u32;

        loop {
            let response = self
                .bounded("model call", self.llm.complete(&system, &self.tools, &working))
                .await?
                .map_err(AgentError::Model)?;

            let (text, calls) = match response {
                ModelResponse::FinalText(text) => {
                    info!(
                        event_name = "agent.turn.completed",
                        correspondent,
                        rounds,
                        "model produced final reply"
                    );
                    return Ok(TurnReply { text, rounds, outcome: TurnOutcome::Completed });
                }
                ModelResponse::Empty => {
                    warn!(
                        event_name = "agent.turn.empty_response",
                        correspondent,
                        rounds,
                        "model returned neither text nor tool calls"
                    );
                    let decision = self.guardrails.evaluate(&GuardrailIntent::EmptyModelResponse);
                    return Ok(TurnReply {
                        text: decision.user_message().unwrap_or_default().to_string(),
                        rounds,
                        outcome: TurnOutcome::EmptyResponse,
                    });
                }
                ModelResponse::ToolInvocations { text, calls } => (text, calls),
            };

            let decision =
                self.guardrails.evaluate(&GuardrailIntent::ToolRound { completed_rounds: rounds });
            if let Some(fallback) = decision.user_message() {
                warn!(
                    event_name = "agent.turn.round_limit",
                    correspondent,
                    rounds,
                    "tool round cap reached"
                );
                return Ok(TurnReply {
                    text: fallback.to_string(),
                    rounds,
                    outcome: TurnOutcome::RoundLimit,
                });
            }
            rounds += 1;

            let mut results = Vec::with_capacity(calls.len());
            for call in &calls {
                let content = if writes_ledger(&call.name) {
                    executor.execute(call).await?
                } else {
                    self.bounded("tool execution", executor.execute(call)).await??
                };
                results.push(ToolResult { call_id: call.id.clone(), content });
            }

            working.push(ChatTurn::ToolRequest { text, calls });
            working.push(ChatTurn::ToolResults(results));
        }
    }

    /// Most recent stored messages, never starting with an assistant turn.
    fn seed_history(&self, history: &[ConversationMessage]) -> Vec<ChatTurn> {
        let skip = history.len().saturating_sub(self.guardrails.history_limit);
        history[skip..]
            .iter()
            .skip_while(|message| message.role == MessageRole::Assistant)
            .map(ChatTurn::from)
            .collect()
    }

    async fn bounded<F, T>(&self, stage: &'static str, future: F) -> Result<T, AgentError>
    where
        F: std::future::Future<Output = T>,
    {
        let limit = self.guardrails.turn_timeout;
        timeout(limit, future).await.map_err(|_| AgentError::Timeout { stage, limit })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Utc};
    use serde_json::json;

    use atendia_core::calendar::FixedClock;
    use atendia_core::domain::appointment::{Appointment, AppointmentId, NewAppointment};
    use atendia_core::domain::conversation::{ConversationMessage, MessageRole};
    use atendia_db::repositories::{
        AppointmentRepository, InMemoryAppointmentRepository, InMemoryPracticeConfigRepository,
        RepositoryError,
    };
    use atendia_db::{BookingLedger, DemoPracticeSeed};

    use super::{AgentError, AgentRuntime, TurnOutcome};
    use crate::guardrails::{GuardrailPolicy, EMPTY_RESPONSE_REPLY, ROUND_LIMIT_REPLY};
    use crate::llm::{ChatTurn, LlmClient, ModelResponse, ToolCall, ToolSpec};

    const JUAN: &str = "5491112345678@c.us";

    #[derive(Default)]
    struct ScriptedLlm {
        script: Mutex<VecDeque<ModelResponse>>,
        repeat_tools: bool,
        seen: Mutex<Vec<Vec<ChatTurn>>>,
    }

    impl ScriptedLlm {
        fn new(script: Vec<ModelResponse>) -> Self {
            Self { script: Mutex::new(script.into()), ..Self::default() }
        }

        fn always_tools() -> Self {
            Self { repeat_tools: true, ..Self::default() }
        }

        fn calls(&self) -> usize {
            self.seen.lock().map(|seen| seen.len()).unwrap_or_default()
        }

        fn last_history(&self) -> Vec<ChatTurn> {
            self.seen.lock().ok().and_then(|seen| seen.last().cloned()).unwrap_or_default()
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        async fn complete(
            &self,
            _system: &str,
            tools: &[ToolSpec],
            history: &[ChatTurn],
        ) -> Result<ModelResponse> {
            assert_eq!(tools.len(), 4);
            self.seen.lock().map_err(|_| anyhow!("poisoned"))?.push(history.to_vec());
            if self.repeat_tools {
                return Ok(check_monday("loop"));
            }
            self.script
                .lock()
                .map_err(|_| anyhow!("poisoned"))?
                .pop_front()
                .ok_or_else(|| anyhow!("script exhausted"))
        }
    }

    struct SlowLlm;

    #[async_trait]
    impl LlmClient for SlowLlm {
        async fn complete(&self, _: &str, _: &[ToolSpec], _: &[ChatTurn]) -> Result<ModelResponse> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(ModelResponse::FinalText("tarde".to_string()))
        }
    }

    fn check_monday(id: &str) -> ModelResponse {
        ModelResponse::ToolInvocations {
            text: None,
            calls: vec![ToolCall {
                id: id.to_string(),
                name: "check_availability".to_string(),
                arguments: json!({"date": "2026-10-19"}),
            }],
        }
    }

    /// Commits bookings only after a delay longer than the test turn timeout.
    #[derive(Default)]
    struct SlowCommitRepository {
        inner: InMemoryAppointmentRepository,
    }

    #[async_trait]
    impl AppointmentRepository for SlowCommitRepository {
        async fn create(
            &self,
            request: NewAppointment,
            created_at: chrono::DateTime<Utc>,
        ) -> Result<Appointment, RepositoryError> {
            tokio::time::sleep(Duration::from_millis(200)).await;
            self.inner.create(request, created_at).await
        }

        async fn find_by_id(&self, id: AppointmentId) -> Result<Option<Appointment>, RepositoryError> {
            self.inner.find_by_id(id).await
        }

        async fn cancel(&self, id: AppointmentId) -> Result<bool, RepositoryError> {
            self.inner.cancel(id).await
        }

        async fn list_by_date(&self, date: NaiveDate) -> Result<Vec<Appointment>, RepositoryError> {
            self.inner.list_by_date(date).await
        }

        async fn list_by_phone(&self, phone: &str) -> Result<Vec<Appointment>, RepositoryError> {
            self.inner.list_by_phone(phone).await
        }

        async fn list_upcoming(
            &self,
            from: NaiveDate,
            limit: u32,
        ) -> Result<Vec<Appointment>, RepositoryError> {
            self.inner.list_upcoming(from, limit).await
        }

        async fn list_all(&self, limit: u32) -> Result<Vec<Appointment>, RepositoryError> {
            self.inner.list_all(limit).await
        }

        async fn list_pending_reminders(
            &self,
            date: NaiveDate,
        ) -> Result<Vec<Appointment>, RepositoryError> {
            self.inner.list_pending_reminders(date).await
        }

        async fn mark_reminded(&self, id: AppointmentId) -> Result<bool, RepositoryError> {
            self.inner.mark_reminded(id).await
        }
    }

    async fn runtime(llm: Arc<dyn LlmClient>, policy: GuardrailPolicy) -> AgentRuntime {
        let ledger = demo_ledger(Arc::new(InMemoryAppointmentRepository::default())).await;
        AgentRuntime::new(llm, ledger, policy)
    }

    async fn demo_ledger(appointments: Arc<dyn AppointmentRepository>) -> Arc<BookingLedger> {
        let config = Arc::new(InMemoryPracticeConfigRepository::default());
        DemoPracticeSeed::load(config.as_ref()).await.expect("seed");
        let now = NaiveDateTime::new(
            NaiveDate::from_ymd_opt(2026, 10, 18).expect("today"),
            NaiveTime::from_hms_opt(10, 0, 0).expect("time"),
        );
        Arc::new(BookingLedger::new(appointments, config, Arc::new(FixedClock(now))))
    }

    #[tokio::test]
    async fn one_tool_round_then_text() {
        let llm = Arc::new(ScriptedLlm::new(vec![
            check_monday("call-1"),
            ModelResponse::FinalText("El lunes tengo 09:00 y 09:30.".to_string()),
        ]));
        let runtime = runtime(llm.clone(), GuardrailPolicy::default()).await;

        let reply = runtime.handle_message(JUAN, &[], "¿Hay turno el lunes?").await.expect("turn");

        assert_eq!(reply.outcome, TurnOutcome::Completed);
        assert_eq!(reply.rounds, 1);
        assert_eq!(reply.text, "El lunes tengo 09:00 y 09:30.");
        assert_eq!(llm.calls(), 2);

        let history = llm.last_history();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0], ChatTurn::User("¿Hay turno el lunes?".to_string()));
        let ChatTurn::ToolResults(results) = &history[2] else {
            panic!("expected tool results turn");
        };
        assert_eq!(results[0].call_id, "call-1");
        assert!(results[0].content.contains("\"total\":18"));
    }

    #[tokio::test]
    async fn always_requesting_tools_stops_at_round_cap() {
        let llm = Arc::new(ScriptedLlm::always_tools());
        let policy = GuardrailPolicy { max_tool_rounds: 3, ..GuardrailPolicy::default() };
        let runtime = runtime(llm.clone(), policy).await;

        let reply = runtime.handle_message(JUAN, &[], "hola").await.expect("turn");

        assert_eq!(reply.outcome, TurnOutcome::RoundLimit);
        assert_eq!(reply.rounds, 3);
        assert_eq!(reply.text, ROUND_LIMIT_REPLY);
        assert_eq!(llm.calls(), 4);
    }

    #[tokio::test]
    async fn empty_response_yields_apology() {
        let llm = Arc::new(ScriptedLlm::new(vec![ModelResponse::Empty]));
        let runtime = runtime(llm, GuardrailPolicy::default()).await;

        let reply = runtime.handle_message(JUAN, &[], "hola").await.expect("turn");
        assert_eq!(reply.outcome, TurnOutcome::EmptyResponse);
        assert_eq!(reply.text, EMPTY_RESPONSE_REPLY);
    }

    #[tokio::test]
    async fn stored_history_is_trimmed_and_starts_with_user() {
        let llm = Arc::new(ScriptedLlm::new(vec![ModelResponse::FinalText("dale".to_string())]));
        let policy = GuardrailPolicy { history_limit: 3, ..GuardrailPolicy::default() };
        let runtime = runtime(llm.clone(), policy).await;

        let stored: Vec<ConversationMessage> = ["u1", "a1", "u2", "a2"]
            .iter()
            .map(|content| {
                let role =
                    if content.starts_with('u') { MessageRole::User } else { MessageRole::Assistant };
                ConversationMessage::new(role, *content, Utc::now())
            })
            .collect();

        runtime.handle_message(JUAN, &stored, "u3").await.expect("turn");

        assert_eq!(
            llm.last_history(),
            vec![
                ChatTurn::User("u2".to_string()),
                ChatTurn::Assistant("a2".to_string()),
                ChatTurn::User("u3".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn model_failure_and_timeout_surface_as_errors() {
        let exhausted = Arc::new(ScriptedLlm::new(Vec::new()));
        let runtime_a = runtime(exhausted, GuardrailPolicy::default()).await;
        assert!(matches!(
            runtime_a.handle_message(JUAN, &[], "hola").await,
            Err(AgentError::Model(_))
        ));

        let policy =
            GuardrailPolicy { turn_timeout: Duration::from_millis(50), ..GuardrailPolicy::default() };
        let runtime_b = runtime(Arc::new(SlowLlm), policy).await;
        assert!(matches!(
            runtime_b.handle_message(JUAN, &[], "hola").await,
            Err(AgentError::Timeout { stage: "model call", .. })
        ));
    }

    #[tokio::test]
    async fn slow_booking_commit_is_not_cut_off_by_the_turn_timeout() {
        let llm = Arc::new(ScriptedLlm::new(vec![
            ModelResponse::ToolInvocations {
                text: None,
                calls: vec![ToolCall {
                    id: "call-book".to_string(),
                    name: "book_turno".to_string(),
                    arguments: json!({
                        "patient_name": "Juan Pérez",
                        "date": "2026-10-19",
                        "time": "10:00",
                    }),
                }],
            },
            ModelResponse::FinalText("Listo, te reservé el lunes a las 10:00.".to_string()),
        ]));
        let ledger = demo_ledger(Arc::new(SlowCommitRepository::default())).await;
        let policy =
            GuardrailPolicy { turn_timeout: Duration::from_millis(50), ..GuardrailPolicy::default() };
        let runtime = AgentRuntime::new(llm.clone(), ledger.clone(), policy);

        let reply = runtime.handle_message(JUAN, &[], "Quiero turno el lunes 10:00").await.expect("turn");

        assert_eq!(reply.outcome, TurnOutcome::Completed);
        let ChatTurn::ToolResults(results) = &llm.last_history()[2] else {
            panic!("expected tool results turn");
        };
        assert!(results[0].content.contains("Turno confirmado"));
        let monday = NaiveDate::from_ymd_opt(2026, 10, 19).expect("date");
        assert_eq!(ledger.by_date(monday).await.expect("list").len(), 1);
    }
}
