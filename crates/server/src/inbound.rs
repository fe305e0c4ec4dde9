use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{error, info, warn};

use atendia_agent::{AgentRuntime, GuardrailIntent};
use atendia_channel::{HandlerError, InboundMessage, MessageHandler, MessageSender};
use atendia_core::domain::conversation::{ConversationMessage, MessageRole};
use atendia_db::repositories::ConversationRepository;

/// Handles one screened inbound message end to end.
///
/// The inbound text is stored before the agent runs and the reply only after it
/// succeeds, so a failed turn leaves just the patient's message in history.
pub struct InboundPipeline {
    conversations: Arc<dyn ConversationRepository>,
    agent: Arc<AgentRuntime>,
    sender: Arc<dyn MessageSender>,
}

impl InboundPipeline {
    pub fn new(
        conversations: Arc<dyn ConversationRepository>,
        agent: Arc<AgentRuntime>,
        sender: Arc<dyn MessageSender>,
    ) -> Self {
        Self { conversations, agent, sender }
    }

    async fn reply_to(&self, message: &InboundMessage) -> Result<String, HandlerError> {
        let correspondent = message.sender.as_str();
        let prior = self
            .conversations
            .get_or_create(correspondent, Utc::now())
            .await
            .map_err(|error| HandlerError::Failed(error.to_string()))?;

        self.conversations
            .append(
                correspondent,
                ConversationMessage::new(MessageRole::User, message.text.clone(), Utc::now()),
            )
            .await
            .map_err(|error| HandlerError::Failed(error.to_string()))?;

        let reply = self
            .agent
            .handle_message(correspondent, &prior.messages, &message.text)
            .await
            .map_err(|error| HandlerError::Failed(error.to_string()))?;

        self.conversations
            .append(
                correspondent,
                ConversationMessage::new(MessageRole::Assistant, reply.text.clone(), Utc::now()),
            )
            .await
            .map_err(|error| HandlerError::Failed(error.to_string()))?;

        info!(
            event_name = "agent.turn.replied",
            correspondent,
            rounds = reply.rounds,
            outcome = ?reply.outcome,
            "reply ready"
        );
        Ok(reply.text)
    }
}

#[async_trait]
impl MessageHandler for InboundPipeline {
    async fn handle(&self, message: InboundMessage) -> Result<(), HandlerError> {
        let reply = match self.reply_to(&message).await {
            Ok(reply) => reply,
            Err(failure) => {
                error!(
                    event_name = "agent.turn.failed",
                    correspondent = %message.sender,
                    error = %failure,
                    "turn failed; sending apology"
                );
                let decision = self.agent.guardrails().evaluate(&GuardrailIntent::TurnFailure);
                let apology = decision.user_message().unwrap_or_default();
                if let Err(send_error) = self.sender.send(&message.sender, apology).await {
                    warn!(
                        event_name = "egress.apology.failed",
                        correspondent = %message.sender,
                        error = %send_error,
                        "could not deliver apology"
                    );
                }
                return Err(failure);
            }
        };

        self.sender
            .send(&message.sender, &reply)
            .await
            .map_err(|error| HandlerError::Failed(format!("reply delivery failed: {error}")))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Arc;

    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Utc};
    use serde_json::json;
    use tokio::sync::Mutex;

    use atendia_agent::guardrails::TECHNICAL_FAILURE_REPLY;
    use atendia_agent::{AgentRuntime, ChatTurn, GuardrailPolicy, LlmClient, ModelResponse, ToolCall, ToolSpec};
    use atendia_channel::{InboundMessage, MessageHandler, MessageSender, SendError};
    use atendia_core::calendar::FixedClock;
    use atendia_core::domain::conversation::MessageRole;
    use atendia_db::repositories::{
        ConversationRepository, InMemoryAppointmentRepository, InMemoryConversationRepository,
        InMemoryPracticeConfigRepository,
    };
    use atendia_db::{BookingLedger, DemoPracticeSeed};

    use super::InboundPipeline;

    const JUAN: &str = "5491112345678@c.us";

    struct ScriptedLlm {
        script: Mutex<VecDeque<ModelResponse>>,
    }

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        async fn complete(&self, _: &str, _: &[ToolSpec], _: &[ChatTurn]) -> Result<ModelResponse> {
            self.script.lock().await.pop_front().ok_or_else(|| anyhow!("model unreachable"))
        }
    }

    #[derive(Default)]
    struct RecordingSender {
        sent: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl MessageSender for RecordingSender {
        async fn send(&self, recipient: &str, text: &str) -> Result<(), SendError> {
            self.sent.lock().await.push((recipient.to_string(), text.to_string()));
            Ok(())
        }
    }

    async fn pipeline(
        script: Vec<ModelResponse>,
    ) -> (InboundPipeline, Arc<InMemoryConversationRepository>, Arc<RecordingSender>, Arc<BookingLedger>)
    {
        let config = Arc::new(InMemoryPracticeConfigRepository::default());
        DemoPracticeSeed::load(config.as_ref()).await.expect("seed");
        let now = NaiveDateTime::new(
            NaiveDate::from_ymd_opt(2026, 10, 18).expect("date"),
            NaiveTime::from_hms_opt(10, 0, 0).expect("time"),
        );
        let ledger = Arc::new(BookingLedger::new(
            Arc::new(InMemoryAppointmentRepository::default()),
            config,
            Arc::new(FixedClock(now)),
        ));
        let llm = Arc::new(ScriptedLlm { script: Mutex::new(script.into()) });
        let agent = Arc::new(AgentRuntime::new(llm, ledger.clone(), GuardrailPolicy::default()));
        let conversations = Arc::new(InMemoryConversationRepository::default());
        let sender = Arc::new(RecordingSender::default());

        (
            InboundPipeline::new(conversations.clone(), agent, sender.clone()),
            conversations,
            sender,
            ledger,
        )
    }

    #[tokio::test]
    async fn booking_conversation_records_both_turns_and_replies() {
        let (pipeline, conversations, sender, ledger) = pipeline(vec![
            ModelResponse::ToolInvocations {
                text: None,
                calls: vec![ToolCall {
                    id: "call-1".to_string(),
                    name: "book_turno".to_string(),
                    arguments: json!({
                        "patient_name": "Juan Pérez",
                        "date": "2026-10-19",
                        "time": "09:00",
                        "service": "Limpieza dental",
                        "obra_social": "OSDE"
                    }),
                }],
            },
            ModelResponse::FinalText("¡Listo Juan! Te espero el lunes a las 09:00.".to_string()),
        ])
        .await;

        pipeline
            .handle(InboundMessage::direct(JUAN, "Quiero turno el lunes a las 9"))
            .await
            .expect("handled");

        let stored = conversations.get_or_create(JUAN, Utc::now()).await.expect("conversation");
        let roles: Vec<MessageRole> = stored.messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![MessageRole::User, MessageRole::Assistant]);

        let sent = sender.sent.lock().await.clone();
        assert_eq!(sent, vec![(JUAN.to_string(), "¡Listo Juan! Te espero el lunes a las 09:00.".to_string())]);

        let day = NaiveDate::from_ymd_opt(2026, 10, 19).expect("date");
        assert_eq!(ledger.available_slots(day).await.expect("slots").len(), 17);
    }

    #[tokio::test]
    async fn model_failure_sends_apology_and_keeps_only_inbound_message() {
        let (pipeline, conversations, sender, _) = pipeline(Vec::new()).await;

        let result = pipeline.handle(InboundMessage::direct(JUAN, "hola")).await;
        assert!(result.is_err());

        let stored = conversations.get_or_create(JUAN, Utc::now()).await.expect("conversation");
        assert_eq!(stored.messages.len(), 1);
        assert_eq!(stored.messages[0].role, MessageRole::User);

        let sent = sender.sent.lock().await.clone();
        assert_eq!(sent, vec![(JUAN.to_string(), TECHNICAL_FAILURE_REPLY.to_string())]);
    }
}
