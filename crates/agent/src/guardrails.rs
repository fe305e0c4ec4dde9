use std::time::Duration;

use atendia_core::config::AgentConfig;
use atendia_core::domain::conversation::MAX_HISTORY_MESSAGES;
use tracing::info;

pub const EMPTY_RESPONSE_REPLY: &str = "Disculpá, hubo un error. ¿Podés repetir?";
pub const ROUND_LIMIT_REPLY: &str =
    "Disculpá, no pude completar tu pedido. ¿Me lo podés decir de otra forma?";
pub const TECHNICAL_FAILURE_REPLY: &str =
    "Disculpá, tuve un problema técnico. ¿Podés intentar de nuevo en un momento?";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GuardrailIntent {
    /// The model asks for another round of tools after `completed_rounds` rounds.
    ToolRound { completed_rounds: u32 },
    EmptyModelResponse,
    TurnFailure,
    CancelAppointment { owner: String, correspondent: String },
}

impl GuardrailIntent {
    pub fn action_key(&self) -> &'static str {
        match self {
            Self::ToolRound { .. } => "agent.tool_round",
            Self::EmptyModelResponse => "agent.empty_response",
            Self::TurnFailure => "agent.turn_failure",
            Self::CancelAppointment { .. } => "tool.cancel_appointment",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GuardrailDecision {
    Allow,
    Deny { reason_code: &'static str, user_message: String, fallback_path: &'static str },
    Degrade { reason_code: &'static str, user_message: String, fallback_path: &'static str },
}

impl GuardrailDecision {
    pub fn user_message(&self) -> Option<&str> {
        match self {
            Self::Allow => None,
            Self::Deny { user_message, .. } | Self::Degrade { user_message, .. } => {
                Some(user_message)
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GuardrailPolicy {
    pub max_tool_rounds: u32,
    pub turn_timeout: Duration,
    pub history_limit: usize,
}

impl Default for GuardrailPolicy {
    fn default() -> Self {
        Self {
            max_tool_rounds: 5,
            turn_timeout: Duration::from_secs(45),
            history_limit: MAX_HISTORY_MESSAGES,
        }
    }
}

impl GuardrailPolicy {
    pub fn from_config(config: &AgentConfig) -> Self {
        Self {
            max_tool_rounds: config.max_tool_rounds,
            turn_timeout: Duration::from_secs(config.turn_timeout_secs),
            history_limit: config.history_limit.min(MAX_HISTORY_MESSAGES),
        }
    }

    pub fn evaluate(&self, intent: &GuardrailIntent) -> GuardrailDecision {
        let decision = self.decide(intent);
        if let GuardrailDecision::Degrade { reason_code, fallback_path, .. }
        | GuardrailDecision::Deny { reason_code, fallback_path, .. } = &decision
        {
            info!(
                event_name = "agent.guardrail.applied",
                action = intent.action_key(),
                reason_code,
                fallback_path,
                "guardrail changed the turn outcome"
            );
        }
        decision
    }

    fn decide(&self, intent: &GuardrailIntent) -> GuardrailDecision {
        match intent {
            GuardrailIntent::ToolRound { completed_rounds }
                if *completed_rounds < self.max_tool_rounds =>
            {
                GuardrailDecision::Allow
            }
            GuardrailIntent::ToolRound { .. } => GuardrailDecision::Degrade {
                reason_code: "tool_round_limit",
                user_message: ROUND_LIMIT_REPLY.to_string(),
                fallback_path: "ask_patient_to_rephrase",
            },
            GuardrailIntent::EmptyModelResponse => GuardrailDecision::Degrade {
                reason_code: "empty_model_response",
                user_message: EMPTY_RESPONSE_REPLY.to_string(),
                fallback_path: "ask_patient_to_repeat",
            },
            GuardrailIntent::TurnFailure => GuardrailDecision::Degrade {
                reason_code: "turn_failure",
                user_message: TECHNICAL_FAILURE_REPLY.to_string(),
                fallback_path: "retry_later",
            },
            GuardrailIntent::CancelAppointment { owner, correspondent }
                if owner == correspondent =>
            {
                GuardrailDecision::Allow
            }
            // Reported exactly like an unknown id so other patients' bookings stay invisible.
            GuardrailIntent::CancelAppointment { .. } => GuardrailDecision::Deny {
                reason_code: "cancel_foreign_appointment",
                user_message: "Turno no encontrado.".to_string(),
                fallback_path: "appointment_not_found",
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use atendia_core::config::AgentConfig;

    use super::{GuardrailDecision, GuardrailIntent, GuardrailPolicy, ROUND_LIMIT_REPLY};

    #[test]
    fn tool_rounds_allowed_until_the_cap() {
        let policy = GuardrailPolicy::default();
        assert_eq!(
            policy.evaluate(&GuardrailIntent::ToolRound { completed_rounds: 4 }),
            GuardrailDecision::Allow
        );

        let decision = policy.evaluate(&GuardrailIntent::ToolRound { completed_rounds: 5 });
        let (reason_code, user_message, fallback_path) = match decision {
            GuardrailDecision::Degrade { reason_code, user_message, fallback_path } => {
                (reason_code, user_message, fallback_path)
            }
            _ => ("", String::new(), ""),
        };

        assert_eq!(reason_code, "tool_round_limit");
        assert_eq!(user_message, ROUND_LIMIT_REPLY);
        assert_eq!(fallback_path, "ask_patient_to_rephrase");
    }

    #[test]
    fn cancelling_someone_elses_appointment_is_denied() {
        let policy = GuardrailPolicy::default();
        let decision = policy.evaluate(&GuardrailIntent::CancelAppointment {
            owner: "5491100000001@c.us".to_string(),
            correspondent: "5491100000002@c.us".to_string(),
        });

        assert!(matches!(
            decision,
            GuardrailDecision::Deny { reason_code: "cancel_foreign_appointment", .. }
        ));
        assert_eq!(decision.user_message(), Some("Turno no encontrado."));
    }

    #[test]
    fn turn_failure_degrades_to_apology() {
        let decision = GuardrailPolicy::default().evaluate(&GuardrailIntent::TurnFailure);
        assert!(decision.user_message().is_some_and(|message| message.contains("problema técnico")));
    }

    #[test]
    fn history_limit_never_exceeds_store_capacity() {
        let policy = GuardrailPolicy::from_config(&AgentConfig {
            max_tool_rounds: 3,
            turn_timeout_secs: 10,
            history_limit: 500,
        });
        assert_eq!(policy.history_limit, 20);
        assert_eq!(policy.turn_timeout, Duration::from_secs(10));
    }
}
