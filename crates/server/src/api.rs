//! Dashboard JSON API and the inbound bridge webhook.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use atendia_channel::{BridgeInbox, BridgePayload};
use atendia_core::calendar::{format_date, format_time, parse_date};
use atendia_core::domain::appointment::{Appointment, AppointmentId};
use atendia_core::domain::conversation::{Conversation, ConversationMessage};
use atendia_core::errors::{ApplicationError, DomainError, InterfaceError};
use atendia_db::repositories::{ConversationRepository, PracticeConfigRepository};
use atendia_db::{BookingLedger, CancelOutcome};

pub const UPCOMING_LIMIT: u32 = 50;
pub const ALL_LIMIT: u32 = 100;
pub const CONVERSATION_LIMIT: u32 = 20;

#[derive(Clone)]
pub struct ApiState {
    pub ledger: Arc<BookingLedger>,
    pub conversations: Arc<dyn ConversationRepository>,
    pub practice_config: Arc<dyn PracticeConfigRepository>,
    /// `None` when the channel runs without a bridge; the webhook then answers 503.
    pub inbox: Option<BridgeInbox>,
    pub webhook_token: Option<SecretString>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ApiError {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

type Rejection = (StatusCode, Json<ApiError>);
type ApiResult<T> = Result<Json<T>, Rejection>;

fn api_error(status: StatusCode, message: impl Into<String>) -> Rejection {
    (status, Json(ApiError { error: message.into(), correlation_id: None }))
}

fn reject(error: InterfaceError) -> Rejection {
    let correlation_id = Some(error.correlation_id().to_string());
    let (status, message) = match error {
        InterfaceError::BadRequest { message, .. } => (StatusCode::BAD_REQUEST, message),
        InterfaceError::NotFound { message, .. } => (StatusCode::NOT_FOUND, message),
        other @ InterfaceError::ServiceUnavailable { .. } => {
            (StatusCode::SERVICE_UNAVAILABLE, other.user_message().to_string())
        }
        other @ InterfaceError::Internal { .. } => {
            (StatusCode::INTERNAL_SERVER_ERROR, other.user_message().to_string())
        }
    };
    (status, Json(ApiError { error: message, correlation_id }))
}

fn persistence(route: &'static str, cause: impl std::fmt::Display) -> Rejection {
    error!(event_name = "api.request.failed", correlation_id = route, error = %cause, "dashboard request failed");
    reject(ApplicationError::Persistence(cause.to_string()).into_interface(route))
}

/// Appointment as the dashboard consumes it (column names of the `turnos` table).
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TurnoView {
    pub id: i64,
    pub patient_name: String,
    pub patient_phone: String,
    pub date: String,
    pub time: String,
    pub service: Option<String>,
    pub obra_social: Option<String>,
    pub status: &'static str,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<Appointment> for TurnoView {
    fn from(appointment: Appointment) -> Self {
        Self {
            id: appointment.id.0,
            patient_name: appointment.patient_name,
            patient_phone: appointment.patient_phone,
            date: format_date(appointment.date),
            time: format_time(appointment.time),
            service: appointment.service,
            obra_social: appointment.payer,
            status: appointment.status.as_str(),
            notes: appointment.notes,
            created_at: appointment.created_at,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ConversationView {
    pub id: i64,
    pub patient_phone: String,
    pub messages: Vec<ConversationMessage>,
    pub updated_at: DateTime<Utc>,
}

impl From<Conversation> for ConversationView {
    fn from(conversation: Conversation) -> Self {
        Self {
            id: conversation.id.0,
            patient_phone: conversation.correspondent,
            messages: conversation.messages,
            updated_at: conversation.updated_at,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    pub today_count: usize,
    pub upcoming_count: usize,
    pub conversation_count: usize,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CancelResponse {
    pub success: bool,
    pub already_cancelled: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct WebhookAccepted {
    pub accepted: bool,
    pub envelope_id: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct TurnosQuery {
    pub all: Option<String>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/turnos", get(list_turnos))
        .route("/api/turnos/date/{date}", get(turnos_by_date))
        .route("/api/turnos/{id}/cancel", post(cancel_turno))
        .route("/api/conversations", get(list_conversations))
        .route("/api/config", get(practice_config))
        .route("/api/stats", get(stats))
        .route("/webhook/messages", post(receive_message))
        .with_state(state)
}

pub async fn list_turnos(
    State(state): State<ApiState>,
    Query(query): Query<TurnosQuery>,
) -> ApiResult<Vec<TurnoView>> {
    let appointments = if query.all.as_deref() == Some("true") {
        state.ledger.all(ALL_LIMIT).await
    } else {
        state.ledger.upcoming(UPCOMING_LIMIT).await
    }
    .map_err(|error| persistence("api.turnos.list", error))?;

    Ok(Json(appointments.into_iter().map(TurnoView::from).collect()))
}

pub async fn turnos_by_date(
    State(state): State<ApiState>,
    Path(date): Path<String>,
) -> ApiResult<Vec<TurnoView>> {
    let date = parse_date(&date).ok_or_else(|| {
        reject(InterfaceError::BadRequest {
            message: DomainError::InvalidDate(date.clone()).to_string(),
            correlation_id: "api.turnos.by_date".to_string(),
        })
    })?;
    let appointments =
        state.ledger.by_date(date).await.map_err(|error| persistence("api.turnos.by_date", error))?;
    Ok(Json(appointments.into_iter().map(TurnoView::from).collect()))
}

pub async fn cancel_turno(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
) -> ApiResult<CancelResponse> {
    let outcome = state
        .ledger
        .cancel(AppointmentId(id))
        .await
        .map_err(|error| persistence("api.turnos.cancel", error))?;

    match outcome {
        CancelOutcome::Cancelled(_) => {
            info!(event_name = "api.turno.cancelled", appointment_id = id, "appointment cancelled from dashboard");
            Ok(Json(CancelResponse { success: true, already_cancelled: false }))
        }
        CancelOutcome::AlreadyCancelled(_) => {
            Ok(Json(CancelResponse { success: true, already_cancelled: true }))
        }
        CancelOutcome::NotFound => {
            Err(reject(
                ApplicationError::from(DomainError::AppointmentNotFound(AppointmentId(id)))
                    .into_interface("api.turnos.cancel"),
            ))
        }
    }
}

pub async fn list_conversations(State(state): State<ApiState>) -> ApiResult<Vec<ConversationView>> {
    let conversations = state
        .conversations
        .list_recent(CONVERSATION_LIMIT)
        .await
        .map_err(|error| persistence("api.conversations", error))?;
    Ok(Json(conversations.into_iter().map(ConversationView::from).collect()))
}

pub async fn practice_config(State(state): State<ApiState>) -> ApiResult<BTreeMap<String, String>> {
    state
        .practice_config
        .get_all()
        .await
        .map(Json)
        .map_err(|error| persistence("api.config", error))
}

pub async fn stats(State(state): State<ApiState>) -> ApiResult<StatsResponse> {
    let today = state.ledger.clock().today();
    let today_count = state
        .ledger
        .by_date(today)
        .await
        .map_err(|error| persistence("api.stats", error))?
        .len();
    let upcoming_count = state
        .ledger
        .upcoming(UPCOMING_LIMIT)
        .await
        .map_err(|error| persistence("api.stats", error))?
        .len();
    let conversation_count = state
        .conversations
        .list_recent(CONVERSATION_LIMIT)
        .await
        .map_err(|error| persistence("api.stats", error))?
        .len();

    Ok(Json(StatsResponse { today_count, upcoming_count, conversation_count }))
}

pub async fn receive_message(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(payload): Json<BridgePayload>,
) -> Result<(StatusCode, Json<WebhookAccepted>), Rejection> {
    let Some(inbox) = state.inbox.as_ref() else {
        return Err(api_error(StatusCode::SERVICE_UNAVAILABLE, "messaging bridge is not enabled"));
    };

    if let Some(expected) = state.webhook_token.as_ref() {
        if !bearer_matches(&headers, expected) {
            warn!(event_name = "api.webhook.unauthorized", "rejected webhook call with bad token");
            return Err(api_error(StatusCode::UNAUTHORIZED, "invalid bearer token"));
        }
    }

    let envelope_id = inbox.deliver(payload).await.map_err(|error| {
        warn!(event_name = "api.webhook.inbox_closed", error = %error, "inbox closed");
        api_error(StatusCode::SERVICE_UNAVAILABLE, error.to_string())
    })?;

    Ok((StatusCode::ACCEPTED, Json(WebhookAccepted { accepted: true, envelope_id })))
}

fn bearer_matches(headers: &HeaderMap, expected: &SecretString) -> bool {
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .is_some_and(|token| token.trim() == expected.expose_secret())
}
