use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

use atendia_db::DbPool;

#[derive(Clone)]
pub struct HealthState {
    db_pool: DbPool,
    channel_mode: &'static str,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub database: HealthCheck,
    pub channel: HealthCheck,
    pub checked_at: String,
}

pub fn router(db_pool: DbPool, channel_mode: &'static str) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { db_pool, channel_mode })
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let database = database_check(&state.db_pool).await;
    let ready = database.status == "ready";

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        service: HealthCheck {
            status: "ready",
            detail: "atendia-server runtime initialized".to_string(),
        },
        database,
        channel: HealthCheck {
            status: "ready",
            detail: format!("channel mode: {}", state.channel_mode),
        },
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

async fn database_check(pool: &DbPool) -> HealthCheck {
    match sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM turnos").fetch_one(pool).await {
        Ok(_) => HealthCheck { status: "ready", detail: "appointment store reachable".to_string() },
        Err(error) => {
            HealthCheck { status: "degraded", detail: format!("appointment store query failed: {error}") }
        }
    }
}
