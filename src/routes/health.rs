use axum::extract::State;
use axum::Json;
use serde::Serialize;
use sqlx::PgPool;
use utoipa::ToSchema;

use crate::services::poller::PollController;

/// State for the health endpoint.
#[derive(Clone)]
pub struct HealthState {
    pub pool: PgPool,
    pub poller: PollController,
}

/// Health check response.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// "ok" when the database answers, "degraded" otherwise
    pub status: String,
    /// API version
    pub version: String,
    /// Whether the database is reachable
    pub database: bool,
    /// Whether a polling session is running
    pub polling: bool,
}

impl HealthResponse {
    fn new(database: bool, polling: bool) -> Self {
        Self {
            status: if database { "ok" } else { "degraded" }.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            database,
            polling,
        }
    }
}

/// Health check endpoint.
///
/// Always 200; a failed `SELECT 1` is reported as "degraded" so the poller
/// stays observable while the database is down.
#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    responses(
        (status = 200, description = "Service health", body = HealthResponse),
    )
)]
pub async fn health_check(State(state): State<HealthState>) -> Json<HealthResponse> {
    let db_ok = sqlx::query_scalar::<_, i32>("SELECT 1")
        .fetch_one(&state.pool)
        .await
        .is_ok();

    Json(HealthResponse::new(db_ok, state.poller.status().is_active))
}
