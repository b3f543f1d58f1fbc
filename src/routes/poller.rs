//! Poller control HTTP endpoints.
//!
//! - POST /api/start: start a polling session
//! - POST /api/stop: stop the running session
//! - GET /api/status: current session status

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::errors::{AppError, ErrorResponse};
use crate::services::poller::{PollController, PollerStatus};

const DEFAULT_FREQUENCY: i64 = 2;
const DEFAULT_DURATION_SECS: i64 = 10;

/// Integer request field. Form-driven clients send numbers as strings.
#[derive(Debug, Clone, PartialEq, Deserialize, ToSchema)]
#[serde(untagged)]
pub enum IntegerField {
    Number(i64),
    Text(String),
}

impl IntegerField {
    fn parse(&self, name: &str) -> Result<i64, AppError> {
        match self {
            IntegerField::Number(n) => Ok(*n),
            IntegerField::Text(text) => text.trim().parse().map_err(|_| {
                AppError::BadRequest(format!("{} must be an integer, got {:?}", name, text))
            }),
        }
    }
}

/// Request body for POST /api/start.
#[derive(Debug, Deserialize, ToSchema)]
pub struct StartRequest {
    /// URL to poll
    pub endpoint: Option<String>,
    /// Requests per second of duration (default 2)
    pub frequency: Option<IntegerField>,
    /// Session length in seconds (default 10)
    pub duration: Option<IntegerField>,
}

/// Confirmation message.
#[derive(Debug, Serialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: &str) -> Self {
        Self {
            message: message.to_string(),
        }
    }
}

/// Start polling an endpoint.
///
/// Runs `frequency × duration` requests back to back in the background and
/// returns immediately.
#[utoipa::path(
    post,
    path = "/api/start",
    tag = "Poller",
    request_body = StartRequest,
    responses(
        (status = 200, description = "Polling started", body = MessageResponse),
        (status = 400, description = "Already polling, invalid parameters or malformed body", body = ErrorResponse),
    )
)]
pub async fn start_polling(
    State(poller): State<PollController>,
    payload: Result<Json<StartRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, AppError> {
    let Json(req) = payload.map_err(|e| AppError::BadRequest(e.body_text()))?;
    let endpoint = req
        .endpoint
        .filter(|e| !e.trim().is_empty())
        .ok_or_else(|| AppError::BadRequest("endpoint is required".to_string()))?;
    let frequency = match &req.frequency {
        Some(field) => field.parse("frequency")?,
        None => DEFAULT_FREQUENCY,
    };
    let duration = match &req.duration {
        Some(field) => field.parse("duration")?,
        None => DEFAULT_DURATION_SECS,
    };

    poller.start(&endpoint, frequency, duration).await?;
    Ok(Json(MessageResponse::new("Polling started")))
}

/// Stop the running polling session.
///
/// Succeeds when nothing is running. Waits briefly for the loop to exit.
#[utoipa::path(
    post,
    path = "/api/stop",
    tag = "Poller",
    responses(
        (status = 200, description = "Polling stopped", body = MessageResponse),
        (status = 500, description = "Poll loop failed while stopping", body = ErrorResponse),
    )
)]
pub async fn stop_polling(
    State(poller): State<PollController>,
) -> Result<Json<MessageResponse>, AppError> {
    poller.stop().await?;
    Ok(Json(MessageResponse::new("Polling stopped")))
}

/// Get the current polling status.
#[utoipa::path(
    get,
    path = "/api/status",
    tag = "Poller",
    responses(
        (status = 200, description = "Current poller status", body = PollerStatus),
    )
)]
pub async fn get_status(State(poller): State<PollController>) -> Json<PollerStatus> {
    Json(poller.status())
}
