//! Stored response HTTP endpoints.
//!
//! - GET /api/data: every stored response, newest first
//! - DELETE /api/clear: delete every stored response

use axum::extract::State;
use axum::Json;
use serde::Serialize;
use sqlx::PgPool;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::db::{models, queries};
use crate::errors::{AppError, ErrorResponse};
use crate::routes::poller::MessageResponse;

/// Response type for GET /api/data.
#[derive(Debug, Serialize, ToSchema)]
pub struct StoredResponseItem {
    pub id: Uuid,
    /// Fetched document (opaque bodies appear as `{"uid": "..."}`)
    #[schema(value_type = Object)]
    pub data: serde_json::Value,
    pub activity: Option<String>,
    /// Type label from the payload ("unknown" when absent)
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub participants: Option<i32>,
    /// Insert time in RFC 3339 format
    pub timestamp: String,
}

impl From<models::StoredResponse> for StoredResponseItem {
    fn from(r: models::StoredResponse) -> Self {
        Self {
            id: r.id,
            data: r.data,
            activity: r.activity,
            kind: r.kind,
            participants: r.participants,
            timestamp: r.timestamp.to_rfc3339(),
        }
    }
}

/// List all stored responses, newest first.
#[utoipa::path(
    get,
    path = "/api/data",
    tag = "Data",
    responses(
        (status = 200, description = "Stored responses", body = Vec<StoredResponseItem>),
        (status = 500, description = "Database fetch failed", body = ErrorResponse),
    )
)]
pub async fn list_responses(
    State(pool): State<PgPool>,
) -> Result<Json<Vec<StoredResponseItem>>, AppError> {
    let rows = queries::list_responses(&pool).await?;
    Ok(Json(rows.into_iter().map(StoredResponseItem::from).collect()))
}

/// Delete all stored responses.
#[utoipa::path(
    delete,
    path = "/api/clear",
    tag = "Data",
    responses(
        (status = 200, description = "All records deleted", body = MessageResponse),
        (status = 500, description = "Database error", body = ErrorResponse),
    )
)]
pub async fn clear_responses(State(pool): State<PgPool>) -> Result<Json<MessageResponse>, AppError> {
    let deleted = queries::clear_responses(&pool).await?;
    tracing::info!("Cleared {} stored responses", deleted);
    Ok(Json(MessageResponse::new("All records deleted")))
}
