use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

/// One stored poll result from the `api_responses` table.
#[derive(Debug, Clone, FromRow)]
pub struct StoredResponse {
    pub id: Uuid,
    /// Fetched document; opaque bodies are stored as `{"uid": "..."}`.
    pub data: serde_json::Value,
    pub activity: Option<String>,
    #[sqlx(rename = "type")]
    pub kind: Option<String>,
    pub participants: Option<i32>,
    /// Insert time, not taken from the source payload.
    pub timestamp: DateTime<Utc>,
}
