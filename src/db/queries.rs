use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::models::StoredResponse;

/// Parameters for inserting a new poll result.
pub struct InsertResponseParams {
    pub data: serde_json::Value,
    pub activity: String,
    pub kind: String,
    pub participants: i32,
    pub timestamp: DateTime<Utc>,
}

/// Insert a poll result (append-only). Returns the new row id.
pub async fn insert_response(
    pool: &PgPool,
    params: InsertResponseParams,
) -> Result<Uuid, sqlx::Error> {
    sqlx::query_scalar::<_, Uuid>(
        "INSERT INTO api_responses (id, data, activity, type, participants, timestamp)
         VALUES ($1, $2, $3, $4, $5, $6)
         RETURNING id",
    )
    .bind(Uuid::new_v4())
    .bind(params.data)
    .bind(&params.activity)
    .bind(&params.kind)
    .bind(params.participants)
    .bind(params.timestamp)
    .fetch_one(pool)
    .await
}

/// List all stored poll results, newest first.
pub async fn list_responses(pool: &PgPool) -> Result<Vec<StoredResponse>, sqlx::Error> {
    sqlx::query_as::<_, StoredResponse>(
        "SELECT id, data, activity, type, participants, timestamp
         FROM api_responses
         ORDER BY timestamp DESC",
    )
    .fetch_all(pool)
    .await
}

/// Delete every stored poll result. Returns the number of deleted rows.
pub async fn clear_responses(pool: &PgPool) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM api_responses")
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}
