//! Outbound connectivity check.
//!
//! GET /api/test-call: fetches the configured test URL once and reports the
//! raw body or the failure. Useful to tell network problems apart from
//! problems with a polled endpoint.

use axum::extract::State;
use axum::Json;
use serde::Serialize;
use utoipa::ToSchema;

use crate::services::fetcher::{HttpFetcher, FETCH_TIMEOUT};

/// State for the test-call endpoint.
#[derive(Debug, Clone)]
pub struct TestCallState {
    pub fetcher: HttpFetcher,
    pub url: String,
}

/// Result of the connectivity check.
#[derive(Debug, Serialize, ToSchema)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum TestCallResponse {
    /// Raw response body
    Success { response: String },
    /// Failure description
    Error { message: String },
}

/// Call the configured test URL once.
#[utoipa::path(
    get,
    path = "/api/test-call",
    tag = "Diagnostics",
    responses(
        (status = 200, description = "Outcome of the outbound call", body = TestCallResponse),
    )
)]
pub async fn test_call(State(state): State<TestCallState>) -> Json<TestCallResponse> {
    match state.fetcher.fetch_text(&state.url, FETCH_TIMEOUT).await {
        Ok(response) => Json(TestCallResponse::Success { response }),
        Err(e) => {
            tracing::warn!("Test call to {} failed: {}", state.url, e);
            Json(TestCallResponse::Error {
                message: e.to_string(),
            })
        }
    }
}
