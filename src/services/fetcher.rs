//! Outbound HTTP client for polled endpoints.
//!
//! One GET per call. The body is classified by the declared `Content-Type`
//! header alone: anything mentioning `json` is parsed as a JSON object, every
//! other body is kept as trimmed text.

use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use serde_json::Value;

use crate::services::record::FetchedRecord;

const USER_AGENT: &str = concat!("PollIngest/", env!("CARGO_PKG_VERSION"));

/// Per-request timeout used by the poll loop.
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("endpoint returned HTTP {0}")]
    Status(reqwest::StatusCode),

    #[error("request failed: {0}")]
    Transport(reqwest::Error),

    #[error("invalid JSON body: {0}")]
    InvalidBody(String),
}

/// Client used for every polled endpoint. Cheap to clone.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .expect("Failed to build HTTP client");
        Self { client }
    }

    /// Fetch `endpoint` once and normalize the body into a record.
    pub async fn fetch(
        &self,
        endpoint: &str,
        timeout: Duration,
    ) -> Result<FetchedRecord, FetchError> {
        let response = self.get(endpoint, timeout).await?;

        let is_json = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|ct| ct.to_ascii_lowercase().contains("json"))
            .unwrap_or(false);

        let body = response
            .text()
            .await
            .map_err(|e| classify_transport(e, timeout))?;

        if !is_json {
            return Ok(FetchedRecord::opaque(&body));
        }

        match serde_json::from_str::<Value>(&body) {
            Ok(Value::Object(fields)) => Ok(FetchedRecord::structured(fields)),
            Ok(other) => Err(FetchError::InvalidBody(format!(
                "expected a JSON object, got {}",
                json_kind(&other)
            ))),
            Err(e) => Err(FetchError::InvalidBody(e.to_string())),
        }
    }

    /// Fetch `url` once and return the raw body text.
    pub async fn fetch_text(&self, url: &str, timeout: Duration) -> Result<String, FetchError> {
        let response = self.get(url, timeout).await?;
        response
            .text()
            .await
            .map_err(|e| classify_transport(e, timeout))
    }

    async fn get(&self, url: &str, timeout: Duration) -> Result<reqwest::Response, FetchError> {
        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| classify_transport(e, timeout))?;

        if !response.status().is_success() {
            return Err(FetchError::Status(response.status()));
        }

        Ok(response)
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

fn classify_transport(err: reqwest::Error, timeout: Duration) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout(timeout)
    } else {
        FetchError::Transport(err)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::record::Payload;
    use serde_json::json;
    use tokio_test::assert_err;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn serve(body: &str, mime: &str, status: u16) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/feed"))
            .respond_with(ResponseTemplate::new(status).set_body_raw(body.to_string(), mime))
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn test_json_body_is_structured() {
        let server = serve(
            r#"{"activity":"Go for a walk","type":"relaxation","participants":1}"#,
            "application/json; charset=utf-8",
            200,
        )
        .await;

        let record = HttpFetcher::new()
            .fetch(&format!("{}/feed", server.uri()), FETCH_TIMEOUT)
            .await
            .unwrap();

        assert_eq!(
            record.document(),
            json!({"activity": "Go for a walk", "type": "relaxation", "participants": 1})
        );
        assert!(matches!(record.payload, Payload::Structured(_)));
    }

    #[tokio::test]
    async fn test_vendor_json_content_type_is_structured() {
        let server = serve(r#"{"uid":"x"}"#, "application/vnd.api+json", 200).await;
        let record = HttpFetcher::new()
            .fetch(&format!("{}/feed", server.uri()), FETCH_TIMEOUT)
            .await
            .unwrap();
        assert!(matches!(record.payload, Payload::Structured(_)));
    }

    #[tokio::test]
    async fn test_plain_text_body_is_opaque_and_trimmed() {
        let server = serve("  0b6e1c2a-uid \n", "text/plain", 200).await;

        let record = HttpFetcher::new()
            .fetch(&format!("{}/feed", server.uri()), FETCH_TIMEOUT)
            .await
            .unwrap();

        assert_eq!(record.payload, Payload::Opaque("0b6e1c2a-uid".to_string()));
        assert_eq!(record.document(), json!({ "uid": "0b6e1c2a-uid" }));
    }

    #[tokio::test]
    async fn test_json_looking_text_without_json_content_type_is_opaque() {
        let server = serve(r#"{"activity":"x"}"#, "text/html", 200).await;
        let record = HttpFetcher::new()
            .fetch(&format!("{}/feed", server.uri()), FETCH_TIMEOUT)
            .await
            .unwrap();
        assert!(matches!(record.payload, Payload::Opaque(_)));
    }

    #[tokio::test]
    async fn test_server_error_is_status_error() {
        let server = serve("boom", "text/plain", 500).await;
        let result = HttpFetcher::new()
            .fetch(&format!("{}/feed", server.uri()), FETCH_TIMEOUT)
            .await;
        match result {
            Err(FetchError::Status(status)) => assert_eq!(status.as_u16(), 500),
            other => panic!("expected status error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_slow_endpoint_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/feed"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw("late", "text/plain")
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let result = HttpFetcher::new()
            .fetch(&format!("{}/feed", server.uri()), Duration::from_millis(50))
            .await;
        assert!(matches!(result, Err(FetchError::Timeout(_))), "{:?}", result);
    }

    #[tokio::test]
    async fn test_json_array_is_rejected() {
        let server = serve("[1,2,3]", "application/json", 200).await;
        let result = HttpFetcher::new()
            .fetch(&format!("{}/feed", server.uri()), FETCH_TIMEOUT)
            .await;
        assert!(matches!(result, Err(FetchError::InvalidBody(_))));
    }

    #[tokio::test]
    async fn test_malformed_json_is_rejected() {
        let server = serve("{not json", "application/json", 200).await;
        let result = HttpFetcher::new()
            .fetch(&format!("{}/feed", server.uri()), FETCH_TIMEOUT)
            .await;
        assert_err!(result);
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_transport_error() {
        // Port 9 (discard) is not served by anything in the test environment.
        let result = HttpFetcher::new()
            .fetch("http://127.0.0.1:9/feed", FETCH_TIMEOUT)
            .await;
        assert_err!(result);
    }

    #[tokio::test]
    async fn test_fetch_text_returns_raw_body() {
        let server = serve(" raw body ", "text/plain", 200).await;
        let text = HttpFetcher::new()
            .fetch_text(&format!("{}/feed", server.uri()), FETCH_TIMEOUT)
            .await
            .unwrap();
        assert_eq!(text, " raw body ");
    }
}
