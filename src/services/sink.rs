//! Storage sink for fetched records.
//!
//! The poll loop only depends on [`RecordSink`]; failures are logged by the
//! caller and never stop polling.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;

use crate::db::queries::{self, InsertResponseParams};
use crate::services::record::FetchedRecord;

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("database insert failed: {0}")]
    Database(#[from] sqlx::Error),

    #[error("sink unavailable: {0}")]
    Unavailable(String),
}

/// Durable destination for one record at a time.
#[async_trait]
pub trait RecordSink: Send + Sync + 'static {
    async fn insert(&self, record: &FetchedRecord) -> Result<(), SinkError>;
}

/// Sink writing into the `api_responses` table.
#[derive(Debug, Clone)]
pub struct PgSink {
    pool: PgPool,
}

impl PgSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RecordSink for PgSink {
    async fn insert(&self, record: &FetchedRecord) -> Result<(), SinkError> {
        let summary = record.summary();
        let params = InsertResponseParams {
            data: record.document(),
            activity: summary.activity,
            kind: summary.kind,
            participants: summary.participants,
            timestamp: Utc::now(),
        };
        let id = queries::insert_response(&self.pool, params).await?;
        tracing::debug!("Inserted response {}", id);
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod fake {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};

    /// In-memory sink that records every inserted document.
    #[derive(Clone, Default)]
    pub(crate) struct FakeSink {
        records: Arc<Mutex<Vec<serde_json::Value>>>,
        failing: Arc<AtomicBool>,
    }

    impl FakeSink {
        pub(crate) fn new() -> Self {
            Self::default()
        }

        /// Make every following insert fail.
        pub(crate) fn set_failing(&self, failing: bool) {
            self.failing.store(failing, Ordering::SeqCst);
        }

        pub(crate) fn records(&self) -> Vec<serde_json::Value> {
            self.records
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .clone()
        }

        pub(crate) fn len(&self) -> usize {
            self.records.lock().unwrap_or_else(|e| e.into_inner()).len()
        }
    }

    #[async_trait]
    impl RecordSink for FakeSink {
        async fn insert(&self, record: &FetchedRecord) -> Result<(), SinkError> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(SinkError::Unavailable("fake sink set to fail".to_string()));
            }
            self.records
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(record.document());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fake::FakeSink;
    use super::*;
    use serde_json::json;
    use tokio_test::{assert_err, assert_ok};

    #[tokio::test]
    async fn test_fake_sink_records_documents() {
        let sink = FakeSink::new();
        assert_ok!(sink.insert(&FetchedRecord::opaque("abc")).await);
        assert_eq!(sink.records(), vec![json!({ "uid": "abc" })]);
    }

    #[tokio::test]
    async fn test_fake_sink_failure_injection() {
        let sink = FakeSink::new();
        sink.set_failing(true);
        assert_err!(sink.insert(&FetchedRecord::opaque("abc")).await);
        assert_eq!(sink.len(), 0);
    }
}
