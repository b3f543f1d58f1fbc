//! Normalized record produced by one poll iteration.
//!
//! A fetched body is either a structured JSON document or opaque text. Opaque
//! text is stored under a single `uid` field so every stored row carries a JSON
//! object in its `data` column.

use serde_json::{Map, Value};

/// Field that wraps an opaque (non-JSON) response body.
pub const OPAQUE_FIELD: &str = "uid";

/// Activity label used when the payload carries none.
pub const NO_ACTIVITY: &str = "No activity";

/// Type label used when the payload carries none.
pub const UNKNOWN_TYPE: &str = "unknown";

/// Participant count used when the payload carries none.
pub const DEFAULT_PARTICIPANTS: i32 = 1;

/// Column widths of `api_responses.activity` and `api_responses.type`.
const ACTIVITY_MAX_CHARS: usize = 256;
const TYPE_MAX_CHARS: usize = 100;

/// Body of a fetched response. Exactly one representation is populated.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Response declared a JSON content type and parsed into an object.
    Structured(Map<String, Value>),
    /// Any other response, trimmed.
    Opaque(String),
}

/// One fetched response, handed straight to the sink.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedRecord {
    pub payload: Payload,
}

/// Indexing fields derived from a record's payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordSummary {
    pub activity: String,
    pub kind: String,
    pub participants: i32,
}

impl FetchedRecord {
    pub fn structured(fields: Map<String, Value>) -> Self {
        Self {
            payload: Payload::Structured(fields),
        }
    }

    pub fn opaque(text: &str) -> Self {
        Self {
            payload: Payload::Opaque(text.trim().to_string()),
        }
    }

    /// The JSON document persisted for this record.
    pub fn document(&self) -> Value {
        match &self.payload {
            Payload::Structured(fields) => Value::Object(fields.clone()),
            Payload::Opaque(text) => {
                let mut fields = Map::new();
                fields.insert(OPAQUE_FIELD.to_string(), Value::String(text.clone()));
                Value::Object(fields)
            }
        }
    }

    /// Extract the summary columns stored alongside the document.
    ///
    /// `activity` falls back from the `activity` field to the `uid` field to
    /// [`NO_ACTIVITY`]. A present `uid` string is used as is, even when empty.
    pub fn summary(&self) -> RecordSummary {
        let doc = self.document();

        let activity = label(doc.get("activity"))
            .or_else(|| match doc.get(OPAQUE_FIELD) {
                Some(Value::String(uid)) => Some(uid.clone()),
                other => label(other),
            })
            .unwrap_or_else(|| NO_ACTIVITY.to_string());

        let kind = label(doc.get("type")).unwrap_or_else(|| UNKNOWN_TYPE.to_string());

        let participants = doc
            .get("participants")
            .and_then(Value::as_i64)
            .and_then(|n| i32::try_from(n).ok())
            .unwrap_or(DEFAULT_PARTICIPANTS);

        RecordSummary {
            activity: truncate_chars(&activity, ACTIVITY_MAX_CHARS),
            kind: truncate_chars(&kind, TYPE_MAX_CHARS),
            participants,
        }
    }
}

/// Render a scalar JSON value as a label. Empty strings, nulls and containers
/// count as absent.
fn label(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}
