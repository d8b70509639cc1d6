use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const MATCH_PREFIX: &str = "match::";
pub const EVENT_PREFIX: &str = "event::";
pub const TIMER_PREFIX: &str = "timer::";
pub const STATUS_PREFIX: &str = "status::";

/// Envelope shared by every document the gateway writes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouchDocument<T> {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev", default, skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    #[serde(rename = "type")]
    pub doc_type: String,
    #[serde(flatten)]
    pub body: T,
}

impl<T> CouchDocument<T> {
    pub fn new(id: String, doc_type: &str, body: T) -> Self {
        Self {
            id,
            rev: None,
            doc_type: doc_type.to_string(),
            body,
        }
    }
}

/// Only the revision of an existing document, used to turn a PUT into an update.
#[derive(Debug, Deserialize)]
pub struct CouchRevision {
    #[serde(rename = "_rev")]
    pub rev: String,
}

pub fn match_doc_id(match_id: Uuid) -> String {
    format!("{MATCH_PREFIX}{match_id}")
}

pub fn event_doc_id(event_id: Uuid) -> String {
    format!("{EVENT_PREFIX}{event_id}")
}

pub fn timer_doc_id(timer_id: Uuid) -> String {
    format!("{TIMER_PREFIX}{timer_id}")
}

pub fn status_doc_id(match_id: Uuid) -> String {
    format!("{STATUS_PREFIX}{match_id}")
}
