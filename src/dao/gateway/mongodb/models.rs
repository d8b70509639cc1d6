use mongodb::bson::{Document, doc};
use serde::{Deserialize, Serialize};

/// Document stored with a string `_id` derived from the record's stable key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoDocument<T> {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(flatten)]
    pub body: T,
}

impl<T> MongoDocument<T> {
    pub fn new(id: impl ToString, body: T) -> Self {
        Self {
            id: id.to_string(),
            body,
        }
    }
}

pub fn doc_id(id: &str) -> Document {
    doc! {"_id": id}
}
