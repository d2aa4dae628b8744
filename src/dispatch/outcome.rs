//! Normalized call results.
//!
//! Engine values are turned into plain JSON here: identifiers become hex
//! strings, everything else becomes relaxed Extended JSON.

use mongodb::bson::{Bson, Document};
use serde_json::{json, Map, Value};

use crate::error::GatewayError;
use crate::store::UpdateCounts;

/// Operation-specific success payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Success {
    Created { collection: String, created: bool },
    Found(Vec<Map<String, Value>>),
    InsertedOne(String),
    InsertedMany(Vec<String>),
    Updated(UpdateCounts),
    Deleted(u64),
}

/// Result of one gateway call.
pub type Outcome = Result<Success, GatewayError>;

impl Success {
    fn into_fields(self) -> Value {
        match self {
            Success::Created { collection, created } => {
                let message = if created {
                    format!("Collection {collection} created")
                } else {
                    format!("Collection {collection} already exists")
                };
                json!({ "message": message })
            }
            Success::Found(results) => json!({ "results": results }),
            Success::InsertedOne(id) => json!({ "inserted_id": id }),
            Success::InsertedMany(ids) => json!({ "inserted_ids": ids }),
            Success::Updated(counts) => json!({
                "matched_count": counts.matched,
                "modified_count": counts.modified,
            }),
            Success::Deleted(count) => json!({ "deleted_count": count }),
        }
    }
}

/// Wrap an outcome in the `{"status": ...}` envelope both transports send.
pub fn into_envelope(outcome: Outcome) -> Value {
    match outcome {
        Ok(success) => {
            let mut body = Map::new();
            body.insert("status".into(), Value::from("success"));
            if let Value::Object(fields) = success.into_fields() {
                body.extend(fields);
            }
            Value::Object(body)
        }
        Err(err) => json!({ "status": "error", "error": err.to_string() }),
    }
}

/// Convert an engine document to JSON, rendering identifiers as strings.
pub fn normalize_document(document: Document) -> Map<String, Value> {
    document
        .into_iter()
        .map(|(key, value)| (key, normalize_value(value)))
        .collect()
}

pub fn normalize_value(value: Bson) -> Value {
    match value {
        Bson::ObjectId(oid) => Value::String(oid.to_hex()),
        Bson::Document(document) => Value::Object(normalize_document(document)),
        Bson::Array(items) => Value::Array(items.into_iter().map(normalize_value).collect()),
        other => other.into_relaxed_extjson(),
    }
}

/// Render a generated identifier as a plain string.
pub fn id_to_string(id: Bson) -> String {
    match id {
        Bson::ObjectId(oid) => oid.to_hex(),
        Bson::String(s) => s,
        other => other.into_relaxed_extjson().to_string(),
    }
}
