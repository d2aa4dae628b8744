//! Operation descriptors and their validation.
//!
//! A descriptor is the untrusted `query` object of a request. Validation
//! turns it into a typed [`Command`]; nothing downstream re-checks shape.

use std::str::FromStr;

use mongodb::bson::Document;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{GatewayError, GatewayResult};
use crate::store::Namespace;

/// The fixed set of supported operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Create,
    Find,
    Insert,
    Update,
    Delete,
}

impl OperationKind {
    pub const ALL: [OperationKind; 5] = [
        OperationKind::Create,
        OperationKind::Find,
        OperationKind::Insert,
        OperationKind::Update,
        OperationKind::Delete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Create => "create",
            OperationKind::Find => "find",
            OperationKind::Insert => "insert",
            OperationKind::Update => "update",
            OperationKind::Delete => "delete",
        }
    }
}

impl FromStr for OperationKind {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OperationKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| GatewayError::UnsupportedOperation(format!("Unsupported operation: {s}")))
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operation descriptor as received on the wire.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct OperationDescriptor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update: Option<Value>,
}

/// Records to insert: one document, or an ordered batch.
#[derive(Debug, Clone, PartialEq)]
pub enum Records {
    One(Document),
    Many(Vec<Document>),
}

impl Records {
    pub fn len(&self) -> usize {
        match self {
            Records::One(_) => 1,
            Records::Many(records) => records.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A validated descriptor, ready to execute.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Create { ns: Namespace },
    Find { ns: Namespace, filter: Document },
    Insert { ns: Namespace, records: Records },
    Update { ns: Namespace, filter: Document, update: Document },
    Delete { ns: Namespace, filter: Document },
}

impl Command {
    pub fn kind(&self) -> OperationKind {
        match self {
            Command::Create { .. } => OperationKind::Create,
            Command::Find { .. } => OperationKind::Find,
            Command::Insert { .. } => OperationKind::Insert,
            Command::Update { .. } => OperationKind::Update,
            Command::Delete { .. } => OperationKind::Delete,
        }
    }

    pub fn namespace(&self) -> &Namespace {
        match self {
            Command::Create { ns }
            | Command::Find { ns, .. }
            | Command::Insert { ns, .. }
            | Command::Update { ns, .. }
            | Command::Delete { ns, .. } => ns,
        }
    }
}

impl OperationDescriptor {
    /// The declared operation. Unknown names are `UnsupportedOperation`.
    pub fn kind(&self) -> GatewayResult<OperationKind> {
        let name = self
            .operation
            .as_deref()
            .filter(|name| !name.is_empty())
            .ok_or_else(|| missing("operation"))?;
        name.parse()
    }

    /// Check that every field the operation needs is present and well shaped.
    pub fn validate(&self) -> GatewayResult<Command> {
        let kind = self.kind()?;
        let ns = Namespace::new(
            required_name(&self.db, "db")?,
            required_name(&self.collection, "collection")?,
        );

        let command = match kind {
            OperationKind::Create => Command::Create { ns },
            OperationKind::Find => {
                let filter = match &self.filter {
                    Some(filter) => to_document(filter, "filter")?,
                    None => Document::new(),
                };
                Command::Find { ns, filter }
            }
            OperationKind::Insert => Command::Insert {
                ns,
                records: to_records(required(&self.data, "data")?)?,
            },
            OperationKind::Update => {
                let filter = to_document(required(&self.filter, "filter")?, "filter")?;
                let update = to_document(required(&self.update, "update")?, "update")?;
                if update.is_empty() {
                    return Err(GatewayError::validation("Field 'update' must not be empty"));
                }
                Command::Update { ns, filter, update }
            }
            OperationKind::Delete => Command::Delete {
                ns,
                filter: to_document(required(&self.filter, "filter")?, "filter")?,
            },
        };
        Ok(command)
    }
}

fn missing(field: &str) -> GatewayError {
    GatewayError::validation(format!("Missing required field: {field}"))
}

fn required<'a>(value: &'a Option<Value>, field: &str) -> GatewayResult<&'a Value> {
    value.as_ref().ok_or_else(|| missing(field))
}

fn required_name(value: &Option<String>, field: &str) -> GatewayResult<String> {
    match value.as_deref() {
        Some(name) if !name.trim().is_empty() => Ok(name.to_string()),
        _ => Err(missing(field)),
    }
}

fn to_document(value: &Value, field: &str) -> GatewayResult<Document> {
    let Value::Object(map) = value else {
        return Err(GatewayError::validation(format!(
            "Field '{field}' must be an object"
        )));
    };
    Document::try_from(map.clone()).map_err(|e| {
        GatewayError::validation(format!("Field '{field}' is not a valid document: {e}"))
    })
}

fn to_records(value: &Value) -> GatewayResult<Records> {
    match value {
        Value::Object(_) => Ok(Records::One(to_document(value, "data")?)),
        Value::Array(items) if items.is_empty() => Err(GatewayError::validation(
            "Field 'data' must not be an empty array",
        )),
        Value::Array(items) => items
            .iter()
            .map(|item| to_document(item, "data"))
            .collect::<GatewayResult<Vec<_>>>()
            .map(Records::Many),
        _ => Err(GatewayError::validation(
            "Field 'data' must be an object or an array of objects",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use mongodb::bson::{doc, oid::ObjectId, Bson};
    use serde_json::json;

    fn descriptor(value: Value) -> OperationDescriptor {
        serde_json::from_value(value).unwrap()
    }

    fn kind_of(value: Value) -> ErrorKind {
        descriptor(value).validate().unwrap_err().kind()
    }

    #[test]
    fn parses_every_operation_name() {
        for kind in OperationKind::ALL {
            assert_eq!(kind.as_str().parse::<OperationKind>().unwrap(), kind);
        }
        let err = "drop".parse::<OperationKind>().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedOperation);
        assert_eq!(err.to_string(), "Unsupported operation: drop");
    }

    #[test]
    fn missing_required_fields_are_validation_errors() {
        let cases = [
            json!({ "collection": "c", "operation": "create" }),
            json!({ "db": "", "collection": "c", "operation": "find" }),
            json!({ "db": "d", "operation": "find" }),
            json!({ "db": "d", "collection": "c" }),
            json!({ "db": "d", "collection": "c", "operation": "insert" }),
            json!({ "db": "d", "collection": "c", "operation": "update", "update": { "$set": { "a": 1 } } }),
            json!({ "db": "d", "collection": "c", "operation": "update", "filter": {} }),
            json!({ "db": "d", "collection": "c", "operation": "delete" }),
        ];
        for case in cases {
            assert_eq!(kind_of(case.clone()), ErrorKind::Validation, "{case}");
        }
    }

    #[test]
    fn unknown_operation_is_unsupported() {
        let kind = kind_of(json!({ "db": "d", "collection": "c", "operation": "aggregate" }));
        assert_eq!(kind, ErrorKind::UnsupportedOperation);
    }

    #[test]
    fn find_defaults_to_match_all() {
        let command = descriptor(json!({ "db": "d", "collection": "c", "operation": "find" }))
            .validate()
            .unwrap();
        assert_eq!(
            command,
            Command::Find {
                ns: Namespace::new("d", "c"),
                filter: Document::new()
            }
        );
    }

    #[test]
    fn insert_distinguishes_single_and_batch() {
        let single = descriptor(json!({
            "db": "d", "collection": "c", "operation": "insert",
            "data": { "name": "John", "age": 25 }
        }))
        .validate()
        .unwrap();
        assert!(matches!(single, Command::Insert { records: Records::One(_), .. }));

        let batch = descriptor(json!({
            "db": "d", "collection": "c", "operation": "insert",
            "data": [{ "name": "John" }, { "name": "Jane" }]
        }))
        .validate()
        .unwrap();
        match batch {
            Command::Insert { records: Records::Many(records), .. } => {
                assert_eq!(records[0], doc! { "name": "John" });
                assert_eq!(records[1], doc! { "name": "Jane" });
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn insert_rejects_bad_shapes() {
        for data in [json!([]), json!([1, 2]), json!("text"), json!([{ "a": 1 }, 5])] {
            let kind = kind_of(json!({ "db": "d", "collection": "c", "operation": "insert", "data": data }));
            assert_eq!(kind, ErrorKind::Validation);
        }
    }

    #[test]
    fn filters_must_be_objects() {
        let kind = kind_of(json!({ "db": "d", "collection": "c", "operation": "delete", "filter": [1] }));
        assert_eq!(kind, ErrorKind::Validation);
    }

    #[test]
    fn empty_update_is_rejected() {
        let kind = kind_of(json!({
            "db": "d", "collection": "c", "operation": "update", "filter": {}, "update": {}
        }));
        assert_eq!(kind, ErrorKind::Validation);
    }

    #[test]
    fn extended_json_object_ids_are_understood() {
        let oid = ObjectId::new();
        let command = descriptor(json!({
            "db": "d", "collection": "c", "operation": "delete",
            "filter": { "_id": { "$oid": oid.to_hex() } }
        }))
        .validate()
        .unwrap();
        match command {
            Command::Delete { filter, .. } => {
                assert_eq!(filter.get("_id"), Some(&Bson::ObjectId(oid)));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
