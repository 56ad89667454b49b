use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{Display, EnumString};

use crate::errors::CoreError;
use crate::id::DocId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RevisionAction {
    Insert,
    Update,
    Delete,
}

/// A scheduled or applied mutation against a master document, stored in
/// `<collection>_revisions`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevisionRecord {
    pub id: DocId,
    pub toa: i64,
    pub processed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_process: Option<bool>,
    pub collection: String,
    pub master_id: DocId,
    pub action: RevisionAction,
    pub patch: Option<Value>,
    #[serde(default)]
    pub snapshot: Option<Value>,
    #[serde(default = "default_meta")]
    pub meta: Value,
}

fn default_meta() -> Value {
    Value::Object(Default::default())
}

/// JSON Schema for a revision record, ported from the original
/// `AsyncSchedulableDocumentRevisionStack.SCHEMA`.
pub const REVISION_SCHEMA: &str = r#"{
  "title": "Schedulable Revision Document",
  "type": "object",
  "required": ["toa", "processed", "collection", "master_id", "action", "patch"],
  "properties": {
    "toa": {"type": "integer"},
    "processed": {"type": "boolean"},
    "collection": {"type": "string"},
    "master_id": {"type": "string"},
    "action": {"type": "string", "enum": ["insert", "update", "delete"]},
    "patch": {"type": ["object", "null"]},
    "snapshot": {"type": ["object", "null"]},
    "meta": {"type": "object"}
  }
}"#;

impl RevisionRecord {
    /// Validate the JSON shape of an about-to-be-persisted revision against
    /// [`REVISION_SCHEMA`].
    pub fn validate_shape(value: &Value) -> Result<(), CoreError> {
        let schema: Value =
            serde_json::from_str(REVISION_SCHEMA).expect("schema literal is valid json");
        let validator =
            jsonschema::validator_for(&schema).expect("schema literal compiles");
        validator
            .validate(value)
            .map_err(|e| CoreError::SchemaViolation(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn action_round_trips_through_serde() {
        let json = serde_json::to_value(RevisionAction::Update).unwrap();
        assert_eq!(json, json!("update"));
        let back: RevisionAction = serde_json::from_value(json).unwrap();
        assert_eq!(back, RevisionAction::Update);
    }

    #[test]
    fn rejects_patch_of_the_wrong_type() {
        let value = json!({
            "toa": 1,
            "processed": false,
            "collection": "widgets",
            "master_id": "000000000000000000000000",
            "action": "update",
            "patch": "not an object",
            "meta": {}
        });
        assert!(RevisionRecord::validate_shape(&value).is_err());
    }

    #[test]
    fn accepts_a_well_formed_delete_revision() {
        let value = json!({
            "toa": 1,
            "processed": false,
            "collection": "widgets",
            "master_id": "000000000000000000000000",
            "action": "delete",
            "patch": null,
            "meta": {}
        });
        assert!(RevisionRecord::validate_shape(&value).is_ok());
    }
}
