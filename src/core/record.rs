//! Record envelope model.
//!
//! Every governance record is a JSON document with two zones: a `header`
//! carrying integrity metadata and a `payload` carrying entity fields.
//! Validators and fixers work on the raw [`serde_json::Value`] so that
//! partially-invalid documents can still be inspected; [`Record`] is the typed
//! view a loader hands back once a document passes.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::fmt;
use std::str::FromStr;

use crate::core::error::LintError;

/// Schema version every header must declare.
pub const HEADER_VERSION: &str = "1.0";

/// Properties a header may carry.
pub const HEADER_PROPERTIES: &[&str] = &[
    "version",
    "type",
    "payloadChecksum",
    "signatures",
    "schemaUrl",
    "schemaChecksum",
];

/// Properties a signature may carry.
pub const SIGNATURE_PROPERTIES: &[&str] = &["keyId", "role", "notes", "signature", "timestamp"];

/// The seven governance entity kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Task,
    Cycle,
    Execution,
    Changelog,
    Feedback,
    Actor,
    Agent,
}

impl EntityType {
    pub const ALL: [EntityType; 7] = [
        EntityType::Task,
        EntityType::Cycle,
        EntityType::Execution,
        EntityType::Changelog,
        EntityType::Feedback,
        EntityType::Actor,
        EntityType::Agent,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Task => "task",
            EntityType::Cycle => "cycle",
            EntityType::Execution => "execution",
            EntityType::Changelog => "changelog",
            EntityType::Feedback => "feedback",
            EntityType::Actor => "actor",
            EntityType::Agent => "agent",
        }
    }

    /// Directory holding this entity's record files.
    pub fn dir_name(&self) -> &'static str {
        match self {
            EntityType::Task => "tasks",
            EntityType::Cycle => "cycles",
            EntityType::Execution => "executions",
            EntityType::Changelog => "changelogs",
            EntityType::Feedback => "feedback",
            EntityType::Actor => "actors",
            EntityType::Agent => "agents",
        }
    }

    pub fn from_dir_name(dir: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.dir_name() == dir)
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = LintError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| LintError::ValidationError(format!("unknown entity type '{}'", s)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Signature {
    pub key_id: String,
    pub role: String,
    pub notes: String,
    pub signature: String,
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordHeader {
    pub version: String,
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    pub payload_checksum: String,
    pub signatures: Vec<Signature>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_checksum: Option<String>,
}

/// A record that passed loading.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub entity_type: EntityType,
    pub header: RecordHeader,
    pub payload: JsonValue,
}

impl Record {
    pub fn id(&self) -> Option<&str> {
        self.payload.get("id").and_then(JsonValue::as_str)
    }

    pub fn to_json(&self) -> Result<JsonValue, LintError> {
        Ok(serde_json::json!({
            "header": serde_json::to_value(&self.header)?,
            "payload": self.payload,
        }))
    }
}

/// Borrow the header and payload objects of a raw document, if both exist.
pub fn envelope(doc: &JsonValue) -> Option<(&Map<String, JsonValue>, &Map<String, JsonValue>)> {
    let header = doc.get("header")?.as_object()?;
    let payload = doc.get("payload")?.as_object()?;
    Some((header, payload))
}

/// Fails unless `doc` has the header/payload envelope; repairs cannot synthesize it.
pub fn require_envelope(doc: &JsonValue) -> Result<(), LintError> {
    if envelope(doc).is_some() {
        Ok(())
    } else {
        Err(LintError::InvalidRecord(
            "record lacks the mandatory header/payload envelope".to_string(),
        ))
    }
}

/// Payload `id`, when present.
pub fn payload_id(doc: &JsonValue) -> Option<&str> {
    doc.get("payload")?.get("id")?.as_str()
}

/// Payload `status`, when present.
pub fn payload_status(doc: &JsonValue) -> Option<&str> {
    doc.get("payload")?.get("status")?.as_str()
}

/// Strings of a payload array field, ignoring non-string entries.
pub fn payload_str_list(doc: &JsonValue, field: &str) -> Vec<String> {
    doc.get("payload")
        .and_then(|p| p.get(field))
        .and_then(JsonValue::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

/// Signature objects of a raw document's header.
pub fn header_signatures(doc: &JsonValue) -> &[JsonValue] {
    doc.get("header")
        .and_then(|h| h.get("signatures"))
        .and_then(JsonValue::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}
