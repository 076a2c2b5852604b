//! Entity schemas and the record loader.
//!
//! Each entity declares its payload properties (required + optional). The
//! built-in [`SchemaLoader`] checks a raw document against the envelope, the
//! header and signature shapes, the declared payload properties and the
//! payload checksum, reporting errors the way JSON Schema engines do: a field
//! path plus a short message. Any other engine can stand in through
//! [`RecordLoader`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::fmt;
use std::sync::{Arc, LazyLock};

use regex::Regex;

use crate::core::crypto::{Ed25519Provider, SignatureProvider};
use crate::core::record::{
    EntityType, HEADER_PROPERTIES, HEADER_VERSION, Record, RecordHeader, SIGNATURE_PROPERTIES,
};

pub const SIGNATURE_PATTERN: &str = "^[A-Za-z0-9+/]{86}==$";
pub const CHECKSUM_PATTERN: &str = "^[a-f0-9]{64}$";

static SIGNATURE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(SIGNATURE_PATTERN).expect("static regex"));
static CHECKSUM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(CHECKSUM_PATTERN).expect("static regex"));

pub fn is_valid_signature_string(s: &str) -> bool {
    SIGNATURE_RE.is_match(s)
}

/// Declared payload shape of one entity type.
#[derive(Debug)]
pub struct EntitySchema {
    pub entity_type: EntityType,
    pub required: &'static [&'static str],
    pub optional: &'static [&'static str],
    /// Declared properties that must be arrays when present.
    pub arrays: &'static [&'static str],
}

impl EntitySchema {
    pub fn declares(&self, key: &str) -> bool {
        self.required.contains(&key) || self.optional.contains(&key)
    }

    pub fn properties(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.required.iter().chain(self.optional.iter()).copied()
    }
}

pub static ENTITY_SCHEMAS: &[EntitySchema] = &[
    EntitySchema {
        entity_type: EntityType::Task,
        required: &["id", "title", "status", "priority", "description"],
        optional: &[
            "cycleIds",
            "tags",
            "references",
            "notes",
            "metadata",
            "createdAt",
            "updatedAt",
            "completedAt",
            "discardedAt",
        ],
        arrays: &["cycleIds", "tags", "references"],
    },
    EntitySchema {
        entity_type: EntityType::Cycle,
        required: &["id", "title", "status"],
        optional: &[
            "taskIds",
            "childCycleIds",
            "tags",
            "notes",
            "metadata",
            "createdAt",
            "updatedAt",
            "completedAt",
            "discardedAt",
        ],
        arrays: &["taskIds", "childCycleIds", "tags"],
    },
    EntitySchema {
        entity_type: EntityType::Execution,
        required: &["id", "taskId", "result"],
        optional: &[
            "type",
            "title",
            "notes",
            "references",
            "metadata",
            "createdAt",
            "updatedAt",
        ],
        arrays: &["references"],
    },
    EntitySchema {
        entity_type: EntityType::Changelog,
        required: &["id", "title", "description", "relatedTasks", "completedAt"],
        optional: &[
            "relatedCycles",
            "relatedExecutions",
            "version",
            "tags",
            "commits",
            "files",
            "notes",
            "references",
            "createdAt",
        ],
        arrays: &[
            "relatedTasks",
            "relatedCycles",
            "relatedExecutions",
            "tags",
            "commits",
            "files",
            "references",
        ],
    },
    EntitySchema {
        entity_type: EntityType::Feedback,
        required: &["id", "entityType", "entityId", "type", "status", "content"],
        optional: &[
            "assignee",
            "resolvesFeedbackId",
            "metadata",
            "createdAt",
            "updatedAt",
        ],
        arrays: &[],
    },
    EntitySchema {
        entity_type: EntityType::Actor,
        required: &["id", "type", "displayName", "publicKey", "roles"],
        optional: &["status", "supersededBy", "metadata"],
        arrays: &["roles"],
    },
    EntitySchema {
        entity_type: EntityType::Agent,
        required: &["id", "engine"],
        optional: &[
            "status",
            "triggers",
            "knowledge_dependencies",
            "prompt_engine_requirements",
            "metadata",
        ],
        arrays: &["triggers", "knowledge_dependencies"],
    },
];

pub fn schema_for(entity_type: EntityType) -> &'static EntitySchema {
    ENTITY_SCHEMAS
        .iter()
        .find(|s| s.entity_type == entity_type)
        .unwrap_or(&ENTITY_SCHEMAS[0])
}

/// One field-level error reported by a loader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<JsonValue>,
}

impl FieldError {
    fn new(field: impl Into<String>, message: impl Into<String>, value: Option<JsonValue>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            value,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidationFailure {
    pub entity: EntityType,
    pub field_errors: Vec<FieldError>,
}

/// Why a loader rejected a document. Only `Validation` carries field errors
/// the classifier understands; `Other` surfaces as an opaque schema finding.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadError {
    Validation(ValidationFailure),
    Other(String),
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadError::Validation(v) => write!(
                f,
                "invalid {} record ({} field error(s))",
                v.entity,
                v.field_errors.len()
            ),
            LoadError::Other(msg) => f.write_str(msg),
        }
    }
}

pub trait RecordLoader: Send + Sync {
    fn load(&self, entity_type: EntityType, doc: &JsonValue) -> Result<Record, LoadError>;
}

/// Declared-property loader for the seven entity types.
#[derive(Clone)]
pub struct SchemaLoader {
    provider: Arc<dyn SignatureProvider>,
}

impl Default for SchemaLoader {
    fn default() -> Self {
        Self::new(Arc::new(Ed25519Provider))
    }
}

impl SchemaLoader {
    pub fn new(provider: Arc<dyn SignatureProvider>) -> Self {
        Self { provider }
    }

    fn check_header(
        &self,
        entity_type: EntityType,
        header: &Map<String, JsonValue>,
        errors: &mut Vec<FieldError>,
    ) {
        for key in ["version", "type", "payloadChecksum", "signatures"] {
            if !header.contains_key(key) {
                errors.push(FieldError::new(
                    "/header",
                    format!("header must have required property '{}'", key),
                    None,
                ));
            }
        }
        for key in header.keys().filter(|k| !HEADER_PROPERTIES.contains(&k.as_str())) {
            errors.push(FieldError::new(
                "/header",
                "header must NOT have additional properties",
                Some(JsonValue::String(key.clone())),
            ));
        }
        if let Some(version) = header.get("version")
            && version.as_str() != Some(HEADER_VERSION)
        {
            errors.push(FieldError::new(
                "/header/version",
                "must be equal to constant",
                Some(version.clone()),
            ));
        }
        if let Some(tag) = header.get("type")
            && tag.as_str() != Some(entity_type.as_str())
        {
            errors.push(FieldError::new(
                "/header/type",
                "must be equal to constant",
                Some(tag.clone()),
            ));
        }
        if let Some(checksum) = header.get("payloadChecksum") {
            let well_formed = checksum.as_str().is_some_and(|s| CHECKSUM_RE.is_match(s));
            if !well_formed {
                errors.push(FieldError::new(
                    "/header/payloadChecksum",
                    format!("must match pattern \"{}\"", CHECKSUM_PATTERN),
                    Some(checksum.clone()),
                ));
            }
        }
        match header.get("signatures") {
            None => {}
            Some(JsonValue::Array(items)) if items.is_empty() => errors.push(FieldError::new(
                "/header/signatures",
                "must NOT have fewer than 1 items",
                None,
            )),
            Some(JsonValue::Array(items)) => {
                for (i, item) in items.iter().enumerate() {
                    check_signature(i, item, errors);
                }
            }
            Some(other) => errors.push(FieldError::new(
                "/header/signatures",
                "must be array",
                Some(other.clone()),
            )),
        }
    }

    fn check_payload(
        &self,
        entity_type: EntityType,
        payload: &Map<String, JsonValue>,
        errors: &mut Vec<FieldError>,
    ) {
        let schema = schema_for(entity_type);
        for key in schema.required.iter().filter(|k| !payload.contains_key(**k)) {
            errors.push(FieldError::new(
                "/payload",
                format!("must have required property '{}'", key),
                None,
            ));
        }
        for key in payload.keys().filter(|k| !schema.declares(k)) {
            errors.push(FieldError::new(
                "/payload",
                "payload must NOT have additional properties",
                Some(JsonValue::String(key.clone())),
            ));
        }
        if let Some(id) = payload.get("id")
            && !id.is_string()
        {
            errors.push(FieldError::new("/payload/id", "must be string", Some(id.clone())));
        }
        for key in schema.arrays {
            if let Some(value) = payload.get(*key)
                && !value.is_array()
            {
                errors.push(FieldError::new(
                    format!("/payload/{}", key),
                    "must be array",
                    Some(value.clone()),
                ));
            }
        }
    }
}

fn check_signature(index: usize, item: &JsonValue, errors: &mut Vec<FieldError>) {
    let base = format!("/header/signatures/{}", index);
    let Some(sig) = item.as_object() else {
        errors.push(FieldError::new(base, "must be object", Some(item.clone())));
        return;
    };
    for key in SIGNATURE_PROPERTIES.iter().filter(|k| !sig.contains_key(**k)) {
        errors.push(FieldError::new(
            base.clone(),
            format!("must have required property '{}'", key),
            None,
        ));
    }
    for key in sig.keys().filter(|k| !SIGNATURE_PROPERTIES.contains(&k.as_str())) {
        errors.push(FieldError::new(
            base.clone(),
            "signature must NOT have additional properties",
            Some(JsonValue::String(key.clone())),
        ));
    }
    for key in ["keyId", "role"] {
        if let Some(v) = sig.get(key)
            && !v.is_string()
        {
            errors.push(FieldError::new(format!("{}/{}", base, key), "must be string", Some(v.clone())));
        }
    }
    match sig.get("notes") {
        Some(JsonValue::String(s)) if s.is_empty() => errors.push(FieldError::new(
            format!("{}/notes", base),
            "must NOT have fewer than 1 characters",
            Some(JsonValue::String(String::new())),
        )),
        Some(JsonValue::String(_)) | None => {}
        Some(other) => errors.push(FieldError::new(
            format!("{}/notes", base),
            "must be string",
            Some(other.clone()),
        )),
    }
    if let Some(v) = sig.get("signature") {
        let ok = v.as_str().is_some_and(is_valid_signature_string);
        if !ok {
            errors.push(FieldError::new(
                format!("{}/signature", base),
                format!("must match pattern \"{}\"", SIGNATURE_PATTERN),
                Some(v.clone()),
            ));
        }
    }
    if let Some(v) = sig.get("timestamp")
        && !(v.is_i64() || v.is_u64())
    {
        errors.push(FieldError::new(
            format!("{}/timestamp", base),
            "must be integer",
            Some(v.clone()),
        ));
    }
}

impl RecordLoader for SchemaLoader {
    fn load(&self, entity_type: EntityType, doc: &JsonValue) -> Result<Record, LoadError> {
        let fail = |field_errors| {
            LoadError::Validation(ValidationFailure {
                entity: entity_type,
                field_errors,
            })
        };
        let Some(root) = doc.as_object() else {
            return Err(fail(vec![FieldError::new("/", "must be object", None)]));
        };

        let mut errors = Vec::new();
        for key in ["header", "payload"] {
            if !root.contains_key(key) {
                errors.push(FieldError::new(
                    "/",
                    format!("must have required property '{}'", key),
                    None,
                ));
            }
        }
        for key in root.keys().filter(|k| *k != "header" && *k != "payload") {
            errors.push(FieldError::new(
                "/",
                "must NOT have additional properties outside header and payload",
                Some(JsonValue::String(key.clone())),
            ));
        }

        let header = root.get("header");
        let payload = root.get("payload");
        match header {
            Some(JsonValue::Object(h)) => self.check_header(entity_type, h, &mut errors),
            Some(other) => errors.push(FieldError::new("/header", "header must be object", Some(other.clone()))),
            None => {}
        }
        match payload {
            Some(JsonValue::Object(p)) => self.check_payload(entity_type, p, &mut errors),
            Some(other) => errors.push(FieldError::new("/payload", "payload must be object", Some(other.clone()))),
            None => {}
        }

        // Checksum is only meaningful once both zones are well-formed enough to compare.
        if let (Some(h), Some(p)) = (header.and_then(JsonValue::as_object), payload)
            && p.is_object()
            && let Some(declared) = h.get("payloadChecksum").and_then(JsonValue::as_str)
            && CHECKSUM_RE.is_match(declared)
        {
            let actual = self.provider.checksum(p);
            if actual != declared {
                errors.push(FieldError::new(
                    "/header/payloadChecksum",
                    format!("payload checksum mismatch: expected {}", actual),
                    Some(JsonValue::String(declared.to_string())),
                ));
            }
        }

        if !errors.is_empty() {
            return Err(fail(errors));
        }

        let header: RecordHeader = serde_json::from_value(root["header"].clone())
            .map_err(|e| LoadError::Other(format!("cannot decode header: {}", e)))?;
        Ok(Record {
            entity_type,
            header,
            payload: root["payload"].clone(),
        })
    }
}
