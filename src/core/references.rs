//! Cross-record reference validation.
//!
//! The prefix checks on `payload.references[]` are pure. Everything else
//! resolves ids through a [`RecordStore`]: execution → task, task ↔ cycle
//! symmetry, feedback targets, typed references that name records, and the
//! actors behind signature key ids.
//!
//! All findings here are warnings (the record is usable, only inconsistent)
//! except a known prefix with an empty value, which is an error.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::core::findings::{BackReference, FindingContext, Level, LintResult, ValidatorKind};
use crate::core::record::{self, EntityType};
use crate::core::store::RecordStore;
use crate::core::validate::ValidationContext;

pub const KNOWN_PREFIXES: &[&str] = &[
    "task",
    "cycle",
    "execution",
    "changelog",
    "feedback",
    "actor",
    "agent",
    "file",
    "url",
    "commit",
    "pr",
    "adapter",
];

pub const DISCARDED_STATUS: &str = "discarded";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceOptions {
    /// Resolve signature key ids against the actor records.
    pub actors: bool,
}

impl Default for ReferenceOptions {
    fn default() -> Self {
        Self { actors: true }
    }
}

fn ctx_field(field: impl Into<String>, actual: Option<JsonValue>) -> Option<FindingContext> {
    Some(FindingContext {
        field: field.into(),
        actual,
        expected: None,
    })
}

/// Split a typed reference into `(prefix, value)`.
pub fn parse_reference(reference: &str) -> Option<(&str, &str)> {
    reference.split_once(':')
}

/// Prefix-level checks on `payload.references[]`; no lookups.
pub fn validate_reference_prefixes(doc: &JsonValue, ctx: &ValidationContext) -> Vec<LintResult> {
    let mut out = Vec::new();
    for (i, reference) in record::payload_str_list(doc, "references").iter().enumerate() {
        let field = format!("/payload/references/{}", i);
        let actual = Some(JsonValue::String(reference.clone()));
        let Some((prefix, value)) = parse_reference(reference) else {
            out.push(ctx.finding(
                Level::Warning,
                ValidatorKind::ReferentialIntegrity,
                format!("Malformed reference '{}': expected 'prefix:value'", reference),
                false,
                ctx_field(field, actual),
            ));
            continue;
        };
        if !KNOWN_PREFIXES.contains(&prefix) {
            out.push(ctx.finding(
                Level::Warning,
                ValidatorKind::ReferentialIntegrity,
                format!("Unknown reference prefix '{}' in '{}'", prefix, reference),
                false,
                ctx_field(field, actual),
            ));
        } else if value.trim().is_empty() {
            out.push(ctx.finding(
                Level::Error,
                ValidatorKind::ReferentialIntegrity,
                format!("Reference '{}' has an empty value after the prefix", reference),
                false,
                ctx_field(field, actual),
            ));
        }
    }
    out
}

/// Prefix checks plus every store-backed resolution.
pub fn validate_references(
    doc: &JsonValue,
    ctx: &ValidationContext,
    store: &dyn RecordStore,
    options: &ReferenceOptions,
) -> Vec<LintResult> {
    let mut out = validate_reference_prefixes(doc, ctx);
    let self_id = record::payload_id(doc)
        .unwrap_or(ctx.record_id.as_str())
        .to_string();

    resolve_typed_references(doc, ctx, store, &mut out);

    match ctx.entity_type {
        EntityType::Execution => {
            if let Some(task_id) = doc
                .get("payload")
                .and_then(|p| p.get("taskId"))
                .and_then(JsonValue::as_str)
            {
                check_target(store, ctx, EntityType::Task, task_id, "/payload/taskId", &mut out);
            }
        }
        EntityType::Task => check_mirror(
            doc,
            ctx,
            store,
            &self_id,
            Mirror {
                own_field: "cycleIds",
                other_type: EntityType::Cycle,
                other_field: "taskIds",
            },
            &mut out,
        ),
        EntityType::Cycle => check_mirror(
            doc,
            ctx,
            store,
            &self_id,
            Mirror {
                own_field: "taskIds",
                other_type: EntityType::Task,
                other_field: "cycleIds",
            },
            &mut out,
        ),
        EntityType::Feedback => {
            let payload = doc.get("payload");
            let target_type = payload
                .and_then(|p| p.get("entityType"))
                .and_then(JsonValue::as_str)
                .and_then(|s| s.parse::<EntityType>().ok());
            let target_id = payload
                .and_then(|p| p.get("entityId"))
                .and_then(JsonValue::as_str);
            if let (Some(target_type), Some(target_id)) = (target_type, target_id) {
                check_target(store, ctx, target_type, target_id, "/payload/entityId", &mut out);
            }
        }
        _ => {}
    }

    if options.actors {
        out.extend(validate_actor_resolution(doc, ctx, store));
    }

    out
}

/// Every signature `keyId` must name an actor record.
pub fn validate_actor_resolution(
    doc: &JsonValue,
    ctx: &ValidationContext,
    store: &dyn RecordStore,
) -> Vec<LintResult> {
    let mut out = Vec::new();
    for (i, sig) in record::header_signatures(doc).iter().enumerate() {
        let Some(key_id) = sig.get("keyId").and_then(JsonValue::as_str) else {
            continue;
        };
        if store.get(EntityType::Actor, key_id).is_none() {
            out.push(ctx.finding(
                Level::Warning,
                ValidatorKind::ActorResolution,
                format!("Signature keyId '{}' does not resolve to a known actor", key_id),
                false,
                ctx_field(
                    format!("/header/signatures/{}/keyId", i),
                    Some(JsonValue::String(key_id.to_string())),
                ),
            ));
        }
    }
    out
}

/// Warn when `id` of `target_type` is missing or soft-deleted.
fn check_target(
    store: &dyn RecordStore,
    ctx: &ValidationContext,
    target_type: EntityType,
    id: &str,
    field: &str,
    out: &mut Vec<LintResult>,
) {
    match store.get(target_type, id) {
        None => out.push(ctx.finding(
            Level::Warning,
            ValidatorKind::ReferentialIntegrity,
            format!("Referenced {} '{}' does not exist", target_type, id),
            false,
            ctx_field(field, Some(JsonValue::String(id.to_string()))),
        )),
        Some(target) if record::payload_status(&target) == Some(DISCARDED_STATUS) => {
            out.push(ctx.finding(
                Level::Warning,
                ValidatorKind::SoftDeleteDetection,
                format!("Referenced {} '{}' is discarded", target_type, id),
                false,
                ctx_field(field, Some(JsonValue::String(id.to_string()))),
            ))
        }
        Some(_) => {}
    }
}

fn resolve_typed_references(
    doc: &JsonValue,
    ctx: &ValidationContext,
    store: &dyn RecordStore,
    out: &mut Vec<LintResult>,
) {
    for (i, reference) in record::payload_str_list(doc, "references").iter().enumerate() {
        let Some((prefix, value)) = parse_reference(reference) else {
            continue;
        };
        if value.trim().is_empty() {
            continue;
        }
        if let Ok(target_type) = prefix.parse::<EntityType>() {
            check_target(
                store,
                ctx,
                target_type,
                value,
                &format!("/payload/references/{}", i),
                out,
            );
        }
    }
}

struct Mirror {
    own_field: &'static str,
    other_type: EntityType,
    other_field: &'static str,
}

fn check_mirror(
    doc: &JsonValue,
    ctx: &ValidationContext,
    store: &dyn RecordStore,
    self_id: &str,
    mirror: Mirror,
    out: &mut Vec<LintResult>,
) {
    for other_id in record::payload_str_list(doc, mirror.own_field) {
        let Some(other) = store.get(mirror.other_type, &other_id) else {
            out.push(ctx.finding(
                Level::Warning,
                ValidatorKind::ReferentialIntegrity,
                format!(
                    "{} '{}' lists missing {} '{}' in {}",
                    ctx.entity_type, self_id, mirror.other_type, other_id, mirror.own_field
                ),
                false,
                ctx_field(
                    format!("/payload/{}", mirror.own_field),
                    Some(JsonValue::String(other_id.clone())),
                ),
            ));
            continue;
        };
        let back_refs = record::payload_str_list(&other, mirror.other_field);
        if back_refs.iter().any(|id| id == self_id) {
            continue;
        }
        let back_reference = BackReference {
            entity_type: mirror.other_type,
            entity_id: other_id.clone(),
            field: mirror.other_field.to_string(),
            missing_id: self_id.to_string(),
        };
        out.push(ctx.finding(
            Level::Warning,
            ValidatorKind::BidirectionalConsistency,
            format!(
                "{} '{}' lists {} '{}' but {}.{} does not list '{}'",
                ctx.entity_type,
                self_id,
                mirror.other_type,
                other_id,
                mirror.other_type,
                mirror.other_field,
                self_id
            ),
            true,
            Some(FindingContext {
                field: mirror.other_field.to_string(),
                actual: Some(JsonValue::from(back_refs)),
                expected: serde_json::to_value(&back_reference).ok(),
            }),
        ));
    }
}
