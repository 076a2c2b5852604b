//! Repair engine.
//!
//! Fixable findings are grouped by `(filePath, validator)` so that every
//! group costs exactly one read-modify-write of the record it names. Groups
//! run one after another: two groups may touch the same file, and
//! bidirectional repairs write counterpart records.
//!
//! Per group: backup (optional), apply the validator's strategy, and on any
//! failure restore from the backup taken for that group.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use crate::core::backup::{self, BackupHandle};
use crate::core::crypto::{Ed25519Provider, SignatureProvider};
use crate::core::error::LintError;
use crate::core::findings::{
    BackReference, FixReport, FixResult, LintReport, LintResult, ValidatorKind,
};
use crate::core::record::{self, HEADER_PROPERTIES, HEADER_VERSION, SIGNATURE_PROPERTIES};
use crate::core::schemas::{self, schema_for};
use crate::core::store::RecordStore;

pub const DEFAULT_KEY_ID: &str = "system:govlint";
pub const DEFAULT_ROLE: &str = "author";
pub const DEFAULT_NOTES: &str = "Signature notes restored by govlint";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixOptions {
    /// Only repair these categories; `None` repairs every fixable one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fix_types: Option<Vec<ValidatorKind>>,
    pub create_backups: bool,
    /// Signer id used when a record has to be re-signed under a new identity.
    pub key_id: String,
    pub dry_run: bool,
    /// Base64 Ed25519 seed. Never serialized.
    #[serde(skip)]
    pub private_key: Option<String>,
}

impl Default for FixOptions {
    fn default() -> Self {
        Self {
            fix_types: None,
            create_backups: true,
            key_id: DEFAULT_KEY_ID.to_string(),
            dry_run: false,
            private_key: None,
        }
    }
}

impl FixOptions {
    fn selects(&self, kind: ValidatorKind) -> bool {
        self.fix_types.as_ref().is_none_or(|types| types.contains(&kind))
    }

    fn signing_key(&self) -> Result<&str, LintError> {
        self.private_key.as_deref().ok_or_else(|| {
            LintError::MissingPrivateKey(format!(
                "re-signing as '{}' needs a private key (--private-key-file or GOVLINT_PRIVATE_KEY)",
                self.key_id
            ))
        })
    }
}

/// Findings repaired together in one read-modify-write.
#[derive(Debug)]
pub struct FixGroup<'a> {
    pub file_path: &'a str,
    pub validator: ValidatorKind,
    pub findings: Vec<&'a LintResult>,
}

/// Fixable findings selected by `options`, grouped in first-seen order.
pub fn group_findings<'a>(report: &'a LintReport, options: &FixOptions) -> Vec<FixGroup<'a>> {
    let mut groups: Vec<FixGroup<'a>> = Vec::new();
    let mut index: FxHashMap<(&'a str, ValidatorKind), usize> = FxHashMap::default();
    for finding in report
        .results
        .iter()
        .filter(|r| r.fixable && options.selects(r.validator))
    {
        let key = (finding.file_path.as_str(), finding.validator);
        match index.get(&key) {
            Some(&i) => groups[i].findings.push(finding),
            None => {
                index.insert(key, groups.len());
                groups.push(FixGroup {
                    file_path: key.0,
                    validator: key.1,
                    findings: vec![finding],
                });
            }
        }
    }
    groups
}

/// Identity written into a regenerated signature.
struct Signer {
    key_id: String,
    role: String,
    notes: String,
}

fn non_empty_str<'a>(sig: Option<&'a JsonValue>, key: &str) -> Option<&'a str> {
    sig?.get(key)?.as_str().filter(|s| !s.trim().is_empty())
}

/// Take role/notes (and the key id when `keep_key_id`) from the first
/// signature of `doc`, falling back to defaults for absent or invalid values.
fn signer_for(doc: &JsonValue, fallback_key_id: &str, keep_key_id: bool) -> Signer {
    signer_from(record::header_signatures(doc).first(), fallback_key_id, keep_key_id)
}

fn signer_from(sig: Option<&JsonValue>, fallback_key_id: &str, keep_key_id: bool) -> Signer {
    let key_id = if keep_key_id {
        non_empty_str(sig, "keyId").unwrap_or(fallback_key_id)
    } else {
        fallback_key_id
    };
    Signer {
        key_id: key_id.to_string(),
        role: non_empty_str(sig, "role").unwrap_or(DEFAULT_ROLE).to_string(),
        notes: non_empty_str(sig, "notes").unwrap_or(DEFAULT_NOTES).to_string(),
    }
}

fn header_mut(doc: &mut JsonValue) -> Result<&mut Map<String, JsonValue>, LintError> {
    doc.get_mut("header")
        .and_then(JsonValue::as_object_mut)
        .ok_or_else(|| LintError::InvalidRecord("record header is not an object".to_string()))
}

fn payload_mut(doc: &mut JsonValue) -> Result<&mut Map<String, JsonValue>, LintError> {
    doc.get_mut("payload")
        .and_then(JsonValue::as_object_mut)
        .ok_or_else(|| LintError::InvalidRecord("record payload is not an object".to_string()))
}

fn to_record_bytes(doc: &JsonValue) -> Result<Vec<u8>, LintError> {
    let mut bytes = serde_json::to_vec_pretty(doc)?;
    bytes.push(b'\n');
    Ok(bytes)
}

fn is_notes_problem(finding: &LintResult) -> bool {
    finding.field().is_some_and(|f| f.ends_with("/notes")) || finding.message.contains("'notes'")
}

/// `N` of a `/header/signatures/N[/...]` field path.
fn signature_index(finding: &LintResult) -> Option<usize> {
    finding
        .field()?
        .strip_prefix("/header/signatures/")?
        .split('/')
        .next()?
        .parse()
        .ok()
}

/// What one flagged signature needs.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct SignatureRepair {
    notes: bool,
    strip: bool,
    regenerate: bool,
}

impl SignatureRepair {
    fn add(&mut self, finding: &LintResult) {
        if is_notes_problem(finding) {
            self.notes = true;
        } else if finding.message.contains("additional properties") {
            self.strip = true;
        } else {
            self.regenerate = true;
        }
    }
}

fn names_additional(finding: &LintResult, field: &str) -> bool {
    finding.field() == Some(field) && finding.message.contains("additional properties")
}

/// Repairs a lint report against a record store.
pub struct RepairEngine {
    store: Arc<dyn RecordStore>,
    provider: Arc<dyn SignatureProvider>,
}

impl RepairEngine {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self::with_provider(store, Arc::new(Ed25519Provider))
    }

    pub fn with_provider(store: Arc<dyn RecordStore>, provider: Arc<dyn SignatureProvider>) -> Self {
        Self { store, provider }
    }

    pub fn fix(&self, report: &LintReport, options: &FixOptions) -> FixReport {
        let groups = group_findings(report, options);
        tracing::debug!(groups = groups.len(), dry_run = options.dry_run, "fix started");

        let mut out = FixReport::default();
        for group in &groups {
            let Some(result) = self.fix_group(group, options, &mut out.summary.backups_created) else {
                continue;
            };
            if result.success {
                if !result.dry_run {
                    out.summary.fixed += 1;
                }
            } else {
                out.summary.failed += 1;
                tracing::warn!(
                    file = %result.file_path,
                    validator = %result.validator,
                    error = result.error.as_deref().unwrap_or_default(),
                    "repair failed"
                );
            }
            out.fixes.push(result);
        }

        tracing::info!(
            fixed = out.summary.fixed,
            failed = out.summary.failed,
            backups = out.summary.backups_created,
            "fix finished"
        );
        out
    }

    fn fix_group(&self, group: &FixGroup<'_>, options: &FixOptions, backups: &mut usize) -> Option<FixResult> {
        let planned = match group.validator {
            ValidatorKind::EmbeddedMetadataStructure => "would remove undeclared properties and re-sign",
            ValidatorKind::ChecksumVerification => "would recompute payload checksum",
            ValidatorKind::SignatureStructure => "would repair signature",
            ValidatorKind::BidirectionalConsistency => "would add missing back-references",
            other => {
                tracing::warn!(file = group.file_path, validator = %other, "no repair strategy, skipping");
                return None;
            }
        };
        let mut result = FixResult {
            file_path: group.file_path.to_string(),
            validator: group.validator,
            action: planned.to_string(),
            success: true,
            error: None,
            backup_path: None,
            dry_run: options.dry_run,
        };
        if options.dry_run {
            return Some(result);
        }

        tracing::debug!(file = group.file_path, validator = %group.validator, findings = group.findings.len(), "repairing group");
        let mut handles = Vec::new();
        let outcome = match group.validator {
            ValidatorKind::BidirectionalConsistency => self.fix_back_references(group, options, &mut handles),
            _ => self.fix_record(group, options, &mut handles),
        };
        *backups += handles.len();
        result.backup_path = handles.first().map(|h| h.backup.display().to_string());

        match outcome {
            Ok(action) => result.action = action,
            Err(e) => {
                for handle in &handles {
                    if let Err(restore_err) = backup::restore_backup(self.store.as_ref(), handle) {
                        tracing::error!(
                            file = %handle.original.display(),
                            backup = %handle.backup.display(),
                            error = %restore_err,
                            "restore from backup failed"
                        );
                    }
                }
                result.success = false;
                result.action = planned.trim_start_matches("would ").to_string();
                result.error = Some(e.to_string());
            }
        }
        Some(result)
    }

    /// One read and one write of the finding's own record.
    fn fix_record(
        &self,
        group: &FixGroup<'_>,
        options: &FixOptions,
        handles: &mut Vec<BackupHandle>,
    ) -> Result<String, LintError> {
        let path = PathBuf::from(group.file_path);
        if options.create_backups {
            handles.push(backup::create_backup(self.store.as_ref(), &path)?);
        }
        let mut doc: JsonValue = serde_json::from_slice(&self.store.read(&path)?)?;
        record::require_envelope(&doc)?;
        let action = match group.validator {
            ValidatorKind::EmbeddedMetadataStructure => self.fix_embedded(&mut doc, group, options)?,
            ValidatorKind::ChecksumVerification => self.fix_checksum(&mut doc)?,
            _ => self.fix_signature(&mut doc, group, options)?,
        };
        self.store.write(&path, &to_record_bytes(&doc)?)?;
        Ok(action)
    }

    fn fix_checksum(&self, doc: &mut JsonValue) -> Result<String, LintError> {
        let checksum = self.provider.checksum(&doc["payload"]);
        header_mut(doc)?.insert("payloadChecksum".to_string(), JsonValue::String(checksum));
        Ok("recomputed payload checksum".to_string())
    }

    fn fix_embedded(
        &self,
        doc: &mut JsonValue,
        group: &FixGroup<'_>,
        options: &FixOptions,
    ) -> Result<String, LintError> {
        let wants = |field: &str| group.findings.iter().any(|f| names_additional(f, field));
        let mut removed: Vec<String> = Vec::new();

        if wants("/") && let Some(root) = doc.as_object_mut() {
            let extra: Vec<String> = root
                .keys()
                .filter(|k| *k != "header" && *k != "payload")
                .cloned()
                .collect();
            for key in extra {
                root.remove(&key);
                removed.push(key);
            }
        }

        if wants("/header") {
            let header = header_mut(doc)?;
            header.retain(|key, _| {
                let keep = HEADER_PROPERTIES.contains(&key.as_str());
                if !keep {
                    removed.push(format!("header.{}", key));
                }
                keep
            });
        }

        let entity_type = group.findings[0].entity.entity_type;
        {
            let header = header_mut(doc)?;
            let missing = |key: &str| {
                group
                    .findings
                    .iter()
                    .any(|f| f.message.contains(&format!("required property '{}'", key)))
            };
            if !header.contains_key("version") && missing("version") {
                header.insert("version".to_string(), JsonValue::String(HEADER_VERSION.to_string()));
            }
            if !header.contains_key("type") && missing("type") {
                header.insert("type".to_string(), JsonValue::String(entity_type.as_str().to_string()));
            }
        }

        let mut payload_changed = false;
        if wants("/payload") {
            let schema = schema_for(entity_type);
            payload_mut(doc)?.retain(|key, _| {
                let keep = schema.declares(key);
                if !keep {
                    removed.push(format!("payload.{}", key));
                    payload_changed = true;
                }
                keep
            });
        }

        if payload_changed {
            let signer = signer_for(doc, &options.key_id, false);
            self.reseal(doc, &signer, options)?;
        }

        let mut action = if removed.is_empty() {
            "restored header metadata".to_string()
        } else {
            format!("removed undeclared properties: {}", removed.join(", "))
        };
        if payload_changed {
            action.push_str("; re-signed");
        }
        Ok(action)
    }

    /// Repair only the signatures the findings name, in place. Notes and
    /// undeclared properties are outside the signed digest, so only a
    /// signature with a broken value or a missing signed field is re-signed.
    fn fix_signature(
        &self,
        doc: &mut JsonValue,
        group: &FixGroup<'_>,
        options: &FixOptions,
    ) -> Result<String, LintError> {
        let mut plan: BTreeMap<usize, SignatureRepair> = BTreeMap::new();
        for finding in &group.findings {
            if let Some(i) = signature_index(finding) {
                plan.entry(i).or_default().add(finding);
            }
        }

        if plan.is_empty() {
            if !record::header_signatures(doc).is_empty() {
                return Ok("no signature named by the findings; left unchanged".to_string());
            }
            let signer = signer_for(doc, &options.key_id, true);
            self.reseal(doc, &signer, options)?;
            return Ok(format!("regenerated signature for '{}'", signer.key_id));
        }

        let payload = doc
            .get("payload")
            .cloned()
            .ok_or_else(|| LintError::InvalidRecord("record has no payload".to_string()))?;
        let header = header_mut(doc)?;
        let signatures = header
            .get_mut("signatures")
            .and_then(JsonValue::as_array_mut)
            .ok_or_else(|| LintError::InvalidRecord("header has no signatures array".to_string()))?;

        let (mut filled, mut stripped) = (0usize, 0usize);
        let mut regenerated: Vec<String> = Vec::new();
        for (&i, repair) in &plan {
            let Some(slot) = signatures.get_mut(i) else {
                return Err(LintError::InvalidRecord(format!("signature {} does not exist", i)));
            };
            if let Some(sig) = slot.as_object_mut() {
                if repair.strip {
                    let before = sig.len();
                    sig.retain(|k, _| SIGNATURE_PROPERTIES.contains(&k.as_str()));
                    stripped += usize::from(sig.len() < before);
                }
                let has_notes = sig
                    .get("notes")
                    .and_then(JsonValue::as_str)
                    .is_some_and(|s| !s.is_empty());
                if repair.notes && !has_notes {
                    sig.insert("notes".to_string(), JsonValue::String(DEFAULT_NOTES.to_string()));
                    filled += 1;
                }
            }
            if repair.regenerate {
                let signer = signer_from(Some(&*slot), &options.key_id, true);
                *slot = self.signature_json(&payload, &signer, options)?;
                regenerated.push(signer.key_id);
            }
        }
        if !regenerated.is_empty() {
            let checksum = self.provider.checksum(&payload);
            header.insert("payloadChecksum".to_string(), JsonValue::String(checksum));
        }

        let mut parts = Vec::new();
        if filled > 0 {
            parts.push(format!("filled notes on {} signature(s)", filled));
        }
        if stripped > 0 {
            parts.push(format!("removed undeclared properties from {} signature(s)", stripped));
        }
        for key_id in &regenerated {
            parts.push(format!("regenerated signature for '{}'", key_id));
        }
        Ok(if parts.is_empty() {
            "signatures already repaired".to_string()
        } else {
            parts.join("; ")
        })
    }

    /// A fresh signature over `payload`, reduced to the declared signature properties.
    fn signature_json(&self, payload: &JsonValue, signer: &Signer, options: &FixOptions) -> Result<JsonValue, LintError> {
        let private_key = options.signing_key()?;
        let signature = self
            .provider
            .sign(payload, private_key, &signer.key_id, &signer.role, &signer.notes)?;
        if !schemas::is_valid_signature_string(&signature.signature) {
            return Err(LintError::CryptoError(
                "signature provider produced a malformed signature".to_string(),
            ));
        }
        let mut sig_json = serde_json::to_value(&signature)?;
        if let Some(obj) = sig_json.as_object_mut() {
            obj.retain(|k, _| SIGNATURE_PROPERTIES.contains(&k.as_str()));
        }
        Ok(sig_json)
    }

    /// Refresh the checksum and replace all signatures with one fresh signature.
    /// Only for a changed payload, where every old signature is void anyway.
    fn reseal(&self, doc: &mut JsonValue, signer: &Signer, options: &FixOptions) -> Result<(), LintError> {
        let payload = doc
            .get("payload")
            .cloned()
            .ok_or_else(|| LintError::InvalidRecord("record has no payload".to_string()))?;
        let sig_json = self.signature_json(&payload, signer, options)?;
        let checksum = self.provider.checksum(&payload);
        let header = header_mut(doc)?;
        header.insert("payloadChecksum".to_string(), JsonValue::String(checksum));
        header.insert("signatures".to_string(), JsonValue::Array(vec![sig_json]));
        Ok(())
    }

    /// Append the missing ids to each counterpart record named by the group.
    fn fix_back_references(
        &self,
        group: &FixGroup<'_>,
        options: &FixOptions,
        handles: &mut Vec<BackupHandle>,
    ) -> Result<String, LintError> {
        let mut targets: Vec<(PathBuf, BackReference)> = Vec::new();
        for finding in &group.findings {
            let back: BackReference = finding
                .context
                .as_ref()
                .and_then(|c| c.expected.clone())
                .ok_or_else(|| {
                    LintError::InvalidRecord(format!("finding '{}' carries no back-reference", finding.message))
                })
                .and_then(|v| serde_json::from_value(v).map_err(LintError::from))?;
            let path = self.store.record_path(back.entity_type, &back.entity_id);
            if !targets.iter().any(|(p, b)| *p == path && b.field == back.field && b.missing_id == back.missing_id) {
                targets.push((path, back));
            }
        }
        options.signing_key()?;

        let mut paths: Vec<&PathBuf> = Vec::new();
        for (path, _) in &targets {
            if !paths.contains(&path) {
                paths.push(path);
            }
        }
        if options.create_backups {
            for path in &paths {
                handles.push(backup::create_backup(self.store.as_ref(), path)?);
            }
        }

        let mut added = Vec::new();
        for path in paths {
            let mut doc: JsonValue = serde_json::from_slice(&self.store.read(path)?)?;
            record::require_envelope(&doc)?;
            for (_, back) in targets.iter().filter(|(p, _)| p == path) {
                let list = payload_mut(&mut doc)?
                    .entry(back.field.clone())
                    .or_insert_with(|| JsonValue::Array(Vec::new()));
                let Some(items) = list.as_array_mut() else {
                    return Err(LintError::InvalidRecord(format!(
                        "{} '{}' field {} is not an array",
                        back.entity_type, back.entity_id, back.field
                    )));
                };
                if !items.iter().any(|v| v.as_str() == Some(back.missing_id.as_str())) {
                    items.push(JsonValue::String(back.missing_id.clone()));
                    added.push(format!("'{}' to {} '{}' {}", back.missing_id, back.entity_type, back.entity_id, back.field));
                }
            }
            let signer = signer_for(&doc, &options.key_id, false);
            self.reseal(&mut doc, &signer, options)?;
            self.store.write(path, &to_record_bytes(&doc)?)?;
        }

        Ok(if added.is_empty() {
            "back-references already present; re-signed".to_string()
        } else {
            format!("added {}", added.join(", "))
        })
    }
}
