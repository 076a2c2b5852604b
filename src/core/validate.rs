//! Single-record validation.
//!
//! Re-runs the record loader over an in-memory document (records may have
//! been partially repaired since they were parsed), turns loader field errors
//! into classified findings, optionally verifies signatures against the
//! signers' actor records, and checks timestamp ordering.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::Arc;

use crate::core::classify;
use crate::core::crypto::SignatureProvider;
use crate::core::findings::{EntityRef, FindingContext, Level, LintResult, ValidatorKind};
use crate::core::record::{EntityType, Record};
use crate::core::schemas::{LoadError, RecordLoader};
use crate::core::store::RecordStore;
use crate::core::time::parse_record_timestamp;

/// Identity of the record under validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationContext {
    pub record_id: String,
    pub entity_type: EntityType,
    pub file_path: String,
}

impl ValidationContext {
    pub fn new(record_id: impl Into<String>, entity_type: EntityType, file_path: impl Into<String>) -> Self {
        Self {
            record_id: record_id.into(),
            entity_type,
            file_path: file_path.into(),
        }
    }

    pub fn finding(
        &self,
        level: Level,
        validator: ValidatorKind,
        message: impl Into<String>,
        fixable: bool,
        context: Option<FindingContext>,
    ) -> LintResult {
        LintResult {
            level,
            file_path: self.file_path.clone(),
            validator,
            message: message.into(),
            entity: EntityRef {
                entity_type: self.entity_type,
                id: self.record_id.clone(),
            },
            fixable,
            context,
            fixed: None,
        }
    }
}

/// Which single-record checks run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorOptions {
    pub checksums: bool,
    pub signatures: bool,
    pub timestamps: bool,
}

impl Default for ValidatorOptions {
    fn default() -> Self {
        Self {
            checksums: true,
            signatures: true,
            timestamps: true,
        }
    }
}

/// `(field, must not be earlier than field)` pairs checked on payloads.
const TIMESTAMP_ORDER: &[(&str, &str)] = &[
    ("updatedAt", "createdAt"),
    ("completedAt", "createdAt"),
    ("discardedAt", "createdAt"),
];

#[derive(Clone)]
pub struct RecordValidator {
    loader: Arc<dyn RecordLoader>,
    provider: Arc<dyn SignatureProvider>,
}

impl RecordValidator {
    pub fn new(loader: Arc<dyn RecordLoader>, provider: Arc<dyn SignatureProvider>) -> Self {
        Self { loader, provider }
    }

    /// All checks, no signature verification.
    pub fn validate(&self, doc: &JsonValue, ctx: &ValidationContext) -> Vec<LintResult> {
        self.validate_with(doc, ctx, &ValidatorOptions::default(), None)
    }

    /// Findings come out in check order: loader errors, signature
    /// verification, then timestamp ordering.
    pub fn validate_with(
        &self,
        doc: &JsonValue,
        ctx: &ValidationContext,
        options: &ValidatorOptions,
        actors: Option<&dyn RecordStore>,
    ) -> Vec<LintResult> {
        let mut out = Vec::new();

        let loaded = match self.loader.load(ctx.entity_type, doc) {
            Ok(record) => Some(record),
            Err(LoadError::Validation(failure)) => {
                for err in classify::filter_schema_noise(failure.field_errors) {
                    let validator = classify::classify(&err.message, &err.field);
                    let fixable = classify::is_fixable(&err.message, &err.field);
                    out.push(ctx.finding(
                        Level::Error,
                        validator,
                        err.message,
                        fixable,
                        Some(FindingContext {
                            field: err.field,
                            actual: err.value,
                            expected: None,
                        }),
                    ));
                }
                None
            }
            Err(LoadError::Other(message)) => {
                out.push(ctx.finding(
                    Level::Error,
                    ValidatorKind::SchemaValidation,
                    message,
                    false,
                    None,
                ));
                None
            }
        };

        out.retain(|f| match f.validator {
            ValidatorKind::ChecksumVerification => options.checksums,
            ValidatorKind::SignatureStructure => options.signatures,
            _ => true,
        });

        if options.signatures
            && let (Some(record), Some(actors)) = (loaded.as_ref(), actors)
            && let Some(finding) = self.verify_signatures(record, ctx, actors)
        {
            out.push(finding);
        }

        if options.timestamps {
            out.extend(check_timestamps(doc, ctx));
        }

        out
    }

    fn verify_signatures(
        &self,
        record: &Record,
        ctx: &ValidationContext,
        actors: &dyn RecordStore,
    ) -> Option<LintResult> {
        let mut resolved = 0usize;
        for sig in &record.header.signatures {
            let public_key = actors
                .get(EntityType::Actor, &sig.key_id)
                .and_then(|actor| {
                    actor
                        .get("payload")
                        .and_then(|p| p.get("publicKey"))
                        .and_then(JsonValue::as_str)
                        .map(str::to_string)
                });
            let Some(public_key) = public_key else {
                continue;
            };
            resolved += 1;
            if self.provider.verify(&record.payload, sig, &public_key) {
                return None;
            }
        }
        if resolved == 0 {
            // Unknown signers are reported by actor resolution.
            return None;
        }
        Some(ctx.finding(
            Level::Error,
            ValidatorKind::SignatureStructure,
            format!(
                "Signature verification failed for all {} resolvable signer(s)",
                resolved
            ),
            false,
            Some(FindingContext {
                field: "/header/signatures".to_string(),
                actual: None,
                expected: None,
            }),
        ))
    }
}

/// Temporal ordering findings; never fixable since the correct value is unknown.
pub fn check_timestamps(doc: &JsonValue, ctx: &ValidationContext) -> Vec<LintResult> {
    let Some(payload) = doc.get("payload").and_then(JsonValue::as_object) else {
        return Vec::new();
    };
    let mut out = Vec::new();
    for (later, earlier) in TIMESTAMP_ORDER {
        let (Some(later_raw), Some(earlier_raw)) = (payload.get(*later), payload.get(*earlier)) else {
            continue;
        };
        let (Some(later_ms), Some(earlier_ms)) = (
            parse_record_timestamp(later_raw),
            parse_record_timestamp(earlier_raw),
        ) else {
            continue;
        };
        if later_ms < earlier_ms {
            out.push(ctx.finding(
                Level::Error,
                ValidatorKind::TemporalConsistency,
                format!("{} must not be earlier than {}", later, earlier),
                false,
                Some(FindingContext {
                    field: format!("/payload/{}", later),
                    actual: Some(later_raw.clone()),
                    expected: Some(JsonValue::String(format!(">= {}", earlier_raw))),
                }),
            ));
        }
    }
    out
}
