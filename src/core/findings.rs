//! Findings and reports produced by linting and repair.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;
use std::str::FromStr;

use crate::core::error::LintError;
use crate::core::lint::LintOptions;
use crate::core::record::EntityType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Error,
    Warning,
    Info,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Error => "error",
            Level::Warning => "warning",
            Level::Info => "info",
        }
    }
}

/// Closed set of finding categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidatorKind {
    SchemaValidation,
    ChecksumVerification,
    SignatureStructure,
    EmbeddedMetadataStructure,
    SchemaVersionMismatch,
    TemporalConsistency,
    ReferentialIntegrity,
    BidirectionalConsistency,
    ActorResolution,
    SoftDeleteDetection,
}

impl ValidatorKind {
    pub const ALL: [ValidatorKind; 10] = [
        ValidatorKind::SchemaValidation,
        ValidatorKind::ChecksumVerification,
        ValidatorKind::SignatureStructure,
        ValidatorKind::EmbeddedMetadataStructure,
        ValidatorKind::SchemaVersionMismatch,
        ValidatorKind::TemporalConsistency,
        ValidatorKind::ReferentialIntegrity,
        ValidatorKind::BidirectionalConsistency,
        ValidatorKind::ActorResolution,
        ValidatorKind::SoftDeleteDetection,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ValidatorKind::SchemaValidation => "SCHEMA_VALIDATION",
            ValidatorKind::ChecksumVerification => "CHECKSUM_VERIFICATION",
            ValidatorKind::SignatureStructure => "SIGNATURE_STRUCTURE",
            ValidatorKind::EmbeddedMetadataStructure => "EMBEDDED_METADATA_STRUCTURE",
            ValidatorKind::SchemaVersionMismatch => "SCHEMA_VERSION_MISMATCH",
            ValidatorKind::TemporalConsistency => "TEMPORAL_CONSISTENCY",
            ValidatorKind::ReferentialIntegrity => "REFERENTIAL_INTEGRITY",
            ValidatorKind::BidirectionalConsistency => "BIDIRECTIONAL_CONSISTENCY",
            ValidatorKind::ActorResolution => "ACTOR_RESOLUTION",
            ValidatorKind::SoftDeleteDetection => "SOFT_DELETE_DETECTION",
        }
    }
}

impl fmt::Display for ValidatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ValidatorKind {
    type Err = LintError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_uppercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == wanted)
            .ok_or_else(|| LintError::ValidationError(format!("unknown validator '{}'", s)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRef {
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FindingContext {
    pub field: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<JsonValue>,
}

/// The back-reference a bidirectional repair must add, carried in
/// `context.expected` of a `BIDIRECTIONAL_CONSISTENCY` finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackReference {
    pub entity_type: EntityType,
    pub entity_id: String,
    pub field: String,
    pub missing_id: String,
}

/// One detected violation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LintResult {
    pub level: Level,
    pub file_path: String,
    pub validator: ValidatorKind,
    pub message: String,
    pub entity: EntityRef,
    pub fixable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<FindingContext>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fixed: Option<bool>,
}

impl LintResult {
    pub fn is_error(&self) -> bool {
        self.level == Level::Error
    }

    pub fn field(&self) -> Option<&str> {
        self.context.as_ref().map(|c| c.field.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LintSummary {
    pub files_checked: usize,
    pub errors: usize,
    pub warnings: usize,
    pub fixable: usize,
    /// Milliseconds.
    pub execution_time: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportMetadata {
    pub timestamp: String,
    pub run_id: String,
    pub options: LintOptions,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LintReport {
    pub summary: LintSummary,
    pub results: Vec<LintResult>,
    pub metadata: ReportMetadata,
}

impl LintReport {
    pub fn summarize(results: &[LintResult], files_checked: usize, execution_time: u64) -> LintSummary {
        LintSummary {
            files_checked,
            errors: results.iter().filter(|r| r.level == Level::Error).count(),
            warnings: results.iter().filter(|r| r.level == Level::Warning).count(),
            fixable: results.iter().filter(|r| r.fixable).count(),
            execution_time,
        }
    }

    pub fn has_errors(&self) -> bool {
        self.summary.errors > 0
    }

    /// Flag findings whose `(filePath, validator)` group was repaired.
    pub fn mark_fixed(&mut self, fixes: &FixReport) {
        for result in self.results.iter_mut().filter(|r| r.fixable) {
            let repaired = fixes.fixes.iter().any(|f| {
                f.success && !f.dry_run && f.file_path == result.file_path && f.validator == result.validator
            });
            if repaired {
                result.fixed = Some(true);
            }
        }
    }
}

/// Outcome of one repaired `(filePath, validator)` group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixResult {
    pub file_path: String,
    pub validator: ValidatorKind,
    pub action: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup_path: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub dry_run: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixSummary {
    pub fixed: usize,
    pub failed: usize,
    pub backups_created: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FixReport {
    pub summary: FixSummary,
    pub fixes: Vec<FixResult>,
}

impl FixReport {
    pub fn has_failures(&self) -> bool {
        self.summary.failed > 0
    }
}
