//! Batch lint orchestration.
//!
//! Discovers every record through the store, runs the single-record
//! validator and (optionally) the reference validator over each one, and
//! folds the findings into a [`LintReport`].
//!
//! # Scheduling
//!
//! - `concurrent`: records are split into chunks of `concurrency_limit` and
//!   each chunk runs on a rayon pool of that many threads.
//! - sequential: one record at a time, in discovery order.
//! - `fail_fast`: an error-level finding stops scheduling; it is checked
//!   between records (sequential) or between chunks (concurrent), so units
//!   already running still complete.
//!
//! Each record's findings are appended as one block tagged with its
//! discovery index, and the report is assembled in discovery order.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use crate::core::crypto::{Ed25519Provider, SignatureProvider};
use crate::core::error::LintError;
use crate::core::findings::{Level, LintReport, LintResult, ReportMetadata, ValidatorKind};
use crate::core::references::{self, ReferenceOptions};
use crate::core::schemas::SchemaLoader;
use crate::core::store::{RecordEntry, RecordStore};
use crate::core::time;
use crate::core::validate::{RecordValidator, ValidationContext, ValidatorOptions};

pub const DEFAULT_CONCURRENCY_LIMIT: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LintOptions {
    pub validate_references: bool,
    pub validate_actors: bool,
    pub validate_checksums: bool,
    pub validate_signatures: bool,
    pub validate_timestamps: bool,
    pub fail_fast: bool,
    pub concurrent: bool,
    pub concurrency_limit: usize,
}

impl Default for LintOptions {
    fn default() -> Self {
        Self {
            validate_references: true,
            validate_actors: true,
            validate_checksums: true,
            validate_signatures: true,
            validate_timestamps: true,
            fail_fast: false,
            concurrent: true,
            concurrency_limit: DEFAULT_CONCURRENCY_LIMIT,
        }
    }
}

impl LintOptions {
    fn validator_options(&self) -> ValidatorOptions {
        ValidatorOptions {
            checksums: self.validate_checksums,
            signatures: self.validate_signatures,
            timestamps: self.validate_timestamps,
        }
    }
}

pub struct LintEngine {
    store: Arc<dyn RecordStore>,
    validator: RecordValidator,
}

impl LintEngine {
    /// Engine with the built-in loader and Ed25519 provider.
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        let provider: Arc<dyn SignatureProvider> = Arc::new(Ed25519Provider);
        let loader = Arc::new(SchemaLoader::new(provider.clone()));
        Self::with_validator(store, RecordValidator::new(loader, provider))
    }

    pub fn with_validator(store: Arc<dyn RecordStore>, validator: RecordValidator) -> Self {
        Self { store, validator }
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    pub fn lint(&self, options: &LintOptions) -> Result<LintReport, LintError> {
        let started = Instant::now();
        let entries = self.store.list_records()?;
        tracing::debug!(records = entries.len(), concurrent = options.concurrent, "lint started");

        let collected: Mutex<Vec<(usize, Vec<LintResult>)>> = Mutex::new(Vec::with_capacity(entries.len()));
        let stop = AtomicBool::new(false);

        let run_unit = |index: usize, entry: &RecordEntry| {
            let findings = self.lint_record(entry, options);
            if options.fail_fast && findings.iter().any(LintResult::is_error) {
                stop.store(true, Ordering::SeqCst);
            }
            match collected.lock() {
                Ok(mut guard) => guard.push((index, findings)),
                Err(poisoned) => poisoned.into_inner().push((index, findings)),
            }
        };

        if options.concurrent {
            let limit = options.concurrency_limit.max(1);
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(limit)
                .build()
                .map_err(|e| LintError::ValidationError(format!("cannot build lint thread pool: {}", e)))?;
            for (chunk_index, chunk) in entries.chunks(limit).enumerate() {
                if stop.load(Ordering::SeqCst) {
                    break;
                }
                pool.install(|| {
                    chunk
                        .par_iter()
                        .enumerate()
                        .for_each(|(i, entry)| run_unit(chunk_index * limit + i, entry));
                });
            }
        } else {
            for (index, entry) in entries.iter().enumerate() {
                if stop.load(Ordering::SeqCst) {
                    break;
                }
                run_unit(index, entry);
            }
        }

        let mut blocks = collected.into_inner().unwrap_or_else(|p| p.into_inner());
        blocks.sort_by_key(|(index, _)| *index);
        let files_checked = blocks.len();
        if stop.load(Ordering::SeqCst) && files_checked < entries.len() {
            tracing::warn!(
                checked = files_checked,
                total = entries.len(),
                "fail-fast stopped lint after an error"
            );
        }
        let results: Vec<LintResult> = blocks.into_iter().flat_map(|(_, findings)| findings).collect();

        let report = self.build_report(results, files_checked, started, options);
        tracing::info!(
            files = report.summary.files_checked,
            errors = report.summary.errors,
            warnings = report.summary.warnings,
            fixable = report.summary.fixable,
            "lint finished"
        );
        Ok(report)
    }

    /// Lint one record file, resolved to an entry by the store.
    pub fn lint_file(&self, path: &Path, options: &LintOptions) -> Result<LintReport, LintError> {
        let started = Instant::now();
        let entry = self.store.entry_for_path(path)?;
        let results = self.lint_record(&entry, options);
        Ok(self.build_report(results, 1, started, options))
    }

    /// Read, parse and validate one record. I/O and parse failures become findings.
    pub fn lint_record(&self, entry: &RecordEntry, options: &LintOptions) -> Vec<LintResult> {
        let ctx = ValidationContext::new(
            entry.id.clone(),
            entry.entity_type,
            entry.path.display().to_string(),
        );
        let bytes = match self.store.read(&entry.path) {
            Ok(bytes) => bytes,
            Err(e) => {
                let message = if e.is_not_found() {
                    format!("Record file not found: {}", ctx.file_path)
                } else {
                    format!("Cannot read record: {}", e)
                };
                return vec![ctx.finding(Level::Error, ValidatorKind::SchemaValidation, message, false, None)];
            }
        };
        let doc: JsonValue = match serde_json::from_slice(&bytes) {
            Ok(doc) => doc,
            Err(e) => {
                return vec![ctx.finding(
                    Level::Error,
                    ValidatorKind::SchemaValidation,
                    format!("Record is not valid JSON: {}", e),
                    false,
                    None,
                )];
            }
        };
        let findings = self.lint_document(&doc, &ctx, options);
        tracing::debug!(record = %ctx.record_id, entity = %ctx.entity_type, findings = findings.len(), "record linted");
        findings
    }

    /// Validate an in-memory document.
    pub fn lint_document(
        &self,
        doc: &JsonValue,
        ctx: &ValidationContext,
        options: &LintOptions,
    ) -> Vec<LintResult> {
        let actors = options.validate_signatures.then_some(self.store.as_ref());
        let mut findings = self
            .validator
            .validate_with(doc, ctx, &options.validator_options(), actors);
        if options.validate_references {
            let reference_options = ReferenceOptions {
                actors: options.validate_actors,
            };
            findings.extend(references::validate_references(
                doc,
                ctx,
                self.store.as_ref(),
                &reference_options,
            ));
        } else if options.validate_actors {
            findings.extend(references::validate_actor_resolution(doc, ctx, self.store.as_ref()));
        }
        findings
    }

    fn build_report(
        &self,
        results: Vec<LintResult>,
        files_checked: usize,
        started: Instant,
        options: &LintOptions,
    ) -> LintReport {
        let execution_time = started.elapsed().as_millis() as u64;
        LintReport {
            summary: LintReport::summarize(&results, files_checked, execution_time),
            results,
            metadata: ReportMetadata {
                timestamp: time::now_epoch_z(),
                run_id: time::new_run_id(),
                options: options.clone(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        }
    }
}
