//! govlint: integrity linter and repair engine for governance records.
//!
//! A governance root holds one directory per entity type (`tasks/`,
//! `cycles/`, `executions/`, `changelogs/`, `feedback/`, `actors/`,
//! `agents/`), each record a JSON document with a `header` (version, type,
//! payload checksum, Ed25519 signatures) and a `payload`.
//!
//! # Pipeline
//!
//! - **Lint** ([`crate::core::lint::LintEngine`]): load every record, classify
//!   schema/integrity errors, check timestamps, resolve references and
//!   signers, and fold everything into a [`crate::core::findings::LintReport`].
//! - **Fix** ([`crate::core::fix::RepairEngine`]): group fixable findings by file
//!   and category, back each file up, apply one targeted repair per group
//!   and restore from the backup on failure.
//!
//! # Examples
//!
//! ```bash
//! govlint lint --root .gitgov
//! govlint lint --root .gitgov --format json --no-references
//! govlint fix --root .gitgov --types CHECKSUM_VERIFICATION --dry-run
//! GOVLINT_PRIVATE_KEY=... govlint fix --root .gitgov --key-id human:alice
//! ```
//!
//! # Crate Structure
//!
//! - [`core`]: record model, store, loader, validators, lint and repair engines

pub mod core;
mod cli;

use clap::Parser;
use std::sync::Arc;

use crate::cli::{Cli, Command, FixCli, LintCli, OutputFormat};
use crate::core::{
    config::{self, GovlintConfig},
    error::LintError,
    findings::{FixReport, LintReport},
    fix::RepairEngine,
    lint::{LintEngine, LintOptions},
    output,
    store::{FsRecordStore, RecordStore},
    time,
};

pub fn run() -> Result<(), LintError> {
    let cli = Cli::parse();
    match cli.command {
        Command::Lint(args) => run_lint(&args),
        Command::Fix(args) => run_fix(&args),
    }
}

fn open(args: &LintCli) -> Result<(GovlintConfig, LintEngine, LintOptions), LintError> {
    if !args.root.is_dir() {
        return Err(LintError::NotFound(format!(
            "governance root {} is not a directory",
            args.root.display()
        )));
    }
    let config = config::load_config(&args.root)?;
    let options = args.lint_options(&config);
    let store: Arc<dyn RecordStore> = Arc::new(FsRecordStore::new(&args.root));
    Ok((config, LintEngine::new(store), options))
}

fn lint_with(engine: &LintEngine, args: &LintCli, options: &LintOptions) -> Result<LintReport, LintError> {
    match &args.file {
        Some(path) => engine.lint_file(path, options),
        None => engine.lint(options),
    }
}

fn print_json(cmd: &str, status: &str, extra: serde_json::Value) -> Result<(), LintError> {
    let envelope = time::command_envelope(cmd, status, extra);
    println!("{}", serde_json::to_string_pretty(&envelope)?);
    Ok(())
}

fn run_lint(args: &LintCli) -> Result<(), LintError> {
    let (_, engine, options) = open(args)?;
    let report = lint_with(&engine, args, &options)?;
    let status = if report.has_errors() { "error" } else { "ok" };

    match args.format {
        OutputFormat::Json => print_json("lint", status, serde_json::json!({ "report": report }))?,
        OutputFormat::Text => print!("{}", output::render_lint_report(&report)),
    }

    if report.has_errors() {
        let messages: Vec<String> = report
            .results
            .iter()
            .filter(|r| r.is_error())
            .map(|r| format!("{}: {}", r.entity.id, r.message))
            .collect();
        return Err(LintError::ValidationError(format!(
            "{} error-level finding(s) in {} file(s): {}",
            report.summary.errors,
            report.summary.files_checked,
            output::preview_messages(&messages, 3, 80)
        )));
    }
    Ok(())
}

fn run_fix(args: &FixCli) -> Result<(), LintError> {
    let (config, engine, options) = open(&args.lint)?;
    let mut fix_options = args.fix_options(&config);
    fix_options.private_key = config::resolve_private_key(&config, args.private_key_file.as_deref())?;

    let mut report = lint_with(&engine, &args.lint, &options)?;
    let repair = RepairEngine::new(engine.store().clone());
    let fixes: FixReport = repair.fix(&report, &fix_options);
    report.mark_fixed(&fixes);
    let status = if fixes.has_failures() { "error" } else { "ok" };

    match args.lint.format {
        OutputFormat::Json => print_json(
            "fix",
            status,
            serde_json::json!({ "report": report, "fixes": fixes }),
        )?,
        OutputFormat::Text => {
            print!("{}", output::render_lint_report(&report));
            print!("{}", output::render_fix_report(&fixes));
        }
    }

    if fixes.has_failures() {
        return Err(LintError::ValidationError(format!(
            "{} repair(s) failed",
            fixes.summary.failed
        )));
    }
    Ok(())
}
