//! CLI struct definitions for the govlint command-line interface.
//!
//! All clap-derived types live here. Dispatch lives in `lib.rs`.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::core::config::GovlintConfig;
use crate::core::findings::ValidatorKind;
use crate::core::fix::FixOptions;
use crate::core::lint::LintOptions;

#[derive(Parser, Debug)]
#[clap(
    name = "govlint",
    version = env!("CARGO_PKG_VERSION"),
    about = "Validate and repair signed governance records (tasks, cycles, executions, changelogs, feedback, actors, agents)."
)]
pub(crate) struct Cli {
    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub(crate) enum Command {
    /// Validate every record under the root (or a single file)
    Lint(LintCli),
    /// Lint, then repair the fixable findings
    Fix(FixCli),
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum OutputFormat {
    Text,
    Json,
}

#[derive(clap::Args, Debug)]
pub(crate) struct LintCli {
    /// Governance root holding tasks/, cycles/, actors/ ...
    #[clap(long, default_value = ".")]
    pub root: PathBuf,
    /// Lint a single record file instead of the whole root.
    #[clap(long)]
    pub file: Option<PathBuf>,
    /// Output format: 'text' or 'json'.
    #[clap(long, value_enum, default_value = "text")]
    pub format: OutputFormat,
    /// Skip cross-record reference resolution.
    #[clap(long)]
    pub no_references: bool,
    /// Skip resolving signature key ids to actors.
    #[clap(long)]
    pub no_actors: bool,
    #[clap(long)]
    pub no_checksums: bool,
    #[clap(long)]
    pub no_signatures: bool,
    #[clap(long)]
    pub no_timestamps: bool,
    /// Stop scheduling records after the first error.
    #[clap(long)]
    pub fail_fast: bool,
    /// Lint one record at a time.
    #[clap(long)]
    pub sequential: bool,
    /// Records linted in parallel per chunk.
    #[clap(long)]
    pub concurrency: Option<usize>,
}

impl LintCli {
    /// Config-file options with command-line overrides applied.
    pub fn lint_options(&self, config: &GovlintConfig) -> LintOptions {
        let mut options = config.lint_options();
        options.validate_references &= !self.no_references;
        options.validate_actors &= !self.no_actors;
        options.validate_checksums &= !self.no_checksums;
        options.validate_signatures &= !self.no_signatures;
        options.validate_timestamps &= !self.no_timestamps;
        options.fail_fast |= self.fail_fast;
        if self.sequential {
            options.concurrent = false;
        }
        if let Some(n) = self.concurrency {
            options.concurrency_limit = n.max(1);
        }
        options
    }
}

#[derive(clap::Args, Debug)]
pub(crate) struct FixCli {
    #[clap(flatten)]
    pub lint: LintCli,
    /// Only repair these categories (e.g. CHECKSUM_VERIFICATION,SIGNATURE_STRUCTURE).
    #[clap(long, value_delimiter = ',')]
    pub types: Vec<ValidatorKind>,
    /// Do not write backup copies before repairing.
    #[clap(long)]
    pub no_backups: bool,
    /// Report what would be repaired without writing.
    #[clap(long)]
    pub dry_run: bool,
    /// Signer id for re-signed records.
    #[clap(long)]
    pub key_id: Option<String>,
    /// File holding the base64 Ed25519 private key.
    #[clap(long)]
    pub private_key_file: Option<PathBuf>,
}

impl FixCli {
    /// Fix options without the private key, which the caller resolves.
    pub fn fix_options(&self, config: &GovlintConfig) -> FixOptions {
        let mut options = config.fix_options();
        if !self.types.is_empty() {
            options.fix_types = Some(self.types.clone());
        }
        options.create_backups &= !self.no_backups;
        options.dry_run = self.dry_run;
        if let Some(key_id) = &self.key_id {
            options.key_id = key_id.clone();
        }
        options
    }
}
