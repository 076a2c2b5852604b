//! `govlint.toml` configuration.
//!
//! Looked up at `<root>/govlint.toml`, then `<root>/.gitgov/govlint.toml`.
//! No file means defaults. CLI flags are layered on top by the caller.
//!
//! ```toml
//! [lint]
//! validate_references = true
//! concurrency_limit = 4
//!
//! [fix]
//! create_backups = true
//! key_id = "human:alice"
//! private_key_path = "keys/alice.key"
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::core::error::LintError;
use crate::core::fix::{DEFAULT_KEY_ID, FixOptions};
use crate::core::lint::{DEFAULT_CONCURRENCY_LIMIT, LintOptions};

pub const CONFIG_FILE: &str = "govlint.toml";
pub const PRIVATE_KEY_ENV: &str = "GOVLINT_PRIVATE_KEY";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LintSection {
    pub validate_references: bool,
    pub validate_actors: bool,
    pub validate_checksums: bool,
    pub validate_signatures: bool,
    pub validate_timestamps: bool,
    pub fail_fast: bool,
    pub concurrent: bool,
    pub concurrency_limit: usize,
}

impl Default for LintSection {
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

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FixSection {
    pub create_backups: bool,
    pub key_id: String,
    /// Relative paths resolve against the directory holding the config file.
    pub private_key_path: Option<PathBuf>,
}

impl Default for FixSection {
    fn default() -> Self {
        Self {
            create_backups: true,
            key_id: DEFAULT_KEY_ID.to_string(),
            private_key_path: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GovlintConfig {
    pub lint: LintSection,
    pub fix: FixSection,
    /// File the config was read from; `None` for defaults.
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

impl GovlintConfig {
    pub fn lint_options(&self) -> LintOptions {
        let l = &self.lint;
        LintOptions {
            validate_references: l.validate_references,
            validate_actors: l.validate_actors,
            validate_checksums: l.validate_checksums,
            validate_signatures: l.validate_signatures,
            validate_timestamps: l.validate_timestamps,
            fail_fast: l.fail_fast,
            concurrent: l.concurrent,
            concurrency_limit: l.concurrency_limit.max(1),
        }
    }

    /// Fix options without a private key; see [`resolve_private_key`].
    pub fn fix_options(&self) -> FixOptions {
        FixOptions {
            create_backups: self.fix.create_backups,
            key_id: self.fix.key_id.clone(),
            ..FixOptions::default()
        }
    }

    /// Configured key path, resolved against the config file's directory.
    pub fn private_key_path(&self) -> Option<PathBuf> {
        let path = self.fix.private_key_path.as_ref()?;
        if path.is_absolute() {
            return Some(path.clone());
        }
        let base = self.source.as_deref().and_then(Path::parent).unwrap_or(Path::new("."));
        Some(base.join(path))
    }
}

fn candidate_paths(root: &Path) -> [PathBuf; 2] {
    [root.join(CONFIG_FILE), root.join(".gitgov").join(CONFIG_FILE)]
}

pub fn load_config(root: &Path) -> Result<GovlintConfig, LintError> {
    for path in candidate_paths(root) {
        if path.exists() {
            return load_config_file(&path);
        }
    }
    Ok(GovlintConfig::default())
}

pub fn load_config_file(path: &Path) -> Result<GovlintConfig, LintError> {
    let content = fs::read_to_string(path).map_err(LintError::IoError)?;
    let mut config: GovlintConfig = toml::from_str(&content)
        .map_err(|e| LintError::ConfigError(format!("{}: {}", path.display(), e)))?;
    config.source = Some(path.to_path_buf());
    tracing::debug!(path = %path.display(), "loaded config");
    Ok(config)
}

/// Private key from an explicit file, else `GOVLINT_PRIVATE_KEY`, else the
/// configured key path.
pub fn resolve_private_key(
    config: &GovlintConfig,
    explicit_file: Option<&Path>,
) -> Result<Option<String>, LintError> {
    if let Some(path) = explicit_file {
        return read_key_file(path).map(Some);
    }
    if let Ok(key) = std::env::var(PRIVATE_KEY_ENV)
        && !key.trim().is_empty()
    {
        return Ok(Some(key.trim().to_string()));
    }
    match config.private_key_path() {
        Some(path) => read_key_file(&path).map(Some),
        None => Ok(None),
    }
}

fn read_key_file(path: &Path) -> Result<String, LintError> {
    let key = fs::read_to_string(path).map_err(|e| {
        LintError::ConfigError(format!("cannot read private key {}: {}", path.display(), e))
    })?;
    Ok(key.trim().to_string())
}
