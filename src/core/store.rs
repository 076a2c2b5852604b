//! Record store abstraction.
//!
//! The lint and fix engines never touch the filesystem directly: discovery,
//! reads, writes, backup copies and cross-record lookups all go through a
//! [`RecordStore`]. [`FsRecordStore`] is the on-disk implementation, laying
//! records out as one directory per entity type:
//!
//! ```text
//! <root>/tasks/<id>.json
//! <root>/cycles/<id>.json
//! <root>/actors/human_alice.json   (id "human:alice")
//! ```

use serde_json::Value as JsonValue;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::core::error::LintError;
use crate::core::record::EntityType;

/// One discovered record file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordEntry {
    pub id: String,
    pub entity_type: EntityType,
    pub path: PathBuf,
}

pub trait RecordStore: Send + Sync {
    /// Enumerate every record. A missing entity directory yields zero records.
    fn list_records(&self) -> Result<Vec<RecordEntry>, LintError>;

    /// Where the record `id` of `entity_type` lives.
    fn record_path(&self, entity_type: EntityType, id: &str) -> PathBuf;

    /// The record a file path holds, for linting one file.
    fn entry_for_path(&self, path: &Path) -> Result<RecordEntry, LintError>;

    fn read(&self, path: &Path) -> Result<Vec<u8>, LintError>;

    fn write(&self, path: &Path, bytes: &[u8]) -> Result<(), LintError>;

    fn exists(&self, path: &Path) -> bool;

    fn copy(&self, from: &Path, to: &Path) -> Result<(), LintError>;

    /// Look a record up by id. Unreadable or unparseable records resolve to `None`.
    fn get(&self, entity_type: EntityType, id: &str) -> Option<JsonValue> {
        let path = self.record_path(entity_type, id);
        let bytes = self.read(&path).ok()?;
        serde_json::from_slice(&bytes).ok()
    }
}

/// File stem used for a record id. `:` is not portable in file names.
pub fn file_stem_for_id(id: &str) -> String {
    id.replace(':', "_")
}

/// Filesystem-backed record store rooted at a governance directory.
#[derive(Debug, Clone)]
pub struct FsRecordStore {
    pub root: PathBuf,
}

impl FsRecordStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl RecordStore for FsRecordStore {
    fn list_records(&self) -> Result<Vec<RecordEntry>, LintError> {
        let mut out = Vec::new();
        for entity_type in EntityType::ALL {
            let dir = self.root.join(entity_type.dir_name());
            if !dir.is_dir() {
                continue;
            }
            let mut entries = Vec::new();
            for entry in fs::read_dir(&dir).map_err(LintError::IoError)? {
                let entry = entry.map_err(LintError::IoError)?;
                let path = entry.path();
                if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some("json") {
                    continue;
                }
                let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                    continue;
                };
                entries.push(RecordEntry {
                    id: stem.to_string(),
                    entity_type,
                    path: path.clone(),
                });
            }
            entries.sort_by(|a, b| a.id.cmp(&b.id));
            out.extend(entries);
        }
        Ok(out)
    }

    fn record_path(&self, entity_type: EntityType, id: &str) -> PathBuf {
        self.root
            .join(entity_type.dir_name())
            .join(format!("{}.json", file_stem_for_id(id)))
    }

    /// Entity type comes from the parent directory name.
    fn entry_for_path(&self, path: &Path) -> Result<RecordEntry, LintError> {
        let dir = path
            .parent()
            .and_then(Path::file_name)
            .and_then(|s| s.to_str())
            .ok_or_else(|| LintError::ValidationError(format!("no parent directory for {}", path.display())))?;
        let entity_type = EntityType::from_dir_name(dir).ok_or_else(|| {
            LintError::ValidationError(format!(
                "cannot infer entity type from directory '{}' ({})",
                dir,
                path.display()
            ))
        })?;
        let id = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| LintError::ValidationError(format!("invalid record file name {}", path.display())))?
            .to_string();
        Ok(RecordEntry {
            id,
            entity_type,
            path: path.to_path_buf(),
        })
    }

    fn read(&self, path: &Path) -> Result<Vec<u8>, LintError> {
        fs::read(path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => LintError::NotFound(path.display().to_string()),
            _ => LintError::IoError(e),
        })
    }

    fn write(&self, path: &Path, bytes: &[u8]) -> Result<(), LintError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(LintError::IoError)?;
        }
        fs::write(path, bytes).map_err(LintError::IoError)
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn copy(&self, from: &Path, to: &Path) -> Result<(), LintError> {
        fs::copy(from, to).map(|_| ()).map_err(LintError::IoError)
    }
}
