//! Timestamped record backups.
//!
//! A backup is `{originalPath}.backup-{unixMillis}`, copied through the
//! record store. The returned [`BackupHandle`] is what a restore needs, so a
//! repair never has to look up "the latest backup" of a file.

use std::path::{Path, PathBuf};

use crate::core::error::LintError;
use crate::core::store::RecordStore;
use crate::core::time;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupHandle {
    pub original: PathBuf,
    pub backup: PathBuf,
}

pub fn backup_path_for(original: &Path, unix_millis: u128) -> PathBuf {
    let mut name = original.as_os_str().to_os_string();
    name.push(format!(".backup-{}", unix_millis));
    PathBuf::from(name)
}

pub fn create_backup(store: &dyn RecordStore, original: &Path) -> Result<BackupHandle, LintError> {
    let mut backup = backup_path_for(original, time::now_unix_millis());
    // Two backups of one file within the same millisecond must not collide.
    let mut bump = 1u32;
    while store.exists(&backup) {
        let mut name = backup_path_for(original, time::now_unix_millis()).into_os_string();
        name.push(format!("-{}", bump));
        backup = PathBuf::from(name);
        bump += 1;
    }
    store.copy(original, &backup)?;
    tracing::debug!(original = %original.display(), backup = %backup.display(), "backup created");
    Ok(BackupHandle {
        original: original.to_path_buf(),
        backup,
    })
}

pub fn restore_backup(store: &dyn RecordStore, handle: &BackupHandle) -> Result<(), LintError> {
    store.copy(&handle.backup, &handle.original)?;
    tracing::debug!(original = %handle.original.display(), "restored from backup");
    Ok(())
}
