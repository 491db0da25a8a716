use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::error::{EngineError, Result};

pub fn backup_path(source_file: &Path) -> PathBuf {
    let mut backup = source_file.to_path_buf();
    let name = format!(
        ".{}.schemata.bak",
        source_file.file_name().unwrap_or_default().to_string_lossy()
    );
    backup.set_file_name(name);
    backup
}

/// Check if a backup file exists from a previous interrupted in-place run.
pub fn check_interrupted_run(source_file: &Path) -> Option<PathBuf> {
    let bak = backup_path(source_file);
    if bak.exists() { Some(bak) } else { None }
}

pub fn restore_from_backup(source_file: &Path, backup_file: &Path) -> std::io::Result<()> {
    std::fs::copy(backup_file, source_file)?;
    std::fs::remove_file(backup_file)?;
    Ok(())
}

/// Restore every file under `root` left behind by an interrupted run.
/// Returns the restored paths.
pub fn recover_interrupted(root: &Path, files: &[PathBuf]) -> Vec<PathBuf> {
    let mut restored = Vec::new();
    for rel in files {
        let path = root.join(rel);
        if let Some(bak) = check_interrupted_run(&path) {
            match restore_from_backup(&path, &bak) {
                Ok(()) => restored.push(path),
                Err(e) => warn!(file = %path.display(), error = %e, "failed to restore backup"),
            }
        }
    }
    restored
}

/// Holds backups of files overwritten in place and puts the originals back
/// when dropped.
pub struct InPlaceGuard {
    files: Vec<PathBuf>,
}

impl InPlaceGuard {
    /// Back up each file, then overwrite it with its new contents.
    pub fn install(root: &Path, contents: &[(PathBuf, String)]) -> Result<Self> {
        let mut guard = InPlaceGuard { files: Vec::new() };
        for (rel, text) in contents {
            let path = root.join(rel);
            let bak = backup_path(&path);
            std::fs::copy(&path, &bak).map_err(|e| EngineError::io(&bak, e))?;
            guard.files.push(path.clone());
            std::fs::write(&path, text).map_err(|e| EngineError::io(&path, e))?;
        }
        info!(files = guard.files.len(), "instrumented sources in place");
        Ok(guard)
    }

    pub fn restore(&mut self) {
        for path in self.files.drain(..) {
            let bak = backup_path(&path);
            if let Err(e) = restore_from_backup(&path, &bak) {
                warn!(file = %path.display(), error = %e, "failed to restore original source");
            }
        }
    }
}

impl Drop for InPlaceGuard {
    fn drop(&mut self) {
        self.restore();
    }
}
