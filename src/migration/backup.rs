//! Byte-level database snapshots taken before any schema mutation.

use crate::db::Database;
use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// SQLite files that travel with the main database file.
const SIDECARS: [&str; 2] = ["-wal", "-shm"];

/// Creates and restores full copies of the database file.
#[derive(Debug, Clone, Default)]
pub struct BackupManager {
    /// Directory for backups. `None` places them next to the source.
    dir: Option<PathBuf>,
}

impl BackupManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = Some(dir.into());
        self
    }

    /// Copy `source` (and any sidecar files) to a timestamped path.
    ///
    /// A failed copy removes whatever it partially wrote.
    pub fn create_backup(&self, source: &Path) -> Result<PathBuf> {
        if !source.is_file() {
            return Err(anyhow!("database file {} does not exist", source.display()));
        }

        let dir = match &self.dir {
            Some(dir) => dir.clone(),
            None => source
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from(".")),
        };
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create backup directory {}", dir.display()))?;

        let file_name = source
            .file_name()
            .ok_or_else(|| anyhow!("database path {} has no file name", source.display()))?
            .to_string_lossy()
            .to_string();
        let backup = unique_backup_path(&dir, &file_name, &Utc::now())?;

        if let Err(e) = copy_with_sidecars(source, &backup) {
            remove_with_sidecars(&backup);
            return Err(e.context(format!("Failed to back up {}", source.display())));
        }

        info!(source = %source.display(), backup = %backup.display(), "Created backup");
        Ok(backup)
    }

    /// Close `handle` (if any) and overwrite `source` with `backup`.
    ///
    /// Sidecars present in the backup are restored; stale sidecars next to the
    /// source are removed so SQLite does not replay them over the restored file.
    pub fn restore(&self, backup: &Path, source: &Path, handle: Option<Database>) -> Result<()> {
        if let Some(db) = handle {
            if let Err(e) = db.close() {
                warn!("Failed to close database before restore: {:#}", e);
            }
        }

        if !backup.is_file() {
            return Err(anyhow!("backup file {} does not exist", backup.display()));
        }

        fs::copy(backup, source).with_context(|| {
            format!(
                "Failed to copy {} over {}",
                backup.display(),
                source.display()
            )
        })?;

        for suffix in SIDECARS {
            let from = with_suffix(backup, suffix);
            let to = with_suffix(source, suffix);
            if from.exists() {
                fs::copy(&from, &to)
                    .with_context(|| format!("Failed to restore sidecar {}", to.display()))?;
            } else if to.exists() {
                fs::remove_file(&to)
                    .with_context(|| format!("Failed to remove stale sidecar {}", to.display()))?;
            }
        }

        info!(
            source = %source.display(),
            backup = %backup.display(),
            "Restored database from backup"
        );
        Ok(())
    }

    /// Delete a backup and its sidecars.
    pub fn discard(&self, backup: &Path) -> Result<()> {
        fs::remove_file(backup)
            .with_context(|| format!("Failed to remove backup {}", backup.display()))?;
        remove_with_sidecars(backup);
        debug!(backup = %backup.display(), "Discarded backup");
        Ok(())
    }
}

/// `memory.db` -> `memory.db.20261018T101530.123456Z.bak`, with a numeric
/// suffix if two runs land on the same instant.
fn unique_backup_path(dir: &Path, file_name: &str, timestamp: &DateTime<Utc>) -> Result<PathBuf> {
    let base = timestamp.format("%Y%m%dT%H%M%S%.6fZ").to_string();
    for suffix in 0..100 {
        let candidate = if suffix == 0 {
            dir.join(format!("{file_name}.{base}.bak"))
        } else {
            dir.join(format!("{file_name}.{base}-{suffix:02}.bak"))
        };
        if !candidate.exists() {
            return Ok(candidate);
        }
    }

    Err(anyhow!(
        "Unable to allocate a backup name in {}",
        dir.display()
    ))
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut os = OsString::from(path.as_os_str());
    os.push(suffix);
    PathBuf::from(os)
}

/// Copy a database file and whichever of its sidecars exist.
pub(crate) fn copy_with_sidecars(src: &Path, dest: &Path) -> Result<()> {
    fs::copy(src, dest)
        .with_context(|| format!("Failed to copy {} to {}", src.display(), dest.display()))?;

    for suffix in SIDECARS {
        let from = with_suffix(src, suffix);
        if from.exists() {
            let to = with_suffix(dest, suffix);
            fs::copy(&from, &to).with_context(|| {
                format!("Failed to copy {} to {}", from.display(), to.display())
            })?;
        }
    }

    Ok(())
}

fn remove_with_sidecars(path: &Path) {
    let _ = fs::remove_file(path);
    for suffix in SIDECARS {
        let _ = fs::remove_file(with_suffix(path, suffix));
    }
}
