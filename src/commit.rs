use std::{
    ffi::OsString,
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use tracing::{debug, info};

use crate::error::{OptimizeError, Result};
use crate::utils::ensure_parent_directory_exists;

pub fn safe_replace(destination: &Path, bytes: &[u8]) -> Result<()> {
    ensure_parent_directory_exists(destination)
        .map_err(|e| OptimizeError::commit(destination, e))?;

    let dir = match destination.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut prefix = OsString::from(".");
    prefix.push(destination.file_name().unwrap_or_default());
    prefix.push(".");

    let mut staged = tempfile::Builder::new()
        .prefix(&prefix)
        .suffix(".tmp")
        .tempfile_in(dir)
        .map_err(|e| OptimizeError::commit(destination, e))?;

    staged
        .write_all(bytes)
        .and_then(|_| staged.as_file().sync_all())
        .map_err(|e| OptimizeError::commit(destination, e))?;

    staged
        .persist(destination)
        .map_err(|e| OptimizeError::commit(destination, e.error))?;

    debug!(path = %destination.display(), bytes = bytes.len(), "committed");
    Ok(())
}

/// True when both paths resolve to the same existing file or directory.
pub fn is_same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// `<parent>/<name>_backup` next to `input_dir`.
pub fn backup_dir_for(input_dir: &Path) -> PathBuf {
    let mut name = input_dir
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| OsString::from("images"));
    name.push("_backup");
    match input_dir.parent() {
        Some(parent) => parent.join(name),
        None => PathBuf::from(name),
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BackupStats {
    pub copied: usize,
    pub skipped: usize,
}

/// Copies each file into `backup_dir`. A backup that already exists is never overwritten.
pub fn backup_originals(files: &[PathBuf], backup_dir: &Path) -> Result<BackupStats> {
    fs::create_dir_all(backup_dir)?;
    let mut stats = BackupStats::default();
    for file in files {
        let Some(name) = file.file_name() else {
            continue;
        };
        let target = backup_dir.join(name);
        if target.exists() {
            stats.skipped += 1;
            continue;
        }
        fs::copy(file, &target)?;
        stats.copied += 1;
    }
    info!(dir = %backup_dir.display(), copied = stats.copied, skipped = stats.skipped, "backup complete");
    Ok(stats)
}
