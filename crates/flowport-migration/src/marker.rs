use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use flowport_core::{VerificationMismatch, DELETION_INDICATOR_FILE};

use crate::verify::{compare_trees, CompareMode};

pub fn marker_path(dir: &Path) -> PathBuf {
    dir.join(DELETION_INDICATOR_FILE)
}

pub fn has_deletion_marker(dir: &Path) -> bool {
    marker_path(dir).is_file()
}

/// Marks `dir` as superseded. Calling it again leaves the single marker as is.
pub fn indicate_deletion(dir: &Path) -> Result<PathBuf> {
    if !dir.is_dir() {
        return Err(anyhow!(
            "cannot mark a missing data directory for deletion: {}",
            dir.display()
        ));
    }

    let path = marker_path(dir);
    match fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&path)
    {
        Ok(_) => {
            tracing::info!(dir = %dir.display(), "marked data directory for deletion");
            Ok(path)
        }
        Err(err) if err.kind() == io::ErrorKind::AlreadyExists && path.is_file() => Ok(path),
        Err(err) => Err(err)
            .with_context(|| format!("failed to write deletion marker: {}", path.display())),
    }
}

/// Drops a leftover marker so a directory about to receive data is not
/// treated as superseded.
pub fn clear_deletion_marker(dir: &Path) -> Result<bool> {
    let path = marker_path(dir);
    match fs::remove_file(&path) {
        Ok(()) => {
            tracing::info!(dir = %dir.display(), "cleared stale deletion marker");
            Ok(true)
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err)
            .with_context(|| format!("failed to clear deletion marker: {}", path.display())),
    }
}

pub fn remove_folder_if_exists(dir: &Path) -> Result<bool> {
    match fs::remove_dir_all(dir) {
        Ok(()) => {
            tracing::info!(dir = %dir.display(), "removed superseded data directory");
            Ok(true)
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(err) => {
            Err(err).with_context(|| format!("failed to remove data directory: {}", dir.display()))
        }
    }
}

/// Confirms every entry of the superseded tree still has a counterpart in the
/// active tree. Content is not compared because the application may already
/// have written to the active tree since the transition.
pub fn verify_superseded_copy_present(
    superseded: &Path,
    active: &Path,
) -> Result<Vec<VerificationMismatch>> {
    if !active.is_dir() {
        return Ok(vec![VerificationMismatch::MissingDirectory(PathBuf::new())]);
    }
    Ok(compare_trees(superseded, active, CompareMode::PresenceOnly)?.mismatches)
}
