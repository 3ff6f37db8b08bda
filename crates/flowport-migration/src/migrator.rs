use std::path::Path;

use anyhow::Result;
use flowport_core::PortabilityError;

use crate::copy::{copy_user_data_tree, CopySummary};
use crate::marker::clear_deletion_marker;
use crate::verify::{compare_trees, CompareMode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerificationReport {
    pub files_checked: u64,
    pub directories_checked: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MigrationReport {
    pub copied: CopySummary,
    pub verified: VerificationReport,
}

pub fn move_user_data_folder(from: &Path, to: &Path) -> Result<MigrationReport> {
    move_user_data_folder_with_progress(from, to, |_, _| {})
}

/// Copies the user data tree and verifies the copy.
///
/// No user data is removed on either side; only a stale marker left in the
/// destination is dropped. A failed verification leaves the destination in
/// place for inspection and the source untouched.
pub fn move_user_data_folder_with_progress<Progress>(
    from: &Path,
    to: &Path,
    on_file_copied: Progress,
) -> Result<MigrationReport>
where
    Progress: FnMut(&Path, u64),
{
    if !from.is_dir() {
        return Err(PortabilityError::SourceMissing(from.to_path_buf()).into());
    }

    clear_deletion_marker(to)?;
    tracing::info!(from = %from.display(), to = %to.display(), "copying user data");
    let copied = copy_user_data_tree(from, to, on_file_copied)?;
    tracing::debug!(
        files = copied.files,
        directories = copied.directories,
        bytes = copied.bytes,
        "user data copied"
    );

    let verified = verify_user_data_after_move(from, to)?;
    Ok(MigrationReport { copied, verified })
}

pub fn verify_user_data_after_move(from: &Path, to: &Path) -> Result<VerificationReport> {
    let comparison = compare_trees(from, to, CompareMode::Content)?;
    if !comparison.mismatches.is_empty() {
        tracing::warn!(
            from = %from.display(),
            to = %to.display(),
            mismatches = comparison.mismatches.len(),
            "user data verification failed"
        );
        return Err(PortabilityError::VerificationFailure {
            from: from.to_path_buf(),
            to: to.to_path_buf(),
            mismatches: comparison.mismatches,
        }
        .into());
    }

    Ok(VerificationReport {
        files_checked: comparison.files_checked,
        directories_checked: comparison.directories_checked,
    })
}
