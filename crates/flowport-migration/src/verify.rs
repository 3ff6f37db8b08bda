use std::collections::VecDeque;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use flowport_core::{VerificationMismatch, DELETION_INDICATOR_FILE};

use crate::checksum::sha256_file;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CompareMode {
    Content,
    PresenceOnly,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum TreeEntryKind {
    Directory,
    File,
    Symlink(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct TreeEntry {
    pub(crate) relative_path: PathBuf,
    pub(crate) kind: TreeEntryKind,
}

pub(crate) struct TreeComparison {
    pub(crate) files_checked: u64,
    pub(crate) directories_checked: u64,
    pub(crate) mismatches: Vec<VerificationMismatch>,
}

/// Every entry of `root` except the root-level deletion marker, sorted.
pub(crate) fn collect_tree_entries(root: &Path) -> Result<Vec<TreeEntry>> {
    let mut entries = Vec::new();
    let mut queue: VecDeque<PathBuf> = VecDeque::new();
    queue.push_back(PathBuf::new());

    while let Some(relative_dir) = queue.pop_front() {
        let dir = root.join(&relative_dir);
        for entry in fs::read_dir(&dir)
            .with_context(|| format!("failed reading directory {}", dir.display()))?
        {
            let entry = entry?;
            if relative_dir.as_os_str().is_empty() && entry.file_name() == DELETION_INDICATOR_FILE
            {
                continue;
            }
            let relative_path = relative_dir.join(entry.file_name());
            let file_type = entry.file_type()?;
            let kind = if file_type.is_dir() {
                queue.push_back(relative_path.clone());
                TreeEntryKind::Directory
            } else if file_type.is_symlink() {
                let target = fs::read_link(entry.path()).with_context(|| {
                    format!("failed to read symlink {}", entry.path().display())
                })?;
                TreeEntryKind::Symlink(target)
            } else {
                TreeEntryKind::File
            };
            entries.push(TreeEntry {
                relative_path,
                kind,
            });
        }
    }

    entries.sort_by(|left, right| left.relative_path.cmp(&right.relative_path));
    Ok(entries)
}

/// Checks that every entry under `expected_root` has a faithful counterpart
/// under `actual_root`. Extra entries under `actual_root` are ignored.
pub(crate) fn compare_trees(
    expected_root: &Path,
    actual_root: &Path,
    mode: CompareMode,
) -> Result<TreeComparison> {
    let mut comparison = TreeComparison {
        files_checked: 0,
        directories_checked: 0,
        mismatches: Vec::new(),
    };

    for entry in collect_tree_entries(expected_root)? {
        let actual_path = actual_root.join(&entry.relative_path);
        let actual_metadata = match fs::symlink_metadata(&actual_path) {
            Ok(metadata) => Some(metadata),
            Err(err) if err.kind() == io::ErrorKind::NotFound => None,
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to stat {}", actual_path.display()));
            }
        };

        match entry.kind {
            TreeEntryKind::Directory => {
                comparison.directories_checked += 1;
                if !actual_metadata.is_some_and(|metadata| metadata.is_dir()) {
                    comparison
                        .mismatches
                        .push(VerificationMismatch::MissingDirectory(entry.relative_path));
                }
            }
            TreeEntryKind::Symlink(expected_target) => {
                comparison.files_checked += 1;
                let Some(metadata) = actual_metadata else {
                    comparison
                        .mismatches
                        .push(VerificationMismatch::MissingFile(entry.relative_path));
                    continue;
                };
                if mode == CompareMode::PresenceOnly {
                    continue;
                }
                let actual_target = if metadata.file_type().is_symlink() {
                    fs::read_link(&actual_path).ok()
                } else {
                    None
                };
                if actual_target.as_ref() != Some(&expected_target) {
                    comparison.mismatches.push(VerificationMismatch::ContentMismatch {
                        path: entry.relative_path,
                        expected_sha256: format!("link:{}", expected_target.display()),
                        actual_sha256: actual_target
                            .map(|target| format!("link:{}", target.display()))
                            .unwrap_or_else(|| "not-a-link".to_string()),
                    });
                }
            }
            TreeEntryKind::File => {
                comparison.files_checked += 1;
                let Some(metadata) = actual_metadata else {
                    comparison
                        .mismatches
                        .push(VerificationMismatch::MissingFile(entry.relative_path));
                    continue;
                };
                if !metadata.is_file() {
                    comparison
                        .mismatches
                        .push(VerificationMismatch::NotAFile(entry.relative_path));
                    continue;
                }
                if mode == CompareMode::PresenceOnly {
                    continue;
                }

                let expected_sha256 = sha256_file(&expected_root.join(&entry.relative_path))?;
                let actual_sha256 = sha256_file(&actual_path)?;
                if expected_sha256 != actual_sha256 {
                    comparison.mismatches.push(VerificationMismatch::ContentMismatch {
                        path: entry.relative_path,
                        expected_sha256,
                        actual_sha256,
                    });
                }
            }
        }
    }

    Ok(comparison)
}
