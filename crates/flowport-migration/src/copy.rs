use std::collections::VecDeque;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use flowport_core::DELETION_INDICATOR_FILE;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CopySummary {
    pub files: u64,
    pub directories: u64,
    pub bytes: u64,
}

/// Copies the data tree rooted at `from` into `to`, overwriting conflicts.
///
/// The deletion marker at the root of `from` is never carried over.
pub fn copy_user_data_tree<Progress>(
    from: &Path,
    to: &Path,
    mut on_file_copied: Progress,
) -> Result<CopySummary>
where
    Progress: FnMut(&Path, u64),
{
    if !from.is_dir() {
        return Err(anyhow!(
            "source data location is not a directory: {}",
            from.display()
        ));
    }
    prepare_directory(to)?;

    let mut summary = CopySummary::default();
    let mut queue: VecDeque<PathBuf> = VecDeque::new();
    queue.push_back(PathBuf::new());

    while let Some(relative_dir) = queue.pop_front() {
        let from_dir = from.join(&relative_dir);
        for entry in fs::read_dir(&from_dir)
            .with_context(|| format!("failed reading source directory {}", from_dir.display()))?
        {
            let entry = entry?;
            if relative_dir.as_os_str().is_empty() && entry.file_name() == DELETION_INDICATOR_FILE
            {
                continue;
            }

            let relative_path = relative_dir.join(entry.file_name());
            let from_path = entry.path();
            let to_path = to.join(&relative_path);
            let file_type = entry
                .file_type()
                .with_context(|| format!("failed to stat {}", from_path.display()))?;

            if file_type.is_dir() {
                prepare_directory(&to_path)?;
                summary.directories += 1;
                queue.push_back(relative_path);
                continue;
            }

            clear_conflicting_directory(&to_path)?;

            #[cfg(unix)]
            if file_type.is_symlink() {
                let target = fs::read_link(&from_path)
                    .with_context(|| format!("failed to read symlink {}", from_path.display()))?;
                remove_existing_entry(&to_path)?;
                std::os::unix::fs::symlink(&target, &to_path).with_context(|| {
                    format!(
                        "failed to create symlink {} -> {}",
                        to_path.display(),
                        target.display()
                    )
                })?;
                summary.files += 1;
                on_file_copied(&relative_path, 0);
                continue;
            }

            let bytes = fs::copy(&from_path, &to_path).with_context(|| {
                format!(
                    "failed copying file from {} to {}",
                    from_path.display(),
                    to_path.display()
                )
            })?;
            summary.files += 1;
            summary.bytes += bytes;
            on_file_copied(&relative_path, bytes);
        }
    }

    Ok(summary)
}

pub fn count_user_data_files(root: &Path) -> Result<u64> {
    let mut count = 0_u64;
    let mut queue: VecDeque<PathBuf> = VecDeque::new();
    queue.push_back(root.to_path_buf());

    while let Some(dir) = queue.pop_front() {
        for entry in fs::read_dir(&dir)
            .with_context(|| format!("failed reading directory {}", dir.display()))?
        {
            let entry = entry?;
            let file_type = entry.file_type()?;
            if file_type.is_dir() {
                queue.push_back(entry.path());
            } else if !(dir == root && entry.file_name() == DELETION_INDICATOR_FILE) {
                count += 1;
            }
        }
    }

    Ok(count)
}

fn prepare_directory(path: &Path) -> Result<()> {
    match fs::symlink_metadata(path) {
        Ok(metadata) if metadata.is_dir() => return Ok(()),
        Ok(_) => fs::remove_file(path).with_context(|| {
            format!(
                "failed to replace file with directory at {}",
                path.display()
            )
        })?,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => {
            return Err(err).with_context(|| format!("failed to stat {}", path.display()));
        }
    }
    fs::create_dir_all(path).with_context(|| format!("failed to create {}", path.display()))
}

fn clear_conflicting_directory(path: &Path) -> Result<()> {
    match fs::symlink_metadata(path) {
        Ok(metadata) if metadata.is_dir() => fs::remove_dir_all(path).with_context(|| {
            format!(
                "failed to replace directory with file at {}",
                path.display()
            )
        }),
        _ => Ok(()),
    }
}

#[cfg(unix)]
fn remove_existing_entry(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err).with_context(|| format!("failed to replace {}", path.display())),
    }
}
