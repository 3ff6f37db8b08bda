use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationMismatch {
    MissingFile(PathBuf),
    MissingDirectory(PathBuf),
    NotAFile(PathBuf),
    ContentMismatch {
        path: PathBuf,
        expected_sha256: String,
        actual_sha256: String,
    },
}

impl VerificationMismatch {
    pub fn relative_path(&self) -> &PathBuf {
        match self {
            Self::MissingFile(path)
            | Self::MissingDirectory(path)
            | Self::NotAFile(path)
            | Self::ContentMismatch { path, .. } => path,
        }
    }
}

impl fmt::Display for VerificationMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingFile(path) => write!(f, "missing file '{}'", path.display()),
            Self::MissingDirectory(path) => write!(f, "missing directory '{}'", path.display()),
            Self::NotAFile(path) => write!(f, "'{}' is not a regular file", path.display()),
            Self::ContentMismatch {
                path,
                expected_sha256,
                actual_sha256,
            } => write!(
                f,
                "content mismatch for '{}' (expected sha256 {expected_sha256}, found {actual_sha256})",
                path.display()
            ),
        }
    }
}

#[derive(Debug, Error)]
pub enum PortabilityError {
    #[error(
        "user data verification failed copying {} to {}: {}",
        .from.display(),
        .to.display(),
        summarize_mismatches(.mismatches)
    )]
    VerificationFailure {
        from: PathBuf,
        to: PathBuf,
        mismatches: Vec<VerificationMismatch>,
    },

    #[error("shell integration failed while {operation}")]
    ShellIntegration {
        operation: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },

    #[error(
        "user data exists in both {} and {}; delete {} to proceed, no changes have occurred",
        .portable.display(),
        .roaming.display(),
        .roaming.display()
    )]
    AmbiguousState { portable: PathBuf, roaming: PathBuf },

    #[error("operation aborted by the user")]
    UserAbort,

    #[error("source data directory does not exist: {}", .0.display())]
    SourceMissing(PathBuf),
}

impl PortabilityError {
    pub fn shell_integration(operation: impl Into<String>, source: anyhow::Error) -> Self {
        Self::ShellIntegration {
            operation: operation.into(),
            source: source.into(),
        }
    }
}

fn summarize_mismatches(mismatches: &[VerificationMismatch]) -> String {
    const SHOWN: usize = 3;
    let mut rendered = mismatches
        .iter()
        .take(SHOWN)
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ");
    if mismatches.len() > SHOWN {
        rendered.push_str(&format!(" (and {} more)", mismatches.len() - SHOWN));
    }
    rendered
}
