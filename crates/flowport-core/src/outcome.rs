use serde::Serialize;

use crate::PortabilityError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum MigrationOutcome {
    Success,
    VerificationFailure,
    /// Data may already be copied; the transition stopped before the
    /// superseded directory was marked.
    PartialState,
    /// Refused before anything was touched.
    Rejected,
}

impl MigrationOutcome {
    pub fn from_result<T>(result: &anyhow::Result<T>) -> Self {
        match result {
            Ok(_) => Self::Success,
            Err(err) => Self::classify(err),
        }
    }

    pub fn classify(err: &anyhow::Error) -> Self {
        match err.downcast_ref::<PortabilityError>() {
            Some(PortabilityError::VerificationFailure { .. }) => Self::VerificationFailure,
            Some(PortabilityError::AmbiguousState { .. })
            | Some(PortabilityError::SourceMissing(_))
            | Some(PortabilityError::UserAbort) => Self::Rejected,
            Some(PortabilityError::ShellIntegration { .. }) | None => Self::PartialState,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::VerificationFailure => "verification-failure",
            Self::PartialState => "partial-state",
            Self::Rejected => "rejected",
        }
    }

    pub fn exit_code(self) -> i32 {
        match self {
            Self::Success => 0,
            Self::VerificationFailure => 2,
            Self::Rejected => 3,
            Self::PartialState => 4,
        }
    }
}
