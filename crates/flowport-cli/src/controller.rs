use std::path::PathBuf;

use anyhow::Result;
use flowport_core::{
    current_unix_timestamp, location_exists, read_active_location_state, resolve_active_location,
    write_active_location_state, ActiveLocationState, DataLocationKind, PendingTransition,
    PortabilityConfig, PortabilityError,
};
use flowport_migration::{
    count_user_data_files, indicate_deletion, move_user_data_folder_with_progress,
};
use flowport_shell::{ArtifactStatus, ShellChange, ShellIntegrationManager, UpdateManagerProvider};
use serde::Serialize;

use crate::host::{ProcessControl, UserPrompt};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct LocationStatus {
    pub(crate) kind: DataLocationKind,
    pub(crate) path: PathBuf,
    pub(crate) has_data: bool,
    pub(crate) marked_for_deletion: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct StatusReport {
    pub(crate) display_name: String,
    pub(crate) version: String,
    pub(crate) portable: LocationStatus,
    pub(crate) roaming: LocationStatus,
    pub(crate) active: DataLocationKind,
    pub(crate) pending: Option<PendingTransition>,
    pub(crate) development_build: bool,
    pub(crate) artifacts: Option<ArtifactStatus>,
}

/// Drives a portable/roaming transition from precondition check to restart.
pub(crate) struct PortabilityController<P, U, C> {
    config: PortabilityConfig,
    shell: ShellIntegrationManager<P>,
    prompt: U,
    process: C,
}

impl<P, U, C> PortabilityController<P, U, C>
where
    P: UpdateManagerProvider,
    U: UserPrompt,
    C: ProcessControl,
{
    pub(crate) fn new(
        config: PortabilityConfig,
        shell: ShellIntegrationManager<P>,
        prompt: U,
        process: C,
    ) -> Self {
        Self {
            config,
            shell,
            prompt,
            process,
        }
    }

    pub(crate) fn enable_portable_mode(&mut self) -> Result<()> {
        self.transition(DataLocationKind::Roaming, DataLocationKind::Portable)
    }

    pub(crate) fn disable_portable_mode(&mut self) -> Result<()> {
        self.transition(DataLocationKind::Portable, DataLocationKind::Roaming)
    }

    /// False when both locations hold data, whatever their markers say.
    pub(crate) fn can_update_portability(&mut self) -> bool {
        let portable = self.config.portable_data_path();
        let roaming = self.config.roaming_data_path();
        if location_exists(portable) && location_exists(roaming) {
            let message = format!(
                "{} detected user data in both {} and {}.\n\nDelete {} to proceed. No changes have occurred.",
                self.config.identity().display_name,
                portable.display(),
                roaming.display(),
                roaming.display()
            );
            self.prompt.notify(&message);
            return false;
        }
        true
    }

    /// Re-applies the shell artifact set that matches the active location.
    pub(crate) fn repair_shell_integration(&mut self) -> Result<ShellChange> {
        let state = read_active_location_state(self.config.state_path())?;
        let active = resolve_active_location(&self.config, state.as_ref());
        tracing::info!(active = active.as_str(), "repairing shell integration");
        match active {
            DataLocationKind::Portable => self.shell.remove_artifacts(),
            DataLocationKind::Roaming => self.shell.install_artifacts(),
        }
    }

    pub(crate) fn status(&mut self) -> Result<StatusReport> {
        let state = read_active_location_state(self.config.state_path())?;
        let active = resolve_active_location(&self.config, state.as_ref());
        let artifacts = match self.shell.artifact_status() {
            Ok(artifacts) => Some(artifacts),
            Err(err) => {
                tracing::warn!("shell artifact status unavailable: {err:#}");
                None
            }
        };
        let identity = self.config.identity();

        Ok(StatusReport {
            display_name: identity.display_name.clone(),
            version: identity.version.to_string(),
            portable: self.location_status(DataLocationKind::Portable),
            roaming: self.location_status(DataLocationKind::Roaming),
            active,
            pending: state.and_then(|state| state.pending),
            development_build: self.config.development_build(),
            artifacts,
        })
    }

    fn location_status(&self, kind: DataLocationKind) -> LocationStatus {
        let location = self.config.location(kind);
        LocationStatus {
            kind,
            has_data: location.has_data(),
            marked_for_deletion: location.is_marked_for_deletion(),
            path: location.path,
        }
    }

    fn transition(&mut self, from: DataLocationKind, to: DataLocationKind) -> Result<()> {
        let result = self.run_transition(from, to);
        if let Err(err) = &result {
            if !self.config.development_build() {
                tracing::error!(
                    from = from.as_str(),
                    to = to.as_str(),
                    "portability transition failed: {err:#}"
                );
            }
        }
        result
    }

    fn run_transition(&mut self, from: DataLocationKind, to: DataLocationKind) -> Result<()> {
        if !self.can_update_portability() {
            return Err(PortabilityError::AmbiguousState {
                portable: self.config.portable_data_path().to_path_buf(),
                roaming: self.config.roaming_data_path().to_path_buf(),
            }
            .into());
        }

        let source = self.config.location(from).path;
        let destination = self.config.location(to).path;
        if !source.is_dir() {
            return Err(PortabilityError::SourceMissing(source).into());
        }

        let state_path = self.config.state_path().to_path_buf();
        write_active_location_state(
            &state_path,
            &ActiveLocationState::begin_transition(from, to, current_unix_timestamp()),
        )?;
        tracing::info!(from = from.as_str(), to = to.as_str(), "portability transition started");

        let total_files = count_user_data_files(&source)?;
        self.prompt.copy_started(from, to, total_files);
        let prompt = &mut self.prompt;
        let moved = move_user_data_folder_with_progress(&source, &destination, |path, bytes| {
            prompt.file_copied(path, bytes)
        });
        self.prompt.copy_finished(moved.is_ok());
        let report = moved?;
        tracing::info!(
            files = report.verified.files_checked,
            directories = report.verified.directories_checked,
            "user data copied and verified"
        );

        match to {
            DataLocationKind::Portable => self.shell.remove_artifacts()?,
            DataLocationKind::Roaming => self.shell.install_artifacts()?,
        };

        indicate_deletion(&source)?;
        write_active_location_state(&state_path, &ActiveLocationState::stable(to))?;

        let message = match to {
            DataLocationKind::Portable => format!(
                "{} needs to restart to finish enabling portable mode. After the restart your roaming data profile will be deleted and the portable data profile kept.",
                self.config.identity().display_name
            ),
            DataLocationKind::Roaming => format!(
                "{} needs to restart to finish disabling portable mode. After the restart your portable data profile will be deleted and the roaming data profile kept.",
                self.config.identity().display_name
            ),
        };
        self.prompt.notify(&message);
        self.process.restart()
    }
}
