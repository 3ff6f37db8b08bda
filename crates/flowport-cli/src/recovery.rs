use anyhow::Result;
use flowport_core::{
    location_exists, read_active_location_state, write_active_location_state, ActiveLocationState,
    DataLocationKind, PortabilityConfig,
};
use flowport_migration::{
    has_deletion_marker, remove_folder_if_exists, verify_superseded_copy_present,
};
use serde::Serialize;

use crate::host::{ProcessControl, UserPrompt};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "kebab-case")]
pub(crate) enum RecoveryOutcome {
    NothingToDo,
    RemovedRoaming { relocation_requested: bool },
    RemovedPortable,
    /// Both directories carry a marker; nothing was deleted.
    ConflictingMarkers,
    /// The marked directory still has entries missing from the active copy.
    SupersededCopyKept {
        location: DataLocationKind,
        missing_entries: usize,
    },
    /// A pending transition without markers; both trees are left in place.
    InterruptedTransitionCleared {
        from: DataLocationKind,
        to: DataLocationKind,
        active: DataLocationKind,
        destination_kept: bool,
    },
}

impl RecoveryOutcome {
    pub(crate) fn exit_code(self) -> i32 {
        match self {
            Self::SupersededCopyKept { .. } => 2,
            Self::ConflictingMarkers => 3,
            _ => 0,
        }
    }
}

/// Finishes or unwinds the previous portability transition.
///
/// Runs before anything reads user configuration. Only paths derived from
/// `config` are touched.
pub(crate) fn pre_start_clean_up_after_portability_update<U, C>(
    config: &PortabilityConfig,
    prompt: &mut U,
    process: &mut C,
) -> Result<RecoveryOutcome>
where
    U: UserPrompt,
    C: ProcessControl,
{
    let portable = config.portable_data_path();
    let roaming = config.roaming_data_path();
    let display_name = &config.identity().display_name;
    let portable_marked = has_deletion_marker(portable);
    let roaming_marked = has_deletion_marker(roaming);

    if portable_marked && roaming_marked {
        tracing::error!(
            portable = %portable.display(),
            roaming = %roaming.display(),
            "both data directories are marked for deletion; leaving both in place"
        );
        prompt.notify(&format!(
            "{display_name} found deletion markers in both {} and {}. Neither folder was deleted; remove the marker from the folder you want to keep.",
            portable.display(),
            roaming.display()
        ));
        return Ok(RecoveryOutcome::ConflictingMarkers);
    }

    if roaming_marked {
        if let Some(outcome) = keep_incomplete_superseded_copy(
            config,
            prompt,
            DataLocationKind::Roaming,
        )? {
            return Ok(outcome);
        }
        remove_folder_if_exists(roaming)?;
        write_active_location_state(
            config.state_path(),
            &ActiveLocationState::stable(DataLocationKind::Portable),
        )?;

        let relocate = prompt.confirm(&format!(
            "{display_name} has detected you enabled portable mode, would you like to move it to a different location?"
        ));
        if relocate {
            process.open_in_file_browser(config.application_root())?;
            process.terminate(0);
        }
        return Ok(RecoveryOutcome::RemovedRoaming {
            relocation_requested: relocate,
        });
    }

    if portable_marked {
        if let Some(outcome) = keep_incomplete_superseded_copy(
            config,
            prompt,
            DataLocationKind::Portable,
        )? {
            return Ok(outcome);
        }
        remove_folder_if_exists(portable)?;
        write_active_location_state(
            config.state_path(),
            &ActiveLocationState::stable(DataLocationKind::Roaming),
        )?;
        prompt.notify(&format!(
            "{display_name} has detected you disabled portable mode, the relevant shortcuts and uninstaller entry have been created"
        ));
        return Ok(RecoveryOutcome::RemovedPortable);
    }

    let Some(pending) = read_active_location_state(config.state_path())?
        .and_then(|state| state.pending)
    else {
        return Ok(RecoveryOutcome::NothingToDo);
    };

    let source = config.location(pending.from).path;
    let destination = config.location(pending.to).path;
    tracing::warn!(
        from = pending.from.as_str(),
        to = pending.to.as_str(),
        "previous portability transition was interrupted before completion"
    );
    // Nothing is deleted on this path.
    let source_has_data = location_exists(&source);
    let destination_kept = destination.exists();
    let active = if source_has_data || !location_exists(&destination) {
        pending.from
    } else {
        tracing::warn!(
            source = %source.display(),
            "transition source holds no data; using the copied data"
        );
        pending.to
    };
    write_active_location_state(config.state_path(), &ActiveLocationState::stable(active))?;

    let headline = format!(
        "The previous attempt to move {display_name} data from the {} folder to the {} folder did not finish.",
        pending.from.as_str(),
        pending.to.as_str()
    );
    let message = if active == pending.to {
        format!(
            "{headline} {} no longer holds data, so {} is now in use.",
            source.display(),
            destination.display()
        )
    } else if destination_kept {
        format!(
            "{headline} Your data in {} is still in use and nothing was deleted. Check {} and delete it manually before trying again.",
            source.display(),
            destination.display()
        )
    } else {
        format!(
            "{headline} Your data in {} is unchanged and the move can be retried.",
            source.display()
        )
    };
    prompt.notify(&message);
    Ok(RecoveryOutcome::InterruptedTransitionCleared {
        from: pending.from,
        to: pending.to,
        active,
        destination_kept,
    })
}

fn keep_incomplete_superseded_copy<U: UserPrompt>(
    config: &PortabilityConfig,
    prompt: &mut U,
    superseded: DataLocationKind,
) -> Result<Option<RecoveryOutcome>> {
    let superseded_path = config.location(superseded).path;
    let active_path = config.location(superseded.counterpart()).path;
    let mismatches = verify_superseded_copy_present(&superseded_path, &active_path)?;
    if mismatches.is_empty() {
        return Ok(None);
    }

    tracing::warn!(
        superseded = %superseded_path.display(),
        active = %active_path.display(),
        missing = mismatches.len(),
        "superseded data directory has entries missing from the active copy; not deleting"
    );
    prompt.notify(&format!(
        "{} kept {} because {} of its entries are missing from {}. Check the folders and delete it manually once the data is safe.",
        config.identity().display_name,
        superseded_path.display(),
        mismatches.len(),
        active_path.display()
    ));
    Ok(Some(RecoveryOutcome::SupersededCopyKept {
        location: superseded,
        missing_entries: mismatches.len(),
    }))
}
