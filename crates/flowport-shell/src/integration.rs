use std::fmt;

use anyhow::{anyhow, Result};
use flowport_core::PortabilityError;
use serde::Serialize;

use crate::{
    with_update_session, ShortcutPlacement, UpdateManager, UpdateManagerProvider,
    SHORTCUT_PLACEMENTS,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellArtifact {
    Shortcut(ShortcutPlacement),
    UninstallerEntry,
}

impl ShellArtifact {
    pub const ALL: [ShellArtifact; 4] = [
        ShellArtifact::Shortcut(ShortcutPlacement::StartMenu),
        ShellArtifact::Shortcut(ShortcutPlacement::Desktop),
        ShellArtifact::Shortcut(ShortcutPlacement::Startup),
        ShellArtifact::UninstallerEntry,
    ];
}

impl fmt::Display for ShellArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Shortcut(placement) => write!(f, "{} shortcut", placement.as_str()),
            Self::UninstallerEntry => f.write_str("uninstaller entry"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellChange {
    Applied,
    SkippedDevelopmentBuild,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ArtifactStatus {
    pub start_menu_shortcut: bool,
    pub desktop_shortcut: bool,
    pub startup_shortcut: bool,
    pub uninstaller_entry: bool,
}

impl ArtifactStatus {
    fn flags(&self) -> [bool; 4] {
        [
            self.start_menu_shortcut,
            self.desktop_shortcut,
            self.startup_shortcut,
            self.uninstaller_entry,
        ]
    }

    pub fn all_present(&self) -> bool {
        self.flags().iter().all(|present| *present)
    }

    pub fn none_present(&self) -> bool {
        self.flags().iter().all(|present| !*present)
    }
}

/// Adds and removes the OS artifacts of a non-portable install.
///
/// Every mutating call runs inside its own update session. Calls are no-ops
/// reporting [`ShellChange::SkippedDevelopmentBuild`] for development builds.
pub struct ShellIntegrationManager<P> {
    provider: P,
    executable_name: String,
    development_build: bool,
}

impl<P: UpdateManagerProvider> ShellIntegrationManager<P> {
    pub fn new(provider: P, executable_name: impl Into<String>, development_build: bool) -> Self {
        Self {
            provider,
            executable_name: executable_name.into(),
            development_build,
        }
    }

    pub fn is_skipped(&self) -> bool {
        self.development_build
    }

    pub fn create_shortcuts(&self) -> Result<ShellChange> {
        self.apply("creating shortcuts", |manager, executable_name| {
            for placement in SHORTCUT_PLACEMENTS {
                manager.create_shortcut(executable_name, placement)?;
            }
            Ok(())
        })
    }

    pub fn remove_shortcuts(&self) -> Result<ShellChange> {
        self.apply("removing shortcuts", |manager, executable_name| {
            for placement in SHORTCUT_PLACEMENTS {
                manager.remove_shortcut(executable_name, placement)?;
            }
            Ok(())
        })
    }

    pub fn create_uninstaller_entry(&self) -> Result<ShellChange> {
        self.apply("creating the uninstaller entry", |manager, _| {
            manager.create_uninstaller_entry()
        })
    }

    pub fn remove_uninstaller_entry(&self) -> Result<ShellChange> {
        self.apply("removing the uninstaller entry", |manager, _| {
            manager.remove_uninstaller_entry()
        })
    }

    /// Creates every shortcut and the uninstaller entry. On failure the
    /// artifacts created by this call are removed again; artifacts that
    /// already existed are left alone.
    pub fn install_artifacts(&self) -> Result<ShellChange> {
        self.apply(
            "installing shortcuts and the uninstaller entry",
            |manager, executable_name| {
                let mut created = Vec::new();
                for artifact in ShellArtifact::ALL {
                    let existed = artifact_exists(manager, executable_name, artifact)?;
                    if let Err(err) = create_artifact(manager, executable_name, artifact) {
                        for done in created.iter().rev() {
                            if let Err(rollback_err) =
                                remove_artifact(manager, executable_name, *done)
                            {
                                tracing::warn!(
                                    artifact = %done,
                                    "failed to roll back shell artifact: {rollback_err:#}"
                                );
                            }
                        }
                        return Err(err.context(format!("failed to create {artifact}")));
                    }
                    if !existed {
                        created.push(artifact);
                    }
                }
                Ok(())
            },
        )
    }

    /// Removes every shortcut and the uninstaller entry, attempting all of
    /// them before reporting the failures together.
    pub fn remove_artifacts(&self) -> Result<ShellChange> {
        self.apply(
            "removing shortcuts and the uninstaller entry",
            |manager, executable_name| {
                let failures = ShellArtifact::ALL
                    .into_iter()
                    .filter_map(|artifact| {
                        remove_artifact(manager, executable_name, artifact)
                            .err()
                            .map(|err| format!("{artifact}: {err:#}"))
                    })
                    .collect::<Vec<_>>();
                if failures.is_empty() {
                    Ok(())
                } else {
                    Err(anyhow!(
                        "failed to remove {} shell artifact(s): {}",
                        failures.len(),
                        failures.join("; ")
                    ))
                }
            },
        )
    }

    pub fn artifact_status(&self) -> Result<ArtifactStatus> {
        let executable_name = self.executable_name.as_str();
        with_update_session(&self.provider, |manager| {
            Ok(ArtifactStatus {
                start_menu_shortcut: manager
                    .shortcut_exists(executable_name, ShortcutPlacement::StartMenu)?,
                desktop_shortcut: manager
                    .shortcut_exists(executable_name, ShortcutPlacement::Desktop)?,
                startup_shortcut: manager
                    .shortcut_exists(executable_name, ShortcutPlacement::Startup)?,
                uninstaller_entry: manager.uninstaller_entry_exists()?,
            })
        })
    }

    fn apply<F>(&self, operation: &str, action: F) -> Result<ShellChange>
    where
        F: FnOnce(&mut P::Manager, &str) -> Result<()>,
    {
        if self.development_build {
            tracing::debug!(operation, "development build; shell integration skipped");
            return Ok(ShellChange::SkippedDevelopmentBuild);
        }

        let executable_name = self.executable_name.as_str();
        with_update_session(&self.provider, |manager| action(manager, executable_name))
            .map_err(|err| PortabilityError::shell_integration(operation, err))?;
        tracing::info!(operation, "shell integration updated");
        Ok(ShellChange::Applied)
    }
}

fn artifact_exists<M: UpdateManager>(
    manager: &mut M,
    executable_name: &str,
    artifact: ShellArtifact,
) -> Result<bool> {
    match artifact {
        ShellArtifact::Shortcut(placement) => manager.shortcut_exists(executable_name, placement),
        ShellArtifact::UninstallerEntry => manager.uninstaller_entry_exists(),
    }
}

fn create_artifact<M: UpdateManager>(
    manager: &mut M,
    executable_name: &str,
    artifact: ShellArtifact,
) -> Result<()> {
    match artifact {
        ShellArtifact::Shortcut(placement) => manager.create_shortcut(executable_name, placement),
        ShellArtifact::UninstallerEntry => manager.create_uninstaller_entry(),
    }
}

fn remove_artifact<M: UpdateManager>(
    manager: &mut M,
    executable_name: &str,
    artifact: ShellArtifact,
) -> Result<()> {
    match artifact {
        ShellArtifact::Shortcut(placement) => manager.remove_shortcut(executable_name, placement),
        ShellArtifact::UninstallerEntry => manager.remove_uninstaller_entry(),
    }
}
