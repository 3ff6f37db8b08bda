mod command;
mod fs_utils;
mod integration;
mod native;
mod update_manager;

pub use command::run_command;
pub use integration::{ArtifactStatus, ShellArtifact, ShellChange, ShellIntegrationManager};
pub use native::{
    NativeUpdateManager, NativeUpdateManagerProvider, ShellFlavor, ShellRoots, UninstallTarget,
    WINDOWS_UNINSTALL_KEY,
};
pub use update_manager::{
    with_update_session, ShortcutPlacement, UpdateManager, UpdateManagerProvider, UpdateSession,
    SHORTCUT_PLACEMENTS,
};

#[cfg(test)]
mod tests;
