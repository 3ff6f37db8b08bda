use std::ops::{Deref, DerefMut};

use anyhow::Result;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ShortcutPlacement {
    StartMenu,
    Desktop,
    Startup,
}

pub const SHORTCUT_PLACEMENTS: [ShortcutPlacement; 3] = [
    ShortcutPlacement::StartMenu,
    ShortcutPlacement::Desktop,
    ShortcutPlacement::Startup,
];

impl ShortcutPlacement {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::StartMenu => "start-menu",
            Self::Desktop => "desktop",
            Self::Startup => "startup",
        }
    }
}

/// Shortcut and uninstaller registration primitives of the installer.
pub trait UpdateManager {
    fn create_shortcut(&mut self, executable_name: &str, placement: ShortcutPlacement)
        -> Result<()>;
    fn remove_shortcut(&mut self, executable_name: &str, placement: ShortcutPlacement)
        -> Result<()>;
    fn shortcut_exists(&mut self, executable_name: &str, placement: ShortcutPlacement)
        -> Result<bool>;
    fn create_uninstaller_entry(&mut self) -> Result<()>;
    fn remove_uninstaller_entry(&mut self) -> Result<()>;
    fn uninstaller_entry_exists(&mut self) -> Result<bool>;
    /// Flushes and closes the manager. Called exactly once per acquisition.
    fn release(&mut self) -> Result<()>;
}

pub trait UpdateManagerProvider {
    type Manager: UpdateManager;

    fn acquire(&self) -> Result<Self::Manager>;
}

/// An acquired manager that is released when the session ends, including
/// on early returns and panics.
pub struct UpdateSession<M: UpdateManager> {
    manager: M,
    released: bool,
}

impl<M: UpdateManager> UpdateSession<M> {
    pub fn open<P>(provider: &P) -> Result<Self>
    where
        P: UpdateManagerProvider<Manager = M>,
    {
        Ok(Self {
            manager: provider.acquire()?,
            released: false,
        })
    }

    /// Releases the manager and reports a release failure to the caller.
    pub fn finish(mut self) -> Result<()> {
        self.released = true;
        self.manager.release()
    }
}

impl<M: UpdateManager> Deref for UpdateSession<M> {
    type Target = M;

    fn deref(&self) -> &M {
        &self.manager
    }
}

impl<M: UpdateManager> DerefMut for UpdateSession<M> {
    fn deref_mut(&mut self) -> &mut M {
        &mut self.manager
    }
}

impl<M: UpdateManager> Drop for UpdateSession<M> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if let Err(err) = self.manager.release() {
            tracing::warn!("failed to release update manager: {err:#}");
        }
    }
}

/// Runs `operation` against a freshly acquired manager and releases it
/// afterwards whether or not the operation succeeded.
pub fn with_update_session<P, T, F>(provider: &P, operation: F) -> Result<T>
where
    P: UpdateManagerProvider,
    F: FnOnce(&mut P::Manager) -> Result<T>,
{
    let mut session = UpdateSession::open(provider)?;
    let value = operation(&mut *session)?;
    session.finish()?;
    Ok(value)
}
