use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use semver::Version;
use serde::{Deserialize, Serialize};

use crate::LauncherSettings;

pub const DELETION_INDICATOR_FILE: &str = ".dead";
pub const PORTABLE_DATA_DIR_NAME: &str = "UserData";
pub const STATE_FILE_NAME: &str = "portability-state.json";

const PORTABLE_DIR_ENV: &str = "FLOWPORT_PORTABLE_DIR";
const ROAMING_DIR_ENV: &str = "FLOWPORT_ROAMING_DIR";
const DEV_BUILD_ENV: &str = "FLOWPORT_DEV_BUILD";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataLocationKind {
    Portable,
    Roaming,
}

impl DataLocationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Portable => "portable",
            Self::Roaming => "roaming",
        }
    }

    pub fn counterpart(self) -> Self {
        match self {
            Self::Portable => Self::Roaming,
            Self::Roaming => Self::Portable,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataLocation {
    pub kind: DataLocationKind,
    pub path: PathBuf,
}

impl DataLocation {
    pub fn exists(&self) -> bool {
        self.path.is_dir()
    }

    pub fn has_data(&self) -> bool {
        location_exists(&self.path)
    }

    pub fn marker_path(&self) -> PathBuf {
        self.path.join(DELETION_INDICATOR_FILE)
    }

    pub fn is_marked_for_deletion(&self) -> bool {
        self.marker_path().is_file()
    }
}

/// Whether `path` is a directory holding anything besides the deletion marker.
pub fn location_exists(path: &Path) -> bool {
    let Ok(entries) = fs::read_dir(path) else {
        return false;
    };
    entries
        .filter_map(|entry| entry.ok())
        .any(|entry| entry.file_name() != DELETION_INDICATOR_FILE)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppIdentity {
    pub name: String,
    pub display_name: String,
    pub executable_name: String,
    pub version: Version,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    pub portable_dir: Option<PathBuf>,
    pub roaming_dir: Option<PathBuf>,
    pub development_build: Option<bool>,
}

impl ConfigOverrides {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            portable_dir: std::env::var_os(PORTABLE_DIR_ENV)
                .filter(|value| !value.is_empty())
                .map(PathBuf::from),
            roaming_dir: std::env::var_os(ROAMING_DIR_ENV)
                .filter(|value| !value.is_empty())
                .map(PathBuf::from),
            development_build: std::env::var_os(DEV_BUILD_ENV)
                .map(|value| parse_flag(DEV_BUILD_ENV, value))
                .transpose()?,
        })
    }

    /// Values set on `other` win.
    pub fn merged_with(self, other: &ConfigOverrides) -> Self {
        Self {
            portable_dir: other.portable_dir.clone().or(self.portable_dir),
            roaming_dir: other.roaming_dir.clone().or(self.roaming_dir),
            development_build: other.development_build.or(self.development_build),
        }
    }
}

fn parse_flag(name: &str, value: OsString) -> Result<bool> {
    let value = value.to_string_lossy().trim().to_ascii_lowercase();
    match value.as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "" | "0" | "false" | "no" | "off" => Ok(false),
        other => Err(anyhow!("{name} must be a boolean flag, got '{other}'")),
    }
}

/// Paths and identity computed once at process start.
///
/// Only environment inputs feed this struct: the executable location, the
/// OS profile folder, `launcher.toml` beside the executable and explicit
/// overrides. Nothing is read from inside the data directories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortabilityConfig {
    identity: AppIdentity,
    executable_dir: PathBuf,
    application_root: PathBuf,
    portable_data_path: PathBuf,
    roaming_data_path: PathBuf,
    state_path: PathBuf,
    update_executable: PathBuf,
    icon_path: PathBuf,
    development_build: bool,
}

impl PortabilityConfig {
    pub fn from_environment(
        executable_dir: Option<&Path>,
        overrides: &ConfigOverrides,
    ) -> Result<Self> {
        let executable_dir = match executable_dir {
            Some(dir) => absolute(dir)?,
            None => {
                let executable =
                    std::env::current_exe().context("failed to locate the running executable")?;
                executable
                    .parent()
                    .ok_or_else(|| {
                        anyhow!(
                            "running executable has no parent directory: {}",
                            executable.display()
                        )
                    })?
                    .to_path_buf()
            }
        };
        let settings = LauncherSettings::load_from_dir(&executable_dir)?;
        let overrides = ConfigOverrides::from_env()?.merged_with(overrides);
        let roaming_root = dirs::config_dir();

        Self::resolve(&executable_dir, roaming_root.as_deref(), settings, &overrides)
    }

    pub fn resolve(
        executable_dir: &Path,
        roaming_root: Option<&Path>,
        settings: LauncherSettings,
        overrides: &ConfigOverrides,
    ) -> Result<Self> {
        let executable_dir = absolute(executable_dir)?;
        let application_root = executable_dir
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| executable_dir.clone());

        let portable_data_path = match &overrides.portable_dir {
            Some(dir) => absolute(dir)?,
            None => executable_dir.join(PORTABLE_DATA_DIR_NAME),
        };
        let roaming_data_path = match (&overrides.roaming_dir, roaming_root) {
            (Some(dir), _) => absolute(dir)?,
            (None, Some(root)) => absolute(root)?.join(&settings.app_name),
            (None, None) => {
                return Err(anyhow!(
                    "cannot resolve the per-user roaming data folder; set {ROAMING_DIR_ENV}"
                ));
            }
        };
        if portable_data_path == roaming_data_path {
            return Err(anyhow!(
                "portable and roaming data locations must differ: {}",
                portable_data_path.display()
            ));
        }
        if portable_data_path.starts_with(&roaming_data_path)
            || roaming_data_path.starts_with(&portable_data_path)
        {
            return Err(anyhow!(
                "portable and roaming data locations must not contain each other: {} and {}",
                portable_data_path.display(),
                roaming_data_path.display()
            ));
        }

        let update_executable = match &settings.update_executable {
            Some(path) => application_root.join(path),
            None if cfg!(windows) => application_root.join("Update.exe"),
            None => executable_dir.join(&settings.executable_name),
        };
        let icon_path = executable_dir.join(settings.icon.as_deref().unwrap_or("app.ico"));
        let development_build = overrides
            .development_build
            .or(settings.development_build)
            .unwrap_or(cfg!(debug_assertions));

        Ok(Self {
            identity: AppIdentity {
                name: settings.app_name,
                display_name: settings.display_name,
                executable_name: settings.executable_name,
                version: settings.version,
            },
            state_path: executable_dir.join(STATE_FILE_NAME),
            executable_dir,
            application_root,
            portable_data_path,
            roaming_data_path,
            update_executable,
            icon_path,
            development_build,
        })
    }

    pub fn identity(&self) -> &AppIdentity {
        &self.identity
    }

    pub fn executable_dir(&self) -> &Path {
        &self.executable_dir
    }

    pub fn executable_path(&self) -> PathBuf {
        self.executable_dir.join(&self.identity.executable_name)
    }

    pub fn application_root(&self) -> &Path {
        &self.application_root
    }

    pub fn portable_data_path(&self) -> &Path {
        &self.portable_data_path
    }

    pub fn roaming_data_path(&self) -> &Path {
        &self.roaming_data_path
    }

    pub fn state_path(&self) -> &Path {
        &self.state_path
    }

    pub fn update_executable(&self) -> &Path {
        &self.update_executable
    }

    pub fn icon_path(&self) -> &Path {
        &self.icon_path
    }

    pub fn development_build(&self) -> bool {
        self.development_build
    }

    pub fn location(&self, kind: DataLocationKind) -> DataLocation {
        let path = match kind {
            DataLocationKind::Portable => self.portable_data_path.clone(),
            DataLocationKind::Roaming => self.roaming_data_path.clone(),
        };
        DataLocation { kind, path }
    }
}

fn absolute(path: &Path) -> Result<PathBuf> {
    std::path::absolute(path)
        .with_context(|| format!("failed to make path absolute: {}", path.display()))
}
