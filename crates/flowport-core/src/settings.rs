use std::fs;
use std::io;
use std::path::Path;

use anyhow::{anyhow, Context};
use semver::Version;
use serde::{Deserialize, Serialize};

pub const LAUNCHER_SETTINGS_FILE: &str = "launcher.toml";

/// Install-time settings shipped beside the launcher executable.
///
/// The file lives next to the binary, never inside either user data
/// directory, so it can be read before the startup recovery pass decides
/// which data directory survives.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LauncherSettings {
    pub app_name: String,
    pub display_name: String,
    pub executable_name: String,
    pub version: Version,
    pub development_build: Option<bool>,
    pub update_executable: Option<String>,
    pub icon: Option<String>,
}

impl Default for LauncherSettings {
    fn default() -> Self {
        Self {
            app_name: "FlowLauncher".to_string(),
            display_name: "Flow Launcher".to_string(),
            executable_name: default_executable_name().to_string(),
            version: Version::parse(env!("CARGO_PKG_VERSION"))
                .unwrap_or_else(|_| Version::new(0, 0, 0)),
            development_build: None,
            update_executable: None,
            icon: None,
        }
    }
}

impl LauncherSettings {
    pub fn from_toml_str(input: &str) -> anyhow::Result<Self> {
        let settings: Self = toml::from_str(input).context("failed to parse launcher settings")?;
        validate_path_token("app_name", &settings.app_name)?;
        validate_path_token("executable_name", &settings.executable_name)?;
        if settings.display_name.trim().is_empty() {
            return Err(anyhow!("display_name must not be empty"));
        }
        if settings.display_name.contains('\n') {
            return Err(anyhow!("display_name must not contain newlines"));
        }
        Ok(settings)
    }

    pub fn load_from_dir(dir: &Path) -> anyhow::Result<Self> {
        let path = dir.join(LAUNCHER_SETTINGS_FILE);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(err) => {
                return Err(err).with_context(|| {
                    format!("failed to read launcher settings: {}", path.display())
                });
            }
        };

        Self::from_toml_str(&raw)
            .with_context(|| format!("invalid launcher settings: {}", path.display()))
    }
}

fn default_executable_name() -> &'static str {
    if cfg!(windows) {
        "Flow.Launcher.exe"
    } else {
        "flow-launcher"
    }
}

// Used as a directory name, a registry key name and a shortcut file stem.
fn validate_path_token(field: &str, value: &str) -> anyhow::Result<()> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(anyhow!("{field} must not be empty"));
    }
    if trimmed != value {
        return Err(anyhow!("{field} must not have surrounding whitespace: '{value}'"));
    }
    if value == "." || value == ".." {
        return Err(anyhow!("{field} must not be a relative path component: {value}"));
    }
    if value
        .chars()
        .any(|ch| matches!(ch, '/' | '\\' | ':' | '\n' | '\t' | '\0'))
    {
        return Err(anyhow!("{field} contains invalid character(s): {value}"));
    }
    Ok(())
}
