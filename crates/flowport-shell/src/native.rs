use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{anyhow, Context, Result};
use flowport_core::PortabilityConfig;

use crate::command::{escape_ps_single_quote, escape_ps_single_quote_str, run_command};
use crate::fs_utils::remove_file_if_exists;
use crate::{ShortcutPlacement, UpdateManager, UpdateManagerProvider};

pub const WINDOWS_UNINSTALL_KEY: &str = r"HKCU\Software\Microsoft\Windows\CurrentVersion\Uninstall";

type CommandRunner = fn(&mut Command, &str) -> Result<()>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellFlavor {
    Windows,
    FreeDesktop,
}

impl ShellFlavor {
    pub fn host() -> Self {
        if cfg!(windows) {
            Self::Windows
        } else {
            Self::FreeDesktop
        }
    }

    fn shortcut_extension(self) -> &'static str {
        match self {
            Self::Windows => "lnk",
            Self::FreeDesktop => "desktop",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UninstallTarget {
    Registry { parent_key: String },
    EntryFile { dir: PathBuf },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellRoots {
    pub start_menu: PathBuf,
    pub desktop: PathBuf,
    pub startup: PathBuf,
    pub uninstall: UninstallTarget,
}

impl ShellRoots {
    pub fn detect(flavor: ShellFlavor) -> Result<Self> {
        match flavor {
            ShellFlavor::Windows => {
                let appdata = std::env::var_os("APPDATA")
                    .map(PathBuf::from)
                    .ok_or_else(|| {
                        anyhow!("APPDATA is not set; cannot resolve Windows shortcut locations")
                    })?;
                let start_menu = project_windows_start_menu_programs_dir(&appdata);
                let desktop = dirs::desktop_dir()
                    .ok_or_else(|| anyhow!("cannot resolve the Windows desktop folder"))?;
                Ok(Self {
                    startup: start_menu.join("Startup"),
                    start_menu,
                    desktop,
                    uninstall: UninstallTarget::Registry {
                        parent_key: WINDOWS_UNINSTALL_KEY.to_string(),
                    },
                })
            }
            ShellFlavor::FreeDesktop => {
                let home = dirs::home_dir()
                    .ok_or_else(|| anyhow!("HOME is not set; cannot resolve desktop entry locations"))?;
                let data_dir = dirs::data_dir().unwrap_or_else(|| home.join(".local").join("share"));
                let config_dir = dirs::config_dir().unwrap_or_else(|| home.join(".config"));
                Ok(Self {
                    start_menu: data_dir.join("applications"),
                    desktop: dirs::desktop_dir().unwrap_or_else(|| home.join("Desktop")),
                    startup: config_dir.join("autostart"),
                    uninstall: UninstallTarget::EntryFile {
                        dir: data_dir.join("flowport").join("uninstall"),
                    },
                })
            }
        }
    }

    pub fn placement_dir(&self, placement: ShortcutPlacement) -> &Path {
        match placement {
            ShortcutPlacement::StartMenu => &self.start_menu,
            ShortcutPlacement::Desktop => &self.desktop,
            ShortcutPlacement::Startup => &self.startup,
        }
    }
}

pub(crate) fn project_windows_start_menu_programs_dir(appdata: &Path) -> PathBuf {
    appdata
        .join("Microsoft")
        .join("Windows")
        .join("Start Menu")
        .join("Programs")
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct LaunchTarget {
    app_name: String,
    display_name: String,
    version: String,
    executable_dir: PathBuf,
    icon_path: PathBuf,
    install_location: PathBuf,
    uninstall_command: String,
}

impl LaunchTarget {
    fn from_config(config: &PortabilityConfig) -> Self {
        let identity = config.identity();
        Self {
            app_name: identity.name.clone(),
            display_name: identity.display_name.clone(),
            version: identity.version.to_string(),
            executable_dir: config.executable_dir().to_path_buf(),
            icon_path: config.icon_path().to_path_buf(),
            install_location: config.application_root().to_path_buf(),
            uninstall_command: format!("\"{}\" --uninstall", config.update_executable().display()),
        }
    }

    fn uninstall_values(&self) -> [(&'static str, String); 5] {
        [
            ("DisplayName", self.display_name.clone()),
            ("DisplayVersion", self.version.clone()),
            ("DisplayIcon", self.icon_path.display().to_string()),
            ("InstallLocation", self.install_location.display().to_string()),
            ("UninstallString", self.uninstall_command.clone()),
        ]
    }
}

pub struct NativeUpdateManagerProvider<R = CommandRunner> {
    flavor: ShellFlavor,
    roots: ShellRoots,
    target: LaunchTarget,
    runner: R,
}

impl NativeUpdateManagerProvider {
    pub fn for_host(config: &PortabilityConfig) -> Result<Self> {
        let flavor = ShellFlavor::host();
        let roots = ShellRoots::detect(flavor)?;
        Ok(Self::with_runner(
            config,
            flavor,
            roots,
            run_command as CommandRunner,
        ))
    }
}

impl<R> NativeUpdateManagerProvider<R>
where
    R: FnMut(&mut Command, &str) -> Result<()> + Clone,
{
    pub fn with_runner(
        config: &PortabilityConfig,
        flavor: ShellFlavor,
        roots: ShellRoots,
        runner: R,
    ) -> Self {
        Self {
            flavor,
            roots,
            target: LaunchTarget::from_config(config),
            runner,
        }
    }
}

impl<R> UpdateManagerProvider for NativeUpdateManagerProvider<R>
where
    R: FnMut(&mut Command, &str) -> Result<()> + Clone,
{
    type Manager = NativeUpdateManager<R>;

    fn acquire(&self) -> Result<Self::Manager> {
        Ok(NativeUpdateManager {
            flavor: self.flavor,
            roots: self.roots.clone(),
            target: self.target.clone(),
            runner: self.runner.clone(),
            refresh_desktop_database: false,
        })
    }
}

pub struct NativeUpdateManager<R = CommandRunner> {
    flavor: ShellFlavor,
    roots: ShellRoots,
    target: LaunchTarget,
    runner: R,
    refresh_desktop_database: bool,
}

impl<R> NativeUpdateManager<R>
where
    R: FnMut(&mut Command, &str) -> Result<()>,
{
    pub fn shortcut_path(&self, placement: ShortcutPlacement) -> PathBuf {
        let stem = match self.flavor {
            ShellFlavor::Windows => shortcut_file_stem(&self.target.display_name),
            ShellFlavor::FreeDesktop => shortcut_file_stem(&self.target.app_name),
        };
        self.roots
            .placement_dir(placement)
            .join(format!("{stem}.{}", self.flavor.shortcut_extension()))
    }

    fn uninstall_key(parent_key: &str, app_name: &str) -> String {
        format!(r"{parent_key}\{app_name}")
    }

    fn uninstall_entry_file(dir: &Path, app_name: &str) -> PathBuf {
        dir.join(format!("{app_name}.entry"))
    }

    fn registry_key_exists(&mut self, key: &str) -> bool {
        let mut query = Command::new("reg");
        query.arg("query").arg(key);
        (self.runner)(&mut query, "failed to query Windows registry key").is_ok()
    }

    fn write_windows_shortcut(&mut self, shortcut: &Path, executable: &Path) -> Result<()> {
        let script = format!(
            "$shell = New-Object -ComObject WScript.Shell; \
             $link = $shell.CreateShortcut('{}'); \
             $link.TargetPath = '{}'; \
             $link.WorkingDirectory = '{}'; \
             $link.IconLocation = '{}'; \
             $link.Description = '{}'; \
             $link.Save()",
            escape_ps_single_quote(shortcut),
            escape_ps_single_quote(executable),
            escape_ps_single_quote(&self.target.executable_dir),
            escape_ps_single_quote(&self.target.icon_path),
            escape_ps_single_quote_str(&self.target.display_name),
        );
        let mut command = Command::new("powershell");
        command
            .arg("-NoProfile")
            .arg("-NonInteractive")
            .arg("-Command")
            .arg(script);
        (self.runner)(&mut command, "failed to create Windows shortcut")
    }
}

impl<R> UpdateManager for NativeUpdateManager<R>
where
    R: FnMut(&mut Command, &str) -> Result<()>,
{
    fn create_shortcut(
        &mut self,
        executable_name: &str,
        placement: ShortcutPlacement,
    ) -> Result<()> {
        let dir = self.roots.placement_dir(placement).to_path_buf();
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create shortcut directory {}", dir.display()))?;
        let shortcut = self.shortcut_path(placement);
        let executable = self.target.executable_dir.join(executable_name);

        match self.flavor {
            ShellFlavor::Windows => self.write_windows_shortcut(&shortcut, &executable)?,
            ShellFlavor::FreeDesktop => {
                let entry = render_desktop_entry(
                    &self.target,
                    &executable,
                    placement == ShortcutPlacement::Startup,
                );
                fs::write(&shortcut, entry.as_bytes()).with_context(|| {
                    format!("failed to write desktop entry {}", shortcut.display())
                })?;
                if placement == ShortcutPlacement::StartMenu {
                    self.refresh_desktop_database = true;
                }
            }
        }

        tracing::debug!(
            placement = placement.as_str(),
            path = %shortcut.display(),
            "created shortcut"
        );
        Ok(())
    }

    fn remove_shortcut(
        &mut self,
        _executable_name: &str,
        placement: ShortcutPlacement,
    ) -> Result<()> {
        let shortcut = self.shortcut_path(placement);
        let removed = remove_file_if_exists(&shortcut)
            .with_context(|| format!("failed to remove shortcut {}", shortcut.display()))?;
        if removed {
            if self.flavor == ShellFlavor::FreeDesktop && placement == ShortcutPlacement::StartMenu {
                self.refresh_desktop_database = true;
            }
            tracing::debug!(
                placement = placement.as_str(),
                path = %shortcut.display(),
                "removed shortcut"
            );
        }
        Ok(())
    }

    fn shortcut_exists(
        &mut self,
        _executable_name: &str,
        placement: ShortcutPlacement,
    ) -> Result<bool> {
        Ok(self.shortcut_path(placement).is_file())
    }

    fn create_uninstaller_entry(&mut self) -> Result<()> {
        match self.roots.uninstall.clone() {
            UninstallTarget::Registry { parent_key } => {
                // The parent key is missing on some installs; `reg add` on an
                // existing key is a no-op.
                let mut ensure_parent = Command::new("reg");
                ensure_parent.arg("add").arg(&parent_key).arg("/f");
                (self.runner)(
                    &mut ensure_parent,
                    "failed to ensure Windows uninstall registry key",
                )?;

                let key = Self::uninstall_key(&parent_key, &self.target.app_name);
                for (name, value) in self.target.uninstall_values() {
                    let mut command = Command::new("reg");
                    command
                        .arg("add")
                        .arg(&key)
                        .arg("/v")
                        .arg(name)
                        .arg("/t")
                        .arg("REG_SZ")
                        .arg("/d")
                        .arg(value)
                        .arg("/f");
                    (self.runner)(
                        &mut command,
                        "failed to write Windows uninstall registry value",
                    )?;
                }
                tracing::debug!(key = %key, "created uninstaller registry entry");
            }
            UninstallTarget::EntryFile { dir } => {
                fs::create_dir_all(&dir).with_context(|| {
                    format!("failed to create uninstall entry directory {}", dir.display())
                })?;
                let path = Self::uninstall_entry_file(&dir, &self.target.app_name);
                let mut payload = String::new();
                for (name, value) in self.target.uninstall_values() {
                    if value.contains('\n') {
                        return Err(anyhow!(
                            "uninstall entry value '{name}' must not contain newlines"
                        ));
                    }
                    payload.push_str(&format!("{name}={value}\n"));
                }
                fs::write(&path, payload.as_bytes()).with_context(|| {
                    format!("failed to write uninstall entry {}", path.display())
                })?;
                tracing::debug!(path = %path.display(), "created uninstaller entry");
            }
        }
        Ok(())
    }

    fn remove_uninstaller_entry(&mut self) -> Result<()> {
        match self.roots.uninstall.clone() {
            UninstallTarget::Registry { parent_key } => {
                let key = Self::uninstall_key(&parent_key, &self.target.app_name);
                if !self.registry_key_exists(&key) {
                    return Ok(());
                }

                let mut command = Command::new("reg");
                command.arg("delete").arg(&key).arg("/f");
                if let Err(err) =
                    (self.runner)(&mut command, "failed to remove Windows registry key")
                {
                    if self.registry_key_exists(&key) {
                        return Err(err);
                    }
                }
                tracing::debug!(key = %key, "removed uninstaller registry entry");
                Ok(())
            }
            UninstallTarget::EntryFile { dir } => {
                let path = Self::uninstall_entry_file(&dir, &self.target.app_name);
                remove_file_if_exists(&path).with_context(|| {
                    format!("failed to remove uninstall entry {}", path.display())
                })?;
                Ok(())
            }
        }
    }

    fn uninstaller_entry_exists(&mut self) -> Result<bool> {
        match self.roots.uninstall.clone() {
            UninstallTarget::Registry { parent_key } => {
                let key = Self::uninstall_key(&parent_key, &self.target.app_name);
                Ok(self.registry_key_exists(&key))
            }
            UninstallTarget::EntryFile { dir } => {
                Ok(Self::uninstall_entry_file(&dir, &self.target.app_name).is_file())
            }
        }
    }

    fn release(&mut self) -> Result<()> {
        if !std::mem::take(&mut self.refresh_desktop_database) {
            return Ok(());
        }

        let mut refresh = Command::new("update-desktop-database");
        refresh.arg(&self.roots.start_menu);
        if let Err(err) = (self.runner)(
            &mut refresh,
            "failed to refresh desktop entry database",
        ) {
            tracing::warn!("desktop entry database refresh skipped: {err:#}");
        }
        Ok(())
    }
}

fn shortcut_file_stem(name: &str) -> String {
    name.chars()
        .map(|ch| match ch {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '-',
            ch if ch.is_control() => '-',
            ch => ch,
        })
        .collect()
}

fn quote_desktop_exec(path: &Path) -> String {
    let mut quoted = String::from("\"");
    for ch in path.display().to_string().chars() {
        if matches!(ch, '"' | '`' | '$' | '\\') {
            quoted.push('\\');
        }
        quoted.push(ch);
    }
    quoted.push('"');
    quoted
}

fn render_desktop_entry(target: &LaunchTarget, executable: &Path, autostart: bool) -> String {
    let mut desktop = String::new();
    desktop.push_str("[Desktop Entry]\n");
    desktop.push_str("Type=Application\n");
    desktop.push_str(&format!("Name={}\n", target.display_name.trim()));
    desktop.push_str(&format!("Exec={}\n", quote_desktop_exec(executable)));
    desktop.push_str(&format!("Path={}\n", target.executable_dir.display()));
    desktop.push_str(&format!("Icon={}\n", target.icon_path.display()));
    desktop.push_str("Terminal=false\n");
    desktop.push_str("Categories=Utility;\n");
    if autostart {
        desktop.push_str("X-GNOME-Autostart-enabled=true\n");
    }
    desktop
}
