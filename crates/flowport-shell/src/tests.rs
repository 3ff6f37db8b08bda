use std::cell::RefCell;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{anyhow, Result};
use flowport_core::{ConfigOverrides, LauncherSettings, PortabilityConfig, PortabilityError};

use super::*;

static TEST_ROOT_COUNTER: AtomicU64 = AtomicU64::new(0);

fn test_root() -> PathBuf {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system time")
        .as_nanos();
    let sequence = TEST_ROOT_COUNTER.fetch_add(1, Ordering::Relaxed);
    let path = std::env::temp_dir().join(format!(
        "flowport-shell-tests-{}-{}-{}",
        std::process::id(),
        nanos,
        sequence
    ));
    fs::create_dir_all(&path).expect("must create test root");
    path
}

fn test_config(root: &Path) -> PortabilityConfig {
    let settings = LauncherSettings {
        executable_name: "Flow.Launcher.exe".to_string(),
        version: "1.19.4".parse().expect("must parse version"),
        ..LauncherSettings::default()
    };
    PortabilityConfig::resolve(
        &root.join("FlowLauncher").join("app-1.19.4"),
        Some(&root.join("profile")),
        settings,
        &ConfigOverrides {
            development_build: Some(false),
            ..ConfigOverrides::default()
        },
    )
    .expect("config must resolve")
}

fn test_roots(root: &Path, uninstall: UninstallTarget) -> ShellRoots {
    ShellRoots {
        start_menu: root.join("shell").join("applications"),
        desktop: root.join("shell").join("Desktop"),
        startup: root.join("shell").join("autostart"),
        uninstall,
    }
}

#[derive(Default)]
struct FakeState {
    calls: Vec<String>,
    present: BTreeSet<String>,
    fail_on: Option<String>,
    fail_release: bool,
    releases: usize,
}

#[derive(Clone, Default)]
struct FakeProvider {
    state: Rc<RefCell<FakeState>>,
}

impl FakeProvider {
    fn failing_on(call: &str) -> Self {
        let provider = Self::default();
        provider.state.borrow_mut().fail_on = Some(call.to_string());
        provider
    }

    fn calls(&self) -> Vec<String> {
        self.state.borrow().calls.clone()
    }

    fn present(&self) -> BTreeSet<String> {
        self.state.borrow().present.clone()
    }

    fn releases(&self) -> usize {
        self.state.borrow().releases
    }
}

struct FakeManager {
    state: Rc<RefCell<FakeState>>,
}

impl FakeManager {
    fn record(&self, call: String) -> Result<()> {
        let mut state = self.state.borrow_mut();
        state.calls.push(call.clone());
        if state.fail_on.as_deref() == Some(call.as_str()) {
            return Err(anyhow!("injected failure on {call}"));
        }
        Ok(())
    }
}

impl UpdateManager for FakeManager {
    fn create_shortcut(&mut self, executable_name: &str, placement: ShortcutPlacement) -> Result<()> {
        self.record(format!("create-shortcut:{executable_name}:{}", placement.as_str()))?;
        self.state
            .borrow_mut()
            .present
            .insert(format!("shortcut:{}", placement.as_str()));
        Ok(())
    }

    fn remove_shortcut(&mut self, executable_name: &str, placement: ShortcutPlacement) -> Result<()> {
        self.record(format!("remove-shortcut:{executable_name}:{}", placement.as_str()))?;
        self.state
            .borrow_mut()
            .present
            .remove(&format!("shortcut:{}", placement.as_str()));
        Ok(())
    }

    fn shortcut_exists(&mut self, _executable_name: &str, placement: ShortcutPlacement) -> Result<bool> {
        Ok(self
            .state
            .borrow()
            .present
            .contains(&format!("shortcut:{}", placement.as_str())))
    }

    fn create_uninstaller_entry(&mut self) -> Result<()> {
        self.record("create-uninstaller-entry".to_string())?;
        self.state
            .borrow_mut()
            .present
            .insert("uninstaller-entry".to_string());
        Ok(())
    }

    fn remove_uninstaller_entry(&mut self) -> Result<()> {
        self.record("remove-uninstaller-entry".to_string())?;
        self.state.borrow_mut().present.remove("uninstaller-entry");
        Ok(())
    }

    fn uninstaller_entry_exists(&mut self) -> Result<bool> {
        Ok(self.state.borrow().present.contains("uninstaller-entry"))
    }

    fn release(&mut self) -> Result<()> {
        let mut state = self.state.borrow_mut();
        state.releases += 1;
        if state.fail_release {
            return Err(anyhow!("injected release failure"));
        }
        Ok(())
    }
}

impl UpdateManagerProvider for FakeProvider {
    type Manager = FakeManager;

    fn acquire(&self) -> Result<FakeManager> {
        Ok(FakeManager {
            state: Rc::clone(&self.state),
        })
    }
}

fn manager_with(provider: &FakeProvider, development_build: bool) -> ShellIntegrationManager<FakeProvider> {
    ShellIntegrationManager::new(provider.clone(), "Flow.Launcher.exe", development_build)
}

#[test]
fn create_shortcuts_covers_every_placement_in_one_session() {
    let provider = FakeProvider::default();
    let shell = manager_with(&provider, false);

    let change = shell.create_shortcuts().expect("must create shortcuts");

    assert_eq!(change, ShellChange::Applied);
    assert_eq!(
        provider.calls(),
        vec![
            "create-shortcut:Flow.Launcher.exe:start-menu",
            "create-shortcut:Flow.Launcher.exe:desktop",
            "create-shortcut:Flow.Launcher.exe:startup",
        ]
    );
    assert_eq!(provider.releases(), 1);
}

#[test]
fn development_build_skips_every_shell_operation() {
    let provider = FakeProvider::default();
    let shell = manager_with(&provider, true);

    assert!(shell.is_skipped());
    assert_eq!(
        shell.install_artifacts().expect("skip must succeed"),
        ShellChange::SkippedDevelopmentBuild
    );
    assert_eq!(
        shell.remove_artifacts().expect("skip must succeed"),
        ShellChange::SkippedDevelopmentBuild
    );
    assert_eq!(
        shell.create_uninstaller_entry().expect("skip must succeed"),
        ShellChange::SkippedDevelopmentBuild
    );
    assert!(provider.calls().is_empty());
    assert_eq!(provider.releases(), 0, "no manager is acquired when skipped");
}

#[test]
fn install_artifacts_rolls_back_created_members_on_failure() {
    let provider = FakeProvider::failing_on("create-uninstaller-entry");
    let shell = manager_with(&provider, false);

    let err = shell.install_artifacts().expect_err("install must fail");

    assert!(matches!(
        err.downcast_ref::<PortabilityError>(),
        Some(PortabilityError::ShellIntegration { .. })
    ));
    assert!(
        format!("{err:#}").contains("failed to create uninstaller entry"),
        "unexpected error: {err:#}"
    );
    assert!(provider.present().is_empty(), "created shortcuts must be rolled back");
    assert_eq!(
        &provider.calls()[4..],
        &[
            "remove-shortcut:Flow.Launcher.exe:startup".to_string(),
            "remove-shortcut:Flow.Launcher.exe:desktop".to_string(),
            "remove-shortcut:Flow.Launcher.exe:start-menu".to_string(),
        ]
    );
    assert_eq!(provider.releases(), 1, "manager is released on failure");
}

#[test]
fn install_rollback_keeps_artifacts_that_existed_before() {
    let provider = FakeProvider::failing_on("create-uninstaller-entry");
    provider
        .state
        .borrow_mut()
        .present
        .insert("shortcut:desktop".to_string());
    let shell = manager_with(&provider, false);

    shell.install_artifacts().expect_err("install must fail");

    let present = provider.present();
    assert!(present.contains("shortcut:desktop"));
    assert!(!present.contains("shortcut:start-menu"));
    assert!(!present.contains("shortcut:startup"));
}

#[test]
fn remove_artifacts_attempts_every_member_and_reports_failures_together() {
    let provider = FakeProvider::failing_on("remove-shortcut:Flow.Launcher.exe:desktop");
    {
        let mut state = provider.state.borrow_mut();
        for key in ["shortcut:start-menu", "shortcut:desktop", "shortcut:startup", "uninstaller-entry"] {
            state.present.insert(key.to_string());
        }
    }
    let shell = manager_with(&provider, false);

    let err = shell.remove_artifacts().expect_err("removal must report failure");
    let rendered = format!("{err:#}");

    assert!(rendered.contains("removing shortcuts and the uninstaller entry"), "{rendered}");
    assert!(rendered.contains("desktop shortcut"), "{rendered}");
    assert_eq!(provider.calls().len(), 4, "every member is attempted");
    assert_eq!(
        provider.present(),
        BTreeSet::from(["shortcut:desktop".to_string()])
    );
}

#[test]
fn artifact_status_reports_each_member() {
    let provider = FakeProvider::default();
    let shell = manager_with(&provider, false);
    assert!(shell.artifact_status().expect("status").none_present());

    shell.install_artifacts().expect("install must succeed");
    let status = shell.artifact_status().expect("status");
    assert!(status.all_present());

    shell.remove_shortcuts().expect("remove must succeed");
    let status = shell.artifact_status().expect("status");
    assert!(!status.desktop_shortcut);
    assert!(status.uninstaller_entry);
    assert!(!status.all_present());
    assert!(!status.none_present());
}

#[test]
fn update_session_releases_on_drop_and_reports_release_failure_on_finish() {
    let provider = FakeProvider::default();
    {
        let _session = UpdateSession::open(&provider).expect("must open");
    }
    assert_eq!(provider.releases(), 1);

    let failed: Result<()> = with_update_session(&provider, |_| Err(anyhow!("operation failed")));
    assert!(failed.is_err());
    assert_eq!(provider.releases(), 2, "release runs when the operation fails");

    provider.state.borrow_mut().fail_release = true;
    let err = with_update_session(&provider, |_| Ok(())).expect_err("release failure surfaces");
    assert!(err.to_string().contains("injected release failure"));
    assert_eq!(provider.releases(), 3, "release runs exactly once per session");
}

#[test]
fn freedesktop_manager_writes_entries_and_refreshes_database() {
    let root = test_root();
    let config = test_config(&root);
    let uninstall_dir = root.join("shell").join("uninstall");
    let roots = test_roots(
        &root,
        UninstallTarget::EntryFile {
            dir: uninstall_dir.clone(),
        },
    );
    let commands = Rc::new(RefCell::new(Vec::<String>::new()));
    let recorded = Rc::clone(&commands);
    let provider = NativeUpdateManagerProvider::with_runner(
        &config,
        ShellFlavor::FreeDesktop,
        roots,
        move |command: &mut Command, _context: &str| {
            recorded
                .borrow_mut()
                .push(command.get_program().to_string_lossy().into_owned());
            Ok(())
        },
    );
    let shell = ShellIntegrationManager::new(provider, "Flow.Launcher.exe", false);

    shell.install_artifacts().expect("install must succeed");

    let launcher = root.join("shell").join("applications").join("FlowLauncher.desktop");
    let entry = fs::read_to_string(&launcher).expect("must read desktop entry");
    assert!(entry.contains("Name=Flow Launcher\n"));
    assert!(entry.contains(&format!(
        "Exec=\"{}\"\n",
        config.executable_path().display()
    )));
    assert!(!entry.contains("X-GNOME-Autostart-enabled"));
    let autostart = fs::read_to_string(root.join("shell").join("autostart").join("FlowLauncher.desktop"))
        .expect("must read autostart entry");
    assert!(autostart.contains("X-GNOME-Autostart-enabled=true"));
    assert!(root.join("shell").join("Desktop").join("FlowLauncher.desktop").is_file());

    let uninstall = fs::read_to_string(uninstall_dir.join("FlowLauncher.entry"))
        .expect("must read uninstall entry");
    assert!(uninstall.contains("DisplayVersion=1.19.4\n"));
    assert!(uninstall.contains(&format!("DisplayIcon={}\n", config.icon_path().display())));
    assert!(uninstall.contains(&format!(
        "InstallLocation={}\n",
        config.application_root().display()
    )));
    assert_eq!(*commands.borrow(), vec!["update-desktop-database".to_string()]);

    shell.remove_artifacts().expect("removal must succeed");
    assert!(shell.artifact_status().expect("status").none_present());
    assert!(!launcher.exists());
    assert_eq!(commands.borrow().len(), 2, "removing the menu entry refreshes again");

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn freedesktop_database_refresh_failure_is_not_fatal() {
    let root = test_root();
    let config = test_config(&root);
    let roots = test_roots(
        &root,
        UninstallTarget::EntryFile {
            dir: root.join("uninstall"),
        },
    );
    let provider = NativeUpdateManagerProvider::with_runner(
        &config,
        ShellFlavor::FreeDesktop,
        roots,
        |_command: &mut Command, context: &str| Err(anyhow!("{context}: tool missing")),
    );
    let shell = ShellIntegrationManager::new(provider, "Flow.Launcher.exe", false);

    shell.create_shortcuts().expect("refresh failure must only warn");

    let _ = fs::remove_dir_all(&root);
}

fn render_command(command: &Command) -> String {
    let mut rendered = command.get_program().to_string_lossy().into_owned();
    for arg in command.get_args() {
        rendered.push(' ');
        rendered.push_str(&arg.to_string_lossy());
    }
    rendered
}

#[test]
fn windows_manager_ensures_parent_key_before_writing_uninstall_values() {
    let root = test_root();
    let config = test_config(&root);
    let roots = test_roots(
        &root,
        UninstallTarget::Registry {
            parent_key: WINDOWS_UNINSTALL_KEY.to_string(),
        },
    );
    let commands = Rc::new(RefCell::new(Vec::<String>::new()));
    let recorded = Rc::clone(&commands);
    let provider = NativeUpdateManagerProvider::with_runner(
        &config,
        ShellFlavor::Windows,
        roots,
        move |command: &mut Command, _context: &str| {
            recorded.borrow_mut().push(render_command(command));
            Ok(())
        },
    );
    let shell = ShellIntegrationManager::new(provider, "Flow.Launcher.exe", false);

    shell.create_uninstaller_entry().expect("must create entry");

    let commands = commands.borrow();
    let key = format!(r"{WINDOWS_UNINSTALL_KEY}\FlowLauncher");
    assert_eq!(commands.len(), 6);
    assert_eq!(commands[0], format!("reg add {WINDOWS_UNINSTALL_KEY} /f"));
    assert!(commands[1..].iter().all(|command| command.starts_with(&format!("reg add {key} /v "))));
    assert!(commands.contains(&format!(
        "reg add {key} /v DisplayIcon /t REG_SZ /d {} /f",
        config.icon_path().display()
    )));
    assert!(commands.contains(&format!(
        "reg add {key} /v UninstallString /t REG_SZ /d \"{}\" --uninstall /f",
        config.update_executable().display()
    )));

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn windows_manager_skips_delete_when_uninstall_key_is_absent() {
    let root = test_root();
    let config = test_config(&root);
    let roots = test_roots(
        &root,
        UninstallTarget::Registry {
            parent_key: WINDOWS_UNINSTALL_KEY.to_string(),
        },
    );
    let commands = Rc::new(RefCell::new(Vec::<String>::new()));
    let recorded = Rc::clone(&commands);
    let provider = NativeUpdateManagerProvider::with_runner(
        &config,
        ShellFlavor::Windows,
        roots,
        move |command: &mut Command, context: &str| {
            let rendered = render_command(command);
            let is_query = rendered.starts_with("reg query");
            recorded.borrow_mut().push(rendered);
            if is_query {
                return Err(anyhow!("{context}: key not found"));
            }
            Ok(())
        },
    );
    let shell = ShellIntegrationManager::new(provider, "Flow.Launcher.exe", false);

    shell.remove_uninstaller_entry().expect("absent key is not an error");

    assert_eq!(
        *commands.borrow(),
        vec![format!(r"reg query {WINDOWS_UNINSTALL_KEY}\FlowLauncher")]
    );

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn windows_shortcuts_are_created_through_powershell() {
    let root = test_root();
    let config = test_config(&root);
    let roots = test_roots(
        &root,
        UninstallTarget::Registry {
            parent_key: WINDOWS_UNINSTALL_KEY.to_string(),
        },
    );
    let scripts = Rc::new(RefCell::new(Vec::<String>::new()));
    let recorded = Rc::clone(&scripts);
    let provider = NativeUpdateManagerProvider::with_runner(
        &config,
        ShellFlavor::Windows,
        roots,
        move |command: &mut Command, _context: &str| {
            assert_eq!(command.get_program(), "powershell");
            let script = command
                .get_args()
                .last()
                .map(|arg| arg.to_string_lossy().into_owned())
                .expect("must pass a script");
            recorded.borrow_mut().push(script);
            Ok(())
        },
    );
    let mut manager = provider.acquire().expect("must acquire");

    manager
        .create_shortcut("Flow.Launcher.exe", ShortcutPlacement::Startup)
        .expect("must create shortcut");

    let expected_link = root
        .join("shell")
        .join("autostart")
        .join("Flow Launcher.lnk");
    assert_eq!(manager.shortcut_path(ShortcutPlacement::Startup), expected_link);
    let scripts = scripts.borrow();
    assert_eq!(scripts.len(), 1);
    assert!(scripts[0].contains(&format!("CreateShortcut('{}')", expected_link.display())));
    assert!(scripts[0].contains(&format!(
        "$link.TargetPath = '{}'",
        config.executable_path().display()
    )));
    assert!(root.join("shell").join("autostart").is_dir());

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn windows_start_menu_projection() {
    let appdata = PathBuf::from("C:/Users/demo/AppData/Roaming");
    assert_eq!(
        native::project_windows_start_menu_programs_dir(&appdata),
        appdata
            .join("Microsoft")
            .join("Windows")
            .join("Start Menu")
            .join("Programs")
    );
}
