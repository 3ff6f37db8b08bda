use std::io::{BufRead, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result};
use flowport_core::DataLocationKind;

use crate::render::{render_status_line, TerminalProgress, TerminalRenderer};

/// User-facing side of a transition.
pub(crate) trait UserPrompt {
    fn notify(&mut self, message: &str);
    fn confirm(&mut self, question: &str) -> bool;

    fn copy_started(&mut self, _from: DataLocationKind, _to: DataLocationKind, _total_files: u64) {
    }

    fn file_copied(&mut self, _relative_path: &Path, _bytes: u64) {}

    fn copy_finished(&mut self, _succeeded: bool) {}
}

pub(crate) trait ProcessControl {
    fn restart(&mut self) -> Result<()>;
    fn open_in_file_browser(&mut self, path: &Path) -> Result<()>;
    /// Ends the current process. Test doubles record the request and return.
    fn terminate(&mut self, exit_code: i32);
}

pub(crate) struct TerminalPrompt {
    renderer: TerminalRenderer,
    assume_yes: bool,
    progress: Option<TerminalProgress>,
}

impl TerminalPrompt {
    pub(crate) fn new(renderer: TerminalRenderer, assume_yes: bool) -> Self {
        Self {
            renderer,
            assume_yes,
            progress: None,
        }
    }

    fn renderer_line(&self, status: &str, message: &str) -> String {
        render_status_line(self.renderer.style(), status, message)
    }
}

impl UserPrompt for TerminalPrompt {
    fn notify(&mut self, message: &str) {
        self.renderer.print_status("info", message);
    }

    fn confirm(&mut self, question: &str) -> bool {
        if self.assume_yes {
            tracing::debug!(question, "confirmed by --yes");
            return true;
        }
        let stdin = std::io::stdin();
        if !stdin.is_terminal() {
            tracing::warn!(question, "no terminal to confirm on; treating as declined");
            return false;
        }

        print!("{} [y/N] ", self.renderer_line("ask", question));
        if let Err(err) = std::io::stdout().flush() {
            tracing::debug!("failed to flush confirmation prompt: {err}");
        }
        let mut answer = String::new();
        if stdin.lock().read_line(&mut answer).is_err() {
            return false;
        }
        matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
    }

    fn copy_started(&mut self, from: DataLocationKind, to: DataLocationKind, total_files: u64) {
        let label = format!("{}->{}", from.as_str(), to.as_str());
        self.progress = Some(self.renderer.start_progress(&label, total_files));
    }

    fn file_copied(&mut self, _relative_path: &Path, bytes: u64) {
        if let Some(progress) = self.progress.as_mut() {
            progress.advance(bytes);
        }
    }

    fn copy_finished(&mut self, succeeded: bool) {
        if let Some(progress) = self.progress.take() {
            if succeeded {
                progress.finish_success();
            } else {
                progress.finish_abandon();
            }
        }
    }
}

pub(crate) struct SystemProcessControl {
    launcher_executable: PathBuf,
}

impl SystemProcessControl {
    pub(crate) fn new(launcher_executable: PathBuf) -> Self {
        Self {
            launcher_executable,
        }
    }
}

impl ProcessControl for SystemProcessControl {
    fn restart(&mut self) -> Result<()> {
        if !self.launcher_executable.is_file() {
            tracing::warn!(
                executable = %self.launcher_executable.display(),
                "launcher executable not found; start it manually to finish the transition"
            );
            return Ok(());
        }
        Command::new(&self.launcher_executable)
            .spawn()
            .with_context(|| {
                format!(
                    "failed to restart launcher: {}",
                    self.launcher_executable.display()
                )
            })?;
        tracing::info!(executable = %self.launcher_executable.display(), "launcher restarted");
        Ok(())
    }

    fn open_in_file_browser(&mut self, path: &Path) -> Result<()> {
        let mut command = file_browser_command(path);
        command
            .spawn()
            .with_context(|| format!("failed to open file browser at {}", path.display()))?;
        Ok(())
    }

    fn terminate(&mut self, exit_code: i32) {
        std::process::exit(exit_code);
    }
}

fn file_browser_command(path: &Path) -> Command {
    let program = if cfg!(windows) {
        "explorer"
    } else if cfg!(target_os = "macos") {
        "open"
    } else {
        "xdg-open"
    };
    let mut command = Command::new(program);
    command.arg(path);
    command
}
