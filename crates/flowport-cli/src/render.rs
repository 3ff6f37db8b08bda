use std::io::IsTerminal;
use std::time::{Duration, Instant};

use anstyle::{AnsiColor, Effects, Style};
use flowport_core::{DataLocationKind, MigrationOutcome};
use indicatif::{HumanBytes, HumanCount, ProgressBar, ProgressStyle};

use crate::controller::{LocationStatus, StatusReport};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum OutputStyle {
    Plain,
    Rich,
}

pub(crate) fn current_output_style() -> OutputStyle {
    if std::env::var_os("NO_COLOR").is_some() || !std::io::stdout().is_terminal() {
        OutputStyle::Plain
    } else {
        OutputStyle::Rich
    }
}

pub(crate) fn render_status_line(style: OutputStyle, status: &str, message: &str) -> String {
    match style {
        OutputStyle::Plain => message.to_string(),
        OutputStyle::Rich => format!("{} {message}", status_badge(status)),
    }
}

fn status_badge(status: &str) -> &'static str {
    match status {
        "ok" => "[OK]",
        "warn" => "[WARN]",
        "err" => "[ERR]",
        "ask" => "[??]",
        _ => "[..]",
    }
}

pub(crate) fn outcome_status(outcome: MigrationOutcome) -> &'static str {
    match outcome {
        MigrationOutcome::Success => "ok",
        MigrationOutcome::Rejected => "warn",
        MigrationOutcome::VerificationFailure | MigrationOutcome::PartialState => "err",
    }
}

#[derive(Copy, Clone, Debug)]
pub(crate) struct TerminalRenderer {
    style: OutputStyle,
}

pub(crate) struct TerminalProgress {
    style: OutputStyle,
    label: String,
    total: u64,
    current: u64,
    bytes: u64,
    progress_bar: Option<ProgressBar>,
    started_at: Instant,
}

impl TerminalRenderer {
    pub(crate) fn from_style(style: OutputStyle) -> Self {
        Self { style }
    }

    pub(crate) fn current() -> Self {
        Self::from_style(current_output_style())
    }

    pub(crate) fn style(self) -> OutputStyle {
        self.style
    }

    pub(crate) fn print_status(self, status: &str, message: &str) {
        println!("{}", render_status_line(self.style, status, message));
    }

    pub(crate) fn print_lines(self, lines: &[String]) {
        for line in lines {
            println!("{line}");
        }
    }

    pub(crate) fn start_progress(self, label: &str, total: u64) -> TerminalProgress {
        let progress_bar = if self.style == OutputStyle::Rich {
            let progress_bar = ProgressBar::new(total.max(1));
            if let Ok(style) = ProgressStyle::with_template(
                "{spinner:.cyan.bold} {msg:<12} [{bar:20.cyan/blue}] {pos:>3}/{len:3} {elapsed_precise}",
            ) {
                progress_bar.set_style(style.tick_chars("|/-\\ ").progress_chars("=>-"));
            }
            progress_bar.set_message(label.to_string());
            progress_bar.enable_steady_tick(Duration::from_millis(80));
            Some(progress_bar)
        } else {
            None
        };

        TerminalProgress {
            style: self.style,
            label: label.to_string(),
            total,
            current: 0,
            bytes: 0,
            progress_bar,
            started_at: Instant::now(),
        }
    }
}

impl TerminalProgress {
    pub(crate) fn advance(&mut self, bytes: u64) {
        self.current = (self.current + 1).min(self.total);
        self.bytes += bytes;

        let Some(progress_bar) = &self.progress_bar else {
            return;
        };
        progress_bar.set_position(self.current);
    }

    pub(crate) fn finish_success(mut self) {
        let Some(progress_bar) = self.progress_bar.take() else {
            return;
        };

        progress_bar.finish_and_clear();
        if let Some(line) = render_progress_line(
            self.style,
            &self.label,
            self.current,
            self.total,
            self.bytes,
            Some(self.started_at.elapsed()),
        ) {
            println!("{line}");
        }
    }

    pub(crate) fn finish_abandon(mut self) {
        if let Some(progress_bar) = self.progress_bar.take() {
            progress_bar.finish_and_clear();
        }
    }
}

fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    let millis = elapsed.subsec_millis();
    format!("{secs}.{millis:03}s")
}

fn progress_label_style() -> Style {
    Style::new()
        .fg_color(Some(AnsiColor::BrightCyan.into()))
        .effects(Effects::BOLD)
}

fn progress_bar_style() -> Style {
    Style::new().fg_color(Some(AnsiColor::BrightBlue.into()))
}

fn colorize(style: Style, text: &str) -> String {
    format!("{}{}{}", style.render(), text, style.render_reset())
}

pub(crate) fn render_progress_line(
    style: OutputStyle,
    label: &str,
    current: u64,
    total: u64,
    bytes: u64,
    elapsed: Option<Duration>,
) -> Option<String> {
    if style == OutputStyle::Plain {
        return None;
    }

    let width = 18_usize;
    let safe_total = total.max(1);
    let bounded_current = current.min(safe_total);
    let filled = ((bounded_current as usize) * width) / (safe_total as usize);
    let bar = format!(
        "{}{}",
        "=".repeat(filled),
        "-".repeat(width.saturating_sub(filled))
    );
    let percent = (bounded_current * 100) / safe_total;
    let counts = format!(
        "{}/{} files, {}",
        HumanCount(current),
        HumanCount(total),
        HumanBytes(bytes)
    );
    let suffix = elapsed
        .map(|value| format!(" complete in {}", format_elapsed(value)))
        .unwrap_or_default();

    Some(format!(
        "{} [{}] {:>3}% {}{}",
        colorize(progress_label_style(), label),
        colorize(progress_bar_style(), &bar),
        percent,
        counts,
        suffix
    ))
}

fn format_location_line(status: &LocationStatus, active: DataLocationKind) -> String {
    let mut flags = Vec::new();
    if status.kind == active {
        flags.push("active");
    }
    flags.push(if status.has_data { "data" } else { "empty" });
    if status.marked_for_deletion {
        flags.push("marked-for-deletion");
    }
    format!(
        "{}: {} ({})",
        status.kind.as_str(),
        status.path.display(),
        flags.join(", ")
    )
}

pub(crate) fn format_status_lines(report: &StatusReport) -> Vec<String> {
    let mut lines = vec![
        format!("application: {} {}", report.display_name, report.version),
        format_location_line(&report.portable, report.active),
        format_location_line(&report.roaming, report.active),
    ];
    if let Some(pending) = &report.pending {
        lines.push(format!(
            "pending transition: {} -> {} (started at {})",
            pending.from.as_str(),
            pending.to.as_str(),
            pending.started_at_unix
        ));
    }
    if report.development_build {
        lines.push("shell integration: skipped (development build)".to_string());
    }
    match &report.artifacts {
        Some(artifacts) => lines.push(format!(
            "shell artifacts: start-menu={} desktop={} startup={} uninstaller-entry={}",
            artifacts.start_menu_shortcut,
            artifacts.desktop_shortcut,
            artifacts.startup_shortcut,
            artifacts.uninstaller_entry
        )),
        None => lines.push("shell artifacts: unavailable".to_string()),
    }
    lines
}
