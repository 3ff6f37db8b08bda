use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

mod completion;
mod controller;
mod dispatch;
mod host;
mod recovery;
mod render;

use completion::CliCompletionShell;
use render::{current_output_style, render_status_line};

#[derive(Parser, Debug)]
#[command(name = "flowport")]
#[command(
    about = "Move Flow Launcher user data between portable and roaming locations",
    long_about = None
)]
struct Cli {
    /// Directory holding the launcher executable (defaults to this binary's directory)
    #[arg(long, global = true)]
    app_dir: Option<PathBuf>,
    #[arg(long, global = true)]
    portable_dir: Option<PathBuf>,
    #[arg(long, global = true)]
    roaming_dir: Option<PathBuf>,
    /// Skip shell integration as a development build does
    #[arg(
        long,
        global = true,
        value_name = "BOOL",
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true"
    )]
    dev_build: Option<bool>,
    /// Answer yes to every confirmation
    #[arg(long, short = 'y', global = true)]
    yes: bool,
    #[arg(long, short = 'v', global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show both data locations, markers and shell artifacts
    Status {
        #[arg(long)]
        json: bool,
    },
    /// Check whether a transition is currently allowed
    Check,
    /// Move user data into the portable location
    Enable,
    /// Move user data back into the roaming location
    Disable,
    /// Finish or unwind the previous transition; run before the launcher starts
    Prestart,
    /// Re-apply shortcuts and the uninstaller entry for the active location
    RepairShell,
    Completions {
        #[arg(value_enum)]
        shell: Option<CliCompletionShell>,
    },
}

fn init_tracing(verbose: bool) {
    let level = if verbose { "debug" } else { "warn" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match dispatch::run_cli(cli) {
        Ok(code) => ExitCode::from(u8::try_from(code).unwrap_or(1)),
        Err(err) => {
            eprintln!(
                "{}",
                render_status_line(current_output_style(), "err", &format!("{err:#}"))
            );
            ExitCode::FAILURE
        }
    }
}
