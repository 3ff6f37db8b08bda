use anyhow::{Context, Result};
use flowport_core::{ConfigOverrides, MigrationOutcome, PortabilityConfig, PortabilityError};
use flowport_shell::{NativeUpdateManagerProvider, ShellChange, ShellIntegrationManager};

use crate::completion::{resolve_completion_shell, write_completions_script};
use crate::controller::PortabilityController;
use crate::host::{SystemProcessControl, TerminalPrompt, UserPrompt};
use crate::recovery::pre_start_clean_up_after_portability_update;
use crate::render::{format_status_lines, outcome_status, TerminalRenderer};
use crate::{Cli, Commands};

type NativeController =
    PortabilityController<NativeUpdateManagerProvider, TerminalPrompt, SystemProcessControl>;

fn config_overrides(cli: &Cli) -> ConfigOverrides {
    ConfigOverrides {
        portable_dir: cli.portable_dir.clone(),
        roaming_dir: cli.roaming_dir.clone(),
        development_build: cli.dev_build,
    }
}

fn load_config(cli: &Cli) -> Result<PortabilityConfig> {
    PortabilityConfig::from_environment(cli.app_dir.as_deref(), &config_overrides(cli))
        .context("failed to resolve data locations")
}

fn native_controller(
    config: PortabilityConfig,
    prompt: TerminalPrompt,
) -> Result<NativeController> {
    let provider = NativeUpdateManagerProvider::for_host(&config)?;
    let shell = ShellIntegrationManager::new(
        provider,
        config.identity().executable_name.clone(),
        config.development_build(),
    );
    let process = SystemProcessControl::new(config.executable_path());
    Ok(PortabilityController::new(config, shell, prompt, process))
}

pub(crate) fn run_cli(cli: Cli) -> Result<i32> {
    let renderer = TerminalRenderer::current();

    match &cli.command {
        Commands::Completions { shell } => {
            let shell_env = std::env::var("SHELL").ok();
            let shell = resolve_completion_shell(*shell, shell_env.as_deref(), cfg!(windows));
            let mut stdout = std::io::stdout().lock();
            write_completions_script(shell, &mut stdout)?;
            Ok(0)
        }
        Commands::Prestart => {
            let config = load_config(&cli)?;
            let mut prompt = TerminalPrompt::new(renderer, cli.yes);
            let mut process = SystemProcessControl::new(config.executable_path());
            let outcome =
                pre_start_clean_up_after_portability_update(&config, &mut prompt, &mut process)?;
            tracing::info!(?outcome, "startup recovery finished");
            Ok(outcome.exit_code())
        }
        Commands::Status { json } => {
            let config = load_config(&cli)?;
            let prompt = TerminalPrompt::new(renderer, cli.yes);
            let mut controller = native_controller(config, prompt)?;
            let report = controller.status()?;
            if *json {
                let rendered = serde_json::to_string_pretty(&report)
                    .context("failed to serialize status report")?;
                println!("{rendered}");
            } else {
                renderer.print_lines(&format_status_lines(&report));
            }
            Ok(0)
        }
        Commands::Check => {
            let config = load_config(&cli)?;
            let prompt = TerminalPrompt::new(renderer, cli.yes);
            let mut controller = native_controller(config, prompt)?;
            if controller.can_update_portability() {
                renderer.print_status("ok", "portability can be changed");
                Ok(0)
            } else {
                Ok(MigrationOutcome::Rejected.exit_code())
            }
        }
        Commands::Enable | Commands::Disable => {
            let enable = matches!(cli.command, Commands::Enable);
            let config = load_config(&cli)?;
            let (from, to) = if enable {
                (config.roaming_data_path(), config.portable_data_path())
            } else {
                (config.portable_data_path(), config.roaming_data_path())
            };
            let question = format!(
                "Copy user data from {} to {} and restart {}?",
                from.display(),
                to.display(),
                config.identity().display_name
            );
            let mut prompt = TerminalPrompt::new(renderer, cli.yes);
            if !prompt.confirm(&question) {
                return Ok(report_transition(
                    renderer,
                    enable,
                    Err(PortabilityError::UserAbort.into()),
                ));
            }

            let mut controller = native_controller(config, prompt)?;
            let result = if enable {
                controller.enable_portable_mode()
            } else {
                controller.disable_portable_mode()
            };
            Ok(report_transition(renderer, enable, result))
        }
        Commands::RepairShell => {
            let config = load_config(&cli)?;
            let prompt = TerminalPrompt::new(renderer, cli.yes);
            let mut controller = native_controller(config, prompt)?;
            match controller.repair_shell_integration()? {
                ShellChange::Applied => {
                    renderer.print_status("ok", "shell integration matches the active location")
                }
                ShellChange::SkippedDevelopmentBuild => renderer
                    .print_status("warn", "shell integration skipped for a development build"),
            }
            Ok(0)
        }
    }
}

fn report_transition(renderer: TerminalRenderer, enable: bool, result: Result<()>) -> i32 {
    let outcome = MigrationOutcome::from_result(&result);
    let action = if enable {
        "portable mode enabled"
    } else {
        "portable mode disabled"
    };
    match result {
        Ok(()) => renderer.print_status(outcome_status(outcome), action),
        Err(err) => renderer.print_status(
            outcome_status(outcome),
            &format!("{} ({}): {err:#}", outcome.as_str(), action_failed(enable)),
        ),
    }
    outcome.exit_code()
}

fn action_failed(enable: bool) -> &'static str {
    if enable {
        "enabling portable mode failed"
    } else {
        "disabling portable mode failed"
    }
}
