use anyhow::Result;
use clap::{CommandFactory, Parser};
use colored::Colorize;
use std::path::PathBuf;
use std::time::Duration;

use doorway::commands::{run_connect, run_patterns, run_send};
use doorway::{AppConfig, Cli, Commands};
use doorway_logging::{ensure_logs_dir, init_logging, session_logs_dir, LogConfig};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Load environment variables from .env file if it exists
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    if let Some(shell) = cli.generate {
        clap_complete::generate(shell, &mut Cli::command(), "doorway", &mut std::io::stdout());
        return Ok(());
    }

    let config = AppConfig::load(cli.config.as_deref())?;
    // Without an explicit directory the application log goes to ~/.doorway/logs.
    let log_dir = cli
        .log_dir
        .clone()
        .or_else(|| config.log_dir.clone())
        .or_else(|| ensure_logs_dir().ok());
    init_logging(LogConfig {
        app_name: "doorway",
        verbose: cli.verbose,
        log_dir: log_dir.as_deref(),
    })?;

    let session_log_dir = session_log_dir(&cli, &config, log_dir)?;

    match cli.command {
        Some(Commands::Connect { targets, chain, session }) => {
            let settings = config.session_settings(&session);
            run_connect(&targets, &chain, &settings, session_log_dir).await
        }
        Some(Commands::Send { target, command, command_timeout, session }) => {
            let settings = config.session_settings(&session);
            let command_timeout =
                Duration::from_secs(command_timeout.unwrap_or(config.command_timeout_secs));
            run_send(&target, &command, command_timeout, &settings, session_log_dir).await
        }
        Some(Commands::Patterns { output }) => run_patterns(output.as_deref()),
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    }
}

/// Session logs go under `<log dir>/sessions`, or `~/.doorway/logs/sessions`
fn session_log_dir(cli: &Cli, config: &AppConfig, log_dir: Option<PathBuf>) -> Result<Option<PathBuf>> {
    if cli.no_session_log || !config.session_log {
        return Ok(None);
    }
    match log_dir {
        Some(dir) => Ok(Some(dir.join("sessions"))),
        None => Ok(Some(session_logs_dir()?)),
    }
}
