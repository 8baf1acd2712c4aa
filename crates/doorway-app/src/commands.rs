use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use colored::Colorize;

use doorway_fsm::{Connection, Connector};
use doorway_logging::safe_truncate;
use doorway_patterns::{PatternConfig, PatternSet};
use doorway_terminal::{ScriptedTransport, Transport};
use doorway_types::{mask_url, Chain, Hop};

use crate::config::SessionSettings;

/// Parse `url,url,...` into a hop chain, jumphosts first
pub fn parse_chain(spec: &str) -> Result<Chain> {
    let urls: Vec<&str> = spec
        .split(',')
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .collect();
    Chain::parse(&urls).with_context(|| format!("Invalid target: {}", mask_url(spec)))
}

/// Compile patterns from `path`, or the built-in defaults
pub fn load_patterns(path: Option<&Path>) -> Result<Arc<PatternSet>> {
    let config = match path {
        Some(path) => PatternConfig::load_from_file(path)
            .with_context(|| format!("Failed to load patterns: {}", path.display()))?,
        None => PatternConfig::default(),
    };
    Ok(Arc::new(config.compile()?))
}

/// Connector replaying the same JSON step script on every attempt
pub fn dry_run_connector(script: &Path) -> Result<Connector> {
    let content = std::fs::read_to_string(script)
        .with_context(|| format!("Failed to read dry-run script: {}", script.display()))?;
    // Reject a malformed script up front rather than on the first attempt.
    ScriptedTransport::from_json(&content)
        .with_context(|| format!("Invalid dry-run script: {}", script.display()))?;

    Ok(Box::new(move |hop: &Hop| {
        let transport = ScriptedTransport::from_json(&content)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?
            .with_name(format!("dry-run {}", hop.host));
        Ok(Box::new(transport) as Box<dyn Transport>)
    }))
}

/// Build a connection with the resolved settings applied
pub fn build_connection(
    name: &str,
    chains: Vec<Chain>,
    settings: &SessionSettings,
    session_log_dir: Option<&Path>,
) -> Result<Connection> {
    let patterns = load_patterns(settings.patterns_file.as_deref())?;
    let mut conn = Connection::new(name, chains, patterns)
        .timeout(settings.timeout)
        .max_transitions(settings.max_transitions)
        .retry(settings.retry);

    if let Some(prompt) = &settings.prompt {
        conn = conn.prompt(prompt);
    }
    if let Some(dir) = session_log_dir {
        conn = conn.session_log(dir);
    }
    if let Some(script) = &settings.dry_run {
        conn = conn
            .connector(dry_run_connector(script)?)
            .retry_pauses(Duration::ZERO, Duration::ZERO);
    }
    Ok(conn)
}

/// Connect, return the detected prompt and disconnect
pub fn connect_target(mut conn: Connection, max_timeout: Duration) -> Result<String> {
    conn.reconnect(max_timeout)?;
    let prompt = conn.prompt_text().unwrap_or_default().to_string();
    conn.disconnect()?;
    Ok(prompt)
}

/// Connect, run one command and disconnect
pub fn send_command(
    mut conn: Connection,
    command: &str,
    command_timeout: Duration,
    max_timeout: Duration,
) -> Result<String> {
    conn.reconnect(max_timeout)?;
    let output = conn.send(command, command_timeout)?;
    conn.disconnect()?;
    Ok(output)
}

/// Connect to every target concurrently, one blocking task per device.
///
/// `alternatives` are extra chains to one further device.
pub async fn run_connect(
    targets: &[String],
    alternatives: &[String],
    settings: &SessionSettings,
    session_log_dir: Option<PathBuf>,
) -> Result<()> {
    let mut devices: Vec<(String, Vec<Chain>)> = Vec::new();
    for target in targets {
        let chain = parse_chain(target)?;
        devices.push((chain.target().host.clone(), vec![chain]));
    }
    if !alternatives.is_empty() {
        let chains = alternatives
            .iter()
            .map(|spec| parse_chain(spec))
            .collect::<Result<Vec<_>>>()?;
        devices.push((chains[0].target().host.clone(), chains));
    }

    let mut handles = Vec::new();
    for (name, chains) in devices {
        let conn = build_connection(&name, chains, settings, session_log_dir.as_deref())?;
        let max_timeout = settings.max_timeout;
        let handle = tokio::task::spawn_blocking(move || connect_target(conn, max_timeout));
        handles.push((name, handle));
    }

    let mut failed = 0;
    for (name, handle) in handles {
        match handle.await.context("Connection task panicked")? {
            Ok(prompt) => println!("{} {} {}", "✓".green(), name.bold(), prompt.dimmed()),
            Err(e) => {
                failed += 1;
                eprintln!("{} {}: {:#}", "✗".red(), name.bold(), e);
            }
        }
    }

    if failed > 0 {
        bail!("{} of the devices could not be reached", failed);
    }
    Ok(())
}

pub async fn run_send(
    target: &str,
    command: &str,
    command_timeout: Duration,
    settings: &SessionSettings,
    session_log_dir: Option<PathBuf>,
) -> Result<()> {
    let chain = parse_chain(target)?;
    let name = chain.target().host.clone();
    let conn = build_connection(&name, vec![chain], settings, session_log_dir.as_deref())?;
    let max_timeout = settings.max_timeout;
    let command = command.to_string();

    tracing::info!("Sending '{}' to {}", safe_truncate(&command, 60), name);
    let output = tokio::task::spawn_blocking(move || {
        send_command(conn, &command, command_timeout, max_timeout)
    })
    .await
    .context("Send task panicked")??;

    print!("{}", output);
    Ok(())
}

/// Print the default patterns as TOML, or write them to `output`
pub fn run_patterns(output: Option<&Path>) -> Result<()> {
    let config = PatternConfig::default();
    match output {
        Some(path) => {
            config
                .save_to_file(path)
                .with_context(|| format!("Failed to write patterns: {}", path.display()))?;
            println!("{} Wrote default patterns to {}", "✓".green(), path.display());
        }
        None => print!("{}", toml::to_string_pretty(&config)?),
    }
    Ok(())
}
