// Logging setup and on-disk locations shared by doorway binaries

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const DEFAULT_LOG_FILTER: &str = "doorway=info,doorway_fsm=info,doorway_terminal=warn";
const VERBOSE_LOG_FILTER: &str = "doorway=debug,doorway_fsm=debug,doorway_terminal=debug";

/// Logging configuration for a doorway binary
pub struct LogConfig<'a> {
    pub app_name: &'a str,
    pub verbose: bool,
    /// Also write a plain-text log to `<log_dir>/<app_name>.log`
    pub log_dir: Option<&'a Path>,
}

/// Initialize tracing with stderr output and an optional log file.
///
/// `RUST_LOG` overrides the default filters.
pub fn init_logging(config: LogConfig<'_>) -> Result<()> {
    let default_filter = if config.verbose {
        VERBOSE_LOG_FILTER
    } else {
        DEFAULT_LOG_FILTER
    };
    let filter = || {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter))
    };

    let file_layer = match config.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;
            let path = dir.join(format!("{}.log", config.app_name));
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .with_context(|| format!("Failed to open log file: {}", path.display()))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(Mutex::new(file))
                    .with_ansi(false)
                    .with_filter(filter()),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(file_layer)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(config.verbose)
                .with_filter(filter()),
        )
        .try_init()
        .context("Failed to initialize logging")?;

    Ok(())
}

/// Safely truncate a string to a maximum number of characters
pub fn safe_truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let keep = max_chars.saturating_sub(3);
        format!("{}...", s.chars().take(keep).collect::<String>())
    }
}

/// Base directory: `$DOORWAY_HOME`, else `~/.doorway`
pub fn doorway_home() -> Result<PathBuf> {
    if let Ok(override_path) = std::env::var("DOORWAY_HOME") {
        return Ok(PathBuf::from(override_path));
    }
    let home_dir = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .context("Failed to get home directory")?;
    Ok(PathBuf::from(home_dir).join(".doorway"))
}

/// Logs directory: `<doorway home>/logs`
pub fn logs_dir() -> Result<PathBuf> {
    Ok(doorway_home()?.join("logs"))
}

/// Per-session JSON-lines logs: `<doorway home>/logs/sessions`
pub fn session_logs_dir() -> Result<PathBuf> {
    Ok(logs_dir()?.join("sessions"))
}

/// Ensure the logs directory exists
pub fn ensure_logs_dir() -> Result<PathBuf> {
    let logs = logs_dir()?;
    std::fs::create_dir_all(&logs)
        .with_context(|| format!("Failed to create logs directory: {}", logs.display()))?;
    Ok(logs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_truncate() {
        assert_eq!(safe_truncate("router1#", 20), "router1#");
        assert_eq!(safe_truncate("show running-config", 10), "show ru...");
        assert_eq!(safe_truncate("ééééé", 4), "é...");
        assert_eq!(safe_truncate("abcdef", 2), "...");
    }

    // Only test touching DOORWAY_HOME, so no other test races on it.
    #[test]
    fn test_home_override_and_logs_dir() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        std::env::set_var("DOORWAY_HOME", temp_dir.path());

        assert_eq!(doorway_home().unwrap(), temp_dir.path());
        assert_eq!(session_logs_dir().unwrap(), temp_dir.path().join("logs").join("sessions"));
        let logs = ensure_logs_dir().unwrap();
        assert!(logs.is_dir());

        std::env::remove_var("DOORWAY_HOME");
    }
}
