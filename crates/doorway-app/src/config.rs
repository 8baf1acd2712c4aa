use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use doorway_types::{
    DEFAULT_COMMAND_TIMEOUT_SECS, DEFAULT_MAX_TRANSITIONS, DEFAULT_RECONNECT_TIMEOUT_SECS,
    DEFAULT_TIMEOUT_SECS,
};

use crate::cli::SessionArgs;

/// Persistent settings, read from `config.toml`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Per-step FSM timeout in seconds
    pub timeout_secs: u64,
    /// Reconnect budget in seconds
    pub max_timeout_secs: u64,
    pub command_timeout_secs: u64,
    pub max_transitions: usize,
    /// Keep retrying chains until the budget runs out
    pub retry: bool,
    pub patterns_file: Option<PathBuf>,
    pub session_log: bool,
    pub log_dir: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_timeout_secs: DEFAULT_RECONNECT_TIMEOUT_SECS,
            command_timeout_secs: DEFAULT_COMMAND_TIMEOUT_SECS,
            max_transitions: DEFAULT_MAX_TRANSITIONS,
            retry: true,
            patterns_file: None,
            session_log: true,
            log_dir: None,
        }
    }
}

impl AppConfig {
    /// Load config from TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: AppConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    /// Save config to TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Explicit path must exist; the default location may be absent
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load_from_file(path);
        }
        let default_path = default_config_path()?;
        if default_path.exists() {
            Self::load_from_file(&default_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Resolve command-line overrides against this config
    pub fn session_settings(&self, args: &SessionArgs) -> SessionSettings {
        SessionSettings {
            timeout: Duration::from_secs(args.timeout.unwrap_or(self.timeout_secs)),
            max_timeout: Duration::from_secs(args.max_timeout.unwrap_or(self.max_timeout_secs)),
            max_transitions: self.max_transitions,
            retry: self.retry,
            patterns_file: args.patterns.clone().or_else(|| self.patterns_file.clone()),
            prompt: args.prompt.clone(),
            dry_run: args.dry_run.clone(),
        }
    }
}

/// `~/.doorway/config.toml`
pub fn default_config_path() -> Result<PathBuf> {
    Ok(doorway_logging::doorway_home()?.join("config.toml"))
}

/// Effective settings for one command
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSettings {
    pub timeout: Duration,
    pub max_timeout: Duration,
    pub max_transitions: usize,
    pub retry: bool,
    pub patterns_file: Option<PathBuf>,
    pub prompt: Option<String>,
    pub dry_run: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_overrides_config() {
        let config = AppConfig {
            timeout_secs: 30,
            patterns_file: Some(PathBuf::from("lab.toml")),
            ..AppConfig::default()
        };
        let args = SessionArgs {
            timeout: Some(5),
            ..SessionArgs::default()
        };

        let settings = config.session_settings(&args);
        assert_eq!(settings.timeout, Duration::from_secs(5));
        assert_eq!(settings.max_timeout, Duration::from_secs(DEFAULT_RECONNECT_TIMEOUT_SECS));
        assert_eq!(settings.patterns_file, Some(PathBuf::from("lab.toml")));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: AppConfig = toml::from_str("timeout_secs = 10\nsession_log = false\n").unwrap();
        assert_eq!(config.timeout_secs, 10);
        assert!(!config.session_log);
        assert_eq!(config.max_transitions, DEFAULT_MAX_TRANSITIONS);
        assert!(config.retry);
    }
}
