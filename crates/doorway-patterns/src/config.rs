use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use crate::{Pattern, PatternError};

/// Host-specific regular expressions, as stored in a TOML file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternConfig {
    /// Command prompt of a logged-in session
    pub prompt: String,
    pub username: String,
    pub password: String,
    /// Telnet client banner printed once the TCP session is up
    pub escape_char: String,
    /// Console servers asking for a keystroke before the login prompt
    pub press_return: String,
    pub connection_refused: String,
    pub unable_to_connect: String,
    pub auth_failed: String,
    pub syntax_error: String,
    /// Pagination marker ("--More--")
    pub more: String,
    pub standby: String,
    pub connection_closed: String,
    /// Additional named patterns for user-defined FSMs
    pub custom: BTreeMap<String, String>,
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            prompt: r"[\w\-.:/@~]+(\([\w\-]+\))?[#>$%]\s?$".to_string(),
            username: r"(?i)(user ?name|login)\s*:\s*$".to_string(),
            password: r"(?i)password\s*:\s*$".to_string(),
            escape_char: r"Escape character is '\^\]'".to_string(),
            press_return: r"(?i)press return to get started".to_string(),
            connection_refused: r"(?i)connection refused".to_string(),
            unable_to_connect: r"(?i)(unable to connect|no route to host|(network|host) is unreachable|could not resolve|name or service not known)".to_string(),
            auth_failed: r"(?i)(authentication failed|login incorrect|access denied|permission denied|bad secrets)".to_string(),
            syntax_error: r"(?i)%\s*(invalid input|incomplete command|ambiguous command|unknown command|invalid command)".to_string(),
            more: r"(?i)--\s*more\s*--".to_string(),
            standby: r"(?i)standby console disabled".to_string(),
            connection_closed: r"(?i)(connection closed by foreign host|connection to \S+ closed)".to_string(),
            custom: BTreeMap::new(),
        }
    }
}

impl PatternConfig {
    /// Load patterns from TOML file; missing keys keep their defaults
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, PatternError> {
        let content = std::fs::read_to_string(path)?;
        let config: PatternConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save patterns to TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), PatternError> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Compile every regex; the first invalid one is reported by name
    pub fn compile(&self) -> Result<PatternSet, PatternError> {
        let build = |name: &str, regex: &str| Pattern::new(name, regex).map(Arc::new);

        let custom = self
            .custom
            .iter()
            .map(|(name, regex)| Ok((name.clone(), build(name, regex)?)))
            .collect::<Result<BTreeMap<_, _>, PatternError>>()?;

        Ok(PatternSet {
            prompt: build("prompt", &self.prompt)?,
            username: build("username", &self.username)?,
            password: build("password", &self.password)?,
            escape_char: build("escape_char", &self.escape_char)?,
            press_return: build("press_return", &self.press_return)?,
            connection_refused: build("connection_refused", &self.connection_refused)?,
            unable_to_connect: build("unable_to_connect", &self.unable_to_connect)?,
            auth_failed: build("auth_failed", &self.auth_failed)?,
            syntax_error: build("syntax_error", &self.syntax_error)?,
            more: build("more", &self.more)?,
            standby: build("standby", &self.standby)?,
            connection_closed: build("connection_closed", &self.connection_closed)?,
            custom,
        })
    }
}

/// Compiled, immutable pattern collection shared by all phases of a session
#[derive(Debug, Clone)]
pub struct PatternSet {
    pub prompt: Arc<Pattern>,
    pub username: Arc<Pattern>,
    pub password: Arc<Pattern>,
    pub escape_char: Arc<Pattern>,
    pub press_return: Arc<Pattern>,
    pub connection_refused: Arc<Pattern>,
    pub unable_to_connect: Arc<Pattern>,
    pub auth_failed: Arc<Pattern>,
    pub syntax_error: Arc<Pattern>,
    pub more: Arc<Pattern>,
    pub standby: Arc<Pattern>,
    pub connection_closed: Arc<Pattern>,
    pub custom: BTreeMap<String, Arc<Pattern>>,
}

impl PatternSet {
    /// Compiled defaults
    pub fn defaults() -> Result<Self, PatternError> {
        PatternConfig::default().compile()
    }

    /// Replace the prompt, e.g. with one detected on the live session
    pub fn with_prompt(mut self, prompt: Pattern) -> Self {
        self.prompt = Arc::new(prompt);
        self
    }

    /// Look up a built-in or custom pattern by name
    pub fn get(&self, name: &str) -> Option<Arc<Pattern>> {
        let builtin = match name {
            "prompt" => &self.prompt,
            "username" => &self.username,
            "password" => &self.password,
            "escape_char" => &self.escape_char,
            "press_return" => &self.press_return,
            "connection_refused" => &self.connection_refused,
            "unable_to_connect" => &self.unable_to_connect,
            "auth_failed" => &self.auth_failed,
            "syntax_error" => &self.syntax_error,
            "more" => &self.more,
            "standby" => &self.standby,
            "connection_closed" => &self.connection_closed,
            other => return self.custom.get(other).cloned(),
        };
        Some(Arc::clone(builtin))
    }
}
