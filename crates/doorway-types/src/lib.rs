//! Core types and structures for doorway
//!
//! This crate provides the value types shared by all doorway crates: FSM
//! states, credentials, connection hops and the error taxonomy.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub mod error;

pub use error::{ErrorKind, FsmError};

// ============================================================================
// Constants
// ============================================================================

/// Default per-transition timeout for an FSM run
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Default bound on fired transitions before an FSM run is aborted
pub const DEFAULT_MAX_TRANSITIONS: usize = 200;

/// Default time budget for `reconnect`
pub const DEFAULT_RECONNECT_TIMEOUT_SECS: u64 = 360;

/// Default timeout for a single command
pub const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 60;

// ============================================================================
// FSM State
// ============================================================================

/// A node in an FSM graph.
///
/// Runs start in [`State::INITIAL`]; any negative value is terminal, with
/// [`State::END`] as the conventional sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct State(pub i32);

impl State {
    pub const INITIAL: State = State(0);
    pub const END: State = State(-1);

    pub fn is_terminal(&self) -> bool {
        self.0 < 0
    }
}

impl Default for State {
    fn default() -> Self {
        State::INITIAL
    }
}

impl From<i32> for State {
    fn from(value: i32) -> Self {
        State(value)
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Protocol
// ============================================================================

/// Line-oriented protocols a hop can be reached with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Telnet,
    Ssh,
}

impl Protocol {
    pub fn default_port(&self) -> u16 {
        match self {
            Protocol::Telnet => 23,
            Protocol::Ssh => 22,
        }
    }
}

impl FromStr for Protocol {
    type Err = FsmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "telnet" => Ok(Protocol::Telnet),
            "ssh" => Ok(Protocol::Ssh),
            other => Err(FsmError::InvalidHop(format!(
                "unsupported protocol '{}'. Valid options: 'telnet', 'ssh'",
                other
            ))),
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Telnet => write!(f, "telnet"),
            Protocol::Ssh => write!(f, "ssh"),
        }
    }
}

// ============================================================================
// Credentials
// ============================================================================

/// Username/password pair bound into authentication actions
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub enable_password: Option<String>,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: Some(password.into()),
            enable_password: None,
        }
    }

    /// Enable password, falling back to the login password
    pub fn enable_password(&self) -> Option<&str> {
        self.enable_password
            .as_deref()
            .or(self.password.as_deref())
    }
}

// Secrets never reach logs through Debug.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("enable_password", &self.enable_password.as_ref().map(|_| "***"))
            .finish()
    }
}

// ============================================================================
// Hop
// ============================================================================

/// One step of a connection chain (jumphost or target device)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hop {
    pub protocol: Protocol,
    pub host: String,
    pub port: u16,
    pub credentials: Credentials,
}

impl Hop {
    /// Parse `<protocol>://<user>:<password>@<host>:<port>/<enable_password>`.
    ///
    /// The port falls back to the protocol default; password and enable
    /// password are optional.
    pub fn parse(raw: &str) -> Result<Self, FsmError> {
        let url = url::Url::parse(raw)
            .map_err(|e| FsmError::InvalidHop(format!("{}: {}", mask_url(raw), e)))?;

        let protocol: Protocol = url.scheme().parse()?;
        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| FsmError::InvalidHop(format!("{}: missing host", mask_url(raw))))?
            .to_string();
        let port = url.port().unwrap_or_else(|| protocol.default_port());

        let enable_password = url
            .path()
            .trim_start_matches('/')
            .split('/')
            .next()
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        let credentials = Credentials {
            username: url.username().to_string(),
            password: url.password().map(str::to_string),
            enable_password,
        };

        Ok(Self {
            protocol,
            host,
            port,
            credentials,
        })
    }

    /// Shell command that opens this hop from the previous one
    pub fn command(&self) -> String {
        match self.protocol {
            Protocol::Telnet => format!("telnet {} {}", self.host, self.port),
            Protocol::Ssh => {
                if self.credentials.username.is_empty() {
                    format!("ssh -p {} {}", self.port, self.host)
                } else {
                    format!("ssh -p {} {}@{}", self.port, self.credentials.username, self.host)
                }
            }
        }
    }
}

impl fmt::Display for Hop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.credentials.username.is_empty() {
            write!(f, "{}://{}:{}", self.protocol, self.host, self.port)
        } else {
            write!(
                f,
                "{}://{}@{}:{}",
                self.protocol, self.credentials.username, self.host, self.port
            )
        }
    }
}

impl FromStr for Hop {
    type Err = FsmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Hop::parse(s)
    }
}

// ============================================================================
// Chain
// ============================================================================

/// Ordered hops to a device: jumphosts first, target device last
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chain {
    hops: Vec<Hop>,
}

impl Chain {
    pub fn new(hops: Vec<Hop>) -> Result<Self, FsmError> {
        if hops.is_empty() {
            return Err(FsmError::InvalidHop("connection chain has no hops".to_string()));
        }
        Ok(Self { hops })
    }

    /// Parse a chain from hop URLs, first jumphost first
    pub fn parse<S: AsRef<str>>(urls: &[S]) -> Result<Self, FsmError> {
        let hops = urls
            .iter()
            .map(|url| Hop::parse(url.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(hops)
    }

    pub fn hops(&self) -> &[Hop] {
        &self.hops
    }

    /// Device at the end of the chain
    pub fn target(&self) -> &Hop {
        // A chain always holds at least one hop.
        &self.hops[self.hops.len() - 1]
    }

    pub fn len(&self) -> usize {
        self.hops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hops.is_empty()
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hops: Vec<String> = self.hops.iter().map(|h| h.to_string()).collect();
        write!(f, "{}", hops.join(" -> "))
    }
}

/// Replace the password part of a hop URL with `***`
pub fn mask_url(raw: &str) -> String {
    let Some(scheme_end) = raw.find("://") else {
        return raw.to_string();
    };
    let rest = &raw[scheme_end + 3..];
    let Some(at) = rest.rfind('@') else {
        return raw.to_string();
    };
    match rest[..at].find(':') {
        Some(colon) => format!(
            "{}{}:***{}",
            &raw[..scheme_end + 3],
            &rest[..colon],
            &rest[at..]
        ),
        None => raw.to_string(),
    }
}
