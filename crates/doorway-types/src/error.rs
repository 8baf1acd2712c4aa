use std::time::Duration;
use thiserror::Error;

use crate::State;

/// Errors raised by an FSM run or the connection orchestration around it.
///
/// Every variant names the host (or session label) so callers can render
/// a message without inspecting FSM internals.
#[derive(Debug, Error)]
pub enum FsmError {
    #[error("{host}: timeout in {fsm} (state {state}) after {waited:?}")]
    Timeout {
        host: String,
        fsm: String,
        state: State,
        waited: Duration,
    },

    #[error("{host}: unable to connect: {matched}")]
    UnableToConnect { host: String, matched: String },

    #[error("{host}: authentication failed: {matched}")]
    Authentication { host: String, matched: String },

    #[error("{host}: command syntax error in '{}': {matched}", .command.as_deref().unwrap_or(""))]
    CommandSyntax {
        host: String,
        command: Option<String>,
        matched: String,
    },

    #[error("{host}: {fsm} exceeded the maximum of {max} transitions")]
    ExceededTransitions {
        host: String,
        fsm: String,
        max: usize,
    },

    #[error("{host}: unexpected session disconnect during {fsm}")]
    ConnectionClosed { host: String, fsm: String },

    #[error("{host}: command timeout: '{command}'")]
    CommandTimeout { host: String, command: String },

    #[error("{host}: {fsm} aborted: {message}")]
    Aborted {
        host: String,
        fsm: String,
        message: String,
    },

    #[error("{host}: transport error: {source}")]
    Transport {
        host: String,
        #[source]
        source: std::io::Error,
    },

    #[error("device not connected")]
    NotConnected,

    #[error("invalid hop: {0}")]
    InvalidHop(String),
}

/// Fieldless discriminant of [`FsmError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Timeout,
    UnableToConnect,
    Authentication,
    CommandSyntax,
    ExceededTransitions,
    ConnectionClosed,
    CommandTimeout,
    Aborted,
    Transport,
    NotConnected,
    InvalidHop,
}

impl FsmError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FsmError::Timeout { .. } => ErrorKind::Timeout,
            FsmError::UnableToConnect { .. } => ErrorKind::UnableToConnect,
            FsmError::Authentication { .. } => ErrorKind::Authentication,
            FsmError::CommandSyntax { .. } => ErrorKind::CommandSyntax,
            FsmError::ExceededTransitions { .. } => ErrorKind::ExceededTransitions,
            FsmError::ConnectionClosed { .. } => ErrorKind::ConnectionClosed,
            FsmError::CommandTimeout { .. } => ErrorKind::CommandTimeout,
            FsmError::Aborted { .. } => ErrorKind::Aborted,
            FsmError::Transport { .. } => ErrorKind::Transport,
            FsmError::NotConnected => ErrorKind::NotConnected,
            FsmError::InvalidHop(_) => ErrorKind::InvalidHop,
        }
    }

    /// Whether a whole connect phase may be retried after this error
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Timeout
                | ErrorKind::ConnectionClosed
                | ErrorKind::Transport
                | ErrorKind::ExceededTransitions
                | ErrorKind::Aborted
        )
    }

    /// Host or session label the error refers to, if any
    pub fn host(&self) -> Option<&str> {
        match self {
            FsmError::Timeout { host, .. }
            | FsmError::UnableToConnect { host, .. }
            | FsmError::Authentication { host, .. }
            | FsmError::CommandSyntax { host, .. }
            | FsmError::ExceededTransitions { host, .. }
            | FsmError::ConnectionClosed { host, .. }
            | FsmError::CommandTimeout { host, .. }
            | FsmError::Aborted { host, .. }
            | FsmError::Transport { host, .. } => Some(host),
            FsmError::NotConnected | FsmError::InvalidHop(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_carry_host_and_match() {
        let err = FsmError::UnableToConnect {
            host: "router1".to_string(),
            matched: "Connection refused".to_string(),
        };
        assert_eq!(err.to_string(), "router1: unable to connect: Connection refused");
        assert_eq!(err.host(), Some("router1"));
    }

    #[test]
    fn test_retryable_kinds() {
        let timeout = FsmError::Timeout {
            host: "r".to_string(),
            fsm: "CONNECT".to_string(),
            state: State(1),
            waited: Duration::from_secs(1),
        };
        assert!(timeout.is_retryable());

        let auth = FsmError::Authentication {
            host: "r".to_string(),
            matched: "% Authentication failed".to_string(),
        };
        assert!(!auth.is_retryable());
    }

    #[test]
    fn test_syntax_error_without_command() {
        let err = FsmError::CommandSyntax {
            host: "r".to_string(),
            command: None,
            matched: "% Invalid input".to_string(),
        };
        assert_eq!(err.to_string(), "r: command syntax error in '': % Invalid input");
    }
}
