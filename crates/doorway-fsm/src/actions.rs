//! Effectful half of a transition.
//!
//! An action sees the cycle's [`FsmContext`] and either writes to the
//! transport, records state for a later phase, or returns a [`Failure`]
//! that ends the run.

use std::io;
use std::sync::Arc;

use doorway_terminal::Transport;
use doorway_types::{Credentials, State};
use thiserror::Error;

use crate::table::Event;

/// Named failure an action reports to abort the run
#[derive(Debug, Error)]
pub enum Failure {
    #[error("unable to connect")]
    UnableToConnect,
    #[error("authentication failed")]
    Authentication,
    #[error("command syntax error")]
    CommandSyntax,
    #[error("timeout")]
    Timeout,
    #[error("aborted: {0}")]
    Aborted(String),
    #[error("transport error: {0}")]
    Transport(#[from] io::Error),
}

impl Failure {
    // io::Error is not Clone; rebuild it from its kind and message.
    fn replicate(&self) -> Failure {
        match self {
            Failure::UnableToConnect => Failure::UnableToConnect,
            Failure::Authentication => Failure::Authentication,
            Failure::CommandSyntax => Failure::CommandSyntax,
            Failure::Timeout => Failure::Timeout,
            Failure::Aborted(message) => Failure::Aborted(message.clone()),
            Failure::Transport(e) => Failure::Transport(io::Error::new(e.kind(), e.to_string())),
        }
    }
}

pub type ActionResult = Result<(), Failure>;

/// Everything an action may look at or touch during one cycle
pub struct FsmContext<'a> {
    /// Name of the running FSM
    pub fsm: &'a str,
    /// Host the session belongs to
    pub host: &'a str,
    /// State the transition fired from
    pub state: State,
    pub event: &'a Event,
    /// Text matched by the event's pattern (empty for synthetic events)
    pub matched: String,
    /// Output preceding the match
    pub before: String,
    /// Pattern name handed to the next phase
    pub last_pattern: Option<String>,
    pub transport: &'a mut dyn Transport,
    pub credentials: &'a Credentials,
    /// Free-form note surfaced in the run outcome
    pub message: Option<String>,
}

pub trait Action: Send + Sync {
    fn call(&self, ctx: &mut FsmContext<'_>) -> ActionResult;
}

impl<F> Action for F
where
    F: Fn(&mut FsmContext<'_>) -> ActionResult + Send + Sync,
{
    fn call(&self, ctx: &mut FsmContext<'_>) -> ActionResult {
        self(ctx)
    }
}

/// Wrap a closure as a shareable action
pub fn action<F>(f: F) -> Arc<dyn Action>
where
    F: Fn(&mut FsmContext<'_>) -> ActionResult + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Send `text` followed by a line ending
pub fn send_line(text: impl Into<String>) -> Arc<dyn Action> {
    let text = text.into();
    action(move |ctx| {
        ctx.transport.send_line(&text)?;
        Ok(())
    })
}

pub fn send_newline() -> Arc<dyn Action> {
    send_line("")
}

/// Send raw text without a line ending (control characters, paging keys)
pub fn send_raw(text: impl Into<String>) -> Arc<dyn Action> {
    let text = text.into();
    action(move |ctx| {
        ctx.transport.write(&text)?;
        Ok(())
    })
}

pub fn send_username() -> Arc<dyn Action> {
    action(|ctx| {
        ctx.transport.send_line(&ctx.credentials.username)?;
        Ok(())
    })
}

/// Send the login password; a prompt without a configured password fails
/// authentication
pub fn send_password() -> Arc<dyn Action> {
    action(|ctx| {
        let password = ctx
            .credentials
            .password
            .as_deref()
            .ok_or(Failure::Authentication)?;
        ctx.transport.send_secret_line(password)?;
        Ok(())
    })
}

pub fn send_enable_password() -> Arc<dyn Action> {
    action(|ctx| {
        let password = ctx
            .credentials
            .enable_password()
            .ok_or(Failure::Authentication)?;
        ctx.transport.send_secret_line(password)?;
        Ok(())
    })
}

/// Record the matched pattern for the next phase
pub fn save_pattern() -> Arc<dyn Action> {
    action(|ctx| {
        if let Some(name) = ctx.event.pattern_name() {
            ctx.last_pattern = Some(name.to_string());
        }
        Ok(())
    })
}

/// Always fail with `failure`
pub fn fail(failure: Failure) -> Arc<dyn Action> {
    action(move |_ctx| Err(failure.replicate()))
}

/// Close the transport from inside the table
pub fn disconnect() -> Arc<dyn Action> {
    action(|ctx| {
        ctx.transport.disconnect()?;
        Ok(())
    })
}

pub fn abort(message: impl Into<String>) -> Arc<dyn Action> {
    let message = message.into();
    action(move |ctx| {
        ctx.message = Some(message.clone());
        Err(Failure::Aborted(message.clone()))
    })
}

/// Run actions in order, stopping at the first failure
pub fn sequence(actions: Vec<Arc<dyn Action>>) -> Arc<dyn Action> {
    action(move |ctx| actions.iter().try_for_each(|a| a.call(ctx)))
}
