//! FSM-driven negotiation of line-oriented device sessions.
//!
//! A [`TransitionTable`] describes one protocol phase; [`Fsm`] drives it
//! over a [`Transport`](doorway_terminal::Transport) until a terminal
//! state or a typed [`FsmError`](doorway_types::FsmError). [`Connection`]
//! chains the standard phases across jumphosts and retries.

pub mod actions;
mod connection;
mod engine;
pub mod phases;
mod table;

pub use actions::{Action, ActionResult, Failure, FsmContext};
pub use connection::{pty_connector, Connection, Connector};
pub use engine::{Fsm, FsmOutcome};
pub use table::{Event, Transition, TransitionTable, TransitionTableBuilder, Trigger};
