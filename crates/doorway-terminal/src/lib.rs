// Device session transports
//
// This module provides the byte/line oriented sessions the FSM engine reads
// from and writes to: a telnet/ssh client hosted in a PTY, a scripted replay
// for tests and dry runs, and a JSON-lines session logger that wraps either.

mod transport;
mod pty_transport;
mod scripted;
mod logger;

// Re-export public API
pub use transport::{ReadOutcome, Transport, LINE_ENDING};
pub use pty_transport::PtyTransport;
pub use scripted::{ScriptedTransport, Step};
pub use logger::{LoggedTransport, SessionLogger, MASKED};

// Constants
pub const DEFAULT_COLS: u16 = 80;
pub const DEFAULT_ROWS: u16 = 24;
