/// Transport abstraction consumed by the FSM engine
use std::io;
use std::time::Duration;

/// Line terminator appended by `send_line`
pub const LINE_ENDING: &str = "\n";

/// Outcome of a single blocking read
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// Newly available text
    Data(String),
    /// Nothing arrived before the timeout
    Timeout,
    /// Remote side closed the session
    Eof,
}

/// Byte/line oriented session to a device (PTY-hosted telnet/ssh client,
/// scripted replay, ...).
///
/// A transport is owned by its caller and lent exclusively to one FSM run
/// at a time.
pub trait Transport: Send {
    /// Block for at most `timeout` waiting for output
    fn read(&mut self, timeout: Duration) -> io::Result<ReadOutcome>;

    /// Write raw text (control characters included)
    fn write(&mut self, data: &str) -> io::Result<()>;

    /// Write a line followed by [`LINE_ENDING`]
    fn send_line(&mut self, line: &str) -> io::Result<()> {
        self.write(&format!("{}{}", line, LINE_ENDING))
    }

    /// Like `send_line`, for passwords; loggers must not record the text
    fn send_secret_line(&mut self, line: &str) -> io::Result<()> {
        self.send_line(line)
    }

    /// Close the session
    fn disconnect(&mut self) -> io::Result<()>;

    fn is_connected(&self) -> bool;

    /// Transport name for diagnostics
    fn name(&self) -> &str;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn read(&mut self, timeout: Duration) -> io::Result<ReadOutcome> {
        (**self).read(timeout)
    }

    fn write(&mut self, data: &str) -> io::Result<()> {
        (**self).write(data)
    }

    fn send_line(&mut self, line: &str) -> io::Result<()> {
        (**self).send_line(line)
    }

    fn send_secret_line(&mut self, line: &str) -> io::Result<()> {
        (**self).send_secret_line(line)
    }

    fn disconnect(&mut self) -> io::Result<()> {
        (**self).disconnect()
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}
