use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use super::transport::{ReadOutcome, Transport};

/// Placeholder written instead of secret input
pub const MASKED: &str = "***";

/// JSON-lines log of everything read from and written to a session
pub struct SessionLogger {
    session_id: String,
    path: PathBuf,
    log_file: File,
}

impl SessionLogger {
    /// Create `session-<id>.log` under `log_dir` with a fresh session id
    pub fn new(log_dir: &Path) -> Result<Self> {
        Self::with_session_id(Uuid::new_v4().to_string(), log_dir)
    }

    pub fn with_session_id(session_id: impl Into<String>, log_dir: &Path) -> Result<Self> {
        let session_id = session_id.into();
        std::fs::create_dir_all(log_dir)
            .context("Failed to create log directory")?;

        let path = log_dir.join(format!("session-{}.log", session_id));
        let log_file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .context("Failed to create log file")?;

        Ok(Self {
            session_id,
            path,
            log_file,
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Log input sent to the device
    pub fn log_input(&mut self, data: &str) -> Result<()> {
        self.log_data("in", data)
    }

    /// Log input sent to the device without recording its content
    pub fn log_secret_input(&mut self) -> Result<()> {
        self.log_data("in", MASKED)
    }

    /// Log output received from the device
    pub fn log_output(&mut self, data: &str) -> Result<()> {
        self.log_data("out", data)
    }

    /// Log a session event (timeout, eof, disconnect, ...)
    pub fn log_event(&mut self, event: &str) -> Result<()> {
        let entry = json!({
            "timestamp": Utc::now().to_rfc3339(),
            "session_id": self.session_id,
            "event": event,
        });
        self.write_entry(&entry)
    }

    fn log_data(&mut self, direction: &str, data: &str) -> Result<()> {
        let entry = json!({
            "timestamp": Utc::now().to_rfc3339(),
            "session_id": self.session_id,
            "direction": direction,
            "data": data,
        });
        self.write_entry(&entry)
    }

    fn write_entry(&mut self, entry: &serde_json::Value) -> Result<()> {
        writeln!(self.log_file, "{}", entry)
            .context("Failed to write to log file")?;
        self.log_file.flush()?;
        Ok(())
    }
}

/// Transport wrapper mirroring all traffic into a [`SessionLogger`].
///
/// Logging failures never fail the session; they are reported once
/// through `tracing` and logging continues.
pub struct LoggedTransport<T> {
    inner: T,
    logger: SessionLogger,
    warned: bool,
}

impl<T: Transport> LoggedTransport<T> {
    pub fn new(inner: T, logger: SessionLogger) -> Self {
        Self {
            inner,
            logger,
            warned: false,
        }
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }

    pub fn into_inner(self) -> T {
        self.inner
    }

    pub fn logger(&self) -> &SessionLogger {
        &self.logger
    }

    fn record(&mut self, result: Result<()>) {
        if let Err(e) = result {
            if !self.warned {
                tracing::warn!(
                    session = %self.logger.session_id(),
                    "session log unavailable: {:#}",
                    e
                );
                self.warned = true;
            }
        }
    }
}

impl<T: Transport> Transport for LoggedTransport<T> {
    fn read(&mut self, timeout: Duration) -> io::Result<ReadOutcome> {
        let outcome = self.inner.read(timeout)?;
        let result = match &outcome {
            ReadOutcome::Data(data) => self.logger.log_output(data),
            ReadOutcome::Timeout => self.logger.log_event("timeout"),
            ReadOutcome::Eof => self.logger.log_event("eof"),
        };
        self.record(result);
        Ok(outcome)
    }

    fn write(&mut self, data: &str) -> io::Result<()> {
        self.inner.write(data)?;
        let result = self.logger.log_input(data);
        self.record(result);
        Ok(())
    }

    fn send_line(&mut self, line: &str) -> io::Result<()> {
        self.inner.send_line(line)?;
        let result = self.logger.log_input(line);
        self.record(result);
        Ok(())
    }

    fn send_secret_line(&mut self, line: &str) -> io::Result<()> {
        self.inner.send_secret_line(line)?;
        let result = self.logger.log_secret_input();
        self.record(result);
        Ok(())
    }

    fn disconnect(&mut self) -> io::Result<()> {
        let result = self.logger.log_event("disconnect");
        self.record(result);
        self.inner.disconnect()
    }

    fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}
