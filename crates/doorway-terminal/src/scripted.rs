/// Deterministic transport replaying recorded device output
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::io;
use std::time::Duration;

use super::transport::{ReadOutcome, Transport};

/// One read's worth of scripted behaviour
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    /// Return this text
    Output(String),
    /// Produce nothing; the read blocks for its full timeout
    Silence,
    /// Remote side closes the session
    Eof,
}

/// What reads return once the script is used up
#[derive(Debug, Clone, PartialEq, Eq)]
enum Exhausted {
    Silence,
    Eof,
    Repeat(String),
}

/// Replays a fixed sequence of outputs and records every write.
///
/// Two runs over the same script observe exactly the same output, which
/// makes FSM runs reproducible in tests and dry runs.
#[derive(Debug)]
pub struct ScriptedTransport {
    name: String,
    steps: VecDeque<Step>,
    exhausted: Exhausted,
    writes: Vec<String>,
    reads: usize,
    connected: bool,
}

impl ScriptedTransport {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            name: "scripted".to_string(),
            steps: steps.into(),
            exhausted: Exhausted::Silence,
            writes: Vec::new(),
            reads: 0,
            connected: true,
        }
    }

    /// Script made only of output chunks
    pub fn from_outputs<I, S>(outputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(outputs.into_iter().map(|s| Step::Output(s.into())).collect())
    }

    /// Parse a JSON script such as `[{"output": "Username: "}, "silence", "eof"]`
    pub fn from_json(script: &str) -> serde_json::Result<Self> {
        let steps: Vec<Step> = serde_json::from_str(script)?;
        Ok(Self::new(steps))
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Keep returning `text` after the script ends
    pub fn then_repeat(mut self, text: impl Into<String>) -> Self {
        self.exhausted = Exhausted::Repeat(text.into());
        self
    }

    /// Close the session after the script ends
    pub fn then_eof(mut self) -> Self {
        self.exhausted = Exhausted::Eof;
        self
    }

    /// Everything written so far, in order
    pub fn writes(&self) -> &[String] {
        &self.writes
    }

    /// Number of `read` calls served
    pub fn reads(&self) -> usize {
        self.reads
    }

    pub fn remaining_steps(&self) -> usize {
        self.steps.len()
    }
}

impl Transport for ScriptedTransport {
    fn read(&mut self, timeout: Duration) -> io::Result<ReadOutcome> {
        self.reads += 1;
        if !self.connected {
            return Ok(ReadOutcome::Eof);
        }

        let step = match self.steps.pop_front() {
            Some(step) => step,
            None => match &self.exhausted {
                Exhausted::Silence => Step::Silence,
                Exhausted::Eof => Step::Eof,
                Exhausted::Repeat(text) => Step::Output(text.clone()),
            },
        };

        match step {
            Step::Output(text) => Ok(ReadOutcome::Data(text)),
            Step::Silence => {
                std::thread::sleep(timeout);
                Ok(ReadOutcome::Timeout)
            }
            Step::Eof => {
                self.connected = false;
                Ok(ReadOutcome::Eof)
            }
        }
    }

    fn write(&mut self, data: &str) -> io::Result<()> {
        if !self.connected {
            return Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "scripted session is closed",
            ));
        }
        self.writes.push(data.to_string());
        Ok(())
    }

    fn disconnect(&mut self) -> io::Result<()> {
        self.connected = false;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn name(&self) -> &str {
        &self.name
    }
}
