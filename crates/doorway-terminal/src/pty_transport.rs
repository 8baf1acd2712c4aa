use std::io::{self, Read, Write};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result};
use portable_pty::{native_pty_system, CommandBuilder, PtySize};

use super::transport::{ReadOutcome, Transport};

enum Chunk {
    Data(String),
    Eof,
}

/// telnet/ssh client process running in a PTY
pub struct PtyTransport {
    name: String,
    pty: Box<dyn portable_pty::MasterPty + Send>,
    child: Box<dyn portable_pty::Child + Send + Sync>,
    writer: Box<dyn Write + Send>,
    output: Receiver<Chunk>,
    reader_thread: Option<JoinHandle<()>>,
    connected: bool,
}

impl PtyTransport {
    /// Spawn `command` (e.g. `telnet 10.0.0.1 23`) in a new PTY
    pub fn spawn(command: &str, cols: u16, rows: u16) -> Result<Self> {
        let mut parts = command.split_whitespace();
        let program = parts
            .next()
            .ok_or_else(|| anyhow::anyhow!("Empty command for PTY transport"))?;

        let pty_system = native_pty_system();
        let pty_pair = pty_system
            .openpty(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .context("Failed to open PTY")?;

        let mut cmd = CommandBuilder::new(program);
        cmd.args(parts);

        let child = pty_pair
            .slave
            .spawn_command(cmd)
            .with_context(|| format!("Failed to spawn '{}' in PTY", command))?;

        let pty = pty_pair.master;
        let reader = pty.try_clone_reader()
            .context("Failed to clone PTY reader")?;
        let writer = pty.take_writer()
            .context("Failed to take PTY writer")?;

        let (tx, output) = mpsc::channel();
        let reader_thread = thread::Builder::new()
            .name(format!("pty-reader-{}", program))
            .spawn(move || pump_output(reader, tx))
            .context("Failed to start PTY reader thread")?;

        Ok(Self {
            name: command.to_string(),
            pty,
            child,
            writer,
            output,
            reader_thread: Some(reader_thread),
            connected: true,
        })
    }

    /// Resize the PTY
    pub fn resize(&mut self, cols: u16, rows: u16) -> Result<()> {
        self.pty.resize(PtySize {
            rows,
            cols,
            pixel_width: 0,
            pixel_height: 0,
        })
        .context("Failed to resize PTY")?;
        Ok(())
    }

    /// Exit code of the client process, if it has finished
    pub fn try_wait(&mut self) -> Option<i32> {
        self.child.try_wait()
            .ok()
            .flatten()
            .map(|status| status.exit_code() as i32)
    }
}

// Blocking reads happen on a dedicated thread so `read` can honour its
// timeout with `recv_timeout`.
fn pump_output(mut reader: Box<dyn Read + Send>, tx: mpsc::Sender<Chunk>) {
    let mut buffer = vec![0u8; 4096];
    let mut decoder = Utf8Decoder::default();
    loop {
        match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => {
                let data = decoder.decode(&buffer[..n]);
                if data.is_empty() {
                    continue;
                }
                if tx.send(Chunk::Data(data)).is_err() {
                    return;
                }
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(_) => break,
        }
    }
    let rest = decoder.finish();
    if !rest.is_empty() {
        let _ = tx.send(Chunk::Data(rest));
    }
    let _ = tx.send(Chunk::Eof);
}

/// Lossy UTF-8 decoding that holds back a character split across reads
#[derive(Debug, Default)]
struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    fn decode(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let split = self.pending.len() - incomplete_tail(&self.pending);
        let text = String::from_utf8_lossy(&self.pending[..split]).into_owned();
        self.pending.drain(..split);
        text
    }

    /// Whatever is still held back, once the stream has ended
    fn finish(&mut self) -> String {
        let text = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        text
    }
}

// Length of a multi-byte sequence cut off at the end of `bytes`, or 0.
fn incomplete_tail(bytes: &[u8]) -> usize {
    for i in 1..=bytes.len().min(3) {
        let byte = bytes[bytes.len() - i];
        if byte & 0xC0 == 0x80 {
            continue;
        }
        let needed = match byte {
            0xF0..=0xFF => 4,
            0xE0..=0xEF => 3,
            0xC0..=0xDF => 2,
            _ => 1,
        };
        return if needed > i { i } else { 0 };
    }
    0
}

impl Transport for PtyTransport {
    fn read(&mut self, timeout: Duration) -> io::Result<ReadOutcome> {
        if !self.connected {
            return Ok(ReadOutcome::Eof);
        }

        let first = match self.output.recv_timeout(timeout) {
            Ok(chunk) => chunk,
            Err(RecvTimeoutError::Timeout) => return Ok(ReadOutcome::Timeout),
            Err(RecvTimeoutError::Disconnected) => Chunk::Eof,
        };

        let mut accumulated = match first {
            Chunk::Data(data) => data,
            Chunk::Eof => {
                self.connected = false;
                return Ok(ReadOutcome::Eof);
            }
        };

        // Coalesce whatever else is already queued.
        while let Ok(chunk) = self.output.try_recv() {
            match chunk {
                Chunk::Data(data) => accumulated.push_str(&data),
                Chunk::Eof => {
                    self.connected = false;
                    break;
                }
            }
        }

        Ok(ReadOutcome::Data(accumulated))
    }

    fn write(&mut self, data: &str) -> io::Result<()> {
        self.writer.write_all(data.as_bytes())?;
        self.writer.flush()
    }

    fn disconnect(&mut self) -> io::Result<()> {
        if self.connected {
            self.connected = false;
            // The client may already have exited on its own.
            if self.try_wait().is_none() {
                self.child.kill()?;
            }
        }
        // The reader thread ends on EOF from the killed client.
        let _ = self.reader_thread.take();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for PtyTransport {
    fn drop(&mut self) {
        let _ = self.disconnect();
    }
}
