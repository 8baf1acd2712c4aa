use std::collections::VecDeque;
use std::fmt;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use doorway_patterns::{make_dynamic_prompt, make_privileged_prompt, Pattern, PatternSet};
use doorway_terminal::{
    LoggedTransport, PtyTransport, ReadOutcome, SessionLogger, Transport, DEFAULT_COLS,
    DEFAULT_ROWS, MASKED,
};
use doorway_types::{Chain, Credentials, FsmError, Hop, DEFAULT_TIMEOUT_SECS};
use tracing::{debug, info, warn};

use crate::engine::{Fsm, FsmOutcome};
use crate::phases::{self, AUTHENTICATE, COMMAND, CONNECT, DISCONNECT, ENABLE};
use crate::table::TransitionTable;

/// Opens a transport to the first hop of a chain
pub type Connector = Box<dyn Fn(&Hop) -> io::Result<Box<dyn Transport>> + Send + Sync>;

const DETECT_PROMPT: &str = "DETECT_PROMPT";
const MAX_PROMPT_READS: usize = 10;
const DISCONNECT_MAX_TRANSITIONS: usize = 10;

/// Spawn the hop's telnet/ssh client in a PTY
pub fn pty_connector() -> Connector {
    Box::new(|hop: &Hop| {
        let transport = PtyTransport::spawn(&hop.command(), DEFAULT_COLS, DEFAULT_ROWS)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, format!("{:#}", e)))?;
        Ok(Box::new(transport) as Box<dyn Transport>)
    })
}

/// A device session reached through one of several hop chains.
///
/// Each chain is tried in turn until one reaches the target; the chain
/// that worked is tried first on the next reconnect.
pub struct Connection {
    name: String,
    chains: Vec<Chain>,
    patterns: Arc<PatternSet>,
    connector: Connector,
    timeout: Duration,
    max_transitions: usize,
    retry: bool,
    chain_pause: Duration,
    round_pause: Duration,
    prompt_probe: Duration,
    session_log_dir: Option<PathBuf>,
    chain_order: VecDeque<usize>,
    prompt: Option<Arc<Pattern>>,
    prompt_text: Option<String>,
    host: String,
    transport: Option<Box<dyn Transport>>,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("name", &self.name)
            .field("chains", &self.chains.iter().map(|c| c.to_string()).collect::<Vec<_>>())
            .field("host", &self.host)
            .field("timeout", &self.timeout)
            .field("max_transitions", &self.max_transitions)
            .field("retry", &self.retry)
            .field("prompt", &self.prompt_text)
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl Connection {
    pub fn new(name: impl Into<String>, chains: Vec<Chain>, patterns: Arc<PatternSet>) -> Self {
        let name = name.into();
        let host = chains
            .first()
            .map(|c| c.target().host.clone())
            .unwrap_or_else(|| name.clone());
        Self {
            chain_order: (0..chains.len()).collect(),
            name,
            chains,
            patterns,
            connector: pty_connector(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_transitions: doorway_types::DEFAULT_MAX_TRANSITIONS,
            retry: true,
            chain_pause: Duration::from_secs(2),
            round_pause: Duration::from_secs(30),
            prompt_probe: Duration::from_secs(1),
            session_log_dir: None,
            prompt: None,
            prompt_text: None,
            host,
            transport: None,
        }
    }

    pub fn connector(mut self, connector: Connector) -> Self {
        self.connector = connector;
        self
    }

    /// Per-cycle timeout for connect and authenticate phases
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn max_transitions(mut self, max_transitions: usize) -> Self {
        self.max_transitions = max_transitions;
        self
    }

    /// Stop after one pass over the chains instead of retrying until the deadline
    pub fn retry(mut self, retry: bool) -> Self {
        self.retry = retry;
        self
    }

    /// Pauses between attempts on different chains and between full rounds
    pub fn retry_pauses(mut self, between_chains: Duration, between_rounds: Duration) -> Self {
        self.chain_pause = between_chains;
        self.round_pause = between_rounds;
        self
    }

    /// How long the session must stay quiet while detecting the prompt
    pub fn prompt_probe(mut self, quiet: Duration) -> Self {
        self.prompt_probe = quiet;
        self
    }

    /// Known prompt of the target; skips prompt detection
    pub fn prompt(mut self, prompt: &str) -> Self {
        self.prompt = Some(Arc::new(make_dynamic_prompt(prompt)));
        self.prompt_text = Some(prompt.trim().to_string());
        self
    }

    /// Write a JSON-lines session log per connection attempt into `dir`
    pub fn session_log(mut self, dir: impl Into<PathBuf>) -> Self {
        self.session_log_dir = Some(dir.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Target host of the active (or first) chain
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn chains(&self) -> &[Chain] {
        &self.chains
    }

    pub fn is_connected(&self) -> bool {
        self.transport.as_ref().map_or(false, |t| t.is_connected())
    }

    /// Prompt text of the target, once known
    pub fn prompt_text(&self) -> Option<&str> {
        self.prompt_text.as_deref()
    }

    /// Connect through `chain`, starting from a transport already open to
    /// its first hop.
    ///
    /// On failure the transport is disconnected and dropped.
    pub fn connect_chain(&mut self, chain: &Chain, mut transport: Box<dyn Transport>) -> Result<(), FsmError> {
        self.host = chain.target().host.clone();
        match self.walk_chain(chain, transport.as_mut()) {
            Ok(()) => {
                self.transport = Some(transport);
                Ok(())
            }
            Err(e) => {
                if let Err(close_err) = transport.disconnect() {
                    debug!(host = %self.host, "disconnect after failure: {}", close_err);
                }
                Err(e)
            }
        }
    }

    fn walk_chain(&mut self, chain: &Chain, transport: &mut dyn Transport) -> Result<(), FsmError> {
        let connect = phases::connect_table(&self.patterns);
        let authenticate = phases::authenticate_table(&self.patterns);

        for (index, hop) in chain.hops().iter().enumerate() {
            info!(connection = %self.name, "connecting to {} ({}/{})", hop, index + 1, chain.len());
            if index > 0 {
                transport
                    .send_line(&hop.command())
                    .map_err(|source| FsmError::Transport {
                        host: hop.host.clone(),
                        source,
                    })?;
            }

            let connected = self.phase(CONNECT, &connect, hop, None).run(transport)?;
            self.phase(AUTHENTICATE, &authenticate, hop, connected.last_pattern)
                .run(transport)?;
            info!(connection = %self.name, "{} authenticated", hop.host);
        }

        match self.prompt_text.clone() {
            Some(prompt) => debug!(host = %self.host, "using configured prompt '{}'", prompt),
            None => {
                let prompt = probe_prompt(transport, &self.host, self.prompt_probe)?;
                self.set_prompt(&prompt);
            }
        }

        // Privileged mode only when the target URL names an enable password.
        let target = chain.target();
        if target.credentials.enable_password.is_some() {
            let credentials = target.credentials.clone();
            self.enter_enable(transport, &credentials)?;
        }
        Ok(())
    }

    fn enter_enable(&mut self, transport: &mut dyn Transport, credentials: &Credentials) -> Result<(), FsmError> {
        let current = self.prompt_text.clone().unwrap_or_default();
        if current.ends_with('#') {
            debug!(host = %self.host, "already in privileged mode");
            return Ok(());
        }

        let privileged = Arc::new(make_privileged_prompt(&current));
        let table = phases::enable_table(&self.patterns, &privileged);
        info!(host = %self.host, "entering privileged mode");
        transport
            .send_line("enable")
            .map_err(|source| FsmError::Transport {
                host: self.host.clone(),
                source,
            })?;
        Fsm::new(ENABLE, &table)
            .timeout(self.timeout)
            .max_transitions(self.max_transitions)
            .credentials(credentials)
            .host(self.host.clone())
            .run(transport)?;

        if !current.is_empty() {
            let base = current.trim_end_matches(['#', '>', '$', '%']);
            self.set_prompt(&format!("{}#", base));
        }
        Ok(())
    }

    fn phase<'t>(&self, name: &str, table: &'t TransitionTable, hop: &Hop, init: Option<String>) -> Fsm<'t> {
        Fsm::new(name, table)
            .timeout(self.timeout)
            .max_transitions(self.max_transitions)
            .credentials(&hop.credentials)
            .host(hop.host.clone())
            .init_pattern(init)
    }

    fn open(&self, chain: &Chain) -> Result<Box<dyn Transport>, FsmError> {
        let first = &chain.hops()[0];
        let transport = (self.connector)(first).map_err(|source| FsmError::Transport {
            host: first.host.clone(),
            source,
        })?;

        let Some(dir) = &self.session_log_dir else {
            return Ok(transport);
        };
        match SessionLogger::new(dir) {
            Ok(logger) => {
                debug!(path = %logger.path().display(), "session log opened");
                Ok(Box::new(LoggedTransport::new(transport, logger)) as Box<dyn Transport>)
            }
            Err(e) => {
                warn!("session log disabled: {:#}", e);
                Ok(transport)
            }
        }
    }

    /// Connect, trying chains in turn until one works or `max_timeout`
    /// has elapsed.
    ///
    /// A chain failing with an authentication, unable-to-connect or syntax
    /// error is not tried again during this call; once every chain has
    /// failed that way the loop stops. Otherwise the last error seen is
    /// returned.
    pub fn reconnect(&mut self, max_timeout: Duration) -> Result<(), FsmError> {
        if self.chains.is_empty() {
            return Err(FsmError::InvalidHop(format!("{}: no connection chains", self.name)));
        }
        if self.transport.is_some() {
            self.disconnect()?;
        }

        for (index, chain) in self.chains.iter().enumerate() {
            info!(connection = %self.name, "connection chain {}/{}: {}", index + 1, self.chains.len(), chain);
        }
        info!(connection = %self.name, "trying to (re)connect within {:?}", max_timeout);

        let begin = Instant::now();
        let mut last_error = FsmError::NotConnected;
        let mut attempt = 1usize;
        let mut pause = Duration::ZERO;
        let mut dead = vec![false; self.chains.len()];

        while begin.elapsed() < max_timeout {
            while dead[self.chain_order[0]] {
                self.chain_order.rotate_left(1);
            }
            // Another chain is waiting; no reason to wait long for it.
            if (attempt - 1) % self.chains.len() != 0 {
                pause = self.chain_pause;
            }
            if !pause.is_zero() {
                info!(connection = %self.name, "waiting {:?} before next connection attempt", pause);
                std::thread::sleep(pause);
            }

            let index = self.chain_order[0];
            let chain = self.chains[index].clone();
            info!(connection = %self.name, "connection chain/attempt [{}/{}]", index + 1, attempt);

            let result = self.open(&chain).and_then(|t| self.connect_chain(&chain, t));
            match result {
                Ok(()) => {
                    info!(
                        connection = %self.name,
                        "target device connected in {:.0}s",
                        begin.elapsed().as_secs_f64()
                    );
                    return Ok(());
                }
                Err(e) if !e.is_retryable() => {
                    warn!(connection = %self.name, "connection error: {}", e);
                    dead[index] = true;
                    if dead.iter().all(|d| *d) {
                        return Err(e);
                    }
                    self.chain_order.rotate_left(1);
                    last_error = e;
                }
                Err(e) => {
                    warn!(connection = %self.name, "connection error: {}", e);
                    self.chain_order.rotate_left(1);
                    last_error = e;
                }
            }

            pause = self.round_pause.min(max_timeout.saturating_sub(begin.elapsed()));
            attempt += 1;
            if !self.retry && attempt > self.chains.len() {
                break;
            }
        }

        warn!(
            connection = %self.name,
            "unable to (re)connect within {:.0}s",
            begin.elapsed().as_secs_f64()
        );
        Err(last_error)
    }

    fn transport_mut(&mut self) -> Result<&mut Box<dyn Transport>, FsmError> {
        self.transport.as_mut().ok_or(FsmError::NotConnected)
    }

    /// Send `cmd` and return its output up to the next prompt, `\r` removed.
    ///
    /// The echoed command line is part of the output.
    pub fn send(&mut self, cmd: &str, timeout: Duration) -> Result<String, FsmError> {
        self.send_with(cmd, timeout, None, false)
    }

    /// Like [`send`](Self::send), waiting for `wait_for` instead of the
    /// prompt when given.
    ///
    /// A `secret` command (a password typed at a device prompt) is kept
    /// out of session logs, tracing and errors.
    pub fn send_with(
        &mut self,
        cmd: &str,
        timeout: Duration,
        wait_for: Option<&Arc<Pattern>>,
        secret: bool,
    ) -> Result<String, FsmError> {
        let prompt = match wait_for {
            Some(pattern) => Arc::clone(pattern),
            None => self
                .prompt
                .clone()
                .unwrap_or_else(|| Arc::clone(&self.patterns.prompt)),
        };
        let table = phases::command_table(&self.patterns, &prompt);
        let host = self.host.clone();
        let max_transitions = self.max_transitions;
        let shown = if secret { MASKED } else { cmd };

        info!(host = %host, "sending command: '{}'", shown);
        let transport = self.transport_mut()?;
        let sent = if secret {
            transport.send_secret_line(cmd)
        } else {
            transport.send_line(cmd)
        };
        sent.map_err(|source| FsmError::Transport {
            host: host.clone(),
            source,
        })?;

        let outcome = Fsm::new(COMMAND, &table)
            .timeout(timeout)
            .max_transitions(max_transitions)
            .host(host.clone())
            .run(transport.as_mut())
            .map_err(|e| match e {
                FsmError::Timeout { host, .. } => FsmError::CommandTimeout {
                    host,
                    command: shown.to_string(),
                },
                FsmError::CommandSyntax { host, matched, .. } => FsmError::CommandSyntax {
                    host,
                    command: Some(shown.to_string()),
                    matched,
                },
                other => other,
            })?;

        Ok(outcome.output.replace('\r', ""))
    }

    /// Send an optional command, then run a caller-supplied table on the
    /// session
    pub fn run_fsm(
        &mut self,
        name: &str,
        command: Option<&str>,
        table: &TransitionTable,
        timeout: Duration,
        max_transitions: usize,
    ) -> Result<FsmOutcome, FsmError> {
        let host = self.host.clone();
        let credentials = self.target_credentials();

        let transport = self.transport_mut()?;
        if let Some(command) = command {
            transport
                .send_line(command)
                .map_err(|source| FsmError::Transport {
                    host: host.clone(),
                    source,
                })?;
        }

        Fsm::new(name, table)
            .timeout(timeout)
            .max_transitions(max_transitions)
            .credentials(&credentials)
            .host(host)
            .run(transport.as_mut())
    }

    /// Enter privileged mode on the connected target.
    ///
    /// `enable_password` overrides the one from the target URL, which in
    /// turn falls back to the login password.
    pub fn enable(&mut self, enable_password: Option<&str>) -> Result<(), FsmError> {
        let mut credentials = self.target_credentials();
        if let Some(password) = enable_password {
            credentials.enable_password = Some(password.to_string());
        }
        let mut transport = self.transport.take().ok_or(FsmError::NotConnected)?;
        let result = self.enter_enable(transport.as_mut(), &credentials);
        self.transport = Some(transport);
        result
    }

    fn target_credentials(&self) -> Credentials {
        self.chains
            .get(self.chain_order.front().copied().unwrap_or(0))
            .map(|c| c.target().credentials.clone())
            .unwrap_or_default()
    }

    /// Log out through the disconnect phase and close the transport
    pub fn disconnect(&mut self) -> Result<(), FsmError> {
        let Some(mut transport) = self.transport.take() else {
            return Ok(());
        };
        info!(connection = %self.name, "disconnecting from {}", self.host);

        if transport.is_connected() {
            let table = phases::disconnect_table(&self.patterns);
            let result = transport
                .send_line("exit")
                .map_err(|source| FsmError::Transport {
                    host: self.host.clone(),
                    source,
                })
                .and_then(|()| {
                    Fsm::new(DISCONNECT, &table)
                        .timeout(self.prompt_probe)
                        .max_transitions(DISCONNECT_MAX_TRANSITIONS)
                        .host(self.host.clone())
                        .run(transport.as_mut())
                });
            if let Err(e) = result {
                debug!(host = %self.host, "disconnect phase: {}", e);
            }
        }

        transport.disconnect().map_err(|source| FsmError::Transport {
            host: self.host.clone(),
            source,
        })
    }

    /// Detect the prompt on the live session and use it for commands
    pub fn detect_prompt(&mut self) -> Result<String, FsmError> {
        let host = self.host.clone();
        let quiet = self.prompt_probe;
        let transport = self.transport_mut()?;
        let prompt = probe_prompt(transport.as_mut(), &host, quiet)?;
        self.set_prompt(&prompt);
        Ok(prompt)
    }

    fn set_prompt(&mut self, prompt: &str) {
        info!(host = %self.host, "prompt detected: '{}'", prompt);
        self.prompt = Some(Arc::new(make_dynamic_prompt(prompt)));
        self.prompt_text = Some(prompt.to_string());
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            let _ = transport.disconnect();
        }
    }
}

// Send a newline and take the last non-empty line once the session goes
// quiet.
fn probe_prompt(transport: &mut dyn Transport, host: &str, quiet: Duration) -> Result<String, FsmError> {
    let transport_error = |source| FsmError::Transport {
        host: host.to_string(),
        source,
    };
    transport.send_line("").map_err(transport_error)?;

    let mut output = String::new();
    for _ in 0..MAX_PROMPT_READS {
        match transport.read(quiet).map_err(transport_error)? {
            ReadOutcome::Data(data) => output.push_str(&data),
            ReadOutcome::Timeout => break,
            ReadOutcome::Eof => {
                return Err(FsmError::ConnectionClosed {
                    host: host.to_string(),
                    fsm: DETECT_PROMPT.to_string(),
                })
            }
        }
    }

    output
        .lines()
        .map(|line| line.trim())
        .filter(|line| !line.is_empty())
        .last()
        .map(str::to_string)
        .ok_or_else(|| FsmError::Timeout {
            host: host.to_string(),
            fsm: DETECT_PROMPT.to_string(),
            state: doorway_types::State::INITIAL,
            waited: quiet,
        })
}
