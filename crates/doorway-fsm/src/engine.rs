use std::time::{Duration, Instant};

use doorway_patterns::{Pattern, PatternMatcher};
use doorway_terminal::{ReadOutcome, Transport};
use doorway_types::{Credentials, FsmError, State, DEFAULT_MAX_TRANSITIONS, DEFAULT_TIMEOUT_SECS};
use tracing::debug;

use crate::actions::{Failure, FsmContext};
use crate::table::{Event, Transition, TransitionTable};

/// Result of a run that reached a terminal state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsmOutcome {
    /// Pattern recorded by `save_pattern`, for the next phase
    pub last_pattern: Option<String>,
    /// Terminal state reached
    pub state: State,
    /// Number of transitions fired
    pub transitions: usize,
    /// Output consumed before each match, match text excluded
    pub output: String,
    pub message: Option<String>,
}

/// One bounded protocol phase over a transition table.
///
/// The engine only reads from the transport; all writes come from actions.
pub struct Fsm<'t> {
    name: String,
    table: &'t TransitionTable,
    timeout: Duration,
    max_transitions: usize,
    init_pattern: Option<String>,
    credentials: Credentials,
    host: String,
}

struct Cycle<'t> {
    event: Event,
    transition: &'t Transition,
    matched: String,
    before: String,
}

impl<'t> Fsm<'t> {
    pub fn new(name: impl Into<String>, table: &'t TransitionTable) -> Self {
        Self {
            name: name.into(),
            table,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_transitions: DEFAULT_MAX_TRANSITIONS,
            init_pattern: None,
            credentials: Credentials::default(),
            host: "device".to_string(),
        }
    }

    /// Default per-cycle timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn max_transitions(mut self, max_transitions: usize) -> Self {
        self.max_transitions = max_transitions;
        self
    }

    /// Start as if `pattern_name` had just been observed
    pub fn init_pattern(mut self, pattern_name: Option<impl Into<String>>) -> Self {
        self.init_pattern = pattern_name.map(Into::into);
        self
    }

    pub fn credentials(mut self, credentials: &Credentials) -> Self {
        self.credentials = credentials.clone();
        self
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Drive the table until a terminal state or an error
    pub fn run(&self, transport: &mut dyn Transport) -> Result<FsmOutcome, FsmError> {
        let mut state = State::INITIAL;
        let mut timeout = self.timeout;
        let mut pending_init = self.init_pattern.clone();
        let mut last_pattern: Option<String> = None;
        let mut message: Option<String> = None;
        let mut buffer = String::new();
        let mut output = String::new();
        let mut transitions = 0usize;

        debug!(fsm = %self.name, host = %self.host, init = ?pending_init, "fsm started");

        loop {
            // Checked before every cycle, so a bound of 0 runs nothing.
            if transitions >= self.max_transitions {
                return Err(FsmError::ExceededTransitions {
                    host: self.host.clone(),
                    fsm: self.name.clone(),
                    max: self.max_transitions,
                });
            }

            let cycle = match pending_init.take().and_then(|name| self.handoff(state, name)) {
                Some(cycle) => cycle,
                None => self.next_cycle(transport, state, timeout, &mut buffer)?,
            };

            if let Event::Matched(_) = cycle.event {
                output.push_str(&cycle.before);
            }

            let transition = cycle.transition;
            debug!(
                fsm = %self.name,
                state = %state,
                event = %cycle.event,
                next = %transition.next,
                "transition"
            );

            let mut ctx = FsmContext {
                fsm: &self.name,
                host: &self.host,
                state,
                event: &cycle.event,
                matched: cycle.matched,
                before: cycle.before,
                last_pattern: last_pattern.take(),
                transport: &mut *transport,
                credentials: &self.credentials,
                message: message.take(),
            };

            if let Some(action) = &transition.action {
                if let Err(failure) = action.call(&mut ctx) {
                    let err = self.failure_error(failure, &ctx, timeout);
                    debug!(fsm = %self.name, state = %state, "fsm failed: {}", err);
                    return Err(err);
                }
            }

            last_pattern = ctx.last_pattern;
            message = ctx.message;
            state = transition.next;
            timeout = transition.timeout.unwrap_or(self.timeout);
            transitions += 1;

            if state.is_terminal() {
                debug!(fsm = %self.name, state = %state, transitions, "fsm finished");
                return Ok(FsmOutcome {
                    last_pattern,
                    state,
                    transitions,
                    output,
                    message,
                });
            }
        }
    }

    // Seeded pattern from a previous phase, evaluated without a read.
    fn handoff(&self, state: State, pattern_name: String) -> Option<Cycle<'t>> {
        let event = Event::handoff(pattern_name);
        match self.table.lookup(state, &event) {
            Some(transition) => Some(Cycle {
                event,
                transition,
                matched: String::new(),
                before: String::new(),
            }),
            None => {
                debug!(fsm = %self.name, "init {} not handled in state {}", event, state);
                None
            }
        }
    }

    fn next_cycle(
        &self,
        transport: &mut dyn Transport,
        state: State,
        timeout: Duration,
        buffer: &mut String,
    ) -> Result<Cycle<'t>, FsmError> {
        let table: &'t TransitionTable = self.table;
        let candidates: Vec<(&'t Transition, &'t Pattern)> = table
            .candidates(state)
            .flat_map(|t| t.patterns().map(move |p| (t, p)))
            .collect();
        let matcher = PatternMatcher::new(candidates.iter().map(|(_, p)| *p).collect());
        let deadline = Instant::now() + timeout;

        loop {
            if let Some(m) = matcher.classify(buffer.as_str()) {
                let transition = candidates[m.index].0;
                let before = buffer[..m.start].to_string();
                buffer.replace_range(..m.end, "");
                return Ok(Cycle {
                    matched: m.text.clone(),
                    event: Event::Matched(m),
                    transition,
                    before,
                });
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return self.synthetic(Event::Timeout, state, timeout, buffer);
            }

            let outcome = transport.read(remaining).map_err(|source| FsmError::Transport {
                host: self.host.clone(),
                source,
            })?;
            match outcome {
                ReadOutcome::Data(data) => buffer.push_str(&data),
                // The deadline check above decides when the wait is over.
                ReadOutcome::Timeout => {}
                ReadOutcome::Eof => {
                    return self.synthetic(Event::EndOfStream, state, timeout, buffer);
                }
            }
        }
    }

    fn synthetic(
        &self,
        event: Event,
        state: State,
        timeout: Duration,
        buffer: &str,
    ) -> Result<Cycle<'t>, FsmError> {
        let table: &'t TransitionTable = self.table;
        if let Some(transition) = table.lookup(state, &event) {
            return Ok(Cycle {
                event,
                transition,
                matched: String::new(),
                before: buffer.to_string(),
            });
        }

        Err(match event {
            Event::EndOfStream => FsmError::ConnectionClosed {
                host: self.host.clone(),
                fsm: self.name.clone(),
            },
            Event::Timeout | Event::Matched(_) => FsmError::Timeout {
                host: self.host.clone(),
                fsm: self.name.clone(),
                state,
                waited: timeout,
            },
        })
    }

    fn failure_error(&self, failure: Failure, ctx: &FsmContext<'_>, timeout: Duration) -> FsmError {
        let host = self.host.clone();
        let matched = if ctx.matched.is_empty() {
            last_line(&ctx.before)
        } else {
            ctx.matched.clone()
        };

        match failure {
            Failure::UnableToConnect => FsmError::UnableToConnect { host, matched },
            Failure::Authentication => FsmError::Authentication { host, matched },
            Failure::CommandSyntax => FsmError::CommandSyntax {
                host,
                command: None,
                matched,
            },
            Failure::Timeout => FsmError::Timeout {
                host,
                fsm: self.name.clone(),
                state: ctx.state,
                waited: timeout,
            },
            Failure::Aborted(message) => FsmError::Aborted {
                host,
                fsm: self.name.clone(),
                message,
            },
            Failure::Transport(source) => FsmError::Transport { host, source },
        }
    }
}

fn last_line(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .last()
        .unwrap_or("")
        .to_string()
}
