use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use doorway_patterns::{Pattern, PatternMatch};
use doorway_types::State;

use crate::actions::Action;

/// Classified outcome of one FSM cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A candidate pattern matched the buffered output
    Matched(PatternMatch),
    /// Nothing recognisable arrived before the deadline
    Timeout,
    /// The transport reported end of stream
    EndOfStream,
}

impl Event {
    /// Event seeded from a previous phase's last pattern
    pub fn handoff(pattern_name: impl Into<String>) -> Self {
        Event::Matched(PatternMatch {
            index: 0,
            name: pattern_name.into(),
            start: 0,
            end: 0,
            text: String::new(),
        })
    }

    pub fn pattern_name(&self) -> Option<&str> {
        match self {
            Event::Matched(m) => Some(&m.name),
            Event::Timeout | Event::EndOfStream => None,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::Matched(m) => write!(f, "pattern '{}'", m.name),
            Event::Timeout => write!(f, "timeout"),
            Event::EndOfStream => write!(f, "eof"),
        }
    }
}

/// What a transition reacts to
#[derive(Debug, Clone)]
pub enum Trigger {
    Pattern(Arc<Pattern>),
    Timeout,
    EndOfStream,
}

impl Trigger {
    pub fn pattern(pattern: &Arc<Pattern>) -> Self {
        Trigger::Pattern(Arc::clone(pattern))
    }

    /// Pattern triggers accept matches by pattern name
    pub fn accepts(&self, event: &Event) -> bool {
        match (self, event) {
            (Trigger::Pattern(pattern), Event::Matched(m)) => pattern.name() == m.name,
            (Trigger::Timeout, Event::Timeout) => true,
            (Trigger::EndOfStream, Event::EndOfStream) => true,
            _ => false,
        }
    }
}

impl From<Arc<Pattern>> for Trigger {
    fn from(pattern: Arc<Pattern>) -> Self {
        Trigger::Pattern(pattern)
    }
}

impl From<&Arc<Pattern>> for Trigger {
    fn from(pattern: &Arc<Pattern>) -> Self {
        Trigger::pattern(pattern)
    }
}

impl From<Pattern> for Trigger {
    fn from(pattern: Pattern) -> Self {
        Trigger::Pattern(Arc::new(pattern))
    }
}

/// One row of a transition table
#[derive(Clone)]
pub struct Transition {
    pub triggers: Vec<Trigger>,
    /// States this transition is valid in
    pub states: Vec<State>,
    pub next: State,
    pub action: Option<Arc<dyn Action>>,
    /// Timeout for the cycle after this transition; `None` uses the FSM default
    pub timeout: Option<Duration>,
}

impl Transition {
    pub fn is_valid_in(&self, state: State) -> bool {
        self.states.contains(&state)
    }

    pub fn accepts(&self, state: State, event: &Event) -> bool {
        self.is_valid_in(state) && self.triggers.iter().any(|t| t.accepts(event))
    }

    /// Patterns this transition waits for, in declaration order
    pub fn patterns(&self) -> impl Iterator<Item = &Pattern> {
        self.triggers.iter().filter_map(|t| match t {
            Trigger::Pattern(p) => Some(p.as_ref()),
            Trigger::Timeout | Trigger::EndOfStream => None,
        })
    }
}

impl fmt::Debug for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transition")
            .field("triggers", &self.triggers)
            .field("states", &self.states)
            .field("next", &self.next)
            .field("action", &self.action.as_ref().map(|_| "<action>"))
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Ordered, immutable set of transitions for one protocol phase.
///
/// Declaration order is priority: when several transitions accept the same
/// (state, event) pair, the first one declared wins.
#[derive(Debug, Clone, Default)]
pub struct TransitionTable {
    transitions: Vec<Transition>,
}

impl TransitionTable {
    pub fn builder() -> TransitionTableBuilder {
        TransitionTableBuilder::default()
    }

    /// Transitions valid in `state`, in declaration order
    pub fn candidates(&self, state: State) -> impl Iterator<Item = &Transition> {
        self.transitions.iter().filter(move |t| t.is_valid_in(state))
    }

    /// First transition valid in `state` whose triggers accept `event`
    pub fn lookup(&self, state: State, event: &Event) -> Option<&Transition> {
        self.transitions.iter().find(|t| t.accepts(state, event))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Transition> {
        self.transitions.iter()
    }

    pub fn len(&self) -> usize {
        self.transitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty()
    }
}

#[derive(Default)]
pub struct TransitionTableBuilder {
    transitions: Vec<Transition>,
}

impl TransitionTableBuilder {
    /// Append a transition; earlier calls take priority over later ones
    pub fn on<T, S>(
        mut self,
        triggers: T,
        states: S,
        next: impl Into<State>,
        action: Option<Arc<dyn Action>>,
        timeout: Option<Duration>,
    ) -> Self
    where
        T: IntoIterator,
        T::Item: Into<Trigger>,
        S: IntoIterator,
        S::Item: Into<State>,
    {
        self.transitions.push(Transition {
            triggers: triggers.into_iter().map(Into::into).collect(),
            states: states.into_iter().map(Into::into).collect(),
            next: next.into(),
            action,
            timeout,
        });
        self
    }

    pub fn push(mut self, transition: Transition) -> Self {
        self.transitions.push(transition);
        self
    }

    pub fn build(self) -> TransitionTable {
        TransitionTable {
            transitions: self.transitions,
        }
    }
}
