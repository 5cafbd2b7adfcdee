#![forbid(unsafe_code)]

//! Per-field ordering of overlapping validations.
//!
//! A field may be validated again before an earlier validation has reported
//! (a slow custom validator, then another keystroke). Every validation takes a
//! token from the field's [`Sequencer`]; only the newest token may commit
//! field state. Older results are discarded and recorded as stale, while the
//! caller that started them still receives its own outcome.
//!
//! # Invariants
//!
//! - Tokens are strictly monotonic: `token_n < token_{n+1}`.
//! - Token 0 is reserved for "no validation".
//! - A result commits only if its token is the current one.
//! - [`Sequencer::cancel`] makes every in-flight token stale without starting
//!   a new validation.

use std::collections::VecDeque;
use std::fmt;

use web_time::Instant;

// ---------------------------------------------------------------------------
// Token
// ---------------------------------------------------------------------------

/// Version number of one validation request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Token(u64);

impl Token {
    /// The null token.
    pub const NONE: Self = Self(0);

    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }

    #[must_use]
    pub const fn is_none(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Token({})", self.0)
    }
}

// ---------------------------------------------------------------------------
// Trace
// ---------------------------------------------------------------------------

/// Lifecycle event of one validation, kept for debugging and tests.
#[derive(Debug, Clone, PartialEq)]
pub enum SequenceEvent {
    Started {
        token: Token,
        elapsed_ns: u64,
    },
    /// Made stale by a newer validation or a cancel.
    Superseded {
        token: Token,
        by: Token,
        elapsed_ns: u64,
    },
    Completed {
        token: Token,
        valid: bool,
        elapsed_ns: u64,
    },
    Applied {
        token: Token,
        valid: bool,
        elapsed_ns: u64,
    },
    StaleDiscarded {
        token: Token,
        current: Token,
        elapsed_ns: u64,
    },
}

impl SequenceEvent {
    #[must_use]
    pub fn token(&self) -> Token {
        match self {
            Self::Started { token, .. }
            | Self::Superseded { token, .. }
            | Self::Completed { token, .. }
            | Self::Applied { token, .. }
            | Self::StaleDiscarded { token, .. } => *token,
        }
    }

    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Started { .. } => "started",
            Self::Superseded { .. } => "superseded",
            Self::Completed { .. } => "completed",
            Self::Applied { .. } => "applied",
            Self::StaleDiscarded { .. } => "stale_discarded",
        }
    }
}

/// Events kept per field; older events are dropped first.
pub const TRACE_CAPACITY: usize = 256;

/// Bounded, ordered log of the most recent [`SequenceEvent`]s.
#[derive(Debug, Clone)]
pub struct SequenceTrace {
    events: VecDeque<SequenceEvent>,
    capacity: usize,
    dropped: u64,
}

impl Default for SequenceTrace {
    fn default() -> Self {
        Self::with_capacity(TRACE_CAPACITY)
    }
}

impl SequenceTrace {
    /// A trace holding at most `capacity` events (at least one).
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: VecDeque::with_capacity(capacity.min(TRACE_CAPACITY)),
            capacity,
            dropped: 0,
        }
    }

    /// Retained events, oldest first.
    pub fn events(&self) -> impl Iterator<Item = &SequenceEvent> {
        self.events.iter()
    }

    #[must_use]
    pub fn contains_event_type(&self, token: Token, event_type: &str) -> bool {
        self.events
            .iter()
            .any(|e| e.token() == token && e.event_type() == event_type)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Events evicted to stay within capacity since the last clear.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Remove every event.
    pub fn clear(&mut self) {
        self.events.clear();
        self.dropped = 0;
    }

    /// Check the trace against the invariants in the module docs. Returns
    /// one line per violation.
    #[must_use]
    pub fn verify_invariants(&self) -> Vec<String> {
        let mut violations = Vec::new();

        let mut last_started = Token::NONE;
        for event in &self.events {
            if let SequenceEvent::Started { token, .. } = event {
                if *token <= last_started {
                    violations.push(format!(
                        "non-monotonic start token: {token} after {last_started}"
                    ));
                }
                last_started = *token;
            }
        }

        for event in &self.events {
            if let SequenceEvent::StaleDiscarded { token, current, .. } = event
                && token >= current
            {
                violations.push(format!("stale discard of current token: {token} >= {current}"));
            }
        }

        violations
    }

    fn push(&mut self, event: SequenceEvent) {
        if self.events.len() == self.capacity {
            self.events.pop_front();
            self.dropped += 1;
        }
        self.events.push_back(event);
    }
}

// ---------------------------------------------------------------------------
// Sequencer
// ---------------------------------------------------------------------------

/// Token issuer and commit gate for one field.
pub struct Sequencer {
    next: u64,
    current: Token,
    in_flight: VecDeque<Token>,
    trace: SequenceTrace,
    created_at: Instant,
}

impl fmt::Debug for Sequencer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sequencer")
            .field("current", &self.current)
            .field("in_flight", &self.in_flight.len())
            .field("trace_events", &self.trace.len())
            .finish()
    }
}

impl Default for Sequencer {
    fn default() -> Self {
        Self::new()
    }
}

impl Sequencer {
    #[must_use]
    pub fn new() -> Self {
        Self {
            next: 1,
            current: Token::NONE,
            in_flight: VecDeque::new(),
            trace: SequenceTrace::default(),
            created_at: Instant::now(),
        }
    }

    fn elapsed_ns(&self) -> u64 {
        u64::try_from(self.created_at.elapsed().as_nanos()).unwrap_or(u64::MAX)
    }

    fn issue(&mut self) -> Token {
        let token = Token(self.next);
        self.next += 1;
        token
    }

    fn supersede_all(&mut self, by: Token) {
        let elapsed_ns = self.elapsed_ns();
        for token in self.in_flight.drain(..) {
            self.trace.push(SequenceEvent::Superseded {
                token,
                by,
                elapsed_ns,
            });
        }
    }

    /// Begin a validation. Every in-flight validation becomes stale.
    pub fn start(&mut self) -> Token {
        let token = self.issue();
        self.supersede_all(token);
        self.in_flight.push_back(token);
        self.current = token;
        let elapsed_ns = self.elapsed_ns();
        self.trace.push(SequenceEvent::Started { token, elapsed_ns });
        token
    }

    /// Make every in-flight validation stale without starting a new one.
    pub fn cancel(&mut self) {
        if self.in_flight.is_empty() {
            return;
        }
        let barrier = self.issue();
        self.supersede_all(barrier);
        self.current = barrier;
    }

    /// Record the result for `token`. Returns whether it may be applied.
    pub fn try_commit(&mut self, token: Token, valid: bool) -> bool {
        let elapsed_ns = self.elapsed_ns();
        self.trace.push(SequenceEvent::Completed {
            token,
            valid,
            elapsed_ns,
        });
        self.in_flight.retain(|t| *t != token);

        if token != self.current {
            self.trace.push(SequenceEvent::StaleDiscarded {
                token,
                current: self.current,
                elapsed_ns,
            });
            return false;
        }

        self.trace.push(SequenceEvent::Applied {
            token,
            valid,
            elapsed_ns,
        });
        true
    }

    #[must_use]
    pub fn current(&self) -> Token {
        self.current
    }

    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    #[must_use]
    pub fn trace(&self) -> &SequenceTrace {
        &self.trace
    }

    /// Drop the recorded trace. Tokens and in-flight state are kept.
    pub fn clear_trace(&mut self) {
        self.trace.clear();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
