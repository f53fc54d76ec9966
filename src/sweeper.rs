//! Sweeper
//!
//! Background incremental collector. A perpetual scan over `[HEAD, tail)`
//! that finds runs of dead records and hands them to the range reclaimer.
//!
//! ## Phases
//! ```text
//!            dead record
//!   Skipping ───────────► Collecting ──┐ dead record
//!      ▲  │                  │   ▲     │
//!      │  │ live record      │   └─────┘
//!      │  └──────┐           │ live record: collect [begin, live)
//!      │         ▼           │ tail:        collect [begin, tail), wrap
//!      └─────────┴───────────┘
//! ```
//!
//! The state machine here is pure: the engine's writer performs the record
//! lookup, feeds the result in as an [`Observation`] and carries out the
//! [`Transition`]'s collect request. Each step is one unit of work on the
//! writer queue, so a sweep never races a foreground write.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::log::Cursor;

/// What the writer found at the sweep position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    /// A record at `at` (the first record at or after the requested cursor)
    Record { at: Cursor, next: Cursor, live: bool },
    /// Nothing left before the tail
    Tail { tail: Cursor },
}

/// Where the sweep currently stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Walking over live records
    Skipping { last: Cursor },
    /// Inside a run of dead records starting at `begin`
    Collecting { begin: Cursor, last: Cursor },
}

/// Outcome of feeding one observation to a phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub phase: Phase,
    /// Dead range to reclaim before the next step
    pub collect: Option<(Cursor, Cursor)>,
    /// The sweep reached the tail and starts over from HEAD
    pub wrapped: bool,
}

impl Phase {
    pub const START: Phase = Phase::Skipping { last: Cursor::HEAD };

    /// Cursor the next observation must be taken at
    pub fn position(&self) -> Cursor {
        match *self {
            Phase::Skipping { last } | Phase::Collecting { last, .. } => last,
        }
    }

    pub fn advance(self, observation: Observation) -> Transition {
        match (self, observation) {
            (Phase::Skipping { .. }, Observation::Tail { .. }) => Transition {
                phase: Phase::START,
                collect: None,
                wrapped: true,
            },
            (Phase::Skipping { .. }, Observation::Record { at, next, live }) => Transition {
                phase: if live {
                    Phase::Skipping { last: next }
                } else {
                    Phase::Collecting { begin: at, last: next }
                },
                collect: None,
                wrapped: false,
            },
            (Phase::Collecting { begin, .. }, Observation::Tail { tail }) => Transition {
                phase: Phase::START,
                collect: Some((begin, tail)),
                wrapped: true,
            },
            (Phase::Collecting { begin, .. }, Observation::Record { at, live: true, .. }) => {
                Transition {
                    phase: Phase::Skipping { last: at },
                    collect: Some((begin, at)),
                    wrapped: false,
                }
            }
            (Phase::Collecting { begin, .. }, Observation::Record { next, live: false, .. }) => {
                Transition {
                    phase: Phase::Collecting { begin, last: next },
                    collect: None,
                    wrapped: false,
                }
            }
        }
    }
}

/// Cooperative on/off switch shared between the engine handle and the writer
#[derive(Debug, Clone, Default)]
pub struct SweepControl(Arc<AtomicBool>);

impl SweepControl {
    pub fn start(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Takes effect before the next step is scheduled; an in-flight step completes
    pub fn stop(&self) {
        self.0.store(false, Ordering::Release);
    }

    pub fn is_running(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Sweep state owned by the writer
#[derive(Debug)]
pub struct Sweeper {
    phase: Phase,
    control: SweepControl,
    /// Pause between two full sweeps
    pause: Duration,
    /// No step before this instant (set when a sweep wraps)
    resume_at: Option<Instant>,
}

impl Sweeper {
    pub fn new(control: SweepControl, pause: Duration) -> Self {
        Self {
            phase: Phase::START,
            control,
            pause,
            resume_at: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_running(&self) -> bool {
        self.control.is_running()
    }

    pub fn stop(&self) {
        self.control.stop();
    }

    /// Start over from HEAD right away
    pub fn restart(&mut self) {
        self.phase = Phase::START;
        self.resume_at = None;
    }

    /// Time until the next step is due, `None` while stopped
    pub fn due_in(&self, now: Instant) -> Option<Duration> {
        if !self.control.is_running() {
            return None;
        }
        Some(
            self.resume_at
                .map(|at| at.saturating_duration_since(now))
                .unwrap_or(Duration::ZERO),
        )
    }

    /// Whether a step may run now
    pub fn is_due(&self, now: Instant) -> bool {
        self.due_in(now) == Some(Duration::ZERO)
    }

    /// Feed one observation; returns the range to collect, if any
    pub fn observe(&mut self, observation: Observation, now: Instant) -> Transition {
        let transition = self.phase.advance(observation);
        self.phase = transition.phase;
        if transition.wrapped {
            self.resume_at = Some(now + self.pause);
        }
        transition
    }

    /// A step failed: back off and start over
    pub fn abort(&mut self, now: Instant) {
        self.phase = Phase::START;
        self.resume_at = Some(now + self.pause);
    }
}
