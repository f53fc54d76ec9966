//! Writer tasks
//!
//! Every unit of work the engine hands to its single writer.

use crossbeam::channel::Sender;

use crate::error::Result;
use crate::log::{Cursor, Entry};
use crate::sweeper::Observation;
use crate::wal::Batch;

/// Reply channel of a task
pub(crate) type Reply<T> = Sender<Result<T>>;

/// Result of looking at the log at some cursor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe {
    /// The first record at or after the requested cursor
    Record {
        at: Cursor,
        entry: Entry,
        next: Cursor,
        /// The index still points at `at` for this key
        live: bool,
    },
    /// No record between the requested cursor and the tail
    Tail(Cursor),
}

impl Probe {
    pub fn observation(&self) -> Observation {
        match self {
            Probe::Record { at, next, live, .. } => Observation::Record {
                at: *at,
                next: *next,
                live: *live,
            },
            Probe::Tail(tail) => Observation::Tail { tail: *tail },
        }
    }
}

pub(crate) enum Task {
    Apply { batch: Batch, reply: Reply<()> },
    Load { key: Vec<u8>, reply: Reply<Option<Vec<u8>>> },
    Probe { cursor: Cursor, reply: Reply<Probe> },
    Collect { begin: Cursor, end: Cursor, reply: Reply<u64> },
    StartSweep,
    Shutdown { reply: Reply<()> },
}

impl Task {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            Task::Apply { .. } => "apply",
            Task::Load { .. } => "load",
            Task::Probe { .. } => "probe",
            Task::Collect { .. } => "collect",
            Task::StartSweep => "start_sweep",
            Task::Shutdown { .. } => "shutdown",
        }
    }
}
