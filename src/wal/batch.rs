//! WAL batches
//!
//! A batch is one decoded write-ahead-log page. The engine keeps it pending
//! until a checkpoint covers its number, then discards it, which hands the
//! page back to the write-ahead log through the release hook.

use std::fmt;

use super::Event;

/// Hook invoked once the page behind a batch may be dropped
pub type ReleaseHook = Box<dyn FnOnce() + Send>;

/// An ordered set of events tagged with a monotonically increasing number
pub struct Batch {
    number: u64,
    events: Vec<Event>,
    release: Option<ReleaseHook>,
}

impl Batch {
    pub fn new(number: u64, events: Vec<Event>) -> Self {
        Self {
            number,
            events,
            release: None,
        }
    }

    /// Attach the hook that frees the underlying WAL page
    pub fn with_release(mut self, release: impl FnOnce() + Send + 'static) -> Self {
        self.release = Some(Box::new(release));
        self
    }

    pub fn number(&self) -> u64 {
        self.number
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// The batch is durable elsewhere; release its WAL page
    pub fn discard(mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
        tracing::trace!(number = self.number, "discarded batch");
    }
}

impl fmt::Debug for Batch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Batch")
            .field("number", &self.number)
            .field("events", &self.events.len())
            .field("release", &self.release.is_some())
            .finish()
    }
}
