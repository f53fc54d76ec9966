//! Engine Module
//!
//! The durable log engine that coordinates all components.
//!
//! ## Responsibilities
//! - Apply write-ahead-log batches to the log and the index
//! - Advance the checkpoint and release covered batches in order
//! - Serve point reads and full scans of live records
//! - Drive background garbage collection
//!
//! ## Concurrency Model: Single Writer
//!
//! ```text
//!   apply / load / probe / collect        ┌──────────────────────────┐
//!   ──────────────────────────────────►   │  bounded task queue      │
//!                                         └────────────┬─────────────┘
//!                                                      ▼
//!                                         ┌──────────────────────────┐
//!     Ticket ◄──── reply channel ──────── │  writer thread           │
//!                                         │  chain · index · ckpt    │
//!                                         │  + sweep steps, heartbeat│
//!                                         └────────────┬─────────────┘
//!                                                      │ publish
//!                                                      ▼
//!                                          stats() / segments() snapshots
//! ```
//!
//! Segments, the chain and the checkpoint are not thread-safe. They are
//! owned by the writer thread and never touched from anywhere else, so they
//! need no locks. Callers wait on their reply for at most
//! `request_timeout_ms`; a timed-out unit of work is reported as failed and
//! is not retried.

mod task;
mod writer;

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{bounded, Receiver, RecvTimeoutError, SendTimeoutError, Sender};
use parking_lot::Mutex;

use crate::checkpoint::Checkpoint;
use crate::config::Config;
use crate::error::{AtlasError, Result};
use crate::index::{Index, MemIndex};
use crate::log::{Cursor, Entry, SegmentChain, SegmentInfo};
use crate::sweeper::{SweepControl, Sweeper};
use crate::wal::Batch;

pub use task::Probe;

use task::{Reply, Task};
use writer::{Shared, Writer};

/// Counters and positions published by the writer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    pub batches_applied: u64,
    pub batches_discarded: u64,
    pub records_appended: u64,
    pub keys_removed: u64,
    pub bytes_reclaimed: u64,
    pub sweeps_completed: u64,
    pub checkpoint_number: u64,
    pub checkpoint_cursor: Cursor,
    pub tail: Cursor,
    /// Record bytes still held by segment files
    pub live_bytes: u64,
    pub pending_batches: usize,
    pub keys: usize,
}

/// Pending reply of a submitted unit of work
#[must_use = "a ticket does nothing unless waited on"]
pub struct Ticket<T> {
    reply: Receiver<Result<T>>,
    timeout: Duration,
    what: &'static str,
}

impl<T> Ticket<T> {
    /// Block until the writer answers or the request timeout expires
    pub fn wait(self) -> Result<T> {
        match self.reply.recv_timeout(self.timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(AtlasError::Timeout(self.what)),
            Err(RecvTimeoutError::Disconnected) => Err(AtlasError::EngineClosed),
        }
    }

    /// The reply, if the writer has already answered
    pub fn try_wait(&self) -> Option<Result<T>> {
        self.reply.try_recv().ok()
    }
}

/// The storage engine handle
pub struct Engine {
    /// Engine configuration
    config: Config,

    /// Queue into the single writer
    tasks: Sender<Task>,

    /// Snapshots published by the writer
    shared: Arc<Shared>,

    /// Background collection on/off switch
    sweep: SweepControl,

    /// Writer thread, taken on shutdown
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Engine {
    /// Open or create an engine with the given config
    ///
    /// Uses the default [`MemIndex`], persisted next to the log.
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;
        fs::create_dir_all(&config.data_dir)?;
        let index = MemIndex::open(&config.index_path())?;
        Self::open_with_index(config, Box::new(index))
    }

    /// Open with a path (convenience method)
    ///
    /// Uses default config with the specified data directory
    pub fn open_path(path: &Path) -> Result<Self> {
        Self::open(Config::builder().data_dir(path).build())
    }

    /// Open or create an engine over an externally managed index
    ///
    /// On startup:
    /// 1. Load the checkpoint (stale markers are removed)
    /// 2. Load the segment chain (corrupt segments are removed)
    /// 3. Make sure the log does not end before the checkpoint
    /// 4. Start the writer thread
    pub fn open_with_index(config: Config, index: Box<dyn Index>) -> Result<Self> {
        config.validate()?;
        fs::create_dir_all(&config.data_dir)?;

        let checkpoint = Checkpoint::open(&config.checkpoint_dir(), config.group_apply_length)?;
        let mut chain = SegmentChain::open(&config.segment_dir(), config.segment_capacity)?;
        chain.start_at(checkpoint.cursor())?;

        tracing::info!(
            data_dir = ?config.data_dir,
            checkpoint = checkpoint.number(),
            cursor = checkpoint.cursor().offset(),
            tail = chain.tail().offset(),
            segments = chain.len(),
            keys = index.len(),
            "engine opened"
        );

        let (tasks, inbox) = bounded(config.task_backlog);
        let sweep = SweepControl::default();
        let shared = Arc::new(Shared::new());
        let writer = Writer::new(
            config.clone(),
            chain,
            index,
            checkpoint,
            Sweeper::new(sweep.clone(), config.sweep_pause()),
            Arc::clone(&shared),
        );

        let worker = thread::Builder::new()
            .name("atlaslog-writer".to_string())
            .spawn(move || writer.run(inbox))?;

        Ok(Self {
            config,
            tasks,
            shared,
            sweep,
            worker: Mutex::new(Some(worker)),
        })
    }

    // =========================================================================
    // Exposed Operations
    // =========================================================================

    /// Submit a batch; the ticket resolves once it has been applied
    ///
    /// A batch already covered by the checkpoint is discarded and resolves
    /// successfully. A failed batch stays pending and blocks checkpoints
    /// until it is submitted again.
    pub fn apply(&self, batch: Batch) -> Result<Ticket<()>> {
        self.submit("apply", |reply| Task::Apply { batch, reply })
    }

    /// Value currently stored for `key`
    pub fn load(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let key = key.to_vec();
        self.submit("load", |reply| Task::Load { key, reply })?
            .wait()
    }

    /// First record at or after `cursor`, with its liveness
    pub fn probe(&self, cursor: Cursor) -> Result<Probe> {
        self.submit("probe", |reply| Task::Probe { cursor, reply })?
            .wait()
    }

    /// Lazily scan every live record from HEAD
    pub fn iterate(&self) -> Scan<'_> {
        Scan {
            engine: self,
            cursor: Some(Cursor::HEAD),
        }
    }

    /// Reclaim the dead range `[begin, end)` right away
    pub fn collect(&self, begin: Cursor, end: Cursor) -> Result<u64> {
        self.submit("collect", |reply| Task::Collect { begin, end, reply })?
            .wait()
    }

    /// Start the background sweep from HEAD
    pub fn start_auto_collect(&self) -> Result<()> {
        self.sweep.start();
        self.send(Task::StartSweep)
    }

    /// Stop scheduling sweep steps; a step in flight still completes
    pub fn stop_auto_collect(&self) {
        self.sweep.stop();
        tracing::debug!("auto collect stopped");
    }

    pub fn is_auto_collecting(&self) -> bool {
        self.sweep.is_running()
    }

    /// Close the engine gracefully
    ///
    /// Checkpoints pending batches, seals the open segment and flushes the
    /// index before the writer thread exits.
    pub fn close(self) -> Result<()> {
        self.shutdown()
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Latest published counters
    pub fn stats(&self) -> EngineStats {
        *self.shared.stats.read()
    }

    /// Latest published segment layout
    pub fn segments(&self) -> Arc<[SegmentInfo]> {
        Arc::clone(&self.shared.segments.read())
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get the data directory path
    pub fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn submit<T>(
        &self,
        what: &'static str,
        task: impl FnOnce(Reply<T>) -> Task,
    ) -> Result<Ticket<T>> {
        let (reply, receiver) = bounded(1);
        self.send(task(reply))?;
        Ok(Ticket {
            reply: receiver,
            timeout: self.config.request_timeout(),
            what,
        })
    }

    fn send(&self, task: Task) -> Result<()> {
        self.tasks
            .send_timeout(task, self.config.request_timeout())
            .map_err(|e| match e {
                SendTimeoutError::Timeout(_) => AtlasError::Backlog,
                SendTimeoutError::Disconnected(_) => AtlasError::EngineClosed,
            })
    }

    fn shutdown(&self) -> Result<()> {
        let Some(worker) = self.worker.lock().take() else {
            return Ok(());
        };

        self.sweep.stop();
        let result = self
            .submit("shutdown", |reply| Task::Shutdown { reply })
            .and_then(Ticket::wait);

        worker
            .join()
            .map_err(|_| AtlasError::TaskFailed("writer thread panicked".to_string()))?;

        tracing::info!(data_dir = ?self.config.data_dir, "engine closed");
        result
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            tracing::warn!("engine shutdown on drop failed: {}", e);
        }
    }
}

/// Lazy, single-pass scan over live records
///
/// Each step is one probe through the writer queue, so the scan tolerates
/// concurrent appends and reclamation: a cursor whose bytes were reclaimed
/// simply resumes at the next surviving record.
pub struct Scan<'a> {
    engine: &'a Engine,
    /// None once the tail was reached or an error was returned
    cursor: Option<Cursor>,
}

impl Iterator for Scan<'_> {
    type Item = Result<Entry>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let cursor = self.cursor?;
            match self.engine.probe(cursor) {
                Ok(Probe::Tail(_)) => {
                    self.cursor = None;
                    return None;
                }
                Ok(Probe::Record {
                    entry, next, live, ..
                }) => {
                    self.cursor = Some(next);
                    if live {
                        return Some(Ok(entry));
                    }
                }
                Err(e) => {
                    self.cursor = None;
                    return Some(Err(e));
                }
            }
        }
    }
}
