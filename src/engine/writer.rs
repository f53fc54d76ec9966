//! Single Writer
//!
//! Owns the segment chain, the index and the checkpoint, and applies every
//! task from the engine's queue one at a time. Nothing it owns is shared:
//! other threads only see the snapshots it publishes after each mutation.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use crossbeam::channel::{select, tick, Receiver};
use parking_lot::RwLock;

use crate::checkpoint::Checkpoint;
use crate::config::Config;
use crate::error::{AtlasError, Result};
use crate::index::Index;
use crate::log::{Cursor, Entry, SegmentChain, SegmentInfo};
use crate::sweeper::Sweeper;
use crate::wal::{Batch, Event};

use super::task::{Probe, Task};
use super::EngineStats;

/// State published by the writer for lock-cheap reads
pub(crate) struct Shared {
    pub(crate) segments: RwLock<Arc<[SegmentInfo]>>,
    pub(crate) stats: RwLock<EngineStats>,
}

impl Shared {
    pub(crate) fn new() -> Self {
        Self {
            segments: RwLock::new(Arc::from(Vec::new())),
            stats: RwLock::new(EngineStats::default()),
        }
    }
}

/// A batch waiting for a checkpoint to cover it
struct Pending {
    batch: Batch,
    failed: bool,
}

pub(crate) struct Writer {
    config: Config,
    chain: SegmentChain,
    index: Box<dyn Index>,
    checkpoint: Checkpoint,
    /// Batches in submission order, released strictly from the front
    pending: VecDeque<Pending>,
    sweeper: Sweeper,
    stats: EngineStats,
    shared: Arc<Shared>,
}

impl Writer {
    pub(crate) fn new(
        config: Config,
        chain: SegmentChain,
        index: Box<dyn Index>,
        checkpoint: Checkpoint,
        sweeper: Sweeper,
        shared: Arc<Shared>,
    ) -> Self {
        let mut writer = Self {
            config,
            chain,
            index,
            checkpoint,
            pending: VecDeque::new(),
            sweeper,
            stats: EngineStats::default(),
            shared,
        };
        writer.publish();
        writer
    }

    /// Serve tasks until shutdown
    ///
    /// Between tasks the writer runs due sweep steps and a periodic
    /// heartbeat, so background collection interleaves with foreground
    /// writes without a thread of its own.
    pub(crate) fn run(mut self, tasks: Receiver<Task>) {
        let heartbeat = tick(self.config.heartbeat_interval());

        loop {
            let idle = self
                .sweeper
                .due_in(Instant::now())
                .unwrap_or_else(|| self.config.heartbeat_interval());

            select! {
                recv(tasks) -> task => match task {
                    Ok(task) => {
                        if !self.handle(task) {
                            return;
                        }
                    }
                    Err(_) => {
                        // Every handle is gone without asking for a shutdown
                        if let Err(e) = self.shutdown() {
                            tracing::error!("writer shutdown failed: {}", e);
                        }
                        return;
                    }
                },
                recv(heartbeat) -> _ => self.heartbeat(),
                default(idle) => self.sweep_step(),
            }
        }
    }

    /// Run one task; returns `false` once the writer must stop
    fn handle(&mut self, task: Task) -> bool {
        tracing::trace!(task = task.name(), "handling task");

        match task {
            Task::Apply { batch, reply } => {
                let result = self.apply(batch);
                self.publish();
                let _ = reply.send(result);
            }
            Task::Load { key, reply } => {
                let _ = reply.send(self.load(&key));
            }
            Task::Probe { cursor, reply } => {
                let _ = reply.send(self.probe(cursor));
            }
            Task::Collect { begin, end, reply } => {
                let result = self.collect(begin, end);
                self.publish();
                let _ = reply.send(result);
            }
            Task::StartSweep => {
                tracing::debug!("auto collect started");
                self.sweeper.restart();
            }
            Task::Shutdown { reply } => {
                let _ = reply.send(self.shutdown());
                return false;
            }
        }

        true
    }

    // =========================================================================
    // Apply
    // =========================================================================

    fn apply(&mut self, batch: Batch) -> Result<()> {
        let number = batch.number();

        // Left over from a run that crashed before releasing it
        if self.checkpoint.is_applied(number) {
            tracing::debug!(number, "batch already covered by checkpoint, discarding");
            self.stats.batches_discarded += 1;
            batch.discard();
            return Ok(());
        }

        // A retried batch keeps its place in the queue
        let slot = match self.pending.iter().position(|p| p.batch.number() == number) {
            Some(slot) if !self.pending[slot].failed => {
                // Already applied; its pending copy is released at the checkpoint
                tracing::debug!(number, "batch already pending, ignoring resubmission");
                return Ok(());
            }
            Some(slot) => {
                tracing::debug!(number, "retrying failed batch");
                self.pending[slot] = Pending {
                    batch,
                    failed: false,
                };
                slot
            }
            None => {
                self.pending.push_back(Pending {
                    batch,
                    failed: false,
                });
                self.pending.len() - 1
            }
        };

        let events = self.pending[slot].batch.events();
        if let Err(e) = apply_events(&mut self.chain, self.index.as_mut(), events, &mut self.stats)
        {
            tracing::warn!(number, "batch failed, keeping it pending: {}", e);
            self.pending[slot].failed = true;
            return Err(e);
        }
        self.stats.batches_applied += 1;

        if !self.checkpoint.can_save(self.chain.tail()) {
            return Ok(());
        }
        if self.pending.iter().any(|p| p.failed) {
            tracing::debug!(number, "checkpoint held back by a failed batch");
            return Ok(());
        }

        if let Err(e) = self.checkpoint_at(number) {
            tracing::warn!(number, "checkpoint failed, keeping batch pending: {}", e);
            if let Some(pending) = self.pending.iter_mut().find(|p| p.batch.number() == number) {
                pending.failed = true;
            }
            return Err(e);
        }

        Ok(())
    }

    /// Make everything up to batch `number` durable and release its pages
    ///
    /// The index is flushed before the marker is written: a checkpoint must
    /// never claim a batch whose index changes could still be lost.
    fn checkpoint_at(&mut self, number: u64) -> Result<()> {
        self.chain.seal_last()?;
        self.index.flush()?;
        self.checkpoint.save(number, self.chain.tail())?;
        self.chain.roll_over()?;

        while let Some(front) = self.pending.front() {
            if front.batch.number() > number {
                break;
            }
            if let Some(done) = self.pending.pop_front() {
                done.batch.discard();
                self.stats.batches_discarded += 1;
            }
        }

        Ok(())
    }

    // =========================================================================
    // Reads
    // =========================================================================

    fn load(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        match self.index.get(key) {
            Some(cursor) => Ok(Some(self.chain.get(cursor)?.value)),
            None => Ok(None),
        }
    }

    /// Look at the first record at or after `cursor`
    fn probe(&mut self, cursor: Cursor) -> Result<Probe> {
        let tail = self.chain.tail();
        let at = self.chain.seek(cursor);
        if at >= tail {
            return Ok(Probe::Tail(tail));
        }

        let entry = self.chain.get(at)?;
        let next = self.chain.next(at)?;
        let live = self.index.get(&entry.key) == Some(at);

        Ok(Probe::Record {
            at,
            entry,
            next,
            live,
        })
    }

    // =========================================================================
    // Reclamation
    // =========================================================================

    fn collect(&mut self, begin: Cursor, end: Cursor) -> Result<u64> {
        let reclaimed = self
            .chain
            .collect(begin, end, self.config.min_collect_length)?;
        self.stats.bytes_reclaimed += reclaimed;
        Ok(reclaimed)
    }

    /// One step of the background sweep
    fn sweep_step(&mut self) {
        let now = Instant::now();
        if !self.sweeper.is_due(now) {
            return;
        }

        let position = self.sweeper.phase().position();
        let observation = match self.probe(position) {
            Ok(probe) => probe.observation(),
            Err(e) => {
                tracing::warn!(cursor = position.offset(), "sweep probe failed, restarting: {}", e);
                self.sweeper.abort(now);
                return;
            }
        };

        let transition = self.sweeper.observe(observation, now);

        if let Some((begin, end)) = transition.collect {
            match self.collect(begin, end) {
                Ok(0) => {}
                Ok(_) => self.publish(),
                Err(e) => {
                    tracing::warn!(
                        begin = begin.offset(),
                        end = end.offset(),
                        "sweep collect failed, restarting: {}",
                        e
                    );
                    self.sweeper.abort(now);
                    return;
                }
            }
        }

        if transition.wrapped {
            self.stats.sweeps_completed += 1;
            tracing::debug!(
                sweeps = self.stats.sweeps_completed,
                reclaimed = self.stats.bytes_reclaimed,
                "sweep reached tail, restarting from head"
            );
            self.publish();
        }
    }

    // =========================================================================
    // Housekeeping
    // =========================================================================

    fn heartbeat(&mut self) {
        if let Err(e) = self.chain.sync_last() {
            tracing::warn!("heartbeat sync failed: {}", e);
        }
        tracing::trace!(
            tail = self.chain.tail().offset(),
            pending = self.pending.len(),
            segments = self.chain.len(),
            "heartbeat"
        );
    }

    /// Stop sweeping and leave the directory in a recoverable state
    ///
    /// With no failed batch outstanding, everything pending is checkpointed
    /// so the next open has nothing to replay.
    fn shutdown(&mut self) -> Result<()> {
        self.sweeper.stop();

        let failed = self.pending.iter().any(|p| p.failed);
        let last = self.pending.iter().map(|p| p.batch.number()).max();

        match last {
            Some(number) if !failed => self.checkpoint_at(number)?,
            _ => {
                self.chain.seal_last()?;
                self.index.flush()?;
            }
        }

        self.publish();
        tracing::info!(
            tail = self.chain.tail().offset(),
            checkpoint = self.checkpoint.number(),
            "writer stopped"
        );
        Ok(())
    }

    /// Refresh the snapshots readers see
    fn publish(&mut self) {
        self.stats.checkpoint_number = self.checkpoint.number();
        self.stats.checkpoint_cursor = self.checkpoint.cursor();
        self.stats.tail = self.chain.tail();
        self.stats.live_bytes = self.chain.live_bytes();
        self.stats.pending_batches = self.pending.len();
        self.stats.keys = self.index.len();

        *self.shared.stats.write() = self.stats;
        *self.shared.segments.write() = Arc::from(self.chain.infos());
    }
}

/// Apply every event of a batch to the log and the index
fn apply_events(
    chain: &mut SegmentChain,
    index: &mut dyn Index,
    events: &[Event],
    stats: &mut EngineStats,
) -> Result<()> {
    for event in events {
        match event {
            Event::Add { key, value } => {
                let entry = Entry::new(key.clone(), value.clone());
                let cursor = append(chain, &entry)?;
                index.put(key.clone(), cursor);
                stats.records_appended += 1;
                tracing::trace!(cursor = cursor.offset(), "appended record");
            }
            Event::Delete { key } => {
                // The bytes stay until the sweeper reclaims them
                if index.remove(key).is_some() {
                    stats.keys_removed += 1;
                }
            }
        }
    }
    Ok(())
}

/// Append, rolling over to a fresh segment when the open one is full
fn append(chain: &mut SegmentChain, entry: &Entry) -> Result<Cursor> {
    let size = entry.framed_len();
    if size > chain.capacity() {
        return Err(AtlasError::RecordTooLarge {
            size,
            capacity: chain.capacity(),
        });
    }

    match chain.append(entry) {
        Err(AtlasError::Overflow { .. }) => {
            chain.roll_over()?;
            chain.append(entry)
        }
        result => result,
    }
}
