//! Segment Chain
//!
//! Ordered, non-overlapping list of segments that together make up the log.
//!
//! ## Layout
//! ```text
//!   [0 ........ 4096)[4096 ..... 8192)      [9000 .. 12000)[12000 ..)
//!   └── segment ────┘└── segment ───┘ hole └── segment ───┘└─ open ─┘
//! ```
//! Segments produced by appends and rollovers are contiguous. Holes only
//! appear where a dead range was reclaimed; lookups and `next()` skip them.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{AtlasError, Result};

use super::reclaim::RangeReclaimer;
use super::record::Entry;
use super::segment::{Segment, TMP_EXTENSION};
use super::Cursor;

/// Immutable description of one segment, safe to hand to other threads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentInfo {
    pub begin: Cursor,
    pub length: u64,
    pub sealed: bool,
}

impl SegmentInfo {
    pub fn end(&self) -> Cursor {
        self.begin.forward(self.length)
    }
}

/// The whole log as a chain of segment files
///
/// Not thread-safe: the engine's writer owns the chain exclusively.
#[derive(Debug)]
pub struct SegmentChain {
    /// Directory holding the segment files
    dir: PathBuf,
    /// Capacity of newly created segments
    capacity: u64,
    /// Segments ordered by begin; never empty
    segments: Vec<Segment>,
}

impl SegmentChain {
    /// Open or create the chain stored in `dir`
    ///
    /// On startup:
    /// 1. Discover segment files (named by their begin offset)
    /// 2. Verify each trailer; corrupt files and unfinished copies are deleted
    /// 3. Cut overlapping sources down to the copy that replaced their tail
    /// 4. Start an empty segment at HEAD if nothing survived
    pub fn open(dir: &Path, capacity: u64) -> Result<Self> {
        fs::create_dir_all(dir)?;

        let mut begins: Vec<(Cursor, PathBuf)> = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            if path.extension().map_or(false, |ext| ext == TMP_EXTENSION) {
                tracing::warn!("removing unfinished segment copy {:?}", path);
                fs::remove_file(&path)?;
                continue;
            }
            match Segment::parse_begin(&path) {
                Some(begin) => begins.push((begin, path)),
                None => tracing::debug!("ignoring stray file {:?}", path),
            }
        }
        begins.sort_by_key(|(begin, _)| *begin);

        let mut segments: Vec<Segment> = Vec::with_capacity(begins.len());
        for (_, path) in begins {
            let segment = match Segment::open(&path, capacity) {
                Ok(segment) => segment,
                Err(e @ (AtlasError::ChecksumMismatch { .. } | AtlasError::Corruption(_))) => {
                    tracing::warn!("discarding corrupt segment {:?}: {}", path, e);
                    fs::remove_file(&path)?;
                    continue;
                }
                Err(e) => return Err(e),
            };

            let overlaps = segments
                .last()
                .map_or(false, |previous| previous.end() > segment.begin());

            // Created for a copy but never filled
            if overlaps && segment.is_empty() {
                tracing::warn!("discarding empty segment copy {:?}", segment.path());
                segment.clear()?;
                continue;
            }

            // A reclaimed copy overlapping its source means the source was
            // never cut down. The copy holds everything from its begin on;
            // the source keeps what lies before it.
            while let Some(previous) = segments.last_mut() {
                if previous.end() <= segment.begin() {
                    break;
                }
                tracing::warn!(
                    "truncating segment {:?} at {} where {:?} takes over",
                    previous.path(),
                    segment.begin(),
                    segment.path()
                );
                if !previous.left(segment.begin())? {
                    segments.pop();
                }
            }

            segments.push(segment);
        }

        if segments.is_empty() {
            segments.push(Segment::create(dir, Cursor::HEAD, capacity)?);
        }

        let chain = Self {
            dir: dir.to_path_buf(),
            capacity,
            segments,
        };

        tracing::debug!(
            segments = chain.segments.len(),
            tail = chain.tail().offset(),
            "opened segment chain at {:?}",
            dir
        );

        Ok(chain)
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Append to the open segment
    ///
    /// Returns `Overflow` when the open segment is full; the caller decides
    /// when to `roll_over()` and retries.
    pub fn append(&mut self, entry: &Entry) -> Result<Cursor> {
        // Records behind a trailer may already be covered by a checkpoint;
        // never put them back into an unsealed file.
        if self.last().is_sealed() && !self.last().is_empty() {
            self.roll_over()?;
        }
        self.last_mut().append(entry)
    }

    /// Seal the open segment and start a fresh one at the tail
    pub fn roll_over(&mut self) -> Result<()> {
        // An empty open segment is already fresh
        if self.last().is_empty() {
            return Ok(());
        }
        let next = self.last_mut().multiply()?;
        tracing::debug!(begin = next.begin().offset(), "rolled over to new segment");
        self.segments.push(next);
        Ok(())
    }

    /// Write the checksum trailer of the open segment
    pub fn seal_last(&mut self) -> Result<()> {
        self.last_mut().seal()
    }

    /// Flush appended records of the open segment without sealing it
    pub fn sync_last(&mut self) -> Result<()> {
        self.last_mut().sync()
    }

    /// Make sure the tail is at least `cursor`
    ///
    /// Used after recovery so the log never ends before the checkpoint.
    pub fn start_at(&mut self, cursor: Cursor) -> Result<()> {
        if self.tail() >= cursor {
            return Ok(());
        }

        if self.last().is_empty() {
            if let Some(empty) = self.segments.pop() {
                empty.clear()?;
            }
        } else {
            self.seal_last()?;
        }

        tracing::warn!(
            cursor = cursor.offset(),
            "log ends before checkpoint, starting new segment there"
        );
        self.segments
            .push(Segment::create(&self.dir, cursor, self.capacity)?);
        Ok(())
    }

    /// Reclaim the dead range `[begin, end)`, returning the bytes freed
    pub fn collect(&mut self, begin: Cursor, end: Cursor, min_collect_length: u64) -> Result<u64> {
        RangeReclaimer::new(min_collect_length).collect(&mut self.segments, begin, end)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Read the record at `cursor`
    pub fn get(&mut self, cursor: Cursor) -> Result<Entry> {
        let idx = self.locate(cursor).ok_or(AtlasError::Underflow(cursor))?;
        self.segments[idx].get(cursor)
    }

    /// Cursor of the next record after the one at `cursor`, skipping holes
    pub fn next(&mut self, cursor: Cursor) -> Result<Cursor> {
        let idx = self.locate(cursor).ok_or(AtlasError::Underflow(cursor))?;
        let next = self.segments[idx].next(cursor)?;
        Ok(self.seek(next))
    }

    /// First readable cursor at or after `cursor`, or the tail if none
    pub fn seek(&self, cursor: Cursor) -> Cursor {
        let start = self.segments.partition_point(|s| s.end() <= cursor);
        self.segments[start..]
            .iter()
            .find(|s| !s.is_empty())
            .map(|s| cursor.max(s.begin()))
            .unwrap_or_else(|| self.tail())
    }

    /// Index of the segment holding `cursor`
    fn locate(&self, cursor: Cursor) -> Option<usize> {
        let idx = self.segments.partition_point(|s| s.end() <= cursor);
        match self.segments.get(idx) {
            Some(segment) if segment.contains(cursor) => Some(idx),
            _ => None,
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// First cursor past the last record
    pub fn tail(&self) -> Cursor {
        self.last().end()
    }

    /// Total bytes of records still on disk
    pub fn live_bytes(&self) -> u64 {
        self.segments.iter().map(Segment::length).sum()
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tail() == self.seek(Cursor::HEAD)
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn infos(&self) -> Vec<SegmentInfo> {
        self.segments
            .iter()
            .map(|s| SegmentInfo {
                begin: s.begin(),
                length: s.length(),
                sealed: s.is_sealed(),
            })
            .collect()
    }

    /// Capacity of newly created segments
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn last(&self) -> &Segment {
        // The chain always holds at least one segment
        &self.segments[self.segments.len() - 1]
    }

    fn last_mut(&mut self) -> &mut Segment {
        let idx = self.segments.len() - 1;
        &mut self.segments[idx]
    }
}
