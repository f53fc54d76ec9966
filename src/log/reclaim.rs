//! Range Reclaimer
//!
//! Physically frees a dead cursor range by deleting, trimming and splitting
//! the segments that hold it. Live records are never rewritten at a new
//! cursor: a trimmed or split segment keeps the logical offsets of every
//! byte it retains.
//!
//! ```text
//!          begin                                   end
//!            │◄──────────── dead range ────────────►│
//!   ┌────────┼───────┐┌──────────────┐┌─────────────┼──────┐
//!   │  left  │xxxxxxx││xxxxxxxxxxxxxx││xxxxxxxxxxxxx│ right│
//!   └────────┴───────┘└──────────────┘└─────────────┴──────┘
//!     truncated          deleted          copied from `end`
//! ```

use crate::error::Result;

use super::segment::{Segment, Split};
use super::Cursor;

/// Reclaims dead ranges out of an ordered list of segments
#[derive(Debug, Clone, Copy)]
pub struct RangeReclaimer {
    /// Ranges shorter than this are not worth the I/O
    min_collect_length: u64,
}

impl RangeReclaimer {
    pub fn new(min_collect_length: u64) -> Self {
        Self { min_collect_length }
    }

    /// Reclaim `[begin, end)`, returning the number of bytes freed
    ///
    /// The range must be dead. Cursors outside every segment (already
    /// reclaimed space) are clamped to the nearest segment. The last
    /// segment is never removed and the tail never moves.
    pub fn collect(&self, segments: &mut Vec<Segment>, begin: Cursor, end: Cursor) -> Result<u64> {
        if begin >= end
            || segments.is_empty()
            || end.distance(begin) < self.min_collect_length
        {
            return Ok(0);
        }

        let first = Self::index_of(segments, begin);
        let second = Self::index_of(segments, end);

        let reclaimed = if first == second {
            Self::collect_within(segments, first, begin, end)?
        } else {
            Self::collect_spanning(segments, first, second, begin, end)?
        };

        tracing::debug!(
            begin = begin.offset(),
            end = end.offset(),
            reclaimed,
            segments = segments.len(),
            "reclaimed dead range"
        );

        Ok(reclaimed)
    }

    /// Last segment starting at or before `cursor`, clamped to the first
    fn index_of(segments: &[Segment], cursor: Cursor) -> usize {
        segments
            .partition_point(|s| s.begin() <= cursor)
            .saturating_sub(1)
    }

    /// Both ends fall into the same segment
    fn collect_within(
        segments: &mut Vec<Segment>,
        idx: usize,
        begin: Cursor,
        end: Cursor,
    ) -> Result<u64> {
        let is_last = idx + 1 == segments.len();
        let segment = &mut segments[idx];
        let b = begin.max(segment.begin());
        let e = end.min(segment.end());
        if b >= e {
            return Ok(0);
        }

        // Dead through the end of a sealed segment: nothing after `b` to keep
        if !is_last && end >= segment.end() {
            if !segment.left(b)? {
                segments.remove(idx);
            }
            return Ok(e.distance(b));
        }

        match segment.split(b, e)? {
            Split::Skipped => Ok(0),
            Split::Trimmed => Ok(e.distance(b)),
            Split::Split(suffix) => {
                segments.insert(idx + 1, suffix);
                Ok(e.distance(b))
            }
        }
    }

    /// The range starts in `first` and ends in `second`, `first < second`
    fn collect_spanning(
        segments: &mut Vec<Segment>,
        first: usize,
        second: usize,
        begin: Cursor,
        end: Cursor,
    ) -> Result<u64> {
        let mut reclaimed = 0;

        // Right part: keep the records of `second` from `end` on
        let mut drain_end = second;
        {
            let is_last = second + 1 == segments.len();
            let segment = &mut segments[second];
            if !is_last && end >= segment.end() {
                drain_end = second + 1;
            } else {
                let old_begin = segment.begin();
                let e = end.min(segment.end());
                if segment.right(e)? {
                    reclaimed += e.distance(old_begin);
                }
            }
        }

        // Between part: whole segments, dead by construction
        let doomed: Vec<Segment> = segments.drain(first + 1..drain_end).collect();
        for segment in doomed {
            reclaimed += segment.length();
            segment.clear()?;
        }

        // Left part: keep the records of `first` before `begin`
        let segment = &mut segments[first];
        let b = begin.max(segment.begin());
        reclaimed += segment.end().distance(b);
        if !segment.left(b)? {
            segments.remove(first);
        }

        Ok(reclaimed)
    }
}
