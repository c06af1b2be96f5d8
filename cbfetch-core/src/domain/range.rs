//! Half-open time ranges and the interval arithmetic behind cache gaps.

use super::granularity::Granularity;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Half-open range `[start, end)` of unix seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: i64,
    pub end: i64,
}

impl TimeRange {
    pub const fn new(start: i64, end: i64) -> Self {
        Self { start, end }
    }

    /// Round outward to bucket boundaries.
    pub fn aligned(self, granularity: Granularity) -> Self {
        Self {
            start: granularity.floor(self.start),
            end: granularity.ceil(self.end),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    pub fn len_seconds(&self) -> i64 {
        (self.end - self.start).max(0)
    }

    pub fn contains(&self, ts: i64) -> bool {
        self.start <= ts && ts < self.end
    }

    /// Split into consecutive chunks no wider than `max_width` seconds.
    pub fn split(self, max_width: i64) -> Vec<TimeRange> {
        debug_assert!(max_width > 0);
        let mut chunks = Vec::new();
        let mut cursor = self.start;
        while cursor < self.end {
            let end = (cursor + max_width).min(self.end);
            chunks.push(TimeRange::new(cursor, end));
            cursor = end;
        }
        chunks
    }

    pub fn start_datetime(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.start, 0)
    }

    pub fn end_datetime(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.end, 0)
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.start_datetime(), self.end_datetime()) {
            (Some(s), Some(e)) => write!(f, "[{}, {})", s.to_rfc3339(), e.to_rfc3339()),
            _ => write!(f, "[{}, {})", self.start, self.end),
        }
    }
}

/// Insert `range` into a sorted, disjoint list, coalescing overlapping and
/// touching neighbours.
pub fn insert_coalesced(ranges: &mut Vec<TimeRange>, range: TimeRange) {
    if range.is_empty() {
        return;
    }
    let mut merged = range;
    let mut out = Vec::with_capacity(ranges.len() + 1);
    let mut placed = false;

    for r in ranges.drain(..) {
        if r.end < merged.start {
            out.push(r);
        } else if merged.end < r.start {
            if !placed {
                out.push(merged);
                placed = true;
            }
            out.push(r);
        } else {
            merged.start = merged.start.min(r.start);
            merged.end = merged.end.max(r.end);
        }
    }
    if !placed {
        out.push(merged);
    }
    *ranges = out;
}

/// Parts of `wanted` not covered by `covered` (sorted, disjoint).
pub fn subtract(wanted: TimeRange, covered: &[TimeRange]) -> Vec<TimeRange> {
    let mut gaps = Vec::new();
    let mut cursor = wanted.start;

    for c in covered {
        if c.end <= cursor {
            continue;
        }
        if c.start >= wanted.end {
            break;
        }
        if c.start > cursor {
            gaps.push(TimeRange::new(cursor, c.start));
        }
        cursor = cursor.max(c.end);
        if cursor >= wanted.end {
            break;
        }
    }
    if cursor < wanted.end {
        gaps.push(TimeRange::new(cursor, wanted.end));
    }
    gaps
}
