//! Half-open UTC intervals and the merge step behind every busy list.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A half-open interval `[start, end)` in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Interval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Interval {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    pub fn duration_minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }

    pub fn overlaps(&self, other: &Interval) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Intersection with `[window_start, window_end)`; `None` for an
    /// unbounded end. Returns `None` when nothing of positive length remains.
    pub fn clip(
        &self,
        window_start: DateTime<Utc>,
        window_end: Option<DateTime<Utc>>,
    ) -> Option<Interval> {
        let start = self.start.max(window_start);
        let end = match window_end {
            Some(we) => self.end.min(we),
            None => self.end,
        };
        (start < end).then_some(Interval { start, end })
    }
}

/// Sort and coalesce intervals. Touching intervals (`next.start <= last.end`)
/// are joined; empty intervals are dropped.
pub fn merge(mut intervals: Vec<Interval>) -> Vec<Interval> {
    intervals.retain(|i| !i.is_empty());
    intervals.sort_by_key(|i| (i.start, i.end));

    let mut merged: Vec<Interval> = Vec::with_capacity(intervals.len());
    for interval in intervals {
        if let Some(last) = merged.last_mut() {
            if interval.start <= last.end {
                last.end = last.end.max(interval.end);
                continue;
            }
        }
        merged.push(interval);
    }
    merged
}

/// Remove `holes` from `base`. Both inputs must be merged lists.
pub fn subtract(base: &[Interval], holes: &[Interval]) -> Vec<Interval> {
    let mut out = Vec::new();
    for b in base {
        let mut cursor = b.start;
        for h in holes.iter().filter(|h| h.overlaps(b)) {
            if h.start > cursor {
                out.push(Interval::new(cursor, h.start));
            }
            cursor = cursor.max(h.end);
        }
        if cursor < b.end {
            out.push(Interval::new(cursor, b.end));
        }
    }
    out
}
