//! Sorted interval set tracking which byte ranges are cached.

use std::ops::Range;

/// A coalescing set of disjoint byte ranges.
///
/// Runs are kept sorted, disjoint, and non-adjacent, so lookups can
/// binary-search and a gap between two runs is always a real gap.
#[derive(Debug, Default, Clone)]
pub struct ExtentSet {
    runs: Vec<Range<u64>>,
}

impl ExtentSet {
    /// Create an empty set.
    pub fn new() -> ExtentSet {
        ExtentSet::default()
    }

    /// Number of disjoint runs.
    pub fn run_count(&self) -> usize {
        self.runs.len()
    }

    /// Insert `range`, merging with overlapping or adjacent runs.
    pub fn insert(&mut self, range: Range<u64>) {
        if range.start >= range.end {
            return;
        }
        // First run that could merge: its end touches or passes the new
        // start. Everything from there while starts stay inside the new
        // range collapses into one run.
        let first = self.runs.partition_point(|r| r.end < range.start);
        let mut start = range.start;
        let mut end = range.end;
        let mut last = first;
        while last < self.runs.len() && self.runs[last].start <= end {
            start = start.min(self.runs[last].start);
            end = end.max(self.runs[last].end);
            last += 1;
        }
        self.runs.splice(first..last, [start..end]);
    }

    /// Whether every byte of `range` is present. Empty ranges are
    /// trivially covered.
    pub fn covers(&self, range: &Range<u64>) -> bool {
        if range.start >= range.end {
            return true;
        }
        let i = self.runs.partition_point(|r| r.end <= range.start);
        match self.runs.get(i) {
            Some(run) => run.start <= range.start && range.end <= run.end,
            None => false,
        }
    }

    /// The span from the first to the last missing byte inside `window`,
    /// or `None` when the window is fully covered.
    ///
    /// Interior runs between the two endpoints are ignored: the caller
    /// gets one contiguous range to refill, matching the single-range
    /// miss report of the store.
    pub fn uncovered_in(&self, window: &Range<u64>) -> Option<Range<u64>> {
        if window.start >= window.end {
            return None;
        }

        // Run covering the window start, if any, pushes the first
        // missing byte to its end.
        let i = self.runs.partition_point(|r| r.end <= window.start);
        let first = match self.runs.get(i) {
            Some(run) if run.start <= window.start => run.end,
            _ => window.start,
        };
        if first >= window.end {
            return None;
        }

        // Run covering the last window byte pulls the missing span's end
        // back to its start.
        let j = self.runs.partition_point(|r| r.start < window.end);
        let end = match j.checked_sub(1).map(|j| &self.runs[j]) {
            Some(run) if run.end >= window.end => run.start,
            _ => window.end,
        };

        Some(first..end)
    }
}
