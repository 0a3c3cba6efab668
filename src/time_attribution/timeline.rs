// Atomic timeline: every distinct trace timestamp opens a slice
//
// Blame periods are folded into the slices they touch; each touch adds the
// period weight to its category and bumps the slice overlap count once.

use crate::model::{AtomicInterval, BlamePeriod};
use std::ops::Range;

/// Sorted, gap-free sequence of atomic intervals
#[derive(Debug, Clone, PartialEq)]
pub struct Timeline {
    intervals: Vec<AtomicInterval>,
}

impl Timeline {
    /// Build the slices induced by `timestamps`
    ///
    /// Duplicates collapse; the slice opened by the greatest timestamp runs
    /// until `now` (zero-length if `now` is not later).
    pub fn new(timestamps: impl IntoIterator<Item = i64>, now: i64) -> Self {
        let mut points: Vec<i64> = timestamps.into_iter().collect();
        points.sort_unstable();
        points.dedup();

        let mut intervals = Vec::with_capacity(points.len());
        for (i, &start) in points.iter().enumerate() {
            let end = points.get(i + 1).copied().unwrap_or_else(|| now.max(start));
            intervals.push(AtomicInterval::new(start, end - start));
        }

        Self { intervals }
    }

    pub fn intervals(&self) -> &[AtomicInterval] {
        &self.intervals
    }

    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    /// Slices touched by at least one blame period
    pub fn blamed(&self) -> impl Iterator<Item = &AtomicInterval> + '_ {
        self.intervals.iter().filter(|i| i.is_blamed())
    }

    /// Total length of all blamed slices, in microseconds
    pub fn blamed_micros(&self) -> i64 {
        self.blamed().map(|i| i.duration).sum()
    }

    /// Indices of the slices overlapping `[start, end)`
    pub fn touching(&self, start: i64, end: i64) -> Range<usize> {
        if end <= start {
            return 0..0;
        }
        // first slice whose span contains start
        let mut first = self
            .intervals
            .partition_point(|i| i.start <= start)
            .saturating_sub(1);
        if let Some(interval) = self.intervals.get(first) {
            if interval.start + interval.duration <= start {
                first += 1;
            }
        }
        let last = self.intervals.partition_point(|i| i.start < end);
        first..last.max(first)
    }

    /// Fold one blame period into every slice it spans
    ///
    /// A period ending inside a slice still counts for that whole slice.
    pub fn accumulate(&mut self, period: &BlamePeriod) {
        let range = self.touching(period.start, period.end());
        for interval in &mut self.intervals[range] {
            interval.weights[period.category.index()] += period.weight;
            interval.overlap_count += 1;
        }
    }
}
