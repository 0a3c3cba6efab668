// Metric aggregation: absolute, absolute-blame and relative-blame tables
//
// All sums go through Neumaier compensated summation so long traces made of
// many tiny slices do not drift.

use super::timeline::Timeline;
use crate::model::{micros_to_secs, Category, ExternalTask, WorkerStep};
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::fmt;

/// Compensated (Neumaier) running sum
#[derive(Debug, Clone, Copy, Default)]
pub struct NeumaierSum {
    sum: f64,
    compensation: f64,
}

impl NeumaierSum {
    pub fn add(&mut self, value: f64) {
        let t = self.sum + value;
        if self.sum.abs() >= value.abs() {
            self.compensation += (self.sum - t) + value;
        } else {
            self.compensation += (value - t) + self.sum;
        }
        self.sum = t;
    }

    pub fn value(&self) -> f64 {
        self.sum + self.compensation
    }
}

/// Seconds attributed to each category under one policy
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricTable {
    values: [f64; 6],
}

impl MetricTable {
    pub fn get(&self, category: Category) -> f64 {
        self.values[category.index()]
    }

    /// Sum over all categories
    pub fn total(&self) -> f64 {
        let mut sum = NeumaierSum::default();
        for value in self.values {
            sum.add(value);
        }
        sum.value()
    }

    /// Categories with their values, in report order
    pub fn iter(&self) -> impl Iterator<Item = (Category, f64)> + '_ {
        Category::ALL.iter().map(move |&c| (c, self.get(c)))
    }

    fn from_sums(sums: &[NeumaierSum; 6]) -> Self {
        let mut values = [0.0; 6];
        for (value, sum) in values.iter_mut().zip(sums) {
            *value = sum.value();
        }
        Self { values }
    }
}

impl Serialize for MetricTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (category, value) in self.iter() {
            map.serialize_entry(category.label(), &value)?;
        }
        map.end()
    }
}

/// The three attribution policies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricKind {
    /// Plain sums, blind to concurrency; worker-wait may go negative
    Absolute,
    /// Every concurrent category credited in full
    AbsoluteBlame,
    /// Credits divided by the number of overlapping blame periods
    RelativeBlame,
}

impl MetricKind {
    pub const ALL: [MetricKind; 3] = [
        MetricKind::Absolute,
        MetricKind::AbsoluteBlame,
        MetricKind::RelativeBlame,
    ];

    pub fn name(self) -> &'static str {
        match self {
            MetricKind::Absolute => "absolute",
            MetricKind::AbsoluteBlame => "absolute-blame",
            MetricKind::RelativeBlame => "relative-blame",
        }
    }

    /// Row caption used by the text report
    pub fn description(self) -> &'static str {
        match self {
            MetricKind::Absolute => "absolute times",
            MetricKind::AbsoluteBlame => "abs.blame times",
            MetricKind::RelativeBlame => "relative blame times",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// All three tables for one task
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metrics {
    pub absolute: MetricTable,
    pub absolute_blame: MetricTable,
    pub relative_blame: MetricTable,
}

impl Metrics {
    pub fn table(&self, kind: MetricKind) -> &MetricTable {
        match kind {
            MetricKind::Absolute => &self.absolute,
            MetricKind::AbsoluteBlame => &self.absolute_blame,
            MetricKind::RelativeBlame => &self.relative_blame,
        }
    }
}

/// Running totals for the concurrency-blind absolute metric
#[derive(Debug, Clone, Default)]
pub struct AbsoluteTimes {
    sums: [NeumaierSum; 6],
}

impl AbsoluteTimes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_step(&mut self, step: &WorkerStep) {
        self.add(Category::WorkerExec, step.exec_duration);
        self.add(Category::WorkerWait, step.real_duration - step.exec_duration);
    }

    /// Credit the subsystem and take the same span back from worker-wait,
    /// where the owning step already counted it
    pub fn record_external(&mut self, task: &ExternalTask) {
        self.add(task.subsystem.wait_category(), micros_to_secs(task.wait_micros()));
        self.add(task.subsystem.exec_category(), micros_to_secs(task.exec_micros()));
        self.add(
            Category::WorkerWait,
            -micros_to_secs(task.finished - task.created),
        );
    }

    pub fn finish(&self) -> MetricTable {
        MetricTable::from_sums(&self.sums)
    }

    fn add(&mut self, category: Category, seconds: f64) {
        self.sums[category.index()].add(seconds);
    }
}

/// Fold blamed slices into the absolute-blame and relative-blame tables
pub fn blame_tables(timeline: &Timeline) -> (MetricTable, MetricTable) {
    let mut absolute = [NeumaierSum::default(); 6];
    let mut relative = [NeumaierSum::default(); 6];

    for interval in timeline.blamed() {
        let seconds = micros_to_secs(interval.duration);
        let concurrency = f64::from(interval.overlap_count);
        for category in Category::ALL {
            let credit = seconds * interval.weight(category);
            absolute[category.index()].add(credit);
            relative[category.index()].add(credit / concurrency);
        }
    }

    (MetricTable::from_sums(&absolute), MetricTable::from_sums(&relative))
}
