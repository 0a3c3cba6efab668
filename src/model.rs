//! Interval model for task time attribution
//!
//! Passive data produced by the trace parser and consumed by
//! [`crate::time_attribution`]. Timestamps are microseconds since the Unix
//! epoch so that interval boundaries compare exactly; step durations stay in
//! seconds as exported.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Microseconds in one second
pub const MICROS_PER_SEC: f64 = 1_000_000.0;

/// Convert a microsecond span to seconds
pub fn micros_to_secs(micros: i64) -> f64 {
    micros as f64 / MICROS_PER_SEC
}

/// Invariant violations rejected by the validating constructors
#[derive(Debug, Error, PartialEq)]
pub enum ModelError {
    #[error("step ends at {end} before it starts at {start}")]
    StepEndsBeforeStart { start: i64, end: i64 },

    #[error("step durations must satisfy real >= exec >= 0 (real={real}, exec={exec})")]
    InvalidDurations { real: f64, exec: f64 },

    #[error("external task timestamps must satisfy created <= started <= finished ({created}, {started}, {finished})")]
    UnorderedTimestamps {
        created: i64,
        started: i64,
        finished: i64,
    },
}

/// External subsystem a worker step delegates to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Subsystem {
    /// Content subsystem (pulp tasks)
    #[serde(rename = "extA")]
    ExtA,
    /// Entitlement subsystem (candlepin jobs)
    #[serde(rename = "extB")]
    ExtB,
}

impl Subsystem {
    pub fn wait_category(self) -> Category {
        match self {
            Subsystem::ExtA => Category::ExtAWait,
            Subsystem::ExtB => Category::ExtBWait,
        }
    }

    pub fn exec_category(self) -> Category {
        match self {
            Subsystem::ExtA => Category::ExtAExec,
            Subsystem::ExtB => Category::ExtBExec,
        }
    }
}

/// Who is blamed for a span of wall-clock time
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Category {
    #[serde(rename = "worker-wait")]
    WorkerWait,
    #[serde(rename = "worker-exec")]
    WorkerExec,
    #[serde(rename = "extA-wait")]
    ExtAWait,
    #[serde(rename = "extA-exec")]
    ExtAExec,
    #[serde(rename = "extB-wait")]
    ExtBWait,
    #[serde(rename = "extB-exec")]
    ExtBExec,
}

impl Category {
    /// All categories in report order
    pub const ALL: [Category; 6] = [
        Category::WorkerWait,
        Category::WorkerExec,
        Category::ExtAWait,
        Category::ExtAExec,
        Category::ExtBWait,
        Category::ExtBExec,
    ];

    /// Dense index into [`Category::ALL`]
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn label(self) -> &'static str {
        match self {
            Category::WorkerWait => "worker-wait",
            Category::WorkerExec => "worker-exec",
            Category::ExtAWait => "extA-wait",
            Category::ExtAExec => "extA-exec",
            Category::ExtBWait => "extB-wait",
            Category::ExtBExec => "extB-exec",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One span of worker execution
///
/// `real_duration` is the elapsed time the worker held the step,
/// `exec_duration` the part of it spent genuinely executing.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerStep {
    pub owner_id: String,
    pub start: i64,
    pub end: i64,
    pub real_duration: f64,
    pub exec_duration: f64,
}

impl WorkerStep {
    /// Build a step, enforcing `end >= start` and `real >= exec >= 0`
    pub fn new(
        owner_id: impl Into<String>,
        start: i64,
        end: i64,
        real_duration: f64,
        exec_duration: f64,
    ) -> Result<Self, ModelError> {
        if end < start {
            return Err(ModelError::StepEndsBeforeStart { start, end });
        }
        // NaN fails every comparison, so it lands here too
        if !(exec_duration >= 0.0 && real_duration >= exec_duration) {
            return Err(ModelError::InvalidDurations {
                real: real_duration,
                exec: exec_duration,
            });
        }
        Ok(Self {
            owner_id: owner_id.into(),
            start,
            end,
            real_duration,
            exec_duration,
        })
    }

    /// True when the worker never waited during this step
    pub fn is_zero_wait(&self) -> bool {
        self.exec_duration == self.real_duration
    }

    /// Share of wall time that was genuine worker execution
    pub fn exec_ratio(&self) -> f64 {
        if self.real_duration == 0.0 {
            1.0
        } else {
            self.exec_duration / self.real_duration
        }
    }
}

/// A sub-task delegated to an external subsystem
#[derive(Debug, Clone, PartialEq)]
pub struct ExternalTask {
    pub owner_id: String,
    pub subsystem: Subsystem,
    pub created: i64,
    pub started: i64,
    pub finished: i64,
}

impl ExternalTask {
    /// Build an external task, enforcing `created <= started <= finished`
    pub fn new(
        owner_id: impl Into<String>,
        subsystem: Subsystem,
        created: i64,
        started: i64,
        finished: i64,
    ) -> Result<Self, ModelError> {
        if !(created <= started && started <= finished) {
            return Err(ModelError::UnorderedTimestamps {
                created,
                started,
                finished,
            });
        }
        Ok(Self {
            owner_id: owner_id.into(),
            subsystem,
            created,
            started,
            finished,
        })
    }

    pub fn wait_micros(&self) -> i64 {
        self.started - self.created
    }

    pub fn exec_micros(&self) -> i64 {
        self.finished - self.started
    }

    /// The queued and the executing phase, in time order
    pub fn phases(&self) -> [ExternalPhase; 2] {
        [
            ExternalPhase {
                start: self.created,
                end: self.started,
                category: self.subsystem.wait_category(),
            },
            ExternalPhase {
                start: self.started,
                end: self.finished,
                category: self.subsystem.exec_category(),
            },
        ]
    }
}

/// One phase (queued or executing) of an external task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExternalPhase {
    pub start: i64,
    pub end: i64,
    pub category: Category,
}

/// Weighted assertion that `category` is responsible for `[start, start + duration)`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlamePeriod {
    pub start: i64,
    pub duration: i64,
    pub category: Category,
    pub weight: f64,
}

impl BlamePeriod {
    pub fn end(&self) -> i64 {
        self.start + self.duration
    }
}

/// Non-subdividable slice of the trace timeline
#[derive(Debug, Clone, PartialEq)]
pub struct AtomicInterval {
    pub start: i64,
    pub duration: i64,
    /// Accumulated weight per category, indexed by [`Category::index`]
    pub weights: [f64; 6],
    /// Number of blame periods touching this slice
    pub overlap_count: u32,
}

impl AtomicInterval {
    pub fn new(start: i64, duration: i64) -> Self {
        Self {
            start,
            duration,
            weights: [0.0; 6],
            overlap_count: 0,
        }
    }

    pub fn weight(&self, category: Category) -> f64 {
        self.weights[category.index()]
    }

    pub fn is_blamed(&self) -> bool {
        self.overlap_count > 0
    }
}
