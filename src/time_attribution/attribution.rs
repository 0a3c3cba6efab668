// Per-task attribution run
//
// Holds everything for one task in an explicit context and threads it through
// decomposition, timeline building and aggregation.

use super::decompose::{sorted_phases, PhaseCursor};
use super::metrics::{blame_tables, AbsoluteTimes, Metrics};
use super::timeline::Timeline;
use crate::model::{BlamePeriod, ExternalTask, WorkerStep};
use std::collections::BTreeMap;
use thiserror::Error;

/// Why a task could not be attributed
#[derive(Debug, Error, PartialEq)]
pub enum AttributionError {
    #[error("no worker step found for task {task}, nothing to blame")]
    NothingToAttribute { task: String },
}

/// Steps and external tasks of one task, grouped by owner
#[derive(Debug, Clone, Default)]
pub struct TaskTrace {
    task_id: String,
    steps: BTreeMap<String, Vec<WorkerStep>>,
    external: BTreeMap<String, Vec<ExternalTask>>,
}

impl TaskTrace {
    pub fn new(task_id: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            ..Self::default()
        }
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    pub fn add_step(&mut self, step: WorkerStep) {
        self.steps.entry(step.owner_id.clone()).or_default().push(step);
    }

    pub fn add_external_task(&mut self, task: ExternalTask) {
        self.external
            .entry(task.owner_id.clone())
            .or_default()
            .push(task);
    }

    pub fn step_count(&self) -> usize {
        self.steps.values().map(Vec::len).sum()
    }

    /// External tasks whose owner has at least one step
    pub fn linked_external_count(&self) -> usize {
        self.linked_external().map(|(_, tasks)| tasks.len()).sum()
    }

    /// External tasks of owners without any step (truncated traces)
    pub fn dangling_external_count(&self) -> usize {
        self.external
            .values()
            .map(Vec::len)
            .sum::<usize>()
            - self.linked_external_count()
    }

    fn linked_external(&self) -> impl Iterator<Item = (&String, &Vec<ExternalTask>)> + '_ {
        self.external
            .iter()
            .filter(|(owner, _)| self.steps.contains_key(owner.as_str()))
    }

    /// Run decomposition, timeline building and aggregation
    ///
    /// `now` (microseconds since epoch) closes the last atomic interval.
    ///
    /// # Example
    /// ```
    /// use taskblame::model::{Category, WorkerStep};
    /// use taskblame::time_attribution::TaskTrace;
    ///
    /// let mut trace = TaskTrace::new("task-1");
    /// trace.add_step(WorkerStep::new("1", 0, 5_000_000, 5.0, 5.0).unwrap());
    ///
    /// let result = trace.attribute(5_000_000).unwrap();
    /// assert_eq!(result.metrics.relative_blame.get(Category::WorkerExec), 5.0);
    /// ```
    pub fn attribute(&self, now: i64) -> Result<Attribution, AttributionError> {
        if self.steps.is_empty() {
            return Err(AttributionError::NothingToAttribute {
                task: self.task_id.clone(),
            });
        }

        let mut absolute = AbsoluteTimes::new();
        let mut timestamps = Vec::new();
        let mut periods = Vec::new();

        for (owner, steps) in &self.steps {
            let mut steps: Vec<&WorkerStep> = steps.iter().collect();
            steps.sort_by(|a, b| {
                (a.start, a.end)
                    .cmp(&(b.start, b.end))
                    .then(a.real_duration.total_cmp(&b.real_duration))
                    .then(a.exec_duration.total_cmp(&b.exec_duration))
            });

            let tasks = self.external.get(owner).map(Vec::as_slice).unwrap_or(&[]);
            let mut ordered: Vec<&ExternalTask> = tasks.iter().collect();
            ordered.sort_by_key(|t| (t.created, t.started, t.finished, t.subsystem));
            for task in ordered {
                absolute.record_external(task);
                timestamps.extend([task.created, task.started, task.finished]);
            }

            let phases = sorted_phases(tasks);
            let mut cursor = PhaseCursor::new(&phases);
            for step in steps {
                absolute.record_step(step);
                timestamps.extend([step.start, step.end]);
                cursor.decompose(step, &mut periods);
            }
            if !cursor.remaining().is_empty() {
                tracing::debug!(
                    owner = owner.as_str(),
                    phases = cursor.remaining().len(),
                    "external phases outside every step of their owner"
                );
            }
        }

        let dangling = self.dangling_external_count();
        if dangling > 0 {
            tracing::debug!(dangling, "ignoring external tasks without a matching step");
        }

        // canonical order keeps every float sum independent of input order
        periods.sort_by(|a, b| {
            (a.start, a.duration, a.category)
                .cmp(&(b.start, b.duration, b.category))
                .then(a.weight.total_cmp(&b.weight))
        });

        let mut timeline = Timeline::new(timestamps, now);
        for period in &periods {
            timeline.accumulate(period);
        }
        tracing::debug!(
            periods = periods.len(),
            slices = timeline.len(),
            blamed = timeline.blamed().count(),
            "built blame timeline"
        );

        let (absolute_blame, relative_blame) = blame_tables(&timeline);

        Ok(Attribution {
            task_id: self.task_id.clone(),
            metrics: Metrics {
                absolute: absolute.finish(),
                absolute_blame,
                relative_blame,
            },
            periods,
            timeline,
        })
    }
}

/// Outcome of one attribution run
#[derive(Debug, Clone)]
pub struct Attribution {
    pub task_id: String,
    pub metrics: Metrics,
    /// Blame periods in canonical order
    pub periods: Vec<BlamePeriod>,
    pub timeline: Timeline,
}

impl Attribution {
    /// Wall time covered by at least one blame period, in seconds
    pub fn blamed_seconds(&self) -> f64 {
        crate::model::micros_to_secs(self.timeline.blamed_micros())
    }
}
