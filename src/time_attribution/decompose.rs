// Step decomposition: one worker step -> weighted blame periods
//
// Every stretch of a step not covered by an external phase is split between
// worker-wait and worker-exec using the step's overall exec/real ratio; every
// external phase is blamed on its subsystem with the worker's exec share
// running alongside it.

use crate::model::{BlamePeriod, Category, ExternalPhase, ExternalTask, WorkerStep};

/// Sort the phases of `tasks` by start time
pub fn sorted_phases(tasks: &[ExternalTask]) -> Vec<ExternalPhase> {
    let mut phases: Vec<ExternalPhase> = tasks.iter().flat_map(|t| t.phases()).collect();
    phases.sort_by_key(|p| (p.start, p.end, p.category));
    phases
}

/// Read position over one owner's sorted external phases
///
/// Shared by all steps of the owner: a phase handed to one step is never
/// offered to a later one.
#[derive(Debug)]
pub struct PhaseCursor<'a> {
    phases: &'a [ExternalPhase],
    next: usize,
}

impl<'a> PhaseCursor<'a> {
    pub fn new(phases: &'a [ExternalPhase]) -> Self {
        Self { phases, next: 0 }
    }

    /// Phases not yet handed to any step
    pub fn remaining(&self) -> &'a [ExternalPhase] {
        &self.phases[self.next..]
    }

    /// Append the blame periods of `step` to `out`
    pub fn decompose(&mut self, step: &WorkerStep, out: &mut Vec<BlamePeriod>) {
        if step.is_zero_wait() {
            push(out, step.start, step.end, Category::WorkerExec, 1.0);
            return;
        }

        let ratio = step.exec_ratio();
        let mut t = step.start;

        while let Some(phase) = self.phases.get(self.next) {
            if phase.start >= step.end {
                break;
            }
            if t < phase.start {
                push_gap(out, t, phase.start, ratio);
            }
            push(out, phase.start, phase.end, phase.category, 1.0);
            push(out, phase.start, phase.end, Category::WorkerExec, ratio);
            // a phase nested in an earlier one reopens the gap after it ends
            t = phase.end;
            self.next += 1;
        }

        if t < step.end {
            push_gap(out, t, step.end, ratio);
        }
    }
}

/// Decompose a single step against the external tasks of its owner
///
/// # Example
/// ```
/// use taskblame::model::{Category, ExternalTask, Subsystem, WorkerStep};
/// use taskblame::time_attribution::decompose_step;
///
/// let step = WorkerStep::new("42", 0, 10, 10.0, 10.0).unwrap();
/// let periods = decompose_step(&step, &[]);
/// assert_eq!(periods.len(), 1);
/// assert_eq!(periods[0].category, Category::WorkerExec);
/// ```
pub fn decompose_step(step: &WorkerStep, tasks: &[ExternalTask]) -> Vec<BlamePeriod> {
    let phases = sorted_phases(tasks);
    let mut cursor = PhaseCursor::new(&phases);
    let mut out = Vec::new();
    cursor.decompose(step, &mut out);
    out
}

fn push_gap(out: &mut Vec<BlamePeriod>, start: i64, end: i64, ratio: f64) {
    push(out, start, end, Category::WorkerWait, 1.0 - ratio);
    push(out, start, end, Category::WorkerExec, ratio);
}

fn push(out: &mut Vec<BlamePeriod>, start: i64, end: i64, category: Category, weight: f64) {
    // empty spans can never touch an atomic interval
    if end > start {
        out.push(BlamePeriod {
            start,
            duration: end - start,
            category,
            weight,
        });
    }
}
