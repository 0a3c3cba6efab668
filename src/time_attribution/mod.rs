// Time Attribution for Background Task Traces
//
// Objective: Blame every second of a task's wall-clock time on the worker
// (waiting or executing) or on the external subsystem it delegated to
// (queued or executing), while accounting for periods where several of
// them are active at once.
//
// Pipeline: worker steps + external tasks -> blame periods (decompose)
// -> atomic timeline (timeline) -> absolute / absolute-blame /
// relative-blame tables (metrics). `TaskTrace` carries one run.

mod attribution;
mod decompose;
mod metrics;
mod timeline;

pub use attribution::{Attribution, AttributionError, TaskTrace};
pub use decompose::{decompose_step, sorted_phases, PhaseCursor};
pub use metrics::{blame_tables, AbsoluteTimes, MetricKind, MetricTable, Metrics, NeumaierSum};
pub use timeline::Timeline;

#[cfg(test)]
mod tests;
