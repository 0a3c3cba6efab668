// Cross-stage attribution scenarios
//
// Realistic task shapes: a step waiting on one content task, steps fanning
// out to both subsystems, concurrent owners and truncated traces.

use super::*;
use crate::model::{Category, ExternalTask, Subsystem, WorkerStep};

const SEC: i64 = 1_000_000;

fn step(owner: &str, start: i64, end: i64, real: f64, exec: f64) -> WorkerStep {
    WorkerStep::new(owner, start * SEC, end * SEC, real, exec).unwrap()
}

fn ext(owner: &str, subsystem: Subsystem, created: i64, started: i64, finished: i64) -> ExternalTask {
    ExternalTask::new(owner, subsystem, created * SEC, started * SEC, finished * SEC).unwrap()
}

fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-9,
        "expected {}, got {}",
        expected,
        actual
    );
}

/// One step (r = 0.4) waiting on a single content task
fn scenario_a() -> TaskTrace {
    let mut trace = TaskTrace::new("scenario-a");
    trace.add_step(step("1", 0, 10, 10.0, 4.0));
    trace.add_external_task(ext("1", Subsystem::ExtA, 2, 3, 7));
    trace
}

#[test]
fn test_scenario_a_absolute_blame() {
    let result = scenario_a().attribute(10 * SEC).unwrap();
    let table = &result.metrics.absolute_blame;

    assert_close(table.get(Category::WorkerWait), 3.0);
    assert_close(table.get(Category::WorkerExec), 4.0);
    assert_close(table.get(Category::ExtAWait), 1.0);
    assert_close(table.get(Category::ExtAExec), 4.0);
    assert_close(table.get(Category::ExtBWait), 0.0);
    assert_close(table.get(Category::ExtBExec), 0.0);
}

#[test]
fn test_scenario_a_relative_blame() {
    let result = scenario_a().attribute(10 * SEC).unwrap();
    let table = &result.metrics.relative_blame;

    // every blamed slice carries exactly two periods
    assert_close(table.get(Category::WorkerWait), 1.5);
    assert_close(table.get(Category::WorkerExec), 2.0);
    assert_close(table.get(Category::ExtAWait), 0.5);
    assert_close(table.get(Category::ExtAExec), 2.0);
    assert!(result.timeline.blamed().all(|i| i.overlap_count == 2));
}

#[test]
fn test_scenario_a_absolute() {
    let result = scenario_a().attribute(10 * SEC).unwrap();
    let table = &result.metrics.absolute;

    assert_close(table.get(Category::WorkerExec), 4.0);
    assert_close(table.get(Category::WorkerWait), 1.0);
    assert_close(table.get(Category::ExtAWait), 1.0);
    assert_close(table.get(Category::ExtAExec), 4.0);
}

#[test]
fn test_scenario_a_periods() {
    let result = scenario_a().attribute(10 * SEC).unwrap();
    assert_eq!(result.periods.len(), 8);
    assert_eq!(result.blamed_seconds(), 10.0);
}

#[test]
fn test_scenario_b_pure_execution() {
    let mut trace = TaskTrace::new("scenario-b");
    trace.add_step(step("1", 0, 5, 5.0, 5.0));

    let result = trace.attribute(5 * SEC).unwrap();
    for kind in MetricKind::ALL {
        let table = result.metrics.table(kind);
        assert_close(table.get(Category::WorkerExec), 5.0);
        for category in Category::ALL {
            if category != Category::WorkerExec {
                assert_eq!(table.get(category), 0.0, "{} {}", kind, category);
            }
        }
    }
}

#[test]
fn test_empty_trace_has_nothing_to_attribute() {
    let mut trace = TaskTrace::new("empty");
    trace.add_external_task(ext("1", Subsystem::ExtA, 0, 1, 2));

    let err = trace.attribute(10 * SEC).unwrap_err();
    assert_eq!(
        err,
        AttributionError::NothingToAttribute {
            task: "empty".to_string()
        }
    );
    assert!(err.to_string().contains("nothing to blame"));
}

#[test]
fn test_dangling_external_task_is_ignored() {
    let mut with_dangling = scenario_a();
    with_dangling.add_external_task(ext("99", Subsystem::ExtB, 0, 50, 100));
    assert_eq!(with_dangling.dangling_external_count(), 1);
    assert_eq!(with_dangling.linked_external_count(), 1);

    let plain = scenario_a().attribute(10 * SEC).unwrap();
    let dangling = with_dangling.attribute(10 * SEC).unwrap();
    assert_eq!(plain.metrics, dangling.metrics);
}

#[test]
fn test_fan_out_to_both_subsystems() {
    // r = 0.5; content task then entitlement task inside one step
    let mut trace = TaskTrace::new("fan-out");
    trace.add_step(step("1", 0, 20, 20.0, 10.0));
    trace.add_external_task(ext("1", Subsystem::ExtA, 2, 4, 8));
    trace.add_external_task(ext("1", Subsystem::ExtB, 10, 12, 15));

    let result = trace.attribute(20 * SEC).unwrap();
    let blame = &result.metrics.absolute_blame;

    // the worker's exec share spans the whole step
    assert_close(blame.get(Category::WorkerExec), 10.0);
    // gaps [0,2) [8,10) [15,20) at weight 0.5
    assert_close(blame.get(Category::WorkerWait), 4.5);
    assert_close(blame.get(Category::ExtAWait), 2.0);
    assert_close(blame.get(Category::ExtAExec), 4.0);
    assert_close(blame.get(Category::ExtBWait), 2.0);
    assert_close(blame.get(Category::ExtBExec), 3.0);
}

#[test]
fn test_nested_content_tasks_reopen_worker_gap() {
    // r = 0.5; a short content task runs inside a long one
    let mut trace = TaskTrace::new("nested");
    trace.add_step(step("1", 0, 10, 10.0, 5.0));
    trace.add_external_task(ext("1", Subsystem::ExtA, 1, 1, 9));
    trace.add_external_task(ext("1", Subsystem::ExtA, 2, 3, 4));

    let result = trace.attribute(10 * SEC).unwrap();
    let blame = &result.metrics.absolute_blame;

    // gaps [0,1) and [4,10) at weight 0.5
    assert_close(blame.get(Category::WorkerWait), 3.5);
    assert_close(blame.get(Category::WorkerExec), 8.5);
    assert_close(blame.get(Category::ExtAWait), 1.0);
    assert_close(blame.get(Category::ExtAExec), 9.0);
}

#[test]
fn test_worker_exec_blame_matches_exec_duration() {
    let mut trace = TaskTrace::new("exec-check");
    trace.add_step(step("1", 0, 30, 30.0, 6.0));
    trace.add_external_task(ext("1", Subsystem::ExtA, 1, 5, 9));
    trace.add_external_task(ext("1", Subsystem::ExtA, 12, 12, 20));
    trace.add_external_task(ext("1", Subsystem::ExtB, 21, 25, 28));

    let result = trace.attribute(30 * SEC).unwrap();
    assert_close(result.metrics.absolute_blame.get(Category::WorkerExec), 6.0);
}

#[test]
fn test_concurrent_owners_split_relative_blame() {
    let mut trace = TaskTrace::new("concurrent");
    trace.add_step(step("1", 0, 10, 10.0, 10.0));
    trace.add_step(step("2", 0, 10, 10.0, 10.0));

    let result = trace.attribute(10 * SEC).unwrap();
    assert_close(result.metrics.absolute_blame.get(Category::WorkerExec), 20.0);
    assert_close(result.metrics.relative_blame.get(Category::WorkerExec), 10.0);
    assert_close(result.metrics.relative_blame.total(), result.blamed_seconds());
}

#[test]
fn test_partially_overlapping_owners() {
    let mut trace = TaskTrace::new("staggered");
    trace.add_step(step("1", 0, 10, 10.0, 10.0));
    trace.add_step(step("2", 5, 15, 10.0, 10.0));

    let result = trace.attribute(15 * SEC).unwrap();
    // [0,5) alone, [5,10) shared, [10,15) alone
    assert_close(result.metrics.relative_blame.get(Category::WorkerExec), 15.0);
    assert_close(result.metrics.absolute_blame.get(Category::WorkerExec), 20.0);
    assert_close(result.blamed_seconds(), 15.0);
}

#[test]
fn test_gap_between_steps_is_not_blamed() {
    let mut trace = TaskTrace::new("gap");
    trace.add_step(step("1", 0, 5, 5.0, 5.0));
    trace.add_step(step("1", 20, 25, 5.0, 5.0));

    let result = trace.attribute(100 * SEC).unwrap();
    assert_close(result.blamed_seconds(), 10.0);
    assert_close(result.metrics.relative_blame.total(), 10.0);
}

#[test]
fn test_task_consumed_by_first_matching_step_only() {
    let mut trace = TaskTrace::new("two-steps");
    trace.add_step(step("1", 20, 30, 10.0, 5.0));
    trace.add_step(step("1", 0, 10, 10.0, 5.0));
    trace.add_external_task(ext("1", Subsystem::ExtA, 2, 3, 6));

    let result = trace.attribute(30 * SEC).unwrap();
    let ext_periods: Vec<_> = result
        .periods
        .iter()
        .filter(|p| p.category == Category::ExtAExec)
        .collect();
    assert_eq!(ext_periods.len(), 1);
    assert_eq!(ext_periods[0].start, 3 * SEC);
}

#[test]
fn test_repeated_runs_are_identical() {
    let trace = scenario_a();
    let first = trace.attribute(10 * SEC).unwrap();
    let second = trace.attribute(10 * SEC).unwrap();
    assert_eq!(first.metrics, second.metrics);
    assert_eq!(first.timeline, second.timeline);
}

#[test]
fn test_insertion_order_does_not_matter() {
    let steps = [step("1", 0, 10, 10.0, 3.0), step("2", 4, 18, 14.0, 1.5)];
    let tasks = [
        ext("1", Subsystem::ExtA, 1, 2, 5),
        ext("1", Subsystem::ExtB, 6, 7, 9),
        ext("2", Subsystem::ExtA, 5, 8, 16),
    ];

    let mut forward = TaskTrace::new("order");
    for s in &steps {
        forward.add_step(s.clone());
    }
    for t in &tasks {
        forward.add_external_task(t.clone());
    }

    let mut backward = TaskTrace::new("order");
    for t in tasks.iter().rev() {
        backward.add_external_task(t.clone());
    }
    for s in steps.iter().rev() {
        backward.add_step(s.clone());
    }

    assert_eq!(
        forward.attribute(20 * SEC).unwrap().metrics,
        backward.attribute(20 * SEC).unwrap().metrics
    );
}
