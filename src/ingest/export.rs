// Task-export directory loading
//
// Resolves the task in the tasks file, then streams the steps and actions
// files, keeping the rows of the task's execution plan.

use super::record::{match_task_row, parse_action_row, parse_step_row, TaskIds};
use crate::config::ExportConfig;
use crate::time_attribution::TaskTrace;
use anyhow::{Context, Result};
use std::borrow::Cow;
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Kept and dropped record counts of one load
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub steps: usize,
    pub dropped_steps: usize,
    pub external_tasks: usize,
    pub dropped_external_tasks: usize,
    pub dropped_actions: usize,
}

impl fmt::Display for IngestStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} steps ({} dropped), {} external tasks ({} dropped, {} unreadable actions)",
            self.steps,
            self.dropped_steps,
            self.external_tasks,
            self.dropped_external_tasks,
            self.dropped_actions
        )
    }
}

/// Everything read for one task
#[derive(Debug, Clone)]
pub struct LoadedTask {
    pub ids: TaskIds,
    pub trace: TaskTrace,
    pub stats: IngestStats,
}

/// Call `f` with every line of `path`, decoding invalid UTF-8 lossily
pub fn for_each_line<F>(path: &Path, mut f: F) -> Result<()>
where
    F: FnMut(&str) -> Result<bool>,
{
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    for chunk in BufReader::new(file).split(b'\n') {
        let chunk = chunk.with_context(|| format!("Failed to read {}", path.display()))?;
        let line: Cow<'_, str> = String::from_utf8_lossy(&chunk);
        if !f(line.trim_end_matches('\r'))? {
            break;
        }
    }
    Ok(())
}

/// Call `f` with every quoted-CSV record of `path`
///
/// A record whose quoted field is still open at the end of a line continues
/// on the next line; the line break stays part of the field.
pub fn for_each_record<F>(path: &Path, mut f: F) -> Result<()>
where
    F: FnMut(&str) -> Result<bool>,
{
    let mut record = String::new();
    let mut open_quote = false;
    let mut keep_going = true;
    for_each_line(path, |line| {
        if open_quote {
            record.push('\n');
        }
        record.push_str(line);
        // `""` escapes flip twice, so only unbalanced quotes keep a field open
        open_quote ^= line.matches('"').count() % 2 == 1;
        if open_quote {
            return Ok(true);
        }
        keep_going = f(&record)?;
        record.clear();
        Ok(keep_going)
    })?;
    if keep_going && !record.is_empty() {
        f(&record)?;
    }
    Ok(())
}

/// Find the task or execution plan `wanted` in the tasks file
pub fn find_task(path: &Path, wanted: &str) -> Result<Option<TaskIds>> {
    let mut found = None;
    for_each_line(path, |line| {
        found = match_task_row(line, wanted);
        Ok(found.is_none())
    })?;
    Ok(found)
}

/// Load the steps and external tasks of `wanted` from an export directory
pub fn load_task_trace(dir: &Path, files: &ExportConfig, wanted: &str) -> Result<LoadedTask> {
    let tasks_path = files.tasks_path(dir);
    let ids = find_task(&tasks_path, wanted)?.with_context(|| {
        format!(
            "Could not find a task or execution plan with id {} in file {}",
            wanted,
            tasks_path.display()
        )
    })?;
    tracing::info!(task = %ids.task_id, plan = %ids.plan_id, "resolved task");

    let mut trace = TaskTrace::new(ids.task_id.clone());
    let mut stats = IngestStats::default();

    for_each_line(&files.steps_path(dir), |line| {
        match parse_step_row(line, &ids.plan_id) {
            Ok(Some(step)) => {
                stats.steps += 1;
                trace.add_step(step);
            }
            Ok(None) => {}
            Err(e) => {
                stats.dropped_steps += 1;
                tracing::debug!(reason = %e, "dropping step row");
            }
        }
        Ok(true)
    })?;

    for_each_record(&files.actions_path(dir), |line| {
        match parse_action_row(line, &ids.plan_id) {
            Ok(Some(row)) => {
                for reason in &row.rejected {
                    tracing::debug!(owner = %row.owner_id, reason = %reason, "dropping external task");
                }
                stats.dropped_external_tasks += row.rejected.len();
                stats.external_tasks += row.tasks.len();
                for task in row.tasks {
                    trace.add_external_task(task);
                }
            }
            Ok(None) => {}
            Err(e) => {
                stats.dropped_actions += 1;
                tracing::debug!(reason = %e, "dropping action row");
            }
        }
        Ok(true)
    })?;

    tracing::info!(%stats, "loaded task export");
    Ok(LoadedTask { ids, trace, stats })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_export(dir: &Path) {
        fs::write(
            dir.join("foreman_tasks_tasks"),
            "other,a,b,c,d,e,f,plan-0,g,h,i,j,k,l\n\
             task-1,a,b,c,d,e,f,plan-1,g,h,i,j,k,l\n",
        )
        .unwrap();
        fs::write(
            dir.join("dynflow_steps"),
            "plan-1,1,7,run,2024-10-02 12:00:00,2024-10-02 12:00:10,10,4,x,x,x,L,x,x,x,x\n\
             plan-1,2,7,run,2024-10-02 12:00:10,,10,4,x,x,x,L,x,x,x,x\n\
             plan-0,1,3,run,2024-10-02 12:00:00,2024-10-02 12:00:10,10,4,x,x,x,L,x,x,x,x\n\
             truncated\n",
        )
        .unwrap();
        fs::write(
            dir.join("dynflow_actions"),
            "plan-1,7,a,b,c,d,e,f,g,h,\"{\"\"pulp_tasks\"\":[{\"\"pulp_created\"\":\"\"2024-10-02T12:00:02Z\"\",\"\"started_at\"\":\"\"2024-10-02T12:00:03Z\"\",\"\"finished_at\"\":\"\"2024-10-02T12:00:07Z\"\"}]}\"\n\
             plan-1,8,a,b,c,d,e,f,g,h,\"{broken\"\n",
        )
        .unwrap();
    }

    #[test]
    fn test_load_task_trace() {
        let dir = tempfile::tempdir().unwrap();
        write_export(dir.path());

        let loaded = load_task_trace(dir.path(), &ExportConfig::default(), "plan-1").unwrap();
        assert_eq!(loaded.ids.task_id, "task-1");
        assert_eq!(loaded.trace.task_id(), "task-1");
        assert_eq!(
            loaded.stats,
            IngestStats {
                steps: 1,
                dropped_steps: 2,
                external_tasks: 1,
                dropped_external_tasks: 0,
                dropped_actions: 1,
            }
        );
        assert_eq!(loaded.trace.step_count(), 1);
        assert_eq!(loaded.trace.linked_external_count(), 1);
    }

    #[test]
    fn test_unknown_task_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        write_export(dir.path());

        let err = load_task_trace(dir.path(), &ExportConfig::default(), "nope").unwrap_err();
        assert!(err.to_string().contains("Could not find"));
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_task_trace(dir.path(), &ExportConfig::default(), "task-1").is_err());
    }

    #[test]
    fn test_for_each_line_tolerates_invalid_utf8() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lines");
        fs::write(&path, b"ok\r\n\xff\xfe\nlast").unwrap();

        let mut lines = Vec::new();
        for_each_line(&path, |line| {
            lines.push(line.to_string());
            Ok(true)
        })
        .unwrap();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "ok");
        assert_eq!(lines[2], "last");
    }

    #[test]
    fn test_for_each_record_joins_open_quotes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records");
        fs::write(&path, "a,\"multi\nline\",b\nc,\"say \"\"hi\"\"\"\nd,\"unterminated\n").unwrap();

        let mut records = Vec::new();
        for_each_record(&path, |record| {
            records.push(record.to_string());
            Ok(true)
        })
        .unwrap();
        assert_eq!(
            records,
            vec![
                "a,\"multi\nline\",b".to_string(),
                "c,\"say \"\"hi\"\"\"".to_string(),
                "d,\"unterminated".to_string(),
            ]
        );
    }

    #[test]
    fn test_action_payload_spanning_two_lines() {
        let dir = tempfile::tempdir().unwrap();
        write_export(dir.path());
        fs::write(
            dir.path().join("dynflow_actions"),
            "plan-1,7,a,b,c,d,e,f,g,h,\"{\"\"pulp_tasks\"\":[{\"\"pulp_created\"\":\"\"2024-10-02T12:00:02Z\"\",\n\
             \"\"started_at\"\":\"\"2024-10-02T12:00:03Z\"\",\"\"finished_at\"\":\"\"2024-10-02T12:00:07Z\"\"}]}\"\n",
        )
        .unwrap();

        let loaded = load_task_trace(dir.path(), &ExportConfig::default(), "task-1").unwrap();
        assert_eq!(loaded.stats.external_tasks, 1);
        assert_eq!(loaded.stats.dropped_actions, 0);

        let result = loaded.trace.attribute(1_727_870_410_000_000).unwrap();
        assert_eq!(
            result
                .metrics
                .absolute
                .get(crate::model::Category::ExtAWait),
            1.0
        );
        assert_eq!(
            result
                .metrics
                .absolute
                .get(crate::model::Category::ExtAExec),
            4.0
        );
    }
}
