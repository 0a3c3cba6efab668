// Row-level parsing of task-export files
//
// Every function here works on a single line and reports why a row was
// rejected; callers log the reason and move on.

use super::timestamp::{parse_content_timestamp, parse_entitlement_timestamp, parse_timestamp};
use crate::model::{ExternalTask, ModelError, Subsystem, WorkerStep};
use serde::Deserialize;
use thiserror::Error;

/// Minimum column counts of the export files
pub const TASK_COLUMNS: usize = 14;
pub const STEP_COLUMNS: usize = 16;
pub const ACTION_COLUMNS: usize = 11;

/// Why a single export row (or external task) was dropped
#[derive(Debug, Error, PartialEq)]
pub enum RecordError {
    #[error("expected at least {required} fields, found {found}")]
    TooFewFields { required: usize, found: usize },

    #[error("empty {0} field")]
    EmptyField(&'static str),

    #[error("unparsable timestamp in {field}: {value:?}")]
    BadTimestamp { field: &'static str, value: String },

    #[error("unparsable number in {field}: {value:?}")]
    BadNumber { field: &'static str, value: String },

    #[error("invalid action payload: {0}")]
    BadPayload(String),

    #[error("missing {0} in external task")]
    MissingTimestamp(&'static str),

    #[error(transparent)]
    Model(#[from] ModelError),
}

/// Split a quoted CSV line (`"` quoting, `""` escapes)
pub fn split_quoted(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                field.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => fields.push(std::mem::take(&mut field)),
            _ => field.push(c),
        }
    }
    fields.push(field);
    fields
}

fn require_columns(found: usize, required: usize) -> Result<(), RecordError> {
    if found < required {
        return Err(RecordError::TooFewFields { required, found });
    }
    Ok(())
}

fn non_empty<'a>(value: &'a str, field: &'static str) -> Result<&'a str, RecordError> {
    if value.is_empty() {
        Err(RecordError::EmptyField(field))
    } else {
        Ok(value)
    }
}

pub(crate) fn timestamp_field(value: &str, field: &'static str) -> Result<i64, RecordError> {
    parse_timestamp(non_empty(value, field)?).ok_or_else(|| RecordError::BadTimestamp {
        field,
        value: value.to_string(),
    })
}

pub(crate) fn number_field(value: &str, field: &'static str) -> Result<f64, RecordError> {
    non_empty(value, field)?
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|n| n.is_finite())
        .ok_or_else(|| RecordError::BadNumber {
            field,
            value: value.to_string(),
        })
}

/// Ids resolved from the tasks file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskIds {
    pub task_id: String,
    /// Execution plan id shared by the task's steps and actions
    pub plan_id: String,
}

/// Match a tasks-file row against a task or execution plan id
pub fn match_task_row(line: &str, wanted: &str) -> Option<TaskIds> {
    let cols: Vec<&str> = line.split(',').collect();
    if cols.len() < TASK_COLUMNS {
        return None;
    }
    if cols[0] == wanted || cols[7] == wanted {
        Some(TaskIds {
            task_id: cols[0].to_string(),
            plan_id: cols[7].to_string(),
        })
    } else {
        None
    }
}

/// Raw columns of a steps-file row
#[derive(Debug, Clone, PartialEq)]
pub struct StepColumns<'a> {
    pub plan_id: &'a str,
    pub owner_id: &'a str,
    pub started: &'a str,
    pub ended: &'a str,
    pub real_time: &'a str,
    pub exec_time: &'a str,
    pub label: &'a str,
}

impl<'a> StepColumns<'a> {
    pub fn split(line: &'a str) -> Result<Self, RecordError> {
        let cols: Vec<&str> = line.split(',').collect();
        require_columns(cols.len(), STEP_COLUMNS)?;
        Ok(Self {
            plan_id: cols[0],
            owner_id: cols[2],
            started: cols[4],
            ended: cols[5],
            real_time: cols[6],
            exec_time: cols[7],
            label: cols[11],
        })
    }
}

/// Parse a steps-file row; `Ok(None)` for rows of other plans
pub fn parse_step_row(line: &str, plan_id: &str) -> Result<Option<WorkerStep>, RecordError> {
    let cols = StepColumns::split(line)?;
    if cols.plan_id != plan_id {
        return Ok(None);
    }
    let start = timestamp_field(cols.started, "started_at")?;
    let end = timestamp_field(cols.ended, "ended_at")?;
    let real = number_field(cols.real_time, "real_time")?;
    let exec = number_field(cols.exec_time, "execution_time")?;
    Ok(Some(WorkerStep::new(cols.owner_id, start, end, real, exec)?))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ActionPayload {
    pulp_tasks: Option<Vec<ContentTaskRecord>>,
    task_groups: Option<Vec<ContentTaskGroup>>,
    task: Option<EntitlementJobRecord>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ContentTaskGroup {
    tasks: Vec<ContentTaskRecord>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ContentTaskRecord {
    pulp_created: Option<String>,
    started_at: Option<String>,
    finished_at: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
#[serde(rename_all = "camelCase")]
struct EntitlementJobRecord {
    created: Option<String>,
    start_time: Option<String>,
    end_time: Option<String>,
}

/// External tasks found in one actions-file row
#[derive(Debug, Default)]
pub struct ActionRow {
    pub owner_id: String,
    pub tasks: Vec<ExternalTask>,
    /// Tasks dropped for missing or unparsable timestamps
    pub rejected: Vec<RecordError>,
}

/// Parse an actions-file row; `Ok(None)` for rows of other plans
pub fn parse_action_row(line: &str, plan_id: &str) -> Result<Option<ActionRow>, RecordError> {
    let cols = split_quoted(line);
    require_columns(cols.len(), ACTION_COLUMNS)?;
    if cols[0] != plan_id {
        return Ok(None);
    }

    let payload: ActionPayload = serde_json::from_str(&cols[10])
        .map_err(|e| RecordError::BadPayload(e.to_string()))?;

    let mut row = ActionRow {
        owner_id: cols[1].clone(),
        ..ActionRow::default()
    };

    let groups = payload.task_groups.unwrap_or_default();
    let content = payload
        .pulp_tasks
        .unwrap_or_default()
        .into_iter()
        .chain(groups.into_iter().flat_map(|g| g.tasks));
    for record in content {
        row.push(content_task(&row.owner_id, &record));
    }
    if let Some(job) = payload.task {
        row.push(entitlement_task(&row.owner_id, &job));
    }

    Ok(Some(row))
}

impl ActionRow {
    fn push(&mut self, task: Result<ExternalTask, RecordError>) {
        match task {
            Ok(task) => self.tasks.push(task),
            Err(e) => self.rejected.push(e),
        }
    }
}

fn external_timestamp(
    raw: Option<&str>,
    field: &'static str,
    parse: fn(&str) -> Option<i64>,
) -> Result<i64, RecordError> {
    let raw = raw.ok_or(RecordError::MissingTimestamp(field))?;
    parse(raw).ok_or_else(|| RecordError::BadTimestamp {
        field,
        value: raw.to_string(),
    })
}

fn content_task(owner: &str, record: &ContentTaskRecord) -> Result<ExternalTask, RecordError> {
    let parse = parse_content_timestamp;
    let created = external_timestamp(record.pulp_created.as_deref(), "pulp_created", parse)?;
    let started = external_timestamp(record.started_at.as_deref(), "started_at", parse)?;
    let finished = external_timestamp(record.finished_at.as_deref(), "finished_at", parse)?;
    Ok(ExternalTask::new(owner, Subsystem::ExtA, created, started, finished)?)
}

fn entitlement_task(owner: &str, job: &EntitlementJobRecord) -> Result<ExternalTask, RecordError> {
    let parse = parse_entitlement_timestamp;
    let created = external_timestamp(job.created.as_deref(), "created", parse)?;
    let started = external_timestamp(job.start_time.as_deref(), "startTime", parse)?;
    let finished = external_timestamp(job.end_time.as_deref(), "endTime", parse)?;
    Ok(ExternalTask::new(owner, Subsystem::ExtB, created, started, finished)?)
}
