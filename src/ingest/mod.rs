//! Trace ingestion from task-export directories
//!
//! An export holds three comma-separated files: the tasks table (task id to
//! execution plan id), the steps table (one row per worker step) and the
//! actions table (one row per action, with a JSON payload listing the
//! external tasks it delegated). Malformed rows and external tasks with
//! missing timestamps are dropped and logged at debug level, never fatal.

mod export;
mod record;
mod timestamp;

pub use export::{
    find_task, for_each_line, for_each_record, load_task_trace, IngestStats, LoadedTask,
};
pub use record::{
    match_task_row, parse_action_row, parse_step_row, split_quoted, ActionRow, RecordError,
    StepColumns, TaskIds, ACTION_COLUMNS, STEP_COLUMNS, TASK_COLUMNS,
};
pub(crate) use record::{number_field, timestamp_field};
pub use timestamp::{
    format_micros, now_micros, parse_content_timestamp, parse_entitlement_timestamp,
    parse_time_arg, parse_timestamp,
};
