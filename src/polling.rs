//! External-task polling frequency checker
//!
//! The worker polls every content task it waits on. Access logs record each
//! poll as `GET /pulp/api/v3/tasks/<id>/`; two consecutive polls of the same
//! task further apart than the configured period mean the worker was too
//! busy to poll, which inflates the time blamed on it.

use crate::config::PollingConfig;
use crate::ingest::for_each_line;
use anyhow::Result;
use chrono::NaiveDateTime;
use regex::Regex;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Log files checked when the input is a report directory
pub const KNOWN_LOGS: [&str; 3] = [
    "var/log/httpd/foreman-ssl_access_ssl.log",
    "var/log/messages",
    "sos_commands/logs/journalctl_--no-pager",
];

/// Settings dump holding the polling multiplier
pub const SETTINGS_TABLE: &str = "sos_commands/foreman/foreman_settings_table";

const LOG_TIME_FORMAT: &str = "%d/%b/%Y:%H:%M:%S";

/// Two polls of one task too far apart
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollingGap {
    pub task_id: String,
    pub previous: NaiveDateTime,
    pub current: NaiveDateTime,
    pub delay_secs: i64,
    pub max_delay_secs: i64,
}

impl fmt::Display for PollingGap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Task '{}' polled at '{}' and then at '{}', delay {}s is bigger than maximum {}s.",
            self.task_id,
            self.previous.format(LOG_TIME_FORMAT),
            self.current.format(LOG_TIME_FORMAT),
            self.delay_secs,
            self.max_delay_secs
        )
    }
}

/// Scans log lines for task polls and reports late ones
#[derive(Debug)]
pub struct PollingChecker {
    poll_line: Regex,
    max_delay_secs: i64,
}

impl PollingChecker {
    pub fn new(max_delay_secs: i64) -> Result<Self> {
        Ok(Self {
            poll_line: Regex::new(r#"\[([^\]]*)\] "GET /pulp/api/v3/tasks/([^/ ]+)/ "#)?,
            max_delay_secs,
        })
    }

    /// Largest tolerated delay for a polling multiplier
    pub fn max_delay(config: &PollingConfig, multiplier: u64) -> i64 {
        (config.base_interval_secs * multiplier.max(1) + config.rounding_error_secs) as i64
    }

    /// Extract (timestamp, task id) from a poll line
    pub fn parse_poll(&self, line: &str) -> Option<(NaiveDateTime, String)> {
        let caps = self.poll_line.captures(line)?;
        let raw = caps.get(1)?.as_str();
        let stamp = raw.get(..20).unwrap_or(raw);
        let at = NaiveDateTime::parse_from_str(stamp, LOG_TIME_FORMAT).ok()?;
        Some((at, caps.get(2)?.as_str().to_string()))
    }

    /// Check lines of one log in order
    pub fn check_lines<'a>(&self, lines: impl IntoIterator<Item = &'a str>) -> Vec<PollingGap> {
        let mut last_seen = HashMap::new();
        let mut gaps = Vec::new();
        for line in lines {
            self.observe(line, &mut last_seen, &mut gaps);
        }
        gaps
    }

    /// Check one log file
    pub fn check_file(&self, path: &Path) -> Result<Vec<PollingGap>> {
        let mut last_seen = HashMap::new();
        let mut gaps = Vec::new();
        for_each_line(path, |line| {
            self.observe(line, &mut last_seen, &mut gaps);
            Ok(true)
        })?;
        Ok(gaps)
    }

    fn observe(
        &self,
        line: &str,
        last_seen: &mut HashMap<String, NaiveDateTime>,
        gaps: &mut Vec<PollingGap>,
    ) {
        let Some((at, task_id)) = self.parse_poll(line) else {
            return;
        };
        if let Some(previous) = last_seen.insert(task_id.clone(), at) {
            let delay_secs = (at - previous).num_seconds();
            if delay_secs > self.max_delay_secs {
                gaps.push(PollingGap {
                    task_id,
                    previous,
                    current: at,
                    delay_secs,
                    max_delay_secs: self.max_delay_secs,
                });
            }
        }
    }
}

/// Read the polling multiplier from a settings table dump
pub fn read_multiplier(path: &Path) -> Result<Option<u64>> {
    let pattern = Regex::new(r"foreman_tasks_polling_multiplier.*--- (\d+)")?;
    let mut found = None;
    for_each_line(path, |line| {
        found = pattern
            .captures(line)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse().ok());
        Ok(found.is_none())
    })?;
    Ok(found)
}

/// Files to scan for `input`: the known logs of a report directory, or the file itself
pub fn log_files(input: &Path) -> Vec<PathBuf> {
    if input.is_dir() {
        KNOWN_LOGS
            .iter()
            .map(|log| input.join(log))
            .filter(|path| path.is_file())
            .collect()
    } else {
        vec![input.to_path_buf()]
    }
}
