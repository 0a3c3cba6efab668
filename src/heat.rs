//! Worker load over time
//!
//! Reads a steps file across all execution plans and reports which step
//! labels dominate by count and by execution time, plus the load timeline:
//! for each atomic slice between step boundaries, how many steps were in
//! flight and how much execution load they summed to (each step spreads its
//! execution time evenly over its wall time).

use crate::ingest::{
    for_each_line, format_micros, number_field, timestamp_field, RecordError, StepColumns,
};
use crate::model::micros_to_secs;
use crate::report::with_thousands;
use crate::time_attribution::Timeline;
use anyhow::Result;
use std::collections::BTreeMap;
use std::path::Path;

/// Analysis window; steps outside are skipped, steps crossing it are cut
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub from: i64,
    pub to: i64,
}

impl Window {
    pub fn new(from: Option<i64>, to: Option<i64>, now: i64) -> Self {
        Self {
            from: from.unwrap_or(0),
            to: to.unwrap_or(now),
        }
    }
}

/// One step as seen by the load analysis
#[derive(Debug, Clone, PartialEq)]
pub struct StepLoad {
    pub start: i64,
    pub finish: i64,
    /// Execution time in seconds
    pub exec: f64,
    pub label: String,
}

impl StepLoad {
    /// Parse a steps-file row; a step without an end is still running at `now`
    pub fn parse(line: &str, now: i64) -> Result<Self, RecordError> {
        let cols = StepColumns::split(line)?;
        let start = timestamp_field(cols.started, "started_at")?;
        let finish = if cols.ended.is_empty() {
            now
        } else {
            timestamp_field(cols.ended, "ended_at")?
        };
        let exec = number_field(cols.exec_time, "execution_time")?;
        Ok(Self {
            start,
            finish,
            exec,
            label: cols.label.to_string(),
        })
    }

    /// Cut the step to `window`, scaling execution time by the kept share
    pub fn clip(mut self, window: Window) -> Option<Self> {
        if self.start > window.to || self.finish < window.from {
            return None;
        }
        if self.start < window.from {
            self.exec *= (self.finish - window.from) as f64 / (self.finish - self.start) as f64;
            self.start = window.from;
        }
        if self.finish > window.to {
            self.exec *= (window.to - self.start) as f64 / (self.finish - self.start) as f64;
            self.finish = window.to;
        }
        Some(self)
    }

    /// Average execution load over the step's wall time
    pub fn load(&self) -> f64 {
        let wall = micros_to_secs(self.finish - self.start);
        if wall > 0.0 {
            self.exec / wall
        } else {
            0.0
        }
    }
}

/// Per-label totals
#[derive(Debug, Clone, PartialEq)]
pub struct LabelStats {
    pub label: String,
    pub count: usize,
    pub exec: f64,
}

/// One slice of the load timeline
#[derive(Debug, Clone, PartialEq)]
pub struct LoadSlice {
    pub start: i64,
    pub duration: i64,
    pub steps: u32,
    pub load: f64,
}

/// Load statistics for a set of steps
#[derive(Debug, Clone, Default)]
pub struct HeatReport {
    pub labels: Vec<LabelStats>,
    pub slices: Vec<LoadSlice>,
}

impl HeatReport {
    /// Build label totals and the load timeline; the last slice runs to `now`
    pub fn build(steps: &[StepLoad], now: i64) -> Self {
        let mut labels: BTreeMap<&str, LabelStats> = BTreeMap::new();
        for step in steps {
            let stats = labels.entry(step.label.as_str()).or_insert_with(|| LabelStats {
                label: step.label.clone(),
                count: 0,
                exec: 0.0,
            });
            stats.count += 1;
            stats.exec += step.exec;
        }

        let timeline = Timeline::new(steps.iter().flat_map(|s| [s.start, s.finish]), now);
        let mut slices: Vec<LoadSlice> = timeline
            .intervals()
            .iter()
            .map(|i| LoadSlice {
                start: i.start,
                duration: i.duration,
                steps: 0,
                load: 0.0,
            })
            .collect();
        for step in steps {
            for slice in &mut slices[timeline.touching(step.start, step.finish)] {
                slice.steps += 1;
                slice.load += step.load();
            }
        }

        Self {
            labels: labels.into_values().collect(),
            slices,
        }
    }

    /// Labels with the most steps, ties by name
    pub fn top_by_count(&self, limit: usize) -> Vec<&LabelStats> {
        let mut ranked: Vec<&LabelStats> = self.labels.iter().collect();
        ranked.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.label.cmp(&b.label)));
        ranked.truncate(limit);
        ranked
    }

    /// Labels with the most execution time, ties by name
    pub fn top_by_exec(&self, limit: usize) -> Vec<&LabelStats> {
        let mut ranked: Vec<&LabelStats> = self.labels.iter().collect();
        ranked.sort_by(|a, b| b.exec.total_cmp(&a.exec).then_with(|| a.label.cmp(&b.label)));
        ranked.truncate(limit);
        ranked
    }

    /// Both top-label tables as text
    pub fn summary(&self, limit: usize) -> String {
        let mut out = String::new();
        for (title, ranked) in [
            ("count", self.top_by_count(limit)),
            ("execution time", self.top_by_exec(limit)),
        ] {
            let heading = format!("Top {} step labels per {}:", limit, title);
            out.push_str(&format!("{}\n{}\n", heading, "-".repeat(heading.len())));
            out.push_str(&format!("{:<8}{:<10}label\n", "steps", "exec.time"));
            for stats in ranked {
                out.push_str(&format!(
                    "{:<8}{:<10}{}\n",
                    stats.count,
                    with_thousands(stats.exec, 2),
                    stats.label
                ));
            }
            out.push('\n');
        }
        out
    }

    /// `;`-separated load timeline
    pub fn to_csv(&self) -> String {
        let mut out = String::from("start;duration;concur.steps;avg.exec.load\n");
        for slice in &self.slices {
            out.push_str(&format!(
                "{};{};{};{}\n",
                format_micros(slice.start),
                micros_to_secs(slice.duration),
                slice.steps,
                slice.load
            ));
        }
        out
    }
}

/// Read every usable step of a steps file that touches `window`
///
/// Returns the kept steps and the number of unusable rows.
pub fn load_steps(path: &Path, window: Window, now: i64) -> Result<(Vec<StepLoad>, usize)> {
    let mut steps = Vec::new();
    let mut dropped = 0;
    for_each_line(path, |line| {
        match StepLoad::parse(line, now) {
            Ok(step) => steps.extend(step.clip(window)),
            Err(e) => {
                dropped += 1;
                tracing::debug!(reason = %e, "dropping step row");
            }
        }
        Ok(true)
    })?;
    tracing::info!(steps = steps.len(), dropped, "loaded steps for load analysis");
    Ok((steps, dropped))
}
