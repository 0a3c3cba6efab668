//! Blame report rendering
//!
//! Text output keeps the classic fixed-width layout: one header line with
//! the task id and per-category columns, then one row per selected metric
//! with the value and its share of the row total.

use crate::model::Category;
use crate::time_attribution::{MetricKind, MetricTable, Metrics};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Which metric rows to show
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MetricSelection {
    /// Sum of absolute values regardless of concurrency; worker-wait may be negative
    Absolute,
    /// Blame times counting every concurrent category in full
    AbsoluteBlame,
    /// Blame times divided by the number of concurrent blame periods
    #[default]
    RelativeBlame,
    /// All three metrics
    All,
}

impl MetricSelection {
    pub fn includes(self, kind: MetricKind) -> bool {
        match self {
            MetricSelection::All => true,
            MetricSelection::Absolute => kind == MetricKind::Absolute,
            MetricSelection::AbsoluteBlame => kind == MetricKind::AbsoluteBlame,
            MetricSelection::RelativeBlame => kind == MetricKind::RelativeBlame,
        }
    }

    /// Selected metrics in report order
    pub fn kinds(self) -> impl Iterator<Item = MetricKind> {
        MetricKind::ALL.into_iter().filter(move |k| self.includes(*k))
    }
}

/// Report output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    /// Fixed-width table (default)
    #[default]
    Text,
    /// JSON document for machine parsing
    Json,
}

/// Share of `value` in `total`, in percent; a zero total counts as 1
pub fn percentage(value: f64, total: f64) -> f64 {
    let denominator = if total == 0.0 { 1.0 } else { total };
    value / denominator * 100.0
}

/// Format with a thousands separator, e.g. `12,345.68`
pub fn with_thousands(value: f64, decimals: usize) -> String {
    let formatted = format!("{:.*}", decimals, value.abs());
    let (int_part, frac_part) = match formatted.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (formatted.as_str(), None),
    };

    let mut grouped = String::with_capacity(formatted.len() + int_part.len() / 3 + 1);
    for (i, digit) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }
    if let Some(frac) = frac_part {
        grouped.push('.');
        grouped.push_str(frac);
    }

    // "-0.00" would be noise
    if value < 0.0 && grouped.chars().any(|c| c.is_ascii_digit() && c != '0') {
        format!("-{}", grouped)
    } else {
        grouped
    }
}

/// Blame metrics of one task, ready for rendering
#[derive(Debug, Clone)]
pub struct BlameReport<'a> {
    pub task_id: &'a str,
    pub metrics: &'a Metrics,
    pub selection: MetricSelection,
    /// Wall time covered by at least one blame period
    pub blamed_seconds: f64,
}

#[derive(Serialize)]
struct JsonReport<'a> {
    task: &'a str,
    blamed_seconds: f64,
    metrics: BTreeMap<&'static str, JsonMetric<'a>>,
}

#[derive(Serialize)]
struct JsonMetric<'a> {
    total: f64,
    categories: &'a MetricTable,
}

impl<'a> BlameReport<'a> {
    pub fn header(&self) -> String {
        let mut line = format!("{:>36} :{:>12} {:>6}", self.task_id, "TOTAL", "pct.");
        for category in Category::ALL {
            line.push_str(&format!("{:>12} {:>6}", category.label(), "pct."));
        }
        line
    }

    pub fn row(&self, kind: MetricKind) -> String {
        let table = self.metrics.table(kind);
        let total = table.total();
        let mut line = format!(
            "{:>36} :{:>12} {:>5.1}%",
            kind.description(),
            with_thousands(total, 2),
            100.0
        );
        for (_, value) in table.iter() {
            line.push_str(&format!(
                "{:>12} {:>5.1}%",
                with_thousands(value, 2),
                percentage(value, total)
            ));
        }
        line
    }

    pub fn to_text(&self) -> String {
        let mut out = self.header();
        out.push('\n');
        for kind in self.selection.kinds() {
            out.push_str(&self.row(kind));
            out.push('\n');
        }
        out
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        let metrics = self
            .selection
            .kinds()
            .map(|kind| {
                let table = self.metrics.table(kind);
                (
                    kind.name(),
                    JsonMetric {
                        total: table.total(),
                        categories: table,
                    },
                )
            })
            .collect();
        serde_json::to_string_pretty(&JsonReport {
            task: self.task_id,
            blamed_seconds: self.blamed_seconds,
            metrics,
        })
    }

    pub fn render(&self, format: ReportFormat) -> serde_json::Result<String> {
        match format {
            ReportFormat::Text => Ok(self.to_text()),
            ReportFormat::Json => self.to_json(),
        }
    }
}
