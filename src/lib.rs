//! Taskblame - wall-clock time attribution for orchestrated background tasks
//!
//! This library reads a task export, splits every worker step of one task
//! into weighted blame periods, lays them on an atomic timeline and folds
//! that timeline into absolute, absolute-blame and relative-blame times per
//! category. Worker load statistics and a polling-frequency checker share
//! the same ingestion code.

pub mod cli;
pub mod config;
pub mod heat;
pub mod ingest;
pub mod model;
pub mod polling;
pub mod report;
pub mod time_attribution;
