//! SigLab Runner: replay, audit collection, statistics and export.
//!
//! This crate builds on `siglab-core` to provide:
//! - Bar loading from OHLCV CSV
//! - Run configuration (TOML) with eager validation
//! - Bounded-memory evaluation collectors with chunked JSONL spill
//! - Post-run statistics (trigger/blocking rates, near misses, primary blocker)
//! - CSV audit export and readback
//! - The replay driver and its summary/report artifacts

pub mod collector;
pub mod config;
pub mod data_loader;
pub mod export;
pub mod report;
pub mod runner;
pub mod statistics;

pub use collector::{
    CollectorConfig, CollectorError, CollectorState, EvaluationCollector, FinalizedAudit,
    DEFAULT_FLUSH_THRESHOLD,
};
pub use config::{RunConfig, RunConfigError, RunSettings};
pub use data_loader::{load_bars_csv, read_bars_csv, LoadError};
pub use export::{
    load_audit_csv, read_audit_csv, write_audit_csv, AuditCsvWriter, AuditError, ExportFormat,
    JsonlEvaluations,
};
pub use report::{generate_report, load_summary, save_run_artifacts};
pub use runner::{
    evaluate_all, run_audit, run_audit_with_indicators, RunError, RunSummary, SignalRunSummary,
    SCHEMA_VERSION,
};
pub use statistics::{InvalidThreshold, SignalStatistics, StatisticsAnalyzer};
