//! Evaluation collector: bounded-memory audit trail for one signal.
//!
//! Evaluations are buffered in memory. When the buffer reaches the flush
//! threshold it is written synchronously to a new JSON Lines chunk file
//! (`{signal}.chunk-000001.jsonl`, `...-000002`, ...) and cleared, so the
//! buffer never holds more than `flush_threshold` evaluations.
//!
//! `finalize()` flushes the tail, concatenates the chunks in order into
//! `{signal}.audit.jsonl`, and removes them. A failed flush is terminal:
//! chunks already on disk stay, every later call is rejected.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use siglab_core::config::is_file_safe_name;
use siglab_core::domain::SignalEvaluation;

use crate::export::{write_audit_csv, write_jsonl, AuditError, ExportFormat, JsonlEvaluations};

/// Default number of evaluations held in memory before a chunk is written.
pub const DEFAULT_FLUSH_THRESHOLD: usize = 10_000;

/// Errors from the evaluation collector.
#[derive(Debug, Error)]
pub enum CollectorError {
    #[error("flush threshold must be at least 1")]
    ZeroFlushThreshold,
    #[error("signal name must not be empty")]
    EmptySignalName,
    #[error("signal name '{0}' is not usable as a file name")]
    UnsafeSignalName(String),
    #[error("stale chunk files from an earlier run: {paths:?}")]
    StaleChunks { paths: Vec<PathBuf> },
    #[error("collector for '{0}' is finalized; no more evaluations accepted")]
    Finalized(String),
    #[error("collector for '{0}' failed an earlier flush; no more evaluations accepted")]
    Failed(String),
    #[error("evaluation components {found:?} differ from the recorded layout {expected:?}")]
    LayoutMismatch {
        expected: Vec<String>,
        found: Vec<String>,
    },
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl CollectorError {
    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Collector settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectorConfig {
    pub signal_name: String,
    pub chunk_dir: PathBuf,
    pub flush_threshold: usize,
}

impl CollectorConfig {
    pub fn new(signal_name: impl Into<String>, chunk_dir: impl Into<PathBuf>) -> Self {
        Self {
            signal_name: signal_name.into(),
            chunk_dir: chunk_dir.into(),
            flush_threshold: DEFAULT_FLUSH_THRESHOLD,
        }
    }

    pub fn with_flush_threshold(mut self, flush_threshold: usize) -> Self {
        self.flush_threshold = flush_threshold;
        self
    }

    /// Path of chunk number `seq` (1-based).
    pub fn chunk_path(&self, seq: usize) -> PathBuf {
        self.chunk_dir
            .join(format!("{}.chunk-{seq:06}.jsonl", self.signal_name))
    }

    /// Path of the merged audit file.
    pub fn audit_path(&self) -> PathBuf {
        self.chunk_dir
            .join(format!("{}.audit.jsonl", self.signal_name))
    }

    /// Chunk files for this signal already present in `chunk_dir`, sorted.
    pub fn existing_chunks(&self) -> Result<Vec<PathBuf>, CollectorError> {
        let prefix = format!("{}.chunk-", self.signal_name);
        let entries =
            fs::read_dir(&self.chunk_dir).map_err(|e| CollectorError::io(&self.chunk_dir, e))?;
        let mut found = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| CollectorError::io(&self.chunk_dir, e))?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            let is_chunk = name
                .strip_prefix(&prefix)
                .and_then(|rest| rest.strip_suffix(".jsonl"))
                .is_some_and(|seq| !seq.is_empty() && seq.bytes().all(|b| b.is_ascii_digit()));
            if is_chunk {
                found.push(entry.path());
            }
        }
        found.sort();
        Ok(found)
    }
}

/// Collector lifecycle.
///
/// `Flushing` is only observable from inside a flush; callers see
/// `Collecting` again once `record` returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectorState {
    Idle,
    Collecting,
    Flushing,
    Finalized,
    Failed,
}

/// Accumulates one signal's evaluations under a fixed memory bound.
#[derive(Debug)]
pub struct EvaluationCollector {
    config: CollectorConfig,
    state: CollectorState,
    buffer: Vec<SignalEvaluation>,
    layout: Option<Vec<String>>,
    chunks: Vec<PathBuf>,
    flushed: usize,
}

impl EvaluationCollector {
    /// Validate `config`, create the chunk directory, and refuse to start
    /// over chunk files this signal left behind.
    pub fn new(config: CollectorConfig) -> Result<Self, CollectorError> {
        if config.flush_threshold == 0 {
            return Err(CollectorError::ZeroFlushThreshold);
        }
        if config.signal_name.trim().is_empty() {
            return Err(CollectorError::EmptySignalName);
        }
        if !is_file_safe_name(&config.signal_name) {
            return Err(CollectorError::UnsafeSignalName(config.signal_name));
        }
        fs::create_dir_all(&config.chunk_dir)
            .map_err(|e| CollectorError::io(&config.chunk_dir, e))?;
        let stale = config.existing_chunks()?;
        if !stale.is_empty() {
            return Err(CollectorError::StaleChunks { paths: stale });
        }
        Ok(Self {
            buffer: Vec::with_capacity(config.flush_threshold.min(DEFAULT_FLUSH_THRESHOLD)),
            config,
            state: CollectorState::Idle,
            layout: None,
            chunks: Vec::new(),
            flushed: 0,
        })
    }

    /// Append one evaluation; writes a chunk when the buffer reaches the threshold.
    ///
    /// A flush error is returned as-is and leaves the collector `Failed`.
    pub fn record(&mut self, evaluation: SignalEvaluation) -> Result<(), CollectorError> {
        self.ensure_open()?;
        match &self.layout {
            Some(expected) => {
                let same = expected.len() == evaluation.components().len()
                    && expected
                        .iter()
                        .zip(evaluation.components())
                        .all(|(name, c)| name == c.name());
                if !same {
                    return Err(CollectorError::LayoutMismatch {
                        expected: expected.clone(),
                        found: component_names(&evaluation),
                    });
                }
            }
            None => self.layout = Some(component_names(&evaluation)),
        }

        self.buffer.push(evaluation);
        self.state = CollectorState::Collecting;
        if self.buffer.len() >= self.config.flush_threshold {
            self.flush()?;
        }
        Ok(())
    }

    /// Flush the remaining buffer, merge every chunk into one audit file,
    /// and delete the chunks.
    pub fn finalize(&mut self) -> Result<FinalizedAudit, CollectorError> {
        self.ensure_open()?;
        if !self.buffer.is_empty() {
            self.flush()?;
        }

        let audit_path = self.config.audit_path();
        let chunk_count = self.chunks.len();
        if let Err(e) = self.merge_chunks(&audit_path) {
            self.state = CollectorState::Failed;
            return Err(e);
        }
        for chunk in self.chunks.drain(..) {
            if let Err(e) = fs::remove_file(&chunk) {
                warn!(chunk = %chunk.display(), error = %e, "could not remove merged chunk");
            }
        }
        self.state = CollectorState::Finalized;

        info!(
            signal = %self.config.signal_name,
            evaluations = self.flushed,
            chunks = chunk_count,
            audit = %audit_path.display(),
            "audit finalized"
        );
        Ok(FinalizedAudit {
            signal_name: self.config.signal_name.clone(),
            path: audit_path,
            evaluation_count: self.flushed,
            chunk_count,
            component_names: self.layout.clone().unwrap_or_default(),
        })
    }

    pub fn state(&self) -> CollectorState {
        self.state
    }

    pub fn config(&self) -> &CollectorConfig {
        &self.config
    }

    /// Evaluations currently held in memory.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Evaluations accepted so far, flushed or not.
    pub fn recorded_count(&self) -> usize {
        self.flushed + self.buffer.len()
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn chunk_paths(&self) -> &[PathBuf] {
        &self.chunks
    }

    /// Component names of the first recorded evaluation.
    pub fn component_names(&self) -> Option<&[String]> {
        self.layout.as_deref()
    }

    fn ensure_open(&self) -> Result<(), CollectorError> {
        match self.state {
            CollectorState::Finalized => {
                Err(CollectorError::Finalized(self.config.signal_name.clone()))
            }
            CollectorState::Failed => Err(CollectorError::Failed(self.config.signal_name.clone())),
            _ => Ok(()),
        }
    }

    fn flush(&mut self) -> Result<(), CollectorError> {
        self.state = CollectorState::Flushing;
        let path = self.config.chunk_path(self.chunks.len() + 1);
        if let Err(e) = write_chunk(&path, &self.buffer) {
            self.state = CollectorState::Failed;
            return Err(CollectorError::io(&path, e));
        }
        debug!(
            signal = %self.config.signal_name,
            chunk = %path.display(),
            evaluations = self.buffer.len(),
            "chunk flushed"
        );
        self.flushed += self.buffer.len();
        self.buffer.clear();
        self.chunks.push(path);
        self.state = CollectorState::Collecting;
        Ok(())
    }

    fn merge_chunks(&self, audit_path: &Path) -> Result<(), CollectorError> {
        let out = File::create(audit_path).map_err(|e| CollectorError::io(audit_path, e))?;
        let mut out = BufWriter::new(out);
        for chunk in &self.chunks {
            let mut input = File::open(chunk).map_err(|e| CollectorError::io(chunk, e))?;
            io::copy(&mut input, &mut out).map_err(|e| CollectorError::io(audit_path, e))?;
        }
        out.flush().map_err(|e| CollectorError::io(audit_path, e))
    }
}

fn component_names(evaluation: &SignalEvaluation) -> Vec<String> {
    evaluation
        .components()
        .iter()
        .map(|c| c.name().to_string())
        .collect()
}

/// Write one chunk. `create_new` keeps earlier chunks from being overwritten.
fn write_chunk(path: &Path, evaluations: &[SignalEvaluation]) -> io::Result<()> {
    let file = File::options().write(true).create_new(true).open(path)?;
    let mut writer = BufWriter::new(file);
    write_jsonl(&mut writer, evaluations)?;
    writer.flush()?;
    writer.get_ref().sync_data()
}

/// Handle to a merged audit file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalizedAudit {
    signal_name: String,
    path: PathBuf,
    evaluation_count: usize,
    chunk_count: usize,
    component_names: Vec<String>,
}

impl FinalizedAudit {
    pub fn signal_name(&self) -> &str {
        &self.signal_name
    }

    /// Merged JSON Lines file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn evaluation_count(&self) -> usize {
        self.evaluation_count
    }

    /// Chunks that were merged (including the final tail chunk).
    pub fn chunk_count(&self) -> usize {
        self.chunk_count
    }

    /// Component names in declared order; empty if nothing was recorded.
    pub fn component_names(&self) -> &[String] {
        &self.component_names
    }

    /// Stream the evaluations back from disk, in record order.
    pub fn evaluations(&self) -> Result<JsonlEvaluations<io::BufReader<File>>, AuditError> {
        JsonlEvaluations::open(&self.path)
    }

    /// Export to `dest` in the given format. Returns the number of evaluations written.
    pub fn export(&self, format: ExportFormat, dest: &Path) -> Result<usize, AuditError> {
        match format {
            ExportFormat::Jsonl => {
                fs::copy(&self.path, dest).map_err(|e| AuditError::io(dest, e))?;
                Ok(self.evaluation_count)
            }
            ExportFormat::Csv => {
                let file = File::create(dest).map_err(|e| AuditError::io(dest, e))?;
                let rows = write_audit_csv(
                    BufWriter::new(file),
                    self.component_names.clone(),
                    self.evaluations()?,
                )?;
                info!(
                    signal = %self.signal_name,
                    rows,
                    dest = %dest.display(),
                    "audit exported"
                );
                Ok(rows)
            }
        }
    }
}
