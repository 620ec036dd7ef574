//! Audit export and import: flattened CSV and JSON Lines.
//!
//! CSV layout, one row per evaluation:
//! `timestamp,bar_identity,signal,strength,blocking_component` followed by
//! `{name}_value,{name}_triggered,{name}_reason` for every component in
//! declared order. `blocking_component` is empty when the signal fired.
//!
//! Floats are written with Rust's shortest round-trip formatting, so
//! `strength` and component values read back bit-identical. NaN and infinite
//! values are written as `NaN`, `inf` and `-inf`.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use siglab_core::domain::{ComponentResult, EvaluationRecord, InvariantViolation, SignalEvaluation};

/// Leading columns of every audit CSV.
pub const FIXED_COLUMNS: [&str; 5] = [
    "timestamp",
    "bar_identity",
    "signal",
    "strength",
    "blocking_component",
];

const VALUE_SUFFIX: &str = "_value";
const TRIGGERED_SUFFIX: &str = "_triggered";
const REASON_SUFFIX: &str = "_reason";

/// Errors reading or writing audit artifacts.
#[derive(Debug, Error)]
pub enum AuditError {
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("JSON error at line {line}: {source}")]
    Json {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error("audit header is malformed: {0}")]
    Header(String),
    #[error("row {row}: column '{column}' has invalid value '{value}'")]
    BadValue {
        row: usize,
        column: String,
        value: String,
    },
    #[error("row {row}: {source}")]
    Invariant {
        row: usize,
        #[source]
        source: InvariantViolation,
    },
    #[error("evaluation components {found:?} do not match the audit layout {expected:?}")]
    LayoutMismatch {
        expected: Vec<String>,
        found: Vec<String>,
    },
}

impl AuditError {
    pub(crate) fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Export format for finalized audits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Csv,
    Jsonl,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Jsonl => "jsonl",
        }
    }
}

// ─── CSV export ─────────────────────────────────────────────────────

/// Header row for a given component layout.
pub fn csv_header(component_names: &[String]) -> Vec<String> {
    let mut header: Vec<String> = FIXED_COLUMNS.iter().map(|c| c.to_string()).collect();
    for name in component_names {
        header.push(format!("{name}{VALUE_SUFFIX}"));
        header.push(format!("{name}{TRIGGERED_SUFFIX}"));
        header.push(format!("{name}{REASON_SUFFIX}"));
    }
    header
}

/// Streaming CSV writer with a fixed component layout.
pub struct AuditCsvWriter<W: Write> {
    writer: csv::Writer<W>,
    component_names: Vec<String>,
    rows: usize,
}

impl<W: Write> AuditCsvWriter<W> {
    /// Write the header immediately.
    pub fn new(inner: W, component_names: Vec<String>) -> Result<Self, AuditError> {
        let mut writer = csv::Writer::from_writer(inner);
        writer.write_record(csv_header(&component_names))?;
        Ok(Self {
            writer,
            component_names,
            rows: 0,
        })
    }

    pub fn write(&mut self, evaluation: &SignalEvaluation) -> Result<(), AuditError> {
        let matches = evaluation.components().len() == self.component_names.len()
            && evaluation
                .components()
                .iter()
                .zip(&self.component_names)
                .all(|(c, name)| c.name() == name);
        if !matches {
            return Err(AuditError::LayoutMismatch {
                expected: self.component_names.clone(),
                found: evaluation
                    .components()
                    .iter()
                    .map(|c| c.name().to_string())
                    .collect(),
            });
        }

        let mut record = Vec::with_capacity(FIXED_COLUMNS.len() + 3 * self.component_names.len());
        record.push(evaluation.timestamp().to_string());
        record.push(evaluation.bar_identity().to_string());
        record.push(evaluation.signal().to_string());
        record.push(evaluation.strength().to_string());
        record.push(evaluation.blocking_component().unwrap_or("").to_string());
        for component in evaluation.components() {
            record.push(component.value().to_string());
            record.push(component.triggered().to_string());
            record.push(component.reason().to_string());
        }
        self.writer.write_record(&record)?;
        self.rows += 1;
        Ok(())
    }

    /// Flush and return the number of data rows written.
    pub fn finish(mut self) -> Result<usize, AuditError> {
        self.writer
            .flush()
            .map_err(|e| AuditError::Csv(csv::Error::from(e)))?;
        Ok(self.rows)
    }
}

/// Write a full audit CSV from any evaluation stream.
pub fn write_audit_csv<W, I>(
    inner: W,
    component_names: Vec<String>,
    evaluations: I,
) -> Result<usize, AuditError>
where
    W: Write,
    I: IntoIterator<Item = Result<SignalEvaluation, AuditError>>,
{
    let mut writer = AuditCsvWriter::new(inner, component_names)?;
    for evaluation in evaluations {
        writer.write(&evaluation?)?;
    }
    writer.finish()
}

// ─── CSV import ─────────────────────────────────────────────────────

/// Component names from an audit header, validating the column layout.
fn parse_header(header: &csv::StringRecord) -> Result<Vec<String>, AuditError> {
    let fields: Vec<&str> = header.iter().collect();
    if fields.len() < FIXED_COLUMNS.len() || fields[..FIXED_COLUMNS.len()] != FIXED_COLUMNS {
        return Err(AuditError::Header(format!(
            "expected leading columns {}",
            FIXED_COLUMNS.join(",")
        )));
    }
    let rest = &fields[FIXED_COLUMNS.len()..];
    if rest.len() % 3 != 0 {
        return Err(AuditError::Header(format!(
            "{} component columns is not a multiple of 3",
            rest.len()
        )));
    }
    rest.chunks(3)
        .map(|triple| {
            let name = triple[0].strip_suffix(VALUE_SUFFIX).ok_or_else(|| {
                AuditError::Header(format!("'{}' is not a {VALUE_SUFFIX} column", triple[0]))
            })?;
            if triple[1] != format!("{name}{TRIGGERED_SUFFIX}")
                || triple[2] != format!("{name}{REASON_SUFFIX}")
            {
                return Err(AuditError::Header(format!(
                    "columns for '{name}' are out of order"
                )));
            }
            Ok(name.to_string())
        })
        .collect()
}

fn parse_field<T: std::str::FromStr>(
    record: &csv::StringRecord,
    index: usize,
    column: &str,
    row: usize,
) -> Result<T, AuditError> {
    let raw = record.get(index).unwrap_or("");
    raw.parse().map_err(|_| AuditError::BadValue {
        row,
        column: column.to_string(),
        value: raw.to_string(),
    })
}

/// Parse a flattened audit CSV back into evaluations.
///
/// Every row is re-validated: a tampered strength or blocker is an error.
/// Rows are numbered from 1 (the first data row).
pub fn read_audit_csv<R: Read>(reader: R) -> Result<Vec<SignalEvaluation>, AuditError> {
    let mut rdr = csv::Reader::from_reader(reader);
    let names = parse_header(rdr.headers()?)?;

    let mut evaluations = Vec::new();
    for (i, result) in rdr.records().enumerate() {
        let record = result?;
        let row = i + 1;

        let blocking = record.get(4).unwrap_or("");
        let mut components = Vec::with_capacity(names.len());
        for (j, name) in names.iter().enumerate() {
            let base = FIXED_COLUMNS.len() + 3 * j;
            let value: f64 = parse_field(&record, base, &format!("{name}{VALUE_SUFFIX}"), row)?;
            let triggered: bool =
                parse_field(&record, base + 1, &format!("{name}{TRIGGERED_SUFFIX}"), row)?;
            let reason = record.get(base + 2).unwrap_or("");
            components.push(ComponentResult::new(name.as_str(), value, triggered, reason));
        }

        let evaluation = EvaluationRecord {
            timestamp: parse_field(&record, 0, "timestamp", row)?,
            bar_identity: record.get(1).unwrap_or("").to_string(),
            components,
            signal: parse_field(&record, 2, "signal", row)?,
            strength: parse_field(&record, 3, "strength", row)?,
            blocking_component: (!blocking.is_empty()).then(|| blocking.to_string()),
        };
        let evaluation = SignalEvaluation::try_from(evaluation)
            .map_err(|source| AuditError::Invariant { row, source })?;
        evaluations.push(evaluation);
    }
    Ok(evaluations)
}

/// Open and parse an audit CSV from disk.
pub fn load_audit_csv(path: &Path) -> Result<Vec<SignalEvaluation>, AuditError> {
    let file = File::open(path).map_err(|e| AuditError::io(path, e))?;
    read_audit_csv(BufReader::new(file))
}

// ─── JSON Lines ─────────────────────────────────────────────────────

/// Streaming reader over a JSON Lines evaluation file.
///
/// Yields one validated `SignalEvaluation` per non-blank line. Malformed
/// lines are errors, reported with their 1-based line number.
pub struct JsonlEvaluations<R> {
    lines: io::Lines<R>,
    path: PathBuf,
    line: usize,
}

impl<R: BufRead> JsonlEvaluations<R> {
    pub fn new(reader: R, path: impl Into<PathBuf>) -> Self {
        Self {
            lines: reader.lines(),
            path: path.into(),
            line: 0,
        }
    }
}

impl JsonlEvaluations<BufReader<File>> {
    pub fn open(path: &Path) -> Result<Self, AuditError> {
        let file = File::open(path).map_err(|e| AuditError::io(path, e))?;
        Ok(Self::new(BufReader::new(file), path))
    }
}

impl<R: BufRead> Iterator for JsonlEvaluations<R> {
    type Item = Result<SignalEvaluation, AuditError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            self.line += 1;
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(e) => return Some(Err(AuditError::io(&self.path, e))),
            };
            if line.trim().is_empty() {
                continue;
            }
            let line_no = self.line;
            return Some(
                serde_json::from_str(&line).map_err(|source| AuditError::Json {
                    line: line_no,
                    source,
                }),
            );
        }
    }
}

/// Append evaluations to `writer` as JSON Lines.
pub fn write_jsonl<'a, W, I>(writer: &mut W, evaluations: I) -> io::Result<usize>
where
    W: Write,
    I: IntoIterator<Item = &'a SignalEvaluation>,
{
    let mut count = 0;
    for evaluation in evaluations {
        serde_json::to_writer(&mut *writer, evaluation)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        writer.write_all(b"\n")?;
        count += 1;
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use siglab_core::config::SignalLogic;

    fn eval(ts: i64, outcomes: &[(&str, f64, bool)], logic: SignalLogic) -> SignalEvaluation {
        let components = outcomes
            .iter()
            .map(|&(name, value, triggered)| {
                ComponentResult::new(name, value, triggered, format!("{name} reason, with comma"))
            })
            .collect();
        SignalEvaluation::combine(ts, "SPY.1D", components, logic).unwrap()
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn header_has_three_columns_per_component() {
        let header = csv_header(&names(&["trend", "rsi"]));
        assert_eq!(
            header.join(","),
            "timestamp,bar_identity,signal,strength,blocking_component,\
             trend_value,trend_triggered,trend_reason,rsi_value,rsi_triggered,rsi_reason"
        );
    }

    #[test]
    fn csv_roundtrip_preserves_signal_strength_blocker() {
        let evaluations = vec![
            eval(1, &[("trend", 101.5, true), ("rsi", f64::NAN, false)], SignalLogic::And),
            eval(2, &[("trend", 1.0 / 3.0, true), ("rsi", 28.25, true)], SignalLogic::And),
            eval(3, &[("trend", -0.0, false), ("rsi", 1e-12, false)], SignalLogic::Or),
        ];
        let mut buf = Vec::new();
        let rows = write_audit_csv(
            &mut buf,
            names(&["trend", "rsi"]),
            evaluations.iter().cloned().map(Ok),
        )
        .unwrap();
        assert_eq!(rows, 3);

        let text = String::from_utf8(buf.clone()).unwrap();
        let first_row = text.lines().nth(1).unwrap();
        assert!(first_row.contains(",NaN,false,"));
        // Blocker column is empty when the signal fired.
        assert!(text.lines().nth(2).unwrap().starts_with("2,SPY.1D,true,1,,"));

        let back = read_audit_csv(buf.as_slice()).unwrap();
        assert_eq!(back.len(), 3);
        for (a, b) in evaluations.iter().zip(&back) {
            assert_eq!(a.signal(), b.signal());
            assert_eq!(a.strength(), b.strength());
            assert_eq!(a.blocking_component(), b.blocking_component());
            assert_eq!(a, b);
        }
    }

    #[test]
    fn writer_rejects_other_layout() {
        let mut writer = AuditCsvWriter::new(Vec::new(), names(&["trend"])).unwrap();
        let other = eval(1, &[("rsi", 1.0, true)], SignalLogic::And);
        assert!(matches!(
            writer.write(&other),
            Err(AuditError::LayoutMismatch { .. })
        ));
    }

    #[test]
    fn tampered_strength_is_rejected() {
        let csv = "timestamp,bar_identity,signal,strength,blocking_component,a_value,a_triggered,a_reason\n\
                   1,X,false,0.5,a,1,false,nope\n";
        assert!(matches!(
            read_audit_csv(csv.as_bytes()),
            Err(AuditError::Invariant { row: 1, .. })
        ));
    }

    #[test]
    fn malformed_header_is_rejected() {
        let csv = "timestamp,bar_identity,signal,strength,blocking_component,a_value,a_reason\n";
        assert!(matches!(
            read_audit_csv(csv.as_bytes()),
            Err(AuditError::Header(_))
        ));
    }

    #[test]
    fn bad_boolean_is_reported_with_column() {
        let csv = "timestamp,bar_identity,signal,strength,blocking_component,a_value,a_triggered,a_reason\n\
                   1,X,maybe,1,,1,true,ok\n";
        match read_audit_csv(csv.as_bytes()) {
            Err(AuditError::BadValue { row, column, .. }) => {
                assert_eq!(row, 1);
                assert_eq!(column, "signal");
            }
            other => panic!("expected BadValue, got {other:?}"),
        }
    }

    #[test]
    fn jsonl_reader_skips_blank_lines_and_numbers_errors() {
        let good = eval(7, &[("a", 1.0, true)], SignalLogic::And);
        let mut buf = Vec::new();
        write_jsonl(&mut buf, [&good]).unwrap();
        buf.extend_from_slice(b"\n{not json}\n");

        let mut reader = JsonlEvaluations::new(buf.as_slice(), "mem.jsonl");
        assert_eq!(reader.next().unwrap().unwrap(), good);
        assert!(matches!(
            reader.next(),
            Some(Err(AuditError::Json { line: 3, .. }))
        ));
        assert!(reader.next().is_none());
    }
}
