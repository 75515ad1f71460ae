//! Portable renderings of the event log and of single summaries.
//!
//! Three views are produced:
//! - a structured record set (one flat record per event, serialized as JSON),
//! - delimited text (CSV, every field quoted, CRLF row terminators),
//! - a single labeled summary record for download.
//!
//! [`parse_delimited`] reads the delimited view back and is used for
//! re-importing exported files.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::event::Event;
use crate::summary::Summary;
use crate::validate::RawEvent;

/// Errors produced while rendering or parsing exports.
#[derive(Debug, Error)]
pub enum ExportError {
    /// Failed to serialize a structured export.
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    /// A quoted field was still open at end of input.
    #[error("unterminated quoted field starting on row {row}")]
    UnterminatedQuote { row: usize },
    /// A quote appeared in the middle of an unquoted field, or text followed a closing quote.
    #[error("unexpected quote character on row {row}")]
    UnexpectedQuote { row: usize },
    /// A data row had a different number of fields than the header.
    #[error("row {row} has {found} fields, header has {expected}")]
    FieldCount {
        row: usize,
        expected: usize,
        found: usize,
    },
}

/// Output format of a bulk export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    /// Structured record set (JSON array).
    #[serde(alias = "structured")]
    Json,
    /// Delimited text (CSV).
    #[serde(alias = "delimited")]
    Csv,
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json => write!(f, "json"),
            Self::Csv => write!(f, "csv"),
        }
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" | "structured" => Ok(Self::Json),
            "csv" | "delimited" => Ok(Self::Csv),
            other => Err(format!("unknown export format: {other}")),
        }
    }
}

/// Result of a bulk export.
///
/// An empty log is a normal outcome, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BulkExport {
    /// The rendered payload.
    Data(String),
    /// There were no events to export.
    NoData,
}

/// One flat export record per event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportRecord {
    pub origin: String,
    pub day_key: String,
    pub kind: String,
    pub timestamp: i64,
    pub metric: Option<i64>,
}

impl ExportRecord {
    /// Field names, in column order.
    pub const FIELDS: [&'static str; 5] = ["origin", "dayKey", "kind", "timestamp", "metric"];

    /// Field values rendered as text, in [`Self::FIELDS`] order.
    ///
    /// An absent metric renders as an empty string.
    pub fn values(&self) -> [String; 5] {
        [
            self.origin.clone(),
            self.day_key.clone(),
            self.kind.clone(),
            self.timestamp.to_string(),
            self.metric.map(|m| m.to_string()).unwrap_or_default(),
        ]
    }
}

impl From<&Event> for ExportRecord {
    fn from(event: &Event) -> Self {
        Self {
            origin: event.origin.to_string(),
            day_key: event.day_key.to_string(),
            kind: event.kind.to_string(),
            timestamp: event.timestamp,
            metric: event.metric,
        }
    }
}

/// Converts events into flat export records, preserving order.
pub fn to_structured_export<'a, I>(events: I) -> Vec<ExportRecord>
where
    I: IntoIterator<Item = &'a Event>,
{
    events.into_iter().map(ExportRecord::from).collect()
}

/// Serializes the structured export as a pretty-printed JSON array.
pub fn to_structured_json(records: &[ExportRecord]) -> Result<String, ExportError> {
    Ok(serde_json::to_string_pretty(records)?)
}

/// Renders events as CSV.
///
/// The header row holds the record field names. Every field is quoted with
/// embedded quotes doubled, and every row ends in CRLF.
pub fn to_delimited_export<'a, I>(events: I) -> BulkExport
where
    I: IntoIterator<Item = &'a Event>,
{
    let mut events = events.into_iter().peekable();
    if events.peek().is_none() {
        return BulkExport::NoData;
    }

    let mut out = String::new();
    push_row(&mut out, ExportRecord::FIELDS.iter().copied());
    for event in events {
        let record = ExportRecord::from(event);
        let values = record.values();
        push_row(&mut out, values.iter().map(String::as_str));
    }
    BulkExport::Data(out)
}

fn push_row<'a>(out: &mut String, fields: impl Iterator<Item = &'a str>) {
    for (i, field) in fields.enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push('"');
        out.push_str(&field.replace('"', "\"\""));
        out.push('"');
    }
    out.push_str("\r\n");
}

/// A parsed delimited file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelimitedTable {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl DelimitedTable {
    /// Turns each row into a [`RawEvent`] keyed by the header names.
    ///
    /// Empty cells are treated as absent so that a blank `metric` column
    /// reads back as no metric.
    pub fn raw_events(&self) -> Vec<RawEvent> {
        self.rows
            .iter()
            .map(|row| {
                let mut object = Map::new();
                for (name, value) in self.header.iter().zip(row) {
                    if !value.is_empty() {
                        object.insert(name.clone(), Value::String(value.clone()));
                    }
                }
                RawEvent {
                    origin: object.remove("origin"),
                    day_key: object.remove("dayKey"),
                    kind: object.remove("kind"),
                    timestamp: object.remove("timestamp"),
                    metric: object.remove("metric"),
                }
            })
            .collect()
    }
}

/// Parses CSV produced by [`to_delimited_export`].
///
/// Accepts both quoted and bare fields and both CRLF and LF row endings.
/// Returns `None` for empty input.
pub fn parse_delimited(text: &str) -> Result<Option<DelimitedTable>, ExportError> {
    let mut rows = parse_rows(text)?;
    if rows.is_empty() {
        return Ok(None);
    }
    let header = rows.remove(0);
    for (i, row) in rows.iter().enumerate() {
        if row.len() != header.len() {
            return Err(ExportError::FieldCount {
                row: i + 2,
                expected: header.len(),
                found: row.len(),
            });
        }
    }
    Ok(Some(DelimitedTable { header, rows }))
}

fn parse_rows(text: &str) -> Result<Vec<Vec<String>>, ExportError> {
    let mut rows = Vec::new();
    let mut row = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut was_quoted = false;
    let mut quote_row = 1;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        let row_number = rows.len() + 1;
        if in_quotes {
            if c == '"' {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    field.push('"');
                } else {
                    in_quotes = false;
                }
            } else {
                field.push(c);
            }
            continue;
        }
        match c {
            '"' if field.is_empty() && !was_quoted => {
                in_quotes = true;
                was_quoted = true;
                quote_row = row_number;
            }
            '"' => return Err(ExportError::UnexpectedQuote { row: row_number }),
            ',' => {
                row.push(std::mem::take(&mut field));
                was_quoted = false;
            }
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' => {
                row.push(std::mem::take(&mut field));
                rows.push(std::mem::take(&mut row));
                was_quoted = false;
            }
            _ if was_quoted => return Err(ExportError::UnexpectedQuote { row: row_number }),
            _ => field.push(c),
        }
    }

    if in_quotes {
        return Err(ExportError::UnterminatedQuote { row: quote_row });
    }
    if was_quoted || !field.is_empty() || !row.is_empty() {
        row.push(field);
        rows.push(row);
    }
    Ok(rows)
}

/// Display-oriented rendering of a single summary.
///
/// Field order and labels are fixed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryExport {
    #[serde(rename = "Origin")]
    pub origin: String,
    #[serde(rename = "Keystrokes")]
    pub keystrokes: i64,
    #[serde(rename = "Avg inter-key (ms)")]
    pub avg_inter_key_ms: AverageCell,
    #[serde(rename = "Undo / Redo")]
    pub undo_redo: String,
    #[serde(rename = "Compile attempts")]
    pub compile_attempts: i64,
    #[serde(rename = "JS errors")]
    pub error_count: i64,
    #[serde(rename = "Idle events (max ms)")]
    pub idle: String,
}

/// The average cell: a number, or `"-"` when undefined.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AverageCell {
    Value(f64),
    Missing(&'static str),
}

impl From<&Summary> for SummaryExport {
    fn from(summary: &Summary) -> Self {
        Self {
            origin: summary.origin.to_string(),
            keystrokes: summary.keystrokes,
            avg_inter_key_ms: summary
                .avg_inter_key_ms
                .map_or(AverageCell::Missing("-"), AverageCell::Value),
            undo_redo: format!("{} / {}", summary.undo_count, summary.redo_count),
            compile_attempts: summary.compile_attempts,
            error_count: summary.error_count,
            idle: format!("{} ({})", summary.idle_events, summary.max_idle_ms),
        }
    }
}

/// Renders one summary as a pretty-printed, labeled JSON object.
pub fn to_summary_export(summary: &Summary) -> Result<String, ExportError> {
    Ok(serde_json::to_string_pretty(&SummaryExport::from(summary))?)
}
