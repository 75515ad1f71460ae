//! Import command for bulk-loading events from JSON lines or a CSV export.
//!
//! Every record is validated before anything is written, and the batch is
//! appended in one transaction, so a bad line leaves the store untouched.

use std::io::BufRead;

use anyhow::{Context, Result};
use chrono::Local;
use cm_core::Event;
use cm_core::export::parse_delimited;
use serde_json::Value;

use crate::{Engine, ImportFormat};

pub fn run<R: BufRead>(engine: &mut Engine, format: ImportFormat, reader: R) -> Result<usize> {
    let events = match format {
        ImportFormat::Jsonl => parse_json_lines(engine, reader)?,
        ImportFormat::Csv => parse_csv(reader)?,
    };
    let inserted = engine.record_batch(&events).context("failed to append events")?;
    tracing::info!(inserted, "imported events");
    Ok(inserted)
}

fn parse_json_lines<R: BufRead>(engine: &Engine, reader: R) -> Result<Vec<Event>> {
    let mut events = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("failed to read line {}", idx + 1))?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let value: Value = serde_json::from_str(trimmed)
            .with_context(|| format!("invalid JSON on line {}", idx + 1))?;
        let event = engine
            .validate_payload(value)
            .with_context(|| format!("invalid event on line {}", idx + 1))?;
        events.push(event);
    }
    Ok(events)
}

fn parse_csv<R: BufRead>(mut reader: R) -> Result<Vec<Event>> {
    let mut text = String::new();
    reader
        .read_to_string(&mut text)
        .context("failed to read CSV input")?;
    let Some(table) = parse_delimited(&text).context("malformed CSV")? else {
        return Ok(Vec::new());
    };

    table
        .raw_events()
        .iter()
        .enumerate()
        .map(|(idx, raw)| {
            // Row 1 is the header.
            cm_core::validate(raw, &Local)
                .with_context(|| format!("invalid event on row {}", idx + 2))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    use cm_core::export::to_delimited_export;
    use cm_core::{BulkExport, DayKey, EventKind, Origin};

    #[test]
    fn imports_json_lines_skipping_blanks() {
        let mut engine = Engine::open_in_memory().unwrap();
        let input = concat!(
            r#"{"origin":"https://example.com","kind":"keystroke","timestamp":1,"dayKey":"2024-01-01"}"#,
            "\n\n",
            r#"{"origin":"https://example.com","type":"keystroke","timestamp":2,"day_key":"2024-01-01","metric":40}"#,
            "\n",
        );
        let inserted = run(&mut engine, ImportFormat::Jsonl, input.as_bytes()).unwrap();
        assert_eq!(inserted, 2);

        let summary = engine.get_summary("https://example.com", "2024-01-01").unwrap();
        assert_eq!(summary.keystrokes, 2);
        assert_eq!(summary.avg_inter_key_ms, Some(40.0));
    }

    #[test]
    fn bad_line_rejects_whole_batch() {
        let mut engine = Engine::open_in_memory().unwrap();
        let input = concat!(
            r#"{"origin":"https://example.com","kind":"undo","timestamp":1}"#,
            "\n",
            r#"{"origin":"https://example.com","kind":"undo","timestamp":"soon"}"#,
            "\n",
        );
        let err = run(&mut engine, ImportFormat::Jsonl, input.as_bytes()).unwrap_err();
        assert!(format!("{err:#}").starts_with("invalid event on line 2"));
        assert_eq!(engine.database().event_count().unwrap(), 0);
    }

    #[test]
    fn invalid_json_names_the_line() {
        let mut engine = Engine::open_in_memory().unwrap();
        let err = run(&mut engine, ImportFormat::Jsonl, "{not json\n".as_bytes()).unwrap_err();
        assert_eq!(err.to_string(), "invalid JSON on line 1");
    }

    #[test]
    fn imports_a_csv_export() {
        let origin = Origin::new("https://example.com").unwrap();
        let day = DayKey::parse("2024-01-01").unwrap();
        let events = [
            Event::new(origin.clone(), day, EventKind::Keystroke, 10).with_metric(90),
            Event::new(origin, day, EventKind::Idle, 20).with_metric(6000),
        ];
        let BulkExport::Data(csv) = to_delimited_export(&events) else {
            panic!("expected data");
        };

        let mut engine = Engine::open_in_memory().unwrap();
        let inserted = run(&mut engine, ImportFormat::Csv, csv.as_bytes()).unwrap();
        assert_eq!(inserted, 2);
        assert_eq!(engine.database().query_all().unwrap(), events);
    }

    #[test]
    fn empty_csv_imports_nothing() {
        let mut engine = Engine::open_in_memory().unwrap();
        assert_eq!(run(&mut engine, ImportFormat::Csv, "".as_bytes()).unwrap(), 0);
    }
}
