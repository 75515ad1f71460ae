//! Recompute command for rebuilding or checking the summary cache.
//!
//! Summaries are maintained incrementally on append. This rebuilds them from
//! the event log, or with `--check` only reports keys whose cached counters
//! disagree with a fresh fold.

use std::io::Write;

use anyhow::{Result, bail};
use cm_core::SummaryCounters;

use crate::Engine;

pub fn run<W: Write>(writer: &mut W, engine: &mut Engine, check: bool) -> Result<()> {
    if !check {
        let keys = engine.recompute_summaries()?;
        writeln!(writer, "Rebuilt {keys} summary key(s).")?;
        return Ok(());
    }

    let mismatches = engine.database().verify_summaries()?;
    if mismatches.is_empty() {
        writeln!(writer, "Summaries match the event log.")?;
        return Ok(());
    }

    for mismatch in &mismatches {
        writeln!(
            writer,
            "- {} {}: cached {}, expected {}",
            mismatch.origin,
            mismatch.day_key,
            describe(mismatch.cached),
            describe(mismatch.expected)
        )?;
    }
    bail!(
        "{} summary key(s) out of date; run `cm recompute` to rebuild",
        mismatches.len()
    )
}

fn describe(counters: Option<SummaryCounters>) -> String {
    counters.map_or_else(
        || "nothing".to_string(),
        |c| {
            let events = c.keystrokes
                + c.undo_count
                + c.redo_count
                + c.compile_attempts
                + c.error_count
                + c.idle_events;
            format!("{events} event(s)")
        },
    )
}
