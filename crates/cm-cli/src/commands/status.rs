//! Status command for showing what the store holds.

use std::io::Write;

use anyhow::Result;

use crate::{Config, Engine};

pub fn run<W: Write>(writer: &mut W, engine: &Engine, config: &Config) -> Result<()> {
    let db = engine.database();
    let count = db.event_count()?;
    let settings = db.get_settings()?;
    let keys = db.list_summary_keys()?;

    writeln!(writer, "Code metrics status")?;
    writeln!(writer, "Database: {}", config.database_path.display())?;
    writeln!(writer, "Idle threshold: {} ms", settings.idle_ms)?;
    writeln!(writer, "Events: {count}")?;

    if keys.is_empty() {
        writeln!(writer, "No events recorded.")?;
        return Ok(());
    }

    writeln!(writer, "Summaries:")?;
    for (origin, day_key) in keys {
        let summary = db.summarize(&origin, day_key)?;
        writeln!(
            writer,
            "- {origin} {day_key}: {} keystroke(s), {} error(s)",
            summary.keystrokes, summary.error_count
        )?;
    }

    Ok(())
}
