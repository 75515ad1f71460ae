//! Summary command for showing per-origin, per-day rollups.

use std::io::Write;

use anyhow::Result;
use cm_core::Summary;

use super::util::{day_or_today, format_average};
use crate::Engine;

pub struct SummaryArgs<'a> {
    pub origin: Option<&'a str>,
    pub day: Option<&'a str>,
    pub all: bool,
    pub json: bool,
}

pub fn run<W: Write>(writer: &mut W, engine: &Engine, args: &SummaryArgs<'_>) -> Result<()> {
    let summaries = if args.all {
        let db = engine.database();
        db.list_summary_keys()?
            .into_iter()
            .map(|(origin, day_key)| db.summarize(&origin, day_key))
            .collect::<Result<Vec<_>, _>>()?
    } else {
        let origin = args
            .origin
            .ok_or_else(|| anyhow::anyhow!("--origin is required unless --all is given"))?;
        vec![engine.get_summary(origin, &day_or_today(args.day))?]
    };

    if args.json {
        let text = if args.all {
            serde_json::to_string_pretty(&summaries)?
        } else {
            serde_json::to_string_pretty(&summaries[0])?
        };
        writeln!(writer, "{text}")?;
        return Ok(());
    }

    if summaries.is_empty() {
        writeln!(writer, "No events recorded.")?;
        return Ok(());
    }

    for (idx, summary) in summaries.iter().enumerate() {
        if idx > 0 {
            writeln!(writer)?;
        }
        write_summary(writer, summary)?;
    }
    Ok(())
}

fn write_summary<W: Write>(writer: &mut W, summary: &Summary) -> Result<()> {
    writeln!(writer, "{} on {}", summary.origin, summary.day_key)?;
    writeln!(writer, "  Keystrokes:           {}", summary.keystrokes)?;
    writeln!(
        writer,
        "  Avg inter-key (ms):   {}",
        format_average(summary.avg_inter_key_ms)
    )?;
    writeln!(
        writer,
        "  Undo / Redo:          {} / {}",
        summary.undo_count, summary.redo_count
    )?;
    writeln!(writer, "  Compile attempts:     {}", summary.compile_attempts)?;
    writeln!(writer, "  JS errors:            {}", summary.error_count)?;
    writeln!(
        writer,
        "  Idle events (max ms): {} ({})",
        summary.idle_events, summary.max_idle_ms
    )?;
    Ok(())
}
