//! Export commands for the full event log and for single summaries.

use std::io::Write;
use std::path::Path;

use anyhow::Result;
use cm_core::{BulkExport, ExportFormat};

use super::util::{day_or_today, write_payload};
use crate::Engine;

/// Message shown when a delimited export has nothing to write.
pub const NO_DATA_MESSAGE: &str = "No data to export.";

/// Exports every event. The notice for an empty export goes to `notice`.
pub fn run<W: Write, E: Write>(
    writer: &mut W,
    notice: &mut E,
    engine: &Engine,
    format: ExportFormat,
    output: Option<&Path>,
) -> Result<()> {
    match engine.export_bulk(format)? {
        BulkExport::Data(data) => {
            write_payload(writer, output, &data)?;
            if let Some(path) = output {
                tracing::info!(path = %path.display(), %format, "wrote export");
            }
        }
        BulkExport::NoData => writeln!(notice, "{NO_DATA_MESSAGE}")?,
    }
    Ok(())
}

/// Exports the labeled summary for one origin and day.
pub fn run_summary<W: Write>(
    writer: &mut W,
    engine: &Engine,
    origin: &str,
    day: Option<&str>,
    output: Option<&Path>,
) -> Result<()> {
    let summary = engine.get_summary(origin, &day_or_today(day))?;
    let data = engine.export_summary(&summary)?;
    write_payload(writer, output, &data)
}
