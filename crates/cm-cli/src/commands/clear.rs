//! Clear command for wiping the event log.

use std::io::Write;

use anyhow::Result;

use crate::Engine;

/// Removes every event and summary. Settings are kept.
pub fn run<W: Write>(writer: &mut W, engine: &mut Engine) -> Result<()> {
    let removed = engine.clear_all()?;
    writeln!(writer, "Removed {removed} event(s).")?;
    Ok(())
}
