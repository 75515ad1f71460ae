//! Init command for creating the database and default settings.

use std::io::Write;

use anyhow::Result;

use crate::{Config, Engine};

/// Runs the init command.
///
/// Opening the engine creates the schema and seeds default settings.
pub fn run<W: Write>(writer: &mut W, engine: &Engine, config: &Config) -> Result<()> {
    let settings = engine.get_settings()?;

    writeln!(writer, "Database:       {}", config.database_path.display())?;
    writeln!(writer, "Idle threshold: {} ms", settings.idle_ms)?;

    Ok(())
}
