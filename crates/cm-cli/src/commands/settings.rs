//! Settings command for reading and replacing the settings record.

use std::io::Write;

use anyhow::Result;
use cm_core::Settings;

use crate::{Engine, SettingsAction};

pub fn run<W: Write>(writer: &mut W, engine: &mut Engine, action: &SettingsAction) -> Result<()> {
    match action {
        SettingsAction::Get { json } => {
            let settings = engine.get_settings()?;
            if *json {
                writeln!(writer, "{}", serde_json::to_string(&settings)?)?;
            } else {
                writeln!(writer, "Idle threshold: {} ms", settings.idle_ms)?;
            }
        }
        SettingsAction::Set { idle_ms } => {
            engine.set_settings(&Settings { idle_ms: *idle_ms })?;
            writeln!(writer, "Idle threshold set to {idle_ms} ms")?;
        }
    }
    Ok(())
}
