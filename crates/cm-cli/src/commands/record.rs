//! Record command for appending a single raw event.

use std::io::{Read, Write};

use anyhow::{Context, Result};
use serde_json::Value;

use crate::Engine;

/// Validates and appends one event given as a JSON object.
///
/// When `payload` is `None` the JSON is read from `input`.
pub fn run<R: Read, W: Write>(
    writer: &mut W,
    engine: &mut Engine,
    payload: Option<&str>,
    mut input: R,
) -> Result<()> {
    let text = match payload {
        Some(text) => text.to_string(),
        None => {
            let mut buf = String::new();
            input
                .read_to_string(&mut buf)
                .context("failed to read event from stdin")?;
            buf
        }
    };
    let value: Value = serde_json::from_str(&text).context("event is not valid JSON")?;
    let seq = engine.record_event(value).context("event rejected")?;
    writeln!(writer, "Recorded event #{seq}")?;
    Ok(())
}
