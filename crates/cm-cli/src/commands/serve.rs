//! Serve command: a JSON-lines request loop.
//!
//! Each input line is one [`Request`]; exactly one [`Response`] line is
//! written back per non-blank request line, in order.

use std::io::{BufRead, Write};

use anyhow::{Context, Result};

use crate::engine::{Request, Response};
use crate::Engine;

/// Handles requests until `reader` is exhausted. Returns the number handled.
pub fn run<R: BufRead, W: Write>(reader: R, writer: &mut W, engine: &mut Engine) -> Result<usize> {
    let mut handled = 0;
    for (idx, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("failed to read line {}", idx + 1))?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<Request>(trimmed) {
            Ok(request) => engine.handle(request),
            Err(err) => {
                tracing::debug!(line = idx + 1, error = %err, "unparseable request");
                Response::failure("validation", format!("invalid request: {err}"))
            }
        };
        serde_json::to_writer(&mut *writer, &response)?;
        writeln!(writer)?;
        writer.flush()?;
        handled += 1;
    }
    tracing::info!(handled, "request stream closed");
    Ok(handled)
}
