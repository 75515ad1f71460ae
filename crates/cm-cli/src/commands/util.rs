//! Shared utilities for CLI commands.

use std::fs;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::Local;
use cm_core::DayKey;

/// Resolves an optional `--day` argument, defaulting to today in local time.
pub fn day_or_today(day: Option<&str>) -> String {
    day.map_or_else(
        || DayKey::from(Local::now().date_naive()).to_string(),
        str::to_string,
    )
}

/// Writes `content` to `output`, or to `writer` when no path is given.
pub fn write_payload<W: Write>(writer: &mut W, output: Option<&Path>, content: &str) -> Result<()> {
    match output {
        Some(path) => {
            fs::write(path, content)
                .with_context(|| format!("failed to write {}", path.display()))?;
        }
        None => {
            writer.write_all(content.as_bytes())?;
            if !content.ends_with('\n') {
                writeln!(writer)?;
            }
        }
    }
    Ok(())
}

/// Formats an optional average for display.
pub fn format_average(avg: Option<f64>) -> String {
    avg.map_or_else(|| "-".to_string(), |ms| format!("{ms:.1}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_day_is_kept_verbatim() {
        assert_eq!(day_or_today(Some("2024-01-01")), "2024-01-01");
    }

    #[test]
    fn default_day_is_well_formed() {
        assert!(DayKey::parse(&day_or_today(None)).is_ok());
    }

    #[test]
    fn average_formatting() {
        assert_eq!(format_average(None), "-");
        assert_eq!(format_average(Some(100.0)), "100.0");
        assert_eq!(format_average(Some(83.333_333)), "83.3");
    }

    #[test]
    fn payload_goes_to_file_when_requested() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("out.csv");
        let mut stdout = Vec::new();
        write_payload(&mut stdout, Some(&path), "a,b\r\n").unwrap();
        assert!(stdout.is_empty());
        assert_eq!(fs::read_to_string(&path).unwrap(), "a,b\r\n");
    }
}
