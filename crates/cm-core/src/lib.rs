//! Core domain logic for code metrics.
//!
//! This crate contains the fundamental types and logic for:
//! - Validation: coercing loosely-typed producer payloads into [`Event`]s
//! - Summaries: folding events into per-(origin, day) rollups
//! - Export: rendering events and summaries as JSON or CSV
//!
//! It performs no I/O; storage lives in `cm-db`.

pub mod event;
pub mod export;
pub mod settings;
pub mod summary;
pub mod types;
mod validate;

pub use event::{Event, EventKind};
pub use export::{BulkExport, ExportError, ExportFormat, ExportRecord};
pub use settings::{DEFAULT_IDLE_MS, Settings};
pub use summary::{Summary, SummaryCounters, fold};
pub use types::{DayKey, Origin, ValidationError};
pub use validate::{MAX_METRIC_MS, RawEvent, validate};
