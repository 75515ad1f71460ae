//! Per-(origin, day) activity summaries.
//!
//! [`fold`] is the reference definition of a summary. Storage keeps
//! [`SummaryCounters`] up to date incrementally and must always agree with a
//! fresh fold over the same events.

use serde::{Deserialize, Serialize};

use crate::event::{Event, EventKind};
use crate::types::{DayKey, Origin};

/// Running totals from which a [`Summary`] is derived.
///
/// The inter-key mean is kept as a sum and a count so that incremental
/// updates produce exactly the same value as a full fold.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SummaryCounters {
    pub keystrokes: i64,
    pub interval_sum_ms: i64,
    pub interval_count: i64,
    pub undo_count: i64,
    pub redo_count: i64,
    pub compile_attempts: i64,
    pub error_count: i64,
    pub idle_events: i64,
    pub max_idle_ms: i64,
}

impl SummaryCounters {
    /// Folds one event into the counters.
    pub fn apply(&mut self, event: &Event) {
        match event.kind {
            EventKind::Keystroke => {
                self.keystrokes += 1;
                if let Some(interval) = event.metric {
                    self.interval_sum_ms += interval;
                    self.interval_count += 1;
                }
            }
            EventKind::Undo => self.undo_count += 1,
            EventKind::Redo => self.redo_count += 1,
            EventKind::Compile => self.compile_attempts += 1,
            EventKind::Error => self.error_count += 1,
            EventKind::Idle => {
                self.idle_events += 1;
                if let Some(gap) = event.metric {
                    self.max_idle_ms = self.max_idle_ms.max(gap);
                }
            }
        }
    }

    /// Mean inter-key interval, or `None` when no interval was recorded.
    #[expect(
        clippy::cast_precision_loss,
        reason = "millisecond sums stay far below 2^53"
    )]
    pub fn avg_inter_key_ms(&self) -> Option<f64> {
        (self.interval_count > 0)
            .then(|| self.interval_sum_ms as f64 / self.interval_count as f64)
    }

    /// Renders the counters as the summary for `origin` on `day_key`.
    pub fn into_summary(self, origin: Origin, day_key: DayKey) -> Summary {
        Summary {
            origin,
            day_key,
            keystrokes: self.keystrokes,
            avg_inter_key_ms: self.avg_inter_key_ms(),
            undo_count: self.undo_count,
            redo_count: self.redo_count,
            compile_attempts: self.compile_attempts,
            error_count: self.error_count,
            idle_events: self.idle_events,
            max_idle_ms: self.max_idle_ms,
        }
    }
}

/// Derived per-(origin, day) rollup of activity events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub origin: Origin,
    pub day_key: DayKey,
    pub keystrokes: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avg_inter_key_ms: Option<f64>,
    pub undo_count: i64,
    pub redo_count: i64,
    pub compile_attempts: i64,
    pub error_count: i64,
    pub idle_events: i64,
    pub max_idle_ms: i64,
}

impl Summary {
    /// The all-zero summary of a key with no events.
    pub fn empty(origin: Origin, day_key: DayKey) -> Self {
        SummaryCounters::default().into_summary(origin, day_key)
    }
}

/// Folds events into the summary for `origin` on `day_key`.
///
/// Events for other keys are ignored, so callers may pass an unfiltered
/// slice of the log.
pub fn fold<'a, I>(origin: &Origin, day_key: DayKey, events: I) -> Summary
where
    I: IntoIterator<Item = &'a Event>,
{
    let mut counters = SummaryCounters::default();
    for event in events {
        if event.origin == *origin && event.day_key == day_key {
            counters.apply(event);
        }
    }
    counters.into_summary(origin.clone(), day_key)
}
