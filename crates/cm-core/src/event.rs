//! Validated activity events and the closed set of event kinds.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::types::{DayKey, Origin, ValidationError};

/// Canonical event kinds emitted by the instrumented page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Keystroke,
    Undo,
    Redo,
    Compile,
    Error,
    Idle,
}

impl EventKind {
    /// Every kind, in a stable order.
    pub const ALL: [Self; 6] = [
        Self::Keystroke,
        Self::Undo,
        Self::Redo,
        Self::Compile,
        Self::Error,
        Self::Idle,
    ];

    /// String representation for storage and export.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Keystroke => "keystroke",
            Self::Undo => "undo",
            Self::Redo => "redo",
            Self::Compile => "compile",
            Self::Error => "error",
            Self::Idle => "idle",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "keystroke" => Ok(Self::Keystroke),
            "undo" => Ok(Self::Undo),
            "redo" => Ok(Self::Redo),
            "compile" => Ok(Self::Compile),
            "error" => Ok(Self::Error),
            "idle" => Ok(Self::Idle),
            _ => Err(ValidationError::UnknownKind(s.to_string())),
        }
    }
}

impl Serialize for EventKind {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EventKind {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// An immutable fact about user activity, ready for the event log.
///
/// Events carry no identity of their own; the log assigns a sequence number
/// on append.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub origin: Origin,
    pub day_key: DayKey,
    pub kind: EventKind,
    /// Epoch milliseconds. Used for ordering only, not unique.
    pub timestamp: i64,
    /// Inter-key interval for keystrokes, gap length for idle events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metric: Option<i64>,
}

impl Event {
    /// Creates an event with no metric.
    pub fn new(origin: Origin, day_key: DayKey, kind: EventKind, timestamp: i64) -> Self {
        Self {
            origin,
            day_key,
            kind,
            timestamp,
            metric: None,
        }
    }

    /// Attaches a metric payload.
    #[must_use]
    pub fn with_metric(mut self, metric: i64) -> Self {
        self.metric = Some(metric);
        self
    }
}
