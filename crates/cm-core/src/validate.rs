//! Boundary validation for loosely-typed event payloads.
//!
//! The instrumented page sends whatever JSON it likes. Nothing untyped gets
//! past [`validate`]: the result is either a well-formed [`Event`] or a
//! [`ValidationError`] naming the offending field.

use chrono::TimeZone;
use serde::Deserialize;
use serde_json::Value;

use crate::event::{Event, EventKind};
use crate::types::{DayKey, Origin, ValidationError};

/// A candidate event as received from a producer.
///
/// Every field is optional and untyped so that shape errors are reported as
/// [`ValidationError`]s rather than opaque deserialization failures.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawEvent {
    #[serde(default)]
    pub origin: Option<Value>,
    #[serde(default, alias = "day_key")]
    pub day_key: Option<Value>,
    #[serde(default, alias = "type")]
    pub kind: Option<Value>,
    #[serde(default)]
    pub timestamp: Option<Value>,
    #[serde(default)]
    pub metric: Option<Value>,
}

impl RawEvent {
    /// Builds a raw event from an arbitrary JSON value.
    ///
    /// Anything other than an object is rejected.
    pub fn from_value(value: Value) -> Result<Self, ValidationError> {
        if !value.is_object() {
            return Err(ValidationError::malformed(
                "payload",
                format!("expected an object, got {}", json_type(&value)),
            ));
        }
        serde_json::from_value(value)
            .map_err(|err| ValidationError::malformed("payload", err.to_string()))
    }
}

/// Validates and normalizes a raw event.
///
/// `tz` is the zone used to derive the day key when the producer did not
/// supply one; production callers pass [`chrono::Local`].
pub fn validate<Tz: TimeZone>(raw: &RawEvent, tz: &Tz) -> Result<Event, ValidationError> {
    let origin = require_str(raw.origin.as_ref(), "origin")?;
    let origin = Origin::new(origin)?;

    let kind = require_str(raw.kind.as_ref(), "kind")?;
    let kind: EventKind = kind.parse()?;

    let timestamp = match non_null(raw.timestamp.as_ref()) {
        Some(value) => coerce_integer(value, "timestamp")?,
        None => return Err(ValidationError::Missing { field: "timestamp" }),
    };

    let day_key = match non_null(raw.day_key.as_ref()) {
        Some(Value::String(s)) => DayKey::parse(s)?,
        Some(other) => {
            return Err(ValidationError::malformed(
                "dayKey",
                format!("expected a string, got {}", json_type(other)),
            ));
        }
        None => DayKey::from_timestamp_ms(timestamp, tz)?,
    };

    let metric = non_null(raw.metric.as_ref())
        .map(coerce_metric)
        .transpose()?;

    Ok(Event {
        origin,
        day_key,
        kind,
        timestamp,
        metric,
    })
}

fn non_null(value: Option<&Value>) -> Option<&Value> {
    value.filter(|v| !v.is_null())
}

fn require_str<'a>(
    value: Option<&'a Value>,
    field: &'static str,
) -> Result<&'a str, ValidationError> {
    match non_null(value) {
        Some(Value::String(s)) if s.trim().is_empty() => Err(ValidationError::Empty { field }),
        Some(Value::String(s)) => Ok(s),
        Some(other) => Err(ValidationError::malformed(
            field,
            format!("expected a string, got {}", json_type(other)),
        )),
        None => Err(ValidationError::Missing { field }),
    }
}

/// Accepts JSON integers, integral floats, and numeric strings.
#[expect(
    clippy::cast_possible_truncation,
    reason = "value is integral and range-checked before the cast"
)]
fn coerce_integer(value: &Value, field: &'static str) -> Result<i64, ValidationError> {
    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                return Ok(i);
            }
            match n.as_f64() {
                Some(f) if f.fract() == 0.0 && in_i64_range(f) => Ok(f as i64),
                _ => Err(ValidationError::malformed(
                    field,
                    format!("{n} is not an integer"),
                )),
            }
        }
        Value::String(s) => s.trim().parse::<i64>().map_err(|err| {
            ValidationError::malformed(field, format!("{s:?} is not an integer: {err}"))
        }),
        other => Err(ValidationError::malformed(
            field,
            format!("expected a number, got {}", json_type(other)),
        )),
    }
}

/// Largest accepted metric: `u32::MAX` ms, about 49.7 days.
///
/// Summary sums of this many ms stay within `i64` for any realistic
/// number of events, so storage and [`crate::fold`] never overflow.
pub const MAX_METRIC_MS: i64 = 4_294_967_295;

/// Metrics are millisecond durations; fractional values are rounded.
#[expect(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    reason = "value is finite, non-negative and range-checked before the cast"
)]
fn coerce_metric(value: &Value) -> Result<i64, ValidationError> {
    let ms = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        other => {
            return Err(ValidationError::malformed(
                "metric",
                format!("expected a number, got {}", json_type(other)),
            ));
        }
    };
    match ms {
        Some(ms) if ms.is_finite() && ms < 0.0 => Err(ValidationError::malformed(
            "metric",
            format!("{ms} is negative"),
        )),
        Some(ms) if ms.is_finite() && ms.round() > MAX_METRIC_MS as f64 => {
            Err(ValidationError::malformed(
                "metric",
                format!("{ms} exceeds the {MAX_METRIC_MS} ms limit"),
            ))
        }
        Some(ms) if ms.is_finite() => Ok(ms.round() as i64),
        _ => Err(ValidationError::malformed(
            "metric",
            format!("{value} is not a finite number"),
        )),
    }
}

#[expect(
    clippy::cast_precision_loss,
    reason = "bounds check only needs to be approximate at the i64 edges"
)]
fn in_i64_range(value: f64) -> bool {
    value >= i64::MIN as f64 && value < i64::MAX as f64
}

const fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
