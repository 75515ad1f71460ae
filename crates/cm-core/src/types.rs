//! Core type definitions with validation.

use std::fmt;

use chrono::{DateTime, NaiveDate, TimeZone};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Format of a day key (`YYYY-MM-DD`), sortable lexicographically.
pub const DAY_KEY_FORMAT: &str = "%Y-%m-%d";

/// Validation errors for incoming events.
///
/// Each variant names the field that failed so the producer can fix it.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A required field was absent or null.
    #[error("{field} is required")]
    Missing { field: &'static str },

    /// The provided value was empty.
    #[error("{field} cannot be empty")]
    Empty { field: &'static str },

    /// The field had the wrong JSON type or shape.
    #[error("{field} is malformed: {reason}")]
    Malformed {
        field: &'static str,
        reason: String,
    },

    /// The event kind is not one of the known kinds.
    #[error("unknown event kind: {0}")]
    UnknownKind(String),
}

impl ValidationError {
    /// Returns the name of the field that failed validation.
    #[must_use]
    pub const fn field(&self) -> &'static str {
        match self {
            Self::Missing { field } | Self::Empty { field } | Self::Malformed { field, .. } => {
                *field
            }
            Self::UnknownKind(_) => "kind",
        }
    }

    pub(crate) fn malformed(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Malformed {
            field,
            reason: reason.into(),
        }
    }
}

/// A normalized page origin (`scheme://host[:port]`).
///
/// Construction lowercases scheme and host, drops any path, query or trailing
/// slash, and strips the default port for `http`/`https`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Origin(String);

impl Origin {
    /// Normalizes and validates an origin string.
    pub fn new(origin: impl AsRef<str>) -> Result<Self, ValidationError> {
        let normalized = normalize_origin(origin.as_ref());
        if normalized.is_empty() {
            return Err(ValidationError::Empty { field: "origin" });
        }
        Ok(Self(normalized))
    }

    /// Returns the origin as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn normalize_origin(raw: &str) -> String {
    let trimmed = raw.trim();
    let Some((scheme, rest)) = trimmed.split_once("://") else {
        // Opaque origins ("null", "file:") have no authority to normalize.
        return trimmed.trim_end_matches('/').to_ascii_lowercase();
    };
    let scheme = scheme.to_ascii_lowercase();
    let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
    // Userinfo is never part of an origin.
    let mut authority = authority
        .rsplit_once('@')
        .map_or(authority, |(_, host)| host)
        .to_ascii_lowercase();
    let default_port = match scheme.as_str() {
        "http" => Some(":80"),
        "https" => Some(":443"),
        _ => None,
    };
    if let Some(host_len) = default_port
        .and_then(|port| authority.strip_suffix(port))
        .map(str::len)
    {
        authority.truncate(host_len);
    }
    if authority.is_empty() {
        return String::new();
    }
    format!("{scheme}://{authority}")
}

impl TryFrom<String> for Origin {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Origin> for String {
    fn from(origin: Origin) -> Self {
        origin.0
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for Origin {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A calendar-day bucket in `YYYY-MM-DD` form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DayKey(NaiveDate);

impl DayKey {
    /// Parses a `YYYY-MM-DD` day key.
    pub fn parse(value: &str) -> Result<Self, ValidationError> {
        let value = value.trim();
        if value.is_empty() {
            return Err(ValidationError::Empty { field: "dayKey" });
        }
        NaiveDate::parse_from_str(value, DAY_KEY_FORMAT)
            .map(Self)
            .map_err(|err| ValidationError::malformed("dayKey", format!("{value}: {err}")))
    }

    /// Derives the day key of an epoch-millisecond timestamp in the given time zone.
    pub fn from_timestamp_ms<Tz: TimeZone>(
        timestamp_ms: i64,
        tz: &Tz,
    ) -> Result<Self, ValidationError> {
        let utc = DateTime::from_timestamp_millis(timestamp_ms).ok_or_else(|| {
            ValidationError::malformed("timestamp", format!("{timestamp_ms} is out of range"))
        })?;
        Ok(Self(utc.with_timezone(tz).date_naive()))
    }

    /// Returns the underlying calendar date.
    #[must_use]
    pub const fn date(self) -> NaiveDate {
        self.0
    }
}

impl From<NaiveDate> for DayKey {
    fn from(date: NaiveDate) -> Self {
        Self(date)
    }
}

impl TryFrom<String> for DayKey {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<DayKey> for String {
    fn from(day: DayKey) -> Self {
        day.to_string()
    }
}

impl fmt::Display for DayKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(DAY_KEY_FORMAT))
    }
}

impl std::str::FromStr for DayKey {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{FixedOffset, Utc};

    use super::*;

    #[test]
    fn origin_lowercases_and_strips_trailing_slash() {
        let origin = Origin::new("HTTPS://Example.COM/").unwrap();
        assert_eq!(origin.as_str(), "https://example.com");
    }

    #[test]
    fn origin_drops_path_and_query() {
        let origin = Origin::new("https://example.com/editor/main.rs?tab=2#L10").unwrap();
        assert_eq!(origin.as_str(), "https://example.com");
    }

    #[test]
    fn origin_strips_default_ports_only() {
        assert_eq!(
            Origin::new("https://example.com:443").unwrap().as_str(),
            "https://example.com"
        );
        assert_eq!(
            Origin::new("http://localhost:80/").unwrap().as_str(),
            "http://localhost"
        );
        assert_eq!(
            Origin::new("http://localhost:8080").unwrap().as_str(),
            "http://localhost:8080"
        );
        assert_eq!(
            Origin::new("http://example.com:443").unwrap().as_str(),
            "http://example.com:443"
        );
    }

    #[test]
    fn origin_drops_userinfo() {
        assert_eq!(
            Origin::new("https://user:p@ss@Example.com:443/login").unwrap().as_str(),
            "https://example.com"
        );
        assert_eq!(
            Origin::new("http://admin@localhost:8080").unwrap().as_str(),
            "http://localhost:8080"
        );
        assert!(Origin::new("https://user@").is_err());
    }

    #[test]
    fn origin_rejects_empty() {
        assert_eq!(
            Origin::new("   ").unwrap_err(),
            ValidationError::Empty { field: "origin" }
        );
        assert!(Origin::new("https:///path").is_err());
    }

    #[test]
    fn origin_keeps_opaque_values() {
        assert_eq!(Origin::new("null").unwrap().as_str(), "null");
    }

    #[test]
    fn origin_deserialize_normalizes() {
        let origin: Origin = serde_json::from_str(r#""https://Example.com/""#).unwrap();
        assert_eq!(origin.as_str(), "https://example.com");
        let result: Result<Origin, _> = serde_json::from_str(r#""""#);
        assert!(result.is_err());
    }

    #[test]
    fn day_key_parses_and_formats() {
        let day = DayKey::parse("2024-01-01").unwrap();
        assert_eq!(day.to_string(), "2024-01-01");
    }

    #[test]
    fn day_key_rejects_bad_dates() {
        assert_eq!(DayKey::parse("2024-02-30").unwrap_err().field(), "dayKey");
        assert_eq!(DayKey::parse("01/02/2024").unwrap_err().field(), "dayKey");
        assert_eq!(
            DayKey::parse("").unwrap_err(),
            ValidationError::Empty { field: "dayKey" }
        );
    }

    #[test]
    fn day_key_from_timestamp_respects_time_zone() {
        // 2024-01-01T23:30:00Z
        let ts = 1_704_151_800_000;
        assert_eq!(
            DayKey::from_timestamp_ms(ts, &Utc).unwrap().to_string(),
            "2024-01-01"
        );
        let plus_two = FixedOffset::east_opt(2 * 3600).unwrap();
        assert_eq!(
            DayKey::from_timestamp_ms(ts, &plus_two).unwrap().to_string(),
            "2024-01-02"
        );
    }

    #[test]
    fn day_key_from_out_of_range_timestamp_fails() {
        let err = DayKey::from_timestamp_ms(i64::MAX, &Utc).unwrap_err();
        assert_eq!(err.field(), "timestamp");
    }
}
