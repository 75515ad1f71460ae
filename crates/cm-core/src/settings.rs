//! The persisted settings record.

use serde::{Deserialize, Serialize};

/// Idle threshold used when no settings have been saved yet.
pub const DEFAULT_IDLE_MS: i64 = 5000;

/// Process-wide configuration shared with the instrumented page.
///
/// Values are stored as given; nothing here is range-checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    /// Gap (ms) above which the producer reports an `idle` event.
    pub idle_ms: i64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            idle_ms: DEFAULT_IDLE_MS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_idle_threshold() {
        assert_eq!(Settings::default().idle_ms, 5000);
    }

    #[test]
    fn serde_uses_camel_case_and_accepts_negative() {
        let settings: Settings = serde_json::from_str(r#"{"idleMs": -1}"#).unwrap();
        assert_eq!(settings.idle_ms, -1);
        assert_eq!(
            serde_json::to_string(&settings).unwrap(),
            r#"{"idleMs":-1}"#
        );
    }

    #[test]
    fn missing_field_is_a_shape_error() {
        let result: Result<Settings, _> = serde_json::from_str("{}");
        assert!(result.is_err());
    }
}
