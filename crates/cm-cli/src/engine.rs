//! Request/response engine over the metrics store.
//!
//! [`Engine`] owns a [`Database`] and exposes one method per boundary
//! operation. [`Engine::handle`] offers the same operations as serde-tagged
//! messages, using the message names of the browser extension, so any
//! surface that can exchange JSON (the `serve` command, tests) can drive it.
//!
//! # Lifecycle
//!
//! [`Engine::open`] creates the schema and writes default settings if none
//! exist yet. Dropping the engine closes the database.

use std::path::Path;

use chrono::{Local, TimeZone};
use cm_core::export::{self, ExportFormat};
use cm_core::{BulkExport, DayKey, Event, Origin, RawEvent, Settings, Summary, ValidationError};
use cm_db::{Database, DbError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Errors surfaced to engine callers.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The input was malformed; fix it and resubmit.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// The store failed; the operation may be retried.
    #[error(transparent)]
    Storage(#[from] DbError),
    /// An export could not be rendered.
    #[error(transparent)]
    Export(#[from] export::ExportError),
}

impl EngineError {
    /// Short machine-readable class of the error.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Storage(_) => "storage",
            Self::Export(_) => "export",
        }
    }
}

/// A boundary request, tagged by message type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Request {
    #[serde(rename = "metrics:event")]
    RecordEvent { payload: Value },
    #[serde(rename = "metrics:summary")]
    GetSummary {
        origin: String,
        #[serde(rename = "dayKey")]
        day_key: String,
    },
    #[serde(rename = "metrics:export")]
    ExportBulk {
        #[serde(default)]
        format: Option<ExportFormat>,
    },
    #[serde(rename = "metrics:export-summary")]
    ExportSummary { summary: Summary },
    #[serde(rename = "metrics:clear")]
    ClearAll,
    #[serde(rename = "settings:get")]
    GetSettings,
    #[serde(rename = "settings:set")]
    SetSettings { settings: Settings },
}

impl Request {
    /// The message type name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::RecordEvent { .. } => "metrics:event",
            Self::GetSummary { .. } => "metrics:summary",
            Self::ExportBulk { .. } => "metrics:export",
            Self::ExportSummary { .. } => "metrics:export-summary",
            Self::ClearAll => "metrics:clear",
            Self::GetSettings => "settings:get",
            Self::SetSettings { .. } => "settings:set",
        }
    }
}

/// Error details carried by a failed [`Response`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub kind: String,
    pub message: String,
}

/// Reply to a [`Request`]. Only the fields relevant to the request are set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seq: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<Summary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub no_data: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub removed: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<Settings>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl Response {
    /// A bare acknowledgment.
    #[must_use]
    pub fn ack() -> Self {
        Self {
            ok: true,
            ..Self::default()
        }
    }

    /// A failed acknowledgment.
    #[must_use]
    pub fn failure(kind: &str, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: Some(ErrorBody {
                kind: kind.to_string(),
                message: message.into(),
            }),
            ..Self::default()
        }
    }
}

impl From<&EngineError> for Response {
    fn from(err: &EngineError) -> Self {
        Self::failure(err.kind(), err.to_string())
    }
}

/// The event store and aggregation engine.
pub struct Engine {
    db: Database,
}

impl Engine {
    /// Wraps an already-open database.
    pub const fn new(db: Database) -> Self {
        Self { db }
    }

    /// Opens (or creates) the database at `path` and seeds default settings.
    pub fn open(path: &Path) -> Result<Self, EngineError> {
        let mut db = Database::open(path)?;
        if db.init_settings()? {
            tracing::debug!(path = %path.display(), "initialized default settings");
        }
        Ok(Self::new(db))
    }

    /// Opens a throwaway in-memory engine.
    pub fn open_in_memory() -> Result<Self, EngineError> {
        let mut db = Database::open_in_memory()?;
        db.init_settings()?;
        Ok(Self::new(db))
    }

    /// Read access to the underlying store.
    pub const fn database(&self) -> &Database {
        &self.db
    }

    /// Validates a raw payload, deriving missing day keys in local time.
    pub fn validate_payload(&self, payload: Value) -> Result<Event, ValidationError> {
        validate_in(payload, &Local)
    }

    /// Validates and appends one raw event. Returns its sequence number.
    pub fn record_event(&mut self, payload: Value) -> Result<i64, EngineError> {
        let event = self.validate_payload(payload)?;
        Ok(self.db.append(&event)?)
    }

    /// Like [`Self::record_event`] but derives day keys in `tz`.
    pub fn record_event_in<Tz: TimeZone>(
        &mut self,
        payload: Value,
        tz: &Tz,
    ) -> Result<i64, EngineError> {
        let event = validate_in(payload, tz)?;
        Ok(self.db.append(&event)?)
    }

    /// Appends already-validated events atomically.
    pub fn record_batch(&mut self, events: &[Event]) -> Result<usize, EngineError> {
        Ok(self.db.append_batch(events)?)
    }

    /// Returns the summary for `origin` on `day_key`.
    ///
    /// Both keys are normalized the same way as incoming events.
    pub fn get_summary(&self, origin: &str, day_key: &str) -> Result<Summary, EngineError> {
        let origin = Origin::new(origin)?;
        let day_key = DayKey::parse(day_key)?;
        Ok(self.db.summarize(&origin, day_key)?)
    }

    /// Renders the whole event log in the requested format.
    ///
    /// An empty log yields [`BulkExport::NoData`] in either format.
    pub fn export_bulk(&self, format: ExportFormat) -> Result<BulkExport, EngineError> {
        match format {
            ExportFormat::Json => {
                let mut records = Vec::new();
                self.db
                    .for_each_event(|event| records.push(export::ExportRecord::from(&event)))?;
                if records.is_empty() {
                    return Ok(BulkExport::NoData);
                }
                Ok(BulkExport::Data(export::to_structured_json(&records)?))
            }
            ExportFormat::Csv => {
                let events = self.db.query_all()?;
                Ok(export::to_delimited_export(&events))
            }
        }
    }

    /// Renders one summary as a labeled record.
    pub fn export_summary(&self, summary: &Summary) -> Result<String, EngineError> {
        Ok(export::to_summary_export(summary)?)
    }

    /// Removes every event. Returns the number removed.
    pub fn clear_all(&mut self) -> Result<usize, EngineError> {
        Ok(self.db.clear_all()?)
    }

    /// Returns the current settings (defaults if never saved).
    pub fn get_settings(&self) -> Result<Settings, EngineError> {
        Ok(self.db.get_settings()?)
    }

    /// Replaces the settings record.
    pub fn set_settings(&mut self, settings: &Settings) -> Result<(), EngineError> {
        Ok(self.db.set_settings(settings)?)
    }

    /// Rebuilds the summary cache from the log.
    pub fn recompute_summaries(&mut self) -> Result<usize, EngineError> {
        Ok(self.db.recompute_summaries()?)
    }

    /// Dispatches one request. Failures are reported in the response.
    pub fn handle(&mut self, request: Request) -> Response {
        let name = request.name();
        let result = self.dispatch(request);
        match result {
            Ok(response) => {
                tracing::debug!(request = name, "handled request");
                response
            }
            Err(err) => {
                tracing::debug!(request = name, error = %err, "request failed");
                Response::from(&err)
            }
        }
    }

    fn dispatch(&mut self, request: Request) -> Result<Response, EngineError> {
        let response = match request {
            Request::RecordEvent { payload } => Response {
                seq: Some(self.record_event(payload)?),
                ..Response::ack()
            },
            Request::GetSummary { origin, day_key } => Response {
                summary: Some(self.get_summary(&origin, &day_key)?),
                ..Response::ack()
            },
            Request::ExportBulk { format } => {
                match self.export_bulk(format.unwrap_or(ExportFormat::Json))? {
                    BulkExport::Data(data) => Response {
                        data: Some(data),
                        ..Response::ack()
                    },
                    BulkExport::NoData => Response {
                        no_data: true,
                        ..Response::ack()
                    },
                }
            }
            Request::ExportSummary { summary } => Response {
                data: Some(self.export_summary(&summary)?),
                ..Response::ack()
            },
            Request::ClearAll => Response {
                removed: Some(self.clear_all()?),
                ..Response::ack()
            },
            Request::GetSettings => Response {
                settings: Some(self.get_settings()?),
                ..Response::ack()
            },
            Request::SetSettings { settings } => {
                self.set_settings(&settings)?;
                Response::ack()
            }
        };
        Ok(response)
    }
}

fn validate_in<Tz: TimeZone>(payload: Value, tz: &Tz) -> Result<Event, ValidationError> {
    let raw = RawEvent::from_value(payload)?;
    cm_core::validate(&raw, tz)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use serde_json::json;

    use super::*;

    fn scenario_payloads() -> Vec<Value> {
        let base = json!({"origin": "https://example.com", "dayKey": "2024-01-01"});
        let with = |extra: Value| {
            let mut v = base.clone();
            v.as_object_mut()
                .unwrap()
                .extend(extra.as_object().unwrap().clone());
            v
        };
        vec![
            with(json!({"kind": "keystroke", "timestamp": 1000, "metric": 120})),
            with(json!({"kind": "keystroke", "timestamp": 1080, "metric": 80})),
            with(json!({"kind": "undo", "timestamp": 1200})),
            with(json!({"kind": "compile", "timestamp": 1300})),
            with(json!({"kind": "idle", "timestamp": 10_300, "metric": 9000})),
        ]
    }

    fn request(value: Value) -> Request {
        serde_json::from_value(value).expect("valid request")
    }

    #[test]
    fn scenario_through_messages() {
        let mut engine = Engine::open_in_memory().unwrap();
        for payload in scenario_payloads() {
            let response = engine.handle(Request::RecordEvent { payload });
            assert!(response.ok, "{response:?}");
            assert!(response.seq.is_some());
        }

        let response = engine.handle(request(json!({
            "type": "metrics:summary",
            "origin": "https://example.com",
            "dayKey": "2024-01-01",
        })));
        let summary = response.summary.expect("summary");
        assert_eq!(
            serde_json::to_value(&summary).unwrap(),
            json!({
                "origin": "https://example.com",
                "dayKey": "2024-01-01",
                "keystrokes": 2,
                "avgInterKeyMs": 100.0,
                "undoCount": 1,
                "redoCount": 0,
                "compileAttempts": 1,
                "errorCount": 0,
                "idleEvents": 1,
                "maxIdleMs": 9000,
            })
        );
    }

    #[test]
    fn fresh_engine_reports_default_settings() {
        let mut engine = Engine::open_in_memory().unwrap();
        let response = engine.handle(request(json!({"type": "settings:get"})));
        assert!(response.ok);
        assert_eq!(response.settings, Some(Settings { idle_ms: 5000 }));
    }

    #[test]
    fn set_settings_replaces_record() {
        let mut engine = Engine::open_in_memory().unwrap();
        let response = engine.handle(request(json!({
            "type": "settings:set",
            "settings": {"idleMs": 12_000},
        })));
        assert_eq!(response, Response::ack());
        assert_eq!(engine.get_settings().unwrap().idle_ms, 12_000);
    }

    #[test]
    fn invalid_event_is_rejected_with_field() {
        let mut engine = Engine::open_in_memory().unwrap();
        let response = engine.handle(Request::RecordEvent {
            payload: json!({"origin": "https://example.com", "kind": "paste", "timestamp": 1}),
        });
        assert!(!response.ok);
        let error = response.error.expect("error body");
        assert_eq!(error.kind, "validation");
        assert_eq!(error.message, "unknown event kind: paste");
        assert_eq!(engine.database().event_count().unwrap(), 0);
    }

    #[test]
    fn oversized_intervals_are_rejected_before_storage() {
        let mut engine = Engine::open_in_memory().unwrap();
        for timestamp in [1, 2] {
            let err = engine
                .record_event(json!({
                    "origin": "https://example.com",
                    "dayKey": "2024-01-01",
                    "kind": "keystroke",
                    "timestamp": timestamp,
                    "metric": 5e18,
                }))
                .unwrap_err();
            assert_eq!(err.kind(), "validation");
        }

        assert_eq!(engine.database().event_count().unwrap(), 0);
        let summary = engine.get_summary("https://example.com", "2024-01-01").unwrap();
        assert_eq!(summary.keystrokes, 0);
        assert!(engine.database().verify_summaries().unwrap().is_empty());
    }

    #[test]
    fn summary_request_with_bad_day_key_is_a_validation_error() {
        let mut engine = Engine::open_in_memory().unwrap();
        let response = engine.handle(Request::GetSummary {
            origin: "https://example.com".to_string(),
            day_key: "yesterday".to_string(),
        });
        assert_eq!(response.error.map(|e| e.kind), Some("validation".to_string()));
    }

    #[test]
    fn summary_lookup_normalizes_origin() {
        let mut engine = Engine::open_in_memory().unwrap();
        for payload in scenario_payloads() {
            engine.record_event(payload).unwrap();
        }
        let summary = engine.get_summary("HTTPS://EXAMPLE.COM/", "2024-01-01").unwrap();
        assert_eq!(summary.keystrokes, 2);
    }

    #[test]
    fn export_of_empty_store_signals_no_data() {
        let mut engine = Engine::open_in_memory().unwrap();
        for format in ["csv", "json", "structured", "delimited"] {
            let response =
                engine.handle(request(json!({"type": "metrics:export", "format": format})));
            assert!(response.ok, "{format}: {response:?}");
            assert!(response.no_data, "{format}");
            assert!(response.data.is_none());
        }
        assert_eq!(
            engine.export_bulk(ExportFormat::Json).unwrap(),
            BulkExport::NoData
        );
    }

    #[test]
    fn export_accepts_format_aliases() {
        let mut engine = Engine::open_in_memory().unwrap();
        for payload in scenario_payloads() {
            engine.record_event(payload).unwrap();
        }
        let structured =
            engine.handle(request(json!({"type": "metrics:export", "format": "structured"})));
        let records: Vec<Value> = serde_json::from_str(&structured.data.unwrap()).unwrap();
        assert_eq!(records.len(), 5);

        let delimited =
            engine.handle(request(json!({"type": "metrics:export", "format": "delimited"})));
        assert!(delimited.data.unwrap().starts_with("\"origin\",\"dayKey\""));
    }

    #[test]
    fn exports_contain_every_event() {
        let mut engine = Engine::open_in_memory().unwrap();
        for payload in scenario_payloads() {
            engine.record_event(payload).unwrap();
        }

        let BulkExport::Data(csv) = engine.export_bulk(ExportFormat::Csv).unwrap() else {
            panic!("expected csv data");
        };
        assert_eq!(csv.matches("\r\n").count(), 6);

        let response = engine.handle(request(json!({"type": "metrics:export"})));
        let records: Vec<Value> = serde_json::from_str(&response.data.unwrap()).unwrap();
        assert_eq!(records.len(), 5);
        assert_eq!(records[4]["metric"], json!(9000));
    }

    #[test]
    fn export_summary_renders_labels() {
        let mut engine = Engine::open_in_memory().unwrap();
        for payload in scenario_payloads() {
            engine.record_event(payload).unwrap();
        }
        let summary = engine.get_summary("https://example.com", "2024-01-01").unwrap();
        let response = engine.handle(Request::ExportSummary { summary });
        let data: Value = serde_json::from_str(&response.data.unwrap()).unwrap();
        assert_eq!(data["Undo / Redo"], json!("1 / 0"));
        assert_eq!(data["Idle events (max ms)"], json!("1 (9000)"));
    }

    #[test]
    fn clear_resets_everything_but_settings() {
        let mut engine = Engine::open_in_memory().unwrap();
        engine.set_settings(&Settings { idle_ms: 7000 }).unwrap();
        for payload in scenario_payloads() {
            engine.record_event(payload).unwrap();
        }

        let response = engine.handle(request(json!({"type": "metrics:clear"})));
        assert_eq!(response.removed, Some(5));

        let summary = engine.get_summary("https://example.com", "2024-01-01").unwrap();
        assert_eq!(summary.keystrokes, 0);
        assert!(summary.avg_inter_key_ms.is_none());
        assert_eq!(
            engine.export_bulk(ExportFormat::Csv).unwrap(),
            BulkExport::NoData
        );
        assert_eq!(engine.get_settings().unwrap().idle_ms, 7000);
    }

    #[test]
    fn day_key_is_derived_in_the_given_zone() {
        let mut engine = Engine::open_in_memory().unwrap();
        // 2024-01-01T23:30:00Z
        engine
            .record_event_in(
                json!({"origin": "https://example.com", "kind": "redo", "timestamp": 1_704_151_800_000_i64}),
                &Utc,
            )
            .unwrap();
        let summary = engine.get_summary("https://example.com", "2024-01-01").unwrap();
        assert_eq!(summary.redo_count, 1);
    }

    #[test]
    fn response_serialization_omits_unset_fields() {
        assert_eq!(serde_json::to_string(&Response::ack()).unwrap(), r#"{"ok":true}"#);
        let failure = Response::failure("storage", "disk full");
        assert_eq!(
            serde_json::to_value(&failure).unwrap(),
            json!({"ok": false, "error": {"kind": "storage", "message": "disk full"}})
        );
    }
}
