//! Storage layer for code metrics.
//!
//! Provides persistence for activity events, their per-(origin, day)
//! summaries, and the settings record using `rusqlite`.
//!
//! # Thread Safety
//!
//! The [`Database`] type wraps a `rusqlite::Connection`, which is `Send` but not `Sync`.
//! A `Database` instance can be moved between threads but cannot be shared
//! across threads without external synchronization. Separate processes or
//! threads should each open their own `Database` on the same file; file-backed
//! databases run in WAL mode so readers never block the writer.
//!
//! # Schema
//!
//! ## Event log
//!
//! `events` is append-only. Rows are never updated; the only deletion is
//! [`Database::clear_all`]. `seq` is the insertion order and the only event
//! identity. Lookups by key use the `(origin, day_key, seq)` index.
//!
//! ## Summaries
//!
//! `summaries` holds running counters per `(origin, day_key)`. The row for a
//! key is updated in the same transaction as every append for that key, so a
//! reader sees either the state before an append or the state after it,
//! never a mix. The table is a cache: [`Database::recompute_summaries`]
//! rebuilds it from `events`.
//!
//! ## Settings
//!
//! `settings` has at most one row (`id = 1`) holding the JSON-encoded record.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use cm_core::{DayKey, Event, EventKind, Origin, Settings, Summary, SummaryCounters};
use rusqlite::{Connection, OptionalExtension, Row, Transaction, params};
use thiserror::Error;

/// How long a connection waits on a locked database before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Database errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// An error from the underlying database.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// Failed to encode or decode a JSON column.
    #[error("invalid settings data: {0}")]
    Json(#[from] serde_json::Error),
    /// A stored event row no longer parses as a valid event.
    #[error("invalid event data for seq {seq}: {message}")]
    InvalidEventData { seq: i64, message: String },
    /// A stored summary key no longer parses.
    #[error("invalid summary key ({origin}, {day_key}): {message}")]
    InvalidSummaryKey {
        origin: String,
        day_key: String,
        message: String,
    },
}

/// Database connection wrapper.
///
/// See the [module documentation](self) for thread safety considerations.
pub struct Database {
    conn: Connection,
}

/// A cached summary row that disagrees with a fresh fold of the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryMismatch {
    pub origin: Origin,
    pub day_key: DayKey,
    /// Counters in the `summaries` table, `None` if the row is missing.
    pub cached: Option<SummaryCounters>,
    /// Counters folded from `events`, `None` if no events exist for the key.
    pub expected: Option<SummaryCounters>,
}

type SummaryKey = (String, String);

impl Database {
    /// Opens a database at the given path, creating it if necessary.
    ///
    /// The database schema is automatically initialized on first open.
    pub fn open(path: &Path) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Opens an in-memory database.
    ///
    /// Useful for testing. The database is destroyed when the connection closes.
    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Initializes the database schema.
    ///
    /// This is idempotent - safe to call on an already-initialized database.
    fn init(&self) -> Result<(), DbError> {
        self.conn.execute_batch(
            "
            -- Events table: append-only activity log
            -- day_key: YYYY-MM-DD bucket derived at write time
            -- timestamp: epoch milliseconds from the producer
            -- metric: inter-key interval (keystroke) or gap length (idle), in ms
            CREATE TABLE IF NOT EXISTS events (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                origin TEXT NOT NULL,
                day_key TEXT NOT NULL,
                kind TEXT NOT NULL,
                timestamp INTEGER NOT NULL,
                metric INTEGER
            );

            CREATE INDEX IF NOT EXISTS idx_events_origin_day ON events(origin, day_key, seq);

            -- Summaries table: running counters, always equal to a fold of events
            CREATE TABLE IF NOT EXISTS summaries (
                origin TEXT NOT NULL,
                day_key TEXT NOT NULL,
                keystrokes INTEGER NOT NULL DEFAULT 0,
                interval_sum_ms INTEGER NOT NULL DEFAULT 0,
                interval_count INTEGER NOT NULL DEFAULT 0,
                undo_count INTEGER NOT NULL DEFAULT 0,
                redo_count INTEGER NOT NULL DEFAULT 0,
                compile_attempts INTEGER NOT NULL DEFAULT 0,
                error_count INTEGER NOT NULL DEFAULT 0,
                idle_events INTEGER NOT NULL DEFAULT 0,
                max_idle_ms INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (origin, day_key)
            );

            -- Settings table: single row, JSON payload replaced wholesale
            CREATE TABLE IF NOT EXISTS settings (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                data TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            ",
        )?;
        Ok(())
    }

    /// Appends one event and folds it into its summary.
    ///
    /// Both writes happen in a single transaction. Returns the sequence
    /// number assigned to the event.
    pub fn append(&mut self, event: &Event) -> Result<i64, DbError> {
        let tx = self.conn.transaction()?;
        let seq = insert_event(&tx, event)?;
        tx.commit()?;
        tracing::debug!(
            seq,
            origin = %event.origin,
            day_key = %event.day_key,
            kind = %event.kind,
            "appended event"
        );
        Ok(seq)
    }

    /// Appends a batch of events atomically.
    ///
    /// Either every event is stored or none is. Returns the number stored.
    pub fn append_batch(&mut self, events: &[Event]) -> Result<usize, DbError> {
        if events.is_empty() {
            return Ok(0);
        }
        let tx = self.conn.transaction()?;
        for event in events {
            insert_event(&tx, event)?;
        }
        tx.commit()?;
        tracing::debug!(count = events.len(), "appended event batch");
        Ok(events.len())
    }

    /// Lists events for one (origin, day) key in insertion order.
    ///
    /// Returns an empty vec when the key has no events.
    pub fn query_by_origin_day(
        &self,
        origin: &Origin,
        day_key: DayKey,
    ) -> Result<Vec<Event>, DbError> {
        let mut stmt = self.conn.prepare(
            "
            SELECT seq, origin, day_key, kind, timestamp, metric
            FROM events
            WHERE origin = ? AND day_key = ?
            ORDER BY seq ASC
            ",
        )?;
        let rows = stmt.query_map(
            params![origin.as_str(), day_key.to_string()],
            EventRow::from_row,
        )?;
        let mut events = Vec::new();
        for row in rows {
            events.push(row?.into_event()?);
        }
        Ok(events)
    }

    /// Lists every event in insertion order.
    pub fn query_all(&self) -> Result<Vec<Event>, DbError> {
        let mut events = Vec::new();
        self.for_each_event(|event| events.push(event))?;
        Ok(events)
    }

    /// Visits every event in insertion order without collecting them.
    pub fn for_each_event<F>(&self, mut f: F) -> Result<(), DbError>
    where
        F: FnMut(Event),
    {
        let mut stmt = self.conn.prepare(
            "
            SELECT seq, origin, day_key, kind, timestamp, metric
            FROM events
            ORDER BY seq ASC
            ",
        )?;
        let rows = stmt.query_map([], EventRow::from_row)?;
        for row in rows {
            f(row?.into_event()?);
        }
        Ok(())
    }

    /// Counts stored events.
    pub fn event_count(&self) -> Result<i64, DbError> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))?)
    }

    /// Removes every event and summary in one transaction.
    ///
    /// Settings are left untouched. Returns the number of events removed.
    pub fn clear_all(&mut self) -> Result<usize, DbError> {
        let tx = self.conn.transaction()?;
        let removed = tx.execute("DELETE FROM events", [])?;
        tx.execute("DELETE FROM summaries", [])?;
        tx.commit()?;
        tracing::debug!(removed, "cleared event log");
        Ok(removed)
    }

    /// Returns the summary for one (origin, day) key.
    ///
    /// A key with no events yields the all-zero baseline.
    pub fn summarize(&self, origin: &Origin, day_key: DayKey) -> Result<Summary, DbError> {
        let counters = self
            .conn
            .query_row(
                "
                SELECT keystrokes, interval_sum_ms, interval_count, undo_count, redo_count,
                       compile_attempts, error_count, idle_events, max_idle_ms
                FROM summaries
                WHERE origin = ? AND day_key = ?
                ",
                params![origin.as_str(), day_key.to_string()],
                counters_from_row,
            )
            .optional()?
            .unwrap_or_default();
        Ok(counters.into_summary(origin.clone(), day_key))
    }

    /// Lists every (origin, day) key that has events, ordered by day then origin.
    pub fn list_summary_keys(&self) -> Result<Vec<(Origin, DayKey)>, DbError> {
        let mut stmt = self.conn.prepare(
            "
            SELECT origin, day_key
            FROM summaries
            ORDER BY day_key ASC, origin ASC
            ",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        let mut keys = Vec::new();
        for row in rows {
            let (origin, day_key) = row?;
            keys.push(parse_key(&origin, &day_key)?);
        }
        Ok(keys)
    }

    /// Rebuilds the `summaries` table from the event log.
    ///
    /// Returns the number of keys written.
    pub fn recompute_summaries(&mut self) -> Result<usize, DbError> {
        let tx = self.conn.transaction()?;
        let folded = fold_log(&tx)?;
        tx.execute("DELETE FROM summaries", [])?;
        {
            let mut stmt = tx.prepare(
                "
                INSERT INTO summaries
                (origin, day_key, keystrokes, interval_sum_ms, interval_count, undo_count,
                 redo_count, compile_attempts, error_count, idle_events, max_idle_ms)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ",
            )?;
            for ((origin, day_key), c) in &folded {
                stmt.execute(params![
                    origin,
                    day_key,
                    c.keystrokes,
                    c.interval_sum_ms,
                    c.interval_count,
                    c.undo_count,
                    c.redo_count,
                    c.compile_attempts,
                    c.error_count,
                    c.idle_events,
                    c.max_idle_ms,
                ])?;
            }
        }
        tx.commit()?;
        tracing::debug!(keys = folded.len(), "recomputed summaries");
        Ok(folded.len())
    }

    /// Compares every cached summary with a fresh fold of the log.
    ///
    /// Returns the keys that disagree; an empty vec means the cache is sound.
    pub fn verify_summaries(&self) -> Result<Vec<SummaryMismatch>, DbError> {
        // Read both tables from one snapshot.
        let tx = self.conn.unchecked_transaction()?;
        let mut expected = fold_log(&tx)?;
        let cached = cached_counters(&tx)?;
        tx.finish()?;

        let mut mismatches = Vec::new();
        for (key, cached_counters) in cached {
            let expected_counters = expected.remove(&key);
            if expected_counters != Some(cached_counters) {
                mismatches.push(mismatch(&key, Some(cached_counters), expected_counters)?);
            }
        }
        for (key, expected_counters) in expected {
            mismatches.push(mismatch(&key, None, Some(expected_counters))?);
        }
        for m in &mismatches {
            tracing::warn!(
                origin = %m.origin,
                day_key = %m.day_key,
                cached = ?m.cached,
                expected = ?m.expected,
                "summary cache disagrees with event log"
            );
        }
        Ok(mismatches)
    }

    /// Returns the stored settings, or the defaults if none were ever saved.
    pub fn get_settings(&self) -> Result<Settings, DbError> {
        let data: Option<String> = self
            .conn
            .query_row("SELECT data FROM settings WHERE id = 1", [], |row| row.get(0))
            .optional()?;
        match data {
            Some(data) => Ok(serde_json::from_str(&data)?),
            None => Ok(Settings::default()),
        }
    }

    /// Replaces the stored settings record.
    pub fn set_settings(&mut self, settings: &Settings) -> Result<(), DbError> {
        let data = serde_json::to_string(settings)?;
        self.conn.execute(
            "
            INSERT INTO settings (id, data, updated_at)
            VALUES (1, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                data = excluded.data,
                updated_at = excluded.updated_at
            ",
            params![data, now_timestamp()],
        )?;
        tracing::debug!(?settings, "saved settings");
        Ok(())
    }

    /// Saves the default settings unless a record already exists.
    ///
    /// Returns `true` if the defaults were written.
    pub fn init_settings(&mut self) -> Result<bool, DbError> {
        let data = serde_json::to_string(&Settings::default())?;
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO settings (id, data, updated_at) VALUES (1, ?, ?)",
            params![data, now_timestamp()],
        )?;
        Ok(inserted > 0)
    }
}

fn insert_event(tx: &Transaction<'_>, event: &Event) -> Result<i64, DbError> {
    let day_key = event.day_key.to_string();
    tx.execute(
        "
        INSERT INTO events (origin, day_key, kind, timestamp, metric)
        VALUES (?, ?, ?, ?, ?)
        ",
        params![
            event.origin.as_str(),
            day_key,
            event.kind.as_str(),
            event.timestamp,
            event.metric,
        ],
    )?;
    let seq = tx.last_insert_rowid();

    let mut delta = SummaryCounters::default();
    delta.apply(event);
    tx.execute(
        "
        INSERT INTO summaries
        (origin, day_key, keystrokes, interval_sum_ms, interval_count, undo_count,
         redo_count, compile_attempts, error_count, idle_events, max_idle_ms)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(origin, day_key) DO UPDATE SET
            keystrokes = summaries.keystrokes + excluded.keystrokes,
            interval_sum_ms = summaries.interval_sum_ms + excluded.interval_sum_ms,
            interval_count = summaries.interval_count + excluded.interval_count,
            undo_count = summaries.undo_count + excluded.undo_count,
            redo_count = summaries.redo_count + excluded.redo_count,
            compile_attempts = summaries.compile_attempts + excluded.compile_attempts,
            error_count = summaries.error_count + excluded.error_count,
            idle_events = summaries.idle_events + excluded.idle_events,
            max_idle_ms = MAX(summaries.max_idle_ms, excluded.max_idle_ms)
        ",
        params![
            event.origin.as_str(),
            day_key,
            delta.keystrokes,
            delta.interval_sum_ms,
            delta.interval_count,
            delta.undo_count,
            delta.redo_count,
            delta.compile_attempts,
            delta.error_count,
            delta.idle_events,
            delta.max_idle_ms,
        ],
    )?;
    Ok(seq)
}

/// Folds the whole log into per-key counters.
fn fold_log(conn: &Connection) -> Result<BTreeMap<SummaryKey, SummaryCounters>, DbError> {
    let mut stmt = conn.prepare(
        "
        SELECT seq, origin, day_key, kind, timestamp, metric
        FROM events
        ORDER BY seq ASC
        ",
    )?;
    let rows = stmt.query_map([], EventRow::from_row)?;
    let mut folded: BTreeMap<SummaryKey, SummaryCounters> = BTreeMap::new();
    for row in rows {
        let event = row?.into_event()?;
        folded
            .entry((event.origin.to_string(), event.day_key.to_string()))
            .or_default()
            .apply(&event);
    }
    Ok(folded)
}

fn cached_counters(conn: &Connection) -> Result<BTreeMap<SummaryKey, SummaryCounters>, DbError> {
    let mut stmt = conn.prepare(
        "
        SELECT keystrokes, interval_sum_ms, interval_count, undo_count, redo_count,
               compile_attempts, error_count, idle_events, max_idle_ms, origin, day_key
        FROM summaries
        ",
    )?;
    let rows = stmt.query_map([], |row| {
        let counters = counters_from_row(row)?;
        Ok(((row.get::<_, String>(9)?, row.get::<_, String>(10)?), counters))
    })?;
    let mut cached = BTreeMap::new();
    for row in rows {
        let (key, counters) = row?;
        cached.insert(key, counters);
    }
    Ok(cached)
}

fn counters_from_row(row: &Row<'_>) -> rusqlite::Result<SummaryCounters> {
    Ok(SummaryCounters {
        keystrokes: row.get(0)?,
        interval_sum_ms: row.get(1)?,
        interval_count: row.get(2)?,
        undo_count: row.get(3)?,
        redo_count: row.get(4)?,
        compile_attempts: row.get(5)?,
        error_count: row.get(6)?,
        idle_events: row.get(7)?,
        max_idle_ms: row.get(8)?,
    })
}

fn mismatch(
    key: &SummaryKey,
    cached: Option<SummaryCounters>,
    expected: Option<SummaryCounters>,
) -> Result<SummaryMismatch, DbError> {
    let (origin, day_key) = parse_key(&key.0, &key.1)?;
    Ok(SummaryMismatch {
        origin,
        day_key,
        cached,
        expected,
    })
}

fn parse_key(origin: &str, day_key: &str) -> Result<(Origin, DayKey), DbError> {
    let invalid = |message: String| DbError::InvalidSummaryKey {
        origin: origin.to_string(),
        day_key: day_key.to_string(),
        message,
    };
    let origin = Origin::new(origin).map_err(|err| invalid(err.to_string()))?;
    let day_key = DayKey::parse(day_key).map_err(|err| invalid(err.to_string()))?;
    Ok((origin, day_key))
}

fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[derive(Debug)]
struct EventRow {
    seq: i64,
    origin: String,
    day_key: String,
    kind: String,
    timestamp: i64,
    metric: Option<i64>,
}

impl EventRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            seq: row.get(0)?,
            origin: row.get(1)?,
            day_key: row.get(2)?,
            kind: row.get(3)?,
            timestamp: row.get(4)?,
            metric: row.get(5)?,
        })
    }

    fn into_event(self) -> Result<Event, DbError> {
        let seq = self.seq;
        let invalid = |message: String| DbError::InvalidEventData { seq, message };
        let origin = Origin::new(&self.origin).map_err(|err| invalid(err.to_string()))?;
        let day_key = DayKey::parse(&self.day_key).map_err(|err| invalid(err.to_string()))?;
        let kind: EventKind = self.kind.parse().map_err(|err: cm_core::ValidationError| {
            invalid(err.to_string())
        })?;
        Ok(Event {
            origin,
            day_key,
            kind,
            timestamp: self.timestamp,
            metric: self.metric,
        })
    }
}
