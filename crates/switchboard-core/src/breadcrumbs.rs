//! Persistent breadcrumb log backed by SQLite.
//!
//! # Table design
//!
//! ```text
//! breadcrumbs(id INTEGER PK AUTOINCREMENT, timestamp TEXT, source TEXT,
//!             phase TEXT NULL, event_type TEXT, message TEXT,
//!             metadata TEXT /* JSON */, session_id TEXT NULL)
//! ```
//!
//! Timestamps are written as fixed-width ISO-8601 UTC text
//! (`YYYY-MM-DDTHH:MM:SS.ffffffZ`), so lexical order equals time order and
//! window queries are plain range comparisons on an indexed column.
//!
//! Every operation opens its own connection. SQLite serializes writers
//! (bounded by the busy timeout) and WAL mode lets readers run alongside them,
//! so an `EventLog` can be cloned freely across producers.

use crate::error::{Result, SwitchboardError};
use chrono::{DateTime, Utc};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, Row};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, warn};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SELECT_COLUMNS: &str =
    "SELECT id, timestamp, source, phase, event_type, message, metadata, session_id FROM breadcrumbs";

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Breadcrumb {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    pub event_type: String,
    pub message: String,
    pub metadata: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

/// A breadcrumb that has not been written yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewBreadcrumb {
    pub source: String,
    pub event_type: String,
    pub message: String,
    pub phase: Option<String>,
    pub metadata: Value,
    pub session_id: Option<String>,
    /// Defaults to the moment of the write.
    pub timestamp: Option<DateTime<Utc>>,
}

impl NewBreadcrumb {
    pub fn new(
        source: impl Into<String>,
        event_type: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            event_type: event_type.into(),
            message: message.into(),
            phase: None,
            metadata: Value::Object(Default::default()),
            session_id: None,
            timestamp: None,
        }
    }

    pub fn phase(mut self, phase: impl Into<String>) -> Self {
        self.phase = Some(phase.into());
        self
    }

    pub fn metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

/// One `(source, event_type, message)` group from `repeated_patterns`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternGroup {
    pub source: String,
    pub event_type: String,
    pub message: String,
    pub count: u64,
    pub last_seen: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// EventSink
// ---------------------------------------------------------------------------

/// Fire-and-forget breadcrumb writer used by the gate and router.
///
/// Returns the new record id, or `None` when the write was lost.
pub trait EventSink: Send + Sync {
    fn record(&self, crumb: NewBreadcrumb) -> Option<i64>;
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl EventSink for NoopSink {
    fn record(&self, _crumb: NewBreadcrumb) -> Option<i64> {
        None
    }
}

/// Keeps breadcrumbs in memory, for embedding and tests.
#[derive(Debug, Default)]
pub struct MemorySink {
    crumbs: Mutex<Vec<NewBreadcrumb>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Vec<NewBreadcrumb> {
        self.crumbs.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn event_types(&self) -> Vec<String> {
        self.snapshot().into_iter().map(|c| c.event_type).collect()
    }
}

impl EventSink for MemorySink {
    fn record(&self, crumb: NewBreadcrumb) -> Option<i64> {
        let mut crumbs = self.crumbs.lock().ok()?;
        crumbs.push(crumb);
        Some(crumbs.len() as i64)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn format_ts(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
}

fn parse_ts(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

/// Lower bound of a look-back window ending now. Oversized windows saturate
/// to the earliest representable instant.
fn window_start(window: Duration) -> String {
    let start = chrono::Duration::from_std(window)
        .ok()
        .and_then(|d| Utc::now().checked_sub_signed(d))
        .unwrap_or(DateTime::<Utc>::MIN_UTC);
    format_ts(start)
}

fn row_to_breadcrumb(row: &Row<'_>) -> rusqlite::Result<Breadcrumb> {
    let raw_ts: String = row.get(1)?;
    let raw_meta: String = row.get(6)?;
    let metadata = serde_json::from_str(&raw_meta).unwrap_or(Value::String(raw_meta));
    Ok(Breadcrumb {
        id: row.get(0)?,
        timestamp: parse_ts(1, &raw_ts)?,
        source: row.get(2)?,
        phase: row.get(3)?,
        event_type: row.get(4)?,
        message: row.get(5)?,
        metadata,
        session_id: row.get(7)?,
    })
}

// ---------------------------------------------------------------------------
// EventLog
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct EventLog {
    db_path: PathBuf,
}

impl EventLog {
    /// Open or create the store at `path`, creating the schema if needed.
    ///
    /// This is the only call that surfaces `StorageUnavailable` for write
    /// paths; later appends degrade to `None` instead.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| SwitchboardError::StorageUnavailable(e.to_string()))?;
        }
        let log = Self {
            db_path: path.to_path_buf(),
        };
        let conn = log.conn()?;
        if let Err(e) = conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
            row.get::<_, String>(0)
        }) {
            warn!(error = %e, "breadcrumb store could not switch to WAL");
        }
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS breadcrumbs (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              timestamp TEXT NOT NULL,
              source TEXT NOT NULL,
              phase TEXT,
              event_type TEXT NOT NULL,
              message TEXT NOT NULL,
              metadata TEXT NOT NULL DEFAULT '{}',
              session_id TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_breadcrumbs_timestamp ON breadcrumbs(timestamp);
            CREATE INDEX IF NOT EXISTS idx_breadcrumbs_source ON breadcrumbs(source);
            CREATE INDEX IF NOT EXISTS idx_breadcrumbs_event_type ON breadcrumbs(event_type);
            CREATE INDEX IF NOT EXISTS idx_breadcrumbs_session ON breadcrumbs(session_id);
            "#,
        )
        .map_err(|e| SwitchboardError::StorageUnavailable(e.to_string()))?;
        Ok(log)
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    fn conn(&self) -> Result<Connection> {
        let conn = Connection::open(&self.db_path)
            .map_err(|e| SwitchboardError::StorageUnavailable(e.to_string()))?;
        conn.busy_timeout(BUSY_TIMEOUT)
            .map_err(|e| SwitchboardError::StorageUnavailable(e.to_string()))?;
        Ok(conn)
    }

    /// Append one breadcrumb. Storage faults are logged and reported as `None`.
    pub fn append(&self, crumb: NewBreadcrumb) -> Option<i64> {
        match self.try_append(&crumb) {
            Ok(id) => Some(id),
            Err(e) => {
                warn!(
                    error = %e,
                    source = %crumb.source,
                    event_type = %crumb.event_type,
                    "breadcrumb dropped"
                );
                None
            }
        }
    }

    fn try_append(&self, crumb: &NewBreadcrumb) -> Result<i64> {
        let conn = self.conn()?;
        let ts = format_ts(crumb.timestamp.unwrap_or_else(Utc::now));
        let meta = serde_json::to_string(&crumb.metadata)?;
        conn.execute(
            "INSERT INTO breadcrumbs (timestamp, source, phase, event_type, message, metadata, session_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                ts,
                crumb.source,
                crumb.phase,
                crumb.event_type,
                crumb.message,
                meta,
                crumb.session_id
            ],
        )
        .map_err(|e| SwitchboardError::StorageUnavailable(e.to_string()))?;
        Ok(conn.last_insert_rowid())
    }

    /// Breadcrumbs newer than `window`, newest first.
    pub fn recent(
        &self,
        window: Duration,
        source: Option<&str>,
        event_type: Option<&str>,
    ) -> Result<Vec<Breadcrumb>> {
        let conn = self.conn()?;
        let mut sql = format!("{SELECT_COLUMNS} WHERE timestamp >= ?1");
        let mut args: Vec<SqlValue> = vec![SqlValue::from(window_start(window))];
        if let Some(s) = source {
            args.push(SqlValue::from(s.to_string()));
            sql.push_str(&format!(" AND source = ?{}", args.len()));
        }
        if let Some(t) = event_type {
            args.push(SqlValue::from(t.to_string()));
            sql.push_str(&format!(" AND event_type = ?{}", args.len()));
        }
        sql.push_str(" ORDER BY timestamp DESC, id DESC");

        let run = || -> rusqlite::Result<Vec<Breadcrumb>> {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(args.iter()), row_to_breadcrumb)?;
            rows.collect()
        };
        Ok(run().unwrap_or_else(|e| {
            warn!(error = %e, "recent breadcrumb query failed");
            Vec::new()
        }))
    }

    /// Groups of identical `(source, event_type, message)` seen at least
    /// `min_occurrences` times within `window`, most frequent first.
    pub fn repeated_patterns(
        &self,
        window: Duration,
        min_occurrences: u64,
    ) -> Result<Vec<PatternGroup>> {
        let conn = self.conn()?;
        let since = window_start(window);
        let threshold = i64::try_from(min_occurrences).unwrap_or(i64::MAX);

        let run = || -> rusqlite::Result<Vec<PatternGroup>> {
            let mut stmt = conn.prepare(
                "SELECT source, event_type, message, COUNT(*) AS n, MAX(timestamp) AS last_seen
                 FROM breadcrumbs
                 WHERE timestamp >= ?1
                 GROUP BY source, event_type, message
                 HAVING COUNT(*) >= ?2
                 ORDER BY n DESC, last_seen DESC",
            )?;
            let rows = stmt.query_map(params![since, threshold], |row| {
                let n: i64 = row.get(3)?;
                let last: String = row.get(4)?;
                Ok(PatternGroup {
                    source: row.get(0)?,
                    event_type: row.get(1)?,
                    message: row.get(2)?,
                    count: n.max(0) as u64,
                    last_seen: parse_ts(4, &last)?,
                })
            })?;
            rows.collect()
        };
        Ok(run().unwrap_or_else(|e| {
            warn!(error = %e, "pattern query failed");
            Vec::new()
        }))
    }

    /// Number of `event_type` breadcrumbs within `window`.
    pub fn count(&self, event_type: &str, window: Duration, source: Option<&str>) -> Result<u64> {
        let conn = self.conn()?;
        let since = window_start(window);
        let result: rusqlite::Result<i64> = match source {
            Some(s) => conn.query_row(
                "SELECT COUNT(*) FROM breadcrumbs WHERE event_type = ?1 AND timestamp >= ?2 AND source = ?3",
                params![event_type, since, s],
                |row| row.get(0),
            ),
            None => conn.query_row(
                "SELECT COUNT(*) FROM breadcrumbs WHERE event_type = ?1 AND timestamp >= ?2",
                params![event_type, since],
                |row| row.get(0),
            ),
        };
        Ok(result
            .map(|n| n.max(0) as u64)
            .unwrap_or_else(|e| {
                warn!(error = %e, event_type, "breadcrumb count failed");
                0
            }))
    }

    /// Delete breadcrumbs older than `retention`. Returns the number removed.
    pub fn purge_older_than(&self, retention: Duration) -> Result<usize> {
        let conn = self.conn()?;
        let cutoff = window_start(retention);
        let deleted = conn
            .execute("DELETE FROM breadcrumbs WHERE timestamp < ?1", params![cutoff])
            .unwrap_or_else(|e| {
                warn!(error = %e, "breadcrumb purge failed");
                0
            });
        debug!(deleted, cutoff = %cutoff, "breadcrumb purge");
        Ok(deleted)
    }

    /// Every breadcrumb tagged with `session_id`, oldest first.
    pub fn session(&self, session_id: &str) -> Result<Vec<Breadcrumb>> {
        let conn = self.conn()?;
        let run = || -> rusqlite::Result<Vec<Breadcrumb>> {
            let mut stmt =
                conn.prepare(&format!("{SELECT_COLUMNS} WHERE session_id = ?1 ORDER BY id ASC"))?;
            let rows = stmt.query_map(params![session_id], row_to_breadcrumb)?;
            rows.collect()
        };
        Ok(run().unwrap_or_else(|e| {
            warn!(error = %e, session_id, "session breadcrumb query failed");
            Vec::new()
        }))
    }
}

impl EventSink for EventLog {
    fn record(&self, crumb: NewBreadcrumb) -> Option<i64> {
        self.append(crumb)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as CDur;
    use serde_json::json;
    use tempfile::TempDir;

    const FIVE_MIN: Duration = Duration::from_secs(300);

    fn open_tmp() -> (TempDir, EventLog) {
        let dir = TempDir::new().unwrap();
        let log = EventLog::open(&dir.path().join("crumbs/test.db")).unwrap();
        (dir, log)
    }

    #[test]
    fn append_returns_monotonic_ids() {
        let (_dir, log) = open_tmp();
        let a = log.append(NewBreadcrumb::new("gate", "signal_received", "a")).unwrap();
        let b = log.append(NewBreadcrumb::new("gate", "signal_received", "b")).unwrap();
        assert!(b > a);
    }

    #[test]
    fn recent_is_newest_first_and_windowed() {
        let (_dir, log) = open_tmp();
        let now = Utc::now();
        log.append(NewBreadcrumb::new("gate", "e", "old").at(now - CDur::hours(2)));
        log.append(NewBreadcrumb::new("gate", "e", "first").at(now - CDur::seconds(30)));
        log.append(NewBreadcrumb::new("gate", "e", "second").at(now - CDur::seconds(10)));

        let crumbs = log.recent(FIVE_MIN, None, None).unwrap();
        let messages: Vec<&str> = crumbs.iter().map(|c| c.message.as_str()).collect();
        assert_eq!(messages, vec!["second", "first"]);
    }

    #[test]
    fn recent_filters_by_source_and_type() {
        let (_dir, log) = open_tmp();
        log.append(NewBreadcrumb::new("router", "phase_complete", "a"));
        log.append(NewBreadcrumb::new("gate", "phase_complete", "b"));
        log.append(NewBreadcrumb::new("router", "phase_skipped", "c"));

        let router = log.recent(FIVE_MIN, Some("router"), None).unwrap();
        assert_eq!(router.len(), 2);
        let both = log
            .recent(FIVE_MIN, Some("router"), Some("phase_complete"))
            .unwrap();
        assert_eq!(both.len(), 1);
        assert_eq!(both[0].message, "a");
    }

    #[test]
    fn metadata_and_optional_fields_survive_storage() {
        let (_dir, log) = open_tmp();
        log.append(
            NewBreadcrumb::new("router", "phase_complete", "done")
                .phase("p2")
                .metadata(json!({"videos_scheduled": 4}))
                .session("s-1"),
        );
        let crumb = &log.recent(FIVE_MIN, None, None).unwrap()[0];
        assert_eq!(crumb.phase.as_deref(), Some("p2"));
        assert_eq!(crumb.metadata["videos_scheduled"], 4);
        assert_eq!(crumb.session_id.as_deref(), Some("s-1"));
    }

    #[test]
    fn repeated_patterns_groups_identical_triples() {
        let (_dir, log) = open_tmp();
        for _ in 0..5 {
            log.append(NewBreadcrumb::new("sourceX", "wsp_violation", "msg"));
        }
        log.append(NewBreadcrumb::new("sourceX", "wsp_violation", "other"));
        log.append(NewBreadcrumb::new("sourceY", "wsp_violation", "msg"));

        let groups = log.repeated_patterns(FIVE_MIN, 3).unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].source, "sourceX");
        assert_eq!(groups[0].event_type, "wsp_violation");
        assert_eq!(groups[0].message, "msg");
        assert_eq!(groups[0].count, 5);
    }

    #[test]
    fn repeated_patterns_sorted_by_count() {
        let (_dir, log) = open_tmp();
        for _ in 0..3 {
            log.append(NewBreadcrumb::new("a", "t", "m"));
        }
        for _ in 0..4 {
            log.append(NewBreadcrumb::new("b", "t", "m"));
        }
        let groups = log.repeated_patterns(FIVE_MIN, 2).unwrap();
        assert_eq!(groups.iter().map(|g| g.count).collect::<Vec<_>>(), vec![4, 3]);
    }

    #[test]
    fn repeated_patterns_ignores_crumbs_outside_window() {
        let (_dir, log) = open_tmp();
        let old = Utc::now() - CDur::minutes(30);
        for _ in 0..5 {
            log.append(NewBreadcrumb::new("x", "t", "m").at(old));
        }
        assert!(log.repeated_patterns(FIVE_MIN, 3).unwrap().is_empty());
    }

    #[test]
    fn count_respects_type_window_and_source() {
        let (_dir, log) = open_tmp();
        log.append(NewBreadcrumb::new("gate", "signal_outcome", "ok"));
        log.append(NewBreadcrumb::new("gate", "signal_outcome", "ok"));
        log.append(NewBreadcrumb::new("router", "signal_outcome", "ok"));
        log.append(
            NewBreadcrumb::new("gate", "signal_outcome", "ok").at(Utc::now() - CDur::days(1)),
        );
        assert_eq!(log.count("signal_outcome", FIVE_MIN, None).unwrap(), 3);
        assert_eq!(log.count("signal_outcome", FIVE_MIN, Some("gate")).unwrap(), 2);
        assert_eq!(log.count("missing", FIVE_MIN, None).unwrap(), 0);
    }

    #[test]
    fn purge_is_idempotent() {
        let (_dir, log) = open_tmp();
        let now = Utc::now();
        log.append(NewBreadcrumb::new("gate", "e", "ancient").at(now - CDur::days(40)));
        log.append(NewBreadcrumb::new("gate", "e", "fresh"));

        let month = Duration::from_secs(30 * 24 * 3600);
        assert_eq!(log.purge_older_than(month).unwrap(), 1);
        assert_eq!(log.purge_older_than(month).unwrap(), 0);
        let left = log.recent(Duration::from_secs(365 * 24 * 3600), None, None).unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].message, "fresh");
    }

    #[test]
    fn session_returns_oldest_first() {
        let (_dir, log) = open_tmp();
        log.append(NewBreadcrumb::new("gate", "a", "1").session("run-7"));
        log.append(NewBreadcrumb::new("gate", "b", "2"));
        log.append(NewBreadcrumb::new("gate", "c", "3").session("run-7"));
        let crumbs = log.session("run-7").unwrap();
        assert_eq!(
            crumbs.iter().map(|c| c.message.as_str()).collect::<Vec<_>>(),
            vec!["1", "3"]
        );
    }

    #[test]
    fn append_after_store_removed_degrades_to_none() {
        let dir = TempDir::new().unwrap();
        let db_dir = dir.path().join("gone");
        let log = EventLog::open(&db_dir.join("crumbs.db")).unwrap();
        std::fs::remove_dir_all(&db_dir).unwrap();
        assert_eq!(log.append(NewBreadcrumb::new("gate", "e", "lost")), None);
    }

    #[test]
    fn open_fails_when_parent_is_a_file() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"x").unwrap();
        let err = EventLog::open(&blocker.join("crumbs.db")).unwrap_err();
        assert!(matches!(err, SwitchboardError::StorageUnavailable(_)));
    }

    #[test]
    fn concurrent_appends_all_land() {
        let (_dir, log) = open_tmp();
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let log = log.clone();
                std::thread::spawn(move || {
                    for i in 0..10 {
                        log.append(NewBreadcrumb::new(format!("t{t}"), "burst", format!("{i}")));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(log.count("burst", FIVE_MIN, None).unwrap(), 40);
    }

    #[test]
    fn memory_sink_records_in_order() {
        let sink = MemorySink::new();
        sink.record(NewBreadcrumb::new("gate", "first", ""));
        sink.record(NewBreadcrumb::new("gate", "second", ""));
        assert_eq!(sink.event_types(), vec!["first", "second"]);
        assert_eq!(NoopSink.record(NewBreadcrumb::new("gate", "x", "")), None);
    }
}
