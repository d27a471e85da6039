//! SQLite-backed progress records and session log.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use anyhow::Context;
use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tutor_core::error::TutorError;
use tutor_core::model::{Status, TopicProgress};
use tutor_core::session::SessionSummary;
use tutor_core::store::ProgressBackend;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS student_topics (
    student TEXT NOT NULL,
    topic_id TEXT NOT NULL,
    mastery INTEGER NOT NULL DEFAULT 0,
    status TEXT NOT NULL DEFAULT 'learning',
    ease REAL NOT NULL DEFAULT 2.5,
    interval_days INTEGER NOT NULL DEFAULT 0,
    next_review TEXT,
    attempts INTEGER NOT NULL DEFAULT 0,
    last_reviewed TEXT,
    misconceptions TEXT NOT NULL DEFAULT '[]',
    PRIMARY KEY (student, topic_id)
);

CREATE TABLE IF NOT EXISTS session_history (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    id TEXT NOT NULL UNIQUE,
    student TEXT NOT NULL,
    started_at TEXT NOT NULL,
    outcome TEXT NOT NULL,
    summary TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_student_topics_next_review ON student_topics(student, next_review);
CREATE INDEX IF NOT EXISTS idx_session_history_student ON session_history(student);
"#;

const SELECT_PROGRESS: &str = "SELECT topic_id, mastery, status, ease, interval_days, next_review, \
     attempts, last_reviewed, misconceptions FROM student_topics";

/// Progress backend over a single SQLite connection.
///
/// The connection sits behind a mutex; every save is one upsert inside
/// its own transaction.
pub struct SqliteBackend {
    conn: Mutex<Connection>,
}

impl SqliteBackend {
    /// Open (or create) the database at `path` and ensure the schema exists.
    pub fn open<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open database {}", path.display()))?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")
            .context("failed to enable WAL journal")?;
        Self::init(conn)
    }

    /// A private database that disappears when the backend is dropped.
    pub fn in_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory().context("failed to open in-memory database")?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> anyhow::Result<Self> {
        conn.execute_batch(SCHEMA)
            .context("failed to create tutor schema")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn storage(context: &str) -> impl Fn(rusqlite::Error) -> TutorError + '_ {
    move |e| {
        tracing::error!(error = %e, "{context} failed");
        TutorError::StorageUnavailable(format!("{context}: {e}"))
    }
}

fn progress_from_row(row: &Row<'_>) -> rusqlite::Result<(TopicProgress, String, String)> {
    let progress = TopicProgress {
        topic_id: row.get(0)?,
        mastery: row.get(1)?,
        status: Status::default(),
        ease: row.get(3)?,
        interval_days: row.get(4)?,
        next_review: row.get::<_, Option<NaiveDate>>(5)?,
        attempts: row.get(6)?,
        last_reviewed: row.get::<_, Option<NaiveDate>>(7)?,
        misconceptions: Vec::new(),
    };
    Ok((progress, row.get(2)?, row.get(8)?))
}

/// Fill in the text-encoded columns.
fn finish_progress(
    (mut progress, status, misconceptions): (TopicProgress, String, String),
) -> Result<TopicProgress, TutorError> {
    progress.status = status.parse().map_err(|e: String| {
        TutorError::StorageUnavailable(format!(
            "corrupt status for topic '{}': {e}",
            progress.topic_id
        ))
    })?;
    progress.misconceptions = serde_json::from_str(&misconceptions).map_err(|e| {
        TutorError::StorageUnavailable(format!(
            "corrupt misconceptions for topic '{}': {e}",
            progress.topic_id
        ))
    })?;
    Ok(progress)
}

impl ProgressBackend for SqliteBackend {
    fn load(&self, student: &str, topic_id: &str) -> Result<Option<TopicProgress>, TutorError> {
        let conn = self.conn();
        let row = conn
            .query_row(
                &format!("{SELECT_PROGRESS} WHERE student = ?1 AND topic_id = ?2"),
                params![student, topic_id],
                progress_from_row,
            )
            .optional()
            .map_err(storage("progress read"))?;
        row.map(finish_progress).transpose()
    }

    fn save(&self, student: &str, progress: &TopicProgress) -> Result<(), TutorError> {
        let misconceptions = serde_json::to_string(&progress.misconceptions)
            .map_err(|e| TutorError::StorageUnavailable(format!("encode misconceptions: {e}")))?;
        let conn = self.conn();
        let tx = conn
            .unchecked_transaction()
            .map_err(storage("progress write"))?;
        tx.execute(
            "INSERT INTO student_topics (student, topic_id, mastery, status, ease, interval_days, \
                 next_review, attempts, last_reviewed, misconceptions) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10) \
             ON CONFLICT(student, topic_id) DO UPDATE SET \
                 mastery = excluded.mastery, \
                 status = excluded.status, \
                 ease = excluded.ease, \
                 interval_days = excluded.interval_days, \
                 next_review = excluded.next_review, \
                 attempts = excluded.attempts, \
                 last_reviewed = excluded.last_reviewed, \
                 misconceptions = excluded.misconceptions",
            params![
                student,
                progress.topic_id,
                progress.mastery,
                progress.status.to_string(),
                progress.ease,
                progress.interval_days,
                progress.next_review,
                progress.attempts,
                progress.last_reviewed,
                misconceptions,
            ],
        )
        .map_err(storage("progress write"))?;
        tx.commit().map_err(storage("progress commit"))
    }

    fn list(&self, student: &str) -> Result<Vec<TopicProgress>, TutorError> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(&format!(
                "{SELECT_PROGRESS} WHERE student = ?1 ORDER BY topic_id"
            ))
            .map_err(storage("progress list"))?;
        let rows = stmt
            .query_map(params![student], progress_from_row)
            .map_err(storage("progress list"))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(storage("progress list"))?;
        rows.into_iter().map(finish_progress).collect()
    }

    fn append_session(&self, summary: &SessionSummary) -> Result<(), TutorError> {
        let json = serde_json::to_string(summary)
            .map_err(|e| TutorError::StorageUnavailable(format!("encode session summary: {e}")))?;
        self.conn()
            .execute(
                "INSERT INTO session_history (id, student, started_at, outcome, summary) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    summary.id.to_string(),
                    summary.student,
                    summary.started_at,
                    summary.outcome.to_string(),
                    json,
                ],
            )
            .map_err(storage("session append"))?;
        tracing::debug!(student = %summary.student, id = %summary.id, "session appended");
        Ok(())
    }

    fn sessions(&self, student: &str) -> Result<Vec<SessionSummary>, TutorError> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare("SELECT summary FROM session_history WHERE student = ?1 ORDER BY seq")
            .map_err(storage("session history"))?;
        let rows = stmt
            .query_map(params![student], |row| row.get::<_, String>(0))
            .map_err(storage("session history"))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(storage("session history"))?;
        rows.iter()
            .map(|json| {
                serde_json::from_str(json).map_err(|e| {
                    TutorError::StorageUnavailable(format!("corrupt session summary: {e}"))
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, TimeZone, Utc};
    use tutor_core::clock::ManualClock;
    use tutor_core::progress::ProgressStore;
    use tutor_core::session::SessionOutcome;

    use super::*;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 4, d).unwrap()
    }

    fn record(topic: &str, next_review: Option<NaiveDate>) -> TopicProgress {
        let mut p = TopicProgress::new(topic);
        p.status = Status::Review;
        p.mastery = 3;
        p.interval_days = 6;
        p.ease = 2.6;
        p.attempts = 5;
        p.next_review = next_review;
        p.last_reviewed = Some(date(8));
        p.misconceptions = vec!["sign error".to_string()];
        p
    }

    fn summary(student: &str, minute: i64) -> SessionSummary {
        let start = Utc.with_ymd_and_hms(2025, 4, 14, 10, 0, 0).unwrap() + Duration::minutes(minute);
        SessionSummary {
            id: uuid::Uuid::new_v4(),
            student: student.to_string(),
            started_at: start,
            ended_at: start + Duration::minutes(12),
            outcome: SessionOutcome::Completed,
            topics_introduced: vec!["linear".to_string()],
            topics_mastered: vec![],
            topics_reviewed: vec![],
            attempts: 4,
            average_grade: Some(3.5),
            hints: 1,
            breaks: 0,
            grader_fallbacks: 0,
            average_response_secs: Some(21.0),
        }
    }

    #[test]
    fn progress_round_trips_and_upserts() {
        let backend = SqliteBackend::in_memory().unwrap();
        assert_eq!(backend.load("ana", "linear").unwrap(), None);

        let mut p = record("linear", Some(date(14)));
        backend.save("ana", &p).unwrap();
        assert_eq!(backend.load("ana", "linear").unwrap(), Some(p.clone()));

        p.mastery = 4;
        p.status = Status::Mastered;
        p.interval_days = 21;
        p.next_review = Some(date(30));
        backend.save("ana", &p).unwrap();
        assert_eq!(backend.load("ana", "linear").unwrap(), Some(p));
        assert_eq!(backend.list("ana").unwrap().len(), 1);
        assert_eq!(backend.load("bo", "linear").unwrap(), None);
    }

    #[test]
    fn fresh_record_without_dates_round_trips() {
        let backend = SqliteBackend::in_memory().unwrap();
        let p = TopicProgress::new("fractions");
        backend.save("ana", &p).unwrap();
        assert_eq!(backend.load("ana", "fractions").unwrap(), Some(p));
    }

    #[test]
    fn data_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("tutor.db");
        {
            let backend = SqliteBackend::open(&path).unwrap();
            backend.save("ana", &record("linear", Some(date(20)))).unwrap();
            backend.append_session(&summary("ana", 0)).unwrap();
        }
        let backend = SqliteBackend::open(&path).unwrap();
        assert_eq!(
            backend.load("ana", "linear").unwrap().unwrap().next_review,
            Some(date(20))
        );
        assert_eq!(backend.sessions("ana").unwrap().len(), 1);
    }

    #[test]
    fn due_reviews_come_back_oldest_first() {
        let backend = Arc::new(SqliteBackend::in_memory().unwrap());
        backend.save("ana", &record("b-late", Some(date(13)))).unwrap();
        backend.save("ana", &record("a-early", Some(date(10)))).unwrap();
        backend.save("ana", &record("c-tie", Some(date(10)))).unwrap();
        backend.save("ana", &record("future", Some(date(20)))).unwrap();
        backend.save("ana", &TopicProgress::new("learning")).unwrap();
        backend.save("bo", &record("other", Some(date(1)))).unwrap();

        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 4, 14, 9, 0, 0).unwrap(),
        ));
        let store = ProgressStore::new(backend, clock);
        assert_eq!(
            store.due_for_review("ana", date(14)).unwrap(),
            vec!["a-early", "c-tie", "b-late"]
        );
    }

    #[test]
    fn sessions_are_kept_in_append_order_per_student() {
        let backend = SqliteBackend::in_memory().unwrap();
        let first = summary("ana", 0);
        let other = summary("bo", 5);
        let second = summary("ana", 60);
        backend.append_session(&first).unwrap();
        backend.append_session(&other).unwrap();
        backend.append_session(&second).unwrap();

        let history = backend.sessions("ana").unwrap();
        assert_eq!(history, vec![first, second]);
        assert!(backend.sessions("nobody").unwrap().is_empty());
    }

    #[test]
    fn corrupt_rows_surface_as_storage_errors() {
        let backend = SqliteBackend::in_memory().unwrap();
        backend.save("ana", &record("linear", None)).unwrap();
        backend
            .conn()
            .execute("UPDATE student_topics SET status = 'bogus'", [])
            .unwrap();
        let err = backend.load("ana", "linear").unwrap_err();
        assert!(matches!(err, TutorError::StorageUnavailable(_)));
    }
}
