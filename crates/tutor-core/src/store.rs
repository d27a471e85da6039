//! Persistence backends for progress records and the session log.
//!
//! A backend only stores and retrieves; the rules for how a record changes
//! after an attempt live in [`crate::progress`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use crate::error::TutorError;
use crate::model::TopicProgress;
use crate::session::SessionSummary;

/// Durable keyed store for `(student, topic) -> TopicProgress` plus an
/// append-only log of session summaries.
pub trait ProgressBackend: Send + Sync {
    /// Load one record, `None` if the student never attempted the topic.
    fn load(&self, student: &str, topic_id: &str) -> Result<Option<TopicProgress>, TutorError>;

    /// Insert or replace one record as a single atomic write.
    fn save(&self, student: &str, progress: &TopicProgress) -> Result<(), TutorError>;

    /// Every record for a student, in any order.
    fn list(&self, student: &str) -> Result<Vec<TopicProgress>, TutorError>;

    /// Append a finished session to the student's history.
    fn append_session(&self, summary: &SessionSummary) -> Result<(), TutorError>;

    /// Session history for a student, oldest first.
    fn sessions(&self, student: &str) -> Result<Vec<SessionSummary>, TutorError>;
}

/// In-memory backend for tests and throwaway sessions.
///
/// Writes can be made to fail on demand to exercise storage-failure paths.
#[derive(Default)]
pub struct MemoryBackend {
    records: Mutex<HashMap<(String, String), TopicProgress>>,
    sessions: Mutex<Vec<SessionSummary>>,
    failing_writes: AtomicU32,
    failing_reads: AtomicU32,
    save_calls: AtomicU32,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` writes fail with `StorageUnavailable`.
    pub fn fail_next_writes(&self, n: u32) {
        self.failing_writes.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` reads fail with `StorageUnavailable`.
    pub fn fail_next_reads(&self, n: u32) {
        self.failing_reads.store(n, Ordering::SeqCst);
    }

    /// Number of `save` calls made, including failed ones.
    pub fn save_calls(&self) -> u32 {
        self.save_calls.load(Ordering::SeqCst)
    }

    fn trip(counter: &AtomicU32, what: &str) -> Result<(), TutorError> {
        let tripped = counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if tripped {
            Err(TutorError::StorageUnavailable(format!(
                "injected {what} failure"
            )))
        } else {
            Ok(())
        }
    }
}

impl ProgressBackend for MemoryBackend {
    fn load(&self, student: &str, topic_id: &str) -> Result<Option<TopicProgress>, TutorError> {
        Self::trip(&self.failing_reads, "read")?;
        let records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        Ok(records
            .get(&(student.to_string(), topic_id.to_string()))
            .cloned())
    }

    fn save(&self, student: &str, progress: &TopicProgress) -> Result<(), TutorError> {
        self.save_calls.fetch_add(1, Ordering::SeqCst);
        Self::trip(&self.failing_writes, "write")?;
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        records.insert(
            (student.to_string(), progress.topic_id.clone()),
            progress.clone(),
        );
        Ok(())
    }

    fn list(&self, student: &str) -> Result<Vec<TopicProgress>, TutorError> {
        Self::trip(&self.failing_reads, "read")?;
        let records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        Ok(records
            .iter()
            .filter(|((s, _), _)| s == student)
            .map(|(_, p)| p.clone())
            .collect())
    }

    fn append_session(&self, summary: &SessionSummary) -> Result<(), TutorError> {
        Self::trip(&self.failing_writes, "write")?;
        self.sessions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(summary.clone());
        Ok(())
    }

    fn sessions(&self, student: &str) -> Result<Vec<SessionSummary>, TutorError> {
        Self::trip(&self.failing_reads, "read")?;
        Ok(self
            .sessions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|s| s.student == student)
            .cloned()
            .collect())
    }
}
