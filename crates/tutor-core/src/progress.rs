//! Per-student progress tracking.
//!
//! `ProgressStore` owns the rules for how a `TopicProgress` record changes
//! after a graded attempt and commits every change to a [`ProgressBackend`]
//! before returning. Ease and interval are only ever produced by
//! [`crate::scheduler::schedule`].

use std::sync::Arc;
use std::time::Duration;

use chrono::{Days, NaiveDate};

use crate::clock::Clock;
use crate::error::TutorError;
use crate::model::{Assessment, Status, TopicProgress, MASTERY_STREAK};
use crate::scheduler::schedule;
use crate::session::SessionSummary;
use crate::store::ProgressBackend;

/// A `review` topic whose interval reaches this many days becomes `mastered`.
pub const MASTERED_INTERVAL_DAYS: u32 = 21;

/// Bounded exponential backoff for persistence operations.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total tries, including the first one.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Run `op`, retrying `StorageUnavailable` failures with backoff.
    pub async fn run<T, F>(&self, what: &str, mut op: F) -> Result<T, TutorError>
    where
        F: FnMut() -> Result<T, TutorError>,
    {
        let mut delay = self.initial_backoff;
        let attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(e) if e.is_fatal_for_session() && attempt < attempts => {
                    tracing::warn!(
                        attempt,
                        max_attempts = attempts,
                        "{what} failed, retrying in {}ms: {e}",
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(self.max_backoff);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Apply one graded attempt to a progress record.
pub fn apply_attempt(
    prior: &TopicProgress,
    assessment: &Assessment,
    today: NaiveDate,
) -> TopicProgress {
    let grade = assessment.grade;
    let mut next = prior.clone();
    next.attempts += 1;
    next.last_reviewed = Some(today);
    next.note_misconceptions(&assessment.misconceptions);

    if grade.is_confident() {
        next.mastery += 1;
    } else {
        next.mastery = 0;
    }

    if next.status == Status::Learning && next.mastery >= MASTERY_STREAK {
        next.status = Status::Review;
        next.next_review = Some(days_after(today, 1));
        return next;
    }

    let s = schedule(grade, next.ease, next.interval_days);
    next.ease = s.ease;
    next.interval_days = s.interval_days;

    if next.status.is_scheduled() {
        next.next_review = Some(days_after(today, s.interval_days));
        next.status = match next.status {
            Status::Review if grade.is_pass() && s.interval_days >= MASTERED_INTERVAL_DAYS => {
                Status::Mastered
            }
            Status::Mastered if !grade.is_pass() => Status::Review,
            status => status,
        };
    }

    next
}

fn days_after(date: NaiveDate, days: u32) -> NaiveDate {
    date.checked_add_days(Days::new(u64::from(days)))
        .unwrap_or(NaiveDate::MAX)
}

/// Progress records for students, backed by a persistence backend.
#[derive(Clone)]
pub struct ProgressStore {
    backend: Arc<dyn ProgressBackend>,
    clock: Arc<dyn Clock>,
}

impl ProgressStore {
    pub fn new(backend: Arc<dyn ProgressBackend>, clock: Arc<dyn Clock>) -> Self {
        Self { backend, clock }
    }

    /// The student's record for a topic, or a fresh one if none exists.
    pub fn get(&self, student: &str, topic_id: &str) -> Result<TopicProgress, TutorError> {
        Ok(self
            .backend
            .load(student, topic_id)?
            .unwrap_or_else(|| TopicProgress::new(topic_id)))
    }

    /// Every stored record for a student, ordered by topic id.
    pub fn all(&self, student: &str) -> Result<Vec<TopicProgress>, TutorError> {
        let mut records = self.backend.list(student)?;
        records.sort_by(|a, b| a.topic_id.cmp(&b.topic_id));
        Ok(records)
    }

    /// Record a graded attempt and persist the result before returning.
    pub fn record_attempt(
        &self,
        student: &str,
        topic_id: &str,
        assessment: &Assessment,
    ) -> Result<TopicProgress, TutorError> {
        let prior = self.get(student, topic_id)?;
        let updated = apply_attempt(&prior, assessment, self.clock.today());
        self.backend.save(student, &updated)?;
        tracing::debug!(
            student,
            topic_id,
            grade = assessment.grade.value(),
            status = %updated.status,
            mastery = updated.mastery,
            "attempt recorded"
        );
        Ok(updated)
    }

    /// Like [`record_attempt`](Self::record_attempt), starting from a
    /// record the caller already read and retrying the write. The updated
    /// record is computed once, so a retry never counts the attempt twice
    /// and a failing store cannot lose the assessment.
    ///
    /// On failure the computed record comes back in [`PendingWrite`] so
    /// the caller can keep it and try again later.
    pub async fn record_attempt_durable(
        &self,
        student: &str,
        prior: &TopicProgress,
        assessment: &Assessment,
        policy: &RetryPolicy,
    ) -> Result<TopicProgress, PendingWrite> {
        let updated = apply_attempt(prior, assessment, self.clock.today());
        match self.commit(student, &updated, policy).await {
            Ok(()) => Ok(updated),
            Err(error) => Err(PendingWrite {
                progress: updated,
                error,
            }),
        }
    }

    /// Persist an already computed record, retrying with backoff.
    pub async fn commit(
        &self,
        student: &str,
        progress: &TopicProgress,
        policy: &RetryPolicy,
    ) -> Result<(), TutorError> {
        policy
            .run("progress write", || self.backend.save(student, progress))
            .await
    }

    /// Topics due on or before `as_of`, oldest due first, ties by topic id.
    pub fn due_for_review(&self, student: &str, as_of: NaiveDate) -> Result<Vec<String>, TutorError> {
        let mut due: Vec<TopicProgress> = self
            .backend
            .list(student)?
            .into_iter()
            .filter(|p| p.is_due(as_of))
            .collect();
        due.sort_by(|a, b| {
            a.next_review
                .cmp(&b.next_review)
                .then_with(|| a.topic_id.cmp(&b.topic_id))
        });
        Ok(due.into_iter().map(|p| p.topic_id).collect())
    }

    pub fn append_session(&self, summary: &SessionSummary) -> Result<(), TutorError> {
        self.backend.append_session(summary)
    }

    pub fn sessions(&self, student: &str) -> Result<Vec<SessionSummary>, TutorError> {
        self.backend.sessions(student)
    }

    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }
}

/// A graded attempt whose record could not be persisted.
#[derive(Debug)]
pub struct PendingWrite {
    /// The computed record that still needs saving.
    pub progress: TopicProgress,
    pub error: TutorError,
}
