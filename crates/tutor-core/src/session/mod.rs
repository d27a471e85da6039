//! The tutoring session state machine.
//!
//! A [`TutorSession`] drives one learner through the catalogue. It never
//! touches a terminal: everything it shows goes out as a [`SessionEvent`]
//! and everything it needs comes back as a [`LearnerReply`].

mod events;
mod selection;
mod summary;

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;

pub use events::{Learner, LearnerReply, Notice, SessionEvent};
pub use selection::{
    alternative_style, select_problem, target_difficulty, unshown_style, ALTERNATIVE_STYLES,
    RECENT_WINDOW,
};
pub use summary::{SessionOutcome, SessionSummary, TopicSummary};
use summary::SessionTally;

use crate::clock::Clock;
use crate::content::ContentSource;
use crate::error::TutorError;
use crate::fatigue::FatigueMonitor;
use crate::grader::Grader;
use crate::hints::HintGenerator;
use crate::model::{Grade, Status, Topic, TopicProgress, DEFAULT_EXPLANATION_STYLE};
use crate::progress::{ProgressStore, RetryPolicy};

/// Consecutive failing grades that trigger remediation.
pub const DEFAULT_REMEDIATION_THRESHOLD: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    Start,
    TopicIntroduction,
    Teaching,
    Remediation,
    ReviewSession,
    Assessment,
    End,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Start => "start",
            Self::TopicIntroduction => "topic_introduction",
            Self::Teaching => "teaching",
            Self::Remediation => "remediation",
            Self::ReviewSession => "review_session",
            Self::Assessment => "assessment",
            Self::End => "end",
        };
        f.write_str(s)
    }
}

/// Observable session state. Not persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionState {
    pub state: State,
    pub active_topic: Option<String>,
    pub consecutive_errors: u32,
    /// Start of the fatigue timer; moved forward when a break is accepted.
    pub session_start: DateTime<Utc>,
    pub break_suggested: bool,
}

/// Tunables for a session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub fatigue: FatigueMonitor,
    pub remediation_threshold: u32,
    /// Style used to introduce a topic.
    pub default_style: String,
    /// Seed for problem selection; random when `None`.
    pub seed: Option<u64>,
    pub retry: RetryPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            fatigue: FatigueMonitor::default(),
            remediation_threshold: DEFAULT_REMEDIATION_THRESHOLD,
            default_style: DEFAULT_EXPLANATION_STYLE.to_string(),
            seed: None,
            retry: RetryPolicy::default(),
        }
    }
}

/// One learner's tutoring session.
pub struct TutorSession {
    student: String,
    catalogue: Vec<Topic>,
    progress: ProgressStore,
    grader: Grader,
    hints: HintGenerator,
    clock: Arc<dyn Clock>,
    config: SessionConfig,
    rng: StdRng,
    state: SessionState,
    /// Topics assessed or reviewed this session.
    finished: HashSet<String>,
    shown_styles: HashMap<String, Vec<String>>,
    recent_grades: Vec<Grade>,
    current_problem: Option<usize>,
    previous_problem: Option<usize>,
    assessed: Option<TopicProgress>,
    warned_invalid: HashSet<String>,
    tally: SessionTally,
    pending_write: Option<TopicProgress>,
    outcome: Option<SessionOutcome>,
    summary: Option<SessionSummary>,
}

impl TutorSession {
    /// Load the catalogue and prepare a session in `START`.
    pub fn new(
        student: impl Into<String>,
        content: &dyn ContentSource,
        progress: ProgressStore,
        grader: Grader,
        hints: HintGenerator,
        config: SessionConfig,
    ) -> Result<Self, TutorError> {
        let catalogue = content.load_topics()?;
        let clock = progress.clock();
        let now = clock.now();
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Ok(Self {
            student: student.into(),
            catalogue,
            progress,
            grader,
            hints,
            clock,
            config,
            rng,
            state: SessionState {
                state: State::Start,
                active_topic: None,
                consecutive_errors: 0,
                session_start: now,
                break_suggested: false,
            },
            finished: HashSet::new(),
            shown_styles: HashMap::new(),
            recent_grades: Vec::new(),
            current_problem: None,
            previous_problem: None,
            assessed: None,
            warned_invalid: HashSet::new(),
            tally: SessionTally::new(now),
            pending_write: None,
            outcome: None,
            summary: None,
        })
    }

    pub fn student(&self) -> &str {
        &self.student
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn outcome(&self) -> Option<SessionOutcome> {
        self.outcome
    }

    /// The summary, once the session has ended.
    pub fn summary(&self) -> Option<&SessionSummary> {
        self.summary.as_ref()
    }

    /// A graded attempt that could not be saved.
    pub fn pending_write(&self) -> Option<&TopicProgress> {
        self.pending_write.as_ref()
    }

    /// Drive the session until it ends.
    ///
    /// Returns `StorageUnavailable` when progress could not be saved; the
    /// unsaved record stays available through [`pending_write`](Self::pending_write).
    pub async fn run(&mut self, learner: &mut dyn Learner) -> Result<SessionSummary, TutorError> {
        tracing::info!(
            student = %self.student,
            topics = self.catalogue.len(),
            "session started"
        );
        while self.state.state != State::End {
            self.step(learner).await?;
        }
        match self.summary.clone() {
            Some(summary) => Ok(summary),
            None => Ok(self.finish(learner).await),
        }
    }

    /// Run the fatigue check and one state's logic. Returns the new state.
    pub async fn step(&mut self, learner: &mut dyn Learner) -> Result<State, TutorError> {
        if self.state.state == State::End {
            return Ok(State::End);
        }

        let from = self.state.state;
        if let Err(e) = self.dispatch(learner).await {
            if !e.is_fatal_for_session() {
                return Err(e);
            }
            tracing::error!(student = %self.student, state = %from, "stopping session: {e}");
            learner
                .present(&SessionEvent::Notice(Notice::ProgressNotSaved))
                .await;
            self.end(SessionOutcome::StorageFailure);
            self.finish(learner).await;
            return Err(e);
        }

        let to = self.state.state;
        if to != from {
            tracing::debug!(student = %self.student, %from, %to, "state transition");
        }
        if to == State::End && self.summary.is_none() {
            self.finish(learner).await;
        }
        Ok(to)
    }

    /// Try again to save a graded attempt left over from a storage failure.
    pub async fn retry_pending_write(&mut self) -> Result<(), TutorError> {
        let Some(progress) = self.pending_write.clone() else {
            return Ok(());
        };
        self.progress
            .commit(&self.student, &progress, &self.config.retry)
            .await?;
        tracing::info!(student = %self.student, topic_id = %progress.topic_id, "pending progress saved");
        self.pending_write = None;
        Ok(())
    }

    async fn dispatch(&mut self, learner: &mut dyn Learner) -> Result<(), TutorError> {
        if !self.offer_break(learner).await {
            return Ok(());
        }
        match self.state.state {
            State::Start => self.start(learner).await,
            State::TopicIntroduction => {
                self.introduce(learner).await;
                Ok(())
            }
            State::Teaching => self.teach(learner, false).await,
            State::ReviewSession => self.teach(learner, true).await,
            State::Remediation => {
                self.remediate(learner).await;
                Ok(())
            }
            State::Assessment => self.assess_topic(learner).await,
            State::End => Ok(()),
        }
    }

    /// Offer a break when the fatigue monitor says so. Returns `false` if
    /// the learner quit.
    async fn offer_break(&mut self, learner: &mut dyn Learner) -> bool {
        let now = self.clock.now();
        let due = self.config.fatigue.should_suggest_break(
            self.state.session_start,
            now,
            self.state.break_suggested,
        );
        if !due {
            return true;
        }

        self.state.break_suggested = true;
        let elapsed_minutes = (now - self.state.session_start).num_minutes();
        tracing::info!(student = %self.student, elapsed_minutes, "offering a break");

        match learner
            .ask(&SessionEvent::BreakOffer { elapsed_minutes })
            .await
        {
            LearnerReply::Accept => {
                self.state.session_start = self.clock.now();
                self.state.break_suggested = false;
                self.tally.break_taken();
                if learner.ask(&SessionEvent::BreakStarted).await == LearnerReply::Quit {
                    self.abandon();
                    return false;
                }
                true
            }
            LearnerReply::Quit => {
                self.abandon();
                false
            }
            _ => {
                tracing::debug!(student = %self.student, "break declined");
                true
            }
        }
    }

    async fn start(&mut self, learner: &mut dyn Learner) -> Result<(), TutorError> {
        self.state.active_topic = None;
        self.state.consecutive_errors = 0;
        self.current_problem = None;
        self.previous_problem = None;

        let today = self.clock.today();
        let usable = self.usable_topics();
        let usable_ids: HashSet<String> = usable
            .iter()
            .map(|&i| self.catalogue[i].id.clone())
            .collect();

        let due = self
            .config
            .retry
            .run("due review lookup", || {
                self.progress.due_for_review(&self.student, today)
            })
            .await?;
        if let Some(topic_id) = due
            .into_iter()
            .find(|id| !self.finished.contains(id) && usable_ids.contains(id))
        {
            tracing::info!(student = %self.student, %topic_id, "starting due review");
            self.activate(topic_id, State::ReviewSession);
            return Ok(());
        }

        if usable.is_empty() {
            tracing::warn!(student = %self.student, "no usable topics in the catalogue");
            learner
                .present(&SessionEvent::Notice(Notice::NoValidContent))
                .await;
            self.end(SessionOutcome::NoContent);
            return Ok(());
        }

        let records: HashMap<String, TopicProgress> = self
            .config
            .retry
            .run("progress lookup", || self.progress.all(&self.student))
            .await?
            .into_iter()
            .map(|p| (p.topic_id.clone(), p))
            .collect();
        let status_of = |id: &str| records.get(id).map_or(Status::Learning, |p| p.status);

        let remaining: Vec<usize> = usable
            .iter()
            .copied()
            .filter(|&i| {
                let id = &self.catalogue[i].id;
                !self.finished.contains(id) && !status_of(id.as_str()).is_scheduled()
            })
            .collect();

        if remaining.is_empty() {
            let all_mastered = usable
                .iter()
                .all(|&i| status_of(self.catalogue[i].id.as_str()) == Status::Mastered);
            if all_mastered {
                learner
                    .present(&SessionEvent::Notice(Notice::AllMastered))
                    .await;
                self.end(SessionOutcome::AllMastered);
            } else {
                self.end(SessionOutcome::Completed);
            }
            return Ok(());
        }

        let unlocked = remaining.iter().copied().find(|&i| {
            self.catalogue[i]
                .prerequisites
                .iter()
                .filter(|p| usable_ids.contains(*p))
                .all(|p| status_of(p.as_str()) != Status::Learning)
        });
        let chosen = unlocked.unwrap_or_else(|| {
            let first = remaining[0];
            tracing::info!(
                topic_id = %self.catalogue[first].id,
                "every remaining topic has unfinished prerequisites, starting with the first"
            );
            first
        });

        let topic_id = self.catalogue[chosen].id.clone();
        tracing::info!(student = %self.student, %topic_id, "introducing topic");
        self.activate(topic_id, State::TopicIntroduction);
        Ok(())
    }

    async fn introduce(&mut self, learner: &mut dyn Learner) {
        let Some(topic) = self.active() else {
            self.state.state = State::Start;
            return;
        };
        let (style, text) = match topic.introduction_style(&self.config.default_style) {
            Some(style) => (
                style.to_string(),
                topic.explanation(style).unwrap_or_default().to_string(),
            ),
            None => (self.config.default_style.clone(), generic_introduction(&topic)),
        };
        self.shown_styles
            .entry(topic.id.clone())
            .or_default()
            .push(style.clone());
        self.tally.introduced(&topic.id);

        let event = SessionEvent::Explanation {
            topic_id: topic.id.clone(),
            topic_name: topic.name.clone(),
            style,
            text,
            remedial: false,
        };
        match learner.ask(&event).await {
            LearnerReply::Quit => self.abandon(),
            _ => self.state.state = State::Teaching,
        }
    }

    async fn teach(&mut self, learner: &mut dyn Learner, review: bool) -> Result<(), TutorError> {
        let Some(topic) = self.active() else {
            self.state.state = State::Start;
            return Ok(());
        };
        let index = match self.current_problem {
            Some(i) if i < topic.problems.len() => i,
            _ => select_problem(
                &topic.problems,
                &self.recent_grades,
                self.previous_problem,
                &mut self.rng,
            )
            .ok_or_else(|| TutorError::InvalidContent {
                topic_id: topic.id.clone(),
                reason: "empty problem pool".into(),
            })?,
        };
        self.current_problem = Some(index);
        let problem = &topic.problems[index];

        let prompt = SessionEvent::ProblemPrompt {
            topic_id: topic.id.clone(),
            text: problem.text.clone(),
            review,
        };
        let asked_at = self.clock.now();
        let response = loop {
            match learner.ask(&prompt).await {
                LearnerReply::Answer(text) if !text.trim().is_empty() => break text,
                LearnerReply::Help => {
                    let hint = self.hints.hint(&topic, problem).await;
                    self.tally.hint();
                    learner.present(&SessionEvent::Hint(hint)).await;
                    return Ok(());
                }
                LearnerReply::Quit => {
                    self.abandon();
                    return Ok(());
                }
                _ => {
                    learner
                        .present(&SessionEvent::Notice(Notice::EmptyAnswer))
                        .await
                }
            }
        };
        let response_secs = (self.clock.now() - asked_at).num_milliseconds() as f64 / 1000.0;

        let before = self
            .config
            .retry
            .run("progress read", || self.progress.get(&self.student, &topic.id))
            .await?;
        let graded = self
            .grader
            .grade(
                &problem.text,
                &problem.answer,
                &response,
                &topic.grading_context(),
            )
            .await;
        let assessment = graded.assessment;
        self.tally
            .graded(&topic.id, &assessment, graded.source, response_secs);
        self.note_grade(assessment.grade);
        self.previous_problem = Some(index);
        self.current_problem = None;

        let updated = match self
            .progress
            .record_attempt_durable(&self.student, &before, &assessment, &self.config.retry)
            .await
        {
            Ok(updated) => updated,
            Err(pending) => {
                learner.present(&SessionEvent::Feedback(assessment)).await;
                self.pending_write = Some(pending.progress);
                return Err(pending.error);
            }
        };
        let grade = assessment.grade;
        learner.present(&SessionEvent::Feedback(assessment)).await;
        tracing::info!(
            student = %self.student,
            topic_id = %topic.id,
            grade = grade.value(),
            source = ?graded.source,
            status = %updated.status,
            review,
            "attempt graded"
        );

        if review {
            self.finished.insert(topic.id.clone());
            self.tally.reviewed(&topic.id);
            self.state.state = State::Start;
            return Ok(());
        }

        if !before.status.is_scheduled() && updated.status.is_scheduled() {
            self.finished.insert(topic.id.clone());
            self.tally.mastered(&topic.id);
            self.assessed = Some(updated);
            self.state.state = State::Assessment;
            return Ok(());
        }

        if grade.is_pass() {
            self.state.consecutive_errors = 0;
        } else {
            self.state.consecutive_errors += 1;
            if self.state.consecutive_errors >= self.config.remediation_threshold {
                tracing::info!(
                    student = %self.student,
                    topic_id = %topic.id,
                    errors = self.state.consecutive_errors,
                    "switching to remediation"
                );
                self.state.state = State::Remediation;
            }
        }
        Ok(())
    }

    async fn remediate(&mut self, learner: &mut dyn Learner) {
        let Some(topic) = self.active() else {
            self.state.state = State::Start;
            return;
        };
        let shown = self.shown_styles.get(&topic.id).cloned().unwrap_or_default();

        let (style, text) = match unshown_style(&topic, &shown) {
            Some(style) => (
                style.to_string(),
                topic.explanation(style).unwrap_or_default().to_string(),
            ),
            None => {
                let style = alternative_style(&shown);
                match self.hints.alternative_explanation(&topic, style).await {
                    Some(text) => (style.to_string(), text),
                    None => {
                        tracing::warn!(topic_id = %topic.id, "no alternative explanation, repeating the stored one");
                        match topic.introduction_style(&self.config.default_style) {
                            Some(stored) => (
                                stored.to_string(),
                                topic.explanation(stored).unwrap_or_default().to_string(),
                            ),
                            None => (self.config.default_style.clone(), generic_introduction(&topic)),
                        }
                    }
                }
            }
        };
        self.shown_styles
            .entry(topic.id.clone())
            .or_default()
            .push(style.clone());

        let event = SessionEvent::Explanation {
            topic_id: topic.id.clone(),
            topic_name: topic.name.clone(),
            style,
            text,
            remedial: true,
        };
        match learner.ask(&event).await {
            LearnerReply::Quit => self.abandon(),
            _ => {
                self.state.consecutive_errors = 0;
                self.state.state = State::Teaching;
            }
        }
    }

    async fn assess_topic(&mut self, learner: &mut dyn Learner) -> Result<(), TutorError> {
        let Some(topic) = self.active() else {
            self.state.state = State::Start;
            return Ok(());
        };
        let progress = match self.assessed.take() {
            Some(progress) => progress,
            None => {
                self.config
                    .retry
                    .run("progress read", || self.progress.get(&self.student, &topic.id))
                    .await?
            }
        };
        let summary = self.tally.topic_summary(&topic.name, &progress);
        learner.present(&SessionEvent::TopicSummary(summary)).await;
        self.state.state = State::Start;
        Ok(())
    }

    async fn finish(&mut self, learner: &mut dyn Learner) -> SessionSummary {
        let outcome = self.outcome.unwrap_or(SessionOutcome::Completed);
        let summary = self.tally.finish(&self.student, self.clock.now(), outcome);
        tracing::info!(
            student = %self.student,
            %outcome,
            attempts = summary.attempts,
            minutes = summary.duration_minutes(),
            "session ended"
        );
        learner
            .present(&SessionEvent::SessionSummary(summary.clone()))
            .await;
        if let Err(e) = self
            .config
            .retry
            .run("session log append", || self.progress.append_session(&summary))
            .await
        {
            tracing::warn!(student = %self.student, "session summary not recorded: {e}");
        }
        self.summary = Some(summary.clone());
        summary
    }

    /// Indices of catalogue topics a session can teach. Invalid topics are
    /// logged once and skipped.
    fn usable_topics(&mut self) -> Vec<usize> {
        let mut usable = Vec::new();
        for (i, topic) in self.catalogue.iter().enumerate() {
            match topic.validate() {
                Ok(()) => usable.push(i),
                Err(e) => {
                    if self.warned_invalid.insert(topic.id.clone()) {
                        tracing::warn!("skipping topic: {e}");
                    }
                }
            }
        }
        usable
    }

    fn active(&self) -> Option<Topic> {
        let id = self.state.active_topic.as_deref()?;
        self.catalogue.iter().find(|t| t.id == id).cloned()
    }

    fn activate(&mut self, topic_id: String, state: State) {
        self.state.active_topic = Some(topic_id);
        self.state.consecutive_errors = 0;
        self.state.state = state;
    }

    fn note_grade(&mut self, grade: Grade) {
        self.recent_grades.push(grade);
        if self.recent_grades.len() > RECENT_WINDOW {
            self.recent_grades.remove(0);
        }
    }

    fn abandon(&mut self) {
        tracing::info!(student = %self.student, state = %self.state.state, "learner quit");
        self.current_problem = None;
        self.end(SessionOutcome::Abandoned);
    }

    fn end(&mut self, outcome: SessionOutcome) {
        self.outcome = Some(outcome);
        self.state.state = State::End;
    }
}

fn generic_introduction(topic: &Topic) -> String {
    format!("Let's work on {}.", topic.name)
}
