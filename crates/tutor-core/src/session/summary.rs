//! Session and topic summaries, and the running tally they are built from.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::grader::GradeSource;
use crate::model::{Assessment, Status, TopicProgress};

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionOutcome {
    /// Nothing left to teach or review today.
    Completed,
    /// Every topic in the catalogue is mastered.
    AllMastered,
    /// The catalogue had no usable topics.
    NoContent,
    /// The learner quit.
    Abandoned,
    /// Progress could not be persisted.
    StorageFailure,
}

impl fmt::Display for SessionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Completed => "completed",
            Self::AllMastered => "all mastered",
            Self::NoContent => "no content",
            Self::Abandoned => "abandoned",
            Self::StorageFailure => "storage failure",
        };
        f.write_str(s)
    }
}

/// One entry in a student's session log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: Uuid,
    pub student: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub outcome: SessionOutcome,
    pub topics_introduced: Vec<String>,
    /// Topics that left active teaching during this session.
    pub topics_mastered: Vec<String>,
    pub topics_reviewed: Vec<String>,
    /// Graded attempts.
    pub attempts: u32,
    pub average_grade: Option<f64>,
    pub hints: u32,
    pub breaks: u32,
    /// Attempts graded by the fallback assessment.
    pub grader_fallbacks: u32,
    pub average_response_secs: Option<f64>,
}

impl SessionSummary {
    pub fn duration_minutes(&self) -> i64 {
        (self.ended_at - self.started_at).num_minutes()
    }
}

/// What the learner achieved on a topic that just left active teaching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicSummary {
    pub topic_id: String,
    pub topic_name: String,
    pub status: Status,
    /// Attempts made during this session.
    pub attempts: u32,
    pub average_grade: Option<f64>,
    pub misconceptions: Vec<String>,
    pub next_review: Option<NaiveDate>,
}

#[derive(Debug, Default)]
struct TopicTally {
    grades: Vec<u8>,
    misconceptions: Vec<String>,
}

/// Counters accumulated while a session runs.
#[derive(Debug)]
pub(crate) struct SessionTally {
    id: Uuid,
    started_at: DateTime<Utc>,
    introduced: Vec<String>,
    mastered: Vec<String>,
    reviewed: Vec<String>,
    grades: Vec<u8>,
    response_secs: Vec<f64>,
    hints: u32,
    breaks: u32,
    grader_fallbacks: u32,
    topics: HashMap<String, TopicTally>,
}

impl SessionTally {
    pub(crate) fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at,
            introduced: Vec::new(),
            mastered: Vec::new(),
            reviewed: Vec::new(),
            grades: Vec::new(),
            response_secs: Vec::new(),
            hints: 0,
            breaks: 0,
            grader_fallbacks: 0,
            topics: HashMap::new(),
        }
    }

    pub(crate) fn introduced(&mut self, topic_id: &str) {
        push_unique(&mut self.introduced, topic_id);
    }

    pub(crate) fn mastered(&mut self, topic_id: &str) {
        push_unique(&mut self.mastered, topic_id);
    }

    pub(crate) fn reviewed(&mut self, topic_id: &str) {
        push_unique(&mut self.reviewed, topic_id);
    }

    pub(crate) fn hint(&mut self) {
        self.hints += 1;
    }

    pub(crate) fn break_taken(&mut self) {
        self.breaks += 1;
    }

    pub(crate) fn graded(
        &mut self,
        topic_id: &str,
        assessment: &Assessment,
        source: GradeSource,
        response_secs: f64,
    ) {
        let grade = assessment.grade.value();
        self.grades.push(grade);
        self.response_secs.push(response_secs);
        if source == GradeSource::Fallback {
            self.grader_fallbacks += 1;
        }
        let topic = self.topics.entry(topic_id.to_string()).or_default();
        topic.grades.push(grade);
        for m in &assessment.misconceptions {
            push_unique(&mut topic.misconceptions, m);
        }
    }

    pub(crate) fn topic_summary(&self, name: &str, progress: &TopicProgress) -> TopicSummary {
        let tally = self.topics.get(&progress.topic_id);
        TopicSummary {
            topic_id: progress.topic_id.clone(),
            topic_name: name.to_string(),
            status: progress.status,
            attempts: tally.map_or(0, |t| t.grades.len() as u32),
            average_grade: tally.and_then(|t| mean(t.grades.iter().map(|&g| f64::from(g)))),
            misconceptions: tally.map(|t| t.misconceptions.clone()).unwrap_or_default(),
            next_review: progress.next_review,
        }
    }

    pub(crate) fn finish(
        &self,
        student: &str,
        ended_at: DateTime<Utc>,
        outcome: SessionOutcome,
    ) -> SessionSummary {
        SessionSummary {
            id: self.id,
            student: student.to_string(),
            started_at: self.started_at,
            ended_at,
            outcome,
            topics_introduced: self.introduced.clone(),
            topics_mastered: self.mastered.clone(),
            topics_reviewed: self.reviewed.clone(),
            attempts: self.grades.len() as u32,
            average_grade: mean(self.grades.iter().map(|&g| f64::from(g))),
            hints: self.hints,
            breaks: self.breaks,
            grader_fallbacks: self.grader_fallbacks,
            average_response_secs: mean(self.response_secs.iter().copied()),
        }
    }
}

fn push_unique(list: &mut Vec<String>, item: &str) {
    if !list.iter().any(|existing| existing == item) {
        list.push(item.to_string());
    }
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    (count > 0).then(|| sum / count as f64)
}
