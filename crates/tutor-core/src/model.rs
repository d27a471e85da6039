//! Core data model types for the tutor.
//!
//! Topics and problems come from the content catalogue and are read-only for
//! the duration of a session. `TopicProgress` is the durable per-student
//! record that the progress store owns.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::TutorError;

/// Style used to introduce a topic when nothing else is requested.
pub const DEFAULT_EXPLANATION_STYLE: &str = "procedural";

/// Initial ease factor for a fresh progress record.
pub const INITIAL_EASE: f64 = 2.5;

/// Consecutive confident passes that move a topic out of active teaching.
pub const MASTERY_STREAK: u32 = 3;

/// Maximum number of misconception labels kept per progress record.
pub const MAX_TRACKED_MISCONCEPTIONS: usize = 20;

/// A unit of content the learner works through.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Topic {
    /// Unique identifier.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Topics that should be out of active learning first.
    #[serde(default)]
    pub prerequisites: Vec<String>,
    /// Explanation variants keyed by pedagogical style.
    #[serde(default)]
    pub explanations: BTreeMap<String, String>,
    /// Practice problems.
    #[serde(default)]
    pub problems: Vec<Problem>,
    /// Known misconception descriptions, passed to the grader as context.
    #[serde(default)]
    pub misconceptions: Vec<String>,
}

impl Topic {
    /// The explanation for `style`, if the topic has one.
    pub fn explanation(&self, style: &str) -> Option<&str> {
        self.explanations.get(style).map(String::as_str)
    }

    /// Style used for the introduction: `preferred` if present, otherwise the
    /// first style in key order.
    pub fn introduction_style(&self, preferred: &str) -> Option<&str> {
        if let Some((key, _)) = self.explanations.get_key_value(preferred) {
            return Some(key.as_str());
        }
        self.explanations.keys().next().map(String::as_str)
    }

    /// Context string handed to the grader alongside each response.
    pub fn grading_context(&self) -> String {
        let mut context = format!("Topic: {}.", self.name);
        if !self.misconceptions.is_empty() {
            context.push_str(" Common misconceptions: ");
            context.push_str(&self.misconceptions.join("; "));
            context.push('.');
        }
        context
    }
}

/// A practice problem belonging to a topic.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Problem {
    /// Prompt shown to the learner.
    pub text: String,
    /// Canonical answer. Only ever used as grading context.
    pub answer: String,
    /// Difficulty rank; a selection hint, never enforced.
    #[serde(default = "default_difficulty")]
    pub difficulty: u32,
}

fn default_difficulty() -> u32 {
    1
}

/// Where a topic sits in the learner's lifecycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[default]
    Learning,
    Review,
    Mastered,
}

impl Status {
    /// `true` for statuses that are driven by the review schedule.
    pub fn is_scheduled(&self) -> bool {
        matches!(self, Status::Review | Status::Mastered)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Learning => write!(f, "learning"),
            Status::Review => write!(f, "review"),
            Status::Mastered => write!(f, "mastered"),
        }
    }
}

impl FromStr for Status {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "learning" => Ok(Status::Learning),
            "review" => Ok(Status::Review),
            "mastered" => Ok(Status::Mastered),
            other => Err(format!("unknown status: {other}")),
        }
    }
}

/// Durable per-student, per-topic learning record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicProgress {
    pub topic_id: String,
    /// Consecutive confident passes (grade >= 4).
    pub mastery: u32,
    pub status: Status,
    /// SM-2 ease factor, always within [1.3, 2.5].
    pub ease: f64,
    /// Current review interval in days.
    pub interval_days: u32,
    pub next_review: Option<NaiveDate>,
    pub attempts: u32,
    /// Date of the most recent graded attempt.
    #[serde(default)]
    pub last_reviewed: Option<NaiveDate>,
    /// Misconception labels observed across attempts, oldest first.
    #[serde(default)]
    pub misconceptions: Vec<String>,
}

impl TopicProgress {
    /// A record for a topic the learner has never attempted.
    pub fn new(topic_id: impl Into<String>) -> Self {
        Self {
            topic_id: topic_id.into(),
            mastery: 0,
            status: Status::Learning,
            ease: INITIAL_EASE,
            interval_days: 0,
            next_review: None,
            attempts: 0,
            last_reviewed: None,
            misconceptions: Vec::new(),
        }
    }

    /// `true` when a review is scheduled on or before `as_of`.
    pub fn is_due(&self, as_of: NaiveDate) -> bool {
        self.status.is_scheduled() && self.next_review.is_some_and(|d| d <= as_of)
    }

    /// Merge newly observed misconceptions, keeping the list bounded.
    pub fn note_misconceptions(&mut self, labels: &[String]) {
        for label in labels {
            let label = label.trim();
            if label.is_empty()
                || self
                    .misconceptions
                    .iter()
                    .any(|m| m.eq_ignore_ascii_case(label))
            {
                continue;
            }
            self.misconceptions.push(label.to_string());
        }
        if self.misconceptions.len() > MAX_TRACKED_MISCONCEPTIONS {
            let excess = self.misconceptions.len() - MAX_TRACKED_MISCONCEPTIONS;
            self.misconceptions.drain(..excess);
        }
    }
}

/// A recall-quality grade in 0..=5.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Grade(u8);

impl Grade {
    pub const MAX: u8 = 5;

    /// Grade used whenever the grader's answer cannot be trusted.
    pub const AMBIGUOUS: Grade = Grade(3);

    pub fn new(value: u8) -> Option<Self> {
        (value <= Self::MAX).then_some(Self(value))
    }

    pub fn value(self) -> u8 {
        self.0
    }

    /// SM-2 pass bar (>= 3).
    pub fn is_pass(self) -> bool {
        self.0 >= 3
    }

    /// Mastery bar (>= 4), stricter than the scheduling pass.
    pub fn is_confident(self) -> bool {
        self.0 >= 4
    }
}

impl TryFrom<u8> for Grade {
    type Error = TutorError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Grade::new(value).ok_or(TutorError::InvalidGrade(value))
    }
}

impl From<Grade> for u8 {
    fn from(grade: Grade) -> Self {
        grade.0
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The grader's verdict on one response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assessment {
    pub grade: Grade,
    #[serde(default)]
    pub feedback: String,
    #[serde(default)]
    pub misconceptions: Vec<String>,
}

impl Assessment {
    pub fn new(grade: Grade, feedback: impl Into<String>, misconceptions: Vec<String>) -> Self {
        Self {
            grade,
            feedback: feedback.into(),
            misconceptions,
        }
    }
}
