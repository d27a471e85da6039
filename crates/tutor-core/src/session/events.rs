//! The protocol between a session and whoever is on the other side of it.

use std::fmt;

use async_trait::async_trait;

use super::summary::{SessionSummary, TopicSummary};
use crate::model::Assessment;

/// Something the session shows the learner.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Explanation {
        topic_id: String,
        topic_name: String,
        style: String,
        text: String,
        /// `true` when shown after repeated mistakes.
        remedial: bool,
    },
    ProblemPrompt {
        topic_id: String,
        text: String,
        /// `true` for a single-pass review of a scheduled topic.
        review: bool,
    },
    Hint(String),
    Feedback(Assessment),
    BreakOffer { elapsed_minutes: i64 },
    BreakStarted,
    TopicSummary(TopicSummary),
    SessionSummary(SessionSummary),
    Notice(Notice),
}

/// Out-of-band messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    ProgressNotSaved,
    /// A failed save went through on a later try, after the session had
    /// already been logged as ending in a storage failure.
    ProgressSavedLate,
    NoValidContent,
    AllMastered,
    EmptyAnswer,
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::ProgressNotSaved => {
                "Your progress could not be saved. Please try again later; nothing you completed is lost."
            }
            Self::ProgressSavedLate => {
                "Your last answer was saved after all. This session is still listed as ended by a storage failure."
            }
            Self::NoValidContent => "There are no usable topics in the catalogue.",
            Self::AllMastered => "You have mastered every topic. Well done!",
            Self::EmptyAnswer => "Type an answer, or ask for help.",
        };
        f.write_str(text)
    }
}

/// What the learner said back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LearnerReply {
    Ready,
    Answer(String),
    Help,
    Accept,
    Decline,
    Quit,
}

/// The learner-facing side of a session.
///
/// `present` shows an event without waiting; `ask` shows an event and
/// waits for the learner's reply.
#[async_trait]
pub trait Learner: Send {
    async fn present(&mut self, event: &SessionEvent);

    async fn ask(&mut self, event: &SessionEvent) -> LearnerReply;
}
