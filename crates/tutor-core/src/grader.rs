//! Grading of free-text responses through a language model.
//!
//! The model is asked for a fixed three-part answer: a grade line, a feedback
//! line, then zero or more misconception lines. Grading is advisory, so no
//! failure here ever reaches the learner as an error: unparseable output
//! defaults to grade 3 and a failed call falls back to a generic assessment.

use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use serde::{Deserialize, Serialize};

use crate::error::{ProviderError, TutorError};
use crate::model::{Assessment, Grade};
use crate::traits::{GenerateRequest, LlmProvider};

/// Rubric sent as the system prompt on every grading call.
pub const GRADER_SYSTEM_PROMPT: &str = "You are a patient tutor. Assess the student's answer to the given question.
Rate it on a scale of 0 to 5:
0 = completely wrong / no understanding
1 = minimal understanding, major errors
2 = partial understanding, some correct ideas but significant errors
3 = mostly correct, minor errors or unclear explanation
4 = correct with good explanation, maybe minor slip
5 = perfect understanding, clearly explained

Also list any misconceptions you detect. Be concise.";

/// Feedback shown when no grade could be obtained from the model.
pub const FALLBACK_FEEDBACK: &str =
    "Automatic grading is unavailable right now, so this answer was recorded as mostly correct. Let's keep going.";

/// Grading call settings.
#[derive(Debug, Clone)]
pub struct GraderConfig {
    pub model: String,
    pub max_tokens: u32,
    /// Output budget for the single retry after a failed call.
    pub retry_max_tokens: u32,
    pub temperature: f64,
    /// Upper bound on one grading call, whatever the transport does.
    pub timeout: Duration,
}

impl Default for GraderConfig {
    fn default() -> Self {
        Self {
            model: "llama3".to_string(),
            max_tokens: 300,
            retry_max_tokens: 150,
            temperature: 0.2,
            timeout: Duration::from_secs(60),
        }
    }
}

/// How an assessment was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GradeSource {
    /// Parsed from the model's answer.
    Model,
    /// The model answered but the grade line did not parse.
    Defaulted,
    /// The model could not be reached; a generic assessment was used.
    Fallback,
}

/// An assessment plus where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct GradingOutcome {
    pub assessment: Assessment,
    pub source: GradeSource,
}

impl GradingOutcome {
    fn fallback() -> Self {
        Self {
            assessment: Assessment::new(Grade::AMBIGUOUS, FALLBACK_FEEDBACK, Vec::new()),
            source: GradeSource::Fallback,
        }
    }
}

/// Wraps a language-model provider and turns its answers into assessments.
pub struct Grader {
    provider: Arc<dyn LlmProvider>,
    config: GraderConfig,
}

impl Grader {
    pub fn new(provider: Arc<dyn LlmProvider>, config: GraderConfig) -> Self {
        Self { provider, config }
    }

    pub fn config(&self) -> &GraderConfig {
        &self.config
    }

    /// Grade one response. Never fails.
    pub async fn assess(
        &self,
        problem: &str,
        reference_answer: &str,
        response: &str,
        topic_context: &str,
    ) -> Assessment {
        self.grade(problem, reference_answer, response, topic_context)
            .await
            .assessment
    }

    /// Grade one response and report how the grade was obtained.
    pub async fn grade(
        &self,
        problem: &str,
        reference_answer: &str,
        response: &str,
        topic_context: &str,
    ) -> GradingOutcome {
        let prompt = build_grading_prompt(problem, reference_answer, response, topic_context);

        let raw = match self.call(&prompt, self.config.max_tokens).await {
            Ok(raw) => raw,
            Err(e) => {
                let permanent = e
                    .downcast_ref::<ProviderError>()
                    .is_some_and(ProviderError::is_permanent);
                if permanent {
                    let err = TutorError::GraderUnavailable(format!("{e:#}"));
                    tracing::error!(provider = self.provider.name(), "{err}");
                    return GradingOutcome::fallback();
                }
                tracing::warn!(
                    provider = self.provider.name(),
                    "grading call failed, retrying with a shorter answer: {e:#}"
                );
                match self.call(&prompt, self.config.retry_max_tokens).await {
                    Ok(raw) => raw,
                    Err(e) => {
                        let err = TutorError::GraderUnavailable(format!("{e:#}"));
                        tracing::warn!(provider = self.provider.name(), "{err}");
                        return GradingOutcome::fallback();
                    }
                }
            }
        };

        let outcome = parse_grader_output(&raw);
        if outcome.source == GradeSource::Defaulted {
            let err = TutorError::MalformedGraderOutput(first_line(&raw).to_string());
            tracing::warn!("{err}; defaulting to grade {}", Grade::AMBIGUOUS);
        }
        outcome
    }

    async fn call(&self, prompt: &str, max_tokens: u32) -> anyhow::Result<String> {
        let request = GenerateRequest {
            model: self.config.model.clone(),
            prompt: prompt.to_string(),
            system_prompt: Some(GRADER_SYSTEM_PROMPT.to_string()),
            max_tokens,
            temperature: self.config.temperature,
        };
        match tokio::time::timeout(self.config.timeout, self.provider.generate(&request)).await {
            Ok(result) => Ok(result?.content),
            Err(_) => Err(anyhow!(ProviderError::Timeout(self.config.timeout.as_secs()))),
        }
    }
}

/// Compose the grading prompt.
pub fn build_grading_prompt(
    problem: &str,
    reference_answer: &str,
    response: &str,
    topic_context: &str,
) -> String {
    format!(
        "Question: {problem}
Reference answer: {reference_answer}
Student's answer: {response}
Context: {topic_context}

First, output a single number (0-5) on a line by itself. Then on the next line, give brief feedback. Then on subsequent lines, list any misconceptions (one per line)."
    )
}

/// Parse the model's three-part answer.
///
/// The first non-empty line is the grade. When it is not an integer in
/// 0..=5 the grade defaults to 3, that line becomes the feedback and no
/// misconceptions are reported.
pub fn parse_grader_output(raw: &str) -> GradingOutcome {
    let mut lines = raw.lines().map(str::trim).filter(|l| !l.is_empty());

    let Some(grade_line) = lines.next() else {
        return GradingOutcome {
            assessment: Assessment::new(Grade::AMBIGUOUS, String::new(), Vec::new()),
            source: GradeSource::Defaulted,
        };
    };

    let Some(grade) = parse_grade(grade_line) else {
        return GradingOutcome {
            assessment: Assessment::new(Grade::AMBIGUOUS, grade_line, Vec::new()),
            source: GradeSource::Defaulted,
        };
    };

    let feedback = lines.next().unwrap_or_default().to_string();
    let misconceptions = lines
        .map(strip_bullet)
        .filter(|l| !l.is_empty() && !is_none_marker(l))
        .map(str::to_string)
        .collect();

    GradingOutcome {
        assessment: Assessment::new(grade, feedback, misconceptions),
        source: GradeSource::Model,
    }
}

fn parse_grade(line: &str) -> Option<Grade> {
    let token = line.trim_matches('*').trim();
    let token = token.strip_suffix("/5").unwrap_or(token).trim();
    let token = token.trim_end_matches('.');
    token.parse::<u8>().ok().and_then(Grade::new)
}

fn strip_bullet(line: &str) -> &str {
    line.trim_start_matches(['-', '*', '•']).trim()
}

fn is_none_marker(line: &str) -> bool {
    let lower = line.trim_end_matches('.').to_lowercase();
    matches!(
        lower.as_str(),
        "none" | "n/a" | "no misconceptions" | "no misconceptions detected" | "none detected"
    )
}

fn first_line(raw: &str) -> &str {
    raw.lines().map(str::trim).find(|l| !l.is_empty()).unwrap_or("")
}
