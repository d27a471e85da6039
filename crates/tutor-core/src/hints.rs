//! Hints and alternative explanations generated by the language model.
//!
//! Generated hints are checked against the reference answer and replaced
//! with a canned hint whenever they would give the answer away.

use std::sync::Arc;
use std::time::Duration;

use crate::model::{Problem, Topic, DEFAULT_EXPLANATION_STYLE};
use crate::traits::{GenerateRequest, LlmProvider};

const GENERIC_HINT: &str =
    "Break the problem into small steps and check each one. What is the first operation you would undo?";

/// Produces hints and remedial explanations.
pub struct HintGenerator {
    provider: Arc<dyn LlmProvider>,
    model: String,
    timeout: Duration,
}

impl HintGenerator {
    pub fn new(provider: Arc<dyn LlmProvider>, model: impl Into<String>, timeout: Duration) -> Self {
        Self {
            provider,
            model: model.into(),
            timeout,
        }
    }

    /// A hint for `problem` that never contains its answer.
    pub async fn hint(&self, topic: &Topic, problem: &Problem) -> String {
        let prompt = format!(
            "Give a brief hint for solving: {} (don't give the answer)",
            problem.text
        );
        match self.complete(prompt, 120).await {
            Some(hint) if !reveals_answer(&hint, &problem.answer) => hint,
            Some(_) => {
                tracing::warn!(topic = %topic.id, "generated hint revealed the answer, using a canned hint");
                canned_hint(topic, problem)
            }
            None => canned_hint(topic, problem),
        }
    }

    /// A fresh explanation of `topic` in `style` for a struggling learner,
    /// or `None` if the model could not produce one.
    pub async fn alternative_explanation(&self, topic: &Topic, style: &str) -> Option<String> {
        let base = topic.explanation(style).unwrap_or_default();
        let prompt = format!(
            "Explain the concept of '{}' to a student who is at level 'struggling'.
Use a {style} style explanation. Be clear and encouraging.
Base explanation to inspire you (optional): {base}",
            topic.name
        );
        self.complete(prompt, 400).await
    }

    async fn complete(&self, prompt: String, max_tokens: u32) -> Option<String> {
        let request = GenerateRequest {
            model: self.model.clone(),
            prompt,
            system_prompt: None,
            max_tokens,
            temperature: 0.7,
        };
        match tokio::time::timeout(self.timeout, self.provider.generate(&request)).await {
            Ok(Ok(response)) => {
                let text = response.content.trim().to_string();
                (!text.is_empty()).then_some(text)
            }
            Ok(Err(e)) => {
                tracing::warn!(provider = self.provider.name(), "hint generation failed: {e:#}");
                None
            }
            Err(_) => {
                tracing::warn!(provider = self.provider.name(), "hint generation timed out");
                None
            }
        }
    }
}

fn canned_hint(topic: &Topic, problem: &Problem) -> String {
    let guidance = topic
        .explanation(DEFAULT_EXPLANATION_STYLE)
        .map(|e| format!("Remember: {e}"));
    match guidance {
        Some(g) if !reveals_answer(&g, &problem.answer) => g,
        _ => GENERIC_HINT.to_string(),
    }
}

/// `true` if `text` contains `answer` as a standalone token sequence.
///
/// Both sides are compared case-insensitively with spacing ignored, so
/// `x=7` and `x  =  7` both reveal `x = 7`, while `17` or `7.5` do not
/// reveal `7`.
pub fn reveals_answer(text: &str, answer: &str) -> bool {
    let mut needle = tokens(answer);
    while needle.last().is_some_and(|t| t == ".") {
        needle.pop();
    }
    if needle.is_empty() {
        return false;
    }
    tokens(text)
        .windows(needle.len())
        .any(|window| window == needle.as_slice())
}

/// Lowercased alphanumeric runs, with a decimal point kept inside a
/// number. Every other non-space character is a token of its own.
fn tokens(text: &str) -> Vec<String> {
    let chars: Vec<char> = text.to_lowercase().chars().collect();
    let mut tokens = Vec::new();
    let mut word = String::new();
    for (i, &c) in chars.iter().enumerate() {
        let decimal_point = c == '.'
            && word.ends_with(|p: char| p.is_ascii_digit())
            && chars.get(i + 1).is_some_and(char::is_ascii_digit);
        if c.is_alphanumeric() || decimal_point {
            word.push(c);
            continue;
        }
        if !word.is_empty() {
            tokens.push(std::mem::take(&mut word));
        }
        if !c.is_whitespace() {
            tokens.push(c.to_string());
        }
    }
    if !word.is_empty() {
        tokens.push(word);
    }
    tokens
}
