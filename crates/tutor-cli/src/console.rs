//! Terminal learner: renders session events as text and reads replies
//! line by line.

use std::io::Write;

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Stdin};

use tutor_core::session::{Learner, LearnerReply, SessionEvent};

/// A [`Learner`] over any line-oriented input and text output.
///
/// End of input is treated as the learner walking away.
pub struct ConsoleLearner<R, W> {
    input: R,
    output: W,
}

impl ConsoleLearner<BufReader<Stdin>, std::io::Stdout> {
    pub fn stdio() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()), std::io::stdout())
    }
}

impl<R, W> ConsoleLearner<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: Write + Send,
{
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    #[cfg(test)]
    pub fn into_output(self) -> W {
        self.output
    }

    fn write(&mut self, text: &str, newline: bool) {
        let result = if newline {
            writeln!(self.output, "{text}")
        } else {
            write!(self.output, "{text}")
        };
        if let Err(e) = result.and_then(|()| self.output.flush()) {
            tracing::warn!(error = %e, "failed to write to console");
        }
    }

    async fn read_line(&mut self) -> Option<String> {
        let mut line = String::new();
        match self.input.read_line(&mut line).await {
            Ok(0) => None,
            Ok(_) => Some(line.trim_end_matches(['\r', '\n']).to_string()),
            Err(e) => {
                tracing::warn!(error = %e, "failed to read from console");
                None
            }
        }
    }
}

#[async_trait]
impl<R, W> Learner for ConsoleLearner<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: Write + Send,
{
    async fn present(&mut self, event: &SessionEvent) {
        let text = render(event);
        self.write(&text, true);
    }

    async fn ask(&mut self, event: &SessionEvent) -> LearnerReply {
        let text = render(event);
        self.write(&text, true);
        self.write(prompt(event), false);
        match self.read_line().await {
            Some(line) => interpret(event, &line),
            None => {
                self.write("", true);
                LearnerReply::Quit
            }
        }
    }
}

/// Map a typed line to a reply for the event that asked for it.
pub fn interpret(event: &SessionEvent, line: &str) -> LearnerReply {
    let word = line.trim().to_lowercase();
    if matches!(word.as_str(), "quit" | "exit") {
        return LearnerReply::Quit;
    }
    match event {
        SessionEvent::ProblemPrompt { .. } => match word.as_str() {
            "help" | "hint" | "?" => LearnerReply::Help,
            _ => LearnerReply::Answer(line.trim().to_string()),
        },
        SessionEvent::BreakOffer { .. } => match word.as_str() {
            "y" | "yes" => LearnerReply::Accept,
            _ => LearnerReply::Decline,
        },
        _ => LearnerReply::Ready,
    }
}

fn prompt(event: &SessionEvent) -> &'static str {
    match event {
        SessionEvent::ProblemPrompt { .. } => "Your answer ('help' for a hint, 'quit' to stop): ",
        SessionEvent::BreakOffer { .. } => "Take a break? [y/N] ",
        SessionEvent::BreakStarted => "Press Enter when you are ready to continue. ",
        _ => "Press Enter to continue. ",
    }
}

fn grade_text(average: Option<f64>) -> String {
    average.map_or_else(|| "-".to_string(), |g| format!("{g:.1}"))
}

fn list_text(items: &[String]) -> String {
    if items.is_empty() {
        "none".to_string()
    } else {
        items.join(", ")
    }
}

/// Text shown for an event.
pub fn render(event: &SessionEvent) -> String {
    match event {
        SessionEvent::Explanation {
            topic_name,
            style,
            text,
            remedial,
            ..
        } => {
            if *remedial {
                format!("\nLet's look at {topic_name} another way ({style}).\n\n{text}\n")
            } else {
                format!("\n== {topic_name} ==\n\n{text}\n")
            }
        }
        SessionEvent::ProblemPrompt { text, review, .. } => {
            let label = if *review { "Review" } else { "Problem" };
            format!("\n{label}: {text}")
        }
        SessionEvent::Hint(hint) => format!("Hint: {hint}"),
        SessionEvent::Feedback(assessment) => {
            let mut out = format!("Grade {}/5. {}", assessment.grade.value(), assessment.feedback);
            if !assessment.misconceptions.is_empty() {
                out.push_str(&format!(
                    "\nWatch out for: {}",
                    assessment.misconceptions.join("; ")
                ));
            }
            out
        }
        SessionEvent::BreakOffer { elapsed_minutes } => {
            format!("\nYou have been working for {elapsed_minutes} minutes.")
        }
        SessionEvent::BreakStarted => "Break time. Stand up, stretch, grab some water.".to_string(),
        SessionEvent::TopicSummary(summary) => {
            let next = summary
                .next_review
                .map_or_else(|| "not scheduled".to_string(), |d| d.to_string());
            let mut out = format!(
                "\n{} is now in {}: {} attempt(s), average grade {}, next review {}.",
                summary.topic_name,
                summary.status,
                summary.attempts,
                grade_text(summary.average_grade),
                next
            );
            if !summary.misconceptions.is_empty() {
                out.push_str(&format!(
                    "\nThings to keep an eye on: {}",
                    summary.misconceptions.join("; ")
                ));
            }
            out
        }
        SessionEvent::SessionSummary(summary) => format!(
            "\nSession summary ({})\n  duration:   {} min\n  attempts:   {} (average grade {})\n  introduced: {}\n  finished:   {}\n  reviewed:   {}\n  hints: {}, breaks: {}",
            summary.outcome,
            summary.duration_minutes(),
            summary.attempts,
            grade_text(summary.average_grade),
            list_text(&summary.topics_introduced),
            list_text(&summary.topics_mastered),
            list_text(&summary.topics_reviewed),
            summary.hints,
            summary.breaks,
        ),
        SessionEvent::Notice(notice) => notice.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use tutor_core::model::{Assessment, Grade};
    use tutor_core::session::Notice;

    use super::*;

    fn prompt_event() -> SessionEvent {
        SessionEvent::ProblemPrompt {
            topic_id: "linear".into(),
            text: "Solve 2x + 5 = 19".into(),
            review: false,
        }
    }

    #[test]
    fn interprets_problem_replies() {
        let event = prompt_event();
        assert_eq!(interpret(&event, " 7 "), LearnerReply::Answer("7".into()));
        assert_eq!(interpret(&event, "HELP"), LearnerReply::Help);
        assert_eq!(interpret(&event, "quit"), LearnerReply::Quit);
        assert_eq!(interpret(&event, ""), LearnerReply::Answer(String::new()));
    }

    #[test]
    fn interprets_break_replies() {
        let event = SessionEvent::BreakOffer { elapsed_minutes: 21 };
        assert_eq!(interpret(&event, "y"), LearnerReply::Accept);
        assert_eq!(interpret(&event, "Yes"), LearnerReply::Accept);
        assert_eq!(interpret(&event, ""), LearnerReply::Decline);
        assert_eq!(interpret(&event, "n"), LearnerReply::Decline);
        assert_eq!(interpret(&SessionEvent::BreakStarted, ""), LearnerReply::Ready);
    }

    #[test]
    fn renders_feedback_with_misconceptions() {
        let event = SessionEvent::Feedback(Assessment::new(
            Grade::new(2).unwrap(),
            "Check the sign.",
            vec!["sign error".into()],
        ));
        let text = render(&event);
        assert!(text.contains("Grade 2/5. Check the sign."));
        assert!(text.contains("Watch out for: sign error"));
    }

    #[test]
    fn late_save_notice_keeps_the_logged_outcome() {
        let text = render(&SessionEvent::Notice(Notice::ProgressSavedLate));
        assert!(text.contains("saved after all"));
        assert!(text.contains("storage failure"));
    }

    #[tokio::test]
    async fn reads_lines_until_end_of_input() {
        let input: &[u8] = b"7\nhelp\n";
        let mut learner = ConsoleLearner::new(input, Vec::new());
        let event = prompt_event();

        assert_eq!(learner.ask(&event).await, LearnerReply::Answer("7".into()));
        assert_eq!(learner.ask(&event).await, LearnerReply::Help);
        assert_eq!(learner.ask(&event).await, LearnerReply::Quit);

        learner
            .present(&SessionEvent::Notice(Notice::AllMastered))
            .await;
        let output = String::from_utf8(learner.into_output()).unwrap();
        assert!(output.contains("Problem: Solve 2x + 5 = 19"));
        assert!(output.contains("You have mastered every topic"));
    }
}
