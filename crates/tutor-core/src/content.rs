//! TOML topic catalogue loading and validation.
//!
//! A catalogue file is a list of `[[topics]]` tables. Order in the file is
//! the teaching order. Topics missing a name or a problem pool still load;
//! the session skips them as invalid content.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::error::TutorError;
use crate::model::{Problem, Topic, DEFAULT_EXPLANATION_STYLE};

/// Supplies the ordered topic catalogue.
pub trait ContentSource: Send + Sync {
    /// Load every topic, in teaching order. Must be side-effect free.
    fn load_topics(&self) -> Result<Vec<Topic>, TutorError>;
}

/// A catalogue held in memory.
#[derive(Debug, Clone, Default)]
pub struct StaticContent {
    topics: Vec<Topic>,
}

impl StaticContent {
    pub fn new(topics: Vec<Topic>) -> Self {
        Self { topics }
    }
}

impl ContentSource for StaticContent {
    fn load_topics(&self) -> Result<Vec<Topic>, TutorError> {
        Ok(self.topics.clone())
    }
}

/// A catalogue read from a TOML file, or from every `.toml` file in a
/// directory (in file-name order).
#[derive(Debug, Clone)]
pub struct TomlContent {
    path: PathBuf,
}

impl TomlContent {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ContentSource for TomlContent {
    fn load_topics(&self) -> Result<Vec<Topic>, TutorError> {
        let loaded = if self.path.is_dir() {
            load_catalogue_directory(&self.path)
        } else {
            parse_catalogue(&self.path)
        };
        loaded.map_err(|e| TutorError::Content(format!("{e:#}")))
    }
}

/// Intermediate TOML structure for catalogue files.
#[derive(Debug, Deserialize)]
struct TomlCatalogue {
    #[serde(default)]
    topics: Vec<TomlTopic>,
}

#[derive(Debug, Deserialize)]
struct TomlTopic {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    prerequisites: Vec<String>,
    #[serde(default)]
    explanations: BTreeMap<String, String>,
    #[serde(default)]
    problems: Vec<TomlProblem>,
    #[serde(default)]
    misconceptions: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct TomlProblem {
    text: String,
    answer: toml::Value,
    #[serde(default = "default_difficulty")]
    difficulty: u32,
}

fn default_difficulty() -> u32 {
    1
}

/// Parse a single TOML catalogue file.
pub fn parse_catalogue(path: &Path) -> Result<Vec<Topic>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read catalogue file: {}", path.display()))?;

    parse_catalogue_str(&content, path)
}

/// Parse a TOML catalogue string (useful for testing).
pub fn parse_catalogue_str(content: &str, source_path: &Path) -> Result<Vec<Topic>> {
    let parsed: TomlCatalogue = toml::from_str(content)
        .with_context(|| format!("failed to parse TOML: {}", source_path.display()))?;

    parsed
        .topics
        .into_iter()
        .map(|t| {
            let problems = t
                .problems
                .into_iter()
                .map(|p| {
                    let answer = match p.answer {
                        toml::Value::String(s) => s,
                        toml::Value::Integer(i) => i.to_string(),
                        toml::Value::Float(f) => f.to_string(),
                        other => anyhow::bail!(
                            "topic '{}': unsupported answer value {other} for problem '{}'",
                            t.id,
                            p.text
                        ),
                    };
                    Ok(Problem {
                        text: p.text,
                        answer,
                        difficulty: p.difficulty,
                    })
                })
                .collect::<Result<Vec<_>>>()?;

            Ok(Topic {
                id: t.id,
                name: t.name.unwrap_or_default(),
                prerequisites: t.prerequisites,
                explanations: t.explanations,
                problems,
                misconceptions: t.misconceptions,
            })
        })
        .collect()
}

/// Load every `.toml` catalogue in a directory, concatenated in file-name order.
pub fn load_catalogue_directory(dir: &Path) -> Result<Vec<Topic>> {
    if !dir.is_dir() {
        anyhow::bail!("not a directory: {}", dir.display());
    }

    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir)
        .with_context(|| format!("failed to read directory: {}", dir.display()))?
    {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "toml") {
            paths.push(path);
        }
    }
    paths.sort();

    let mut topics = Vec::new();
    for path in paths {
        match parse_catalogue(&path) {
            Ok(parsed) => topics.extend(parsed),
            Err(e) => tracing::warn!("skipping {}: {e:#}", path.display()),
        }
    }
    Ok(topics)
}

impl Topic {
    /// Check the fields a session cannot work without.
    pub fn validate(&self) -> Result<(), TutorError> {
        let invalid = |reason: &str| TutorError::InvalidContent {
            topic_id: self.id.clone(),
            reason: reason.to_string(),
        };
        if self.name.trim().is_empty() {
            return Err(invalid("missing name"));
        }
        if self.problems.is_empty() {
            return Err(invalid("empty problem pool"));
        }
        Ok(())
    }
}

/// A warning from catalogue validation.
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    /// The topic ID (if applicable).
    pub topic_id: Option<String>,
    /// Warning message.
    pub message: String,
    /// `true` if the session will skip this topic.
    pub skips_topic: bool,
}

impl ValidationWarning {
    fn topic(topic_id: &str, message: impl Into<String>) -> Self {
        Self {
            topic_id: Some(topic_id.to_string()),
            message: message.into(),
            skips_topic: false,
        }
    }
}

/// Validate a catalogue for common issues.
pub fn validate_catalogue(topics: &[Topic]) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();

    if topics.is_empty() {
        warnings.push(ValidationWarning {
            topic_id: None,
            message: "catalogue contains no topics".into(),
            skips_topic: false,
        });
        return warnings;
    }

    let mut seen_ids = HashSet::new();
    for topic in topics {
        if !seen_ids.insert(topic.id.as_str()) {
            warnings.push(ValidationWarning::topic(
                &topic.id,
                format!("duplicate topic ID: {}", topic.id),
            ));
        }
    }

    let known: HashSet<&str> = topics.iter().map(|t| t.id.as_str()).collect();
    for topic in topics {
        if let Err(TutorError::InvalidContent { reason, .. }) = topic.validate() {
            warnings.push(ValidationWarning {
                skips_topic: true,
                ..ValidationWarning::topic(&topic.id, reason)
            });
        }

        if topic.explanations.is_empty() {
            warnings.push(ValidationWarning::topic(&topic.id, "no explanations"));
        } else if !topic.explanations.contains_key(DEFAULT_EXPLANATION_STYLE) {
            warnings.push(ValidationWarning::topic(
                &topic.id,
                format!("no '{DEFAULT_EXPLANATION_STYLE}' explanation; the first style will introduce the topic"),
            ));
        }

        for prereq in &topic.prerequisites {
            if prereq == &topic.id {
                warnings.push(ValidationWarning::topic(&topic.id, "topic lists itself as a prerequisite"));
            } else if !known.contains(prereq.as_str()) {
                warnings.push(ValidationWarning::topic(
                    &topic.id,
                    format!("prerequisite '{prereq}' is not in the catalogue and will be ignored"),
                ));
            }
        }

        for (i, problem) in topic.problems.iter().enumerate() {
            if problem.text.trim().is_empty() {
                warnings.push(ValidationWarning::topic(
                    &topic.id,
                    format!("problem {} has empty text", i + 1),
                ));
            }
            if problem.answer.trim().is_empty() {
                warnings.push(ValidationWarning::topic(
                    &topic.id,
                    format!("problem {} has no reference answer", i + 1),
                ));
            }
        }
    }

    warnings
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID_TOML: &str = r#"
[[topics]]
id = "solving_linear_equations"
name = "Solving Linear Equations"
prerequisites = ["basic_arithmetic"]
misconceptions = ["Student forgets to apply operation to both sides"]

[topics.explanations]
procedural = "Apply inverse operations to isolate the variable."
visual = "Imagine a balance scale."

[[topics.problems]]
text = "Solve for x: x + 5 = 12"
answer = 7
difficulty = 1

[[topics.problems]]
text = "Solve for x: 2x + 4 = 10"
answer = "3"
difficulty = 2

[[topics]]
id = "fractions"
name = "Fractions"

[[topics.problems]]
text = "Simplify 2/4"
answer = "1/2"
"#;

    fn parse(content: &str) -> Result<Vec<Topic>> {
        parse_catalogue_str(content, Path::new("test.toml"))
    }

    #[test]
    fn parse_valid_toml() {
        let topics = parse(VALID_TOML).unwrap();
        assert_eq!(topics.len(), 2);
        assert_eq!(topics[0].id, "solving_linear_equations");
        assert_eq!(topics[0].problems.len(), 2);
        assert_eq!(topics[0].problems[0].answer, "7");
        assert_eq!(topics[0].problems[1].difficulty, 2);
        assert_eq!(topics[0].explanations.len(), 2);
        assert_eq!(topics[1].problems[0].difficulty, 1);
        assert!(topics.iter().all(|t| t.validate().is_ok()));
    }

    #[test]
    fn missing_fields_load_but_fail_validation() {
        let topics = parse(
            r#"
[[topics]]
id = "nameless"

[[topics.problems]]
text = "1 + 1"
answer = 2

[[topics]]
id = "empty"
name = "Empty"
"#,
        )
        .unwrap();
        assert!(matches!(
            topics[0].validate(),
            Err(TutorError::InvalidContent { ref reason, .. }) if reason == "missing name"
        ));
        assert!(matches!(
            topics[1].validate(),
            Err(TutorError::InvalidContent { ref reason, .. }) if reason == "empty problem pool"
        ));

        let warnings = validate_catalogue(&topics);
        assert_eq!(warnings.iter().filter(|w| w.skips_topic).count(), 2);
    }

    #[test]
    fn validate_reports_common_issues() {
        let mut topics = parse(VALID_TOML).unwrap();
        topics.push(topics[1].clone());
        let warnings = validate_catalogue(&topics);
        assert!(warnings.iter().any(|w| w.message.contains("duplicate")));
        assert!(warnings
            .iter()
            .any(|w| w.message.contains("'basic_arithmetic' is not in the catalogue")));
        assert!(warnings.iter().any(|w| w.message == "no explanations"));
    }

    #[test]
    fn unsupported_answer_type_is_an_error() {
        let bad = r#"
[[topics]]
id = "t"
name = "T"
[[topics.problems]]
text = "q"
answer = [1, 2]
"#;
        assert!(parse(bad).is_err());
    }

    #[test]
    fn parse_malformed_toml() {
        assert!(parse("this is not [valid toml }{").is_err());
    }

    #[test]
    fn load_directory_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("b.toml"),
            "[[topics]]\nid = \"second\"\nname = \"Second\"\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("a.toml"),
            "[[topics]]\nid = \"first\"\nname = \"First\"\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let topics = TomlContent::new(dir.path()).load_topics().unwrap();
        let ids: Vec<_> = topics.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["first", "second"]);
    }

    #[test]
    fn missing_file_is_a_content_error() {
        let err = TomlContent::new("does-not-exist.toml")
            .load_topics()
            .unwrap_err();
        assert!(matches!(err, TutorError::Content(_)));
    }
}
