//! The `tutor init` command.

use std::path::Path;

use anyhow::{Context, Result};

pub fn execute() -> Result<()> {
    write_once("tutor.toml", SAMPLE_CONFIG)?;
    write_once("topics.toml", SAMPLE_TOPICS)?;

    println!("\nNext steps:");
    println!("  1. Point tutor.toml at your language model (Ollama runs locally by default)");
    println!("  2. Run: tutor validate");
    println!("  3. Run: tutor session --student <name>");

    Ok(())
}

fn write_once(path: &str, content: &str) -> Result<()> {
    if Path::new(path).exists() {
        println!("{path} already exists, skipping.");
    } else {
        std::fs::write(path, content).with_context(|| format!("failed to write {path}"))?;
        println!("Created {path}");
    }
    Ok(())
}

const SAMPLE_CONFIG: &str = r#"# tutor configuration

default_provider = "ollama"
default_model = "llama3"

[providers.ollama]
type = "ollama"
base_url = "http://localhost:11434"

[providers.openai]
type = "openai"
api_key = "${OPENAI_API_KEY}"

# Offline provider that grades every answer 4/5; handy for trying things out.
[providers.mock]
type = "mock"

[grading]
max_tokens = 300
retry_max_tokens = 150
temperature = 0.2
timeout_secs = 60

[session]
content = "topics.toml"
fatigue_minutes = 20
remediation_threshold = 3
default_style = "procedural"

[storage]
database = "tutor.db"
write_retries = 3
retry_delay_ms = 200
"#;

const SAMPLE_TOPICS: &str = r#"[[topics]]
id = "one_step_equations"
name = "One-Step Equations"
misconceptions = ["Applies the inverse operation to only one side"]

[topics.explanations]
procedural = "To solve x + a = b, subtract a from both sides. To solve a * x = b, divide both sides by a."
analogy = "An equation is a balance scale: take the same weight off both pans and it stays level."

[[topics.problems]]
text = "Solve for x: x + 4 = 9"
answer = 5
difficulty = 1

[[topics.problems]]
text = "Solve for x: 3x = 21"
answer = 7
difficulty = 2

[[topics.problems]]
text = "Solve for x: x / 4 = 6"
answer = 24
difficulty = 3

[[topics]]
id = "two_step_equations"
name = "Two-Step Equations"
prerequisites = ["one_step_equations"]
misconceptions = ["Divides before undoing the constant term"]

[topics.explanations]
procedural = "Undo addition or subtraction first, then multiplication or division."
visual = "Picture x wrapped in two layers. Unwrap from the outside in."

[[topics.problems]]
text = "Solve for x: 2x + 5 = 19"
answer = 7
difficulty = 1

[[topics.problems]]
text = "Solve for x: 3x - 4 = 11"
answer = 5
difficulty = 2

[[topics.problems]]
text = "Solve for x: 5x + 12 = 2"
answer = -2
difficulty = 3
"#;
