//! The `tutor history` command.

use std::path::PathBuf;

use anyhow::Result;
use comfy_table::{Cell, Table};

use tutor_providers::load_config_from;

pub fn execute(
    config_path: Option<PathBuf>,
    student: String,
    limit: usize,
    format: String,
    database: Option<PathBuf>,
) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;
    let store = super::open_store(&config, database)?;
    let sessions = store.sessions(&student)?;
    let recent = &sessions[sessions.len().saturating_sub(limit)..];

    match format.as_str() {
        "json" => {
            println!("{}", serde_json::to_string_pretty(recent)?);
        }
        "text" => {
            if recent.is_empty() {
                println!("No sessions recorded for {student}.");
                return Ok(());
            }
            let mut table = Table::new();
            table.set_header(vec![
                "Started",
                "Minutes",
                "Outcome",
                "Attempts",
                "Avg grade",
                "Introduced",
                "Finished",
                "Reviewed",
            ]);
            for s in recent {
                table.add_row(vec![
                    Cell::new(s.started_at.format("%Y-%m-%d %H:%M")),
                    Cell::new(s.duration_minutes()),
                    Cell::new(s.outcome),
                    Cell::new(s.attempts),
                    Cell::new(
                        s.average_grade
                            .map_or_else(|| "-".to_string(), |g| format!("{g:.1}")),
                    ),
                    Cell::new(s.topics_introduced.len()),
                    Cell::new(s.topics_mastered.len()),
                    Cell::new(s.topics_reviewed.len()),
                ]);
            }
            println!("Last {} of {} session(s) for {student}:", recent.len(), sessions.len());
            println!("{table}");
        }
        other => anyhow::bail!("unknown format: {other} (expected text or json)"),
    }
    Ok(())
}
