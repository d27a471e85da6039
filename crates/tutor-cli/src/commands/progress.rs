//! The `tutor progress` command.

use std::path::PathBuf;

use anyhow::Result;
use comfy_table::{Cell, Table};

use tutor_core::model::Status;
use tutor_providers::load_config_from;

pub fn execute(config_path: Option<PathBuf>, student: String, database: Option<PathBuf>) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;
    let store = super::open_store(&config, database)?;
    let records = store.all(&student)?;

    if records.is_empty() {
        println!("No progress recorded for {student}.");
        return Ok(());
    }

    let mut table = Table::new();
    table.set_header(vec![
        "Topic",
        "Status",
        "Mastery",
        "Attempts",
        "Ease",
        "Interval",
        "Next review",
        "Misconceptions",
    ]);
    for record in &records {
        table.add_row(vec![
            Cell::new(&record.topic_id),
            Cell::new(record.status),
            Cell::new(record.mastery),
            Cell::new(record.attempts),
            Cell::new(format!("{:.2}", record.ease)),
            Cell::new(format!("{}d", record.interval_days)),
            Cell::new(super::date_cell(record.next_review)),
            Cell::new(record.misconceptions.join("; ")),
        ]);
    }

    let count = |status: Status| records.iter().filter(|r| r.status == status).count();
    println!("Progress for {student}:");
    println!("{table}");
    println!(
        "{} learning, {} in review, {} mastered",
        count(Status::Learning),
        count(Status::Review),
        count(Status::Mastered)
    );
    Ok(())
}
