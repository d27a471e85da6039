//! The `tutor due` command.

use std::path::PathBuf;

use anyhow::Result;
use comfy_table::{Cell, Table};

use tutor_providers::load_config_from;

pub fn execute(config_path: Option<PathBuf>, student: String, database: Option<PathBuf>) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;
    let store = super::open_store(&config, database)?;
    let today = store.today();
    let due = store.due_for_review(&student, today)?;

    if due.is_empty() {
        println!("Nothing due for review for {student} today ({today}).");
        return Ok(());
    }

    let mut table = Table::new();
    table.set_header(vec!["Topic", "Status", "Due", "Interval", "Ease"]);
    for topic_id in &due {
        let record = store.get(&student, topic_id)?;
        table.add_row(vec![
            Cell::new(topic_id),
            Cell::new(record.status),
            Cell::new(super::date_cell(record.next_review)),
            Cell::new(format!("{}d", record.interval_days)),
            Cell::new(format!("{:.2}", record.ease)),
        ]);
    }

    println!("{} topic(s) due for {student} as of {today}:", due.len());
    println!("{table}");
    Ok(())
}
