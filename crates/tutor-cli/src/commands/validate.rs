//! The `tutor validate` command.

use std::path::PathBuf;

use anyhow::Result;

use tutor_core::content::{load_catalogue_directory, parse_catalogue, validate_catalogue};
use tutor_providers::load_config_from;

pub fn execute(config_path: Option<PathBuf>, content: Option<PathBuf>) -> Result<()> {
    let path = match content {
        Some(path) => path,
        None => load_config_from(config_path.as_deref())?.session.content,
    };

    let topics = if path.is_dir() {
        load_catalogue_directory(&path)?
    } else {
        parse_catalogue(&path)?
    };

    println!("Catalogue: {} ({} topics)", path.display(), topics.len());

    let warnings = validate_catalogue(&topics);
    for w in &warnings {
        let prefix = w
            .topic_id
            .as_ref()
            .map(|id| format!("  [{id}]"))
            .unwrap_or_else(|| "  ".to_string());
        let severity = if w.skips_topic { "SKIPPED" } else { "WARNING" };
        println!("{prefix} {severity}: {}", w.message);
    }

    if warnings.is_empty() {
        println!("All topics valid.");
    } else {
        let skipped = warnings.iter().filter(|w| w.skips_topic).count();
        println!(
            "\n{} warning(s) found, {skipped} topic(s) will be skipped.",
            warnings.len()
        );
    }

    Ok(())
}
