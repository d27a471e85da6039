//! Subcommand implementations.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use chrono::NaiveDate;

use tutor_core::clock::{Clock, SystemClock};
use tutor_core::progress::ProgressStore;
use tutor_providers::TutorConfig;
use tutor_store::SqliteBackend;

pub mod due;
pub mod history;
pub mod init;
pub mod progress;
pub mod session;
pub mod validate;

/// Open the progress database named on the command line, or the configured one.
pub(crate) fn open_store(config: &TutorConfig, database: Option<PathBuf>) -> Result<ProgressStore> {
    let path = database.unwrap_or_else(|| config.storage.database.clone());
    let backend = Arc::new(SqliteBackend::open(&path)?);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    tracing::debug!(path = %path.display(), "progress database opened");
    Ok(ProgressStore::new(backend, clock))
}

pub(crate) fn date_cell(date: Option<NaiveDate>) -> String {
    date.map_or_else(|| "-".to_string(), |d| d.to_string())
}
