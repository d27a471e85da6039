//! The `tutor session` command.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

use tutor_core::content::TomlContent;
use tutor_core::grader::Grader;
use tutor_core::hints::HintGenerator;
use tutor_core::session::{Learner, Notice, SessionEvent, TutorSession};
use tutor_providers::load_config_from;
use tutor_providers::ollama::OllamaProvider;

use crate::console::ConsoleLearner;

pub struct SessionArgs {
    pub student: String,
    pub content: Option<PathBuf>,
    pub provider: Option<String>,
    pub database: Option<PathBuf>,
    pub seed: Option<u64>,
}

pub async fn execute(config_path: Option<PathBuf>, args: SessionArgs) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;
    let content_path = args
        .content
        .unwrap_or_else(|| config.session.content.clone());
    let store = super::open_store(&config, args.database)?;

    let provider = config.provider(args.provider.as_deref())?;
    if let Some(base_url) = config.ollama_base_url(args.provider.as_deref()) {
        if !OllamaProvider::new(&base_url).is_reachable().await {
            tracing::warn!(
                %base_url,
                "Ollama is not reachable; answers will get a generic assessment until it is"
            );
        }
    }
    let grader = Grader::new(provider.clone(), config.grader_config());
    let hints = HintGenerator::new(
        provider,
        config.model(),
        Duration::from_secs(config.grading.timeout_secs),
    );

    let mut session_config = config.session_config();
    if args.seed.is_some() {
        session_config.seed = args.seed;
    }

    let source = TomlContent::new(&content_path);
    let mut session = TutorSession::new(
        args.student,
        &source,
        store,
        grader,
        hints,
        session_config,
    )
    .with_context(|| format!("failed to start session with {}", content_path.display()))?;

    tracing::info!(
        student = %session.student(),
        model = %config.model(),
        content = %content_path.display(),
        "session starting"
    );

    let mut learner = ConsoleLearner::stdio();
    match session.run(&mut learner).await {
        Ok(summary) => {
            tracing::info!(
                student = %summary.student,
                outcome = %summary.outcome,
                attempts = summary.attempts,
                "session finished"
            );
            Ok(())
        }
        Err(e) if e.is_fatal_for_session() => {
            if session.pending_write().is_some() && session.retry_pending_write().await.is_ok() {
                tracing::warn!(
                    student = %session.student(),
                    "late save succeeded; session history keeps the storage_failure outcome"
                );
                learner
                    .present(&SessionEvent::Notice(Notice::ProgressSavedLate))
                    .await;
                return Ok(());
            }
            Err(e).context("session ended because progress could not be saved")
        }
        Err(e) => Err(e.into()),
    }
}
