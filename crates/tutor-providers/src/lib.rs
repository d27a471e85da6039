//! tutor-providers — language-model transports for the tutor.
//!
//! Implements the `LlmProvider` trait for Ollama and OpenAI-compatible
//! APIs, plus an in-process mock, and loads the tutor's TOML configuration.

pub mod config;
pub mod mock;
pub mod ollama;
pub mod openai;

pub use config::{create_provider, load_config, load_config_from, ProviderConfig, TutorConfig};
pub use tutor_core::error::ProviderError;

/// HTTP client with a request timeout.
pub(crate) fn http_client(timeout_secs: u64) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .unwrap_or_else(|e| {
            tracing::warn!("failed to configure HTTP client, using defaults: {e}");
            reqwest::Client::new()
        })
}
