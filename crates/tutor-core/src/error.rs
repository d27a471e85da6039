//! Error types.
//!
//! `TutorError` is the taxonomy the session engine reasons about: grader
//! problems are recovered locally, storage problems end the session.
//! `ProviderError` represents transport failures from a language-model
//! backend and travels inside `anyhow::Error` so the grader can downcast it.

use thiserror::Error;

/// Errors surfaced by the tutoring engine.
#[derive(Debug, Error)]
pub enum TutorError {
    /// The grading call failed even after a retry.
    #[error("grader unavailable: {0}")]
    GraderUnavailable(String),

    /// The grader answered but the text did not parse.
    #[error("malformed grader output: {0}")]
    MalformedGraderOutput(String),

    /// A persistence read or write failed.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    /// A topic is missing a required field.
    #[error("invalid content in topic '{topic_id}': {reason}")]
    InvalidContent { topic_id: String, reason: String },

    /// The content catalogue could not be read at all.
    #[error("failed to load content: {0}")]
    Content(String),

    /// A grade outside 0..=5 was constructed.
    #[error("grade {0} is outside 0..=5")]
    InvalidGrade(u8),
}

impl TutorError {
    /// Returns `true` for conditions the engine absorbs without ending the session.
    pub fn is_recoverable_locally(&self) -> bool {
        matches!(
            self,
            TutorError::GraderUnavailable(_)
                | TutorError::MalformedGraderOutput(_)
                | TutorError::InvalidContent { .. }
        )
    }

    /// Returns `true` if the session must stop at the next safe point.
    pub fn is_fatal_for_session(&self) -> bool {
        matches!(self, TutorError::StorageUnavailable(_))
    }
}

/// Errors that can occur when interacting with a language-model provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The API returned a 429 rate limit response.
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    /// Authentication failed (invalid API key).
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The requested model was not found.
    #[error("model not found: {0}")]
    ModelNotFound(String),

    /// The API returned an error response.
    #[error("API error (HTTP {status}): {message}")]
    ApiError { status: u16, message: String },

    /// The request timed out.
    #[error("request timed out after {0}s")]
    Timeout(u64),

    /// A network error occurred.
    #[error("network error: {0}")]
    NetworkError(String),
}

impl ProviderError {
    /// Returns `true` if this error is permanent and should not be retried.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            ProviderError::AuthenticationFailed(_) | ProviderError::ModelNotFound(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        assert!(TutorError::GraderUnavailable("x".into()).is_recoverable_locally());
        assert!(TutorError::MalformedGraderOutput("x".into()).is_recoverable_locally());
        assert!(!TutorError::StorageUnavailable("x".into()).is_recoverable_locally());
        assert!(TutorError::StorageUnavailable("x".into()).is_fatal_for_session());
    }

    #[test]
    fn permanent_provider_errors() {
        assert!(ProviderError::ModelNotFound("m".into()).is_permanent());
        assert!(ProviderError::AuthenticationFailed("k".into()).is_permanent());
        assert!(!ProviderError::Timeout(30).is_permanent());
        assert!(!ProviderError::RateLimited { retry_after_ms: 10 }.is_permanent());
    }
}
