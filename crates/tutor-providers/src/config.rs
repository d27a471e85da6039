//! Tutor configuration and provider factory.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use tutor_core::fatigue::FatigueMonitor;
use tutor_core::grader::GraderConfig;
use tutor_core::progress::RetryPolicy;
use tutor_core::session::SessionConfig;
use tutor_core::traits::LlmProvider;

use crate::mock::MockProvider;
use crate::ollama::OllamaProvider;
use crate::openai::OpenAiProvider;

/// Configuration for a single LLM provider.
///
/// Note: Custom Debug impl masks API keys to prevent accidental exposure in logs.
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProviderConfig {
    OpenAI {
        api_key: String,
        #[serde(default)]
        base_url: Option<String>,
        #[serde(default)]
        org_id: Option<String>,
    },
    Ollama {
        #[serde(default = "default_ollama_url")]
        base_url: String,
    },
    Mock {
        /// Prompt substring → canned reply.
        #[serde(default)]
        responses: BTreeMap<String, String>,
        #[serde(default)]
        default_response: Option<String>,
    },
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderConfig::OpenAI {
                api_key: _,
                base_url,
                org_id,
            } => f
                .debug_struct("OpenAI")
                .field("api_key", &"***")
                .field("base_url", base_url)
                .field("org_id", org_id)
                .finish(),
            ProviderConfig::Ollama { base_url } => f
                .debug_struct("Ollama")
                .field("base_url", base_url)
                .finish(),
            ProviderConfig::Mock {
                responses,
                default_response,
            } => f
                .debug_struct("Mock")
                .field("responses", &responses.len())
                .field("default_response", default_response)
                .finish(),
        }
    }
}

fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}

/// Grading call settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GradingSettings {
    /// Overrides `default_model` for grading.
    pub model: Option<String>,
    pub max_tokens: u32,
    /// Token budget for the single retry after a failed call.
    pub retry_max_tokens: u32,
    pub temperature: f64,
    pub timeout_secs: u64,
}

impl Default for GradingSettings {
    fn default() -> Self {
        Self {
            model: None,
            max_tokens: 300,
            retry_max_tokens: 150,
            temperature: 0.2,
            timeout_secs: 60,
        }
    }
}

/// Session behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Topic catalogue: a TOML file or a directory of them.
    pub content: PathBuf,
    /// Minutes before a break is offered.
    pub fatigue_minutes: i64,
    /// Consecutive failing grades before remediation.
    pub remediation_threshold: u32,
    pub default_style: String,
    /// Fixed seed for problem selection.
    pub seed: Option<u64>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            content: PathBuf::from("topics.toml"),
            fatigue_minutes: tutor_core::fatigue::DEFAULT_BREAK_AFTER_MINUTES,
            remediation_threshold: tutor_core::session::DEFAULT_REMEDIATION_THRESHOLD,
            default_style: tutor_core::model::DEFAULT_EXPLANATION_STYLE.to_string(),
            seed: None,
        }
    }
}

/// Progress database settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub database: PathBuf,
    /// Tries per write, including the first.
    pub write_retries: u32,
    pub retry_delay_ms: u64,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            database: PathBuf::from("tutor.db"),
            write_retries: 3,
            retry_delay_ms: 200,
        }
    }
}

/// Top-level tutor configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TutorConfig {
    /// Provider configurations keyed by name.
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
    /// Default provider to use.
    #[serde(default = "default_provider")]
    pub default_provider: String,
    /// Default model to use.
    #[serde(default = "default_model")]
    pub default_model: String,
    #[serde(default)]
    pub grading: GradingSettings,
    #[serde(default)]
    pub session: SessionSettings,
    #[serde(default)]
    pub storage: StorageSettings,
}

fn default_provider() -> String {
    "ollama".to_string()
}
fn default_model() -> String {
    "llama3".to_string()
}

impl Default for TutorConfig {
    fn default() -> Self {
        Self {
            providers: HashMap::new(),
            default_provider: default_provider(),
            default_model: default_model(),
            grading: GradingSettings::default(),
            session: SessionSettings::default(),
            storage: StorageSettings::default(),
        }
    }
}

impl TutorConfig {
    /// Reject settings the engine cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.session.fatigue_minutes <= 0 {
            anyhow::bail!("session.fatigue_minutes must be positive");
        }
        if self.session.remediation_threshold == 0 {
            anyhow::bail!("session.remediation_threshold must be at least 1");
        }
        if self.storage.write_retries == 0 {
            anyhow::bail!("storage.write_retries must be at least 1");
        }
        if !(0.0..=2.0).contains(&self.grading.temperature) {
            anyhow::bail!("grading.temperature must be within 0.0..=2.0");
        }
        if self.grading.timeout_secs == 0 {
            anyhow::bail!("grading.timeout_secs must be positive");
        }
        Ok(())
    }

    /// Model used for grading, hints and remedial explanations.
    pub fn model(&self) -> &str {
        self.grading.model.as_deref().unwrap_or(&self.default_model)
    }

    pub fn grader_config(&self) -> GraderConfig {
        GraderConfig {
            model: self.model().to_string(),
            max_tokens: self.grading.max_tokens,
            retry_max_tokens: self.grading.retry_max_tokens,
            temperature: self.grading.temperature,
            timeout: Duration::from_secs(self.grading.timeout_secs),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.storage.write_retries,
            initial_backoff: Duration::from_millis(self.storage.retry_delay_ms),
            ..RetryPolicy::default()
        }
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            fatigue: FatigueMonitor::new(chrono::Duration::minutes(self.session.fatigue_minutes)),
            remediation_threshold: self.session.remediation_threshold,
            default_style: self.session.default_style.clone(),
            seed: self.session.seed,
            retry: self.retry_policy(),
        }
    }

    /// Build the named provider, or the default one.
    ///
    /// `ollama` and `mock` work without a `[providers]` entry.
    pub fn provider(&self, name: Option<&str>) -> Result<Arc<dyn LlmProvider>> {
        let name = name.unwrap_or(&self.default_provider);
        match self.providers.get(name) {
            Some(config) => create_provider(name, config),
            None => match name {
                "ollama" => Ok(Arc::new(OllamaProvider::new(&default_ollama_url()))),
                "mock" => Ok(Arc::new(MockProvider::default())),
                other => anyhow::bail!(
                    "provider '{other}' is not configured; add a [providers.{other}] section"
                ),
            },
        }
    }

    /// Base URL of the named provider, or the default one, when it talks
    /// to an Ollama server.
    pub fn ollama_base_url(&self, name: Option<&str>) -> Option<String> {
        let name = name.unwrap_or(&self.default_provider);
        match self.providers.get(name) {
            Some(ProviderConfig::Ollama { base_url }) => Some(base_url.clone()),
            Some(_) => None,
            None if name == "ollama" => Some(default_ollama_url()),
            None => None,
        }
    }
}

/// Resolve environment variable references like `${VAR_NAME}` in a string.
fn resolve_env_vars(s: &str) -> String {
    let mut result = s.to_string();
    while let Some(start) = result.find("${") {
        let Some(end) = result[start..].find('}') else {
            break;
        };
        let var_name = &result[start + 2..start + end];
        let value = std::env::var(var_name).unwrap_or_default();
        result = format!("{}{}{}", &result[..start], value, &result[start + end + 1..]);
    }
    result
}

/// Resolve env vars in a provider config.
fn resolve_provider_config(config: &ProviderConfig) -> ProviderConfig {
    match config {
        ProviderConfig::OpenAI {
            api_key,
            base_url,
            org_id,
        } => ProviderConfig::OpenAI {
            api_key: resolve_env_vars(api_key),
            base_url: base_url.as_deref().map(resolve_env_vars),
            org_id: org_id.as_deref().map(resolve_env_vars),
        },
        ProviderConfig::Ollama { base_url } => ProviderConfig::Ollama {
            base_url: resolve_env_vars(base_url),
        },
        mock @ ProviderConfig::Mock { .. } => mock.clone(),
    }
}

/// Load configuration from well-known paths.
///
/// Search order:
/// 1. `tutor.toml` in the current directory
/// 2. `~/.config/tutor/config.toml`
///
/// Environment variable override: `TUTOR_OPENAI_KEY`.
pub fn load_config() -> Result<TutorConfig> {
    load_config_from(None)
}

/// Load config from an explicit path, or search the default locations.
pub fn load_config_from(path: Option<&Path>) -> Result<TutorConfig> {
    let config_path = match path {
        Some(p) if p.exists() => Some(p.to_path_buf()),
        Some(p) => anyhow::bail!("config file not found: {}", p.display()),
        None => {
            let local = PathBuf::from("tutor.toml");
            if local.exists() {
                Some(local)
            } else {
                dirs_path()
                    .map(|home| home.join("config.toml"))
                    .filter(|global| global.exists())
            }
        }
    };

    let mut config = match &config_path {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config: {}", path.display()))?;
            toml::from_str::<TutorConfig>(&content)
                .with_context(|| format!("failed to parse config: {}", path.display()))?
        }
        None => TutorConfig::default(),
    };

    if let Ok(key) = std::env::var("TUTOR_OPENAI_KEY") {
        let entry = config
            .providers
            .entry("openai".into())
            .or_insert(ProviderConfig::OpenAI {
                api_key: String::new(),
                base_url: None,
                org_id: None,
            });
        if let ProviderConfig::OpenAI { api_key, .. } = entry {
            *api_key = key;
        }
    }

    config.providers = config
        .providers
        .iter()
        .map(|(k, v)| (k.clone(), resolve_provider_config(v)))
        .collect();

    config.validate()?;
    tracing::debug!(path = ?config_path, provider = %config.default_provider, "configuration loaded");
    Ok(config)
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("tutor"))
}

/// Create a provider instance from its configuration.
pub fn create_provider(name: &str, config: &ProviderConfig) -> Result<Arc<dyn LlmProvider>> {
    match config {
        ProviderConfig::OpenAI {
            api_key,
            base_url,
            org_id,
        } => {
            if api_key.is_empty() {
                anyhow::bail!("provider '{name}' has no API key; set TUTOR_OPENAI_KEY");
            }
            Ok(Arc::new(OpenAiProvider::new(
                api_key,
                base_url.clone(),
                org_id.clone(),
            )))
        }
        ProviderConfig::Ollama { base_url } => Ok(Arc::new(OllamaProvider::new(base_url))),
        ProviderConfig::Mock {
            responses,
            default_response,
        } => {
            let mut mock = MockProvider::new(responses.clone());
            if let Some(text) = default_response {
                mock = mock.with_default_response(text);
            }
            Ok(Arc::new(mock))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_env_vars_basic() {
        std::env::set_var("_TUTOR_TEST_VAR", "hello");
        assert_eq!(resolve_env_vars("${_TUTOR_TEST_VAR}"), "hello");
        assert_eq!(
            resolve_env_vars("prefix_${_TUTOR_TEST_VAR}_suffix"),
            "prefix_hello_suffix"
        );
        assert_eq!(resolve_env_vars("${_TUTOR_TEST_UNSET_VAR}"), "");
        assert_eq!(resolve_env_vars("no ${closing"), "no ${closing");
        std::env::remove_var("_TUTOR_TEST_VAR");
    }

    #[test]
    fn default_config() {
        let config = TutorConfig::default();
        assert_eq!(config.default_provider, "ollama");
        assert_eq!(config.default_model, "llama3");
        assert_eq!(config.grading.max_tokens, 300);
        assert_eq!(config.session.fatigue_minutes, 20);
        assert_eq!(config.session.remediation_threshold, 3);
        assert_eq!(config.storage.write_retries, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn ollama_base_url_follows_the_selected_provider() {
        let mut config = TutorConfig::default();
        assert_eq!(
            config.ollama_base_url(None).as_deref(),
            Some("http://localhost:11434")
        );
        assert_eq!(config.ollama_base_url(Some("mock")), None);

        config.providers.insert(
            "gpu".into(),
            ProviderConfig::Ollama {
                base_url: "http://tutor-gpu:11434".into(),
            },
        );
        config.providers.insert(
            "ollama".into(),
            ProviderConfig::Mock {
                responses: BTreeMap::new(),
                default_response: None,
            },
        );
        assert_eq!(
            config.ollama_base_url(Some("gpu")).as_deref(),
            Some("http://tutor-gpu:11434")
        );
        assert_eq!(config.ollama_base_url(None), None);
    }

    #[test]
    fn parse_full_config() {
        let toml_str = r#"
default_provider = "openai"
default_model = "gpt-4o-mini"

[providers.openai]
type = "openai"
api_key = "sk-openai"

[providers.ollama]
type = "ollama"
base_url = "http://gpu-box:11434"

[providers.offline]
type = "mock"
default_response = "5\nPerfect."

[grading]
model = "gpt-4o"
timeout_secs = 20

[session]
content = "content/algebra"
fatigue_minutes = 25
seed = 7

[storage]
database = "/var/lib/tutor/progress.db"
write_retries = 5
"#;
        let config: TutorConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.providers.len(), 3);
        assert!(matches!(
            config.providers.get("offline"),
            Some(ProviderConfig::Mock { .. })
        ));
        assert_eq!(config.model(), "gpt-4o");
        assert_eq!(config.grader_config().timeout, Duration::from_secs(20));
        assert_eq!(config.grader_config().retry_max_tokens, 150);

        let session = config.session_config();
        assert_eq!(session.fatigue.threshold(), chrono::Duration::minutes(25));
        assert_eq!(session.seed, Some(7));
        assert_eq!(session.retry.max_attempts, 5);
        assert_eq!(session.default_style, "procedural");
        assert_eq!(config.session.content, PathBuf::from("content/algebra"));
    }

    #[test]
    fn debug_masks_api_keys() {
        let config = ProviderConfig::OpenAI {
            api_key: "sk-secret".into(),
            base_url: None,
            org_id: None,
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-secret"));
        assert!(debug.contains("***"));
    }

    #[test]
    fn invalid_settings_are_rejected() {
        let mut config = TutorConfig::default();
        config.session.fatigue_minutes = 0;
        assert!(config.validate().is_err());

        let mut config = TutorConfig::default();
        config.storage.write_retries = 0;
        assert!(config.validate().is_err());

        let mut config = TutorConfig::default();
        config.grading.temperature = 3.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn load_from_file_resolves_env_and_overrides_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tutor.toml");
        std::fs::write(
            &path,
            r#"
default_provider = "ollama"

[providers.ollama]
type = "ollama"
base_url = "http://${_TUTOR_TEST_HOST}:11434"
"#,
        )
        .unwrap();

        std::env::set_var("_TUTOR_TEST_HOST", "tutor-gpu");
        std::env::set_var("TUTOR_OPENAI_KEY", "sk-from-env");
        let config = load_config_from(Some(&path)).unwrap();
        std::env::remove_var("_TUTOR_TEST_HOST");
        std::env::remove_var("TUTOR_OPENAI_KEY");

        assert!(matches!(
            config.providers.get("ollama"),
            Some(ProviderConfig::Ollama { base_url }) if base_url == "http://tutor-gpu:11434"
        ));
        assert!(matches!(
            config.providers.get("openai"),
            Some(ProviderConfig::OpenAI { api_key, .. }) if api_key == "sk-from-env"
        ));
    }

    #[test]
    fn missing_explicit_config_is_an_error() {
        let err = load_config_from(Some(Path::new("/nonexistent/tutor.toml"))).unwrap_err();
        assert!(err.to_string().contains("config file not found"));
    }

    #[test]
    fn unconfigured_builtin_providers_are_available() {
        let config = TutorConfig::default();
        assert_eq!(config.provider(None).unwrap().name(), "ollama");
        assert_eq!(config.provider(Some("mock")).unwrap().name(), "mock");
        assert!(config.provider(Some("anthropic")).is_err());
    }

    #[test]
    fn openai_without_key_is_rejected() {
        let config = ProviderConfig::OpenAI {
            api_key: String::new(),
            base_url: None,
            org_id: None,
        };
        assert!(create_provider("openai", &config).is_err());
    }

    #[tokio::test]
    async fn mock_provider_from_config() {
        use tutor_core::traits::GenerateRequest;

        let config = ProviderConfig::Mock {
            responses: BTreeMap::from([("hint".to_string(), "Undo the addition.".to_string())]),
            default_response: Some("5\nPerfect.".into()),
        };
        let provider = create_provider("offline", &config).unwrap();
        let request = |prompt: &str| GenerateRequest {
            model: "mock".into(),
            prompt: prompt.into(),
            system_prompt: None,
            max_tokens: 10,
            temperature: 0.0,
        };
        let graded = provider.generate(&request("Question: 1 + 1")).await.unwrap();
        assert_eq!(graded.content, "5\nPerfect.");
        let hint = provider.generate(&request("Give a brief hint")).await.unwrap();
        assert_eq!(hint.content, "Undo the addition.");
    }
}
