//! Configuration types for course generation.
//!
//! All pipeline behaviour is controlled through [`GenerationConfig`], built
//! via its [`GenerationConfigBuilder`]. Values left unset fall back to the
//! environment (`GEMINI_MODEL`, `NEUROLEARN_PROVIDER`,
//! `DEFAULT_QUIZ_QUESTIONS`) and then to built-in defaults.

use crate::error::NeuroLearnError;
use crate::pipeline::llm::ChatBackend;
use crate::progress::ProgressCallback;
use std::fmt;
use std::sync::Arc;

/// Model tried first when neither the config nor `GEMINI_MODEL` names one.
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Provider used when neither the config nor `NEUROLEARN_PROVIDER` names one.
pub const DEFAULT_PROVIDER: &str = "gemini";

/// Quiz length used when neither the config nor `DEFAULT_QUIZ_QUESTIONS` sets one.
pub const DEFAULT_QUIZ_QUESTIONS: usize = 10;

/// Upper bound on the quiz length.
pub const MAX_QUIZ_QUESTIONS: usize = 50;

/// Configuration for one generation run.
///
/// # Example
/// ```rust
/// use neurolearn::GenerationConfig;
///
/// let config = GenerationConfig::builder()
///     .model("gemini-2.5-pro")
///     .num_questions(15)
///     .build()
///     .unwrap();
/// assert_eq!(config.num_questions, 15);
/// ```
#[derive(Clone)]
pub struct GenerationConfig {
    /// Model name tried first. Fallback variants are derived from it.
    /// If None, uses `GEMINI_MODEL` then [`DEFAULT_MODEL`].
    pub model: Option<String>,

    /// LLM provider name (e.g. "gemini", "openai", "ollama").
    /// If None, uses `NEUROLEARN_PROVIDER` then [`DEFAULT_PROVIDER`].
    pub provider_name: Option<String>,

    /// Pre-constructed backend. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn ChatBackend>>,

    /// Number of quiz questions requested from the model. Default: 10.
    pub num_questions: usize,

    /// Sampling temperature for the summary prompt. Default: 0.5.
    pub summary_temperature: f32,

    /// Sampling temperature for the quiz and flashcard prompts. Default: 0.3.
    ///
    /// Lower than the summary so the model sticks to the requested JSON shape.
    pub json_temperature: f32,

    /// Maximum tokens the model may generate per request. Default: 8192.
    pub max_tokens: usize,

    /// Retries per request on transient failures (5xx, 429, timeouts). Default: 2.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled after each attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// Per-request timeout in seconds. Default: 120.
    pub api_timeout_secs: u64,

    /// Language the generated material should be written in.
    /// If None, the model is told to use the document's language.
    pub language: Option<String>,

    /// Receives stage events while the pipeline runs.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model: None,
            provider_name: None,
            provider: None,
            num_questions: questions_from_env().unwrap_or(DEFAULT_QUIZ_QUESTIONS),
            summary_temperature: 0.5,
            json_temperature: 0.3,
            max_tokens: 8192,
            max_retries: 2,
            retry_backoff_ms: 500,
            api_timeout_secs: 120,
            language: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for GenerationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenerationConfig")
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn ChatBackend>"))
            .field("num_questions", &self.num_questions)
            .field("summary_temperature", &self.summary_temperature)
            .field("json_temperature", &self.json_temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("language", &self.language)
            .finish()
    }
}

impl GenerationConfig {
    /// Create a new builder for `GenerationConfig`.
    pub fn builder() -> GenerationConfigBuilder {
        GenerationConfigBuilder {
            config: Self::default(),
        }
    }

    /// The model name to try first: config, then `GEMINI_MODEL`, then the default.
    pub fn resolved_model(&self) -> String {
        self.model
            .clone()
            .filter(|m| !m.trim().is_empty())
            .or_else(|| non_empty_env("GEMINI_MODEL"))
            .unwrap_or_else(|| DEFAULT_MODEL.to_string())
    }

    /// The provider name: config, then `NEUROLEARN_PROVIDER`, then the default.
    pub fn resolved_provider_name(&self) -> String {
        self.provider_name
            .clone()
            .filter(|p| !p.trim().is_empty())
            .or_else(|| non_empty_env("NEUROLEARN_PROVIDER"))
            .unwrap_or_else(|| DEFAULT_PROVIDER.to_string())
    }
}

/// Builder for [`GenerationConfig`].
pub struct GenerationConfigBuilder {
    config: GenerationConfig,
}

impl fmt::Debug for GenerationConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenerationConfigBuilder")
            .field("config", &self.config)
            .finish()
    }
}

impl GenerationConfigBuilder {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn ChatBackend>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn num_questions(mut self, n: usize) -> Self {
        self.config.num_questions = n;
        self
    }

    pub fn summary_temperature(mut self, t: f32) -> Self {
        self.config.summary_temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn json_temperature(mut self, t: f32) -> Self {
        self.config.json_temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn language(mut self, language: impl Into<String>) -> Self {
        self.config.language = Some(language.into());
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<GenerationConfig, NeuroLearnError> {
        let c = &self.config;
        if c.num_questions == 0 || c.num_questions > MAX_QUIZ_QUESTIONS {
            return Err(NeuroLearnError::InvalidConfig(format!(
                "Number of quiz questions must be 1–{}, got {}",
                MAX_QUIZ_QUESTIONS, c.num_questions
            )));
        }
        if c.max_tokens == 0 {
            return Err(NeuroLearnError::InvalidConfig(
                "max_tokens must be ≥ 1".into(),
            ));
        }
        if c.api_timeout_secs == 0 {
            return Err(NeuroLearnError::InvalidConfig(
                "API timeout must be ≥ 1 second".into(),
            ));
        }
        Ok(self.config)
    }
}

fn non_empty_env(var: &str) -> Option<String> {
    std::env::var(var)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn questions_from_env() -> Option<usize> {
    non_empty_env("DEFAULT_QUIZ_QUESTIONS")
        .and_then(|v| v.parse::<usize>().ok())
        .map(|n| n.clamp(1, MAX_QUIZ_QUESTIONS))
}


#[cfg(test)]
mod tests {
    use super::test_env::with_vars;
    use super::*;

    #[test]
    fn model_falls_back_to_env_then_default() {
        with_vars(&[("GEMINI_MODEL", Some("gemini-2.0-flash"))], || {
            assert_eq!(GenerationConfig::default().resolved_model(), "gemini-2.0-flash");
        });
        with_vars(&[("GEMINI_MODEL", Some("  "))], || {
            assert_eq!(GenerationConfig::default().resolved_model(), DEFAULT_MODEL);
        });
        with_vars(&[("GEMINI_MODEL", None)], || {
            assert_eq!(GenerationConfig::default().resolved_model(), DEFAULT_MODEL);
        });
    }

    #[test]
    fn quiz_length_comes_from_env_and_is_clamped() {
        let questions = |value: Option<&str>| {
            with_vars(&[("DEFAULT_QUIZ_QUESTIONS", value)], || {
                GenerationConfig::default().num_questions
            })
        };
        assert_eq!(questions(Some("7")), 7);
        assert_eq!(questions(Some("500")), MAX_QUIZ_QUESTIONS);
        assert_eq!(questions(Some("0")), 1);
        assert_eq!(questions(Some("many")), DEFAULT_QUIZ_QUESTIONS);
        assert_eq!(questions(None), DEFAULT_QUIZ_QUESTIONS);
    }

    #[test]
    fn provider_falls_back_to_env() {
        with_vars(&[("NEUROLEARN_PROVIDER", Some("ollama"))], || {
            assert_eq!(GenerationConfig::default().resolved_provider_name(), "ollama");
        });
        with_vars(&[("NEUROLEARN_PROVIDER", None)], || {
            assert_eq!(GenerationConfig::default().resolved_provider_name(), DEFAULT_PROVIDER);
        });
    }

    #[test]
    fn builder_rejects_zero_questions() {
        let err = GenerationConfig::builder()
            .num_questions(0)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("quiz questions"));
    }

    #[test]
    fn builder_rejects_too_many_questions() {
        assert!(GenerationConfig::builder()
            .num_questions(MAX_QUIZ_QUESTIONS + 1)
            .build()
            .is_err());
    }

    #[test]
    fn temperatures_are_clamped() {
        let config = GenerationConfig::builder()
            .summary_temperature(5.0)
            .json_temperature(-1.0)
            .build()
            .unwrap();
        assert_eq!(config.summary_temperature, 2.0);
        assert_eq!(config.json_temperature, 0.0);
    }

    #[test]
    fn explicit_model_wins() {
        let config = GenerationConfig::builder()
            .model("gemini-1.5-pro")
            .build()
            .unwrap();
        assert_eq!(config.resolved_model(), "gemini-1.5-pro");
    }

    #[test]
    fn blank_model_is_ignored() {
        let mut config = GenerationConfig::default();
        config.model = Some("   ".into());
        assert!(!config.resolved_model().trim().is_empty());
    }

    #[test]
    fn explicit_provider_wins() {
        let config = GenerationConfig::builder()
            .provider_name("openai")
            .build()
            .unwrap();
        assert_eq!(config.resolved_provider_name(), "openai");
    }

    #[test]
    fn debug_hides_provider() {
        let config = GenerationConfig::default();
        let dbg = format!("{config:?}");
        assert!(dbg.contains("GenerationConfig"));
        assert!(dbg.contains("num_questions"));
    }
}
