//! LLM interaction: the backend seam, per-request retry, and model fallback.
//!
//! ## Backend seam
//!
//! [`ChatBackend`] is the one trait the pipeline talks to. The production
//! implementation, [`EdgequakeBackend`], wraps `edgequake_llm` providers;
//! tests plug in scripted backends.
//!
//! ## Model-name fallback
//!
//! Hosted model names drift (`gemini-2.5-flash` vs `models/gemini-2.5-flash`
//! vs `gemini-2.5-flash-latest`). [`ModelSession`] tries each variant from
//! [`model_candidates`] until one answers, then pins it for the rest of the
//! run. Only "model unavailable" errors move to the next candidate; any other
//! failure (bad key, safety block) ends the run immediately.
//!
//! ## Retry strategy
//!
//! Transient errors (5xx, 429, timeouts) are retried with exponential
//! backoff: `retry_backoff_ms * 2^(attempt-1)`, so 500 ms → 1 s with the
//! default two retries.

use crate::config::GenerationConfig;
use crate::error::{BackendError, BackendErrorKind, NeuroLearnError};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, GeminiProvider, LLMProvider, ProviderFactory};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, info, warn};

/// One request to the model.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system: String,
    pub user: String,
    pub temperature: f32,
    pub max_tokens: usize,
    /// The caller expects a JSON document back.
    pub json: bool,
}

/// The model's answer.
#[derive(Debug, Clone, Default)]
pub struct Completion {
    pub content: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Anything that can answer a [`CompletionRequest`] with a given model name.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Provider name, for logs and error messages.
    fn name(&self) -> &str;

    async fn complete(
        &self,
        model: &str,
        request: &CompletionRequest,
    ) -> Result<Completion, BackendError>;
}

// ── edgequake-llm backend ────────────────────────────────────────────────

/// Extra system instruction sent with JSON requests.
const JSON_ONLY_INSTRUCTION: &str =
    "Respond with a single valid JSON document and nothing else: no prose, no Markdown fences.";

/// [`ChatBackend`] over `edgequake_llm`, one cached provider per model name.
pub struct EdgequakeBackend {
    provider_name: String,
    providers: Mutex<HashMap<String, Arc<dyn LLMProvider>>>,
}

impl EdgequakeBackend {
    pub fn new(provider_name: impl Into<String>) -> Self {
        Self {
            provider_name: provider_name.into(),
            providers: Mutex::new(HashMap::new()),
        }
    }

    /// Build the backend and its provider for `model` up front, so a
    /// misconfigured provider fails before any document work.
    pub fn connect(
        provider_name: impl Into<String>,
        model: &str,
    ) -> Result<Self, NeuroLearnError> {
        let backend = Self::new(provider_name);
        backend
            .provider_for(model)
            .map_err(|e| NeuroLearnError::ProviderNotConfigured {
                provider: backend.provider_name.clone(),
                hint: format!(
                    "{}\nSupported providers include gemini, openai, anthropic, mistral and ollama.",
                    e.message
                ),
            })?;
        Ok(backend)
    }

    fn provider_for(&self, model: &str) -> Result<Arc<dyn LLMProvider>, BackendError> {
        let mut cache = self
            .providers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(p) = cache.get(model) {
            return Ok(Arc::clone(p));
        }
        let provider: Arc<dyn LLMProvider> = match google_key_fallback(&self.provider_name, model) {
            Some(key) => {
                debug!("Using GOOGLE_API_KEY for the gemini provider");
                Arc::new(GeminiProvider::new(key).with_model(model))
            }
            None => ProviderFactory::create_llm_provider(&self.provider_name, model)
                .map_err(|e| BackendError::classify(format!("{e}")))?,
        };
        cache.insert(model.to_string(), Arc::clone(&provider));
        Ok(provider)
    }
}

#[async_trait]
impl ChatBackend for EdgequakeBackend {
    fn name(&self) -> &str {
        &self.provider_name
    }

    async fn complete(
        &self,
        model: &str,
        request: &CompletionRequest,
    ) -> Result<Completion, BackendError> {
        let provider = self.provider_for(model)?;

        let mut messages = vec![ChatMessage::system(request.system.as_str())];
        if request.json {
            messages.push(ChatMessage::system(JSON_ONLY_INSTRUCTION));
        }
        messages.push(ChatMessage::user(request.user.as_str()));

        let options = CompletionOptions {
            temperature: Some(request.temperature),
            max_tokens: Some(request.max_tokens),
            ..Default::default()
        };

        let response = provider
            .chat(&messages, Some(&options))
            .await
            .map_err(|e| BackendError::classify(format!("{e}")))?;

        Ok(Completion {
            content: response.content,
            input_tokens: response.prompt_tokens as u64,
            output_tokens: response.completion_tokens as u64,
        })
    }
}

/// The factory's gemini provider only reads `GEMINI_API_KEY`. When that is
/// unset but `GOOGLE_API_KEY` is, return the latter so it can be passed in
/// directly.
fn google_key_fallback(provider_name: &str, model: &str) -> Option<String> {
    if provider_name != "gemini" || model.starts_with("vertexai:") {
        return None;
    }
    let set = |var: &str| std::env::var(var).ok().filter(|v| !v.trim().is_empty());
    match set("GEMINI_API_KEY") {
        Some(_) => None,
        None => set("GOOGLE_API_KEY"),
    }
}

// ── Model candidates ─────────────────────────────────────────────────────

/// Name variants to try, in order, for `model`.
///
/// `gemini-2.5-flash` expands to `gemini-2.5-flash`, `models/gemini-2.5-flash`,
/// `gemini-2.5-flash-latest`, `models/gemini-2.5-flash-latest`.
pub fn model_candidates(model: &str) -> Vec<String> {
    let model = model.trim();
    let prefixed = model.starts_with("models/");
    let latest = model.ends_with("-latest");

    let mut out = vec![model.to_string()];
    if !prefixed {
        out.push(format!("models/{model}"));
    }
    if !latest {
        out.push(format!("{model}-latest"));
        if !prefixed {
            out.push(format!("models/{model}-latest"));
        }
    }
    out.dedup();
    out
}

// ── Retry ────────────────────────────────────────────────────────────────

/// Send `request` to `model`, retrying transient failures.
pub async fn complete_with_retry(
    backend: &dyn ChatBackend,
    model: &str,
    request: &CompletionRequest,
    config: &GenerationConfig,
) -> Result<Completion, BackendError> {
    let limit = Duration::from_secs(config.api_timeout_secs);
    let mut last_err: Option<BackendError> = None;

    for attempt in 0..=config.max_retries {
        if attempt > 0 {
            let backoff = backoff_ms(config.retry_backoff_ms, attempt);
            warn!(
                "{}: retry {}/{} after {}ms",
                model, attempt, config.max_retries, backoff
            );
            sleep(Duration::from_millis(backoff)).await;
        }

        match timeout(limit, backend.complete(model, request)).await {
            Ok(Ok(completion)) => {
                debug!(
                    "{}: {} input tokens, {} output tokens",
                    model, completion.input_tokens, completion.output_tokens
                );
                return Ok(completion);
            }
            Ok(Err(e)) if e.kind.is_retryable() => {
                warn!("{}: attempt {} failed: {}", model, attempt + 1, e);
                last_err = Some(e);
            }
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                warn!("{}: attempt {} timed out", model, attempt + 1);
                last_err = Some(BackendError::new(
                    BackendErrorKind::Transient,
                    format!("request timed out after {}s", config.api_timeout_secs),
                ));
            }
        }
    }

    Err(last_err
        .unwrap_or_else(|| BackendError::new(BackendErrorKind::Other, "Unknown error")))
}

/// Delay before retry `attempt` (1-based): `base * 2^(attempt-1)`, saturating.
fn backoff_ms(base: u64, attempt: u32) -> u64 {
    base.saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)))
}

// ── Session ──────────────────────────────────────────────────────────────

/// A run's view of the backend: resolves the model name once, then reuses it.
pub struct ModelSession {
    backend: Arc<dyn ChatBackend>,
    requested: String,
    candidates: Vec<String>,
    pinned: Option<String>,
}

impl ModelSession {
    pub fn new(backend: Arc<dyn ChatBackend>, model: impl Into<String>) -> Self {
        let requested = model.into();
        let candidates = model_candidates(&requested);
        Self {
            backend,
            requested,
            candidates,
            pinned: None,
        }
    }

    /// The candidate that answered, once one has.
    pub fn pinned_model(&self) -> Option<&str> {
        self.pinned.as_deref()
    }

    pub fn requested_model(&self) -> &str {
        &self.requested
    }

    /// Send `request`, resolving the model name on the first call.
    pub async fn complete(
        &mut self,
        request: &CompletionRequest,
        config: &GenerationConfig,
    ) -> Result<Completion, NeuroLearnError> {
        if let Some(model) = self.pinned.as_deref() {
            return complete_with_retry(self.backend.as_ref(), model, request, config)
                .await
                .map_err(|e| self.fatal(e));
        }

        let mut tried = Vec::with_capacity(self.candidates.len());
        let mut last_error = String::new();

        for candidate in self.candidates.clone() {
            tried.push(candidate.clone());
            match complete_with_retry(self.backend.as_ref(), &candidate, request, config).await {
                Ok(completion) => {
                    if candidate != self.requested {
                        info!(
                            "Model '{}' unavailable, using '{}' instead",
                            self.requested, candidate
                        );
                    }
                    self.pinned = Some(candidate);
                    return Ok(completion);
                }
                Err(e) if e.kind == BackendErrorKind::ModelUnavailable => {
                    warn!("Model candidate '{}' rejected: {}", candidate, e);
                    last_error = e.message;
                }
                Err(e) => return Err(self.fatal(e)),
            }
        }

        Err(NeuroLearnError::ModelUnavailable {
            model: self.requested.clone(),
            tried,
            last_error,
        })
    }

    fn fatal(&self, e: BackendError) -> NeuroLearnError {
        NeuroLearnError::LlmApiError {
            message: format!("{} ({}): {}", self.backend.name(), self.requested, e.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Replays canned results and records which model each call used.
    struct Scripted {
        replies: Mutex<VecDeque<Result<Completion, BackendError>>>,
        calls: Mutex<Vec<String>>,
    }

    impl Scripted {
        fn new(replies: Vec<Result<Completion, BackendError>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ChatBackend for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn complete(
            &self,
            model: &str,
            _request: &CompletionRequest,
        ) -> Result<Completion, BackendError> {
            self.calls.lock().unwrap().push(model.to_string());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(BackendError::new(BackendErrorKind::Other, "script exhausted")))
        }
    }

    fn ok(text: &str) -> Result<Completion, BackendError> {
        Ok(Completion {
            content: text.into(),
            input_tokens: 10,
            output_tokens: 5,
        })
    }

    fn err(kind: BackendErrorKind) -> Result<Completion, BackendError> {
        Err(BackendError::new(kind, format!("{kind:?}")))
    }

    fn request() -> CompletionRequest {
        CompletionRequest {
            system: "s".into(),
            user: "u".into(),
            temperature: 0.3,
            max_tokens: 100,
            json: false,
        }
    }

    fn fast_config() -> GenerationConfig {
        GenerationConfig::builder()
            .retry_backoff_ms(1)
            .max_retries(2)
            .build()
            .unwrap()
    }

    #[test]
    fn google_key_is_used_only_without_gemini_key() {
        use crate::config::test_env::with_vars;

        with_vars(
            &[("GEMINI_API_KEY", None), ("GOOGLE_API_KEY", Some("g-key"))],
            || {
                assert_eq!(
                    google_key_fallback("gemini", "gemini-2.5-flash").as_deref(),
                    Some("g-key")
                );
                assert_eq!(google_key_fallback("gemini", "vertexai:gemini-2.5-flash"), None);
                assert_eq!(google_key_fallback("openai", "gpt-4.1"), None);
            },
        );
        with_vars(
            &[("GEMINI_API_KEY", Some("m-key")), ("GOOGLE_API_KEY", Some("g-key"))],
            || assert_eq!(google_key_fallback("gemini", "gemini-2.5-flash"), None),
        );
    }

    #[test]
    fn candidates_for_plain_name() {
        assert_eq!(
            model_candidates("gemini-2.5-flash"),
            vec![
                "gemini-2.5-flash",
                "models/gemini-2.5-flash",
                "gemini-2.5-flash-latest",
                "models/gemini-2.5-flash-latest",
            ]
        );
    }

    #[test]
    fn candidates_for_prefixed_name() {
        assert_eq!(
            model_candidates("models/gemini-pro"),
            vec!["models/gemini-pro", "models/gemini-pro-latest"]
        );
    }

    #[test]
    fn candidates_for_latest_name() {
        assert_eq!(
            model_candidates("gemini-pro-latest"),
            vec!["gemini-pro-latest", "models/gemini-pro-latest"]
        );
        assert_eq!(
            model_candidates("models/gemini-pro-latest"),
            vec!["models/gemini-pro-latest"]
        );
    }

    #[tokio::test]
    async fn retry_recovers_from_transient_error() {
        let backend = Scripted::new(vec![err(BackendErrorKind::Transient), ok("hi")]);
        let c = complete_with_retry(backend.as_ref(), "m", &request(), &fast_config())
            .await
            .unwrap();
        assert_eq!(c.content, "hi");
        assert_eq!(backend.calls().len(), 2);
    }

    #[test]
    fn backoff_doubles_and_saturates() {
        assert_eq!(backoff_ms(500, 1), 500);
        assert_eq!(backoff_ms(500, 3), 2000);
        assert_eq!(backoff_ms(500, 60), u64::MAX);
        assert_eq!(backoff_ms(500, 200), u64::MAX);
    }

    /// Hangs on the first call, answers on the next.
    struct HangsOnce {
        calls: Mutex<u32>,
    }

    #[async_trait]
    impl ChatBackend for HangsOnce {
        fn name(&self) -> &str {
            "hangs-once"
        }

        async fn complete(
            &self,
            _model: &str,
            _request: &CompletionRequest,
        ) -> Result<Completion, BackendError> {
            let call = {
                let mut calls = self.calls.lock().unwrap();
                *calls += 1;
                *calls
            };
            if call == 1 {
                sleep(Duration::from_secs(3600)).await;
            }
            ok("late but fine")
        }
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_counts_as_transient() {
        let backend = HangsOnce {
            calls: Mutex::new(0),
        };
        let config = GenerationConfig::builder()
            .api_timeout_secs(5)
            .retry_backoff_ms(1)
            .max_retries(1)
            .build()
            .unwrap();
        let c = complete_with_retry(&backend, "m", &request(), &config)
            .await
            .unwrap();
        assert_eq!(c.content, "late but fine");
        assert_eq!(*backend.calls.lock().unwrap(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_without_retries_is_transient_error() {
        let backend = HangsOnce {
            calls: Mutex::new(0),
        };
        let config = GenerationConfig::builder()
            .api_timeout_secs(5)
            .max_retries(0)
            .build()
            .unwrap();
        let e = complete_with_retry(&backend, "m", &request(), &config)
            .await
            .unwrap_err();
        assert_eq!(e.kind, BackendErrorKind::Transient);
        assert!(e.message.contains("timed out"));
    }

    #[tokio::test]
    async fn retry_gives_up_after_limit() {
        let backend = Scripted::new(vec![
            err(BackendErrorKind::RateLimited),
            err(BackendErrorKind::RateLimited),
            err(BackendErrorKind::RateLimited),
            ok("too late"),
        ]);
        let e = complete_with_retry(backend.as_ref(), "m", &request(), &fast_config())
            .await
            .unwrap_err();
        assert_eq!(e.kind, BackendErrorKind::RateLimited);
        assert_eq!(backend.calls().len(), 3);
    }

    #[tokio::test]
    async fn retry_does_not_repeat_auth_errors() {
        let backend = Scripted::new(vec![err(BackendErrorKind::Auth), ok("x")]);
        let e = complete_with_retry(backend.as_ref(), "m", &request(), &fast_config())
            .await
            .unwrap_err();
        assert_eq!(e.kind, BackendErrorKind::Auth);
        assert_eq!(backend.calls().len(), 1);
    }

    #[tokio::test]
    async fn session_falls_back_and_pins() {
        let backend = Scripted::new(vec![
            err(BackendErrorKind::ModelUnavailable),
            ok("first"),
            ok("second"),
        ]);
        let mut session = ModelSession::new(backend.clone(), "gemini-x");
        let config = fast_config();

        assert_eq!(session.complete(&request(), &config).await.unwrap().content, "first");
        assert_eq!(session.pinned_model(), Some("models/gemini-x"));
        assert_eq!(session.complete(&request(), &config).await.unwrap().content, "second");
        assert_eq!(
            backend.calls(),
            vec!["gemini-x", "models/gemini-x", "models/gemini-x"]
        );
    }

    #[tokio::test]
    async fn session_reports_all_candidates_on_failure() {
        let backend = Scripted::new(vec![
            err(BackendErrorKind::ModelUnavailable),
            err(BackendErrorKind::ModelUnavailable),
            err(BackendErrorKind::ModelUnavailable),
            err(BackendErrorKind::ModelUnavailable),
        ]);
        let mut session = ModelSession::new(backend, "gemini-x");
        match session.complete(&request(), &fast_config()).await.unwrap_err() {
            NeuroLearnError::ModelUnavailable { model, tried, .. } => {
                assert_eq!(model, "gemini-x");
                assert_eq!(tried.len(), 4);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn session_stops_on_other_errors() {
        let backend = Scripted::new(vec![err(BackendErrorKind::Other), ok("unused")]);
        let mut session = ModelSession::new(backend.clone(), "gemini-x");
        let e = session.complete(&request(), &fast_config()).await.unwrap_err();
        assert!(matches!(e, NeuroLearnError::LlmApiError { .. }));
        assert_eq!(backend.calls().len(), 1);
        assert!(session.pinned_model().is_none());
    }
}
