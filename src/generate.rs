//! Eager generation entry points: wait for all three stages, then return.
//!
//! The pipeline is linear. The summary, quiz and flashcards are requested
//! one after the other against the same [`ModelSession`], so the model name
//! resolved for the summary is reused for the two JSON requests. The first
//! failure stops the run; later stages are never sent.
//!
//! Use [`crate::stream::spawn_generation`] instead to run the pipeline on a
//! background task and receive each result as it lands.

use crate::config::GenerationConfig;
use crate::course::{DocumentMetadata, GenerationOutput, GenerationStats};
use crate::error::NeuroLearnError;
use crate::pipeline::extract::{self, ExtractedText};
use crate::pipeline::input;
use crate::pipeline::llm::{ChatBackend, CompletionRequest, EdgequakeBackend, ModelSession};
use crate::pipeline::{parse, postprocess};
use crate::progress::Stage;
use crate::prompts;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Generate a summary, quiz and flashcards from a local PDF.
///
/// This is the primary entry point for the library.
///
/// # Errors
/// - the file is missing, unreadable, or not a PDF
/// - the PDF has no pages or no text layer
/// - no API key / provider is configured
/// - the model is unavailable under every name variant
/// - the model's answer is empty or unusable JSON
pub async fn generate(
    pdf_path: impl AsRef<Path>,
    config: &GenerationConfig,
) -> Result<GenerationOutput, NeuroLearnError> {
    let result = generate_inner(pdf_path.as_ref(), config).await;
    notify_finished(config, &result);
    result
}

async fn generate_inner(
    pdf_path: &Path,
    config: &GenerationConfig,
) -> Result<GenerationOutput, NeuroLearnError> {
    let total_start = Instant::now();
    info!("Starting generation: {}", pdf_path.display());

    // ── Step 1: Validate input ───────────────────────────────────────────
    let resolved = input::resolve_input(pdf_path)?;

    // ── Step 2: Extract text ─────────────────────────────────────────────
    let extract_start = Instant::now();
    let extracted = extract::extract_text(resolved.path()).await?;
    let extract_duration_ms = extract_start.elapsed().as_millis() as u64;
    info!(
        "Extracted {} chars from {}/{} pages in {}ms",
        extracted.text.len(),
        extracted.pages_with_text,
        extracted.page_count,
        extract_duration_ms
    );

    // ── Step 3: Backend ──────────────────────────────────────────────────
    let backend = resolve_backend(config)?;

    // ── Step 4: Three LLM stages ─────────────────────────────────────────
    let mut output = run_stages(&resolved.filename(), &extracted.text, backend, config).await?;
    attach_extraction(&mut output, extracted, extract_duration_ms);
    output.stats.total_duration_ms = total_start.elapsed().as_millis() as u64;
    Ok(output)
}

/// Run the three LLM stages on already-extracted text.
///
/// Useful when the text comes from somewhere other than a PDF, and in tests
/// with a scripted backend.
pub async fn generate_from_text(
    filename: &str,
    document_text: &str,
    backend: Arc<dyn ChatBackend>,
    config: &GenerationConfig,
) -> Result<GenerationOutput, NeuroLearnError> {
    let result = run_stages(filename, document_text, backend, config).await;
    notify_finished(config, &result);
    result
}

/// Synchronous wrapper around [`generate`].
///
/// Creates a temporary tokio runtime internally.
pub fn generate_sync(
    pdf_path: impl AsRef<Path>,
    config: &GenerationConfig,
) -> Result<GenerationOutput, NeuroLearnError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| NeuroLearnError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(generate(pdf_path, config))
}

/// Read PDF metadata without calling any model.
///
/// Does not require an API key.
pub async fn inspect(pdf_path: impl AsRef<Path>) -> Result<DocumentMetadata, NeuroLearnError> {
    let resolved = input::resolve_input(pdf_path)?;
    extract::extract_metadata(resolved.path()).await
}

// ── Internal helpers ─────────────────────────────────────────────────────

async fn run_stages(
    filename: &str,
    document_text: &str,
    backend: Arc<dyn ChatBackend>,
    config: &GenerationConfig,
) -> Result<GenerationOutput, NeuroLearnError> {
    let start = Instant::now();
    if document_text.trim().is_empty() {
        return Err(NeuroLearnError::NoExtractableText {
            path: filename.into(),
        });
    }

    let cb = config.progress_callback.as_ref();
    if let Some(cb) = cb {
        cb.on_start(filename);
    }

    let mut session = ModelSession::new(backend, config.resolved_model());
    let mut stats = GenerationStats {
        document_chars: document_text.chars().count(),
        ..Default::default()
    };
    let document = prompts::document_block(document_text);
    let language = prompts::language_instruction(config.language.as_deref());

    // ── Summary ──────────────────────────────────────────────────────────
    if let Some(cb) = cb {
        cb.on_stage_start(Stage::Summary);
    }
    let stage_start = Instant::now();
    let request = build_request(
        prompts::SUMMARY_PROMPT,
        &language,
        &document,
        config.summary_temperature,
        false,
        config,
    );
    let completion = session.complete(&request, config).await?;
    add_tokens(&mut stats, completion.input_tokens, completion.output_tokens);
    let summary = postprocess::clean_markdown(&completion.content);
    if summary.trim().is_empty() {
        return Err(NeuroLearnError::EmptySummary);
    }
    stats.summary_duration_ms = stage_start.elapsed().as_millis() as u64;
    info!("Summary ready: {} chars", summary.len());
    if let Some(cb) = cb {
        cb.on_summary(&summary);
    }

    // ── Quiz ─────────────────────────────────────────────────────────────
    if let Some(cb) = cb {
        cb.on_stage_start(Stage::Quiz);
    }
    let stage_start = Instant::now();
    let request = build_request(
        &prompts::quiz_prompt(config.num_questions),
        &language,
        &document,
        config.json_temperature,
        true,
        config,
    );
    let completion = session.complete(&request, config).await?;
    add_tokens(&mut stats, completion.input_tokens, completion.output_tokens);
    let quiz = parse::parse_quiz(&completion.content)?;
    if quiz.len() != config.num_questions {
        warn!(
            "Asked for {} quiz questions, got {}",
            config.num_questions,
            quiz.len()
        );
    }
    stats.quiz_duration_ms = stage_start.elapsed().as_millis() as u64;
    info!("Quiz ready: {} questions", quiz.len());
    if let Some(cb) = cb {
        cb.on_quiz(&quiz);
    }

    // ── Flashcards ───────────────────────────────────────────────────────
    if let Some(cb) = cb {
        cb.on_stage_start(Stage::Flashcards);
    }
    let stage_start = Instant::now();
    let request = build_request(
        prompts::FLASHCARDS_PROMPT,
        &language,
        &document,
        config.json_temperature,
        true,
        config,
    );
    let completion = session.complete(&request, config).await?;
    add_tokens(&mut stats, completion.input_tokens, completion.output_tokens);
    let flashcards = parse::parse_flashcards(&completion.content)?;
    stats.flashcards_duration_ms = stage_start.elapsed().as_millis() as u64;
    info!("Flashcards ready: {} cards", flashcards.len());
    if let Some(cb) = cb {
        cb.on_flashcards(&flashcards);
    }

    stats.model_used = session
        .pinned_model()
        .unwrap_or(session.requested_model())
        .to_string();
    stats.total_duration_ms = start.elapsed().as_millis() as u64;

    Ok(GenerationOutput {
        filename: filename.to_string(),
        summary,
        quiz,
        flashcards,
        metadata: None,
        stats,
    })
}

fn build_request(
    instruction: &str,
    language: &str,
    document: &str,
    temperature: f32,
    json: bool,
    config: &GenerationConfig,
) -> CompletionRequest {
    CompletionRequest {
        system: prompts::SYSTEM_PROMPT.to_string(),
        user: format!("{instruction}\n{language}\n\n{document}"),
        temperature,
        max_tokens: config.max_tokens,
        json,
    }
}

fn attach_extraction(output: &mut GenerationOutput, extracted: ExtractedText, duration_ms: u64) {
    output.metadata = Some(extracted.metadata);
    output.stats.extract_duration_ms = duration_ms;
}

fn add_tokens(stats: &mut GenerationStats, input: u64, output: u64) {
    stats.total_input_tokens += input;
    stats.total_output_tokens += output;
}

fn notify_finished(config: &GenerationConfig, result: &Result<GenerationOutput, NeuroLearnError>) {
    if let Some(ref cb) = config.progress_callback {
        if let Err(e) = result {
            cb.on_error(&e.to_string());
        }
        cb.on_complete(result.is_ok());
    }
}

/// API-key variable(s) each hosted provider needs. Local providers need none.
fn api_key_vars(provider: &str) -> &'static [&'static str] {
    match provider {
        "gemini" | "google" => &["GEMINI_API_KEY", "GOOGLE_API_KEY"],
        "openai" => &["OPENAI_API_KEY"],
        "anthropic" => &["ANTHROPIC_API_KEY"],
        "mistral" => &["MISTRAL_API_KEY"],
        _ => &[],
    }
}

/// Resolve the backend, from most-specific to least-specific:
///
/// 1. **Pre-built backend** (`config.provider`), used as-is.
/// 2. **Named provider** (`config.provider_name`, then `NEUROLEARN_PROVIDER`,
///    then gemini), after checking its API key is present.
fn resolve_backend(config: &GenerationConfig) -> Result<Arc<dyn ChatBackend>, NeuroLearnError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    let name = config.resolved_provider_name().to_lowercase();
    check_api_key(&name)?;

    let name = if name == "google" { "gemini".to_string() } else { name };
    info!("Using provider '{}'", name);
    let backend = EdgequakeBackend::connect(name, &config.resolved_model())?;
    Ok(Arc::new(backend))
}

/// Fail early when a hosted provider has no key in the environment.
fn check_api_key(provider: &str) -> Result<(), NeuroLearnError> {
    let vars = api_key_vars(provider);
    if vars.is_empty() {
        return Ok(());
    }
    let found = vars
        .iter()
        .any(|v| std::env::var(v).map(|k| !k.trim().is_empty()).unwrap_or(false));
    if found {
        Ok(())
    } else {
        Err(NeuroLearnError::MissingApiKey {
            var: vars.join(" or "),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_env::with_vars;

    #[test]
    fn request_layout() {
        let config = GenerationConfig::default();
        let r = build_request("Do it.", "In French.", "=== DOCUMENT ===\nx", 0.3, true, &config);
        assert_eq!(r.user, "Do it.\nIn French.\n\n=== DOCUMENT ===\nx");
        assert_eq!(r.system, prompts::SYSTEM_PROMPT);
        assert!(r.json);
        assert_eq!(r.max_tokens, config.max_tokens);
    }

    #[test]
    fn extraction_metadata_reaches_output() {
        let mut output = GenerationOutput {
            filename: "bio.pdf".into(),
            summary: "## S\n".into(),
            quiz: Vec::new(),
            flashcards: Vec::new(),
            metadata: None,
            stats: GenerationStats::default(),
        };
        let extracted = ExtractedText {
            text: "text".into(),
            page_count: 3,
            pages_with_text: 2,
            metadata: DocumentMetadata {
                title: Some("Cell Biology".into()),
                author: Some("A. Teacher".into()),
                page_count: 3,
                pdf_version: "Pdf1_7".into(),
                ..Default::default()
            },
        };
        attach_extraction(&mut output, extracted, 42);
        let meta = output.metadata.unwrap();
        assert_eq!(meta.title.as_deref(), Some("Cell Biology"));
        assert_eq!(meta.author.as_deref(), Some("A. Teacher"));
        assert_eq!(meta.pdf_version, "Pdf1_7");
        assert_eq!(meta.page_count, 3);
        assert_eq!(output.stats.extract_duration_ms, 42);
    }

    #[test]
    fn key_vars_per_provider() {
        assert_eq!(api_key_vars("gemini"), &["GEMINI_API_KEY", "GOOGLE_API_KEY"]);
        assert!(api_key_vars("ollama").is_empty());
    }

    #[test]
    fn prebuilt_provider_skips_key_check() {
        struct Dummy;
        #[async_trait::async_trait]
        impl ChatBackend for Dummy {
            fn name(&self) -> &str {
                "dummy"
            }
            async fn complete(
                &self,
                _model: &str,
                _request: &CompletionRequest,
            ) -> Result<crate::pipeline::llm::Completion, crate::error::BackendError> {
                Ok(Default::default())
            }
        }
        let config = GenerationConfig::builder()
            .provider(Arc::new(Dummy))
            .build()
            .unwrap();
        assert_eq!(resolve_backend(&config).unwrap().name(), "dummy");
    }

    #[test]
    fn missing_gemini_key_is_reported() {
        with_vars(&[("GEMINI_API_KEY", None), ("GOOGLE_API_KEY", None)], || {
            match check_api_key("gemini").unwrap_err() {
                NeuroLearnError::MissingApiKey { var } => {
                    assert_eq!(var, "GEMINI_API_KEY or GOOGLE_API_KEY")
                }
                other => panic!("unexpected error: {other}"),
            }
        });
        with_vars(&[("GEMINI_API_KEY", Some("   ")), ("GOOGLE_API_KEY", None)], || {
            assert!(check_api_key("gemini").is_err());
        });
    }

    #[test]
    fn either_google_variable_satisfies_gemini() {
        with_vars(&[("GEMINI_API_KEY", None), ("GOOGLE_API_KEY", Some("g-key"))], || {
            assert!(check_api_key("gemini").is_ok());
            assert!(check_api_key("google").is_ok());
            // The key is handed to the provider, not copied between variables.
            assert!(std::env::var("GEMINI_API_KEY").is_err());
        });
        with_vars(&[("GEMINI_API_KEY", Some("m-key")), ("GOOGLE_API_KEY", None)], || {
            assert!(check_api_key("gemini").is_ok());
        });
    }

    #[test]
    fn missing_openai_key_is_reported() {
        with_vars(&[("OPENAI_API_KEY", None)], || {
            assert!(matches!(
                check_api_key("openai").unwrap_err(),
                NeuroLearnError::MissingApiKey { .. }
            ));
        });
    }

    #[test]
    fn local_provider_needs_no_key() {
        assert!(check_api_key("ollama").is_ok());
        assert!(check_api_key("lmstudio").is_ok());
    }
}
