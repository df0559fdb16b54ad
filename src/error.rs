//! Error types for the neurolearn library.
//!
//! Two error types reflect two levels of failure:
//!
//! * [`NeuroLearnError`] — **Fatal**: the course cannot be generated or the
//!   store cannot be used (bad input file, no text layer, no API key, the
//!   model never answered, the model answered with unusable JSON).
//!
//! * [`BackendError`] — a single LLM request failed. The pipeline inspects
//!   its [`BackendErrorKind`] to decide whether to retry the request, move on
//!   to the next model-name candidate, or give up and surface a
//!   [`NeuroLearnError`].

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the neurolearn library.
#[derive(Debug, Error)]
pub enum NeuroLearnError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The file is not a PDF (wrong extension or wrong magic bytes).
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// The PDF opened fine but has no pages.
    #[error("PDF '{path}' contains no pages")]
    EmptyDocument { path: PathBuf },

    /// Every page was empty once its text layer was read.
    #[error("No text could be extracted from '{path}'\nScanned PDFs need OCR before they can be used.")]
    NoExtractableText { path: PathBuf },

    /// pdfium could not read the text layer of a page.
    #[error("Could not read page {page}: {detail}")]
    PageTextFailed { page: usize, detail: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Install pdfium system-wide, place it in the working directory,\n\
or set PDFIUM_LIB_PATH=/path/to/libpdfium.\n"
    )]
    PdfiumBindingFailed(String),

    // ── LLM errors ────────────────────────────────────────────────────────
    /// The API key environment variable for the provider is unset or empty.
    #[error("Environment variable {var} is not set.\nExport it or add it to a .env file.")]
    MissingApiKey { var: String },

    /// The configured provider could not be constructed.
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// No model-name candidate was accepted by the provider.
    #[error(
        "Could not initialise model '{model}' (tried: {}).\nLast error: {last_error}\n\
Check GEMINI_MODEL or --model.",
        tried.join(", ")
    )]
    ModelUnavailable {
        model: String,
        tried: Vec<String>,
        last_error: String,
    },

    /// The LLM API returned a non-recoverable error.
    #[error("LLM API error: {message}")]
    LlmApiError { message: String },

    /// The model answered the summary prompt with nothing.
    #[error("The model returned an empty summary")]
    EmptySummary,

    /// The model's answer could not be parsed as JSON, even after recovery.
    #[error("Invalid JSON returned for '{field}': {detail}\nPayload: {payload}")]
    InvalidJson {
        field: String,
        detail: String,
        payload: String,
    },

    /// The JSON parsed but had no list under the expected key.
    #[error("The returned JSON does not contain a '{field}' list")]
    MissingField { field: String },

    // ── Store errors ──────────────────────────────────────────────────────
    /// Reading or writing the course store failed.
    #[error("Course store I/O error on '{path}': {source}")]
    StoreIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The course store could not be serialised.
    #[error("Course store serialisation error: {0}")]
    StoreSerde(#[from] serde_json::Error),

    /// No course with the given id exists in the store.
    #[error("No course with id '{id}'")]
    CourseNotFound { id: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// What went wrong with a single LLM request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendErrorKind {
    /// The model name is unknown to the provider (HTTP 404 and friends).
    ModelUnavailable,
    /// Authentication failed (HTTP 401/403); retrying will not help.
    Auth,
    /// HTTP 429.
    RateLimited,
    /// Timeouts, 5xx, connection resets.
    Transient,
    /// Anything else.
    Other,
}

impl BackendErrorKind {
    /// Whether the same request may succeed if sent again.
    pub fn is_retryable(self) -> bool {
        matches!(self, BackendErrorKind::Transient | BackendErrorKind::RateLimited)
    }
}

/// A failed LLM request.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct BackendError {
    pub kind: BackendErrorKind,
    pub message: String,
}

impl BackendError {
    pub fn new(kind: BackendErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Classify a provider error from its rendered message.
    ///
    /// Provider crates report HTTP failures as text, so the status code and
    /// the usual phrases are all there is to go on.
    pub fn classify(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();
        let kind = if lower.contains("404")
            || lower.contains("not found")
            || lower.contains("not_found")
            || lower.contains("is not supported for generatecontent")
            || lower.contains("unknown model")
        {
            BackendErrorKind::ModelUnavailable
        } else if lower.contains("401")
            || lower.contains("403")
            || lower.contains("api key")
            || lower.contains("api_key")
            || lower.contains("permission_denied")
            || lower.contains("unauthenticated")
        {
            BackendErrorKind::Auth
        } else if lower.contains("429")
            || lower.contains("rate limit")
            || lower.contains("resource_exhausted")
        {
            BackendErrorKind::RateLimited
        } else if lower.contains("timeout")
            || lower.contains("timed out")
            || lower.contains("500")
            || lower.contains("502")
            || lower.contains("503")
            || lower.contains("unavailable")
            || lower.contains("connection")
        {
            BackendErrorKind::Transient
        } else {
            BackendErrorKind::Other
        };
        Self { kind, message }
    }
}
