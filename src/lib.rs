//! # neurolearn
//!
//! Turn a PDF course document into study material with a language model: a
//! structured Markdown summary, a multiple-choice quiz, and a flashcard deck.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Input     validate the local file (exists, .pdf, %PDF magic)
//!  ├─ 2. Extract   page text via pdfium (CPU-bound, spawn_blocking)
//!  ├─ 3. Summary   Markdown summary, cleaned up
//!  ├─ 4. Quiz      JSON question list, shape-recovered
//!  ├─ 5. Cards     JSON flashcard list, shape-recovered
//!  └─ 6. Store     optional: persist as a course in a JSON file
//! ```
//!
//! The three model stages run one after the other against the same model;
//! the first failure stops the run.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use neurolearn::{generate, CourseStore, GenerationConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Reads GEMINI_API_KEY (or GOOGLE_API_KEY) and GEMINI_MODEL.
//!     let config = GenerationConfig::default();
//!     let output = generate("lecture.pdf", &config).await?;
//!     println!("{}", output.summary);
//!
//!     let mut store = CourseStore::open(CourseStore::default_path())?;
//!     let id = store.save_output(&output)?;
//!     eprintln!("saved course {id}");
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `neurolearn` binary (clap + anyhow + tracing-subscriber + dotenv) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! neurolearn = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod course;
pub mod error;
pub mod generate;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod store;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{GenerationConfig, GenerationConfigBuilder};
pub use course::{
    AnswerOutcome, CardSide, Course, CourseMetadata, DocumentMetadata, Flashcard, FlashcardDeck,
    GenerationOutput, GenerationStats, QuizQuestion, QuizScore, QuizSession,
};
pub use error::{BackendError, BackendErrorKind, NeuroLearnError};
pub use generate::{generate, generate_from_text, generate_sync, inspect};
pub use pipeline::llm::{ChatBackend, Completion, CompletionRequest, EdgequakeBackend};
pub use progress::{GenerationProgressCallback, NoopProgressCallback, ProgressCallback, Stage};
pub use store::CourseStore;
pub use stream::{spawn_generation, spawn_generation_from_text, GenerationEvent, GenerationHandle};
