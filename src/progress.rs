//! Progress-callback trait for generation stage events.
//!
//! Inject an [`Arc<dyn GenerationProgressCallback>`] via
//! [`crate::config::GenerationConfigBuilder::progress_callback`] to receive
//! each result as soon as its stage finishes: the summary is usable while the
//! quiz is still being generated.
//!
//! # Example
//!
//! ```rust
//! use neurolearn::{GenerationConfig, GenerationProgressCallback};
//! use std::sync::Arc;
//!
//! struct PrintSummary;
//!
//! impl GenerationProgressCallback for PrintSummary {
//!     fn on_summary(&self, summary: &str) {
//!         eprintln!("summary ready ({} chars)", summary.len());
//!     }
//! }
//!
//! let config = GenerationConfig::builder()
//!     .progress_callback(Arc::new(PrintSummary))
//!     .build()
//!     .unwrap();
//! ```

use crate::course::{Flashcard, QuizQuestion};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// The three generation stages, in the order they run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Summary,
    Quiz,
    Flashcards,
}

impl Stage {
    pub const ALL: [Stage; 3] = [Stage::Summary, Stage::Quiz, Stage::Flashcards];

    /// 1-indexed position of the stage.
    pub fn number(self) -> usize {
        match self {
            Stage::Summary => 1,
            Stage::Quiz => 2,
            Stage::Flashcards => 3,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Summary => "summary",
            Stage::Quiz => "quiz",
            Stage::Flashcards => "flashcards",
        };
        f.write_str(name)
    }
}

/// Called by the pipeline as it moves through the stages.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Implementations must be `Send + Sync` because the
/// pipeline usually runs on a background task.
pub trait GenerationProgressCallback: Send + Sync {
    /// Called once the PDF text has been extracted, before any LLM request.
    fn on_start(&self, filename: &str) {
        let _ = filename;
    }

    /// Called before the request for a stage is sent.
    fn on_stage_start(&self, stage: Stage) {
        let _ = stage;
    }

    /// Called with the cleaned summary.
    fn on_summary(&self, summary: &str) {
        let _ = summary;
    }

    /// Called with the parsed quiz.
    fn on_quiz(&self, questions: &[QuizQuestion]) {
        let _ = questions;
    }

    /// Called with the parsed flashcards.
    fn on_flashcards(&self, cards: &[Flashcard]) {
        let _ = cards;
    }

    /// Called when the pipeline stops on a fatal error.
    fn on_error(&self, error: &str) {
        let _ = error;
    }

    /// Always called last, whether the run succeeded or not.
    fn on_complete(&self, success: bool) {
        let _ = success;
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl GenerationProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::GenerationConfig`].
pub type ProgressCallback = Arc<dyn GenerationProgressCallback>;
