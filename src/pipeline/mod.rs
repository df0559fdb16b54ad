//! Pipeline stages for PDF-to-course generation.
//!
//! Each submodule implements one step and is testable on its own.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ extract ──▶ llm ──▶ postprocess (summary)
//! (path)    (pdfium)    (chat) └▶ parse      (quiz, flashcards)
//! ```
//!
//! 1. [`input`]   — validate the user-supplied path
//! 2. [`extract`] — page text and metadata; runs in `spawn_blocking` because
//!    pdfium is not async-safe
//! 3. [`llm`]     — chat backend seam, model-name fallback, retry/backoff;
//!    the only stage with network I/O
//! 4. [`postprocess`] — deterministic cleanup of the Markdown summary
//! 5. [`parse`]   — recover the JSON list from quiz and flashcard answers

pub mod extract;
pub mod input;
pub mod llm;
pub mod parse;
pub mod postprocess;
