//! Background generation: run the pipeline on a tokio task and receive each
//! result as an event while it runs.
//!
//! Unlike the eager [`crate::generate::generate`], [`spawn_generation`]
//! returns immediately. The caller keeps its own thread (a terminal UI, an
//! event loop) responsive and reads [`GenerationEvent`]s as the summary, quiz
//! and flashcards land. [`GenerationEvent::Finished`] is always the last
//! event; the stream ends right after it.

use crate::config::GenerationConfig;
use crate::course::{Flashcard, GenerationOutput, QuizQuestion};
use crate::error::NeuroLearnError;
use crate::generate::{generate, generate_from_text};
use crate::pipeline::llm::ChatBackend;
use crate::progress::{GenerationProgressCallback, ProgressCallback, Stage};
use futures::Stream;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::info;

/// One step of a background run.
#[derive(Debug, Clone)]
pub enum GenerationEvent {
    /// Text extracted, about to call the model.
    Started { filename: String },
    StageStarted(Stage),
    Summary(String),
    Quiz(Vec<QuizQuestion>),
    Flashcards(Vec<Flashcard>),
    /// The run stopped on a fatal error.
    Failed(String),
    /// Always last.
    Finished { success: bool },
}

/// A boxed stream of generation events.
pub type EventStream = Pin<Box<dyn Stream<Item = GenerationEvent> + Send>>;

/// A running background generation.
pub struct GenerationHandle {
    events: mpsc::UnboundedReceiver<GenerationEvent>,
    task: JoinHandle<Result<GenerationOutput, NeuroLearnError>>,
}

impl GenerationHandle {
    /// Next event, or `None` once the run is over.
    pub async fn next_event(&mut self) -> Option<GenerationEvent> {
        self.events.recv().await
    }

    /// Split into an event stream and the task's final result.
    pub fn into_parts(
        self,
    ) -> (
        EventStream,
        JoinHandle<Result<GenerationOutput, NeuroLearnError>>,
    ) {
        (
            Box::pin(UnboundedReceiverStream::new(self.events)),
            self.task,
        )
    }

    /// Whether the background task has finished.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the run to finish and return its output, discarding events.
    pub async fn join(self) -> Result<GenerationOutput, NeuroLearnError> {
        self.task
            .await
            .map_err(|e| NeuroLearnError::Internal(format!("Generation task panicked: {}", e)))?
    }
}

/// Start generating from a PDF on a background task.
///
/// Must be called from within a tokio runtime.
pub fn spawn_generation(pdf_path: impl Into<PathBuf>, config: GenerationConfig) -> GenerationHandle {
    let pdf_path = pdf_path.into();
    let (tx, events) = mpsc::unbounded_channel();
    let config = with_channel(config, tx);
    info!("Spawning background generation for {}", pdf_path.display());
    let task = tokio::spawn(async move { generate(&pdf_path, &config).await });
    GenerationHandle { events, task }
}

/// Start generating from already-extracted text on a background task.
pub fn spawn_generation_from_text(
    filename: impl Into<String>,
    document_text: impl Into<String>,
    backend: Arc<dyn ChatBackend>,
    config: GenerationConfig,
) -> GenerationHandle {
    let filename = filename.into();
    let document_text = document_text.into();
    let (tx, events) = mpsc::unbounded_channel();
    let config = with_channel(config, tx);
    let task = tokio::spawn(async move {
        generate_from_text(&filename, &document_text, backend, &config).await
    });
    GenerationHandle { events, task }
}

/// Install a channel-forwarding callback, keeping any callback already set.
fn with_channel(
    mut config: GenerationConfig,
    tx: mpsc::UnboundedSender<GenerationEvent>,
) -> GenerationConfig {
    let inner = config.progress_callback.take();
    config.progress_callback = Some(Arc::new(ChannelCallback { tx, inner }));
    config
}

/// Forwards every callback as a [`GenerationEvent`], then to `inner`.
struct ChannelCallback {
    tx: mpsc::UnboundedSender<GenerationEvent>,
    inner: Option<ProgressCallback>,
}

impl ChannelCallback {
    fn send(&self, event: GenerationEvent) {
        // The receiver may have been dropped; the run continues regardless.
        let _ = self.tx.send(event);
    }
}

impl GenerationProgressCallback for ChannelCallback {
    fn on_start(&self, filename: &str) {
        self.send(GenerationEvent::Started {
            filename: filename.to_string(),
        });
        if let Some(ref cb) = self.inner {
            cb.on_start(filename);
        }
    }

    fn on_stage_start(&self, stage: Stage) {
        self.send(GenerationEvent::StageStarted(stage));
        if let Some(ref cb) = self.inner {
            cb.on_stage_start(stage);
        }
    }

    fn on_summary(&self, summary: &str) {
        self.send(GenerationEvent::Summary(summary.to_string()));
        if let Some(ref cb) = self.inner {
            cb.on_summary(summary);
        }
    }

    fn on_quiz(&self, questions: &[QuizQuestion]) {
        self.send(GenerationEvent::Quiz(questions.to_vec()));
        if let Some(ref cb) = self.inner {
            cb.on_quiz(questions);
        }
    }

    fn on_flashcards(&self, cards: &[Flashcard]) {
        self.send(GenerationEvent::Flashcards(cards.to_vec()));
        if let Some(ref cb) = self.inner {
            cb.on_flashcards(cards);
        }
    }

    fn on_error(&self, error: &str) {
        self.send(GenerationEvent::Failed(error.to_string()));
        if let Some(ref cb) = self.inner {
            cb.on_error(error);
        }
    }

    fn on_complete(&self, success: bool) {
        self.send(GenerationEvent::Finished { success });
        if let Some(ref cb) = self.inner {
            cb.on_complete(success);
        }
    }
}
