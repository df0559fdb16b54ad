//! Integration tests for the generation pipeline with a scripted backend.
//!
//! No network, no pdfium: the model is replaced by a [`ChatBackend`] that
//! replays canned answers and records every request it receives.

use async_trait::async_trait;
use neurolearn::{
    generate_from_text, spawn_generation, spawn_generation_from_text, BackendError,
    BackendErrorKind, ChatBackend, Completion, CompletionRequest, CourseStore, GenerationConfig,
    GenerationEvent, NeuroLearnError, Stage,
};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

// ── Test helpers ─────────────────────────────────────────────────────────────

struct Scripted {
    replies: Mutex<VecDeque<Result<Completion, BackendError>>>,
    calls: Mutex<Vec<(String, CompletionRequest)>>,
}

impl Scripted {
    fn new(replies: Vec<Result<Completion, BackendError>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            calls: Mutex::new(Vec::new()),
        })
    }

    fn models(&self) -> Vec<String> {
        self.calls.lock().unwrap().iter().map(|(m, _)| m.clone()).collect()
    }

    fn requests(&self) -> Vec<CompletionRequest> {
        self.calls.lock().unwrap().iter().map(|(_, r)| r.clone()).collect()
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
        request: &CompletionRequest,
    ) -> Result<Completion, BackendError> {
        self.calls
            .lock()
            .unwrap()
            .push((model.to_string(), request.clone()));
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(BackendError::new(BackendErrorKind::Other, "script exhausted")))
    }
}

fn ok(text: &str) -> Result<Completion, BackendError> {
    Ok(Completion {
        content: text.to_string(),
        input_tokens: 100,
        output_tokens: 20,
    })
}

const SUMMARY: &str = "```markdown\n## Cells\n\n- The cell is the unit of life.\n```";
const QUIZ: &str = r#"Here you go:
{"questions": [
  {"question": "Unit of life?", "options": ["Atom", "Cell", "Organ"], "answer": "B"},
  {"question": "Powerhouse?", "options": ["Mitochondria", "Nucleus"], "answer": "Mitochondria"}
]}"#;
const CARDS: &str = r#"[{"front": "Cell", "back": "Unit of life"}, {"term": "ATP", "definition": "Energy currency"}]"#;

fn config() -> GenerationConfig {
    GenerationConfig::builder()
        .model("gemini-2.5-flash")
        .num_questions(2)
        .max_retries(0)
        .retry_backoff_ms(1)
        .build()
        .unwrap()
}

// ── Eager generation ─────────────────────────────────────────────────────────

#[tokio::test]
async fn generates_all_three_sections() {
    let backend = Scripted::new(vec![ok(SUMMARY), ok(QUIZ), ok(CARDS)]);
    let output = generate_from_text("bio.pdf", "Cells are the unit of life.", backend.clone(), &config())
        .await
        .unwrap();

    assert_eq!(output.filename, "bio.pdf");
    assert_eq!(output.summary, "## Cells\n\n- The cell is the unit of life.\n");
    assert_eq!(output.quiz.len(), 2);
    assert_eq!(output.quiz[0].answer, "Cell");
    assert_eq!(output.flashcards[1].front, "ATP");
    assert_eq!(output.flashcards[1].back, "Energy currency");

    assert_eq!(output.stats.model_used, "gemini-2.5-flash");
    assert_eq!(output.stats.total_input_tokens, 300);
    assert_eq!(output.stats.total_output_tokens, 60);

    let requests = backend.requests();
    assert_eq!(requests.len(), 3);
    assert!(!requests[0].json);
    assert!(requests[1].json && requests[2].json);
    assert!(requests
        .iter()
        .all(|r| r.user.contains("Cells are the unit of life.")));
}

#[tokio::test]
async fn language_reaches_every_request() {
    let backend = Scripted::new(vec![ok(SUMMARY), ok(QUIZ), ok(CARDS)]);
    let config = GenerationConfig::builder()
        .model("gemini-2.5-flash")
        .language("French")
        .max_retries(0)
        .build()
        .unwrap();
    generate_from_text("bio.pdf", "text", backend.clone(), &config)
        .await
        .unwrap();
    assert!(backend.requests().iter().all(|r| r.user.contains("French")));
}

#[tokio::test]
async fn falls_back_to_prefixed_model_and_keeps_it() {
    let backend = Scripted::new(vec![
        Err(BackendError::new(BackendErrorKind::ModelUnavailable, "404 model not found")),
        ok(SUMMARY),
        ok(QUIZ),
        ok(CARDS),
    ]);
    let output = generate_from_text("bio.pdf", "text", backend.clone(), &config())
        .await
        .unwrap();

    assert_eq!(output.stats.model_used, "models/gemini-2.5-flash");
    assert_eq!(
        backend.models(),
        vec![
            "gemini-2.5-flash",
            "models/gemini-2.5-flash",
            "models/gemini-2.5-flash",
            "models/gemini-2.5-flash",
        ]
    );
}

#[tokio::test]
async fn unusable_quiz_stops_before_flashcards() {
    let backend = Scripted::new(vec![ok(SUMMARY), ok("I cannot produce a quiz."), ok(CARDS)]);
    let err = generate_from_text("bio.pdf", "text", backend.clone(), &config())
        .await
        .unwrap_err();

    assert!(matches!(err, NeuroLearnError::InvalidJson { .. }), "got {err}");
    assert_eq!(backend.requests().len(), 2);
}

#[tokio::test]
async fn blank_summary_is_an_error() {
    let backend = Scripted::new(vec![ok("```\n\n```")]);
    let err = generate_from_text("bio.pdf", "text", backend, &config())
        .await
        .unwrap_err();
    assert!(matches!(err, NeuroLearnError::EmptySummary), "got {err}");
}

#[tokio::test]
async fn blank_document_never_calls_the_model() {
    let backend = Scripted::new(vec![]);
    let err = generate_from_text("scan.pdf", "  \n ", backend.clone(), &config())
        .await
        .unwrap_err();
    assert!(matches!(err, NeuroLearnError::NoExtractableText { .. }));
    assert!(backend.requests().is_empty());
}

// ── Background generation ────────────────────────────────────────────────────

#[tokio::test]
async fn events_arrive_in_stage_order() {
    let backend = Scripted::new(vec![ok(SUMMARY), ok(QUIZ), ok(CARDS)]);
    let mut handle = spawn_generation_from_text("bio.pdf", "text", backend, config());

    let mut events = Vec::new();
    while let Some(event) = handle.next_event().await {
        events.push(event);
    }
    let output = handle.join().await.unwrap();
    assert_eq!(output.quiz.len(), 2);

    assert_eq!(events.len(), 8);
    assert!(matches!(&events[0], GenerationEvent::Started { filename } if filename == "bio.pdf"));
    assert!(matches!(events[1], GenerationEvent::StageStarted(Stage::Summary)));
    assert!(matches!(&events[2], GenerationEvent::Summary(s) if s.starts_with("## Cells")));
    assert!(matches!(events[3], GenerationEvent::StageStarted(Stage::Quiz)));
    assert!(matches!(&events[4], GenerationEvent::Quiz(q) if q.len() == 2));
    assert!(matches!(events[5], GenerationEvent::StageStarted(Stage::Flashcards)));
    assert!(matches!(&events[6], GenerationEvent::Flashcards(c) if c.len() == 2));
    assert!(matches!(events[7], GenerationEvent::Finished { success: true }));
}

#[tokio::test]
async fn failure_is_reported_before_finish() {
    let backend = Scripted::new(vec![
        ok(SUMMARY),
        Err(BackendError::new(BackendErrorKind::Auth, "401 bad key")),
    ]);
    let (stream, task) =
        spawn_generation_from_text("bio.pdf", "text", backend, config()).into_parts();

    use futures::StreamExt;
    let events: Vec<GenerationEvent> = stream.collect().await;
    let last_two = &events[events.len() - 2..];
    assert!(matches!(&last_two[0], GenerationEvent::Failed(msg) if msg.contains("401")));
    assert!(matches!(last_two[1], GenerationEvent::Finished { success: false }));
    assert!(!events.iter().any(|e| matches!(e, GenerationEvent::Quiz(_))));

    let result = task.await.unwrap();
    assert!(matches!(result, Err(NeuroLearnError::LlmApiError { .. })));
}

#[tokio::test]
async fn missing_pdf_fails_without_backend() {
    let mut handle = spawn_generation("/definitely/not/here.pdf", config());
    let mut events = Vec::new();
    while let Some(event) = handle.next_event().await {
        events.push(event);
    }
    assert_eq!(events.len(), 2);
    assert!(matches!(events[0], GenerationEvent::Failed(_)));
    assert!(matches!(events[1], GenerationEvent::Finished { success: false }));
    assert!(matches!(
        handle.join().await.unwrap_err(),
        NeuroLearnError::FileNotFound { .. }
    ));
}

#[tokio::test]
async fn text_file_is_rejected_as_not_a_pdf() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("notes.pdf");
    std::fs::write(&path, "just some notes").unwrap();

    let err = neurolearn::generate(&path, &config()).await.unwrap_err();
    assert!(matches!(err, NeuroLearnError::NotAPdf { .. }), "got {err}");
}

// ── Store ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn generated_course_survives_a_reopen() {
    let backend = Scripted::new(vec![ok(SUMMARY), ok(QUIZ), ok(CARDS)]);
    let output = generate_from_text("bio.pdf", "text", backend, &config())
        .await
        .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("courses.json");
    let id = CourseStore::open(&path).unwrap().save_output(&output).unwrap();

    let store = CourseStore::open(&path).unwrap();
    let course = store.get(&id).unwrap();
    assert_eq!(course.summary, output.summary);
    assert_eq!(course.quiz, output.quiz);
    assert_eq!(course.flashcards, output.flashcards);

    let listed = store.list_metadata();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].filename, "bio.pdf");

    let raw: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert!(raw["courses"][0]["quiz"]["questions"].is_array());
    assert!(raw["courses"][0]["flashcards"]["flashcards"].is_array());
}
