//! Prompts for the three generation requests.
//!
//! Every prompt lives here so the wording can change without touching the
//! request, retry or parsing code. The document text is never spliced into
//! the instruction itself: it travels as a separate `=== DOCUMENT ===`
//! block (see [`document_block`]).

/// System prompt shared by all three requests.
pub const SYSTEM_PROMPT: &str = "You are a teaching assistant who helps students \
review course material. You only use information found in the document you are given.";

/// Instruction for the Markdown summary.
pub const SUMMARY_PROMPT: &str = r#"Write a structured, readable summary of the document below.

Rules:
- Use 4 to 6 sections at most, each with a Markdown heading (##)
- Use bullet points where they help
- Keep definitions, formulas and key terms from the document
- Output ONLY the Markdown summary, with no preamble and no ``` fences"#;

/// Instruction for the quiz. `{n}` is replaced with the question count.
const QUIZ_PROMPT_TEMPLATE: &str = r#"Generate a multiple-choice quiz in JSON based on the document below.
The quiz must contain exactly {n} questions.
Each question has 4 options and exactly one correct answer.
The "answer" field must repeat the full text of the correct option, not its letter or index.
You must return exactly this format: {"questions": [{"question": "...", "options": ["..."], "answer": "..."}]}
Return JSON only."#;

/// Instruction for the flashcards.
pub const FLASHCARDS_PROMPT: &str = r#"Create a list of flashcards in JSON based on the document below.
Each card asks about one key idea on the front and answers it briefly on the back.
Required format: {"flashcards": [{"front": "...", "back": "..."}]}
Return JSON only."#;

/// Build the quiz instruction for `n` questions.
pub fn quiz_prompt(n: usize) -> String {
    QUIZ_PROMPT_TEMPLATE.replace("{n}", &n.to_string())
}

/// Line appended to every instruction to pin the output language.
pub fn language_instruction(language: Option<&str>) -> String {
    match language {
        Some(lang) if !lang.trim().is_empty() => {
            format!("Write all generated text in {}.", lang.trim())
        }
        _ => "Write all generated text in the same language as the document.".to_string(),
    }
}

/// Wrap the document text for the user message.
pub fn document_block(document_text: &str) -> String {
    format!("=== DOCUMENT ===\n{}", document_text)
}
