//! JSON-shape recovery for quiz and flashcard answers.
//!
//! Models asked for `{"questions": [...]}` answer with that, with a bare
//! array, with the object wrapped in a ```` ```json ```` fence, or with a
//! sentence of prose around it. [`parse_json_list`] accepts all of these and
//! returns the list; [`parse_quiz`] and [`parse_flashcards`] then convert the
//! items into typed records.

use crate::course::{flashcards_from_values, list_items, questions_from_values, Flashcard, QuizQuestion};
use crate::error::NeuroLearnError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::debug;

/// Keys accepted for the quiz list, in order of preference.
pub const QUIZ_KEYS: [&str; 2] = ["questions", "quiz"];

/// Keys accepted for the flashcard list, in order of preference.
pub const FLASHCARD_KEYS: [&str; 2] = ["flashcards", "cards"];

/// Longest payload excerpt carried inside an [`NeuroLearnError::InvalidJson`].
const PAYLOAD_EXCERPT_CHARS: usize = 500;

/// Parse `raw` into the list stored under `keys[0]` (or an alias).
///
/// Recovery steps, in order:
/// 1. strip surrounding Markdown fences and whitespace
/// 2. parse; on failure, parse the outermost `{…}` span, then the
///    outermost `[…]` span, keeping the first that parses
/// 3. a top-level array is the list; an object must hold an array under
///    one of `keys`
pub fn parse_json_list(raw: &str, keys: &[&str]) -> Result<Vec<Value>, NeuroLearnError> {
    let field = keys.first().copied().unwrap_or("items").to_string();
    let cleaned = strip_json_fences(raw);

    let value = match serde_json::from_str::<Value>(&cleaned) {
        Ok(v) => v,
        Err(first_err) => match ['{', '[']
            .into_iter()
            .filter_map(|opener| outermost_span(&cleaned, opener))
            .find_map(|span| serde_json::from_str::<Value>(span).ok())
        {
            Some(v) => {
                debug!("Recovered '{}' JSON from surrounding text", field);
                v
            }
            None => {
                return Err(NeuroLearnError::InvalidJson {
                    field,
                    detail: first_err.to_string(),
                    payload: excerpt(raw),
                })
            }
        },
    };

    match &value {
        Value::Array(_) => Ok(list_items(&value, keys).to_vec()),
        Value::Object(obj) if keys.iter().any(|k| obj.get(*k).is_some_and(Value::is_array)) => {
            Ok(list_items(&value, keys).to_vec())
        }
        _ => Err(NeuroLearnError::MissingField { field }),
    }
}

/// Parse a quiz answer into questions.
pub fn parse_quiz(raw: &str) -> Result<Vec<QuizQuestion>, NeuroLearnError> {
    let items = parse_json_list(raw, &QUIZ_KEYS)?;
    Ok(questions_from_values(&items))
}

/// Parse a flashcard answer into cards.
pub fn parse_flashcards(raw: &str) -> Result<Vec<Flashcard>, NeuroLearnError> {
    let items = parse_json_list(raw, &FLASHCARD_KEYS)?;
    Ok(flashcards_from_values(&items))
}

static RE_JSON_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[A-Za-z]*[ \t]*\r?\n?(.*?)\r?\n?```$").unwrap());

fn strip_json_fences(raw: &str) -> String {
    let trimmed = raw.trim();
    match RE_JSON_FENCE.captures(trimmed) {
        Some(caps) => caps[1].trim().to_string(),
        None => trimmed.to_string(),
    }
}

/// The span from the first `opener` to the last matching closer.
fn outermost_span(text: &str, opener: char) -> Option<&str> {
    let closer = if opener == '{' { '}' } else { ']' };
    let start = text.find(opener)?;
    let end = text.rfind(closer)?;
    (end > start).then(|| &text[start..=end])
}

fn excerpt(raw: &str) -> String {
    let mut out: String = raw.chars().take(PAYLOAD_EXCERPT_CHARS).collect();
    if raw.chars().count() > PAYLOAD_EXCERPT_CHARS {
        out.push('…');
    }
    out
}
