//! Course records: the typed results of a generation run.
//!
//! The model's JSON is loose (renamed keys, numeric answers, bare strings
//! instead of objects), so the `from_value` constructors here accept every
//! shape seen in practice and normalise it. The same constructors are used
//! when reading old records back from the store.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use tracing::warn;

// ── Quiz ─────────────────────────────────────────────────────────────────

/// One multiple-choice question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizQuestion {
    pub question: String,
    pub options: Vec<String>,
    pub answer: String,
}

/// Result of grading one answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnswerOutcome {
    pub correct: bool,
    /// Indices of every option that matches the answer.
    pub correct_indices: Vec<usize>,
    /// Text shown to the student as the solution.
    pub solution: String,
}

impl QuizQuestion {
    /// Build a question from one item of the model's `questions` array.
    ///
    /// Returns `None` for items that are not JSON objects.
    pub fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let question = first_text(obj, &["question", "prompt"])
            .filter(|q| !q.is_empty())
            .unwrap_or_else(|| "Question".to_string());
        let options: Vec<String> = ["options", "choices"]
            .iter()
            .find_map(|k| obj.get(*k).and_then(Value::as_array))
            .map(|arr| arr.iter().map(value_to_text).collect())
            .unwrap_or_default();
        let raw_answer = ["answer", "correct_answer"]
            .iter()
            .find_map(|k| obj.get(*k).filter(|v| !v.is_null()));
        let answer = resolve_answer(raw_answer, &options);
        Some(Self {
            question,
            options,
            answer,
        })
    }

    /// Indices of the options whose plain text matches the answer.
    pub fn correct_indices(&self) -> Vec<usize> {
        if self.options.is_empty() {
            return Vec::new();
        }
        let target = normalize_answer(&self.answer);
        self.options
            .iter()
            .enumerate()
            .filter(|(_, opt)| normalize_answer(opt) == target)
            .map(|(i, _)| i)
            .collect()
    }

    /// Grade the option at `selected` (0-based).
    pub fn grade(&self, selected: usize) -> AnswerOutcome {
        let correct_indices = self.correct_indices();
        let correct = correct_indices.contains(&selected);
        let solution = if correct_indices.is_empty() {
            self.answer.trim().to_string()
        } else {
            correct_indices
                .iter()
                .map(|&i| self.options[i].trim())
                .collect::<Vec<_>>()
                .join(", ")
        };
        AnswerOutcome {
            correct,
            correct_indices,
            solution,
        }
    }
}

/// Turn the model's answer into option text.
///
/// Models sometimes answer with the option index (`2`) or letter (`"C"`)
/// instead of its text. Those are mapped onto the option, but only when the
/// raw answer does not already equal some option's text.
fn resolve_answer(raw: Option<&Value>, options: &[String]) -> String {
    let Some(raw) = raw else {
        return String::new();
    };
    let text = value_to_text(raw);
    let norm = normalize_answer(&text);
    if options.iter().any(|o| normalize_answer(o) == norm) {
        return text;
    }
    if let Some(idx) = raw.as_u64() {
        if let Some(opt) = options.get(idx as usize) {
            return opt.clone();
        }
    }
    if let Some(idx) = letter_index(&text) {
        if let Some(opt) = options.get(idx) {
            return opt.clone();
        }
    }
    text
}

static RE_OPTION_LETTER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\(?([A-Za-z])[).:]?$").unwrap());

fn letter_index(text: &str) -> Option<usize> {
    let caps = RE_OPTION_LETTER.captures(text.trim())?;
    let c = caps[1].chars().next()?.to_ascii_uppercase();
    Some((c as u8 - b'A') as usize)
}

static RE_MARKDOWN_MARKERS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[*_`~]+").unwrap());

/// Plain-text form used for answer matching: Markdown emphasis and code
/// markers removed, whitespace collapsed, lowercase.
pub fn normalize_answer(value: &str) -> String {
    let plain = RE_MARKDOWN_MARKERS.replace_all(value, "");
    plain
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

// ── Flashcards ───────────────────────────────────────────────────────────

/// One flashcard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flashcard {
    pub front: String,
    pub back: String,
}

impl Flashcard {
    /// Build a card from one item of the model's `flashcards` array.
    ///
    /// A bare string becomes a card with that text on the front.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Object(obj) => {
                let front = first_text(obj, &["front", "question", "term"])
                    .filter(|s| !s.is_empty())
                    .unwrap_or_else(|| "Card".to_string());
                let back = first_text(obj, &["back", "answer", "definition"]).unwrap_or_default();
                Some(Self { front, back })
            }
            Value::String(s) if !s.trim().is_empty() => Some(Self {
                front: s.trim().to_string(),
                back: String::new(),
            }),
            _ => None,
        }
    }
}

/// Which side of the current card is showing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardSide {
    Front,
    Back,
}

/// Navigation state over a list of flashcards.
///
/// Moving to another card always shows its front. Navigation stops at both
/// ends instead of wrapping. An empty deck ignores every command.
#[derive(Debug, Clone)]
pub struct FlashcardDeck {
    cards: Vec<Flashcard>,
    index: usize,
    side: CardSide,
}

impl FlashcardDeck {
    pub fn new(cards: Vec<Flashcard>) -> Self {
        Self {
            cards,
            index: 0,
            side: CardSide::Front,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn side(&self) -> CardSide {
        self.side
    }

    /// The current card, or `None` for an empty deck.
    pub fn current(&self) -> Option<&Flashcard> {
        self.cards.get(self.index)
    }

    /// Text on the visible side of the current card.
    pub fn visible_text(&self) -> Option<&str> {
        let card = self.current()?;
        Some(match self.side {
            CardSide::Front => card.front.as_str(),
            CardSide::Back => card.back.as_str(),
        })
    }

    /// 1-indexed position and deck length, or `None` for an empty deck.
    pub fn position(&self) -> Option<(usize, usize)> {
        (!self.cards.is_empty()).then(|| (self.index + 1, self.cards.len()))
    }

    pub fn flip(&mut self) {
        if self.cards.is_empty() {
            return;
        }
        self.side = match self.side {
            CardSide::Front => CardSide::Back,
            CardSide::Back => CardSide::Front,
        };
    }

    /// Move to the next card. Returns false at the last card.
    pub fn next(&mut self) -> bool {
        if self.index + 1 < self.cards.len() {
            self.index += 1;
            self.side = CardSide::Front;
            true
        } else {
            false
        }
    }

    /// Move to the previous card. Returns false at the first card.
    pub fn prev(&mut self) -> bool {
        if self.index > 0 {
            self.index -= 1;
            self.side = CardSide::Front;
            true
        } else {
            false
        }
    }

    pub fn has_next(&self) -> bool {
        self.index + 1 < self.cards.len()
    }

    pub fn has_prev(&self) -> bool {
        self.index > 0
    }
}

// ── Quiz session ─────────────────────────────────────────────────────────

/// Running score of a quiz.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct QuizScore {
    pub correct: usize,
    pub answered: usize,
    pub total: usize,
}

/// Answers a quiz one question at a time; each question is graded once.
#[derive(Debug, Clone)]
pub struct QuizSession<'a> {
    questions: &'a [QuizQuestion],
    outcomes: Vec<Option<AnswerOutcome>>,
}

impl<'a> QuizSession<'a> {
    pub fn new(questions: &'a [QuizQuestion]) -> Self {
        Self {
            questions,
            outcomes: vec![None; questions.len()],
        }
    }

    /// Grade `selected` for question `index`.
    ///
    /// Returns the stored outcome unchanged if the question was already
    /// answered, and `None` if `index` or `selected` is out of range.
    pub fn answer(&mut self, index: usize, selected: usize) -> Option<&AnswerOutcome> {
        let question = self.questions.get(index)?;
        if self.outcomes[index].is_none() {
            if selected >= question.options.len() {
                return None;
            }
            self.outcomes[index] = Some(question.grade(selected));
        }
        self.outcomes[index].as_ref()
    }

    pub fn is_answered(&self, index: usize) -> bool {
        self.outcomes.get(index).is_some_and(Option::is_some)
    }

    pub fn score(&self) -> QuizScore {
        let answered = self.outcomes.iter().flatten().count();
        let correct = self.outcomes.iter().flatten().filter(|o| o.correct).count();
        QuizScore {
            correct,
            answered,
            total: self.questions.len(),
        }
    }
}

// ── Course record ────────────────────────────────────────────────────────

/// A generated course as persisted in the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Course {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub creation_date: String,
    #[serde(default)]
    pub summary: String,
    #[serde(
        serialize_with = "serialize_quiz",
        deserialize_with = "deserialize_quiz",
        default
    )]
    pub quiz: Vec<QuizQuestion>,
    #[serde(
        serialize_with = "serialize_flashcards",
        deserialize_with = "deserialize_flashcards",
        default
    )]
    pub flashcards: Vec<Flashcard>,
}

/// The history-list view of a course.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseMetadata {
    pub id: String,
    pub filename: String,
    pub creation_date: String,
}

impl From<&Course> for CourseMetadata {
    fn from(c: &Course) -> Self {
        Self {
            id: c.id.clone(),
            filename: c.filename.clone(),
            creation_date: c.creation_date.clone(),
        }
    }
}

fn serialize_quiz<S: Serializer>(quiz: &[QuizQuestion], s: S) -> Result<S::Ok, S::Error> {
    #[derive(Serialize)]
    struct Wrapper<'a> {
        questions: &'a [QuizQuestion],
    }
    Wrapper { questions: quiz }.serialize(s)
}

fn serialize_flashcards<S: Serializer>(cards: &[Flashcard], s: S) -> Result<S::Ok, S::Error> {
    #[derive(Serialize)]
    struct Wrapper<'a> {
        flashcards: &'a [Flashcard],
    }
    Wrapper { flashcards: cards }.serialize(s)
}

fn deserialize_quiz<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<QuizQuestion>, D::Error> {
    let value = Value::deserialize(d)?;
    Ok(list_items(&value, &["questions", "quiz"])
        .iter()
        .filter_map(QuizQuestion::from_value)
        .collect())
}

fn deserialize_flashcards<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<Flashcard>, D::Error> {
    let value = Value::deserialize(d)?;
    Ok(list_items(&value, &["flashcards", "cards"])
        .iter()
        .filter_map(Flashcard::from_value)
        .collect())
}

/// The list inside `value`: the value itself if it is an array, otherwise
/// the first array found under one of `keys`.
pub(crate) fn list_items<'v>(value: &'v Value, keys: &[&str]) -> &'v [Value] {
    match value {
        Value::Array(items) => items.as_slice(),
        Value::Object(obj) => keys
            .iter()
            .find_map(|k| obj.get(*k).and_then(Value::as_array))
            .map(Vec::as_slice)
            .unwrap_or(&[]),
        _ => &[],
    }
}

// ── Generation output ────────────────────────────────────────────────────

/// PDF metadata read without any LLM call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub title: Option<String>,
    pub author: Option<String>,
    pub subject: Option<String>,
    pub creator: Option<String>,
    pub producer: Option<String>,
    pub page_count: usize,
    pub pdf_version: String,
}

/// Timing and token figures for one run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerationStats {
    /// The model-name candidate that actually answered.
    pub model_used: String,
    pub document_chars: usize,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub extract_duration_ms: u64,
    pub summary_duration_ms: u64,
    pub quiz_duration_ms: u64,
    pub flashcards_duration_ms: u64,
    pub total_duration_ms: u64,
}

/// Everything one run produces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationOutput {
    /// File name of the source PDF (no directory).
    pub filename: String,
    pub summary: String,
    pub quiz: Vec<QuizQuestion>,
    pub flashcards: Vec<Flashcard>,
    pub metadata: Option<DocumentMetadata>,
    pub stats: GenerationStats,
}

// ── Helpers ──────────────────────────────────────────────────────────────

fn value_to_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.trim().to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn first_text(obj: &serde_json::Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|k| obj.get(*k).filter(|v| !v.is_null()))
        .map(value_to_text)
}

/// Convert raw items, skipping (and logging) the ones that don't fit.
pub(crate) fn questions_from_values(items: &[Value]) -> Vec<QuizQuestion> {
    items
        .iter()
        .enumerate()
        .filter_map(|(i, v)| {
            let q = QuizQuestion::from_value(v);
            if q.is_none() {
                warn!("Skipping quiz item {}: not an object", i + 1);
            }
            q
        })
        .collect()
}

pub(crate) fn flashcards_from_values(items: &[Value]) -> Vec<Flashcard> {
    items
        .iter()
        .enumerate()
        .filter_map(|(i, v)| {
            let c = Flashcard::from_value(v);
            if c.is_none() {
                warn!("Skipping flashcard item {}: unusable value", i + 1);
            }
            c
        })
        .collect()
}
