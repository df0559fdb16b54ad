//! CLI binary for neurolearn.
//!
//! A thin shim over the library crate: maps flags to `GenerationConfig`,
//! drives a background generation, and offers the course history, quiz and
//! flashcard views on the terminal.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use neurolearn::{
    inspect, spawn_generation, CardSide, Course, CourseStore, Flashcard, FlashcardDeck,
    GenerationConfig, GenerationEvent, GenerationOutput, QuizQuestion, QuizSession,
};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Generate a course from a PDF and save it
  neurolearn generate lecture.pdf

  # Fewer questions, answers in French, print JSON
  neurolearn generate --questions 5 --language French --json lecture.pdf

  # Browse history
  neurolearn list
  neurolearn show 3f2a --section summary

  # Study
  neurolearn quiz 3f2a
  neurolearn cards 3f2a

  # Save the API key and default quiz length to ./.env
  neurolearn config --api-key YOUR_KEY --questions 15

  # Inspect PDF metadata (no API key needed)
  neurolearn inspect lecture.pdf

ENVIRONMENT VARIABLES:
  GEMINI_API_KEY          Google Gemini API key (GOOGLE_API_KEY also accepted)
  GEMINI_MODEL            Model ID (default gemini-2.5-flash)
  NEUROLEARN_PROVIDER     Provider (gemini, openai, anthropic, mistral, ollama)
  DEFAULT_QUIZ_QUESTIONS  Quiz length when --questions is not given (1-50)
  NEUROLEARN_DATA         Course store file (default ./neurolearn_data.json)
  PDFIUM_LIB_PATH         Directory containing libpdfium

  A .env file in the working directory is loaded at startup.
"#;

/// Turn PDF course material into summaries, quizzes and flashcards.
#[derive(Parser, Debug)]
#[command(
    name = "neurolearn",
    version,
    about = "Turn PDF course material into summaries, quizzes and flashcards",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Course store file.
    #[arg(long, global = true, env = "NEUROLEARN_DATA")]
    store: Option<PathBuf>,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate a summary, quiz and flashcards from a PDF.
    Generate {
        /// Local PDF file.
        pdf: PathBuf,

        /// LLM model ID (defaults to $GEMINI_MODEL, then gemini-2.5-flash).
        #[arg(long)]
        model: Option<String>,

        /// LLM provider (defaults to $NEUROLEARN_PROVIDER, then gemini).
        #[arg(long)]
        provider: Option<String>,

        /// Number of quiz questions (1-50).
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..=50))]
        questions: Option<u32>,

        /// Language of the generated material (defaults to the document's).
        #[arg(long)]
        language: Option<String>,

        /// Do not save the course to the store.
        #[arg(long)]
        no_save: bool,

        /// Print the full output as JSON.
        #[arg(long)]
        json: bool,

        /// Disable the progress spinner.
        #[arg(long)]
        no_progress: bool,
    },

    /// List saved courses, newest first.
    List {
        #[arg(long)]
        json: bool,
    },

    /// Print a saved course.
    Show {
        /// Course id or unique id prefix.
        id: String,

        #[arg(long, value_enum, default_value = "all")]
        section: Section,

        #[arg(long)]
        json: bool,
    },

    /// Take the quiz of a saved course.
    Quiz {
        /// Course id or unique id prefix.
        id: String,
    },

    /// Study the flashcards of a saved course.
    Cards {
        /// Course id or unique id prefix.
        id: String,
    },

    /// Delete a saved course.
    Delete {
        /// Course id or unique id prefix.
        id: String,
    },

    /// Save the API key and default quiz length to a .env file.
    Config {
        /// Stored as GOOGLE_API_KEY.
        #[arg(long)]
        api_key: Option<String>,

        /// Default number of quiz questions (1-50).
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..=50))]
        questions: Option<u32>,

        #[arg(long, default_value = ".env")]
        env_file: PathBuf,
    },

    /// Print PDF metadata only, no generation.
    Inspect {
        pdf: PathBuf,

        #[arg(long)]
        json: bool,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Section {
    Summary,
    Quiz,
    Flashcards,
    All,
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is fine.
    dotenv::dotenv().ok();

    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let store_path = cli.store.clone().unwrap_or_else(CourseStore::default_path);

    match cli.command {
        Command::Generate {
            ref pdf,
            ref model,
            ref provider,
            questions,
            ref language,
            no_save,
            json,
            no_progress,
        } => {
            let mut builder = GenerationConfig::builder();
            if let Some(m) = model {
                builder = builder.model(m.clone());
            }
            if let Some(p) = provider {
                builder = builder.provider_name(p.clone());
            }
            if let Some(n) = questions {
                builder = builder.num_questions(n as usize);
            }
            if let Some(l) = language {
                builder = builder.language(l.clone());
            }
            let config = builder.build().context("Invalid configuration")?;

            let show_progress = !cli.quiet && !no_progress && !json;
            let output = run_generation(pdf.clone(), config, show_progress).await?;

            let id = if no_save {
                None
            } else {
                let mut store = open_store(&store_path)?;
                Some(store.save_output(&output).context("Failed to save course")?)
            };

            if json {
                let value = serde_json::json!({ "id": id, "output": output });
                println!(
                    "{}",
                    serde_json::to_string_pretty(&value).context("Failed to serialise output")?
                );
            } else {
                print_summary(&output.summary)?;
                if !cli.quiet {
                    eprintln!(
                        "{}  {} questions  {} flashcards  {}ms  {}",
                        green("✔"),
                        output.quiz.len(),
                        output.flashcards.len(),
                        output.stats.total_duration_ms,
                        dim(&output.stats.model_used),
                    );
                    eprintln!(
                        "   {} tokens in  /  {} tokens out",
                        dim(&output.stats.total_input_tokens.to_string()),
                        dim(&output.stats.total_output_tokens.to_string()),
                    );
                    if let Some(ref id) = id {
                        eprintln!("   saved as {}", bold(id));
                    }
                }
            }
        }

        Command::List { json } => {
            let store = open_store(&store_path)?;
            let courses = store.list_metadata();
            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&courses).context("Failed to serialise list")?
                );
            } else if courses.is_empty() {
                if !cli.quiet {
                    eprintln!("No saved courses in {}", store.path().display());
                }
            } else {
                for c in &courses {
                    println!(
                        "{}  {}  {}",
                        cyan(&short_id(&c.id)),
                        dim(&c.creation_date),
                        c.filename
                    );
                }
            }
        }

        Command::Show { ref id, section, json } => {
            let store = open_store(&store_path)?;
            let course = find_course(&store, id)?;
            if json {
                let value = match section {
                    Section::Summary => serde_json::json!({ "summary": course.summary }),
                    Section::Quiz => serde_json::json!({ "questions": course.quiz }),
                    Section::Flashcards => serde_json::json!({ "flashcards": course.flashcards }),
                    Section::All => serde_json::to_value(course).context("Failed to serialise course")?,
                };
                println!(
                    "{}",
                    serde_json::to_string_pretty(&value).context("Failed to serialise course")?
                );
            } else {
                let stdout = io::stdout();
                let mut out = stdout.lock();
                render_course(&mut out, course, section).context("Failed to write to stdout")?;
            }
        }

        Command::Quiz { ref id } => {
            let store = open_store(&store_path)?;
            let course = find_course(&store, id)?;
            let stdin = io::stdin();
            let stdout = io::stdout();
            run_quiz(&course.quiz, &mut stdin.lock(), &mut stdout.lock())
                .context("Quiz aborted")?;
        }

        Command::Cards { ref id } => {
            let store = open_store(&store_path)?;
            let course = find_course(&store, id)?;
            let stdin = io::stdin();
            let stdout = io::stdout();
            run_cards(course.flashcards.clone(), &mut stdin.lock(), &mut stdout.lock())
                .context("Flashcard session aborted")?;
        }

        Command::Delete { ref id } => {
            let mut store = open_store(&store_path)?;
            let full_id = store.resolve_id(id)?;
            if store.delete(&full_id).context("Failed to delete course")? {
                if !cli.quiet {
                    eprintln!("{} Deleted {}", green("✔"), full_id);
                }
            } else {
                anyhow::bail!("No course with id '{}'", id);
            }
        }

        Command::Inspect { ref pdf, json } => {
            let meta = inspect(pdf).await.context("Failed to inspect PDF")?;
            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&meta).context("Failed to serialize metadata")?
                );
            } else {
                println!("File:         {}", pdf.display());
                if let Some(ref t) = meta.title {
                    println!("Title:        {}", t);
                }
                if let Some(ref a) = meta.author {
                    println!("Author:       {}", a);
                }
                if let Some(ref s) = meta.subject {
                    println!("Subject:      {}", s);
                }
                println!("Pages:        {}", meta.page_count);
                println!("PDF Version:  {}", meta.pdf_version);
                if let Some(ref p) = meta.producer {
                    println!("Producer:     {}", p);
                }
                if let Some(ref c) = meta.creator {
                    println!("Creator:      {}", c);
                }
            }
        }

        Command::Config {
            ref api_key,
            questions,
            ref env_file,
        } => {
            let mut updates = Vec::new();
            if let Some(key) = api_key {
                let key = key.trim();
                if key.is_empty() {
                    anyhow::bail!("--api-key must not be empty");
                }
                updates.push(("GOOGLE_API_KEY", key.to_string()));
            }
            if let Some(n) = questions {
                updates.push(("DEFAULT_QUIZ_QUESTIONS", n.to_string()));
            }
            if updates.is_empty() {
                anyhow::bail!("Nothing to save: pass --api-key and/or --questions");
            }
            update_env_file(env_file, &updates)
                .with_context(|| format!("Failed to update {}", env_file.display()))?;
            if !cli.quiet {
                eprintln!("{} Saved settings to {}", green("✔"), env_file.display());
            }
        }
    }

    Ok(())
}

fn open_store(path: &std::path::Path) -> Result<CourseStore> {
    CourseStore::open(path)
        .with_context(|| format!("Failed to open course store {}", path.display()))
}

/// Set `KEY=value` lines in a dotenv file, replacing earlier assignments of
/// the same keys and keeping every other line. The file is created if absent.
fn update_env_file(path: &std::path::Path, updates: &[(&str, String)]) -> Result<()> {
    let existing = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(e).context("Failed to read env file"),
    };

    let assigns = |line: &str, key: &str| {
        let line = line.trim_start();
        let line = line.strip_prefix("export ").unwrap_or(line).trim_start();
        line.strip_prefix(key)
            .is_some_and(|rest| rest.trim_start().starts_with('='))
    };

    let mut lines: Vec<String> = existing
        .lines()
        .filter(|line| !updates.iter().any(|(key, _)| assigns(line, key)))
        .map(str::to_string)
        .collect();
    lines.extend(updates.iter().map(|(key, value)| format!("{key}={value}")));
    let mut contents = lines.join("\n");
    contents.push('\n');

    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => std::path::Path::new("."),
    };
    let mut tmp = tempfile::NamedTempFile::new_in(dir).context("Failed to create temp file")?;
    tmp.write_all(contents.as_bytes())
        .context("Failed to write env file")?;
    tmp.persist(path).context("Failed to replace env file")?;
    Ok(())
}

/// First eight characters of a course id, for listings.
fn short_id(id: &str) -> String {
    id.chars().take(8).collect()
}

fn find_course<'s>(store: &'s CourseStore, id: &str) -> Result<&'s Course> {
    let full_id = store.resolve_id(id)?;
    Ok(store.require(&full_id)?)
}

/// Run generation on a background task, driving the spinner from its events.
async fn run_generation(
    pdf: PathBuf,
    config: GenerationConfig,
    show_progress: bool,
) -> Result<GenerationOutput> {
    let bar = show_progress.then(|| {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed:.dim}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]),
        );
        bar.set_prefix("Preparing");
        bar.set_message("Reading PDF…");
        bar.enable_steady_tick(Duration::from_millis(80));
        bar
    });

    let mut handle = spawn_generation(pdf, config);
    while let Some(event) = handle.next_event().await {
        let Some(ref bar) = bar else { continue };
        match event {
            GenerationEvent::Started { filename } => {
                bar.println(format!("{} {}", cyan("◆"), bold(&format!("Generating from {filename}"))));
            }
            GenerationEvent::StageStarted(stage) => {
                bar.set_prefix(format!("Step {}/3", stage.number()));
                bar.set_message(format!("{stage}…"));
            }
            GenerationEvent::Summary(summary) => {
                bar.println(format!("  {} Summary     {}", green("✓"), dim(&format!("{} chars", summary.len()))));
            }
            GenerationEvent::Quiz(questions) => {
                bar.println(format!("  {} Quiz        {}", green("✓"), dim(&format!("{} questions", questions.len()))));
            }
            GenerationEvent::Flashcards(cards) => {
                bar.println(format!("  {} Flashcards  {}", green("✓"), dim(&format!("{} cards", cards.len()))));
            }
            GenerationEvent::Failed(error) => {
                bar.println(format!("  {} {}", red("✗"), red(&error)));
            }
            GenerationEvent::Finished { .. } => bar.finish_and_clear(),
        }
    }

    Ok(handle.join().await.context("Generation failed")?)
}

fn print_summary(summary: &str) -> Result<()> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    handle
        .write_all(summary.as_bytes())
        .context("Failed to write to stdout")?;
    if !summary.ends_with('\n') {
        handle.write_all(b"\n").ok();
    }
    Ok(())
}

fn render_course(out: &mut impl Write, course: &Course, section: Section) -> io::Result<()> {
    if section == Section::All {
        writeln!(out, "{}  {}", bold(&course.filename), dim(&course.creation_date))?;
        writeln!(out)?;
    }
    if matches!(section, Section::Summary | Section::All) {
        write!(out, "{}", course.summary)?;
        if !course.summary.ends_with('\n') {
            writeln!(out)?;
        }
    }
    if matches!(section, Section::Quiz | Section::All) {
        if section == Section::All {
            writeln!(out, "\n{}", bold("Quiz"))?;
        }
        for (i, q) in course.quiz.iter().enumerate() {
            writeln!(out, "{}. {}", i + 1, q.question)?;
            for (j, opt) in q.options.iter().enumerate() {
                writeln!(out, "   {}) {}", option_letter(j), opt)?;
            }
            writeln!(out, "   {}", dim(&format!("Answer: {}", q.answer)))?;
        }
    }
    if matches!(section, Section::Flashcards | Section::All) {
        if section == Section::All {
            writeln!(out, "\n{}", bold("Flashcards"))?;
        }
        for card in &course.flashcards {
            writeln!(out, "- {}\n  {}", card.front, dim(&card.back))?;
        }
    }
    Ok(())
}

fn option_letter(index: usize) -> char {
    (b'A' + (index % 26) as u8) as char
}

/// Parse a choice typed as a 1-based number or an option letter.
fn parse_choice(input: &str, option_count: usize) -> Option<usize> {
    let input = input.trim();
    let index = match input.parse::<usize>() {
        Ok(n) if n >= 1 => n - 1,
        Ok(_) => return None,
        Err(_) => {
            let mut chars = input.chars();
            let c = chars.next()?.to_ascii_uppercase();
            if chars.next().is_some() || !c.is_ascii_uppercase() {
                return None;
            }
            (c as u8 - b'A') as usize
        }
    };
    (index < option_count).then_some(index)
}

/// Interactive quiz over any line reader; `q` stops early.
fn run_quiz(questions: &[QuizQuestion], input: &mut impl BufRead, out: &mut impl Write) -> io::Result<()> {
    if questions.is_empty() {
        writeln!(out, "This course has no quiz.")?;
        return Ok(());
    }
    let mut session = QuizSession::new(questions);
    'questions: for (i, q) in questions.iter().enumerate() {
        writeln!(out, "\n{} {}", bold(&format!("{}/{}", i + 1, questions.len())), q.question)?;
        if q.options.is_empty() {
            writeln!(out, "   {}", dim(&format!("Answer: {}", q.answer)))?;
            continue;
        }
        for (j, opt) in q.options.iter().enumerate() {
            writeln!(out, "   {}) {}", j + 1, opt)?;
        }
        loop {
            write!(out, "> ")?;
            out.flush()?;
            let mut line = String::new();
            if input.read_line(&mut line)? == 0 {
                break 'questions;
            }
            if line.trim().eq_ignore_ascii_case("q") {
                break 'questions;
            }
            let Some(choice) = parse_choice(&line, q.options.len()) else {
                writeln!(out, "   Enter 1-{}, or q to stop.", q.options.len())?;
                continue;
            };
            if let Some(outcome) = session.answer(i, choice) {
                if outcome.correct {
                    writeln!(out, "   {} Correct", green("✓"))?;
                } else {
                    writeln!(out, "   {} Incorrect. Solution: {}", red("✗"), outcome.solution)?;
                }
            }
            break;
        }
    }
    let score = session.score();
    writeln!(
        out,
        "\nScore: {}/{} ({} answered)",
        score.correct, score.total, score.answered
    )?;
    Ok(())
}

/// Interactive flashcards: Enter flips, `n` next, `p` previous, `q` quits.
fn run_cards(cards: Vec<Flashcard>, input: &mut impl BufRead, out: &mut impl Write) -> io::Result<()> {
    let mut deck = FlashcardDeck::new(cards);
    if deck.is_empty() {
        writeln!(out, "This course has no flashcards.")?;
        return Ok(());
    }
    loop {
        if let (Some((pos, len)), Some(text)) = (deck.position(), deck.visible_text()) {
            let side = match deck.side() {
                CardSide::Front => "front",
                CardSide::Back => "back",
            };
            writeln!(out, "\n{} {}", dim(&format!("[{pos}/{len} {side}]")), text)?;
        }
        write!(out, "{}", dim("Enter flip · n next · p prev · q quit > "))?;
        out.flush()?;

        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            return Ok(());
        }
        match line.trim().to_ascii_lowercase().as_str() {
            "" => deck.flip(),
            "n" => {
                if !deck.next() {
                    writeln!(out, "Last card.")?;
                }
            }
            "p" => {
                if !deck.prev() {
                    writeln!(out, "First card.")?;
                }
            }
            "q" => return Ok(()),
            other => writeln!(out, "Unknown command '{other}'.")?,
        }
    }
}
