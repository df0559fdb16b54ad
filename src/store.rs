//! JSON-file course store.
//!
//! The whole store is one pretty-printed document, `{"courses": [...]}`,
//! rewritten on every change. Writes go to a temp file in the same directory
//! that is then renamed over the store, so a crash mid-write never leaves a
//! truncated file behind.
//!
//! A store that cannot be parsed is moved aside to `<file>.bak` and replaced
//! by an empty one; a store that parses but has the wrong shape is reset.

use crate::course::{Course, CourseMetadata, Flashcard, GenerationOutput, QuizQuestion};
use crate::error::NeuroLearnError;
use serde::Serialize;
use serde_json::Value;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Store file used when neither `--store` nor `NEUROLEARN_DATA` is given.
pub const DEFAULT_STORE_FILE: &str = "neurolearn_data.json";

#[derive(Debug, Default, Serialize)]
struct StoreData {
    courses: Vec<Course>,
}

/// Courses persisted in a JSON file.
#[derive(Debug)]
pub struct CourseStore {
    path: PathBuf,
    data: StoreData,
}

impl CourseStore {
    /// `$NEUROLEARN_DATA`, else [`DEFAULT_STORE_FILE`] in the working directory.
    pub fn default_path() -> PathBuf {
        std::env::var("NEUROLEARN_DATA")
            .ok()
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STORE_FILE))
    }

    /// Open (or create) the store at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, NeuroLearnError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| NeuroLearnError::StoreIo {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let mut store = Self {
            path,
            data: StoreData::default(),
        };

        if !store.path.exists() {
            debug!("Creating course store at {}", store.path.display());
            store.save()?;
            return Ok(store);
        }

        let raw = std::fs::read_to_string(&store.path);
        let parsed = raw
            .as_ref()
            .ok()
            .and_then(|text| serde_json::from_str::<Value>(text).ok());

        match parsed {
            None => {
                let backup = backup_path(&store.path);
                warn!(
                    "Course store {} is unreadable; moving it to {}",
                    store.path.display(),
                    backup.display()
                );
                if let Err(e) = std::fs::rename(&store.path, &backup) {
                    warn!("Could not back up course store: {}", e);
                }
                store.save()?;
            }
            Some(Value::Object(mut obj)) if obj.get("courses").is_some_and(Value::is_array) => {
                let records = match obj.remove("courses") {
                    Some(Value::Array(records)) => records,
                    _ => Vec::new(),
                };
                store.data.courses = courses_from_records(records);
                info!(
                    "Loaded {} courses from {}",
                    store.data.courses.len(),
                    store.path.display()
                );
            }
            Some(_) => {
                warn!(
                    "Course store {} has an unexpected shape; starting empty",
                    store.path.display()
                );
                store.save()?;
            }
        }

        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.data.courses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.courses.is_empty()
    }

    /// Persist a newly generated course and return its id.
    pub fn save_new_course(
        &mut self,
        filename: &str,
        summary: &str,
        quiz: &[QuizQuestion],
        flashcards: &[Flashcard],
    ) -> Result<String, NeuroLearnError> {
        let course = Course {
            id: uuid::Uuid::new_v4().to_string(),
            filename: filename.to_string(),
            creation_date: chrono::Local::now()
                .format("%Y-%m-%dT%H:%M:%S")
                .to_string(),
            summary: summary.to_string(),
            quiz: quiz.to_vec(),
            flashcards: flashcards.to_vec(),
        };
        let id = course.id.clone();
        self.data.courses.push(course);
        self.save()?;
        info!("Saved course {} ({})", id, filename);
        Ok(id)
    }

    /// Persist the result of a generation run.
    pub fn save_output(&mut self, output: &GenerationOutput) -> Result<String, NeuroLearnError> {
        self.save_new_course(
            &output.filename,
            &output.summary,
            &output.quiz,
            &output.flashcards,
        )
    }

    /// History entries, newest first.
    pub fn list_metadata(&self) -> Vec<CourseMetadata> {
        let mut meta: Vec<CourseMetadata> = self.data.courses.iter().map(CourseMetadata::from).collect();
        // ISO-8601 timestamps sort chronologically as strings.
        meta.sort_by(|a, b| b.creation_date.cmp(&a.creation_date));
        meta
    }

    pub fn get(&self, id: &str) -> Option<&Course> {
        self.data.courses.iter().find(|c| c.id == id)
    }

    /// Like [`get`](Self::get) but an unknown id is an error.
    pub fn require(&self, id: &str) -> Result<&Course, NeuroLearnError> {
        self.get(id).ok_or_else(|| NeuroLearnError::CourseNotFound { id: id.to_string() })
    }

    /// Delete a course. Returns false if no course has that id.
    pub fn delete(&mut self, id: &str) -> Result<bool, NeuroLearnError> {
        let Some(pos) = self.data.courses.iter().position(|c| c.id == id) else {
            return Ok(false);
        };
        self.data.courses.remove(pos);
        self.save()?;
        info!("Deleted course {}", id);
        Ok(true)
    }

    /// Resolve a full id or a unique id prefix (as printed by `list`).
    pub fn resolve_id(&self, id_or_prefix: &str) -> Result<String, NeuroLearnError> {
        if self.get(id_or_prefix).is_some() {
            return Ok(id_or_prefix.to_string());
        }
        let mut matches = self
            .data
            .courses
            .iter()
            .filter(|c| !id_or_prefix.is_empty() && c.id.starts_with(id_or_prefix));
        match (matches.next(), matches.next()) {
            (Some(c), None) => Ok(c.id.clone()),
            _ => Err(NeuroLearnError::CourseNotFound {
                id: id_or_prefix.to_string(),
            }),
        }
    }

    fn save(&self) -> Result<(), NeuroLearnError> {
        let json = serde_json::to_string_pretty(&self.data)?;
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let io_err = |source| NeuroLearnError::StoreIo {
            path: self.path.clone(),
            source,
        };

        let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(io_err)?;
        tmp.write_all(json.as_bytes()).map_err(io_err)?;
        tmp.persist(&self.path).map_err(|e| io_err(e.error))?;
        Ok(())
    }
}

/// Convert stored records one by one, so one damaged record does not make
/// the rest unreadable.
fn courses_from_records(records: Vec<Value>) -> Vec<Course> {
    records
        .into_iter()
        .enumerate()
        .filter_map(|(idx, record)| {
            if !record.is_object() {
                warn!("Skipping course record {}: not an object", idx);
                return None;
            }
            match serde_json::from_value::<Course>(record) {
                Ok(mut course) => {
                    if course.id.trim().is_empty() {
                        course.id = uuid::Uuid::new_v4().to_string();
                        warn!("Course record {} had no id; assigned {}", idx, course.id);
                    }
                    Some(course)
                }
                Err(e) => {
                    warn!("Skipping course record {}: {}", idx, e);
                    None
                }
            }
        })
        .collect()
}

fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".bak");
    PathBuf::from(name)
}
