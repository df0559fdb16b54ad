//! Input validation: make sure the user-supplied path is a readable PDF.
//!
//! The magic bytes (`%PDF`) are checked before pdfium ever sees the file so
//! callers get a meaningful error rather than a pdfium parse failure.

use crate::error::NeuroLearnError;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

/// A validated local PDF.
#[derive(Debug, Clone)]
pub struct ResolvedInput {
    path: PathBuf,
}

impl ResolvedInput {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name without the directory, as shown in the course history.
    pub fn filename(&self) -> String {
        display_name(&self.path)
    }
}

/// File name of `path`, or the full path if it has none.
pub fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Check that `path` exists, ends in `.pdf`, and starts with `%PDF`.
pub fn resolve_input(path: impl AsRef<Path>) -> Result<ResolvedInput, NeuroLearnError> {
    let path = path.as_ref().to_path_buf();

    if !path.exists() {
        return Err(NeuroLearnError::FileNotFound { path });
    }

    let has_pdf_ext = path
        .extension()
        .map(|e| e.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false);

    match std::fs::File::open(&path) {
        Ok(mut f) => {
            let mut magic = [0u8; 4];
            let read_ok = f.read_exact(&mut magic).is_ok();
            if !has_pdf_ext || !read_ok || &magic != b"%PDF" {
                return Err(NeuroLearnError::NotAPdf { path, magic });
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(NeuroLearnError::PermissionDenied { path });
        }
        Err(_) => {
            return Err(NeuroLearnError::FileNotFound { path });
        }
    }

    debug!("Resolved local PDF: {}", path.display());
    Ok(ResolvedInput { path })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(dir: &tempfile::TempDir, name: &str, bytes: &[u8]) -> PathBuf {
        let p = dir.path().join(name);
        let mut f = std::fs::File::create(&p).unwrap();
        f.write_all(bytes).unwrap();
        p
    }

    #[test]
    fn missing_file() {
        let err = resolve_input("/definitely/not/here.pdf").unwrap_err();
        assert!(matches!(err, NeuroLearnError::FileNotFound { .. }));
    }

    #[test]
    fn wrong_extension() {
        let dir = tempfile::tempdir().unwrap();
        let p = write_file(&dir, "notes.txt", b"%PDF-1.7\n");
        let err = resolve_input(&p).unwrap_err();
        assert!(matches!(err, NeuroLearnError::NotAPdf { .. }));
    }

    #[test]
    fn wrong_magic() {
        let dir = tempfile::tempdir().unwrap();
        let p = write_file(&dir, "fake.pdf", b"PK\x03\x04zip");
        match resolve_input(&p).unwrap_err() {
            NeuroLearnError::NotAPdf { magic, .. } => assert_eq!(&magic, b"PK\x03\x04"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn too_short() {
        let dir = tempfile::tempdir().unwrap();
        let p = write_file(&dir, "tiny.pdf", b"%P");
        assert!(matches!(
            resolve_input(&p).unwrap_err(),
            NeuroLearnError::NotAPdf { .. }
        ));
    }

    #[test]
    fn accepts_uppercase_extension() {
        let dir = tempfile::tempdir().unwrap();
        let p = write_file(&dir, "COURSE.PDF", b"%PDF-1.4\n%%EOF\n");
        let resolved = resolve_input(&p).unwrap();
        assert_eq!(resolved.filename(), "COURSE.PDF");
    }
}
