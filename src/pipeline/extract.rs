//! PDF text extraction via pdfium.
//!
//! pdfium is a C++ library with thread-local state and blocking calls, so
//! every entry point here moves the work onto `spawn_blocking`.
//!
//! Library lookup order:
//! 1. `PDFIUM_LIB_PATH` (a full path to the shared library)
//! 2. the platform library name in the working directory
//! 3. the system library search path

use crate::course::DocumentMetadata;
use crate::error::NeuroLearnError;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Extracted document text.
#[derive(Debug, Clone)]
pub struct ExtractedText {
    /// Non-empty pages joined with a blank line.
    pub text: String,
    pub page_count: usize,
    /// Pages that contributed text.
    pub pages_with_text: usize,
    /// Info-dictionary fields of the same document.
    pub metadata: DocumentMetadata,
}

/// Read the text layer of every page of the PDF at `pdf_path`.
pub async fn extract_text(pdf_path: &Path) -> Result<ExtractedText, NeuroLearnError> {
    let path = pdf_path.to_path_buf();
    tokio::task::spawn_blocking(move || extract_text_blocking(&path))
        .await
        .map_err(|e| NeuroLearnError::Internal(format!("Extraction task panicked: {}", e)))?
}

/// Read document metadata without extracting text.
pub async fn extract_metadata(pdf_path: &Path) -> Result<DocumentMetadata, NeuroLearnError> {
    let path = pdf_path.to_path_buf();
    tokio::task::spawn_blocking(move || extract_metadata_blocking(&path))
        .await
        .map_err(|e| NeuroLearnError::Internal(format!("Metadata task panicked: {}", e)))?
}

fn bind_pdfium() -> Result<Pdfium, NeuroLearnError> {
    if let Ok(lib) = std::env::var("PDFIUM_LIB_PATH") {
        let lib = PathBuf::from(lib);
        let bindings = Pdfium::bind_to_library(&lib).map_err(|e| {
            NeuroLearnError::PdfiumBindingFailed(format!(
                "{:?} (PDFIUM_LIB_PATH={})",
                e,
                lib.display()
            ))
        })?;
        return Ok(Pdfium::new(bindings));
    }

    let bindings = Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
        .or_else(|_| Pdfium::bind_to_system_library())
        .map_err(|e| NeuroLearnError::PdfiumBindingFailed(format!("{:?}", e)))?;
    Ok(Pdfium::new(bindings))
}

fn open_error(pdf_path: &Path, e: PdfiumError) -> NeuroLearnError {
    NeuroLearnError::CorruptPdf {
        path: pdf_path.to_path_buf(),
        detail: format!("{:?}", e),
    }
}

fn extract_text_blocking(pdf_path: &Path) -> Result<ExtractedText, NeuroLearnError> {
    let pdfium = bind_pdfium()?;
    let document = pdfium
        .load_pdf_from_file(pdf_path, None)
        .map_err(|e| open_error(pdf_path, e))?;

    let pages = document.pages();
    let page_count = pages.len() as usize;
    if page_count == 0 {
        return Err(NeuroLearnError::EmptyDocument {
            path: pdf_path.to_path_buf(),
        });
    }
    info!("PDF loaded: {} pages", page_count);

    let mut page_texts = Vec::with_capacity(page_count);
    for (idx, page) in pages.iter().enumerate() {
        let text = page
            .text()
            .map_err(|e| NeuroLearnError::PageTextFailed {
                page: idx + 1,
                detail: format!("{:?}", e),
            })?
            .all();
        debug!("Page {}: {} chars", idx + 1, text.len());
        page_texts.push(text);
    }

    let joined = join_page_texts(page_texts.iter().map(String::as_str));
    if joined.is_empty() {
        return Err(NeuroLearnError::NoExtractableText {
            path: pdf_path.to_path_buf(),
        });
    }

    let pages_with_text = page_texts.iter().filter(|t| !t.trim().is_empty()).count();
    Ok(ExtractedText {
        text: joined,
        page_count,
        pages_with_text,
        metadata: read_metadata(&document),
    })
}

/// Trim each page, drop empty ones, join the rest with a blank line.
pub fn join_page_texts<'a>(pages: impl IntoIterator<Item = &'a str>) -> String {
    pages
        .into_iter()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn extract_metadata_blocking(pdf_path: &Path) -> Result<DocumentMetadata, NeuroLearnError> {
    let pdfium = bind_pdfium()?;
    let document = pdfium
        .load_pdf_from_file(pdf_path, None)
        .map_err(|e| open_error(pdf_path, e))?;
    Ok(read_metadata(&document))
}

fn read_metadata(document: &PdfDocument<'_>) -> DocumentMetadata {
    let metadata = document.metadata();
    let get_meta = |tag: PdfDocumentMetadataTagType| -> Option<String> {
        metadata.get(tag).and_then(|t| non_empty(t.value()))
    };

    DocumentMetadata {
        title: get_meta(PdfDocumentMetadataTagType::Title),
        author: get_meta(PdfDocumentMetadataTagType::Author),
        subject: get_meta(PdfDocumentMetadataTagType::Subject),
        creator: get_meta(PdfDocumentMetadataTagType::Creator),
        producer: get_meta(PdfDocumentMetadataTagType::Producer),
        page_count: document.pages().len() as usize,
        pdf_version: format!("{:?}", document.version()),
    }
}

fn non_empty(value: &str) -> Option<String> {
    let v = value.trim();
    (!v.is_empty()).then(|| v.to_string())
}
