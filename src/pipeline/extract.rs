//! Page text extraction via pdfium.
//!
//! pdfium is a C++ library with thread-local state, so all work happens in
//! `spawn_blocking` on a dedicated blocking thread, never on a Tokio worker.

use crate::error::ExtractionError;
use crate::job::Page;
use crate::traits::{DocumentExtractor, ExtractedDocument};
use async_trait::async_trait;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Reads each page's text layer with pdfium.
#[derive(Debug, Clone)]
pub struct PdfiumExtractor {
    skip_blank_pages: bool,
    library_path: Option<PathBuf>,
}

impl PdfiumExtractor {
    pub fn new(skip_blank_pages: bool) -> Self {
        Self {
            skip_blank_pages,
            library_path: std::env::var_os("PDFIUM_LIB_PATH").map(PathBuf::from),
        }
    }

    /// Bind to the pdfium library in `dir` instead of the default search.
    pub fn with_library_path(mut self, dir: impl Into<PathBuf>) -> Self {
        self.library_path = Some(dir.into());
        self
    }
}

impl Default for PdfiumExtractor {
    fn default() -> Self {
        Self::new(true)
    }
}

#[async_trait]
impl DocumentExtractor for PdfiumExtractor {
    async fn extract(
        &self,
        path: &Path,
        password: Option<&str>,
    ) -> Result<ExtractedDocument, ExtractionError> {
        let path = path.to_path_buf();
        let password = password.map(str::to_string);
        let skip_blank = self.skip_blank_pages;
        let library_path = self.library_path.clone();

        tokio::task::spawn_blocking(move || {
            let pdfium = bind_pdfium(library_path.as_deref())?;
            let texts = read_page_texts(&pdfium, &path, password.as_deref())?;
            let page_count = texts.len();
            let pages = pages_from_texts(texts, skip_blank);
            info!(
                "Extracted {} of {} pages with text from {}",
                pages.len(),
                page_count,
                path.display()
            );
            Ok(ExtractedDocument { pages, page_count })
        })
        .await
        .map_err(|e| ExtractionError::Internal(format!("Extraction task panicked: {}", e)))?
    }
}

fn bind_pdfium(library_path: Option<&Path>) -> Result<Pdfium, ExtractionError> {
    let bindings = match library_path {
        Some(dir) => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(dir)),
        None => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library()),
    }
    .map_err(|e| ExtractionError::PdfiumBindingFailed(format!("{:?}", e)))?;
    Ok(Pdfium::new(bindings))
}

/// Blocking: text of every page, in document order.
fn read_page_texts(
    pdfium: &Pdfium,
    path: &Path,
    password: Option<&str>,
) -> Result<Vec<String>, ExtractionError> {
    let document = pdfium
        .load_pdf_from_file(path, password)
        .map_err(|e| load_error(path, password, format!("{:?}", e)))?;

    let pages = document.pages();
    debug!("PDF loaded: {} pages", pages.len());

    pages
        .iter()
        .enumerate()
        .map(|(idx, page)| {
            page.text()
                .map(|text| text.all())
                .map_err(|e| ExtractionError::PageText {
                    page: idx + 1,
                    detail: format!("{:?}", e),
                })
        })
        .collect()
}

/// Map a pdfium load failure onto the password / corruption variants.
fn load_error(path: &Path, password: Option<&str>, detail: String) -> ExtractionError {
    let path = path.to_path_buf();
    if detail.to_lowercase().contains("password") {
        if password.is_some() {
            ExtractionError::WrongPassword { path }
        } else {
            ExtractionError::PasswordRequired { path }
        }
    } else {
        ExtractionError::CorruptPdf { path, detail }
    }
}

/// Number the texts from 1, optionally dropping whitespace-only pages.
///
/// Skipped pages keep their number slot: the page after a blank page 2 is
/// still page 3.
fn pages_from_texts(texts: Vec<String>, skip_blank: bool) -> Vec<Page> {
    texts
        .into_iter()
        .enumerate()
        .filter_map(|(idx, text)| {
            if skip_blank && text.trim().is_empty() {
                debug!("Skipping page {}: no text layer", idx + 1);
                None
            } else {
                Some(Page::new(idx + 1, text))
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn blank_pages_are_skipped_but_keep_numbers() {
        let pages = pages_from_texts(texts(&["one", "  \n\t", "three"]), true);
        let numbers: Vec<usize> = pages.iter().map(|p| p.page_number).collect();
        assert_eq!(numbers, vec![1, 3]);
        assert_eq!(pages[1].text, "three");
    }

    #[test]
    fn blank_pages_kept_when_asked() {
        let pages = pages_from_texts(texts(&["one", "", "three"]), false);
        assert_eq!(pages.len(), 3);
        assert_eq!(pages[1].page_number, 2);
    }

    #[test]
    fn password_errors_are_told_apart() {
        let path = Path::new("/tmp/locked.pdf");
        assert!(matches!(
            load_error(path, None, "PdfiumLibraryInternalError(PasswordError)".into()),
            ExtractionError::PasswordRequired { .. }
        ));
        assert!(matches!(
            load_error(path, Some("guess"), "PasswordError".into()),
            ExtractionError::WrongPassword { .. }
        ));
        assert!(matches!(
            load_error(path, None, "PdfiumLibraryInternalError(FormatError)".into()),
            ExtractionError::CorruptPdf { .. }
        ));
    }

    #[test]
    fn explicit_library_path_wins() {
        let extractor = PdfiumExtractor::new(true).with_library_path("/opt/pdfium/lib");
        assert_eq!(extractor.library_path.as_deref(), Some(Path::new("/opt/pdfium/lib")));
    }
}
