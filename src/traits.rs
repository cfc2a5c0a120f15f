//! The three collaborators the pipeline talks to.
//!
//! The engine holds each as an `Arc<dyn Trait>` so tests (and hosts with
//! their own storage or model gateway) can swap any of them out.

use crate::error::{ExtractionError, RenderError, ServiceError};
use crate::job::{JobId, OutputRef, Page};
use async_trait::async_trait;
use std::path::Path;

/// Pages pulled out of a source document.
#[derive(Debug, Clone)]
pub struct ExtractedDocument {
    /// Pages carrying text, in document order.
    pub pages: Vec<Page>,
    /// Page count of the source, including pages that were skipped.
    pub page_count: usize,
}

/// Reads page text from a document on disk.
#[async_trait]
pub trait DocumentExtractor: Send + Sync {
    async fn extract(
        &self,
        path: &Path,
        password: Option<&str>,
    ) -> Result<ExtractedDocument, ExtractionError>;
}

/// The slow, rate-limited external translation service.
///
/// Implementations hold their own credentials and must be safe to call
/// concurrently; each call is independent.
#[async_trait]
pub trait TranslationService: Send + Sync {
    /// Short name for logs, e.g. `"gemini/gemini-2.0-flash"`.
    fn name(&self) -> &str;

    async fn translate(&self, text: &str) -> Result<String, ServiceError>;
}

/// One translated page, ready to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslatedPage {
    pub page_number: usize,
    pub text: String,
}

/// Persists a reassembled document.
#[async_trait]
pub trait ArtifactWriter: Send + Sync {
    /// Write `pages` (already sorted by page number) for `job`.
    async fn write(&self, job: &JobId, pages: &[TranslatedPage]) -> Result<OutputRef, RenderError>;
}
