//! Markdown artifact writer.
//!
//! Writes are atomic: the document goes to `<name>.md.tmp` first and is
//! renamed into place, so a crash never leaves a half-written artifact
//! behind under the final name.

use crate::config::PageMarker;
use crate::error::RenderError;
use crate::job::{JobId, OutputRef};
use crate::traits::{ArtifactWriter, TranslatedPage};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Where [`MarkdownWriter`] puts its output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputTarget {
    /// `{dir}/{job_id}_translated.md`
    Dir(PathBuf),
    /// Exactly this file, whatever the job id.
    File(PathBuf),
}

#[derive(Debug, Clone)]
pub struct MarkdownWriter {
    target: OutputTarget,
    marker: PageMarker,
}

impl MarkdownWriter {
    pub fn new(target: OutputTarget, marker: PageMarker) -> Self {
        Self { target, marker }
    }

    pub fn into_dir(dir: impl Into<PathBuf>, marker: PageMarker) -> Self {
        Self::new(OutputTarget::Dir(dir.into()), marker)
    }

    pub fn to_file(path: impl Into<PathBuf>, marker: PageMarker) -> Self {
        Self::new(OutputTarget::File(path.into()), marker)
    }

    /// Final artifact path for `job`.
    pub fn path_for(&self, job: &JobId) -> PathBuf {
        match &self.target {
            OutputTarget::Dir(dir) => dir.join(format!("{}_translated.md", job)),
            OutputTarget::File(path) => path.clone(),
        }
    }
}

#[async_trait]
impl ArtifactWriter for MarkdownWriter {
    async fn write(&self, job: &JobId, pages: &[TranslatedPage]) -> Result<OutputRef, RenderError> {
        let path = self.path_for(job);
        let document = render_document(pages, &self.marker);
        write_atomic(&path, &document).await?;
        debug!("Wrote {} bytes to {}", document.len(), path.display());
        Ok(OutputRef {
            path,
            pages: pages.len(),
            bytes: document.len(),
        })
    }
}

/// Render pages as one Markdown document, each preceded by its marker line.
///
/// An empty page list renders as an empty document.
pub fn render_document(pages: &[TranslatedPage], marker: &PageMarker) -> String {
    let mut out = String::new();
    for page in pages {
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(&marker.render(page.page_number));
        out.push_str("\n\n");
        let text = page.text.trim();
        if !text.is_empty() {
            out.push_str(text);
            out.push('\n');
        }
    }
    out
}

async fn write_atomic(path: &Path, contents: &str) -> Result<(), RenderError> {
    let write_failed = |source| RenderError::WriteFailed {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_failed)?;
    }

    let tmp_path = path.with_extension("md.tmp");
    tokio::fs::write(&tmp_path, contents).await.map_err(write_failed)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(write_failed)
}
