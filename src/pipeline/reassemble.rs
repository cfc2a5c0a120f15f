//! Turn a job's finished chunks into one ordered document.
//!
//! Runs once per job, on the worker whose chunk was the last to become
//! terminal (or straight away for a job with no chunks).
//!
//! Pages of failed chunks are left out. Each chunk was translated as one
//! text with `=== PAGE BREAK ===` between its pages; splitting on that
//! marker gives the per-page translations back. Models occasionally drop
//! or merge a marker, and then the whole chunk translation is attached to
//! the chunk's first page rather than guessing where the breaks were.

use crate::job::{Chunk, ChunkStatus, FailureKind, Job, JobStatus, PAGE_BREAK_MARKER};
use crate::progress::ProgressCallback;
use crate::traits::{ArtifactWriter, TranslatedPage};
use tracing::{error, info, warn};

/// Per-page translations of one completed chunk, in page order.
pub fn split_pages(chunk: &Chunk) -> Vec<TranslatedPage> {
    let segments: Vec<&str> = chunk
        .translated_text
        .split(PAGE_BREAK_MARKER)
        .map(str::trim)
        .collect();

    if segments.len() == chunk.pages.len() {
        return chunk
            .pages
            .iter()
            .zip(segments)
            .map(|(page, text)| TranslatedPage {
                page_number: page.page_number,
                text: text.to_string(),
            })
            .collect();
    }

    if chunk.pages.len() > 1 {
        warn!(
            "Chunk {}: translation has {} page segments for {} pages, keeping it on page {}",
            chunk.index,
            segments.len(),
            chunk.pages.len(),
            chunk.pages[0].page_number
        );
    }
    chunk
        .pages
        .iter()
        .enumerate()
        .map(|(i, page)| TranslatedPage {
            page_number: page.page_number,
            text: if i == 0 {
                chunk.translated_text.trim().to_string()
            } else {
                String::new()
            },
        })
        .collect()
}

/// Pages of every completed chunk, sorted by page number.
///
/// Independent of the order in which chunks completed.
pub fn collect_pages(chunks: &[Chunk]) -> Vec<TranslatedPage> {
    let mut pages: Vec<TranslatedPage> = chunks
        .iter()
        .filter(|c| c.status == ChunkStatus::Completed)
        .flat_map(split_pages)
        .collect();
    pages.sort_by_key(|p| p.page_number);
    pages
}

/// Describe chunks that failed with a non-retryable error, or `None`.
fn fatal_summary(chunks: &[Chunk]) -> Option<String> {
    let fatal: Vec<String> = chunks
        .iter()
        .filter(|c| c.failure == Some(FailureKind::Fatal))
        .map(|c| {
            format!(
                "chunk {} ({})",
                c.index,
                c.error.as_deref().unwrap_or("unknown error")
            )
        })
        .collect();
    if fatal.is_empty() {
        None
    } else {
        Some(format!("Translation failed for {}", fatal.join(", ")))
    }
}

/// Write the job's artifact and move it to its terminal state.
///
/// * writer error → `Failed`, error "Failed to write translated document: …",
///   no artifact;
/// * any chunk failed fatally → `Failed`, the partial artifact is still set;
/// * otherwise `Completed`, even if some chunks ran out of retries.
pub async fn reassemble(
    job: &Job,
    writer: &dyn ArtifactWriter,
    progress: Option<&ProgressCallback>,
) -> JobStatus {
    let chunks = job.chunks();
    let pages = collect_pages(&chunks);
    let failed = chunks
        .iter()
        .filter(|c| c.status == ChunkStatus::Failed)
        .count();

    let (status, output, message) = match writer.write(job.id(), &pages).await {
        Ok(output) => match fatal_summary(&chunks) {
            Some(summary) => (JobStatus::Failed, Some(output), Some(summary)),
            None => (JobStatus::Completed, Some(output), None),
        },
        Err(e) => {
            error!("Job {}: writing the translated document failed: {}", job.id(), e);
            (
                JobStatus::Failed,
                None,
                Some(format!("Failed to write translated document: {}", e)),
            )
        }
    };

    if let Some(out) = &output {
        info!(
            "Job {}: {} pages ({} bytes) written to {}",
            job.id(),
            out.pages,
            out.bytes,
            out.path.display()
        );
    }

    if !job.finish(status, output, message) {
        return job.status();
    }

    info!(
        "Job {} {:?}: {}/{} chunks translated, {} failed, in {:?}",
        job.id(),
        status,
        job.completed_count(),
        job.chunk_count(),
        failed,
        job.elapsed()
    );
    if let Some(cb) = progress {
        cb.on_job_complete(job.id(), status, job.completed_count(), job.chunk_count());
    }
    status
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RenderError;
    use crate::job::{JobId, OutputRef, Page, PAGE_BREAK};
    use async_trait::async_trait;
    use std::path::PathBuf;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Capture {
        written: Mutex<Vec<TranslatedPage>>,
        fail: bool,
    }

    #[async_trait]
    impl ArtifactWriter for Capture {
        async fn write(&self, job: &JobId, pages: &[TranslatedPage]) -> Result<OutputRef, RenderError> {
            if self.fail {
                return Err(RenderError::Invalid("disk full".into()));
            }
            *self.written.lock().unwrap() = pages.to_vec();
            Ok(OutputRef {
                path: PathBuf::from(format!("{job}_translated.md")),
                pages: pages.len(),
                bytes: pages.iter().map(|p| p.text.len()).sum(),
            })
        }
    }

    fn job(pages: usize, group: usize) -> Job {
        let pages = (1..=pages).map(|n| Page::new(n, format!("page {n}"))).collect();
        Job::new(JobId::new(), pages, group)
    }

    fn translated(first: usize, last: usize) -> String {
        (first..=last)
            .map(|n| format!("T{n}"))
            .collect::<Vec<_>>()
            .join(PAGE_BREAK)
    }

    fn numbers(pages: &[TranslatedPage]) -> Vec<usize> {
        pages.iter().map(|p| p.page_number).collect()
    }

    #[test]
    fn splits_on_page_break_marker() {
        let job = job(3, 3);
        job.complete_chunk(0, translated(1, 3));
        let pages = split_pages(&job.chunk(0).unwrap());
        assert_eq!(numbers(&pages), vec![1, 2, 3]);
        assert_eq!(pages[1].text, "T2");
    }

    #[test]
    fn mismatched_segments_stay_on_first_page() {
        let job = job(3, 3);
        job.complete_chunk(0, "one merged translation".into());
        let pages = split_pages(&job.chunk(0).unwrap());
        assert_eq!(numbers(&pages), vec![1, 2, 3]);
        assert_eq!(pages[0].text, "one merged translation");
        assert!(pages[1].text.is_empty() && pages[2].text.is_empty());
    }

    #[test]
    fn collection_ignores_completion_order() {
        let job = job(7, 3);
        job.complete_chunk(2, translated(7, 7));
        job.complete_chunk(0, translated(1, 3));
        job.complete_chunk(1, translated(4, 6));
        let pages = collect_pages(&job.chunks());
        assert_eq!(numbers(&pages), (1..=7).collect::<Vec<_>>());
        assert_eq!(pages[4].text, "T5");
    }

    #[tokio::test]
    async fn exhausted_chunk_still_completes_the_job() {
        let job = job(6, 2);
        job.complete_chunk(0, translated(1, 2));
        job.fail_chunk(1, FailureKind::RetriesExhausted, "Rate limit exceeded".into());
        job.complete_chunk(2, translated(5, 6));

        let writer = Capture::default();
        assert_eq!(reassemble(&job, &writer, None).await, JobStatus::Completed);
        assert_eq!(numbers(&writer.written.lock().unwrap()), vec![1, 2, 5, 6]);
        assert_eq!(job.output().unwrap().pages, 4);
        assert_eq!(job.error(), None);
    }

    #[tokio::test]
    async fn fatal_chunk_fails_the_job_but_keeps_the_artifact() {
        let job = job(4, 2);
        job.complete_chunk(0, translated(1, 2));
        job.fail_chunk(1, FailureKind::Fatal, "API key not valid".into());

        let writer = Capture::default();
        assert_eq!(reassemble(&job, &writer, None).await, JobStatus::Failed);
        assert_eq!(job.output().unwrap().pages, 2);
        let error = job.error().unwrap();
        assert!(error.contains("chunk 1 (API key not valid)"), "got: {error}");
    }

    #[tokio::test]
    async fn writer_error_fails_the_job() {
        let job = job(2, 2);
        job.complete_chunk(0, translated(1, 2));

        let writer = Capture {
            fail: true,
            ..Default::default()
        };
        assert_eq!(reassemble(&job, &writer, None).await, JobStatus::Failed);
        assert_eq!(job.output(), None);
        assert_eq!(
            job.error().as_deref(),
            Some("Failed to write translated document: Cannot render document: disk full")
        );
    }

    #[tokio::test]
    async fn second_reassembly_changes_nothing() {
        let job = job(1, 1);
        job.complete_chunk(0, "T1".into());
        let writer = Capture::default();
        assert_eq!(reassemble(&job, &writer, None).await, JobStatus::Completed);

        let broken = Capture {
            fail: true,
            ..Default::default()
        };
        assert_eq!(reassemble(&job, &broken, None).await, JobStatus::Completed);
        assert!(job.output().is_some());
    }
}
