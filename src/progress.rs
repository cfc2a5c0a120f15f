//! Progress-callback trait for per-chunk translation events.
//!
//! Inject an [`Arc<dyn TranslationProgressCallback>`] via
//! [`crate::config::TranslationConfigBuilder::progress_callback`] to receive
//! events as the executor works through a job's chunks. Polling
//! [`crate::engine::TranslationEngine::get_status`] gives the same
//! information as a snapshot; callbacks are for push-style consumers such as
//! terminal progress bars.
//!
//! # Example
//!
//! ```rust
//! use edgequake_pdf_translate::{JobId, TranslationConfig, TranslationProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     completed: AtomicUsize,
//! }
//!
//! impl TranslationProgressCallback for CountingCallback {
//!     fn on_chunk_complete(&self, _job: &JobId, index: usize, total: usize, len: usize) {
//!         let done = self.completed.fetch_add(1, Ordering::SeqCst) + 1;
//!         eprintln!("chunk {index} done ({done}/{total}, {len} bytes)");
//!     }
//! }
//!
//! let config = TranslationConfig::builder()
//!     .progress_callback(Arc::new(CountingCallback { completed: AtomicUsize::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use crate::job::{JobId, JobStatus};
use std::sync::Arc;
use std::time::Duration;

/// Called by the pipeline as chunks move through their lifecycle.
///
/// Chunk events for one job arrive concurrently from up to
/// `max_concurrent` workers. All methods default to no-ops.
pub trait TranslationProgressCallback: Send + Sync {
    /// Called once, after partitioning and before the first launch.
    fn on_job_start(&self, job: &JobId, total_chunks: usize, total_pages: usize) {
        let _ = (job, total_chunks, total_pages);
    }

    /// Called when a chunk's first attempt is launched.
    fn on_chunk_start(&self, job: &JobId, index: usize, total_chunks: usize) {
        let _ = (job, index, total_chunks);
    }

    /// Called before sleeping ahead of retry `attempt` of a chunk.
    fn on_chunk_retry(&self, job: &JobId, index: usize, attempt: u32, delay: Duration, error: &str) {
        let _ = (job, index, attempt, delay, error);
    }

    /// Called when a chunk is translated.
    ///
    /// `translated_len` is the byte length of the translation.
    fn on_chunk_complete(&self, job: &JobId, index: usize, total_chunks: usize, translated_len: usize) {
        let _ = (job, index, total_chunks, translated_len);
    }

    /// Called when a chunk fails for good.
    fn on_chunk_error(&self, job: &JobId, index: usize, total_chunks: usize, error: &str) {
        let _ = (job, index, total_chunks, error);
    }

    /// Called once the job reaches its terminal state.
    fn on_job_complete(&self, job: &JobId, status: JobStatus, completed_chunks: usize, total_chunks: usize) {
        let _ = (job, status, completed_chunks, total_chunks);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl TranslationProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::TranslationConfig`].
pub type ProgressCallback = Arc<dyn TranslationProgressCallback>;
