//! Jobs: one document's chunks plus the job-level state shared by workers.
//!
//! ## Concurrency discipline
//!
//! A [`Job`] is shared (`Arc<Job>`) between the worker tasks, the status
//! query path and the reassembler. Three kinds of state live inside it:
//!
//! * **Chunk fields**: each chunk sits behind its own `Mutex` and is only
//!   ever written by the worker that owns it. Readers take the lock just long
//!   enough to clone.
//! * **Counters**: `completed` and `terminal` are atomics, so two workers
//!   finishing at once cannot lose an increment. The worker whose increment
//!   brings `terminal` to the chunk count is the one that triggers reassembly.
//! * **Job status**: status, output and error behind one `Mutex`; terminal
//!   transitions are also published on a `watch` channel for [`Job::subscribe`].
//!
//! No lock is ever held across an `.await`.

pub mod chunk;
pub mod snapshot;
pub mod store;

pub use chunk::{partition, Chunk, ChunkStatus, FailureKind, Page, PAGE_BREAK, PAGE_BREAK_MARKER};
pub use snapshot::{estimate_remaining, ChunkSummary, JobSnapshot};
pub use store::JobStore;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use uuid::Uuid;

/// Opaque unique job identifier (a UUID v4).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Job lifecycle. Terminal states are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    InProgress,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::InProgress)
    }
}

/// Where a reassembled artifact was written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputRef {
    pub path: PathBuf,
    /// Number of pages in the artifact.
    pub pages: usize,
    /// Artifact size in bytes.
    pub bytes: usize,
}

#[derive(Debug)]
struct JobState {
    status: JobStatus,
    output: Option<OutputRef>,
    error: Option<String>,
    finished: Option<Instant>,
}

/// One document submission.
#[derive(Debug)]
pub struct Job {
    id: JobId,
    started_at: DateTime<Utc>,
    start: Instant,
    total_pages: usize,
    chunks: Vec<Mutex<Chunk>>,
    completed: AtomicUsize,
    terminal: AtomicUsize,
    state: Mutex<JobState>,
    status_tx: watch::Sender<JobStatus>,
}

impl Job {
    /// Create an in-progress job by partitioning `pages` into chunks.
    pub fn new(id: JobId, pages: Vec<Page>, group_size: usize) -> Self {
        let total_pages = pages.len();
        let chunks = partition(pages, group_size)
            .into_iter()
            .map(Mutex::new)
            .collect();
        Self::build(id, total_pages, chunks, JobStatus::InProgress, None)
    }

    /// Create a job that failed before any chunk existed (extraction error).
    pub fn failed(id: JobId, error: impl Into<String>) -> Self {
        Self::build(id, 0, Vec::new(), JobStatus::Failed, Some(error.into()))
    }

    fn build(
        id: JobId,
        total_pages: usize,
        chunks: Vec<Mutex<Chunk>>,
        status: JobStatus,
        error: Option<String>,
    ) -> Self {
        let start = Instant::now();
        let finished = status.is_terminal().then_some(start);
        let (status_tx, _) = watch::channel(status);
        Self {
            id,
            started_at: Utc::now(),
            start,
            total_pages,
            chunks,
            completed: AtomicUsize::new(0),
            terminal: AtomicUsize::new(0),
            state: Mutex::new(JobState {
                status,
                output: None,
                error,
                finished,
            }),
            status_tx,
        }
    }

    pub fn id(&self) -> &JobId {
        &self.id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn total_pages(&self) -> usize {
        self.total_pages
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn completed_count(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    /// `100 · completed / chunks`. A zero-chunk job reads 100 once completed.
    pub fn progress_percent(&self) -> f64 {
        percent(self.completed_count(), self.chunk_count(), self.status())
    }

    pub fn status(&self) -> JobStatus {
        lock(&self.state).status
    }

    pub fn output(&self) -> Option<OutputRef> {
        lock(&self.state).output.clone()
    }

    pub fn error(&self) -> Option<String> {
        lock(&self.state).error.clone()
    }

    /// Time since submission, frozen at the terminal transition.
    pub fn elapsed(&self) -> Duration {
        let end = lock(&self.state).finished.unwrap_or_else(Instant::now);
        end.saturating_duration_since(self.start)
    }

    /// `true` if the job reached a terminal state more than `ttl` ago.
    pub fn finished_longer_than(&self, ttl: Duration) -> bool {
        lock(&self.state)
            .finished
            .is_some_and(|at| at.elapsed() > ttl)
    }

    /// A copy of one chunk.
    pub fn chunk(&self, index: usize) -> Option<Chunk> {
        self.chunks.get(index).map(|c| lock(c).clone())
    }

    /// Copies of all chunks, in index order.
    pub fn chunks(&self) -> Vec<Chunk> {
        self.chunks.iter().map(|c| lock(c).clone()).collect()
    }

    pub fn source_text(&self, index: usize) -> Option<String> {
        self.chunks.get(index).map(|c| lock(c).source_text.clone())
    }

    pub fn all_chunks_terminal(&self) -> bool {
        self.terminal.load(Ordering::SeqCst) == self.chunks.len()
    }

    /// Move a chunk to a non-terminal status (`Running`, `Retrying`).
    ///
    /// Ignored for chunks that are already terminal.
    pub fn set_chunk_status(&self, index: usize, status: ChunkStatus, note: Option<String>) {
        debug_assert!(!status.is_terminal());
        if let Some(chunk) = self.chunks.get(index) {
            let mut chunk = lock(chunk);
            if chunk.status.is_terminal() {
                return;
            }
            chunk.status = status;
            if note.is_some() {
                chunk.error = note;
            }
        }
    }

    /// Record a successful translation.
    ///
    /// Returns `true` if this transition made every chunk terminal.
    pub fn complete_chunk(&self, index: usize, translated: String) -> bool {
        let Some(chunk) = self.chunks.get(index) else {
            return false;
        };
        {
            let mut chunk = lock(chunk);
            if chunk.status.is_terminal() {
                return false;
            }
            chunk.status = ChunkStatus::Completed;
            chunk.translated_text = translated;
            chunk.error = None;
            // Incremented under the chunk lock so a reader that sees this
            // chunk completed also sees the count.
            self.completed.fetch_add(1, Ordering::SeqCst);
        }
        self.mark_terminal()
    }

    /// Record a chunk failure.
    ///
    /// Returns `true` if this transition made every chunk terminal.
    pub fn fail_chunk(&self, index: usize, kind: FailureKind, message: String) -> bool {
        let Some(chunk) = self.chunks.get(index) else {
            return false;
        };
        {
            let mut chunk = lock(chunk);
            if chunk.status.is_terminal() {
                return false;
            }
            chunk.status = ChunkStatus::Failed;
            chunk.failure = Some(kind);
            chunk.error = Some(message);
        }
        self.mark_terminal()
    }

    fn mark_terminal(&self) -> bool {
        self.terminal.fetch_add(1, Ordering::SeqCst) + 1 == self.chunks.len()
    }

    /// Move the job to a terminal state.
    ///
    /// Returns `false` (and changes nothing) if it already was terminal.
    pub fn finish(&self, status: JobStatus, output: Option<OutputRef>, error: Option<String>) -> bool {
        debug_assert!(status.is_terminal());
        {
            let mut state = lock(&self.state);
            if state.status.is_terminal() {
                return false;
            }
            state.status = status;
            state.output = output;
            state.error = error;
            state.finished = Some(Instant::now());
        }
        self.status_tx.send_replace(status);
        true
    }

    /// Receive status changes; the current value is available immediately.
    pub fn subscribe(&self) -> watch::Receiver<JobStatus> {
        self.status_tx.subscribe()
    }
}

pub(crate) fn percent(completed: usize, total: usize, status: JobStatus) -> f64 {
    if total == 0 {
        return if status == JobStatus::Completed { 100.0 } else { 0.0 };
    }
    100.0 * completed as f64 / total as f64
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
