//! Point-in-time job status: progress, ETA and per-chunk summaries.

use super::{percent, ChunkStatus, Job, JobId, JobStatus, OutputRef};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;

/// Status of a single chunk as reported to callers.
#[derive(Debug, Clone, Serialize)]
pub struct ChunkSummary {
    pub index: usize,
    pub status: ChunkStatus,
    pub pages: Vec<usize>,
    /// Present once the chunk is completed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub translated_text: Option<String>,
    /// The failure message, or the retry note while retrying.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Everything a status query returns.
#[derive(Debug, Clone, Serialize)]
pub struct JobSnapshot {
    pub id: JobId,
    pub status: JobStatus,
    pub progress_percent: f64,
    pub total_pages: usize,
    pub total_chunks: usize,
    pub completed_chunks: usize,
    pub failed_chunks: usize,
    pub started_at: DateTime<Utc>,
    pub elapsed_secs: f64,
    /// `None` until the first chunk completes.
    pub remaining_secs: Option<f64>,
    pub chunks: Vec<ChunkSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<OutputRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JobSnapshot {
    /// Capture `job` as it is right now.
    ///
    /// Counts are derived from the chunk copies taken here, so the summary
    /// list and the counters always agree with each other.
    pub fn capture(job: &Job) -> Self {
        let status = job.status();
        let elapsed = job.elapsed();
        let chunks: Vec<ChunkSummary> = job
            .chunks()
            .into_iter()
            .map(|c| {
                let pages = c.page_numbers();
                let (translated_text, error) = match c.status {
                    ChunkStatus::Completed => (Some(c.translated_text), None),
                    ChunkStatus::Failed | ChunkStatus::Retrying { .. } => (None, c.error),
                    ChunkStatus::Pending | ChunkStatus::Running => (None, None),
                };
                ChunkSummary {
                    index: c.index,
                    status: c.status,
                    pages,
                    translated_text,
                    error,
                }
            })
            .collect();

        let completed_chunks = chunks
            .iter()
            .filter(|c| c.status == ChunkStatus::Completed)
            .count();
        let failed_chunks = chunks
            .iter()
            .filter(|c| c.status == ChunkStatus::Failed)
            .count();
        let progress_percent = percent(completed_chunks, chunks.len(), status);

        let remaining = if status.is_terminal() {
            Some(Duration::ZERO)
        } else {
            estimate_remaining(elapsed, progress_percent)
        };

        Self {
            id: job.id().clone(),
            status,
            progress_percent,
            total_pages: job.total_pages(),
            total_chunks: chunks.len(),
            completed_chunks,
            failed_chunks,
            started_at: job.started_at(),
            elapsed_secs: elapsed.as_secs_f64(),
            remaining_secs: remaining.map(|d| d.as_secs_f64()),
            chunks,
            output: job.output(),
            error: job.error(),
        }
    }
}

/// Linear ETA: `elapsed / progress · (100 − progress)`.
///
/// Returns `None` while nothing has completed.
pub fn estimate_remaining(elapsed: Duration, progress_percent: f64) -> Option<Duration> {
    if progress_percent.is_nan() || progress_percent <= 0.0 {
        return None;
    }
    let left = (100.0 - progress_percent).max(0.0);
    Some(elapsed.mul_f64(left / progress_percent))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{FailureKind, Page};

    #[test]
    fn no_estimate_before_progress() {
        assert_eq!(estimate_remaining(Duration::from_secs(30), 0.0), None);
        assert_eq!(estimate_remaining(Duration::ZERO, 0.0), None);
        assert_eq!(estimate_remaining(Duration::from_secs(30), f64::NAN), None);
    }

    #[test]
    fn linear_estimate() {
        assert_eq!(
            estimate_remaining(Duration::from_secs(30), 25.0),
            Some(Duration::from_secs(90))
        );
        assert_eq!(
            estimate_remaining(Duration::from_secs(30), 100.0),
            Some(Duration::ZERO)
        );
    }

    #[test]
    fn snapshot_reports_chunk_details() {
        let pages = (1..=5).map(|n| Page::new(n, format!("p{n}"))).collect();
        let job = Job::new(JobId::new(), pages, 2);
        job.complete_chunk(0, "translated".into());
        job.set_chunk_status(1, ChunkStatus::Retrying { attempt: 1 }, Some("waiting".into()));
        job.fail_chunk(2, FailureKind::Fatal, "bad request".into());

        let snap = JobSnapshot::capture(&job);
        assert_eq!(snap.status, JobStatus::InProgress);
        assert_eq!(snap.total_pages, 5);
        assert_eq!(snap.total_chunks, 3);
        assert_eq!(snap.completed_chunks, 1);
        assert_eq!(snap.failed_chunks, 1);
        assert!((snap.progress_percent - 100.0 / 3.0).abs() < 1e-9);

        assert_eq!(snap.chunks[0].pages, vec![1, 2]);
        assert_eq!(snap.chunks[0].translated_text.as_deref(), Some("translated"));
        assert_eq!(snap.chunks[1].error.as_deref(), Some("waiting"));
        assert_eq!(snap.chunks[2].pages, vec![5]);
        assert_eq!(snap.chunks[2].error.as_deref(), Some("bad request"));
        assert!(snap.chunks[2].translated_text.is_none());
    }

    #[test]
    fn snapshot_serialises_without_empty_fields() {
        let job = Job::new(JobId::new(), vec![Page::new(1, "x")], 1);
        let json = serde_json::to_value(JobSnapshot::capture(&job)).unwrap();
        assert_eq!(json["status"], "in_progress");
        assert!(json["remaining_secs"].is_null());
        assert!(json.get("output").is_none());
        assert!(json["chunks"][0].get("translated_text").is_none());
    }
}
