//! Per-chunk retry state machine.
//!
//! ## Strategy
//!
//! Only rate-limit errors are worth waiting for: the provider has told us it
//! will accept the same request later. Anything else (bad key, content
//! filter, malformed request) will fail again, so the chunk fails at once.
//!
//! The wait after failed attempt `k` is `base_delay · 2^k`. With the default
//! 5 s base and 3 retries the sequence is 5 s → 10 s → 20 s, long enough for
//! per-minute quotas to refill.
//!
//! Exhausting the retries fails the chunk but not the job: one throttled
//! chunk should not throw away the rest of a long document.

use crate::config::TranslationConfig;
use crate::error::ServiceError;
use crate::job::{ChunkStatus, FailureKind, Job};
use crate::progress::ProgressCallback;
use crate::traits::TranslationService;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

/// How a service error is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Quota / rate limit: back off and retry.
    Transient,
    /// Anything else: fail the chunk.
    Fatal,
}

/// Retry limits for one chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    pub fn from_config(config: &TranslationConfig) -> Self {
        Self::new(config.max_retries, config.retry_base_delay)
    }

    /// Delay after failed attempt `attempt` (0 = the initial try).
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
    }

    pub fn classify(error: &ServiceError) -> ErrorClass {
        if error.is_transient() {
            ErrorClass::Transient
        } else {
            ErrorClass::Fatal
        }
    }
}

/// Final result of running a chunk through the policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkOutcome {
    Completed { translated: String, retries: u32 },
    Failed { kind: FailureKind, message: String },
}

/// Call the service for chunk `index` until it succeeds, fails fatally, or
/// runs out of retries.
///
/// Updates the chunk's non-terminal status (`Running`, `Retrying`) as it
/// goes; the terminal transition is left to the caller.
pub async fn translate_with_retry(
    job: &Job,
    index: usize,
    service: &dyn TranslationService,
    policy: &RetryPolicy,
    progress: Option<&ProgressCallback>,
) -> ChunkOutcome {
    let Some(text) = job.source_text(index) else {
        return ChunkOutcome::Failed {
            kind: FailureKind::Fatal,
            message: format!("Chunk {} does not exist", index),
        };
    };

    job.set_chunk_status(index, ChunkStatus::Running, None);
    let mut attempt = 0;

    loop {
        let error = match service.translate(&text).await {
            Ok(translated) => {
                return ChunkOutcome::Completed {
                    translated,
                    retries: attempt,
                }
            }
            Err(e) => e,
        };

        match RetryPolicy::classify(&error) {
            ErrorClass::Fatal => {
                return ChunkOutcome::Failed {
                    kind: FailureKind::Fatal,
                    message: error.message().to_string(),
                };
            }
            ErrorClass::Transient if attempt >= policy.max_retries => {
                return ChunkOutcome::Failed {
                    kind: FailureKind::RetriesExhausted,
                    message: format!(
                        "Rate limit exceeded after {} retries: {}",
                        policy.max_retries,
                        error.message()
                    ),
                };
            }
            ErrorClass::Transient => {
                let delay = policy.backoff(attempt);
                attempt += 1;
                warn!(
                    "Job {} chunk {}: rate limited, retry {}/{} in {:?} ({})",
                    job.id(),
                    index,
                    attempt,
                    policy.max_retries,
                    delay,
                    error.message()
                );
                job.set_chunk_status(
                    index,
                    ChunkStatus::Retrying { attempt },
                    Some(format!(
                        "Retrying after rate limit error (attempt {}/{})",
                        attempt, policy.max_retries
                    )),
                );
                if let Some(cb) = progress {
                    cb.on_chunk_retry(job.id(), index, attempt, delay, error.message());
                }
                sleep(delay).await;
            }
        }
    }
}

/// Run chunk `index` to a terminal state and record it on the job.
///
/// Returns `true` if this chunk was the last one to become terminal, in
/// which case the caller must reassemble the job.
pub async fn process_chunk(
    job: &Job,
    index: usize,
    service: &dyn TranslationService,
    policy: &RetryPolicy,
    progress: Option<&ProgressCallback>,
) -> bool {
    let total = job.chunk_count();
    let start = Instant::now();
    if let Some(cb) = progress {
        cb.on_chunk_start(job.id(), index, total);
    }

    match translate_with_retry(job, index, service, policy, progress).await {
        ChunkOutcome::Completed { translated, retries } => {
            debug!(
                "Job {} chunk {}: translated {} bytes in {:?} ({} retries)",
                job.id(),
                index,
                translated.len(),
                start.elapsed(),
                retries
            );
            let len = translated.len();
            let last = job.complete_chunk(index, translated);
            if let Some(cb) = progress {
                cb.on_chunk_complete(job.id(), index, total, len);
            }
            last
        }
        ChunkOutcome::Failed { kind, message } => {
            warn!("Job {} chunk {}: failed ({:?}): {}", job.id(), index, kind, message);
            let last = job.fail_chunk(index, kind, message.clone());
            if let Some(cb) = progress {
                cb.on_chunk_error(job.id(), index, total, &message);
            }
            last
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{JobId, Page};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    struct Scripted {
        script: Mutex<VecDeque<Result<String, ServiceError>>>,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn new(script: Vec<Result<String, ServiceError>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl TranslationService for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn translate(&self, text: &str) -> Result<String, ServiceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(format!("T({text})")))
        }
    }

    fn rate_limited() -> Result<String, ServiceError> {
        Err(ServiceError::from_message("429 Resource has been exhausted (e.g. check quota)"))
    }

    fn assert_waited(start: Instant, expected: Duration) {
        let waited = start.elapsed();
        assert!(
            waited >= expected && waited < expected + Duration::from_millis(50),
            "waited {waited:?}, expected {expected:?}"
        );
    }

    fn single_chunk_job() -> Job {
        Job::new(JobId::new(), vec![Page::new(1, "hello")], 5)
    }

    #[test]
    fn backoff_doubles_from_base() {
        let policy = RetryPolicy::new(3, Duration::from_secs(5));
        assert_eq!(policy.backoff(0), Duration::from_secs(5));
        assert_eq!(policy.backoff(1), Duration::from_secs(10));
        assert_eq!(policy.backoff(2), Duration::from_secs(20));
        assert_eq!(
            RetryPolicy::new(3, Duration::from_millis(1)).backoff(40),
            Duration::from_millis(u32::MAX as u64)
        );
    }

    #[test]
    fn classification() {
        assert_eq!(RetryPolicy::classify(&rate_limited().unwrap_err()), ErrorClass::Transient);
        assert_eq!(
            RetryPolicy::classify(&ServiceError::from_message("permission denied")),
            ErrorClass::Fatal
        );
    }

    #[tokio::test(start_paused = true)]
    async fn two_rate_limits_then_success_waits_fifteen_seconds() {
        let job = single_chunk_job();
        let service = Scripted::new(vec![rate_limited(), rate_limited(), Ok("سلام".into())]);
        let policy = RetryPolicy::new(3, Duration::from_secs(5));

        let start = Instant::now();
        let last = process_chunk(&job, 0, &service, &policy, None).await;

        assert_waited(start, Duration::from_secs(15));
        assert!(last);
        assert_eq!(service.calls.load(Ordering::SeqCst), 3);
        let chunk = job.chunk(0).unwrap();
        assert_eq!(chunk.status, ChunkStatus::Completed);
        assert_eq!(chunk.translated_text, "سلام");
        assert_eq!(job.completed_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_error_fails_without_sleeping() {
        let job = single_chunk_job();
        let service = Scripted::new(vec![Err(ServiceError::from_message("API key not valid"))]);
        let policy = RetryPolicy::new(3, Duration::from_secs(5));

        let start = Instant::now();
        let outcome = translate_with_retry(&job, 0, &service, &policy, None).await;

        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(
            outcome,
            ChunkOutcome::Failed {
                kind: FailureKind::Fatal,
                message: "API key not valid".into()
            }
        );
        assert_eq!(service.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_fail_the_chunk() {
        let job = single_chunk_job();
        let service = Scripted::new((0..4).map(|_| rate_limited()).collect());
        let policy = RetryPolicy::new(3, Duration::from_secs(5));

        let start = Instant::now();
        assert!(process_chunk(&job, 0, &service, &policy, None).await);

        assert_waited(start, Duration::from_secs(5 + 10 + 20));
        assert_eq!(service.calls.load(Ordering::SeqCst), 4);
        let chunk = job.chunk(0).unwrap();
        assert_eq!(chunk.status, ChunkStatus::Failed);
        assert_eq!(chunk.failure, Some(FailureKind::RetriesExhausted));
        let error = chunk.error.unwrap();
        assert!(error.starts_with("Rate limit exceeded after 3 retries"), "got: {error}");
    }

    #[tokio::test(start_paused = true)]
    async fn zero_retries_fails_on_first_rate_limit() {
        let job = single_chunk_job();
        let service = Scripted::new(vec![rate_limited()]);
        let outcome =
            translate_with_retry(&job, 0, &service, &RetryPolicy::new(0, Duration::from_secs(5)), None)
                .await;
        assert!(matches!(
            outcome,
            ChunkOutcome::Failed {
                kind: FailureKind::RetriesExhausted,
                ..
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn status_shows_retry_while_backing_off() {
        let job = Arc::new(single_chunk_job());
        let service = Arc::new(Scripted::new(vec![rate_limited()]));
        let policy = RetryPolicy::new(3, Duration::from_secs(5));

        let worker = {
            let job = Arc::clone(&job);
            let service = Arc::clone(&service);
            tokio::spawn(async move { process_chunk(&job, 0, service.as_ref(), &policy, None).await })
        };

        sleep(Duration::from_secs(1)).await;
        let chunk = job.chunk(0).unwrap();
        assert_eq!(chunk.status, ChunkStatus::Retrying { attempt: 1 });
        assert_eq!(
            chunk.error.as_deref(),
            Some("Retrying after rate limit error (attempt 1/3)")
        );

        assert!(worker.await.unwrap());
        assert_eq!(job.chunk(0).unwrap().status, ChunkStatus::Completed);
    }
}
