//! The translation engine: job submission and status queries.
//!
//! [`TranslationEngine::create_job`] registers a job and returns its id at
//! once; the chunks are translated by background tasks on the current Tokio
//! runtime. Callers poll [`TranslationEngine::get_status`] or await
//! [`TranslationEngine::wait`].

use crate::config::TranslationConfig;
use crate::error::TranslateError;
use crate::job::{FailureKind, Job, JobId, JobSnapshot, JobStatus, JobStore, OutputRef, Page};
use crate::pipeline::executor::RateLimitedExecutor;
use crate::pipeline::extract::PdfiumExtractor;
use crate::pipeline::input::resolve_input;
use crate::pipeline::llm::LlmTranslator;
use crate::pipeline::reassemble::{collect_pages, reassemble};
use crate::pipeline::retry::{process_chunk, RetryPolicy};
use crate::pipeline::writer::{render_document, MarkdownWriter};
use crate::progress::ProgressCallback;
use crate::traits::{ArtifactWriter, DocumentExtractor, TranslationService};
use edgequake_llm::{LLMProvider, ProviderFactory};
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{error, info, warn};

/// Model used when a provider is named without one.
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";

/// Owns the job store and the collaborators every job shares.
pub struct TranslationEngine {
    config: Arc<TranslationConfig>,
    store: Arc<JobStore>,
    service: Arc<dyn TranslationService>,
    writer: Arc<dyn ArtifactWriter>,
    extractor: Arc<dyn DocumentExtractor>,
}

impl TranslationEngine {
    /// Build an engine around an injected store, service and writer.
    ///
    /// Documents are extracted with [`PdfiumExtractor`]; replace it with
    /// [`TranslationEngine::with_extractor`].
    pub fn new(
        config: TranslationConfig,
        store: Arc<JobStore>,
        service: Arc<dyn TranslationService>,
        writer: Arc<dyn ArtifactWriter>,
    ) -> Self {
        let extractor = Arc::new(PdfiumExtractor::new(config.skip_blank_pages));
        Self {
            config: Arc::new(config),
            store,
            service,
            writer,
            extractor,
        }
    }

    /// Build the default stack: an LLM translator resolved from the config
    /// or the environment, and Markdown artifacts under `output_dir`.
    pub fn from_config(config: TranslationConfig) -> Result<Self, TranslateError> {
        let (provider, label) = resolve_provider(&config)?;
        info!("Translating with {}", label);
        let service = Arc::new(LlmTranslator::new(provider, label, &config));
        let writer = Arc::new(MarkdownWriter::into_dir(
            config.output_dir.clone(),
            config.page_marker.clone(),
        ));
        Ok(Self::new(config, Arc::new(JobStore::new()), service, writer))
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn DocumentExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_writer(mut self, writer: Arc<dyn ArtifactWriter>) -> Self {
        self.writer = writer;
        self
    }

    pub fn config(&self) -> &TranslationConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<JobStore> {
        &self.store
    }

    pub fn service_name(&self) -> &str {
        self.service.name()
    }

    /// Partition `pages` into chunks of `group_size` and start translating.
    ///
    /// Returns as soon as the job is registered. Must be called from within
    /// a Tokio runtime.
    pub fn create_job(&self, pages: Vec<Page>, group_size: usize) -> Result<JobId, TranslateError> {
        if group_size == 0 {
            return Err(TranslateError::InvalidConfig(
                "Pages per chunk must be ≥ 1".into(),
            ));
        }
        let runtime = Handle::try_current().map_err(|e| {
            TranslateError::Internal(format!("create_job must run inside a Tokio runtime: {}", e))
        })?;
        self.purge_expired();

        let job = self.store.insert(Job::new(JobId::new(), pages, group_size));
        info!(
            "Job {}: {} pages in {} chunks of up to {} pages",
            job.id(),
            job.total_pages(),
            job.chunk_count(),
            group_size
        );

        let id = job.id().clone();
        runtime.spawn(drive(job, self.runner()));
        Ok(id)
    }

    /// Resolve `input` (path or URL), extract its pages and start a job.
    ///
    /// An extraction failure still yields a job id: the job is registered as
    /// `Failed` with no chunks and the extraction error as its message.
    pub async fn submit_document(&self, input: &str) -> Result<JobId, TranslateError> {
        let extracted = match resolve_input(input, self.config.download_timeout_secs).await {
            Ok(resolved) => {
                self.extractor
                    .extract(resolved.path(), self.config.password.as_deref())
                    .await
            }
            Err(e) => Err(e),
        };

        match extracted {
            Ok(document) => {
                info!(
                    "{}: {} pages, {} with text",
                    input,
                    document.page_count,
                    document.pages.len()
                );
                self.create_job(document.pages, self.config.group_size)
            }
            Err(e) => {
                warn!("Extraction failed for {}: {}", input, e);
                self.purge_expired();
                let job = self.store.insert(Job::failed(JobId::new(), e.to_string()));
                if let Some(cb) = &self.config.progress_callback {
                    cb.on_job_complete(job.id(), JobStatus::Failed, 0, 0);
                }
                Ok(job.id().clone())
            }
        }
    }

    /// Snapshot of a job's progress.
    pub fn get_status(&self, id: &JobId) -> Result<JobSnapshot, TranslateError> {
        self.job(id).map(|job| JobSnapshot::capture(&job))
    }

    /// Reference to the written artifact.
    ///
    /// A job that failed on a fatal chunk still has its partial artifact.
    pub fn get_output(&self, id: &JobId) -> Result<OutputRef, TranslateError> {
        let job = self.job(id)?;
        if let Some(output) = job.output() {
            return Ok(output);
        }
        match job.status() {
            JobStatus::InProgress => Err(TranslateError::NotReady {
                id: id.clone(),
                progress: job.progress_percent(),
            }),
            JobStatus::Completed | JobStatus::Failed => Err(TranslateError::OutputUnavailable {
                id: id.clone(),
                reason: job
                    .error()
                    .unwrap_or_else(|| "no artifact was written".to_string()),
            }),
        }
    }

    /// The translated document as text, for completed jobs only.
    pub fn get_text(&self, id: &JobId) -> Result<String, TranslateError> {
        let job = self.job(id)?;
        match job.status() {
            JobStatus::Completed => Ok(render_document(
                &collect_pages(&job.chunks()),
                &self.config.page_marker,
            )),
            JobStatus::InProgress => Err(TranslateError::NotReady {
                id: id.clone(),
                progress: job.progress_percent(),
            }),
            JobStatus::Failed => Err(TranslateError::OutputUnavailable {
                id: id.clone(),
                reason: job.error().unwrap_or_else(|| "job failed".to_string()),
            }),
        }
    }

    /// Wait until the job is terminal and return its final snapshot.
    pub async fn wait(&self, id: &JobId) -> Result<JobSnapshot, TranslateError> {
        let job = self.job(id)?;
        let mut rx = job.subscribe();
        if let Err(e) = rx.wait_for(JobStatus::is_terminal).await {
            return Err(TranslateError::Internal(format!(
                "Status channel for job {} closed: {}",
                id, e
            )));
        }
        Ok(JobSnapshot::capture(&job))
    }

    fn job(&self, id: &JobId) -> Result<Arc<Job>, TranslateError> {
        self.store.get(id).ok_or_else(|| TranslateError::JobNotFound {
            id: id.to_string(),
        })
    }

    fn purge_expired(&self) {
        if let Some(ttl) = self.config.job_ttl {
            self.store.purge_finished(ttl);
        }
    }

    fn runner(&self) -> Runner {
        Runner {
            service: Arc::clone(&self.service),
            writer: Arc::clone(&self.writer),
            executor: RateLimitedExecutor::new(self.config.max_concurrent, self.config.launch_interval),
            policy: RetryPolicy::from_config(&self.config),
            progress: self.config.progress_callback.clone(),
        }
    }
}

/// Everything a job's background tasks need, detached from the engine.
struct Runner {
    service: Arc<dyn TranslationService>,
    writer: Arc<dyn ArtifactWriter>,
    executor: RateLimitedExecutor,
    policy: RetryPolicy,
    progress: Option<ProgressCallback>,
}

async fn drive(job: Arc<Job>, runner: Runner) {
    let Runner {
        service,
        writer,
        executor,
        policy,
        progress,
    } = runner;

    if let Some(cb) = &progress {
        cb.on_job_start(job.id(), job.chunk_count(), job.total_pages());
    }

    if job.chunk_count() == 0 {
        reassemble(&job, writer.as_ref(), progress.as_ref()).await;
        return;
    }

    let panicked = executor
        .run(job.chunk_count(), |index| {
            let job = Arc::clone(&job);
            let service = Arc::clone(&service);
            let writer = Arc::clone(&writer);
            let progress = progress.clone();
            async move {
                if process_chunk(&job, index, service.as_ref(), &policy, progress.as_ref()).await {
                    reassemble(&job, writer.as_ref(), progress.as_ref()).await;
                }
            }
        })
        .await;

    for index in panicked {
        if job.fail_chunk(index, FailureKind::Fatal, "Translation worker panicked".to_string()) {
            reassemble(&job, writer.as_ref(), progress.as_ref()).await;
        }
    }

    // Only reachable if reassembly itself panicked.
    if job.all_chunks_terminal() && !job.status().is_terminal() {
        error!("Job {}: reassembly did not finish", job.id());
        job.finish(
            JobStatus::Failed,
            None,
            Some("Reassembly of the translated document did not finish".to_string()),
        );
    }
}

/// Resolve the LLM provider, from most-specific to least-specific:
///
/// 1. **Pre-built provider** (`config.provider`), used as-is.
/// 2. **Named provider** (`config.provider_name`) with `config.model` or
///    [`DEFAULT_MODEL`]; the factory reads the matching API key from the
///    environment.
/// 3. **Environment pair** `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`.
/// 4. **Auto-detection** via `ProviderFactory::from_env`.
fn resolve_provider(
    config: &TranslationConfig,
) -> Result<(Arc<dyn LLMProvider>, String), TranslateError> {
    if let Some(provider) = &config.provider {
        let label = config.model.clone().unwrap_or_else(|| "custom".to_string());
        return Ok((Arc::clone(provider), label));
    }

    if let Some(name) = &config.provider_name {
        let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
        return create_provider(name, model);
    }

    if let (Ok(name), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !name.is_empty() && !model.is_empty() {
            return create_provider(&name, &model);
        }
    }

    let (provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| TranslateError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set GEMINI_API_KEY, OPENAI_API_KEY, or pass --provider and --model.\n\
                Error: {}",
                e
            ),
        })?;
    Ok((provider, "auto".to_string()))
}

fn create_provider(
    name: &str,
    model: &str,
) -> Result<(Arc<dyn LLMProvider>, String), TranslateError> {
    let provider = ProviderFactory::create_llm_provider(name, model).map_err(|e| {
        TranslateError::ProviderNotConfigured {
            provider: name.to_string(),
            hint: format!("{e}"),
        }
    })?;
    Ok((provider, format!("{}/{}", name, model)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{RenderError, ServiceError};
    use crate::traits::TranslatedPage;
    use async_trait::async_trait;

    struct Echo;

    #[async_trait]
    impl TranslationService for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        async fn translate(&self, text: &str) -> Result<String, ServiceError> {
            Ok(text.to_uppercase())
        }
    }

    struct Discard;

    #[async_trait]
    impl ArtifactWriter for Discard {
        async fn write(&self, _job: &JobId, pages: &[TranslatedPage]) -> Result<OutputRef, RenderError> {
            Ok(OutputRef {
                path: "/dev/null".into(),
                pages: pages.len(),
                bytes: 0,
            })
        }
    }

    fn engine() -> TranslationEngine {
        TranslationEngine::new(
            TranslationConfig::default(),
            Arc::new(JobStore::new()),
            Arc::new(Echo),
            Arc::new(Discard),
        )
    }

    #[test]
    fn create_job_needs_a_runtime() {
        let err = engine().create_job(vec![Page::new(1, "a")], 5).unwrap_err();
        assert!(matches!(err, TranslateError::Internal(_)), "got: {err}");
    }

    #[tokio::test]
    async fn zero_group_size_is_rejected() {
        let engine = engine();
        let err = engine.create_job(vec![Page::new(1, "a")], 0).unwrap_err();
        assert!(matches!(err, TranslateError::InvalidConfig(_)));
        assert!(engine.store().is_empty());
    }

    #[tokio::test]
    async fn unknown_id_is_not_found() {
        let engine = engine();
        let id = JobId::new();
        assert!(matches!(engine.get_status(&id), Err(TranslateError::JobNotFound { .. })));
        assert!(matches!(engine.get_output(&id), Err(TranslateError::JobNotFound { .. })));
        assert!(matches!(engine.wait(&id).await, Err(TranslateError::JobNotFound { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn single_chunk_job_runs_to_completion() {
        let engine = engine();
        let id = engine.create_job(vec![Page::new(1, "hello")], 5).unwrap();

        let snapshot = engine.wait(&id).await.unwrap();
        assert_eq!(snapshot.status, JobStatus::Completed);
        assert_eq!(snapshot.progress_percent, 100.0);
        assert_eq!(engine.get_output(&id).unwrap().pages, 1);
        assert_eq!(engine.get_text(&id).unwrap(), "<!-- page 1 -->\n\nHELLO\n");
        assert_eq!(engine.service_name(), "echo");
    }
}
