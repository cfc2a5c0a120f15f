//! Configuration types for chunked document translation.
//!
//! All pipeline behaviour is controlled through [`TranslationConfig`], built
//! via its [`TranslationConfigBuilder`]. The defaults are tuned for free-tier
//! LLM quotas: two calls in flight, a new call at most every four seconds,
//! and a generous backoff when the provider answers `429`.

use crate::error::TranslateError;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Configuration for a translation job.
///
/// # Example
/// ```rust
/// use edgequake_pdf_translate::TranslationConfig;
/// use std::time::Duration;
///
/// let config = TranslationConfig::builder()
///     .group_size(10)
///     .max_concurrent(4)
///     .launch_interval(Duration::from_secs(1))
///     .target_language("German")
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct TranslationConfig {
    /// Pages per chunk, i.e. per translation call. Default: 5.
    ///
    /// Larger chunks mean fewer calls (good for request-count quotas) but
    /// longer responses and more text lost when a single call fails.
    pub group_size: usize,

    /// Maximum translation calls in flight for one job. Default: 2.
    pub max_concurrent: usize,

    /// Minimum delay between two successive call launches. Default: 4 s.
    ///
    /// Applied even when a concurrency slot is free, so the request rate
    /// never exceeds `1 / launch_interval`.
    pub launch_interval: Duration,

    /// Retries after a rate-limit error. Default: 3.
    ///
    /// Only rate-limit / quota errors are retried; anything else fails the
    /// chunk immediately.
    pub max_retries: u32,

    /// Base of the exponential backoff. Default: 5 s.
    ///
    /// The wait after failed attempt `k` is `retry_base_delay · 2^k`:
    /// 5 s → 10 s → 20 s with the defaults.
    pub retry_base_delay: Duration,

    /// LLM model identifier, e.g. "gemini-2.0-flash", "gpt-4.1-mini".
    pub model: Option<String>,

    /// LLM provider name (e.g. "gemini", "openai", "ollama").
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature. Default: 0.2.
    pub temperature: f32,

    /// Maximum tokens per translation call. Default: 8192.
    ///
    /// A five-page chunk of dense prose translates to roughly 4–6k tokens.
    pub max_tokens: usize,

    /// Language of the source document. Default: "English".
    pub source_language: String,

    /// Language to translate into. Default: "Persian".
    pub target_language: String,

    /// Custom system prompt. If None, built from the languages.
    pub system_prompt: Option<String>,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Drop pages whose text layer is empty before chunking. Default: true.
    pub skip_blank_pages: bool,

    /// Marker written before every page of the output. Default: comment.
    pub page_marker: PageMarker,

    /// Directory for `{job_id}_translated.md` artifacts. Default: "outputs".
    pub output_dir: PathBuf,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Per-call timeout for the translation service in seconds. Default: 180.
    pub api_timeout_secs: u64,

    /// Evict finished jobs from the store after this long. Default: never.
    pub job_ttl: Option<Duration>,

    /// Receives per-chunk progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            group_size: 5,
            max_concurrent: 2,
            launch_interval: Duration::from_secs(4),
            max_retries: 3,
            retry_base_delay: Duration::from_secs(5),
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.2,
            max_tokens: 8192,
            source_language: "English".to_string(),
            target_language: "Persian".to_string(),
            system_prompt: None,
            password: None,
            skip_blank_pages: true,
            page_marker: PageMarker::default(),
            output_dir: PathBuf::from("outputs"),
            download_timeout_secs: 120,
            api_timeout_secs: 180,
            job_ttl: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for TranslationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TranslationConfig")
            .field("group_size", &self.group_size)
            .field("max_concurrent", &self.max_concurrent)
            .field("launch_interval", &self.launch_interval)
            .field("max_retries", &self.max_retries)
            .field("retry_base_delay", &self.retry_base_delay)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("source_language", &self.source_language)
            .field("target_language", &self.target_language)
            .field("page_marker", &self.page_marker)
            .field("output_dir", &self.output_dir)
            .field("job_ttl", &self.job_ttl)
            .finish()
    }
}

impl TranslationConfig {
    /// Create a new builder for `TranslationConfig`.
    pub fn builder() -> TranslationConfigBuilder {
        TranslationConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`TranslationConfig`].
#[derive(Debug)]
pub struct TranslationConfigBuilder {
    config: TranslationConfig,
}

impl TranslationConfigBuilder {
    pub fn group_size(mut self, pages: usize) -> Self {
        self.config.group_size = pages;
        self
    }

    pub fn max_concurrent(mut self, n: usize) -> Self {
        self.config.max_concurrent = n;
        self
    }

    pub fn launch_interval(mut self, interval: Duration) -> Self {
        self.config.launch_interval = interval;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_base_delay(mut self, delay: Duration) -> Self {
        self.config.retry_base_delay = delay;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn source_language(mut self, lang: impl Into<String>) -> Self {
        self.config.source_language = lang.into();
        self
    }

    pub fn target_language(mut self, lang: impl Into<String>) -> Self {
        self.config.target_language = lang.into();
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn skip_blank_pages(mut self, v: bool) -> Self {
        self.config.skip_blank_pages = v;
        self
    }

    pub fn page_marker(mut self, marker: PageMarker) -> Self {
        self.config.page_marker = marker;
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs.max(1);
        self
    }

    pub fn job_ttl(mut self, ttl: Duration) -> Self {
        self.config.job_ttl = Some(ttl);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<TranslationConfig, TranslateError> {
        let c = &self.config;
        if c.group_size == 0 {
            return Err(TranslateError::InvalidConfig(
                "Pages per chunk must be ≥ 1".into(),
            ));
        }
        if c.max_concurrent == 0 {
            return Err(TranslateError::InvalidConfig(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        if c.target_language.trim().is_empty() {
            return Err(TranslateError::InvalidConfig(
                "Target language must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}

/// Marker inserted before each page of the reassembled document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageMarker {
    /// HTML comment: "<!-- page N -->". (default)
    #[default]
    Comment,
    /// Markdown heading: "## Page N".
    Heading,
    /// Custom line; `{page}` is replaced with the page number.
    Custom(String),
}

impl PageMarker {
    /// Render the marker line for the given 1-indexed page number.
    pub fn render(&self, page_number: usize) -> String {
        match self {
            PageMarker::Comment => format!("<!-- page {} -->", page_number),
            PageMarker::Heading => format!("## Page {}", page_number),
            PageMarker::Custom(template) => template.replace("{page}", &page_number.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_free_tier_limits() {
        let c = TranslationConfig::default();
        assert_eq!(c.group_size, 5);
        assert_eq!(c.max_concurrent, 2);
        assert_eq!(c.launch_interval, Duration::from_secs(4));
        assert_eq!(c.max_retries, 3);
        assert_eq!(c.retry_base_delay, Duration::from_secs(5));
    }

    #[test]
    fn build_rejects_zero_group_size() {
        let err = TranslationConfig::builder().group_size(0).build().unwrap_err();
        assert!(err.to_string().contains("Pages per chunk"), "got: {err}");
    }

    #[test]
    fn build_rejects_zero_concurrency() {
        assert!(TranslationConfig::builder().max_concurrent(0).build().is_err());
    }

    #[test]
    fn temperature_is_clamped() {
        let c = TranslationConfig::builder().temperature(9.0).build().unwrap();
        assert_eq!(c.temperature, 2.0);
    }

    #[test]
    fn page_markers() {
        assert_eq!(PageMarker::Comment.render(3), "<!-- page 3 -->");
        assert_eq!(PageMarker::Heading.render(12), "## Page 12");
        assert_eq!(PageMarker::Custom("— {page} —".into()).render(7), "— 7 —");
    }

    #[test]
    fn debug_hides_provider() {
        let dbg = format!("{:?}", TranslationConfig::default());
        assert!(dbg.contains("group_size: 5"));
        assert!(!dbg.contains("progress_callback"));
    }
}
