//! # edgequake-pdf-translate
//!
//! Translate long PDF documents through rate-limited LLM APIs, a few pages
//! at a time.
//!
//! A book of a few hundred pages is far too long for one model call, and
//! free-tier quotas punish sending every page at once. This crate groups
//! pages into chunks, launches at most `max_concurrent` translation calls at
//! a steady pace, backs off when the provider answers `429`, and puts the
//! translated pages back in order once every chunk has finished, whatever
//! order they finished in.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Input      resolve local file or download from URL
//!  ├─ 2. Extract    per-page text via pdfium (spawn_blocking)
//!  ├─ 3. Partition  pages → chunks of `group_size` pages
//!  ├─ 4. Translate  semaphore + launch interval, exponential backoff on 429
//!  ├─ 5. Reassemble sort pages, split chunk translations on the page-break marker
//!  └─ 6. Output     Markdown artifact with page markers
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_pdf_translate::{TranslationConfig, TranslationEngine};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from GEMINI_API_KEY / OPENAI_API_KEY / …
//!     let config = TranslationConfig::builder()
//!         .target_language("Persian")
//!         .build()?;
//!     let engine = TranslationEngine::from_config(config)?;
//!
//!     let id = engine.submit_document("book.pdf").await?;
//!     let snapshot = engine.wait(&id).await?;
//!     eprintln!("{:?}: {}/{} chunks", snapshot.status,
//!         snapshot.completed_chunks, snapshot.total_chunks);
//!     println!("{}", engine.get_output(&id)?.path.display());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdf-translate` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-pdf-translate = { version = "0.1", default-features = false }
//! ```
//!
//! ## Free-tier defaults
//!
//! | Setting | Default | |
//! |---------|---------|---|
//! | `group_size` | 5 pages | one call per chunk |
//! | `max_concurrent` | 2 | calls in flight per job |
//! | `launch_interval` | 4 s | ≤ 15 requests per minute |
//! | `max_retries` | 3 | rate-limit retries per chunk |
//! | `retry_base_delay` | 5 s | waits of 5 s, 10 s, 20 s |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod engine;
pub mod error;
pub mod job;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod traits;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{PageMarker, TranslationConfig, TranslationConfigBuilder};
pub use engine::TranslationEngine;
pub use error::{ExtractionError, RenderError, ServiceError, TranslateError};
pub use job::{
    partition, Chunk, ChunkStatus, ChunkSummary, FailureKind, JobId, JobSnapshot, JobStatus,
    JobStore, OutputRef, Page,
};
pub use pipeline::executor::RateLimitedExecutor;
pub use pipeline::writer::{MarkdownWriter, OutputTarget};
pub use progress::{NoopProgressCallback, ProgressCallback, TranslationProgressCallback};
pub use traits::{ArtifactWriter, DocumentExtractor, ExtractedDocument, TranslatedPage, TranslationService};
