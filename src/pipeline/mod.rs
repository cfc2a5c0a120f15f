//! Pipeline stages for chunked document translation.
//!
//! Each submodule implements one step, so each is testable on its own and
//! the I/O-bound ones can be swapped through the traits in [`crate::traits`].
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ extract ──▶ partition ──▶ executor ──▶ retry ──▶ reassemble ──▶ writer
//! (URL/path) (pdfium)   (job::chunk)  (throttle)   (LLM)     (order)        (Markdown)
//! ```
//!
//! 1. [`input`]:     canonicalise the user-supplied path or URL to a local file
//! 2. [`extract`]:   per-page text; runs in `spawn_blocking` because pdfium
//!    is not async-safe
//! 3. [`executor`]:  launch one worker per chunk under the concurrency cap
//!    and the launch interval
//! 4. [`retry`]:     drive one chunk through the service with backoff on
//!    rate limits; [`llm`] is the default service and [`postprocess`] cleans
//!    its output
//! 5. [`reassemble`]:order the finished pages and hand them to [`writer`]

pub mod executor;
pub mod extract;
pub mod input;
pub mod llm;
pub mod postprocess;
pub mod reassemble;
pub mod retry;
pub mod writer;
