//! Error types for the edgequake-pdf-translate library.
//!
//! Failures live at three levels, and each level has its own type:
//!
//! * [`ServiceError`]: one call to the translation service failed. These
//!   never leave the retry loop: they become a chunk's `error` string and
//!   possibly a [`crate::job::FailureKind`].
//!
//! * [`ExtractionError`] / [`RenderError`]: document-level failures before
//!   any chunk runs, or after all chunks finished. They fail the whole job and
//!   their message is stored on it verbatim.
//!
//! * [`TranslateError`]: what the public engine API returns: bad
//!   configuration, unknown job ids, outputs that are not ready yet.
//!
//! Status queries report chunk and job failures inside the snapshot rather
//! than as `Err`, so a caller polling a job never loses its partial results.

use crate::job::JobId;
use std::path::PathBuf;
use thiserror::Error;

/// Errors returned by the public [`crate::engine::TranslationEngine`] API.
#[derive(Debug, Error)]
pub enum TranslateError {
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// No job with this id is registered (never created, or evicted).
    #[error("Job not found: {id}")]
    JobNotFound { id: String },

    /// The job exists but is still running.
    #[error("Job {id} is still in progress ({progress:.1}% complete)")]
    NotReady { id: JobId, progress: f64 },

    /// The job finished without producing an artifact.
    #[error("Job {id} produced no output: {reason}")]
    OutputUnavailable { id: JobId, reason: String },

    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    Render(#[from] RenderError),

    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A failed call to the translation service.
///
/// The retry policy decides from this value whether the chunk is retried;
/// see [`ServiceError::is_transient`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ServiceError {
    /// The service signalled quota exhaustion or throttling (HTTP 429).
    #[error("Rate limited: {message}")]
    RateLimited { message: String },

    /// Any other failure reported by the service or the transport.
    #[error("{message}")]
    Failed { message: String },
}

impl ServiceError {
    /// Classify a raw error message reported by a provider.
    ///
    /// Providers surface throttling in many shapes (`429 Too Many Requests`,
    /// `RESOURCE_EXHAUSTED: quota`, `rate limit reached`), so the match is on
    /// the message text.
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        if mentions_rate_limit(&message) {
            ServiceError::RateLimited { message }
        } else {
            ServiceError::Failed { message }
        }
    }

    /// `true` if waiting and retrying is expected to help.
    pub fn is_transient(&self) -> bool {
        match self {
            ServiceError::RateLimited { .. } => true,
            ServiceError::Failed { message } => mentions_rate_limit(message),
        }
    }

    /// The message as reported by the service, without the category prefix.
    pub fn message(&self) -> &str {
        match self {
            ServiceError::RateLimited { message } | ServiceError::Failed { message } => message,
        }
    }
}

fn mentions_rate_limit(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("quota") || lower.contains("rate limit") || lower.contains("429")
}

/// Document pre-processing failed; the job fails before any chunk exists.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a valid file path or URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}\nTry repairing with: qpdf --decrypt input.pdf output.pdf")]
    CorruptPdf { path: PathBuf, detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF '{path}' is encrypted and requires a password.\nProvide it with --password <PASSWORD>.")]
    PasswordRequired { path: PathBuf },

    /// A password was provided but it is wrong.
    #[error("Wrong password for PDF '{path}'")]
    WrongPassword { path: PathBuf },

    /// pdfium returned an error while reading a page's text layer.
    #[error("Text extraction failed for page {page}: {detail}")]
    PageText { page: usize, detail: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Install libpdfium next to the binary or in a system library path,\n\
or set PDFIUM_LIB_PATH=/path/to/libpdfium.\n"
    )]
    PdfiumBindingFailed(String),

    /// Unexpected failure while extracting (task panic, temp dir error).
    #[error("Extraction failed: {0}")]
    Internal(String),
}

/// Writing the reassembled artifact failed; the job fails after its chunks.
#[derive(Debug, Error)]
pub enum RenderError {
    /// Could not create or write the output file.
    #[error("Failed to write output file '{path}': {source}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The writer rejected the page set.
    #[error("Cannot render document: {0}")]
    Invalid(String),
}
