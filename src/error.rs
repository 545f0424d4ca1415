//! Error types for the edgequake-ocr library.
//!
//! Three error types reflect three distinct failure modes:
//!
//! * [`OcrError`] — **Fatal**: the document cannot be processed at all
//!   (unparseable PDF, undecodable image, provider not configured). Returned
//!   as `Err(OcrError)` from the top-level entry points, and surfaced by the
//!   pipeline as `DocumentResult { success: false, .. }` or a single
//!   `error` stream event.
//!
//! * [`PageError`] — **Page-scoped**: one page failed to render or to be
//!   recognised. Its message is stored in [`crate::output::PageResult::error`]
//!   and processing continues with the next page.
//!
//! * [`ModelError`] — what a recognition collaborator returns. The
//!   recognition stage turns it into a [`PageError`] once retries run out.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-ocr library.
///
/// Page-level failures use [`PageError`] and are stored in
/// [`crate::output::PageResult`] rather than propagated here.
#[derive(Debug, Error)]
pub enum OcrError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("File not found: '{path}'\nCheck the path exists and is readable.")]
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

    // ── Document errors ───────────────────────────────────────────────────
    /// The buffer carries the PDF signature but its structure cannot be
    /// parsed, so no page boundary is knowable.
    #[error("Malformed document: {detail}")]
    MalformedDocument { detail: String },

    /// The buffer is neither a PDF nor a decodable raster image.
    #[error("Cannot open image: {detail}")]
    UnsupportedInputFormat { detail: String },

    // ── Delivery errors ───────────────────────────────────────────────────
    /// A streaming client sent a message that is not a valid request.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    // ── Model errors ──────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── Output errors ─────────────────────────────────────────────────────
    /// Failed to write the output file.
    #[error("Failed to write output to '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed, or a required backend is unavailable.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single page.
///
/// The pipeline records its message in the page's
/// [`crate::output::PageResult`] and moves on to the next page.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum PageError {
    /// Page rasterisation failed.
    #[error("Page {page}: rasterisation failed: {detail}")]
    RenderFailed { page: usize, detail: String },

    /// The recognition call failed after retries.
    #[error("Page {page}: recognition failed after {retries} retries: {detail}")]
    RecognitionFailed {
        page: usize,
        retries: u32,
        detail: String,
    },

    /// The recognition call timed out on its final attempt.
    #[error("Page {page}: recognition timed out after {secs}s")]
    Timeout { page: usize, secs: u64 },

    /// The preview thumbnail could not be produced.
    #[error("Page {page}: preview generation failed: {detail}")]
    PreviewFailed { page: usize, detail: String },
}

impl PageError {
    /// 1-based index of the page this error belongs to.
    pub fn page(&self) -> usize {
        match self {
            PageError::RenderFailed { page, .. }
            | PageError::RecognitionFailed { page, .. }
            | PageError::Timeout { page, .. }
            | PageError::PreviewFailed { page, .. } => *page,
        }
    }
}

/// Failure reported by a [`crate::model::RecognitionModel`].
#[derive(Debug, Error)]
pub enum ModelError {
    /// The image could not be encoded for the request body.
    #[error("image encoding failed: {0}")]
    Encode(#[from] image::ImageError),

    /// The provider rejected the call or returned no usable content.
    #[error("{0}")]
    Provider(String),
}
