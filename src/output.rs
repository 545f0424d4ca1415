//! Result types produced by the pipeline.
//!
//! [`PageResult`] is the per-page record shared by both execution modes.
//! Eager mode gathers them into a [`DocumentResult`]; lazy mode wraps each
//! one in a [`StreamEvent::PageComplete`] as soon as it exists. The serde
//! shapes are the wire format seen by batch and streaming consumers.

use crate::error::PageError;
use crate::pipeline::detect::DocumentFormat;
use serde::{Deserialize, Serialize};

/// Outcome of one page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageStatus {
    Completed,
    Error,
}

/// Recognition result for a single page.
///
/// Exactly one exists per page, and `page` is 1-based.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageResult {
    pub page: usize,
    /// Normalised text; empty when the page failed.
    pub text: String,
    /// Human-readable failure message when `status` is `Error`.
    pub error: Option<String>,
    pub status: PageStatus,
    /// JPEG thumbnail as a `data:` URI.
    pub preview: Option<String>,
}

impl PageResult {
    pub fn completed(page: usize, text: String, preview: Option<String>) -> Self {
        Self {
            page,
            text,
            error: None,
            status: PageStatus::Completed,
            preview,
        }
    }

    pub fn failed(error: &PageError) -> Self {
        Self {
            page: error.page(),
            text: String::new(),
            error: Some(error.to_string()),
            status: PageStatus::Error,
            preview: None,
        }
    }

    pub fn is_error(&self) -> bool {
        self.status == PageStatus::Error
    }
}

/// Result of an eager (batch) run over a whole document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentResult {
    pub success: bool,
    /// Page records in ascending page order.
    pub pages: Vec<PageResult>,
    pub total_pages: usize,
    pub error: Option<String>,
}

impl DocumentResult {
    /// A fully iterated document. Some pages may still carry errors.
    pub fn completed(pages: Vec<PageResult>) -> Self {
        Self {
            success: true,
            total_pages: pages.len(),
            pages,
            error: None,
        }
    }

    /// A document that failed before any page result existed.
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            pages: Vec::new(),
            total_pages: 0,
            error: Some(error.into()),
        }
    }

    /// Number of pages that finished without error.
    pub fn completed_pages(&self) -> usize {
        self.pages.iter().filter(|p| !p.is_error()).count()
    }
}

/// One message of a lazy (streaming) run.
///
/// For a successful run the sequence is `PageStart(1), PageComplete(1), …,
/// ProcessingComplete`. A fatal error replaces the remainder of the stream
/// with a single `Error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    PageStart {
        page: usize,
        total_pages: usize,
    },
    PageComplete {
        #[serde(flatten)]
        result: PageResult,
        total_pages: usize,
    },
    ProcessingComplete {
        total_pages: usize,
    },
    Error {
        error: String,
    },
}

impl StreamEvent {
    /// Whether no further events follow this one.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StreamEvent::ProcessingComplete { .. } | StreamEvent::Error { .. }
        )
    }

    /// The wire `type` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            StreamEvent::PageStart { .. } => "page_start",
            StreamEvent::PageComplete { .. } => "page_complete",
            StreamEvent::ProcessingComplete { .. } => "processing_complete",
            StreamEvent::Error { .. } => "error",
        }
    }

    /// Page index the event refers to, if any.
    pub fn page(&self) -> Option<usize> {
        match self {
            StreamEvent::PageStart { page, .. } => Some(*page),
            StreamEvent::PageComplete { result, .. } => Some(result.page),
            _ => None,
        }
    }
}

/// Document facts available without a model or a renderer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentInfo {
    pub format: DocumentFormat,
    pub total_pages: usize,
    pub byte_len: usize,
}
