//! Delivery adapters: the two shapes results leave the crate in.
//!
//! * **Batch**: [`BatchResponse`] maps an eager [`DocumentResult`] onto the
//!   upload-endpoint payload, including the combined `text` built by
//!   [`assemble_text`].
//! * **Streaming**: [`serve_stream`] takes the client's single
//!   [`StreamRequest`] message, runs the lazy pipeline and pushes every
//!   [`StreamEvent`] as one JSON text message into any `futures::Sink`, such
//!   as a WebSocket writer or a channel.
//!
//! The transport itself (HTTP server, socket framing) belongs to the caller.

use crate::engine::Pipeline;
use crate::error::OcrError;
use crate::output::{DocumentResult, PageResult, StreamEvent};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use futures::{Sink, SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Language tag assumed when a streaming request names none.
pub const DEFAULT_LANG: &str = "eng";

// ── Batch ────────────────────────────────────────────────────────────────────

/// Upload-endpoint payload.
///
/// Success: `{success, filename, lang, text, pages, total_pages}`.
/// Failure: `{success: false, error, filename}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchResponse {
    pub success: bool,
    pub filename: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lang: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pages: Option<Vec<PageResult>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_pages: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BatchResponse {
    /// Map an eager result. `lang` is echoed back untouched.
    pub fn from_result(result: DocumentResult, filename: impl Into<String>, lang: &str) -> Self {
        let filename = filename.into();
        if !result.success {
            let detail = result.error.unwrap_or_else(|| "Unknown error".to_string());
            return Self::failure(filename, format!("OCR failed: {detail}"));
        }

        Self {
            success: true,
            filename,
            lang: Some(lang.to_string()),
            text: Some(assemble_text(&result.pages)),
            total_pages: Some(result.total_pages),
            pages: Some(result.pages),
            error: None,
        }
    }

    /// A failure payload for errors raised before a result existed.
    pub fn failure(filename: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            filename: filename.into(),
            lang: None,
            text: None,
            pages: None,
            total_pages: None,
            error: Some(error.into()),
        }
    }
}

/// Combine page texts into the batch `text` field.
///
/// A single page yields its text unchanged. Several pages each get a
/// `Page N:` header and are separated by a blank line; failed pages read
/// `Page N: ERROR - <error>` and blank ones `Page N: No readable text found`.
pub fn assemble_text(pages: &[PageResult]) -> String {
    if let [only] = pages {
        return only.text.clone();
    }

    pages
        .iter()
        .map(|p| match &p.error {
            Some(error) => format!("Page {}: ERROR - {}", p.page, error),
            None if p.text.trim().is_empty() => {
                format!("Page {}: No readable text found", p.page)
            }
            None => format!("Page {}:\n{}", p.page, p.text),
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

// ── Streaming ────────────────────────────────────────────────────────────────

/// The single message a streaming client sends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamRequest {
    /// Base64-encoded document bytes.
    pub file_data: String,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default = "default_lang")]
    pub lang: String,
}

fn default_lang() -> String {
    DEFAULT_LANG.to_string()
}

impl StreamRequest {
    pub fn parse(message: &str) -> Result<Self, OcrError> {
        serde_json::from_str(message).map_err(|e| OcrError::InvalidRequest(e.to_string()))
    }

    /// Decode `file_data` into document bytes.
    pub fn decode(&self) -> Result<Vec<u8>, OcrError> {
        STANDARD
            .decode(self.file_data.trim())
            .map_err(|e| OcrError::InvalidRequest(format!("file_data is not valid base64: {e}")))
    }
}

/// Serve one streaming request into `sink`.
///
/// Each event is serialised as one JSON text message. A malformed request
/// produces a single `error` event. `pacing` adds a delay after every
/// message, usually [`Pipeline::event_pacing`]; pass `Duration::ZERO` to
/// rely on the transport's own ordering.
///
/// # Errors
/// Returns the sink's error when a send fails (the client went away). The
/// event stream is dropped on return, which stops the pipeline before its
/// next model call.
pub async fn serve_stream<S>(
    pipeline: &Pipeline,
    message: &str,
    mut sink: S,
    pacing: Duration,
) -> Result<(), S::Error>
where
    S: Sink<String> + Unpin,
    S::Error: std::fmt::Display,
{
    let bytes = match StreamRequest::parse(message).and_then(|req| {
        info!(
            "Streaming request: {} (lang {})",
            req.filename.as_deref().unwrap_or("<unnamed>"),
            req.lang
        );
        req.decode()
    }) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!("Rejected streaming request: {}", e);
            let event = StreamEvent::Error {
                error: e.to_string(),
            };
            return send_event(&mut sink, &event, pacing).await;
        }
    };

    let mut events = pipeline.stream(bytes);
    while let Some(event) = events.next().await {
        if let Err(e) = send_event(&mut sink, &event, pacing).await {
            warn!("Client disconnected: {}", e);
            return Err(e);
        }
    }

    debug!("Streaming request finished");
    Ok(())
}

async fn send_event<S>(sink: &mut S, event: &StreamEvent, pacing: Duration) -> Result<(), S::Error>
where
    S: Sink<String> + Unpin,
{
    let text = match serde_json::to_string(event) {
        Ok(text) => text,
        Err(e) => {
            warn!("Event could not be serialised: {}", e);
            return Ok(());
        }
    };
    debug!("Sending {} event", event.kind());
    sink.send(text).await?;
    if !pacing.is_zero() {
        tokio::time::sleep(pacing).await;
    }
    Ok(())
}
