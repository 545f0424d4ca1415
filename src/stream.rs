//! Streaming entry points: emit events as pages complete.
//!
//! ## Why stream?
//!
//! Scanned documents take a model call per page. A stream lets callers show
//! partial text immediately, drive progress bars, or forward events over a
//! socket instead of waiting for the whole document.
//!
//! Events arrive in strict page order:
//! `page_start(1), page_complete(1), …, processing_complete`, or a single
//! `error` when the document cannot be processed at all. Dropping the stream
//! stops the pipeline before its next model call.

use crate::config::OcrConfig;
use crate::engine::{EventStream, Pipeline};
use crate::error::OcrError;
use crate::pipeline::input;
use std::sync::Arc;
use tracing::info;

/// Extract text from a path or URL, streaming events as pages finish.
///
/// # Example
/// ```rust,no_run
/// use edgequake_ocr::{extract_stream, OcrConfig, StreamEvent};
/// use futures::StreamExt;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = OcrConfig::default();
/// let mut events = extract_stream("scan.pdf", &config).await?;
/// while let Some(event) = events.next().await {
///     if let StreamEvent::PageComplete { result, .. } = event {
///         println!("Page {}: {}", result.page, result.text);
///     }
/// }
/// # Ok(())
/// # }
/// ```
pub async fn extract_stream(
    input_str: impl AsRef<str>,
    config: &OcrConfig,
) -> Result<EventStream, OcrError> {
    let input_str = input_str.as_ref();
    info!("Starting streaming extraction: {}", input_str);

    let loaded = input::load_input(input_str, config.download_timeout_secs).await?;
    let pipeline = Pipeline::from_config(config)?;
    Ok(pipeline.stream(loaded.bytes))
}

/// Streaming equivalent of [`crate::convert::extract_text_from_bytes`].
///
/// Must be called from within a tokio runtime.
pub fn extract_stream_from_bytes(
    bytes: &[u8],
    config: &OcrConfig,
) -> Result<EventStream, OcrError> {
    let pipeline = Pipeline::from_config(config)?;
    Ok(pipeline.stream(Arc::<[u8]>::from(bytes)))
}
