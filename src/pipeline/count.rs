//! Page counting from the PDF page tree.
//!
//! Parses the cross-reference table and the catalog's page tree with
//! `lopdf`; no page content is decoded and nothing is rasterised. Works the
//! same whichever render strategy is active.

use crate::error::OcrError;
use lopdf::Document;
use tracing::debug;

/// Count the pages of a PDF buffer.
///
/// # Errors
/// [`OcrError::MalformedDocument`] when the structure cannot be parsed or
/// the catalog is missing. A well-formed document whose page tree is empty
/// counts as 0 pages.
pub fn count_pages(buf: &[u8]) -> Result<usize, OcrError> {
    let document = Document::load_mem(buf).map_err(|e| OcrError::MalformedDocument {
        detail: format!("cannot parse PDF structure: {e}"),
    })?;

    document
        .catalog()
        .map_err(|e| OcrError::MalformedDocument {
            detail: format!("missing document catalog: {e}"),
        })?;

    let total = document.get_pages().len();
    debug!("Page tree lists {} pages", total);
    Ok(total)
}

/// Async wrapper: parsing a large PDF is CPU-bound, so it runs in
/// `spawn_blocking` like rendering does.
pub async fn count_pages_async(buf: std::sync::Arc<[u8]>) -> Result<usize, OcrError> {
    tokio::task::spawn_blocking(move || count_pages(&buf))
        .await
        .map_err(|e| OcrError::Internal(format!("Page count task panicked: {e}")))?
}
