//! Eager (whole-document) entry points.
//!
//! ## Why eager vs. streaming?
//!
//! This module provides the simpler API: wait for every page, then return
//! one [`DocumentResult`]. Use [`crate::stream::extract_stream`] instead when
//! the caller wants pages as they finish.
//!
//! ## Two kinds of failure
//!
//! `Err(OcrError)` means the call never reached a document: the input could
//! not be loaded, or no provider/renderer could be set up. Once the bytes
//! are in hand, a fatal document error (malformed PDF, undecodable image) is
//! reported as `Ok(DocumentResult { success: false, .. })`, the same shape
//! the batch delivery surface returns.

use crate::config::OcrConfig;
use crate::delivery::assemble_text;
use crate::engine::Pipeline;
use crate::error::OcrError;
use crate::output::{DocumentInfo, DocumentResult};
use crate::pipeline::{count, detect, input, preprocess};
use crate::pipeline::detect::DocumentFormat;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Extract text from a PDF or image given as a local path or URL.
///
/// Builds a fresh [`Pipeline`] for the call. Services that process many
/// documents should build one pipeline with [`Pipeline::from_config`] and
/// reuse it.
pub async fn extract_text(
    input_str: impl AsRef<str>,
    config: &OcrConfig,
) -> Result<DocumentResult, OcrError> {
    let input_str = input_str.as_ref();
    info!("Starting extraction: {}", input_str);

    let loaded = input::load_input(input_str, config.download_timeout_secs).await?;
    let pipeline = Pipeline::from_config(config)?;
    Ok(pipeline.process(loaded.bytes).await)
}

/// Extract text from document bytes already in memory.
pub async fn extract_text_from_bytes(
    bytes: &[u8],
    config: &OcrConfig,
) -> Result<DocumentResult, OcrError> {
    let pipeline = Pipeline::from_config(config)?;
    Ok(pipeline.process(Arc::<[u8]>::from(bytes)).await)
}

/// Synchronous wrapper around [`extract_text`].
///
/// Creates a temporary tokio runtime internally.
pub fn extract_text_sync(
    input_str: impl AsRef<str>,
    config: &OcrConfig,
) -> Result<DocumentResult, OcrError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| OcrError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(extract_text(input_str, config))
}

/// Extract text and write the assembled plain text to a file.
///
/// Uses atomic write (temp file + rename) to prevent partial files. A
/// document that failed as a whole writes nothing and is returned as-is.
pub async fn extract_to_file(
    input_str: impl AsRef<str>,
    output_path: impl AsRef<Path>,
    config: &OcrConfig,
) -> Result<DocumentResult, OcrError> {
    let result = extract_text(input_str, config).await?;
    if result.success {
        write_atomic(output_path.as_ref(), &assemble_text(&result.pages)).await?;
    }
    Ok(result)
}

/// Write `contents` to `path` via a sibling temp file and a rename.
pub async fn write_atomic(path: &Path, contents: &str) -> Result<(), OcrError> {
    let write_err = |source| OcrError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }

    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = Path::new(&tmp_name);

    tokio::fs::write(tmp_path, contents).await.map_err(write_err)?;
    tokio::fs::rename(tmp_path, path).await.map_err(write_err)?;
    Ok(())
}

/// Detect the format and count pages without a model or a renderer.
///
/// Does not require an LLM provider or API key.
pub async fn inspect(input_str: impl AsRef<str>) -> Result<DocumentInfo, OcrError> {
    let loaded = input::load_input(input_str.as_ref(), 120).await?;
    inspect_bytes(loaded.bytes).await
}

/// [`inspect`] over bytes already in memory.
pub async fn inspect_bytes(bytes: impl Into<Arc<[u8]>>) -> Result<DocumentInfo, OcrError> {
    let bytes: Arc<[u8]> = bytes.into();
    let format = detect::detect(&bytes);
    let total_pages = match format {
        DocumentFormat::Pdf => count::count_pages_async(Arc::clone(&bytes)).await?,
        DocumentFormat::RasterImage => {
            preprocess::decode_raster(Arc::clone(&bytes)).await?;
            1
        }
    };
    Ok(DocumentInfo {
        format,
        total_pages,
        byte_len: bytes.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::count::tests::blank_pdf;

    #[tokio::test]
    async fn inspect_counts_pdf_pages() {
        let info = inspect_bytes(blank_pdf(4)).await.unwrap();
        assert_eq!(info.format, DocumentFormat::Pdf);
        assert_eq!(info.total_pages, 4);
    }

    #[tokio::test]
    async fn inspect_rejects_unknown_bytes() {
        let err = inspect_bytes(b"hello world".to_vec()).await.unwrap_err();
        assert!(matches!(err, OcrError::UnsupportedInputFormat { .. }));
    }

    #[tokio::test]
    async fn inspect_agrees_with_the_pipeline_on_images() {
        use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
        use std::io::Cursor;

        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(64, 48, Rgb([1, 2, 3])));
        let mut tiff = Vec::new();
        img.write_to(&mut Cursor::new(&mut tiff), ImageFormat::Tiff).unwrap();
        let info = inspect_bytes(tiff).await.unwrap();
        assert_eq!(info.format, DocumentFormat::RasterImage);
        assert_eq!(info.total_pages, 1);

        // A bare TIFF header names a format but holds no image.
        let err = inspect_bytes(b"II*\0\x08\0\0\0".to_vec()).await.unwrap_err();
        assert!(matches!(err, OcrError::UnsupportedInputFormat { .. }));
    }

    #[tokio::test]
    async fn inspect_reads_local_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("three.pdf");
        std::fs::write(&path, blank_pdf(3)).unwrap();

        let info = inspect(path.to_str().unwrap()).await.unwrap();
        assert_eq!(info.total_pages, 3);
        assert_eq!(info.byte_len, std::fs::metadata(&path).unwrap().len() as usize);
    }

    #[tokio::test]
    async fn write_atomic_creates_parents_and_leaves_no_temp() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out/nested/result.txt");
        write_atomic(&path, "Page 1:\nhello").await.unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "Page 1:\nhello");
        assert!(!dir.path().join("out/nested/result.txt.tmp").exists());
    }
}
