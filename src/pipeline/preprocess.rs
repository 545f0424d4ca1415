//! Image preparation ahead of recognition.
//!
//! Vision models lose accuracy sharply once glyphs shrink below a few pixels,
//! so any image whose shorter side is under the configured minimum is
//! upscaled uniformly until that side reaches it. Everything is converted to
//! 3-channel RGB first.
//!
//! Raster inputs (PNG, JPEG, TIFF, BMP, WebP, GIF) are decoded here too, so
//! the pipeline and [`crate::inspect`] accept exactly the same files.

use crate::error::OcrError;
use image::imageops::FilterType;
use image::DynamicImage;
use std::sync::Arc;
use tracing::debug;

/// Decode a raster input on the blocking pool. Multi-frame formats yield
/// their first frame.
///
/// # Errors
/// [`OcrError::UnsupportedInputFormat`] when no compiled-in decoder accepts
/// the bytes.
pub async fn decode_raster(buf: Arc<[u8]>) -> Result<DynamicImage, OcrError> {
    tokio::task::spawn_blocking(move || image::load_from_memory(&buf))
        .await
        .map_err(|e| OcrError::Internal(format!("Image decode task panicked: {e}")))?
        .map_err(|e| OcrError::UnsupportedInputFormat {
            detail: e.to_string(),
        })
}

/// Convert to RGB and upscale so the shorter side is at least `min_short_side`.
pub fn preprocess(img: &DynamicImage, min_short_side: u32) -> DynamicImage {
    let rgb = match img {
        DynamicImage::ImageRgb8(_) => img.clone(),
        other => DynamicImage::ImageRgb8(other.to_rgb8()),
    };

    let (width, height) = (rgb.width(), rgb.height());
    match upscaled_dimensions(width, height, min_short_side) {
        Some((w, h)) => {
            debug!("Upscaled image {}x{} → {}x{}", width, height, w, h);
            rgb.resize_exact(w, h, FilterType::Lanczos3)
        }
        None => rgb,
    }
}

/// Target size for a uniform upscale, or `None` when no upscale is needed.
///
/// The shorter side lands exactly on `min_short_side`; the longer side is
/// scaled by the same factor and rounded.
pub fn upscaled_dimensions(width: u32, height: u32, min_short_side: u32) -> Option<(u32, u32)> {
    let short = width.min(height);
    if short == 0 || short >= min_short_side {
        return None;
    }
    let scale = |side: u32| -> u32 {
        if side == short {
            min_short_side
        } else {
            ((side as u64 * min_short_side as u64 + short as u64 / 2) / short as u64) as u32
        }
    };
    Some((scale(width), scale(height)))
}
