//! Image encoding for the two places an image leaves the pipeline.
//!
//! * [`encode_page`] — lossless PNG wrapped in `ImageData` for the vision
//!   model. JPEG artefacts on rendered text degrade recognition.
//! * [`encode_preview`] — small JPEG thumbnail as a `data:` URI for UI
//!   display, produced from the already-rendered page.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// Encode a page image as a base64 PNG ready for the vision API.
///
/// `detail: "high"` asks GPT-4-class models for the full tile budget so
/// fine print survives.
pub fn encode_page(img: &DynamicImage) -> Result<ImageData, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;

    let b64 = STANDARD.encode(&buf);
    debug!("Encoded page image → {} bytes base64", b64.len());

    Ok(ImageData::new(b64, "image/png").with_detail("high"))
}

/// Build a JPEG preview bounded to `max_width × max_height`.
///
/// Aspect ratio is preserved and images already inside the box are never
/// enlarged. Alpha is dropped since JPEG has no alpha channel.
pub fn encode_preview(
    img: &DynamicImage,
    max_width: u32,
    max_height: u32,
    quality: u8,
) -> Result<String, image::ImageError> {
    let thumb = if img.width() > max_width || img.height() > max_height {
        img.resize(max_width, max_height, FilterType::Lanczos3)
    } else {
        img.clone()
    };

    let mut buf = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut buf, quality);
    DynamicImage::ImageRgb8(thumb.to_rgb8()).write_with_encoder(encoder)?;

    Ok(format!("data:image/jpeg;base64,{}", STANDARD.encode(&buf)))
}
