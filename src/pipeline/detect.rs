//! Format detection by signature inspection.
//!
//! Total over any byte sequence: anything without the PDF signature is
//! classified as a raster image. Empty or garbage buffers fail later, when
//! the image decoder rejects them.

use serde::{Deserialize, Serialize};

/// The four bytes every PDF starts with.
pub const PDF_MAGIC: &[u8; 4] = b"%PDF";

/// The two input families the pipeline understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentFormat {
    Pdf,
    RasterImage,
}

/// Classify a buffer from its first four bytes.
pub fn detect(buf: &[u8]) -> DocumentFormat {
    if buf.starts_with(PDF_MAGIC) {
        DocumentFormat::Pdf
    } else {
        DocumentFormat::RasterImage
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pdf_signature() {
        assert_eq!(detect(b"%PDF-1.7\n%\xE2\xE3"), DocumentFormat::Pdf);
        assert_eq!(detect(b"%PDF"), DocumentFormat::Pdf);
    }

    #[test]
    fn everything_else_is_raster() {
        assert_eq!(detect(b""), DocumentFormat::RasterImage);
        assert_eq!(detect(b"%PD"), DocumentFormat::RasterImage);
        assert_eq!(detect(b"\x89PNG\r\n\x1a\n"), DocumentFormat::RasterImage);
        assert_eq!(detect(b" %PDF-1.4"), DocumentFormat::RasterImage);
    }
}
