//! Page rasterisation: render exactly one PDF page to a `DynamicImage`.
//!
//! Two interchangeable strategies sit behind [`PageRenderer`]:
//!
//! * [`PdfiumRenderer`] (direct) — loads the buffer into pdfium in-process
//!   and renders only the requested page.
//! * [`PopplerRenderer`] (fallback) — shells out to `pdftoppm` for a single
//!   page, receives a base64 PNG and decodes it.
//!
//! [`select_renderer`] picks one when a pipeline is built; the choice is not
//! revisited per page.
//!
//! ## Why blocking?
//!
//! pdfium keeps thread-local state and is not async-safe, and `pdftoppm` is a
//! child process we wait on. Renderers are therefore plain synchronous
//! traits; the engine calls them from `tokio::task::spawn_blocking`.

use crate::config::{OcrConfig, RendererPreference};
use crate::error::{OcrError, PageError};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::imageops::FilterType;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Rasterises a single page of a PDF buffer.
pub trait PageRenderer: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    /// Render `page` (1-based) of `document`.
    ///
    /// Must return an image of exactly the requested page or a
    /// [`PageError::RenderFailed`] for that page.
    fn render(&self, document: &[u8], page: usize) -> Result<DynamicImage, PageError>;
}

// ── Direct strategy: pdfium ──────────────────────────────────────────────

/// In-process renderer backed by the pdfium library.
pub struct PdfiumRenderer {
    library: PdfiumLibrary,
    dpi: u32,
    max_pixels: u32,
}

/// Where the pdfium shared library was found.
#[derive(Debug, Clone)]
enum PdfiumLibrary {
    Path(PathBuf),
    System,
}

impl PdfiumRenderer {
    /// Bind pdfium once to prove it is available, remembering where it was
    /// found so each render can bind the same library again.
    pub fn probe(explicit: Option<&Path>, dpi: u32, max_pixels: u32) -> Result<Self, OcrError> {
        let candidates = library_candidates(explicit);
        let mut last_err = String::from("no candidate library");

        for candidate in candidates {
            match bind(&candidate) {
                Ok(_) => {
                    debug!("pdfium bound via {:?}", candidate);
                    return Ok(Self {
                        library: candidate,
                        dpi,
                        max_pixels,
                    });
                }
                Err(e) => last_err = format!("{candidate:?}: {e:?}"),
            }
        }

        Err(OcrError::InvalidConfig(format!(
            "pdfium library unavailable ({last_err}). Set PDFIUM_LIB_PATH=/path/to/libpdfium"
        )))
    }
}

fn library_candidates(explicit: Option<&Path>) -> Vec<PdfiumLibrary> {
    let mut out = Vec::new();
    if let Some(p) = explicit {
        out.push(PdfiumLibrary::Path(p.to_path_buf()));
    }
    if let Ok(p) = std::env::var("PDFIUM_LIB_PATH") {
        if !p.is_empty() {
            out.push(PdfiumLibrary::Path(PathBuf::from(p)));
        }
    }
    out.push(PdfiumLibrary::Path(PathBuf::from(
        Pdfium::pdfium_platform_library_name_at_path("./"),
    )));
    out.push(PdfiumLibrary::System);
    out
}

fn bind(library: &PdfiumLibrary) -> Result<Pdfium, PdfiumError> {
    let bindings = match library {
        PdfiumLibrary::Path(p) => Pdfium::bind_to_library(p)?,
        PdfiumLibrary::System => Pdfium::bind_to_system_library()?,
    };
    Ok(Pdfium::new(bindings))
}

impl PageRenderer for PdfiumRenderer {
    fn name(&self) -> &'static str {
        "pdfium"
    }

    fn render(&self, document: &[u8], page: usize) -> Result<DynamicImage, PageError> {
        let fail = |detail: String| PageError::RenderFailed { page, detail };

        let pdfium = bind(&self.library).map_err(|e| fail(format!("bind: {e:?}")))?;
        let doc = pdfium
            .load_pdf_from_byte_slice(document, None)
            .map_err(|e| fail(format!("load: {e:?}")))?;

        let index = page
            .checked_sub(1)
            .and_then(|i| u16::try_from(i).ok())
            .ok_or_else(|| fail(format!("page index {page} out of range")))?;

        let pdf_page = doc
            .pages()
            .get(index)
            .map_err(|e| fail(format!("{e:?}")))?;

        let render_config = PdfRenderConfig::new()
            .scale_page_by_factor(self.dpi as f32 / 72.0)
            .set_maximum_width(self.max_pixels as i32)
            .set_maximum_height(self.max_pixels as i32);

        let bitmap = pdf_page
            .render_with_config(&render_config)
            .map_err(|e| fail(format!("{e:?}")))?;

        let image = bitmap.as_image();
        debug!(
            "Rendered page {} → {}x{} px (pdfium, {} dpi)",
            page,
            image.width(),
            image.height(),
            self.dpi
        );
        Ok(image)
    }
}

// ── Fallback strategy: pdftoppm ──────────────────────────────────────────

/// Out-of-process renderer using poppler's `pdftoppm`.
pub struct PopplerRenderer {
    program: PathBuf,
    dpi: u32,
    max_pixels: u32,
}

impl PopplerRenderer {
    pub fn new(dpi: u32, max_pixels: u32) -> Self {
        Self {
            program: PathBuf::from("pdftoppm"),
            dpi,
            max_pixels,
        }
    }

    /// Whether the `pdftoppm` binary can be executed.
    pub fn is_available(&self) -> bool {
        Command::new(&self.program).arg("-v").output().is_ok()
    }

    /// Render one page to a base64-encoded PNG.
    ///
    /// The document is written to a private temp directory which is removed
    /// when this function returns, success or failure.
    pub fn render_to_base64_png(&self, document: &[u8], page: usize) -> Result<String, PageError> {
        let fail = |detail: String| PageError::RenderFailed { page, detail };

        let scratch = tempfile::TempDir::new().map_err(|e| fail(format!("tempdir: {e}")))?;
        let input = scratch.path().join("input.pdf");
        let out_root = scratch.path().join("page");
        std::fs::write(&input, document).map_err(|e| fail(format!("write temp input: {e}")))?;

        let page_arg = page.to_string();
        let output = Command::new(&self.program)
            .arg("-png")
            .arg("-r")
            .arg(self.dpi.to_string())
            .arg("-f")
            .arg(&page_arg)
            .arg("-l")
            .arg(&page_arg)
            .arg("-singlefile")
            .arg(&input)
            .arg(&out_root)
            .output()
            .map_err(|e| fail(format!("failed to run pdftoppm: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(fail(format!("pdftoppm failed: {}", stderr.trim())));
        }

        let png = std::fs::read(out_root.with_extension("png"))
            .map_err(|e| fail(format!("pdftoppm produced no image: {e}")))?;
        Ok(STANDARD.encode(png))
    }
}

impl PageRenderer for PopplerRenderer {
    fn name(&self) -> &'static str {
        "pdftoppm"
    }

    fn render(&self, document: &[u8], page: usize) -> Result<DynamicImage, PageError> {
        let b64 = self.render_to_base64_png(document, page)?;
        let image = decode_base64_png(&b64).map_err(|detail| PageError::RenderFailed { page, detail })?;
        let image = cap_pixels(image, self.max_pixels);
        debug!(
            "Rendered page {} → {}x{} px (pdftoppm, {} dpi)",
            page,
            image.width(),
            image.height(),
            self.dpi
        );
        Ok(image)
    }
}

/// Decode a base64 PNG payload into an image.
pub fn decode_base64_png(b64: &str) -> Result<DynamicImage, String> {
    let bytes = STANDARD
        .decode(b64.trim())
        .map_err(|e| format!("invalid base64 image: {e}"))?;
    image::load_from_memory_with_format(&bytes, image::ImageFormat::Png)
        .map_err(|e| format!("invalid PNG: {e}"))
}

/// Shrink `image` so its longest edge is at most `max_pixels`.
fn cap_pixels(image: DynamicImage, max_pixels: u32) -> DynamicImage {
    if image.width().max(image.height()) <= max_pixels {
        return image;
    }
    image.resize(max_pixels, max_pixels, FilterType::Lanczos3)
}

// ── Selection ────────────────────────────────────────────────────────────

/// Pick the render strategy for the lifetime of a pipeline.
///
/// * `Pdfium` — bind pdfium or fail.
/// * `Poppler` — always the `pdftoppm` fallback.
/// * `Auto` — pdfium if it binds, otherwise the fallback.
pub fn select_renderer(config: &OcrConfig) -> Result<Arc<dyn PageRenderer>, OcrError> {
    let explicit = config.pdfium_library_path.as_deref();
    let poppler = || PopplerRenderer::new(config.fallback_dpi, config.max_rendered_pixels);

    let renderer: Arc<dyn PageRenderer> = match config.renderer {
        RendererPreference::Pdfium => Arc::new(PdfiumRenderer::probe(
            explicit,
            config.dpi,
            config.max_rendered_pixels,
        )?),
        RendererPreference::Poppler => Arc::new(poppler()),
        RendererPreference::Auto => {
            match PdfiumRenderer::probe(explicit, config.dpi, config.max_rendered_pixels) {
                Ok(r) => Arc::new(r),
                Err(e) => {
                    let fallback = poppler();
                    if fallback.is_available() {
                        info!("pdfium unavailable, using pdftoppm fallback: {}", e);
                    } else {
                        warn!(
                            "Neither pdfium nor pdftoppm is available; PDF pages will fail to render. {}",
                            e
                        );
                    }
                    Arc::new(fallback)
                }
            }
        }
    };

    info!("Page renderer: {}", renderer.name());
    Ok(renderer)
}
