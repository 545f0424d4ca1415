//! Pipeline stages for document text extraction.
//!
//! Each submodule implements exactly one transformation step. Keeping stages
//! separate makes each independently testable and lets the controller in
//! [`crate::engine`] swap implementations (the render strategy, the model)
//! without touching the others.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ detect ──▶ count ──▶ render ──▶ preprocess ──▶ recognize
//! (bytes)   (%PDF?)    (lopdf)   (pdfium /   (RGB, upscale)  (model + normalize)
//!                                 pdftoppm)        │
//!                                                  └──▶ encode (preview)
//! ```
//!
//! 1. [`input`]      — load a local path or download a URL into memory
//! 2. [`detect`]     — PDF or raster image, by signature only
//! 3. [`count`]      — page count from the page tree, nothing rasterised
//! 4. [`render`]     — rasterise one page; CPU-bound, so callers run it in
//!    `spawn_blocking`
//! 5. [`preprocess`] — RGB conversion and small-image upscaling
//! 6. [`recognize`]  — the model call with timeout, retry and backoff; the
//!    only stage with network I/O
//! 7. [`normalize`]  — ordered chain that turns model output into plain text
//! 8. [`encode`]     — PNG for the model request, JPEG for the preview

pub mod count;
pub mod detect;
pub mod encode;
pub mod input;
pub mod normalize;
pub mod preprocess;
pub mod recognize;
pub mod render;
