//! # edgequake-ocr
//!
//! Extract text from scanned PDFs and images with Vision Language Models,
//! page by page.
//!
//! ## Why this crate?
//!
//! Scans carry no text layer, so `pdftotext`-style tools return nothing.
//! This crate rasterises each page, lets a vision model transcribe it, and
//! normalises whatever shape the model answers in (JSON, quoted strings,
//! escaped newlines) into clean plain text. Results come back either all at
//! once or as a stream of per-page events, with one failed page never
//! taking the rest of the document down.
//!
//! ## Pipeline Overview
//!
//! ```text
//! bytes (PDF or image)
//!  │
//!  ├─ 1. Detect     %PDF signature → PDF, otherwise raster image
//!  ├─ 2. Count      page tree via lopdf (PDF only)
//!  │   for each page, strictly in order:
//!  ├─ 3. Render     pdfium, or pdftoppm when pdfium is unavailable
//!  ├─ 4. Prepare    JPEG preview + RGB upscale to a 800 px short side
//!  ├─ 5. Recognise  vision model call with timeout and retries
//!  ├─ 6. Normalise  JSON → cleanup → revert-if-too-short
//!  └─ 7. Emit       page_start / page_complete … processing_complete
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_ocr::{extract_text, OcrConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / GEMINI_API_KEY
//!     let config = OcrConfig::default();
//!     let result = extract_text("scan.pdf", &config).await?;
//!     for page in &result.pages {
//!         println!("--- page {} ---\n{}", page.page, page.text);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Serving many documents
//!
//! Build one [`Pipeline`] at startup and share it; the renderer and the
//! model handle are created once and reused by every call.
//!
//! ```rust,no_run
//! use edgequake_ocr::{OcrConfig, Pipeline};
//!
//! # async fn serve(docs: Vec<Vec<u8>>) -> Result<(), edgequake_ocr::OcrError> {
//! let pipeline = Pipeline::from_config(&OcrConfig::default())?;
//! for doc in docs {
//!     let result = pipeline.process(doc).await;
//!     println!("{} pages, success = {}", result.total_pages, result.success);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `edgeocr` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-ocr = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod delivery;
pub mod engine;
pub mod error;
pub mod model;
pub mod output;
pub mod pipeline;
pub mod prompts;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{OcrConfig, OcrConfigBuilder, RendererPreference, SamplingParams};
pub use convert::{
    extract_text, extract_text_from_bytes, extract_text_sync, extract_to_file, inspect,
    inspect_bytes,
};
pub use delivery::{assemble_text, serve_stream, BatchResponse, StreamRequest};
pub use engine::{EventStream, Pipeline};
pub use error::{ModelError, OcrError, PageError};
pub use model::{LlmRecognitionModel, RecognitionModel, SerializedModel};
pub use output::{DocumentInfo, DocumentResult, PageResult, PageStatus, StreamEvent};
pub use pipeline::detect::DocumentFormat;
pub use pipeline::render::{PageRenderer, PdfiumRenderer, PopplerRenderer};
pub use prompts::RecognitionPrompt;
pub use stream::{extract_stream, extract_stream_from_bytes};
