//! Configuration types for document text extraction.
//!
//! All pipeline behaviour is controlled through [`OcrConfig`], built via its
//! [`OcrConfigBuilder`]. One struct for every knob means a config can be
//! shared across concurrent pipelines, logged, and compared between runs.

use crate::error::OcrError;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Configuration for the extraction pipeline.
///
/// Built via [`OcrConfig::builder()`] or using [`OcrConfig::default()`].
///
/// # Example
/// ```rust
/// use edgequake_ocr::{OcrConfig, RendererPreference};
///
/// let config = OcrConfig::builder()
///     .dpi(300)
///     .renderer(RendererPreference::Auto)
///     .model("gpt-4.1-mini")
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct OcrConfig {
    /// DPI for the direct (pdfium) render strategy. Range: 72–1200. Default: 300.
    pub dpi: u32,

    /// DPI for the fallback (pdftoppm) render strategy. Range: 72–1200. Default: 600.
    ///
    /// The fallback rasteriser is lower fidelity, so it renders at a higher
    /// density to give the model comparable detail.
    pub fallback_dpi: u32,

    /// Longest-edge cap in pixels applied by both render strategies. Default: 6000.
    ///
    /// Keeps a single A0 poster page from allocating gigabytes of pixels.
    pub max_rendered_pixels: u32,

    /// Which render strategy to select at startup. Default: [`RendererPreference::Auto`].
    pub renderer: RendererPreference,

    /// Explicit path to a pdfium shared library.
    ///
    /// When `None`, `PDFIUM_LIB_PATH` is consulted, then the working
    /// directory, then the system library search path.
    pub pdfium_library_path: Option<PathBuf>,

    /// Shorter image side, in pixels, below which pages are upscaled before
    /// recognition. Default: 800.
    pub min_short_side: u32,

    /// Preview thumbnail bounding box width. Default: 400.
    pub preview_max_width: u32,

    /// Preview thumbnail bounding box height. Default: 600.
    pub preview_max_height: u32,

    /// JPEG quality of the preview thumbnail (1–100). Default: 85.
    pub preview_quality: u8,

    /// Sampling parameters sent with every recognition call.
    pub sampling: SamplingParams,

    /// Maximum retry attempts on a failed recognition call (0–`MAX_RETRIES`).
    /// Default: 2.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds (exponential backoff). Default: 500.
    pub retry_backoff_ms: u64,

    /// Per-recognition-call timeout in seconds. Default: 180.
    ///
    /// A dense page at 3 072 output tokens can take well over a minute on a
    /// local model.
    pub api_timeout_secs: u64,

    /// LLM model identifier, e.g. "gpt-4.1-mini". If None, uses provider default.
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic", "ollama").
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Route every recognition call through a single permit. Default: false.
    ///
    /// Set this when the model collaborator cannot serve concurrent
    /// inference calls from several documents at once.
    pub serialize_model_calls: bool,

    /// Capacity of the channel between the page producer and the consumer
    /// in lazy mode. Default: 1.
    ///
    /// With capacity 1 the producer suspends after each event until the
    /// consumer takes it, so a slow transport throttles rendering.
    pub channel_capacity: usize,

    /// Delay inserted after each streamed message, in milliseconds. Default: 0.
    pub event_delay_ms: u64,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            dpi: 300,
            fallback_dpi: 600,
            max_rendered_pixels: 6000,
            renderer: RendererPreference::default(),
            pdfium_library_path: None,
            min_short_side: 800,
            preview_max_width: 400,
            preview_max_height: 600,
            preview_quality: 85,
            sampling: SamplingParams::default(),
            max_retries: 2,
            retry_backoff_ms: 500,
            api_timeout_secs: 180,
            model: None,
            provider_name: None,
            provider: None,
            serialize_model_calls: false,
            channel_capacity: 1,
            event_delay_ms: 0,
            download_timeout_secs: 120,
        }
    }
}

impl fmt::Debug for OcrConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OcrConfig")
            .field("dpi", &self.dpi)
            .field("fallback_dpi", &self.fallback_dpi)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("renderer", &self.renderer)
            .field("pdfium_library_path", &self.pdfium_library_path)
            .field("min_short_side", &self.min_short_side)
            .field("sampling", &self.sampling)
            .field("max_retries", &self.max_retries)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("serialize_model_calls", &self.serialize_model_calls)
            .field("channel_capacity", &self.channel_capacity)
            .field("event_delay_ms", &self.event_delay_ms)
            .finish()
    }
}

impl OcrConfig {
    /// Create a new builder for `OcrConfig`.
    pub fn builder() -> OcrConfigBuilder {
        OcrConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`OcrConfig`].
#[derive(Debug)]
pub struct OcrConfigBuilder {
    config: OcrConfig,
}

impl OcrConfigBuilder {
    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi;
        self
    }

    pub fn fallback_dpi(mut self, dpi: u32) -> Self {
        self.config.fallback_dpi = dpi;
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn renderer(mut self, preference: RendererPreference) -> Self {
        self.config.renderer = preference;
        self
    }

    pub fn pdfium_library_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_library_path = Some(path.into());
        self
    }

    pub fn min_short_side(mut self, px: u32) -> Self {
        self.config.min_short_side = px;
        self
    }

    pub fn preview_bounds(mut self, width: u32, height: u32) -> Self {
        self.config.preview_max_width = width;
        self.config.preview_max_height = height;
        self
    }

    pub fn preview_quality(mut self, quality: u8) -> Self {
        self.config.preview_quality = quality.clamp(1, 100);
        self
    }

    pub fn sampling(mut self, params: SamplingParams) -> Self {
        self.config.sampling = params;
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.sampling.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_new_tokens(mut self, n: usize) -> Self {
        self.config.sampling.max_new_tokens = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn serialize_model_calls(mut self, v: bool) -> Self {
        self.config.serialize_model_calls = v;
        self
    }

    pub fn channel_capacity(mut self, n: usize) -> Self {
        self.config.channel_capacity = n;
        self
    }

    pub fn event_delay_ms(mut self, ms: u64) -> Self {
        self.config.event_delay_ms = ms;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<OcrConfig, OcrError> {
        let c = &self.config;
        for (name, dpi) in [("DPI", c.dpi), ("Fallback DPI", c.fallback_dpi)] {
            if !(72..=1200).contains(&dpi) {
                return Err(OcrError::InvalidConfig(format!(
                    "{name} must be 72–1200, got {dpi}"
                )));
            }
        }
        if c.max_retries > MAX_RETRIES {
            return Err(OcrError::InvalidConfig(format!(
                "max_retries must be ≤ {MAX_RETRIES}, got {}",
                c.max_retries
            )));
        }
        if c.channel_capacity == 0 {
            return Err(OcrError::InvalidConfig(
                "Channel capacity must be ≥ 1".into(),
            ));
        }
        if c.min_short_side == 0 {
            return Err(OcrError::InvalidConfig(
                "Minimum short side must be ≥ 1 px".into(),
            ));
        }
        if c.preview_max_width == 0 || c.preview_max_height == 0 {
            return Err(OcrError::InvalidConfig(
                "Preview bounds must be non-zero".into(),
            ));
        }
        if c.sampling.max_new_tokens == 0 {
            return Err(OcrError::InvalidConfig(
                "max_new_tokens must be ≥ 1".into(),
            ));
        }
        Ok(self.config)
    }
}

/// Upper bound accepted for [`OcrConfig::max_retries`].
pub const MAX_RETRIES: u32 = 20;

// ── Sampling ─────────────────────────────────────────────────────────────

/// Generation parameters for one recognition call.
///
/// Transcription of scanned pages benefits from some sampling freedom: at
/// temperature 0 vision models tend to loop on dense tables. The repetition
/// penalty keeps those loops in check.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SamplingParams {
    pub temperature: f32,
    pub top_p: f32,
    pub repetition_penalty: f32,
    pub max_new_tokens: usize,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            temperature: 0.8,
            top_p: 0.95,
            repetition_penalty: 1.1,
            max_new_tokens: 3072,
        }
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Which page-render strategy to select when a pipeline is built.
///
/// The choice is made once; it is never re-evaluated per page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RendererPreference {
    /// Use pdfium if it can be bound, otherwise fall back to pdftoppm. (default)
    #[default]
    Auto,
    /// Require pdfium; building a pipeline fails if it cannot be bound.
    Pdfium,
    /// Always use the pdftoppm fallback.
    Poppler,
}
