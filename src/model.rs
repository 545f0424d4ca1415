//! Recognition model seam.
//!
//! The pipeline never talks to a vision provider directly. It holds an
//! `Arc<dyn RecognitionModel>` which is loaded once at startup and shared by
//! every document processed afterwards.
//!
//! ## Implementations
//!
//! * [`LlmRecognitionModel`] — any `edgequake-llm` vision provider (OpenAI,
//!   Anthropic, Gemini, Ollama, …).
//! * [`SerializedModel`] — wraps another model so at most one call is in
//!   flight at a time, for local backends that cannot serve concurrent
//!   requests.
//!
//! Tests plug in their own stub implementations.

use crate::config::{OcrConfig, SamplingParams};
use crate::error::{ModelError, OcrError};
use crate::pipeline::encode;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use image::DynamicImage;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, info};

/// Model used when a provider is named but no model is given.
pub const DEFAULT_MODEL: &str = "gpt-4.1-nano";

/// A vision-language model that turns an image and a prompt into text.
#[async_trait]
pub trait RecognitionModel: Send + Sync {
    /// Short identifier for logs.
    fn name(&self) -> &str;

    /// Run one call. The returned text is raw model output; normalisation
    /// happens in the recognition stage. `image` is `None` for text-only
    /// prompts.
    async fn invoke(
        &self,
        prompt: &str,
        image: Option<&DynamicImage>,
        params: &SamplingParams,
    ) -> Result<String, ModelError>;
}

// ── edgequake-llm adapter ────────────────────────────────────────────────────

/// Adapter over an `edgequake-llm` provider.
pub struct LlmRecognitionModel {
    provider: Arc<dyn LLMProvider>,
    label: String,
}

impl LlmRecognitionModel {
    pub fn new(provider: Arc<dyn LLMProvider>, label: impl Into<String>) -> Self {
        Self {
            provider,
            label: label.into(),
        }
    }
}

#[async_trait]
impl RecognitionModel for LlmRecognitionModel {
    fn name(&self) -> &str {
        &self.label
    }

    async fn invoke(
        &self,
        prompt: &str,
        image: Option<&DynamicImage>,
        params: &SamplingParams,
    ) -> Result<String, ModelError> {
        let images = match image {
            Some(img) => vec![encode::encode_page(img)?],
            None => Vec::new(),
        };
        let messages = vec![ChatMessage::user_with_images(prompt, images)];
        let options = build_options(params);

        let response = self
            .provider
            .chat(&messages, Some(&options))
            .await
            .map_err(|e| ModelError::Provider(e.to_string()))?;

        debug!(
            "{}: {} input tokens, {} output tokens",
            self.label, response.prompt_tokens, response.completion_tokens
        );
        Ok(response.content)
    }
}

/// Map sampling parameters onto provider options.
///
/// Only temperature and the output budget travel through the provider
/// abstraction; `top_p` and `repetition_penalty` apply to backends that read
/// [`SamplingParams`] directly.
fn build_options(params: &SamplingParams) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(params.temperature),
        max_tokens: Some(params.max_new_tokens),
        ..Default::default()
    }
}

// ── Serialised access ────────────────────────────────────────────────────────

/// Allows one call at a time through the wrapped model.
pub struct SerializedModel {
    inner: Arc<dyn RecognitionModel>,
    permit: Semaphore,
}

impl SerializedModel {
    pub fn new(inner: Arc<dyn RecognitionModel>) -> Self {
        Self {
            inner,
            permit: Semaphore::new(1),
        }
    }
}

#[async_trait]
impl RecognitionModel for SerializedModel {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn invoke(
        &self,
        prompt: &str,
        image: Option<&DynamicImage>,
        params: &SamplingParams,
    ) -> Result<String, ModelError> {
        let _guard = self
            .permit
            .acquire()
            .await
            .map_err(|e| ModelError::Provider(format!("model gate closed: {e}")))?;
        self.inner.invoke(prompt, image, params).await
    }
}

// ── Provider resolution ──────────────────────────────────────────────────────

/// Build the shared recognition model described by `config`.
pub fn load_model(config: &OcrConfig) -> Result<Arc<dyn RecognitionModel>, OcrError> {
    let provider = resolve_provider(config)?;
    let label = format!(
        "{}/{}",
        config.provider_name.as_deref().unwrap_or("auto"),
        config.model.as_deref().unwrap_or(DEFAULT_MODEL)
    );
    let model: Arc<dyn RecognitionModel> = Arc::new(LlmRecognitionModel::new(provider, label));
    info!("Recognition model loaded: {}", model.name());
    Ok(wrap_model(model, config))
}

/// Apply the configured sharing policy to an already-built model.
pub fn wrap_model(
    model: Arc<dyn RecognitionModel>,
    config: &OcrConfig,
) -> Arc<dyn RecognitionModel> {
    if config.serialize_model_calls {
        Arc::new(SerializedModel::new(model))
    } else {
        model
    }
}

fn create_vision_provider(
    provider_name: &str,
    model: &str,
) -> Result<Arc<dyn LLMProvider>, OcrError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        OcrError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the LLM provider, from most-specific to least-specific.
///
/// 1. **Pre-built provider** (`config.provider`), used as-is.
/// 2. **Named provider + model** (`config.provider_name`); the factory reads
///    the matching API key from the environment.
/// 3. **Environment pair** (`EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`).
/// 4. **Auto-detection**: OpenAI when `OPENAI_API_KEY` is set, otherwise
///    whatever `ProviderFactory::from_env` finds first.
pub fn resolve_provider(config: &OcrConfig) -> Result<Arc<dyn LLMProvider>, OcrError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
        return create_vision_provider(name, model);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_vision_provider(&prov, &model);
        }
    }

    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
            return create_vision_provider("openai", model);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| OcrError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or configure a provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}
