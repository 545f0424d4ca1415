//! The pipeline controller: one document in, an ordered event sequence out.
//!
//! ## State machine
//!
//! ```text
//! START ─► COUNTING ─► { PAGE_PENDING ─► RENDERING ─► RECOGNIZING ─► DONE }* ─► FINISHED
//!   │          │
//!   └──────────┴─► FATAL (single `error` event)
//! ```
//!
//! A raster image skips COUNTING and is processed as page 1. Pages run
//! strictly in ascending order, one at a time; a failure inside a page
//! becomes that page's error record and the loop moves on.
//!
//! ## Why a producer task and a bounded channel?
//!
//! Both execution modes share exactly one implementation. [`Pipeline::stream`]
//! spawns the producer and hands back the receiving end as a `Stream`;
//! [`Pipeline::process`] simply drains that stream. With the default
//! capacity of 1 the producer runs at most one event ahead of the consumer,
//! and a dropped receiver is the cancellation signal: the producer checks
//! the channel before every model call, retries included, and stops at the
//! first failed send.
//!
//! ## Memory
//!
//! Only one rendered page is alive at a time. The preview is cut from it and
//! the recognition copy is prepared in the same blocking hop, after which the
//! full-resolution render is dropped.

use crate::config::OcrConfig;
use crate::error::{OcrError, PageError};
use crate::model::{self, RecognitionModel};
use crate::output::{DocumentResult, PageResult, StreamEvent};
use crate::pipeline::detect::{self, DocumentFormat};
use crate::pipeline::render::{self, PageRenderer};
use crate::pipeline::{count, encode, preprocess, recognize};
use crate::prompts::RecognitionPrompt;
use futures::StreamExt;
use image::DynamicImage;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::Stream;
use tracing::{debug, error, info, warn};

/// A boxed stream of pipeline events.
pub type EventStream = Pin<Box<dyn Stream<Item = StreamEvent> + Send>>;

/// What START decided about the input.
enum Source {
    Pdf { total_pages: usize },
    /// The decoded image doubles as page 1's render; taken when used.
    Image(Option<DynamicImage>),
}

impl Source {
    fn total_pages(&self) -> usize {
        match self {
            Source::Pdf { total_pages } => *total_pages,
            Source::Image(_) => 1,
        }
    }

    fn prompt(&self) -> RecognitionPrompt {
        match self {
            Source::Pdf { .. } => RecognitionPrompt::Document,
            Source::Image(_) => RecognitionPrompt::Image,
        }
    }
}

/// A reusable document pipeline.
///
/// Cheap to clone: the renderer, the model handle and the config are shared.
/// Each call to [`Pipeline::stream`] or [`Pipeline::process`] is an
/// independent invocation with no state carried over.
#[derive(Clone)]
pub struct Pipeline {
    renderer: Arc<dyn PageRenderer>,
    model: Arc<dyn RecognitionModel>,
    config: Arc<OcrConfig>,
}

impl Pipeline {
    /// Assemble a pipeline from already-built collaborators.
    pub fn new(
        renderer: Arc<dyn PageRenderer>,
        model: Arc<dyn RecognitionModel>,
        config: OcrConfig,
    ) -> Self {
        Self {
            renderer,
            model,
            config: Arc::new(config),
        }
    }

    /// Select the renderer and load the recognition model described by
    /// `config`. Both happen once; the result can serve any number of
    /// documents.
    pub fn from_config(config: &OcrConfig) -> Result<Self, OcrError> {
        let renderer = render::select_renderer(config)?;
        let model = model::load_model(config)?;
        Ok(Self::new(renderer, model, config.clone()))
    }

    pub fn config(&self) -> &OcrConfig {
        &self.config
    }

    /// Delay to leave between streamed messages, from `event_delay_ms`.
    pub fn event_pacing(&self) -> Duration {
        Duration::from_millis(self.config.event_delay_ms)
    }

    /// Lazy mode: events are produced as pages finish.
    pub fn stream(&self, document: impl Into<Arc<[u8]>>) -> EventStream {
        let (tx, rx) = mpsc::channel(self.config.channel_capacity);
        let this = self.clone();
        let document = document.into();
        tokio::spawn(async move { this.run(document, tx).await });
        Box::pin(ReceiverStream::new(rx))
    }

    /// Eager mode: drain the event stream into a [`DocumentResult`].
    pub async fn process(&self, document: impl Into<Arc<[u8]>>) -> DocumentResult {
        collect_events(self.stream(document)).await
    }

    // ── Producer ─────────────────────────────────────────────────────────

    async fn run(self, document: Arc<[u8]>, tx: mpsc::Sender<StreamEvent>) {
        let mut source = match self.start(&document).await {
            Ok(source) => source,
            Err(e) => {
                error!("Document rejected: {}", e);
                let _ = tx
                    .send(StreamEvent::Error {
                        error: e.to_string(),
                    })
                    .await;
                return;
            }
        };

        let total_pages = source.total_pages();
        let prompt = source.prompt();
        info!("Processing {} page(s)", total_pages);

        for page in 1..=total_pages {
            if tx
                .send(StreamEvent::PageStart { page, total_pages })
                .await
                .is_err()
            {
                info!("Consumer disconnected before page {}; stopping", page);
                return;
            }

            let rendered = match &mut source {
                Source::Pdf { .. } => self.render_page(&document, page).await,
                Source::Image(img) => img.take().ok_or_else(|| PageError::RenderFailed {
                    page,
                    detail: "decoded image already consumed".into(),
                }),
            };

            let result = match rendered {
                Ok(img) => match self.finish_page(page, img, prompt, &tx).await {
                    Some(result) => result,
                    None => {
                        info!("Consumer disconnected during page {}; stopping", page);
                        return;
                    }
                },
                Err(e) => {
                    warn!("{}", e);
                    PageResult::failed(&e)
                }
            };

            if result.is_error() {
                debug!("Page {} finished with error", page);
            } else {
                debug!("Page {} complete: {} chars", page, result.text.len());
            }

            if tx
                .send(StreamEvent::PageComplete {
                    result,
                    total_pages,
                })
                .await
                .is_err()
            {
                info!("Consumer disconnected after page {}; stopping", page);
                return;
            }
        }

        info!("Document complete: {} page(s)", total_pages);
        let _ = tx
            .send(StreamEvent::ProcessingComplete { total_pages })
            .await;
    }

    /// START and COUNTING. Every error here is fatal.
    async fn start(&self, document: &Arc<[u8]>) -> Result<Source, OcrError> {
        match detect::detect(document) {
            DocumentFormat::Pdf => {
                let total_pages = count::count_pages_async(Arc::clone(document)).await?;
                info!("PDF has {} pages", total_pages);
                Ok(Source::Pdf { total_pages })
            }
            DocumentFormat::RasterImage => {
                let img = preprocess::decode_raster(Arc::clone(document)).await?;
                info!("Raster image {}x{}", img.width(), img.height());
                Ok(Source::Image(Some(img)))
            }
        }
    }

    /// PAGE_RENDERING for one PDF page.
    async fn render_page(&self, document: &Arc<[u8]>, page: usize) -> Result<DynamicImage, PageError> {
        let renderer = Arc::clone(&self.renderer);
        let buf = Arc::clone(document);
        tokio::task::spawn_blocking(move || renderer.render(&buf, page))
            .await
            .map_err(|e| PageError::RenderFailed {
                page,
                detail: format!("render task panicked: {e}"),
            })?
    }

    /// Preview, preprocess and PAGE_RECOGNIZING for one rendered page.
    ///
    /// Returns `None` when the consumer went away before the model call.
    async fn finish_page(
        &self,
        page: usize,
        rendered: DynamicImage,
        prompt: RecognitionPrompt,
        tx: &mpsc::Sender<StreamEvent>,
    ) -> Option<PageResult> {
        let cfg = Arc::clone(&self.config);
        let prepared = tokio::task::spawn_blocking(move || {
            let preview = encode::encode_preview(
                &rendered,
                cfg.preview_max_width,
                cfg.preview_max_height,
                cfg.preview_quality,
            );
            let input = preprocess::preprocess(&rendered, cfg.min_short_side);
            (preview, input)
        })
        .await;

        let (preview, input) = match prepared {
            Ok((Ok(preview), input)) => (preview, input),
            Ok((Err(e), _)) => {
                let err = PageError::PreviewFailed {
                    page,
                    detail: e.to_string(),
                };
                warn!("{}", err);
                return Some(PageResult::failed(&err));
            }
            Err(e) => {
                let err = PageError::RenderFailed {
                    page,
                    detail: format!("image preparation panicked: {e}"),
                };
                warn!("{}", err);
                return Some(PageResult::failed(&err));
            }
        };

        let cancelled = || tx.is_closed();
        let outcome = recognize::recognize_page(
            self.model.as_ref(),
            page,
            &input,
            prompt,
            &self.config,
            &cancelled,
        )
        .await?;

        let result = match outcome {
            Ok(text) => PageResult::completed(page, text, Some(preview)),
            Err(e) => {
                warn!("{}", e);
                PageResult::failed(&e)
            }
        };
        Some(result)
    }
}

/// Fold an event stream into the eager result.
pub async fn collect_events(mut events: EventStream) -> DocumentResult {
    let mut pages = Vec::new();
    while let Some(event) = events.next().await {
        match event {
            StreamEvent::PageStart { .. } => {}
            StreamEvent::PageComplete { result, .. } => pages.push(result),
            StreamEvent::ProcessingComplete { .. } => return DocumentResult::completed(pages),
            StreamEvent::Error { error } => return DocumentResult::failed(error),
        }
    }
    DocumentResult::failed("Internal error: pipeline stopped without a terminal event")
}
