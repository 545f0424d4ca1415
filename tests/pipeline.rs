//! Integration tests for the document pipeline.
//!
//! Everything here runs offline: PDFs are generated in memory with `lopdf`,
//! rendering is done by a stub `PageRenderer` and recognition by a stub
//! `RecognitionModel`, so neither pdfium nor an API key is needed.
//!
//! A single live test at the bottom calls a real provider; it is gated behind
//! `E2E_ENABLED` and skipped otherwise.
//!
//! Run with:
//!   cargo test --test pipeline -- --nocapture

use async_trait::async_trait;
use edgequake_ocr::{
    serve_stream, BatchResponse, DocumentResult, ModelError, OcrConfig, PageError, PageRenderer,
    PageStatus, Pipeline, RecognitionModel, SamplingParams, StreamEvent,
};
use futures::StreamExt;
use edgequake_ocr::config::MAX_RETRIES;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use lopdf::{dictionary, Document, Object, Stream};
use std::collections::HashSet;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

// ── Test helpers ─────────────────────────────────────────────────────────────

/// Build an `n`-page blank PDF in memory.
fn blank_pdf(n: usize) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let mut kids: Vec<Object> = Vec::with_capacity(n);
    for _ in 0..n {
        let content_id = doc.add_object(Stream::new(dictionary! {}, Vec::new()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => n as i64,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buf = Vec::new();
    doc.save_to(&mut buf).expect("in-memory save");
    buf
}

fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    encoded_image(width, height, ImageFormat::Png)
}

fn encoded_image(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
    let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([200, 0, 0])));
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), format)
        .expect("encode image");
    buf
}

/// Route pipeline logs through the test harness. Filter with `RUST_LOG`.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

/// Renders page `n` as a flat image whose red channel is `n`. Pages listed
/// in `fail` raise a render error instead.
struct StubRenderer {
    fail: HashSet<usize>,
}

impl StubRenderer {
    fn ok() -> Arc<Self> {
        Arc::new(Self {
            fail: HashSet::new(),
        })
    }

    fn failing_on(pages: &[usize]) -> Arc<Self> {
        Arc::new(Self {
            fail: pages.iter().copied().collect(),
        })
    }
}

impl PageRenderer for StubRenderer {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn render(&self, _document: &[u8], page: usize) -> Result<DynamicImage, PageError> {
        if self.fail.contains(&page) {
            return Err(PageError::RenderFailed {
                page,
                detail: "stub renderer refused this page".into(),
            });
        }
        // Already above the upscale threshold, so pixels reach the model unchanged.
        Ok(DynamicImage::ImageRgb8(RgbImage::from_pixel(
            850,
            1100,
            Rgb([page as u8, 0, 0]),
        )))
    }
}

/// Answers with JSON naming the page it was shown. Counts calls, records
/// prompts, and fails on request for chosen pages.
#[derive(Default)]
struct StubModel {
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
    fail_pages: HashSet<u8>,
}

#[async_trait]
impl RecognitionModel for StubModel {
    fn name(&self) -> &str {
        "stub"
    }

    async fn invoke(
        &self,
        prompt: &str,
        image: Option<&DynamicImage>,
        _params: &SamplingParams,
    ) -> Result<String, ModelError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.to_string());

        let img = image.ok_or_else(|| ModelError::Provider("no image".into()))?;
        let marker = img.to_rgb8().get_pixel(0, 0)[0];
        if self.fail_pages.contains(&marker) {
            return Err(ModelError::Provider("stub model overloaded".into()));
        }
        Ok(format!(r#"{{"text": "Recognised text of page {marker}"}}"#))
    }
}

fn test_config() -> OcrConfig {
    OcrConfig::builder()
        .max_retries(0)
        .retry_backoff_ms(1)
        .api_timeout_secs(5)
        .build()
        .expect("valid config")
}

fn pipeline(renderer: Arc<StubRenderer>, model: Arc<StubModel>) -> Pipeline {
    init_tracing();
    Pipeline::new(renderer, model, test_config())
}

/// Sleeps, then fails. Used to disconnect while a call is in flight.
#[derive(Default)]
struct SlowFailingModel {
    calls: AtomicUsize,
}

#[async_trait]
impl RecognitionModel for SlowFailingModel {
    fn name(&self) -> &str {
        "slow-failing"
    }

    async fn invoke(
        &self,
        _prompt: &str,
        _image: Option<&DynamicImage>,
        _params: &SamplingParams,
    ) -> Result<String, ModelError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(100)).await;
        Err(ModelError::Provider("503 Service Unavailable".into()))
    }
}

async fn collect(pipeline: &Pipeline, doc: Vec<u8>) -> Vec<StreamEvent> {
    pipeline.stream(doc).collect().await
}

// ── Eager mode ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn batch_returns_every_page_in_order() {
    let model = Arc::new(StubModel::default());
    let result = pipeline(StubRenderer::ok(), model.clone())
        .process(blank_pdf(5))
        .await;

    assert!(result.success);
    assert_eq!(result.total_pages, 5);
    assert_eq!(result.pages.len(), 5);
    for (i, page) in result.pages.iter().enumerate() {
        assert_eq!(page.page, i + 1);
        assert_eq!(page.status, PageStatus::Completed);
        assert_eq!(page.text, format!("Recognised text of page {}", i + 1));
        assert!(page.error.is_none());
        assert!(page.preview.is_some());
    }
    assert_eq!(model.calls.load(Ordering::SeqCst), 5);
}

#[tokio::test]
async fn render_failure_is_isolated_to_its_page() {
    let model = Arc::new(StubModel::default());
    let result = pipeline(StubRenderer::failing_on(&[2]), model.clone())
        .process(blank_pdf(3))
        .await;

    assert!(result.success);
    assert_eq!(result.total_pages, 3);
    assert_eq!(result.pages[0].status, PageStatus::Completed);
    assert_eq!(result.pages[1].status, PageStatus::Error);
    assert!(result.pages[1].text.is_empty());
    assert!(result.pages[1]
        .error
        .as_deref()
        .is_some_and(|e| e.contains("stub renderer refused")));
    assert_eq!(result.pages[2].status, PageStatus::Completed);
    assert_eq!(result.pages[2].text, "Recognised text of page 3");
    // The failed page never reached the model.
    assert_eq!(model.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn recognition_failure_is_isolated_to_its_page() {
    let model = Arc::new(StubModel {
        fail_pages: [1u8].into_iter().collect(),
        ..Default::default()
    });
    let result = pipeline(StubRenderer::ok(), model).process(blank_pdf(2)).await;

    assert!(result.success);
    assert_eq!(result.pages[0].status, PageStatus::Error);
    assert!(result.pages[0]
        .error
        .as_deref()
        .is_some_and(|e| e.contains("stub model overloaded")));
    assert_eq!(result.pages[1].status, PageStatus::Completed);
    assert_eq!(result.completed_pages(), 1);
}

#[tokio::test]
async fn corrupt_pdf_fails_the_whole_document() {
    let model = Arc::new(StubModel::default());
    let result = pipeline(StubRenderer::ok(), model.clone())
        .process(b"%PDF-1.4\nthis is not a pdf body".to_vec())
        .await;

    assert!(!result.success);
    assert!(result.pages.is_empty());
    assert!(result
        .error
        .as_deref()
        .is_some_and(|e| e.starts_with("Malformed document")));
    assert_eq!(model.calls.load(Ordering::SeqCst), 0);
}

// ── Lazy mode ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn two_page_stream_has_exact_event_order() {
    let p = pipeline(StubRenderer::ok(), Arc::new(StubModel::default()));
    let events = collect(&p, blank_pdf(2)).await;

    let kinds: Vec<(&str, Option<usize>)> = events.iter().map(|e| (e.kind(), e.page())).collect();
    assert_eq!(
        kinds,
        vec![
            ("page_start", Some(1)),
            ("page_complete", Some(1)),
            ("page_start", Some(2)),
            ("page_complete", Some(2)),
            ("processing_complete", None),
        ]
    );
    assert!(events.last().is_some_and(StreamEvent::is_terminal));
}

#[tokio::test]
async fn fatal_error_emits_single_event_and_no_page_start() {
    let p = pipeline(StubRenderer::ok(), Arc::new(StubModel::default()));
    let events = collect(&p, b"%PDF-garbage".to_vec()).await;

    assert_eq!(events.len(), 1, "got: {events:?}");
    assert!(matches!(events[0], StreamEvent::Error { .. }));
}

#[tokio::test]
async fn stream_and_batch_agree() {
    let p = pipeline(
        StubRenderer::failing_on(&[3]),
        Arc::new(StubModel::default()),
    );

    let batch = p.process(blank_pdf(4)).await;
    let streamed: Vec<_> = collect(&p, blank_pdf(4))
        .await
        .into_iter()
        .filter_map(|e| match e {
            StreamEvent::PageComplete { result, .. } => Some(result),
            _ => None,
        })
        .collect();

    let triples = |pages: &[edgequake_ocr::PageResult]| {
        pages
            .iter()
            .map(|p| (p.page, p.text.clone(), p.error.clone()))
            .collect::<Vec<_>>()
    };
    assert_eq!(triples(&batch.pages), triples(&streamed));
}

#[tokio::test]
async fn single_image_is_one_page_with_image_prompt() {
    let model = Arc::new(StubModel::default());
    let p = pipeline(StubRenderer::failing_on(&[1]), model.clone());

    let events = collect(&p, png_bytes(900, 850)).await;
    assert_eq!(events.len(), 3);
    assert!(matches!(
        events[0],
        StreamEvent::PageStart {
            page: 1,
            total_pages: 1
        }
    ));
    match &events[1] {
        StreamEvent::PageComplete { result, total_pages } => {
            assert_eq!(*total_pages, 1);
            // The renderer is not used for images, so its failure set is irrelevant.
            assert_eq!(result.status, PageStatus::Completed);
            assert_eq!(result.text, "Recognised text of page 200");
        }
        other => panic!("unexpected event: {other:?}"),
    }
    assert!(matches!(
        events[2],
        StreamEvent::ProcessingComplete { total_pages: 1 }
    ));

    let prompts = model.prompts.lock().unwrap();
    assert_eq!(prompts.len(), 1);
    assert_eq!(prompts[0], edgequake_ocr::prompts::IMAGE_PROMPT);
}

#[tokio::test]
async fn undecodable_image_is_fatal() {
    let p = pipeline(StubRenderer::ok(), Arc::new(StubModel::default()));
    let events = collect(&p, b"GIF? no, just text".to_vec()).await;

    assert_eq!(events.len(), 1);
    match &events[0] {
        StreamEvent::Error { error } => assert!(error.starts_with("Cannot open image")),
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn dropping_the_stream_stops_model_calls() {
    let model = Arc::new(StubModel::default());
    let p = pipeline(StubRenderer::ok(), model.clone());

    let mut events = p.stream(blank_pdf(20));
    let first = events.next().await;
    assert!(matches!(first, Some(StreamEvent::PageStart { page: 1, .. })));
    drop(events);

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(
        model.calls.load(Ordering::SeqCst) <= 1,
        "producer kept calling the model after disconnect"
    );
}

#[tokio::test]
async fn disconnect_during_a_failing_call_stops_retries() {
    init_tracing();
    let model = Arc::new(SlowFailingModel::default());
    let config = OcrConfig::builder()
        .max_retries(4)
        .retry_backoff_ms(10)
        .api_timeout_secs(5)
        .build()
        .expect("valid config");
    let p = Pipeline::new(StubRenderer::ok(), model.clone(), config);

    let mut events = p.stream(blank_pdf(1));
    assert!(matches!(
        events.next().await,
        Some(StreamEvent::PageStart { page: 1, .. })
    ));
    for _ in 0..200 {
        if model.calls.load(Ordering::SeqCst) >= 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(model.calls.load(Ordering::SeqCst), 1);
    drop(events);

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(
        model.calls.load(Ordering::SeqCst),
        1,
        "retries kept calling the model after disconnect"
    );
}

#[tokio::test]
async fn many_retries_still_end_with_a_terminal_event() {
    init_tracing();
    let model = Arc::new(StubModel {
        fail_pages: [1u8].into_iter().collect(),
        ..Default::default()
    });
    let config = OcrConfig::builder()
        .max_retries(MAX_RETRIES)
        .retry_backoff_ms(0)
        .build()
        .expect("valid config");
    let p = Pipeline::new(StubRenderer::ok(), model.clone(), config);

    let events = collect(&p, blank_pdf(1)).await;
    assert_eq!(events.len(), 3, "got: {events:?}");
    match &events[1] {
        StreamEvent::PageComplete { result, .. } => {
            assert_eq!(result.status, PageStatus::Error);
            assert!(result.error.as_deref().unwrap_or("").contains("overloaded"));
        }
        other => panic!("unexpected event: {other:?}"),
    }
    assert!(matches!(
        events[2],
        StreamEvent::ProcessingComplete { total_pages: 1 }
    ));
    assert_eq!(
        model.calls.load(Ordering::SeqCst),
        MAX_RETRIES as usize + 1
    );
}

#[tokio::test]
async fn empty_pdf_completes_with_zero_pages() {
    let model = Arc::new(StubModel::default());
    let p = pipeline(StubRenderer::ok(), model.clone());

    let events = collect(&p, blank_pdf(0)).await;
    assert_eq!(events.len(), 1, "got: {events:?}");
    assert!(matches!(
        events[0],
        StreamEvent::ProcessingComplete { total_pages: 0 }
    ));

    let result = p.process(blank_pdf(0)).await;
    assert!(result.success);
    assert_eq!(result.total_pages, 0);
    assert!(result.pages.is_empty());
    assert_eq!(model.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn scanner_formats_are_processed_like_png() {
    let p = pipeline(StubRenderer::ok(), Arc::new(StubModel::default()));

    for format in [ImageFormat::Tiff, ImageFormat::Bmp] {
        let bytes = encoded_image(900, 850, format);
        let info = edgequake_ocr::inspect_bytes(bytes.clone())
            .await
            .expect("inspect accepts the image");
        assert_eq!(info.total_pages, 1);

        let result = p.process(bytes).await;
        assert!(result.success, "{format:?}: {:?}", result.error);
        assert_eq!(result.pages[0].text, "Recognised text of page 200");
    }
}

#[tokio::test]
async fn concurrent_documents_share_one_pipeline() {
    let model = Arc::new(StubModel::default());
    let p = pipeline(StubRenderer::ok(), model.clone());

    let (a, b) = tokio::join!(p.process(blank_pdf(3)), p.process(blank_pdf(2)));
    assert_eq!(a.total_pages, 3);
    assert_eq!(b.total_pages, 2);
    assert_eq!(model.calls.load(Ordering::SeqCst), 5);
}

// ── Delivery ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn serve_stream_pushes_json_events_into_sink() {
    use base64::{engine::general_purpose::STANDARD, Engine as _};

    let config = OcrConfig::builder()
        .max_retries(0)
        .event_delay_ms(1)
        .build()
        .expect("valid config");
    let p = Pipeline::new(StubRenderer::ok(), Arc::new(StubModel::default()), config);
    let message = serde_json::json!({
        "file_data": STANDARD.encode(blank_pdf(2)),
        "filename": "two.pdf",
    })
    .to_string();

    let (tx, rx) = futures::channel::mpsc::unbounded::<String>();
    assert_eq!(p.event_pacing(), Duration::from_millis(1));
    assert_ok!(serve_stream(&p, &message, tx, p.event_pacing()).await);

    let sent: Vec<serde_json::Value> = rx
        .map(|m| serde_json::from_str(&m).expect("each message is JSON"))
        .collect()
        .await;
    let types: Vec<&str> = sent.iter().map(|v| v["type"].as_str().unwrap()).collect();
    assert_eq!(
        types,
        [
            "page_start",
            "page_complete",
            "page_start",
            "page_complete",
            "processing_complete"
        ]
    );
    assert_eq!(sent[1]["page"], 1);
    assert_eq!(sent[1]["text"], "Recognised text of page 1");
    assert_eq!(sent[1]["total_pages"], 2);
}

#[tokio::test]
async fn serve_stream_rejects_bad_request_with_one_error() {
    let p = pipeline(StubRenderer::ok(), Arc::new(StubModel::default()));
    let (tx, rx) = futures::channel::mpsc::unbounded::<String>();

    assert_ok!(serve_stream(&p, "{\"filename\": \"x\"}", tx, Duration::ZERO).await);
    let sent: Vec<String> = rx.collect().await;
    assert_eq!(sent.len(), 1);
    assert!(sent[0].contains(r#""type":"error""#));
}

#[tokio::test]
async fn serve_stream_reports_closed_sink() {
    use base64::{engine::general_purpose::STANDARD, Engine as _};

    let p = pipeline(StubRenderer::ok(), Arc::new(StubModel::default()));
    let message = serde_json::json!({ "file_data": STANDARD.encode(blank_pdf(3)) }).to_string();

    let (tx, rx) = futures::channel::mpsc::unbounded::<String>();
    drop(rx);
    assert_err!(serve_stream(&p, &message, tx, Duration::ZERO).await);
}

#[tokio::test]
async fn batch_payload_from_pipeline_result() {
    let p = pipeline(StubRenderer::failing_on(&[2]), Arc::new(StubModel::default()));
    let result: DocumentResult = p.process(blank_pdf(2)).await;
    let payload = BatchResponse::from_result(result, "scan.pdf", "deu");

    assert!(payload.success);
    assert_eq!(payload.lang.as_deref(), Some("deu"));
    let text = payload.text.unwrap();
    assert!(text.starts_with("Page 1:\nRecognised text of page 1\n\nPage 2: ERROR - "));
}

// ── Live provider (opt-in) ───────────────────────────────────────────────────

/// Skip this test unless E2E_ENABLED is set.
macro_rules! e2e_skip_unless_ready {
    () => {{
        if std::env::var("E2E_ENABLED").is_err() {
            println!("SKIP — set E2E_ENABLED=1 to run e2e tests");
            return;
        }
    }};
}

#[tokio::test]
async fn e2e_live_provider_reads_an_image() {
    e2e_skip_unless_ready!();

    let config = OcrConfig::default();
    let result = edgequake_ocr::extract_text_from_bytes(&png_bytes(400, 300), &config)
        .await
        .expect("provider configured");
    assert!(result.success);
    assert_eq!(result.total_pages, 1);
}
