//! Integration tests for batch recognition.
//!
//! A scripted engine stands in for the recognizer: each test image's width
//! selects what the engine does with it (answer, sleep past the deadline,
//! fail, or panic). No external recognizer is needed.
//!
//! Run with:
//!   cargo test --test batch -- --nocapture

use edgequake_ocr::{
    BatchCancel, BatchConfig, BatchOrchestrator, BatchProgressCallback, EngineError,
    EngineFactory, EngineImage, EngineRegistry, FailureKind, OcrEngine, OcrError, PageHeader,
};
use image::{DynamicImage, Rgb, RgbImage};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

// ── Test helpers ─────────────────────────────────────────────────────────────

#[derive(Clone)]
enum Action {
    /// Dict-shaped output with one fragment per `(text, x, y)`.
    Dict(Vec<(&'static str, f64, f64)>),
    /// Legacy list-shaped output with one fragment per `(text, x, y)`.
    List(Vec<(&'static str, f64, f64)>),
    Sleep(Duration),
    Fail(&'static str),
    Panic,
}

/// Engine whose behaviour is keyed by image width.
#[derive(Default)]
struct ScriptedEngine {
    script: HashMap<u32, Action>,
    calls: AtomicUsize,
}

impl ScriptedEngine {
    fn with(mut self, width: u32, action: Action) -> Self {
        self.script.insert(width, action);
        self
    }
}

fn rect(x: f64, y: f64) -> Value {
    json!([x - 5.0, y - 5.0, x + 5.0, y + 5.0])
}

fn quad(x: f64, y: f64) -> Value {
    json!([[x - 5.0, y - 5.0], [x + 5.0, y - 5.0], [x + 5.0, y + 5.0], [x - 5.0, y + 5.0]])
}

impl OcrEngine for ScriptedEngine {
    fn name(&self) -> &str {
        "scripted"
    }

    fn recognize(&self, image: &EngineImage) -> Result<Value, EngineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let action = self
            .script
            .get(&image.width)
            .cloned()
            .unwrap_or_else(|| Action::Dict(vec![("page", 0.0, 0.0)]));

        match action {
            Action::Dict(frags) => Ok(json!([{
                "rec_texts": frags.iter().map(|f| f.0).collect::<Vec<_>>(),
                "rec_scores": frags.iter().map(|_| 0.95).collect::<Vec<_>>(),
                "rec_boxes": frags.iter().map(|f| rect(f.1, f.2)).collect::<Vec<_>>(),
            }])),
            Action::List(frags) => Ok(json!([frags
                .iter()
                .map(|f| json!([quad(f.1, f.2), [f.0, 0.95]]))
                .collect::<Vec<_>>()])),
            Action::Sleep(d) => {
                std::thread::sleep(d);
                Ok(json!([{ "rec_texts": ["late"], "rec_scores": [1.0], "rec_boxes": [[0, 0, 1, 1]] }]))
            }
            Action::Fail(msg) => Err(EngineError::Recognition(msg.into())),
            Action::Panic => panic!("recognizer crashed"),
        }
    }
}

struct SharedFactory(Arc<ScriptedEngine>);

impl EngineFactory for SharedFactory {
    fn create(&self, _language: &str) -> Result<Arc<dyn OcrEngine>, EngineError> {
        Ok(self.0.clone())
    }
}

struct MissingFactory;

impl EngineFactory for MissingFactory {
    fn create(&self, language: &str) -> Result<Arc<dyn OcrEngine>, EngineError> {
        Err(EngineError::Unavailable(format!("no model for '{language}'")))
    }
}

fn orchestrator(engine: Arc<ScriptedEngine>, config: BatchConfig) -> BatchOrchestrator {
    let registry = EngineRegistry::new(Arc::new(SharedFactory(engine))).with_warm_up(false);
    BatchOrchestrator::new(Arc::new(registry), config)
}

/// A page image whose width identifies it to the scripted engine.
fn page(width: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_pixel(width, 4, Rgb([255, 255, 255])))
}

fn text_page(text: &'static str) -> Action {
    Action::Dict(vec![(text, 10.0, 10.0)])
}

// ── Fault isolation ──────────────────────────────────────────────────────────

#[tokio::test]
async fn timed_out_page_does_not_affect_neighbours() {
    let engine = Arc::new(
        ScriptedEngine::default()
            .with(1, text_page("first"))
            .with(2, Action::Sleep(Duration::from_millis(1200)))
            .with(3, text_page("third")),
    );
    let orch = orchestrator(engine, BatchConfig::default());

    let result = orch
        .process_batch_with(
            vec![page(1), page(2), page(3)],
            10,
            Duration::from_millis(200),
        )
        .await
        .expect("batch should succeed");

    assert_eq!(result.pages.len(), 3);

    let p2 = &result.pages[1];
    assert!(p2.failed);
    assert_eq!(p2.failure_kind, FailureKind::Timeout);
    assert!(p2.detections.is_empty());
    assert!(p2.text.contains("Page 2"), "got: {}", p2.text);
    assert!(p2.text.contains("timeout"), "got: {}", p2.text);

    for p in [&result.pages[0], &result.pages[2]] {
        assert!(!p.failed);
        assert_eq!(p.failure_kind, FailureKind::None);
        assert!(!p.text.is_empty());
    }
    assert_eq!(result.pages[0].text, "first");
    assert_eq!(result.pages[2].text, "third");

    // The abandoned page must not hold up the batch.
    assert!(result.pages[1].duration_ms < 1000, "waited {}ms", result.pages[1].duration_ms);
    assert_eq!(result.stats.timed_out_pages, 1);
    assert_eq!(result.stats.succeeded_pages, 2);
}

#[test]
fn blocking_batch_returns_without_waiting_for_abandoned_page() {
    let engine = Arc::new(
        ScriptedEngine::default()
            .with(1, text_page("first"))
            .with(2, Action::Sleep(Duration::from_secs(4)))
            .with(3, text_page("third")),
    );
    let config = BatchConfig::builder()
        .page_timeout(Duration::from_millis(200))
        .build()
        .unwrap();
    let orch = orchestrator(engine, config);

    let start = Instant::now();
    let result = orch
        .process_batch_blocking(vec![page(1), page(2), page(3)])
        .expect("batch should succeed");
    let elapsed = start.elapsed();

    assert_eq!(result.pages.len(), 3);
    assert_eq!(result.pages[1].failure_kind, FailureKind::Timeout);
    assert_eq!(result.pages[2].text, "third");
    assert!(elapsed < Duration::from_secs(2), "returned after {elapsed:?}");
}

#[tokio::test]
async fn engine_error_and_panic_are_engine_error_pages() {
    let engine = Arc::new(
        ScriptedEngine::default()
            .with(1, Action::Fail("CUDA out of memory"))
            .with(2, Action::Panic)
            .with(3, text_page("ok")),
    );
    let orch = orchestrator(engine, BatchConfig::default());

    let result = orch
        .process_batch(vec![page(1), page(2), page(3)])
        .await
        .unwrap();

    assert_eq!(result.pages[0].failure_kind, FailureKind::EngineError);
    assert!(result.pages[0].text.contains("CUDA out of memory"));
    assert_eq!(result.pages[1].failure_kind, FailureKind::EngineError);
    assert!(result.pages[1].text.contains("recognizer crashed"));
    assert!(!result.pages[2].failed);
    assert_eq!(result.stats.failed_pages, 2);

    let err = result.into_result().unwrap_err();
    assert!(matches!(
        err,
        OcrError::PartialFailure {
            success: 1,
            failed: 2,
            total: 3
        }
    ));
}

#[tokio::test]
async fn empty_recognition_is_a_success() {
    let engine = Arc::new(ScriptedEngine::default().with(1, Action::Dict(vec![])));
    let orch = orchestrator(engine, BatchConfig::default());

    let outcome = orch.process_page(page(1)).await.unwrap();
    assert!(!outcome.failed);
    assert_eq!(outcome.failure_kind, FailureKind::None);
    assert!(outcome.text.is_empty());
    assert!(outcome.detections.is_empty());
}

// ── Cap truncation ───────────────────────────────────────────────────────────

#[tokio::test]
async fn cap_keeps_first_pages_in_order() {
    let engine = Arc::new(ScriptedEngine::default());
    let orch = orchestrator(engine.clone(), BatchConfig::default());

    let images: Vec<_> = (1..=8).map(page).collect();
    let result = orch
        .process_batch_with(images, 5, Duration::from_secs(5))
        .await
        .unwrap();

    assert_eq!(result.pages.len(), 5);
    assert_eq!(
        result.pages.iter().map(|p| p.index).collect::<Vec<_>>(),
        vec![1, 2, 3, 4, 5]
    );
    assert_eq!(engine.calls.load(Ordering::SeqCst), 5);
    assert_eq!(result.stats.input_images, 8);
    assert_eq!(result.stats.truncated_pages, 3);
    assert!(!result.combined_text.contains("--- Page 6 ---"));
}

#[tokio::test]
async fn configured_cap_applies_to_process_batch() {
    let engine = Arc::new(ScriptedEngine::default());
    let config = BatchConfig::builder().max_pages(2).build().unwrap();
    let orch = orchestrator(engine, config);

    let result = orch
        .process_batch(vec![page(1), page(2), page(3)])
        .await
        .unwrap();
    assert_eq!(result.pages.len(), 2);
}

// ── Engine availability ──────────────────────────────────────────────────────

#[tokio::test]
async fn unavailable_engine_fails_the_batch() {
    let registry = EngineRegistry::new(Arc::new(MissingFactory)).with_warm_up(false);
    let config = BatchConfig::builder().language("korean").build().unwrap();
    let orch = BatchOrchestrator::new(Arc::new(registry), config);

    let err = orch.process_batch(vec![page(1)]).await.unwrap_err();
    match err {
        OcrError::EngineUnavailable { language, reason } => {
            assert_eq!(language, "korean");
            assert!(reason.contains("no model"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn languages_share_normalized_engine() {
    let engine = Arc::new(ScriptedEngine::default());
    let registry = Arc::new(
        EngineRegistry::new(Arc::new(SharedFactory(engine))).with_warm_up(false),
    );

    for lang in ["ch_tra", "ch_sim"] {
        let config = BatchConfig::builder().language(lang).build().unwrap();
        BatchOrchestrator::new(registry.clone(), config)
            .process_page(page(1))
            .await
            .unwrap();
    }
    assert_eq!(registry.cached_languages(), vec!["ch".to_string()]);
}

// ── Output shape ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn dict_and_list_outputs_order_identically() {
    let frags = vec![("A", 10.0, 100.0), ("B", 5.0, 102.0), ("C", 0.0, 140.0)];
    let engine = Arc::new(
        ScriptedEngine::default()
            .with(1, Action::Dict(frags.clone()))
            .with(2, Action::List(frags)),
    );
    let orch = orchestrator(engine, BatchConfig::default());

    let result = orch.process_batch(vec![page(1), page(2)]).await.unwrap();
    let (dict, list) = (&result.pages[0], &result.pages[1]);

    assert_eq!(dict.text, "A\nB\nC");
    assert_eq!(dict.text, list.text);
    assert_eq!(dict.layout_text(), "B A\nC");
    assert_eq!(list.layout_text(), "B A\nC");
    assert_eq!(dict.detections[0].bbox.len(), 4);
    assert_eq!(list.detections[0].bbox.len(), 8);
}

#[tokio::test]
async fn combined_and_layout_text_use_headers() {
    let engine = Arc::new(
        ScriptedEngine::default()
            .with(1, Action::Dict(vec![("right", 50.0, 10.0), ("left", 0.0, 12.0)]))
            .with(2, Action::Fail("boom")),
    );
    let config = BatchConfig::builder()
        .page_header(PageHeader::Comment)
        .build()
        .unwrap();
    let orch = orchestrator(engine, config);

    let result = orch.process_batch(vec![page(1), page(2)]).await.unwrap();
    assert_eq!(
        result.combined_text,
        "<!-- page 1 -->\nright\nleft\n\n<!-- page 2 -->\n[Error: Page 2: OCR engine failed: recognition failed: boom]"
    );
    assert!(result
        .layout_text(&PageHeader::Comment)
        .starts_with("<!-- page 1 -->\nleft right\n\n<!-- page 2 -->\n[Error:"));
}

#[tokio::test]
async fn batch_result_serialises_failure_kind() {
    let engine = Arc::new(ScriptedEngine::default().with(1, Action::Fail("x")));
    let orch = orchestrator(engine, BatchConfig::default());

    let result = orch.process_batch(vec![page(1)]).await.unwrap();
    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["pages"][0]["failure_kind"], "engine_error");
    assert_eq!(json["pages"][0]["failed"], true);
}

// ── Progress and cancellation ────────────────────────────────────────────────

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<String>>,
    cancel_after_first: Option<BatchCancel>,
}

impl BatchProgressCallback for Recorder {
    fn on_batch_start(&self, total_pages: usize) {
        self.events.lock().unwrap().push(format!("start {total_pages}"));
    }

    fn on_page_complete(&self, page_num: usize, _total: usize, _text_len: usize) {
        self.events.lock().unwrap().push(format!("ok {page_num}"));
        if let Some(cancel) = &self.cancel_after_first {
            cancel.cancel();
        }
    }

    fn on_page_error(&self, page_num: usize, _total: usize, _error: &str) {
        self.events.lock().unwrap().push(format!("err {page_num}"));
    }

    fn on_batch_complete(&self, total_pages: usize, success_count: usize) {
        self.events
            .lock()
            .unwrap()
            .push(format!("done {success_count}/{total_pages}"));
    }
}

#[tokio::test]
async fn progress_events_follow_page_order() {
    let engine = Arc::new(ScriptedEngine::default().with(2, Action::Fail("bad")));
    let recorder = Arc::new(Recorder::default());
    let config = BatchConfig::builder()
        .progress_callback(recorder.clone())
        .build()
        .unwrap();
    let orch = orchestrator(engine, config);

    orch.process_batch(vec![page(1), page(2), page(3)])
        .await
        .unwrap();

    assert_eq!(
        *recorder.events.lock().unwrap(),
        vec!["start 3", "ok 1", "err 2", "ok 3", "done 2/3"]
    );
}

#[tokio::test]
async fn cancellation_stops_scheduling_after_current_page() {
    let engine = Arc::new(ScriptedEngine::default());
    let cancel = BatchCancel::new();
    let recorder = Arc::new(Recorder {
        cancel_after_first: Some(cancel.clone()),
        ..Default::default()
    });
    let config = BatchConfig::builder()
        .progress_callback(recorder)
        .build()
        .unwrap();
    let orch = orchestrator(engine.clone(), config);

    let result = orch
        .process_batch_cancellable(vec![page(1), page(2), page(3), page(4)], &cancel)
        .await
        .unwrap();

    assert_eq!(result.pages.len(), 1);
    assert!(!result.pages[0].failed);
    assert_eq!(result.stats.cancelled_pages, 3);
    assert_eq!(engine.calls.load(Ordering::SeqCst), 1);
}

// ── File inputs ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn process_inputs_reads_files_and_applies_cap() {
    let dir = tempfile::tempdir().unwrap();
    let mut inputs = Vec::new();
    for width in 1..=4u32 {
        let path = dir.path().join(format!("page-{width}.png"));
        RgbImage::from_pixel(width, 4, Rgb([255, 255, 255]))
            .save(&path)
            .unwrap();
        inputs.push(path.to_string_lossy().into_owned());
    }

    let engine = Arc::new(ScriptedEngine::default().with(2, text_page("two")));
    let config = BatchConfig::builder().max_pages(3).build().unwrap();
    let orch = orchestrator(engine.clone(), config);

    let result = orch.process_inputs(&inputs).await.unwrap();
    assert_eq!(result.pages.len(), 3);
    assert_eq!(result.pages[1].text, "two");
    assert_eq!(result.stats.input_images, 4);
    assert_eq!(result.stats.truncated_pages, 1);
    assert_eq!(engine.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn process_inputs_rejects_unsupported_files() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("doc.pdf");
    std::fs::write(&path, b"%PDF-1.7").unwrap();

    let orch = orchestrator(Arc::new(ScriptedEngine::default()), BatchConfig::default());
    let err = orch
        .process_inputs(&[path.to_string_lossy().into_owned()])
        .await
        .unwrap_err();
    assert!(matches!(err, OcrError::UnsupportedFormat { .. }));
}
