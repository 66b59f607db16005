//! Streaming batch API: emit pages as they complete.
//!
//! ## Why stream?
//!
//! A batch of slow pages can take minutes. A stream lets callers show
//! partial results immediately or write pages out incrementally instead of
//! waiting for the whole [`crate::output::BatchResult`].
//!
//! Pages are still processed one at a time, so items arrive in input order.
//! The cap, per-page deadline and progress callback behave as they do for
//! [`crate::batch::BatchOrchestrator::process_batch`]; `on_batch_complete`
//! fires when the last page is yielded.

use crate::batch::{check_limits, run_page, BatchOrchestrator};
use crate::error::OcrError;
use crate::output::PageResult;
use futures::stream::{self, StreamExt};
use image::DynamicImage;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio_stream::Stream;
use tracing::{debug, info, warn};

/// A boxed stream of page results.
pub type PageStream = Pin<Box<dyn Stream<Item = PageResult> + Send>>;

/// Recognize `images`, yielding each page's result as soon as it is ready.
///
/// The engine is acquired before the stream is returned, so an unavailable
/// engine is reported here rather than as a stream item.
///
/// # Example
/// ```rust,no_run
/// use edgequake_ocr::{process_stream, BatchConfig, BatchOrchestrator, CommandEngineFactory, EngineRegistry};
/// use futures::StreamExt;
/// use std::sync::Arc;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let factory = Arc::new(CommandEngineFactory::new("paddle-ocr-json", vec![]));
/// let registry = Arc::new(EngineRegistry::new(factory));
/// let orch = BatchOrchestrator::new(registry, BatchConfig::default());
///
/// let images = vec![image::open("scan-1.png")?, image::open("scan-2.png")?];
/// let mut pages = process_stream(&orch, images).await?;
/// while let Some(page) = pages.next().await {
///     println!("page {}: {} chars", page.index, page.text.len());
/// }
/// # Ok(())
/// # }
/// ```
pub async fn process_stream(
    orchestrator: &BatchOrchestrator,
    mut images: Vec<DynamicImage>,
) -> Result<PageStream, OcrError> {
    let config = orchestrator.config();
    let cap = config.max_pages;
    let page_timeout = config.page_timeout;
    check_limits(cap, page_timeout)?;

    if images.len() > cap {
        warn!(
            "Batch of {} images exceeds the cap of {}; ignoring the last {}",
            images.len(),
            cap,
            images.len() - cap
        );
        images.truncate(cap);
    }
    let total = images.len();
    if total == 0 {
        debug!("Empty batch; nothing to stream");
        return Ok(Box::pin(stream::empty::<PageResult>()));
    }

    let processor = orchestrator.page_processor().await?;
    info!("Starting streaming recognition of {} page(s)", total);

    let callback = config.progress_callback.clone();
    if let Some(cb) = &callback {
        cb.on_batch_start(total);
    }
    let succeeded = Arc::new(AtomicUsize::new(0));

    let s = stream::iter(images.into_iter().enumerate()).then(move |(i, image)| {
        let processor = processor.clone();
        let callback = callback.clone();
        let succeeded = Arc::clone(&succeeded);
        async move {
            let index = i + 1;
            if let Some(cb) = &callback {
                cb.on_page_start(index, total);
            }
            let page = run_page(&processor, index, image, page_timeout).await;
            if page.error.is_none() {
                succeeded.fetch_add(1, Ordering::SeqCst);
            }
            if let Some(cb) = &callback {
                match &page.error {
                    None => cb.on_page_complete(index, total, page.text.len()),
                    Some(e) => cb.on_page_error(index, total, &e.to_string()),
                }
                if index == total {
                    cb.on_batch_complete(total, succeeded.load(Ordering::SeqCst));
                }
            }
            page
        }
    });

    Ok(Box::pin(s))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BatchConfig;
    use crate::engine::{EngineFactory, EngineImage, EngineRegistry, OcrEngine};
    use crate::error::EngineError;
    use crate::output::FailureKind;
    use crate::progress::BatchProgressCallback;
    use image::{Rgb, RgbImage};
    use serde_json::{json, Value};
    use std::sync::Mutex;
    use std::time::Duration;

    struct WidthEngine;

    impl OcrEngine for WidthEngine {
        fn name(&self) -> &str {
            "width"
        }

        fn recognize(&self, image: &EngineImage) -> Result<Value, EngineError> {
            if image.width == 2 {
                return Err(EngineError::Recognition("bad page".into()));
            }
            Ok(json!({
                "rec_texts": [format!("page-{}", image.width)],
                "rec_scores": [0.99],
                "rec_boxes": [[0, 0, 5, 5]],
            }))
        }
    }

    struct Factory;

    impl EngineFactory for Factory {
        fn create(&self, _language: &str) -> Result<Arc<dyn OcrEngine>, EngineError> {
            Ok(Arc::new(WidthEngine))
        }
    }

    struct NoEngine;

    impl EngineFactory for NoEngine {
        fn create(&self, language: &str) -> Result<Arc<dyn OcrEngine>, EngineError> {
            Err(EngineError::Unavailable(format!("no weights for {language}")))
        }
    }

    fn image(width: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(width, 3, Rgb([0, 0, 0])))
    }

    #[tokio::test]
    async fn streams_pages_in_order_and_isolates_failures() {
        let registry = Arc::new(EngineRegistry::new(Arc::new(Factory)).with_warm_up(false));
        let config = BatchConfig::builder().max_pages(3).build().unwrap();
        let orch = BatchOrchestrator::new(registry, config);

        let pages: Vec<PageResult> = process_stream(&orch, vec![image(1), image(2), image(3), image(4)])
            .await
            .unwrap()
            .collect()
            .await;

        assert_eq!(pages.len(), 3);
        assert_eq!(pages[0].text, "page-1");
        assert!(pages[1].failed);
        assert_eq!(pages[1].failure_kind, FailureKind::EngineError);
        assert_eq!(pages[2].text, "page-3");
        assert_eq!(
            pages.iter().map(|p| p.index).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
    }

    #[tokio::test]
    async fn unavailable_engine_is_reported_up_front() {
        let registry = Arc::new(EngineRegistry::new(Arc::new(NoEngine)).with_warm_up(false));
        let orch = BatchOrchestrator::new(registry, BatchConfig::default());
        let err = process_stream(&orch, vec![image(1)]).await.err().expect("should fail");
        assert!(matches!(err, OcrError::EngineUnavailable { .. }));
    }

    #[derive(Default)]
    struct Events(Mutex<Vec<String>>);

    impl BatchProgressCallback for Events {
        fn on_batch_start(&self, total_pages: usize) {
            self.0.lock().unwrap().push(format!("batch {total_pages}"));
        }

        fn on_page_complete(&self, page_num: usize, _: usize, _: usize) {
            self.0.lock().unwrap().push(format!("ok {page_num}"));
        }

        fn on_page_error(&self, page_num: usize, _: usize, _: &str) {
            self.0.lock().unwrap().push(format!("err {page_num}"));
        }

        fn on_batch_complete(&self, total_pages: usize, success_count: usize) {
            self.0
                .lock()
                .unwrap()
                .push(format!("done {success_count}/{total_pages}"));
        }
    }

    #[tokio::test]
    async fn stream_reports_progress() {
        let events = Arc::new(Events::default());
        let registry = Arc::new(EngineRegistry::new(Arc::new(Factory)).with_warm_up(false));
        let config = BatchConfig::builder()
            .progress_callback(events.clone())
            .build()
            .unwrap();
        let orch = BatchOrchestrator::new(registry, config);

        let pages: Vec<PageResult> = process_stream(&orch, vec![image(1), image(2), image(3)])
            .await
            .unwrap()
            .collect()
            .await;

        assert_eq!(pages.len(), 3);
        assert_eq!(
            *events.0.lock().unwrap(),
            vec!["batch 3", "ok 1", "err 2", "ok 3", "done 2/3"]
        );
    }

    #[tokio::test]
    async fn zero_limits_are_rejected_before_building_an_engine() {
        let registry = Arc::new(EngineRegistry::new(Arc::new(Factory)).with_warm_up(false));
        let mut config = BatchConfig::default();
        config.max_pages = 0;
        let orch = BatchOrchestrator::new(Arc::clone(&registry), config);
        let err = process_stream(&orch, vec![image(1)]).await.err().expect("should fail");
        assert!(matches!(err, OcrError::InvalidConfig(_)));

        let mut config = BatchConfig::default();
        config.page_timeout = Duration::ZERO;
        let orch = BatchOrchestrator::new(Arc::clone(&registry), config);
        let err = process_stream(&orch, vec![image(1)]).await.err().expect("should fail");
        assert!(matches!(err, OcrError::InvalidConfig(_)));

        assert!(registry.cached_languages().is_empty());
    }

    #[tokio::test]
    async fn empty_stream_needs_no_engine() {
        let registry = Arc::new(EngineRegistry::new(Arc::new(NoEngine)).with_warm_up(false));
        let orch = BatchOrchestrator::new(registry, BatchConfig::default());
        let pages: Vec<PageResult> = process_stream(&orch, Vec::new()).await.unwrap().collect().await;
        assert!(pages.is_empty());
    }
}
