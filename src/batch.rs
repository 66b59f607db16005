//! Batch orchestration: run pages one at a time, each under its own deadline.
//!
//! ## Page lifecycle
//!
//! ```text
//! PENDING ──▶ RUNNING ──┬──▶ DONE        result kept as-is (empty text is fine)
//!                       ├──▶ TIMED_OUT   deadline hit, blocking call detached
//!                       └──▶ FAILED      engine error or panic
//! ```
//!
//! The engine call runs on `tokio::task::spawn_blocking` and the orchestrator
//! waits on it with `tokio::time::timeout`. At the deadline the join handle
//! is dropped: the orchestrator moves on and the detached call finishes (or
//! not) on its own. Nothing is force-killed.
//!
//! Pages run strictly in input order because a single engine handle is not
//! assumed safe for concurrent calls. A failed page never stops the batch;
//! only an engine that cannot be built at all is reported as `Err`.

use crate::config::BatchConfig;
use crate::engine::EngineRegistry;
use crate::error::{OcrError, PageError};
use crate::output::{assemble_combined_text, BatchResult, BatchStats, FailureKind, PageOutcome, PageResult};
use crate::pipeline::input;
use crate::pipeline::page::PageProcessor;
use image::DynamicImage;
use std::any::Any;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Cooperative cancellation flag for a running batch.
///
/// Checked before each page is scheduled. The page already in flight runs
/// to completion or to its deadline.
#[derive(Debug, Clone, Default)]
pub struct BatchCancel(Arc<AtomicBool>);

impl BatchCancel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop scheduling further pages.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Drives single pages and whole batches through the engine.
#[derive(Debug, Clone)]
pub struct BatchOrchestrator {
    registry: Arc<EngineRegistry>,
    config: BatchConfig,
}

impl BatchOrchestrator {
    pub fn new(registry: Arc<EngineRegistry>, config: BatchConfig) -> Self {
        Self { registry, config }
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<EngineRegistry> {
        &self.registry
    }

    /// Recognize one image under the configured page deadline.
    ///
    /// # Errors
    /// Only [`OcrError::EngineUnavailable`]; timeouts and engine failures are
    /// reported in the returned [`PageOutcome`].
    pub async fn process_page(&self, image: DynamicImage) -> Result<PageOutcome, OcrError> {
        let processor = self.page_processor().await?;
        let page = run_page(&processor, 1, image, self.config.page_timeout).await;
        Ok(page.into())
    }

    /// Recognize `images` in order, using the configured cap and deadline.
    pub async fn process_batch(&self, images: Vec<DynamicImage>) -> Result<BatchResult, OcrError> {
        self.process_batch_with(images, self.config.max_pages, self.config.page_timeout)
            .await
    }

    /// Like [`process_batch`](Self::process_batch) with an explicit cap and
    /// per-page deadline.
    pub async fn process_batch_with(
        &self,
        images: Vec<DynamicImage>,
        cap: usize,
        page_timeout: Duration,
    ) -> Result<BatchResult, OcrError> {
        self.run(images, cap, page_timeout, None).await
    }

    /// Like [`process_batch`](Self::process_batch), stopping early once
    /// `cancel` is triggered.
    pub async fn process_batch_cancellable(
        &self,
        images: Vec<DynamicImage>,
        cancel: &BatchCancel,
    ) -> Result<BatchResult, OcrError> {
        self.run(
            images,
            self.config.max_pages,
            self.config.page_timeout,
            Some(cancel),
        )
        .await
    }

    /// Resolve and decode paths or URLs, then process them as one batch.
    ///
    /// Inputs beyond the cap are dropped before anything is read or
    /// downloaded. An input that cannot be loaded fails the whole call.
    pub async fn process_inputs(&self, inputs: &[String]) -> Result<BatchResult, OcrError> {
        let cap = self.config.max_pages;
        let kept = &inputs[..inputs.len().min(cap)];
        if inputs.len() > kept.len() {
            warn!(
                "Batch of {} inputs exceeds the cap of {}; ignoring the last {}",
                inputs.len(),
                cap,
                inputs.len() - kept.len()
            );
        }

        let mut images = Vec::with_capacity(kept.len());
        for item in kept {
            images.push(input::load_image(item, self.config.download_timeout_secs).await?);
        }

        let mut result = self
            .run(images, cap, self.config.page_timeout, None)
            .await?;
        if inputs.len() > kept.len() {
            result.stats.input_images = inputs.len();
            result.stats.truncated_pages = inputs.len() - kept.len();
        }
        Ok(result)
    }

    /// Acquire the engine for the configured language from the registry.
    pub async fn page_processor(&self) -> Result<PageProcessor, OcrError> {
        let registry = Arc::clone(&self.registry);
        let language = self.config.language.clone();
        // Engine construction loads model weights; keep it off the runtime threads.
        let engine = tokio::task::spawn_blocking(move || registry.get_or_create(&language))
            .await
            .map_err(|e| OcrError::Internal(format!("engine construction panicked: {e}")))??;
        Ok(PageProcessor::new(engine))
    }

    async fn run(
        &self,
        mut images: Vec<DynamicImage>,
        cap: usize,
        page_timeout: Duration,
        cancel: Option<&BatchCancel>,
    ) -> Result<BatchResult, OcrError> {
        check_limits(cap, page_timeout)?;

        let batch_start = Instant::now();
        let input_images = images.len();
        if images.len() > cap {
            warn!(
                "Batch of {} images exceeds the cap of {}; ignoring the last {}",
                input_images,
                cap,
                input_images - cap
            );
            images.truncate(cap);
        }
        let total = images.len();

        let mut stats = BatchStats {
            input_images,
            truncated_pages: input_images - total,
            ..Default::default()
        };

        if total == 0 {
            debug!("Empty batch; nothing to recognize");
            return Ok(BatchResult {
                pages: Vec::new(),
                combined_text: String::new(),
                stats,
            });
        }

        let processor = self.page_processor().await?;
        info!(
            "Processing {} page(s) with engine '{}' (timeout {}ms per page)",
            total,
            processor.engine().name(),
            page_timeout.as_millis()
        );

        let callback = self.config.progress_callback.as_deref();
        if let Some(cb) = callback {
            cb.on_batch_start(total);
        }

        let mut pages = Vec::with_capacity(total);
        for (i, image) in images.into_iter().enumerate() {
            let index = i + 1;
            if cancel.is_some_and(BatchCancel::is_cancelled) {
                stats.cancelled_pages = total - i;
                info!(
                    "Batch cancelled before page {}; {} page(s) not scheduled",
                    index, stats.cancelled_pages
                );
                break;
            }

            if let Some(cb) = callback {
                cb.on_page_start(index, total);
            }
            let page = run_page(&processor, index, image, page_timeout).await;
            if let Some(cb) = callback {
                match &page.error {
                    None => cb.on_page_complete(index, total, page.text.len()),
                    Some(e) => cb.on_page_error(index, total, &e.to_string()),
                }
            }
            pages.push(page);
        }

        stats.processed_pages = pages.len();
        stats.succeeded_pages = pages.iter().filter(|p| !p.failed).count();
        stats.failed_pages = stats.processed_pages - stats.succeeded_pages;
        stats.timed_out_pages = pages
            .iter()
            .filter(|p| p.failure_kind == FailureKind::Timeout)
            .count();
        stats.total_detections = pages.iter().map(|p| p.detections.len()).sum();
        stats.total_duration_ms = batch_start.elapsed().as_millis() as u64;

        if let Some(cb) = callback {
            cb.on_batch_complete(total, stats.succeeded_pages);
        }

        info!(
            "Batch complete: {}/{} pages ok, {} timed out, {} detections in {}ms",
            stats.succeeded_pages,
            stats.processed_pages,
            stats.timed_out_pages,
            stats.total_detections,
            stats.total_duration_ms
        );

        let combined_text = assemble_combined_text(&pages, &self.config.page_header);
        Ok(BatchResult {
            pages,
            combined_text,
            stats,
        })
    }

    /// Blocking wrapper around [`process_batch`](Self::process_batch).
    ///
    /// Creates a temporary tokio runtime internally; do not call from async code.
    /// Returns as soon as the last page is recorded: engine calls abandoned at
    /// their deadline are left running on the detached runtime.
    pub fn process_batch_blocking(
        &self,
        images: Vec<DynamicImage>,
    ) -> Result<BatchResult, OcrError> {
        let rt = tokio::runtime::Runtime::new()
            .map_err(|e| OcrError::Internal(format!("Failed to create tokio runtime: {}", e)))?;
        let result = rt.block_on(self.process_batch(images));
        rt.shutdown_background();
        result
    }
}

/// Reject a zero page cap or a zero page deadline.
pub(crate) fn check_limits(cap: usize, page_timeout: Duration) -> Result<(), OcrError> {
    if cap == 0 {
        return Err(OcrError::InvalidConfig("page cap must be ≥ 1".into()));
    }
    if page_timeout.is_zero() {
        return Err(OcrError::InvalidConfig(
            "page timeout must be greater than zero".into(),
        ));
    }
    Ok(())
}

/// Run one page on a blocking thread and wait at most `page_timeout` for it.
pub(crate) async fn run_page(
    processor: &PageProcessor,
    index: usize,
    image: DynamicImage,
    page_timeout: Duration,
) -> PageResult {
    let start = Instant::now();
    let worker = processor.clone();
    let handle = tokio::task::spawn_blocking(move || worker.recognize(&image));

    let outcome = tokio::time::timeout(page_timeout, handle).await;
    let elapsed_ms = start.elapsed().as_millis() as u64;

    match outcome {
        Ok(Ok(Ok(page))) => {
            debug!(
                "Page {}: {} detection(s) in {}ms",
                index,
                page.detections.len(),
                elapsed_ms
            );
            PageResult::done(index, page, elapsed_ms)
        }
        Ok(Ok(Err(e))) => {
            warn!("Page {}: OCR engine failed: {}", index, e);
            PageResult::failed(
                index,
                PageError::EngineFailed {
                    page: index,
                    detail: e.to_string(),
                },
                elapsed_ms,
            )
        }
        Ok(Err(join_err)) => {
            let detail = if join_err.is_panic() {
                format!("engine panicked: {}", panic_message(join_err.into_panic()))
            } else {
                join_err.to_string()
            };
            warn!("Page {}: {}", index, detail);
            PageResult::failed(
                index,
                PageError::EngineFailed {
                    page: index,
                    detail,
                },
                elapsed_ms,
            )
        }
        Err(_) => {
            warn!(
                "Page {}: no result after {}ms; abandoning the engine call",
                index,
                page_timeout.as_millis()
            );
            PageResult::failed(
                index,
                PageError::Timeout {
                    page: index,
                    timeout_ms: page_timeout.as_millis() as u64,
                },
                elapsed_ms,
            )
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Write `contents` to `path` atomically: write a sibling temp file, then rename.
pub async fn write_text_atomic(path: impl AsRef<Path>, contents: &str) -> Result<(), OcrError> {
    let path = path.as_ref();
    let write_err = |source| OcrError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }

    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = std::path::PathBuf::from(tmp_name);

    tokio::fs::write(&tmp_path, contents)
        .await
        .map_err(write_err)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(write_err)?;

    debug!("Wrote {} bytes to {}", contents.len(), path.display());
    Ok(())
}
