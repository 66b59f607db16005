//! Progress-callback trait for per-page batch events.
//!
//! Inject an [`Arc<dyn BatchProgressCallback>`] via
//! [`crate::config::BatchConfigBuilder::progress_callback`] to receive
//! events as the orchestrator works through each page.
//!
//! # Example
//!
//! ```rust
//! use edgequake_ocr::{BatchConfig, BatchProgressCallback};
//! use std::sync::{Arc, Mutex};
//!
//! #[derive(Default)]
//! struct FailedPages(Mutex<Vec<usize>>);
//!
//! impl BatchProgressCallback for FailedPages {
//!     fn on_page_error(&self, page_num: usize, _total_pages: usize, error: &str) {
//!         eprintln!("page {page_num} failed: {error}");
//!         self.0.lock().unwrap().push(page_num);
//!     }
//! }
//!
//! let failed = Arc::new(FailedPages::default());
//! let config = BatchConfig::builder()
//!     .progress_callback(failed.clone())
//!     .build()
//!     .unwrap();
//! assert!(failed.0.lock().unwrap().is_empty());
//! # drop(config);
//! ```

use std::sync::Arc;

/// Called by the orchestrator as it processes each page.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Pages run one at a time, but the callback may be
/// invoked from whichever runtime thread drives the batch, hence `Send + Sync`.
pub trait BatchProgressCallback: Send + Sync {
    /// Called once, after cap truncation, before the first page starts.
    fn on_batch_start(&self, total_pages: usize) {
        let _ = total_pages;
    }

    /// Called just before a page is handed to the engine.
    fn on_page_start(&self, page_num: usize, total_pages: usize) {
        let _ = (page_num, total_pages);
    }

    /// Called when a page finishes before its deadline.
    ///
    /// `text_len` is the byte length of the page's reading-order text.
    fn on_page_complete(&self, page_num: usize, total_pages: usize, text_len: usize) {
        let _ = (page_num, total_pages, text_len);
    }

    /// Called when a page times out or the engine fails on it.
    fn on_page_error(&self, page_num: usize, total_pages: usize, error: &str) {
        let _ = (page_num, total_pages, error);
    }

    /// Called once after the last scheduled page.
    fn on_batch_complete(&self, total_pages: usize, success_count: usize) {
        let _ = (total_pages, success_count);
    }
}

/// Ignores every event. Used when no callback is configured.
pub struct NoopProgressCallback;

impl BatchProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::BatchConfig`].
pub type ProgressCallback = Arc<dyn BatchProgressCallback>;
