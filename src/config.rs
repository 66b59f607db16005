//! Configuration types for batch recognition.
//!
//! All batch behaviour is controlled through [`BatchConfig`], built via its
//! [`BatchConfigBuilder`]. One struct for every knob makes it easy to share a
//! config across tasks and to log exactly what a run used.

use crate::error::OcrError;
use crate::progress::BatchProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Default page cap applied before a batch starts.
pub const DEFAULT_MAX_PAGES: usize = 10;

/// Default per-page deadline in seconds.
pub const DEFAULT_PAGE_TIMEOUT_SECS: u64 = 60;

/// Configuration for a recognition batch.
///
/// Built via [`BatchConfig::builder()`] or using [`BatchConfig::default()`].
///
/// # Example
/// ```rust
/// use edgequake_ocr::BatchConfig;
///
/// let config = BatchConfig::builder()
///     .language("ch_tra")
///     .max_pages(5)
///     .page_timeout_secs(30)
///     .build()
///     .unwrap();
/// assert_eq!(config.max_pages, 5);
/// ```
#[derive(Clone)]
pub struct BatchConfig {
    /// Language code passed to the engine registry (e.g. `en`, `ch_tra`). Default: `en`.
    ///
    /// Codes are normalized before lookup, so `ch_tra` and `ch_sim` share one
    /// engine handle.
    pub language: String,

    /// Maximum number of images processed per batch. Default: 10.
    ///
    /// Extra images are dropped before any work starts and never appear in
    /// the result; the drop is logged at WARN level.
    pub max_pages: usize,

    /// Per-page deadline. Default: 60 s.
    ///
    /// A page still running at the deadline is abandoned and recorded as a
    /// timeout; the batch moves on to the next page.
    pub page_timeout: Duration,

    /// Header written above each page in the combined text. Default: `--- Page N ---`.
    pub page_header: PageHeader,

    /// Run a recognition on a blank image right after an engine is built. Default: true.
    ///
    /// The registry owns engine construction, so pass this on with
    /// [`crate::engine::EngineRegistry::with_warm_up`].
    pub warm_up: bool,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Optional per-page progress events.
    pub progress_callback: Option<Arc<dyn BatchProgressCallback>>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            language: "en".to_string(),
            max_pages: DEFAULT_MAX_PAGES,
            page_timeout: Duration::from_secs(DEFAULT_PAGE_TIMEOUT_SECS),
            page_header: PageHeader::default(),
            warm_up: true,
            download_timeout_secs: 120,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for BatchConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchConfig")
            .field("language", &self.language)
            .field("max_pages", &self.max_pages)
            .field("page_timeout", &self.page_timeout)
            .field("page_header", &self.page_header)
            .field("warm_up", &self.warm_up)
            .field("download_timeout_secs", &self.download_timeout_secs)
            .field(
                "progress_callback",
                &self
                    .progress_callback
                    .as_ref()
                    .map(|_| "<dyn BatchProgressCallback>"),
            )
            .finish()
    }
}

impl BatchConfig {
    /// Create a new builder for `BatchConfig`.
    pub fn builder() -> BatchConfigBuilder {
        BatchConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`BatchConfig`].
#[derive(Debug)]
pub struct BatchConfigBuilder {
    config: BatchConfig,
}

impl BatchConfigBuilder {
    pub fn language(mut self, lang: impl Into<String>) -> Self {
        self.config.language = lang.into();
        self
    }

    pub fn max_pages(mut self, n: usize) -> Self {
        self.config.max_pages = n;
        self
    }

    pub fn page_timeout(mut self, timeout: Duration) -> Self {
        self.config.page_timeout = timeout;
        self
    }

    pub fn page_timeout_secs(mut self, secs: u64) -> Self {
        self.config.page_timeout = Duration::from_secs(secs);
        self
    }

    pub fn page_header(mut self, header: PageHeader) -> Self {
        self.config.page_header = header;
        self
    }

    pub fn warm_up(mut self, v: bool) -> Self {
        self.config.warm_up = v;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: Arc<dyn BatchProgressCallback>) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<BatchConfig, OcrError> {
        let c = &self.config;
        if c.language.trim().is_empty() {
            return Err(OcrError::InvalidConfig("language must not be empty".into()));
        }
        if c.max_pages == 0 {
            return Err(OcrError::InvalidConfig("max_pages must be ≥ 1".into()));
        }
        if c.page_timeout.is_zero() {
            return Err(OcrError::InvalidConfig(
                "page timeout must be greater than zero".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Header written above each page in the combined text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageHeader {
    /// `--- Page N ---` (default)
    #[default]
    Dashed,
    /// `<!-- page N -->`
    Comment,
    /// Custom template; every `{n}` is replaced by the page number.
    Custom(String),
}

impl PageHeader {
    /// Render the header line for the given page number (1-indexed).
    pub fn render(&self, page_num: usize) -> String {
        match self {
            PageHeader::Dashed => format!("--- Page {} ---", page_num),
            PageHeader::Comment => format!("<!-- page {} -->", page_num),
            PageHeader::Custom(template) => template.replace("{n}", &page_num.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = BatchConfig::default();
        assert_eq!(c.language, "en");
        assert_eq!(c.max_pages, DEFAULT_MAX_PAGES);
        assert_eq!(c.page_timeout, Duration::from_secs(DEFAULT_PAGE_TIMEOUT_SECS));
        assert!(c.warm_up);
    }

    #[test]
    fn zero_cap_is_rejected() {
        let err = BatchConfig::builder().max_pages(0).build().unwrap_err();
        assert!(matches!(err, OcrError::InvalidConfig(_)));
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let err = BatchConfig::builder()
            .page_timeout(Duration::ZERO)
            .build()
            .unwrap_err();
        assert!(matches!(err, OcrError::InvalidConfig(_)));
    }

    #[test]
    fn header_rendering() {
        assert_eq!(PageHeader::Dashed.render(3), "--- Page 3 ---");
        assert_eq!(PageHeader::Comment.render(3), "<!-- page 3 -->");
        assert_eq!(
            PageHeader::Custom("=== {n} ===".into()).render(12),
            "=== 12 ==="
        );
    }

    #[test]
    fn debug_hides_callback() {
        let dbg = format!("{:?}", BatchConfig::default());
        assert!(dbg.contains("max_pages"));
    }
}
