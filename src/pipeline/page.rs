//! Single-page processing: engine call → schema → geometry → reading order.

use crate::engine::{EngineImage, OcrEngine};
use crate::error::EngineError;
use crate::output::PageText;
use crate::pipeline::{layout, schema};
use image::DynamicImage;
use std::sync::Arc;
use tracing::{debug, warn};

/// Runs one image through an engine and turns its raw output into
/// reading-ordered [`PageText`].
///
/// Cheap to clone; clones share the engine handle.
#[derive(Clone)]
pub struct PageProcessor {
    engine: Arc<dyn OcrEngine>,
}

impl std::fmt::Debug for PageProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageProcessor")
            .field("engine", &self.engine.name())
            .finish()
    }
}

impl PageProcessor {
    pub fn new(engine: Arc<dyn OcrEngine>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &Arc<dyn OcrEngine> {
        &self.engine
    }

    /// Recognize `image`, reporting engine failures to the caller.
    ///
    /// Malformed detections are dropped inside the normalizer; only the
    /// engine call itself can fail.
    pub fn recognize(&self, image: &DynamicImage) -> Result<PageText, EngineError> {
        let input = EngineImage::from_dynamic(image, self.engine.channel_order());
        let raw = self.engine.recognize(&input)?;

        let detections = layout::sort_reading_order(schema::normalize(&raw));
        let text = detections
            .iter()
            .map(|d| d.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");

        debug!(
            "Recognized {} detection(s) on {}x{} image",
            detections.len(),
            input.width,
            input.height
        );
        Ok(PageText { text, detections })
    }

    /// Recognize `image`; an engine failure yields an empty page.
    pub fn process(&self, image: &DynamicImage) -> PageText {
        self.recognize(image).unwrap_or_else(|e| {
            warn!("OCR engine '{}' failed: {}", self.engine.name(), e);
            PageText::default()
        })
    }
}
