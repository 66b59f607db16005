//! The OCR engine seam.
//!
//! The recognizer itself is an external collaborator. This module defines
//! what the rest of the crate needs from it:
//!
//! - [`OcrEngine`]: one blocking `recognize` call per image, returning the
//!   engine's raw nested output as JSON (shape handled by
//!   [`crate::pipeline::schema`]);
//! - [`EngineFactory`]: builds an engine for a language code;
//! - [`EngineRegistry`]: the get-or-create cache of engine handles keyed by
//!   normalized language.
//!
//! [`CommandEngine`] is the bundled implementation: it shells out to a
//! recognizer process and reads its JSON from stdout.

pub mod command;
pub mod registry;

pub use command::{CommandEngine, CommandEngineFactory};
pub use registry::EngineRegistry;

use crate::error::EngineError;
use image::{DynamicImage, RgbImage};
use serde_json::Value;
use std::sync::Arc;

/// Byte order of the three colour channels in an [`EngineImage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelOrder {
    Rgb,
    /// OpenCV-style ordering, what Paddle-based engines expect. (default)
    #[default]
    Bgr,
}

/// A tightly packed 8-bit, 3-channel pixel buffer in the engine's channel order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineImage {
    pub width: u32,
    pub height: u32,
    pub order: ChannelOrder,
    /// `width * height * 3` bytes, row-major.
    pub pixels: Vec<u8>,
}

impl EngineImage {
    /// Convert any decoded image into a 3-channel buffer in `order`.
    pub fn from_dynamic(image: &DynamicImage, order: ChannelOrder) -> Self {
        let rgb = image.to_rgb8();
        let (width, height) = rgb.dimensions();
        let mut pixels = rgb.into_raw();
        if order == ChannelOrder::Bgr {
            for px in pixels.chunks_exact_mut(3) {
                px.swap(0, 2);
            }
        }
        Self {
            width,
            height,
            order,
            pixels,
        }
    }

    /// A solid white image, used to warm an engine up after construction.
    pub fn blank(width: u32, height: u32, order: ChannelOrder) -> Self {
        Self {
            width,
            height,
            order,
            pixels: vec![255; width as usize * height as usize * 3],
        }
    }

    /// Back to an RGB image, e.g. for encoding to PNG.
    pub fn to_rgb_image(&self) -> Result<RgbImage, EngineError> {
        let mut pixels = self.pixels.clone();
        if self.order == ChannelOrder::Bgr {
            for px in pixels.chunks_exact_mut(3) {
                px.swap(0, 2);
            }
        }
        RgbImage::from_raw(self.width, self.height, pixels).ok_or_else(|| {
            EngineError::Image(format!(
                "buffer of {} bytes does not match {}x{}x3",
                self.pixels.len(),
                self.width,
                self.height
            ))
        })
    }
}

/// A text recognizer.
///
/// `recognize` is a blocking call; the batch layer runs it on a blocking
/// thread under a deadline. Implementations must tolerate being called again
/// while an earlier, abandoned call is still running.
pub trait OcrEngine: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &str;

    /// Channel order the engine expects its pixels in.
    fn channel_order(&self) -> ChannelOrder {
        ChannelOrder::Bgr
    }

    /// Run recognition on one image and return the engine's raw output.
    fn recognize(&self, image: &EngineImage) -> Result<Value, EngineError>;
}

/// Builds engines for a (normalized) language code.
pub trait EngineFactory: Send + Sync {
    fn create(&self, language: &str) -> Result<Arc<dyn OcrEngine>, EngineError>;
}

/// Map a user-facing language code onto the engine's model key.
///
/// Traditional and simplified Chinese share the `ch` model. Unknown codes
/// pass through lower-cased so new engine languages work without a change
/// here.
pub fn normalize_language(code: &str) -> String {
    let code = code.trim().to_lowercase();
    match code.as_str() {
        "ch_tra" | "ch_sim" => return "ch".to_string(),
        "" => return "en".to_string(),
        _ => {}
    }
    code
}
