//! Image encoding: pixel buffer → PNG bytes for out-of-process engines.
//!
//! External recognizers take a file path, not a pixel buffer. PNG is lossless,
//! so the engine sees exactly the pixels the caller decoded; JPEG artefacts
//! around glyph edges measurably hurt recognition.

use image::RgbImage;
use std::io::Cursor;
use tracing::debug;

/// Encode an RGB image as PNG.
pub fn encode_png(img: &RgbImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
    debug!(
        "Encoded {}x{} image → {} bytes PNG",
        img.width(),
        img.height(),
        buf.len()
    );
    Ok(buf)
}
