//! Error types for the edgequake-ocr library.
//!
//! Three error types reflect three distinct failure scopes:
//!
//! * [`OcrError`] (**fatal**): the operation cannot proceed at all (no OCR
//!   engine could be constructed, unreadable input, invalid configuration).
//!   Returned as `Err(OcrError)` from the top-level entry points.
//!
//! * [`PageError`] (**non-fatal**): a single page timed out or the engine
//!   failed on it, but every other page is fine. Stored inside
//!   [`crate::output::PageResult`] so callers see partial success rather
//!   than losing the whole document to one bad page.
//!
//! * [`EngineError`]: what an [`crate::engine::OcrEngine`] or
//!   [`crate::engine::EngineFactory`] implementation reports. The batch
//!   layer turns it into a [`PageError`] (per page) or an
//!   [`OcrError::EngineUnavailable`] (at construction).
//!
//! Problems inside a single detection (malformed entry, unknown bbox shape)
//! are not errors at all: they are logged and absorbed by
//! [`crate::pipeline::schema`] and [`crate::pipeline::geometry`].

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-ocr library.
///
/// Page-level failures use [`PageError`] and are stored in
/// [`crate::output::PageResult`] rather than propagated here.
#[derive(Debug, Error)]
pub enum OcrError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Image file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a valid file path or URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// The file extension is not one of the supported raster formats.
    #[error("Unsupported file type '{path}'\nSupported: png, jpg, jpeg, bmp, tif, tiff")]
    UnsupportedFormat { path: PathBuf },

    /// The bytes could not be decoded as an image.
    #[error("Failed to decode image '{path}': {detail}")]
    ImageDecode { path: PathBuf, detail: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    // ── Engine errors ─────────────────────────────────────────────────────
    /// No OCR engine could be constructed for the requested language.
    ///
    /// This is the only failure that aborts a whole batch: without an
    /// engine handle no page can be processed.
    #[error("OCR engine unavailable for language '{language}': {reason}")]
    EngineUnavailable { language: String, reason: String },

    /// Some pages succeeded but at least one failed.
    ///
    /// Returned by [`crate::output::BatchResult::into_result`] when the
    /// caller wants to treat any page failure as an error.
    #[error("{failed}/{total} pages failed during recognition")]
    PartialFailure {
        success: usize,
        failed: usize,
        total: usize,
    },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single page.
///
/// Stored alongside [`crate::output::PageResult`] when a page fails.
/// The batch always continues with the next page.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
pub enum PageError {
    /// The page did not finish before its deadline.
    #[error("Page {page}: processing timeout after {timeout_ms}ms")]
    Timeout { page: usize, timeout_ms: u64 },

    /// The engine call returned an error or panicked.
    #[error("Page {page}: OCR engine failed: {detail}")]
    EngineFailed { page: usize, detail: String },
}

/// Errors reported by OCR engine implementations and their factories.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The engine could not be constructed (missing model, missing binary).
    #[error("engine unavailable: {0}")]
    Unavailable(String),

    /// The engine ran but recognition failed.
    #[error("recognition failed: {0}")]
    Recognition(String),

    /// The external recognizer process could not be started.
    #[error("failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The external recognizer exited with a non-zero status.
    #[error("'{program}' exited with code {code}: {stderr}")]
    ProcessFailed {
        program: String,
        code: i32,
        stderr: String,
    },

    /// The external recognizer ran past its deadline and was killed.
    #[error("'{program}' killed after {timeout_ms}ms without finishing")]
    ProcessTimedOut { program: String, timeout_ms: u64 },

    /// The engine produced output that is not valid JSON.
    #[error("engine output is not valid JSON: {0}")]
    InvalidOutput(#[from] serde_json::Error),

    /// Image buffer could not be prepared for the engine.
    #[error("image preparation failed: {0}")]
    Image(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_failure_display() {
        let e = OcrError::PartialFailure {
            success: 4,
            failed: 1,
            total: 5,
        };
        let msg = e.to_string();
        assert!(msg.contains("1/5"), "got: {msg}");
    }

    #[test]
    fn timeout_display_embeds_page_and_kind() {
        let e = PageError::Timeout {
            page: 2,
            timeout_ms: 30_000,
        };
        let msg = e.to_string();
        assert!(msg.contains("Page 2"));
        assert!(msg.contains("timeout"));
    }

    #[test]
    fn engine_failed_display_embeds_detail() {
        let e = PageError::EngineFailed {
            page: 7,
            detail: "model crashed".into(),
        };
        assert!(e.to_string().contains("model crashed"));
        assert!(e.to_string().contains("Page 7"));
    }

    #[test]
    fn engine_unavailable_display() {
        let e = OcrError::EngineUnavailable {
            language: "japan".into(),
            reason: "weights missing".into(),
        };
        assert!(e.to_string().contains("japan"));
        assert!(e.to_string().contains("weights missing"));
    }

    #[test]
    fn page_error_serialises() {
        let e = PageError::Timeout {
            page: 1,
            timeout_ms: 500,
        };
        let json = serde_json::to_string(&e).expect("serialise");
        assert!(json.contains("Timeout"));
    }
}
