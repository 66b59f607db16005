//! Result types: detections, per-page outcomes, and the assembled batch.
//!
//! Everything here is plain data. A failed page is still a [`PageResult`]
//! (with `failed = true` and a placeholder `text`); the only way a batch
//! becomes an `Err` is [`BatchResult::into_result`], which callers opt into.

use crate::config::PageHeader;
use crate::error::{OcrError, PageError};
use crate::pipeline::{layout, postprocess};
use serde::{Deserialize, Serialize};

/// One recognized text fragment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionRecord {
    /// Trimmed, non-empty fragment text.
    pub text: String,
    /// Recognition confidence in `[0, 1]`.
    pub confidence: f64,
    /// Flattened bounding box (four corner pairs for quads, four numbers for
    /// rectangles), or empty when the engine's box could not be read.
    pub bbox: Vec<f64>,
    /// Horizontal anchor (box center), `0.0` when geometry was malformed.
    pub x_position: f64,
    /// Vertical anchor (box center), `0.0` when geometry was malformed.
    pub y_position: f64,
}

/// Why a page failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    #[default]
    None,
    Timeout,
    EngineError,
}

impl From<&PageError> for FailureKind {
    fn from(e: &PageError) -> Self {
        match e {
            PageError::Timeout { .. } => FailureKind::Timeout,
            PageError::EngineFailed { .. } => FailureKind::EngineError,
        }
    }
}

/// Reading-ordered text and detections for one image.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageText {
    /// Fragment texts in reading order, joined with `\n`.
    pub text: String,
    /// Detections sorted top-to-bottom, left-to-right.
    pub detections: Vec<DetectionRecord>,
}

/// Outcome of the single-page operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageOutcome {
    pub text: String,
    pub detections: Vec<DetectionRecord>,
    pub failed: bool,
    pub failure_kind: FailureKind,
}

impl From<PageResult> for PageOutcome {
    fn from(page: PageResult) -> Self {
        Self {
            text: page.text,
            detections: page.detections,
            failed: page.failed,
            failure_kind: page.failure_kind,
        }
    }
}

/// One page's outcome within a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageResult {
    /// 1-based page number within the batch.
    pub index: usize,
    /// Reading-order text, or `[Error: …]` when the page failed.
    pub text: String,
    /// Ordered detections; always empty for a failed page.
    pub detections: Vec<DetectionRecord>,
    pub failed: bool,
    pub failure_kind: FailureKind,
    /// The failure, if any.
    pub error: Option<PageError>,
    /// Wall-clock time spent waiting on this page.
    pub duration_ms: u64,
}

impl PageResult {
    /// A page that completed before its deadline. Empty text is still a success.
    pub fn done(index: usize, page: PageText, duration_ms: u64) -> Self {
        Self {
            index,
            text: page.text,
            detections: page.detections,
            failed: false,
            failure_kind: FailureKind::None,
            error: None,
            duration_ms,
        }
    }

    /// A page that timed out or whose engine call failed.
    pub fn failed(index: usize, error: PageError, duration_ms: u64) -> Self {
        Self {
            index,
            text: format!("[Error: {}]", error),
            detections: Vec::new(),
            failed: true,
            failure_kind: FailureKind::from(&error),
            error: Some(error),
            duration_ms,
        }
    }

    /// Layout-preserving rendering of this page (rows rebuilt from geometry).
    ///
    /// Failed pages render their placeholder text unchanged.
    pub fn layout_text(&self) -> String {
        if self.failed {
            self.text.clone()
        } else {
            layout::reconstruct_lines(&self.detections)
        }
    }
}

/// Aggregate counters for a batch run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchStats {
    /// Images handed to the batch before truncation.
    pub input_images: usize,
    /// Pages that produced a [`PageResult`].
    pub processed_pages: usize,
    pub succeeded_pages: usize,
    pub failed_pages: usize,
    pub timed_out_pages: usize,
    /// Images dropped by the `max_pages` cap.
    pub truncated_pages: usize,
    /// Images never scheduled because the batch was cancelled.
    pub cancelled_pages: usize,
    pub total_detections: usize,
    pub total_duration_ms: u64,
}

/// Whole-document outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchResult {
    /// One entry per processed page, in input order.
    pub pages: Vec<PageResult>,
    /// Every page's text (or error string) under its header, joined by a blank line.
    pub combined_text: String,
    pub stats: BatchStats,
}

impl BatchResult {
    /// Layout-preserving rendering of the whole batch, cleaned for `.txt` output.
    pub fn layout_text(&self, header: &PageHeader) -> String {
        let rendered: Vec<String> = self
            .pages
            .iter()
            .map(|p| format!("{}\n{}", header.render(p.index), p.layout_text()))
            .collect();
        postprocess::clean_text(&rendered.join("\n\n"))
    }

    /// Convert into `Err(OcrError::PartialFailure)` if any page failed.
    pub fn into_result(self) -> Result<Self, OcrError> {
        let failed = self.pages.iter().filter(|p| p.failed).count();
        if failed == 0 {
            Ok(self)
        } else {
            let total = self.pages.len();
            Err(OcrError::PartialFailure {
                success: total - failed,
                failed,
                total,
            })
        }
    }
}

/// Join page texts under their headers: `"{header}\n{text}"` separated by `"\n\n"`.
pub fn assemble_combined_text(pages: &[PageResult], header: &PageHeader) -> String {
    pages
        .iter()
        .map(|p| format!("{}\n{}", header.render(p.index), p.text))
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(text: &str, x: f64, y: f64) -> DetectionRecord {
        DetectionRecord {
            text: text.into(),
            confidence: 0.9,
            bbox: vec![],
            x_position: x,
            y_position: y,
        }
    }

    fn ok_page(index: usize, text: &str) -> PageResult {
        PageResult::done(
            index,
            PageText {
                text: text.into(),
                detections: vec![record(text, 0.0, 0.0)],
            },
            5,
        )
    }

    #[test]
    fn failed_page_has_no_detections_and_placeholder() {
        let page = PageResult::failed(
            2,
            PageError::Timeout {
                page: 2,
                timeout_ms: 100,
            },
            100,
        );
        assert!(page.failed);
        assert_eq!(page.failure_kind, FailureKind::Timeout);
        assert!(page.detections.is_empty());
        assert!(page.text.starts_with("[Error:"));
        assert!(page.text.contains("timeout"));
    }

    #[test]
    fn empty_success_is_not_a_failure() {
        let page = PageResult::done(1, PageText::default(), 1);
        assert!(!page.failed);
        assert_eq!(page.failure_kind, FailureKind::None);
        assert!(page.text.is_empty());
    }

    #[test]
    fn combined_text_uses_headers_and_blank_lines() {
        let pages = vec![ok_page(1, "alpha"), ok_page(2, "beta")];
        let text = assemble_combined_text(&pages, &PageHeader::default());
        assert_eq!(text, "--- Page 1 ---\nalpha\n\n--- Page 2 ---\nbeta");
    }

    #[test]
    fn into_result_reports_partial_failure() {
        let pages = vec![
            ok_page(1, "a"),
            PageResult::failed(
                2,
                PageError::EngineFailed {
                    page: 2,
                    detail: "boom".into(),
                },
                1,
            ),
        ];
        let result = BatchResult {
            combined_text: assemble_combined_text(&pages, &PageHeader::default()),
            pages,
            stats: BatchStats::default(),
        };
        match result.into_result() {
            Err(OcrError::PartialFailure { failed, total, .. }) => {
                assert_eq!(failed, 1);
                assert_eq!(total, 2);
            }
            other => panic!("expected PartialFailure, got {other:?}"),
        }
    }

    #[test]
    fn failure_kind_serialises_snake_case() {
        let json = serde_json::to_string(&FailureKind::EngineError).unwrap();
        assert_eq!(json, "\"engine_error\"");
    }

    #[test]
    fn layout_text_rebuilds_rows() {
        let page = PageResult::done(
            1,
            PageText {
                text: "A\nB".into(),
                detections: vec![record("B", 5.0, 100.0), record("A", 50.0, 103.0)],
            },
            1,
        );
        assert_eq!(page.layout_text(), "B A");
    }
}
