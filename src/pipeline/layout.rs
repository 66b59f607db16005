//! Reading order and visual row reconstruction.
//!
//! [`sort_reading_order`] gives the total order used everywhere else
//! (top-to-bottom, then left-to-right). [`reconstruct_lines`] walks that
//! order once and groups detections whose anchors sit within
//! [`ROW_THRESHOLD`] of the row's first detection into one output line.

use crate::output::DetectionRecord;
use std::cmp::Ordering;

/// Maximum vertical distance (in anchor units) from a row's first detection
/// for another detection to join that row.
pub const ROW_THRESHOLD: f64 = 10.0;

/// Sort detections by `(y_position, x_position)` ascending.
///
/// The sort is stable: equal keys keep their original relative order.
pub fn sort_reading_order(mut detections: Vec<DetectionRecord>) -> Vec<DetectionRecord> {
    detections.sort_by(reading_order);
    detections
}

fn reading_order(a: &DetectionRecord, b: &DetectionRecord) -> Ordering {
    a.y_position
        .total_cmp(&b.y_position)
        .then_with(|| a.x_position.total_cmp(&b.x_position))
}

/// Rebuild visual rows from reading-ordered detections.
///
/// A detection opens a new row when there is no current row or when
/// `|y − anchor| > ROW_THRESHOLD`, where `anchor` is the y of the row's first
/// detection. Each closed row is sorted by x and joined with single spaces;
/// rows are joined with `\n`. Rows are never re-opened.
pub fn reconstruct_lines(sorted: &[DetectionRecord]) -> String {
    let mut lines: Vec<String> = Vec::new();
    let mut row: Vec<&DetectionRecord> = Vec::new();
    let mut anchor: Option<f64> = None;

    for det in sorted {
        match anchor {
            Some(y) if (det.y_position - y).abs() <= ROW_THRESHOLD => row.push(det),
            _ => {
                if !row.is_empty() {
                    lines.push(close_row(&mut row));
                }
                row.push(det);
                anchor = Some(det.y_position);
            }
        }
    }
    if !row.is_empty() {
        lines.push(close_row(&mut row));
    }

    lines.join("\n")
}

fn close_row(row: &mut Vec<&DetectionRecord>) -> String {
    row.sort_by(|a, b| a.x_position.total_cmp(&b.x_position));
    let line = row
        .iter()
        .map(|d| d.text.as_str())
        .collect::<Vec<_>>()
        .join(" ");
    row.clear();
    line
}
