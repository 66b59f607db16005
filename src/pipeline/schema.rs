//! Raw engine output → [`DetectionRecord`]s.
//!
//! The engine's per-image output comes in one of two shapes depending on its
//! version:
//!
//! ```text
//! dict   [{"rec_texts": [...], "rec_scores": [...], "rec_boxes": [...]}]
//! list   [[ [bbox, [text, confidence]], [bbox, [text, confidence]], ... ]]
//! ```
//!
//! The shape is decided once per payload by [`classify`], then handled by
//! one parser per variant. Absent, empty, or unknown payloads produce an
//! empty vector; a malformed entry is skipped with a warning and parsing
//! continues with the next one. Nothing in this module returns an error.

use crate::output::DetectionRecord;
use crate::pipeline::geometry;
use serde_json::{Map, Value};
use tracing::{debug, warn};

/// Field carrying the recognized strings in the dict-shaped payload.
pub const TEXTS_KEY: &str = "rec_texts";
/// Field carrying the per-string confidences.
pub const SCORES_KEY: &str = "rec_scores";
/// Field carrying the per-string boxes.
pub const BOXES_KEY: &str = "rec_boxes";
/// Quad boxes; read when `rec_boxes` is missing.
pub const POLYS_KEY: &str = "rec_polys";

/// The payload shape, decided once from the first element.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RawSchema<'a> {
    /// Parallel `rec_texts` / `rec_scores` / `rec_boxes` arrays.
    Dict(&'a Map<String, Value>),
    /// Sequence of `[bbox, [text, confidence]]` entries.
    List(&'a [Value]),
    /// Null, empty, or a shape no parser understands.
    Unrecognized,
}

/// Inspect the payload structure and pick the matching variant.
pub fn classify(raw: &Value) -> RawSchema<'_> {
    let page = match raw {
        Value::Object(map) => return RawSchema::Dict(map),
        Value::Array(pages) => match pages.first() {
            Some(first) => first,
            None => return RawSchema::Unrecognized,
        },
        _ => return RawSchema::Unrecognized,
    };

    match page {
        Value::Object(map) => RawSchema::Dict(map),
        Value::Array(entries) => match entries.first() {
            None => RawSchema::Unrecognized,
            Some(Value::Object(map)) => RawSchema::Dict(map),
            // An unwrapped entry list: `raw` itself is `[[bbox, [text, conf]], ...]`.
            Some(_) if looks_like_entry(entries) => match raw {
                Value::Array(all) => RawSchema::List(all),
                _ => RawSchema::Unrecognized,
            },
            Some(Value::Array(_)) => RawSchema::List(entries),
            Some(_) => RawSchema::Unrecognized,
        },
        _ => RawSchema::Unrecognized,
    }
}

/// `[bbox, [text, ...]]` where the bbox is an array and the second element
/// starts with a string.
fn looks_like_entry(items: &[Value]) -> bool {
    items.len() >= 2
        && items[0].is_array()
        && items[1]
            .as_array()
            .and_then(|info| info.first())
            .is_some_and(Value::is_string)
}

/// Parse raw engine output into unordered detection records.
pub fn normalize(raw: &Value) -> Vec<DetectionRecord> {
    match classify(raw) {
        RawSchema::Dict(map) => parse_dict(map),
        RawSchema::List(entries) => parse_list(entries),
        RawSchema::Unrecognized => {
            if !is_empty_payload(raw) {
                warn!("Unrecognised OCR output shape; no detections extracted");
            } else {
                debug!("OCR output is empty");
            }
            Vec::new()
        }
    }
}

fn is_empty_payload(raw: &Value) -> bool {
    match raw {
        Value::Null => true,
        Value::Array(items) => items.is_empty() || items.iter().all(is_empty_payload),
        _ => false,
    }
}

fn parse_dict(map: &Map<String, Value>) -> Vec<DetectionRecord> {
    let (Some(texts), Some(scores)) = (
        map.get(TEXTS_KEY).and_then(Value::as_array),
        map.get(SCORES_KEY).and_then(Value::as_array),
    ) else {
        warn!(
            "Dict-shaped OCR output lacks '{}' or '{}'; available fields: {:?}",
            TEXTS_KEY,
            SCORES_KEY,
            map.keys().collect::<Vec<_>>()
        );
        return Vec::new();
    };

    let boxes = map
        .get(BOXES_KEY)
        .or_else(|| map.get(POLYS_KEY))
        .and_then(Value::as_array);

    debug!("Dict-shaped OCR output with {} text items", texts.len());

    // Parallel arrays are zipped; a shorter boxes array truncates like the others.
    let len = match boxes {
        Some(b) => texts.len().min(scores.len()).min(b.len()),
        None => texts.len().min(scores.len()),
    };

    let null = Value::Null;
    (0..len)
        .filter_map(|i| {
            let bbox = boxes.and_then(|b| b.get(i)).unwrap_or(&null);
            build_record(i, &texts[i], &scores[i], bbox)
        })
        .collect()
}

fn parse_list(entries: &[Value]) -> Vec<DetectionRecord> {
    debug!("List-shaped OCR output with {} entries", entries.len());

    entries
        .iter()
        .enumerate()
        .filter_map(|(i, entry)| {
            let Some(parts) = entry.as_array().filter(|p| p.len() >= 2) else {
                warn!("Skipping OCR entry {}: expected [bbox, text_info], got {}", i, entry);
                return None;
            };
            let Some(info) = parts[1].as_array().filter(|t| t.len() >= 2) else {
                warn!(
                    "Skipping OCR entry {}: expected [text, confidence], got {}",
                    i, parts[1]
                );
                return None;
            };
            build_record(i, &info[0], &info[1], &parts[0])
        })
        .collect()
}

/// Assemble one record, or `None` (with a log line) if the entry is unusable.
fn build_record(i: usize, text: &Value, score: &Value, bbox: &Value) -> Option<DetectionRecord> {
    let Some(text) = text.as_str().map(str::trim) else {
        warn!("Skipping OCR entry {}: text is not a string: {}", i, text);
        return None;
    };
    if text.is_empty() {
        return None;
    }

    let Some(confidence) = coerce_confidence(score) else {
        warn!("Skipping OCR entry {}: confidence is not a number: {}", i, score);
        return None;
    };

    let anchor = geometry::anchor(bbox);
    Some(DetectionRecord {
        text: text.to_string(),
        confidence,
        bbox: geometry::canonical_bbox(bbox),
        x_position: anchor.x,
        y_position: anchor.y,
    })
}

/// Cast a confidence value to `f64` in `[0, 1]`; numeric strings are accepted.
fn coerce_confidence(score: &Value) -> Option<f64> {
    let f = match score {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    f.is_finite().then(|| f.clamp(0.0, 1.0))
}
