//! Bounding-box interpretation: anchor point and canonical flat form.
//!
//! Engines report boxes either as four `(x, y)` corners
//! (`[[x0,y0],[x1,y1],[x2,y2],[x3,y3]]`) or as a flat rectangle
//! (`[x1, y1, x2, y2]`). Neither helper here ever fails: an unreadable box
//! gives the anchor `(0, 0)` and an empty canonical bbox, and the detection
//! keeps its text.

use serde_json::Value;
use tracing::warn;

/// Geometric anchor of a detection, used only for ordering.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Anchor {
    pub x: f64,
    pub y: f64,
}

/// Resolve the center anchor of `bbox`.
///
/// Tries, in order:
/// 1. a quad, using the center of the diagonal corners 0 and 2;
/// 2. a flat rectangle `[x1, y1, x2, y2]`.
///
/// Any other shape yields `(0, 0)` and a warning.
pub fn anchor(bbox: &Value) -> Anchor {
    match try_anchor(bbox) {
        Some(a) => a,
        None => {
            warn!("Unrecognised bbox shape, anchoring at (0, 0): {}", bbox);
            Anchor::default()
        }
    }
}

fn try_anchor(bbox: &Value) -> Option<Anchor> {
    let items = bbox.as_array()?;
    if items.len() < 4 {
        return None;
    }

    if is_point(&items[0]) {
        let (x0, y0) = point(&items[0])?;
        let (x2, y2) = point(&items[2])?;
        return Some(Anchor {
            x: (x0 + x2) / 2.0,
            y: (y0 + y2) / 2.0,
        });
    }

    let x1 = items[0].as_f64()?;
    let y1 = items[1].as_f64()?;
    let x2 = items[2].as_f64()?;
    let y2 = items[3].as_f64()?;
    Some(Anchor {
        x: (x1 + x2) / 2.0,
        y: (y1 + y2) / 2.0,
    })
}

fn is_point(v: &Value) -> bool {
    v.as_array().is_some_and(|p| p.len() >= 2)
}

fn point(v: &Value) -> Option<(f64, f64)> {
    let p = v.as_array()?;
    Some((p.first()?.as_f64()?, p.get(1)?.as_f64()?))
}

/// Flatten `bbox` into a list of floats for external consumption.
///
/// Nested arrays are flattened depth-first. A scalar, `null`, or any
/// element that is not a number yields an empty vector.
pub fn canonical_bbox(bbox: &Value) -> Vec<f64> {
    let Some(items) = bbox.as_array() else {
        if !bbox.is_null() {
            warn!("Cannot convert bbox to a coordinate list: {}", bbox);
        }
        return Vec::new();
    };

    let mut out = Vec::with_capacity(items.len() * 2);
    if flatten_into(items, &mut out) {
        out
    } else {
        warn!("Cannot convert bbox to a coordinate list: {}", bbox);
        Vec::new()
    }
}

fn flatten_into(items: &[Value], out: &mut Vec<f64>) -> bool {
    for item in items {
        match item {
            Value::Number(n) => match n.as_f64() {
                Some(f) => out.push(f),
                None => return false,
            },
            Value::Array(inner) => {
                if !flatten_into(inner, out) {
                    return false;
                }
            }
            _ => return false,
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn quad_anchor_uses_diagonal_corners() {
        let a = anchor(&json!([[0, 0], [10, 0], [10, 10], [0, 10]]));
        assert_eq!(a, Anchor { x: 5.0, y: 5.0 });
    }

    #[test]
    fn flat_rectangle_anchor() {
        let a = anchor(&json!([0, 0, 10, 10]));
        assert_eq!(a, Anchor { x: 5.0, y: 5.0 });
    }

    #[test]
    fn scalar_bbox_defaults_to_origin() {
        let bbox = json!(5);
        assert_eq!(anchor(&bbox), Anchor::default());
        assert!(canonical_bbox(&bbox).is_empty());
    }

    #[test]
    fn short_or_broken_boxes_default_to_origin() {
        assert_eq!(anchor(&json!([1, 2, 3])), Anchor::default());
        assert_eq!(anchor(&json!([[0, 0], [1, 1], ["x", 2], [0, 1]])), Anchor::default());
        assert_eq!(anchor(&json!(null)), Anchor::default());
        assert_eq!(anchor(&json!("box")), Anchor::default());
    }

    #[test]
    fn asymmetric_quad() {
        let a = anchor(&json!([[100.5, 20], [300, 20], [300.5, 44], [100, 44]]));
        assert_eq!(a.x, 200.5);
        assert_eq!(a.y, 32.0);
    }

    #[test]
    fn canonical_quad_is_flattened() {
        let flat = canonical_bbox(&json!([[0, 0], [10, 0], [10, 10], [0, 10]]));
        assert_eq!(flat, vec![0.0, 0.0, 10.0, 0.0, 10.0, 10.0, 0.0, 10.0]);
    }

    #[test]
    fn canonical_rectangle_passes_through() {
        assert_eq!(
            canonical_bbox(&json!([1.5, 2, 3, 4])),
            vec![1.5, 2.0, 3.0, 4.0]
        );
    }

    #[test]
    fn canonical_with_non_numeric_element_is_empty() {
        assert!(canonical_bbox(&json!([1, "two", 3, 4])).is_empty());
        assert!(canonical_bbox(&json!(null)).is_empty());
    }
}
