//! Pipeline stages for turning page images into ordered text.
//!
//! Each submodule implements exactly one transformation step.
//! None of them knows about batching or deadlines, which live in
//! [`crate::batch`].
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ page ──────────────────────────────────▶ layout ──▶ postprocess
//! (path/URL) (engine → schema → geometry → sort)   (rows)      (cleanup)
//! ```
//!
//! 1. [`input`]: resolve a path or URL and decode it to a `DynamicImage`
//! 2. [`page`]: run the engine on one image and order its detections
//! 3. [`schema`]: classify and parse the engine's raw output
//! 4. [`geometry`]: anchor points and canonical bounding boxes
//! 5. [`layout`]: reading-order sort and visual row reconstruction
//! 6. [`postprocess`]: deterministic cleanup of rendered text
//! 7. [`encode`]: PNG encoding for engines that read from disk

pub mod encode;
pub mod geometry;
pub mod input;
pub mod layout;
pub mod page;
pub mod postprocess;
pub mod schema;
