//! # edgequake-ocr
//!
//! Turn raw OCR engine output into reading-ordered text and layout metadata,
//! across multi-page batches where one bad page never sinks the document.
//!
//! ## Why this crate?
//!
//! Recognizers are the easy part to swap. What breaks in production is
//! everything around them: the engine's output shape changes between
//! versions, boxes arrive as quads or rectangles (or garbage), and one page
//! that hangs the native model takes the whole request down with it. This
//! crate normalizes every output shape into one record type, rebuilds
//! reading order and visual rows from geometry, and runs each page under its
//! own deadline.
//!
//! ## Pipeline Overview
//!
//! ```text
//! images
//!  │
//!  ├─ 1. Input     resolve local file or download from URL, decode
//!  ├─ 2. Engine    recognize on a blocking thread, per-page deadline
//!  ├─ 3. Schema    dict / list / unrecognized → DetectionRecord
//!  ├─ 4. Geometry  quad or flat box → anchor + canonical bbox
//!  ├─ 5. Layout    (y, x) reading order, rows within 10 units
//!  └─ 6. Output    per-page results + combined text + stats
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_ocr::{BatchConfig, BatchOrchestrator, CommandEngineFactory, EngineRegistry};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Any program that prints the engine's JSON for an image path works.
//!     let factory = Arc::new(CommandEngineFactory::new(
//!         "paddle-ocr-json",
//!         vec!["--lang".into(), "{lang}".into(), "{image}".into()],
//!     ));
//!     let registry = Arc::new(EngineRegistry::new(factory));
//!     let config = BatchConfig::builder().language("ch_tra").build()?;
//!
//!     let orch = BatchOrchestrator::new(registry, config);
//!     let result = orch
//!         .process_inputs(&["scan-1.png".into(), "scan-2.png".into()])
//!         .await?;
//!     println!("{}", result.combined_text);
//!     eprintln!("{}/{} pages ok",
//!         result.stats.succeeded_pages,
//!         result.stats.processed_pages);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `ocr2txt` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library to avoid pulling in CLI-only deps:
//! ```toml
//! edgequake-ocr = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod batch;
pub mod config;
pub mod engine;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use batch::{write_text_atomic, BatchCancel, BatchOrchestrator};
pub use config::{BatchConfig, BatchConfigBuilder, PageHeader};
pub use engine::{
    normalize_language, ChannelOrder, CommandEngine, CommandEngineFactory, EngineFactory,
    EngineImage, EngineRegistry, OcrEngine,
};
pub use error::{EngineError, OcrError, PageError};
pub use output::{
    BatchResult, BatchStats, DetectionRecord, FailureKind, PageOutcome, PageResult, PageText,
};
pub use pipeline::page::PageProcessor;
pub use progress::{BatchProgressCallback, NoopProgressCallback, ProgressCallback};
pub use stream::{process_stream, PageStream};
