//! Process-lifetime cache of engine handles, keyed by normalized language.
//!
//! Engines are expensive to build (model weights load once), so the
//! registry hands out shared `Arc` handles. Each language has its own
//! [`OnceCell`] slot. The map lock is only held long enough to find or insert
//! a slot, and construction runs inside the slot's `get_or_try_init`:
//! callers asking for the same language wait for one build and share its
//! handle, while lookups for other languages proceed.
//!
//! The registry is an ordinary value owned by the application. Create it at
//! startup, share it behind an `Arc`, and call [`EngineRegistry::clear`]
//! (or drop it) at shutdown.

use crate::engine::{normalize_language, EngineFactory, EngineImage, OcrEngine};
use crate::error::{EngineError, OcrError};
use once_cell::sync::OnceCell;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Language whose cached engine stands in when another language cannot be built.
pub const FALLBACK_LANGUAGE: &str = "en";

/// A language's engine, built at most once.
type Slot = Arc<OnceCell<Arc<dyn OcrEngine>>>;

/// Get-or-create cache of [`OcrEngine`] handles.
pub struct EngineRegistry {
    factory: Arc<dyn EngineFactory>,
    slots: Mutex<HashMap<String, Slot>>,
    warm_up: bool,
}

impl fmt::Debug for EngineRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineRegistry")
            .field("languages", &self.cached_languages())
            .field("warm_up", &self.warm_up)
            .finish()
    }
}

impl EngineRegistry {
    /// Create an empty registry. Newly built engines are warmed up.
    pub fn new(factory: Arc<dyn EngineFactory>) -> Self {
        Self {
            factory,
            slots: Mutex::new(HashMap::new()),
            warm_up: true,
        }
    }

    /// Enable or disable the warm-up recognition after construction.
    pub fn with_warm_up(mut self, warm_up: bool) -> Self {
        self.warm_up = warm_up;
        self
    }

    /// Return the engine for `language`, building it on first use.
    ///
    /// If building fails and an English engine is already cached, that
    /// engine is returned instead (with a warning). Otherwise the failure is
    /// reported as [`OcrError::EngineUnavailable`]. A failed build is not
    /// cached; the next call tries again.
    ///
    /// This call blocks while the engine for `language` is being built; call
    /// it from a blocking context.
    pub fn get_or_create(&self, language: &str) -> Result<Arc<dyn OcrEngine>, OcrError> {
        let key = normalize_language(language);
        let slot = Arc::clone(self.lock().entry(key.clone()).or_default());

        if let Some(engine) = slot.get() {
            debug!("Reusing OCR engine for '{}'", key);
            return Ok(Arc::clone(engine));
        }

        let built: Result<&Arc<dyn OcrEngine>, EngineError> = slot.get_or_try_init(|| {
            info!("Creating OCR engine for '{}' (requested '{}')", key, language);
            let start = Instant::now();
            let engine = self.factory.create(&key)?;
            info!(
                "OCR engine '{}' ready for '{}' in {}ms",
                engine.name(),
                key,
                start.elapsed().as_millis()
            );
            if self.warm_up {
                warm_up(engine.as_ref());
            }
            Ok(engine)
        });

        match built {
            Ok(engine) => Ok(Arc::clone(engine)),
            Err(e) => {
                if key != FALLBACK_LANGUAGE {
                    if let Some(fallback) = self.cached(FALLBACK_LANGUAGE) {
                        warn!(
                            "OCR engine for '{}' failed ({}); using the '{}' engine instead",
                            key, e, FALLBACK_LANGUAGE
                        );
                        return Ok(fallback);
                    }
                }
                warn!("OCR engine for '{}' could not be created: {}", key, e);
                Err(OcrError::EngineUnavailable {
                    language: key,
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Whether an engine for `language` has already been built.
    pub fn is_initialized(&self, language: &str) -> bool {
        self.cached(&normalize_language(language)).is_some()
    }

    /// Normalized languages with a cached engine, sorted.
    pub fn cached_languages(&self) -> Vec<String> {
        let mut langs: Vec<String> = self
            .lock()
            .iter()
            .filter(|(_, slot)| slot.get().is_some())
            .map(|(lang, _)| lang.clone())
            .collect();
        langs.sort();
        langs
    }

    /// Drop every cached engine. Builds already in progress finish but are
    /// not added back to the cache.
    pub fn clear(&self) {
        let mut slots = self.lock();
        let built = slots.values().filter(|slot| slot.get().is_some()).count();
        info!("Releasing {} OCR engine(s)", built);
        slots.clear();
    }

    /// The already-built engine for a normalized key, without waiting.
    fn cached(&self, key: &str) -> Option<Arc<dyn OcrEngine>> {
        self.lock().get(key).and_then(|slot| slot.get().cloned())
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Slot>> {
        // A panic inside a factory must not make the cache unusable.
        self.slots.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Run one recognition on a blank page; failure is logged, not fatal.
fn warm_up(engine: &dyn OcrEngine) {
    let blank = EngineImage::blank(200, 100, engine.channel_order());
    match engine.recognize(&blank) {
        Ok(_) => debug!("OCR engine '{}' warm-up passed", engine.name()),
        Err(e) => warn!(
            "OCR engine '{}' warm-up failed, continuing anyway: {}",
            engine.name(),
            e
        ),
    }
}
