//! Configurable semantic embedder.
//!
//! Routes `embed` to the external visual model or the perceptual
//! fingerprinter depending on [`EmbedderSettings`]. The model is loaded on
//! first use and kept in a slot keyed by model identifier.

use super::{
    Embedding, FastEmbedLoader, ImageEmbedder, ModelLoader, PerceptualFingerprinter,
    VisualModel, mean_pool, normalize_rounded,
};
use crate::config::{EmbedderChoice, EmbedderSettings, FallbackChoice};
use crate::models::EmbedderId;
use crate::{Error, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

type LoadedModel = (String, Arc<dyn VisualModel>);

/// Embedder that prefers a visual model and can fall back to fingerprints.
///
/// # Thread Safety
///
/// The model slot is guarded by a mutex, so concurrent first calls load the
/// model once. Inference itself runs outside the slot lock.
///
/// # Fallback Warning
///
/// The fallback warning is logged at most once per instance, not once per
/// process. Each [`crate::CacheService`] owns one embedder, so a process with
/// a single service warns once. Every fallback is still counted in
/// `cache_embedder_fallback_total`.
pub struct SemanticEmbedder {
    settings: RwLock<EmbedderSettings>,
    loader: Arc<dyn ModelLoader>,
    slot: Mutex<Option<LoadedModel>>,
    fingerprinter: PerceptualFingerprinter,
    fallback_warned: AtomicBool,
}

impl SemanticEmbedder {
    /// Creates an embedder backed by [`FastEmbedLoader`].
    #[must_use]
    pub fn new(settings: EmbedderSettings) -> Self {
        Self::with_loader(settings, Arc::new(FastEmbedLoader::new()))
    }

    /// Creates an embedder with a custom model loader.
    #[must_use]
    pub fn with_loader(settings: EmbedderSettings, loader: Arc<dyn ModelLoader>) -> Self {
        Self {
            settings: RwLock::new(settings),
            loader,
            slot: Mutex::new(None),
            fingerprinter: PerceptualFingerprinter::new(),
            fallback_warned: AtomicBool::new(false),
        }
    }

    /// Returns a snapshot of the current settings.
    #[must_use]
    pub fn settings(&self) -> EmbedderSettings {
        self.settings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replaces the settings.
    ///
    /// A loaded model stays cached until a call sees a different model id.
    pub fn reconfigure(&self, settings: EmbedderSettings) {
        *self.settings.write().unwrap_or_else(PoisonError::into_inner) = settings;
    }

    /// Returns the identifier of the currently loaded model, if any.
    #[must_use]
    pub fn loaded_model(&self) -> Option<String> {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|(id, _)| id.clone())
    }

    fn model(&self, model_id: &str) -> Result<Arc<dyn VisualModel>> {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some((loaded_id, model)) = slot.as_ref()
            && loaded_id == model_id
        {
            return Ok(Arc::clone(model));
        }

        // Drop a stale model before loading so a failed load leaves the slot empty.
        *slot = None;
        let model = self.loader.load(model_id)?;
        *slot = Some((model_id.to_string(), Arc::clone(&model)));
        Ok(model)
    }

    fn embed_with_model(&self, model_id: &str, image: &[u8]) -> Result<Vec<f32>> {
        let output = self.model(model_id)?.infer(image)?;
        let pooled = mean_pool(output.data, &output.dims);
        normalize_rounded(&pooled).ok_or_else(|| Error::EmbedderUnavailable {
            model: model_id.to_string(),
            cause: "model returned an empty or zero-norm vector".to_string(),
        })
    }

    fn fall_back(&self, image: &[u8], cause: &Error) -> Result<Embedding> {
        if !self.fallback_warned.swap(true, Ordering::Relaxed) {
            tracing::warn!(
                error = %cause,
                "Visual embedder failed, using perceptual fingerprint fallback"
            );
        }
        metrics::counter!("cache_embedder_fallback_total").increment(1);
        let vector = self.fingerprinter.fingerprint(image)?;
        Ok(Embedding::new(EmbedderId::Fallback, vector))
    }
}

impl ImageEmbedder for SemanticEmbedder {
    fn dimensions(&self) -> Option<usize> {
        match self.settings().embedder {
            EmbedderChoice::Fingerprint => self.fingerprinter.dimensions(),
            EmbedderChoice::Clip => None,
        }
    }

    fn embed(&self, image: &[u8]) -> Result<Embedding> {
        let settings = self.settings();
        match settings.embedder {
            EmbedderChoice::Fingerprint => self.fingerprinter.embed(image),
            EmbedderChoice::Clip => match self.embed_with_model(&settings.clip_model, image) {
                Ok(vector) => Ok(Embedding::new(EmbedderId::Clip, vector)),
                Err(e) => match settings.fallback {
                    FallbackChoice::Fingerprint => self.fall_back(image, &e),
                    FallbackChoice::None => Err(e),
                },
            },
        }
    }
}

impl std::fmt::Debug for SemanticEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SemanticEmbedder")
            .field("settings", &self.settings())
            .field("loaded_model", &self.loaded_model())
            .finish_non_exhaustive()
    }
}
