//! Visual-embedding model backend.
//!
//! [`ModelLoader`] turns a configured model identifier into a loaded
//! [`VisualModel`]. The production loader is [`FastEmbedLoader`]: with the
//! `clip-embeddings` feature it runs fastembed's ONNX vision models; without
//! it every load fails with [`Error::EmbedderUnavailable`], which routes
//! lookups through the configured fallback.

use crate::{Error, Result};
use std::sync::Arc;

/// Raw model output before pooling and normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelOutput {
    /// Flattened output values.
    pub data: Vec<f32>,
    /// Output shape (last entry is the hidden size).
    pub dims: Vec<usize>,
}

impl ModelOutput {
    /// Creates a single-vector output of shape `[1, len]`.
    #[must_use]
    pub fn pooled(data: Vec<f32>) -> Self {
        let len = data.len();
        Self {
            data,
            dims: vec![1, len],
        }
    }
}

/// A loaded visual-embedding model.
pub trait VisualModel: Send + Sync {
    /// Runs inference over encoded image bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the model cannot process the image.
    fn infer(&self, image: &[u8]) -> Result<ModelOutput>;
}

/// Loads visual models by identifier.
pub trait ModelLoader: Send + Sync {
    /// Loads (downloading if needed) the model named by `model_id`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmbedderUnavailable`] if the model cannot be loaded.
    fn load(&self, model_id: &str) -> Result<Arc<dyn VisualModel>>;
}

/// Maps a configured model identifier to the canonical backend model name.
///
/// Accepts Hugging Face style identifiers (`Xenova/clip-vit-base-patch32`,
/// `Qdrant/resnet50-onnx`) as well as bare names.
#[must_use]
pub fn canonical_model_name(model_id: &str) -> Option<&'static str> {
    let id = model_id.trim().to_lowercase();
    if id.contains("nomic-embed-vision") {
        Some("nomic-embed-vision-v1.5")
    } else if id.contains("unicom") && id.contains("b16") {
        Some("unicom-vit-b16")
    } else if id.contains("unicom") && id.contains("b32") {
        Some("unicom-vit-b32")
    } else if id.contains("resnet50") {
        Some("resnet50")
    } else if id.contains("clip") {
        Some("clip-vit-b-32")
    } else {
        None
    }
}

fn unsupported_model(model_id: &str) -> Error {
    Error::EmbedderUnavailable {
        model: model_id.to_string(),
        cause: "no vision backend model matches this identifier".to_string(),
    }
}

// ============================================================================
// Native FastEmbed Implementation (with feature)
// ============================================================================

#[cfg(feature = "clip-embeddings")]
mod native {
    use super::{Error, ModelLoader, ModelOutput, Result, VisualModel, canonical_model_name};
    use std::panic::{AssertUnwindSafe, catch_unwind};
    use std::sync::{Arc, Mutex, PoisonError};
    use std::time::Instant;

    /// fastembed image model behind a lock.
    ///
    /// The ONNX session is not re-entrant; concurrent lookups serialize here.
    struct FastEmbedVisionModel {
        model_id: String,
        inner: Mutex<fastembed::ImageEmbedding>,
    }

    impl VisualModel for FastEmbedVisionModel {
        fn infer(&self, image: &[u8]) -> Result<ModelOutput> {
            // ONNX runtime can panic on malformed inputs; degrade to an error.
            let result = catch_unwind(AssertUnwindSafe(|| {
                #[allow(unused_mut)]
                let mut model = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
                model.embed_bytes(&[image], None)
            }));

            let embeddings = result
                .map_err(|panic_info| {
                    let panic_msg = panic_info
                        .downcast_ref::<&str>()
                        .map(|s| (*s).to_string())
                        .or_else(|| panic_info.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "unknown panic".to_string());
                    tracing::error!(
                        panic_message = %panic_msg,
                        model = %self.model_id,
                        "ONNX runtime panicked during image embedding"
                    );
                    Error::EmbedderUnavailable {
                        model: self.model_id.clone(),
                        cause: format!("ONNX runtime panic: {panic_msg}"),
                    }
                })?
                .map_err(|e| Error::EmbedderUnavailable {
                    model: self.model_id.clone(),
                    cause: e.to_string(),
                })?;

            embeddings
                .into_iter()
                .next()
                .map(ModelOutput::pooled)
                .ok_or_else(|| Error::EmbedderUnavailable {
                    model: self.model_id.clone(),
                    cause: "no embedding returned from model".to_string(),
                })
        }
    }

    fn backend_model(canonical: &str) -> Option<fastembed::ImageEmbeddingModel> {
        use fastembed::ImageEmbeddingModel as M;
        match canonical {
            "clip-vit-b-32" => Some(M::ClipVitB32),
            "resnet50" => Some(M::Resnet50),
            "unicom-vit-b16" => Some(M::UnicomVitB16),
            "unicom-vit-b32" => Some(M::UnicomVitB32),
            "nomic-embed-vision-v1.5" => Some(M::NomicEmbedVisionV15),
            _ => None,
        }
    }

    /// Loads fastembed vision models.
    ///
    /// The first load blocks while the ONNX weights are fetched and
    /// initialized; callers cache the result.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct FastEmbedLoader;

    impl FastEmbedLoader {
        /// Creates a new loader.
        #[must_use]
        pub const fn new() -> Self {
            Self
        }
    }

    impl ModelLoader for FastEmbedLoader {
        fn load(&self, model_id: &str) -> Result<Arc<dyn VisualModel>> {
            let model = canonical_model_name(model_id)
                .and_then(backend_model)
                .ok_or_else(|| super::unsupported_model(model_id))?;

            tracing::info!(model = %model_id, "Loading visual embedding model (first use)...");
            let start = Instant::now();

            let options =
                fastembed::ImageInitOptions::new(model).with_show_download_progress(false);
            let embedding =
                fastembed::ImageEmbedding::try_new(options).map_err(|e| {
                    Error::EmbedderUnavailable {
                        model: model_id.to_string(),
                        cause: e.to_string(),
                    }
                })?;

            tracing::info!(
                elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
                model = %model_id,
                "Visual embedding model loaded"
            );

            Ok(Arc::new(FastEmbedVisionModel {
                model_id: model_id.to_string(),
                inner: Mutex::new(embedding),
            }))
        }
    }
}

// ============================================================================
// Unavailable Implementation (without feature)
// ============================================================================

#[cfg(not(feature = "clip-embeddings"))]
mod unavailable {
    use super::{Error, ModelLoader, Result, VisualModel, canonical_model_name};
    use std::sync::Arc;

    /// Loader stand-in used when no vision backend is compiled in.
    ///
    /// Every load fails, so the semantic embedder either falls back to the
    /// perceptual fingerprint or reports the model as unavailable.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct FastEmbedLoader;

    impl FastEmbedLoader {
        /// Creates a new loader.
        #[must_use]
        pub const fn new() -> Self {
            Self
        }
    }

    impl ModelLoader for FastEmbedLoader {
        fn load(&self, model_id: &str) -> Result<Arc<dyn VisualModel>> {
            if canonical_model_name(model_id).is_none() {
                return Err(super::unsupported_model(model_id));
            }
            tracing::debug!(
                model = %model_id,
                "Visual embedding requested without the clip-embeddings feature"
            );
            Err(Error::EmbedderUnavailable {
                model: model_id.to_string(),
                cause: "vision backend not compiled in (enable the clip-embeddings feature)"
                    .to_string(),
            })
        }
    }
}

// ============================================================================
// Public Re-exports
// ============================================================================

#[cfg(feature = "clip-embeddings")]
pub use native::FastEmbedLoader;

#[cfg(not(feature = "clip-embeddings"))]
pub use unavailable::FastEmbedLoader;
