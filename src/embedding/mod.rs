//! Image embedding generation.
//!
//! Provides two embedders behind the [`ImageEmbedder`] trait:
//!
//! - [`PerceptualFingerprinter`]: local, deterministic 64-dim block-luminance vector
//! - [`SemanticEmbedder`]: external visual model (fastembed vision models when the
//!   `clip-embeddings` feature is enabled) with optional fingerprint fallback

// Allow cast precision loss for pooling and normalization arithmetic.
#![allow(clippy::cast_precision_loss)]
// Allow cast possible truncation when narrowing f64 accumulators to f32.
#![allow(clippy::cast_possible_truncation)]

mod model;
mod perceptual;
mod pooling;
mod semantic;

pub use model::{FastEmbedLoader, ModelLoader, ModelOutput, VisualModel, canonical_model_name};
pub use perceptual::{FINGERPRINT_DIMENSIONS, PerceptualFingerprinter, sniff_format};
pub use pooling::{mean_pool, normalize_rounded};
pub use semantic::SemanticEmbedder;

use crate::Result;
use crate::models::EmbedderId;

/// A computed embedding and the embedder that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    /// Which embedder produced the vector.
    pub embedder: EmbedderId,
    /// L2-normalized components.
    pub vector: Vec<f32>,
}

impl Embedding {
    /// Creates a new embedding.
    #[must_use]
    pub const fn new(embedder: EmbedderId, vector: Vec<f32>) -> Self {
        Self { embedder, vector }
    }
}

/// Trait for image embedding generators.
pub trait ImageEmbedder: Send + Sync {
    /// Returns the embedding dimensions, if fixed and known up front.
    fn dimensions(&self) -> Option<usize>;

    /// Generates an embedding for encoded image bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the image cannot be decoded or the model fails.
    fn embed(&self, image: &[u8]) -> Result<Embedding>;
}
