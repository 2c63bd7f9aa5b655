//! Embedding Provider: general text embeddings, joint text/image embeddings
//! and a deterministic fake for tests.
//!
//! Respects `APP_USE_FAKE_EMBEDDINGS=1` to swap both real models for
//! [`FakeEmbedder`] instances.

use std::hash::{Hash, Hasher};
use std::path::PathBuf;

use tracing::{debug, info};
use twox_hash::XxHash64;

use batchrag_core::config::{expand_path, Settings};
use batchrag_core::traits::Embedder;
use batchrag_core::types::{EmbeddingSpace, Vector};
use batchrag_core::{Error, Result};

pub mod clip;
pub mod device;
pub mod openai;
mod pool;
mod tokenize;

pub use clip::ClipTextEmbedder;
pub use openai::OpenAiEmbedder;
pub use pool::l2_normalize_rows;
pub use tokenize::tokenize_truncated;

/// Output dims the fakes use, matching the default real models.
pub const FAKE_TEXT_DIM: usize = 1536;
pub const FAKE_JOINT_DIM: usize = 768;

/// Token-hash embedder: deterministic, no model files, unit-norm output.
pub struct FakeEmbedder {
    id: String,
    space: EmbeddingSpace,
    dim: usize,
}

impl FakeEmbedder {
    pub fn new(space: EmbeddingSpace, dim: usize) -> Self {
        Self { id: format!("fake:{}:d{}", space, dim), space, dim }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0f32; self.dim];
        for (i, token) in text.split_whitespace().enumerate() {
            let mut hasher = XxHash64::with_seed(0);
            token.to_lowercase().hash(&mut hasher);
            let h = hasher.finish();
            let idx = (h as usize) % self.dim;
            let val = (((h >> 32) as u32) as f32) / (u32::MAX as f32);
            v[idx] += val + (i as f32 % 3.0) * 0.01;
        }
        let norm = (v.iter().map(|x| x * x).sum::<f32>()).sqrt().max(1e-6);
        for x in &mut v { *x /= norm; }
        v
    }
}

impl Embedder for FakeEmbedder {
    fn id(&self) -> &str { &self.id }
    fn space(&self) -> EmbeddingSpace { self.space }
    fn dim(&self) -> usize { self.dim }
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

/// The pair of embedders the pipeline needs, checked to cover both spaces.
pub struct EmbeddingProvider {
    general: Box<dyn Embedder>,
    joint: Box<dyn Embedder>,
}

impl EmbeddingProvider {
    pub fn new(general: Box<dyn Embedder>, joint: Box<dyn Embedder>) -> Result<Self> {
        if general.space() != EmbeddingSpace::Text {
            return Err(Error::InvalidConfig(format!("general embedder '{}' produces {} vectors", general.id(), general.space())));
        }
        if joint.space() != EmbeddingSpace::Joint {
            return Err(Error::InvalidConfig(format!("joint embedder '{}' produces {} vectors", joint.id(), joint.space())));
        }
        Ok(Self { general, joint })
    }

    pub fn general(&self) -> &dyn Embedder { self.general.as_ref() }
    pub fn joint(&self) -> &dyn Embedder { self.joint.as_ref() }

    /// Embed a query or chunk in the general text space.
    pub fn embed_text_general(&self, text: &str) -> Result<Vector> {
        first(embed_with(self.general.as_ref(), &[text.to_string()])?)
    }

    /// Embed text in the joint text/image space.
    pub fn embed_text_joint(&self, text: &str) -> Result<Vector> {
        first(embed_with(self.joint.as_ref(), &[text.to_string()])?)
    }

    pub fn embed_general_batch(&self, texts: &[String]) -> Result<Vec<Vector>> {
        embed_with(self.general.as_ref(), texts)
    }

    pub fn embed_joint_batch(&self, texts: &[String]) -> Result<Vec<Vector>> {
        embed_with(self.joint.as_ref(), texts)
    }
}

fn first(mut vectors: Vec<Vector>) -> Result<Vector> {
    vectors.pop().ok_or_else(|| Error::Upstream("embedder returned no vector".into()))
}

/// Run an embedder and turn every output into a normalised, space-tagged vector.
/// Empty, wrongly sized or non-finite outputs count as upstream failures.
fn embed_with(embedder: &dyn Embedder, texts: &[String]) -> Result<Vec<Vector>> {
    debug!(embedder = embedder.id(), n = texts.len(), "embedding");
    let raw = embedder.embed_batch(texts).map_err(Error::upstream)?;
    if raw.len() != texts.len() {
        return Err(Error::Upstream(format!("{} returned {} vectors for {} inputs", embedder.id(), raw.len(), texts.len())));
    }
    raw.into_iter()
        .map(|values| {
            if values.is_empty() || values.len() != embedder.dim() {
                return Err(Error::Upstream(format!(
                    "{} returned a {}-dim vector, expected {}",
                    embedder.id(),
                    values.len(),
                    embedder.dim()
                )));
            }
            if values.iter().any(|x| !x.is_finite()) {
                return Err(Error::Upstream(format!("{} returned non-finite values", embedder.id())));
            }
            Ok(Vector::normalized(embedder.space(), values))
        })
        .collect()
}

pub fn use_fake_embeddings() -> bool {
    std::env::var("APP_USE_FAKE_EMBEDDINGS")
        .ok()
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

pub fn default_general_embedder(settings: &Settings) -> Result<Box<dyn Embedder>> {
    if use_fake_embeddings() {
        info!("using FakeEmbedder for the text space");
        return Ok(Box::new(FakeEmbedder::new(EmbeddingSpace::Text, FAKE_TEXT_DIM)));
    }
    Ok(Box::new(OpenAiEmbedder::from_settings(settings)?))
}

pub fn default_joint_embedder(settings: &Settings) -> Result<Box<dyn Embedder>> {
    if use_fake_embeddings() {
        info!("using FakeEmbedder for the joint space");
        return Ok(Box::new(FakeEmbedder::new(EmbeddingSpace::Joint, FAKE_JOINT_DIM)));
    }
    let dir: PathBuf = expand_path(&settings.models.joint_model_dir);
    if !dir.exists() {
        return Err(Error::NotFound(format!("CLIP model directory {}", dir.display())));
    }
    let embedder = ClipTextEmbedder::load(&dir).map_err(|e| Error::InvalidConfig(format!("{e:#}")))?;
    Ok(Box::new(embedder))
}

pub fn default_provider(settings: &Settings) -> Result<EmbeddingProvider> {
    EmbeddingProvider::new(default_general_embedder(settings)?, default_joint_embedder(settings)?)
}
