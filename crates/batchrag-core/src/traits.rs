use crate::types::EmbeddingSpace;

/// Turns text into raw embeddings of a single space.
///
/// Implementations may return unnormalised vectors; callers normalise before
/// storage or search.
pub trait Embedder: Send + Sync {
    /// Stable identifier for the model behind this embedder (e.g. `openai:text-embedding-3-small`).
    fn id(&self) -> &str;
    fn space(&self) -> EmbeddingSpace;
    fn dim(&self) -> usize;
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;
}

/// A single-shot generative text model.
pub trait Generator: Send + Sync {
    fn generate(&self, system_prompt: &str, user_prompt: &str, temperature: f32) -> anyhow::Result<String>;
}
