//! Two-stage multimodal retrieval.
//!
//! Stage one searches the text index with the query. The article owning the
//! top text hit then anchors stage two: that article's images are ranked by
//! similarity to its title in the joint space, and the best one becomes the
//! main image.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use batchrag_core::types::EmbeddingSpace;
use batchrag_core::{Error, Result};
use batchrag_embed::EmbeddingProvider;
use batchrag_index::{Catalog, FlatIndex};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextHit {
    pub id: String,
    pub score: f32,
    pub rank: usize,
    pub issue: String,
    pub title: String,
    pub chunk: String,
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageHit {
    pub id: String,
    pub score: f32,
    pub rank: usize,
    pub issue: String,
    pub title: String,
    pub image_path: String,
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub query: String,
    pub text: Vec<TextHit>,
    pub images: Vec<ImageHit>,
    pub main_image: Option<String>,
    pub context: String,
    pub total_results: usize,
}

impl RetrievalResult {
    pub fn empty(query: &str) -> Self {
        Self { query: query.to_string(), ..Self::default() }
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty() && self.images.is_empty()
    }
}

/// Context handed to the generator: an optional Markdown reference to the
/// main image, then one `Chunk:` line per text hit in the given order.
pub fn assemble_context(main_image: Option<&ImageHit>, text: &[TextHit]) -> String {
    let mut parts = Vec::with_capacity(text.len() + 1);
    if let Some(image) = main_image {
        parts.push(format!("![{}]({})\n\n", image.title, image.image_path));
    }
    parts.extend(text.iter().map(|hit| format!("Chunk: {}", hit.chunk)));
    parts.join("\n")
}

pub struct MultimodalRetriever {
    provider: EmbeddingProvider,
    text_index: FlatIndex,
    image_index: FlatIndex,
    catalog: Catalog,
}

impl MultimodalRetriever {
    /// Wire the loaded state together, refusing combinations that break the
    /// position/ID invariants or mix embedding spaces.
    pub fn new(provider: EmbeddingProvider, text_index: FlatIndex, image_index: FlatIndex, catalog: Catalog) -> Result<Self> {
        check_index(&text_index, EmbeddingSpace::Text, provider.general().dim(), "text")?;
        check_index(&image_index, EmbeddingSpace::Joint, provider.joint().dim(), "image")?;
        catalog.validate(text_index.len(), image_index.len())?;
        info!(text = text_index.len(), images = image_index.len(), "retriever ready");
        Ok(Self { provider, text_index, image_index, catalog })
    }

    pub fn catalog(&self) -> &Catalog { &self.catalog }

    pub fn search_multimodal(&self, query: &str, top_k: usize) -> Result<RetrievalResult> {
        let k = top_k.max(1);
        let text = self.search_text(query, k)?;
        let Some(anchor) = text.first() else {
            debug!(query, "no text hits resolved");
            return Ok(RetrievalResult::empty(query));
        };

        let images = self.rank_article_images(&anchor.issue, &anchor.title)?;
        let main_image = images.first().map(|img| img.image_path.clone());
        let context = assemble_context(images.first(), &text);
        let total_results = text.len() + images.len();
        info!(query, text = text.len(), images = images.len(), "retrieved");

        Ok(RetrievalResult { query: query.to_string(), text, images, main_image, context, total_results })
    }

    /// Stage one. Positions that do not resolve to a catalog record are skipped;
    /// ranks follow the index's result order.
    fn search_text(&self, query: &str, k: usize) -> Result<Vec<TextHit>> {
        let query_vector = self.provider.embed_text_general(query)?;
        let hits = self.text_index.search(&query_vector, k)?;
        let mut out = Vec::with_capacity(hits.len());
        for (i, hit) in hits.into_iter().enumerate() {
            let Some(record) = self.catalog.resolve_text(hit.position) else {
                warn!(position = hit.position, "text position does not resolve to a catalog record");
                continue;
            };
            out.push(TextHit {
                id: record.id.clone(),
                score: hit.score,
                rank: i + 1,
                issue: record.chunk.issue.clone(),
                title: record.chunk.title.clone(),
                chunk: record.chunk.text.clone(),
                url: record.url.clone(),
            });
        }
        Ok(out)
    }

    /// Stage two: rank the anchor article's own images against its title.
    fn rank_article_images(&self, issue: &str, title: &str) -> Result<Vec<ImageHit>> {
        let Some(article) = self.catalog.article(issue, title) else { return Ok(Vec::new()) };
        if article.image.is_empty() {
            return Ok(Vec::new());
        }

        let positions: Vec<usize> = article
            .image
            .iter()
            .filter_map(|entry| {
                let position = self.catalog.image_position(&entry.id);
                if position.is_none() {
                    debug!(id = %entry.id, "image id not in the image index, excluded");
                }
                position
            })
            .collect();
        if positions.is_empty() {
            return Ok(Vec::new());
        }

        let title_vector = self.provider.embed_text_joint(title)?;
        let hits = self.image_index.search_within(&title_vector, &positions)?;
        Ok(hits
            .into_iter()
            .enumerate()
            .filter_map(|(i, hit)| {
                let record = self.catalog.resolve_image(hit.position)?;
                Some(ImageHit {
                    id: record.id.clone(),
                    score: hit.score,
                    rank: i + 1,
                    issue: record.image.issue.clone(),
                    title: record.image.title.clone(),
                    image_path: record.image.image_path.clone(),
                    url: record.url.clone(),
                })
            })
            .collect())
    }
}

fn check_index(index: &FlatIndex, space: EmbeddingSpace, embedder_dim: usize, name: &str) -> Result<()> {
    if index.space() != space {
        return Err(Error::MalformedState(format!("{} index holds {} vectors, expected {}", name, index.space(), space)));
    }
    if !index.is_empty() && index.dim() != embedder_dim {
        return Err(Error::MalformedState(format!(
            "{} index has dimension {} but its embedder produces {}",
            name,
            index.dim(),
            embedder_dim
        )));
    }
    Ok(())
}
