//! Offline builder: processed articles -> embedding records -> flat indexes
//! and catalog.
//!
//! Typical flow:
//! 1) `embed_articles` computes text (weighted title + chunk) and image
//!    (title, joint space) embeddings, reusing cached records by content hash
//! 2) `build_indexes` assigns deterministic IDs, normalises vectors and groups
//!    metadata by issue and article
//! 3) `BuiltIndexes::save` writes both index files and the catalog

use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::info;

use batchrag_core::data_processor::{weighted_chunk_text, ProcessedArticle};
use batchrag_core::types::{EmbeddingSpace, Modality, Vector};
use batchrag_core::{Error, Result};
use batchrag_embed::EmbeddingProvider;

use crate::catalog::{record_id, ArticleEntry, Catalog, IdLists, ImageEntry, Issues, TextEntry};
use crate::flat::FlatIndex;

const EMBED_BATCH: usize = 64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordMetadata {
    pub issue: String,
    pub title: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub chunk: Option<String>,
    #[serde(default)]
    pub image_path: Option<String>,
    pub content_type: Modality,
}

/// One embedded item as written between the embed and build steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    pub id: String,
    /// blake3 of the exact text that was embedded.
    pub content_hash: String,
    pub embedder_id: String,
    pub embedding: Vec<f32>,
    pub metadata: RecordMetadata,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EmbeddingSet {
    pub text: Vec<EmbeddingRecord>,
    pub image: Vec<EmbeddingRecord>,
}

impl EmbeddingSet {
    pub fn load(text_path: &Path, image_path: &Path) -> Result<Self> {
        Ok(Self { text: load_records(text_path)?, image: load_records(image_path)? })
    }

    /// Like `load`, but missing files yield an empty set.
    pub fn load_or_default(text_path: &Path, image_path: &Path) -> Result<Self> {
        if !text_path.exists() || !image_path.exists() { return Ok(Self::default()); }
        Self::load(text_path, image_path)
    }

    pub fn save(&self, text_path: &Path, image_path: &Path) -> Result<()> {
        save_records(text_path, &self.text)?;
        save_records(image_path, &self.image)
    }
}

pub fn load_records(path: &Path) -> Result<Vec<EmbeddingRecord>> {
    if !path.exists() {
        return Err(Error::NotFound(format!("embedding records {}", path.display())));
    }
    Ok(serde_json::from_str(&fs::read_to_string(path)?)?)
}

pub fn save_records(path: &Path, records: &[EmbeddingRecord]) -> Result<()> {
    if let Some(parent) = path.parent() { fs::create_dir_all(parent)?; }
    fs::write(path, serde_json::to_string_pretty(records)?)?;
    Ok(())
}

fn content_hash(text: &str) -> String { blake3::hash(text.as_bytes()).to_hex().to_string() }

struct Pending {
    input: String,
    hash: String,
    id: String,
    metadata: RecordMetadata,
}

/// Embed every chunk and every article image. Records from `previous` whose
/// content hash and embedder id match are reused instead of recomputed.
pub fn embed_articles(
    provider: &EmbeddingProvider,
    articles: &[ProcessedArticle],
    previous: &EmbeddingSet,
) -> Result<EmbeddingSet> {
    let mut text_pending = Vec::new();
    let mut image_pending = Vec::new();
    for article in articles {
        for (idx, chunk) in article.chunks.iter().enumerate() {
            let input = weighted_chunk_text(&article.title, chunk);
            text_pending.push(Pending {
                hash: content_hash(&input),
                input,
                id: format!("{}_chunk_{}", article.issue, idx),
                metadata: RecordMetadata {
                    issue: article.issue.clone(),
                    title: article.title.clone(),
                    url: article.url.clone(),
                    chunk: Some(chunk.clone()),
                    image_path: None,
                    content_type: Modality::Text,
                },
            });
        }
        if let Some(path) = article.image_path.as_deref().filter(|p| !p.is_empty()) {
            // images are embedded by their article title, not by pixels
            let input = article.title.clone();
            image_pending.push(Pending {
                hash: content_hash(&input),
                input,
                id: format!("{}_image", article.issue),
                metadata: RecordMetadata {
                    issue: article.issue.clone(),
                    title: article.title.clone(),
                    url: article.url.clone(),
                    chunk: None,
                    image_path: Some(file_name(path)),
                    content_type: Modality::Image,
                },
            });
        }
    }

    let text = embed_pending(provider, EmbeddingSpace::Text, text_pending, &previous.text)?;
    let image = embed_pending(provider, EmbeddingSpace::Joint, image_pending, &previous.image)?;
    info!(text = text.len(), image = image.len(), "created embeddings");
    Ok(EmbeddingSet { text, image })
}

fn file_name(path: &str) -> String {
    Path::new(path).file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_else(|| path.to_string())
}

fn embed_pending(
    provider: &EmbeddingProvider,
    space: EmbeddingSpace,
    pending: Vec<Pending>,
    previous: &[EmbeddingRecord],
) -> Result<Vec<EmbeddingRecord>> {
    let embedder = match space {
        EmbeddingSpace::Text => provider.general(),
        EmbeddingSpace::Joint => provider.joint(),
    };
    let embedder_id = embedder.id().to_string();
    let cache: HashMap<&str, &Vec<f32>> = previous
        .iter()
        .filter(|r| r.embedder_id == embedder_id)
        .map(|r| (r.content_hash.as_str(), &r.embedding))
        .collect();

    let mut vectors: Vec<Option<Vec<f32>>> = pending.iter().map(|p| cache.get(p.hash.as_str()).map(|v| (*v).clone())).collect();
    let missing: Vec<usize> = (0..pending.len()).filter(|i| vectors[*i].is_none()).collect();
    info!(space = %space, total = pending.len(), cached = pending.len() - missing.len(), "embedding");

    let pb = ProgressBar::new(missing.len() as u64);
    if let Ok(style) = ProgressStyle::default_bar().template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}") {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb.set_message(space.to_string());
    for batch in missing.chunks(EMBED_BATCH) {
        let inputs: Vec<String> = batch.iter().map(|i| pending[*i].input.clone()).collect();
        let embedded = match space {
            EmbeddingSpace::Text => provider.embed_general_batch(&inputs)?,
            EmbeddingSpace::Joint => provider.embed_joint_batch(&inputs)?,
        };
        for (i, v) in batch.iter().zip(embedded) {
            vectors[*i] = Some(v.into_values());
        }
        pb.inc(batch.len() as u64);
    }
    pb.finish_and_clear();

    pending
        .into_iter()
        .zip(vectors)
        .map(|(p, v)| {
            let embedding = v.ok_or_else(|| Error::Upstream(format!("no embedding produced for {}", p.id)))?;
            Ok(EmbeddingRecord { id: p.id, content_hash: p.hash, embedder_id: embedder_id.clone(), embedding, metadata: p.metadata })
        })
        .collect()
}

/// The three artefacts the retrieval service loads at startup.
#[derive(Debug, Clone)]
pub struct BuiltIndexes {
    pub text_index: FlatIndex,
    pub image_index: FlatIndex,
    pub catalog: Catalog,
}

impl BuiltIndexes {
    pub fn save(&self, text_index: &Path, image_index: &Path, catalog: &Path) -> Result<()> {
        self.text_index.save(text_index)?;
        self.image_index.save(image_index)?;
        self.catalog.save(catalog)?;
        info!(
            text = self.text_index.len(),
            images = self.image_index.len(),
            "saved indexes to {} and {}, catalog to {}",
            text_index.display(),
            image_index.display(),
            catalog.display()
        );
        Ok(())
    }
}

/// Build both indexes and the catalog. IDs are numbered per
/// `(issue, slug(title))` in record order, so the same input always yields
/// the same IDs.
pub fn build_indexes(set: &EmbeddingSet) -> Result<BuiltIndexes> {
    let mut issues = Issues::new();
    let mut ids = IdLists::default();

    let mut text_index = FlatIndex::new(EmbeddingSpace::Text, 0);
    let mut counters: HashMap<(String, String), usize> = HashMap::new();
    for record in &set.text {
        let id = next_id(&mut counters, &record.metadata, Modality::Text);
        text_index.add(&Vector::normalized(EmbeddingSpace::Text, record.embedding.clone()))?;
        ids.text.push(id.clone());
        article_entry(&mut issues, &record.metadata).text.push(TextEntry {
            id,
            chunk: record.metadata.chunk.clone().unwrap_or_default(),
            url: record.metadata.url.clone(),
        });
    }

    let mut image_index = FlatIndex::new(EmbeddingSpace::Joint, 0);
    let mut counters: HashMap<(String, String), usize> = HashMap::new();
    for record in &set.image {
        let id = next_id(&mut counters, &record.metadata, Modality::Image);
        image_index.add(&Vector::normalized(EmbeddingSpace::Joint, record.embedding.clone()))?;
        ids.image.push(id.clone());
        article_entry(&mut issues, &record.metadata).image.push(ImageEntry {
            id,
            image_path: record.metadata.image_path.clone(),
            url: record.metadata.url.clone(),
        });
    }

    let catalog = Catalog::from_parts(issues, ids)?;
    catalog.validate(text_index.len(), image_index.len())?;
    Ok(BuiltIndexes { text_index, image_index, catalog })
}

fn next_id(counters: &mut HashMap<(String, String), usize>, meta: &RecordMetadata, modality: Modality) -> String {
    let key = (meta.issue.clone(), crate::catalog::slugify(&meta.title));
    let n = counters.entry(key).or_insert(0);
    let id = record_id(&meta.issue, &meta.title, modality, *n);
    *n += 1;
    id
}

fn article_entry<'a>(issues: &'a mut Issues, meta: &RecordMetadata) -> &'a mut ArticleEntry {
    issues.entry(meta.issue.clone()).or_default().entry(meta.title.clone()).or_default()
}
