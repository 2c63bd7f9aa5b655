//! Article preprocessing: HTML cleanup and overlapping word-window chunking.

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use std::fs;
use std::path::Path;
use std::sync::OnceLock;

use crate::error::{Error, Result};
use crate::types::Chunk;

/// An article as produced by the scraper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawArticle {
    #[serde(deserialize_with = "issue_from_any")]
    pub issue: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub image_filename: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
}

/// A cleaned, chunked article ready for embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedArticle {
    #[serde(deserialize_with = "issue_from_any")]
    pub issue: String,
    pub title: String,
    #[serde(default)]
    pub url: Option<String>,
    pub chunks: Vec<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub image_path: Option<String>,
}

impl ProcessedArticle {
    pub fn to_chunks(&self) -> Vec<Chunk> {
        self.chunks
            .iter()
            .enumerate()
            .map(|(index, text)| Chunk { issue: self.issue.clone(), title: self.title.clone(), text: text.clone(), index })
            .collect()
    }
}

/// Issue numbers show up both as JSON numbers and strings.
fn issue_from_any<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<String, D::Error> {
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        serde_json::Value::Null => Ok(String::new()),
        other => Err(serde::de::Error::custom(format!("unsupported issue value: {other}"))),
    }
}

#[derive(Debug, Clone)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self { chunk_size: 300, overlap: 50 }
    }
}

#[derive(Default)]
pub struct DataProcessor {
    chunking_config: ChunkingConfig,
}

impl DataProcessor {
    pub fn new() -> Self { Self::default() }

    pub fn with_chunking(chunking_config: ChunkingConfig) -> Self { Self { chunking_config } }

    pub fn load_raw(&self, path: &Path) -> Result<Vec<RawArticle>> {
        if !path.exists() {
            return Err(Error::NotFound(format!("raw articles file {}", path.display())));
        }
        Ok(serde_json::from_str(&fs::read_to_string(path)?)?)
    }

    /// Clean and chunk every article. The image reference survives only when
    /// the file exists under `images_dir`.
    pub fn process_articles(&self, articles: &[RawArticle], images_dir: &Path) -> Vec<ProcessedArticle> {
        articles
            .iter()
            .map(|article| {
                let content = clean_text(&article.content);
                let image_path = article
                    .image_filename
                    .as_deref()
                    .filter(|name| !name.is_empty() && images_dir.join(name).exists())
                    .map(str::to_string);
                ProcessedArticle {
                    issue: article.issue.clone(),
                    title: article.title.trim().to_string(),
                    url: article.url.clone(),
                    chunks: chunk_text(&content, self.chunking_config.chunk_size, self.chunking_config.overlap),
                    image_url: article.image_url.clone(),
                    image_path,
                }
            })
            .collect()
    }

    pub fn save_processed(&self, articles: &[ProcessedArticle], path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() { fs::create_dir_all(parent)?; }
        fs::write(path, serde_json::to_string_pretty(articles)?)?;
        Ok(())
    }

    pub fn load_processed(&self, path: &Path) -> Result<Vec<ProcessedArticle>> {
        if !path.exists() {
            return Err(Error::NotFound(format!("processed articles file {}", path.display())));
        }
        Ok(serde_json::from_str(&fs::read_to_string(path)?)?)
    }
}

/// Strip HTML tags and collapse whitespace.
pub fn clean_text(text: &str) -> String {
    static TAGS: OnceLock<Regex> = OnceLock::new();
    let tags = TAGS.get_or_init(|| Regex::new(r"<[^>]+>").expect("static regex"));
    let stripped = tags.replace_all(text, " ");
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Split into windows of `chunk_size` words where consecutive windows share
/// `overlap` words. The final window always ends at the last word.
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    let chunk_size = chunk_size.max(1);
    let step = chunk_size.saturating_sub(overlap).max(1);
    let mut chunks = Vec::new();
    let mut start = 0;
    while start < words.len() {
        let end = (start + chunk_size).min(words.len());
        chunks.push(words[start..end].join(" "));
        if end == words.len() { break; }
        start += step;
    }
    chunks
}

/// The text actually embedded for a chunk: the title repeated three times
/// ahead of the body, which biases retrieval towards title matches.
pub fn weighted_chunk_text(title: &str, chunk: &str) -> String {
    let mut out = String::with_capacity((title.len() + 1) * 3 + chunk.len());
    for _ in 0..3 {
        out.push_str(title);
        out.push(' ');
    }
    out.push_str(chunk);
    out
}
