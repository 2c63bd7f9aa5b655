//! Metadata Catalog: maps index positions to article records.
//!
//! The persisted form groups records as `issue -> title -> {text, image}` and
//! carries the flat `ids.text` / `ids.image` lists that give the
//! position-to-ID correspondence of the two indexes. ID lookups are hash maps
//! built once at load.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::Path;
use std::sync::OnceLock;
use tracing::{info, warn};

use batchrag_core::types::{Chunk, ImageRecord, Modality};
use batchrag_core::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextEntry {
    pub id: String,
    pub chunk: String,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageEntry {
    pub id: String,
    #[serde(default)]
    pub image_path: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArticleEntry {
    #[serde(default)]
    pub text: Vec<TextEntry>,
    #[serde(default)]
    pub image: Vec<ImageEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IdLists {
    #[serde(default)]
    pub text: Vec<String>,
    #[serde(default)]
    pub image: Vec<String>,
}

pub type Issues = BTreeMap<String, BTreeMap<String, ArticleEntry>>;

#[derive(Serialize, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    issues: Issues,
    #[serde(default)]
    ids: IdLists,
    /// Modality of every listed ID, text entries first. Written for readers of
    /// the file; loading rebuilds it from `ids`.
    #[serde(default)]
    types: Vec<Modality>,
}

/// A chunk record resolved from the catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogChunk {
    pub id: String,
    pub chunk: Chunk,
    pub url: Option<String>,
}

/// An image record resolved from the catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogImage {
    pub id: String,
    pub image: ImageRecord,
    pub url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Record<'a> {
    Text(&'a CatalogChunk),
    Image(&'a CatalogImage),
}

#[derive(Debug, Clone)]
pub struct Catalog {
    issues: Issues,
    ids: IdLists,
    chunks_by_id: HashMap<String, CatalogChunk>,
    images_by_id: HashMap<String, CatalogImage>,
    image_positions: HashMap<String, usize>,
}

impl Catalog {
    /// Build the lookup tables. Fails when an ID is listed twice within one
    /// modality, either in the position list or among the records.
    pub fn from_parts(issues: Issues, ids: IdLists) -> Result<Self> {
        ensure_unique(&ids.text, Modality::Text)?;
        ensure_unique(&ids.image, Modality::Image)?;

        let mut chunks_by_id = HashMap::new();
        let mut images_by_id = HashMap::new();
        for (issue, articles) in &issues {
            for (title, article) in articles {
                for (index, entry) in article.text.iter().enumerate() {
                    let record = CatalogChunk {
                        id: entry.id.clone(),
                        chunk: Chunk { issue: issue.clone(), title: title.clone(), text: entry.chunk.clone(), index },
                        url: entry.url.clone(),
                    };
                    if chunks_by_id.insert(entry.id.clone(), record).is_some() {
                        return Err(Error::MalformedState(format!("text record '{}' appears twice", entry.id)));
                    }
                }
                for entry in &article.image {
                    let Some(path) = entry.image_path.as_deref().filter(|p| !p.is_empty()) else {
                        warn!(id = %entry.id, "image record without a path, ignored");
                        continue;
                    };
                    let record = CatalogImage {
                        id: entry.id.clone(),
                        image: ImageRecord { issue: issue.clone(), title: title.clone(), image_path: path.to_string() },
                        url: entry.url.clone(),
                    };
                    if images_by_id.insert(entry.id.clone(), record).is_some() {
                        return Err(Error::MalformedState(format!("image record '{}' appears twice", entry.id)));
                    }
                }
            }
        }

        let image_positions = ids.image.iter().enumerate().map(|(i, id)| (id.clone(), i)).collect();
        Ok(Self { issues, ids, chunks_by_id, images_by_id, image_positions })
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::NotFound(format!("catalog file {}", path.display())));
        }
        let file: CatalogFile = serde_json::from_str(&fs::read_to_string(path)?)
            .map_err(|e| Error::MalformedState(format!("{}: {}", path.display(), e)))?;
        let catalog = Self::from_parts(file.issues, file.ids)?;
        info!(
            text = catalog.ids.text.len(),
            images = catalog.ids.image.len(),
            "loaded catalog from {}",
            path.display()
        );
        Ok(catalog)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() { fs::create_dir_all(parent)?; }
        let types = std::iter::repeat(Modality::Text)
            .take(self.ids.text.len())
            .chain(std::iter::repeat(Modality::Image).take(self.ids.image.len()))
            .collect();
        let file = CatalogFile { issues: self.issues.clone(), ids: self.ids.clone(), types };
        fs::write(path, serde_json::to_string_pretty(&file)?)?;
        Ok(())
    }

    /// Check the ID lists against the sizes of the loaded indexes.
    pub fn validate(&self, text_len: usize, image_len: usize) -> Result<()> {
        if self.ids.text.len() != text_len {
            return Err(Error::MalformedState(format!(
                "text index holds {} vectors but the catalog lists {} text ids",
                text_len,
                self.ids.text.len()
            )));
        }
        if self.ids.image.len() != image_len {
            return Err(Error::MalformedState(format!(
                "image index holds {} vectors but the catalog lists {} image ids",
                image_len,
                self.ids.image.len()
            )));
        }
        let unresolved = self.ids.text.iter().filter(|id| !self.chunks_by_id.contains_key(*id)).count();
        if unresolved > 0 {
            warn!(unresolved, "text ids without a catalog record; those positions will be skipped");
        }
        Ok(())
    }

    pub fn issues(&self) -> &Issues { &self.issues }

    pub fn ids(&self, modality: Modality) -> &[String] {
        match modality {
            Modality::Text => &self.ids.text,
            Modality::Image => &self.ids.image,
        }
    }

    pub fn article(&self, issue: &str, title: &str) -> Option<&ArticleEntry> {
        self.issues.get(issue).and_then(|a| a.get(title))
    }

    /// Resolve an index position of the given modality; `None` is a miss.
    pub fn resolve(&self, modality: Modality, position: usize) -> Option<Record<'_>> {
        match modality {
            Modality::Text => self.resolve_text(position).map(Record::Text),
            Modality::Image => self.resolve_image(position).map(Record::Image),
        }
    }

    pub fn resolve_text(&self, position: usize) -> Option<&CatalogChunk> {
        self.ids.text.get(position).and_then(|id| self.chunks_by_id.get(id))
    }

    pub fn resolve_image(&self, position: usize) -> Option<&CatalogImage> {
        self.ids.image.get(position).and_then(|id| self.images_by_id.get(id))
    }

    /// Position of an image ID in the image index, if it was indexed.
    pub fn image_position(&self, id: &str) -> Option<usize> { self.image_positions.get(id).copied() }
}

fn ensure_unique(ids: &[String], modality: Modality) -> Result<()> {
    let mut seen = HashSet::with_capacity(ids.len());
    for id in ids {
        if !seen.insert(id.as_str()) {
            return Err(Error::MalformedState(format!("{} id '{}' listed twice", modality.as_str(), id)));
        }
    }
    Ok(())
}

/// Lowercase, replace each run outside `[a-z0-9]` with `-`, trim dashes.
pub fn slugify(text: &str) -> String {
    static NON_ALNUM: OnceLock<Regex> = OnceLock::new();
    let re = NON_ALNUM.get_or_init(|| Regex::new(r"[^a-z0-9]+").expect("static regex"));
    re.replace_all(&text.to_lowercase(), "-").trim_matches('-').to_string()
}

/// Deterministic record ID from `(issue, slug(title), modality, n)`.
pub fn record_id(issue: &str, title: &str, modality: Modality, n: usize) -> String {
    let kind = match modality {
        Modality::Text => "chunk",
        Modality::Image => "image",
    };
    format!("{}_{}_{}_{}", issue, slugify(title), kind, n)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Catalog {
        let mut issues = Issues::new();
        issues.entry("1".into()).or_default().insert(
            "A".into(),
            ArticleEntry {
                text: vec![
                    TextEntry { id: "t0".into(), chunk: "first".into(), url: Some("u".into()) },
                    TextEntry { id: "t1".into(), chunk: "second".into(), url: None },
                ],
                image: vec![ImageEntry { id: "i0".into(), image_path: Some("a.jpg".into()), url: None }],
            },
        );
        let ids = IdLists { text: vec!["t1".into(), "t0".into(), "ghost".into()], image: vec!["i0".into()] };
        Catalog::from_parts(issues, ids).unwrap()
    }

    #[test]
    fn resolves_positions_through_id_lists() {
        let catalog = sample();
        let c = catalog.resolve_text(0).unwrap();
        assert_eq!(c.id, "t1");
        assert_eq!(c.chunk.index, 1);
        assert_eq!(c.chunk.title, "A");
        assert!(catalog.resolve_text(2).is_none(), "unknown id is a miss");
        assert!(catalog.resolve_text(99).is_none());
        assert!(matches!(catalog.resolve(Modality::Image, 0), Some(Record::Image(img)) if img.image.image_path == "a.jpg"));
        assert_eq!(catalog.image_position("i0"), Some(0));
        assert_eq!(catalog.image_position("nope"), None);
    }

    #[test]
    fn validate_checks_index_sizes() {
        let catalog = sample();
        assert!(catalog.validate(3, 1).is_ok());
        assert!(matches!(catalog.validate(2, 1), Err(Error::MalformedState(_))));
        assert!(matches!(catalog.validate(3, 0), Err(Error::MalformedState(_))));
    }

    #[test]
    fn duplicate_ids_are_malformed() {
        let ids = IdLists { text: vec!["x".into(), "x".into()], image: vec![] };
        assert!(matches!(Catalog::from_parts(Issues::new(), ids), Err(Error::MalformedState(_))));
    }

    #[test]
    fn slugify_matches_id_scheme() {
        assert_eq!(slugify("  Hello, World! AI's 2024 "), "hello-world-ai-s-2024");
        assert_eq!(slugify("---"), "");
        assert_eq!(record_id("12", "Big News", Modality::Text, 3), "12_big-news_chunk_3");
        assert_eq!(record_id("12", "Big News", Modality::Image, 0), "12_big-news_image_0");
    }
}
