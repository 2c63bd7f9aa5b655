//! Configuration loader and path helpers.
//!
//! Uses Figment to merge built-in defaults, `config.toml`, `config.<env>.toml`
//! and `APP_*` env vars (`__` separates nesting, e.g. `APP_RETRIEVAL__TOP_K`).
//! Provides helpers to expand `~` and `${VAR}` and to resolve relative paths
//! against the configured data directory.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::file("config.toml"));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file("config.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("config.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("config.test.toml")),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        Ok(Self { figment })
    }

    /// Build from an explicit figment; used by tests and embedders of the library.
    pub fn from_figment(figment: Figment) -> Self {
        Self { figment: Figment::from(Serialized::defaults(Settings::default())).merge(figment) }
    }

    pub fn get<T>(&self, key: &str) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| Error::InvalidConfig(format!("Failed to get '{}': {}", key, e)))
    }

    /// Extract and validate the typed settings tree.
    pub fn settings(&self) -> Result<Settings> {
        let settings: Settings = self
            .figment
            .extract()
            .map_err(|e| Error::InvalidConfig(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub paths: PathSettings,
    pub models: ModelSettings,
    pub openai: OpenAiSettings,
    pub chunking: ChunkingSettings,
    pub retrieval: RetrievalSettings,
    pub generation: GenerationSettings,
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        if self.chunking.chunk_size == 0 {
            return Err(Error::InvalidConfig("chunking.chunk_size must be positive".into()));
        }
        if self.chunking.overlap >= self.chunking.chunk_size {
            return Err(Error::InvalidConfig(format!(
                "chunking.overlap ({}) must be smaller than chunking.chunk_size ({})",
                self.chunking.overlap, self.chunking.chunk_size
            )));
        }
        if self.retrieval.top_k == 0 {
            return Err(Error::InvalidConfig("retrieval.top_k must be at least 1".into()));
        }
        Ok(())
    }
}

/// Locations of persisted artefacts. Relative entries resolve against `data_dir`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathSettings {
    pub data_dir: String,
    pub raw_articles: String,
    pub raw_images_dir: String,
    pub processed_articles: String,
    pub text_embeddings: String,
    pub image_embeddings: String,
    pub text_index: String,
    pub image_index: String,
    pub catalog: String,
    pub test_queries: String,
    pub evaluation_report: String,
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            data_dir: "data".into(),
            raw_articles: "raw/News.json".into(),
            raw_images_dir: "raw/images".into(),
            processed_articles: "processed/News_processed.json".into(),
            text_embeddings: "embeddings/text_embeddings.json".into(),
            image_embeddings: "embeddings/image_embeddings.json".into(),
            text_index: "indexes/text.index".into(),
            image_index: "indexes/image.index".into(),
            catalog: "indexes/unified_metadata.json".into(),
            test_queries: "evaluation/generated_test_queries.json".into(),
            evaluation_report: "evaluation/evaluation_results.json".into(),
        }
    }
}

impl PathSettings {
    pub fn resolve(&self, p: &str) -> PathBuf {
        resolve_with_base(&expand_path(&self.data_dir), p)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    pub text_embedding: String,
    /// Directory holding the CLIP `config.json`, `tokenizer.json` and weights.
    pub joint_model_dir: String,
    pub chat: String,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            text_embedding: "text-embedding-3-small".into(),
            joint_model_dir: "models/clip-vit-large-patch14".into(),
            chat: "gpt-4o".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAiSettings {
    pub api_base: String,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

impl Default for OpenAiSettings {
    fn default() -> Self {
        Self { api_base: "https://api.openai.com/v1".into(), api_key: None, timeout_secs: 60 }
    }
}

impl OpenAiSettings {
    /// The configured key, falling back to `OPENAI_API_KEY`.
    pub fn api_key(&self) -> Result<String> {
        self.api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| env::var("OPENAI_API_KEY").ok().filter(|k| !k.trim().is_empty()))
            .ok_or_else(|| Error::InvalidConfig("No OpenAI API key: set openai.api_key or OPENAI_API_KEY".into()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingSettings {
    /// Words per chunk.
    pub chunk_size: usize,
    /// Words shared by consecutive chunks.
    pub overlap: usize,
}

impl Default for ChunkingSettings {
    fn default() -> Self { Self { chunk_size: 300, overlap: 50 } }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    pub top_k: usize,
}

impl Default for RetrievalSettings {
    fn default() -> Self { Self { top_k: 5 } }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationSettings {
    /// Temperature for grounded answers.
    pub temperature: f32,
    /// Temperature for evaluation query generation.
    pub query_temperature: f32,
}

impl Default for GenerationSettings {
    fn default() -> Self { Self { temperature: 0.2, query_temperature: 0.7 } }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
/// If `p` is absolute, it's returned as-is; otherwise `base.join(p)` is returned.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let settings = Config::from_figment(Figment::new()).settings().expect("settings");
        assert_eq!(settings.retrieval.top_k, 5);
        assert_eq!(settings.chunking.chunk_size, 300);
        assert_eq!(settings.chunking.overlap, 50);
        assert_eq!(settings.models.chat, "gpt-4o");
    }

    #[test]
    fn overrides_merge_over_defaults() {
        let figment = Figment::new().merge(Toml::string("[retrieval]\ntop_k = 9\n[paths]\ndata_dir = \"/srv/batch\"\n"));
        let config = Config::from_figment(figment);
        let settings = config.settings().expect("settings");
        assert_eq!(settings.retrieval.top_k, 9);
        assert_eq!(settings.chunking.chunk_size, 300);
        assert_eq!(settings.paths.resolve("indexes/text.index"), PathBuf::from("/srv/batch/indexes/text.index"));
        assert_eq!(config.get::<usize>("retrieval.top_k").expect("key"), 9);
    }

    #[test]
    fn overlap_must_be_smaller_than_chunk() {
        let figment = Figment::new().merge(Toml::string("[chunking]\nchunk_size = 10\noverlap = 10\n"));
        let err = Config::from_figment(figment).settings().unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn absolute_paths_are_kept() {
        let base = Path::new("/base");
        assert_eq!(resolve_with_base(base, "/abs/file"), PathBuf::from("/abs/file"));
        assert_eq!(resolve_with_base(base, "rel/file"), PathBuf::from("/base/rel/file"));
    }
}
