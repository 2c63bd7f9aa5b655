//! OpenAI-compatible `/embeddings` client for the general text space.

use anyhow::{anyhow, Result};
use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use batchrag_core::config::Settings;
use batchrag_core::traits::Embedder;
use batchrag_core::types::EmbeddingSpace;

pub struct OpenAiEmbedder {
    client: Client,
    api_base: String,
    api_key: String,
    model: String,
    id: String,
    dim: usize,
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    index: usize,
    embedding: Vec<f32>,
}

impl OpenAiEmbedder {
    pub fn new(api_base: &str, api_key: String, model: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        let dim = match model {
            "text-embedding-3-large" => 3072,
            _ => 1536,
        };
        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            api_key,
            model: model.to_string(),
            id: format!("openai:{}", model),
            dim,
        })
    }

    pub fn from_settings(settings: &Settings) -> batchrag_core::Result<Self> {
        let key = settings.openai.api_key()?;
        Self::new(
            &settings.openai.api_base,
            key,
            &settings.models.text_embedding,
            Duration::from_secs(settings.openai.timeout_secs),
        )
        .map_err(|e| batchrag_core::Error::InvalidConfig(e.to_string()))
    }
}

impl Embedder for OpenAiEmbedder {
    fn id(&self) -> &str { &self.id }
    fn space(&self) -> EmbeddingSpace { EmbeddingSpace::Text }
    fn dim(&self) -> usize { self.dim }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() { return Ok(vec![]); }
        let url = format!("{}/embeddings", self.api_base);
        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&json!({ "model": self.model, "input": texts }))
            .send()?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().unwrap_or_default();
            return Err(anyhow!("OpenAI embeddings error {}: {}", status, text));
        }

        let mut payload: EmbeddingsResponse = res.json()?;
        if payload.data.len() != texts.len() {
            return Err(anyhow!("OpenAI returned {} embeddings for {} inputs", payload.data.len(), texts.len()));
        }
        payload.data.sort_by_key(|d| d.index);
        Ok(payload.data.into_iter().map(|d| d.embedding).collect())
    }
}
