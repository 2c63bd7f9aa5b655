//! Local CLIP text tower used for joint-space embeddings.
//!
//! Loads `config.json`, `tokenizer.json` and either `model.safetensors` or
//! `pytorch_model.bin` from a Hugging Face style model directory. Only the text
//! transformer and its projection are instantiated.

use anyhow::{anyhow, Context, Result};
use candle_core::{DType, Device, Tensor};
use candle_nn::{linear_no_bias, Linear, Module, VarBuilder};
use candle_transformers::models::clip::text_model::{ClipTextConfig, ClipTextTransformer};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use tokenizers::Tokenizer;
use tracing::info;

use batchrag_core::traits::Embedder;
use batchrag_core::types::EmbeddingSpace;

use crate::device::select_device;
use crate::pool::l2_normalize_rows;
use crate::tokenize::tokenize_truncated;

const EOS_TOKEN: &str = "<|endoftext|>";

#[derive(Debug, Deserialize)]
struct HfClipConfig {
    #[serde(default = "default_projection_dim")]
    projection_dim: usize,
    #[serde(default)]
    text_config: HfClipTextConfig,
}

/// Text tower hyper-parameters; defaults are those of ViT-L/14.
#[derive(Debug, Deserialize)]
#[serde(default)]
struct HfClipTextConfig {
    vocab_size: usize,
    hidden_size: usize,
    intermediate_size: usize,
    max_position_embeddings: usize,
    num_hidden_layers: usize,
    num_attention_heads: usize,
}

impl Default for HfClipTextConfig {
    fn default() -> Self {
        Self {
            vocab_size: 49408,
            hidden_size: 768,
            intermediate_size: 3072,
            max_position_embeddings: 77,
            num_hidden_layers: 12,
            num_attention_heads: 12,
        }
    }
}

fn default_projection_dim() -> usize { 768 }

pub struct ClipTextEmbedder {
    id: String,
    text_model: ClipTextTransformer,
    projection: Linear,
    tokenizer: Tokenizer,
    device: Device,
    max_len: usize,
    eos_id: Option<u32>,
    dim: usize,
}

impl ClipTextEmbedder {
    pub fn load(model_dir: &Path) -> Result<Self> {
        if !model_dir.exists() {
            return Err(anyhow!("CLIP model directory {} does not exist", model_dir.display()));
        }
        let device = select_device();
        info!(dir = %model_dir.display(), "loading CLIP text tower");

        let tokenizer_path = model_dir.join("tokenizer.json");
        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow!("Failed to load tokenizer from {}: {}", tokenizer_path.display(), e))?;

        let config_path = model_dir.join("config.json");
        let hf: HfClipConfig = serde_json::from_str(
            &std::fs::read_to_string(&config_path).with_context(|| format!("reading {}", config_path.display()))?,
        )?;
        let text = &hf.text_config;
        let config = ClipTextConfig {
            vocab_size: text.vocab_size,
            embed_dim: text.hidden_size,
            intermediate_size: text.intermediate_size,
            max_position_embeddings: text.max_position_embeddings,
            num_hidden_layers: text.num_hidden_layers,
            num_attention_heads: text.num_attention_heads,
            projection_dim: hf.projection_dim,
            ..ClipTextConfig::vit_base_patch32()
        };

        let vb = load_weights(model_dir, &device)?;
        let text_model = ClipTextTransformer::new(vb.pp("text_model"), &config)?;
        let projection = linear_no_bias(text.hidden_size, hf.projection_dim, vb.pp("text_projection"))?;
        let eos_id = tokenizer.token_to_id(EOS_TOKEN);
        let name = model_dir.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_else(|| "clip".into());
        info!(projection_dim = hf.projection_dim, "CLIP text tower loaded");

        Ok(Self {
            id: format!("clip:{}:d{}", name, hf.projection_dim),
            text_model,
            projection,
            tokenizer,
            device,
            max_len: text.max_position_embeddings,
            eos_id,
            dim: hf.projection_dim,
        })
    }

    fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        let ids = tokenize_truncated(&self.tokenizer, text, self.max_len, self.eos_id)?;
        let input_ids = Tensor::new(ids.as_slice(), &self.device)?.unsqueeze(0)?;
        let pooled = self.text_model.forward(&input_ids)?;
        let projected = self.projection.forward(&pooled)?;
        let normalized = l2_normalize_rows(&projected)?;
        let values = normalized.to_device(&Device::Cpu)?.squeeze(0)?.to_vec1::<f32>()?;
        anyhow::ensure!(values.len() == self.dim, "CLIP produced {} dims, expected {}", values.len(), self.dim);
        Ok(values)
    }
}

fn load_weights(model_dir: &Path, device: &Device) -> Result<VarBuilder<'static>> {
    let safetensors = model_dir.join("model.safetensors");
    if safetensors.exists() {
        // Safety: the mapped file must not be modified or truncated, by this or any
        // other process, for as long as the process holds the weights.
        return Ok(unsafe { VarBuilder::from_mmaped_safetensors(&[safetensors], DType::F32, device)? });
    }
    let weights_path = model_dir.join("pytorch_model.bin");
    let weights = candle_core::pickle::read_all(&weights_path)
        .with_context(|| format!("reading {}", weights_path.display()))?;
    let weights_map: HashMap<String, Tensor> = weights.into_iter().collect();
    Ok(VarBuilder::from_tensors(weights_map, DType::F32, device))
}

impl Embedder for ClipTextEmbedder {
    fn id(&self) -> &str { &self.id }
    fn space(&self) -> EmbeddingSpace { EmbeddingSpace::Joint }
    fn dim(&self) -> usize { self.dim }
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed_one(t)).collect()
    }
}
