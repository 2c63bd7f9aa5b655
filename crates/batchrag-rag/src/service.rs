//! Startup wiring: load the persisted state once and serve queries from it.

use tracing::info;

use batchrag_core::config::Settings;
use batchrag_core::Result;
use batchrag_embed::default_provider;
use batchrag_index::{Catalog, FlatIndex};

use crate::composer::{AnswerComposer, AnswerPayload};
use crate::llm::OpenAiChatModel;
use crate::retriever::{MultimodalRetriever, RetrievalResult};

/// Load both indexes and the catalog named in `settings` and build a retriever.
/// Any missing or inconsistent artefact fails here, before serving starts.
pub fn open_retriever(settings: &Settings) -> Result<MultimodalRetriever> {
    let paths = &settings.paths;
    let text_index = FlatIndex::load(&paths.resolve(&paths.text_index))?;
    let image_index = FlatIndex::load(&paths.resolve(&paths.image_index))?;
    let catalog = Catalog::load(&paths.resolve(&paths.catalog))?;
    let provider = default_provider(settings)?;
    MultimodalRetriever::new(provider, text_index, image_index, catalog)
}

/// Read-only after construction; share it across request handlers by reference.
pub struct RetrievalService {
    retriever: MultimodalRetriever,
    composer: AnswerComposer,
    default_top_k: usize,
}

impl RetrievalService {
    pub fn open(settings: &Settings) -> Result<Self> {
        let retriever = open_retriever(settings)?;
        let generator = OpenAiChatModel::from_settings(settings)?;
        let composer = AnswerComposer::new(Box::new(generator), settings.generation.temperature);
        info!(model = %settings.models.chat, "retrieval service ready");
        Ok(Self::from_parts(retriever, composer, settings.retrieval.top_k))
    }

    pub fn from_parts(retriever: MultimodalRetriever, composer: AnswerComposer, default_top_k: usize) -> Self {
        Self { retriever, composer, default_top_k: default_top_k.max(1) }
    }

    pub fn retriever(&self) -> &MultimodalRetriever { &self.retriever }

    /// `top_k` falls back to the configured default and is at least 1.
    pub fn effective_top_k(&self, top_k: Option<usize>) -> usize {
        top_k.unwrap_or(self.default_top_k).max(1)
    }

    pub fn search(&self, query: &str, top_k: Option<usize>) -> Result<RetrievalResult> {
        self.retriever.search_multimodal(query, self.effective_top_k(top_k))
    }

    pub fn answer(&self, query: &str, top_k: Option<usize>) -> Result<AnswerPayload> {
        let retrieval = self.search(query, top_k)?;
        self.composer.compose(query, retrieval)
    }
}
