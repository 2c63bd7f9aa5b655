use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use batchrag_core::traits::Generator;
use batchrag_core::{Error, Result};

use crate::prompt::{render_rag_prompt, NO_GROUNDING_SENTINEL, SYSTEM_PROMPT};
use crate::retriever::{assemble_context, ImageHit, RetrievalResult, TextHit};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultsPayload {
    pub text: Vec<TextHit>,
    pub images: Vec<ImageHit>,
    pub main_image: Option<String>,
}

/// What the presentation layer receives for one query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerPayload {
    pub query: String,
    pub answer_text: String,
    pub results: ResultsPayload,
    pub total_results: usize,
    pub text_count: usize,
    pub image_count: usize,
}

pub struct AnswerComposer {
    generator: Box<dyn Generator>,
    temperature: f32,
}

impl AnswerComposer {
    pub fn new(generator: Box<dyn Generator>, temperature: f32) -> Self {
        Self { generator, temperature }
    }

    /// Ask the generator once for an answer grounded in `retrieval`. When the
    /// answer carries the no-grounding sentinel the evidence is dropped from
    /// the payload.
    pub fn compose(&self, query: &str, retrieval: RetrievalResult) -> Result<AnswerPayload> {
        let RetrievalResult { mut text, images, main_image, .. } = retrieval;
        // sort_by is stable, so equal scores keep index-return order
        text.sort_by(|a, b| b.score.total_cmp(&a.score));

        let context = assemble_context(images.first(), &text);
        let prompt = render_rag_prompt(&context, query);
        debug!(prompt_len = prompt.len(), "calling generator");
        let answer_text = self
            .generator
            .generate(SYSTEM_PROMPT, &prompt, self.temperature)
            .map_err(Error::upstream)?;

        let results = if answer_text.contains(NO_GROUNDING_SENTINEL) {
            info!(query, "generator reported no grounding, dropping evidence");
            ResultsPayload { text: Vec::new(), images: Vec::new(), main_image: None }
        } else {
            ResultsPayload { text, images, main_image }
        };

        let text_count = results.text.len();
        let image_count = results.images.len();
        Ok(AnswerPayload {
            query: query.to_string(),
            answer_text,
            results,
            total_results: text_count + image_count,
            text_count,
            image_count,
        })
    }
}
