//! Multimodal retrieval, grounded answer composition and retrieval evaluation.

pub mod composer;
pub mod eval;
pub mod llm;
pub mod prompt;
pub mod retriever;
pub mod service;

pub use composer::{AnswerComposer, AnswerPayload, ResultsPayload};
pub use llm::OpenAiChatModel;
pub use retriever::{ImageHit, MultimodalRetriever, RetrievalResult, TextHit};
pub use service::{open_retriever, RetrievalService};
