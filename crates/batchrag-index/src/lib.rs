//! Index Store, Metadata Catalog and the offline builder that produces them.

pub mod build;
pub mod catalog;
pub mod flat;

pub use build::{build_indexes, embed_articles, BuiltIndexes, EmbeddingRecord, EmbeddingSet, RecordMetadata};
pub use catalog::{slugify, Catalog, CatalogChunk, CatalogImage, Record};
pub use flat::FlatIndex;
