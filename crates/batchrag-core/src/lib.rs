//! Shared building blocks for the batchrag workspace: domain types, the error
//! taxonomy, collaborator traits, configuration and text preprocessing.

pub mod config;
pub mod data_processor;
pub mod error;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
