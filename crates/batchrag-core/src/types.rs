//! Domain types shared by the index, catalog and retrieval layers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The vector space an embedding lives in. Vectors from different spaces are
/// never compared with each other.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingSpace {
    /// General-purpose text embedding used for text-to-text retrieval.
    Text,
    /// Joint text/image embedding used for title-to-image similarity.
    Joint,
}

impl fmt::Display for EmbeddingSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text => f.write_str("text-space"),
            Self::Joint => f.write_str("joint-space"),
        }
    }
}

/// Which of the two indexes a position or ID belongs to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    Text,
    Image,
}

impl Modality {
    /// The embedding space the modality's index is built in.
    pub fn space(self) -> EmbeddingSpace {
        match self {
            Self::Text => EmbeddingSpace::Text,
            Self::Image => EmbeddingSpace::Joint,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
        }
    }
}

/// An L2-normalised embedding tagged with its space.
#[derive(Debug, Clone, PartialEq)]
pub struct Vector {
    space: EmbeddingSpace,
    values: Vec<f32>,
}

impl Vector {
    /// Wraps `values`, normalising them to unit length. A zero vector is kept
    /// as is since it has no direction to preserve.
    pub fn normalized(space: EmbeddingSpace, mut values: Vec<f32>) -> Self {
        l2_normalize(&mut values);
        Self { space, values }
    }

    pub fn space(&self) -> EmbeddingSpace { self.space }
    pub fn dim(&self) -> usize { self.values.len() }
    pub fn as_slice(&self) -> &[f32] { &self.values }
    pub fn into_values(self) -> Vec<f32> { self.values }
}

/// Normalise in place to unit L2 norm; no-op for the zero vector.
pub fn l2_normalize(values: &mut [f32]) {
    let norm = values.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for x in values.iter_mut() { *x /= norm; }
    }
}

/// Inner product of two equal-length slices.
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// A bounded slice of an article's cleaned body text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub issue: String,
    pub title: String,
    pub text: String,
    pub index: usize,
}

/// The representative image of an article.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRecord {
    pub issue: String,
    pub title: String,
    pub image_path: String,
}

/// A raw nearest-neighbour hit: index position plus cosine similarity.
///
/// `score` is clamped to `[-1, 1]`; higher is better.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchHit {
    pub position: usize,
    pub score: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalized_vector_has_unit_norm() {
        let v = Vector::normalized(EmbeddingSpace::Text, vec![3.0, 4.0]);
        assert!((v.as_slice()[0] - 0.6).abs() < 1e-6);
        assert!((v.as_slice()[1] - 0.8).abs() < 1e-6);
        assert_eq!(v.space(), EmbeddingSpace::Text);
    }

    #[test]
    fn zero_vector_stays_zero() {
        let v = Vector::normalized(EmbeddingSpace::Joint, vec![0.0; 4]);
        assert!(v.as_slice().iter().all(|x| *x == 0.0));
    }

    #[test]
    fn modality_maps_to_space() {
        assert_eq!(Modality::Text.space(), EmbeddingSpace::Text);
        assert_eq!(Modality::Image.space(), EmbeddingSpace::Joint);
        assert_eq!(EmbeddingSpace::Joint.to_string(), "joint-space");
    }
}
