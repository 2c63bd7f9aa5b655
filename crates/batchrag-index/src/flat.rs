//! Array-backed inner-product index.
//!
//! Vectors are stored row-major in one `Vec<f32>`, so positional
//! reconstruction is a slice and subset scoring is a plain loop. Search is
//! exhaustive, which is fine for a corpus of tens of thousands of rows.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use batchrag_core::types::{dot, EmbeddingSpace, SearchHit, Vector};
use batchrag_core::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlatIndex {
    space: EmbeddingSpace,
    dim: usize,
    data: Vec<f32>,
}

impl FlatIndex {
    /// An empty index. `dim == 0` means "take the dimension of the first vector".
    pub fn new(space: EmbeddingSpace, dim: usize) -> Self {
        Self { space, dim, data: Vec::new() }
    }

    pub fn from_vectors<I>(space: EmbeddingSpace, vectors: I) -> Result<Self>
    where
        I: IntoIterator<Item = Vector>,
    {
        let mut index = Self::new(space, 0);
        for v in vectors { index.add(&v)?; }
        Ok(index)
    }

    pub fn space(&self) -> EmbeddingSpace { self.space }
    pub fn dim(&self) -> usize { self.dim }

    pub fn len(&self) -> usize {
        if self.dim == 0 { 0 } else { self.data.len() / self.dim }
    }

    pub fn is_empty(&self) -> bool { self.len() == 0 }

    /// Append a vector and return its position. The stored copy is unit-norm.
    pub fn add(&mut self, vector: &Vector) -> Result<usize> {
        if vector.space() != self.space {
            return Err(Error::SpaceMismatch { expected: self.space, actual: vector.space() });
        }
        if self.dim == 0 {
            if vector.dim() == 0 {
                return Err(Error::DimensionMismatch { expected: 1, actual: 0 });
            }
            self.dim = vector.dim();
        } else if vector.dim() != self.dim {
            return Err(Error::DimensionMismatch { expected: self.dim, actual: vector.dim() });
        }
        let position = self.len();
        let normalized = Vector::normalized(self.space, vector.as_slice().to_vec());
        self.data.extend_from_slice(normalized.as_slice());
        Ok(position)
    }

    fn row(&self, position: usize) -> &[f32] {
        &self.data[position * self.dim..(position + 1) * self.dim]
    }

    pub fn reconstruct(&self, position: usize) -> Option<Vector> {
        (position < self.len()).then(|| Vector::normalized(self.space, self.row(position).to_vec()))
    }

    fn check_dim(&self, query: &Vector) -> Result<()> {
        if query.dim() != self.dim {
            return Err(Error::DimensionMismatch { expected: self.dim, actual: query.dim() });
        }
        Ok(())
    }

    /// Top `k` positions by inner product, best first. `k` beyond the corpus
    /// size is clamped; an empty index yields no hits. Equal scores keep
    /// ascending position order.
    pub fn search(&self, query: &Vector, k: usize) -> Result<Vec<SearchHit>> {
        self.check_space(query)?;
        if self.is_empty() || k == 0 { return Ok(Vec::new()); }
        self.check_dim(query)?;
        let mut hits = self.score_positions(query, 0..self.len());
        hits.truncate(k);
        Ok(hits)
    }

    /// Rank only `positions`, best first. Hits carry the positions of this
    /// index; positions out of range are skipped.
    pub fn search_within(&self, query: &Vector, positions: &[usize]) -> Result<Vec<SearchHit>> {
        self.check_space(query)?;
        let valid: Vec<usize> = positions.iter().copied().filter(|p| *p < self.len()).collect();
        if valid.is_empty() { return Ok(Vec::new()); }
        self.check_dim(query)?;
        Ok(self.score_positions(query, valid))
    }

    /// A fresh index holding copies of `positions`, in the given order.
    pub fn subset(&self, positions: &[usize]) -> FlatIndex {
        let mut out = FlatIndex::new(self.space, self.dim);
        for &p in positions.iter().filter(|p| **p < self.len()) {
            out.data.extend_from_slice(self.row(p));
        }
        out
    }

    fn check_space(&self, query: &Vector) -> Result<()> {
        if query.space() != self.space {
            return Err(Error::SpaceMismatch { expected: self.space, actual: query.space() });
        }
        Ok(())
    }

    fn score_positions<I: IntoIterator<Item = usize>>(&self, query: &Vector, positions: I) -> Vec<SearchHit> {
        let q = query.as_slice();
        let mut hits: Vec<SearchHit> = positions
            .into_iter()
            .map(|position| SearchHit { position, score: dot(self.row(position), q).clamp(-1.0, 1.0) })
            .collect();
        // stable: ties stay in position order
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() { fs::create_dir_all(parent)?; }
        fs::write(path, bincode::serialize(self)?)?;
        Ok(())
    }

    /// Load and check the structural invariants of an index file.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::NotFound(format!("index file {}", path.display())));
        }
        let bytes = fs::read(path)?;
        let index: FlatIndex = bincode::deserialize(&bytes)
            .map_err(|e| Error::MalformedState(format!("{}: {}", path.display(), e)))?;
        if index.dim == 0 && !index.data.is_empty() {
            return Err(Error::MalformedState(format!("{}: vectors without a dimension", path.display())));
        }
        if index.dim > 0 && index.data.len() % index.dim != 0 {
            return Err(Error::MalformedState(format!(
                "{}: {} floats is not a multiple of dimension {}",
                path.display(),
                index.data.len(),
                index.dim
            )));
        }
        if index.data.iter().any(|x| !x.is_finite()) {
            return Err(Error::MalformedState(format!("{}: non-finite vector values", path.display())));
        }
        Ok(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(values: &[f32]) -> Vector {
        Vector::normalized(EmbeddingSpace::Text, values.to_vec())
    }

    fn sample() -> FlatIndex {
        FlatIndex::from_vectors(EmbeddingSpace::Text, vec![v(&[1.0, 0.0]), v(&[0.0, 1.0]), v(&[1.0, 1.0])]).unwrap()
    }

    #[test]
    fn search_orders_by_similarity_and_clamps_k() {
        let index = sample();
        let hits = index.search(&v(&[1.0, 0.1]), 10).unwrap();
        assert_eq!(hits.len(), 3);
        assert_eq!(hits.iter().map(|h| h.position).collect::<Vec<_>>(), vec![0, 2, 1]);
        assert!(hits.iter().all(|h| (-1.0..=1.0).contains(&h.score)));
        assert!(index.search(&v(&[1.0, 0.0]), 0).unwrap().is_empty());
    }

    #[test]
    fn empty_index_returns_nothing() {
        let index = FlatIndex::new(EmbeddingSpace::Text, 0);
        assert!(index.search(&v(&[1.0, 0.0, 0.0]), 5).unwrap().is_empty());
    }

    #[test]
    fn ties_keep_position_order() {
        let index = FlatIndex::from_vectors(EmbeddingSpace::Text, vec![v(&[1.0, 0.0]), v(&[0.0, 1.0]), v(&[1.0, 0.0])]).unwrap();
        let hits = index.search(&v(&[1.0, 0.0]), 3).unwrap();
        assert_eq!(hits[0].position, 0);
        assert_eq!(hits[1].position, 2);
    }

    #[test]
    fn wrong_space_and_dimension_are_rejected() {
        let index = sample();
        let joint = Vector::normalized(EmbeddingSpace::Joint, vec![1.0, 0.0]);
        assert!(matches!(index.search(&joint, 1), Err(Error::SpaceMismatch { .. })));
        assert!(matches!(index.search(&v(&[1.0, 0.0, 0.0]), 1), Err(Error::DimensionMismatch { .. })));
    }

    #[test]
    fn reconstruct_and_subset() {
        let index = sample();
        let r = index.reconstruct(2).unwrap();
        assert!((r.as_slice()[0] - std::f32::consts::FRAC_1_SQRT_2).abs() < 1e-6);
        assert!(index.reconstruct(3).is_none());

        let sub = index.subset(&[2, 1, 9]);
        assert_eq!(sub.len(), 2);
        assert_eq!(sub.reconstruct(0), index.reconstruct(2));
        let hits = sub.search(&v(&[0.0, 1.0]), 5).unwrap();
        assert_eq!(hits[0].position, 1, "positions are local to the subset");
    }

    #[test]
    fn search_within_keeps_global_positions() {
        let index = sample();
        let hits = index.search_within(&v(&[0.0, 1.0]), &[0, 2, 7]).unwrap();
        assert_eq!(hits.iter().map(|h| h.position).collect::<Vec<_>>(), vec![2, 0]);
        assert!(index.search_within(&v(&[0.0, 1.0]), &[]).unwrap().is_empty());
    }

    #[test]
    fn load_rejects_non_finite_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nan.index");
        let index = FlatIndex { space: EmbeddingSpace::Text, dim: 2, data: vec![1.0, 0.0, f32::NAN, 0.0] };
        index.save(&path).unwrap();
        assert!(matches!(FlatIndex::load(&path), Err(Error::MalformedState(_))));

        sample().save(&path).unwrap();
        assert_eq!(FlatIndex::load(&path).unwrap().len(), 3);
    }
}
