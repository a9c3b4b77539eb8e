//! In-memory HNSW-class ANN index over 128-D L2-normalized embeddings,
//! backed by `usearch`. Grounded directly on the teacher's
//! `search/vector.rs` `VectorIndex` wrapper, reconfigured to the
//! capsule embedding width (128 dims, cosine metric) instead of the
//! teacher's matryoshka-truncated 256.

use crate::capsule::EMBEDDING_DIM;
use thiserror::Error;
use usearch::{Index, IndexOptions, MetricKind, ScalarKind};

#[derive(Debug, Error)]
pub enum AnnError {
    #[error("usearch error: {0}")]
    Backend(String),
    #[error("embedding dimension mismatch: expected {expected}, got {got}")]
    DimMismatch { expected: usize, got: usize },
}

#[derive(Debug, Clone)]
pub struct AnnConfig {
    pub dimensions: usize,
    pub connectivity: usize,
    pub expansion_add: usize,
    pub expansion_search: usize,
}

impl Default for AnnConfig {
    fn default() -> Self {
        Self {
            dimensions: EMBEDDING_DIM,
            connectivity: 16,
            expansion_add: 128,
            expansion_search: 64,
        }
    }
}

pub struct AnnIndex {
    index: Index,
    config: AnnConfig,
}

impl AnnIndex {
    pub fn new(config: AnnConfig) -> Result<Self, AnnError> {
        let options = IndexOptions {
            dimensions: config.dimensions,
            metric: MetricKind::Cos,
            quantization: ScalarKind::F32,
            connectivity: config.connectivity,
            expansion_add: config.expansion_add,
            expansion_search: config.expansion_search,
            multi: false,
        };
        let index = Index::new(&options).map_err(|e| AnnError::Backend(e.to_string()))?;
        index.reserve(1024).map_err(|e| AnnError::Backend(e.to_string()))?;
        Ok(Self { index, config })
    }

    pub fn add(&mut self, label: u64, embedding: &[f32]) -> Result<(), AnnError> {
        if embedding.len() != self.config.dimensions {
            return Err(AnnError::DimMismatch {
                expected: self.config.dimensions,
                got: embedding.len(),
            });
        }
        if self.index.size() + 1 > self.index.capacity() {
            self.index
                .reserve(self.index.capacity() * 2 + 16)
                .map_err(|e| AnnError::Backend(e.to_string()))?;
        }
        self.index.add(label, embedding).map_err(|e| AnnError::Backend(e.to_string()))
    }

    pub fn remove(&mut self, label: u64) -> Result<(), AnnError> {
        self.index.remove(label).map_err(|e| AnnError::Backend(e.to_string()))?;
        Ok(())
    }

    pub fn contains(&self, label: u64) -> bool {
        self.index.contains(label)
    }

    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(u64, f32)>, AnnError> {
        if query.len() != self.config.dimensions {
            return Err(AnnError::DimMismatch {
                expected: self.config.dimensions,
                got: query.len(),
            });
        }
        let matches = self.index.search(query, k).map_err(|e| AnnError::Backend(e.to_string()))?;
        Ok(matches.keys.into_iter().zip(matches.distances).collect())
    }

    pub fn len(&self) -> usize {
        self.index.size()
    }

    pub fn is_empty(&self) -> bool {
        self.index.size() == 0
    }

    pub fn save(&self, path: &std::path::Path) -> Result<(), AnnError> {
        self.index
            .save(path.to_str().ok_or_else(|| AnnError::Backend("non-utf8 path".into()))?)
            .map_err(|e| AnnError::Backend(e.to_string()))
    }

    pub fn load(path: &std::path::Path, config: AnnConfig) -> Result<Self, AnnError> {
        let mut index = Self::new(config)?;
        index
            .index
            .load(path.to_str().ok_or_else(|| AnnError::Backend("non-utf8 path".into()))?)
            .map_err(|e| AnnError::Backend(e.to_string()))?;
        Ok(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(i: usize) -> Vec<f32> {
        let mut v = vec![0.0f32; EMBEDDING_DIM];
        v[i % EMBEDDING_DIM] = 1.0;
        v
    }

    #[test]
    fn add_then_search_returns_self_as_nearest() {
        let mut idx = AnnIndex::new(AnnConfig::default()).unwrap();
        idx.add(1, &unit(0)).unwrap();
        idx.add(2, &unit(1)).unwrap();
        let results = idx.search(&unit(0), 1).unwrap();
        assert_eq!(results[0].0, 1);
    }

    #[test]
    fn dim_mismatch_is_rejected() {
        let mut idx = AnnIndex::new(AnnConfig::default()).unwrap();
        let bad = vec![0.0f32; EMBEDDING_DIM - 1];
        assert!(idx.add(1, &bad).is_err());
    }

    #[test]
    fn remove_drops_membership() {
        let mut idx = AnnIndex::new(AnnConfig::default()).unwrap();
        idx.add(1, &unit(0)).unwrap();
        assert!(idx.contains(1));
        idx.remove(1).unwrap();
        assert!(!idx.contains(1));
    }
}
