use crate::SearchError;
use std::path::Path;

/// One search hit: the insertion position of the stored vector and its distance to the query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub position: usize,
    pub distance: f32,
}

pub trait VectorIndex {
    fn dimension(&self) -> usize;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Appends vectors after the ones already stored, keeping their order.
    fn add(&mut self, vectors: &[Vec<f32>]) -> Result<(), SearchError>;

    /// Up to `k` nearest stored vectors, closest first.
    fn search(&self, query_vector: &[f32], k: usize) -> Result<Vec<Neighbor>, SearchError>;

    fn save(&self, path: &Path) -> Result<(), SearchError>;
}
