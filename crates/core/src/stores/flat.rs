use crate::traits::{Neighbor, VectorIndex};
use crate::SearchError;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

const MAGIC: &[u8; 8] = b"PDFRFLAT";
const HEADER_LEN: usize = MAGIC.len() + 4 + 8;

/// Exhaustive L2 index over row-major `f32` vectors.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatL2Index {
    dimension: usize,
    data: Vec<f32>,
}

impl FlatL2Index {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            data: Vec::new(),
        }
    }

    pub fn load(path: &Path) -> Result<Self, SearchError> {
        let bytes = std::fs::read(path)?;
        Self::decode(&bytes)
    }

    fn vector(&self, position: usize) -> &[f32] {
        let start = position * self.dimension;
        &self.data[start..start + self.dimension]
    }

    fn check_dimension(&self, actual: usize) -> Result<(), SearchError> {
        if actual != self.dimension {
            return Err(SearchError::DimensionMismatch {
                expected: self.dimension,
                actual,
            });
        }
        Ok(())
    }

    fn encode(&self, writer: &mut impl Write) -> std::io::Result<()> {
        writer.write_all(MAGIC)?;
        writer.write_all(&(self.dimension as u32).to_le_bytes())?;
        writer.write_all(&(self.len() as u64).to_le_bytes())?;
        for value in &self.data {
            writer.write_all(&value.to_le_bytes())?;
        }
        Ok(())
    }

    fn decode(bytes: &[u8]) -> Result<Self, SearchError> {
        if bytes.len() < HEADER_LEN || &bytes[..MAGIC.len()] != MAGIC {
            return Err(SearchError::IndexFormat("missing index header".to_string()));
        }

        let mut dimension_bytes = [0u8; 4];
        dimension_bytes.copy_from_slice(&bytes[8..12]);
        let mut count_bytes = [0u8; 8];
        count_bytes.copy_from_slice(&bytes[12..20]);

        let dimension = u32::from_le_bytes(dimension_bytes) as usize;
        let count = usize::try_from(u64::from_le_bytes(count_bytes))
            .map_err(|_| SearchError::IndexFormat("vector count overflows".to_string()))?;

        let expected_len = count
            .checked_mul(dimension)
            .and_then(|values| values.checked_mul(std::mem::size_of::<f32>()))
            .ok_or_else(|| SearchError::IndexFormat("vector payload overflows".to_string()))?;

        let payload = &bytes[HEADER_LEN..];
        if payload.len() != expected_len {
            return Err(SearchError::IndexFormat(format!(
                "expected {expected_len} payload bytes for {count} x {dimension}, found {}",
                payload.len()
            )));
        }

        let data = payload
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect();

        Ok(Self { dimension, data })
    }
}

impl VectorIndex for FlatL2Index {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn len(&self) -> usize {
        if self.dimension == 0 {
            0
        } else {
            self.data.len() / self.dimension
        }
    }

    fn add(&mut self, vectors: &[Vec<f32>]) -> Result<(), SearchError> {
        for vector in vectors {
            self.check_dimension(vector.len())?;
        }

        self.data.reserve(vectors.len() * self.dimension);
        for vector in vectors {
            self.data.extend_from_slice(vector);
        }

        Ok(())
    }

    /// Distances are squared Euclidean; ties keep insertion order.
    fn search(&self, query_vector: &[f32], k: usize) -> Result<Vec<Neighbor>, SearchError> {
        self.check_dimension(query_vector.len())?;

        let mut neighbors: Vec<Neighbor> = (0..self.len())
            .map(|position| Neighbor {
                position,
                distance: squared_l2(query_vector, self.vector(position)),
            })
            .collect();

        neighbors.sort_by(|left, right| {
            left.distance
                .total_cmp(&right.distance)
                .then(left.position.cmp(&right.position))
        });
        neighbors.truncate(k);

        Ok(neighbors)
    }

    fn save(&self, path: &Path) -> Result<(), SearchError> {
        let mut writer = BufWriter::new(File::create(path)?);
        self.encode(&mut writer)?;
        writer.flush()?;
        Ok(())
    }
}

fn squared_l2(left: &[f32], right: &[f32]) -> f32 {
    left.iter()
        .zip(right)
        .map(|(a, b)| {
            let diff = a - b;
            diff * diff
        })
        .sum()
}
