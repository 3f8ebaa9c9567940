//! Face encoding vectors
//!
//! An encoding is a fixed-length f32 vector produced by the external
//! extraction engine (128 dimensions for the reference models). Encodings
//! are immutable once produced and are persisted as little-endian f32
//! BLOBs.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// Encoding dimension produced by the reference extraction models
pub const ENCODING_DIM: usize = 128;

/// A face encoding: a fixed-length real-valued vector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Encoding {
    data: Vec<f32>,
}

impl Encoding {
    pub fn new(data: Vec<f32>) -> Self {
        Self { data }
    }

    pub fn dim(&self) -> usize {
        self.data.len()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Euclidean distance to another encoding
    ///
    /// Both encodings must come from the same extraction model, which
    /// fixes the dimension.
    pub fn distance(&self, other: &Encoding) -> f32 {
        debug_assert_eq!(self.dim(), other.dim());
        self.data
            .iter()
            .zip(other.data.iter())
            .map(|(a, b)| {
                let d = a - b;
                d * d
            })
            .sum::<f32>()
            .sqrt()
    }

    /// Serialize to a little-endian f32 blob for storage
    pub fn to_blob(&self) -> Vec<u8> {
        let mut blob = Vec::with_capacity(self.data.len() * 4);
        for value in &self.data {
            blob.extend_from_slice(&value.to_le_bytes());
        }
        blob
    }

    /// Deserialize from a little-endian f32 blob
    pub fn from_blob(blob: &[u8]) -> Result<Self> {
        if blob.len() % 4 != 0 {
            bail!("encoding blob length {} is not a multiple of 4", blob.len());
        }
        let data = blob
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect();
        Ok(Self { data })
    }
}
