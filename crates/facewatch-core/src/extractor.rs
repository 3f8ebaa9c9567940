//! Seam for the external encoding extraction engine

use crate::encoding::{Encoding, ENCODING_DIM};
use crate::error::FaceError;

/// Trait for face encoding extraction backends
///
/// Implementations wrap whatever vision engine the deployment uses. Given
/// identical image bytes and model version the output must be
/// deterministic: the same encodings in the same order. Zero detected
/// faces is a normal outcome, not an error; return
/// [`FaceError::ExtractionUnavailable`] when the underlying engine is
/// missing or misconfigured.
pub trait EncodingExtractor: Send + Sync {
    /// Extract one encoding per face detected in the image
    fn extract(&self, image: &[u8]) -> Result<Vec<Encoding>, FaceError>;

    /// Dimension of the encodings this extractor produces
    fn encoding_dim(&self) -> usize {
        ENCODING_DIM
    }
}
