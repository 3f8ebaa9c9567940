//! Error taxonomy for recognition and training

use thiserror::Error;

/// Typed failures surfaced to callers
///
/// Store I/O failures inside `recognize` side effects are logged and do not
/// surface here; see [`crate::recognizer::Recognizer::recognize`].
#[derive(Debug, Error)]
pub enum FaceError {
    #[error("no face detected in image")]
    NoFaceDetected,

    #[error("multiple faces detected in image; training requires exactly one")]
    AmbiguousInput,

    #[error("face id '{0}' already exists")]
    DuplicateId(String),

    #[error("extraction engine unavailable: {0}")]
    ExtractionUnavailable(String),

    #[error("capture device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("store error: {0}")]
    Store(anyhow::Error),
}

impl From<anyhow::Error> for FaceError {
    fn from(err: anyhow::Error) -> Self {
        FaceError::Store(err)
    }
}
