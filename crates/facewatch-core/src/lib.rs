//! facewatch-core: Core library for facewatch face matching
//!
//! This crate provides:
//! - Fixed-length face encodings with Euclidean distance
//! - Nearest-neighbor matching under a distance tolerance
//! - SQLite storage for known faces and recognition logs
//! - An invalidate-on-write snapshot cache of the known-face set
//! - The recognition service that ties extraction, matching, and store
//!   side effects together
//!
//! Face detection and encoding extraction are external: callers supply an
//! [`EncodingExtractor`] implementation backed by whatever vision engine
//! the deployment uses.

pub mod cache;
pub mod encoding;
pub mod error;
pub mod extractor;
pub mod matcher;
pub mod recognizer;
pub mod store;

// Re-exports for convenience
pub use cache::{CacheSnapshot, KnownFaceCache};
pub use encoding::{Encoding, ENCODING_DIM};
pub use error::FaceError;
pub use extractor::EncodingExtractor;
pub use matcher::{match_encoding, KnownEntry, MatchResult, DEFAULT_TOLERANCE};
pub use recognizer::{generate_face_id, Recognizer};
pub use store::{now_timestamp, FaceStore, KnownFace, RecognitionLogEntry, SqliteStore};
