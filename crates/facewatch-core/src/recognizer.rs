//! Recognition service: extraction -> cache -> matcher -> side effects

use crate::cache::KnownFaceCache;
use crate::error::FaceError;
use crate::extractor::EncodingExtractor;
use crate::matcher::{match_encoding, MatchResult};
use crate::store::{now_timestamp, FaceStore};
use std::sync::Arc;
use tracing::{debug, warn};

/// Orchestrates recognition and training against one store
///
/// Safe to share across threads: the capture worker and request handlers
/// call `recognize` concurrently while `train` runs elsewhere.
pub struct Recognizer {
    extractor: Arc<dyn EncodingExtractor>,
    store: Arc<dyn FaceStore>,
    cache: Arc<KnownFaceCache>,
}

impl Recognizer {
    pub fn new(extractor: Arc<dyn EncodingExtractor>, store: Arc<dyn FaceStore>) -> Self {
        let cache = Arc::new(KnownFaceCache::new(store.clone()));
        Self {
            extractor,
            store,
            cache,
        }
    }

    pub fn store(&self) -> &Arc<dyn FaceStore> {
        &self.store
    }

    pub fn cache(&self) -> &Arc<KnownFaceCache> {
        &self.cache
    }

    /// Recognize faces in an image
    ///
    /// Returns one [`MatchResult`] per detected face, in extractor output
    /// order. Zero detected faces or an empty trained set yield an empty
    /// result, not an error. Each match updates `last_seen` and appends a
    /// recognition-log row; those writes are independent and best-effort:
    /// a failed write is logged and the remaining faces still get
    /// processed.
    pub fn recognize(&self, image: &[u8], tolerance: f32) -> Result<Vec<MatchResult>, FaceError> {
        let encodings = self.extractor.extract(image)?;
        if encodings.is_empty() {
            return Ok(Vec::new());
        }

        let snapshot = self.cache.snapshot().map_err(FaceError::Store)?;
        if snapshot.entries.is_empty() {
            return Ok(Vec::new());
        }

        let now = now_timestamp();
        let mut results = Vec::with_capacity(encodings.len());
        for encoding in &encodings {
            let result = match_encoding(encoding, &snapshot.entries, tolerance);
            if result.matched {
                debug!(
                    face_id = %result.face_id,
                    confidence = result.confidence,
                    "Recognized face"
                );
                if let Err(err) = self.store.update_last_seen(&result.face_id, now) {
                    warn!(face_id = %result.face_id, error = %err, "Failed to update last_seen");
                }
                if let Err(err) = self.store.append_recognition_log(
                    &result.face_id,
                    &result.label,
                    result.confidence,
                    now,
                ) {
                    warn!(face_id = %result.face_id, error = %err, "Failed to append recognition log");
                }
            }
            results.push(result);
        }
        Ok(results)
    }

    /// Train a new face from an image containing exactly one face
    ///
    /// When `requested_id` is absent an id is derived from the label (see
    /// [`generate_face_id`]). Returns the assigned id. Rejects images with
    /// zero or multiple faces and ids that already exist; nothing is
    /// written in those cases.
    pub fn train(
        &self,
        image: &[u8],
        label: &str,
        requested_id: Option<&str>,
    ) -> Result<String, FaceError> {
        let encodings = self.extractor.extract(image)?;
        let encoding = match encodings.len() {
            0 => return Err(FaceError::NoFaceDetected),
            1 => &encodings[0],
            _ => return Err(FaceError::AmbiguousInput),
        };

        let face_id = match requested_id {
            Some(id) => id.to_string(),
            None => {
                let existing = self
                    .store
                    .list_known_faces()?
                    .into_iter()
                    .map(|face| face.face_id)
                    .collect::<Vec<_>>();
                generate_face_id(label, &existing)
            }
        };

        if self.store.get_known_face(&face_id)?.is_some() {
            return Err(FaceError::DuplicateId(face_id));
        }

        self.store.insert_known_face(&face_id, label, encoding)?;
        self.cache.invalidate();
        debug!(face_id = %face_id, label = %label, "Trained new face");
        Ok(face_id)
    }

    /// Remove a trained face; returns whether it existed
    pub fn remove_face(&self, face_id: &str) -> Result<bool, FaceError> {
        let removed = self.store.delete_known_face(face_id)?;
        if removed {
            self.cache.invalidate();
        }
        Ok(removed)
    }

    /// Rename a trained face; returns whether it existed
    pub fn rename_face(&self, face_id: &str, new_label: &str) -> Result<bool, FaceError> {
        let renamed = self.store.update_label(face_id, new_label)?;
        if renamed {
            self.cache.invalidate();
        }
        Ok(renamed)
    }
}

/// Derive a face id from a label
///
/// Lowercases and replaces spaces with underscores; on collision appends a
/// zero-padded numeric suffix starting at `_001`, incrementing until the
/// id is free.
pub fn generate_face_id(label: &str, existing: &[String]) -> String {
    let base = label.to_lowercase().replace(' ', "_");
    let mut face_id = base.clone();
    let mut counter = 1;
    while existing.iter().any(|id| *id == face_id) {
        face_id = format!("{base}_{counter:03}");
        counter += 1;
    }
    face_id
}
