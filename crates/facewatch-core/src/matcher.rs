//! Nearest-neighbor matching of a query encoding against the known set
//!
//! Pure functions over an immutable slice of known entries; safe to call
//! from any thread without synchronization.

use crate::encoding::Encoding;
use serde::{Deserialize, Serialize};

/// Default distance tolerance; smaller is stricter
pub const DEFAULT_TOLERANCE: f32 = 0.6;

/// A known face as held by a cache snapshot
#[derive(Debug, Clone)]
pub struct KnownEntry {
    pub face_id: String,
    pub label: String,
    pub encoding: Encoding,
}

/// Outcome of matching one query encoding
///
/// A non-match carries empty id/label and zero confidence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchResult {
    pub matched: bool,
    pub face_id: String,
    pub label: String,
    pub confidence: f32,
}

impl MatchResult {
    pub fn no_match() -> Self {
        Self {
            matched: false,
            face_id: String::new(),
            label: String::new(),
            confidence: 0.0,
        }
    }
}

/// Confidence derived from distance: `max(0, 1 - distance)`
///
/// Monotonically decreasing in distance; 1.0 iff the distance is zero and
/// 0.0 for any distance >= 1.
pub fn confidence_from_distance(distance: f32) -> f32 {
    (1.0 - distance).max(0.0)
}

/// Find the nearest known encoding and decide match/no-match
///
/// Computes the Euclidean distance from `query` to every entry in `known`
/// and selects the minimum. Ties are broken by first occurrence in `known`
/// order, so results are deterministic for a fixed snapshot. A match is
/// declared iff the minimum distance is within `tolerance`. An empty known
/// set is an immediate no-match.
pub fn match_encoding(query: &Encoding, known: &[KnownEntry], tolerance: f32) -> MatchResult {
    let mut best: Option<(f32, &KnownEntry)> = None;
    for entry in known {
        let distance = query.distance(&entry.encoding);
        // Strict comparison keeps the first occurrence on ties
        match best {
            Some((min, _)) if distance >= min => {}
            _ => best = Some((distance, entry)),
        }
    }

    let Some((min_distance, entry)) = best else {
        return MatchResult::no_match();
    };

    if min_distance <= tolerance {
        MatchResult {
            matched: true,
            face_id: entry.face_id.clone(),
            label: entry.label.clone(),
            confidence: confidence_from_distance(min_distance),
        }
    } else {
        MatchResult::no_match()
    }
}
