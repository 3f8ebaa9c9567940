//! Invalidate-on-write snapshot cache of the known-face set
//!
//! Readers share immutable `Arc<CacheSnapshot>` handles, so a snapshot is
//! either fully published or not visible at all. `invalidate()` only bumps
//! an atomic generation counter and never blocks, even while a rebuild is
//! in flight. The slot mutex is held across a rebuild, so at most one
//! rebuild runs at a time; concurrent readers wait for it rather than
//! seeing partial state.

use crate::matcher::KnownEntry;
use crate::store::FaceStore;
use anyhow::Result;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

/// Immutable point-in-time copy of the known-face set
///
/// Entries are ordered by insertion (store rowid), which fixes the
/// matcher's tie-break order for a given snapshot.
#[derive(Debug, Default)]
pub struct CacheSnapshot {
    pub entries: Vec<KnownEntry>,
}

struct Slot {
    snapshot: Arc<CacheSnapshot>,
    /// Generation the snapshot was built against; stale when it trails
    /// the cache generation
    built_generation: u64,
}

/// Lazily rebuilt, read-mostly cache over a [`FaceStore`]
///
/// Training writes call [`KnownFaceCache::invalidate`]; the next
/// [`KnownFaceCache::snapshot`] reloads the full set from the store.
/// There is no eviction: the trained set is expected to stay small.
pub struct KnownFaceCache {
    store: Arc<dyn FaceStore>,
    generation: AtomicU64,
    slot: Mutex<Slot>,
}

impl KnownFaceCache {
    pub fn new(store: Arc<dyn FaceStore>) -> Self {
        Self {
            store,
            // Start one generation ahead of the empty slot so the first
            // read rebuilds
            generation: AtomicU64::new(1),
            slot: Mutex::new(Slot {
                snapshot: Arc::new(CacheSnapshot::default()),
                built_generation: 0,
            }),
        }
    }

    /// Mark the cached snapshot stale; never blocks
    pub fn invalidate(&self) {
        self.generation.fetch_add(1, Ordering::Release);
    }

    /// Current snapshot, rebuilding from the store if stale
    ///
    /// A write committed before an `invalidate()` is always visible to the
    /// next `snapshot()` call: the rebuild reads its target generation
    /// before touching the store, so a racing invalidate leaves the
    /// published snapshot stale and forces another rebuild.
    pub fn snapshot(&self) -> Result<Arc<CacheSnapshot>> {
        let mut slot = self.lock_slot();
        let target = self.generation.load(Ordering::Acquire);
        if slot.built_generation == target {
            return Ok(slot.snapshot.clone());
        }

        let faces = self.store.list_known_faces()?;
        let entries = faces
            .into_iter()
            .map(|face| KnownEntry {
                face_id: face.face_id,
                label: face.label,
                encoding: face.encoding,
            })
            .collect::<Vec<_>>();
        debug!(entries = entries.len(), "Rebuilt known-face cache");

        let snapshot = Arc::new(CacheSnapshot { entries });
        slot.snapshot = snapshot.clone();
        slot.built_generation = target;
        Ok(snapshot)
    }

    // Snapshots are replaced wholesale, so a poisoned lock still holds a
    // complete snapshot
    fn lock_slot(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
