//! SQLite storage for known faces and recognition logs
//!
//! Schema:
//! - known_faces: face_id, label, encoding blob, created_at, last_seen
//! - recognition_logs: face_id, label, confidence, timestamp
//!
//! Every operation is individually atomic; the engine does not rely on
//! cross-operation transactions.

use crate::encoding::Encoding;
use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};

const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS known_faces (
    id INTEGER PRIMARY KEY,
    face_id TEXT NOT NULL UNIQUE,
    label TEXT NOT NULL,
    encoding BLOB NOT NULL,
    created_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now')),
    last_seen INTEGER
);

CREATE TABLE IF NOT EXISTS recognition_logs (
    id INTEGER PRIMARY KEY,
    face_id TEXT NOT NULL,
    label TEXT NOT NULL,
    confidence REAL NOT NULL,
    timestamp INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_known_faces_face_id ON known_faces(face_id);
CREATE INDEX IF NOT EXISTS idx_known_faces_label ON known_faces(label);
CREATE INDEX IF NOT EXISTS idx_logs_face_id ON recognition_logs(face_id);
CREATE INDEX IF NOT EXISTS idx_logs_timestamp ON recognition_logs(timestamp);
CREATE INDEX IF NOT EXISTS idx_logs_face_timestamp ON recognition_logs(face_id, timestamp);
";

/// Current unix timestamp in seconds
pub fn now_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// A trained face as persisted in the store
#[derive(Debug, Clone)]
pub struct KnownFace {
    pub face_id: String,
    pub label: String,
    pub encoding: Encoding,
    pub created_at: i64,
    pub last_seen: Option<i64>,
}

/// One recognition-log row
#[derive(Debug, Clone)]
pub struct RecognitionLogEntry {
    pub face_id: String,
    pub label: String,
    pub confidence: f32,
    pub timestamp: i64,
}

/// Persistence contract consumed by the engine
///
/// Implementations must be safe to share across the capture worker and
/// request threads; each operation is individually atomic.
pub trait FaceStore: Send + Sync {
    /// All trained faces, in insertion order
    fn list_known_faces(&self) -> Result<Vec<KnownFace>>;

    fn get_known_face(&self, face_id: &str) -> Result<Option<KnownFace>>;

    /// Insert a new trained face; fails if `face_id` already exists
    fn insert_known_face(&self, face_id: &str, label: &str, encoding: &Encoding) -> Result<()>;

    fn update_last_seen(&self, face_id: &str, timestamp: i64) -> Result<()>;

    fn append_recognition_log(
        &self,
        face_id: &str,
        label: &str,
        confidence: f32,
        timestamp: i64,
    ) -> Result<()>;

    fn count_known_faces(&self) -> Result<usize>;

    /// Delete a trained face; returns whether a row was removed
    fn delete_known_face(&self, face_id: &str) -> Result<bool>;

    /// Rename a trained face; returns whether a row was updated
    fn update_label(&self, face_id: &str, new_label: &str) -> Result<bool>;

    /// Recognition history, newest first, optionally filtered by face id
    fn recognition_history(
        &self,
        face_id: Option<&str>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<RecognitionLogEntry>>;

    /// Delete log rows older than `cutoff`; returns the number removed
    fn cleanup_old_logs(&self, cutoff: i64) -> Result<usize>;
}

/// SQLite-backed store
///
/// The connection is guarded by a mutex so one store instance can be
/// shared between the capture worker and request threads.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create the database at `path`
    pub fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;

        // Foreign keys and WAL mode for concurrent readers
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )?;

        conn.execute_batch(SCHEMA)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (for testing)
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    // Each statement is atomic, so a poisoned lock leaves no partial state
    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl FaceStore for SqliteStore {
    fn list_known_faces(&self) -> Result<Vec<KnownFace>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT face_id, label, encoding, created_at, last_seen
             FROM known_faces ORDER BY id",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Vec<u8>>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, Option<i64>>(4)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter()
            .map(|(face_id, label, blob, created_at, last_seen)| {
                let encoding = Encoding::from_blob(&blob)
                    .with_context(|| format!("Corrupt encoding for face '{face_id}'"))?;
                Ok(KnownFace {
                    face_id,
                    label,
                    encoding,
                    created_at,
                    last_seen,
                })
            })
            .collect()
    }

    fn get_known_face(&self, face_id: &str) -> Result<Option<KnownFace>> {
        let conn = self.lock();
        let row = conn
            .query_row(
                "SELECT face_id, label, encoding, created_at, last_seen
                 FROM known_faces WHERE face_id = ?1",
                params![face_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Vec<u8>>(2)?,
                        row.get::<_, i64>(3)?,
                        row.get::<_, Option<i64>>(4)?,
                    ))
                },
            )
            .optional()?;

        match row {
            None => Ok(None),
            Some((face_id, label, blob, created_at, last_seen)) => {
                let encoding = Encoding::from_blob(&blob)
                    .with_context(|| format!("Corrupt encoding for face '{face_id}'"))?;
                Ok(Some(KnownFace {
                    face_id,
                    label,
                    encoding,
                    created_at,
                    last_seen,
                }))
            }
        }
    }

    fn insert_known_face(&self, face_id: &str, label: &str, encoding: &Encoding) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO known_faces (face_id, label, encoding) VALUES (?1, ?2, ?3)",
            params![face_id, label, encoding.to_blob()],
        )
        .with_context(|| format!("Failed to insert face '{face_id}'"))?;
        Ok(())
    }

    fn update_last_seen(&self, face_id: &str, timestamp: i64) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "UPDATE known_faces SET last_seen = ?1 WHERE face_id = ?2",
            params![timestamp, face_id],
        )?;
        Ok(())
    }

    fn append_recognition_log(
        &self,
        face_id: &str,
        label: &str,
        confidence: f32,
        timestamp: i64,
    ) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO recognition_logs (face_id, label, confidence, timestamp)
             VALUES (?1, ?2, ?3, ?4)",
            params![face_id, label, confidence, timestamp],
        )?;
        Ok(())
    }

    fn count_known_faces(&self) -> Result<usize> {
        let conn = self.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM known_faces", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn delete_known_face(&self, face_id: &str) -> Result<bool> {
        let conn = self.lock();
        let changed = conn.execute(
            "DELETE FROM known_faces WHERE face_id = ?1",
            params![face_id],
        )?;
        Ok(changed > 0)
    }

    fn update_label(&self, face_id: &str, new_label: &str) -> Result<bool> {
        let conn = self.lock();
        let changed = conn.execute(
            "UPDATE known_faces SET label = ?1 WHERE face_id = ?2",
            params![new_label, face_id],
        )?;
        Ok(changed > 0)
    }

    fn recognition_history(
        &self,
        face_id: Option<&str>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<RecognitionLogEntry>> {
        let conn = self.lock();
        let map_row = |row: &rusqlite::Row<'_>| {
            Ok(RecognitionLogEntry {
                face_id: row.get(0)?,
                label: row.get(1)?,
                confidence: row.get(2)?,
                timestamp: row.get(3)?,
            })
        };

        let entries = match face_id {
            Some(id) => {
                let mut stmt = conn.prepare(
                    "SELECT face_id, label, confidence, timestamp FROM recognition_logs
                     WHERE face_id = ?1 ORDER BY timestamp DESC, id DESC LIMIT ?2 OFFSET ?3",
                )?;
                let rows = stmt
                    .query_map(params![id, limit as i64, offset as i64], map_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                rows
            }
            None => {
                let mut stmt = conn.prepare(
                    "SELECT face_id, label, confidence, timestamp FROM recognition_logs
                     ORDER BY timestamp DESC, id DESC LIMIT ?1 OFFSET ?2",
                )?;
                let rows = stmt
                    .query_map(params![limit as i64, offset as i64], map_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                rows
            }
        };
        Ok(entries)
    }

    fn cleanup_old_logs(&self, cutoff: i64) -> Result<usize> {
        let conn = self.lock();
        let deleted = conn.execute(
            "DELETE FROM recognition_logs WHERE timestamp < ?1",
            params![cutoff],
        )?;
        Ok(deleted)
    }
}
