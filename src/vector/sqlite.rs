//! SQLite-backed vector store.
//!
//! Points live in one table per database with payload JSON and the
//! embedding as a little-endian f32 BLOB. Dense queries are a cosine scan
//! over leaf points; collections here are per-corpus, not web-scale.

use crate::embedding::cosine_similarity;
use crate::error::{ConsistencyError, Result, StoreError};
use crate::vector::{Filter, Point, PointPayload, ScoredPoint, VectorStore};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// SQL schema for the vector store.
const SCHEMA_SQL: &str = r"
CREATE TABLE IF NOT EXISTS collection_info (
    name TEXT PRIMARY KEY,
    dim INTEGER NOT NULL,
    created_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS points (
    id TEXT PRIMARY KEY,
    document_name TEXT NOT NULL,
    level INTEGER NOT NULL,
    payload TEXT NOT NULL,
    embedding BLOB
);

CREATE INDEX IF NOT EXISTS idx_points_document ON points(document_name);
CREATE INDEX IF NOT EXISTS idx_points_level ON points(level);
";

/// SQLite implementation of [`VectorStore`].
pub struct SqliteVectorStore {
    conn: Connection,
    collection: String,
    path: Option<PathBuf>,
}

impl SqliteVectorStore {
    /// Opens or creates the store at the given path.
    pub fn open<P: AsRef<Path>>(path: P, collection: &str) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StoreError::Database(e.to_string()))?;
            }
        }
        let conn = Connection::open(&path).map_err(StoreError::from)?;
        let _: String = conn
            .query_row("PRAGMA journal_mode = WAL;", [], |row| row.get(0))
            .map_err(StoreError::from)?;
        conn.execute_batch(SCHEMA_SQL).map_err(StoreError::from)?;
        Ok(Self {
            conn,
            collection: collection.to_string(),
            path: Some(path),
        })
    }

    /// Creates an in-memory store, for tests.
    pub fn in_memory(collection: &str) -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(StoreError::from)?;
        conn.execute_batch(SCHEMA_SQL).map_err(StoreError::from)?;
        Ok(Self {
            conn,
            collection: collection.to_string(),
            path: None,
        })
    }

    /// Returns the database path (None for in-memory).
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Collection dimension, if the collection exists.
    pub fn dimension(&self) -> Result<Option<usize>> {
        let dim: Option<i64> = self
            .conn
            .query_row(
                "SELECT dim FROM collection_info WHERE name = ?",
                params![self.collection],
                |row| row.get(0),
            )
            .optional()
            .map_err(StoreError::from)?;
        #[allow(clippy::cast_sign_loss)]
        Ok(dim.map(|d| d as usize))
    }

    fn require_dimension(&self) -> Result<usize> {
        self.dimension()?.ok_or_else(|| {
            StoreError::CollectionNotFound {
                name: self.collection.clone(),
            }
            .into()
        })
    }

    /// Names of all documents with at least one point.
    pub fn document_names(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT document_name FROM points ORDER BY document_name")
            .map_err(StoreError::from)?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(StoreError::from)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::from)?;
        Ok(names)
    }

    fn row_to_point(payload_json: &str, id: String, embedding: Option<Vec<u8>>) -> Result<Point> {
        let payload: PointPayload =
            serde_json::from_str(payload_json).map_err(StoreError::from)?;
        Ok(Point {
            id,
            vector: embedding.as_deref().map(bytes_to_vec),
            payload,
        })
    }
}

/// Serialises an embedding as little-endian f32 bytes.
fn vec_to_bytes(vector: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vector.len() * 4);
    for value in vector {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

/// Deserialises little-endian f32 bytes into an embedding.
fn bytes_to_vec(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

impl VectorStore for SqliteVectorStore {
    fn create_collection(&mut self, dim: usize, force_wipe: bool) -> Result<()> {
        if force_wipe {
            self.conn
                .execute("DELETE FROM points", [])
                .map_err(StoreError::from)?;
            info!(collection = %self.collection, "collection wiped");
        }
        self.conn
            .execute(
                "INSERT OR REPLACE INTO collection_info (name, dim, created_at)
                 VALUES (?, ?, COALESCE((SELECT created_at FROM collection_info WHERE name = ?), ?))",
                params![self.collection, dim as i64, self.collection, crate::core::unix_now()],
            )
            .map_err(StoreError::from)?;
        Ok(())
    }

    fn upsert(&mut self, points: &[Point]) -> Result<()> {
        let dim = self.require_dimension()?;
        // Dimension check before any write: the batch is all-or-nothing
        for point in points {
            if let Some(vector) = &point.vector {
                if vector.len() != dim {
                    return Err(ConsistencyError::DimensionMismatch {
                        got: vector.len(),
                        expected: dim,
                    }
                    .into());
                }
            }
        }

        let tx = self.conn.transaction().map_err(StoreError::from)?;
        for point in points {
            let payload = serde_json::to_string(&point.payload).map_err(StoreError::from)?;
            tx.execute(
                "INSERT OR REPLACE INTO points (id, document_name, level, payload, embedding)
                 VALUES (?, ?, ?, ?, ?)",
                params![
                    point.id,
                    point.payload.document_name,
                    i64::from(point.payload.level),
                    payload,
                    point.vector.as_deref().map(vec_to_bytes),
                ],
            )
            .map_err(StoreError::from)?;
        }
        tx.commit().map_err(StoreError::from)?;
        debug!(count = points.len(), "points upserted");
        Ok(())
    }

    fn scroll(
        &self,
        filter: Option<&Filter>,
        limit: usize,
        cursor: Option<i64>,
    ) -> Result<(Vec<Point>, Option<i64>)> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT rowid, id, payload, embedding FROM points
                 WHERE rowid > ? ORDER BY rowid LIMIT ?",
            )
            .map_err(StoreError::from)?;

        let start = cursor.unwrap_or(0);
        let mut out = Vec::new();
        let mut last_rowid = None;
        // Scan forward in rowid order, filtering client-side, until the
        // page fills or the table ends
        let mut scan_from = start;
        loop {
            let rows: Vec<(i64, String, String, Option<Vec<u8>>)> = stmt
                .query_map(params![scan_from, 256], |row| {
                    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
                })
                .map_err(StoreError::from)?
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(StoreError::from)?;
            if rows.is_empty() {
                return Ok((out, None));
            }
            for (rowid, id, payload_json, embedding) in rows {
                scan_from = rowid;
                let point = Self::row_to_point(&payload_json, id, embedding)?;
                if filter.is_none_or(|f| f.matches(&point.payload)) {
                    out.push(point);
                    last_rowid = Some(rowid);
                    if out.len() >= limit {
                        return Ok((out, last_rowid));
                    }
                }
            }
        }
    }

    fn query(&self, vector: &[f32], k: usize, filter: Option<&Filter>) -> Result<Vec<ScoredPoint>> {
        let dim = self.require_dimension()?;
        if vector.len() != dim {
            return Err(ConsistencyError::DimensionMismatch {
                got: vector.len(),
                expected: dim,
            }
            .into());
        }

        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, payload, embedding FROM points
                 WHERE level = 0 AND embedding IS NOT NULL",
            )
            .map_err(StoreError::from)?;

        let mut scored: Vec<ScoredPoint> = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Vec<u8>>(2)?,
                ))
            })
            .map_err(StoreError::from)?
            .filter_map(std::result::Result::ok)
            .filter_map(|(id, payload_json, embedding)| {
                let payload: PointPayload = serde_json::from_str(&payload_json).ok()?;
                if !filter.is_none_or(|f| f.matches(&payload)) {
                    return None;
                }
                let score = cosine_similarity(vector, &bytes_to_vec(&embedding));
                Some(ScoredPoint { id, score, payload })
            })
            .collect();

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }

    fn count(&self, filter: Option<&Filter>) -> Result<usize> {
        match filter {
            None => {
                let count: i64 = self
                    .conn
                    .query_row("SELECT COUNT(*) FROM points", [], |row| row.get(0))
                    .map_err(StoreError::from)?;
                #[allow(clippy::cast_sign_loss)]
                Ok(count as usize)
            }
            Some(f) => {
                let mut total = 0usize;
                let mut cursor = None;
                loop {
                    let (page, next) = self.scroll(Some(f), 512, cursor)?;
                    total += page.len();
                    match next {
                        Some(c) if !page.is_empty() => cursor = Some(c),
                        _ => break,
                    }
                }
                Ok(total)
            }
        }
    }

    fn set_payload(&mut self, id: &str, partial: &serde_json::Value) -> Result<()> {
        let existing: Option<String> = self
            .conn
            .query_row(
                "SELECT payload FROM points WHERE id = ?",
                params![id],
                |row| row.get(0),
            )
            .optional()
            .map_err(StoreError::from)?;
        let Some(json) = existing else {
            return Err(ConsistencyError::DanglingReference(format!("point {id}")).into());
        };

        let mut payload: serde_json::Value =
            serde_json::from_str(&json).map_err(StoreError::from)?;
        if let (Some(target), Some(updates)) = (payload.as_object_mut(), partial.as_object()) {
            for (key, value) in updates {
                target.insert(key.clone(), value.clone());
            }
        }
        // Keep the indexed column in sync with the payload
        let document_name = payload
            .get("document_name")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        self.conn
            .execute(
                "UPDATE points SET payload = ?, document_name = ? WHERE id = ?",
                params![payload.to_string(), document_name, id],
            )
            .map_err(StoreError::from)?;
        Ok(())
    }

    fn delete_ids(&mut self, ids: &[String]) -> Result<()> {
        let tx = self.conn.transaction().map_err(StoreError::from)?;
        for id in ids {
            tx.execute("DELETE FROM points WHERE id = ?", params![id])
                .map_err(StoreError::from)?;
        }
        tx.commit().map_err(StoreError::from)?;
        Ok(())
    }

    fn delete_by_filter(&mut self, filter: &Filter) -> Result<usize> {
        let mut doomed = Vec::new();
        let mut cursor = None;
        loop {
            let (page, next) = self.scroll(Some(filter), 512, cursor)?;
            doomed.extend(page.into_iter().map(|p| p.id));
            match next {
                Some(c) => cursor = Some(c),
                None => break,
            }
        }
        let count = doomed.len();
        self.delete_ids(&doomed)?;
        Ok(count)
    }
}
