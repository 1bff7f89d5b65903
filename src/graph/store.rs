//! SQLite-backed graph store.

use crate::core::unix_now;
use crate::error::{ConsistencyError, Result, StoreError};
use crate::graph::traverse::{bfs, TraversalConfig, TraversalResult};
use crate::graph::{
    EdgeFilter, EdgeType, GraphEdge, GraphNode, GraphStats, LearnedEdgeStats, NodeKey, NodeLabel,
    LEARNING_RATE,
};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// SQL schema for the graph store. The composite primary keys double as
/// the mandated indexes on document name, (section number, document) and
/// standard name, since those are the node keys.
const SCHEMA_SQL: &str = r"
CREATE TABLE IF NOT EXISTS nodes (
    label TEXT NOT NULL,
    key TEXT NOT NULL,
    props TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    PRIMARY KEY (label, key)
);

CREATE TABLE IF NOT EXISTS edges (
    src_label TEXT NOT NULL,
    src_key TEXT NOT NULL,
    dst_label TEXT NOT NULL,
    dst_key TEXT NOT NULL,
    edge_type TEXT NOT NULL,
    weight REAL NOT NULL DEFAULT 1.0,
    learned INTEGER NOT NULL DEFAULT 0,
    context TEXT,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    PRIMARY KEY (src_label, src_key, dst_label, dst_key, edge_type)
);

CREATE INDEX IF NOT EXISTS idx_edges_src ON edges(src_label, src_key);
CREATE INDEX IF NOT EXISTS idx_edges_dst ON edges(dst_label, dst_key);
CREATE INDEX IF NOT EXISTS idx_edges_learned ON edges(learned);
";

/// SQLite graph store addressed by `(label, key)`.
pub struct SqliteGraphStore {
    conn: Connection,
    path: Option<PathBuf>,
}

impl SqliteGraphStore {
    /// Opens or creates the graph database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
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
            path: Some(path),
        })
    }

    /// Creates an in-memory graph store, for tests.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(StoreError::from)?;
        conn.execute_batch(SCHEMA_SQL).map_err(StoreError::from)?;
        Ok(Self { conn, path: None })
    }

    /// Returns the database path (None for in-memory).
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Removes all nodes and edges.
    pub fn clear(&mut self) -> Result<()> {
        self.conn
            .execute_batch("DELETE FROM edges; DELETE FROM nodes;")
            .map_err(StoreError::from)?;
        info!("graph cleared");
        Ok(())
    }

    /// Creates or updates a node, merging `props` into existing ones.
    pub fn upsert_node(&mut self, key: &NodeKey, props: &serde_json::Value) -> Result<()> {
        let now = unix_now();
        let existing: Option<String> = self
            .conn
            .query_row(
                "SELECT props FROM nodes WHERE label = ? AND key = ?",
                params![key.label.as_str(), key.key],
                |row| row.get(0),
            )
            .optional()
            .map_err(StoreError::from)?;

        let merged = match existing {
            Some(json) => {
                let mut base: serde_json::Value =
                    serde_json::from_str(&json).map_err(StoreError::from)?;
                if let (Some(target), Some(updates)) = (base.as_object_mut(), props.as_object()) {
                    for (k, v) in updates {
                        target.insert(k.clone(), v.clone());
                    }
                }
                base
            }
            None => props.clone(),
        };

        self.conn
            .execute(
                "INSERT INTO nodes (label, key, props, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)
                 ON CONFLICT(label, key) DO UPDATE SET props = ?3, updated_at = ?4",
                params![key.label.as_str(), key.key, merged.to_string(), now],
            )
            .map_err(StoreError::from)?;
        Ok(())
    }

    /// Fetches a node.
    pub fn node(&self, key: &NodeKey) -> Result<Option<GraphNode>> {
        let props: Option<String> = self
            .conn
            .query_row(
                "SELECT props FROM nodes WHERE label = ? AND key = ?",
                params![key.label.as_str(), key.key],
                |row| row.get(0),
            )
            .optional()
            .map_err(StoreError::from)?;
        match props {
            Some(json) => Ok(Some(GraphNode {
                key: key.clone(),
                props: serde_json::from_str(&json).map_err(StoreError::from)?,
            })),
            None => Ok(None),
        }
    }

    fn node_exists(&self, key: &NodeKey) -> Result<bool> {
        let count: i64 = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM nodes WHERE label = ? AND key = ?",
                params![key.label.as_str(), key.key],
                |row| row.get(0),
            )
            .map_err(StoreError::from)?;
        Ok(count > 0)
    }

    /// Creates or merges an edge. Both endpoints must exist; a missing
    /// endpoint is a consistency error, never silently created.
    ///
    /// On merge, an existing edge keeps its weight and `created_at`; the
    /// context is refreshed when provided.
    pub fn upsert_edge(
        &mut self,
        src: &NodeKey,
        dst: &NodeKey,
        edge_type: EdgeType,
        weight: f64,
        learned: bool,
        context: Option<&str>,
    ) -> Result<()> {
        for endpoint in [src, dst] {
            if !self.node_exists(endpoint)? {
                return Err(ConsistencyError::EdgeEndpointMissing {
                    label: endpoint.label.as_str().to_string(),
                    key: endpoint.key.clone(),
                }
                .into());
            }
        }

        let now = unix_now();
        self.conn
            .execute(
                "INSERT INTO edges
                   (src_label, src_key, dst_label, dst_key, edge_type,
                    weight, learned, context, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)
                 ON CONFLICT(src_label, src_key, dst_label, dst_key, edge_type)
                 DO UPDATE SET context = COALESCE(?8, context), updated_at = ?9",
                params![
                    src.label.as_str(),
                    src.key,
                    dst.label.as_str(),
                    dst.key,
                    edge_type.as_str(),
                    weight.clamp(0.0, 1.0),
                    i64::from(learned),
                    context,
                    now,
                ],
            )
            .map_err(StoreError::from)?;
        debug!(%src, %dst, edge_type = edge_type.as_str(), "edge upserted");
        Ok(())
    }

    /// Weight of an edge, if it exists.
    pub fn edge_weight(&self, src: &NodeKey, dst: &NodeKey, edge_type: EdgeType) -> Result<Option<f64>> {
        let weight: Option<f64> = self
            .conn
            .query_row(
                "SELECT weight FROM edges
                 WHERE src_label = ? AND src_key = ? AND dst_label = ? AND dst_key = ?
                   AND edge_type = ?",
                params![
                    src.label.as_str(),
                    src.key,
                    dst.label.as_str(),
                    dst.key,
                    edge_type.as_str()
                ],
                |row| row.get(0),
            )
            .optional()
            .map_err(StoreError::from)?;
        Ok(weight)
    }

    /// Sets an edge weight directly, clamped to [0, 1].
    pub fn set_edge_weight(
        &mut self,
        src: &NodeKey,
        dst: &NodeKey,
        edge_type: EdgeType,
        weight: f64,
    ) -> Result<()> {
        let changed = self
            .conn
            .execute(
                "UPDATE edges SET weight = ?, updated_at = ?
                 WHERE src_label = ? AND src_key = ? AND dst_label = ? AND dst_key = ?
                   AND edge_type = ?",
                params![
                    weight.clamp(0.0, 1.0),
                    unix_now(),
                    src.label.as_str(),
                    src.key,
                    dst.label.as_str(),
                    dst.key,
                    edge_type.as_str()
                ],
            )
            .map_err(StoreError::from)?;
        if changed == 0 {
            return Err(ConsistencyError::DanglingReference(format!(
                "edge {src} -{}-> {dst}",
                edge_type.as_str()
            ))
            .into());
        }
        Ok(())
    }

    /// Strengthens an edge: `w <- min(1, w + LEARNING_RATE * confidence)`.
    /// Returns the new weight.
    pub fn strengthen_edge(
        &mut self,
        src: &NodeKey,
        dst: &NodeKey,
        edge_type: EdgeType,
        confidence: f64,
    ) -> Result<f64> {
        let current = self
            .edge_weight(src, dst, edge_type)?
            .ok_or_else(|| {
                ConsistencyError::DanglingReference(format!(
                    "edge {src} -{}-> {dst}",
                    edge_type.as_str()
                ))
            })?;
        let updated = (current + LEARNING_RATE * confidence).min(1.0);
        self.set_edge_weight(src, dst, edge_type, updated)?;
        Ok(updated)
    }

    /// Edges touching a node in either direction, optionally filtered.
    pub fn neighbors(&self, node: &NodeKey, filter: &EdgeFilter) -> Result<Vec<GraphEdge>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT src_label, src_key, dst_label, dst_key, edge_type,
                        weight, learned, context, created_at, updated_at
                 FROM edges
                 WHERE (src_label = ?1 AND src_key = ?2)
                    OR (dst_label = ?1 AND dst_key = ?2)",
            )
            .map_err(StoreError::from)?;
        let edges = stmt
            .query_map(params![node.label.as_str(), node.key], row_to_edge)
            .map_err(StoreError::from)?
            .filter_map(std::result::Result::ok)
            .flatten()
            .filter(|e| filter.matches(e))
            .collect();
        Ok(edges)
    }

    /// Bounded BFS traversal from a seed node.
    pub fn traverse(&self, seed: &NodeKey, config: &TraversalConfig) -> Result<TraversalResult> {
        bfs(seed, config, |node| self.neighbors(node, &config.edge_filter))
    }

    /// Removes learned edges below the weight threshold. Returns the
    /// number pruned.
    pub fn prune_learned_edges(&mut self, min_weight: f64) -> Result<usize> {
        let removed = self
            .conn
            .execute(
                "DELETE FROM edges WHERE learned = 1 AND weight < ?",
                params![min_weight],
            )
            .map_err(StoreError::from)?;
        if removed > 0 {
            info!(removed, min_weight, "pruned weak learned edges");
        }
        Ok(removed)
    }

    /// Deletes a document node, its owned sections and requirements, all
    /// edges owned by the removed endpoints, then any standard or
    /// specification nodes no edge references anymore.
    pub fn delete_document(&mut self, name: &str) -> Result<()> {
        let tx = self.conn.transaction().map_err(StoreError::from)?;
        let scope = format!("{name}::%");

        // Edges owned by the document, its sections or its requirements
        tx.execute(
            "DELETE FROM edges WHERE
               (src_label = 'Document' AND src_key = ?1)
            OR (dst_label = 'Document' AND dst_key = ?1)
            OR (src_label IN ('Section', 'Requirement') AND src_key LIKE ?2)
            OR (dst_label IN ('Section', 'Requirement') AND dst_key LIKE ?2)",
            params![name, scope],
        )
        .map_err(StoreError::from)?;

        tx.execute(
            "DELETE FROM nodes WHERE (label = 'Document' AND key = ?1)
               OR (label IN ('Section', 'Requirement') AND key LIKE ?2)",
            params![name, scope],
        )
        .map_err(StoreError::from)?;

        // Shared standards and specifications live only as long as any
        // edge still references them
        tx.execute(
            "DELETE FROM nodes WHERE label IN ('Standard', 'Specification')
               AND NOT EXISTS (
                   SELECT 1 FROM edges
                   WHERE (edges.src_label = nodes.label AND edges.src_key = nodes.key)
                      OR (edges.dst_label = nodes.label AND edges.dst_key = nodes.key)
               )",
            [],
        )
        .map_err(StoreError::from)?;

        tx.commit().map_err(StoreError::from)?;
        info!(document = name, "document removed from graph");
        Ok(())
    }

    /// Graph-wide statistics.
    pub fn statistics(&self) -> Result<GraphStats> {
        let count_label = |label: &str| -> Result<usize> {
            let n: i64 = self
                .conn
                .query_row(
                    "SELECT COUNT(*) FROM nodes WHERE label = ?",
                    params![label],
                    |row| row.get(0),
                )
                .map_err(StoreError::from)?;
            #[allow(clippy::cast_sign_loss)]
            Ok(n as usize)
        };
        let edges: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM edges", [], |row| row.get(0))
            .map_err(StoreError::from)?;
        let learned: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM edges WHERE learned = 1", [], |row| {
                row.get(0)
            })
            .map_err(StoreError::from)?;
        #[allow(clippy::cast_sign_loss)]
        Ok(GraphStats {
            documents: count_label("Document")?,
            sections: count_label("Section")?,
            standards: count_label("Standard")?,
            specifications: count_label("Specification")?,
            requirements: count_label("Requirement")?,
            edges: edges as usize,
            learned_edges: learned as usize,
        })
    }

    /// Statistics over learned edges only.
    pub fn learned_statistics(&self) -> Result<LearnedEdgeStats> {
        let row: Option<(i64, f64, f64, f64)> = self
            .conn
            .query_row(
                "SELECT COUNT(*), COALESCE(AVG(weight), 0),
                        COALESCE(MAX(weight), 0), COALESCE(MIN(weight), 0)
                 FROM edges WHERE learned = 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .optional()
            .map_err(StoreError::from)?;
        let (total, avg, max, min) = row.unwrap_or((0, 0.0, 0.0, 0.0));
        #[allow(clippy::cast_sign_loss)]
        Ok(LearnedEdgeStats {
            total: total as usize,
            avg_weight: avg,
            max_weight: max,
            min_weight: min,
        })
    }
}

fn row_to_edge(row: &Row) -> rusqlite::Result<Option<GraphEdge>> {
    let src_label: String = row.get(0)?;
    let dst_label: String = row.get(2)?;
    let edge_type: String = row.get(4)?;
    let (Some(src_label), Some(dst_label), Some(edge_type)) = (
        NodeLabel::parse(&src_label),
        NodeLabel::parse(&dst_label),
        EdgeType::parse(&edge_type),
    ) else {
        return Ok(None);
    };
    Ok(Some(GraphEdge {
        src: NodeKey::new(src_label, row.get::<_, String>(1)?),
        dst: NodeKey::new(dst_label, row.get::<_, String>(3)?),
        edge_type,
        weight: row.get(5)?,
        learned: row.get::<_, i64>(6)? != 0,
        context: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    }))
}
