//! Embedding-keyed semantic cache for query answers.
//!
//! Cached answers are matched by cosine similarity between query
//! embeddings, with TTL expiry and eviction of the least-recently
//! accessed tenth when the cache fills.

use crate::core::unix_now;
use crate::embedding::{cosine_similarity, Embedder};
use crate::error::{Result, StoreError};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Default similarity threshold for a cache hit.
pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.92;

/// Default entry time-to-live: 7 days.
pub const DEFAULT_TTL_SECONDS: i64 = 86_400 * 7;

/// Default maximum number of cached entries.
pub const DEFAULT_MAX_ENTRIES: usize = 1_000;

/// Scan cap per lookup: only this many most-recently-accessed live rows
/// are compared.
const SCAN_LIMIT: usize = 100;

const SCHEMA_SQL: &str = r"
CREATE TABLE IF NOT EXISTS query_cache (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    query TEXT NOT NULL,
    query_embedding TEXT NOT NULL,
    answer TEXT NOT NULL,
    sources TEXT,
    created_at INTEGER NOT NULL,
    hit_count INTEGER NOT NULL DEFAULT 0,
    last_accessed INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_cache_created ON query_cache(created_at);
CREATE INDEX IF NOT EXISTS idx_cache_accessed ON query_cache(last_accessed);
";

/// A cached answer returned on a hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedAnswer {
    /// The query as originally cached.
    pub query: String,
    /// The cached answer.
    pub answer: String,
    /// Source descriptors stored with the answer.
    pub sources: Vec<serde_json::Value>,
    /// Similarity between the incoming and cached query embeddings.
    pub similarity: f32,
    /// Times this entry has been served (after this hit).
    pub hit_count: i64,
    /// When the entry was created (Unix seconds).
    pub created_at: i64,
}

/// Cache hit/miss statistics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    /// Live rows in the cache.
    pub total_entries: usize,
    /// Lookups this process.
    pub total_queries: u64,
    /// Hits this process.
    pub hits: u64,
    /// Misses this process.
    pub misses: u64,
    /// Hit rate percentage.
    pub hit_rate_percent: f64,
    /// Configured similarity threshold.
    pub similarity_threshold: f32,
    /// Configured TTL in days.
    pub ttl_days: f64,
}

/// Semantic cache over a SQLite row store.
pub struct SemanticCache {
    conn: Connection,
    path: Option<PathBuf>,
    similarity_threshold: f32,
    ttl_seconds: i64,
    max_entries: usize,
    hits: u64,
    misses: u64,
}

impl SemanticCache {
    /// Opens or creates the cache database.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StoreError::Database(e.to_string()))?;
            }
        }
        let conn = Connection::open(&path).map_err(StoreError::from)?;
        conn.execute_batch(SCHEMA_SQL).map_err(StoreError::from)?;
        Ok(Self {
            conn,
            path: Some(path),
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            ttl_seconds: DEFAULT_TTL_SECONDS,
            max_entries: DEFAULT_MAX_ENTRIES,
            hits: 0,
            misses: 0,
        })
    }

    /// Creates an in-memory cache, for tests.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(StoreError::from)?;
        conn.execute_batch(SCHEMA_SQL).map_err(StoreError::from)?;
        Ok(Self {
            conn,
            path: None,
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            ttl_seconds: DEFAULT_TTL_SECONDS,
            max_entries: DEFAULT_MAX_ENTRIES,
            hits: 0,
            misses: 0,
        })
    }

    /// Returns the database path (None for in-memory).
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Overrides the similarity threshold.
    #[must_use]
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.similarity_threshold = threshold;
        self
    }

    /// Overrides the TTL.
    #[must_use]
    pub const fn with_ttl_seconds(mut self, ttl: i64) -> Self {
        self.ttl_seconds = ttl;
        self
    }

    /// Overrides the capacity.
    #[must_use]
    pub const fn with_max_entries(mut self, max: usize) -> Self {
        self.max_entries = max;
        self
    }

    /// Looks up a cached answer for the query.
    ///
    /// Scans up to 100 live rows ordered by recency of access, picks the
    /// best cosine match, and returns it when it clears the threshold.
    /// Expired rows encountered along the way are removed.
    pub fn get(&mut self, query: &str, embedder: &dyn Embedder) -> Result<Option<CachedAnswer>> {
        self.remove_expired()?;
        let query_embedding = embedder.embed(query)?;

        let cutoff = unix_now() - self.ttl_seconds;
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, query, query_embedding, answer, sources, created_at, hit_count
                 FROM query_cache
                 WHERE created_at > ?
                 ORDER BY last_accessed DESC
                 LIMIT ?",
            )
            .map_err(StoreError::from)?;

        let rows: Vec<(i64, String, String, String, Option<String>, i64, i64)> = stmt
            .query_map(params![cutoff, SCAN_LIMIT as i64], |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                    row.get(6)?,
                ))
            })
            .map_err(StoreError::from)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::from)?;
        drop(stmt);

        let mut best: Option<(i64, f32, CachedAnswer)> = None;
        for (id, cached_query, embedding_json, answer, sources, created_at, hit_count) in rows {
            let cached_embedding: Vec<f32> =
                serde_json::from_str(&embedding_json).map_err(StoreError::from)?;
            let similarity = cosine_similarity(&query_embedding, &cached_embedding);
            if best.as_ref().is_none_or(|(_, s, _)| similarity > *s) {
                let sources = sources
                    .as_deref()
                    .and_then(|s| serde_json::from_str(s).ok())
                    .unwrap_or_default();
                best = Some((
                    id,
                    similarity,
                    CachedAnswer {
                        query: cached_query,
                        answer,
                        sources,
                        similarity,
                        hit_count: hit_count + 1,
                        created_at,
                    },
                ));
            }
        }

        match best {
            Some((id, similarity, answer)) if similarity >= self.similarity_threshold => {
                self.conn
                    .execute(
                        "UPDATE query_cache
                         SET hit_count = hit_count + 1, last_accessed = ?
                         WHERE id = ?",
                        params![unix_now(), id],
                    )
                    .map_err(StoreError::from)?;
                self.hits += 1;
                let preview: String = query.chars().take(50).collect();
                info!(similarity, query = %preview, "cache hit");
                Ok(Some(answer))
            }
            _ => {
                self.misses += 1;
                Ok(None)
            }
        }
    }

    /// Caches a query/answer pair. When the cache is at capacity, the
    /// oldest tenth by last access is evicted first.
    pub fn set(
        &mut self,
        query: &str,
        answer: &str,
        sources: &[serde_json::Value],
        embedder: &dyn Embedder,
    ) -> Result<()> {
        let embedding = embedder.embed(query)?;
        let count = self.entry_count()?;
        if count >= self.max_entries {
            let evict = self.max_entries.div_ceil(10);
            let evicted = self
                .conn
                .execute(
                    "DELETE FROM query_cache WHERE id IN (
                         SELECT id FROM query_cache ORDER BY last_accessed ASC LIMIT ?
                     )",
                    params![evict as i64],
                )
                .map_err(StoreError::from)?;
            debug!(evicted, "cache eviction");
        }

        let now = unix_now();
        self.conn
            .execute(
                "INSERT INTO query_cache
                   (query, query_embedding, answer, sources, created_at, hit_count, last_accessed)
                 VALUES (?, ?, ?, ?, ?, 0, ?)",
                params![
                    query,
                    serde_json::to_string(&embedding).map_err(StoreError::from)?,
                    answer,
                    serde_json::to_string(sources).map_err(StoreError::from)?,
                    now,
                    now,
                ],
            )
            .map_err(StoreError::from)?;
        Ok(())
    }

    /// Removes entries older than the TTL. Returns how many went.
    pub fn cleanup_expired(&mut self) -> Result<usize> {
        self.remove_expired()
    }

    fn remove_expired(&mut self) -> Result<usize> {
        let removed = self
            .conn
            .execute(
                "DELETE FROM query_cache WHERE created_at <= ?",
                params![unix_now() - self.ttl_seconds],
            )
            .map_err(StoreError::from)?;
        Ok(removed)
    }

    /// Removes every entry and resets counters.
    pub fn clear(&mut self) -> Result<()> {
        self.conn
            .execute("DELETE FROM query_cache", [])
            .map_err(StoreError::from)?;
        self.hits = 0;
        self.misses = 0;
        Ok(())
    }

    fn entry_count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM query_cache", [], |row| row.get(0))
            .map_err(StoreError::from)?;
        #[allow(clippy::cast_sign_loss)]
        Ok(count as usize)
    }

    /// Cache statistics.
    pub fn stats(&self) -> Result<CacheStats> {
        let total = self.entry_count()?;
        let lookups = self.hits + self.misses;
        #[allow(clippy::cast_precision_loss)]
        let hit_rate = if lookups == 0 {
            0.0
        } else {
            self.hits as f64 / lookups as f64 * 100.0
        };
        #[allow(clippy::cast_precision_loss)]
        Ok(CacheStats {
            total_entries: total,
            total_queries: lookups,
            hits: self.hits,
            misses: self.misses,
            hit_rate_percent: hit_rate,
            similarity_threshold: self.similarity_threshold,
            ttl_days: self.ttl_seconds as f64 / 86_400.0,
        })
    }

    /// Most frequently served queries.
    pub fn top_queries(&self, limit: usize) -> Result<Vec<(String, i64)>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT query, hit_count FROM query_cache
                 ORDER BY hit_count DESC LIMIT ?",
            )
            .map_err(StoreError::from)?;
        let rows = stmt
            .query_map(params![limit as i64], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })
            .map_err(StoreError::from)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::from)?;
        Ok(rows)
    }

    /// Oldest live entry age in seconds, used by invariant checks.
    pub fn oldest_entry_age(&self) -> Result<Option<i64>> {
        let oldest: Option<i64> = self
            .conn
            .query_row("SELECT MIN(created_at) FROM query_cache", [], |row| {
                row.get(0)
            })
            .optional()
            .map_err(StoreError::from)?
            .flatten();
        Ok(oldest.map(|t| unix_now() - t))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::FallbackEmbedder;

    fn cache_and_embedder() -> (SemanticCache, FallbackEmbedder) {
        (SemanticCache::in_memory().unwrap(), FallbackEmbedder::new(128))
    }

    #[test]
    fn test_miss_on_empty_cache() {
        let (mut cache, embedder) = cache_and_embedder();
        assert!(cache.get("anything", &embedder).unwrap().is_none());
        let stats = cache.stats().unwrap();
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn test_exact_hit() {
        let (mut cache, embedder) = cache_and_embedder();
        cache
            .set(
                "What is the current for 2.5mm² cable?",
                "20 A per Table 6.1",
                &[serde_json::json!({"document": "IS3218", "page": 12})],
                &embedder,
            )
            .unwrap();

        let hit = cache
            .get("What is the current for 2.5mm² cable?", &embedder)
            .unwrap()
            .unwrap();
        assert_eq!(hit.answer, "20 A per Table 6.1");
        assert_eq!(hit.hit_count, 1);
        assert_eq!(hit.sources.len(), 1);
        // Hit implies similarity cleared the threshold
        assert!(hit.similarity >= DEFAULT_SIMILARITY_THRESHOLD);
    }

    #[test]
    fn test_similar_query_hit_with_low_threshold() {
        let embedder = FallbackEmbedder::new(128);
        let mut cache = SemanticCache::in_memory().unwrap().with_threshold(0.5);
        cache
            .set("maximum current for 2.5mm cable", "20 A", &[], &embedder)
            .unwrap();
        let hit = cache
            .get("2.5mm cable maximum current rating", &embedder)
            .unwrap();
        assert!(hit.is_some());
    }

    #[test]
    fn test_dissimilar_query_misses() {
        let (mut cache, embedder) = cache_and_embedder();
        cache
            .set("cable current rating", "20 A", &[], &embedder)
            .unwrap();
        assert!(cache
            .get("completely unrelated gardening question", &embedder)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_hit_count_increments() {
        let (mut cache, embedder) = cache_and_embedder();
        cache.set("q", "a", &[], &embedder).unwrap();
        let first = cache.get("q", &embedder).unwrap().unwrap();
        let second = cache.get("q", &embedder).unwrap().unwrap();
        assert_eq!(first.hit_count, 1);
        assert_eq!(second.hit_count, 2);
    }

    #[test]
    fn test_ttl_expiry() {
        let (cache, embedder) = cache_and_embedder();
        let mut cache = cache.with_ttl_seconds(0);
        cache.set("stale query", "stale answer", &[], &embedder).unwrap();
        // TTL zero: entry is already expired
        assert!(cache.get("stale query", &embedder).unwrap().is_none());
        assert_eq!(cache.stats().unwrap().total_entries, 0);
    }

    #[test]
    fn test_cleanup_expired() {
        let (cache, embedder) = cache_and_embedder();
        let mut cache = cache.with_ttl_seconds(0);
        cache.set("q1", "a1", &[], &embedder).unwrap();
        cache.set("q2", "a2", &[], &embedder).unwrap();
        let removed = cache.cleanup_expired().unwrap();
        assert_eq!(removed, 2);
        assert!(cache.oldest_entry_age().unwrap().is_none());
    }

    #[test]
    fn test_eviction_at_capacity() {
        let (cache, embedder) = cache_and_embedder();
        let mut cache = cache.with_max_entries(10);
        for i in 0..10 {
            cache.set(&format!("query {i}"), "answer", &[], &embedder).unwrap();
        }
        assert_eq!(cache.stats().unwrap().total_entries, 10);
        // At capacity: the next set evicts ceil(10/10) = 1 before inserting
        cache.set("query 10", "answer", &[], &embedder).unwrap();
        assert_eq!(cache.stats().unwrap().total_entries, 10);
    }

    #[test]
    fn test_clear() {
        let (mut cache, embedder) = cache_and_embedder();
        cache.set("q", "a", &[], &embedder).unwrap();
        cache.clear().unwrap();
        assert_eq!(cache.stats().unwrap().total_entries, 0);
        assert_eq!(cache.stats().unwrap().hits, 0);
    }

    #[test]
    fn test_top_queries() {
        let (mut cache, embedder) = cache_and_embedder();
        cache.set("popular", "a", &[], &embedder).unwrap();
        cache.set("unpopular", "b", &[], &embedder).unwrap();
        cache.get("popular", &embedder).unwrap();
        cache.get("popular", &embedder).unwrap();
        let top = cache.top_queries(2).unwrap();
        assert_eq!(top[0].0, "popular");
        assert_eq!(top[0].1, 2);
    }

    #[test]
    fn test_stats_hit_rate() {
        let (mut cache, embedder) = cache_and_embedder();
        cache.set("q", "a", &[], &embedder).unwrap();
        cache.get("q", &embedder).unwrap();
        cache.get("nothing like it at all", &embedder).unwrap();
        let stats = cache.stats().unwrap();
        assert_eq!(stats.total_queries, 2);
        assert!((stats.hit_rate_percent - 50.0).abs() < f64::EPSILON);
    }
}
