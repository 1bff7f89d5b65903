//! Feedback persistence: per-answer ratings, per-source ratings,
//! highlights and aggregated source quality scores.

use crate::core::{unix_now, ChunkFingerprint};
use crate::error::{Result, StoreError};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

/// Positive feedback adds this much to a source quality score.
const POSITIVE_DELTA: f64 = 1.0;

/// Negative feedback subtracts this much.
const NEGATIVE_DELTA: f64 = -0.5;

const SCHEMA_SQL: &str = r"
CREATE TABLE IF NOT EXISTS feedback (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    created_at INTEGER NOT NULL,
    query TEXT NOT NULL,
    answer TEXT NOT NULL,
    feedback_type TEXT NOT NULL,
    overall_rating INTEGER,
    relevance INTEGER,
    clarity INTEGER,
    completeness INTEGER,
    comment TEXT,
    sources TEXT
);

CREATE TABLE IF NOT EXISTS source_feedback (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    feedback_id INTEGER NOT NULL,
    document TEXT NOT NULL,
    page INTEGER NOT NULL,
    chunk_prefix TEXT NOT NULL,
    rating TEXT,
    stars INTEGER,
    created_at INTEGER NOT NULL,
    FOREIGN KEY (feedback_id) REFERENCES feedback(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS text_highlights (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    feedback_id INTEGER NOT NULL,
    text TEXT NOT NULL,
    sentiment TEXT NOT NULL,
    start_pos INTEGER,
    end_pos INTEGER,
    created_at INTEGER NOT NULL,
    FOREIGN KEY (feedback_id) REFERENCES feedback(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS source_quality_scores (
    document TEXT NOT NULL,
    page INTEGER NOT NULL,
    chunk_prefix TEXT NOT NULL,
    score REAL NOT NULL DEFAULT 0,
    positive_count INTEGER NOT NULL DEFAULT 0,
    negative_count INTEGER NOT NULL DEFAULT 0,
    last_updated INTEGER NOT NULL,
    PRIMARY KEY (document, page, chunk_prefix)
);

CREATE TABLE IF NOT EXISTS query_patterns (
    query_normalized TEXT PRIMARY KEY,
    query_count INTEGER NOT NULL DEFAULT 1,
    positive_count INTEGER NOT NULL DEFAULT 0,
    negative_count INTEGER NOT NULL DEFAULT 0,
    last_queried INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_feedback_type ON feedback(feedback_type, created_at);
";

/// Overall polarity of a feedback record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[allow(missing_docs)]
pub enum FeedbackType {
    Positive,
    Negative,
}

impl FeedbackType {
    /// Name as stored.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Positive => "positive",
            Self::Negative => "negative",
        }
    }
}

/// Per-source rating values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[allow(missing_docs)]
pub enum SourceRating {
    Helpful,
    NotHelpful,
    Irrelevant,
}

impl SourceRating {
    /// Name as stored.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Helpful => "helpful",
            Self::NotHelpful => "not_helpful",
            Self::Irrelevant => "irrelevant",
        }
    }

    const fn delta(self) -> f64 {
        match self {
            Self::Helpful => POSITIVE_DELTA,
            Self::NotHelpful | Self::Irrelevant => NEGATIVE_DELTA,
        }
    }
}

/// Highlight sentiment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[allow(missing_docs)]
pub enum Sentiment {
    Positive,
    Negative,
}

/// A source cited by an answer, optionally rated by the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceFeedback {
    /// Document name.
    pub document: String,
    /// Page number.
    pub page: u32,
    /// First 500 characters of the chunk's original text.
    pub chunk_prefix: String,
    /// Explicit per-source rating, if the user gave one.
    #[serde(default)]
    pub rating: Option<SourceRating>,
    /// Star rating 1..5, if given.
    #[serde(default)]
    pub stars: Option<u8>,
}

/// A highlighted span of the answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Highlight {
    /// Highlighted text.
    pub text: String,
    /// Sentiment of the highlight.
    pub sentiment: Sentiment,
    /// Start offset in the answer, if known.
    #[serde(default)]
    pub start: Option<usize>,
    /// End offset in the answer, if known.
    #[serde(default)]
    pub end: Option<usize>,
}

/// A complete feedback submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackRecord {
    /// The query that was answered.
    pub query: String,
    /// The answer being rated.
    pub answer: String,
    /// Overall polarity.
    pub feedback_type: FeedbackType,
    /// Overall rating 1..5.
    #[serde(default)]
    pub overall_rating: Option<u8>,
    /// Relevance rating 1..5.
    #[serde(default)]
    pub relevance: Option<u8>,
    /// Clarity rating 1..5.
    #[serde(default)]
    pub clarity: Option<u8>,
    /// Completeness rating 1..5.
    #[serde(default)]
    pub completeness: Option<u8>,
    /// Free-form comment.
    #[serde(default)]
    pub comment: Option<String>,
    /// Sources the answer cited, with any per-source ratings.
    #[serde(default)]
    pub sources: Vec<SourceFeedback>,
    /// Highlighted answer spans.
    #[serde(default)]
    pub highlights: Vec<Highlight>,
}

/// Positive feedback row used by the learner.
#[derive(Debug, Clone)]
pub struct PositiveFeedback {
    /// The query.
    pub query: String,
    /// Distinct source document names.
    pub documents: Vec<String>,
    /// When the feedback was recorded.
    pub created_at: i64,
}

/// Aggregated feedback statistics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FeedbackStats {
    /// Total feedback records.
    pub total: usize,
    /// Positive records.
    pub positive: usize,
    /// Negative records.
    pub negative: usize,
    /// Positive share in percent.
    pub satisfaction_rate: f64,
    /// Best-scoring documents.
    pub top_documents: Vec<(String, f64)>,
    /// Most frequently rated queries with their counts.
    pub top_queries: Vec<(String, i64)>,
}

/// SQLite feedback store.
pub struct FeedbackStore {
    conn: Connection,
    path: Option<PathBuf>,
}

impl FeedbackStore {
    /// Opens or creates the feedback database.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StoreError::Database(e.to_string()))?;
            }
        }
        let conn = Connection::open(&path).map_err(StoreError::from)?;
        conn.execute("PRAGMA foreign_keys = ON;", [])
            .map_err(StoreError::from)?;
        conn.execute_batch(SCHEMA_SQL).map_err(StoreError::from)?;
        Ok(Self {
            conn,
            path: Some(path),
        })
    }

    /// Creates an in-memory store, for tests.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(StoreError::from)?;
        conn.execute("PRAGMA foreign_keys = ON;", [])
            .map_err(StoreError::from)?;
        conn.execute_batch(SCHEMA_SQL).map_err(StoreError::from)?;
        Ok(Self { conn, path: None })
    }

    /// Returns the database path (None for in-memory).
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Persists a feedback record with its sources and highlights, and
    /// folds it into the aggregated source quality scores. Returns the
    /// feedback id.
    pub fn add(&mut self, record: &FeedbackRecord) -> Result<i64> {
        let now = unix_now();
        let sources_json = serde_json::to_string(&record.sources).map_err(StoreError::from)?;

        let tx = self.conn.transaction().map_err(StoreError::from)?;
        tx.execute(
            "INSERT INTO feedback
               (created_at, query, answer, feedback_type, overall_rating,
                relevance, clarity, completeness, comment, sources)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                now,
                record.query,
                record.answer,
                record.feedback_type.as_str(),
                record.overall_rating,
                record.relevance,
                record.clarity,
                record.completeness,
                record.comment,
                sources_json,
            ],
        )
        .map_err(StoreError::from)?;
        let feedback_id = tx.last_insert_rowid();

        for source in &record.sources {
            let prefix: String = source
                .chunk_prefix
                .chars()
                .take(ChunkFingerprint::PREFIX_CHARS)
                .collect();
            tx.execute(
                "INSERT INTO source_feedback
                   (feedback_id, document, page, chunk_prefix, rating, stars, created_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
                params![
                    feedback_id,
                    source.document,
                    source.page,
                    prefix,
                    source.rating.map(SourceRating::as_str),
                    source.stars,
                    now,
                ],
            )
            .map_err(StoreError::from)?;

            // An explicit per-source rating overrides the overall polarity
            let delta = source.rating.map_or_else(
                || match record.feedback_type {
                    FeedbackType::Positive => POSITIVE_DELTA,
                    FeedbackType::Negative => NEGATIVE_DELTA,
                },
                SourceRating::delta,
            );
            let positive = i64::from(delta > 0.0);
            let negative = i64::from(delta < 0.0);
            tx.execute(
                "INSERT INTO source_quality_scores
                   (document, page, chunk_prefix, score, positive_count, negative_count, last_updated)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(document, page, chunk_prefix) DO UPDATE SET
                   score = score + ?4,
                   positive_count = positive_count + ?5,
                   negative_count = negative_count + ?6,
                   last_updated = ?7",
                params![source.document, source.page, prefix, delta, positive, negative, now],
            )
            .map_err(StoreError::from)?;
        }

        // Query pattern statistics, normalised on case and whitespace
        let normalized = record.query.to_lowercase().trim().to_string();
        let positive = i64::from(record.feedback_type == FeedbackType::Positive);
        let negative = i64::from(record.feedback_type == FeedbackType::Negative);
        tx.execute(
            "INSERT INTO query_patterns
               (query_normalized, query_count, positive_count, negative_count, last_queried)
             VALUES (?1, 1, ?2, ?3, ?4)
             ON CONFLICT(query_normalized) DO UPDATE SET
               query_count = query_count + 1,
               positive_count = positive_count + ?2,
               negative_count = negative_count + ?3,
               last_queried = ?4",
            params![normalized, positive, negative, now],
        )
        .map_err(StoreError::from)?;

        for highlight in &record.highlights {
            tx.execute(
                "INSERT INTO text_highlights
                   (feedback_id, text, sentiment, start_pos, end_pos, created_at)
                 VALUES (?, ?, ?, ?, ?, ?)",
                params![
                    feedback_id,
                    highlight.text,
                    match highlight.sentiment {
                        Sentiment::Positive => "positive",
                        Sentiment::Negative => "negative",
                    },
                    highlight.start.map(|v| v as i64),
                    highlight.end.map(|v| v as i64),
                    now,
                ],
            )
            .map_err(StoreError::from)?;
        }

        tx.commit().map_err(StoreError::from)?;
        info!(
            feedback_id,
            feedback_type = record.feedback_type.as_str(),
            "feedback recorded"
        );
        Ok(feedback_id)
    }

    /// Aggregated quality score for a chunk fingerprint (0.0 when no
    /// feedback exists).
    pub fn source_score(&self, fingerprint: &ChunkFingerprint) -> Result<f64> {
        let score: Option<f64> = self
            .conn
            .query_row(
                "SELECT score FROM source_quality_scores
                 WHERE document = ? AND page = ? AND chunk_prefix = ?",
                params![fingerprint.document, fingerprint.page, fingerprint.text_prefix],
                |row| row.get(0),
            )
            .optional()
            .map_err(StoreError::from)?;
        Ok(score.unwrap_or(0.0))
    }

    /// Positive feedback rows, optionally restricted to the last
    /// `window_days` days, newest first.
    pub fn positive_feedback(&self, window_days: Option<u32>) -> Result<Vec<PositiveFeedback>> {
        let cutoff = window_days.map_or(0, |d| unix_now() - i64::from(d) * 86_400);
        let mut stmt = self
            .conn
            .prepare(
                "SELECT query, sources, created_at FROM feedback
                 WHERE feedback_type = 'positive' AND created_at >= ?
                 ORDER BY created_at DESC",
            )
            .map_err(StoreError::from)?;
        let rows = stmt
            .query_map(params![cutoff], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, Option<String>>(1)?,
                    row.get::<_, i64>(2)?,
                ))
            })
            .map_err(StoreError::from)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::from)?;

        let mut out = Vec::with_capacity(rows.len());
        for (query, sources_json, created_at) in rows {
            let sources: Vec<SourceFeedback> = sources_json
                .as_deref()
                .and_then(|s| serde_json::from_str(s).ok())
                .unwrap_or_default();
            let mut documents: Vec<String> = sources.into_iter().map(|s| s.document).collect();
            documents.sort();
            documents.dedup();
            out.push(PositiveFeedback {
                query,
                documents,
                created_at,
            });
        }
        Ok(out)
    }

    /// Aggregated statistics.
    pub fn statistics(&self) -> Result<FeedbackStats> {
        let count = |sql: &str| -> Result<i64> {
            Ok(self
                .conn
                .query_row(sql, [], |row| row.get(0))
                .map_err(StoreError::from)?)
        };
        let total = count("SELECT COUNT(*) FROM feedback")?;
        let positive = count("SELECT COUNT(*) FROM feedback WHERE feedback_type = 'positive'")?;
        let negative = count("SELECT COUNT(*) FROM feedback WHERE feedback_type = 'negative'")?;

        let mut stmt = self
            .conn
            .prepare(
                "SELECT document, AVG(score) FROM source_quality_scores
                 GROUP BY document ORDER BY AVG(score) DESC LIMIT 5",
            )
            .map_err(StoreError::from)?;
        let top_documents = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?)))
            .map_err(StoreError::from)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::from)?;
        drop(stmt);

        let mut stmt = self
            .conn
            .prepare(
                "SELECT query_normalized, query_count FROM query_patterns
                 ORDER BY query_count DESC LIMIT 5",
            )
            .map_err(StoreError::from)?;
        let top_queries = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))
            .map_err(StoreError::from)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::from)?;

        #[allow(clippy::cast_precision_loss, clippy::cast_sign_loss)]
        Ok(FeedbackStats {
            total: total as usize,
            positive: positive as usize,
            negative: negative as usize,
            satisfaction_rate: if total == 0 {
                0.0
            } else {
                positive as f64 / total as f64 * 100.0
            },
            top_documents,
            top_queries,
        })
    }
}
