//! Vector store adapter: points, payloads, filters.
//!
//! The store holds one point per chunk; only leaves carry vectors and are
//! dense-searchable. Filters are small AND/OR trees over payload fields,
//! evaluated against deserialized payloads.

pub mod sqlite;

pub use sqlite::SqliteVectorStore;

use crate::core::{Chunk, DocumentRecord, SpecValue};
use crate::error::Result;
use serde::{Deserialize, Serialize};

/// Payload stored with every point.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PointPayload {
    /// Owning document name.
    pub document_name: String,
    /// Original file name.
    #[serde(default)]
    pub file_name: String,
    /// Document categories.
    #[serde(default)]
    pub categories: Vec<String>,
    /// Project assignment.
    #[serde(default)]
    pub project: Option<String>,
    /// Page number (0 when page-less).
    #[serde(default)]
    pub page: u32,
    /// Dotted section number.
    #[serde(default)]
    pub section_number: String,
    /// Section title.
    #[serde(default)]
    pub section_title: String,
    /// Materialised section path.
    #[serde(default)]
    pub section_path: String,
    /// Original passage text.
    pub text_original: String,
    /// Context-enriched text (the embedded form).
    pub text_enriched: String,
    /// Parent chunk id.
    #[serde(default)]
    pub parent_id: Option<String>,
    /// Ordered child chunk ids.
    #[serde(default)]
    pub children_ids: Vec<String>,
    /// Tree level (0 = leaf).
    #[serde(default)]
    pub level: u8,
    /// Whether the chunk contains a table.
    #[serde(default)]
    pub has_table: bool,
    /// Structured table payload JSON.
    #[serde(default)]
    pub table_payload: Option<String>,
    /// Canonical standard keys in the text.
    #[serde(default)]
    pub referenced_standards: Vec<String>,
    /// Extracted specification values.
    #[serde(default)]
    pub spec_values: Vec<SpecValue>,
    /// Requirement strengths present.
    #[serde(default)]
    pub requirement_strengths: Vec<String>,
    /// Whether any mandatory requirement is present.
    #[serde(default)]
    pub has_mandatory: bool,
}

impl PointPayload {
    /// Builds a payload from a chunk and its document record.
    #[must_use]
    pub fn from_chunk(chunk: &Chunk, document: &DocumentRecord) -> Self {
        Self {
            document_name: document.name.clone(),
            file_name: document.file_name.clone(),
            categories: document.categories.clone(),
            project: document.project.clone(),
            page: chunk.page,
            section_number: chunk.section_number.clone(),
            section_title: chunk.section_title.clone(),
            section_path: chunk.section_path.clone(),
            text_original: chunk.text_original.clone(),
            text_enriched: chunk.text_enriched.clone(),
            parent_id: chunk.parent_id.clone(),
            children_ids: chunk.children_ids.clone(),
            level: chunk.level,
            has_table: chunk.has_table,
            table_payload: chunk.table_payload.clone(),
            referenced_standards: chunk.referenced_standards.clone(),
            spec_values: chunk.spec_values.clone(),
            requirement_strengths: chunk.requirement_strengths.clone(),
            has_mandatory: chunk
                .requirement_strengths
                .iter()
                .any(|s| s == "mandatory"),
        }
    }
}

/// A point to upsert: id, optional vector, payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Stable point id (the chunk id).
    pub id: String,
    /// Embedding vector; only leaves carry one.
    pub vector: Option<Vec<f32>>,
    /// Point payload.
    pub payload: PointPayload,
}

/// Boolean payload flags addressable in filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlagField {
    /// `has_table`
    HasTable,
    /// `has_mandatory`
    HasMandatory,
    /// `level == 0`
    IsLeaf,
}

/// AND/OR filter tree over payload fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Filter {
    /// All sub-filters must match.
    And(Vec<Filter>),
    /// Any sub-filter must match.
    Or(Vec<Filter>),
    /// Document name equality.
    DocumentEq(String),
    /// Document name membership.
    DocumentIn(Vec<String>),
    /// Any category matches.
    CategoryIn(Vec<String>),
    /// Project equality.
    ProjectEq(String),
    /// Section number starts with the prefix.
    SectionPrefix(String),
    /// Boolean flag check.
    Flag(FlagField, bool),
}

impl Filter {
    /// Evaluates the filter against a payload.
    #[must_use]
    pub fn matches(&self, payload: &PointPayload) -> bool {
        match self {
            Self::And(filters) => filters.iter().all(|f| f.matches(payload)),
            Self::Or(filters) => filters.iter().any(|f| f.matches(payload)),
            Self::DocumentEq(name) => &payload.document_name == name,
            Self::DocumentIn(names) => names.contains(&payload.document_name),
            Self::CategoryIn(wanted) => payload.categories.iter().any(|c| wanted.contains(c)),
            Self::ProjectEq(project) => payload.project.as_deref() == Some(project.as_str()),
            Self::SectionPrefix(prefix) => payload.section_number.starts_with(prefix),
            Self::Flag(field, expected) => {
                let actual = match field {
                    FlagField::HasTable => payload.has_table,
                    FlagField::HasMandatory => payload.has_mandatory,
                    FlagField::IsLeaf => payload.level == 0,
                };
                actual == *expected
            }
        }
    }
}

/// A scored dense-retrieval hit.
#[derive(Debug, Clone)]
pub struct ScoredPoint {
    /// Point id.
    pub id: String,
    /// Cosine similarity to the query vector.
    pub score: f32,
    /// Point payload.
    pub payload: PointPayload,
}

/// Adapter interface over a pluggable vector database.
pub trait VectorStore: Send {
    /// Creates (or wipes and recreates) the collection with a fixed
    /// vector dimension.
    fn create_collection(&mut self, dim: usize, force_wipe: bool) -> Result<()>;

    /// Idempotently upserts points. Vector-bearing points with the wrong
    /// dimension are refused.
    fn upsert(&mut self, points: &[Point]) -> Result<()>;

    /// Scrolls points matching the filter, resuming from `cursor`.
    /// Returns matched points and the next cursor (None when exhausted).
    fn scroll(
        &self,
        filter: Option<&Filter>,
        limit: usize,
        cursor: Option<i64>,
    ) -> Result<(Vec<Point>, Option<i64>)>;

    /// Dense search over leaf points.
    fn query(&self, vector: &[f32], k: usize, filter: Option<&Filter>) -> Result<Vec<ScoredPoint>>;

    /// Counts points matching the filter.
    fn count(&self, filter: Option<&Filter>) -> Result<usize>;

    /// Partially merges fields into a point's payload.
    fn set_payload(&mut self, id: &str, partial: &serde_json::Value) -> Result<()>;

    /// Deletes points by id.
    fn delete_ids(&mut self, ids: &[String]) -> Result<()>;

    /// Deletes points matching the filter; returns the removed count.
    fn delete_by_filter(&mut self, filter: &Filter) -> Result<usize>;
}
