//! Hierarchical chunk representation.
//!
//! Chunks form a tree per document: the root covers the whole document,
//! interior nodes cover section-bounded slices, and leaves (level 0) are
//! the retrieval units. Only leaves carry embeddings.

use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::ops::Range;

/// Stable content-addressed chunk identifier.
pub type ChunkId = String;

/// A typed specification value extracted from chunk text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecValue {
    /// Parameter type (voltage, current, area, ...).
    pub param_type: String,
    /// Numeric value.
    pub value: f64,
    /// Unit as written in the text.
    pub unit: String,
}

/// An indexed passage within a document's chunk tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Content-addressed identifier, stable across re-ingests.
    pub id: ChunkId,
    /// Owning document name.
    pub document: String,
    /// Page number the text came from (0 for page-less sources).
    pub page: u32,
    /// Dotted section number (e.g. `6.5.1`), empty when unknown.
    #[serde(default)]
    pub section_number: String,
    /// Section title, empty when unknown.
    #[serde(default)]
    pub section_title: String,
    /// Materialised ancestor path, `"6 Wiring > 6.5 Cabling > 6.5.1 Types"`.
    #[serde(default)]
    pub section_path: String,
    /// The passage as it appears in the source.
    pub text_original: String,
    /// Context prefix + original text; the embedded form.
    pub text_enriched: String,
    /// Byte range in the document text.
    pub byte_range: Range<usize>,
    /// Parent chunk id, `None` for the document root.
    #[serde(default)]
    pub parent_id: Option<ChunkId>,
    /// Ordered child chunk ids.
    #[serde(default)]
    pub children_ids: Vec<ChunkId>,
    /// Tree level; 0 means leaf.
    pub level: u8,
    /// Whether the chunk contains a markdown table.
    #[serde(default)]
    pub has_table: bool,
    /// Structured table payload (JSON array of parsed tables).
    #[serde(default)]
    pub table_payload: Option<String>,
    /// Canonical standard keys referenced in the text.
    #[serde(default)]
    pub referenced_standards: Vec<String>,
    /// Specification values extracted from the text.
    #[serde(default)]
    pub spec_values: Vec<SpecValue>,
    /// Requirement strengths present in the text.
    #[serde(default)]
    pub requirement_strengths: Vec<String>,
}

impl Chunk {
    /// Creates a chunk with a content-addressed id.
    #[must_use]
    pub fn new(
        document: &str,
        page: u32,
        text_original: String,
        byte_range: Range<usize>,
        level: u8,
    ) -> Self {
        let id = Self::content_id(document, &byte_range, &text_original);
        Self {
            id,
            document: document.to_string(),
            page,
            section_number: String::new(),
            section_title: String::new(),
            section_path: String::new(),
            text_enriched: text_original.clone(),
            text_original,
            byte_range,
            parent_id: None,
            children_ids: Vec::new(),
            level,
            has_table: false,
            table_payload: None,
            referenced_standards: Vec::new(),
            spec_values: Vec::new(),
            requirement_strengths: Vec::new(),
        }
    }

    /// Derives the content-addressed id from document, range and content.
    ///
    /// Re-ingesting identical content yields identical ids, making vector
    /// and graph writes idempotent.
    #[must_use]
    pub fn content_id(document: &str, byte_range: &Range<usize>, text: &str) -> ChunkId {
        let mut hasher = DefaultHasher::new();
        document.hash(&mut hasher);
        byte_range.start.hash(&mut hasher);
        byte_range.end.hash(&mut hasher);
        text.hash(&mut hasher);
        format!("{document}:{:016x}", hasher.finish())
    }

    /// Whether this chunk is a retrieval-unit leaf.
    #[must_use]
    pub const fn is_leaf(&self) -> bool {
        self.level == 0
    }

    /// Size of the original text in bytes.
    #[must_use]
    pub fn size(&self) -> usize {
        self.text_original.len()
    }

    /// Feedback fingerprint: `(document, page, prefix(text_original, 500))`.
    #[must_use]
    pub fn fingerprint(&self) -> ChunkFingerprint {
        ChunkFingerprint::new(&self.document, self.page, &self.text_original)
    }

    /// Whether the chunk has any mandatory requirement.
    #[must_use]
    pub fn has_mandatory(&self) -> bool {
        self.requirement_strengths.iter().any(|s| s == "mandatory")
    }
}

/// Identifies a chunk for feedback attribution across re-ingests.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChunkFingerprint {
    /// Document name.
    pub document: String,
    /// Page number as stored with the feedback.
    pub page: u32,
    /// First 500 characters of the original text.
    pub text_prefix: String,
}

impl ChunkFingerprint {
    /// Maximum prefix length in characters.
    pub const PREFIX_CHARS: usize = 500;

    /// Builds a fingerprint from document, page and original text.
    #[must_use]
    pub fn new(document: &str, page: u32, text_original: &str) -> Self {
        let text_prefix: String = text_original.chars().take(Self::PREFIX_CHARS).collect();
        Self {
            document: document.to_string(),
            page,
            text_prefix,
        }
    }
}
