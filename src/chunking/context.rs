//! Context prefix injection for leaf chunks.
//!
//! Each leaf's embedded text starts with a deterministic bracketed header
//! naming the document, section path, page and (when present) table
//! contents. LLM-written summaries are optional and never replace the
//! deterministic prefix.

use crate::core::{Chunk, DocumentRecord};
use crate::extract::EntityExtractor;
use crate::llm::Completer;
use crate::parse::sections::{Section, SectionParser};
use crate::parse::tables::TableParser;
use std::sync::Arc;
use tracing::warn;

/// Maximum context prefix length in characters.
pub const MAX_PREFIX_CHARS: usize = 200;

/// How many leading bracket lines survive prefix truncation.
const PRESERVED_LINES: usize = 3;

/// Enriches chunks with section lineage, entity metadata, table payloads
/// and the context prefix.
#[derive(Default)]
pub struct ContextEnricher {
    sections: SectionParser,
    tables: TableParser,
    entities: EntityExtractor,
    summarizer: Option<Arc<dyn Completer>>,
}

impl ContextEnricher {
    /// Creates an enricher with freshly compiled extractors. LLM
    /// summarisation is off.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables LLM-written chunk summaries. The summary is stored as an
    /// additional `[Context: ...]` line; the deterministic prefix always
    /// stays.
    #[must_use]
    pub fn with_summarizer(mut self, summarizer: Arc<dyn Completer>) -> Self {
        self.summarizer = Some(summarizer);
        self
    }

    /// Enriches every chunk in a document tree in place. Leaves are
    /// processed in parallel.
    ///
    /// Leaves receive the full treatment (prefix, tables, entities);
    /// interior nodes only get their section lineage, since they are
    /// never embedded.
    pub fn enrich_tree(&self, chunks: &mut [Chunk], document: &DocumentRecord, sections: &[Section]) {
        use rayon::prelude::*;

        // Position of each leaf among its parent's children
        let leaf_positions = leaf_positions(chunks);

        chunks.par_iter_mut().for_each(|chunk| {
            self.attach_section(chunk, sections);
            if chunk.is_leaf() {
                let position = leaf_positions.get(&chunk.id).copied();
                self.enrich_leaf(chunk, document, position);
            }
        });
    }

    fn attach_section(&self, chunk: &mut Chunk, sections: &[Section]) {
        if let Some(idx) = SectionParser::section_at(sections, chunk.byte_range.start) {
            let section = &sections[idx];
            chunk.section_number = section.number.clone();
            chunk.section_title = section.title.clone();
            chunk.section_path = SectionParser::build_path(sections, idx);
        }
    }

    fn enrich_leaf(&self, chunk: &mut Chunk, document: &DocumentRecord, position: Option<(usize, usize)>) {
        // Entity metadata for the payload
        let extraction = self.entities.extract(&chunk.text_original);
        let meta = extraction.metadata();
        chunk.referenced_standards = meta.referenced_standards;
        chunk.spec_values = meta.spec_values;
        chunk.requirement_strengths = meta.requirement_strengths;

        // Tables: JSON payload plus textual forms appended after the text
        let tables = self.tables.extract_tables(&chunk.text_original);
        let mut table_line = None;
        let mut table_suffix = String::new();
        if !tables.is_empty() {
            chunk.has_table = true;
            table_line = Some(table_context_line(&tables[0]));
            let jsons: Vec<String> =
                tables.iter().map(crate::parse::tables::ParsedTable::to_json).collect();
            chunk.table_payload = serde_json::to_string(&jsons).ok();
            for table in &tables {
                table_suffix.push_str("\n\n");
                table_suffix.push_str(&table.to_natural_language());
                table_suffix.push('\n');
                table_suffix.push_str(&table.summary());
            }
        }

        let mut prefix = build_prefix(document, chunk, table_line.as_deref(), position);
        if let Some(summary) = self.summarize(chunk, document) {
            prefix.push_str(&format!("\n[Context: {summary}]"));
        }
        chunk.text_enriched = format!("{prefix}\n\n{}{table_suffix}", chunk.text_original);
    }

    /// Optional LLM-written one-sentence context. Failures degrade to the
    /// deterministic prefix alone.
    fn summarize(&self, chunk: &Chunk, document: &DocumentRecord) -> Option<String> {
        let summarizer = self.summarizer.as_ref()?;
        let excerpt: String = chunk.text_original.chars().take(500).collect();
        let prompt = format!(
            "Provide a brief one-sentence context for this document chunk, \
             explaining what it is about and how it fits in the document.\n\
             Document: {}\nSection: {}\n\nChunk:\n{excerpt}",
            document.name,
            if chunk.section_path.is_empty() {
                "N/A"
            } else {
                &chunk.section_path
            },
        );
        match summarizer.complete("You summarise technical document chunks.", &prompt) {
            Ok(summary) => Some(summary.trim().to_string()).filter(|s| !s.is_empty()),
            Err(e) => {
                warn!(error = %e, "chunk summarisation failed");
                None
            }
        }
    }
}

/// Builds the bracketed context prefix, capped at [`MAX_PREFIX_CHARS`].
///
/// On truncation the first three bracket lines (document, section, page)
/// are preserved in full.
fn build_prefix(
    document: &DocumentRecord,
    chunk: &Chunk,
    table_line: Option<&str>,
    position: Option<(usize, usize)>,
) -> String {
    let mut lines = vec![format!("[Document: {}]", document.display_summary())];

    if !chunk.section_path.is_empty() {
        lines.push(format!("[Section: {}]", chunk.section_path));
    } else if !chunk.section_title.is_empty() {
        lines.push(format!("[Section: {}]", chunk.section_title));
    }

    if chunk.page > 0 {
        lines.push(format!("[Page: {}]", chunk.page));
    }

    if let Some(table) = table_line {
        lines.push(format!("[{table}]"));
    }

    if let Some((idx, total)) = position {
        if total > 1 {
            let tag = if idx == 0 {
                "first".to_string()
            } else if idx + 1 == total {
                "end".to_string()
            } else {
                format!("part {}/{total}", idx + 1)
            };
            lines.push(format!("[Position: {tag}]"));
        }
    }

    let full = lines.join("\n");
    if full.chars().count() <= MAX_PREFIX_CHARS {
        return full;
    }
    lines.truncate(PRESERVED_LINES);
    lines.join("\n")
}

/// One-line description of the leading table for the prefix.
fn table_context_line(table: &crate::parse::tables::ParsedTable) -> String {
    if !table.caption.is_empty() {
        return format!("Contains {}", table.caption);
    }
    if table.headers.is_empty() {
        return "Contains tabular data".to_string();
    }
    let shown: Vec<&str> = table.headers.iter().take(5).map(String::as_str).collect();
    format!("Contains table with columns: {}", shown.join(", "))
}

/// Maps each leaf id to its (index, sibling count) under its parent.
fn leaf_positions(chunks: &[Chunk]) -> std::collections::HashMap<String, (usize, usize)> {
    let mut positions = std::collections::HashMap::new();
    let leaf_ids: std::collections::HashSet<&str> = chunks
        .iter()
        .filter(|c| c.is_leaf())
        .map(|c| c.id.as_str())
        .collect();

    for chunk in chunks {
        let leaf_children: Vec<&String> = chunk
            .children_ids
            .iter()
            .filter(|id| leaf_ids.contains(id.as_str()))
            .collect();
        let total = leaf_children.len();
        for (idx, id) in leaf_children.into_iter().enumerate() {
            positions.insert(id.clone(), (idx, total));
        }
    }
    positions
}
