//! Knowledge graph construction from extracted entities.
//!
//! For every ingested chunk the constructor persists document, section,
//! standard, requirement and specification nodes plus the relationships
//! between them. Vector upserts complete before any graph edge for the
//! same document becomes visible (store-then-link ordering), so readers
//! never see edges pointing at chunks that are not retrievable yet.

use crate::core::{Chunk, DocumentRecord};
use crate::error::Result;
use crate::extract::{EntityExtractor, RequirementRef, Strength};
use crate::graph::{EdgeType, NodeKey, SqliteGraphStore};
use crate::vector::{Filter, FlagField, PointPayload, VectorStore};
use serde::Serialize;
use tracing::{debug, info};

/// Minimum token-set Jaccard overlap for a strength conflict.
const CONFLICT_JACCARD: f64 = 0.3;

/// Per-chunk graph construction summary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChunkGraphSummary {
    /// Standard nodes touched.
    pub standards: usize,
    /// Requirement nodes created.
    pub requirements: usize,
    /// Specification nodes touched.
    pub specifications: usize,
    /// Edges created or merged.
    pub edges: usize,
}

impl ChunkGraphSummary {
    fn add(&mut self, other: &Self) {
        self.standards += other.standards;
        self.requirements += other.requirements;
        self.specifications += other.specifications;
        self.edges += other.edges;
    }
}

/// A detected contradiction between two requirements.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StrengthConflict {
    /// Always `strength_conflict`.
    pub kind: &'static str,
    /// First requirement sentence.
    pub first: String,
    /// Strength of the first requirement.
    pub first_strength: Strength,
    /// Second requirement sentence.
    pub second: String,
    /// Strength of the second requirement.
    pub second_strength: Strength,
    /// Token-set Jaccard overlap.
    pub overlap: f64,
    /// Always `high`.
    pub severity: &'static str,
}

/// Derives entity and relationship structure from chunks into the graph.
#[derive(Debug, Default)]
pub struct KnowledgeGraphConstructor {
    extractor: EntityExtractor,
}

impl KnowledgeGraphConstructor {
    /// Creates a constructor with freshly compiled extractors.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Ensures the document node exists with its metadata.
    pub fn ensure_document(
        &self,
        graph: &mut SqliteGraphStore,
        document: &DocumentRecord,
    ) -> Result<()> {
        graph.upsert_node(
            &NodeKey::document(&document.name),
            &serde_json::json!({
                "name": document.name,
                "file_name": document.file_name,
                "categories": document.categories,
                "project": document.project,
                "standard_no": document.standard_no,
                "description": document.description,
            }),
        )
    }

    /// Processes one chunk: entity extraction plus node/edge persistence.
    pub fn process_chunk(
        &self,
        graph: &mut SqliteGraphStore,
        chunk: &Chunk,
        document: &DocumentRecord,
    ) -> Result<ChunkGraphSummary> {
        let mut summary = ChunkGraphSummary::default();
        let doc_key = NodeKey::document(&document.name);
        self.ensure_document(graph, document)?;

        // Section node under the document
        let section_key = if chunk.section_number.is_empty() {
            None
        } else {
            let key = NodeKey::section(&document.name, &chunk.section_number);
            graph.upsert_node(
                &key,
                &serde_json::json!({
                    "number": chunk.section_number,
                    "title": chunk.section_title,
                    "document": document.name,
                    "page": chunk.page,
                }),
            )?;
            graph.upsert_edge(&doc_key, &key, EdgeType::Contains, 1.0, false, None)?;
            summary.edges += 1;
            Some(key)
        };

        let extraction = self.extractor.extract(&chunk.text_original);

        // Standard nodes and REFERS_TO edges
        for std_ref in &extraction.standards {
            let std_key = NodeKey::standard(&std_ref.canonical);
            let raw_forms = self.merged_raw_forms(graph, &std_key, &std_ref.raw)?;
            graph.upsert_node(
                &std_key,
                &serde_json::json!({
                    "name": std_ref.canonical,
                    "family": std_ref.family.prefix(),
                    "raw_forms": raw_forms,
                }),
            )?;
            summary.standards += 1;

            graph.upsert_edge(&doc_key, &std_key, EdgeType::RefersTo, 1.0, false, None)?;
            summary.edges += 1;
            if let Some(section) = &section_key {
                graph.upsert_edge(section, &std_key, EdgeType::RefersTo, 1.0, false, None)?;
                summary.edges += 1;
            }
        }

        // Requirement nodes with SPECIFIES / REQUIRES edges
        for req in &extraction.requirements {
            let req_key = NodeKey::new(
                crate::graph::NodeLabel::Requirement,
                format!("{}::{}::{}", document.name, chunk.section_number, req.span.0),
            );
            graph.upsert_node(
                &req_key,
                &serde_json::json!({
                    "strength": req.strength.as_str(),
                    "text": req.sentence,
                    "source_document": document.name,
                    "source_section": chunk.section_number,
                }),
            )?;
            summary.requirements += 1;

            for spec in &extraction.specifications {
                if !within(spec.span, req.span) {
                    continue;
                }
                let spec_key = NodeKey::new(
                    crate::graph::NodeLabel::Specification,
                    format!("spec_{}_{}_{}", spec.param_type.as_str(), spec.value, spec.unit),
                );
                graph.upsert_node(
                    &spec_key,
                    &serde_json::json!({
                        "param_type": spec.param_type.as_str(),
                        "value": spec.value,
                        "unit": spec.unit,
                        "base_unit": spec.param_type.base_unit(),
                    }),
                )?;
                graph.upsert_edge(&req_key, &spec_key, EdgeType::Specifies, 1.0, false, None)?;
                summary.specifications += 1;
                summary.edges += 1;
            }

            for std_ref in &extraction.standards {
                if within(std_ref.span, req.span) {
                    let std_key = NodeKey::standard(&std_ref.canonical);
                    graph.upsert_edge(&req_key, &std_key, EdgeType::Requires, 1.0, false, None)?;
                    summary.edges += 1;
                }
            }
        }

        // Cross-reference phrases create typed edges from the document
        for cross in &extraction.cross_references {
            let std_key = NodeKey::standard(&cross.target_canonical);
            if graph.node(&std_key)?.is_none() {
                graph.upsert_node(
                    &std_key,
                    &serde_json::json!({
                        "name": cross.target_canonical,
                        "raw_forms": [cross.target_raw],
                    }),
                )?;
            }
            let edge_type = match cross.relation {
                crate::extract::RelationIntent::RefersTo => EdgeType::RefersTo,
                crate::extract::RelationIntent::Requires => EdgeType::Requires,
                crate::extract::RelationIntent::Supersedes => EdgeType::Supersedes,
            };
            graph.upsert_edge(&doc_key, &std_key, edge_type, 1.0, false, Some(&cross.phrase))?;
            summary.edges += 1;
        }

        debug!(
            chunk = %chunk.id,
            standards = summary.standards,
            requirements = summary.requirements,
            "chunk persisted to graph"
        );
        Ok(summary)
    }

    /// Processes every chunk of a document tree.
    pub fn process_document(
        &self,
        graph: &mut SqliteGraphStore,
        chunks: &[Chunk],
        document: &DocumentRecord,
    ) -> Result<ChunkGraphSummary> {
        let mut total = ChunkGraphSummary::default();
        for chunk in chunks.iter().filter(|c| c.is_leaf()) {
            total.add(&self.process_chunk(graph, chunk, document)?);
        }
        Ok(total)
    }

    /// Rebuilds the whole graph from the vector store's leaf payloads.
    pub fn rebuild<V: VectorStore>(
        &self,
        graph: &mut SqliteGraphStore,
        vectors: &V,
    ) -> Result<crate::graph::GraphStats> {
        graph.clear()?;
        let filter = Filter::Flag(FlagField::IsLeaf, true);
        let mut cursor = None;
        let mut processed = 0usize;
        loop {
            let (page, next) = vectors.scroll(Some(&filter), 256, cursor)?;
            for point in &page {
                let chunk = payload_to_chunk(&point.id, &point.payload);
                let document = payload_to_document(&point.payload);
                self.process_chunk(graph, &chunk, &document)?;
                processed += 1;
            }
            match next {
                Some(c) => cursor = Some(c),
                None => break,
            }
        }
        info!(processed, "graph rebuilt from vector store");
        graph.statistics()
    }

    /// Pairs requirements whose strengths are {mandatory, prohibited} and
    /// whose token sets overlap with Jaccard >= 0.3.
    #[must_use]
    pub fn detect_conflicts(
        &self,
        first: &[RequirementRef],
        second: &[RequirementRef],
    ) -> Vec<StrengthConflict> {
        let mut conflicts = Vec::new();
        for r1 in first {
            for r2 in second {
                let opposed = matches!(
                    (r1.strength, r2.strength),
                    (Strength::Mandatory, Strength::Prohibited)
                        | (Strength::Prohibited, Strength::Mandatory)
                );
                if !opposed {
                    continue;
                }
                let overlap = jaccard(&r1.sentence, &r2.sentence);
                if overlap >= CONFLICT_JACCARD {
                    conflicts.push(StrengthConflict {
                        kind: "strength_conflict",
                        first: r1.sentence.clone(),
                        first_strength: r1.strength,
                        second: r2.sentence.clone(),
                        second_strength: r2.strength,
                        overlap,
                        severity: "high",
                    });
                }
            }
        }
        conflicts
    }

    fn merged_raw_forms(
        &self,
        graph: &SqliteGraphStore,
        key: &NodeKey,
        raw: &str,
    ) -> Result<Vec<String>> {
        let mut forms: Vec<String> = graph
            .node(key)?
            .and_then(|n| {
                n.props
                    .get("raw_forms")
                    .and_then(|v| serde_json::from_value(v.clone()).ok())
            })
            .unwrap_or_default();
        if !forms.iter().any(|f| f == raw) {
            forms.push(raw.to_string());
        }
        Ok(forms)
    }
}

/// Whether `inner` lies within `outer`.
const fn within(inner: (usize, usize), outer: (usize, usize)) -> bool {
    inner.0 >= outer.0 && inner.1 <= outer.1
}

/// Token-set Jaccard similarity of two sentences.
fn jaccard(a: &str, b: &str) -> f64 {
    let set_a: std::collections::HashSet<String> =
        a.to_lowercase().split_whitespace().map(String::from).collect();
    let set_b: std::collections::HashSet<String> =
        b.to_lowercase().split_whitespace().map(String::from).collect();
    if set_a.is_empty() || set_b.is_empty() {
        return 0.0;
    }
    let intersection = set_a.intersection(&set_b).count();
    let union = set_a.union(&set_b).count();
    #[allow(clippy::cast_precision_loss)]
    {
        intersection as f64 / union as f64
    }
}

fn payload_to_chunk(id: &str, payload: &PointPayload) -> Chunk {
    Chunk {
        id: id.to_string(),
        document: payload.document_name.clone(),
        page: payload.page,
        section_number: payload.section_number.clone(),
        section_title: payload.section_title.clone(),
        section_path: payload.section_path.clone(),
        text_original: payload.text_original.clone(),
        text_enriched: payload.text_enriched.clone(),
        byte_range: 0..payload.text_original.len(),
        parent_id: payload.parent_id.clone(),
        children_ids: payload.children_ids.clone(),
        level: payload.level,
        has_table: payload.has_table,
        table_payload: payload.table_payload.clone(),
        referenced_standards: payload.referenced_standards.clone(),
        spec_values: payload.spec_values.clone(),
        requirement_strengths: payload.requirement_strengths.clone(),
    }
}

fn payload_to_document(payload: &PointPayload) -> DocumentRecord {
    DocumentRecord {
        name: payload.document_name.clone(),
        file_name: payload.file_name.clone(),
        categories: payload.categories.clone(),
        project: payload.project.clone(),
        ..DocumentRecord::default()
    }
}
