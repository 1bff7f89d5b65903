//! Document ingestion pipeline.
//!
//! Ingestion is pipelined across documents: a bounded pool of parse
//! workers (at most `min(available_parallelism, 8)`) reads, section-
//! parses, chunks and enriches files, feeding a bounded queue whose
//! backpressure makes the parsers yield while the embed stage drains.
//! The consumer embeds each document's leaves in batches, upserts to the
//! vector store and only then links the knowledge graph, so readers
//! never see edges for chunks that are not retrievable yet. A parse
//! failure marks the file failed and the run moves on; chunk ids are
//! content-addressed so re-ingesting is idempotent.

pub mod reader;

pub use reader::{read_document, PageText, RawDocument};

use crate::chunking::{ContextEnricher, HierarchicalChunker, PageSpan};
use crate::config::DocumentMapping;
use crate::core::{Chunk, DocumentRecord};
use crate::embedding::Embedder;
use crate::error::Result;
use crate::graph::SqliteGraphStore;
use crate::kg::KnowledgeGraphConstructor;
use crate::parse::sections::{SectionParser, TocEntry};
use crate::vector::{Point, PointPayload, VectorStore};
use serde::Serialize;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

/// Embedding batch size during ingestion.
const EMBED_BATCH: usize = 32;

/// Upper bound on parallel parse workers.
const MAX_INGEST_WORKERS: usize = 8;

/// Cooperative cancellation token checked between files and batches.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Creates a fresh, uncancelled token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Outcome of one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    /// Parsed, chunked, embedded and linked.
    Indexed,
    /// Empty document; nothing was written.
    Skipped,
    /// Parse or store failure; see the message.
    Failed,
}

/// Per-file ingestion result.
#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    /// File name.
    pub file_name: String,
    /// Document name derived from the file.
    pub document: String,
    /// Outcome.
    pub status: FileStatus,
    /// Leaf chunks indexed.
    pub chunks: usize,
    /// Sections detected.
    pub sections: usize,
    /// Failure message for failed files.
    pub error: Option<String>,
}

/// Aggregated ingestion report.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestReport {
    /// Per-file results, in input order.
    pub files: Vec<FileReport>,
    /// Total leaf chunks indexed.
    pub total_chunks: usize,
    /// Whether the run was cancelled before completing.
    pub cancelled: bool,
}

impl IngestReport {
    /// Number of files that indexed successfully.
    #[must_use]
    pub fn indexed(&self) -> usize {
        self.files
            .iter()
            .filter(|f| f.status == FileStatus::Indexed)
            .count()
    }

    /// Number of failed files.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.files
            .iter()
            .filter(|f| f.status == FileStatus::Failed)
            .count()
    }
}

/// Options for an ingestion run.
#[derive(Debug, Clone, Default)]
pub struct IngestOptions {
    /// Category applied to all files in this run.
    pub categories: Vec<String>,
    /// Project applied to all files in this run.
    pub project: Option<String>,
    /// Externally extracted TOC entries, when available.
    pub toc: Vec<TocEntry>,
    /// Cancellation token.
    pub cancel: CancellationToken,
}

/// A parsed, chunked and enriched document waiting for the embed stage.
struct PreparedDocument {
    file_name: String,
    document: DocumentRecord,
    chunks: Vec<Chunk>,
    section_count: usize,
}

/// What the parse stage hands to the embed stage for one file.
enum Prepared {
    /// Nothing to embed: the file was skipped (or similar).
    Report(FileReport),
    /// A document ready for embedding and store writes.
    Ready(Box<PreparedDocument>),
}

/// The ingestion pipeline.
pub struct IngestPipeline {
    chunker: HierarchicalChunker,
    enricher: ContextEnricher,
    sections: SectionParser,
    kg: KnowledgeGraphConstructor,
}

impl Default for IngestPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl IngestPipeline {
    /// Creates a pipeline with default chunking.
    #[must_use]
    pub fn new() -> Self {
        Self {
            chunker: HierarchicalChunker::new(),
            enricher: ContextEnricher::new(),
            sections: SectionParser::new(),
            kg: KnowledgeGraphConstructor::new(),
        }
    }

    /// Ingests a set of files into the vector store and knowledge graph.
    ///
    /// Parsing runs on a bounded worker pool while this thread drains the
    /// queue, embedding and store-linking one document at a time. Reports
    /// come back in input order.
    pub fn ingest<V: VectorStore>(
        &self,
        paths: &[&Path],
        mappings: &std::collections::BTreeMap<String, DocumentMapping>,
        options: &IngestOptions,
        vectors: &mut V,
        graph: &mut SqliteGraphStore,
        embedder: &dyn Embedder,
    ) -> Result<IngestReport> {
        let workers = std::thread::available_parallelism()
            .map_or(1, std::num::NonZeroUsize::get)
            .min(MAX_INGEST_WORKERS)
            .min(paths.len())
            .max(1);
        let next_path = AtomicUsize::new(0);
        // Bounded parse -> embed queue: when the embed stage falls
        // behind, full slots make the parse workers yield
        let (tx, rx) = std::sync::mpsc::sync_channel::<(usize, Result<Prepared>)>(workers);

        let slots = std::thread::scope(|scope| -> Result<Vec<Option<FileReport>>> {
            for _ in 0..workers {
                let tx = tx.clone();
                let next_path = &next_path;
                scope.spawn(move || loop {
                    if options.cancel.is_cancelled() {
                        break;
                    }
                    let idx = next_path.fetch_add(1, Ordering::SeqCst);
                    if idx >= paths.len() {
                        break;
                    }
                    let prepared = self.prepare_file(paths[idx], mappings, options);
                    // A send error means the consumer bailed; stop parsing
                    if tx.send((idx, prepared)).is_err() {
                        break;
                    }
                });
            }
            drop(tx);

            let mut slots: Vec<Option<FileReport>> = vec![None; paths.len()];
            for (idx, prepared) in rx {
                let file_report = match prepared {
                    Ok(Prepared::Report(report)) => report,
                    Ok(Prepared::Ready(doc)) => {
                        self.index_document(*doc, options, vectors, graph, embedder)?
                    }
                    Err(e) if matches!(e, crate::error::Error::Parse(_)) => {
                        // A bad file never stops the run
                        warn!(path = %paths[idx].display(), error = %e, "file failed to parse");
                        FileReport {
                            file_name: paths[idx]
                                .file_name()
                                .map_or_else(String::new, |n| n.to_string_lossy().to_string()),
                            document: String::new(),
                            status: FileStatus::Failed,
                            chunks: 0,
                            sections: 0,
                            error: Some(e.to_string()),
                        }
                    }
                    Err(e) => return Err(e),
                };
                slots[idx] = Some(file_report);
            }
            Ok(slots)
        })?;

        let mut report = IngestReport {
            cancelled: options.cancel.is_cancelled(),
            ..IngestReport::default()
        };
        for file_report in slots.into_iter().flatten() {
            report.total_chunks += file_report.chunks;
            report.files.push(file_report);
        }

        info!(
            files = report.files.len(),
            indexed = report.indexed(),
            failed = report.failed(),
            chunks = report.total_chunks,
            workers,
            "ingestion complete"
        );
        Ok(report)
    }

    /// Ingests a single file synchronously.
    pub fn ingest_file<V: VectorStore>(
        &self,
        path: &Path,
        mappings: &std::collections::BTreeMap<String, DocumentMapping>,
        options: &IngestOptions,
        vectors: &mut V,
        graph: &mut SqliteGraphStore,
        embedder: &dyn Embedder,
    ) -> Result<FileReport> {
        match self.prepare_file(path, mappings, options)? {
            Prepared::Report(report) => Ok(report),
            Prepared::Ready(doc) => self.index_document(*doc, options, vectors, graph, embedder),
        }
    }

    /// Parse stage: read, section-parse, chunk and enrich one file.
    /// Store-free, so it can run on any worker.
    fn prepare_file(
        &self,
        path: &Path,
        mappings: &std::collections::BTreeMap<String, DocumentMapping>,
        options: &IngestOptions,
    ) -> Result<Prepared> {
        let raw = read_document(path)?;
        let document = self.document_record(&raw, mappings, options);
        info!(file = %raw.file_name, document = %document.name, "ingesting");

        if raw.is_empty() {
            return Ok(Prepared::Report(FileReport {
                file_name: raw.file_name,
                document: document.name,
                status: FileStatus::Skipped,
                chunks: 0,
                sections: 0,
                error: None,
            }));
        }

        let (text, page_offsets) = raw.joined();
        let sections = self.sections.parse(&text, &options.toc);
        let pages: Vec<PageSpan> = page_offsets
            .iter()
            .map(|&(page, start)| PageSpan { page, start })
            .collect();

        let mut chunks = self.chunker.chunk(&document.name, &text, &sections, &pages);
        self.enricher.enrich_tree(&mut chunks, &document, &sections);

        Ok(Prepared::Ready(Box::new(PreparedDocument {
            file_name: raw.file_name,
            document,
            chunks,
            section_count: sections.len(),
        })))
    }

    /// Embed stage: batch-embed the leaves, upsert vectors, then link the
    /// knowledge graph (store-then-link ordering).
    fn index_document<V: VectorStore>(
        &self,
        prepared: PreparedDocument,
        options: &IngestOptions,
        vectors: &mut V,
        graph: &mut SqliteGraphStore,
        embedder: &dyn Embedder,
    ) -> Result<FileReport> {
        let PreparedDocument {
            file_name,
            document,
            chunks,
            section_count,
        } = prepared;

        // Only leaves carry vectors; interior nodes store payload only
        let mut points = Vec::with_capacity(chunks.len());
        let leaf_indices: Vec<usize> = chunks
            .iter()
            .enumerate()
            .filter(|(_, c)| c.is_leaf())
            .map(|(i, _)| i)
            .collect();

        for batch in leaf_indices.chunks(EMBED_BATCH) {
            if options.cancel.is_cancelled() {
                // The batch in flight either completed or is re-done on the
                // next run under the same content-addressed ids
                return Ok(FileReport {
                    file_name,
                    document: document.name,
                    status: FileStatus::Failed,
                    chunks: 0,
                    sections: section_count,
                    error: Some("cancelled".to_string()),
                });
            }
            let texts: Vec<&str> = batch
                .iter()
                .map(|&i| chunks[i].text_enriched.as_str())
                .collect();
            let embeddings = embedder.embed_batch(&texts)?;
            for (&i, embedding) in batch.iter().zip(embeddings) {
                points.push(Point {
                    id: chunks[i].id.clone(),
                    vector: Some(embedding),
                    payload: PointPayload::from_chunk(&chunks[i], &document),
                });
            }
        }
        for chunk in chunks.iter().filter(|c| !c.is_leaf()) {
            points.push(Point {
                id: chunk.id.clone(),
                vector: None,
                payload: PointPayload::from_chunk(chunk, &document),
            });
        }

        // Store-then-link: vector upsert first, graph edges after
        vectors.upsert(&points)?;
        let leaves: Vec<&Chunk> = chunks.iter().filter(|c| c.is_leaf()).collect();
        for leaf in &leaves {
            self.kg.process_chunk(graph, leaf, &document)?;
        }

        Ok(FileReport {
            file_name,
            document: document.name,
            status: FileStatus::Indexed,
            chunks: leaves.len(),
            sections: section_count,
            error: None,
        })
    }

    /// Deletes a document from both stores.
    pub fn delete_document<V: VectorStore>(
        &self,
        name: &str,
        vectors: &mut V,
        graph: &mut SqliteGraphStore,
    ) -> Result<usize> {
        let removed =
            vectors.delete_by_filter(&crate::vector::Filter::DocumentEq(name.to_string()))?;
        graph.delete_document(name)?;
        info!(document = name, removed, "document deleted");
        Ok(removed)
    }

    fn document_record(
        &self,
        raw: &RawDocument,
        mappings: &std::collections::BTreeMap<String, DocumentMapping>,
        options: &IngestOptions,
    ) -> DocumentRecord {
        let mut document = DocumentRecord::from_file_name(&raw.file_name);
        if let Some(mapping) = mappings.get(&raw.file_name) {
            if let Some(category) = &mapping.category {
                document.categories = vec![category.clone()];
            }
            document.project.clone_from(&mapping.project);
            document.standard_no.clone_from(&mapping.standard_no);
            document.date.clone_from(&mapping.date);
            document.description.clone_from(&mapping.description);
        }
        // Run-level options win over the stored mapping
        if !options.categories.is_empty() {
            document.categories.clone_from(&options.categories);
        }
        if options.project.is_some() {
            document.project.clone_from(&options.project);
        }
        document
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::FallbackEmbedder;
    use crate::graph::NodeKey;
    use crate::vector::{Filter, FlagField, SqliteVectorStore};
    use std::collections::BTreeMap;

    const DIMS: usize = 64;

    const SAMPLE_MD: &str = "\
# 6 Wiring

General wiring rules apply to all circuits in this building.

## 6.5 Cabling

Cables shall comply with IEC 60364-5-52 for all installations.
The minimum conductor size shall be 2.5 mm² for socket circuits.
";

    struct Rig {
        dir: tempfile::TempDir,
        vectors: SqliteVectorStore,
        graph: SqliteGraphStore,
        embedder: FallbackEmbedder,
    }

    fn rig() -> Rig {
        let mut vectors = SqliteVectorStore::in_memory("test").unwrap();
        vectors.create_collection(DIMS, false).unwrap();
        Rig {
            dir: tempfile::tempdir().unwrap(),
            vectors,
            graph: SqliteGraphStore::in_memory().unwrap(),
            embedder: FallbackEmbedder::new(DIMS),
        }
    }

    fn write_file(rig: &Rig, name: &str, content: &str) -> std::path::PathBuf {
        let path = rig.dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_ingest_markdown() {
        let mut rig = rig();
        let path = write_file(&rig, "wiring.md", SAMPLE_MD);
        let pipeline = IngestPipeline::new();
        let report = pipeline
            .ingest(
                &[path.as_path()],
                &BTreeMap::new(),
                &IngestOptions::default(),
                &mut rig.vectors,
                &mut rig.graph,
                &rig.embedder,
            )
            .unwrap();

        assert_eq!(report.files.len(), 1);
        assert_eq!(report.files[0].status, FileStatus::Indexed);
        assert!(report.total_chunks > 0);
        assert_eq!(report.files[0].sections, 2);

        // Leaves landed in the vector store with embeddings
        let leaves = rig
            .vectors
            .count(Some(&Filter::Flag(FlagField::IsLeaf, true)))
            .unwrap();
        assert_eq!(leaves, report.total_chunks);

        // Graph received the document and the referenced standard
        assert!(rig.graph.node(&NodeKey::document("wiring")).unwrap().is_some());
        assert!(rig
            .graph
            .node(&NodeKey::standard("IEC60364-5-52"))
            .unwrap()
            .is_some());
    }

    #[test]
    fn test_ingest_many_files_in_input_order() {
        let mut rig = rig();
        // More files than parse workers, to exercise the pool and queue
        let paths: Vec<std::path::PathBuf> = (0..12)
            .map(|i| {
                write_file(
                    &rig,
                    &format!("doc{i:02}.md"),
                    &format!("# 1 Scope\n\nDocument {i} cables shall be 2.5 mm².\n"),
                )
            })
            .collect();
        let path_refs: Vec<&Path> = paths.iter().map(std::path::PathBuf::as_path).collect();

        let pipeline = IngestPipeline::new();
        let report = pipeline
            .ingest(
                &path_refs,
                &BTreeMap::new(),
                &IngestOptions::default(),
                &mut rig.vectors,
                &mut rig.graph,
                &rig.embedder,
            )
            .unwrap();

        assert_eq!(report.indexed(), 12);
        assert!(!report.cancelled);
        // Reports come back in input order regardless of worker timing
        let names: Vec<&str> = report.files.iter().map(|f| f.file_name.as_str()).collect();
        let mut sorted = names.clone();
        sorted.sort_unstable();
        assert_eq!(names, sorted);
        // Every document made it into both stores
        assert_eq!(rig.vectors.document_names().unwrap().len(), 12);
        assert_eq!(rig.graph.statistics().unwrap().documents, 12);
    }

    #[test]
    fn test_empty_file_skipped() {
        let mut rig = rig();
        let path = write_file(&rig, "empty.txt", "   \n  ");
        let pipeline = IngestPipeline::new();
        let report = pipeline
            .ingest(
                &[path.as_path()],
                &BTreeMap::new(),
                &IngestOptions::default(),
                &mut rig.vectors,
                &mut rig.graph,
                &rig.embedder,
            )
            .unwrap();

        assert_eq!(report.files[0].status, FileStatus::Skipped);
        assert_eq!(report.total_chunks, 0);
        // No graph nodes for a skipped document
        assert!(rig.graph.node(&NodeKey::document("empty")).unwrap().is_none());
    }

    #[test]
    fn test_unreadable_file_fails_run_continues() {
        let mut rig = rig();
        let good = write_file(&rig, "good.md", SAMPLE_MD);
        let missing = rig.dir.path().join("missing.md");
        let pipeline = IngestPipeline::new();
        let report = pipeline
            .ingest(
                &[missing.as_path(), good.as_path()],
                &BTreeMap::new(),
                &IngestOptions::default(),
                &mut rig.vectors,
                &mut rig.graph,
                &rig.embedder,
            )
            .unwrap();

        assert_eq!(report.files.len(), 2);
        assert_eq!(report.files[0].status, FileStatus::Failed);
        assert_eq!(report.files[1].status, FileStatus::Indexed);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.indexed(), 1);
    }

    #[test]
    fn test_reingest_idempotent() {
        let mut rig = rig();
        let path = write_file(&rig, "wiring.md", SAMPLE_MD);
        let pipeline = IngestPipeline::new();

        let first = pipeline
            .ingest_file(
                &path,
                &BTreeMap::new(),
                &IngestOptions::default(),
                &mut rig.vectors,
                &mut rig.graph,
                &rig.embedder,
            )
            .unwrap();
        let count_after_first = rig.vectors.count(None).unwrap();
        let graph_after_first = rig.graph.statistics().unwrap();

        let second = pipeline
            .ingest_file(
                &path,
                &BTreeMap::new(),
                &IngestOptions::default(),
                &mut rig.vectors,
                &mut rig.graph,
                &rig.embedder,
            )
            .unwrap();

        // Same ids, same counts, no duplicate edges
        assert_eq!(first.chunks, second.chunks);
        assert_eq!(rig.vectors.count(None).unwrap(), count_after_first);
        let graph_after_second = rig.graph.statistics().unwrap();
        assert_eq!(graph_after_first.edges, graph_after_second.edges);
    }

    #[test]
    fn test_cancellation_between_files() {
        let mut rig = rig();
        let a = write_file(&rig, "a.md", SAMPLE_MD);
        let b = write_file(&rig, "b.md", SAMPLE_MD);
        let options = IngestOptions::default();
        options.cancel.cancel();
        let pipeline = IngestPipeline::new();
        let report = pipeline
            .ingest(
                &[a.as_path(), b.as_path()],
                &BTreeMap::new(),
                &options,
                &mut rig.vectors,
                &mut rig.graph,
                &rig.embedder,
            )
            .unwrap();
        assert!(report.cancelled);
        assert!(report.files.is_empty());
    }

    #[test]
    fn test_mapping_metadata_applied() {
        let mut rig = rig();
        let path = write_file(&rig, "wiring.md", SAMPLE_MD);
        let mut mappings = BTreeMap::new();
        mappings.insert(
            "wiring.md".to_string(),
            DocumentMapping {
                category: Some("Standard".to_string()),
                project: Some("Metro".to_string()),
                description: Some("Wiring rules".to_string()),
                ..DocumentMapping::default()
            },
        );
        let pipeline = IngestPipeline::new();
        pipeline
            .ingest_file(
                &path,
                &mappings,
                &IngestOptions::default(),
                &mut rig.vectors,
                &mut rig.graph,
                &rig.embedder,
            )
            .unwrap();

        let (points, _) = rig
            .vectors
            .scroll(Some(&Filter::ProjectEq("Metro".to_string())), 5, None)
            .unwrap();
        assert!(!points.is_empty());
        assert_eq!(points[0].payload.categories, vec!["Standard".to_string()]);
        // Context prefix picked up the description
        let leaf = points.iter().find(|p| p.payload.level == 0).unwrap();
        assert!(leaf.payload.text_enriched.contains("Wiring rules"));
    }

    #[test]
    fn test_delete_document() {
        let mut rig = rig();
        let path = write_file(&rig, "wiring.md", SAMPLE_MD);
        let pipeline = IngestPipeline::new();
        pipeline
            .ingest_file(
                &path,
                &BTreeMap::new(),
                &IngestOptions::default(),
                &mut rig.vectors,
                &mut rig.graph,
                &rig.embedder,
            )
            .unwrap();

        let removed = pipeline
            .delete_document("wiring", &mut rig.vectors, &mut rig.graph)
            .unwrap();
        assert!(removed > 0);
        assert_eq!(rig.vectors.count(None).unwrap(), 0);
        assert!(rig.graph.node(&NodeKey::document("wiring")).unwrap().is_none());
    }

    #[test]
    fn test_leaf_prefix_invariant() {
        let mut rig = rig();
        let path = write_file(&rig, "wiring.md", SAMPLE_MD);
        let pipeline = IngestPipeline::new();
        pipeline
            .ingest_file(
                &path,
                &BTreeMap::new(),
                &IngestOptions::default(),
                &mut rig.vectors,
                &mut rig.graph,
                &rig.embedder,
            )
            .unwrap();

        let (leaves, _) = rig
            .vectors
            .scroll(Some(&Filter::Flag(FlagField::IsLeaf, true)), 100, None)
            .unwrap();
        for leaf in leaves {
            // Every stored leaf starts with the document context prefix
            assert!(
                leaf.payload.text_enriched.starts_with("[Document: wiring]"),
                "prefix missing on {}",
                leaf.id
            );
        }
    }
}
