//! Query blending: cache, dense retrieval, graph expansion, feedback
//! re-ranking and answer generation.
//!
//! Stage failures degrade gracefully: a cache miss is normal, a graph
//! failure drops the related-information block, an LLM failure returns
//! the assembled context flagged with the error. Only retrieval failure
//! aborts the query.

use crate::cache::SemanticCache;
use crate::embedding::Embedder;
use crate::error::Result;
use crate::extract::EntityExtractor;
use crate::feedback::{FeedbackReranker, FeedbackStore};
use crate::graph::{EdgeFilter, EdgeType, NodeKey, SqliteGraphStore, TraversalConfig};
use crate::llm::{Completer, SYSTEM_PROMPT};
use crate::vector::{Filter, ScoredPoint, VectorStore};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Default number of leaves fetched from dense retrieval.
pub const DEFAULT_TOP_K: usize = 10;

/// Default context character cap.
pub const DEFAULT_MAX_CONTEXT_CHARS: usize = 12_000;

/// Default cap on graph nodes folded into the context.
pub const DEFAULT_MAX_GRAPH_RESULTS: usize = 20;

/// Options for a single query.
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    /// Payload filter applied to retrieval.
    pub filter: Option<Filter>,
    /// Override for the retrieval depth.
    pub top_k: Option<usize>,
    /// Disables graph expansion when false.
    pub use_graph: bool,
}

impl QueryOptions {
    /// Options with graph expansion enabled.
    #[must_use]
    pub fn new() -> Self {
        Self {
            use_graph: true,
            ..Self::default()
        }
    }
}

/// A source backing an answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceInfo {
    /// Document name.
    pub document: String,
    /// Page number.
    pub page: u32,
    /// Section number.
    pub section_number: String,
    /// Section path.
    pub section_path: String,
    /// Retrieval score after re-ranking.
    pub score: f32,
    /// Original chunk text.
    pub text: String,
}

impl SourceInfo {
    fn from_point(point: &ScoredPoint) -> Self {
        Self {
            document: point.payload.document_name.clone(),
            page: point.payload.page,
            section_number: point.payload.section_number.clone(),
            section_path: point.payload.section_path.clone(),
            score: point.score,
            text: point.payload.text_original.clone(),
        }
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

/// Metadata about how an answer was produced.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryMetadata {
    /// Whether the answer came from the semantic cache.
    pub cached: bool,
    /// Whether graph expansion contributed context.
    pub graph_used: bool,
    /// Number of graph nodes folded in.
    pub graph_nodes: usize,
    /// LLM failure message, when the answer degraded to raw context.
    pub llm_error: Option<String>,
}

/// A structured query response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    /// The answer (or assembled context on LLM failure).
    pub answer: String,
    /// Sources backing the answer.
    pub sources: Vec<SourceInfo>,
    /// Production metadata.
    pub metadata: QueryMetadata,
}

/// Borrowed components the blender runs over.
pub struct QueryDeps<'a, V: VectorStore> {
    /// Vector store for dense retrieval.
    pub vectors: &'a V,
    /// Knowledge graph for expansion.
    pub graph: &'a SqliteGraphStore,
    /// Semantic answer cache.
    pub cache: &'a mut SemanticCache,
    /// Feedback store for re-ranking.
    pub feedback: &'a FeedbackStore,
    /// Embedding provider.
    pub embedder: &'a dyn Embedder,
    /// Completion provider, if configured.
    pub completer: Option<&'a dyn Completer>,
}

/// The query blender.
#[derive(Debug)]
pub struct QueryEngine {
    top_k: usize,
    max_context_chars: usize,
    max_graph_results: usize,
    reranker: FeedbackReranker,
    extractor: EntityExtractor,
}

impl Default for QueryEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryEngine {
    /// Creates a blender with default limits.
    #[must_use]
    pub fn new() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            max_context_chars: DEFAULT_MAX_CONTEXT_CHARS,
            max_graph_results: DEFAULT_MAX_GRAPH_RESULTS,
            reranker: FeedbackReranker::default(),
            extractor: EntityExtractor::new(),
        }
    }

    /// Overrides the retrieval depth.
    #[must_use]
    pub const fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    /// Dense retrieval plus feedback re-ranking, without generation.
    pub fn search<V: VectorStore>(
        &self,
        deps: &QueryDeps<'_, V>,
        query: &str,
        k: usize,
        filter: Option<&Filter>,
    ) -> Result<Vec<SourceInfo>> {
        let embedding = deps.embedder.embed(query)?;
        let hits = deps.vectors.query(&embedding, k, filter)?;
        let reranked = self.reranker.rerank(deps.feedback, hits)?;
        Ok(reranked.iter().map(SourceInfo::from_point).collect())
    }

    /// Runs the full pipeline for a user query.
    pub fn query<V: VectorStore>(
        &self,
        deps: &mut QueryDeps<'_, V>,
        query: &str,
        options: &QueryOptions,
    ) -> Result<QueryResponse> {
        // Stage 1: semantic cache
        if let Some(hit) = deps.cache.get(query, deps.embedder)? {
            info!(similarity = hit.similarity, "answering from cache");
            let sources = hit
                .sources
                .iter()
                .filter_map(|s| serde_json::from_value(s.clone()).ok())
                .collect();
            return Ok(QueryResponse {
                answer: hit.answer,
                sources,
                metadata: QueryMetadata {
                    cached: true,
                    ..QueryMetadata::default()
                },
            });
        }

        // Stage 2: dense retrieval (failure here is a real error)
        let top_k = options.top_k.unwrap_or(self.top_k);
        let embedding = deps.embedder.embed(query)?;
        let hits = deps.vectors.query(&embedding, top_k, options.filter.as_ref())?;
        debug!(hits = hits.len(), "dense retrieval complete");

        // Stage 3: feedback re-ranking
        let reranked = self.reranker.rerank(deps.feedback, hits)?;
        let sources: Vec<SourceInfo> = reranked.iter().map(SourceInfo::from_point).collect();

        // Stage 4: graph expansion (failure degrades to no graph block)
        let graph_block = if options.use_graph {
            match self.expand_graph(deps.graph, query, &reranked) {
                Ok(block) => block,
                Err(e) => {
                    warn!(error = %e, "graph expansion failed, omitting block");
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        };

        // Stage 5: context assembly
        let context = self.assemble_context(&reranked, &graph_block);
        let metadata = QueryMetadata {
            cached: false,
            graph_used: !graph_block.is_empty(),
            graph_nodes: graph_block.len(),
            llm_error: None,
        };

        // Stage 6: generation (failure degrades to raw context)
        let (answer, metadata) = match deps.completer {
            Some(completer) => {
                let prompt = format!("CONTEXT:\n{context}\n\nQUESTION:\n{query}");
                match completer.complete(SYSTEM_PROMPT, &prompt) {
                    Ok(answer) => (answer, metadata),
                    Err(e) => {
                        warn!(error = %e, "completion failed, returning context");
                        (
                            context,
                            QueryMetadata {
                                llm_error: Some(e.to_string()),
                                ..metadata
                            },
                        )
                    }
                }
            }
            None => (
                context,
                QueryMetadata {
                    llm_error: Some("no completion provider configured".to_string()),
                    ..metadata
                },
            ),
        };

        // Stage 7: cache store, only for fully generated answers
        if !answer.is_empty() && metadata.llm_error.is_none() {
            let source_values: Vec<serde_json::Value> =
                sources.iter().map(SourceInfo::to_json).collect();
            deps.cache.set(query, &answer, &source_values, deps.embedder)?;
        }

        Ok(QueryResponse {
            answer,
            sources,
            metadata,
        })
    }

    /// Extracts entities from the query and top leaves, then walks the
    /// graph two hops along reference/learned edges.
    fn expand_graph(
        &self,
        graph: &SqliteGraphStore,
        query: &str,
        hits: &[ScoredPoint],
    ) -> Result<Vec<String>> {
        let mut seeds: Vec<NodeKey> = Vec::new();
        let mut seen = std::collections::HashSet::new();

        let mut texts: Vec<&str> = vec![query];
        texts.extend(hits.iter().map(|h| h.payload.text_original.as_str()));
        for text in texts {
            for std_ref in self.extractor.extract(text).standards {
                if seen.insert(std_ref.canonical.clone()) {
                    seeds.push(NodeKey::standard(&std_ref.canonical));
                }
            }
        }
        for hit in hits {
            if seen.insert(format!("doc::{}", hit.payload.document_name)) {
                seeds.push(NodeKey::document(&hit.payload.document_name));
            }
        }

        let config = TraversalConfig {
            max_hops: 2,
            edge_filter: EdgeFilter::types(&EdgeType::QUERY_EXPANSION),
            max_results: self.max_graph_results,
            ..TraversalConfig::default()
        };

        let mut lines = Vec::new();
        for seed in seeds.iter().take(10) {
            if graph.node(seed)?.is_none() {
                continue;
            }
            let result = graph.traverse(seed, &config)?;
            for path in result.paths {
                let relationships: Vec<&str> =
                    path.relationships.iter().map(|r| r.as_str()).collect();
                lines.push(format!(
                    "{} {} ({} via {})",
                    path.target.label.as_str(),
                    path.target.key,
                    seed.key,
                    relationships.join(" > "),
                ));
                if lines.len() >= self.max_graph_results {
                    return Ok(lines);
                }
            }
        }
        Ok(lines)
    }

    /// Deterministic context formatting with a character cap.
    fn assemble_context(&self, hits: &[ScoredPoint], graph_block: &[String]) -> String {
        let mut context = String::new();

        for (i, hit) in hits.iter().enumerate() {
            let mut header = format!("[Source {}] Document: {}", i + 1, hit.payload.document_name);
            if !hit.payload.section_number.is_empty() {
                header.push_str(&format!(", Section: {}", hit.payload.section_number));
            }
            if hit.payload.page > 0 {
                header.push_str(&format!(", Page: {}", hit.payload.page));
            }
            let entry = format!("{header}\n{}\n\n---\n\n", hit.payload.text_original);
            if context.len() + entry.len() > self.max_context_chars {
                break;
            }
            context.push_str(&entry);
        }

        if !graph_block.is_empty() {
            let mut block = String::from("Related Information:\n");
            for line in graph_block {
                block.push_str("- ");
                block.push_str(line);
                block.push('\n');
            }
            if context.len() + block.len() <= self.max_context_chars {
                context.push_str(&block);
            }
        }

        context
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::FallbackEmbedder;
    use crate::vector::{Point, PointPayload, SqliteVectorStore};

    const DIMS: usize = 128;

    struct Fixture {
        vectors: SqliteVectorStore,
        graph: SqliteGraphStore,
        cache: SemanticCache,
        feedback: FeedbackStore,
        embedder: FallbackEmbedder,
    }

    struct OkCompleter;
    impl Completer for OkCompleter {
        fn complete(&self, _system: &str, _prompt: &str) -> Result<String> {
            Ok("generated answer".to_string())
        }
    }

    struct FailingCompleter;
    impl Completer for FailingCompleter {
        fn complete(&self, _system: &str, _prompt: &str) -> Result<String> {
            Err(crate::error::ProviderError::NotConfigured {
                provider: "llm".to_string(),
                hint: "down".to_string(),
            }
            .into())
        }
    }

    fn fixture() -> Fixture {
        let embedder = FallbackEmbedder::new(DIMS);
        let mut vectors = SqliteVectorStore::in_memory("test").unwrap();
        vectors.create_collection(DIMS, false).unwrap();

        let texts = [
            ("a", "IS3218", "Cable size shall be 2.5 mm² for socket circuits per IEC 60364."),
            ("b", "IS3218", "Emergency lighting shall comply with EN 1838."),
            ("c", "BS7671", "Voltage drop shall not exceed 4 % of nominal voltage."),
        ];
        let points: Vec<Point> = texts
            .iter()
            .map(|(id, doc, text)| Point {
                id: (*id).to_string(),
                vector: Some(embedder.embed(text).unwrap()),
                payload: PointPayload {
                    document_name: (*doc).to_string(),
                    page: 5,
                    section_number: "6.5".to_string(),
                    text_original: (*text).to_string(),
                    text_enriched: (*text).to_string(),
                    level: 0,
                    ..PointPayload::default()
                },
            })
            .collect();
        vectors.upsert(&points).unwrap();

        let mut graph = SqliteGraphStore::in_memory().unwrap();
        let constructor = crate::kg::KnowledgeGraphConstructor::new();
        for (id, doc, text) in texts {
            let mut chunk =
                crate::core::Chunk::new(doc, 5, text.to_string(), 0..text.len(), 0);
            chunk.section_number = "6.5".to_string();
            chunk.id = id.to_string();
            let document = crate::core::DocumentRecord::from_file_name(&format!("{doc}.pdf"));
            constructor.process_chunk(&mut graph, &chunk, &document).unwrap();
        }

        Fixture {
            vectors,
            graph,
            cache: SemanticCache::in_memory().unwrap(),
            feedback: FeedbackStore::in_memory().unwrap(),
            embedder,
        }
    }

    #[test]
    fn test_search_returns_ranked_sources() {
        let fx = fixture();
        let mut cache = SemanticCache::in_memory().unwrap();
        let deps = QueryDeps {
            vectors: &fx.vectors,
            graph: &fx.graph,
            cache: &mut cache,
            feedback: &fx.feedback,
            embedder: &fx.embedder,
            completer: None,
        };
        let engine = QueryEngine::new();
        let sources = engine
            .search(&deps, "cable size socket circuits", 2, None)
            .unwrap();
        assert_eq!(sources.len(), 2);
        assert!(sources[0].text.contains("Cable size"));
    }

    #[test]
    fn test_query_generates_and_caches() {
        let mut fx = fixture();
        let completer = OkCompleter;
        let engine = QueryEngine::new();
        let mut deps = QueryDeps {
            vectors: &fx.vectors,
            graph: &fx.graph,
            cache: &mut fx.cache,
            feedback: &fx.feedback,
            embedder: &fx.embedder,
            completer: Some(&completer),
        };
        let response = engine
            .query(&mut deps, "what cable size for sockets?", &QueryOptions::new())
            .unwrap();
        assert_eq!(response.answer, "generated answer");
        assert!(!response.metadata.cached);
        assert!(response.metadata.llm_error.is_none());
        assert!(!response.sources.is_empty());

        // Second identical query hits the cache with the sources intact
        let cached = engine
            .query(&mut deps, "what cable size for sockets?", &QueryOptions::new())
            .unwrap();
        assert!(cached.metadata.cached);
        assert_eq!(cached.answer, "generated answer");
        assert!(!cached.sources.is_empty());
    }

    #[test]
    fn test_llm_failure_degrades_to_context() {
        let mut fx = fixture();
        let completer = FailingCompleter;
        let engine = QueryEngine::new();
        let mut deps = QueryDeps {
            vectors: &fx.vectors,
            graph: &fx.graph,
            cache: &mut fx.cache,
            feedback: &fx.feedback,
            embedder: &fx.embedder,
            completer: Some(&completer),
        };
        let response = engine
            .query(&mut deps, "voltage drop limit?", &QueryOptions::new())
            .unwrap();
        assert!(response.metadata.llm_error.is_some());
        assert!(response.answer.contains("[Source 1]"));

        // Degraded answers are not cached
        let stats = fx.cache.stats().unwrap();
        assert_eq!(stats.total_entries, 0);
    }

    #[test]
    fn test_no_completer_returns_context() {
        let mut fx = fixture();
        let engine = QueryEngine::new();
        let mut deps = QueryDeps {
            vectors: &fx.vectors,
            graph: &fx.graph,
            cache: &mut fx.cache,
            feedback: &fx.feedback,
            embedder: &fx.embedder,
            completer: None,
        };
        let response = engine
            .query(&mut deps, "emergency lighting standard?", &QueryOptions::new())
            .unwrap();
        assert!(response.answer.contains("Document: IS3218"));
        assert!(response.metadata.llm_error.is_some());
    }

    #[test]
    fn test_graph_expansion_contributes() {
        let mut fx = fixture();
        let completer = OkCompleter;
        let engine = QueryEngine::new();
        let mut deps = QueryDeps {
            vectors: &fx.vectors,
            graph: &fx.graph,
            cache: &mut fx.cache,
            feedback: &fx.feedback,
            embedder: &fx.embedder,
            completer: Some(&completer),
        };
        let response = engine
            .query(
                &mut deps,
                "what does IEC 60364 require for cable size?",
                &QueryOptions::new(),
            )
            .unwrap();
        assert!(response.metadata.graph_used);
        assert!(response.metadata.graph_nodes > 0);
    }

    #[test]
    fn test_graph_disabled() {
        let mut fx = fixture();
        let engine = QueryEngine::new();
        let mut deps = QueryDeps {
            vectors: &fx.vectors,
            graph: &fx.graph,
            cache: &mut fx.cache,
            feedback: &fx.feedback,
            embedder: &fx.embedder,
            completer: None,
        };
        let options = QueryOptions {
            use_graph: false,
            ..QueryOptions::default()
        };
        let response = engine.query(&mut deps, "cable size?", &options).unwrap();
        assert!(!response.metadata.graph_used);
    }

    #[test]
    fn test_filter_limits_documents() {
        let mut fx = fixture();
        let engine = QueryEngine::new();
        let mut deps = QueryDeps {
            vectors: &fx.vectors,
            graph: &fx.graph,
            cache: &mut fx.cache,
            feedback: &fx.feedback,
            embedder: &fx.embedder,
            completer: None,
        };
        let options = QueryOptions {
            filter: Some(Filter::DocumentEq("BS7671".to_string())),
            use_graph: false,
            ..QueryOptions::default()
        };
        let response = engine
            .query(&mut deps, "voltage drop shall not exceed", &options)
            .unwrap();
        assert!(response.sources.iter().all(|s| s.document == "BS7671"));
    }

    #[test]
    fn test_context_cap_enforced() {
        let engine = QueryEngine {
            max_context_chars: 200,
            ..QueryEngine::new()
        };
        let hits: Vec<ScoredPoint> = (0..10)
            .map(|i| ScoredPoint {
                id: format!("p{i}"),
                score: 1.0,
                payload: PointPayload {
                    document_name: "doc".to_string(),
                    text_original: "x".repeat(120),
                    ..PointPayload::default()
                },
            })
            .collect();
        let context = engine.assemble_context(&hits, &[]);
        assert!(context.len() <= 200);
    }
}
