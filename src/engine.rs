//! Process-wide engine facade.
//!
//! Owns the stores and providers and exposes the boundary operations the
//! CLI (and any other outer surface) drives: ingest, query, search,
//! stats, feedback, learning, cross-reference analysis and graph rebuild.
//! Construction is an explicit startup phase; nothing is built lazily on
//! first call.

use crate::cache::{CacheStats, SemanticCache};
use crate::config::{load_document_mappings, Settings};
use crate::crossref::analyzer::AnalysisRequest;
use crate::crossref::{ComplianceReport, CrossReferenceAnalyzer};
use crate::embedding::{Embedder, FallbackEmbedder, OpenAiEmbedder, DEFAULT_DIMENSIONS};
use crate::error::Result;
use crate::feedback::{FeedbackLearner, FeedbackRecord, FeedbackStats, FeedbackStore, LearnStats};
use crate::graph::{GraphStats, SqliteGraphStore};
use crate::ingest::{IngestOptions, IngestPipeline, IngestReport};
use crate::kg::KnowledgeGraphConstructor;
use crate::llm::{Completer, OpenAiCompleter};
use crate::query::{QueryDeps, QueryEngine, QueryOptions, QueryResponse, SourceInfo};
use crate::vector::{SqliteVectorStore, VectorStore};
use serde::Serialize;
use std::path::Path;
use tracing::info;

/// Fallback embedder dimensions when no provider is configured.
const FALLBACK_DIMENSIONS: usize = 384;

/// DeepSeek's OpenAI-compatible endpoint.
const DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com/v1";

/// Collection/store statistics for the boundary `stats` call.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStats {
    /// Collection name.
    pub collection: String,
    /// Total points (all levels).
    pub total_points: usize,
    /// Indexed leaf chunks.
    pub total_chunks: usize,
    /// Documents present.
    pub documents: Vec<String>,
    /// Where the vector store lives.
    pub storage_location: String,
    /// Graph statistics.
    pub graph: GraphStats,
    /// Cache statistics.
    pub cache: CacheStats,
    /// Feedback statistics.
    pub feedback: FeedbackStats,
}

/// The assembled retrieval engine.
pub struct Engine {
    settings: Settings,
    vectors: SqliteVectorStore,
    graph: SqliteGraphStore,
    cache: SemanticCache,
    feedback: FeedbackStore,
    embedder: Box<dyn Embedder>,
    completer: Option<Box<dyn Completer>>,
    pipeline: IngestPipeline,
    query_engine: QueryEngine,
    learner: FeedbackLearner,
    analyzer: CrossReferenceAnalyzer,
    kg: KnowledgeGraphConstructor,
}

impl Engine {
    /// Opens the engine with providers chosen from the settings: an
    /// OpenAI-compatible embedder when a key is configured, else the
    /// deterministic fallback; a completer when an LLM key is present.
    pub fn open(settings: Settings) -> Result<Self> {
        let embedder: Box<dyn Embedder> = match settings.openai_api_key.as_deref() {
            Some(key) => Box::new(OpenAiEmbedder::new(
                &settings.embedding_model,
                key,
                DEFAULT_DIMENSIONS,
            )),
            None => Box::new(FallbackEmbedder::new(FALLBACK_DIMENSIONS)),
        };

        let completer: Option<Box<dyn Completer>> =
            settings.deepseek_api_key.as_deref().map(|key| {
                Box::new(OpenAiCompleter::new(
                    &settings.llm_model,
                    key,
                    settings.llm_base_url.as_deref().unwrap_or(DEEPSEEK_BASE_URL),
                    settings.llm_temperature,
                )) as Box<dyn Completer>
            });

        Self::open_with_providers(settings, embedder, completer)
    }

    /// Opens the engine with explicit providers (tests, embedded use).
    pub fn open_with_providers(
        settings: Settings,
        embedder: Box<dyn Embedder>,
        completer: Option<Box<dyn Completer>>,
    ) -> Result<Self> {
        settings.ensure_directories()?;

        let mut vectors =
            SqliteVectorStore::open(&settings.vector_store_path, &settings.collection_name)?;
        vectors.create_collection(embedder.dimensions(), false)?;
        let graph = SqliteGraphStore::open(&settings.graph_db_path)?;
        let cache = SemanticCache::open(&settings.cache_db_path)?;
        let feedback = FeedbackStore::open(&settings.feedback_db_path)?;

        info!(
            collection = %settings.collection_name,
            dimensions = embedder.dimensions(),
            llm = completer.is_some(),
            "engine ready"
        );

        Ok(Self {
            settings,
            vectors,
            graph,
            cache,
            feedback,
            embedder,
            completer,
            pipeline: IngestPipeline::new(),
            query_engine: QueryEngine::new(),
            learner: FeedbackLearner::new(),
            analyzer: CrossReferenceAnalyzer::new(),
            kg: KnowledgeGraphConstructor::new(),
        })
    }

    /// Ingests files into the vector store and knowledge graph.
    pub fn ingest(&mut self, paths: &[&Path], options: &IngestOptions) -> Result<IngestReport> {
        let mappings = load_document_mappings(&self.settings.category_mapping_path())?;
        self.pipeline.ingest(
            paths,
            &mappings,
            options,
            &mut self.vectors,
            &mut self.graph,
            self.embedder.as_ref(),
        )
    }

    /// Answers a natural-language query through the full pipeline.
    pub fn query(&mut self, text: &str, options: &QueryOptions) -> Result<QueryResponse> {
        let mut deps = QueryDeps {
            vectors: &self.vectors,
            graph: &self.graph,
            cache: &mut self.cache,
            feedback: &self.feedback,
            embedder: self.embedder.as_ref(),
            completer: self.completer.as_deref(),
        };
        self.query_engine.query(&mut deps, text, options)
    }

    /// Dense retrieval with feedback re-ranking, no generation.
    pub fn search(
        &mut self,
        text: &str,
        k: usize,
        filter: Option<&crate::vector::Filter>,
    ) -> Result<Vec<SourceInfo>> {
        let deps = QueryDeps {
            vectors: &self.vectors,
            graph: &self.graph,
            cache: &mut self.cache,
            feedback: &self.feedback,
            embedder: self.embedder.as_ref(),
            completer: self.completer.as_deref(),
        };
        self.query_engine.search(&deps, text, k, filter)
    }

    /// Records user feedback. A top rating triggers a learning pass only
    /// when a time window is supplied with the call.
    pub fn submit_feedback(
        &mut self,
        record: &FeedbackRecord,
        learn_window_days: Option<u32>,
    ) -> Result<i64> {
        let id = self.feedback.add(record)?;
        if record.overall_rating == Some(5) {
            if let Some(window) = learn_window_days {
                self.learner
                    .learn(&self.feedback, &mut self.graph, Some(window))?;
            }
        }
        Ok(id)
    }

    /// Runs a feedback learning pass.
    pub fn learn(&mut self, window_days: Option<u32>) -> Result<LearnStats> {
        self.learner
            .learn(&self.feedback, &mut self.graph, window_days)
    }

    /// Runs a cross-reference analysis.
    pub fn analyze_cross_reference(&self, request: &AnalysisRequest) -> Result<ComplianceReport> {
        self.analyzer.analyze(&self.vectors, request)
    }

    /// Rebuilds the knowledge graph from stored vector payloads.
    pub fn rebuild_graph(&mut self) -> Result<GraphStats> {
        self.kg.rebuild(&mut self.graph, &self.vectors)
    }

    /// Deletes a document and everything it owns.
    pub fn delete_document(&mut self, name: &str) -> Result<usize> {
        self.pipeline
            .delete_document(name, &mut self.vectors, &mut self.graph)
    }

    /// Removes expired cache rows.
    pub fn cleanup_cache(&mut self) -> Result<usize> {
        self.cache.cleanup_expired()
    }

    /// Clears all cached answers.
    pub fn clear_cache(&mut self) -> Result<()> {
        self.cache.clear()
    }

    /// Store statistics for the boundary `stats` call.
    pub fn stats(&self) -> Result<EngineStats> {
        let total_points = self.vectors.count(None)?;
        let total_chunks = self.vectors.count(Some(&crate::vector::Filter::Flag(
            crate::vector::FlagField::IsLeaf,
            true,
        )))?;
        Ok(EngineStats {
            collection: self.settings.collection_name.clone(),
            total_points,
            total_chunks,
            documents: self.vectors.document_names()?,
            storage_location: self
                .vectors
                .path()
                .map_or_else(|| ":memory:".to_string(), |p| p.display().to_string()),
            graph: self.graph.statistics()?,
            cache: self.cache.stats()?,
            feedback: self.feedback.statistics()?,
        })
    }

    /// The settings the engine was opened with.
    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feedback::{FeedbackType, SourceFeedback};
    use std::path::PathBuf;

    fn test_settings(dir: &Path) -> Settings {
        Settings {
            vector_store_path: dir.join("vectors.db"),
            graph_db_path: dir.join("graph.db"),
            cache_db_path: dir.join("cache.db"),
            feedback_db_path: dir.join("feedback.db"),
            history_db_path: dir.join("history.db"),
            data_dir: dir.join("data"),
            ..Settings::default()
        }
    }

    fn test_engine(dir: &Path) -> Engine {
        Engine::open_with_providers(
            test_settings(dir),
            Box::new(FallbackEmbedder::new(64)),
            None,
        )
        .unwrap()
    }

    fn write_sample(dir: &Path) -> PathBuf {
        let path = dir.join("sample.md");
        std::fs::write(
            &path,
            "# 6 Wiring\n\nCables shall comply with IEC 60364-5-52.\nThe size shall be 2.5 mm².\n",
        )
        .unwrap();
        path
    }

    #[test]
    fn test_open_ingest_query_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = test_engine(dir.path());
        let sample = write_sample(dir.path());

        let report = engine
            .ingest(&[sample.as_path()], &IngestOptions::default())
            .unwrap();
        assert_eq!(report.indexed(), 1);

        let sources = engine.search("cable size", 3, None).unwrap();
        assert!(!sources.is_empty());

        let response = engine
            .query("what size shall cables be?", &QueryOptions::new())
            .unwrap();
        // No completer configured: the context comes back flagged
        assert!(response.metadata.llm_error.is_some());
        assert!(!response.sources.is_empty());
    }

    #[test]
    fn test_stats_reflect_state() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = test_engine(dir.path());
        let sample = write_sample(dir.path());
        engine
            .ingest(&[sample.as_path()], &IngestOptions::default())
            .unwrap();

        let stats = engine.stats().unwrap();
        assert!(stats.total_chunks > 0);
        assert!(stats.total_points >= stats.total_chunks);
        assert_eq!(stats.documents, vec!["sample".to_string()]);
        assert!(stats.graph.documents >= 1);
    }

    #[test]
    fn test_feedback_without_window_skips_learning() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = test_engine(dir.path());
        let record = FeedbackRecord {
            query: "q".to_string(),
            answer: "a".to_string(),
            feedback_type: FeedbackType::Positive,
            overall_rating: Some(5),
            relevance: None,
            clarity: None,
            completeness: None,
            comment: None,
            sources: vec![SourceFeedback {
                document: "sample".to_string(),
                page: 1,
                chunk_prefix: "text".to_string(),
                rating: None,
                stars: None,
            }],
            highlights: Vec::new(),
        };
        // Rating 5 with no window: stored, no learning pass
        let id = engine.submit_feedback(&record, None).unwrap();
        assert!(id > 0);
        assert_eq!(engine.stats().unwrap().graph.learned_edges, 0);
    }

    #[test]
    fn test_rebuild_graph() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = test_engine(dir.path());
        let sample = write_sample(dir.path());
        engine
            .ingest(&[sample.as_path()], &IngestOptions::default())
            .unwrap();

        let before = engine.stats().unwrap().graph;
        let rebuilt = engine.rebuild_graph().unwrap();
        assert_eq!(rebuilt.documents, before.documents);
        assert_eq!(rebuilt.standards, before.standards);
    }

    #[test]
    fn test_delete_document() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = test_engine(dir.path());
        let sample = write_sample(dir.path());
        engine
            .ingest(&[sample.as_path()], &IngestOptions::default())
            .unwrap();

        let removed = engine.delete_document("sample").unwrap();
        assert!(removed > 0);
        let stats = engine.stats().unwrap();
        assert_eq!(stats.total_points, 0);
        assert_eq!(stats.graph.documents, 0);
    }

    #[test]
    fn test_persistence_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let sample = write_sample(dir.path());
        {
            let mut engine = test_engine(dir.path());
            engine
                .ingest(&[sample.as_path()], &IngestOptions::default())
                .unwrap();
        }
        // Re-open against the same files
        let engine = test_engine(dir.path());
        let stats = engine.stats().unwrap();
        assert!(stats.total_chunks > 0);
        assert_eq!(stats.documents, vec!["sample".to_string()]);
    }
}
