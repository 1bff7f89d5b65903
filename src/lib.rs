//! # specrag
//!
//! Retrieval and knowledge-construction engine for technical standards
//! documents (electrical/mechanical/safety codes).
//!
//! The pipeline ingests PDFs, text and Markdown, decomposes them into
//! hierarchically-chunked passages enriched with document and section
//! context, extracts typed entities (standards, specifications,
//! requirements), persists vectors and a knowledge graph, and answers
//! questions by blending dense retrieval, graph traversal, a semantic
//! query cache and feedback-weighted re-ranking.
//!
//! ## Subsystems
//!
//! - **Extraction** ([`extract`]): deterministic, total recognisers for
//!   standard references, specification values, requirement strengths,
//!   section references and cross-reference phrases
//! - **Parsing** ([`parse`]): section hierarchy and markdown tables
//! - **Chunking** ([`chunking`]): hierarchical splitting with context
//!   prefix injection
//! - **Stores** ([`vector`], [`graph`], [`cache`], [`feedback`]): SQLite
//!   persistence for points, the knowledge graph, cached answers and
//!   user feedback
//! - **Blending** ([`query`]): cache, retrieval, graph expansion,
//!   re-ranking and generation
//! - **Analysis** ([`crossref`]): compliance, gap, value and standard
//!   coverage reports

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]

pub mod cache;
pub mod chunking;
pub mod cli;
pub mod config;
pub mod core;
pub mod crossref;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod extract;
pub mod feedback;
pub mod graph;
pub mod ingest;
pub mod kg;
pub mod llm;
pub mod parse;
pub mod query;
pub mod vector;

// Re-export commonly used types at crate root
pub use error::{Error, Result};

pub use config::Settings;
pub use core::{Chunk, ChunkFingerprint, DocumentRecord, SpecValue};
pub use engine::{Engine, EngineStats};

// Extraction surface
pub use extract::{canonical_key, EntityExtractor, Extraction, ExtractionSet, Strength};

// Store surface
pub use cache::SemanticCache;
pub use graph::{EdgeType, NodeKey, NodeLabel, SqliteGraphStore};
pub use vector::{Filter, Point, PointPayload, SqliteVectorStore, VectorStore};

// Pipeline surface
pub use chunking::{ContextEnricher, HierarchicalChunker};
pub use ingest::{CancellationToken, IngestOptions, IngestPipeline, IngestReport};
pub use kg::KnowledgeGraphConstructor;
pub use query::{QueryEngine, QueryOptions, QueryResponse};

// Provider traits
pub use embedding::{cosine_similarity, Embedder, FallbackEmbedder, OpenAiEmbedder};
pub use llm::{Completer, OpenAiCompleter};

// Feedback surface
pub use feedback::{FeedbackLearner, FeedbackRecord, FeedbackReranker, FeedbackStore};

// Analysis surface
pub use crossref::{AnalysisMode, ComplianceReport, CrossReferenceAnalyzer};
