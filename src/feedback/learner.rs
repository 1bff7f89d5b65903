//! Feedback-driven relationship learning.
//!
//! Mines positive feedback for document co-occurrence and query keyword
//! patterns, writing learned `COMPLEMENTS` / `RELATED_TO` edges into the
//! knowledge graph and strengthening them on repeat evidence.

use crate::error::Result;
use crate::feedback::store::{FeedbackStore, PositiveFeedback};
use crate::graph::{EdgeType, NodeKey, SqliteGraphStore};
use serde::Serialize;
use std::collections::HashMap;
use tracing::{info, warn};

/// Default minimum co-occurrence count.
pub const DEFAULT_MIN_SUPPORT: usize = 3;

/// Default minimum confidence for creating a relationship.
pub const DEFAULT_MIN_CONFIDENCE: f64 = 0.6;

/// Default prune threshold for weak learned edges.
pub const DEFAULT_PRUNE_THRESHOLD: f64 = 0.3;

/// Starter weight for keyword-derived `RELATED_TO` edges. Fixed on
/// creation; growth happens only through the monotonic strengthening
/// rule.
pub const RELATED_TO_STARTER_WEIGHT: f64 = 0.5;

/// Minimum keyword length considered in query patterns.
const MIN_KEYWORD_LEN: usize = 4;

/// Outcome of a learning pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LearnStats {
    /// Positive feedback rows analyzed.
    pub analyzed_feedback: usize,
    /// Edges created this pass.
    pub new_relationships: usize,
    /// Edges strengthened this pass.
    pub strengthened_relationships: usize,
    /// Keyword patterns discovered.
    pub discovered_patterns: usize,
    /// Weak learned edges pruned.
    pub pruned: usize,
}

/// A keyword pattern linking a query token to the documents it surfaced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeywordPattern {
    /// The query keyword.
    pub keyword: String,
    /// The document most often cited for it.
    pub document: String,
    /// Top-document ratio among occurrences.
    pub confidence: f64,
    /// Number of queries the keyword appeared in.
    pub support: usize,
    /// All documents cited alongside the keyword.
    pub documents: Vec<String>,
}

/// Learns graph relationships from positive feedback.
#[derive(Debug, Clone)]
pub struct FeedbackLearner {
    min_support: usize,
    min_confidence: f64,
    prune_threshold: f64,
}

impl Default for FeedbackLearner {
    fn default() -> Self {
        Self::new()
    }
}

impl FeedbackLearner {
    /// Creates a learner with the default thresholds.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            min_support: DEFAULT_MIN_SUPPORT,
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            prune_threshold: DEFAULT_PRUNE_THRESHOLD,
        }
    }

    /// Overrides the support/confidence thresholds.
    #[must_use]
    pub const fn with_thresholds(mut self, min_support: usize, min_confidence: f64) -> Self {
        self.min_support = min_support;
        self.min_confidence = min_confidence;
        self
    }

    /// Runs a full learning pass over positive feedback in the optional
    /// time window, then prunes weak learned edges.
    pub fn learn(
        &self,
        feedback: &FeedbackStore,
        graph: &mut SqliteGraphStore,
        window_days: Option<u32>,
    ) -> Result<LearnStats> {
        let mut stats = LearnStats::default();
        let positive = feedback.positive_feedback(window_days)?;
        stats.analyzed_feedback = positive.len();
        if positive.is_empty() {
            return Ok(stats);
        }

        // Co-occurring source documents become COMPLEMENTS edges
        for ((doc_a, doc_b), confidence) in self.co_occurrences(&positive) {
            self.upsert_learned(
                graph,
                &doc_a,
                &doc_b,
                EdgeType::Complements,
                confidence,
                confidence,
                &mut stats,
            )?;
        }

        // Documents sharing a successful query keyword become RELATED_TO
        let patterns = self.keyword_patterns(&positive);
        stats.discovered_patterns = patterns.len();
        for pattern in &patterns {
            let mut documents: Vec<&str> =
                pattern.documents.iter().map(String::as_str).collect();
            documents.sort_unstable();
            documents.dedup();
            for i in 0..documents.len() {
                for j in (i + 1)..documents.len() {
                    self.upsert_learned(
                        graph,
                        documents[i],
                        documents[j],
                        EdgeType::RelatedTo,
                        RELATED_TO_STARTER_WEIGHT,
                        RELATED_TO_STARTER_WEIGHT,
                        &mut stats,
                    )?;
                }
            }
        }

        stats.pruned = graph.prune_learned_edges(self.prune_threshold)?;
        info!(
            analyzed = stats.analyzed_feedback,
            created = stats.new_relationships,
            strengthened = stats.strengthened_relationships,
            "learning pass complete"
        );
        Ok(stats)
    }

    /// Removes learned edges below the given weight.
    pub fn prune(&self, graph: &mut SqliteGraphStore, min_weight: f64) -> Result<usize> {
        graph.prune_learned_edges(min_weight)
    }

    /// Document pair confidences from co-occurrence counting.
    ///
    /// `C(a, b) = pair_count(a, b) / max(doc_count(a), doc_count(b))`,
    /// kept when `pair_count >= min_support` and `C >= min_confidence`.
    fn co_occurrences(&self, positive: &[PositiveFeedback]) -> Vec<((String, String), f64)> {
        let mut pair_counts: HashMap<(String, String), usize> = HashMap::new();
        let mut doc_counts: HashMap<String, usize> = HashMap::new();

        for row in positive {
            for doc in &row.documents {
                *doc_counts.entry(doc.clone()).or_default() += 1;
            }
            for i in 0..row.documents.len() {
                for j in (i + 1)..row.documents.len() {
                    // Documents are sorted per row, so the pair key is canonical
                    let key = (row.documents[i].clone(), row.documents[j].clone());
                    *pair_counts.entry(key).or_default() += 1;
                }
            }
        }

        let mut out = Vec::new();
        for ((a, b), pair_count) in pair_counts {
            if pair_count < self.min_support {
                continue;
            }
            let max_single = doc_counts
                .get(&a)
                .copied()
                .max(doc_counts.get(&b).copied())
                .unwrap_or(0);
            if max_single == 0 {
                continue;
            }
            #[allow(clippy::cast_precision_loss)]
            let confidence = pair_count as f64 / max_single as f64;
            if confidence >= self.min_confidence {
                out.push(((a, b), confidence));
            }
        }
        out.sort_by(|x, y| x.0.cmp(&y.0));
        out
    }

    /// Keyword -> document patterns from positive queries.
    fn keyword_patterns(&self, positive: &[PositiveFeedback]) -> Vec<KeywordPattern> {
        let mut keyword_rows: HashMap<String, Vec<&PositiveFeedback>> = HashMap::new();
        for row in positive {
            let mut seen_in_query: std::collections::HashSet<String> =
                std::collections::HashSet::new();
            for word in row.query.to_lowercase().split_whitespace() {
                let word: String = word.chars().filter(|c| c.is_alphanumeric()).collect();
                if word.len() > MIN_KEYWORD_LEN - 1 && seen_in_query.insert(word.clone()) {
                    keyword_rows.entry(word).or_default().push(row);
                }
            }
        }

        let mut patterns = Vec::new();
        for (keyword, rows) in keyword_rows {
            if rows.len() < self.min_support {
                continue;
            }
            let mut doc_counts: HashMap<&str, usize> = HashMap::new();
            for row in &rows {
                for doc in &row.documents {
                    *doc_counts.entry(doc.as_str()).or_default() += 1;
                }
            }
            let Some((top_doc, top_count)) =
                doc_counts.iter().max_by_key(|&(doc, count)| (*count, *doc))
            else {
                continue;
            };
            #[allow(clippy::cast_precision_loss)]
            let confidence = *top_count as f64 / rows.len() as f64;
            if confidence >= self.min_confidence {
                let mut documents: Vec<String> =
                    doc_counts.keys().map(|d| (*d).to_string()).collect();
                documents.sort();
                patterns.push(KeywordPattern {
                    keyword,
                    document: (*top_doc).to_string(),
                    confidence,
                    support: rows.len(),
                    documents,
                });
            }
        }
        patterns.sort_by(|a, b| a.keyword.cmp(&b.keyword));
        patterns
    }

    /// Creates a learned edge or strengthens the existing one.
    #[allow(clippy::too_many_arguments)]
    fn upsert_learned(
        &self,
        graph: &mut SqliteGraphStore,
        doc_a: &str,
        doc_b: &str,
        edge_type: EdgeType,
        initial_weight: f64,
        confidence: f64,
        stats: &mut LearnStats,
    ) -> Result<()> {
        let src = NodeKey::document(doc_a);
        let dst = NodeKey::document(doc_b);
        // Learning never fabricates documents; both must already be ingested
        if graph.node(&src)?.is_none() || graph.node(&dst)?.is_none() {
            warn!(doc_a, doc_b, "skipping learned edge: document not in graph");
            return Ok(());
        }

        match graph.edge_weight(&src, &dst, edge_type)? {
            None => {
                graph.upsert_edge(&src, &dst, edge_type, initial_weight, true, None)?;
                stats.new_relationships += 1;
            }
            Some(_) => {
                graph.strengthen_edge(&src, &dst, edge_type, confidence)?;
                stats.strengthened_relationships += 1;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feedback::store::{FeedbackRecord, FeedbackType, SourceFeedback};

    fn seed_documents(graph: &mut SqliteGraphStore, names: &[&str]) {
        for name in names {
            graph
                .upsert_node(&NodeKey::document(name), &serde_json::json!({"name": name}))
                .unwrap();
        }
    }

    fn positive(query: &str, documents: &[&str]) -> FeedbackRecord {
        FeedbackRecord {
            query: query.to_string(),
            answer: "an answer".to_string(),
            feedback_type: FeedbackType::Positive,
            overall_rating: Some(5),
            relevance: None,
            clarity: None,
            completeness: None,
            comment: None,
            sources: documents
                .iter()
                .map(|d| SourceFeedback {
                    document: (*d).to_string(),
                    page: 1,
                    chunk_prefix: "text".to_string(),
                    rating: None,
                    stars: None,
                })
                .collect(),
            highlights: Vec::new(),
        }
    }

    #[test]
    fn test_complements_edge_from_co_occurrence() {
        let mut feedback = FeedbackStore::in_memory().unwrap();
        let mut graph = SqliteGraphStore::in_memory().unwrap();
        seed_documents(&mut graph, &["IS3218", "NEK606"]);

        // Five positive feedbacks citing both documents
        for i in 0..5 {
            feedback
                .add(&positive(&format!("fire alarm query {i}"), &["IS3218", "NEK606"]))
                .unwrap();
        }

        let stats = FeedbackLearner::new()
            .learn(&feedback, &mut graph, None)
            .unwrap();
        assert_eq!(stats.analyzed_feedback, 5);
        assert!(stats.new_relationships >= 1);

        let weight = graph
            .edge_weight(
                &NodeKey::document("IS3218"),
                &NodeKey::document("NEK606"),
                EdgeType::Complements,
            )
            .unwrap()
            .unwrap();
        // pair_count 5, doc counts 5/5, confidence 1.0 >= 0.6
        assert!(weight >= 0.6);
    }

    #[test]
    fn test_sixth_feedback_strengthens_without_exceeding_one() {
        let mut feedback = FeedbackStore::in_memory().unwrap();
        let mut graph = SqliteGraphStore::in_memory().unwrap();
        seed_documents(&mut graph, &["IS3218", "NEK606"]);
        let learner = FeedbackLearner::new();

        for i in 0..5 {
            feedback
                .add(&positive(&format!("query {i}"), &["IS3218", "NEK606"]))
                .unwrap();
        }
        learner.learn(&feedback, &mut graph, None).unwrap();
        let before = graph
            .edge_weight(
                &NodeKey::document("IS3218"),
                &NodeKey::document("NEK606"),
                EdgeType::Complements,
            )
            .unwrap()
            .unwrap();

        feedback.add(&positive("query 5", &["IS3218", "NEK606"])).unwrap();
        let stats = learner.learn(&feedback, &mut graph, None).unwrap();
        assert!(stats.strengthened_relationships >= 1);

        let after = graph
            .edge_weight(
                &NodeKey::document("IS3218"),
                &NodeKey::document("NEK606"),
                EdgeType::Complements,
            )
            .unwrap()
            .unwrap();
        assert!(after >= before);
        assert!(after <= 1.0);
    }

    #[test]
    fn test_below_min_support_learns_nothing() {
        let mut feedback = FeedbackStore::in_memory().unwrap();
        let mut graph = SqliteGraphStore::in_memory().unwrap();
        seed_documents(&mut graph, &["A", "B"]);

        feedback.add(&positive("one", &["A", "B"])).unwrap();
        feedback.add(&positive("two", &["A", "B"])).unwrap();

        let stats = FeedbackLearner::new()
            .learn(&feedback, &mut graph, None)
            .unwrap();
        assert_eq!(stats.new_relationships, 0);
    }

    #[test]
    fn test_related_to_from_keyword_patterns() {
        let mut feedback = FeedbackStore::in_memory().unwrap();
        let mut graph = SqliteGraphStore::in_memory().unwrap();
        seed_documents(&mut graph, &["DocA", "DocB"]);
        // "earthing" appears in >= 3 queries for each document, but the
        // documents never co-occur in one answer
        for i in 0..3 {
            feedback
                .add(&positive(&format!("earthing resistance q{i}"), &["DocA"]))
                .unwrap();
        }
        for i in 0..3 {
            feedback
                .add(&positive(&format!("earthing conductor q{i}"), &["DocB"]))
                .unwrap();
        }

        let learner = FeedbackLearner::new().with_thresholds(3, 0.4);
        let stats = learner.learn(&feedback, &mut graph, None).unwrap();
        assert!(stats.discovered_patterns >= 1);

        let weight = graph
            .edge_weight(
                &NodeKey::document("DocA"),
                &NodeKey::document("DocB"),
                EdgeType::RelatedTo,
            )
            .unwrap();
        assert_eq!(weight, Some(RELATED_TO_STARTER_WEIGHT));
    }

    #[test]
    fn test_missing_document_skipped() {
        let mut feedback = FeedbackStore::in_memory().unwrap();
        let mut graph = SqliteGraphStore::in_memory().unwrap();
        // Documents never ingested into the graph
        for i in 0..5 {
            feedback
                .add(&positive(&format!("query {i}"), &["Ghost1", "Ghost2"]))
                .unwrap();
        }
        let stats = FeedbackLearner::new()
            .learn(&feedback, &mut graph, None)
            .unwrap();
        assert_eq!(stats.new_relationships, 0);
    }

    #[test]
    fn test_prune_removes_weak_edges() {
        let mut graph = SqliteGraphStore::in_memory().unwrap();
        seed_documents(&mut graph, &["A", "B"]);
        graph
            .upsert_edge(
                &NodeKey::document("A"),
                &NodeKey::document("B"),
                EdgeType::RelatedTo,
                0.1,
                true,
                None,
            )
            .unwrap();
        let pruned = FeedbackLearner::new().prune(&mut graph, 0.3).unwrap();
        assert_eq!(pruned, 1);
    }

    #[test]
    fn test_no_positive_feedback_noop() {
        let feedback = FeedbackStore::in_memory().unwrap();
        let mut graph = SqliteGraphStore::in_memory().unwrap();
        let stats = FeedbackLearner::new()
            .learn(&feedback, &mut graph, None)
            .unwrap();
        assert_eq!(stats, LearnStats::default());
    }
}
