//! Feedback-weighted re-ranking of retrieved chunks.

use crate::core::ChunkFingerprint;
use crate::error::Result;
use crate::feedback::store::FeedbackStore;
use crate::vector::ScoredPoint;
use tracing::debug;

/// Default score boost factor for positively rated chunks.
pub const DEFAULT_BOOST: f32 = 0.15;

/// Default score penalty factor for negatively rated chunks.
pub const DEFAULT_PENALTY: f32 = 0.10;

/// Positive feedback influence is capped at this count.
const BOOST_CAP: f64 = 5.0;

/// Negative feedback influence is capped at this count.
const PENALTY_CAP: f64 = 3.0;

/// Adjusts retrieval scores from historical per-chunk feedback.
#[derive(Debug, Clone)]
pub struct FeedbackReranker {
    boost: f32,
    penalty: f32,
}

impl Default for FeedbackReranker {
    fn default() -> Self {
        Self::new(DEFAULT_BOOST, DEFAULT_PENALTY)
    }
}

impl FeedbackReranker {
    /// Creates a reranker with explicit boost/penalty factors.
    #[must_use]
    pub const fn new(boost: f32, penalty: f32) -> Self {
        Self { boost, penalty }
    }

    /// Re-scores and re-sorts retrieved leaves by aggregated feedback.
    ///
    /// Positive scores boost: `s' = s + s * boost * min(f, 5)`.
    /// Negative scores penalise: `s' = max(0, s - s * penalty * min(|f|, 3))`.
    /// Chunks with no feedback keep their score.
    pub fn rerank(
        &self,
        feedback: &FeedbackStore,
        mut results: Vec<ScoredPoint>,
    ) -> Result<Vec<ScoredPoint>> {
        let mut adjusted = 0usize;
        for result in &mut results {
            let fingerprint = ChunkFingerprint::new(
                &result.payload.document_name,
                result.payload.page,
                &result.payload.text_original,
            );
            let score = feedback.source_score(&fingerprint)?;
            if score == 0.0 {
                continue;
            }
            adjusted += 1;
            #[allow(clippy::cast_possible_truncation)]
            if score > 0.0 {
                let factor = self.boost * score.min(BOOST_CAP) as f32;
                result.score += result.score * factor;
            } else {
                let factor = self.penalty * score.abs().min(PENALTY_CAP) as f32;
                result.score = (result.score - result.score * factor).max(0.0);
            }
        }

        if adjusted > 0 {
            debug!(adjusted, total = results.len(), "feedback re-ranking applied");
        }
        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feedback::store::{FeedbackRecord, FeedbackType, SourceFeedback};
    use crate::vector::PointPayload;

    fn scored(id: &str, document: &str, score: f32) -> ScoredPoint {
        ScoredPoint {
            id: id.to_string(),
            score,
            payload: PointPayload {
                document_name: document.to_string(),
                page: 7,
                text_original: format!("chunk from {document}"),
                ..PointPayload::default()
            },
        }
    }

    fn feedback_for(document: &str, feedback_type: FeedbackType, times: usize) -> FeedbackStore {
        let mut store = FeedbackStore::in_memory().unwrap();
        for _ in 0..times {
            store
                .add(&FeedbackRecord {
                    query: "q".to_string(),
                    answer: "a".to_string(),
                    feedback_type,
                    overall_rating: None,
                    relevance: None,
                    clarity: None,
                    completeness: None,
                    comment: None,
                    sources: vec![SourceFeedback {
                        document: document.to_string(),
                        page: 7,
                        chunk_prefix: format!("chunk from {document}"),
                        rating: None,
                        stars: None,
                    }],
                    highlights: Vec::new(),
                })
                .unwrap();
        }
        store
    }

    #[test]
    fn test_positive_feedback_boosts() {
        let store = feedback_for("IS3218", FeedbackType::Positive, 2);
        let reranker = FeedbackReranker::default();
        let results = reranker
            .rerank(&store, vec![scored("a", "IS3218", 0.5)])
            .unwrap();
        // f = +2.0: s' = 0.5 + 0.5 * 0.15 * 2 = 0.65
        assert!((results[0].score - 0.65).abs() < 1e-6);
    }

    #[test]
    fn test_boost_capped_at_five() {
        let store = feedback_for("IS3218", FeedbackType::Positive, 9);
        let results = FeedbackReranker::default()
            .rerank(&store, vec![scored("a", "IS3218", 0.4)])
            .unwrap();
        // f = +9 capped to 5: s' = 0.4 * (1 + 0.15 * 5) = 0.7
        assert!((results[0].score - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_negative_feedback_penalises() {
        let store = feedback_for("IS3218", FeedbackType::Negative, 2);
        let results = FeedbackReranker::default()
            .rerank(&store, vec![scored("a", "IS3218", 0.5)])
            .unwrap();
        // f = -1.0: s' = 0.5 - 0.5 * 0.10 * 1 = 0.45
        assert!((results[0].score - 0.45).abs() < 1e-6);
    }

    #[test]
    fn test_score_floor_at_zero() {
        let store = feedback_for("IS3218", FeedbackType::Negative, 20);
        let results = FeedbackReranker::new(0.15, 1.0)
            .rerank(&store, vec![scored("a", "IS3218", 0.2)])
            .unwrap();
        assert!(results[0].score >= 0.0);
    }

    #[test]
    fn test_unrated_chunk_unchanged() {
        let store = FeedbackStore::in_memory().unwrap();
        let results = FeedbackReranker::default()
            .rerank(&store, vec![scored("a", "IS3218", 0.42)])
            .unwrap();
        assert!((results[0].score - 0.42).abs() < 1e-6);
    }

    #[test]
    fn test_resort_after_adjustment() {
        let store = feedback_for("Boosted", FeedbackType::Positive, 3);
        let results = FeedbackReranker::default()
            .rerank(
                &store,
                vec![scored("top", "Plain", 0.6), scored("low", "Boosted", 0.5)],
            )
            .unwrap();
        // 0.5 * (1 + 0.15 * 3) = 0.725 > 0.6: the boosted chunk wins
        assert_eq!(results[0].id, "low");
        assert_eq!(results[1].id, "top");
    }

    #[test]
    fn test_empty_results() {
        let store = FeedbackStore::in_memory().unwrap();
        let results = FeedbackReranker::default().rerank(&store, vec![]).unwrap();
        assert!(results.is_empty());
    }
}
