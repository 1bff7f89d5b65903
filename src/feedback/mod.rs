//! User feedback: persistence, graph learning and retrieval re-ranking.

pub mod learner;
pub mod rerank;
pub mod store;

pub use learner::{FeedbackLearner, LearnStats};
pub use rerank::FeedbackReranker;
pub use store::{
    FeedbackRecord, FeedbackStats, FeedbackStore, FeedbackType, Highlight, Sentiment,
    SourceFeedback, SourceRating,
};
