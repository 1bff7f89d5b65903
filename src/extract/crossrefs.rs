//! Cross-reference phrase detection for relationship inference.

use crate::extract::standards::canonical_key;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Graph relation a cross-reference phrase implies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[allow(missing_docs)]
pub enum RelationIntent {
    RefersTo,
    Requires,
    Supersedes,
}

impl RelationIntent {
    /// Edge type name used in the graph store.
    #[must_use]
    pub const fn edge_type(self) -> &'static str {
        match self {
            Self::RefersTo => "REFERS_TO",
            Self::Requires => "REQUIRES",
            Self::Supersedes => "SUPERSEDES",
        }
    }
}

/// A detected cross-reference phrase with its target standard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossRef {
    /// Implied relation.
    pub relation: RelationIntent,
    /// The full matched phrase (`according to IEC 60364`).
    pub phrase: String,
    /// The referenced standard as written.
    pub target_raw: String,
    /// Canonical key of the referenced standard.
    pub target_canonical: String,
    /// Byte span of the phrase.
    pub span: (usize, usize),
}

/// Detector for citation phrases that imply graph edges.
#[derive(Debug)]
pub struct CrossRefExtractor {
    patterns: Vec<(RelationIntent, Regex)>,
}

impl Default for CrossRefExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl CrossRefExtractor {
    /// Compiles the phrase patterns. The captured group is a
    /// standard-shaped token following the phrase.
    #[must_use]
    pub fn new() -> Self {
        const TARGET: &str = r"([A-Z]{2,4}[\s-]?\d+[\d\.\-:]*)";
        let phrase_patterns: [(RelationIntent, String); 8] = [
            (
                RelationIntent::RefersTo,
                format!(r"(?i)as\s+(?:specified|defined|described)\s+in\s+{TARGET}"),
            ),
            (
                RelationIntent::RefersTo,
                format!(r"(?i)according\s+to\s+{TARGET}"),
            ),
            (
                RelationIntent::RefersTo,
                format!(r"(?i)in\s+accordance\s+with\s+{TARGET}"),
            ),
            (
                RelationIntent::Requires,
                format!(r"(?i)compl(?:y|ies|ying)\s+with\s+{TARGET}"),
            ),
            (
                RelationIntent::Supersedes,
                format!(r"(?i)supersedes?\s+{TARGET}"),
            ),
            (
                RelationIntent::Supersedes,
                format!(r"(?i)replaces?\s+{TARGET}"),
            ),
            (
                RelationIntent::RefersTo,
                format!(r"(?i)see\s+(?:also\s+)?{TARGET}"),
            ),
            (
                RelationIntent::RefersTo,
                format!(r"(?i)refer\s+to\s+{TARGET}"),
            ),
        ];
        let patterns = phrase_patterns
            .iter()
            .filter_map(|(intent, p)| Regex::new(p).ok().map(|re| (*intent, re)))
            .collect();
        Self { patterns }
    }

    /// Extracts cross-reference phrases, ordered by position.
    #[must_use]
    pub fn extract(&self, text: &str) -> Vec<CrossRef> {
        let mut refs: Vec<CrossRef> = Vec::new();
        let mut seen: std::collections::HashSet<(usize, usize)> = std::collections::HashSet::new();

        for (relation, re) in &self.patterns {
            for caps in re.captures_iter(text) {
                let (Some(full), Some(target)) = (caps.get(0), caps.get(1)) else {
                    continue;
                };
                if !seen.insert((full.start(), full.end())) {
                    continue;
                }
                let target_raw = target.as_str().trim().trim_end_matches('.').to_string();
                refs.push(CrossRef {
                    relation: *relation,
                    phrase: full.as_str().to_string(),
                    target_canonical: canonical_key(&target_raw),
                    target_raw,
                    span: (full.start(), full.end()),
                });
            }
        }

        refs.sort_by_key(|r| r.span.0);
        refs
    }
}
