//! Section reference extraction (named forms and bare dotted numbers).

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Kind of a section reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[allow(missing_docs)]
pub enum SectionRefKind {
    Section,
    Clause,
    Article,
    Annex,
    Appendix,
    Table,
    Figure,
    Number,
}

/// A section reference found in text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionRef {
    /// Classified kind.
    pub kind: SectionRefKind,
    /// The reference as written (`Section 6.5.1`, `Annex A`, `4.2.3`).
    pub raw: String,
    /// Byte span of the match.
    pub span: (usize, usize),
}

/// Section reference extractor.
#[derive(Debug)]
pub struct SectionRefExtractor {
    named: Vec<(SectionRefKind, Regex)>,
    dotted: Option<Regex>,
}

impl Default for SectionRefExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl SectionRefExtractor {
    /// Compiles the named-form and dotted-number patterns.
    #[must_use]
    pub fn new() -> Self {
        let named_patterns: [(SectionRefKind, &str); 7] = [
            (SectionRefKind::Section, r"(?i)\bSection\s+\d+(?:\.\d+)*"),
            (SectionRefKind::Clause, r"(?i)\bClause\s+\d+(?:\.\d+)*"),
            (SectionRefKind::Article, r"(?i)\bArticle\s+\d+(?:\.\d+)*"),
            (SectionRefKind::Annex, r"(?i)\bAnnex\s+[A-Z](?:\.\d+)?\b"),
            (SectionRefKind::Appendix, r"(?i)\bAppendix\s+[A-Z]\b"),
            (SectionRefKind::Table, r"(?i)\bTable\s+\d+(?:\.\d+)*"),
            (SectionRefKind::Figure, r"(?i)\bFigure\s+\d+(?:\.\d+)*"),
        ];
        let named = named_patterns
            .iter()
            .filter_map(|&(kind, p)| Regex::new(p).ok().map(|re| (kind, re)))
            .collect();
        // Bare dotted numbers need at least two levels (6.5, 4.2.3.1)
        let dotted = Regex::new(r"(?m)\b\d+(?:\.\d+){1,3}\b").ok();
        Self { named, dotted }
    }

    /// Extracts section references, deduplicated by raw text, ordered by
    /// position. Bare dotted numbers overlapping a named match are skipped.
    #[must_use]
    pub fn extract(&self, text: &str) -> Vec<SectionRef> {
        let mut refs: Vec<SectionRef> = Vec::new();
        let mut seen: std::collections::HashSet<String> = std::collections::HashSet::new();

        for (kind, re) in &self.named {
            for m in re.find_iter(text) {
                let raw = m.as_str().trim().to_string();
                if raw.len() >= 3 && seen.insert(raw.to_uppercase()) {
                    refs.push(SectionRef {
                        kind: *kind,
                        raw,
                        span: (m.start(), m.end()),
                    });
                }
            }
        }

        if let Some(re) = &self.dotted {
            let named_spans: Vec<(usize, usize)> = refs.iter().map(|r| r.span).collect();
            for m in re.find_iter(text) {
                let overlaps = named_spans.iter().any(|&(s, e)| m.start() < e && s < m.end());
                if overlaps {
                    continue;
                }
                let raw = m.as_str().to_string();
                if raw.len() >= 3 && seen.insert(raw.to_uppercase()) {
                    refs.push(SectionRef {
                        kind: SectionRefKind::Number,
                        raw,
                        span: (m.start(), m.end()),
                    });
                }
            }
        }

        refs.sort_by_key(|r| r.span.0);
        refs
    }
}
