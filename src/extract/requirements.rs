//! Requirement sentence extraction and strength classification.

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Requirement strength of a sentence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strength {
    /// shall not / must not / prohibited / forbidden
    Prohibited,
    /// shall / must / required / mandatory / obligatory
    Mandatory,
    /// should / recommended / preferred
    Recommended,
    /// may / optional / permitted
    Optional,
}

impl Strength {
    /// Classification priority when keywords of several strengths collide
    /// in one sentence: prohibited > mandatory > recommended > optional.
    pub const PRIORITY: [Self; 4] = [
        Self::Prohibited,
        Self::Mandatory,
        Self::Recommended,
        Self::Optional,
    ];

    /// Lowercase name used in payloads.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Prohibited => "prohibited",
            Self::Mandatory => "mandatory",
            Self::Recommended => "recommended",
            Self::Optional => "optional",
        }
    }

    const fn pattern(self) -> &'static str {
        match self {
            Self::Prohibited => r"\b(?:shall\s+not|must\s+not|prohibited|forbidden)\b",
            Self::Mandatory => r"\b(?:shall|must|required|mandatory|obligatory)\b",
            Self::Recommended => r"\b(?:should|recommended|preferred)\b",
            Self::Optional => r"\b(?:may|optional|permitted)\b",
        }
    }
}

/// A requirement sentence with its classified strength.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequirementRef {
    /// Classified strength.
    pub strength: Strength,
    /// The keyword that triggered classification.
    pub keyword: String,
    /// Full sentence containing the requirement.
    pub sentence: String,
    /// Byte span of the sentence.
    pub span: (usize, usize),
}

/// Requirement extractor classifying sentences by keyword priority.
#[derive(Debug)]
pub struct RequirementExtractor {
    patterns: Vec<(Strength, Regex)>,
}

impl Default for RequirementExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl RequirementExtractor {
    /// Minimum sentence length considered a requirement.
    const MIN_SENTENCE_LEN: usize = 10;

    /// Compiles the strength patterns in priority order.
    #[must_use]
    pub fn new() -> Self {
        let patterns = Strength::PRIORITY
            .iter()
            .filter_map(|&s| {
                Regex::new(&format!("(?i){}", s.pattern()))
                    .ok()
                    .map(|re| (s, re))
            })
            .collect();
        Self { patterns }
    }

    /// Extracts one requirement per sentence containing a strength
    /// keyword; colliding keywords resolve by the fixed priority order.
    #[must_use]
    pub fn extract(&self, text: &str) -> Vec<RequirementRef> {
        let mut requirements = Vec::new();

        for (start, end) in sentence_spans(text) {
            let sentence = text[start..end].trim();
            if sentence.len() < Self::MIN_SENTENCE_LEN {
                continue;
            }
            // First pattern in priority order that matches wins; "shall not"
            // is tried before bare "shall" so prohibitions never degrade to
            // mandatory.
            for (strength, re) in &self.patterns {
                if let Some(m) = re.find(sentence) {
                    requirements.push(RequirementRef {
                        strength: *strength,
                        keyword: m.as_str().to_lowercase(),
                        sentence: sentence.to_string(),
                        span: (start, end),
                    });
                    break;
                }
            }
        }

        requirements
    }

    /// Distinct strengths present in the text, in priority order.
    #[must_use]
    pub fn strengths(&self, text: &str) -> Vec<Strength> {
        let found: std::collections::HashSet<Strength> =
            self.extract(text).iter().map(|r| r.strength).collect();
        Strength::PRIORITY
            .iter()
            .copied()
            .filter(|s| found.contains(s))
            .collect()
    }
}

/// Splits text into sentence byte spans on `.`, `!`, `?` and newlines.
fn sentence_spans(text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut start = 0;
    for (i, c) in text.char_indices() {
        if matches!(c, '.' | '!' | '?' | '\n') {
            let end = i + c.len_utf8();
            if text[start..end].trim().len() > 1 {
                spans.push((start, end));
            }
            start = end;
        }
    }
    if start < text.len() && !text[start..].trim().is_empty() {
        spans.push((start, text.len()));
    }
    spans
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("Cables shall be rated for the environment.", Strength::Mandatory; "shall")]
    #[test_case("Cables shall not be run in wet ducts.", Strength::Prohibited; "shall not")]
    #[test_case("A surge arrester should be installed.", Strength::Recommended; "should")]
    #[test_case("A spare conduit may be provided.", Strength::Optional; "may")]
    #[test_case("The use of aluminium is prohibited here.", Strength::Prohibited; "prohibited")]
    fn test_classify(text: &str, expected: Strength) {
        let extractor = RequirementExtractor::new();
        let reqs = extractor.extract(text);
        assert_eq!(reqs.len(), 1, "{text}");
        assert_eq!(reqs[0].strength, expected);
    }

    #[test]
    fn test_priority_prohibited_beats_mandatory() {
        let extractor = RequirementExtractor::new();
        let reqs = extractor.extract("Conductors shall be copper and shall not be undersized.");
        assert_eq!(reqs.len(), 1);
        assert_eq!(reqs[0].strength, Strength::Prohibited);
    }

    #[test]
    fn test_priority_mandatory_beats_recommended() {
        let extractor = RequirementExtractor::new();
        let reqs = extractor.extract("The value shall comply and should also be documented.");
        assert_eq!(reqs[0].strength, Strength::Mandatory);
    }

    #[test]
    fn test_per_sentence_classification() {
        let extractor = RequirementExtractor::new();
        let text = "Cables shall be copper. Labels should be fitted. Spares may be added.";
        let reqs = extractor.extract(text);
        assert_eq!(reqs.len(), 3);
        assert_eq!(reqs[0].strength, Strength::Mandatory);
        assert_eq!(reqs[1].strength, Strength::Recommended);
        assert_eq!(reqs[2].strength, Strength::Optional);
    }

    #[test]
    fn test_sentence_captured() {
        let extractor = RequirementExtractor::new();
        let reqs = extractor.extract("Intro text. The earthing resistance shall not exceed 1 Ω.");
        assert_eq!(reqs.len(), 1);
        assert!(reqs[0].sentence.contains("earthing resistance"));
    }

    #[test]
    fn test_short_sentences_skipped() {
        let extractor = RequirementExtractor::new();
        assert!(extractor.extract("shall.").is_empty());
    }

    #[test]
    fn test_empty_input() {
        let extractor = RequirementExtractor::new();
        assert!(extractor.extract("").is_empty());
        assert!(extractor.strengths("").is_empty());
    }

    #[test]
    fn test_strengths_ordering() {
        let extractor = RequirementExtractor::new();
        let strengths = extractor
            .strengths("Spares may be added. Conduits shall not be shared. Cables must be rated.");
        assert_eq!(
            strengths,
            vec![Strength::Prohibited, Strength::Mandatory, Strength::Optional]
        );
    }

    #[test]
    fn test_sentence_spans_no_terminator() {
        let spans = sentence_spans("no terminator at all");
        assert_eq!(spans.len(), 1);
    }
}
