//! Standard reference extraction and canonical key derivation.

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Standards families recognised by the extractor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[allow(missing_docs)]
pub enum StandardFamily {
    Is,
    En,
    Iec,
    Bs,
    Nfpa,
    Ieee,
    Iso,
    Astm,
    Nec,
    Din,
}

impl StandardFamily {
    /// All supported families, in extraction order.
    pub const ALL: [Self; 10] = [
        Self::Is,
        Self::En,
        Self::Iec,
        Self::Bs,
        Self::Nfpa,
        Self::Ieee,
        Self::Iso,
        Self::Astm,
        Self::Nec,
        Self::Din,
    ];

    /// Uppercase prefix of the family (`IEC`, `BS`, ...).
    #[must_use]
    pub const fn prefix(self) -> &'static str {
        match self {
            Self::Is => "IS",
            Self::En => "EN",
            Self::Iec => "IEC",
            Self::Bs => "BS",
            Self::Nfpa => "NFPA",
            Self::Ieee => "IEEE",
            Self::Iso => "ISO",
            Self::Astm => "ASTM",
            Self::Nec => "NEC",
            Self::Din => "DIN",
        }
    }

    fn pattern(self) -> String {
        match self {
            // ASTM references may carry a letter grade (ASTM A123)
            Self::Astm => r"\bASTM[\s_-]?[A-Z]?\d+(?:[-:/_]\d+)*".to_string(),
            // NEC references often go through "Article"
            Self::Nec => r"\bNEC\s*(?:Article\s*)?\d+(?:[.\-:]\d+)*".to_string(),
            other => format!(r"\b{}[\s_-]?\d+(?:[-:/_.]\d+)*", other.prefix()),
        }
    }
}

/// A standard reference found in text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardRef {
    /// Family the reference belongs to.
    pub family: StandardFamily,
    /// The reference as written in the source.
    pub raw: String,
    /// Canonical key (`IEC60364-5-52`).
    pub canonical: String,
    /// Byte span of the match.
    pub span: (usize, usize),
}

/// Derives the canonical key for a raw standard reference.
///
/// Uppercases, folds every whitespace/punctuation separator run into a
/// single hyphen between alphanumeric groups, and glues the family prefix
/// directly onto the first number group. Idempotent: applying it to its
/// own output returns the same key.
#[must_use]
pub fn canonical_key(raw: &str) -> String {
    let upper = raw.to_uppercase();
    let mut groups: Vec<&str> = Vec::new();
    let mut start = None;
    for (i, c) in upper.char_indices() {
        if c.is_ascii_alphanumeric() {
            if start.is_none() {
                start = Some(i);
            }
        } else if let Some(s) = start.take() {
            groups.push(&upper[s..i]);
        }
    }
    if let Some(s) = start {
        groups.push(&upper[s..]);
    }

    // "Article"/"Part" are reference phrasing, not part of the key.
    groups.retain(|g| !matches!(*g, "ARTICLE" | "PART"));

    let mut key = String::new();
    for (i, group) in groups.iter().enumerate() {
        if i == 0 {
            key.push_str(group);
        } else if i == 1
            && key.chars().all(|c| c.is_ascii_alphabetic())
            && group.starts_with(|c: char| c.is_ascii_digit())
        {
            // Family prefix joins its number directly: IEC + 60364 -> IEC60364
            key.push_str(group);
        } else {
            key.push('-');
            key.push_str(group);
        }
    }
    key
}

/// Regex-driven standard extractor over the supported families.
#[derive(Debug)]
pub struct StandardExtractor {
    patterns: Vec<(StandardFamily, Regex)>,
}

impl Default for StandardExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl StandardExtractor {
    /// Compiles the per-family patterns.
    ///
    /// # Panics
    ///
    /// Never panics: all patterns are static and known-valid.
    #[must_use]
    pub fn new() -> Self {
        let patterns = StandardFamily::ALL
            .iter()
            .filter_map(|&family| {
                // "IS" collides with the English word, so that family only
                // matches in upper case; every other prefix is rare enough
                // to match case-insensitively.
                let pattern = if family == StandardFamily::Is {
                    family.pattern()
                } else {
                    format!("(?i){}", family.pattern())
                };
                Regex::new(&pattern).ok().map(|re| (family, re))
            })
            .collect();
        Self { patterns }
    }

    /// Extracts all standard references with positions, deduplicated by
    /// canonical key (first occurrence wins), ordered by position.
    #[must_use]
    pub fn extract(&self, text: &str) -> Vec<StandardRef> {
        let mut refs: Vec<StandardRef> = Vec::new();
        let mut seen: std::collections::HashSet<String> = std::collections::HashSet::new();

        for (family, re) in &self.patterns {
            for m in re.find_iter(text) {
                let raw = m.as_str().trim().to_string();
                let canonical = canonical_key(&raw);
                if seen.insert(canonical.clone()) {
                    refs.push(StandardRef {
                        family: *family,
                        raw,
                        canonical,
                        span: (m.start(), m.end()),
                    });
                }
            }
        }

        refs.sort_by_key(|r| r.span.0);
        refs
    }
}
