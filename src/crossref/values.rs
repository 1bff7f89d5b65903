//! Numerical value extraction for document comparison.
//!
//! Wider taxonomy than the indexing extractor, with guards that keep
//! standard numbers, years and out-of-range figures from being read as
//! engineering values.

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Years in this window are treated as dates, not values.
const YEAR_MIN: f64 = 1980.0;
const YEAR_MAX: f64 = 2039.0;

/// How far around a number to look for standard-family context.
const STANDARD_CONTEXT_WINDOW: usize = 25;

/// Context captured around a value for subject inference.
const SUBJECT_WINDOW_BEFORE: usize = 60;
const SUBJECT_WINDOW_AFTER: usize = 20;

/// A numerical value with its inferred subject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedValue {
    /// Parameter type (snake_case).
    pub param_type: &'static str,
    /// Numeric value.
    pub value: f64,
    /// The match as written (`2.5 mm²`).
    pub original: String,
    /// What the value describes (`conductor size`).
    pub subject: String,
    /// Surrounding context, lowercased.
    pub context: String,
}

/// Parameter taxonomy for cross-document comparison.
const VALUE_PATTERNS: [(&str, &str); 15] = [
    ("cable_size", r"(\d+(?:\.\d+)?)\s*mm[²2]"),
    ("temperature", r"(\d+(?:\.\d+)?)\s*°[CF]"),
    ("percentage", r"(\d+(?:\.\d+)?)\s*%"),
    ("frequency", r"(\d+(?:\.\d+)?)\s*Hz"),
    ("resistance", r"(\d+(?:\.\d+)?)\s*(?:Ω|ohms?)"),
    ("pressure", r"(\d+(?:\.\d+)?)\s*(?:bar|psi|kPa|MPa)"),
    ("flow_rate", r"(\d+(?:\.\d+)?)\s*(?:l/s|L/s|m³/h|m3/h|l/min|L/min)"),
    ("noise_level", r"(\d+(?:\.\d+)?)\s*dBA?\b"),
    ("lux_level", r"(\d+(?:\.\d+)?)\s*(?:lux|lx)\b"),
    ("power", r"(\d+(?:\.\d+)?)\s*(?:kW|MW|VA|kVA|W)\b"),
    ("voltage", r"(\d+(?:\.\d+)?)\s*(?:kV|mV|V)\b"),
    ("current", r"(\d+(?:\.\d+)?)\s*(?:kA|mA|A)\b"),
    ("time", r"(\d+(?:\.\d+)?)\s*(?:ms|sec|s|min)\b"),
    ("area", r"(\d+(?:\.\d+)?)\s*m[²2]\b"),
    ("length", r"(\d+(?:\.\d+)?)\s*(?:mm|cm|m|km)\b"),
];

/// Default parameter types considered when no focus area narrows them.
/// Bare lengths and times produce too many coincidental matches.
pub const DEFAULT_PRIORITY_TYPES: [&str; 12] = [
    "cable_size",
    "current",
    "voltage",
    "power",
    "resistance",
    "frequency",
    "pressure",
    "flow_rate",
    "noise_level",
    "lux_level",
    "temperature",
    "percentage",
];

/// Sanity windows per parameter type; values outside are rejected.
fn in_sane_range(param_type: &str, value: f64) -> bool {
    match param_type {
        "temperature" => (-50.0..=500.0).contains(&value),
        "percentage" => value <= 100.0,
        "voltage" => value <= 50_000.0,
        "current" => value <= 1_000.0,
        "cable_size" => value <= 1_000.0,
        "time" => value <= 1_000.0,
        "length" => value <= 5_000.0,
        _ => true,
    }
}

/// Subject vocabulary: nearby technical nouns name what a value measures.
const SUBJECT_TERMS: [&str; 30] = [
    "cable",
    "conductor",
    "wire",
    "core",
    "duct",
    "conduit",
    "trunking",
    "breaker",
    "fuse",
    "panel",
    "board",
    "socket",
    "outlet",
    "lighting",
    "luminaire",
    "motor",
    "transformer",
    "generator",
    "trench",
    "depth",
    "height",
    "spacing",
    "clearance",
    "maximum",
    "minimum",
    "rated",
    "nominal",
    "operating",
    "ambient",
    "drop",
];

/// Extracts comparison-grade numerical values from text.
#[derive(Debug)]
pub struct ValueExtractor {
    patterns: Vec<(&'static str, Regex)>,
    standard_ref: Option<Regex>,
}

impl Default for ValueExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl ValueExtractor {
    /// Compiles the taxonomy and guard patterns.
    #[must_use]
    pub fn new() -> Self {
        let patterns = VALUE_PATTERNS
            .iter()
            .filter_map(|&(name, pattern)| Regex::new(pattern).ok().map(|re| (name, re)))
            .collect();
        let standard_ref =
            Regex::new(r"(?i)\b(?:IS|EN|IEC|BS|NFPA|IEEE|ISO|ASTM|DIN|NEC)[\s-]?\d+(?:[-/:]\d+)*")
                .ok();
        Self {
            patterns,
            standard_ref,
        }
    }

    /// Extracts values, restricted to `priority_types` when non-empty.
    #[must_use]
    pub fn extract(&self, text: &str, priority_types: &[&str]) -> Vec<ExtractedValue> {
        // Numbers that belong to standard references are not values
        let mut standard_numbers: std::collections::HashSet<u64> = std::collections::HashSet::new();
        let mut standard_spans: Vec<(usize, usize)> = Vec::new();
        if let Some(re) = &self.standard_ref {
            for m in re.find_iter(text) {
                standard_spans.push((m.start(), m.end()));
                for num in m.as_str().split(|c: char| !c.is_ascii_digit()) {
                    if let Ok(n) = num.parse::<f64>() {
                        standard_numbers.insert(n.to_bits());
                    }
                }
            }
        }

        let mut claimed: Vec<(usize, usize)> = Vec::new();
        let mut values = Vec::new();
        for (param_type, re) in &self.patterns {
            if !priority_types.is_empty() && !priority_types.contains(param_type) {
                continue;
            }
            for caps in re.captures_iter(text) {
                let (Some(full), Some(num)) = (caps.get(0), caps.get(1)) else {
                    continue;
                };
                if claimed.iter().any(|&(s, e)| full.start() < e && s < full.end()) {
                    continue;
                }
                let Ok(value) = num.as_str().parse::<f64>() else {
                    continue;
                };

                if self.excluded(
                    text,
                    value,
                    (full.start(), full.end()),
                    &standard_numbers,
                    &standard_spans,
                ) || !in_sane_range(param_type, value)
                {
                    continue;
                }

                let ctx_start = crate::core::find_char_boundary(
                    text,
                    full.start().saturating_sub(SUBJECT_WINDOW_BEFORE),
                );
                let ctx_end = crate::core::find_char_boundary(
                    text,
                    (full.end() + SUBJECT_WINDOW_AFTER).min(text.len()),
                );
                let context = text[ctx_start..ctx_end].to_lowercase().replace('\n', " ");
                let subject = infer_subject(&context, param_type);

                claimed.push((full.start(), full.end()));
                values.push(ExtractedValue {
                    param_type,
                    value,
                    original: full.as_str().to_string(),
                    subject,
                    context: context.trim().to_string(),
                });
            }
        }
        values
    }

    /// Exclusion guards for numbers that only look like values.
    fn excluded(
        &self,
        text: &str,
        value: f64,
        span: (usize, usize),
        standard_numbers: &std::collections::HashSet<u64>,
        standard_spans: &[(usize, usize)],
    ) -> bool {
        // Inside a standard reference span (with a small margin)
        if standard_spans.iter().any(|&(s, e)| {
            span.0 < e + STANDARD_CONTEXT_WINDOW && s.saturating_sub(STANDARD_CONTEXT_WINDOW) < span.1
        }) && standard_numbers.contains(&value.to_bits())
        {
            return true;
        }

        // Year-like numbers
        if value.fract() == 0.0 && (YEAR_MIN..=YEAR_MAX).contains(&value) {
            return true;
        }

        // 4-5 digit round numbers with a standard family just before them
        if value >= 1_000.0 && value <= 99_999.0 && value.fract() == 0.0 {
            let lead_start = crate::core::find_char_boundary(
                text,
                span.0.saturating_sub(STANDARD_CONTEXT_WINDOW),
            );
            let lead = text[lead_start..span.0].to_lowercase();
            for family in ["en ", "en-", "bs ", "bs-", "is ", "is-", "iec ", "iec-", "iso ", "din "]
            {
                if lead.contains(family) {
                    return true;
                }
            }
        }

        false
    }
}

/// Names what a value measures from its surrounding words.
fn infer_subject(context: &str, param_type: &str) -> String {
    for term in SUBJECT_TERMS {
        if context.contains(term) {
            return format!("{term} {}", param_type.replace('_', " "));
        }
    }
    param_type.replace('_', " ")
}

/// Whether two value subjects describe the same thing.
#[must_use]
pub fn subjects_match(a: &str, b: &str) -> bool {
    let a = a.to_lowercase();
    let b = b.to_lowercase();
    if a == b || a.contains(&b) || b.contains(&a) {
        return true;
    }

    let words_a: std::collections::HashSet<&str> =
        a.split_whitespace().filter(|w| w.len() >= 3).collect();
    let words_b: std::collections::HashSet<&str> =
        b.split_whitespace().filter(|w| w.len() >= 3).collect();
    if words_a.intersection(&words_b).next().is_some() {
        return true;
    }

    const RELATED_GROUPS: [&[&str]; 6] = [
        &["cable", "conductor", "wire", "core"],
        &["duct", "conduit", "pipe", "trunking"],
        &["breaker", "mcb", "fuse", "rcd", "protection"],
        &["socket", "outlet", "receptacle"],
        &["panel", "board", "switchgear", "distribution"],
        &["size", "cross-section", "area", "csa"],
    ];
    for group in RELATED_GROUPS {
        if words_a.iter().any(|w| group.contains(w)) && words_b.iter().any(|w| group.contains(w)) {
            return true;
        }
    }
    false
}
