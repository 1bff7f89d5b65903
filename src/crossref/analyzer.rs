//! The cross-reference analysis engine.

use crate::crossref::values::{subjects_match, ValueExtractor, DEFAULT_PRIORITY_TYPES};
use crate::crossref::{
    AnalysisMode, ComplianceIssue, ComplianceReport, GapItem, IssueCategory, Severity,
    ValueComparison, ValueStatus,
};
use crate::error::Result;
use crate::extract::{RequirementExtractor, StandardExtractor, Strength};
use crate::vector::{Filter, FlagField, VectorStore};
use regex::Regex;
use std::collections::HashSet;
use tracing::{info, warn};

/// Minimum token overlap for matching a requirement topic to a source
/// chunk.
const MIN_TOPIC_OVERLAP: usize = 2;

/// Minimum source token-index overlap below which a requirement is a gap.
const MIN_GAP_OVERLAP: usize = 3;

/// Minimum shared technical-context keywords for value pairing.
const MIN_CONTEXT_OVERLAP: usize = 2;

/// Minimum shared tokens for value pairing.
const MIN_WORD_OVERLAP: usize = 5;

/// How many best-matching source chunks are compared per reference chunk.
const TOP_MATCHES: usize = 2;

/// Technical-context vocabulary for value pairing.
const CONTEXT_KEYWORDS: [&str; 40] = [
    "cable", "conductor", "wire", "core", "armour", "sheath", "insulation", "duct", "conduit",
    "trunking", "tray", "socket", "outlet", "switch", "breaker", "fuse", "mcb", "rcd", "panel",
    "board", "switchgear", "distribution", "transformer", "motor", "generator", "ups", "lighting",
    "luminaire", "lux", "emergency", "earthing", "grounding", "bonding", "voltage", "current",
    "power", "frequency", "temperature", "ambient", "rating",
];

/// Inputs to one analysis run.
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    /// Source document name (the spec under scrutiny).
    pub source: String,
    /// Reference document names (standards, requirements).
    pub references: Vec<String>,
    /// Analysis mode.
    pub mode: AnalysisMode,
    /// Optional focus-area keyword group.
    pub focus: Option<String>,
    /// Optional section-number prefix filter.
    pub section_prefix: Option<String>,
}

/// Chunk view the analyses run over.
#[derive(Debug, Clone)]
struct DocChunk {
    text: String,
    page: u32,
    section_number: String,
    section_title: String,
    has_mandatory: bool,
    referenced_standards: Vec<String>,
}

/// Compliance / gap / value / standard-coverage analyzer.
#[derive(Debug)]
pub struct CrossReferenceAnalyzer {
    values: ValueExtractor,
    requirements: RequirementExtractor,
    standards: StandardExtractor,
    word: Option<Regex>,
}

impl Default for CrossReferenceAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl CrossReferenceAnalyzer {
    /// Creates an analyzer with freshly compiled extractors.
    #[must_use]
    pub fn new() -> Self {
        Self {
            values: ValueExtractor::new(),
            requirements: RequirementExtractor::new(),
            standards: StandardExtractor::new(),
            word: Regex::new(r"[a-zA-Z]{4,}").ok(),
        }
    }

    /// Runs the requested analyses and returns the finalised report.
    pub fn analyze<V: VectorStore>(
        &self,
        vectors: &V,
        request: &AnalysisRequest,
    ) -> Result<ComplianceReport> {
        info!(
            source = %request.source,
            references = ?request.references,
            mode = ?request.mode,
            "starting cross-reference analysis"
        );
        let mut report = ComplianceReport {
            mode: request.mode,
            source_document: request.source.clone(),
            reference_documents: request.references.clone(),
            focus_area: request.focus.clone(),
            issues: Vec::new(),
            gaps: Vec::new(),
            value_comparisons: Vec::new(),
            standards_referenced: Vec::new(),
            standards_missing: Vec::new(),
            critical_count: 0,
            high_count: 0,
            medium_count: 0,
            low_count: 0,
            compliance_score: 0.0,
            summary: String::new(),
            truncated: false,
        };

        let focus_keywords = request.focus.as_deref().map(expand_focus_keywords);
        let priority_types = priority_types_for(request.focus.as_deref());

        let source_chunks = self.document_chunks(
            vectors,
            &request.source,
            request.section_prefix.as_deref(),
            focus_keywords.as_deref(),
        )?;
        if source_chunks.is_empty() {
            warn!(document = %request.source, "source document yielded no chunks");
            report.truncated = true;
        }

        let mut reference_chunks: Vec<(String, Vec<DocChunk>)> = Vec::new();
        for reference in &request.references {
            let chunks = self.document_chunks(
                vectors,
                reference,
                request.section_prefix.as_deref(),
                focus_keywords.as_deref(),
            )?;
            if chunks.is_empty() {
                warn!(document = %reference, "reference document yielded no chunks");
                report.truncated = true;
            }
            reference_chunks.push((reference.clone(), chunks));
        }

        if request.mode.runs_compliance() {
            self.check_compliance(&source_chunks, &reference_chunks, &priority_types, &mut report);
        }
        if request.mode.runs_gaps() {
            self.analyze_gaps(&source_chunks, &reference_chunks, &mut report);
        }
        if request.mode.runs_values() {
            self.compare_values(&source_chunks, &reference_chunks, &priority_types, &mut report);
        }
        if request.mode.runs_standards() {
            self.check_standard_coverage(&source_chunks, &reference_chunks, &mut report);
        }

        report.finalise();
        Ok(report)
    }

    /// Scrolls every leaf of a document, applying section and focus filters.
    fn document_chunks<V: VectorStore>(
        &self,
        vectors: &V,
        document: &str,
        section_prefix: Option<&str>,
        focus_keywords: Option<&[String]>,
    ) -> Result<Vec<DocChunk>> {
        let mut filters = vec![
            Filter::DocumentEq(document.to_string()),
            Filter::Flag(FlagField::IsLeaf, true),
        ];
        if let Some(prefix) = section_prefix {
            filters.push(Filter::SectionPrefix(prefix.to_string()));
        }
        let filter = Filter::And(filters);

        let mut chunks = Vec::new();
        let mut cursor = None;
        loop {
            let (page, next) = vectors.scroll(Some(&filter), 256, cursor)?;
            for point in page {
                let text = point.payload.text_original;
                if let Some(keywords) = focus_keywords {
                    let lower = text.to_lowercase();
                    if !keywords.iter().any(|k| lower.contains(k.as_str())) {
                        continue;
                    }
                }
                chunks.push(DocChunk {
                    text,
                    page: point.payload.page,
                    section_number: point.payload.section_number,
                    section_title: point.payload.section_title,
                    has_mandatory: point.payload.has_mandatory,
                    referenced_standards: point.payload.referenced_standards,
                });
            }
            match next {
                Some(c) => cursor = Some(c),
                None => break,
            }
        }
        Ok(chunks)
    }

    /// Compliance: reference mandatory requirements vs matching source
    /// content, flagging value mismatches.
    fn check_compliance(
        &self,
        source_chunks: &[DocChunk],
        reference_chunks: &[(String, Vec<DocChunk>)],
        priority_types: &[&str],
        report: &mut ComplianceReport,
    ) {
        for (reference_doc, chunks) in reference_chunks {
            for ref_chunk in chunks.iter().filter(|c| c.has_mandatory) {
                for requirement in self.requirements.extract(&ref_chunk.text) {
                    if requirement.strength != Strength::Mandatory {
                        continue;
                    }
                    let ref_values = self.values.extract(&requirement.sentence, priority_types);
                    if ref_values.is_empty() {
                        continue;
                    }
                    let Some(source_chunk) =
                        self.best_topic_match(&requirement.sentence, source_chunks)
                    else {
                        continue;
                    };

                    let source_values = self.values.extract(&source_chunk.text, priority_types);
                    for ref_value in &ref_values {
                        let Some(source_value) = source_values
                            .iter()
                            .find(|v| v.param_type == ref_value.param_type)
                        else {
                            continue;
                        };
                        if (source_value.value - ref_value.value).abs() < f64::EPSILON {
                            continue;
                        }

                        let pct =
                            (source_value.value - ref_value.value).abs() / ref_value.value * 100.0;
                        let parameter = title_case(ref_value.param_type);
                        report.issues.push(ComplianceIssue {
                            severity: Severity::from_percentage_diff(pct),
                            category: IssueCategory::ValueMismatch,
                            topic: format!("{parameter} - {}", ref_value.subject),
                            description: format!(
                                "{parameter} ({}): source has {}, but {reference_doc} requires {}",
                                ref_value.subject, source_value.value, ref_value.value,
                            ),
                            source_doc: report.source_document.clone(),
                            source_section: source_chunk.section_number.clone(),
                            source_text: excerpt(&source_chunk.text, 300),
                            source_page: source_chunk.page,
                            source_value: Some(source_value.value.to_string()),
                            reference_doc: reference_doc.clone(),
                            reference_section: ref_chunk.section_number.clone(),
                            reference_text: excerpt(&ref_chunk.text, 300),
                            reference_page: ref_chunk.page,
                            reference_value: Some(ref_value.value.to_string()),
                            recommendation: format!(
                                "Review and align {} with {reference_doc}",
                                ref_value.subject
                            ),
                        });
                    }
                }
            }
        }
    }

    /// Gaps: reference mandatory requirements with no topical footprint in
    /// the source.
    fn analyze_gaps(
        &self,
        source_chunks: &[DocChunk],
        reference_chunks: &[(String, Vec<DocChunk>)],
        report: &mut ComplianceReport,
    ) {
        // Aggregated source token index: key terms plus section titles
        let mut source_tokens: HashSet<String> = HashSet::new();
        for chunk in source_chunks {
            source_tokens.extend(self.tokens(&chunk.text));
            if !chunk.section_title.is_empty() {
                source_tokens.insert(chunk.section_title.to_lowercase());
            }
        }

        for (reference_doc, chunks) in reference_chunks {
            for ref_chunk in chunks.iter().filter(|c| c.has_mandatory) {
                let ref_tokens = self.tokens(&ref_chunk.text);
                let overlap = ref_tokens.intersection(&source_tokens).count();
                if overlap >= MIN_GAP_OVERLAP {
                    continue;
                }

                let lower = ref_chunk.text.to_lowercase();
                let mandatory = lower.contains("shall") || lower.contains("must");
                report.gaps.push(GapItem {
                    severity: if mandatory { Severity::High } else { Severity::Medium },
                    topic: gap_topic(ref_chunk),
                    description: format!(
                        "Requirement from {reference_doc} may not be addressed in the source"
                    ),
                    missing_requirement: excerpt(&ref_chunk.text, 400),
                    reference_doc: reference_doc.clone(),
                    reference_section: ref_chunk.section_number.clone(),
                    reference_page: ref_chunk.page,
                    impact: "Potential non-compliance with requirements".to_string(),
                    recommendation: format!(
                        "Review {reference_doc} section {} and address this requirement",
                        if ref_chunk.section_number.is_empty() {
                            "N/A"
                        } else {
                            &ref_chunk.section_number
                        }
                    ),
                    mandatory,
                });
            }
        }
    }

    /// Values: pair technically similar chunks and compare matching
    /// parameter types with related subjects.
    fn compare_values(
        &self,
        source_chunks: &[DocChunk],
        reference_chunks: &[(String, Vec<DocChunk>)],
        priority_types: &[&str],
        report: &mut ComplianceReport,
    ) {
        let source_features: Vec<(HashSet<&str>, HashSet<String>)> = source_chunks
            .iter()
            .map(|c| (context_keywords(&c.text), self.tokens(&c.text)))
            .collect();

        for (reference_doc, chunks) in reference_chunks {
            for ref_chunk in chunks {
                let ref_values = self.values.extract(&ref_chunk.text, priority_types);
                if ref_values.is_empty() {
                    continue;
                }
                let ref_context = context_keywords(&ref_chunk.text);
                if ref_context.is_empty() {
                    continue;
                }
                let ref_tokens = self.tokens(&ref_chunk.text);

                // Rank source chunks by shared technical context then tokens
                let mut matches: Vec<(usize, usize, usize)> = source_features
                    .iter()
                    .enumerate()
                    .filter_map(|(idx, (context, tokens))| {
                        let context_overlap = ref_context.intersection(context).count();
                        let word_overlap = ref_tokens.intersection(tokens).count();
                        (context_overlap >= MIN_CONTEXT_OVERLAP
                            && word_overlap >= MIN_WORD_OVERLAP)
                            .then_some((idx, context_overlap, word_overlap))
                    })
                    .collect();
                matches.sort_by(|a, b| (b.1, b.2).cmp(&(a.1, a.2)));

                for &(idx, _, _) in matches.iter().take(TOP_MATCHES) {
                    let source_chunk = &source_chunks[idx];
                    let source_values = self.values.extract(&source_chunk.text, priority_types);
                    for ref_value in &ref_values {
                        for source_value in source_values
                            .iter()
                            .filter(|v| v.param_type == ref_value.param_type)
                        {
                            if !subjects_match(&source_value.subject, &ref_value.subject) {
                                continue;
                            }
                            if (source_value.value - ref_value.value).abs() < f64::EPSILON {
                                continue;
                            }
                            let difference = source_value.value - ref_value.value;
                            let pct = if ref_value.value == 0.0 {
                                0.0
                            } else {
                                difference / ref_value.value * 100.0
                            };
                            let status = if source_value.value > ref_value.value {
                                ValueStatus::Higher
                            } else {
                                ValueStatus::Lower
                            };
                            let unit = display_unit(ref_value.param_type);
                            report.value_comparisons.push(ValueComparison {
                                parameter: format!(
                                    "{} ({})",
                                    title_case(ref_value.param_type),
                                    ref_value.subject
                                ),
                                unit: unit.to_string(),
                                source_doc: report.source_document.clone(),
                                source_value: source_value.value,
                                source_section: source_chunk.section_number.clone(),
                                reference_doc: reference_doc.clone(),
                                reference_value: ref_value.value,
                                reference_section: ref_chunk.section_number.clone(),
                                difference,
                                percentage_diff: pct,
                                status,
                                severity: Severity::from_percentage_diff(pct),
                                note: format!(
                                    "{}: source {}{unit}, {reference_doc} requires {}{unit}",
                                    ref_value.subject, source_value.value, ref_value.value,
                                ),
                            });
                        }
                    }
                }
            }
        }
    }

    /// Standards coverage: reference standards the source never cites.
    fn check_standard_coverage(
        &self,
        source_chunks: &[DocChunk],
        reference_chunks: &[(String, Vec<DocChunk>)],
        report: &mut ComplianceReport,
    ) {
        let mut source_standards: HashSet<String> = HashSet::new();
        for chunk in source_chunks {
            source_standards.extend(chunk.referenced_standards.iter().cloned());
            source_standards.extend(
                self.standards
                    .extract(&chunk.text)
                    .into_iter()
                    .map(|s| s.canonical),
            );
        }

        let mut reference_standards: HashSet<String> = HashSet::new();
        for (_, chunks) in reference_chunks {
            for chunk in chunks {
                reference_standards.extend(chunk.referenced_standards.iter().cloned());
                reference_standards.extend(
                    self.standards
                        .extract(&chunk.text)
                        .into_iter()
                        .map(|s| s.canonical),
                );
            }
        }

        let mut referenced: Vec<String> = source_standards.iter().cloned().collect();
        referenced.sort();
        let mut missing: Vec<String> =
            reference_standards.difference(&source_standards).cloned().collect();
        missing.sort();

        for standard in &missing {
            // Core families signal real coverage gaps; exotic ones are noise
            if ["BS", "EN", "IEC", "IS"].iter().any(|p| standard.starts_with(p)) {
                report.gaps.push(GapItem {
                    severity: Severity::Medium,
                    topic: format!("Standard Reference: {standard}"),
                    description: format!(
                        "Standard {standard} is cited by the references but not by the source"
                    ),
                    missing_requirement: format!("Reference to {standard}"),
                    reference_doc: "Multiple".to_string(),
                    reference_section: "Various".to_string(),
                    reference_page: 0,
                    impact: "May indicate incomplete coverage of requirements".to_string(),
                    recommendation: format!("Review whether {standard} applies to the source"),
                    mandatory: false,
                });
            }
        }

        report.standards_referenced = referenced;
        report.standards_missing = missing;
    }

    /// Best source chunk for a requirement topic by token overlap.
    fn best_topic_match<'a>(&self, topic: &str, chunks: &'a [DocChunk]) -> Option<&'a DocChunk> {
        let topic_tokens = self.tokens(topic);
        let mut best: Option<(&DocChunk, usize)> = None;
        for chunk in chunks {
            let overlap = self.tokens(&chunk.text).intersection(&topic_tokens).count();
            if overlap >= MIN_TOPIC_OVERLAP && best.is_none_or(|(_, b)| overlap > b) {
                best = Some((chunk, overlap));
            }
        }
        best.map(|(chunk, _)| chunk)
    }

    fn tokens(&self, text: &str) -> HashSet<String> {
        let Some(re) = &self.word else {
            return HashSet::new();
        };
        re.find_iter(&text.to_lowercase())
            .map(|m| m.as_str().to_string())
            .collect()
    }
}

/// Technical-context keywords present in a chunk.
fn context_keywords(text: &str) -> HashSet<&'static str> {
    let lower = text.to_lowercase();
    CONTEXT_KEYWORDS
        .iter()
        .copied()
        .filter(|k| lower.contains(k))
        .collect()
}

/// Focus area to priority parameter types.
fn priority_types_for(focus: Option<&str>) -> Vec<&'static str> {
    let Some(focus) = focus else {
        return DEFAULT_PRIORITY_TYPES.to_vec();
    };
    let focus = focus.to_lowercase();
    let types: &[&str] = if focus.contains("sizing") || focus.contains("cross") || focus.contains("section")
    {
        &["cable_size", "current", "voltage"]
    } else if focus.contains("wiring") || focus.contains("installation") || focus.contains("cable") {
        &["cable_size", "current", "voltage", "power"]
    } else if focus.contains("current") || focus.contains("amp") {
        &["current", "cable_size"]
    } else if focus.contains("voltage") || focus.contains("volt") {
        &["voltage"]
    } else if focus.contains("fire") || focus.contains("smoke") {
        &["temperature", "time"]
    } else if focus.contains("earth") || focus.contains("ground") {
        &["resistance", "current"]
    } else if focus.contains("lighting") || focus.contains("lux") {
        &["power", "percentage", "lux_level"]
    } else if focus.contains("hvac") || focus.contains("cooling") || focus.contains("heating") {
        &["temperature", "power", "flow_rate", "pressure"]
    } else if focus.contains("ventilation") || focus.contains("fan") {
        &["flow_rate", "pressure", "power", "noise_level"]
    } else if focus.contains("plumbing") || focus.contains("water") || focus.contains("pipe") {
        &["flow_rate", "pressure", "length"]
    } else if focus.contains("acoustic") || focus.contains("noise") {
        &["noise_level"]
    } else {
        return DEFAULT_PRIORITY_TYPES.to_vec();
    };
    types.to_vec()
}

/// Focus area to expanded match keywords.
fn expand_focus_keywords(focus: &str) -> Vec<String> {
    const EXPANSIONS: [(&str, &[&str]); 10] = [
        ("cable", &["cable", "wire", "conductor", "wiring", "core"]),
        ("sizing", &["sizing", "size", "cross-section", "csa", "mm²", "mm2", "area"]),
        ("fire", &["fire", "smoke", "alarm", "detection"]),
        ("earthing", &["earthing", "grounding", "earth", "ground", "bonding"]),
        ("lighting", &["lighting", "lux", "luminaire", "lamp"]),
        ("ups", &["ups", "uninterruptible", "battery", "backup"]),
        ("generator", &["generator", "genset", "standby"]),
        ("hvac", &["hvac", "ventilation", "cooling", "heating", "air"]),
        ("conduit", &["conduit", "duct", "ducting", "trunking", "containment"]),
        ("distribution", &["distribution", "panel", "board", "switchgear"]),
    ];

    let focus = focus.to_lowercase();
    let mut keywords: Vec<String> = vec![focus.clone()];
    for word in focus.split_whitespace() {
        keywords.push(word.to_string());
        for (key, expansions) in EXPANSIONS {
            if word.contains(key) || key.contains(word) {
                keywords.extend(expansions.iter().map(|e| (*e).to_string()));
            }
        }
    }
    keywords.sort();
    keywords.dedup();
    keywords
}

/// Display topic for a gap from its chunk.
fn gap_topic(chunk: &DocChunk) -> String {
    if !chunk.section_title.is_empty() {
        return chunk.section_title.clone();
    }
    excerpt(chunk.text.trim(), 50)
}

/// Display unit for a parameter type.
fn display_unit(param_type: &str) -> &'static str {
    match param_type {
        "temperature" => "°C",
        "voltage" => "V",
        "current" => "A",
        "power" => "W",
        "resistance" => "Ω",
        "cable_size" => "mm²",
        "length" => "m",
        "percentage" => "%",
        "time" => "s",
        "frequency" => "Hz",
        "pressure" => "bar",
        "flow_rate" => "l/s",
        "noise_level" => "dB",
        "lux_level" => "lux",
        _ => "",
    }
}

/// First `max` characters of text on a char boundary.
fn excerpt(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

/// `cable_size` -> `Cable Size`.
fn title_case(param_type: &str) -> String {
    param_type
        .split('_')
        .map(|word| {
            let mut chars = word.chars();
            chars.next().map_or(String::new(), |first| {
                first.to_uppercase().collect::<String>() + chars.as_str()
            })
        })
        .collect::<Vec<_>>()
        .join(" ")
}
