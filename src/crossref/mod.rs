//! Compliance cross-referencing between a source document and reference
//! standards: value mismatches, gaps, value comparisons, standard
//! coverage.

pub mod analyzer;
pub mod values;

pub use analyzer::CrossReferenceAnalyzer;
pub use values::{ExtractedValue, ValueExtractor};

use serde::{Deserialize, Serialize};

/// Analysis modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisMode {
    /// Does the source meet reference requirements?
    Compliance,
    /// What reference requirements does the source not address?
    Gaps,
    /// Do numerical values match between source and references?
    Values,
    /// Which reference standards does the source not cite?
    Standards,
    /// All of the above.
    Full,
}

impl AnalysisMode {
    /// Parses a mode name.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "compliance" => Some(Self::Compliance),
            "gaps" => Some(Self::Gaps),
            "values" => Some(Self::Values),
            "standards" => Some(Self::Standards),
            "full" => Some(Self::Full),
            _ => None,
        }
    }

    const fn includes(self, other: Self) -> bool {
        matches!(self, Self::Full) || (self as u8) == (other as u8)
    }

    /// Whether compliance checking runs in this mode.
    #[must_use]
    pub const fn runs_compliance(self) -> bool {
        self.includes(Self::Compliance)
    }

    /// Whether gap analysis runs in this mode.
    #[must_use]
    pub const fn runs_gaps(self) -> bool {
        self.includes(Self::Gaps)
    }

    /// Whether value comparison runs in this mode.
    #[must_use]
    pub const fn runs_values(self) -> bool {
        self.includes(Self::Values)
    }

    /// Whether standard coverage runs in this mode.
    #[must_use]
    pub const fn runs_standards(self) -> bool {
        self.includes(Self::Standards)
    }
}

/// Severity of a finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[allow(missing_docs)]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
}

impl Severity {
    /// Severity from an absolute percentage difference.
    #[must_use]
    pub fn from_percentage_diff(pct: f64) -> Self {
        let pct = pct.abs();
        if pct > 50.0 {
            Self::Critical
        } else if pct > 20.0 {
            Self::High
        } else if pct > 10.0 {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

/// Issue categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[allow(missing_docs)]
pub enum IssueCategory {
    ValueMismatch,
    MissingRequirement,
    ConflictingSpec,
    StandardNotReferenced,
}

/// A detected compliance issue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceIssue {
    /// Severity of the issue.
    pub severity: Severity,
    /// Category of the issue.
    pub category: IssueCategory,
    /// Short topic label.
    pub topic: String,
    /// Human-readable description.
    pub description: String,
    /// Source document name.
    pub source_doc: String,
    /// Source section.
    pub source_section: String,
    /// Source excerpt.
    pub source_text: String,
    /// Source page.
    pub source_page: u32,
    /// Offending source value, if any.
    pub source_value: Option<String>,
    /// Reference document name.
    pub reference_doc: String,
    /// Reference section.
    pub reference_section: String,
    /// Reference excerpt.
    pub reference_text: String,
    /// Reference page.
    pub reference_page: u32,
    /// Required reference value, if any.
    pub reference_value: Option<String>,
    /// Suggested remediation.
    pub recommendation: String,
}

/// A requirement present in the references but missing from the source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GapItem {
    /// Severity of the gap.
    pub severity: Severity,
    /// Short topic label.
    pub topic: String,
    /// Human-readable description.
    pub description: String,
    /// The requirement text that is not addressed.
    pub missing_requirement: String,
    /// Reference document name.
    pub reference_doc: String,
    /// Reference section.
    pub reference_section: String,
    /// Reference page.
    pub reference_page: u32,
    /// Why the gap matters.
    pub impact: String,
    /// Suggested remediation.
    pub recommendation: String,
    /// Whether the missed requirement is mandatory (`shall`/`must`).
    pub mandatory: bool,
}

/// Relation of a source value to its reference counterpart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
#[allow(missing_docs)]
pub enum ValueStatus {
    Match,
    Higher,
    Lower,
}

/// A numerical comparison between source and reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueComparison {
    /// Parameter described (`Cable Size (conductor size)`).
    pub parameter: String,
    /// Display unit.
    pub unit: String,
    /// Source document.
    pub source_doc: String,
    /// Source value.
    pub source_value: f64,
    /// Source section.
    pub source_section: String,
    /// Reference document.
    pub reference_doc: String,
    /// Reference value.
    pub reference_value: f64,
    /// Reference section.
    pub reference_section: String,
    /// Absolute difference (source − reference).
    pub difference: f64,
    /// Percentage difference relative to the reference.
    pub percentage_diff: f64,
    /// Relation of source to reference.
    pub status: ValueStatus,
    /// Severity from the percentage difference.
    pub severity: Severity,
    /// Human-readable note.
    pub note: String,
}

/// The complete analysis report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplianceReport {
    /// Mode the analysis ran in.
    pub mode: AnalysisMode,
    /// Source document name.
    pub source_document: String,
    /// Reference document names.
    pub reference_documents: Vec<String>,
    /// Focus area, if any.
    pub focus_area: Option<String>,
    /// Compliance issues found.
    pub issues: Vec<ComplianceIssue>,
    /// Gaps found.
    pub gaps: Vec<GapItem>,
    /// Value comparisons.
    pub value_comparisons: Vec<ValueComparison>,
    /// Standards the source references.
    pub standards_referenced: Vec<String>,
    /// Reference standards the source does not cite.
    pub standards_missing: Vec<String>,
    /// Critical findings count.
    pub critical_count: usize,
    /// High findings count.
    pub high_count: usize,
    /// Medium findings count.
    pub medium_count: usize,
    /// Low findings count.
    pub low_count: usize,
    /// 0-100 compliance score.
    pub compliance_score: f64,
    /// Text summary.
    pub summary: String,
    /// Set when the analysis could not complete fully.
    pub truncated: bool,
}

impl ComplianceReport {
    /// Deduplicates findings, tallies severities and derives the score
    /// `clamp(100 - 20c - 10h - 5m - l, 0, 100)`.
    pub fn finalise(&mut self) {
        // Issues dedupe on the description prefix
        let mut seen = std::collections::HashSet::new();
        self.issues.retain(|issue| {
            let key: String = issue.description.to_lowercase().chars().take(100).collect();
            seen.insert(key)
        });

        // Gaps dedupe on topic
        let mut seen = std::collections::HashSet::new();
        self.gaps
            .retain(|gap| seen.insert(gap.topic.to_lowercase()));

        // Comparisons dedupe on (parameter, source, reference)
        let mut seen = std::collections::HashSet::new();
        self.value_comparisons.retain(|vc| {
            seen.insert((
                vc.parameter.clone(),
                vc.source_value.to_bits(),
                vc.reference_value.to_bits(),
            ))
        });

        let severities = self
            .issues
            .iter()
            .map(|i| i.severity)
            .chain(self.gaps.iter().map(|g| g.severity));
        self.critical_count = 0;
        self.high_count = 0;
        self.medium_count = 0;
        self.low_count = 0;
        for severity in severities {
            match severity {
                Severity::Critical => self.critical_count += 1,
                Severity::High => self.high_count += 1,
                Severity::Medium => self.medium_count += 1,
                Severity::Low => self.low_count += 1,
            }
        }

        #[allow(clippy::cast_precision_loss)]
        let penalty = 20.0 * self.critical_count as f64
            + 10.0 * self.high_count as f64
            + 5.0 * self.medium_count as f64
            + self.low_count as f64;
        self.compliance_score = (100.0 - penalty).clamp(0.0, 100.0);

        self.summary = format!(
            "Compliance analysis of {} against {}{}\n\
             Compliance score: {:.0}%\n\
             Critical: {} | High: {} | Medium: {} | Low: {}\n\
             Issues: {} | Gaps: {} | Value comparisons: {}{}",
            self.source_document,
            self.reference_documents.join(", "),
            self.focus_area
                .as_deref()
                .map_or(String::new(), |f| format!(" (focus: {f})")),
            self.compliance_score,
            self.critical_count,
            self.high_count,
            self.medium_count,
            self.low_count,
            self.issues.len(),
            self.gaps.len(),
            self.value_comparisons.len(),
            if self.standards_missing.is_empty() {
                String::new()
            } else {
                format!("\nStandards not referenced: {}", self.standards_missing.len())
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_parse() {
        assert_eq!(AnalysisMode::parse("full"), Some(AnalysisMode::Full));
        assert_eq!(AnalysisMode::parse("GAPS"), Some(AnalysisMode::Gaps));
        assert_eq!(AnalysisMode::parse("bogus"), None);
    }

    #[test]
    fn test_mode_inclusion() {
        assert!(AnalysisMode::Full.runs_compliance());
        assert!(AnalysisMode::Full.runs_standards());
        assert!(AnalysisMode::Gaps.runs_gaps());
        assert!(!AnalysisMode::Gaps.runs_values());
    }

    #[test]
    fn test_severity_ladder() {
        assert_eq!(Severity::from_percentage_diff(60.0), Severity::Critical);
        assert_eq!(Severity::from_percentage_diff(37.5), Severity::High);
        assert_eq!(Severity::from_percentage_diff(15.0), Severity::Medium);
        assert_eq!(Severity::from_percentage_diff(5.0), Severity::Low);
        assert_eq!(Severity::from_percentage_diff(-37.5), Severity::High);
    }

    fn empty_report() -> ComplianceReport {
        ComplianceReport {
            mode: AnalysisMode::Full,
            source_document: "spec".to_string(),
            reference_documents: vec!["IS3218".to_string()],
            focus_area: None,
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
        }
    }

    fn gap(topic: &str, severity: Severity) -> GapItem {
        GapItem {
            severity,
            topic: topic.to_string(),
            description: format!("{topic} missing"),
            missing_requirement: String::new(),
            reference_doc: "IS3218".to_string(),
            reference_section: "6.5".to_string(),
            reference_page: 0,
            impact: String::new(),
            recommendation: String::new(),
            mandatory: true,
        }
    }

    #[test]
    fn test_finalise_counts_and_score() {
        let mut report = empty_report();
        report.gaps.push(gap("emergency lighting", Severity::High));
        report.gaps.push(gap("earthing", Severity::Medium));
        report.finalise();

        assert_eq!(report.high_count, 1);
        assert_eq!(report.medium_count, 1);
        // Severity counts equal total findings
        assert_eq!(
            report.critical_count + report.high_count + report.medium_count + report.low_count,
            report.issues.len() + report.gaps.len()
        );
        assert!((report.compliance_score - 85.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_finalise_dedupes_gaps() {
        let mut report = empty_report();
        report.gaps.push(gap("Earthing", Severity::High));
        report.gaps.push(gap("earthing", Severity::Medium));
        report.finalise();
        assert_eq!(report.gaps.len(), 1);
    }

    #[test]
    fn test_score_floors_at_zero() {
        let mut report = empty_report();
        for i in 0..10 {
            report.gaps.push(gap(&format!("topic {i}"), Severity::Critical));
        }
        report.finalise();
        assert!((report.compliance_score - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_summary_contains_counts() {
        let mut report = empty_report();
        report.gaps.push(gap("ventilation", Severity::High));
        report.finalise();
        assert!(report.summary.contains("Gaps: 1"));
        assert!(report.summary.contains("spec"));
    }
}
