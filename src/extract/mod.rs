//! Deterministic entity and reference extraction.
//!
//! Extraction is total: any input produces a (possibly empty) result and
//! never an error. Each extractor returns positional spans for
//! relationship inference plus a deduplicated metadata view suitable for
//! vector-store payloads.

pub mod crossrefs;
pub mod requirements;
pub mod sections;
pub mod specs;
pub mod standards;

pub use crossrefs::{CrossRef, CrossRefExtractor, RelationIntent};
pub use requirements::{RequirementExtractor, RequirementRef, Strength};
pub use sections::{SectionRef, SectionRefExtractor, SectionRefKind};
pub use specs::{ParamType, SpecExtractor, SpecRef};
pub use standards::{canonical_key, StandardExtractor, StandardFamily, StandardRef};

use crate::core::SpecValue;
use serde::{Deserialize, Serialize};

/// A single extracted entity, tagged by variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Extraction {
    /// Standard reference.
    Standard(StandardRef),
    /// Specification value.
    Specification(SpecRef),
    /// Requirement sentence.
    Requirement(RequirementRef),
    /// Section reference.
    Section(SectionRef),
    /// Cross-reference phrase.
    CrossReference(CrossRef),
}

/// Everything extracted from one chunk of text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractionSet {
    /// Standard references, deduplicated by canonical key.
    pub standards: Vec<StandardRef>,
    /// Specification values with spans.
    pub specifications: Vec<SpecRef>,
    /// Requirement sentences.
    pub requirements: Vec<RequirementRef>,
    /// Section references.
    pub sections: Vec<SectionRef>,
    /// Cross-reference phrases.
    pub cross_references: Vec<CrossRef>,
}

impl ExtractionSet {
    /// Total number of extracted entities.
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.standards.len()
            + self.specifications.len()
            + self.requirements.len()
            + self.sections.len()
            + self.cross_references.len()
    }

    /// Flattens into the tagged-variant list, ordered by span start.
    #[must_use]
    pub fn into_extractions(self) -> Vec<Extraction> {
        let mut all: Vec<Extraction> = Vec::with_capacity(self.entity_count());
        all.extend(self.standards.into_iter().map(Extraction::Standard));
        all.extend(self.specifications.into_iter().map(Extraction::Specification));
        all.extend(self.requirements.into_iter().map(Extraction::Requirement));
        all.extend(self.sections.into_iter().map(Extraction::Section));
        all.extend(self.cross_references.into_iter().map(Extraction::CrossReference));
        all.sort_by_key(|e| match e {
            Extraction::Standard(r) => r.span.0,
            Extraction::Specification(r) => r.span.0,
            Extraction::Requirement(r) => r.span.0,
            Extraction::Section(r) => r.span.0,
            Extraction::CrossReference(r) => r.span.0,
        });
        all
    }

    /// Deduplicated metadata view for indexing.
    #[must_use]
    pub fn metadata(&self) -> ChunkEntityMetadata {
        let mut families: Vec<String> = self
            .standards
            .iter()
            .map(|s| s.family.prefix().to_string())
            .collect();
        families.sort();
        families.dedup();

        let mut strengths: Vec<String> = Strength::PRIORITY
            .iter()
            .filter(|s| self.requirements.iter().any(|r| r.strength == **s))
            .map(|s| s.as_str().to_string())
            .collect();
        strengths.dedup();

        ChunkEntityMetadata {
            referenced_standards: self.standards.iter().map(|s| s.canonical.clone()).collect(),
            standard_families: families,
            spec_values: self
                .specifications
                .iter()
                .take(ChunkEntityMetadata::MAX_SPEC_VALUES)
                .map(SpecRef::to_spec_value)
                .collect(),
            requirement_strengths: strengths,
            has_mandatory: self
                .requirements
                .iter()
                .any(|r| r.strength == Strength::Mandatory),
            entity_count: self.entity_count(),
        }
    }
}

/// Deduplicated per-chunk entity metadata stored in the vector payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkEntityMetadata {
    /// Canonical standard keys.
    pub referenced_standards: Vec<String>,
    /// Distinct standard family prefixes.
    pub standard_families: Vec<String>,
    /// Specification values (capped).
    pub spec_values: Vec<SpecValue>,
    /// Requirement strengths present.
    pub requirement_strengths: Vec<String>,
    /// Whether any mandatory requirement is present.
    pub has_mandatory: bool,
    /// Total entity count.
    pub entity_count: usize,
}

impl ChunkEntityMetadata {
    /// Cap on stored specification values per chunk.
    pub const MAX_SPEC_VALUES: usize = 10;
}

/// Combined extractor running all recognisers over a chunk.
#[derive(Debug, Default)]
pub struct EntityExtractor {
    standards: StandardExtractor,
    specs: SpecExtractor,
    requirements: RequirementExtractor,
    sections: SectionRefExtractor,
    cross_refs: CrossRefExtractor,
}

impl EntityExtractor {
    /// Compiles all extraction patterns.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs every recogniser over the text. Total: never fails.
    #[must_use]
    pub fn extract(&self, text: &str) -> ExtractionSet {
        ExtractionSet {
            standards: self.standards.extract(text),
            specifications: self.specs.extract(text),
            requirements: self.requirements.extract(text),
            sections: self.sections.extract(text),
            cross_references: self.cross_refs.extract(text),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const SAMPLE: &str = "\
## 6.5.1 Cable Requirements

Cables shall comply with IEC 60364-5-52 and BS 7671 requirements.
The minimum conductor size for power circuits shall be 2.5 mm².
According to EN 50575, cables in escape routes shall have fire resistance.
This standard supersedes IS 3218-1982.";

    #[test]
    fn test_extract_all_kinds() {
        let extractor = EntityExtractor::new();
        let set = extractor.extract(SAMPLE);

        assert!(set.standards.iter().any(|s| s.canonical == "IEC60364-5-52"));
        assert!(set.standards.iter().any(|s| s.canonical == "BS7671"));
        assert!(set
            .specifications
            .iter()
            .any(|s| s.param_type == ParamType::Area));
        assert!(!set.requirements.is_empty());
        assert!(set
            .cross_references
            .iter()
            .any(|c| c.relation == RelationIntent::Supersedes));
        assert!(set.entity_count() > 4);
    }

    #[test]
    fn test_metadata_view() {
        let extractor = EntityExtractor::new();
        let meta = extractor.extract(SAMPLE).metadata();

        assert!(meta.has_mandatory);
        assert!(meta
            .referenced_standards
            .contains(&"IEC60364-5-52".to_string()));
        assert!(meta.standard_families.contains(&"IEC".to_string()));
        assert!(meta.requirement_strengths.contains(&"mandatory".to_string()));
        assert_eq!(meta.spec_values[0].param_type, "area");
    }

    #[test]
    fn test_empty_chunk_empty_metadata() {
        let extractor = EntityExtractor::new();
        let set = extractor.extract("");
        assert_eq!(set.entity_count(), 0);
        let meta = set.metadata();
        assert!(meta.referenced_standards.is_empty());
        assert!(meta.spec_values.is_empty());
        assert!(!meta.has_mandatory);
    }

    #[test]
    fn test_into_extractions_ordered() {
        let extractor = EntityExtractor::new();
        let all = extractor.extract(SAMPLE).into_extractions();
        let spans: Vec<usize> = all
            .iter()
            .map(|e| match e {
                Extraction::Standard(r) => r.span.0,
                Extraction::Specification(r) => r.span.0,
                Extraction::Requirement(r) => r.span.0,
                Extraction::Section(r) => r.span.0,
                Extraction::CrossReference(r) => r.span.0,
            })
            .collect();
        let mut sorted = spans.clone();
        sorted.sort_unstable();
        assert_eq!(spans, sorted);
    }

    #[test]
    fn test_spec_values_capped() {
        let extractor = EntityExtractor::new();
        let many: String = (1..=20).map(|i| format!("{i} V, ")).collect();
        let meta = extractor.extract(&many).metadata();
        assert_eq!(meta.spec_values.len(), ChunkEntityMetadata::MAX_SPEC_VALUES);
    }

    proptest! {
        // Extraction is total: any input yields a result, never a panic.
        #[test]
        fn prop_extraction_total(input in ".{0,400}") {
            let extractor = EntityExtractor::new();
            let set = extractor.extract(&input);
            let _ = set.metadata();
        }

        // Canonical keys are idempotent for every extracted reference.
        #[test]
        fn prop_canonical_idempotent(input in "[A-Za-z0-9 ._:-]{0,80}") {
            let extractor = EntityExtractor::new();
            for std_ref in extractor.extract(&input).standards {
                prop_assert_eq!(
                    canonical_key(&std_ref.canonical),
                    std_ref.canonical.clone()
                );
            }
        }
    }
}
