//! Processed source documents.

use serde::{Deserialize, Serialize};

/// A processed source document.
///
/// The `name` is the stable identifier used across the vector store, the
/// knowledge graph and the feedback tables. Metadata is mutable through
/// the metadata editor surface only; deleting a document cascades to its
/// chunks and outgoing graph edges.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    /// Stable document identifier (usually the file stem).
    pub name: String,
    /// Original file name including extension.
    pub file_name: String,
    /// Document categories.
    #[serde(default)]
    pub categories: Vec<String>,
    /// Optional project assignment.
    #[serde(default)]
    pub project: Option<String>,
    /// Standard number printed on the document, if any.
    #[serde(default)]
    pub standard_no: Option<String>,
    /// Publication date, free-form.
    #[serde(default)]
    pub date: Option<String>,
    /// Free-form description used in the chunk context prefix.
    #[serde(default)]
    pub description: Option<String>,
    /// Number of leaf chunks indexed for this document.
    #[serde(default)]
    pub chunk_count: usize,
}

impl DocumentRecord {
    /// Creates a record from a file name, deriving `name` from the stem.
    #[must_use]
    pub fn from_file_name(file_name: &str) -> Self {
        let name = std::path::Path::new(file_name)
            .file_stem()
            .map_or_else(|| file_name.to_string(), |s| s.to_string_lossy().to_string());
        Self {
            name,
            file_name: file_name.to_string(),
            ..Self::default()
        }
    }

    /// One-line display summary for the chunk context prefix.
    ///
    /// Prefers the description, then the standard number, then categories.
    #[must_use]
    pub fn display_summary(&self) -> String {
        if let Some(desc) = self.description.as_deref().filter(|d| !d.is_empty()) {
            return format!("{}: {desc}", self.name);
        }
        if let Some(std_no) = self.standard_no.as_deref().filter(|s| !s.is_empty()) {
            let mut summary = format!("Technical standard {std_no} ({})", self.name);
            if !self.categories.is_empty() {
                summary.push_str(&format!(" covering {}", self.categories.join(", ")));
            }
            return summary;
        }
        if self.categories.is_empty() {
            self.name.clone()
        } else {
            format!("{} ({})", self.name, self.categories.join(", "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_file_name() {
        let doc = DocumentRecord::from_file_name("IS3218_2024.pdf");
        assert_eq!(doc.name, "IS3218_2024");
        assert_eq!(doc.file_name, "IS3218_2024.pdf");
    }

    #[test]
    fn test_display_summary_prefers_description() {
        let doc = DocumentRecord {
            name: "IS3218".to_string(),
            description: Some("Fire detection and alarm systems".to_string()),
            standard_no: Some("IS 3218:2024".to_string()),
            ..DocumentRecord::default()
        };
        assert_eq!(
            doc.display_summary(),
            "IS3218: Fire detection and alarm systems"
        );
    }

    #[test]
    fn test_display_summary_standard_no() {
        let doc = DocumentRecord {
            name: "IS3218".to_string(),
            standard_no: Some("IS 3218:2024".to_string()),
            categories: vec!["Fire Safety".to_string()],
            ..DocumentRecord::default()
        };
        assert_eq!(
            doc.display_summary(),
            "Technical standard IS 3218:2024 (IS3218) covering Fire Safety"
        );
    }

    #[test]
    fn test_display_summary_bare() {
        let doc = DocumentRecord::from_file_name("notes.md");
        assert_eq!(doc.display_summary(), "notes");
    }

    #[test]
    fn test_serde_roundtrip() {
        let doc = DocumentRecord {
            name: "spec".to_string(),
            file_name: "spec.pdf".to_string(),
            categories: vec!["Standard".to_string()],
            chunk_count: 42,
            ..DocumentRecord::default()
        };
        let json = serde_json::to_string(&doc).unwrap();
        let back: DocumentRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, doc);
    }
}
