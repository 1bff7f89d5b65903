//! Heading/number/TOC-based section detection and path reconstruction.

use regex::Regex;
use serde::{Deserialize, Serialize};

/// A detected document section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    /// Hierarchy level, clamped to [1, 6].
    pub level: u8,
    /// Dotted section number, empty when the heading carried none.
    pub number: String,
    /// Section title without the number.
    pub title: String,
    /// Byte offset of the heading line in the document text.
    pub start_offset: usize,
}

impl Section {
    /// `"6.5 Cabling"` or just the title when unnumbered.
    #[must_use]
    pub fn display(&self) -> String {
        if self.number.is_empty() {
            self.title.clone()
        } else {
            format!("{} {}", self.number, self.title)
        }
    }
}

/// An externally extracted table-of-contents entry used as a fallback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TocEntry {
    /// Section identifier (`6.5.1`), may be empty.
    pub identifier: String,
    /// Entry title as printed in the TOC.
    pub title: String,
}

/// Parses markdown headings, bare dotted numbers and TOC matches into an
/// ordered section list, and rebuilds ancestor paths.
#[derive(Debug)]
pub struct SectionParser {
    heading: Option<Regex>,
    numbered_title: Option<Regex>,
    bare_number: Option<Regex>,
    page_section: Option<Regex>,
}

impl Default for SectionParser {
    fn default() -> Self {
        Self::new()
    }
}

impl SectionParser {
    /// Compiles the heading patterns.
    #[must_use]
    pub fn new() -> Self {
        Self {
            heading: Regex::new(r"^(#{1,6})\s+(.+)$").ok(),
            numbered_title: Regex::new(r"^(\d+(?:\.\d+)*)\s+(.+)$").ok(),
            bare_number: Regex::new(r"^(\d+(?:\.\d+)+)[.:]?\s+(.+)$").ok(),
            page_section: Regex::new(r"(?i)Section\s+(\d+(?:\.\d+)*)\s*[:\-]?\s*(.+)$").ok(),
        }
    }

    /// Parses the full text into ordered sections.
    ///
    /// Level comes from the markdown heading depth, else from the number
    /// of dot-separated parts of a leading dotted number, clamped to
    /// [1, 6]. When TOC entries are supplied, a line matching an entry's
    /// title verbatim at the start of a line is treated as that section
    /// even without a heading marker.
    #[must_use]
    pub fn parse(&self, text: &str, toc: &[TocEntry]) -> Vec<Section> {
        let mut sections = Vec::new();
        let mut offset = 0;

        for line in text.split('\n') {
            if let Some(section) = self.parse_line(line.trim_end(), offset, toc) {
                sections.push(section);
            }
            offset += line.len() + 1;
        }

        sections
    }

    fn parse_line(&self, line: &str, offset: usize, toc: &[TocEntry]) -> Option<Section> {
        let trimmed = line.trim_start();
        if trimmed.is_empty() {
            return None;
        }
        let offset = offset + (line.len() - trimmed.len());

        // Markdown heading, optionally carrying a dotted number
        if let Some(caps) = self.heading.as_ref().and_then(|re| re.captures(trimmed)) {
            #[allow(clippy::cast_possible_truncation)]
            let level = caps.get(1).map_or(1, |m| m.as_str().len()).min(6) as u8;
            let title = caps.get(2).map_or("", |m| m.as_str()).trim();
            if let Some(num_caps) = self
                .numbered_title
                .as_ref()
                .and_then(|re| re.captures(title))
            {
                return Some(Section {
                    level,
                    number: num_caps.get(1).map_or("", |m| m.as_str()).to_string(),
                    title: num_caps.get(2).map_or("", |m| m.as_str()).trim().to_string(),
                    start_offset: offset,
                });
            }
            return Some(Section {
                level,
                number: String::new(),
                title: title.to_string(),
                start_offset: offset,
            });
        }

        // Bare dotted number at line start; level from dot depth
        if let Some(caps) = self.bare_number.as_ref().and_then(|re| re.captures(trimmed)) {
            let number = caps.get(1).map_or("", |m| m.as_str());
            #[allow(clippy::cast_possible_truncation)]
            let level = number.split('.').count().clamp(1, 6) as u8;
            return Some(Section {
                level,
                number: number.to_string(),
                title: caps.get(2).map_or("", |m| m.as_str()).trim().to_string(),
                start_offset: offset,
            });
        }

        // TOC fallback: a line equal to an entry title (optionally prefixed
        // by its identifier) is a section heading even without markers.
        for entry in toc {
            if entry.title.len() < 4 {
                continue;
            }
            let matched = trimmed.eq_ignore_ascii_case(&entry.title)
                || (!entry.identifier.is_empty()
                    && strip_identifier_prefix(trimmed, &entry.identifier)
                        .is_some_and(|rest| rest.eq_ignore_ascii_case(&entry.title)));
            if matched {
                #[allow(clippy::cast_possible_truncation)]
                let level = if entry.identifier.is_empty() {
                    1
                } else {
                    entry.identifier.split('.').count().clamp(1, 6) as u8
                };
                return Some(Section {
                    level,
                    number: entry.identifier.clone(),
                    title: entry.title.clone(),
                    start_offset: offset,
                });
            }
        }

        None
    }

    /// Sniffs a section number/title from the top of a page.
    ///
    /// Scans the first 20 lines for a markdown heading with a number, a
    /// bare dotted number, or a `Section X.Y: Title` phrase.
    #[must_use]
    pub fn sniff_page_section(&self, page_text: &str) -> Option<(String, String)> {
        for line in page_text.lines().take(20) {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            if let Some(caps) = self.heading.as_ref().and_then(|re| re.captures(line)) {
                let title = caps.get(2).map_or("", |m| m.as_str());
                if let Some(num_caps) = self
                    .numbered_title
                    .as_ref()
                    .and_then(|re| re.captures(title))
                {
                    return Some((
                        num_caps.get(1).map_or("", |m| m.as_str()).to_string(),
                        num_caps.get(2).map_or("", |m| m.as_str()).trim().to_string(),
                    ));
                }
            }

            if let Some(caps) = self.bare_number.as_ref().and_then(|re| re.captures(line)) {
                return Some((
                    caps.get(1).map_or("", |m| m.as_str()).to_string(),
                    caps.get(2).map_or("", |m| m.as_str()).trim().to_string(),
                ));
            }

            if let Some(caps) = self.page_section.as_ref().and_then(|re| re.captures(line)) {
                return Some((
                    caps.get(1).map_or("", |m| m.as_str()).to_string(),
                    caps.get(2).map_or("", |m| m.as_str()).trim().to_string(),
                ));
            }
        }
        None
    }

    /// Builds the ancestor path for the section at `index`:
    /// `"6 Wiring > 6.5 Cabling > 6.5.1 Types"`.
    ///
    /// Walks backwards collecting the nearest section at each shallower
    /// level until level 1 is reached.
    #[must_use]
    pub fn build_path(sections: &[Section], index: usize) -> String {
        let Some(current) = sections.get(index) else {
            return String::new();
        };
        let mut parts = vec![current.display()];
        let mut level = current.level;

        for section in sections[..index].iter().rev() {
            if section.level < level {
                parts.push(section.display());
                level = section.level;
                if level == 1 {
                    break;
                }
            }
        }

        parts.reverse();
        parts.join(" > ")
    }

    /// Finds the index of the section covering the given byte offset.
    #[must_use]
    pub fn section_at(sections: &[Section], offset: usize) -> Option<usize> {
        sections
            .iter()
            .rposition(|s| s.start_offset <= offset)
    }
}

fn strip_identifier_prefix<'a>(line: &'a str, identifier: &str) -> Option<&'a str> {
    let rest = line.strip_prefix(identifier)?;
    let rest = rest.trim_start_matches(['.', ' ', '\t']);
    Some(rest)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = "\
# 6 Wiring

intro text

## 6.5 Cabling

cable text

### 6.5.1 Types

type text";

    #[test]
    fn test_parse_markdown_headings() {
        let parser = SectionParser::new();
        let sections = parser.parse(DOC, &[]);
        assert_eq!(sections.len(), 3);
        assert_eq!(sections[0].level, 1);
        assert_eq!(sections[0].number, "6");
        assert_eq!(sections[0].title, "Wiring");
        assert_eq!(sections[2].level, 3);
        assert_eq!(sections[2].number, "6.5.1");
    }

    #[test]
    fn test_build_path() {
        let parser = SectionParser::new();
        let sections = parser.parse(DOC, &[]);
        let path = SectionParser::build_path(&sections, 2);
        assert_eq!(path, "6 Wiring > 6.5 Cabling > 6.5.1 Types");
    }

    #[test]
    fn test_bare_dotted_number_level() {
        let parser = SectionParser::new();
        let sections = parser.parse("4.2.3 Trench Depths\ncontent", &[]);
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].level, 3);
        assert_eq!(sections[0].number, "4.2.3");
        assert_eq!(sections[0].title, "Trench Depths");
    }

    #[test]
    fn test_level_clamped_to_six() {
        let parser = SectionParser::new();
        let sections = parser.parse("1.2.3.4.5.6.7.8 Deep\ncontent", &[]);
        assert_eq!(sections[0].level, 6);
    }

    #[test]
    fn test_unnumbered_heading() {
        let parser = SectionParser::new();
        let sections = parser.parse("## Scope\ncontent", &[]);
        assert_eq!(sections[0].level, 2);
        assert!(sections[0].number.is_empty());
        assert_eq!(sections[0].title, "Scope");
    }

    #[test]
    fn test_toc_fallback() {
        let parser = SectionParser::new();
        let toc = vec![TocEntry {
            identifier: "1.2".to_string(),
            title: "Scope of Works".to_string(),
        }];
        let sections = parser.parse("preamble\nScope of Works\nbody", &toc);
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].number, "1.2");
        assert_eq!(sections[0].level, 2);
    }

    #[test]
    fn test_toc_fallback_with_identifier_prefix() {
        let parser = SectionParser::new();
        let toc = vec![TocEntry {
            identifier: "1.2".to_string(),
            title: "Scope of Works".to_string(),
        }];
        // Line also matches the bare-number pattern; identical outcome, but
        // exercise the TOC path with a non-numeric lead-in
        let sections = parser.parse("A. Scope of Works\n", &toc);
        assert!(sections.is_empty());
        let sections = parser.parse("1.2. Scope of Works\n", &toc);
        assert_eq!(sections[0].number, "1.2");
    }

    #[test]
    fn test_sniff_page_section() {
        let parser = SectionParser::new();
        let page = "page header\n## 2.1 Specifications\ncontent";
        let (number, title) = parser.sniff_page_section(page).unwrap();
        assert_eq!(number, "2.1");
        assert_eq!(title, "Specifications");
    }

    #[test]
    fn test_sniff_section_phrase() {
        let parser = SectionParser::new();
        let page = "Section 3.4: Earthing Arrangements\ncontent";
        let (number, title) = parser.sniff_page_section(page).unwrap();
        assert_eq!(number, "3.4");
        assert_eq!(title, "Earthing Arrangements");
    }

    #[test]
    fn test_sniff_nothing() {
        let parser = SectionParser::new();
        assert!(parser.sniff_page_section("plain prose with no heading").is_none());
    }

    #[test]
    fn test_section_at_offset() {
        let parser = SectionParser::new();
        let sections = parser.parse(DOC, &[]);
        let idx = SectionParser::section_at(&sections, DOC.len() - 1).unwrap();
        assert_eq!(sections[idx].number, "6.5.1");
        let idx = SectionParser::section_at(&sections, 0).unwrap();
        assert_eq!(sections[idx].number, "6");
    }

    #[test]
    fn test_empty_text() {
        let parser = SectionParser::new();
        assert!(parser.parse("", &[]).is_empty());
        assert_eq!(SectionParser::build_path(&[], 0), "");
    }

    #[test]
    fn test_path_skips_siblings() {
        let parser = SectionParser::new();
        let text = "# 6 Wiring\n## 6.4 Other\n## 6.5 Cabling\n### 6.5.1 Types\n";
        let sections = parser.parse(text, &[]);
        let path = SectionParser::build_path(&sections, 3);
        assert_eq!(path, "6 Wiring > 6.5 Cabling > 6.5.1 Types");
    }
}
