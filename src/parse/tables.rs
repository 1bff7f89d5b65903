//! Markdown table parsing into typed cells with multiple serialisations.
//!
//! Dense retrieval scores tables better when textual forms accompany the
//! grid, so every parsed table is serialised three ways: canonical JSON,
//! per-row natural language, and a min/max summary sentence.

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Table classification from header and content lexicon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[allow(missing_docs)]
pub enum TableType {
    Specification,
    Comparison,
    Reference,
    Data,
    Requirement,
}

impl TableType {
    const LEXICON: [(Self, &'static [&'static str]); 5] = [
        (
            Self::Specification,
            &["rating", "spec", "parameter", "value", "unit", "range", "limit"],
        ),
        (
            Self::Comparison,
            &["vs", "compare", "difference", "option", "choice", "type"],
        ),
        (
            Self::Reference,
            &["standard", "code", "clause", "section", "reference", "norm"],
        ),
        (
            Self::Data,
            &["measurement", "result", "test", "sample", "reading"],
        ),
        (
            Self::Requirement,
            &["requirement", "mandatory", "optional", "condition", "criteria"],
        ),
    ];

    /// Lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Specification => "specification",
            Self::Comparison => "comparison",
            Self::Reference => "reference",
            Self::Data => "data",
            Self::Requirement => "requirement",
        }
    }
}

/// Typed value of a table cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CellValue {
    /// Free text.
    Text,
    /// Plain number.
    Number {
        /// Parsed value.
        value: f64,
    },
    /// Number with a recognised unit.
    UnitValue {
        /// Parsed value.
        value: f64,
        /// Unit as written.
        unit: String,
    },
    /// Numeric range (`10-20`, `10 to 20`).
    Range {
        /// Lower bound.
        low: f64,
        /// Upper bound.
        high: f64,
        /// Trailing unit, if any.
        unit: Option<String>,
    },
}

/// A single table cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableCell {
    /// Raw cell text.
    pub text: String,
    /// Column header this cell falls under.
    pub header: String,
    /// Typed interpretation.
    pub value: CellValue,
}

impl TableCell {
    /// Numeric value, if the cell carries one.
    #[must_use]
    pub fn numeric(&self) -> Option<f64> {
        match &self.value {
            CellValue::Number { value } | CellValue::UnitValue { value, .. } => Some(*value),
            CellValue::Range { low, .. } => Some(*low),
            CellValue::Text => None,
        }
    }
}

/// A table row; the first cell usually names what the row describes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableRow {
    /// Zero-based row index.
    pub index: usize,
    /// First cell of the row.
    pub row_header: String,
    /// Cells aligned with the table headers.
    pub cells: Vec<TableCell>,
}

/// A fully parsed markdown table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedTable {
    /// Caption from the preceding `Table N` line, if any.
    pub caption: String,
    /// Detected table type.
    pub table_type: TableType,
    /// Column headers.
    pub headers: Vec<String>,
    /// Data rows.
    pub rows: Vec<TableRow>,
}

impl ParsedTable {
    /// Canonical JSON form.
    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Re-parses the canonical JSON form.
    pub fn from_json(json: &str) -> crate::error::Result<Self> {
        Ok(serde_json::from_str(json).map_err(crate::error::StoreError::from)?)
    }

    /// Natural-language row descriptions keyed by the row header.
    #[must_use]
    pub fn to_natural_language(&self) -> String {
        let mut lines = Vec::new();
        if !self.caption.is_empty() {
            lines.push(format!("Table: {}", self.caption));
        }
        for row in &self.rows {
            let fields: Vec<String> = row
                .cells
                .iter()
                .skip(usize::from(!row.row_header.is_empty()))
                .filter(|c| !c.text.is_empty() && !c.header.is_empty())
                .map(|c| format!("{}: {}", c.header, c.text))
                .collect();
            if fields.is_empty() {
                continue;
            }
            if row.row_header.is_empty() {
                lines.push(fields.join(" | "));
            } else {
                lines.push(format!("For {}: {}", row.row_header, fields.join(", ")));
            }
        }
        lines.join("\n")
    }

    /// Short summary sentence with min/max per numeric column.
    #[must_use]
    pub fn summary(&self) -> String {
        let mut parts = vec![format!(
            "A {} table with {} columns and {} rows.",
            self.table_type.as_str(),
            self.headers.len(),
            self.rows.len()
        )];
        parts.push(format!("Columns: {}.", self.headers.join(", ")));

        let mut ranges = Vec::new();
        for header in &self.headers {
            let values: Vec<f64> = self
                .rows
                .iter()
                .flat_map(|r| &r.cells)
                .filter(|c| &c.header == header)
                .filter_map(TableCell::numeric)
                .collect();
            if values.is_empty() {
                continue;
            }
            let min = values.iter().copied().fold(f64::INFINITY, f64::min);
            let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            if (max - min).abs() < f64::EPSILON {
                ranges.push(format!("{header}: {min}"));
            } else {
                ranges.push(format!("{header}: {min}-{max}"));
            }
        }
        if !ranges.is_empty() {
            parts.push(format!("Value ranges: {}.", ranges.join(", ")));
        }
        parts.join(" ")
    }
}

/// Markdown table parser.
#[derive(Debug)]
pub struct TableParser {
    separator: Option<Regex>,
    caption: Option<Regex>,
    unit_value: Option<Regex>,
    number: Option<Regex>,
    range: Option<Regex>,
}

impl Default for TableParser {
    fn default() -> Self {
        Self::new()
    }
}

impl TableParser {
    /// Compiles the table patterns.
    #[must_use]
    pub fn new() -> Self {
        Self {
            separator: Regex::new(r"^\|[-:\s|]+\|$").ok(),
            caption: Regex::new(r"(?i)^(?:Table|Tab\.?)\s*\d*[.:]?").ok(),
            unit_value: Regex::new(
                r"(\d+(?:\.\d+)?)\s*(mm²|mm2|kV|mV|V|kA|mA|A|kW|MW|W|Ω|ohms?|°C|°F|K|mm|cm|m|km|Hz|kHz|MHz|%)",
            )
            .ok(),
            number: Regex::new(r"^-?\d+(?:\.\d+)?$").ok(),
            range: Regex::new(r"^(\d+(?:\.\d+)?)\s*(?:-|–|to)\s*(\d+(?:\.\d+)?)\s*(.*)$").ok(),
        }
    }

    /// Quick check whether a chunk contains a markdown table.
    #[must_use]
    pub fn has_table(&self, text: &str) -> bool {
        text.lines()
            .any(|l| l.trim_start().starts_with('|') && l.trim_start()[1..].contains('|'))
    }

    /// Extracts and parses every table in the chunk text.
    #[must_use]
    pub fn extract_tables(&self, text: &str) -> Vec<ParsedTable> {
        let mut tables = Vec::new();
        let mut current: Vec<&str> = Vec::new();
        let mut caption = String::new();

        for line in text.lines() {
            let stripped = line.trim();
            let is_table_line = stripped.starts_with('|') && stripped[1..].contains('|');

            if is_table_line {
                current.push(stripped);
            } else {
                if !current.is_empty() {
                    if let Some(table) = self.parse_lines(&current, &caption) {
                        tables.push(table);
                    }
                    current.clear();
                    caption.clear();
                }
                // A caption line precedes the table it names
                if !stripped.is_empty()
                    && self
                        .caption
                        .as_ref()
                        .is_some_and(|re| re.is_match(stripped))
                {
                    caption = stripped.to_string();
                }
            }
        }
        if !current.is_empty() {
            if let Some(table) = self.parse_lines(&current, &caption) {
                tables.push(table);
            }
        }

        tables
    }

    /// Parses the first table found in the text, if any.
    #[must_use]
    pub fn parse(&self, text: &str) -> Option<ParsedTable> {
        self.extract_tables(text).into_iter().next()
    }

    fn parse_lines(&self, lines: &[&str], caption: &str) -> Option<ParsedTable> {
        let data_lines: Vec<&&str> = lines
            .iter()
            .filter(|l| {
                self.separator
                    .as_ref()
                    .is_none_or(|re| !re.is_match(l.trim()))
            })
            .collect();
        // Header plus at least one data row
        if data_lines.len() < 2 {
            return None;
        }

        let headers = split_row(data_lines[0]);
        let mut rows = Vec::new();

        for (index, line) in data_lines[1..].iter().enumerate() {
            let mut cells_text = split_row(line);
            cells_text.resize(headers.len(), String::new());
            cells_text.truncate(headers.len());

            let row_header = cells_text.first().cloned().unwrap_or_default();
            let cells = headers
                .iter()
                .zip(&cells_text)
                .map(|(header, text)| TableCell {
                    text: text.clone(),
                    header: header.clone(),
                    value: self.type_cell(text),
                })
                .collect();

            rows.push(TableRow {
                index,
                row_header,
                cells,
            });
        }

        let table_type = Self::detect_type(&headers, &rows);
        Some(ParsedTable {
            caption: caption.to_string(),
            table_type,
            headers,
            rows,
        })
    }

    fn type_cell(&self, text: &str) -> CellValue {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return CellValue::Text;
        }
        // Ranges first: "10-20 A" would otherwise read as a 20 A unit value
        if let Some(caps) = self.range.as_ref().and_then(|re| re.captures(trimmed)) {
            if let (Some(low), Some(high)) = (
                caps.get(1).and_then(|v| v.as_str().parse().ok()),
                caps.get(2).and_then(|v| v.as_str().parse().ok()),
            ) {
                let unit = caps
                    .get(3)
                    .map(|u| u.as_str().trim().to_string())
                    .filter(|u| !u.is_empty());
                return CellValue::Range { low, high, unit };
            }
        }
        if self.number.as_ref().is_some_and(|re| re.is_match(trimmed)) {
            if let Ok(value) = trimmed.parse() {
                return CellValue::Number { value };
            }
        }
        if let Some(caps) = self.unit_value.as_ref().and_then(|re| re.captures(trimmed)) {
            if let Some(value) = caps.get(1).and_then(|v| v.as_str().parse().ok()) {
                return CellValue::UnitValue {
                    value,
                    unit: caps.get(2).map_or("", |u| u.as_str()).to_string(),
                };
            }
        }
        CellValue::Text
    }

    fn detect_type(headers: &[String], rows: &[TableRow]) -> TableType {
        let header_text = headers.join(" ").to_lowercase();
        for (table_type, indicators) in TableType::LEXICON {
            if indicators.iter().any(|i| header_text.contains(i)) {
                return table_type;
            }
        }
        let content: String = rows
            .iter()
            .flat_map(|r| &r.cells)
            .map(|c| c.text.to_lowercase())
            .collect::<Vec<_>>()
            .join(" ");
        for (table_type, indicators) in TableType::LEXICON {
            if indicators.iter().any(|i| content.contains(i)) {
                return table_type;
            }
        }
        TableType::Data
    }
}

fn split_row(line: &str) -> Vec<String> {
    line.trim()
        .trim_start_matches('|')
        .trim_end_matches('|')
        .split('|')
        .map(|c| c.trim().to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &str = "\
Table 6.1: Maximum current ratings for copper conductors

| Conductor Size | Current Rating | Application |
|----------------|----------------|-------------|
| 1.5 mm²        | 15 A           | Lighting    |
| 2.5 mm²        | 20 A           | Sockets     |
| 4 mm²          | 27 A           | Appliances  |
";

    #[test]
    fn test_parse_basic() {
        let parser = TableParser::new();
        let table = parser.parse(TABLE).unwrap();
        assert_eq!(table.caption, "Table 6.1: Maximum current ratings for copper conductors");
        assert_eq!(table.headers.len(), 3);
        assert_eq!(table.rows.len(), 3);
        assert_eq!(table.rows[0].row_header, "1.5 mm²");
    }

    #[test]
    fn test_cell_typing() {
        let parser = TableParser::new();
        let table = parser.parse(TABLE).unwrap();
        let first_row = &table.rows[0];
        assert_eq!(
            first_row.cells[0].value,
            CellValue::UnitValue {
                value: 1.5,
                unit: "mm²".to_string()
            }
        );
        assert_eq!(
            first_row.cells[1].value,
            CellValue::UnitValue {
                value: 15.0,
                unit: "A".to_string()
            }
        );
        assert_eq!(first_row.cells[2].value, CellValue::Text);
    }

    #[test]
    fn test_range_cell() {
        let parser = TableParser::new();
        assert_eq!(
            parser.type_cell("10-20 A"),
            CellValue::Range {
                low: 10.0,
                high: 20.0,
                unit: Some("A".to_string())
            }
        );
        assert_eq!(
            parser.type_cell("5 to 9"),
            CellValue::Range {
                low: 5.0,
                high: 9.0,
                unit: None
            }
        );
    }

    #[test]
    fn test_plain_number_cell() {
        let parser = TableParser::new();
        assert_eq!(parser.type_cell("42"), CellValue::Number { value: 42.0 });
        assert_eq!(parser.type_cell("-3.5"), CellValue::Number { value: -3.5 });
    }

    #[test]
    fn test_type_detection() {
        let parser = TableParser::new();
        let table = parser.parse(TABLE).unwrap();
        // "Current Rating" header hits the specification lexicon
        assert_eq!(table.table_type, TableType::Specification);
    }

    #[test]
    fn test_type_from_content() {
        let parser = TableParser::new();
        let text = "| A | B |\n|---|---|\n| mandatory | x |\n";
        let table = parser.parse(text).unwrap();
        assert_eq!(table.table_type, TableType::Requirement);
    }

    #[test]
    fn test_json_roundtrip() {
        let parser = TableParser::new();
        let table = parser.parse(TABLE).unwrap();
        let json = table.to_json();
        let back = ParsedTable::from_json(&json).unwrap();
        assert_eq!(back, table);
    }

    #[test]
    fn test_natural_language() {
        let parser = TableParser::new();
        let table = parser.parse(TABLE).unwrap();
        let nl = table.to_natural_language();
        assert!(nl.contains("For 1.5 mm²:"));
        assert!(nl.contains("Current Rating: 15 A"));
    }

    #[test]
    fn test_summary_ranges() {
        let parser = TableParser::new();
        let table = parser.parse(TABLE).unwrap();
        let summary = table.summary();
        assert!(summary.contains("3 columns and 3 rows"));
        assert!(summary.contains("Conductor Size: 1.5-4"));
        assert!(summary.contains("Current Rating: 15-27"));
    }

    #[test]
    fn test_has_table() {
        let parser = TableParser::new();
        assert!(parser.has_table(TABLE));
        assert!(!parser.has_table("no table here"));
    }

    #[test]
    fn test_header_only_rejected() {
        let parser = TableParser::new();
        assert!(parser.parse("| A | B |\n|---|---|\n").is_none());
    }

    #[test]
    fn test_ragged_rows_padded() {
        let parser = TableParser::new();
        let text = "| A | B | C |\n|---|---|---|\n| 1 | 2 |\n";
        let table = parser.parse(text).unwrap();
        assert_eq!(table.rows[0].cells.len(), 3);
        assert_eq!(table.rows[0].cells[2].text, "");
    }

    #[test]
    fn test_multiple_tables() {
        let parser = TableParser::new();
        let text = format!("{TABLE}\nprose between\n\n| X | Y |\n|---|---|\n| 1 | 2 |\n");
        let tables = parser.extract_tables(&text);
        assert_eq!(tables.len(), 2);
        assert!(tables[1].caption.is_empty());
    }

    #[test]
    fn test_empty_input() {
        let parser = TableParser::new();
        assert!(parser.extract_tables("").is_empty());
    }
}
