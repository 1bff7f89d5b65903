//! Structural parsing of document text: sections and tables.

pub mod sections;
pub mod tables;

pub use sections::{Section, SectionParser, TocEntry};
pub use tables::{CellValue, ParsedTable, TableCell, TableParser, TableRow, TableType};
