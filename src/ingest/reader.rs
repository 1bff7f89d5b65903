//! Document readers for PDF, plain text and Markdown sources.

use crate::error::{ParseError, Result};
use std::path::Path;

/// Text of one page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageText {
    /// 1-based page number; 0 for page-less sources.
    pub page: u32,
    /// Extracted page text.
    pub text: String,
}

/// A raw document before structural parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawDocument {
    /// File name including extension.
    pub file_name: String,
    /// Page texts; page-less sources yield a single page 0 entry.
    pub pages: Vec<PageText>,
}

impl RawDocument {
    /// Concatenated document text with page offsets.
    ///
    /// Returns the full text and, per page, the byte offset where it
    /// starts in that text.
    #[must_use]
    pub fn joined(&self) -> (String, Vec<(u32, usize)>) {
        let mut text = String::new();
        let mut offsets = Vec::with_capacity(self.pages.len());
        for page in &self.pages {
            offsets.push((page.page, text.len()));
            text.push_str(&page.text);
            if !page.text.ends_with('\n') {
                text.push('\n');
            }
        }
        (text, offsets)
    }

    /// Whether the document has no usable text.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pages.iter().all(|p| p.text.trim().is_empty())
    }
}

/// Reads a source file into page texts.
///
/// PDFs are split into pages; `.txt` and `.md` files carry no page
/// numbers and come back as a single page 0.
pub fn read_document(path: &Path) -> Result<RawDocument> {
    if !path.exists() {
        return Err(ParseError::FileNotFound {
            path: path.display().to_string(),
        }
        .into());
    }
    let file_name = path
        .file_name()
        .map_or_else(String::new, |n| n.to_string_lossy().to_string());

    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "pdf" => read_pdf(path, file_name),
        "txt" | "md" | "markdown" => {
            let text = std::fs::read_to_string(path).map_err(|e| ParseError::ReadFailed {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
            Ok(RawDocument {
                file_name,
                pages: vec![PageText { page: 0, text }],
            })
        }
        _ => Err(ParseError::UnsupportedType {
            path: path.display().to_string(),
        }
        .into()),
    }
}

fn read_pdf(path: &Path, file_name: String) -> Result<RawDocument> {
    let data = std::fs::read(path).map_err(|e| ParseError::ReadFailed {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    let text = pdf_extract::extract_text_from_mem(&data).map_err(|e| ParseError::PdfFailed {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;

    // pdf-extract inserts form feeds between pages; fall back to treating
    // the whole document as one page when none are present
    let pages: Vec<PageText> = if text.contains('\x0C') {
        text.split('\x0C')
            .enumerate()
            .map(|(i, page)| PageText {
                #[allow(clippy::cast_possible_truncation)]
                page: (i + 1) as u32,
                text: page.to_string(),
            })
            .collect()
    } else {
        vec![PageText { page: 1, text }]
    };

    Ok(RawDocument { file_name, pages })
}
