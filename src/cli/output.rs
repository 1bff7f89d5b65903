//! Output formatting for the CLI.

use crate::error::Error;

/// Output format for command results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable text.
    Text,
    /// Machine-readable JSON.
    Json,
}

impl OutputFormat {
    /// Parses a format name, defaulting to text.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => Self::Json,
            _ => Self::Text,
        }
    }
}

/// Serialises a value for the chosen format.
pub fn format_value<T: serde::Serialize>(value: &T, format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => serde_json::to_string_pretty(value).unwrap_or_default(),
        OutputFormat::Text => serde_json::to_string_pretty(value).unwrap_or_default(),
    }
}

/// Formats an error for the chosen format.
///
/// JSON errors carry the structured `{error_kind, message, retryable}`
/// triple the boundary contract specifies.
#[must_use]
pub fn format_error(error: &Error, format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => serde_json::json!({
            "error_kind": error.kind(),
            "message": error.to_string(),
            "retryable": error.retryable(),
        })
        .to_string(),
        OutputFormat::Text => error.to_string(),
    }
}
