//! Error types for specrag operations.
//!
//! Provides the error hierarchy using `thiserror` for configuration,
//! parsing, storage, provider and consistency failures. Entity extraction
//! is total and never produces an error.

use thiserror::Error;

/// Result type alias for specrag operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error for specrag operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Missing or invalid settings. Fatal at startup.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Unreadable file or unparseable structure. Recoverable per file.
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// Vector/graph/SQL store failure.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Embedding or LLM provider failure after retries.
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Cross-store invariant violation. The operation is refused.
    #[error("consistency error: {0}")]
    Consistency(#[from] ConsistencyError),

    /// CLI command errors.
    #[error("command error: {0}")]
    Command(#[from] CommandError),
}

impl Error {
    /// Whether retrying the same operation may succeed.
    #[must_use]
    pub const fn retryable(&self) -> bool {
        matches!(self, Self::Store(_) | Self::Provider(_))
    }

    /// Stable machine-readable kind for structured error output.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::Parse(_) => "parse",
            Self::Store(_) => "store",
            Self::Provider(_) => "provider",
            Self::Consistency(_) => "consistency",
            Self::Command(_) => "command",
        }
    }
}

/// Configuration errors surfaced at startup.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A required setting is absent.
    #[error("missing setting {key}: set {key} in the environment or .env file")]
    Missing {
        /// Name of the missing setting.
        key: String,
    },

    /// A setting has an unusable value.
    #[error("invalid setting {key}={value}: {reason}")]
    Invalid {
        /// Name of the setting.
        key: String,
        /// The rejected value.
        value: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// A required directory could not be created.
    #[error("failed to create directory {path}: {reason}")]
    Directory {
        /// The directory path.
        path: String,
        /// Underlying failure.
        reason: String,
    },
}

/// Parse errors for document ingestion.
#[derive(Error, Debug)]
pub enum ParseError {
    /// File not found on disk.
    #[error("file not found: {path}")]
    FileNotFound {
        /// Path that was not found.
        path: String,
    },

    /// File could not be read.
    #[error("failed to read {path}: {reason}")]
    ReadFailed {
        /// Path to the file.
        path: String,
        /// Reason for failure.
        reason: String,
    },

    /// PDF text extraction failed.
    #[error("PDF extraction failed for {path}: {reason}")]
    PdfFailed {
        /// Path to the PDF.
        path: String,
        /// Reason for failure.
        reason: String,
    },

    /// Unsupported file extension.
    #[error("unsupported file type: {path} (expected .pdf, .txt or .md)")]
    UnsupportedType {
        /// Offending path.
        path: String,
    },
}

/// Store errors for the vector, graph, cache and feedback databases.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Database connection or query error.
    #[error("database error: {0}")]
    Database(String),

    /// Schema migration error.
    #[error("migration error: {0}")]
    Migration(String),

    /// Serialization of a stored payload failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Collection has not been created yet.
    #[error("collection not found: {name}")]
    CollectionNotFound {
        /// Collection name.
        name: String,
    },

    /// Document not present in the store.
    #[error("document not found: {name}")]
    DocumentNotFound {
        /// Document name.
        name: String,
    },
}

/// Provider errors for embedding and completion calls.
#[derive(Error, Debug)]
pub enum ProviderError {
    /// HTTP transport failure after retries.
    #[error("{provider} request failed after {attempts} attempts: {reason}")]
    RequestFailed {
        /// Provider name (embedding, llm).
        provider: String,
        /// How many attempts were made.
        attempts: u32,
        /// Final failure reason.
        reason: String,
    },

    /// Provider returned a malformed response body.
    #[error("{provider} returned an unexpected response: {reason}")]
    BadResponse {
        /// Provider name.
        provider: String,
        /// What was wrong with the body.
        reason: String,
    },

    /// No credentials configured for the provider.
    #[error("{provider} is not configured: {hint}")]
    NotConfigured {
        /// Provider name.
        provider: String,
        /// How to configure it.
        hint: String,
    },
}

/// Consistency errors. Never silently recovered.
#[derive(Error, Debug)]
pub enum ConsistencyError {
    /// An embedding does not match the collection dimension.
    #[error("vector dimension mismatch: point has {got}, collection expects {expected}")]
    DimensionMismatch {
        /// Dimension of the incoming vector.
        got: usize,
        /// Dimension the collection was created with.
        expected: usize,
    },

    /// An edge endpoint does not exist in the graph.
    #[error("graph edge endpoint not found: {label} {key}")]
    EdgeEndpointMissing {
        /// Node label of the missing endpoint.
        label: String,
        /// Node key of the missing endpoint.
        key: String,
    },

    /// A stored pointer refers to a row that no longer exists.
    #[error("dangling reference: {0}")]
    DanglingReference(String),
}

/// CLI command errors.
#[derive(Error, Debug)]
pub enum CommandError {
    /// Invalid argument provided.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Missing required argument.
    #[error("missing required argument: {0}")]
    MissingArgument(String),

    /// Command execution failed.
    #[error("command execution failed: {0}")]
    ExecutionFailed(String),
}

// From conversions for standard library and dependency errors.

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Store(StoreError::Database(err.to_string()))
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Self::Store(StoreError::Database(err.to_string()))
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Store(StoreError::Serialization(err.to_string()))
    }
}
