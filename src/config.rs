//! Typed configuration loaded from the environment.
//!
//! Settings come from process environment variables with an optional
//! `.env` file (via `dotenvy`). Paths for the vector collection, graph
//! database, semantic cache and feedback store are resolved relative to
//! the data directory unless overridden.

use crate::error::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Default vector collection name.
pub const DEFAULT_COLLECTION: &str = "engineering_standards";

/// Application settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Embedding model identifier.
    pub embedding_model: String,
    /// LLM model identifier.
    pub llm_model: String,
    /// LLM sampling temperature.
    pub llm_temperature: f32,
    /// Optional OpenAI-compatible base URL for the LLM.
    pub llm_base_url: Option<String>,

    /// OpenAI API key (embeddings).
    pub openai_api_key: Option<String>,
    /// DeepSeek API key (completions).
    pub deepseek_api_key: Option<String>,
    /// Llama Cloud API key (PDF parsing service, unused locally).
    pub llama_cloud_api_key: Option<String>,

    /// Vector collection name.
    pub collection_name: String,
    /// Remote vector store URL, if any.
    pub vector_store_url: Option<String>,
    /// Remote vector store API key.
    pub vector_store_api_key: Option<String>,
    /// Local vector store path.
    pub vector_store_path: PathBuf,

    /// Graph database path (local SQLite graph).
    pub graph_db_path: PathBuf,
    /// Remote graph server URI, when one is used instead of the local store.
    pub graph_uri: Option<String>,
    /// Remote graph username.
    pub graph_username: Option<String>,
    /// Remote graph password.
    pub graph_password: Option<String>,
    /// Remote graph database name.
    pub graph_database: Option<String>,

    /// Root directory for ingest sources.
    pub data_dir: PathBuf,
    /// Semantic cache database path.
    pub cache_db_path: PathBuf,
    /// Feedback database path.
    pub feedback_db_path: PathBuf,
    /// Query history database path.
    pub history_db_path: PathBuf,

    /// Log level (DEBUG|INFO|WARNING|ERROR).
    pub log_level: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            embedding_model: "text-embedding-3-small".to_string(),
            llm_model: "deepseek-chat".to_string(),
            llm_temperature: 0.1,
            llm_base_url: None,
            openai_api_key: None,
            deepseek_api_key: None,
            llama_cloud_api_key: None,
            collection_name: DEFAULT_COLLECTION.to_string(),
            vector_store_url: None,
            vector_store_api_key: None,
            vector_store_path: PathBuf::from("./vector_db/vectors.db"),
            graph_db_path: PathBuf::from("./graph_db/graph.db"),
            graph_uri: None,
            graph_username: None,
            graph_password: None,
            graph_database: None,
            data_dir: PathBuf::from("./data"),
            cache_db_path: PathBuf::from("./cache_db/semantic_cache.db"),
            feedback_db_path: PathBuf::from("./feedback_db/feedback.db"),
            history_db_path: PathBuf::from("./history_db/history.db"),
            log_level: "INFO".to_string(),
        }
    }
}

fn env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

impl Settings {
    /// Loads settings from the environment, reading `.env` first if present.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if a numeric setting fails to parse or the
    /// log level is unrecognised.
    pub fn load() -> Result<Self> {
        // Missing .env is fine; a malformed one is not.
        match dotenvy::dotenv() {
            Ok(_) | Err(dotenvy::Error::Io(_)) => {}
            Err(e) => {
                return Err(ConfigError::Invalid {
                    key: ".env".to_string(),
                    value: String::new(),
                    reason: e.to_string(),
                }
                .into());
            }
        }
        Self::from_env()
    }

    /// Builds settings from the current process environment only.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let llm_temperature = match env("LLM_TEMPERATURE") {
            Some(raw) => raw.parse::<f32>().map_err(|e| ConfigError::Invalid {
                key: "LLM_TEMPERATURE".to_string(),
                value: raw.clone(),
                reason: e.to_string(),
            })?,
            None => defaults.llm_temperature,
        };

        let log_level = env("LOG_LEVEL").unwrap_or(defaults.log_level);
        if !matches!(
            log_level.to_ascii_uppercase().as_str(),
            "DEBUG" | "INFO" | "WARNING" | "ERROR"
        ) {
            return Err(ConfigError::Invalid {
                key: "LOG_LEVEL".to_string(),
                value: log_level,
                reason: "expected DEBUG, INFO, WARNING or ERROR".to_string(),
            }
            .into());
        }

        Ok(Self {
            embedding_model: env("EMBEDDING_MODEL").unwrap_or(defaults.embedding_model),
            llm_model: env("LLM_MODEL").unwrap_or(defaults.llm_model),
            llm_temperature,
            llm_base_url: env("LLM_BASE_URL"),
            openai_api_key: env("OPENAI_API_KEY"),
            deepseek_api_key: env("DEEPSEEK_API_KEY"),
            llama_cloud_api_key: env("LLAMA_CLOUD_API_KEY"),
            collection_name: env("COLLECTION_NAME").unwrap_or(defaults.collection_name),
            vector_store_url: env("VECTOR_STORE_URL"),
            vector_store_api_key: env("VECTOR_STORE_API_KEY"),
            vector_store_path: env("VECTOR_STORE_PATH")
                .map_or(defaults.vector_store_path, PathBuf::from),
            graph_db_path: env("GRAPH_DB_PATH").map_or(defaults.graph_db_path, PathBuf::from),
            graph_uri: env("GRAPH_URI"),
            graph_username: env("GRAPH_USERNAME"),
            graph_password: env("GRAPH_PASSWORD"),
            graph_database: env("GRAPH_DATABASE"),
            data_dir: env("DATA_DIR").map_or(defaults.data_dir, PathBuf::from),
            cache_db_path: env("CACHE_DB_PATH").map_or(defaults.cache_db_path, PathBuf::from),
            feedback_db_path: env("FEEDBACK_DB_PATH")
                .map_or(defaults.feedback_db_path, PathBuf::from),
            history_db_path: env("HISTORY_DB_PATH")
                .map_or(defaults.history_db_path, PathBuf::from),
            log_level,
        })
    }

    /// Requires the OpenAI key, with a remediation hint when absent.
    pub fn require_openai_key(&self) -> Result<&str> {
        self.openai_api_key.as_deref().ok_or_else(|| {
            ConfigError::Missing {
                key: "OPENAI_API_KEY".to_string(),
            }
            .into()
        })
    }

    /// Ensures parent directories for all configured store paths exist.
    pub fn ensure_directories(&self) -> Result<()> {
        let parents = [
            Some(self.data_dir.as_path()),
            self.vector_store_path.parent(),
            self.graph_db_path.parent(),
            self.cache_db_path.parent(),
            self.feedback_db_path.parent(),
            self.history_db_path.parent(),
        ];
        for dir in parents.into_iter().flatten() {
            if !dir.as_os_str().is_empty() && !dir.exists() {
                std::fs::create_dir_all(dir).map_err(|e| ConfigError::Directory {
                    path: dir.display().to_string(),
                    reason: e.to_string(),
                })?;
            }
        }
        Ok(())
    }

    /// Path of the per-file category/project mapping JSON.
    #[must_use]
    pub fn category_mapping_path(&self) -> PathBuf {
        self.data_dir.join("document_categories.json")
    }

    /// Path of the application-level settings JSON.
    #[must_use]
    pub fn app_settings_path(&self) -> PathBuf {
        self.data_dir.join("app_settings.json")
    }
}

/// Application-level lists the metadata editor offers: known categories
/// and projects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppSettings {
    /// Known document categories.
    pub categories: Vec<String>,
    /// Known projects.
    pub projects: Vec<String>,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            categories: [
                "Standard",
                "Employee Requirements",
                "Internal Document",
                "Government",
                "Technical Guidance",
            ]
            .iter()
            .map(|s| (*s).to_string())
            .collect(),
            projects: Vec::new(),
        }
    }
}

/// Loads app settings, merging with the defaults on missing fields.
pub fn load_app_settings(path: &Path) -> Result<AppSettings> {
    if !path.exists() {
        return Ok(AppSettings::default());
    }
    let raw = std::fs::read_to_string(path)?;
    let value: serde_json::Value = serde_json::from_str(&raw)?;
    let defaults = AppSettings::default();
    let categories = value
        .get("categories")
        .and_then(|v| serde_json::from_value(v.clone()).ok())
        .filter(|c: &Vec<String>| !c.is_empty())
        .unwrap_or(defaults.categories);
    let projects = value
        .get("projects")
        .and_then(|v| serde_json::from_value(v.clone()).ok())
        .unwrap_or(defaults.projects);
    Ok(AppSettings {
        categories,
        projects,
    })
}

/// Persists app settings as pretty JSON.
pub fn save_app_settings(path: &Path, settings: &AppSettings) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, serde_json::to_string_pretty(settings)?)?;
    Ok(())
}

/// Per-file document metadata stored alongside the ingest sources.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentMapping {
    /// Document category (e.g. "Standard", "Internal Document").
    #[serde(default)]
    pub category: Option<String>,
    /// Project the document belongs to.
    #[serde(default)]
    pub project: Option<String>,
    /// Standard number printed on the document, if any.
    #[serde(default)]
    pub standard_no: Option<String>,
    /// Publication date.
    #[serde(default)]
    pub date: Option<String>,
    /// Free-form description.
    #[serde(default)]
    pub description: Option<String>,
}

/// Loads the `{file_name: mapping}` JSON. Missing file yields an empty map.
///
/// Entries stored as plain strings (an older format) are upgraded to a
/// mapping with only the category set.
pub fn load_document_mappings(path: &Path) -> Result<BTreeMap<String, DocumentMapping>> {
    if !path.exists() {
        return Ok(BTreeMap::new());
    }
    let raw = std::fs::read_to_string(path)?;
    let value: serde_json::Value = serde_json::from_str(&raw)?;
    let mut mappings = BTreeMap::new();
    if let serde_json::Value::Object(entries) = value {
        for (file, entry) in entries {
            let mapping = match entry {
                serde_json::Value::String(category) => DocumentMapping {
                    category: Some(category),
                    ..DocumentMapping::default()
                },
                other => serde_json::from_value(other).unwrap_or_default(),
            };
            mappings.insert(file, mapping);
        }
    }
    Ok(mappings)
}

/// Persists the category/project mapping as pretty JSON.
pub fn save_document_mappings(
    path: &Path,
    mappings: &BTreeMap<String, DocumentMapping>,
) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let json = serde_json::to_string_pretty(mappings)?;
    std::fs::write(path, json)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.collection_name, DEFAULT_COLLECTION);
        assert_eq!(settings.llm_model, "deepseek-chat");
        assert!((settings.llm_temperature - 0.1).abs() < f32::EPSILON);
        assert_eq!(settings.log_level, "INFO");
    }

    #[test]
    fn test_require_openai_key_missing() {
        let settings = Settings::default();
        let err = settings.require_openai_key().unwrap_err();
        assert_eq!(err.kind(), "config");
    }

    #[test]
    fn test_require_openai_key_present() {
        let settings = Settings {
            openai_api_key: Some("sk-test".to_string()),
            ..Settings::default()
        };
        assert_eq!(settings.require_openai_key().unwrap(), "sk-test");
    }

    #[test]
    fn test_category_mapping_path() {
        let settings = Settings {
            data_dir: PathBuf::from("/tmp/specrag-data"),
            ..Settings::default()
        };
        assert_eq!(
            settings.category_mapping_path(),
            PathBuf::from("/tmp/specrag-data/document_categories.json")
        );
    }

    #[test]
    fn test_mapping_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("document_categories.json");

        let mut mappings = BTreeMap::new();
        mappings.insert(
            "IS3218.pdf".to_string(),
            DocumentMapping {
                category: Some("Standard".to_string()),
                project: Some("Fire Alarm".to_string()),
                standard_no: Some("IS 3218:2024".to_string()),
                date: None,
                description: Some("Fire detection and alarm systems".to_string()),
            },
        );
        save_document_mappings(&path, &mappings).unwrap();

        let loaded = load_document_mappings(&path).unwrap();
        assert_eq!(loaded, mappings);
    }

    #[test]
    fn test_mapping_legacy_string_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("document_categories.json");
        std::fs::write(&path, r#"{"old.pdf": "Government"}"#).unwrap();

        let loaded = load_document_mappings(&path).unwrap();
        assert_eq!(
            loaded.get("old.pdf").unwrap().category.as_deref(),
            Some("Government")
        );
        assert!(loaded.get("old.pdf").unwrap().project.is_none());
    }

    #[test]
    fn test_mapping_missing_file() {
        let loaded =
            load_document_mappings(Path::new("/nonexistent/document_categories.json")).unwrap();
        assert!(loaded.is_empty());
    }

    #[test]
    fn test_app_settings_defaults() {
        let settings = load_app_settings(Path::new("/nonexistent/app_settings.json")).unwrap();
        assert!(settings.categories.contains(&"Standard".to_string()));
        assert!(settings.projects.is_empty());
    }

    #[test]
    fn test_app_settings_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app_settings.json");
        let settings = AppSettings {
            categories: vec!["Standard".to_string()],
            projects: vec!["Metro".to_string()],
        };
        save_app_settings(&path, &settings).unwrap();
        assert_eq!(load_app_settings(&path).unwrap(), settings);
    }

    #[test]
    fn test_app_settings_partial_file_merges_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app_settings.json");
        std::fs::write(&path, r#"{"projects": ["Harbour"]}"#).unwrap();
        let settings = load_app_settings(&path).unwrap();
        assert_eq!(settings.projects, vec!["Harbour".to_string()]);
        // Categories fall back to the defaults
        assert!(settings.categories.contains(&"Government".to_string()));
    }
}
