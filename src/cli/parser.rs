//! Command-line argument parsing.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// specrag: retrieval and knowledge-graph engine for technical standards
/// documents.
#[derive(Parser, Debug)]
#[command(name = "specrag")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output format (text, json).
    #[arg(long, default_value = "text", global = true)]
    pub format: String,

    /// Override the vector collection name.
    #[arg(long, env = "COLLECTION_NAME", global = true)]
    pub collection: Option<String>,

    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Ingest documents into the vector store and knowledge graph.
    Ingest {
        /// Files to ingest (.pdf, .txt, .md).
        paths: Vec<PathBuf>,

        /// Category applied to all files.
        #[arg(short, long)]
        category: Option<String>,

        /// Project applied to all files.
        #[arg(short, long)]
        project: Option<String>,
    },

    /// Ask a question against the indexed corpus.
    Query {
        /// The question.
        text: String,

        /// Restrict retrieval to one document.
        #[arg(short, long)]
        document: Option<String>,

        /// Skip knowledge-graph expansion.
        #[arg(long)]
        no_graph: bool,

        /// Number of chunks to retrieve.
        #[arg(short = 'k', long, default_value = "10")]
        top_k: usize,
    },

    /// Dense retrieval without answer generation.
    Search {
        /// The search text.
        text: String,

        /// Number of results.
        #[arg(short = 'k', long, default_value = "10")]
        top_k: usize,

        /// Restrict to one document.
        #[arg(short, long)]
        document: Option<String>,
    },

    /// Show collection, graph, cache and feedback statistics.
    Stats,

    /// Record feedback on an answer.
    Feedback {
        /// The query that was answered.
        query: String,

        /// The answer being rated.
        answer: String,

        /// Positive feedback (default is negative).
        #[arg(long)]
        positive: bool,

        /// Overall rating 1..5.
        #[arg(short, long)]
        rating: Option<u8>,

        /// Free-form comment.
        #[arg(short, long)]
        comment: Option<String>,

        /// Source documents the answer cited.
        #[arg(short, long)]
        sources: Vec<String>,
    },

    /// Mine positive feedback into learned graph relationships.
    Learn {
        /// Only consider feedback from the last N days.
        #[arg(short, long)]
        window_days: Option<u32>,
    },

    /// Cross-reference a source document against references.
    Analyze {
        /// Source document name.
        source: String,

        /// Reference document names.
        #[arg(required = true)]
        references: Vec<String>,

        /// Analysis mode (compliance, gaps, values, standards, full).
        #[arg(short, long, default_value = "full")]
        mode: String,

        /// Focus-area keywords (e.g. "cable sizing").
        #[arg(short, long)]
        focus: Option<String>,

        /// Section-number prefix filter.
        #[arg(long)]
        section: Option<String>,
    },

    /// Rebuild the knowledge graph from stored vectors.
    RebuildGraph,

    /// Delete a document and everything it owns.
    #[command(name = "delete")]
    DeleteDocument {
        /// Document name.
        name: String,
    },

    /// Remove expired semantic-cache entries.
    CleanupCache,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_structure_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_query() {
        let cli = Cli::parse_from(["specrag", "query", "cable size?", "-k", "5"]);
        match cli.command {
            Commands::Query { text, top_k, .. } => {
                assert_eq!(text, "cable size?");
                assert_eq!(top_k, 5);
            }
            _ => panic!("expected query command"),
        }
    }

    #[test]
    fn test_parse_analyze() {
        let cli = Cli::parse_from([
            "specrag", "analyze", "MySpec", "IS3218", "BS7671", "--mode", "gaps",
        ]);
        match cli.command {
            Commands::Analyze {
                source,
                references,
                mode,
                ..
            } => {
                assert_eq!(source, "MySpec");
                assert_eq!(references, vec!["IS3218", "BS7671"]);
                assert_eq!(mode, "gaps");
            }
            _ => panic!("expected analyze command"),
        }
    }

    #[test]
    fn test_parse_format_flag() {
        let cli = Cli::parse_from(["specrag", "--format", "json", "stats"]);
        assert_eq!(cli.format, "json");
    }
}
