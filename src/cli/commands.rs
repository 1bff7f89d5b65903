//! Command execution against the engine.

use crate::cli::output::{format_value, OutputFormat};
use crate::cli::parser::{Cli, Commands};
use crate::config::Settings;
use crate::crossref::analyzer::AnalysisRequest;
use crate::crossref::AnalysisMode;
use crate::engine::Engine;
use crate::error::{CommandError, Result};
use crate::feedback::{FeedbackRecord, FeedbackType, SourceFeedback};
use crate::ingest::IngestOptions;
use crate::query::QueryOptions;
use crate::vector::Filter;
use std::path::PathBuf;

/// Executes the parsed CLI command, returning the rendered output.
pub fn execute(cli: &Cli) -> Result<String> {
    let mut settings = Settings::load()?;
    if let Some(collection) = &cli.collection {
        settings.collection_name.clone_from(collection);
    }
    let format = OutputFormat::parse(&cli.format);
    let mut engine = Engine::open(settings)?;

    match &cli.command {
        Commands::Ingest {
            paths,
            category,
            project,
        } => ingest(&mut engine, paths, category.as_deref(), project.as_deref(), format),

        Commands::Query {
            text,
            document,
            no_graph,
            top_k,
        } => {
            let options = QueryOptions {
                filter: document.clone().map(Filter::DocumentEq),
                top_k: Some(*top_k),
                use_graph: !no_graph,
            };
            let response = engine.query(text, &options)?;
            match format {
                OutputFormat::Json => Ok(format_value(&response, format)),
                OutputFormat::Text => {
                    let mut out = response.answer.clone();
                    if !response.sources.is_empty() {
                        out.push_str("\n\nSources:\n");
                        for source in &response.sources {
                            out.push_str(&format!(
                                "- {} (section {}, page {})\n",
                                source.document, source.section_number, source.page
                            ));
                        }
                    }
                    Ok(out)
                }
            }
        }

        Commands::Search {
            text,
            top_k,
            document,
        } => {
            let filter = document.clone().map(Filter::DocumentEq);
            let sources = engine.search(text, *top_k, filter.as_ref())?;
            Ok(format_value(&sources, format))
        }

        Commands::Stats => {
            let stats = engine.stats()?;
            Ok(format_value(&stats, format))
        }

        Commands::Feedback {
            query,
            answer,
            positive,
            rating,
            comment,
            sources,
        } => {
            let record = FeedbackRecord {
                query: query.clone(),
                answer: answer.clone(),
                feedback_type: if *positive {
                    FeedbackType::Positive
                } else {
                    FeedbackType::Negative
                },
                overall_rating: *rating,
                relevance: None,
                clarity: None,
                completeness: None,
                comment: comment.clone(),
                sources: sources
                    .iter()
                    .map(|document| SourceFeedback {
                        document: document.clone(),
                        page: 0,
                        chunk_prefix: String::new(),
                        rating: None,
                        stars: None,
                    })
                    .collect(),
                highlights: Vec::new(),
            };
            let id = engine.submit_feedback(&record, None)?;
            Ok(format!("feedback recorded (id {id})\n"))
        }

        Commands::Learn { window_days } => {
            let stats = engine.learn(*window_days)?;
            Ok(format_value(&stats, format))
        }

        Commands::Analyze {
            source,
            references,
            mode,
            focus,
            section,
        } => {
            let mode = AnalysisMode::parse(mode).ok_or_else(|| {
                CommandError::InvalidArgument(format!(
                    "unknown mode '{mode}' (expected compliance, gaps, values, standards or full)"
                ))
            })?;
            let report = engine.analyze_cross_reference(&AnalysisRequest {
                source: source.clone(),
                references: references.clone(),
                mode,
                focus: focus.clone(),
                section_prefix: section.clone(),
            })?;
            match format {
                OutputFormat::Json => Ok(format_value(&report, format)),
                OutputFormat::Text => Ok(format!("{}\n", report.summary)),
            }
        }

        Commands::RebuildGraph => {
            let stats = engine.rebuild_graph()?;
            Ok(format_value(&stats, format))
        }

        Commands::DeleteDocument { name } => {
            let removed = engine.delete_document(name)?;
            Ok(format!("deleted {removed} chunks of '{name}'\n"))
        }

        Commands::CleanupCache => {
            let removed = engine.cleanup_cache()?;
            Ok(format!("removed {removed} expired cache entries\n"))
        }
    }
}

fn ingest(
    engine: &mut Engine,
    paths: &[PathBuf],
    category: Option<&str>,
    project: Option<&str>,
    format: OutputFormat,
) -> Result<String> {
    if paths.is_empty() {
        return Err(CommandError::MissingArgument("paths".to_string()).into());
    }
    let options = IngestOptions {
        categories: category.map(|c| vec![c.to_string()]).unwrap_or_default(),
        project: project.map(String::from),
        ..IngestOptions::default()
    };
    let path_refs: Vec<&std::path::Path> = paths.iter().map(PathBuf::as_path).collect();
    let report = engine.ingest(&path_refs, &options)?;

    if report.indexed() == 0 && report.failed() > 0 {
        // Nothing made it in: surface the failure for the exit code
        let first_error = report
            .files
            .iter()
            .find_map(|f| f.error.clone())
            .unwrap_or_else(|| "ingestion failed".to_string());
        return Err(crate::error::StoreError::Database(first_error).into());
    }
    Ok(format_value(&report, format))
}
