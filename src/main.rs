//! Binary entry point for specrag.

#![allow(clippy::print_stdout, clippy::print_stderr)]

use clap::Parser;
use specrag::cli::output::format_error;
use specrag::cli::{execute, Cli, Commands, OutputFormat};
use std::io::{self, Write};
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();
    let format = OutputFormat::parse(&cli.format);
    init_tracing();

    match execute(&cli) {
        Ok(output) => {
            if !output.is_empty() {
                // Tolerate broken pipes (e.g. piped into `head` or `jq`)
                if let Err(e) = write!(io::stdout(), "{output}") {
                    if e.kind() != io::ErrorKind::BrokenPipe {
                        eprintln!("error writing to stdout: {e}");
                        return ExitCode::FAILURE;
                    }
                }
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            let rendered = format_error(&e, format);
            match format {
                OutputFormat::Json => println!("{rendered}"),
                OutputFormat::Text => eprintln!("Error: {rendered}"),
            }
            exit_code_for(&e, &cli.command)
        }
    }
}

/// Maps failures onto the boundary exit codes: 1 usage error,
/// 2 ingestion failure, 3 query failure, 4 configuration missing.
fn exit_code_for(error: &specrag::Error, command: &Commands) -> ExitCode {
    match error.kind() {
        "config" => ExitCode::from(4),
        "command" => ExitCode::from(1),
        _ => match command {
            Commands::Ingest { .. } => ExitCode::from(2),
            Commands::Query { .. } | Commands::Search { .. } => ExitCode::from(3),
            _ => ExitCode::FAILURE,
        },
    }
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let level = std::env::var("LOG_LEVEL")
        .map(|l| l.to_lowercase())
        .map(|l| match l.as_str() {
            "warning" => "warn".to_string(),
            other => other.to_string(),
        })
        .unwrap_or_else(|_| "info".to_string());
    let filter = EnvFilter::try_new(&level).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}
