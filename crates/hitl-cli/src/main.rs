//! HITL CLI - Command-line interface
//!
//! Usage:
//!   hitl ingest <path>
//!   hitl documents
//!   hitl validate <document-id> <corrected.json> --time-taken <secs>
//!   hitl history <document-id>
//!   hitl retrain
//!   hitl predict <skills>

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use hitl_core::{
    AppConfig, CorrectionRepository, ExtractedRecord, HitlError, LoggingConfig, SqliteStore,
};
use hitl_extractor::{ExtractionService, RolePredictor};
use hitl_trainer::{TrainingPipeline, TrainingStatus};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "hitl")]
#[command(about = "Human-in-the-loop CV review")]
#[command(version)]
struct Cli {
    /// TOML configuration file (environment variables still override it)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract fields from a CV and store it for review
    Ingest {
        /// Path to the document (PDF or text)
        path: PathBuf,
    },
    /// List stored documents, newest first
    Documents,
    /// Record a human correction for a document
    Validate {
        /// Document id
        document_id: i64,
        /// JSON file holding the corrected record
        corrected: PathBuf,
        /// Seconds the reviewer spent on the correction
        #[arg(long)]
        time_taken: i64,
    },
    /// Show the corrections recorded for a document
    History {
        /// Document id
        document_id: i64,
    },
    /// Retrain the role classifier on all corrections
    Retrain,
    /// Predict a role from a skills string
    Predict {
        /// Comma separated skills
        skills: String,
    },
}

#[derive(Serialize)]
struct Ingested<'a> {
    id: i64,
    filename: &'a str,
    extraction: &'a ExtractedRecord,
}

fn load_config(path: Option<&Path>) -> anyhow::Result<AppConfig> {
    let config = match path {
        Some(path) => AppConfig::from_file(path)?.with_env_override()?,
        None => AppConfig::from_env()?,
    };
    config.validate()?;
    Ok(config)
}

fn init_tracing(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_file(config.include_location)
        .with_line_number(config.include_location);

    if config.json_format {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref()).context("failed to load configuration")?;
    init_tracing(&config.logging);

    match cli.command {
        Commands::Ingest { path } => {
            let service = ExtractionService::new(&config.model);
            let extraction = service.extract_file(&path);

            let filename = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());

            let store = SqliteStore::connect(&config.storage).await?;
            let id = store.insert_document(&filename, &extraction).await?;
            info!(id, filename = %filename, role = %extraction.predicted_role, "Ingested document");

            print_json(&Ingested {
                id,
                filename: &filename,
                extraction: &extraction,
            })?;
        }
        Commands::Documents => {
            let store = SqliteStore::connect(&config.storage).await?;
            print_json(&store.list_documents().await?)?;
        }
        Commands::Validate {
            document_id,
            corrected,
            time_taken,
        } => {
            let json = std::fs::read_to_string(&corrected)
                .with_context(|| format!("failed to read {}", corrected.display()))?;
            let record = ExtractedRecord::from_json_str(&json)
                .with_context(|| format!("invalid record in {}", corrected.display()))?;

            let store = SqliteStore::connect(&config.storage).await?;
            if store.get_document(document_id).await?.is_none() {
                return Err(HitlError::NotFound(document_id.to_string()).into());
            }
            let id = store
                .record_correction(document_id, &record, time_taken)
                .await?;
            info!(correction_id = id, document_id, "Recorded correction");

            print_json(&serde_json::json!({
                "status": "validated",
                "document_id": document_id,
                "correction_id": id,
            }))?;
        }
        Commands::History { document_id } => {
            let store = SqliteStore::connect(&config.storage).await?;
            print_json(&store.document_corrections(document_id).await?)?;
        }
        Commands::Retrain => {
            let report = TrainingPipeline::new(&config)
                .run_with_storage(&config.storage)
                .await;
            print_json(&report)?;
            if report.status == TrainingStatus::Error {
                std::process::exit(1);
            }
        }
        Commands::Predict { skills } => {
            let predictor = RolePredictor::from_config(&config.model);
            print_json(&serde_json::json!({
                "skills": skills,
                "predicted_role": predictor.predict_or_unknown(&skills),
            }))?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_validate() {
        let cli = Cli::parse_from([
            "hitl",
            "--config",
            "hitl.toml",
            "validate",
            "7",
            "fixed.json",
            "--time-taken",
            "42",
        ]);
        assert_eq!(cli.config, Some(PathBuf::from("hitl.toml")));
        match cli.command {
            Commands::Validate {
                document_id,
                corrected,
                time_taken,
            } => {
                assert_eq!(document_id, 7);
                assert_eq!(corrected, PathBuf::from("fixed.json"));
                assert_eq!(time_taken, 42);
            }
            _ => panic!("expected validate"),
        }
    }

    #[test]
    fn test_load_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hitl.toml");
        std::fs::write(&path, "[model]\nn_estimators = 12\n").unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.model.n_estimators, 12);
    }
}
