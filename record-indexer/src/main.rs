//! Record Indexer Main Entry Point
//!
//! Command-line driver for the indexing pipeline: individual and merged
//! record updates, whole-source deletion, index optimization, and field
//! value tallies.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use record_indexer::{Dependencies, PipelineError};

#[derive(Parser)]
#[command(name = "record-indexer", version, about = "Bibliographic record search indexer")]
struct Cli {
    /// Path to the configuration file.
    #[arg(long, default_value = "indexer.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Update the index documents of individual records.
    UpdateIndividual {
        /// Restrict to one data source (empty or `*` means all).
        #[arg(long)]
        source: Option<String>,
        /// Target a single record id.
        #[arg(long)]
        single_id: Option<String>,
        /// Start of the incremental window (RFC 3339); overrides the
        /// stored watermark.
        #[arg(long)]
        from: Option<String>,
        /// Skip commits.
        #[arg(long)]
        no_commit: bool,
    },
    /// Update merged documents, group members, and residual records.
    UpdateMerged {
        #[arg(long)]
        source: Option<String>,
        #[arg(long)]
        single_id: Option<String>,
        #[arg(long)]
        from: Option<String>,
        #[arg(long)]
        no_commit: bool,
        /// Remove the source's records from their dedup groups instead of
        /// re-indexing them.
        #[arg(long)]
        delete: bool,
    },
    /// Delete every document of a data source from the index.
    DeleteSource {
        source_id: String,
    },
    /// Optimize the search index.
    Optimize,
    /// Tally the projected values of a field across a source's records.
    CountValues {
        source_id: String,
        field: String,
    },
}

/// Initialize tracing/logging.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("record_indexer=info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

fn parse_from(from: Option<String>) -> Result<Option<DateTime<Utc>>, PipelineError> {
    match from.filter(|f| !f.is_empty()) {
        None => Ok(None),
        Some(value) => DateTime::parse_from_rfc3339(&value)
            .map(|instant| Some(instant.with_timezone(&Utc)))
            .map_err(|e| PipelineError::config(format!("Invalid --from {value}: {e}"))),
    }
}

#[tokio::main]
async fn main() -> Result<(), PipelineError> {
    dotenv().ok();
    init_tracing();

    let cli = Cli::parse();

    let deps = match Dependencies::new(&cli.config).await {
        Ok(deps) => deps,
        Err(e) => {
            error!(error = %e, "Failed to initialize dependencies");
            return Err(e);
        }
    };
    let pipeline = deps.pipeline;

    let result = match cli.command {
        Command::UpdateIndividual {
            source,
            single_id,
            from,
            no_commit,
        } => {
            let from = parse_from(from)?;
            pipeline
                .update_individual_records(from, source.as_deref(), single_id.as_deref(), no_commit)
                .await
        }
        Command::UpdateMerged {
            source,
            single_id,
            from,
            no_commit,
            delete,
        } => {
            let from = parse_from(from)?;
            pipeline
                .update_merged_records(
                    from,
                    source.as_deref(),
                    single_id.as_deref(),
                    no_commit,
                    delete,
                )
                .await
        }
        Command::DeleteSource { source_id } => pipeline.delete_data_source(&source_id).await,
        Command::Optimize => pipeline.optimize_index().await,
        Command::CountValues { source_id, field } => {
            match pipeline.count_values(&source_id, &field).await {
                Ok(counts) => {
                    for (value, count) in counts {
                        println!("{count}\t{value}");
                    }
                    Ok(())
                }
                Err(e) => Err(e),
            }
        }
    };

    match result {
        Ok(()) => {
            info!("Indexer completed successfully");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Indexer failed");
            Err(e)
        }
    }
}
