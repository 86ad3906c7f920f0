// Entry point of the tarea content pipeline.
//
// **Architecture Overview:**
// - `core/` = Business logic (migration, document parsing, ingest)
// - `infra/` = Implementations of core traits (Postgres, Google APIs, .docx)
// - `http/` = axum adapters over the core services
//
// This file's job is to:
// 1. Load configuration
// 2. Initialize services (dependency injection)
// 3. Run the requested command: the HTTP server or a one-shot CLI job

// These attrs point each module declaration at a more descriptive root file
// so we don't end up with half a dozen mod.rs files that all look the same.
#[path = "core/core_layer.rs"]
mod core;
#[path = "http/http_layer.rs"]
mod http;
#[path = "infra/infra_layer.rs"]
mod infra;

mod config;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use crate::config::AppConfig;
use crate::core::documents::{IngestReport, IngestService};
use crate::core::migration::{AudioTable, MigrationService, AUDIO_TABLES};
use crate::http::{AppState, HttpSettings};
use crate::infra::docx::DocxReader;
use crate::infra::google::{DriveClient, GcsClient, GoogleAuth};
use crate::infra::postgres::{connect_pool, PgAudioRowStore, PgTareaStore};

#[derive(Parser)]
#[command(name = "tarea-pipeline")]
#[command(about = "Moves tarea audio from Google Drive to Cloud Storage and loads .docx tareas into Postgres")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Port to bind to (overrides PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Migrate one batch of pending audio rows
    Migrate {
        /// Table slug, e.g. listening_tarea1
        #[arg(long)]
        table: String,
        /// Maximum number of rows to process
        #[arg(long, value_parser = clap::value_parser!(i64).range(0..))]
        limit: Option<i64>,
        /// Upload the audio but leave the rows untouched
        #[arg(long)]
        test_mode: bool,
    },
    /// Migrate in batches until a batch migrates nothing
    AutoMigrate {
        #[arg(long)]
        table: String,
        #[arg(long, value_parser = clap::value_parser!(i64).range(1..))]
        batch_size: Option<i64>,
    },
    /// Inspect table schemas, migration stats and sample rows
    CheckDb {
        /// Only check this table slug
        #[arg(long)]
        table: Option<String>,
    },
    /// Parse writing tarea 1 documents into the database
    ParseWriting(IngestArgs),
    /// Parse oral tarea 2 documents into the database
    ParseOral(IngestArgs),
    /// Drop and recreate the writing tarea 1 tables, then load every document
    RebuildWriting {
        #[arg(long)]
        folder: Option<PathBuf>,
        #[arg(long)]
        module_type_id: Option<i32>,
    },
}

#[derive(Args)]
struct IngestArgs {
    /// Folder containing the .docx files
    #[arg(long)]
    folder: Option<PathBuf>,
    #[arg(long)]
    module_type_id: Option<i32>,
    /// Only process the first N files
    #[arg(long)]
    limit: Option<usize>,
    /// Parse without inserting anything
    #[arg(long)]
    dry_run: bool,
}

struct Services {
    migrations: Arc<MigrationService>,
    documents: Arc<IngestService>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file (if it exists)
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = AppConfig::from_env().context("Failed to load configuration")?;
    let services = build_services(&config).await?;

    match cli.command {
        Commands::Serve { port } => {
            let address = format!("{}:{}", config.bind_address, port.unwrap_or(config.port));
            let state = Arc::new(AppState {
                migrations: services.migrations,
                documents: services.documents,
                settings: HttpSettings {
                    writing_folder: config.writing_folder.clone(),
                    oral_folder: config.oral_folder.clone(),
                    writing_module_type_id: config.writing_module_type_id,
                    oral_module_type_id: config.oral_module_type_id,
                    auto_migrate_batch_size: config.auto_migrate_batch_size,
                },
            });
            http::serve(state, &address).await?;
        }

        Commands::Migrate {
            table,
            limit,
            test_mode,
        } => {
            let table = resolve_table(&table)?;
            let report = services
                .migrations
                .migrate_batch(table, limit, test_mode)
                .await?;
            print_json(&report)?;
        }

        Commands::AutoMigrate { table, batch_size } => {
            let table = resolve_table(&table)?;
            let batch_size = batch_size.unwrap_or(config.auto_migrate_batch_size);
            let report = services.migrations.auto_migrate(table, batch_size).await?;
            print_json(&report)?;
        }

        Commands::CheckDb { table } => {
            let tables: Vec<&AudioTable> = match table {
                Some(slug) => vec![resolve_table(&slug)?],
                None => AUDIO_TABLES.iter().collect(),
            };

            let mut reports = Vec::with_capacity(tables.len());
            for table in tables {
                let report = match services.migrations.check_table(table).await {
                    Ok(report) => json!({ "ready": report.is_ready(), "report": report }),
                    Err(e) => json!({ "table": table.table, "error": e.to_string() }),
                };
                reports.push(report);
            }
            print_json(&json!({ "tables": reports }))?;
        }

        Commands::ParseWriting(args) => {
            let report = services
                .documents
                .ingest_writing(
                    &args.folder.unwrap_or(config.writing_folder),
                    args.module_type_id.unwrap_or(config.writing_module_type_id),
                    args.limit,
                    args.dry_run,
                )
                .await?;
            print_json(&report)?;
        }

        Commands::ParseOral(args) => {
            let report = services
                .documents
                .ingest_oral(
                    &args.folder.unwrap_or(config.oral_folder),
                    args.module_type_id.unwrap_or(config.oral_module_type_id),
                    args.limit,
                    args.dry_run,
                )
                .await?;
            print_json(&report)?;
        }

        Commands::RebuildWriting {
            folder,
            module_type_id,
        } => {
            let report = services
                .documents
                .rebuild_writing(
                    &folder.unwrap_or(config.writing_folder),
                    module_type_id.unwrap_or(config.writing_module_type_id),
                )
                .await?;
            print_json(&report)?;
            ensure_complete(&report)?;
        }
    }

    Ok(())
}

// ============================================================================
// DEPENDENCY INJECTION
// ============================================================================
// This is the "composition root" where we wire everything together.

async fn build_services(config: &AppConfig) -> Result<Services> {
    let http_client = reqwest::Client::builder()
        .timeout(config.http_timeout)
        .build()
        .context("Failed to build HTTP client")?;

    let pool = connect_pool(&config.database_url, config.database_max_connections)
        .context("Invalid DATABASE_URL")?;

    let auth = GoogleAuth::from_env(http_client.clone())
        .await
        .context("Failed to load Google credentials")?;
    let objects = GcsClient::new(http_client.clone(), Arc::new(auth), config.gcs_bucket.clone());

    let migrations = MigrationService::new(
        Box::new(PgAudioRowStore::new(pool.clone())),
        Box::new(DriveClient::new(http_client)),
        Arc::new(objects),
    );
    let documents = IngestService::new(Box::new(DocxReader::new()), Box::new(PgTareaStore::new(pool)));

    info!(bucket = %config.gcs_bucket, "Services initialized");

    Ok(Services {
        migrations: Arc::new(migrations),
        documents: Arc::new(documents),
    })
}

fn resolve_table(slug: &str) -> Result<&'static AudioTable> {
    match AudioTable::find(slug) {
        Some(table) => Ok(table),
        None => bail!(
            "Unknown table '{}'. Known tables: {}",
            slug,
            AudioTable::slugs().join(", ")
        ),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Turns a partially failed rebuild into a non-zero exit.
fn ensure_complete(report: &IngestReport) -> Result<()> {
    if !report.all_succeeded() {
        bail!(
            "{} of {} documents failed to load",
            report.failed,
            report.total
        );
    }
    Ok(())
}
