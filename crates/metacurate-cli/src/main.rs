use std::path::PathBuf;

use clap::{Parser, Subcommand};

use metacurate_core::{Curator, Finder, MemoryFinder, SparqlFinder};
use metacurate_counter::{InMemoryCounter, SqliteCounter};
use metacurate_identifiers::{ProbeClient, Registry};
use metacurate_ingest::{read_rows_from_path, write_action_log, write_action_log_to_path, write_rows_to_path};
use metacurate_sparql::SparqlClient;

mod config;

use config::load_config;

const DEFAULT_SUPPLIER_PREFIX: &str = "060";

/// Curate batches of bibliographic metadata against an OpenCitations Meta
/// triplestore.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Curate a CSV batch: deduplicate, merge with the graph, emit an action log
    Curate {
        /// Path to the input CSV file
        input: PathBuf,

        /// SPARQL endpoint of the triplestore
        #[arg(long)]
        endpoint: Option<String>,

        /// Path to the SQLite counter database
        #[arg(long)]
        counter_db: Option<PathBuf>,

        /// Supplier prefix embedded in newly minted meta identifiers
        #[arg(long)]
        supplier_prefix: Option<String>,

        /// Directory for the curated CSV and action log
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Confirm resolvable identifiers against their registration agencies
        #[arg(long)]
        probe_identifiers: bool,

        /// Dry run: curate against an empty in-memory graph and print the
        /// action log to stdout instead of writing files
        #[arg(long)]
        dry_run: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Curate {
            input,
            endpoint,
            counter_db,
            supplier_prefix,
            output,
            probe_identifiers,
            dry_run,
        } => {
            curate(
                input,
                endpoint,
                counter_db,
                supplier_prefix,
                output,
                probe_identifiers,
                dry_run,
            )
            .await
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn curate(
    input: PathBuf,
    endpoint: Option<String>,
    counter_db: Option<PathBuf>,
    supplier_prefix: Option<String>,
    output: Option<PathBuf>,
    probe_identifiers: bool,
    dry_run: bool,
) -> anyhow::Result<()> {
    let file_config = load_config();
    let supplier_prefix = supplier_prefix
        .or(file_config.supplier_prefix)
        .unwrap_or_else(|| DEFAULT_SUPPLIER_PREFIX.to_string());
    let output_dir = output
        .or(file_config.output)
        .unwrap_or_else(|| PathBuf::from("."));

    let registry = if probe_identifiers {
        Registry::with_probes(ProbeClient::new())
    } else {
        Registry::new()
    };

    let rows = read_rows_from_path(&input)?;
    tracing::info!(rows = rows.len(), input = %input.display(), "batch loaded");

    if dry_run {
        let finder = MemoryFinder::new();
        let counter = InMemoryCounter::new();
        let curator = Curator::new(&finder, &counter, &registry, &supplier_prefix);
        let batch = run_batch(&curator, &rows).await?;
        write_action_log(std::io::stdout().lock(), &batch.actions)?;
        tracing::info!(
            actions = batch.actions.len(),
            warnings = batch.warnings.len(),
            "dry run complete"
        );
        return Ok(());
    }

    let endpoint = endpoint
        .or(file_config.endpoint)
        .ok_or_else(|| anyhow::anyhow!("no SPARQL endpoint: pass --endpoint or set it in config"))?;
    let counter_db = counter_db
        .or(file_config.counter_db)
        .ok_or_else(|| anyhow::anyhow!("no counter database: pass --counter-db or set it in config"))?;

    let finder: Box<dyn Finder> = Box::new(SparqlFinder::new(SparqlClient::new(endpoint)));
    let counter = SqliteCounter::open(&counter_db, &supplier_prefix)?;
    let curator = Curator::new(finder.as_ref(), &counter, &registry, &supplier_prefix);
    let batch = run_batch(&curator, &rows).await?;

    std::fs::create_dir_all(&output_dir)?;
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "batch".to_string());
    let rows_path = output_dir.join(format!("{stem}_curated.csv"));
    let log_path = output_dir.join(format!("{stem}_actions.jsonl"));
    write_rows_to_path(&rows_path, &batch.rows)?;
    write_action_log_to_path(&log_path, &batch.actions)?;

    println!(
        "curated {} rows: {} actions, {} warnings",
        batch.rows.len(),
        batch.actions.len(),
        batch.warnings.len()
    );
    println!("  rows:    {}", rows_path.display());
    println!("  actions: {}", log_path.display());
    Ok(())
}

async fn run_batch(
    curator: &Curator<'_>,
    rows: &[metacurate_core::Row],
) -> anyhow::Result<metacurate_core::CuratedBatch> {
    match curator.curate(rows).await {
        Ok(batch) => {
            for warning in &batch.warnings {
                tracing::warn!("{warning}");
            }
            Ok(batch)
        }
        Err(e) => Err(anyhow::anyhow!("{}: {}", e.kind(), e)),
    }
}
