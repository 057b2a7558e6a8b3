//! Culprit CLI - performance regression bisection.

mod replay;
mod report;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;
use culprit_bisect::{create_graph, BisectConfig, JobParams};
use culprit_core::JobId;
use culprit_storage::{GraphStore, JsonStore};

#[derive(Parser)]
#[command(name = "culprit")]
#[command(about = "Find the commit behind a performance regression", long_about = None)]
struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Bisection configuration (JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Job store directory
    #[arg(long, global = true, default_value = ".culprit")]
    store: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a bisection job
    Start {
        /// Job parameters (JSON)
        #[arg(long)]
        params: PathBuf,
    },
    /// Bisect offline against recorded samples
    Replay {
        /// Fixture with parameters, history and samples (JSON)
        #[arg(long)]
        fixture: PathBuf,
    },
    /// Show job details
    Show {
        /// Job ID
        job: String,
    },
    /// List jobs
    List,
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Failed to parse {}", path.display()))
}

async fn load_config(path: Option<&Path>) -> Result<BisectConfig> {
    match path {
        Some(path) => read_json(path).await,
        None => Ok(BisectConfig::default()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = load_config(cli.config.as_deref()).await?;
    let store = JsonStore::new(&cli.store)
        .await
        .with_context(|| format!("Failed to open store {}", cli.store.display()))?;

    match cli.command {
        Commands::Start { params } => {
            let params: JobParams = read_json(&params).await?;
            let input = params.into_input(&config).context("Invalid job parameters")?;
            let job = JobId::new();
            store.populate(job, create_graph(input)).await?;
            info!("Created job {}", job);
            println!("{}", job);
        }
        Commands::Replay { fixture } => {
            let fixture: replay::Fixture = read_json(&fixture).await?;
            let (job, evaluation) = replay::replay(store, fixture, &config).await?;
            info!(
                "Replay finished after {} passes ({} applied, {} rejected)",
                evaluation.passes, evaluation.applied, evaluation.rejected
            );
            print!("{}", report::details(job, &evaluation.graph));
        }
        Commands::Show { job } => {
            let job: JobId = job
                .parse()
                .map_err(|_| anyhow::anyhow!("Invalid job ID: {}", job))?;
            let graph = store.load(job).await?;
            print!("{}", report::details(job, &graph));
        }
        Commands::List => {
            let jobs = store.list_jobs().await?;
            println!("Jobs ({})", jobs.len());
            for job in jobs {
                let graph = store.load(job).await?;
                println!("  {}", report::summary(job, &graph));
            }
        }
    }

    Ok(())
}
