//! takayasu-lit - Takayasu arteritis literature pipeline
//!
//! Fetches abstracts from Europe PMC, annotates them with clinical keyword
//! flags, clusters them into topics and serves an exploration dashboard.
//!
//! ## Usage
//!
//! ### Pipeline
//! ```bash
//! takayasu-lit run
//! takayasu-lit fetch --max-pages 2
//! takayasu-lit annotate
//! takayasu-lit cluster --topics 8
//! ```
//!
//! ### Dashboard
//! ```bash
//! takayasu-lit serve --port 8501
//! takayasu-lit report --imaging pet --keyword aortitis
//! ```

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use takayasu_lit::{
    annotate,
    cluster::{self, TopicSummary},
    config::{ClusterConfig, DataLayout, DEFAULT_DATA_DIR},
    dashboard::{self, render, Dataset, Filters},
    europepmc::{EuropePmcClient, FetchOptions, DEFAULT_PAGE_SIZE, DEFAULT_QUERY, EUROPEPMC_SEARCH_URL},
    paper::Flag,
};
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, EnvFilter};

// ============================================================================
// CLI Definition
// ============================================================================

/// Takayasu arteritis literature pipeline
#[derive(Parser)]
#[command(name = "takayasu-lit")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Root of the raw/ and processed/ data directories
    #[arg(long, global = true, default_value = DEFAULT_DATA_DIR)]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download search results with abstracts to the raw CSV
    Fetch {
        #[command(flatten)]
        fetch: FetchArgs,

        /// Output CSV (defaults to <data-dir>/raw/takayasu_europepmc_raw.csv)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Add keyword flags and age ranges to the raw CSV
    Annotate {
        /// Input CSV (defaults to the raw CSV)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Output CSV (defaults to the annotated CSV)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Assign LDA topics and k-means clusters to the annotated CSV
    Cluster {
        #[command(flatten)]
        cluster: ClusterArgs,

        /// Input CSV (defaults to the annotated CSV)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Output CSV (defaults to the clustered CSV)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Run fetch, annotate and cluster in sequence
    Run {
        #[command(flatten)]
        fetch: FetchArgs,

        #[command(flatten)]
        cluster: ClusterArgs,
    },

    /// Serve the dashboard over HTTP
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "8501")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Clustered CSV (defaults to <data-dir>/processed/takayasu_annotated_clustered.csv)
        #[arg(short, long)]
        input: Option<PathBuf>,
    },

    /// Print dashboard aggregates to the terminal
    Report {
        #[command(flatten)]
        filters: FilterArgs,

        /// Clustered CSV (defaults to the clustered CSV)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Also list the filtered papers
        #[arg(long)]
        list: bool,
    },
}

#[derive(Args)]
struct FetchArgs {
    /// Europe PMC query
    #[arg(long, default_value = DEFAULT_QUERY)]
    query: String,

    /// Results per page
    #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
    page_size: u32,

    /// Stop after this many pages
    #[arg(long)]
    max_pages: Option<u32>,

    /// Search endpoint
    #[arg(long, default_value = EUROPEPMC_SEARCH_URL)]
    base_url: String,
}

impl From<FetchArgs> for FetchOptions {
    fn from(args: FetchArgs) -> Self {
        Self {
            base_url: args.base_url,
            query: args.query,
            page_size: args.page_size,
            max_pages: args.max_pages,
        }
    }
}

#[derive(Args)]
struct ClusterArgs {
    /// TF-IDF vocabulary cap
    #[arg(long, default_value = "5000")]
    max_features: usize,

    /// Number of LDA topics
    #[arg(long, default_value = "5")]
    topics: usize,

    /// Number of k-means clusters
    #[arg(long, default_value = "6")]
    clusters: usize,

    /// k-means restarts
    #[arg(long, default_value = "10")]
    n_init: usize,

    /// Random seed for LDA and k-means
    #[arg(long, default_value = "42")]
    seed: u64,
}

impl From<ClusterArgs> for ClusterConfig {
    fn from(args: ClusterArgs) -> Self {
        Self {
            max_features: args.max_features,
            n_topics: args.topics,
            n_clusters: args.clusters,
            n_init: args.n_init,
            seed: args.seed,
            ..Default::default()
        }
    }
}

#[derive(Args)]
struct FilterArgs {
    /// First publication year (inclusive)
    #[arg(long)]
    year_from: Option<i32>,

    /// Last publication year (inclusive)
    #[arg(long)]
    year_to: Option<i32>,

    /// Required imaging mentions (ct, mri, pet, ultrasound)
    #[arg(long, value_enum, value_delimiter = ',')]
    imaging: Vec<Flag>,

    /// Required treatment mentions (steroids, biologics, surgery)
    #[arg(long, value_enum, value_delimiter = ',')]
    treatment: Vec<Flag>,

    /// Substring of title or abstract
    #[arg(long)]
    keyword: Option<String>,
}

impl TryFrom<FilterArgs> for Filters {
    type Error = takayasu_lit::LitError;

    fn try_from(args: FilterArgs) -> Result<Self, Self::Error> {
        Filters::new(args.year_from, args.year_to, args.imaging, args.treatment, args.keyword)
    }
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.debug { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .init();

    let layout = DataLayout::new(&cli.data_dir);

    match cli.command {
        Commands::Fetch { fetch, output } => {
            let output = output.unwrap_or_else(|| layout.raw_csv());
            run_fetch(fetch.into(), &output).await.map(|_| ())
        }
        Commands::Annotate { input, output } => {
            let input = input.unwrap_or_else(|| layout.raw_csv());
            let output = output.unwrap_or_else(|| layout.annotated_csv());
            run_annotate(&input, &output)
        }
        Commands::Cluster { cluster, input, output } => {
            let input = input.unwrap_or_else(|| layout.annotated_csv());
            let output = output.unwrap_or_else(|| layout.clustered_csv());
            run_cluster(&input, &output, &layout.topics_json(), &cluster.into())
        }
        Commands::Run { fetch, cluster } => run_pipeline(&layout, fetch.into(), cluster.into()).await,
        Commands::Serve { port, host, input } => {
            let input = input.unwrap_or_else(|| layout.clustered_csv());
            run_server(&host, port, &input, &layout.topics_json()).await
        }
        Commands::Report { filters, input, list } => {
            let input = input.unwrap_or_else(|| layout.clustered_csv());
            let filters = Filters::try_from(filters).context("Invalid filters")?;
            run_report(&input, &layout.topics_json(), &filters, list)
        }
    }
}

// ============================================================================
// Pipeline Stages
// ============================================================================

/// Returns the number of papers written.
async fn run_fetch(options: FetchOptions, output: &Path) -> Result<usize> {
    println!("Searching Europe PMC: {}", options.query);
    let client = EuropePmcClient::new(options).context("Failed to create Europe PMC client")?;
    let result = client.fetch_all().await.context("Europe PMC search failed")?;

    println!(
        "Hits: {} | pages: {} | fetched: {} | with abstract: {}",
        result.hit_count,
        result.pages,
        result.fetched,
        result.papers.len()
    );

    let written = result
        .write_raw(output)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    if written > 0 {
        println!("Saved: {}", output.display());
    }
    Ok(written)
}

fn run_annotate(input: &Path, output: &Path) -> Result<()> {
    let stats = annotate::annotate_file(input, output)
        .with_context(|| format!("Failed to annotate {}", input.display()))?;

    println!("Annotated {} papers", stats.papers);
    println!("  imaging mentioned:      {}", stats.imaging);
    println!("  treatment mentioned:    {}", stats.treatment);
    println!("  complication mentioned: {}", stats.complication);
    println!("  sex mentioned:          {}", stats.sex);
    println!("  age range found:        {}", stats.with_age);
    if stats.papers > 0 {
        println!("Saved: {}", output.display());
    }
    Ok(())
}

fn run_cluster(input: &Path, output: &Path, topics_out: &Path, config: &ClusterConfig) -> Result<()> {
    let summary = cluster::cluster_file(input, output, topics_out, config)
        .with_context(|| format!("Failed to cluster {}", input.display()))?;

    if summary.documents == 0 {
        println!("No papers to cluster.");
        return Ok(());
    }
    print_topics(&summary);
    println!("Saved: {}", output.display());
    println!("Saved: {}", topics_out.display());
    Ok(())
}

fn print_topics(summary: &TopicSummary) {
    println!("LDA topics:");
    for topic in &summary.topics {
        println!("  #{} ({} papers): {}", topic.id, topic.size, topic.terms.join(", "));
    }
    println!("K-means clusters:");
    for group in &summary.clusters {
        println!("  #{} ({} papers): {}", group.id, group.size, group.terms.join(", "));
    }
}

async fn run_pipeline(layout: &DataLayout, fetch: FetchOptions, config: ClusterConfig) -> Result<()> {
    config.validate().context("Invalid clustering parameters")?;

    println!("[1/3] Fetching");
    let written = run_fetch(fetch, &layout.raw_csv()).await?;
    if written == 0 {
        warn!("Search returned no papers with abstracts; stopping");
        println!("No papers with abstracts found; nothing to annotate.");
        return Ok(());
    }

    println!("[2/3] Annotating");
    run_annotate(&layout.raw_csv(), &layout.annotated_csv())?;

    println!("[3/3] Clustering");
    run_cluster(
        &layout.annotated_csv(),
        &layout.clustered_csv(),
        &layout.topics_json(),
        &config,
    )?;

    info!("Pipeline complete");
    Ok(())
}

// ============================================================================
// Dashboard
// ============================================================================

async fn run_server(host: &str, port: u16, input: &Path, topics: &Path) -> Result<()> {
    let dataset = Dataset::load(input, Some(topics))
        .with_context(|| format!("Failed to load {}", input.display()))?;

    info!(host = %host, port = port, papers = dataset.len(), "Starting dashboard");
    println!("Dashboard at http://{}:{}", host, port);

    dashboard::server::serve(host, port, dataset)
        .await
        .context("Server error")?;
    Ok(())
}

fn run_report(input: &Path, topics: &Path, filters: &Filters, list: bool) -> Result<()> {
    let dataset = Dataset::load(input, Some(topics))
        .with_context(|| format!("Failed to load {}", input.display()))?;
    let summary = dataset.summarize(filters);
    print!("{}", render::text_report(&summary));

    if list {
        println!("\nPapers:");
        for row in dataset.table(filters) {
            println!(
                "  [{}] {} | {} | {}",
                row.index,
                row.year.map(|y| y.to_string()).unwrap_or_default(),
                row.journal.as_deref().unwrap_or("-"),
                row.title.as_deref().unwrap_or("(untitled)")
            );
        }
    }
    Ok(())
}
