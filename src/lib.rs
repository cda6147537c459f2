pub mod catalog;
pub mod error;
pub mod model;
pub mod search;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};

use crate::search::embedder::embedder_by_name;
use crate::search::engine::{RecommendEngine, build_and_save_index};

/// Command-line interface.
#[derive(Parser, Debug)]
#[command(
    name = "asrec",
    version,
    about = "Semantic assessment recommendations from a product catalog"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build the vector index bundle from a catalog snapshot
    Build {
        /// Catalog snapshot (JSON array or JSON Lines of records)
        #[arg(long)]
        catalog: PathBuf,

        /// Output directory for the bundle (defaults to platform data dir)
        #[arg(long)]
        out: Option<PathBuf>,

        /// Embedder to build with (hash, minilm)
        #[arg(long)]
        embedder: Option<String>,
    },
    /// Query a built index and print recommendations as JSON
    Query {
        /// Directory holding the bundle (defaults to platform data dir)
        #[arg(long)]
        index: Option<PathBuf>,

        /// Embedder to serve with; must match the one the bundle was built with
        #[arg(long)]
        embedder: Option<String>,

        /// Number of recommendations to return (clamped to 1-10)
        #[arg(long, default_value_t = 10)]
        top_k: usize,

        /// Free-text query, e.g. a job description
        query: String,
    },
    /// Generate shell completions to stdout
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
    /// Generate man page to stdout
    Man,
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Build {
            catalog,
            out,
            embedder,
        } => run_build(&catalog, out, embedder.as_deref()),
        Commands::Query {
            index,
            embedder,
            top_k,
            query,
        } => run_query(index, embedder.as_deref(), top_k, &query),
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "asrec", &mut std::io::stdout());
            Ok(())
        }
        Commands::Man => {
            let cmd = Cli::command();
            let man = clap_mangen::Man::new(cmd);
            let mut out = std::io::stdout();
            man.render(&mut out)?;
            Ok(())
        }
    }
}

fn run_build(catalog: &PathBuf, out: Option<PathBuf>, embedder_name: Option<&str>) -> Result<()> {
    let index_dir = out.unwrap_or_else(default_index_dir);
    let embedder = embedder_by_name(embedder_name)?;
    let records = catalog::load_catalog(catalog)?;
    let bundle = build_and_save_index(records, embedder.as_ref(), &index_dir)
        .context("index build failed")?;
    println!(
        "built bundle: {} records, dimension {}, embedder {}",
        bundle.len(),
        bundle.header().dimension,
        bundle.header().embedder_id
    );
    Ok(())
}

fn run_query(
    index: Option<PathBuf>,
    embedder_name: Option<&str>,
    top_k: usize,
    query: &str,
) -> Result<()> {
    let index_dir = index.unwrap_or_else(default_index_dir);
    let embedder = embedder_by_name(embedder_name)?;
    let engine = RecommendEngine::load(&index_dir, embedder)
        .with_context(|| format!("load index from {}", index_dir.display()))?;
    let recommendations = engine.recommend(query, top_k)?;

    let output = serde_json::json!({
        "query": query.trim(),
        "count": recommendations.len(),
        "recommendations": recommendations,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

pub fn default_index_dir() -> PathBuf {
    directories::ProjectDirs::from("com", "assessment-recommender", "assessment-recommender")
        .map(|dirs| dirs.data_dir().join("index"))
        .unwrap_or_else(|| PathBuf::from("index"))
}
