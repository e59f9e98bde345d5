use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use polyqa::document::{normalize_jsonl, write_documents};
use polyqa::providers::{LibreTranslator, OllamaEmbedder};
use polyqa::{IndexBuilder, Retriever, Settings};

#[derive(Parser)]
#[command(name = "polyqa")]
#[command(version = "0.1")]
#[command(about = "Multilingual extractive QA over a vector index", long_about = None)]
struct Cli {
    /// Log per-step detail to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Normalize raw corpus records into the documents file
    Prepare {
        #[arg(long)]
        input: PathBuf,
    },
    /// Embed the documents file and publish index and metadata
    Build,
    /// Print the nearest documents for a query as JSON
    Search {
        query: String,
        #[arg(short)]
        k: Option<usize>,
    },
    /// Print the extracted answer and its translations as JSON
    Answer {
        query: String,
        /// Target language; repeatable. Defaults to the configured languages.
        #[arg(long = "lang")]
        languages: Vec<String>,
    },
    Config,
}

fn prepare_command(settings: &Settings, input: &Path) -> Result<()> {
    let file = File::open(input)
        .with_context(|| format!("Failed to open raw corpus '{}'", input.display()))?;
    let (documents, stats) = normalize_jsonl(BufReader::new(file))?;
    write_documents(&settings.documents_path, &documents).with_context(|| {
        format!(
            "Failed to write documents to '{}'",
            settings.documents_path.display()
        )
    })?;

    println!("{}", serde_json::to_string(&stats)?);
    Ok(())
}

async fn build_command(settings: &Settings) -> Result<()> {
    let embedder = Arc::new(OllamaEmbedder::from_settings(settings));
    let builder = IndexBuilder::new(embedder, settings.clone());
    let built = builder.build_from_corpus().await?;
    built.publish(settings)?;

    let output = serde_json::json!({
        "index_path": settings.index_path,
        "metadata_path": settings.metadata_path,
        "vectors": built.metadata.len(),
    });
    println!("{}", serde_json::to_string(&output)?);
    Ok(())
}

async fn search_command(settings: &Settings, query: &str, k: Option<usize>) -> Result<()> {
    let embedder = Arc::new(OllamaEmbedder::from_settings(settings));
    let retriever = Retriever::open(settings.clone(), embedder)?;
    let k = k.unwrap_or(settings.top_k);
    let results = retriever.retrieve(query, k).await?;

    let output = serde_json::json!({
        "query": query,
        "database_record_count": retriever.len(),
        "results": results,
        "actual_results_count": results.len(),
        "requested_results_count": k,
    });
    println!("{}", serde_json::to_string(&output)?);
    Ok(())
}

async fn answer_command(settings: &Settings, query: &str, languages: Vec<String>) -> Result<()> {
    let embedder = Arc::new(OllamaEmbedder::from_settings(settings));
    let retriever = Retriever::open(settings.clone(), embedder)?
        .with_translator(Arc::new(LibreTranslator::from_settings(settings)));
    let languages = if languages.is_empty() {
        settings.languages.clone()
    } else {
        languages
    };

    let answer = retriever.answer(query, &languages).await?;
    println!("{}", serde_json::to_string(&answer)?);
    Ok(())
}

fn config_command(settings: &Settings) -> Result<()> {
    settings.print_config();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    let default_level = if args.verbose { "polyqa=debug" } else { "polyqa=info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let settings = Settings::load()?;

    match args.command {
        Commands::Prepare { input } => prepare_command(&settings, &input)?,
        Commands::Build => build_command(&settings).await?,
        Commands::Search { query, k } => search_command(&settings, &query, k).await?,
        Commands::Answer { query, languages } => {
            answer_command(&settings, &query, languages).await?
        }
        Commands::Config => config_command(&settings)?,
    }
    Ok(())
}
