use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;

use passage_core::{Config, QueryType};
use passage_embed::get_default_embedder;
use passage_hybrid::{IndexDelta, PassageEngine, RetrievalOutcome};

#[derive(Parser, Debug)]
#[command(name = "passage", about = "Index a document corpus and answer questions from it")]
struct Cli {
    /// Directory holding config.toml; relative paths in it resolve against this directory
    #[arg(long, env = "PASSAGE_CONFIG_DIR", default_value = ".")]
    config: PathBuf,

    /// Debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Bring the indexes in line with the corpus directory
    Sync {
        /// Corpus directory; defaults to paths.corpus_dir
        corpus: Option<PathBuf>,
    },
    /// Retrieve passages for a question
    Query {
        text: String,
        /// contact, claims, coverage or generic; classified from the text when omitted
        #[arg(long = "type", value_parser = parse_query_type)]
        query_type: Option<QueryType>,
        /// Print the outcome as JSON
        #[arg(long)]
        json: bool,
    },
    /// List indexed documents
    List,
    /// Show index health
    Status,
}

fn parse_query_type(s: &str) -> std::result::Result<QueryType, String> {
    QueryType::parse(s).ok_or_else(|| format!("unknown query type '{s}' (contact, claims, coverage, generic)"))
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).with_writer(std::io::stderr).init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let settings = Config::load_from(&cli.config)
        .and_then(|c| c.settings())
        .with_context(|| format!("loading configuration from {}", cli.config.display()))?;
    let embedder = get_default_embedder(&settings.embedding).context("initialising the embedder")?;
    let engine = PassageEngine::open(settings, &cli.config, embedder).context("opening the indexes")?;

    match cli.command {
        Command::Sync { corpus } => sync(&engine, corpus),
        Command::Query { text, query_type, json } => query(&engine, &text, query_type, json),
        Command::List => {
            let documents = engine.indexed_documents();
            if documents.is_empty() {
                println!("No documents indexed yet. Run `passage sync` first.");
            }
            for name in documents {
                println!("{name}");
            }
            Ok(())
        }
        Command::Status => {
            println!("{}", serde_json::to_string_pretty(&engine.status())?);
            Ok(())
        }
    }
}

fn sync(engine: &PassageEngine, corpus: Option<PathBuf>) -> Result<()> {
    let corpus = corpus.unwrap_or_else(|| engine.corpus_dir().to_path_buf());
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::with_template("{spinner:.green} [{pos}/{len}] {msg}")?);
    pb.enable_steady_tick(Duration::from_millis(120));

    let delta = engine.sync_dir(&corpus, |done, total, name| {
        pb.set_length(total as u64);
        pb.set_position(done as u64);
        pb.set_message(name.to_string());
    })?;
    pb.finish_and_clear();

    print_delta(&corpus, &delta);
    Ok(())
}

fn print_delta(corpus: &Path, delta: &IndexDelta) {
    println!("Synced {}", corpus.display());
    println!(
        "  added {}, changed {}, unchanged {}, failed {}",
        delta.added.len(),
        delta.changed.len(),
        delta.unchanged.len(),
        delta.failed.len()
    );
    for failed in &delta.failed {
        println!("  ✗ {}: {}", failed.name, failed.reason);
    }
    for chunk in &delta.degraded {
        println!("  ~ {} searchable by keyword only: {}", chunk.key, chunk.reason);
    }
    for name in &delta.missing {
        let action = if delta.pruned.contains(name) { "removed from the index" } else { "still indexed" };
        println!("  - {name} is no longer in the corpus ({action})");
    }
}

fn query(engine: &PassageEngine, text: &str, query_type: Option<QueryType>, json: bool) -> Result<()> {
    let outcome = engine.search(text, query_type)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return Ok(());
    }
    match outcome {
        RetrievalOutcome::NoInformation { query_type, reason } => {
            println!("No information found ({query_type} query): {reason}");
        }
        RetrievalOutcome::Found(result) => {
            println!("{} query, {} retrieval, sources: {}", result.query_type, result.strategy, result.sources.join(", "));
            if !result.contacts.is_empty() {
                println!("\nContact numbers: {}", result.contacts.join(", "));
            }
            if !result.highlights.is_empty() {
                println!();
                for line in &result.highlights {
                    println!("  • {line}");
                }
            }
            for (rank, passage) in result.passages.iter().enumerate() {
                println!("\n{}. [{}]", rank + 1, passage.key);
                println!("{}", passage.text);
            }
        }
    }
    Ok(())
}
