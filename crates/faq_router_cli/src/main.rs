use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use faq_router::{
    build_index, clean_rows, evaluate_cases, load_cases, read_rows, save_index,
    save_knowledge_base, Config, FaqService, GreetingMatcher, HashEmbeddingProvider,
    IngestReport,
};
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG_FILE: &str = "faq.toml";
const DEFAULT_REQUIRED_PASS_RATE: f32 = 0.8;

#[derive(Debug, Parser)]
#[command(name = "faq")]
#[command(about = "FAQ answer router with a greeting gate")]
struct Cli {
    /// TOML config file. Defaults to ./faq.toml when it exists.
    #[arg(long, global = true, env = "FAQ_CONFIG")]
    config: Option<PathBuf>,

    /// Knowledge base JSONL, overrides `data.knowledge_base`.
    #[arg(long, global = true)]
    kb: Option<PathBuf>,

    /// Index JSONL, overrides `data.index`.
    #[arg(long, global = true)]
    index: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Clean a question/answer table (.csv or .jsonl) and write the knowledge base and index.
    BuildIndex {
        #[arg(long)]
        input: PathBuf,
    },
    /// Answer one message.
    Ask { message: String },
    /// Run only the greeting gate.
    Detect { message: String },
    /// Report readiness and data file presence.
    Health,
    /// Run labelled cases and report the pass rate.
    Eval {
        #[arg(long)]
        cases: PathBuf,
        #[arg(long, default_value_t = DEFAULT_REQUIRED_PASS_RATE)]
        min_pass_rate: f32,
    },
}

#[derive(Debug, Serialize)]
struct BuildOutput<'a> {
    #[serde(flatten)]
    report: IngestReport,
    knowledge_base: &'a Path,
    index: &'a Path,
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None if Path::new(DEFAULT_CONFIG_FILE).is_file() => {
            Config::load(Path::new(DEFAULT_CONFIG_FILE))?
        }
        None => Config::default(),
    };
    if let Some(kb) = &cli.kb {
        config.data.knowledge_base = kb.clone();
    }
    if let Some(index) = &cli.index {
        config.data.index = index.clone();
    }
    Ok(config)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let out = serde_json::to_string_pretty(value).context("serialize output")?;
    println!("{out}");
    Ok(())
}

/// Build the service and try to load search data. A failed load is logged and
/// left to the readiness state; greeting handling still works.
fn start_service(config: Config) -> FaqService {
    let embedder = Arc::new(HashEmbeddingProvider::new(config.embedding.dim));
    let service = FaqService::new(config, embedder);
    if let Err(err) = service.initialize() {
        warn!(error = %err, "search unavailable");
    }
    service
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    match &cli.command {
        Commands::BuildIndex { input } => {
            let embedder = HashEmbeddingProvider::new(config.embedding.dim);
            let (entries, report) = clean_rows(read_rows(input)?);
            let records = build_index(&embedder, &entries)?;

            save_knowledge_base(&config.data.knowledge_base, &entries)?;
            save_index(&config.data.index, &records)?;
            info!(
                knowledge_base = %config.data.knowledge_base.display(),
                index = %config.data.index.display(),
                "wrote search data"
            );

            print_json(&BuildOutput {
                report,
                knowledge_base: &config.data.knowledge_base,
                index: &config.data.index,
            })?;
        }
        Commands::Ask { message } => {
            let service = start_service(config);
            let answer = service.answer(message).await;
            print_json(&answer)?;
        }
        Commands::Detect { message } => {
            let matcher = GreetingMatcher::new(&config.greetings);
            print_json(&matcher.detect(message))?;
        }
        Commands::Health => {
            let service = start_service(config);
            print_json(&service.health())?;
        }
        Commands::Eval {
            cases,
            min_pass_rate,
        } => {
            let cases = load_cases(cases)?;
            let service = start_service(config);
            let summary = evaluate_cases(&service, &cases).await;
            print_json(&summary)?;
            if !summary.meets(*min_pass_rate) {
                anyhow::bail!(
                    "pass rate {:.4} is below the required {:.4}",
                    summary.pass_rate,
                    min_pass_rate
                );
            }
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    init_tracing();
    if let Err(err) = run().await {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
