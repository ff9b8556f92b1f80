mod config;
mod errors;
mod export;
mod filter;
mod llm;
mod models;
mod normalize;
mod pipeline;
mod prompts;
mod query;
mod rubric;
mod scrape_types;
mod stages;
mod store;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

use crate::filter::Bucket;
use crate::llm::ModelClient;
use crate::models::FilterCriteria;
use crate::pipeline::PipelineOpts;
use crate::rubric::SeverityRubric;
use crate::scrape_types::RawComplaintEntry;

/// Civic complaint enrichment pipeline and dashboard feed
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to config file (overrides COMPLAINTS_CONFIG environment variable)
    #[arg(short, long, env = "COMPLAINTS_CONFIG", default_value = "config.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Normalize a raw scrape and run the enrichment pipeline over it
    Enrich {
        /// JSON file of raw scraped entries
        input: PathBuf,

        /// Where to write the enriched dataset
        #[arg(short, long, default_value = "data/enriched.json")]
        output: PathBuf,
    },
    /// Filter the enriched dataset and print aggregate counts
    Stats {
        #[arg(short, long, default_value = "data/enriched.json")]
        data: PathBuf,

        #[command(flatten)]
        filters: FilterArgs,

        #[arg(long, value_enum, default_value_t = Bucket::Day)]
        bucket: Bucket,

        /// Also write the chart-ready dashboard bundle to this path
        #[arg(long)]
        export_path: Option<PathBuf>,
    },
    /// Ask a natural-language question over a filtered subset
    Ask {
        /// The question, quoted
        question: String,

        #[arg(short, long, default_value = "data/enriched.json")]
        data: PathBuf,

        #[command(flatten)]
        filters: FilterArgs,

        /// Context budget in approximate tokens
        #[arg(long, default_value_t = 6000)]
        context_budget: usize,
    },
}

#[derive(Args, Debug)]
struct FilterArgs {
    /// Start of the time range (RFC3339 or YYYY-MM-DD)
    #[arg(long)]
    from: Option<String>,

    /// End of the time range (RFC3339 or YYYY-MM-DD, inclusive)
    #[arg(long)]
    to: Option<String>,

    /// Restrict to a municipality; may be repeated
    #[arg(long = "municipality")]
    municipalities: Vec<String>,

    /// Restrict to a category; may be repeated
    #[arg(long = "category")]
    categories: Vec<String>,
}

fn parse_time_bound(raw: &str, end_of_day: bool) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .with_context(|| format!("invalid time bound {:?} (want RFC3339 or YYYY-MM-DD)", raw))?;
    let naive = if end_of_day {
        date.and_hms_opt(23, 59, 59)
    } else {
        date.and_hms_opt(0, 0, 0)
    };
    Ok(naive.expect("in-range time").and_utc())
}

impl FilterArgs {
    fn into_criteria(self) -> Result<FilterCriteria> {
        Ok(FilterCriteria {
            from: self.from.as_deref().map(|s| parse_time_bound(s, false)).transpose()?,
            to: self.to.as_deref().map(|s| parse_time_bound(s, true)).transpose()?,
            municipalities: self.municipalities.iter().map(|s| normalize::canonical_key(s)).collect(),
            categories: self.categories.iter().map(|s| normalize::canonical_key(s)).collect(),
        })
    }
}

fn load_rubric(cfg: &config::RunConfig) -> Result<SeverityRubric> {
    match &cfg.rubric_path {
        // A malformed rubric is fatal before any record is processed.
        Some(path) => SeverityRubric::load_yaml(path)
            .with_context(|| format!("loading rubric {}", path.display())),
        None => Ok(SeverityRubric::default()),
    }
}

async fn run_enrich(cfg: config::RunConfig, input: PathBuf, output: PathBuf) -> Result<()> {
    let rubric = load_rubric(&cfg)?;

    let raw_bytes = std::fs::read(&input)
        .with_context(|| format!("reading scrape {}", input.display()))?;
    let raw: Vec<RawComplaintEntry> = serde_json::from_slice(&raw_bytes)
        .with_context(|| format!("parsing scrape {}", input.display()))?;
    info!("Scrape loaded - path={}, entries={}", input.display(), raw.len());

    let (records, dropped) = normalize::normalize_batch(&raw);
    if records.is_empty() {
        anyhow::bail!("no usable records in {} ({} dropped)", input.display(), dropped);
    }

    let client = ModelClient::new(&cfg)?;
    let opts = PipelineOpts {
        concurrency: cfg.concurrency,
        source_language: cfg.source_language.clone(),
        target_language: cfg.target_language.clone(),
    };

    // Ctrl-C stops new calls; in-flight calls finish or time out, and partial
    // results still get persisted below.
    let cancel = Arc::new(AtomicBool::new(false));
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Cancellation requested - finishing in-flight calls, skipping the rest");
                cancel.store(true, Ordering::Relaxed);
            }
        });
    }

    let enriched = pipeline::enrich_all(&client, &rubric, &opts, records, &cancel).await;
    store::save_dataset(&output, &enriched)?;

    info!(
        "Run complete - records={}, dropped_at_normalize={}, output={}",
        enriched.len(),
        dropped,
        output.display()
    );
    Ok(())
}

fn run_stats(data: PathBuf, filters: FilterArgs, bucket: Bucket, export_path: Option<PathBuf>) -> Result<()> {
    let records = store::load_dataset(&data)?;
    let criteria = filters.into_criteria()?;
    let subset = filter::apply(&records, &criteria);
    let aggregates = filter::aggregate(&subset, bucket);
    info!("Filter applied - matched={}/{}", subset.len(), records.len());

    println!("{}", serde_json::to_string_pretty(&aggregates)?);

    if let Some(path) = export_path {
        export::write_dashboard(&path, &subset, &aggregates)?;
        info!("Dashboard bundle written - path={}", path.display());
    }
    Ok(())
}

async fn run_ask(
    cfg: config::RunConfig,
    data: PathBuf,
    question: String,
    filters: FilterArgs,
    context_budget: usize,
) -> Result<()> {
    let records = store::load_dataset(&data)?;
    let criteria = filters.into_criteria()?;
    let subset = filter::apply(&records, &criteria);
    if subset.is_empty() {
        anyhow::bail!("no records match the filter; nothing to ask about");
    }

    let client = ModelClient::new(&cfg)?;
    let answer = query::ask(&client, &question, &subset, context_budget)
        .await
        .context("answering failed; if the context was too large, narrow the filter and retry")?;

    println!("{}", answer.trim());
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_thread_ids(false)
        .with_line_number(true)
        .init();

    let cli = Cli::parse();
    info!("Starting civic-complaints - config={}", cli.config.display());

    // `stats` is pure local filtering; only the model-calling commands need
    // the endpoint config.
    match cli.command {
        Command::Enrich { input, output } => {
            let cfg = config::load_config(&cli.config)?;
            run_enrich(cfg, input, output).await
        }
        Command::Stats { data, filters, bucket, export_path } => {
            run_stats(data, filters, bucket, export_path)
        }
        Command::Ask { question, data, filters, context_budget } => {
            let cfg = config::load_config(&cli.config)?;
            run_ask(cfg, data, question, filters, context_budget).await
        }
    }
}
