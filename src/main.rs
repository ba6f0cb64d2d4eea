use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use callsight::io::{write_json, JOURNAL_FILE, REPORT_FILE};
use callsight::models::DeclinedCall;
use callsight::stages::MAX_REPORTED_RAW_CHARS;
use callsight::{
    aggregate_with, build_report, collect_verdicts, parse_transcript_file, read_insights,
    read_journal, render_run, AppConfig, BatchError, BatchRunner, CategorySet, CheckpointManager,
    CheckpointState, Classifier, GroupKey, InsightRecord, LlmClient, Provider, RecordJournal, Transcript,
    TranscriptStore, Validator,
};

#[derive(Parser)]
#[command(name = "callsight")]
#[command(author, version, about = "Call transcript classification and insight aggregation", long_about = None)]
struct Cli {
    /// Config file (TOML); ./callsight.toml is used when present
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// A fixed-seed random sample, no checkpointing, written under <output_dir>/preview
    Sample,
    /// Every transcript, checkpointed and resumable
    Full,
    /// One transcript by call id, written under <output_dir>/preview
    Single,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify transcripts into insight records
    Classify {
        /// Transcript source (CSV, JSON array or JSON lines)
        #[arg(short, long)]
        input: PathBuf,

        #[arg(long, value_enum, default_value = "sample")]
        mode: Mode,

        /// Transcripts to classify in sample mode
        #[arg(long, default_value = "5")]
        sample_size: usize,

        /// Classifications in flight at once
        #[arg(long)]
        concurrency: Option<usize>,

        /// Continue from the saved checkpoint (full mode only)
        #[arg(long)]
        resume: bool,

        #[arg(long)]
        output_dir: Option<PathBuf>,

        #[arg(long)]
        checkpoint_dir: Option<PathBuf>,

        /// Call to classify in single mode
        #[arg(long)]
        call_id: Option<String>,

        #[arg(long, value_enum)]
        provider: Option<Provider>,

        #[arg(long)]
        model: Option<String>,
    },

    /// Group insight records and summarize each group
    Aggregate {
        /// insights.json, insights.jsonl or a JSON array of records
        #[arg(short, long)]
        input: PathBuf,

        #[arg(long, value_enum, default_value = "category")]
        group_by: GroupKey,

        /// Mentions reported per group
        #[arg(long)]
        top_n: Option<usize>,

        /// Write JSON here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Reject records whose call_id is not in this transcript source
        #[arg(long)]
        transcripts: Option<PathBuf>,
    },

    /// Build the full insights report
    Report {
        /// insights.json, insights.jsonl or a JSON array of records
        #[arg(short, long)]
        input: PathBuf,

        #[arg(long)]
        top_n: Option<usize>,

        /// Write JSON here (default: <output_dir>/insights_report.json)
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[arg(long)]
        transcripts: Option<PathBuf>,
    },

    /// List the configured categories
    Categories,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);
    let mut config = AppConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Classify {
            input,
            mode,
            sample_size,
            concurrency,
            resume,
            output_dir,
            checkpoint_dir,
            call_id,
            provider,
            model,
        } => {
            if let Some(concurrency) = concurrency {
                if concurrency == 0 {
                    bail!("--concurrency must be at least 1");
                }
                config.batch.concurrency_limit = concurrency;
            }
            if let Some(dir) = output_dir {
                config.paths.output_dir = dir;
            }
            if let Some(dir) = checkpoint_dir {
                config.paths.checkpoint_dir = dir;
            }
            if let Some(provider) = provider {
                config.llm.provider = provider;
            }
            if let Some(model) = model {
                config.llm.model = model;
            }
            classify(config, &input, mode, sample_size, resume, call_id).await
        }
        Commands::Aggregate {
            input,
            group_by,
            top_n,
            output,
            transcripts,
        } => {
            if let Some(top_n) = top_n {
                config.aggregate.top_n = top_n;
            }
            aggregate_records(&config, &input, group_by, output.as_deref(), transcripts.as_deref())
        }
        Commands::Report {
            input,
            top_n,
            output,
            transcripts,
        } => {
            if let Some(top_n) = top_n {
                config.aggregate.top_n = top_n;
            }
            let output = output.unwrap_or_else(|| config.paths.output_dir.join(REPORT_FILE));
            report(&config, &input, &output, transcripts.as_deref())
        }
        Commands::Categories => list_categories(&config),
    }
}

fn setup_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();
}

/// Only full runs keep a checkpoint to resume from
fn check_resume(mode: Mode, resume: bool) -> Result<()> {
    if resume && mode != Mode::Full {
        bail!("--resume only applies to --mode full");
    }
    Ok(())
}

async fn classify(
    config: AppConfig,
    input: &Path,
    mode: Mode,
    sample_size: usize,
    resume: bool,
    call_id: Option<String>,
) -> Result<()> {
    check_resume(mode, resume)?;
    let checkpointed = mode == Mode::Full;

    info!("Loading transcripts from {:?}", input);
    let store = parse_transcript_file(input).context("Failed to load transcripts")?;
    info!("Loaded {} transcripts", store.len());

    let transcripts: Vec<Transcript> = match mode {
        Mode::Full => store.transcripts().to_vec(),
        Mode::Sample => store.sample(sample_size),
        Mode::Single => {
            let call_id = call_id.context("--call-id is required in single mode")?;
            let transcript = store
                .get(&call_id)
                .with_context(|| format!("No transcript with call_id {call_id}"))?;
            vec![transcript.clone()]
        }
    };

    let categories = config.category_set()?;
    let llm_config = config.llm.clone().with_api_key_from_env()?;
    info!("Using {} via {:?}", llm_config.model, llm_config.provider);
    let client = LlmClient::new(llm_config)?;
    let classifier =
        Arc::new(Classifier::new(client, categories.clone()).with_retry(config.retry.clone()));

    let output_dir = config.paths.run_output_dir(checkpointed);
    let journal_path = output_dir.join(JOURNAL_FILE);
    let mut runner = BatchRunner::new(classifier, config.batch.clone());

    let (state, previous) = if checkpointed {
        let checkpoints = CheckpointManager::new(&config.paths.checkpoint_dir);
        let resumed = if resume {
            let loaded = checkpoints.load().context("Failed to load checkpoint")?;
            if loaded.is_none() {
                warn!("No checkpoint in {:?}, starting a fresh run", config.paths.checkpoint_dir);
            }
            loaded
        } else {
            checkpoints.clear().context("Failed to clear old checkpoint")?;
            None
        };

        let previous = match &resumed {
            Some(state) => {
                info!(
                    "Resuming run {} with {} processed calls",
                    state.run_id,
                    state.processed_count()
                );
                let known = store.call_ids();
                let validator = Validator::new(&categories).with_known_calls(&known);
                read_journal(&journal_path, &validator).context("Failed to read journal")?
            }
            None => Vec::new(),
        };

        let journal = RecordJournal::open(&journal_path, resumed.is_none())
            .context("Failed to open journal")?;
        runner = runner.with_checkpoints(checkpoints).with_journal(journal);
        (resumed.unwrap_or_default(), previous)
    } else {
        let journal = RecordJournal::open(&journal_path, true).context("Failed to open journal")?;
        runner = runner.with_journal(journal);
        (CheckpointState::new(), Vec::new())
    };

    let output = match runner.run(&transcripts, state).await {
        Ok(output) => output,
        Err(BatchError::Persistence {
            source,
            last_durable,
        }) => {
            match &last_durable {
                Some(state) => error!(
                    "Run {} aborted; last durable checkpoint has {} processed calls, rerun with --resume",
                    state.run_id,
                    state.processed_count()
                ),
                None => error!("Run aborted before any checkpoint was written"),
            }
            return Err(source).context("Batch run aborted");
        }
    };

    let (records, declined) = collect_verdicts(store.transcripts(), previous, output.verdicts);
    let rendered = render_run(
        &output_dir,
        output.report.run_id,
        &records,
        &declined,
        &output.report,
        &config.render,
    )?;

    let report = &output.report;
    println!("Classification Run");
    println!("==================");
    println!("Run ID: {}", report.run_id);
    println!("Transcripts: {}", report.total);
    println!("Skipped (already processed): {}", report.skipped);
    println!("Classified: {}", report.succeeded);
    println!("Declined: {}", report.declined);
    println!("Failed: {}", report.failed);
    println!("Elapsed: {:.1}s", report.elapsed_ms as f64 / 1000.0);
    for failure in &report.failed_calls {
        println!("  - {} [{:?}]: {}", failure.call_id, failure.kind, failure.message);
    }
    if report.failed > 0 && checkpointed {
        println!(
            "Failed calls stay unprocessed; rerun with --resume to retry them (raw responses truncated to {} chars in the report)",
            MAX_REPORTED_RAW_CHARS
        );
    }
    println!();
    println!("Insights: {:?}", rendered.insights_path);
    if let Some(csv_path) = &rendered.csv_path {
        println!("CSV: {:?}", csv_path);
    }
    println!("Batch report: {:?}", rendered.report_path);

    Ok(())
}

/// Categories plus the records read through the validator
fn load_records(
    config: &AppConfig,
    input: &Path,
    transcripts: Option<&Path>,
) -> Result<(CategorySet, Vec<InsightRecord>, Vec<DeclinedCall>)> {
    let categories = config.category_set()?;
    let known: Option<HashSet<String>> = transcripts
        .map(|path| parse_transcript_file(path).map(|store: TranscriptStore| store.call_ids()))
        .transpose()
        .context("Failed to load transcripts for call id checks")?;

    let mut validator = Validator::new(&categories);
    if let Some(known) = &known {
        validator = validator.with_known_calls(known);
    }
    let (records, declined) = read_insights(input, &validator)?;
    info!(
        "Loaded {} records and {} declines from {:?}",
        records.len(),
        declined.len(),
        input
    );
    Ok((categories, records, declined))
}

fn aggregate_records(
    config: &AppConfig,
    input: &Path,
    group_by: GroupKey,
    output: Option<&Path>,
    transcripts: Option<&Path>,
) -> Result<()> {
    let (_, records, _) = load_records(config, input, transcripts)?;
    let summary = aggregate_with(&records, group_by, &config.aggregate);
    info!(
        "Aggregated {} records into {} {} groups",
        summary.total_records,
        summary.groups.len(),
        group_by
    );

    match output {
        Some(path) => {
            write_json(path, &summary)?;
            info!("Summary written to {:?}", path);
        }
        None => println!("{}", serde_json::to_string_pretty(&summary)?),
    }
    Ok(())
}

fn report(config: &AppConfig, input: &Path, output: &Path, transcripts: Option<&Path>) -> Result<()> {
    let (categories, records, declined) = load_records(config, input, transcripts)?;
    let report = build_report(
        &records,
        &declined,
        &categories,
        &config.aggregate,
        &config.systemic,
    );
    write_json(output, &report)?;

    println!("Insights Report");
    println!("===============");
    println!("Calls analysed: {}", report.overview.total_calls);
    println!("Declined: {}", report.overview.declined_calls);
    println!("Unique customers: {}", report.overview.unique_customers);
    println!("Unique cities: {}", report.overview.unique_cities);
    if let Some(range) = &report.overview.date_range {
        println!("Date range: {} to {}", range.start, range.end);
    }
    println!("Resolution rate: {:.1}%", report.overview.resolution_rate * 100.0);
    println!();
    println!("Top Categories");
    println!("--------------");
    for share in report.categories.iter().take(5) {
        println!("{:<24} {:>5} ({:.1}%)", share.category, share.count, share.percentage);
    }
    if !report.top_pain_points.is_empty() {
        println!();
        println!("Top Pain Points");
        println!("---------------");
        for pain in report.top_pain_points.iter().take(5) {
            println!("{:>5}  {}", pain.count, pain.phrase);
        }
    }
    if !report.systemic_issues.is_empty() {
        println!();
        println!("Systemic issues: {}", report.systemic_issues.len());
    }
    if !report.recommendations.is_empty() {
        println!();
        println!("Recommendations");
        println!("---------------");
        for rec in &report.recommendations {
            println!("{}. {} (effort {})", rec.priority, rec.issue, rec.effort);
            println!("   {}", rec.action);
        }
    }
    println!();
    println!("Report written to {:?}", output);
    Ok(())
}

fn list_categories(config: &AppConfig) -> Result<()> {
    let categories = config.category_set()?;
    println!("Categories ({})", categories.len());
    println!("==============");
    for def in categories.iter() {
        println!("{:<24} {}", def.code, def.name);
        if !def.description.is_empty() {
            println!("{:<24} {}", "", def.description);
        }
    }
    Ok(())
}
