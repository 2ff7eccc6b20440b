//! quillgrade CLI - grade a writing agent's run against its checklist.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use quillgrade_core::{ExecutionResult, Report};
use quillgrade_execution::{CheckExecutionEngine, EngineConfig, RunInputs, RunMode};
use quillgrade_judge::{Judge, JudgeConfig};
use quillgrade_scoring::ScoringEngine;
use quillgrade_storage::{load_checklist, load_transcript, JsonResultStore, ResultStore, WorkspaceAccessor};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "quillgrade")]
#[command(about = "Checklist grading for long-form writing agents", long_about = None)]
struct Cli {
    /// Debug logging (RUST_LOG still wins)
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run checks and write a scored report
    Grade(GradeArgs),
    /// Re-score an existing report without running checks
    Rescore {
        /// Report or raw result to re-score
        #[arg(long)]
        input: PathBuf,
        /// Where to write; defaults to overwriting the input
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

#[derive(clap::Args)]
struct GradeArgs {
    /// Checklist (JSON object, JSON array or JSONL)
    #[arg(long, visible_alias = "bench")]
    checklist: PathBuf,

    /// Agent transcript
    #[arg(long, visible_alias = "result")]
    transcript: PathBuf,

    /// Agent work directory
    #[arg(long)]
    work_dir: PathBuf,

    /// Judge model
    #[arg(long, env = "QUILLGRADE_MODEL")]
    model: Option<String>,

    /// Judge base URL (OpenAI compatible)
    #[arg(long, env = "QUILLGRADE_BASE_URL")]
    base_url: Option<String>,

    /// Judge API key
    #[arg(long, env = "QUILLGRADE_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Report path
    #[arg(long, default_value = "check_result.json")]
    output: PathBuf,

    /// Prior result to merge into
    #[arg(long)]
    existing_result: Option<PathBuf>,

    /// Only run these checks (ids, positions, check_N)
    #[arg(long, value_delimiter = ',')]
    only_checks: Option<Vec<String>>,

    /// Checks evaluated at once
    #[arg(long, default_value = "1")]
    parallel: usize,

    /// Checklist entry to grade when the file holds several samples
    #[arg(long)]
    sample_id: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Grade(args) => grade(args).await,
        Commands::Rescore { input, output } => rescore(&input, output.as_deref().unwrap_or(&input)).await,
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn grade(args: GradeArgs) -> Result<()> {
    let checklist = load_checklist(&args.checklist, args.sample_id.as_deref())
        .await
        .with_context(|| format!("Failed to read checklist {}", args.checklist.display()))?;
    let transcript = load_transcript(&args.transcript)
        .await
        .with_context(|| format!("Failed to read transcript {}", args.transcript.display()))?;
    let workspace = WorkspaceAccessor::new(&args.work_dir);

    let judge_config = JudgeConfig {
        model: args.model,
        base_url: args.base_url,
        api_key: args.api_key,
        ..JudgeConfig::default()
    };
    let judge = if judge_config.is_complete() {
        let judge = Judge::from_config(judge_config).context("Failed to set up the judge client")?;
        info!("Judge model: {}", judge.model_name());
        Some(Arc::new(judge))
    } else {
        warn!("No judge configured; judged checks use keywords or are skipped");
        None
    };

    let mut store = JsonResultStore::new(&args.output);
    if let Some(prior) = &args.existing_result {
        store = store.with_prior(prior);
    }
    let mode = match (args.only_checks, &args.existing_result) {
        (Some(ids), _) => RunMode::Targeted(ids),
        (None, Some(_)) => RunMode::IncrementalAdd,
        (None, None) => RunMode::Full,
    };

    let mut engine = CheckExecutionEngine::new(store)
        .with_judge(judge)
        .with_config(EngineConfig {
            max_parallel_checks: args.parallel.max(1),
        });

    let cancel = engine.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, finishing the running checks");
            cancel.cancel();
        }
    });

    let inputs = RunInputs {
        checklist: &checklist,
        transcript: &transcript,
        workspace: &workspace,
    };
    let outcome = engine.run(inputs, &mode).await.context("Grading run failed")?;

    if outcome.is_rescore_only() && outcome.result.check_details.is_empty() {
        info!("Nothing to run and no prior results, no report written");
        return Ok(());
    }

    let report = ScoringEngine::new().score(&outcome.result);
    engine
        .storage()
        .save_report(&report)
        .await
        .with_context(|| format!("Failed to write report {}", args.output.display()))?;
    print_summary(&report, outcome.executed.len());
    Ok(())
}

async fn rescore(input: &Path, output: &Path) -> Result<()> {
    let text = tokio::fs::read_to_string(input)
        .await
        .with_context(|| format!("Failed to read {}", input.display()))?;
    let result: ExecutionResult = serde_json::from_str(&text)
        .with_context(|| format!("{} is not a grading result", input.display()))?;

    let report = ScoringEngine::new().score(&result);
    JsonResultStore::new(output)
        .save_report(&report)
        .await
        .with_context(|| format!("Failed to write report {}", output.display()))?;
    print_summary(&report, 0);
    Ok(())
}

fn print_summary(report: &Report, executed: usize) {
    let overall = &report.overall_result;
    println!("Sample {} ({} checks run this time)", report.sample_id, executed);
    println!(
        "  Status: {:?}  total {:.2}  content {:.2}  process {:.2}",
        overall.status, overall.total_score, overall.content_score, overall.process_score
    );
    println!(
        "  Checks: {} passed, {} failed, {} skipped",
        overall.passed_checks, overall.failed_checks, overall.skipped_checks
    );
    if let Some(content) = &report.dimension_scores.content_quality {
        println!("  Content level: {:?}", content.quality_level);
    }
    println!(
        "  Output completeness: {:.2} ({}/{})",
        report.output_completeness.score,
        report.output_completeness.passed,
        report.output_completeness.total
    );
}
