use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use qc_coaching_engine::batch::{self, BatchReport};
use qc_coaching_engine::config::EnginePolicy;
use qc_coaching_engine::models::{SlaInput, WeeklyPoint};
use qc_coaching_engine::{ingest, report, sla, trend};

#[derive(Parser)]
#[command(name = "qc-coaching")]
#[command(about = "QC scoring and coaching plans for call-center agents", long_about = None)]
struct Cli {
    /// Policy tables as JSON; built-in defaults when omitted
    #[arg(long, global = true, env = "QC_POLICY_PATH")]
    policy: Option<PathBuf>,
    /// Log debug output to stderr
    #[arg(long, short, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the default policy as a starting template
    Policy,
    /// Turn a QC evaluation CSV export into a batch input file
    Aggregate {
        #[arg(long)]
        csv: PathBuf,
        #[arg(long, default_value = "batch.json")]
        out: PathBuf,
    },
    /// Score a batch and emit coaching plans as JSON
    Coach {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Score a batch and write a markdown report
    Report {
        #[arg(long)]
        input: PathBuf,
        #[arg(long, default_value = "all centers")]
        title: String,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
    /// Classify one weekly error-rate series
    Trend {
        #[arg(long)]
        input: PathBuf,
    },
    /// Score one SLA metric bundle against a center's SLA config
    Sla {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        center: String,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RunOutput {
    run_id: Uuid,
    generated_at: DateTime<Utc>,
    #[serde(flatten)]
    batch: BatchReport,
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("malformed JSON in {}", path.display()))
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let policy = match &cli.policy {
        Some(path) => ingest::load_policy(path)?,
        None => EnginePolicy::default(),
    };

    match cli.command {
        Commands::Policy => {
            println!("{}", serde_json::to_string_pretty(&policy)?);
        }
        Commands::Aggregate { csv, out } => {
            let batch = ingest::import_qc_csv(&csv)?;
            std::fs::write(&out, serde_json::to_string_pretty(&batch)?)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!(
                "Grouped evaluations for {} agents from {} into {}.",
                batch.agents.len(),
                csv.display(),
                out.display()
            );
        }
        Commands::Coach { input, out } => {
            let batch_input = ingest::load_batch(&input)?;
            let output = RunOutput {
                run_id: Uuid::new_v4(),
                generated_at: Utc::now(),
                batch: batch::run_batch(&batch_input.agents, &policy),
            };
            info!(run_id = %output.run_id, "coaching run finished");
            let json = serde_json::to_string_pretty(&output)?;
            match out {
                Some(path) => {
                    std::fs::write(&path, json)
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    println!("Coaching plans written to {}.", path.display());
                }
                None => println!("{json}"),
            }
        }
        Commands::Report { input, title, out } => {
            let batch_input = ingest::load_batch(&input)?;
            let scored = batch::run_batch(&batch_input.agents, &policy);
            let title = format!("{title}, run {}", Uuid::new_v4());
            std::fs::write(&out, report::build_report(&title, &scored))
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
        Commands::Trend { input } => {
            let series: Vec<WeeklyPoint> = read_json(&input)?;
            let outcome = trend::analyze(&series, &policy.trend)?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        Commands::Sla { input, center } => {
            let metrics: SlaInput = read_json(&input)?;
            let config = policy.sla.for_center(&center)?;
            let result = sla::score(&center, &metrics, config)?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
    }

    Ok(())
}
