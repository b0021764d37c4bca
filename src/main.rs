mod barrier;
mod config;
mod domain;
mod download;
mod ena;
mod error;
mod ftp;
mod locator;
mod pipeline;
mod report;
mod scheduler;
#[cfg(test)]
mod testing;
mod writer;

use anyhow::{anyhow, Context, Result};
use chrono::Local;
use clap::Parser;
use std::fs::{self, File};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use crate::barrier::RunStatus;
use crate::config::{Config, FailurePolicy};
use crate::domain::AssemblyAccession;
use crate::ena::EnaBrowserClient;
use crate::ftp::CurlFtp;
use crate::pipeline::{Pipeline, RunSettings};

const VERSION: &str = env!("CARGO_PKG_VERSION");
const SCRIPT_NAME: &str = "ENAFastaDownload";

#[derive(Parser, Debug)]
#[command(author, version = VERSION, about = "Download per-chromosome FASTA files for an ENA assembly", long_about = None)]
struct Args {
    /// Assembly accession, e.g. GCA_000001405.15
    #[arg(short = 'A', long)]
    accession: String,

    /// Local output root; files go to <output>/<accession>/
    #[arg(short, long)]
    output: PathBuf,

    /// Maximum concurrent sequence fetches
    #[arg(short = 'p', long)]
    multithreads: Option<usize>,

    /// Fetched sequences buffered ahead of the writer
    #[arg(short = 'q', long)]
    queue_depth: Option<usize>,

    #[arg(short = 'P', long, value_enum)]
    policy: Option<FailurePolicy>,

    #[arg(short, long, default_value = "ENAFastaDownload.yaml")]
    yaml: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    setup_logging(&args.accession)?;
    print_banner();

    let assembly = AssemblyAccession::parse(&args.accession)?;
    let mut config = Config::load(&args.yaml).context("Failed to load YAML configuration")?;
    apply_overrides(&mut config, &args);
    config.validate().context("Invalid settings")?;

    fs::create_dir_all(&args.output).context("Failed to create output directory")?;
    info!("📁 Output directory: {}", args.output.display());

    let remote = Arc::new(CurlFtp::new(config.ena_ftp.clone())?);
    let source = Arc::new(
        EnaBrowserClient::new(&config.sequence_api).context("Failed to build HTTP client")?,
    );
    let settings = RunSettings::from_config(assembly, args.output.clone(), &config);

    let outcome = Pipeline::new(remote, source, settings).run().await;

    if let Some(fatal) = outcome.fatal {
        return Err(anyhow!(fatal).context("Run aborted before any sequence was fetched"));
    }
    match outcome.status {
        RunStatus::Completed => {
            info!("🎉 {} completed successfully!", SCRIPT_NAME);
            Ok(())
        }
        RunStatus::CompletedWithFailures => {
            for failed in &outcome.failed {
                warn!("  ✗ {}: {}", failed.accession, failed.error);
            }
            Err(anyhow!(
                "{} of {} chromosomes failed",
                outcome.failed.len(),
                outcome.expected
            ))
        }
        _ => Err(anyhow!(
            "run failed: {} failed, {} cancelled after start, {} not attempted",
            outcome.failed.len(),
            outcome.cancelled.len(),
            outcome.not_attempted.len()
        )),
    }
}

fn apply_overrides(config: &mut Config, args: &Args) {
    if let Some(threads) = args.multithreads {
        config.pipeline.max_concurrent_fetches = threads;
    }
    if let Some(depth) = args.queue_depth {
        config.pipeline.handoff_queue_depth = depth;
    }
    if let Some(policy) = args.policy {
        config.pipeline.failure_policy = policy;
    }
}

fn print_banner() {
    println!("\n{}", "=".repeat(60));
    println!("  🧬 {} - ENA chromosome FASTA downloader v{}", SCRIPT_NAME, VERSION);
    println!("{}\n", "=".repeat(60));
}

fn setup_logging(accession: &str) -> Result<()> {
    let timestamp = Local::now().format("%Y-%m-%d_%H-%M-%S");
    // keep odd input from turning into a path
    let tag: String = accession
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '_' { c } else { '-' })
        .collect();
    let log_file = format!("{}_{}_{}.log", SCRIPT_NAME, tag, timestamp);

    let file = File::create(&log_file)?;

    let file_layer = fmt::layer()
        .with_writer(file)
        .with_ansi(false)
        .with_target(false)
        .with_thread_ids(false)
        .with_timer(fmt::time::LocalTime::rfc_3339())
        .compact();

    let stdout_layer = fmt::layer()
        .with_writer(std::io::stdout)
        .with_ansi(true)
        .with_target(false)
        .with_thread_ids(false)
        .with_timer(fmt::time::LocalTime::rfc_3339())
        .compact();

    use tracing_subscriber::layer::SubscriberExt;
    let subscriber = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(file_layer)
        .with(stdout_layer);

    tracing::subscriber::set_global_default(subscriber).context("Failed to set subscriber")?;
    info!("📝 Log file created: {}", log_file);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_overrides_yaml() {
        let args = Args::parse_from([
            SCRIPT_NAME,
            "-A",
            "GCA_000001405.15",
            "-o",
            "/tmp/out",
            "-p",
            "8",
            "--queue-depth",
            "3",
            "--policy",
            "abort-first",
        ]);
        let mut config = Config::default();
        apply_overrides(&mut config, &args);
        assert_eq!(config.pipeline.max_concurrent_fetches, 8);
        assert_eq!(config.pipeline.handoff_queue_depth, 3);
        assert_eq!(config.pipeline.failure_policy, FailurePolicy::AbortFirst);
    }

    #[test]
    fn yaml_values_survive_without_flags() {
        let args = Args::parse_from([SCRIPT_NAME, "-A", "GCA_000001405.15", "-o", "/tmp/out"]);
        let mut config = Config::from_yaml("pipeline:\n  max_concurrent_fetches: 7\n").unwrap();
        apply_overrides(&mut config, &args);
        assert_eq!(config.pipeline.max_concurrent_fetches, 7);
        assert_eq!(config.pipeline.failure_policy, FailurePolicy::BestEffort);
        assert_eq!(args.yaml, PathBuf::from("ENAFastaDownload.yaml"));
    }
}
