use chrono::{DateTime, Utc};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::barrier::{CompletionBarrier, RunStatus};
use crate::config::{Config, FailurePolicy};
use crate::domain::{AssemblyAccession, ChromosomeAccession};
use crate::download::ReportFetcher;
use crate::ena::SequenceSource;
use crate::error::PipelineError;
use crate::ftp::RemoteDirectory;
use crate::locator::ReportLocator;
use crate::report::ReportParser;
use crate::scheduler::FetchScheduler;
use crate::writer::{SequenceWriter, WrittenFile};

pub const SUMMARY_FILE: &str = "run_summary.json";

/// Inputs of one run.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub assembly: AssemblyAccession,
    pub report_root: String,
    pub output_root: PathBuf,
    pub max_concurrent_fetches: usize,
    pub handoff_queue_depth: usize,
    pub fetch_timeout: Duration,
    pub write_timeout: Duration,
    pub policy: FailurePolicy,
    pub show_progress: bool,
}

impl RunSettings {
    pub fn from_config(assembly: AssemblyAccession, output_root: PathBuf, config: &Config) -> Self {
        Self {
            assembly,
            report_root: config.ena_ftp.sequence_report_root.clone(),
            output_root,
            max_concurrent_fetches: config.pipeline.max_concurrent_fetches,
            handoff_queue_depth: config.pipeline.handoff_queue_depth,
            fetch_timeout: config.sequence_api.timeout(),
            write_timeout: config.pipeline.write_timeout(),
            policy: config.pipeline.failure_policy,
            show_progress: true,
        }
    }

    /// FASTA files, the downloaded report and the summary all land here.
    pub fn output_dir(&self) -> PathBuf {
        self.output_root.join(self.assembly.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct FailedAccession {
    pub accession: ChromosomeAccession,
    pub error: String,
}

/// Terminal report of a run.
#[derive(Debug)]
pub struct RunOutcome {
    pub assembly: AssemblyAccession,
    pub status: RunStatus,
    pub output_dir: PathBuf,
    pub report_path: Option<PathBuf>,
    pub expected: usize,
    pub completed: usize,
    pub written: Vec<WrittenFile>,
    /// Fetched or written and failed.
    pub failed: Vec<FailedAccession>,
    /// Request sent or payload queued, then dropped when the run was aborted.
    pub cancelled: Vec<ChromosomeAccession>,
    /// Never started because the run was aborted first.
    pub not_attempted: Vec<ChromosomeAccession>,
    /// Set when the run ended before fan-out.
    pub fatal: Option<PipelineError>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunOutcome {
    pub fn summary(&self) -> serde_json::Value {
        json!({
            "assembly": self.assembly,
            "status": self.status,
            "output_dir": self.output_dir,
            "sequence_report": self.report_path,
            "expected_count": self.expected,
            "completed_count": self.completed,
            "failed_accessions": self.failed.iter().map(|f| json!({
                "accession": f.accession,
                "error": f.error,
            })).collect::<Vec<_>>(),
            "cancelled_after_start": self.cancelled,
            "not_attempted": self.not_attempted,
            "fatal_error": self.fatal.as_ref().map(|e| e.to_string()),
            "written": self.written,
            "started_at": self.started_at,
            "finished_at": self.finished_at,
        })
    }
}

/// Locate → download → parse → fetch → write, for one assembly.
pub struct Pipeline {
    remote: Arc<dyn RemoteDirectory>,
    source: Arc<dyn SequenceSource>,
    settings: RunSettings,
}

impl Pipeline {
    pub fn new(
        remote: Arc<dyn RemoteDirectory>,
        source: Arc<dyn SequenceSource>,
        settings: RunSettings,
    ) -> Self {
        Self {
            remote,
            source,
            settings,
        }
    }

    pub async fn run(&self) -> RunOutcome {
        let started_at = Utc::now();
        let output_dir = self.settings.output_dir();
        info!(
            "🧬 Starting run for {} (policy {:?}, {} workers, queue depth {})",
            self.settings.assembly,
            self.settings.policy,
            self.settings.max_concurrent_fetches,
            self.settings.handoff_queue_depth
        );

        let outcome = match self.prepare(&output_dir).await {
            Ok((report_path, accessions)) => {
                self.fan_out(started_at, &output_dir, report_path, accessions)
                    .await
            }
            Err(err) => {
                error!("❌ Run aborted before fetching: {}", err);
                RunOutcome {
                    assembly: self.settings.assembly.clone(),
                    status: RunStatus::Failed,
                    output_dir: output_dir.clone(),
                    report_path: None,
                    expected: 0,
                    completed: 0,
                    written: Vec::new(),
                    failed: Vec::new(),
                    cancelled: Vec::new(),
                    not_attempted: Vec::new(),
                    fatal: Some(err),
                    started_at,
                    finished_at: Utc::now(),
                }
            }
        };

        write_summary(&outcome).await;
        outcome
    }

    /// The sequential stages. Any error here is fatal for the run.
    async fn prepare(
        &self,
        output_dir: &Path,
    ) -> Result<(PathBuf, Vec<ChromosomeAccession>), PipelineError> {
        let remote_path = ReportLocator::new(self.remote.as_ref(), &self.settings.report_root)
            .locate(&self.settings.assembly)
            .await?;
        let report_path = ReportFetcher::new(self.remote.as_ref(), output_dir)
            .fetch(&self.settings.assembly, &remote_path)
            .await?;
        let parse_path = report_path.clone();
        let accessions =
            tokio::task::spawn_blocking(move || ReportParser::chromosome_accessions(&parse_path))
                .await
                .map_err(|e| PipelineError::MalformedReport {
                    path: report_path.clone(),
                    reason: e.to_string(),
                })??;
        Ok((report_path, accessions))
    }

    async fn fan_out(
        &self,
        started_at: DateTime<Utc>,
        output_dir: &Path,
        report_path: PathBuf,
        accessions: Vec<ChromosomeAccession>,
    ) -> RunOutcome {
        let cancel = CancellationToken::new();
        let (barrier, terminal) = CompletionBarrier::new(
            &accessions,
            self.settings.policy,
            cancel.clone(),
            self.progress_bar(accessions.len() as u64),
        );
        let (tx, rx) = mpsc::channel(self.settings.handoff_queue_depth.max(1));

        let writer = SequenceWriter::new(self.settings.write_timeout);
        let writer = tokio::spawn(writer.run(rx, barrier.clone(), cancel.clone()));
        let scheduler = FetchScheduler::new(
            self.source.clone(),
            self.settings.max_concurrent_fetches,
            self.settings.fetch_timeout,
            output_dir,
        );
        scheduler
            .run(accessions.clone(), tx, barrier.clone(), cancel.clone())
            .await;
        let written = match writer.await {
            Ok(written) => written,
            Err(e) => {
                warn!("Writer task error: {}", e);
                Vec::new()
            }
        };

        // A worker that died without reporting must not leave the barrier waiting forever.
        if !barrier.snapshot().status.is_terminal() {
            for accession in accessions.iter().filter(|a| !barrier.is_settled(a)) {
                barrier.record_failed(
                    accession,
                    &PipelineError::fetch(accession.as_str(), "worker exited without a result"),
                );
            }
        }
        let status = terminal.await.unwrap_or(RunStatus::Failed);
        cancel.cancel();

        let state = barrier.snapshot();
        let cancelled = state.cancelled.iter().cloned().collect::<Vec<_>>();
        let not_attempted = accessions
            .iter()
            .filter(|a| !barrier.is_settled(a) && !state.cancelled.contains(*a))
            .cloned()
            .collect::<Vec<_>>();
        let failed = state
            .failed_accessions
            .iter()
            .map(|(accession, error)| FailedAccession {
                accession: accession.clone(),
                error: error.clone(),
            })
            .collect::<Vec<_>>();

        match status {
            RunStatus::Completed => info!(
                "🎉 All {} chromosome FASTA files written to {}",
                state.completed_count,
                output_dir.display()
            ),
            RunStatus::CompletedWithFailures => warn!(
                "⚠️  Completed with failures: {}/{} written, failed: {}",
                state.completed_count,
                state.expected_count,
                join_accessions(failed.iter().map(|f| &f.accession))
            ),
            _ => error!(
                "❌ Run failed: {} failed, {} cancelled after start, {} not attempted",
                failed.len(),
                cancelled.len(),
                not_attempted.len()
            ),
        }

        RunOutcome {
            assembly: self.settings.assembly.clone(),
            status,
            output_dir: output_dir.to_path_buf(),
            report_path: Some(report_path),
            expected: state.expected_count,
            completed: state.completed_count,
            written,
            failed,
            cancelled,
            not_attempted,
            fatal: None,
            started_at,
            finished_at: Utc::now(),
        }
    }

    fn progress_bar(&self, len: u64) -> ProgressBar {
        if !self.settings.show_progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(len);
        match ProgressStyle::with_template("[{prefix}] {bar:40.cyan/blue} {pos}/{len} {msg}") {
            Ok(style) => pb.set_style(style.progress_chars("##-")),
            Err(e) => warn!("Progress bar template rejected: {}", e),
        }
        pb.set_prefix(self.settings.assembly.to_string());
        pb
    }
}

fn join_accessions<'a>(accessions: impl Iterator<Item = &'a ChromosomeAccession>) -> String {
    accessions.map(|a| a.as_str()).collect::<Vec<_>>().join(", ")
}

async fn write_summary(outcome: &RunOutcome) {
    if tokio::fs::metadata(&outcome.output_dir).await.is_err() {
        return;
    }
    let path = outcome.output_dir.join(SUMMARY_FILE);
    let body = match serde_json::to_vec_pretty(&outcome.summary()) {
        Ok(body) => body,
        Err(e) => {
            warn!("⚠️  Could not serialize run summary: {}", e);
            return;
        }
    };
    match tokio::fs::write(&path, body).await {
        Ok(()) => info!("📝 Run summary written: {}", path.display()),
        Err(e) => warn!("⚠️  Could not write {}: {}", path.display(), e),
    }
}
