use chrono::{DateTime, Utc};
use indicatif::ProgressBar;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::FailurePolicy;
use crate::domain::ChromosomeAccession;
use crate::error::PipelineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunStatus {
    Running,
    Completed,
    CompletedWithFailures,
    Failed,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        self != RunStatus::Running
    }
}

/// Counters for one run. Only the barrier mutates it.
#[derive(Debug, Clone, Serialize)]
pub struct RunState {
    pub expected_count: usize,
    pub completed_count: usize,
    pub failed_accessions: BTreeMap<ChromosomeAccession, String>,
    /// Started but dropped by cancellation before settling.
    pub cancelled: BTreeSet<ChromosomeAccession>,
    pub started_at: DateTime<Utc>,
    pub status: RunStatus,
}

struct Inner {
    state: RunState,
    settled: HashSet<ChromosomeAccession>,
    notify: Option<oneshot::Sender<RunStatus>>,
}

/// Fan-in point of a run: counts settled accessions and fires the terminal status once.
pub struct CompletionBarrier {
    policy: FailurePolicy,
    expected: HashSet<ChromosomeAccession>,
    inner: Mutex<Inner>,
    cancel: CancellationToken,
    progress: ProgressBar,
}

impl CompletionBarrier {
    /// The receiver resolves exactly once, with the terminal status. With no accessions it is
    /// already resolved to `Completed`.
    pub fn new(
        accessions: &[ChromosomeAccession],
        policy: FailurePolicy,
        cancel: CancellationToken,
        progress: ProgressBar,
    ) -> (Arc<Self>, oneshot::Receiver<RunStatus>) {
        let (tx, rx) = oneshot::channel();
        let expected: HashSet<_> = accessions.iter().cloned().collect();
        let barrier = Arc::new(Self {
            policy,
            inner: Mutex::new(Inner {
                state: RunState {
                    expected_count: expected.len(),
                    completed_count: 0,
                    failed_accessions: BTreeMap::new(),
                    cancelled: BTreeSet::new(),
                    started_at: Utc::now(),
                    status: RunStatus::Running,
                },
                settled: HashSet::new(),
                notify: Some(tx),
            }),
            expected,
            cancel,
            progress,
        });
        {
            let mut inner = barrier.lock();
            barrier.evaluate(&mut inner);
        }
        (barrier, rx)
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn record_completed(&self, accession: &ChromosomeAccession) {
        let mut inner = self.lock();
        if !self.settle(&mut inner, accession) {
            return;
        }
        inner.state.completed_count += 1;
        debug!(
            "[{}] written ({}/{})",
            accession, inner.state.completed_count, inner.state.expected_count
        );
        self.evaluate(&mut inner);
    }

    pub fn record_failed(&self, accession: &ChromosomeAccession, error: &PipelineError) {
        let mut inner = self.lock();
        if !self.settle(&mut inner, accession) {
            return;
        }
        warn!("❌ [{}] {}", accession, error);
        inner
            .state
            .failed_accessions
            .insert(accession.clone(), error.to_string());
        self.evaluate(&mut inner);
    }

    /// Marks work that had started (request sent or payload queued) when the run was cancelled.
    /// Does not settle the accession and never changes the status.
    pub fn record_cancelled(&self, accession: &ChromosomeAccession) {
        let mut inner = self.lock();
        if !self.expected.contains(accession) || inner.settled.contains(accession) {
            return;
        }
        debug!("[{}] cancelled after start", accession);
        inner.state.cancelled.insert(accession.clone());
    }

    /// False for unknown or already settled accessions, which are ignored.
    fn settle(&self, inner: &mut Inner, accession: &ChromosomeAccession) -> bool {
        if !self.expected.contains(accession) {
            warn!("⚠️  Ignoring outcome for unexpected accession {}", accession);
            return false;
        }
        if !inner.settled.insert(accession.clone()) {
            debug!("[{}] already settled, ignoring repeat outcome", accession);
            return false;
        }
        self.progress.inc(1);
        true
    }

    fn evaluate(&self, inner: &mut Inner) {
        if inner.state.status.is_terminal() {
            return;
        }
        let state = &inner.state;
        let failed = state.failed_accessions.len();
        let next = if state.completed_count == state.expected_count {
            RunStatus::Completed
        } else if failed > 0 && self.policy == FailurePolicy::AbortFirst {
            RunStatus::Failed
        } else if state.completed_count + failed == state.expected_count {
            RunStatus::CompletedWithFailures
        } else {
            return;
        };

        inner.state.status = next;
        match next {
            RunStatus::Failed => {
                warn!("🛑 Aborting run after first failure, cancelling outstanding fetches");
                self.cancel.cancel();
            }
            _ => info!(
                "🏁 Run settled: {}/{} written, {} failed",
                inner.state.completed_count, inner.state.expected_count, failed
            ),
        }
        self.progress.finish_and_clear();
        if let Some(tx) = inner.notify.take() {
            // receiver gone means nobody is waiting anymore
            let _ = tx.send(next);
        }
    }

    pub fn snapshot(&self) -> RunState {
        self.lock().state.clone()
    }

    pub fn is_settled(&self, accession: &ChromosomeAccession) -> bool {
        self.lock().settled.contains(accession)
    }
}
