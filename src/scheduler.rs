use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::barrier::CompletionBarrier;
use crate::domain::{ChromosomeAccession, FetchTask, SequencePayload};
use crate::ena::SequenceSource;
use crate::error::PipelineError;

/// Fans accessions out to the sequence API with at most `max_concurrent` requests in flight.
///
/// A worker holds its slot until the fetched payload is accepted by the hand-off queue, so a
/// slow writer stalls fetching instead of piling payloads up in memory. Failed fetches go
/// straight to the barrier; nothing is retried.
pub struct FetchScheduler {
    source: Arc<dyn SequenceSource>,
    max_concurrent: usize,
    fetch_timeout: Duration,
    output_dir: PathBuf,
}

impl FetchScheduler {
    pub fn new(
        source: Arc<dyn SequenceSource>,
        max_concurrent: usize,
        fetch_timeout: Duration,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            source,
            max_concurrent: max_concurrent.max(1),
            fetch_timeout,
            output_dir: output_dir.into(),
        }
    }

    /// Returns once every worker has finished or given up on cancellation. Dropping the last
    /// `handoff` sender here is what lets the writer drain and stop.
    pub async fn run(
        &self,
        accessions: Vec<ChromosomeAccession>,
        handoff: mpsc::Sender<SequencePayload>,
        barrier: Arc<CompletionBarrier>,
        cancel: CancellationToken,
    ) {
        info!(
            "🌐 Fetching {} sequences with {} workers...",
            accessions.len(),
            self.max_concurrent
        );
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let mut handles = Vec::with_capacity(accessions.len());

        for accession in accessions {
            let task = FetchTask {
                target_path: self.output_dir.join(accession.fasta_file_name()),
                accession,
            };
            let sem = semaphore.clone();
            let source = self.source.clone();
            let handoff = handoff.clone();
            let barrier = barrier.clone();
            let cancel = cancel.clone();
            let fetch_timeout = self.fetch_timeout;

            handles.push(tokio::spawn(async move {
                let _permit = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return,
                    permit = sem.acquire_owned() => match permit {
                        Ok(permit) => permit,
                        Err(_) => return,
                    },
                };
                debug!("[{}] fetching", task.accession);

                let fetched = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        barrier.record_cancelled(&task.accession);
                        return;
                    }
                    fetched = timeout(fetch_timeout, source.fetch(&task.accession)) => fetched,
                };

                let payload = match fetched {
                    Ok(Ok(payload)) => payload,
                    Ok(Err(err)) => {
                        barrier.record_failed(&task.accession, &err);
                        return;
                    }
                    Err(_) => {
                        let err = PipelineError::fetch(
                            task.accession.as_str(),
                            format!("timed out after {:?}", fetch_timeout),
                        );
                        barrier.record_failed(&task.accession, &err);
                        return;
                    }
                };

                debug!("[{}] fetched {} bytes, queueing", task.accession, payload.len());
                let accession = task.accession.clone();
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => barrier.record_cancelled(&accession),
                    sent = handoff.send(SequencePayload { task, payload }) => {
                        if sent.is_err() {
                            let reason = "writer stopped before accepting payload";
                            barrier.record_failed(
                                &accession,
                                &PipelineError::write(accession.as_str(), reason),
                            );
                        }
                    }
                }
            }));
        }
        drop(handoff);

        for result in futures::future::join_all(handles).await {
            if let Err(e) = result {
                warn!("Fetch worker error: {}", e);
            }
        }
        debug!("all fetch workers finished");
    }
}
