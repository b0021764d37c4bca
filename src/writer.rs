use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::barrier::CompletionBarrier;
use crate::domain::{ChromosomeAccession, SequencePayload};
use crate::error::PipelineError;

#[derive(Debug, Clone, Serialize)]
pub struct WrittenFile {
    pub accession: ChromosomeAccession,
    pub path: PathBuf,
    pub bytes: u64,
    pub md5: String,
}

/// Single consumer of the hand-off queue. Writes are serialized, so no two writes race on the
/// output directory.
pub struct SequenceWriter {
    write_timeout: Duration,
}

impl SequenceWriter {
    pub fn new(write_timeout: Duration) -> Self {
        Self { write_timeout }
    }

    /// Runs until the queue closes or the run is cancelled; returns what was written.
    pub async fn run(
        self,
        mut queue: mpsc::Receiver<SequencePayload>,
        barrier: Arc<CompletionBarrier>,
        cancel: CancellationToken,
    ) -> Vec<WrittenFile> {
        let mut written = Vec::new();
        loop {
            let item = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                item = queue.recv() => item,
            };
            let Some(item) = item else { break };
            let accession = item.task.accession.clone();
            let partial = partial_path(&item.task.target_path);

            match timeout(self.write_timeout, write_payload(item)).await {
                Ok(Ok(file)) => {
                    debug!(
                        "[{}] wrote {} bytes to {}",
                        accession,
                        file.bytes,
                        file.path.display()
                    );
                    barrier.record_completed(&accession);
                    written.push(file);
                }
                Ok(Err(err)) => barrier.record_failed(&accession, &err),
                Err(_) => {
                    if accession.is_path_safe() {
                        discard_partial(&partial).await;
                    }
                    barrier.record_failed(
                        &accession,
                        &PipelineError::write(
                            accession.as_str(),
                            format!("write stalled for more than {:?}", self.write_timeout),
                        ),
                    );
                }
            }
        }
        // unblock any worker still waiting to hand off
        queue.close();
        while let Ok(item) = queue.try_recv() {
            barrier.record_cancelled(&item.task.accession);
        }
        info!("💾 Writer finished: {} FASTA files written", written.len());
        written
    }
}

/// Writes next to the target and renames over it, so an existing file is replaced whole and a
/// stalled write never leaves a truncated `.fasta` behind.
async fn write_payload(item: SequencePayload) -> Result<WrittenFile, PipelineError> {
    let SequencePayload { task, payload } = item;
    let accession = task.accession;
    if !accession.is_path_safe() {
        return Err(PipelineError::write(
            accession.as_str(),
            "accession is not usable as a file name",
        ));
    }
    let partial = partial_path(&task.target_path);
    let staged = match tokio::fs::write(&partial, &payload).await {
        Ok(()) => tokio::fs::rename(&partial, &task.target_path).await,
        Err(e) => Err(e),
    };
    if let Err(e) = staged {
        discard_partial(&partial).await;
        return Err(PipelineError::write(accession.as_str(), e));
    }

    Ok(WrittenFile {
        md5: format!("{:x}", md5::compute(&payload)),
        bytes: payload.len() as u64,
        path: task.target_path,
        accession,
    })
}

fn partial_path(target: &Path) -> PathBuf {
    target.with_extension("fasta.part")
}

async fn discard_partial(partial: &Path) {
    if let Err(e) = tokio::fs::remove_file(partial).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("⚠️  Could not remove {}: {}", partial.display(), e);
        }
    }
}
