//! In-memory collaborators for exercising the pipeline without a network.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::domain::ChromosomeAccession;
use crate::ena::SequenceSource;
use crate::error::PipelineError;
use crate::ftp::RemoteDirectory;

/// Scripted remote tree: a fixed listing plus the content served for full remote paths.
#[derive(Default)]
pub struct MockDirectory {
    entries: Vec<String>,
    files: HashMap<String, Vec<u8>>,
    fail_downloads: bool,
    pub downloads: Mutex<Vec<String>>,
}

impl MockDirectory {
    pub fn new(entries: &[&str]) -> Self {
        Self {
            entries: entries.iter().map(|e| e.to_string()).collect(),
            ..Default::default()
        }
    }

    /// Serves `content` when `remote_path` is downloaded.
    pub fn with_file(mut self, remote_path: &str, content: &str) -> Self {
        self.files
            .insert(remote_path.to_string(), content.as_bytes().to_vec());
        self
    }

    pub fn failing_downloads(mut self) -> Self {
        self.fail_downloads = true;
        self
    }
}

#[async_trait]
impl RemoteDirectory for MockDirectory {
    async fn list_recursive(&self, _root: &str) -> Result<Vec<String>, PipelineError> {
        Ok(self.entries.clone())
    }

    async fn download(&self, remote_path: &str, local_path: &Path) -> Result<(), PipelineError> {
        self.downloads.lock().unwrap().push(remote_path.to_string());
        if self.fail_downloads {
            return Err(PipelineError::Transport("connection refused".into()));
        }
        let content = self
            .files
            .get(remote_path)
            .ok_or_else(|| PipelineError::Transport(format!("550 {}: no such file", remote_path)))?;
        tokio::fs::write(local_path, content)
            .await
            .map_err(|e| PipelineError::Transport(e.to_string()))
    }
}

#[derive(Clone)]
pub enum MockResponse {
    Body { body: String, delay: Duration },
    Status(u16),
    /// Never answers; only a timeout or cancellation ends the call.
    Hang,
}

/// Sequence API double that records how many calls overlap.
#[derive(Default)]
pub struct MockSequenceSource {
    responses: HashMap<String, MockResponse>,
    default_delay: Duration,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    calls: AtomicUsize,
}

impl MockSequenceSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.default_delay = delay;
        self
    }

    pub fn respond(mut self, accession: &str, response: MockResponse) -> Self {
        self.responses.insert(accession.to_string(), response);
        self
    }

    pub fn fasta_for(accession: &str) -> String {
        format!(">ENA|{acc}|{acc} test sequence\nACGTACGTNNACGT\n", acc = accession)
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl SequenceSource for MockSequenceSource {
    async fn fetch(&self, accession: &ChromosomeAccession) -> Result<Bytes, PipelineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        let response = self.responses.get(accession.as_str()).cloned().unwrap_or_else(|| {
            MockResponse::Body {
                body: Self::fasta_for(accession.as_str()),
                delay: self.default_delay,
            }
        });
        match response {
            MockResponse::Body { body, delay } => {
                tokio::time::sleep(delay).await;
                Ok(Bytes::from(body))
            }
            MockResponse::Status(code) => {
                tokio::time::sleep(self.default_delay).await;
                Err(PipelineError::fetch(accession.as_str(), format!("HTTP {}", code)))
            }
            MockResponse::Hang => {
                futures::future::pending::<()>().await;
                Err(PipelineError::fetch(accession.as_str(), "no response"))
            }
        }
    }
}
