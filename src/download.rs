use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::domain::AssemblyAccession;
use crate::error::PipelineError;
use crate::ftp::RemoteDirectory;

/// `GCA_x_sequence_report.txt` becomes `GCA_x_sequence_report_<millis>.txt`.
pub fn timestamped_name(basename: &str, at: DateTime<Utc>) -> String {
    let millis = at.timestamp_millis();
    match basename.strip_suffix(".txt") {
        Some(stem) => format!("{}_{}.txt", stem, millis),
        None => format!("{}_{}", basename, millis),
    }
}

/// Pulls the located report into the run directory without clobbering earlier downloads.
pub struct ReportFetcher<'a> {
    remote: &'a dyn RemoteDirectory,
    local_dir: PathBuf,
}

impl<'a> ReportFetcher<'a> {
    pub fn new(remote: &'a dyn RemoteDirectory, local_dir: impl Into<PathBuf>) -> Self {
        Self {
            remote,
            local_dir: local_dir.into(),
        }
    }

    pub async fn fetch(
        &self,
        assembly: &AssemblyAccession,
        remote_path: &str,
    ) -> Result<PathBuf, PipelineError> {
        tokio::fs::create_dir_all(&self.local_dir)
            .await
            .map_err(|e| {
                PipelineError::Transport(format!(
                    "cannot create {}: {}",
                    self.local_dir.display(),
                    e
                ))
            })?;

        let local_path = self.unused_path(&assembly.report_basename()).await;
        info!("📥 Downloading {} -> {}", remote_path, local_path.display());
        self.remote.download(remote_path, &local_path).await?;
        info!("✅ Sequence report saved: {}", local_path.display());
        Ok(local_path)
    }

    async fn unused_path(&self, basename: &str) -> PathBuf {
        let mut at = Utc::now();
        loop {
            let candidate = self.local_dir.join(timestamped_name(basename, at));
            if !exists(&candidate).await {
                return candidate;
            }
            // same millisecond as an earlier run
            at += chrono::Duration::milliseconds(1);
        }
    }
}

async fn exists(path: &Path) -> bool {
    tokio::fs::metadata(path).await.is_ok()
}
