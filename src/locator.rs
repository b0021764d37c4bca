use tracing::info;

use crate::domain::AssemblyAccession;
use crate::error::PipelineError;
use crate::ftp::{join_remote, RemoteDirectory};

/// Finds the one sequence report for an assembly under the remote report root.
pub struct ReportLocator<'a> {
    remote: &'a dyn RemoteDirectory,
    root: String,
}

impl<'a> ReportLocator<'a> {
    pub fn new(remote: &'a dyn RemoteDirectory, root: impl Into<String>) -> Self {
        Self {
            remote,
            root: root.into(),
        }
    }

    /// Full remote path of the report. Zero or several matches are both fatal.
    pub async fn locate(&self, assembly: &AssemblyAccession) -> Result<String, PipelineError> {
        let pattern = assembly.report_pattern()?;
        info!("🌐 Listing {} for {}", self.root, assembly.report_basename());

        let entries = self.remote.list_recursive(&self.root).await?;
        let mut matches: Vec<String> = entries
            .into_iter()
            .filter(|entry| pattern.is_match(entry))
            .collect();

        match matches.len() {
            0 => Err(PipelineError::NotFound {
                root: self.root.clone(),
                pattern: pattern.as_str().to_string(),
            }),
            1 => {
                let path = join_remote(&self.root, &matches.remove(0));
                info!("✅ Sequence report located: {}", path);
                Ok(path)
            }
            _ => Err(PipelineError::Ambiguous {
                root: self.root.clone(),
                pattern: pattern.as_str().to_string(),
                matches,
            }),
        }
    }
}
