use std::path::PathBuf;
use thiserror::Error;

/// Everything that can go wrong between locating a sequence report and the last FASTA write.
///
/// `NotFound`, `Ambiguous`, `Transport` and `MalformedReport` end a run before any chromosome is
/// fetched. `FetchFailure` and `WriteError` are per-accession and only end the run under the
/// abort-first policy.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid assembly accession: {0} (expected GCA_<digits>[.<version>])")]
    InvalidAssembly(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("no entry under {root} matches {pattern}")]
    NotFound { root: String, pattern: String },

    #[error("{} entries under {root} match {pattern}: {}", .matches.len(), .matches.join(", "))]
    Ambiguous {
        root: String,
        pattern: String,
        matches: Vec<String>,
    },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("malformed sequence report {}: {reason}", .path.display())]
    MalformedReport { path: PathBuf, reason: String },

    #[error("fetch failed for {accession}: {reason}")]
    FetchFailure { accession: String, reason: String },

    #[error("write failed for {accession}: {reason}")]
    WriteError { accession: String, reason: String },
}

impl PipelineError {
    pub fn fetch(accession: impl Into<String>, reason: impl ToString) -> Self {
        PipelineError::FetchFailure {
            accession: accession.into(),
            reason: reason.to_string(),
        }
    }

    pub fn write(accession: impl Into<String>, reason: impl ToString) -> Self {
        PipelineError::WriteError {
            accession: accession.into(),
            reason: reason.to_string(),
        }
    }
}
