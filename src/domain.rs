use bytes::Bytes;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use crate::error::PipelineError;

/// GenBank assembly accession, e.g. `GCA_000001405.15`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssemblyAccession(String);

impl AssemblyAccession {
    pub fn parse(raw: &str) -> Result<Self, PipelineError> {
        let trimmed = raw.trim();
        let re = Regex::new(r"^GCA_\d+(\.\d+)?$")
            .map_err(|e| PipelineError::Config(e.to_string()))?;
        if !re.is_match(trimmed) {
            return Err(PipelineError::InvalidAssembly(raw.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn report_basename(&self) -> String {
        format!("{}_sequence_report.txt", self.0)
    }

    /// Matches a listed path that ends in this assembly's report file name.
    pub fn report_pattern(&self) -> Result<Regex, PipelineError> {
        let pattern = format!(r"^[\w/]*{}$", regex::escape(&self.report_basename()));
        Regex::new(&pattern).map_err(|e| PipelineError::Config(e.to_string()))
    }
}

impl fmt::Display for AssemblyAccession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// First-column identifier of a sequence report row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChromosomeAccession(String);

impl ChromosomeAccession {
    /// `None` for blank input.
    pub fn new(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn fasta_file_name(&self) -> String {
        format!("{}.fasta", self.0)
    }

    /// True when the accession can be used as a file name without leaving the output directory.
    pub fn is_path_safe(&self) -> bool {
        !self.0.contains('/') && !self.0.contains('\\') && self.0 != "." && self.0 != ".."
    }
}

impl fmt::Display for ChromosomeAccession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One unit of fan-out work, owned by the worker running it.
#[derive(Debug)]
pub struct FetchTask {
    pub accession: ChromosomeAccession,
    pub target_path: PathBuf,
}

/// A fetched sequence waiting in the hand-off queue.
#[derive(Debug)]
pub struct SequencePayload {
    pub task: FetchTask,
    pub payload: Bytes,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assembly_accession_shape() {
        assert!(AssemblyAccession::parse("GCA_000001405.15").is_ok());
        assert!(AssemblyAccession::parse("GCA_000001405").is_ok());
        assert!(AssemblyAccession::parse(" GCA_000001215.4 ").is_ok());
        for bad in ["GCF_000001405.15", "GCA_", "GCA_12.", "GCA_1.2.3", "", "gca_000001405.15"] {
            assert!(
                matches!(AssemblyAccession::parse(bad), Err(PipelineError::InvalidAssembly(_))),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn report_pattern_requires_whole_basename() {
        let acc = AssemblyAccession::parse("GCA_000001215.4").unwrap();
        let re = acc.report_pattern().unwrap();
        assert!(re.is_match("GCA_000/GCA_000001/GCA_000001215.4_sequence_report.txt"));
        assert!(re.is_match("GCA_000001215.4_sequence_report.txt"));
        // '.' in the accession is literal
        assert!(!re.is_match("GCA_000/GCA_000001215x4_sequence_report.txt"));
        assert!(!re.is_match("GCA_000/GCA_000001215.4_sequence_report.txt.gz"));
        assert!(!re.is_match("GCA_000/XGCA_000001215.4_sequence_report.txt.bak"));
    }

    #[test]
    fn chromosome_accession_rejects_blank() {
        assert!(ChromosomeAccession::new("   ").is_none());
        let acc = ChromosomeAccession::new(" CM000663.2 ").unwrap();
        assert_eq!(acc.as_str(), "CM000663.2");
        assert_eq!(acc.fasta_file_name(), "CM000663.2.fasta");
        assert!(acc.is_path_safe());
        assert!(!ChromosomeAccession::new("../etc").unwrap().is_path_safe());
        assert!(!ChromosomeAccession::new("..").unwrap().is_path_safe());
    }
}
