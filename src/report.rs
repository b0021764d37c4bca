use csv::ReaderBuilder;
use std::collections::HashSet;
use std::path::Path;
use tracing::{info, warn};

use crate::domain::ChromosomeAccession;
use crate::error::PipelineError;

/// Reads the chromosome accessions out of a downloaded sequence report.
///
/// The report is tab separated with a header row. Only the first column is used, and only it has
/// to be UTF-8; blank values are skipped and a repeated accession keeps its first position.
pub struct ReportParser;

impl ReportParser {
    pub fn chromosome_accessions(path: &Path) -> Result<Vec<ChromosomeAccession>, PipelineError> {
        info!("📄 Reading sequence report: {}", path.display());
        let malformed = |reason: String| PipelineError::MalformedReport {
            path: path.to_path_buf(),
            reason,
        };

        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .delimiter(b'\t')
            .flexible(true)
            .quoting(false)
            .from_path(path)
            .map_err(|e| malformed(e.to_string()))?;

        let mut seen = HashSet::new();
        let mut accessions = Vec::new();
        let mut duplicates = 0usize;
        for result in reader.byte_records() {
            let record = result.map_err(|e| malformed(e.to_string()))?;
            let Some(field) = record.get(0) else { continue };
            let field = std::str::from_utf8(field).map_err(|e| {
                let line = record.position().map_or(0, |p| p.line());
                malformed(format!("accession on line {} is not UTF-8: {}", line, e))
            })?;
            let Some(accession) = ChromosomeAccession::new(field) else {
                continue;
            };
            if seen.insert(accession.clone()) {
                accessions.push(accession);
            } else {
                duplicates += 1;
            }
        }

        if duplicates > 0 {
            warn!("⚠️  Ignored {} duplicate accession rows", duplicates);
        }
        info!("✅ Found {} chromosome accessions", accessions.len());
        Ok(accessions)
    }
}
