use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

use crate::error::PipelineError;

pub const DEFAULT_FASTA_URL: &str = "https://www.ebi.ac.uk/ena/data/view/{accession}&display=fasta";

/// What a per-chromosome failure does to the rest of the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// First failed accession ends the run as `Failed` and cancels outstanding work.
    AbortFirst,
    /// Keep going; failures are reported in the terminal status.
    #[default]
    BestEffort,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub ena_ftp: FtpSettings,
    pub sequence_api: SequenceApiSettings,
    pub pipeline: PipelineSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FtpSettings {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub sequence_report_root: String,
    pub timeout_secs: u64,
}

impl Default for FtpSettings {
    fn default() -> Self {
        Self {
            host: "ftp.ebi.ac.uk".into(),
            port: 21,
            username: "anonymous".into(),
            password: String::new(),
            sequence_report_root: "/pub/databases/ena/assembly".into(),
            timeout_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SequenceApiSettings {
    pub url_template: String,
    pub timeout_secs: u64,
}

impl Default for SequenceApiSettings {
    fn default() -> Self {
        Self {
            url_template: DEFAULT_FASTA_URL.into(),
            timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    pub max_concurrent_fetches: usize,
    pub handoff_queue_depth: usize,
    pub write_timeout_secs: u64,
    pub failure_policy: FailurePolicy,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            max_concurrent_fetches: 5,
            handoff_queue_depth: 15,
            write_timeout_secs: 30,
            failure_policy: FailurePolicy::BestEffort,
        }
    }
}

impl PipelineSettings {
    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }
}

impl SequenceApiSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl FtpSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Config {
    pub fn from_yaml(content: &str) -> Result<Self, PipelineError> {
        let config: Config =
            serde_yaml::from_str(content).map_err(|e| PipelineError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads the YAML file if present, otherwise falls back to built-in defaults.
    pub fn load(yaml_path: &Path) -> Result<Self, PipelineError> {
        if !yaml_path.exists() {
            warn!(
                "⚠️  Configuration file not found: {}, using defaults",
                yaml_path.display()
            );
            return Ok(Config::default());
        }
        info!("⚙️  Loading configuration from: {}", yaml_path.display());
        let content = std::fs::read_to_string(yaml_path).map_err(|e| {
            PipelineError::Config(format!("cannot read {}: {}", yaml_path.display(), e))
        })?;
        let config = Self::from_yaml(&content)?;
        info!("✅ Configuration loaded successfully");
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.ena_ftp.host.trim().is_empty() {
            return Err(PipelineError::Config("ena_ftp.host must not be empty".into()));
        }
        if self.ena_ftp.port == 0 {
            return Err(PipelineError::Config("ena_ftp.port must be at least 1".into()));
        }
        if self.ena_ftp.sequence_report_root.trim().is_empty() {
            return Err(PipelineError::Config(
                "ena_ftp.sequence_report_root must not be empty".into(),
            ));
        }
        if !self.sequence_api.url_template.contains("{accession}") {
            return Err(PipelineError::Config(
                "sequence_api.url_template must contain {accession}".into(),
            ));
        }
        if self.pipeline.max_concurrent_fetches == 0 {
            return Err(PipelineError::Config(
                "pipeline.max_concurrent_fetches must be at least 1".into(),
            ));
        }
        if self.pipeline.handoff_queue_depth == 0 {
            return Err(PipelineError::Config(
                "pipeline.handoff_queue_depth must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
