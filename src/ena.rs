use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use reqwest::Client;

use crate::config::SequenceApiSettings;
use crate::domain::ChromosomeAccession;
use crate::error::PipelineError;

/// Remote API that returns one chromosome's FASTA text.
#[async_trait]
pub trait SequenceSource: Send + Sync {
    async fn fetch(&self, accession: &ChromosomeAccession) -> Result<Bytes, PipelineError>;
}

/// ENA browser API over HTTPS. One GET per accession, no retries.
pub struct EnaBrowserClient {
    client: Client,
    url_template: String,
}

impl EnaBrowserClient {
    pub fn new(settings: &SequenceApiSettings) -> Result<Self, PipelineError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("ENAFastaDownload/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|e| PipelineError::Config(e.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(settings.timeout())
            .build()
            .map_err(|e| PipelineError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            url_template: settings.url_template.clone(),
        })
    }

    pub fn url_for(&self, accession: &ChromosomeAccession) -> String {
        sequence_url(&self.url_template, accession)
    }
}

pub fn sequence_url(template: &str, accession: &ChromosomeAccession) -> String {
    template.replace("{accession}", accession.as_str())
}

#[async_trait]
impl SequenceSource for EnaBrowserClient {
    async fn fetch(&self, accession: &ChromosomeAccession) -> Result<Bytes, PipelineError> {
        let url = self.url_for(accession);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| PipelineError::fetch(accession.as_str(), e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::fetch(
                accession.as_str(),
                format!("HTTP {} from {}", status, url),
            ));
        }
        response
            .bytes()
            .await
            .map_err(|e| PipelineError::fetch(accession.as_str(), e))
    }
}
