use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::config::SearchConfig;

/// Web search collaborator. Returns organic result snippets, best first.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<String>>;
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    organic_results: Vec<OrganicResult>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OrganicResult {
    snippet: Option<String>,
}

impl SearchResponse {
    fn into_snippets(self) -> Result<Vec<String>> {
        // SerpApi reports "no results" as an error string with a 200 status.
        if let Some(error) = self.error {
            if self.organic_results.is_empty() && !error.contains("hasn't returned any results") {
                anyhow::bail!("SerpApi error: {}", error);
            }
        }
        Ok(self
            .organic_results
            .into_iter()
            .filter_map(|r| r.snippet)
            .filter(|s| !s.trim().is_empty())
            .collect())
    }
}

/// SerpApi client
pub struct SerpApiClient {
    client: reqwest::Client,
    config: SearchConfig,
}

impl SerpApiClient {
    pub fn new(config: SearchConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .context("Failed to build SerpApi HTTP client")?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl SearchProvider for SerpApiClient {
    async fn search(&self, query: &str) -> Result<Vec<String>> {
        debug!("SerpApi search: {}", query);

        let response = self
            .client
            .get(&self.config.base_url)
            .query(&[
                ("engine", self.config.engine.as_str()),
                ("q", query),
                ("api_key", self.config.api_key.as_str()),
            ])
            .send()
            .await
            .context("Failed to call SerpApi")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("SerpApi error ({}): {}", status, body);
        }

        let parsed: SearchResponse = response
            .json()
            .await
            .context("Failed to parse SerpApi response")?;

        parsed.into_snippets()
    }
}
