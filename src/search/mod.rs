
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::RagError;
use crate::config::SearchConfig;
use crate::deadline::run_blocking;

/// One result from a web search
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SearchHit {
    #[serde(rename = "content")]
    pub text: String,
    #[serde(default)]
    pub score: f32,
    pub url: String,
    #[serde(default)]
    pub title: String,
}

/// Query an external search engine
#[async_trait]
pub trait SearchService: Send + Sync {
    async fn search(&self, query: &str) -> crate::Result<Vec<SearchHit>>;
}

/// Tavily web search over its REST API
#[derive(Debug, Clone)]
pub struct TavilyClient {
    base_url: Url,
    api_key: String,
    max_results: usize,
    agent: ureq::Agent,
}

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    query: &'a str,
    max_results: usize,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    results: Vec<SearchHit>,
}

impl TavilyClient {
    #[inline]
    pub fn new(config: &SearchConfig, api_key: String, timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(&config.base_url)
            .with_context(|| format!("Invalid search URL: {}", config.base_url))?;

        if api_key.trim().is_empty() {
            return Err(anyhow::anyhow!("Search API key is empty"));
        }

        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build()
            .into();

        Ok(Self {
            base_url,
            api_key,
            max_results: config.max_results,
            agent,
        })
    }

    /// Build a client reading the API key from the variable named by `api_key_env`
    #[inline]
    pub fn from_env(config: &SearchConfig, timeout: Duration) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env).with_context(|| {
            format!(
                "Environment variable {} must hold the search API key",
                config.api_key_env
            )
        })?;
        Self::new(config, api_key, timeout)
    }

    /// Blocking search request
    #[inline]
    pub fn search_blocking(&self, query: &str) -> Result<Vec<SearchHit>> {
        let url = self
            .base_url
            .join("/search")
            .context("Failed to build search URL")?;

        let request = SearchRequest {
            query,
            max_results: self.max_results,
        };
        let request_json =
            serde_json::to_string(&request).context("Failed to serialize search request")?;

        debug!("Searching the web for {:?}", query);

        let response_text = self
            .agent
            .post(url.as_str())
            .header("Content-Type", "application/json")
            .header("Authorization", &format!("Bearer {}", self.api_key))
            .send(&request_json)
            .and_then(|mut resp| resp.body_mut().read_to_string())
            .map_err(|e| match e {
                ureq::Error::StatusCode(status) => anyhow::anyhow!("Search failed: HTTP {}", status),
                other => anyhow::anyhow!("Search request failed: {}", other),
            })?;

        let response: SearchResponse =
            serde_json::from_str(&response_text).context("Failed to parse search response")?;

        debug!("Search returned {} hits", response.results.len());
        Ok(response.results)
    }
}

#[async_trait]
impl SearchService for TavilyClient {
    async fn search(&self, query: &str) -> crate::Result<Vec<SearchHit>> {
        let client = self.clone();
        let query = query.to_string();
        run_blocking(move || {
            client
                .search_blocking(&query)
                .map_err(|e| RagError::Search(format!("{e:#}")))
        })
        .await
    }
}
