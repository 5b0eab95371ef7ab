//! Contracts for the external collaborators the engine consumes
//!
//! Concrete adapters live next to this module (`firecrawl`, `exa`,
//! `openai`, `storage`); tests substitute in-process fakes.

use async_trait::async_trait;
use fraud_core::FraudError;
use serde::{Deserialize, Serialize};

/// A single search result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub url: String,
    #[serde(default)]
    pub title: Option<String>,
}

#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, FraudError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageFormat {
    Markdown,
    Html,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlOptions {
    pub page_limit: usize,
    pub formats: Vec<PageFormat>,
}

impl CrawlOptions {
    pub fn new(page_limit: usize) -> Self {
        Self {
            page_limit,
            formats: vec![PageFormat::Markdown, PageFormat::Html],
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CrawledDocument {
    pub url: Option<String>,
    pub title: Option<String>,
    pub markdown: Option<String>,
    pub html: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CrawlResponse {
    pub success: bool,
    pub pages: Vec<CrawledDocument>,
}

#[async_trait]
pub trait CrawlProvider: Send + Sync {
    async fn crawl(&self, url: &str, options: &CrawlOptions) -> Result<CrawlResponse, FraudError>;
}

/// One chat completion request
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system: Option<String>,
    pub user: String,
    pub temperature: f32,
    /// Ask the provider to constrain output to a JSON object
    pub json: bool,
}

impl CompletionRequest {
    pub fn text(user: impl Into<String>) -> Self {
        Self {
            system: None,
            user: user.into(),
            temperature: 0.0,
            json: false,
        }
    }

    pub fn json(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: Some(system.into()),
            user: user.into(),
            temperature: 0.0,
            json: true,
        }
    }
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<String, FraudError>;
}

/// Durable key-value cache for research reports
///
/// Implementations must report unavailability as [`FraudError::Storage`];
/// a missing key is `Ok(None)`.
#[async_trait]
pub trait ResultStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, FraudError>;
    async fn put(&self, key: &str, value: String) -> Result<(), FraudError>;
}
