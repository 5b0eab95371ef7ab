//! Firecrawl API client for topic search and site crawling

use std::time::Duration;

use async_trait::async_trait;
use fraud_core::FraudError;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::providers::{
    CrawlOptions, CrawlProvider, CrawlResponse, CrawledDocument, PageFormat, SearchHit,
    SearchProvider,
};

const FIRECRAWL_API_BASE: &str = "https://api.firecrawl.dev";

/// Firecrawl API client
#[derive(Debug, Clone)]
pub struct FirecrawlClient {
    client: Client,
    api_key: String,
    base_url: String,
    poll_interval: Duration,
    max_polls: u32,
}

#[derive(Debug, Serialize)]
pub struct FirecrawlSearchRequest {
    pub query: String,
    pub limit: usize,
}

#[derive(Debug, Deserialize)]
pub struct FirecrawlSearchResponse {
    pub success: bool,
    #[serde(default)]
    pub data: Vec<FirecrawlSearchResult>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FirecrawlSearchResult {
    pub url: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FirecrawlCrawlRequest {
    pub url: String,
    pub limit: usize,
    pub scrape_options: FirecrawlScrapeOptions,
}

#[derive(Debug, Serialize)]
pub struct FirecrawlScrapeOptions {
    pub formats: Vec<PageFormat>,
}

#[derive(Debug, Deserialize)]
pub struct FirecrawlCrawlStarted {
    pub success: bool,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FirecrawlCrawlStatus {
    /// "scraping", "completed", "failed" or "cancelled"
    pub status: String,
    #[serde(default)]
    pub data: Vec<FirecrawlDocument>,
}

#[derive(Debug, Deserialize)]
pub struct FirecrawlDocument {
    pub markdown: Option<String>,
    pub html: Option<String>,
    pub metadata: Option<FirecrawlMetadata>,
}

#[derive(Debug, Deserialize)]
pub struct FirecrawlMetadata {
    pub title: Option<String>,
    #[serde(rename = "sourceURL")]
    pub source_url: Option<String>,
}

impl From<FirecrawlDocument> for CrawledDocument {
    fn from(doc: FirecrawlDocument) -> Self {
        let (url, title) = match doc.metadata {
            Some(meta) => (meta.source_url, meta.title),
            None => (None, None),
        };
        Self {
            url,
            title,
            markdown: doc.markdown,
            html: doc.html,
        }
    }
}

impl FirecrawlClient {
    /// Create a new Firecrawl client
    pub fn new(api_key: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: FIRECRAWL_API_BASE.to_string(),
            poll_interval: Duration::from_secs(2),
            max_polls: 90,
        }
    }

    /// Create a client from FIRECRAWL_API_KEY
    ///
    /// FIRECRAWL_API_URL points the client at a self-hosted instance.
    pub fn from_env() -> Result<Self, FraudError> {
        let api_key = std::env::var("FIRECRAWL_API_KEY")
            .map_err(|_| FraudError::config("FIRECRAWL_API_KEY environment variable not set"))?;
        let client = Self::new(api_key);
        Ok(match std::env::var("FIRECRAWL_API_URL") {
            Ok(base_url) if !base_url.trim().is_empty() => client.with_base_url(&base_url),
            _ => client,
        })
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    async fn post_json<B, R>(&self, path: &str, body: &B) -> Result<R, FraudError>
    where
        B: Serialize + ?Sized,
        R: for<'de> Deserialize<'de>,
    {
        let response = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| FraudError::network(format!("Firecrawl request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(FraudError::api(format!(
                "Firecrawl API error ({}): {}",
                status, body
            )));
        }

        response
            .json()
            .await
            .map_err(|e| FraudError::parse(format!("Failed to parse Firecrawl response: {}", e)))
    }

    async fn crawl_status(&self, id: &str) -> Result<FirecrawlCrawlStatus, FraudError> {
        let response = self
            .client
            .get(format!("{}/v1/crawl/{}", self.base_url, id))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send()
            .await
            .map_err(|e| FraudError::network(format!("Firecrawl status request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(FraudError::api(format!(
                "Firecrawl status error ({}): {}",
                status, body
            )));
        }

        response
            .json()
            .await
            .map_err(|e| FraudError::parse(format!("Failed to parse crawl status: {}", e)))
    }
}

#[async_trait]
impl SearchProvider for FirecrawlClient {
    #[instrument(skip(self))]
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, FraudError> {
        let request = FirecrawlSearchRequest {
            query: query.to_string(),
            limit,
        };

        let response: FirecrawlSearchResponse = self.post_json("/v1/search", &request).await?;
        if !response.success {
            return Err(FraudError::api(
                response
                    .error
                    .unwrap_or_else(|| "Unknown search error".to_string()),
            ));
        }

        debug!("Firecrawl search returned {} results", response.data.len());

        Ok(response
            .data
            .into_iter()
            .filter_map(|r| {
                r.url.map(|url| SearchHit {
                    url,
                    title: r.title.or(r.description),
                })
            })
            .collect())
    }
}

#[async_trait]
impl CrawlProvider for FirecrawlClient {
    #[instrument(skip(self, options))]
    async fn crawl(&self, url: &str, options: &CrawlOptions) -> Result<CrawlResponse, FraudError> {
        let request = FirecrawlCrawlRequest {
            url: url.to_string(),
            limit: options.page_limit,
            scrape_options: FirecrawlScrapeOptions {
                formats: options.formats.clone(),
            },
        };

        let started: FirecrawlCrawlStarted = self.post_json("/v1/crawl", &request).await?;
        let id = match (started.success, started.id) {
            (true, Some(id)) => id,
            _ => {
                debug!(
                    "Firecrawl refused crawl: {}",
                    started.error.as_deref().unwrap_or("no reason given")
                );
                return Ok(CrawlResponse::default());
            }
        };

        for poll in 0..self.max_polls {
            let status = self.crawl_status(&id).await?;
            match status.status.as_str() {
                "completed" => {
                    debug!("Crawl {} completed with {} pages", id, status.data.len());
                    return Ok(CrawlResponse {
                        success: true,
                        pages: status.data.into_iter().map(CrawledDocument::from).collect(),
                    });
                }
                "failed" | "cancelled" => {
                    debug!("Crawl {} ended with status {}", id, status.status);
                    return Ok(CrawlResponse::default());
                }
                other => {
                    debug!("Crawl {} still {} (poll {})", id, other, poll + 1);
                    tokio::time::sleep(self.poll_interval).await;
                }
            }
        }

        Err(FraudError::timeout(
            format!("Firecrawl crawl {}", id),
            self.poll_interval.as_secs() * u64::from(self.max_polls),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crawl_request_shape() {
        let request = FirecrawlCrawlRequest {
            url: "https://oig.example.gov".to_string(),
            limit: 5,
            scrape_options: FirecrawlScrapeOptions {
                formats: CrawlOptions::new(5).formats,
            },
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["limit"], 5);
        assert_eq!(json["scrapeOptions"]["formats"][0], "markdown");
        assert_eq!(json["scrapeOptions"]["formats"][1], "html");
    }

    #[test]
    fn test_parse_crawl_status() {
        let json = r##"
        {
            "status": "completed",
            "total": 1,
            "completed": 1,
            "data": [
                {
                    "markdown": "# Press release",
                    "metadata": { "title": "DOJ", "sourceURL": "https://justice.example.gov/pr" }
                }
            ]
        }
        "##;
        let status: FirecrawlCrawlStatus = serde_json::from_str(json).unwrap();
        let doc = CrawledDocument::from(status.data.into_iter().next().unwrap());
        assert_eq!(doc.url.as_deref(), Some("https://justice.example.gov/pr"));
        assert_eq!(doc.title.as_deref(), Some("DOJ"));
        assert!(doc.html.is_none());
    }

    #[test]
    fn test_parse_search_without_data() {
        let response: FirecrawlSearchResponse =
            serde_json::from_str(r#"{ "success": false, "error": "quota" }"#).unwrap();
        assert!(!response.success);
        assert!(response.data.is_empty());
    }

    #[test]
    fn test_with_base_url_trims_slash() {
        let client = FirecrawlClient::new("key".to_string()).with_base_url("http://localhost:3002/");
        assert_eq!(client.base_url, "http://localhost:3002");
    }
}
