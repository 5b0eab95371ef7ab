use async_trait::async_trait;
use fraud_core::FraudError;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::providers::{SearchHit, SearchProvider};

const EXA_API_BASE: &str = "https://api.exa.ai";

/// Exa search, usable in place of Firecrawl for topic resolution
#[derive(Debug, Clone)]
pub struct ExaClient {
    client: Client,
    api_key: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExaSearchRequest {
    pub query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_results: Option<u32>,
    #[serde(rename = "type")]
    pub search_type: String, // "auto", "neural", "fast"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include_domains: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exclude_domains: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExaSearchResponse {
    pub results: Vec<ExaSearchResult>,
    #[serde(default)]
    pub request_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExaSearchResult {
    pub url: String,
    pub title: Option<String>,
    pub id: String,
    pub published_date: Option<String>,
}

impl ExaClient {
    pub fn new() -> Result<Self, FraudError> {
        let api_key = std::env::var("EXA_API_KEY")
            .map_err(|_| FraudError::config("EXA_API_KEY environment variable not set"))?;

        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .map_err(|e| FraudError::network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, api_key })
    }

    #[instrument(skip(self))]
    pub async fn search_raw(&self, request: ExaSearchRequest) -> Result<ExaSearchResponse, FraudError> {
        let url = format!("{}/search", EXA_API_BASE);

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| FraudError::network(format!("Exa API request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(FraudError::api(format!("Exa API error ({}): {}", status, body)));
        }

        response
            .json()
            .await
            .map_err(|e| FraudError::parse(format!("Failed to parse Exa response: {}", e)))
    }
}

/// Build the request used for topic resolution
fn topic_request(query: &str, limit: usize) -> ExaSearchRequest {
    ExaSearchRequest {
        query: query.to_string(),
        num_results: Some(u32::try_from(limit).unwrap_or(u32::MAX)),
        search_type: "auto".to_string(),
        include_domains: None,
        exclude_domains: None,
    }
}

#[async_trait]
impl SearchProvider for ExaClient {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, FraudError> {
        let response = self.search_raw(topic_request(query, limit)).await?;
        Ok(response
            .results
            .into_iter()
            .map(|r| SearchHit {
                url: r.url,
                title: r.title,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_request_shape() {
        let json = serde_json::to_value(topic_request("ACME debarment", 5)).unwrap();
        assert_eq!(json["query"], "ACME debarment");
        assert_eq!(json["numResults"], 5);
        assert_eq!(json["type"], "auto");
        assert!(json.get("includeDomains").is_none());
    }

    #[test]
    fn test_parse_response() {
        let json = r#"
        {
            "requestId": "abc",
            "results": [
                { "url": "https://oig.example.gov/report", "title": "Audit", "id": "1", "publishedDate": null }
            ]
        }
        "#;
        let response: ExaSearchResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.results.len(), 1);
        assert_eq!(response.request_id.as_deref(), Some("abc"));
    }
}
