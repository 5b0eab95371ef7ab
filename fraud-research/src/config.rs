//! Research run limits and tuning
//!
//! One immutable [`ResearchConfig`] is handed to the orchestrator at
//! construction; every bound a run enforces comes from here.

use std::{env, str::FromStr, time::Duration};

use fraud_core::FraudError;
use serde::{Deserialize, Serialize};

use crate::retry::RetryPolicy;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchConfig {
    /// Additional attempts after the first failed external call
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_max_results_per_query")]
    pub max_results_per_query: usize,
    #[serde(default = "default_max_pages_per_site")]
    pub max_pages_per_site: usize,
    #[serde(default = "default_max_topics")]
    pub max_topics: usize,
    #[serde(default = "default_max_urls")]
    pub max_urls: usize,
    #[serde(default = "default_max_search_time_secs")]
    pub max_search_time_secs: u64,
    /// When set, an exhausted frontier only stops the run once this many findings exist
    #[serde(default = "default_min_findings_threshold")]
    pub min_findings_threshold: Option<usize>,
    #[serde(default = "default_url_batch_size")]
    pub url_batch_size: usize,
    /// Analysis window size in characters
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_model_timeout_secs")]
    pub model_timeout_secs: u64,
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            max_results_per_query: default_max_results_per_query(),
            max_pages_per_site: default_max_pages_per_site(),
            max_topics: default_max_topics(),
            max_urls: default_max_urls(),
            max_search_time_secs: default_max_search_time_secs(),
            min_findings_threshold: default_min_findings_threshold(),
            url_batch_size: default_url_batch_size(),
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            model: default_model(),
            model_timeout_secs: default_model_timeout_secs(),
        }
    }
}

impl ResearchConfig {
    /// Load configuration from environment variables, falling back to defaults
    ///
    /// Recognized variables (all optional):
    /// - RESEARCH_MAX_RETRIES, RESEARCH_BASE_DELAY_MS, RESEARCH_MAX_DELAY_MS
    /// - RESEARCH_MAX_RESULTS_PER_QUERY, RESEARCH_MAX_PAGES_PER_SITE
    /// - RESEARCH_MAX_TOPICS, RESEARCH_MAX_URLS, RESEARCH_MAX_SEARCH_TIME_SECS
    /// - RESEARCH_MIN_FINDINGS (0 disables the threshold)
    /// - RESEARCH_URL_BATCH_SIZE, RESEARCH_CHUNK_SIZE, RESEARCH_CHUNK_OVERLAP
    /// - RESEARCH_MODEL, RESEARCH_MODEL_TIMEOUT_SECS
    pub fn from_env() -> Result<Self, FraudError> {
        let defaults = Self::default();

        let min_findings = env_parse("RESEARCH_MIN_FINDINGS", 0usize)?;
        let config = Self {
            max_retries: env_parse("RESEARCH_MAX_RETRIES", defaults.max_retries)?,
            base_delay_ms: env_parse("RESEARCH_BASE_DELAY_MS", defaults.base_delay_ms)?,
            max_delay_ms: env_parse("RESEARCH_MAX_DELAY_MS", defaults.max_delay_ms)?,
            max_results_per_query: env_parse(
                "RESEARCH_MAX_RESULTS_PER_QUERY",
                defaults.max_results_per_query,
            )?,
            max_pages_per_site: env_parse(
                "RESEARCH_MAX_PAGES_PER_SITE",
                defaults.max_pages_per_site,
            )?,
            max_topics: env_parse("RESEARCH_MAX_TOPICS", defaults.max_topics)?,
            max_urls: env_parse("RESEARCH_MAX_URLS", defaults.max_urls)?,
            max_search_time_secs: env_parse(
                "RESEARCH_MAX_SEARCH_TIME_SECS",
                defaults.max_search_time_secs,
            )?,
            min_findings_threshold: match env::var("RESEARCH_MIN_FINDINGS") {
                Ok(_) if min_findings == 0 => None,
                Ok(_) => Some(min_findings),
                Err(_) => defaults.min_findings_threshold,
            },
            url_batch_size: env_parse("RESEARCH_URL_BATCH_SIZE", defaults.url_batch_size)?,
            chunk_size: env_parse("RESEARCH_CHUNK_SIZE", defaults.chunk_size)?,
            chunk_overlap: env_parse("RESEARCH_CHUNK_OVERLAP", defaults.chunk_overlap)?,
            model: env::var("RESEARCH_MODEL").unwrap_or(defaults.model),
            model_timeout_secs: env_parse(
                "RESEARCH_MODEL_TIMEOUT_SECS",
                defaults.model_timeout_secs,
            )?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject limits that would make a run loop forever or never start
    pub fn validate(&self) -> Result<(), FraudError> {
        if self.max_topics == 0 {
            return Err(FraudError::config("max_topics must be at least 1"));
        }
        if self.max_urls == 0 {
            return Err(FraudError::config("max_urls must be at least 1"));
        }
        if self.url_batch_size == 0 {
            return Err(FraudError::config("url_batch_size must be at least 1"));
        }
        if self.chunk_size == 0 || self.chunk_overlap >= self.chunk_size {
            return Err(FraudError::config(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_retries,
            Duration::from_millis(self.base_delay_ms),
            Duration::from_millis(self.max_delay_ms),
        )
    }

    pub fn max_search_time(&self) -> Duration {
        Duration::from_secs(self.max_search_time_secs)
    }

    pub fn model_timeout(&self) -> Duration {
        Duration::from_secs(self.model_timeout_secs)
    }
}

fn env_parse<T>(name: &str, default: T) -> Result<T, FraudError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| FraudError::config(format!("Invalid {}={:?}: {}", name, raw, e))),
        Err(_) => Ok(default),
    }
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1_000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_max_results_per_query() -> usize {
    5
}

fn default_max_pages_per_site() -> usize {
    5
}

fn default_max_topics() -> usize {
    15
}

fn default_max_urls() -> usize {
    10
}

fn default_max_search_time_secs() -> u64 {
    20 * 60 // 20 minutes
}

fn default_min_findings_threshold() -> Option<usize> {
    Some(2)
}

fn default_url_batch_size() -> usize {
    3
}

fn default_chunk_size() -> usize {
    3_000
}

fn default_chunk_overlap() -> usize {
    500
}

fn default_model() -> String {
    "gpt-4o".to_string()
}

fn default_model_timeout_secs() -> u64 {
    300
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = ResearchConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_search_time(), Duration::from_secs(1200));
        assert_eq!(config.min_findings_threshold, Some(2));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: ResearchConfig =
            serde_json::from_str(r#"{ "max_urls": 25, "min_findings_threshold": null }"#).unwrap();
        assert_eq!(config.max_urls, 25);
        assert_eq!(config.max_topics, 15);
        assert_eq!(config.min_findings_threshold, None);
    }

    #[test]
    fn test_overlap_must_be_smaller_than_chunk() {
        let config = ResearchConfig {
            chunk_size: 500,
            chunk_overlap: 500,
            ..ResearchConfig::default()
        };
        assert!(matches!(config.validate(), Err(FraudError::Config(_))));
    }

    #[test]
    fn test_zero_url_budget_rejected() {
        let config = ResearchConfig {
            max_urls: 0,
            ..ResearchConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
