//! Service layer for award fraud research
//!
//! This crate wraps the research orchestrator in pollable jobs, paces
//! search providers shared between runs, and provides a SQLite result
//! store for single-host deployments.

pub mod rate_limiter;
pub mod research_service;
pub mod sqlite_store;

pub use rate_limiter::{RateLimitedSearch, RateLimiter, RateLimiterStats};
pub use research_service::{ResearchJob, ResearchService, ResearchStatus};
pub use sqlite_store::SqliteResultStore;
