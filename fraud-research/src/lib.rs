//! Iterative fraud research for federal awards
//!
//! Given an award identifier (and optionally its registry metadata), the
//! orchestrator searches the web for related content, crawls promising
//! sites, asks a language model to risk-assess each page, and follows up on
//! the questions raised, within fixed time and URL budgets. Reports are
//! cached and checkpointed in a [`ResultStore`].

pub mod analyzer;
pub mod config;
pub mod crawler;
pub mod exa;
pub mod firecrawl;
pub mod frontier;
pub mod openai;
pub mod orchestrator;
pub mod prompts;
pub mod providers;
pub mod retry;
pub mod schema;
pub mod storage;
pub mod types;

pub use analyzer::{AwardBrief, ContentAnalyzer};
pub use config::ResearchConfig;
pub use crawler::CrawlExecutor;
pub use exa::{ExaClient, ExaSearchRequest, ExaSearchResponse, ExaSearchResult};
pub use firecrawl::FirecrawlClient;
pub use frontier::{FollowUp, Topic, TopicFrontier};
pub use openai::OpenAIClient;
pub use orchestrator::{seed_queries, ResearchOrchestrator, StopReason};
pub use providers::{
    CompletionRequest, CrawlOptions, CrawlProvider, CrawlResponse, CrawledDocument, LanguageModel,
    PageFormat, ResultStore, SearchHit, SearchProvider,
};
pub use retry::RetryPolicy;
pub use schema::{AnalysisFailure, InvestigationQuestion, InvestigationQuestions, StructuredOutput};
pub use storage::{MemoryResultStore, ReportCache, S3ResultStore};
pub use types::{
    Analysis, AwardSearchContext, Finding, Page, ReasoningChain, ReasoningStep, ResearchPhase,
    ResearchUpdate, NO_CONCLUSIONS, NO_SUMMARY,
};
