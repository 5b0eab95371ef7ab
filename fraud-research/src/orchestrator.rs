//! Research state machine for a single award
//!
//! ```text
//! Init -> CheckCache -> Seeding -> Exploring -> Summarizing -> Done
//!                 \__________ any store error __________/ -> Failed
//! ```
//!
//! Each round snapshots the unexplored topics, resolves them to URLs one by
//! one, then crawls and scores the URLs in small concurrent batches. Every
//! finding is checkpointed to the store; follow-up questions become topics
//! for the next round. The run stops on the time budget, the URL budget,
//! an exhausted frontier, or a round without new URLs.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use fraud_core::{AwardMetadata, FraudError};
use futures::{future::join_all, stream::FuturesUnordered, StreamExt};
use indexmap::IndexSet;
use parking_lot::Mutex;
use tokio::{sync::broadcast, time::Instant};
use tracing::{debug, error, info, instrument};

use crate::analyzer::{AwardBrief, ContentAnalyzer};
use crate::config::ResearchConfig;
use crate::crawler::CrawlExecutor;
use crate::frontier::{FollowUp, TopicFrontier, MAX_PRIORITY};
use crate::providers::{CrawlProvider, LanguageModel, ResultStore, SearchProvider};
use crate::storage::ReportCache;
use crate::types::{
    Analysis, AwardSearchContext, Page, ResearchPhase, ResearchUpdate, NO_CONCLUSIONS, NO_SUMMARY,
};

/// Why the exploration loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    TimeBudget,
    UrlBudget,
    FrontierExhausted,
    NoNewUrls,
}

/// Mutable state of one run, owned by the orchestrating task
struct ResearchRun {
    frontier: TopicFrontier,
    visited: HashSet<String>,
    context: AwardSearchContext,
    started: Instant,
}

impl ResearchRun {
    fn new(award_id: &str, config: &ResearchConfig) -> Self {
        Self {
            frontier: TopicFrontier::new(config.max_topics),
            visited: HashSet::new(),
            context: AwardSearchContext::new(award_id),
            started: Instant::now(),
        }
    }

    fn stop_reason(&self, config: &ResearchConfig) -> Option<StopReason> {
        if self.started.elapsed() >= config.max_search_time() {
            return Some(StopReason::TimeBudget);
        }
        if self.visited.len() >= config.max_urls {
            return Some(StopReason::UrlBudget);
        }
        let enough_findings = config
            .min_findings_threshold
            .map_or(true, |min| self.context.findings.len() >= min);
        if self.frontier.all_explored() && enough_findings {
            return Some(StopReason::FrontierExhausted);
        }
        None
    }
}

/// Per-award run lock and the number of callers holding or awaiting it
struct Flight {
    lock: Arc<tokio::sync::Mutex<()>>,
    callers: usize,
}

/// A caller's membership in an award's flight
///
/// Dropping it, including when the run future is cancelled, removes the
/// map entry once the last caller leaves.
struct FlightGuard<'a> {
    in_flight: &'a Mutex<HashMap<String, Flight>>,
    award_id: String,
    lock: Arc<tokio::sync::Mutex<()>>,
}

impl<'a> FlightGuard<'a> {
    fn join(in_flight: &'a Mutex<HashMap<String, Flight>>, award_id: &str) -> Self {
        let lock = {
            let mut flights = in_flight.lock();
            let flight = flights.entry(award_id.to_string()).or_insert_with(|| Flight {
                lock: Arc::default(),
                callers: 0,
            });
            flight.callers += 1;
            flight.lock.clone()
        };
        Self {
            in_flight,
            award_id: award_id.to_string(),
            lock,
        }
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        let mut flights = self.in_flight.lock();
        let last = match flights.get_mut(&self.award_id) {
            Some(flight) => {
                flight.callers = flight.callers.saturating_sub(1);
                flight.callers == 0
            }
            None => false,
        };
        if last {
            flights.remove(&self.award_id);
        }
    }
}

pub struct ResearchOrchestrator {
    crawler: CrawlExecutor,
    analyzer: ContentAnalyzer,
    reports: ReportCache,
    config: ResearchConfig,
    in_flight: Mutex<HashMap<String, Flight>>,
    update_tx: Option<broadcast::Sender<ResearchUpdate>>,
}

impl ResearchOrchestrator {
    pub fn new(
        search: Arc<dyn SearchProvider>,
        crawl: Arc<dyn CrawlProvider>,
        model: Arc<dyn LanguageModel>,
        store: Arc<dyn ResultStore>,
        config: ResearchConfig,
    ) -> Self {
        let retry = config.retry_policy();
        Self {
            crawler: CrawlExecutor::new(search, crawl, retry, config.max_pages_per_site),
            analyzer: ContentAnalyzer::new(model, &config),
            reports: ReportCache::new(store, retry),
            config,
            in_flight: Mutex::new(HashMap::new()),
            update_tx: None,
        }
    }

    /// Publish phase changes and findings on `update_tx`
    pub fn with_updates(mut self, update_tx: broadcast::Sender<ResearchUpdate>) -> Self {
        self.update_tx = Some(update_tx);
        self
    }

    pub fn config(&self) -> &ResearchConfig {
        &self.config
    }

    /// Research an award, or return its cached report
    ///
    /// Only store failures surface as errors; every provider failure is
    /// absorbed into the report.
    #[instrument(skip(self, metadata), fields(with_metadata = metadata.is_some()))]
    pub async fn start(
        &self,
        award_id: &str,
        metadata: Option<&AwardMetadata>,
    ) -> Result<AwardSearchContext, FraudError> {
        match self.run(award_id, metadata).await {
            Ok(context) => Ok(context),
            Err(e) => {
                error!("Research failed for award {}: {}", award_id, e);
                self.transition(award_id, ResearchPhase::Failed);
                self.publish(ResearchUpdate::Failed {
                    award_id: award_id.to_string(),
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// Stored reports for every award this orchestrator researches
    pub fn reports(&self) -> &ReportCache {
        &self.reports
    }

    async fn run(
        &self,
        award_id: &str,
        metadata: Option<&AwardMetadata>,
    ) -> Result<AwardSearchContext, FraudError> {
        self.transition(award_id, ResearchPhase::Init);

        self.transition(award_id, ResearchPhase::CheckCache);
        if let Some(context) = self.reports.completed(award_id).await? {
            return Ok(self.cache_hit(context));
        }

        let flight = FlightGuard::join(&self.in_flight, award_id);
        let _turn = flight.lock.lock().await;
        // A run that held the lock before us may have just finished
        match self.reports.completed(award_id).await? {
            Some(context) => Ok(self.cache_hit(context)),
            None => self.research(award_id, metadata).await,
        }
    }

    fn cache_hit(&self, context: AwardSearchContext) -> AwardSearchContext {
        info!(
            "Cache hit for award {} ({} findings)",
            context.original_award_id,
            context.findings.len()
        );
        self.publish(ResearchUpdate::Completed {
            award_id: context.original_award_id.clone(),
            findings: context.findings.len(),
            cached: true,
        });
        context
    }

    async fn research(
        &self,
        award_id: &str,
        metadata: Option<&AwardMetadata>,
    ) -> Result<AwardSearchContext, FraudError> {
        let mut run = ResearchRun::new(award_id, &self.config);

        self.transition(award_id, ResearchPhase::Seeding);
        let brief = self.analyzer.prepare_brief(award_id, metadata).await;
        run.frontier.add_topic(award_id, MAX_PRIORITY);
        if let Some(metadata) = metadata {
            for query in seed_queries(metadata) {
                run.frontier.add_topic(&query, MAX_PRIORITY);
            }
            let questions = self.analyzer.investigation_questions(&brief).await;
            let added = run.frontier.add_questions(questions);
            debug!("Added {} investigation questions", added);
        }
        info!("Seeded {} topics for award {}", run.frontier.len(), award_id);

        self.transition(award_id, ResearchPhase::Exploring);
        let reason = self.explore(&mut run, &brief).await?;
        info!(
            "Exploration stopped ({:?}) after {:.1}s: {} URLs visited, {} findings",
            reason,
            run.started.elapsed().as_secs_f64(),
            run.visited.len(),
            run.context.findings.len()
        );

        self.transition(award_id, ResearchPhase::Summarizing);
        self.summarize(&mut run.context).await;

        self.reports.save(&run.context).await?;
        self.transition(award_id, ResearchPhase::Done);
        self.publish(ResearchUpdate::Completed {
            award_id: award_id.to_string(),
            findings: run.context.findings.len(),
            cached: false,
        });

        Ok(run.context)
    }

    async fn explore(
        &self,
        run: &mut ResearchRun,
        brief: &AwardBrief,
    ) -> Result<StopReason, FraudError> {
        loop {
            if let Some(reason) = run.stop_reason(&self.config) {
                return Ok(reason);
            }

            let topics = run.frontier.unexplored_topics();
            let mut new_urls: IndexSet<String> = IndexSet::new();
            for topic in &topics {
                let urls = self
                    .crawler
                    .search(&topic.query, self.config.max_results_per_query, &run.visited)
                    .await;
                run.frontier.record_urls(&topic.query, urls.iter().cloned());
                run.frontier.mark_explored(&topic.query);
                new_urls.extend(urls);
            }

            if new_urls.is_empty() {
                return Ok(StopReason::NoNewUrls);
            }

            let budget = self.config.max_urls.saturating_sub(run.visited.len());
            let urls: Vec<String> = new_urls.into_iter().take(budget).collect();
            debug!(
                "Round over {} topics yielded {} URLs",
                topics.len(),
                urls.len()
            );

            let mut staged: Vec<FollowUp> = Vec::new();
            for batch in urls.chunks(self.config.url_batch_size.max(1)) {
                run.visited.extend(batch.iter().cloned());

                let mut pending: FuturesUnordered<_> = batch
                    .iter()
                    .map(|url| self.investigate(url, brief))
                    .collect();

                while let Some(assessed) = pending.next().await {
                    for (page, analysis) in assessed {
                        staged.extend(follow_ups(&analysis));
                        if analysis.is_finding() {
                            self.record_finding(&mut run.context, &page, analysis).await?;
                        }
                    }
                }
            }

            let added = run.frontier.add_questions(staged);
            debug!("Merged {} follow-up topics", added);
        }
    }

    /// Crawl one URL and score every retained page concurrently
    async fn investigate(&self, url: &str, brief: &AwardBrief) -> Vec<(Page, Analysis)> {
        let pages = self.crawler.crawl(url, &brief.award_id).await;
        join_all(pages.into_iter().map(|page| async move {
            let analysis = self.analyzer.score_content(&page.content, brief).await;
            (page, analysis)
        }))
        .await
    }

    async fn record_finding(
        &self,
        context: &mut AwardSearchContext,
        page: &Page,
        analysis: Analysis,
    ) -> Result<(), FraudError> {
        let risk_level = analysis.risk_level;
        info!(
            "Finding for award {} at {} (risk {})",
            context.original_award_id, page.url, risk_level
        );
        context.record(page, analysis);
        self.publish(ResearchUpdate::FindingRecorded {
            award_id: context.original_award_id.clone(),
            source: page.url.clone(),
            risk_level,
        });
        self.reports.save(context).await
    }

    async fn summarize(&self, context: &mut AwardSearchContext) {
        match self.analyzer.summarize(&context.findings).await {
            Some(summary) => {
                context.reasoning_chain.final_conclusions = summary
                    .lines()
                    .map(str::trim)
                    .filter(|line| !line.is_empty())
                    .map(String::from)
                    .collect();
                context.summary = summary;
            }
            None => {
                context.summary = NO_SUMMARY.to_string();
                context.reasoning_chain.final_conclusions = vec![NO_CONCLUSIONS.to_string()];
            }
        }
    }

    fn transition(&self, award_id: &str, phase: ResearchPhase) {
        info!(award_id, phase = ?phase, "Research phase changed");
        self.publish(ResearchUpdate::PhaseChanged {
            award_id: award_id.to_string(),
            phase,
        });
    }

    fn publish(&self, update: ResearchUpdate) {
        if let Some(tx) = &self.update_tx {
            // No subscribers is fine
            let _ = tx.send(update);
        }
    }
}

/// Follow-up topics seeded by an analysis, at its risk level
///
/// Applies to every analysis, findings or not; failed analyses carry no
/// questions.
fn follow_ups(analysis: &Analysis) -> impl Iterator<Item = FollowUp> + '_ {
    analysis
        .follow_up_questions
        .iter()
        .map(move |question| FollowUp {
            question: question.clone(),
            priority: analysis.risk_level,
        })
}

/// Investigation topics derived from the award metadata
pub fn seed_queries(metadata: &AwardMetadata) -> Vec<String> {
    let mut queries = Vec::new();
    let name = metadata.recipient_name();

    if let Some(name) = name {
        queries.push(format!("{} fraud", name));
        queries.push(format!("{} investigation", name));
        queries.push(format!("{} lawsuit", name));
        queries.push(format!("{} debarment", name));

        let location = metadata.recipient().and_then(|r| r.location.as_ref());
        if let Some((city, state)) = location.and_then(|l| {
            Some((
                l.city_name.as_deref().filter(|c| !c.trim().is_empty())?,
                l.state_code.as_deref().filter(|s| !s.trim().is_empty())?,
            ))
        }) {
            queries.push(format!("{} {} {} violations", name, city, state));
        }
    }

    for officer in metadata.officer_names() {
        if let Some(name) = name {
            queries.push(format!("{} {} fraud", officer, name));
        }
        queries.push(format!("{} contractor investigation", officer));
    }

    if let Some(parent) = metadata.parent_name() {
        if Some(parent) != name {
            queries.push(format!("{} fraud", parent));
            queries.push(format!("{} subsidiaries investigation", parent));
        }
    }

    if let (Some(industry), Some(name)) = (metadata.industry_description(), name) {
        queries.push(format!("{} {} violations", industry, name));
    }

    queries
}
