//! Research job management
//!
//! Wraps the orchestrator in jobs that can be started, executed in the
//! background and polled, and relays orchestrator progress to subscribers.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use fraud_core::{AwardMetadata, FraudError};
use fraud_research::{AwardSearchContext, ResearchOrchestrator, ResearchPhase, ResearchUpdate};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, RwLock};
use tracing::{info, instrument, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResearchStatus {
    Pending,
    CheckingCache,
    Seeding,
    Exploring,
    Summarizing,
    Completed,
    Failed,
}

impl ResearchStatus {
    fn from_phase(phase: ResearchPhase) -> Option<Self> {
        match phase {
            ResearchPhase::Init | ResearchPhase::CheckCache => Some(Self::CheckingCache),
            ResearchPhase::Seeding => Some(Self::Seeding),
            ResearchPhase::Exploring => Some(Self::Exploring),
            ResearchPhase::Summarizing => Some(Self::Summarizing),
            // Terminal states are set from the run's result
            ResearchPhase::Done | ResearchPhase::Failed => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchJob {
    pub id: String,
    pub award_id: String,
    pub status: ResearchStatus,
    /// Findings recorded so far in the running exploration
    pub findings: usize,
    pub report: Option<AwardSearchContext>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub cached: bool,
}

impl ResearchJob {
    pub fn new(award_id: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            award_id: award_id.to_string(),
            status: ResearchStatus::Pending,
            findings: 0,
            report: None,
            error: None,
            created_at: now,
            updated_at: now,
            cached: false,
        }
    }

    fn completed(mut self, report: AwardSearchContext, cached: bool) -> Self {
        self.status = ResearchStatus::Completed;
        self.findings = report.findings.len();
        self.report = Some(report);
        self.cached = cached;
        self.updated_at = Utc::now();
        self
    }
}

pub struct ResearchService {
    orchestrator: ResearchOrchestrator,
    jobs: RwLock<HashMap<String, ResearchJob>>,
    metadata: RwLock<HashMap<String, AwardMetadata>>,
    update_tx: broadcast::Sender<ResearchUpdate>,
}

impl ResearchService {
    pub fn new(orchestrator: ResearchOrchestrator) -> Self {
        let (update_tx, _) = broadcast::channel(100);
        Self {
            orchestrator: orchestrator.with_updates(update_tx.clone()),
            jobs: RwLock::new(HashMap::new()),
            metadata: RwLock::new(HashMap::new()),
            update_tx,
        }
    }

    /// Subscribe to orchestrator updates for every job
    pub fn subscribe(&self) -> broadcast::Receiver<ResearchUpdate> {
        self.update_tx.subscribe()
    }

    pub async fn is_cached(&self, award_id: &str) -> Result<bool, FraudError> {
        self.orchestrator.reports().is_cached(award_id).await
    }

    /// Create a job for an award
    ///
    /// A completed cached report short-circuits to a `Completed` job;
    /// otherwise the job is `Pending` until `execute_research` runs it.
    #[instrument(skip(self, metadata))]
    pub async fn start_research(
        &self,
        award_id: &str,
        metadata: Option<AwardMetadata>,
    ) -> Result<ResearchJob, FraudError> {
        let mut job = ResearchJob::new(award_id);

        match self.orchestrator.reports().load(award_id).await? {
            Some(report) if report.is_complete() => {
                info!("Returning cached research for award {}", award_id);
                job = job.completed(report, true);
            }
            _ => {
                if let Some(metadata) = metadata {
                    self.metadata.write().await.insert(job.id.clone(), metadata);
                }
            }
        }

        self.jobs.write().await.insert(job.id.clone(), job.clone());
        Ok(job)
    }

    /// Run a pending job to completion
    ///
    /// Research failures are recorded on the job; only an unknown job id is
    /// an error here.
    #[instrument(skip(self))]
    pub async fn execute_research(&self, job_id: &str) -> Result<(), FraudError> {
        let job = self
            .get_job(job_id)
            .await
            .ok_or_else(|| FraudError::not_found(format!("Job not found: {}", job_id)))?;
        if job.status.is_terminal() {
            return Ok(());
        }
        let metadata = self.metadata.write().await.remove(job_id);

        let mut updates = self.update_tx.subscribe();
        let run = self.orchestrator.start(&job.award_id, metadata.as_ref());
        tokio::pin!(run);

        let result = loop {
            tokio::select! {
                result = &mut run => break result,
                Ok(update) = updates.recv() => self.apply_update(job_id, &job.award_id, update).await,
            }
        };

        match result {
            Ok(report) => {
                info!(
                    "Research job {} completed with {} findings",
                    job_id,
                    report.findings.len()
                );
                self.update_job(job_id, |job| {
                    let cached = job.cached;
                    *job = job.clone().completed(report, cached);
                })
                .await;
            }
            Err(e) => {
                warn!("Research job {} failed: {}", job_id, e);
                self.update_job(job_id, |job| {
                    job.status = ResearchStatus::Failed;
                    job.error = Some(e.to_string());
                })
                .await;
            }
        }

        Ok(())
    }

    /// Start and execute in one call, returning the finished job
    pub async fn research(
        &self,
        award_id: &str,
        metadata: Option<AwardMetadata>,
    ) -> Result<ResearchJob, FraudError> {
        let job = self.start_research(award_id, metadata).await?;
        self.execute_research(&job.id).await?;
        self.get_job(&job.id)
            .await
            .ok_or_else(|| FraudError::internal(format!("Job {} disappeared", job.id)))
    }

    async fn apply_update(&self, job_id: &str, award_id: &str, update: ResearchUpdate) {
        match update {
            ResearchUpdate::PhaseChanged {
                award_id: ref id,
                phase,
            } if id == award_id => {
                if let Some(status) = ResearchStatus::from_phase(phase) {
                    self.update_job(job_id, |job| job.status = status).await;
                }
            }
            ResearchUpdate::FindingRecorded { award_id: ref id, .. } if id == award_id => {
                self.update_job(job_id, |job| job.findings += 1).await;
            }
            ResearchUpdate::Completed {
                award_id: ref id,
                cached,
                ..
            } if id == award_id => {
                self.update_job(job_id, |job| job.cached = cached).await;
            }
            _ => {}
        }
    }

    async fn update_job<F>(&self, job_id: &str, apply: F)
    where
        F: FnOnce(&mut ResearchJob),
    {
        let mut jobs = self.jobs.write().await;
        if let Some(job) = jobs.get_mut(job_id) {
            apply(job);
            job.updated_at = Utc::now();
        }
    }

    pub async fn get_job(&self, job_id: &str) -> Option<ResearchJob> {
        self.jobs.read().await.get(job_id).cloned()
    }

    pub async fn list_jobs(&self) -> Vec<ResearchJob> {
        let mut jobs: Vec<ResearchJob> = self.jobs.read().await.values().cloned().collect();
        jobs.sort_by_key(|job| job.created_at);
        jobs
    }
}
