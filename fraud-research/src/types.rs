use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const NO_SUMMARY: &str = "No conclusive summary generated";
pub const NO_CONCLUSIONS: &str = "Analysis incomplete";

/// A crawled page, kept only for the duration of one batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    pub url: String,
    pub title: String,
    pub content: String,
    /// Keyword relevance in [0, 1]
    pub relevance_score: f64,
}

/// Structured risk assessment for one page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Analysis {
    #[serde(default)]
    pub initial_thoughts: String,
    #[serde(default)]
    pub indicators: Vec<String>,
    #[serde(default)]
    pub follow_up_questions: Vec<String>,
    /// 1: no concern, 2: minor irregularities, 3: notable red flags,
    /// 4: serious concerns, 5: critical risk indicators
    pub risk_level: u8,
    pub justification: String,
}

impl Analysis {
    /// Analysis recorded when scoring could not produce a valid assessment
    pub fn no_risk(reason: impl Into<String>) -> Self {
        Self {
            initial_thoughts: "Analysis failed".to_string(),
            indicators: Vec::new(),
            follow_up_questions: Vec::new(),
            risk_level: 1,
            justification: reason.into(),
        }
    }

    pub fn is_finding(&self) -> bool {
        self.risk_level > 1
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Finding {
    pub content: String,
    pub source: String,
    pub relevance_score: f64,
    pub analysis: Analysis,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReasoningStep {
    pub timestamp: DateTime<Utc>,
    pub stage: String,
    pub reasoning: String,
    pub evidence: Vec<String>,
    pub confidence: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReasoningChain {
    pub steps: Vec<ReasoningStep>,
    pub final_conclusions: Vec<String>,
}

/// The research report for one award; the unit of caching
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AwardSearchContext {
    pub original_award_id: String,
    pub findings: Vec<Finding>,
    pub reasoning_chain: ReasoningChain,
    #[serde(default)]
    pub summary: String,
}

impl AwardSearchContext {
    pub fn new(award_id: &str) -> Self {
        Self {
            original_award_id: award_id.to_string(),
            findings: Vec::new(),
            reasoning_chain: ReasoningChain::default(),
            summary: String::new(),
        }
    }

    /// Checkpoints are written before summarization, so only a completed
    /// run carries a summary
    pub fn is_complete(&self) -> bool {
        !self.summary.is_empty()
    }

    /// Append a finding together with its audit-trail step
    pub fn record(&mut self, page: &Page, analysis: Analysis) {
        let relevance_score = finding_relevance(analysis.risk_level, page.relevance_score);

        self.reasoning_chain.steps.push(ReasoningStep {
            timestamp: Utc::now(),
            stage: format!("analyzing {}", page.url),
            reasoning: analysis.initial_thoughts.clone(),
            evidence: analysis.indicators.clone(),
            confidence: relevance_score,
        });

        self.findings.push(Finding {
            content: page.content.clone(),
            source: page.url.clone(),
            relevance_score,
            analysis,
        });
    }

    pub fn highest_risk(&self) -> Option<u8> {
        self.findings.iter().map(|f| f.analysis.risk_level).max()
    }
}

/// Finding relevance: risk level scaled by page relevance, in [0, 1]
pub fn finding_relevance(risk_level: u8, page_relevance: f64) -> f64 {
    (f64::from(risk_level) / 5.0 * page_relevance).clamp(0.0, 1.0)
}

/// States of a research run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResearchPhase {
    Init,
    CheckCache,
    Seeding,
    Exploring,
    Summarizing,
    Done,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResearchUpdate {
    PhaseChanged {
        award_id: String,
        phase: ResearchPhase,
    },
    FindingRecorded {
        award_id: String,
        source: String,
        risk_level: u8,
    },
    Completed {
        award_id: String,
        findings: usize,
        cached: bool,
    },
    Failed {
        award_id: String,
        error: String,
    },
}
