//! Language-model analysis of award metadata and crawled content
//!
//! Long inputs are split into overlapping character windows and each window
//! is sent as its own completion, concurrently. Every completion is retried
//! and every attempt is bounded by a hard timeout.
//!
//! Failures never escape this module: structured calls return
//! [`AnalysisFailure`] and the scoring helpers turn that into a low-risk
//! default, free-text calls fall back to an empty string.

use std::{
    fmt::Write as _,
    sync::{Arc, LazyLock},
    time::Duration,
};

use fraud_core::{AwardMetadata, FraudError, Transaction};
use futures::future::try_join_all;
use regex::Regex;
use serde::Serialize;
use tracing::{debug, instrument, warn};

use crate::config::ResearchConfig;
use crate::frontier::FollowUp;
use crate::prompts;
use crate::providers::{CompletionRequest, LanguageModel};
use crate::retry::RetryPolicy;
use crate::schema::{AnalysisFailure, InvestigationQuestions, StructuredOutput};
use crate::types::{Analysis, Finding};

pub const NO_TRANSACTIONS: &str = "No transaction data available";
pub const TRANSACTION_ANALYSIS_FAILED: &str = "Transaction analysis failed";

/// Minimum non-whitespace characters for a follow-up question to be kept
const MIN_QUESTION_CHARS: usize = 3;

static BULLET: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^\s*(?:[-•*]+|\d+[.)])\s+(.+?)\s*$").ok());

/// Per-run award context shared by every page assessment
#[derive(Debug, Clone, PartialEq)]
pub struct AwardBrief {
    pub award_id: String,
    pub enriched_context: String,
    pub transaction_analysis: String,
}

pub struct ContentAnalyzer {
    model: Arc<dyn LanguageModel>,
    retry: RetryPolicy,
    call_timeout: Duration,
    chunk_size: usize,
    chunk_overlap: usize,
}

impl ContentAnalyzer {
    pub fn new(model: Arc<dyn LanguageModel>, config: &ResearchConfig) -> Self {
        Self {
            model,
            retry: config.retry_policy(),
            call_timeout: config.model_timeout(),
            chunk_size: config.chunk_size,
            chunk_overlap: config.chunk_overlap,
        }
    }

    /// Free-text analysis; window responses are joined by newline
    pub async fn analyze_text(&self, prompt: &str, context: &str) -> String {
        match self.complete_windows(prompt, context, None).await {
            Ok(parts) => parts.join("\n"),
            Err(failure) => {
                warn!("Text analysis failed: {}", failure);
                String::new()
            }
        }
    }

    /// Structured analysis validated against `T`
    ///
    /// Every window is sent, but only the first window's response is parsed.
    pub async fn analyze_structured<T: StructuredOutput>(
        &self,
        prompt: &str,
        context: &str,
    ) -> Result<T, AnalysisFailure> {
        let system = prompts::structured_system(&T::schema_text());
        let parts = self.complete_windows(prompt, context, Some(system)).await?;
        let first = parts.first().ok_or(AnalysisFailure::MissingJson)?;
        T::parse_response(first)
    }

    async fn complete_windows(
        &self,
        prompt: &str,
        context: &str,
        system: Option<String>,
    ) -> Result<Vec<String>, AnalysisFailure> {
        if context.trim().is_empty() {
            return Err(AnalysisFailure::EmptyContext);
        }

        let chunks = split_into_chunks(context, self.chunk_size, self.chunk_overlap);
        debug!("Analyzing {} chars in {} windows", context.len(), chunks.len());

        try_join_all(chunks.iter().map(|chunk| {
            let user = format!("{}\n\nAnalyze this part of the content:\n{}", prompt, chunk);
            let request = match &system {
                Some(system) => CompletionRequest::json(system.as_str(), user),
                None => CompletionRequest::text(user),
            };
            self.complete_once(request)
        }))
        .await
    }

    async fn complete_once(&self, request: CompletionRequest) -> Result<String, AnalysisFailure> {
        self.retry
            .run("chat completion", || {
                let request = request.clone();
                async move {
                    match tokio::time::timeout(self.call_timeout, self.model.complete(request)).await
                    {
                        Ok(result) => result,
                        Err(_) => Err(FraudError::timeout(
                            "chat completion",
                            self.call_timeout.as_secs(),
                        )),
                    }
                }
            })
            .await
            .map_err(|e| match e {
                FraudError::Timeout { seconds, .. } => AnalysisFailure::Timeout(seconds),
                other => AnalysisFailure::Provider(other.to_string()),
            })
    }

    /// Look for timing anomalies, reversals and unexplained amounts
    #[instrument(skip(self, transactions), fields(count = transactions.len()))]
    pub async fn analyze_transactions(&self, award_id: &str, transactions: &[Transaction]) -> String {
        if transactions.is_empty() {
            return NO_TRANSACTIONS.to_string();
        }

        let history = format_transactions(transactions);
        let analysis = self
            .analyze_text(&prompts::transaction_analysis(award_id), &history)
            .await;
        if analysis.trim().is_empty() {
            TRANSACTION_ANALYSIS_FAILED.to_string()
        } else {
            analysis
        }
    }

    /// Compute the award context once per run
    pub async fn prepare_brief(&self, award_id: &str, metadata: Option<&AwardMetadata>) -> AwardBrief {
        let transactions = metadata.map(|m| m.transactions.as_slice()).unwrap_or_default();
        AwardBrief {
            award_id: award_id.to_string(),
            enriched_context: build_enriched_context(metadata),
            transaction_analysis: self.analyze_transactions(award_id, transactions).await,
        }
    }

    /// Risk-assess one page against the award
    pub async fn score_content(&self, page_content: &str, brief: &AwardBrief) -> Analysis {
        let combined = format!(
            "Award Details:\n{}\n\nRelated Content:\n{}\n\nTransaction Analysis:\n{}",
            brief.enriched_context, page_content, brief.transaction_analysis
        );
        let prompt = prompts::risk_assessment(&brief.award_id, &brief.enriched_context);

        match self.analyze_structured::<Analysis>(&prompt, &combined).await {
            Ok(mut analysis) => {
                analysis
                    .indicators
                    .extend(harvest_bullets(&brief.transaction_analysis));
                let _ = write!(
                    analysis.justification,
                    "\n\nTransaction Analysis:\n{}",
                    brief.transaction_analysis
                );
                analysis
                    .follow_up_questions
                    .retain(|q| is_substantive_question(q));
                analysis
            }
            Err(failure) => {
                warn!("Risk assessment failed for {}: {}", brief.award_id, failure);
                Analysis::no_risk(format!("Analysis process failed: {}", failure))
            }
        }
    }

    /// Search queries suggested by the award metadata alone
    pub async fn investigation_questions(&self, brief: &AwardBrief) -> Vec<FollowUp> {
        let prompt = prompts::investigation_questions(&brief.award_id);
        match self
            .analyze_structured::<InvestigationQuestions>(&prompt, &brief.enriched_context)
            .await
        {
            Ok(parsed) => parsed
                .questions
                .into_iter()
                .filter(|q| is_substantive_question(&q.question))
                .map(|q| FollowUp {
                    question: q.question,
                    priority: q.priority,
                })
                .collect(),
            Err(failure) => {
                warn!("Question generation failed for {}: {}", brief.award_id, failure);
                Vec::new()
            }
        }
    }

    /// Final pass over all findings; `None` when there is nothing usable
    pub async fn summarize(&self, findings: &[Finding]) -> Option<String> {
        if findings.is_empty() {
            return None;
        }

        let digest: Vec<FindingDigest<'_>> = findings.iter().map(FindingDigest::from).collect();
        let serialized = match serde_json::to_string_pretty(&digest) {
            Ok(json) => json,
            Err(e) => {
                warn!("Failed to serialize findings: {}", e);
                return None;
            }
        };

        let summary = self.analyze_text(prompts::SUMMARY, &serialized).await;
        let summary = summary.trim();
        (!summary.is_empty()).then(|| summary.to_string())
    }
}

/// What the summary pass sees of a finding; page bodies are left out
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FindingDigest<'a> {
    source: &'a str,
    relevance_score: f64,
    risk_level: u8,
    indicators: &'a [String],
    justification: &'a str,
}

impl<'a> From<&'a Finding> for FindingDigest<'a> {
    fn from(finding: &'a Finding) -> Self {
        Self {
            source: &finding.source,
            relevance_score: finding.relevance_score,
            risk_level: finding.analysis.risk_level,
            indicators: &finding.analysis.indicators,
            justification: &finding.analysis.justification,
        }
    }
}

/// Overlapping character windows; `overlap` must be smaller than `size`
pub fn split_into_chunks(text: &str, size: usize, overlap: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() || size == 0 {
        return Vec::new();
    }

    let step = size.saturating_sub(overlap).max(1);
    let mut chunks = Vec::new();
    let mut start = 0;
    loop {
        let end = (start + size).min(chars.len());
        chunks.push(chars[start..end].iter().collect());
        if end == chars.len() {
            break;
        }
        start += step;
    }
    chunks
}

/// Deterministic rendering of the award metadata for prompts
pub fn build_enriched_context(metadata: Option<&AwardMetadata>) -> String {
    let Some(metadata) = metadata else {
        return "No award metadata available".to_string();
    };
    let details = &metadata.details;
    let recipient = metadata.recipient();
    let contract = details.latest_transaction_contract_data.as_ref();

    let categories = recipient
        .map(|r| r.business_categories.join(", "))
        .filter(|c| !c.is_empty())
        .unwrap_or_else(|| "None".to_string());
    let recipient_location = recipient
        .and_then(|r| r.location.as_ref())
        .map(|l| l.one_line())
        .filter(|l| !l.is_empty())
        .unwrap_or_else(|| "Unknown".to_string());
    let performance_location = details
        .place_of_performance
        .as_ref()
        .map(|l| l.one_line())
        .filter(|l| !l.is_empty())
        .unwrap_or_else(|| "Unknown".to_string());
    let transactions = if metadata.transactions.is_empty() {
        "None".to_string()
    } else {
        format_transactions(&metadata.transactions)
    };

    format!(
        "AWARD OVERVIEW:
Amount: ${amount}
Date Signed: {date}
Type: {kind}
Description: {description}

RECIPIENT INFORMATION:
Name: {name}
Parent Company: {parent}
Business Categories: {categories}
Location: {recipient_location}

CONTRACT DETAILS:
Competition: {competition}
Number of Offers: {offers}
Pricing Type: {pricing}

TRANSACTION HISTORY:
{transactions}

PERFORMANCE LOCATION:
{performance_location}",
        amount = details.total_obligation.unwrap_or(0.0),
        date = or_unknown(details.date_signed.as_deref()),
        kind = or_unknown(details.type_description.as_deref()),
        description = details
            .description
            .as_deref()
            .filter(|d| !d.trim().is_empty())
            .unwrap_or("No description"),
        name = or_unknown(metadata.recipient_name()),
        parent = metadata.parent_name().unwrap_or("None"),
        competition = or_unknown(contract.and_then(|c| c.extent_competed_description.as_deref())),
        offers = or_unknown(contract.and_then(|c| c.number_of_offers_received.as_deref())),
        pricing = or_unknown(
            contract.and_then(|c| c.type_of_contract_pricing_description.as_deref())
        ),
    )
}

/// One line per transaction: `- <date>: $<amount> - <description>`
pub fn format_transactions(transactions: &[Transaction]) -> String {
    transactions
        .iter()
        .map(|t| {
            format!(
                "- {}: ${} - {}",
                t.action_date.as_deref().unwrap_or("Unknown date"),
                t.federal_action_obligation.unwrap_or(0.0),
                t.description
                    .as_deref()
                    .filter(|d| !d.trim().is_empty())
                    .unwrap_or("No description")
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Bullet and numbered-list items of a free-text analysis
pub fn harvest_bullets(text: &str) -> Vec<String> {
    let Some(bullet) = BULLET.as_ref() else {
        return Vec::new();
    };
    text.lines()
        .filter_map(|line| bullet.captures(line))
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .collect()
}

pub fn is_substantive_question(question: &str) -> bool {
    question.chars().filter(|c| !c.is_whitespace()).count() >= MIN_QUESTION_CHARS
}

fn or_unknown(value: Option<&str>) -> &str {
    value.filter(|v| !v.trim().is_empty()).unwrap_or("Unknown")
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use fraud_core::{ContractData, Recipient};
    use std::sync::atomic::{AtomicU32, Ordering};

    type Reply = dyn Fn(&CompletionRequest) -> Result<String, FraudError> + Send + Sync;

    struct ScriptedModel {
        reply: Box<Reply>,
        delay: Duration,
        calls: AtomicU32,
    }

    impl ScriptedModel {
        fn new(reply: impl Fn(&CompletionRequest) -> Result<String, FraudError> + Send + Sync + 'static) -> Arc<Self> {
            Arc::new(Self {
                reply: Box::new(reply),
                delay: Duration::ZERO,
                calls: AtomicU32::new(0),
            })
        }

        fn slow(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                reply: Box::new(|_| Ok("late".to_string())),
                delay,
                calls: AtomicU32::new(0),
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl LanguageModel for ScriptedModel {
        async fn complete(&self, request: CompletionRequest) -> Result<String, FraudError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            (self.reply)(&request)
        }
    }

    fn config() -> ResearchConfig {
        ResearchConfig {
            max_retries: 0,
            model_timeout_secs: 5,
            ..ResearchConfig::default()
        }
    }

    fn analyzer(model: Arc<ScriptedModel>) -> ContentAnalyzer {
        ContentAnalyzer::new(model, &config())
    }

    fn brief(transaction_analysis: &str) -> AwardBrief {
        AwardBrief {
            award_id: "A1".to_string(),
            enriched_context: "AWARD OVERVIEW".to_string(),
            transaction_analysis: transaction_analysis.to_string(),
        }
    }

    const RISK_3: &str = r#"{
        "initialThoughts": "Single offer",
        "indicators": ["one offer received"],
        "followUpQuestions": ["ACME debarment history", "?", "  a b  "],
        "riskLevel": 3,
        "justification": "Quote: 'one offer'"
    }"#;

    #[test]
    fn test_split_into_chunks_overlaps() {
        let text = "x".repeat(7000);
        let chunks = split_into_chunks(&text, 3000, 500);
        assert_eq!(chunks.iter().map(|c| c.len()).collect::<Vec<_>>(), vec![3000, 3000, 2000]);

        assert_eq!(split_into_chunks("short", 3000, 500), vec!["short"]);
        assert!(split_into_chunks("", 3000, 500).is_empty());
    }

    #[test]
    fn test_split_counts_characters_not_bytes() {
        let chunks = split_into_chunks("ééééé", 3, 1);
        assert_eq!(chunks, vec!["ééé", "ééé"]);
    }

    #[test]
    fn test_harvest_bullets() {
        let text = "Summary\n- End of year spike\n• Reversal on 2023-10-01\n2. Frequent mods\n**Timing**: none\n2023 was quiet";
        assert_eq!(
            harvest_bullets(text),
            vec!["End of year spike", "Reversal on 2023-10-01", "Frequent mods"]
        );
    }

    #[test]
    fn test_enriched_context_defaults() {
        let context = build_enriched_context(Some(&AwardMetadata::default()));
        assert!(context.contains("Amount: $0"));
        assert!(context.contains("Name: Unknown"));
        assert!(context.contains("Parent Company: None"));
        assert!(context.contains("Description: No description"));

        assert_eq!(build_enriched_context(None), "No award metadata available");
    }

    #[test]
    fn test_enriched_context_renders_fields() {
        let mut metadata = AwardMetadata::default();
        metadata.details.total_obligation = Some(1250000.5);
        metadata.details.recipient = Some(Recipient {
            recipient_name: Some("ACME FEDERAL LLC".to_string()),
            business_categories: vec!["small_business".to_string()],
            ..Recipient::default()
        });
        metadata.details.latest_transaction_contract_data = Some(ContractData {
            number_of_offers_received: Some("1".to_string()),
            ..ContractData::default()
        });
        metadata.transactions.push(Transaction {
            action_date: Some("2023-09-29".to_string()),
            federal_action_obligation: Some(-5000.0),
            ..Transaction::default()
        });

        let context = build_enriched_context(Some(&metadata));
        assert!(context.contains("Amount: $1250000.5"));
        assert!(context.contains("Name: ACME FEDERAL LLC"));
        assert!(context.contains("Business Categories: small_business"));
        assert!(context.contains("Number of Offers: 1"));
        assert!(context.contains("- 2023-09-29: $-5000 - No description"));
    }

    #[tokio::test]
    async fn test_empty_context_makes_no_call() {
        let model = ScriptedModel::new(|_| Ok(RISK_3.to_string()));
        let analyzer = analyzer(model.clone());

        let result = analyzer.analyze_structured::<Analysis>("prompt", "   ").await;
        assert_eq!(result, Err(AnalysisFailure::EmptyContext));
        assert_eq!(analyzer.analyze_text("prompt", "").await, "");
        assert_eq!(model.calls(), 0);
    }

    #[tokio::test]
    async fn test_structured_sends_schema_and_every_window() {
        let model = ScriptedModel::new(|request| {
            assert!(request.json);
            assert!(request.system.as_deref().unwrap_or("").contains("riskLevel"));
            Ok(RISK_3.to_string())
        });
        let analyzer = analyzer(model.clone());

        let context = "y".repeat(5000);
        let analysis = analyzer
            .analyze_structured::<Analysis>("prompt", &context)
            .await
            .unwrap();
        assert_eq!(analysis.risk_level, 3);
        assert_eq!(model.calls(), 2);
    }

    #[tokio::test]
    async fn test_text_windows_joined_by_newline() {
        let model = ScriptedModel::new(|request| {
            Ok(if request.user.contains("bbb") { "second" } else { "first" }.to_string())
        });
        let analyzer = analyzer(model);

        let context = format!("{}{}", "a".repeat(3000), "b".repeat(3000));
        assert_eq!(
            analyzer.analyze_text("p", &context).await,
            "first\nsecond\nsecond"
        );
    }

    #[tokio::test]
    async fn test_provider_error_is_absorbed() {
        let model = ScriptedModel::new(|_| Err(FraudError::api("rate limited")));
        let analyzer = analyzer(model);

        assert_eq!(analyzer.analyze_text("p", "content").await, "");
        let result = analyzer.analyze_structured::<Analysis>("p", "content").await;
        assert!(matches!(result, Err(AnalysisFailure::Provider(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_call_timeout() {
        let model = ScriptedModel::slow(Duration::from_secs(60));
        let analyzer = analyzer(model);

        let result = analyzer.analyze_structured::<Analysis>("p", "content").await;
        assert_eq!(result, Err(AnalysisFailure::Timeout(5)));
    }

    #[tokio::test]
    async fn test_score_content_merges_transaction_analysis() {
        let model = ScriptedModel::new(|_| Ok(RISK_3.to_string()));
        let analyzer = analyzer(model);

        let analysis = analyzer
            .score_content("ACME contract A1", &brief("Concerns:\n- Spike in September"))
            .await;
        assert_eq!(analysis.risk_level, 3);
        assert_eq!(analysis.indicators, vec!["one offer received", "Spike in September"]);
        assert!(analysis.justification.ends_with("Transaction Analysis:\nConcerns:\n- Spike in September"));
        assert_eq!(analysis.follow_up_questions, vec!["ACME debarment history"]);
    }

    #[tokio::test]
    async fn test_score_content_failure_is_no_risk() {
        let model = ScriptedModel::new(|_| Ok(r#"{"riskLevel": 9, "justification": "x"}"#.to_string()));
        let analyzer = analyzer(model);

        let analysis = analyzer.score_content("page", &brief(NO_TRANSACTIONS)).await;
        assert_eq!(analysis.risk_level, 1);
        assert!(!analysis.is_finding());
        assert!(analysis.justification.starts_with("Analysis process failed"));
    }

    #[tokio::test]
    async fn test_transaction_analysis_fallbacks() {
        let model = ScriptedModel::new(|_| Err(FraudError::network("down")));
        let analyzer = analyzer(model.clone());

        assert_eq!(analyzer.analyze_transactions("A1", &[]).await, NO_TRANSACTIONS);
        assert_eq!(model.calls(), 0);

        let transactions = vec![Transaction::default()];
        assert_eq!(
            analyzer.analyze_transactions("A1", &transactions).await,
            TRANSACTION_ANALYSIS_FAILED
        );
    }

    #[tokio::test]
    async fn test_investigation_questions_fallback_to_empty() {
        let good = ScriptedModel::new(|_| {
            Ok(r#"{"questions": [{"question": "ACME lawsuit", "priority": 4}, {"question": "?", "priority": 2}]}"#.to_string())
        });
        let questions = analyzer(good).investigation_questions(&brief(NO_TRANSACTIONS)).await;
        assert_eq!(
            questions,
            vec![FollowUp {
                question: "ACME lawsuit".to_string(),
                priority: 4
            }]
        );

        let bad = ScriptedModel::new(|_| Ok("no idea".to_string()));
        assert!(analyzer(bad).investigation_questions(&brief(NO_TRANSACTIONS)).await.is_empty());
    }

    #[tokio::test]
    async fn test_summarize_without_findings_skips_model() {
        let model = ScriptedModel::new(|_| Ok("summary".to_string()));
        let analyzer = analyzer(model.clone());

        assert_eq!(analyzer.summarize(&[]).await, None);
        assert_eq!(model.calls(), 0);
    }
}
