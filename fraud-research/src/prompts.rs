//! Prompt templates for the content analyzer

/// System message for every structured call; the schema is appended
pub fn structured_system(schema: &str) -> String {
    format!(
        "You must respond with a valid JSON object matching this JSON schema. \
Do not wrap it in prose.\n\n{}",
        schema
    )
}

/// Risk assessment of one page in the context of the award
pub fn risk_assessment(award_id: &str, enriched_context: &str) -> String {
    format!(
        r#"You are a federal contract investigator specializing in fraud detection. Review this award information and related content about award {award_id}.

Consider these specific risk factors:
1. Unusual pricing or competition patterns
2. Shell company indicators
3. Geographic risk factors
4. Contract modification patterns
5. Relationship with other contractors
6. History of performance issues
7. Unusual transaction patterns

Award Context:
{enriched_context}

Your assessment must be evidence-based. For any risk factor you identify, quote the exact text that indicates the risk and explain why it indicates fraud risk, citing specific numbers, dates, or patterns.

Respond with:
- initialThoughts: your initial reasoning, referencing the data
- indicators: specific red flags found, one per entry
- followUpQuestions: targeted search queries that would confirm or refute the red flags
- riskLevel: integer 1-5 where 1 = no significant concerns, 2 = minor irregularities, 3 = notable red flags, 4 = serious concerns, 5 = critical risk indicators
- justification: detailed explanation with quotes and evidence"#
    )
}

/// Dedicated pass over the transaction history
pub fn transaction_analysis(award_id: &str) -> String {
    format!(
        r#"Analyze the following transaction history for award {award_id} for suspicious patterns that might indicate fraud.
Consider:
1. Unusual timing (e.g., end-of-year spikes)
2. Negating transactions or reversals
3. Large, unexplained amounts
4. Frequent modifications

Provide your analysis in a clear, detailed format, listing each concern as a bullet point.
The transaction history follows, one transaction per line."#
    )
}

/// Initial investigation questions derived from award metadata
pub fn investigation_questions(award_id: &str) -> String {
    format!(
        r#"Based on what we know about award {award_id}, generate targeted web search queries for a fraud investigation.
Rate priority 1-5 (5 is highest) based on potential fraud risk and urgency of investigation.
Respond with a JSON object: {{"questions": [{{"question": "...", "priority": 3}}]}}"#
    )
}

pub const SUMMARY: &str =
    "Summarize all findings and provide final conclusions about potential fraud risks. \
Put each conclusion on its own line.";
