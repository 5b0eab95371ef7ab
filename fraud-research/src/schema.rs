//! Structured model output: schema generation, JSON extraction and validation
//!
//! Every structured call resolves to `Result<T, AnalysisFailure>`; callers
//! choose their own default on failure.

use schemars::{schema_for, JsonSchema};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;

use crate::types::Analysis;

/// Why a model call produced no usable output
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnalysisFailure {
    #[error("empty context")]
    EmptyContext,

    #[error("provider error: {0}")]
    Provider(String),

    #[error("model call timed out after {0}s")]
    Timeout(u64),

    #[error("no JSON object in response")]
    MissingJson,

    #[error("response violates schema: {0}")]
    Schema(String),
}

/// Types the model can be asked to produce
pub trait StructuredOutput: JsonSchema + DeserializeOwned {
    /// JSON schema for this type, pretty printed for the prompt
    fn schema_text() -> String {
        let schema = schema_for!(Self);
        serde_json::to_string_pretty(&schema).unwrap_or_default()
    }

    /// Semantic checks serde cannot express (ranges, non-empty fields)
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }

    /// Extract, deserialize and validate a model response
    fn parse_response(content: &str) -> Result<Self, AnalysisFailure>
    where
        Self: Sized,
    {
        let json = extract_json(content).ok_or(AnalysisFailure::MissingJson)?;
        let value: Self =
            serde_json::from_str(json).map_err(|e| AnalysisFailure::Schema(e.to_string()))?;
        value.validate().map_err(AnalysisFailure::Schema)?;
        Ok(value)
    }
}

impl StructuredOutput for Analysis {
    fn validate(&self) -> Result<(), String> {
        if !(1..=5).contains(&self.risk_level) {
            return Err(format!("riskLevel {} outside 1-5", self.risk_level));
        }
        Ok(())
    }
}

/// Investigation questions with priorities, used when only questions are wanted
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct InvestigationQuestions {
    #[serde(default)]
    pub questions: Vec<InvestigationQuestion>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct InvestigationQuestion {
    pub question: String,
    /// 1-5 where 5 is highest priority
    pub priority: u8,
}

impl StructuredOutput for InvestigationQuestions {
    fn validate(&self) -> Result<(), String> {
        match self.questions.iter().find(|q| !(1..=5).contains(&q.priority)) {
            Some(q) => Err(format!("priority {} outside 1-5", q.priority)),
            None => Ok(()),
        }
    }
}

/// Extract JSON from a string that might contain markdown code blocks
pub fn extract_json(content: &str) -> Option<&str> {
    // Try to find JSON in code blocks first
    if let Some(start) = content.find("```json") {
        let start = start + 7;
        if let Some(end) = content[start..].find("```") {
            return Some(content[start..start + end].trim());
        }
    }

    // Try to find raw JSON
    let start = content.find('{')?;
    let end = content.rfind('}')?;
    (end > start).then(|| &content[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_json_from_code_block() {
        let content = "Here you go:\n```json\n{\"questions\": []}\n```\nThanks";
        assert_eq!(extract_json(content), Some("{\"questions\": []}"));
    }

    #[test]
    fn test_extract_raw_json() {
        assert_eq!(extract_json("prefix {\"a\": {\"b\": 1}} suffix"), Some("{\"a\": {\"b\": 1}}"));
        assert_eq!(extract_json("no json at all"), None);
        assert_eq!(extract_json("} backwards {"), None);
    }

    #[test]
    fn test_parse_valid_analysis() {
        let content = r#"{
            "initialThoughts": "Sole-source award",
            "indicators": ["single offer"],
            "followUpQuestions": ["Who approved the J&A?"],
            "riskLevel": 3,
            "justification": "Quote: 'one offer received'"
        }"#;
        let analysis = Analysis::parse_response(content).unwrap();
        assert_eq!(analysis.risk_level, 3);
        assert_eq!(analysis.follow_up_questions.len(), 1);
    }

    #[test]
    fn test_out_of_range_risk_is_schema_failure() {
        let content = r#"{ "riskLevel": 7, "justification": "x" }"#;
        assert!(matches!(
            Analysis::parse_response(content),
            Err(AnalysisFailure::Schema(_))
        ));
    }

    #[test]
    fn test_fractional_risk_is_schema_failure() {
        let content = r#"{ "riskLevel": 2.5, "justification": "x" }"#;
        assert!(matches!(
            Analysis::parse_response(content),
            Err(AnalysisFailure::Schema(_))
        ));
    }

    #[test]
    fn test_missing_required_field_is_schema_failure() {
        let content = r#"{ "initialThoughts": "x" }"#;
        assert!(matches!(
            Analysis::parse_response(content),
            Err(AnalysisFailure::Schema(_))
        ));
    }

    #[test]
    fn test_prose_is_missing_json() {
        assert_eq!(
            Analysis::parse_response("I cannot help with that."),
            Err(AnalysisFailure::MissingJson)
        );
    }

    #[test]
    fn test_question_priority_validated() {
        let bad = r#"{ "questions": [{ "question": "q", "priority": 0 }] }"#;
        assert!(InvestigationQuestions::parse_response(bad).is_err());

        let good = r#"{ "questions": [{ "question": "q", "priority": 4 }] }"#;
        assert_eq!(InvestigationQuestions::parse_response(good).unwrap().questions.len(), 1);
    }

    #[test]
    fn test_schema_text_mentions_fields() {
        let schema = Analysis::schema_text();
        assert!(schema.contains("riskLevel"));
        assert!(schema.contains("followUpQuestions"));
    }
}
