//! Award metadata as supplied by the spending registry ingestion layer
//!
//! Every field is optional: registry records are sparse and the research
//! engine only reads them to build prompts and seed search topics.

use serde::{Deserialize, Serialize};

/// Award details plus its transaction history
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AwardMetadata {
    #[serde(default)]
    pub details: AwardDetails,
    #[serde(default)]
    pub transactions: Vec<Transaction>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AwardDetails {
    #[serde(default)]
    pub total_obligation: Option<f64>,
    #[serde(default)]
    pub date_signed: Option<String>,
    #[serde(default)]
    pub type_description: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub recipient: Option<Recipient>,
    #[serde(default)]
    pub place_of_performance: Option<Location>,
    #[serde(default)]
    pub naics_hierarchy: Option<NaicsHierarchy>,
    #[serde(default)]
    pub executive_details: Option<ExecutiveDetails>,
    #[serde(default)]
    pub latest_transaction_contract_data: Option<ContractData>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Recipient {
    #[serde(default)]
    pub recipient_name: Option<String>,
    #[serde(default)]
    pub parent_recipient_name: Option<String>,
    #[serde(default)]
    pub business_categories: Vec<String>,
    #[serde(default)]
    pub location: Option<Location>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Location {
    #[serde(default)]
    pub address_line1: Option<String>,
    #[serde(default)]
    pub city_name: Option<String>,
    #[serde(default)]
    pub state_code: Option<String>,
    #[serde(default)]
    pub zip5: Option<String>,
    #[serde(default)]
    pub country_name: Option<String>,
}

impl Location {
    /// Render as a single comma separated line, skipping empty parts
    pub fn one_line(&self) -> String {
        [
            &self.address_line1,
            &self.city_name,
            &self.state_code,
            &self.zip5,
            &self.country_name,
        ]
        .into_iter()
        .filter_map(|part| part.as_deref())
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(", ")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NaicsHierarchy {
    #[serde(default)]
    pub base_code: Option<NaicsCode>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NaicsCode {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutiveDetails {
    #[serde(default)]
    pub officers: Vec<Officer>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Officer {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub amount: Option<f64>,
}

/// Competition data from the most recent contract transaction
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContractData {
    #[serde(default)]
    pub extent_competed_description: Option<String>,
    #[serde(default)]
    pub number_of_offers_received: Option<String>,
    #[serde(default)]
    pub type_of_contract_pricing_description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    #[serde(default)]
    pub action_date: Option<String>,
    #[serde(default)]
    pub federal_action_obligation: Option<f64>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub modification_number: Option<String>,
}

impl AwardMetadata {
    pub fn recipient(&self) -> Option<&Recipient> {
        self.details.recipient.as_ref()
    }

    pub fn recipient_name(&self) -> Option<&str> {
        self.recipient()
            .and_then(|r| r.recipient_name.as_deref())
            .map(str::trim)
            .filter(|name| !name.is_empty())
    }

    pub fn parent_name(&self) -> Option<&str> {
        self.recipient()
            .and_then(|r| r.parent_recipient_name.as_deref())
            .map(str::trim)
            .filter(|name| !name.is_empty())
    }

    pub fn officer_names(&self) -> impl Iterator<Item = &str> {
        self.details
            .executive_details
            .iter()
            .flat_map(|e| e.officers.iter())
            .filter_map(|o| o.name.as_deref())
            .map(str::trim)
            .filter(|name| !name.is_empty())
    }

    pub fn industry_description(&self) -> Option<&str> {
        self.details
            .naics_hierarchy
            .as_ref()
            .and_then(|n| n.base_code.as_ref())
            .and_then(|c| c.description.as_deref())
            .map(str::trim)
            .filter(|d| !d.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sparse_registry_record() {
        let json = r#"
        {
            "details": {
                "total_obligation": 1250000.5,
                "date_signed": "2023-09-29",
                "recipient": {
                    "recipient_name": "ACME FEDERAL LLC",
                    "location": { "city_name": "Reston", "state_code": "VA" }
                },
                "executive_details": {
                    "officers": [{ "name": "Jane Roe", "amount": 250000 }, { "name": null }]
                },
                "naics_hierarchy": {
                    "base_code": { "code": "541512", "description": "Computer Systems Design" }
                }
            },
            "transactions": [
                { "action_date": "2023-09-29", "federal_action_obligation": 1000000.0 }
            ]
        }
        "#;

        let award: AwardMetadata = serde_json::from_str(json).unwrap();
        assert_eq!(award.recipient_name(), Some("ACME FEDERAL LLC"));
        assert_eq!(award.parent_name(), None);
        assert_eq!(award.officer_names().collect::<Vec<_>>(), vec!["Jane Roe"]);
        assert_eq!(award.industry_description(), Some("Computer Systems Design"));
        assert_eq!(award.transactions.len(), 1);
        assert!(award.transactions[0].description.is_none());
    }

    #[test]
    fn test_empty_object_parses() {
        let award: AwardMetadata = serde_json::from_str("{}").unwrap();
        assert_eq!(award, AwardMetadata::default());
    }

    #[test]
    fn test_location_one_line() {
        let location = Location {
            address_line1: Some("1 Main St".to_string()),
            city_name: Some("Reston".to_string()),
            state_code: Some("VA".to_string()),
            zip5: Some(" ".to_string()),
            country_name: None,
        };
        assert_eq!(location.one_line(), "1 Main St, Reston, VA");
    }
}
