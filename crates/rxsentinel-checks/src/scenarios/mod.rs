//! Built-in demo scenarios.
//!
//! Each scenario is a submitted document plus the state of the reference
//! registries, run end to end through extraction, the eight checks, the
//! policy aggregator, and an in-memory record store:
//!
//! | name               | document                         | expected       |
//! |--------------------|----------------------------------|----------------|
//! | `clean`            | labelled text, two maintenance Rx | approved      |
//! | `license-failure`  | JSON, expired CA license          | rejected      |
//! | `controlled`       | JSON, CII without CII authority   | rejected      |
//! | `compounded`       | JSON, topical compound, valid BUD | approved      |
//! | `registry-outage`  | clean Rx, registries unreachable  | needs review  |
//! | `unreadable`       | fax cover page with no text layer | needs review  |

use std::sync::Arc;

use rxsentinel_contracts::{
    case::{ApprovalStatus, CaseId},
    error::SentinelResult,
    prescription::PrescriptionData,
};
use rxsentinel_core::Submission;
use rxsentinel_policy::PipelineConfig;

use crate::lookup::ReferenceLookup;
use crate::mock_data::{FlakyLookup, MockReferenceData};
use crate::pipeline::build_service;
use crate::store::InMemoryRecordStore;

pub mod fixtures;

/// What gets submitted.
pub enum ScenarioDocument {
    Text(&'static str),
    Json(fn() -> PrescriptionData),
}

pub struct Scenario {
    pub name: &'static str,
    pub description: &'static str,
    pub document: ScenarioDocument,
    /// Registry calls that fail before the registries recover.
    pub outage_calls: Option<u32>,
    pub expected: ApprovalStatus,
}

impl Scenario {
    pub fn document_bytes(&self) -> SentinelResult<Vec<u8>> {
        match &self.document {
            ScenarioDocument::Text(text) => Ok(text.as_bytes().to_vec()),
            ScenarioDocument::Json(build) => Ok(serde_json::to_vec_pretty(&build())?),
        }
    }

    fn lookup(&self) -> Arc<dyn ReferenceLookup> {
        let data: Arc<dyn ReferenceLookup> = Arc::new(MockReferenceData::new());
        match self.outage_calls {
            Some(failures) => Arc::new(FlakyLookup::new(data, failures)),
            None => data,
        }
    }
}

/// Every built-in scenario, in presentation order.
pub fn all() -> Vec<Scenario> {
    vec![
        Scenario {
            name: "clean",
            description: "Two maintenance medications from an active prescriber",
            document: ScenarioDocument::Text(fixtures::CLEAN_DOCUMENT),
            outage_calls: None,
            expected: ApprovalStatus::Approved,
        },
        Scenario {
            name: "license-failure",
            description: "Prescriber's state license expired before the fill date",
            document: ScenarioDocument::Json(fixtures::expired_license_prescription),
            outage_calls: None,
            expected: ApprovalStatus::Rejected,
        },
        Scenario {
            name: "controlled",
            description: "Schedule II opioid with a refill, DEA registration lacks CII",
            document: ScenarioDocument::Json(fixtures::unauthorized_controlled_prescription),
            outage_calls: None,
            expected: ApprovalStatus::Rejected,
        },
        Scenario {
            name: "compounded",
            description: "Topical NSAID cream compounded with a 28 day beyond-use date",
            document: ScenarioDocument::Json(fixtures::compounded_prescription),
            outage_calls: None,
            expected: ApprovalStatus::Approved,
        },
        Scenario {
            name: "registry-outage",
            description: "Clean prescription while every reference registry is unreachable",
            document: ScenarioDocument::Text(fixtures::CLEAN_DOCUMENT),
            outage_calls: Some(u32::MAX),
            expected: ApprovalStatus::NeedsReview,
        },
        Scenario {
            name: "unreadable",
            description: "A fax cover page with no readable prescription on it",
            document: ScenarioDocument::Text(
                "FAX TRANSMISSION - page 1 of 1\n(image only, no text layer)\n",
            ),
            outage_calls: None,
            expected: ApprovalStatus::NeedsReview,
        },
    ]
}

pub fn find(name: &str) -> Option<Scenario> {
    all().into_iter().find(|s| s.name == name)
}

/// Run `scenario` end to end under `config`.
pub async fn run(scenario: &Scenario, config: &PipelineConfig) -> SentinelResult<Submission> {
    let document = scenario.document_bytes()?;
    let store = Arc::new(InMemoryRecordStore::new());
    let service = build_service(config, scenario.lookup(), store)?;
    Ok(service
        .process(&document, CaseId::from(format!("scenario-{}", scenario.name).as_str()))
        .await)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_config() -> PipelineConfig {
        let mut config = PipelineConfig::builtin().unwrap();
        config.orchestrator.retry_backoff_ms = 1;
        config
    }

    #[tokio::test]
    async fn every_scenario_reaches_its_expected_decision() {
        for scenario in all() {
            let submission = run(&scenario, &fast_config()).await.unwrap();
            assert_eq!(
                submission.result.approval_status, scenario.expected,
                "scenario '{}': {:#?}",
                scenario.name, submission.result.alerts
            );
            assert!(submission.saved_as.is_ok());
            rxsentinel_audit::verify_chain(
                submission.result.case_id.as_str(),
                &submission.result.audit_trail,
            )
            .unwrap();
        }
    }

    #[tokio::test]
    async fn unreadable_document_runs_no_checks() {
        let scenario = find("unreadable").unwrap();
        let submission = run(&scenario, &fast_config()).await.unwrap();
        let case = submission.result;
        assert!(case.prescription_data.is_none());
        assert!(case.check_results.is_empty());
        assert_eq!(case.audit_trail.len(), 1);
        assert_eq!(case.audit_trail[0].action, "extraction failed");
    }

    #[test]
    fn scenario_names_are_unique_and_findable() {
        let names: Vec<&str> = all().iter().map(|s| s.name).collect();
        for name in &names {
            assert!(find(name).is_some());
        }
        let mut deduped = names.clone();
        deduped.dedup();
        assert_eq!(deduped.len(), names.len());
        assert!(find("nonexistent").is_none());
    }
}
