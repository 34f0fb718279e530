//! State dispensing rules: prescription age, refill ceilings, required fields.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use rxsentinel_contracts::{
    check::{CheckKind, CheckResult, CheckStatus, DependencyResults, Finding},
    error::CheckError,
    prescription::PrescriptionData,
};
use rxsentinel_core::traits::CheckUnit;

use super::{dependency_status, status_from};
use crate::lookup::ReferenceLookup;

pub struct StateComplianceUnit {
    lookup: Arc<dyn ReferenceLookup>,
}

impl StateComplianceUnit {
    pub fn new(lookup: Arc<dyn ReferenceLookup>) -> Self {
        Self { lookup }
    }
}

#[async_trait]
impl CheckUnit for StateComplianceUnit {
    fn kind(&self) -> CheckKind {
        CheckKind::StateCompliance
    }

    async fn evaluate(
        &self,
        prescription: &PrescriptionData,
        dependencies: &DependencyResults,
    ) -> Result<CheckResult, CheckError> {
        let Some(state) = prescription.prescriber.license_state.as_deref() else {
            return Ok(CheckResult::inconclusive(
                CheckKind::StateCompliance,
                Finding::warning(
                    "state-unknown",
                    "prescription does not say which state the prescriber is licensed in",
                ),
            ));
        };
        let Some(rules) = self.lookup.state_rules(state).await? else {
            return Ok(CheckResult::inconclusive(
                CheckKind::StateCompliance,
                Finding::warning(
                    "state-rules-unknown",
                    format!("no dispensing rules on file for state '{state}'"),
                ),
            ));
        };

        let mut findings = Vec::new();

        if let (Some(written), Some(as_of)) = (prescription.date_written, prescription.reference_date()) {
            let age = (as_of - written).num_days();
            if age < 0 {
                findings.push(Finding::critical(
                    "written-after-fill",
                    format!("prescription is dated {written}, after it was received or filled"),
                ));
            } else if age > i64::from(rules.prescription_valid_days) {
                findings.push(Finding::critical(
                    "prescription-stale",
                    format!(
                        "prescription is {age} days old; {} allows {} days",
                        rules.state, rules.prescription_valid_days
                    ),
                ));
            }
        }

        for med in &prescription.medications {
            if med.refills > rules.max_refills {
                findings.push(Finding::critical(
                    "refills-exceed-state-limit",
                    format!(
                        "{}: {} refills exceeds the {} limit of {}",
                        med.name, med.refills, rules.state, rules.max_refills
                    ),
                ));
            }
        }

        if rules.requires_patient_address
            && prescription
                .patient
                .address
                .as_deref()
                .map_or(true, |a| a.trim().is_empty())
        {
            findings.push(Finding::warning(
                "patient-address-missing",
                format!("{} requires the patient's address on the prescription", rules.state),
            ));
        }

        let mut confidence = 0.9;
        if dependency_status(dependencies, CheckKind::License) != Some(CheckStatus::Pass) {
            findings.push(Finding::info(
                "license-unconfirmed",
                format!("prescriber license not confirmed; applied the rules of {state} as written"),
            ));
            confidence = 0.7;
        }

        Ok(CheckResult::new(
            CheckKind::StateCompliance,
            status_from(&findings),
            findings,
            confidence,
        )
        .with_evidence(json!({
            "state": rules.state,
            "prescription_valid_days": rules.prescription_valid_days,
            "max_refills": rules.max_refills,
            "schedule_ii_max_days_supply": rules.schedule_ii_max_days_supply,
        })))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::NaiveDate;

    use super::*;
    use crate::mock_data::MockReferenceData;
    use crate::scenarios::fixtures::clean_prescription;

    fn unit() -> StateComplianceUnit {
        StateComplianceUnit::new(Arc::new(MockReferenceData::new()))
    }

    fn license_passed() -> DependencyResults {
        let mut deps = BTreeMap::new();
        deps.insert(
            CheckKind::License,
            CheckResult::new(CheckKind::License, CheckStatus::Pass, vec![], 0.95),
        );
        deps
    }

    #[tokio::test]
    async fn clean_prescription_passes() {
        let result = unit()
            .evaluate(&clean_prescription(), &license_passed())
            .await
            .unwrap();
        assert_eq!(result.status, CheckStatus::Pass);
        assert_eq!(result.confidence, 0.9);
    }

    #[tokio::test]
    async fn old_prescription_is_stale() {
        let mut rx = clean_prescription();
        rx.date_written = NaiveDate::from_ymd_opt(2024, 12, 1);
        let result = unit().evaluate(&rx, &license_passed()).await.unwrap();
        assert_eq!(result.status, CheckStatus::Fail);
        assert_eq!(result.findings[0].code, "prescription-stale");
    }

    #[tokio::test]
    async fn refills_over_state_limit_fail() {
        let mut rx = clean_prescription();
        rx.prescriber.license_state = Some("NY".to_string());
        rx.medications[0].refills = 6;
        let result = unit().evaluate(&rx, &license_passed()).await.unwrap();
        assert_eq!(result.status, CheckStatus::Fail);
        assert!(result.findings[0].message.contains("NY limit of 5"));
    }

    #[tokio::test]
    async fn unverified_license_lowers_confidence() {
        let result = unit()
            .evaluate(&clean_prescription(), &BTreeMap::new())
            .await
            .unwrap();
        assert_eq!(result.status, CheckStatus::Pass);
        assert_eq!(result.confidence, 0.7);
    }

    #[tokio::test]
    async fn unknown_state_is_inconclusive() {
        let mut rx = clean_prescription();
        rx.prescriber.license_state = Some("ZZ".to_string());
        let result = unit().evaluate(&rx, &license_passed()).await.unwrap();
        assert_eq!(result.status, CheckStatus::Inconclusive);
        assert_eq!(result.findings[0].code, "state-rules-unknown");
    }
}
