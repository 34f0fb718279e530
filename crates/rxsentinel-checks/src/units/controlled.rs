//! Controlled substance rules.
//!
//! Looks up every medication's schedule and, for controlled ones, checks the
//! prescriber's DEA authority (from the DEA check's evidence) and the federal
//! refill ceilings.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use rxsentinel_contracts::{
    check::{CheckKind, CheckResult, CheckStatus, DependencyResults, Finding},
    error::CheckError,
    prescription::PrescriptionData,
};
use rxsentinel_core::traits::CheckUnit;

use super::{dependency_status, status_from};
use crate::lookup::{ReferenceLookup, Schedule};

/// Longest days supply accepted for a single schedule II fill without review.
const SCHEDULE_II_MAX_DAYS_SUPPLY: u32 = 30;

pub struct ControlledSubstanceUnit {
    lookup: Arc<dyn ReferenceLookup>,
}

impl ControlledSubstanceUnit {
    pub fn new(lookup: Arc<dyn ReferenceLookup>) -> Self {
        Self { lookup }
    }
}

/// Schedules the DEA check found on the registration, if it got that far.
fn registered_schedules(dependencies: &DependencyResults) -> Option<Vec<Schedule>> {
    let evidence = dependencies.get(&CheckKind::Dea)?.raw_evidence.as_ref()?;
    serde_json::from_value(evidence.get("schedules")?.clone()).ok()
}

#[async_trait]
impl CheckUnit for ControlledSubstanceUnit {
    fn kind(&self) -> CheckKind {
        CheckKind::ControlledSubstance
    }

    async fn evaluate(
        &self,
        prescription: &PrescriptionData,
        dependencies: &DependencyResults,
    ) -> Result<CheckResult, CheckError> {
        let mut controlled = Vec::new();
        let mut unknown = Vec::new();
        for med in prescription.medications.iter().filter(|m| !m.is_compound()) {
            match self.lookup.drug_profile(&med.name).await? {
                Some(profile) => {
                    if let Some(schedule) = profile.schedule {
                        controlled.push((med, schedule));
                    }
                }
                None => unknown.push(med.name.as_str()),
            }
        }

        let mut findings: Vec<Finding> = unknown
            .iter()
            .map(|name| {
                Finding::info(
                    "drug-not-in-reference",
                    format!("{name} is not in the drug reference; treated as non-controlled"),
                )
            })
            .collect();
        let evidence_list: Vec<Value> = controlled
            .iter()
            .map(|(med, schedule)| json!({ "name": med.name, "schedule": schedule }))
            .collect();

        if controlled.is_empty() {
            findings.push(Finding::info(
                "no-controlled-substances",
                "no controlled substances prescribed",
            ));
            let confidence = if unknown.is_empty() { 0.95 } else { 0.75 };
            return Ok(CheckResult::new(
                CheckKind::ControlledSubstance,
                CheckStatus::Pass,
                findings,
                confidence,
            )
            .with_evidence(json!({ "controlled": evidence_list })));
        }

        let dea_status = dependency_status(dependencies, CheckKind::Dea);
        let registered = registered_schedules(dependencies);
        let has_dea_number = prescription.prescriber.dea_number.is_some();

        if !has_dea_number {
            findings.push(Finding::critical(
                "dea-required",
                "controlled substances prescribed without a DEA number",
            ));
        } else if dea_status == Some(CheckStatus::Fail) {
            findings.push(Finding::critical(
                "dea-invalid-for-controlled",
                "controlled substances prescribed under a DEA registration that failed verification",
            ));
        }

        for (med, schedule) in &controlled {
            if has_dea_number && dea_status != Some(CheckStatus::Fail) {
                if let Some(registered) = &registered {
                    if !registered.contains(schedule) {
                        findings.push(Finding::critical(
                            "schedule-not-authorized",
                            format!(
                                "{} is schedule {}, which the prescriber's DEA registration does not cover",
                                med.name,
                                schedule.as_str()
                            ),
                        ));
                    }
                }
            }
            if let Some(limit) = schedule.max_refills() {
                if med.refills > limit {
                    findings.push(Finding::critical(
                        if *schedule == Schedule::II {
                            "schedule-ii-refills-prohibited"
                        } else {
                            "controlled-refills-exceeded"
                        },
                        format!(
                            "{} ({}) has {} refills; at most {limit} allowed",
                            med.name,
                            schedule.as_str(),
                            med.refills
                        ),
                    ));
                }
            }
            if *schedule == Schedule::II
                && med.days_supply.is_some_and(|d| d > SCHEDULE_II_MAX_DAYS_SUPPLY)
            {
                findings.push(Finding::warning(
                    "schedule-ii-days-supply",
                    format!(
                        "{} is a {} day supply of a schedule II drug",
                        med.name,
                        med.days_supply.unwrap_or_default()
                    ),
                ));
            }
            if med.quantity.is_none() {
                findings.push(Finding::warning(
                    "controlled-quantity-missing",
                    format!("{} is controlled but no quantity is written", med.name),
                ));
            }
        }

        // DEA unresolved: the authority question stays open.
        let authority_unknown = has_dea_number
            && (registered.is_none() || dea_status == Some(CheckStatus::Inconclusive));
        let mut status = status_from(&findings);
        let mut confidence = 0.9;
        if authority_unknown && status != CheckStatus::Fail {
            findings.push(Finding::warning(
                "dea-unverified",
                "DEA registration could not be verified for a controlled substance",
            ));
            status = CheckStatus::Inconclusive;
            confidence = 0.3;
        }
        if dependency_status(dependencies, CheckKind::License) != Some(CheckStatus::Pass) {
            findings.push(Finding::warning(
                "prescriber-license-unverified",
                "controlled substances prescribed by a prescriber whose license was not confirmed",
            ));
            if status == CheckStatus::Pass {
                status = CheckStatus::Warning;
            }
        }

        Ok(
            CheckResult::new(CheckKind::ControlledSubstance, status, findings, confidence)
                .with_evidence(json!({ "controlled": evidence_list })),
        )
    }
}
