//! Beyond-use date validation for compounded preparations.

use async_trait::async_trait;
use serde_json::{json, Value};

use rxsentinel_contracts::{
    check::{CheckKind, CheckResult, CheckStatus, DependencyResults, Finding},
    error::CheckError,
    prescription::{PreparationKind, PrescriptionData},
};
use rxsentinel_core::traits::CheckUnit;

use super::status_from;

/// Longest BUD, in days after compounding, for each preparation class.
///
/// Non-sterile limits follow the USP <795> defaults (aqueous refrigerated);
/// sterile uses the category 1 refrigerated limit from USP <797>.
pub fn max_bud_days(kind: PreparationKind) -> i64 {
    match kind {
        PreparationKind::NonSterileAqueous => 35,
        PreparationKind::NonSterileNonAqueous => 90,
        PreparationKind::NonSterileSolid => 180,
        PreparationKind::Sterile => 4,
    }
}

#[derive(Default)]
pub struct BudValidationUnit;

impl BudValidationUnit {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CheckUnit for BudValidationUnit {
    fn kind(&self) -> CheckKind {
        CheckKind::BudValidation
    }

    async fn evaluate(
        &self,
        prescription: &PrescriptionData,
        _dependencies: &DependencyResults,
    ) -> Result<CheckResult, CheckError> {
        if prescription.compounds().next().is_none() {
            return Ok(CheckResult::new(
                CheckKind::BudValidation,
                CheckStatus::Pass,
                vec![Finding::info(
                    "no-compounded-preparations",
                    "no compounded preparations; beyond-use dating does not apply",
                )],
                0.95,
            ));
        }

        let mut findings = Vec::new();
        let mut evidence = Vec::<Value>::new();
        let mut incomplete = false;

        for (med, compounding) in prescription.compounds() {
            let limit = compounding.preparation.map(max_bud_days);
            if limit.is_none() {
                incomplete = true;
                findings.push(Finding::warning(
                    "preparation-kind-missing",
                    format!("{}: preparation class not stated; BUD limit unknown", med.name),
                ));
            }
            let Some(bud) = compounding.beyond_use_date else {
                findings.push(Finding::critical(
                    "bud-missing",
                    format!("{}: compounded preparation has no beyond-use date", med.name),
                ));
                continue;
            };

            let mut assigned_days = None;
            match compounding.compounded_date {
                Some(compounded) => {
                    let days = (bud - compounded).num_days();
                    assigned_days = Some(days);
                    if days < 0 {
                        findings.push(Finding::critical(
                            "bud-before-compounding",
                            format!("{}: BUD {bud} precedes compounding date {compounded}", med.name),
                        ));
                    } else if let Some(limit) = limit.filter(|l| days > *l) {
                        findings.push(Finding::critical(
                            "bud-exceeds-limit",
                            format!(
                                "{}: BUD is {days} days after compounding; at most {limit} allowed",
                                med.name
                            ),
                        ));
                    }
                }
                None => {
                    incomplete = true;
                    findings.push(Finding::warning(
                        "compounded-date-missing",
                        format!("{}: compounding date not stated", med.name),
                    ));
                }
            }

            if let Some(as_of) = prescription.reference_date() {
                if as_of > bud {
                    findings.push(Finding::critical(
                        "bud-passed",
                        format!("{}: beyond-use date {bud} has passed", med.name),
                    ));
                }
            }

            evidence.push(json!({
                "name": med.name,
                "preparation": compounding.preparation,
                "limit_days": limit,
                "assigned_days": assigned_days,
                "beyond_use_date": bud,
            }));
        }

        let confidence = if incomplete { 0.7 } else { 0.9 };
        Ok(CheckResult::new(
            CheckKind::BudValidation,
            status_from(&findings),
            findings,
            confidence,
        )
        .with_evidence(json!({ "preparations": evidence })))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::NaiveDate;

    use super::*;
    use crate::scenarios::fixtures::{clean_prescription, compounded_prescription};

    fn compound_mut(rx: &mut PrescriptionData) -> &mut rxsentinel_contracts::prescription::Compounding {
        rx.medications[0].compounding.as_mut().unwrap()
    }

    #[tokio::test]
    async fn no_compounds_passes() {
        let result = BudValidationUnit::new()
            .evaluate(&clean_prescription(), &BTreeMap::new())
            .await
            .unwrap();
        assert_eq!(result.status, CheckStatus::Pass);
        assert_eq!(result.findings[0].code, "no-compounded-preparations");
    }

    #[tokio::test]
    async fn bud_within_limit_passes() {
        let result = BudValidationUnit::new()
            .evaluate(&compounded_prescription(), &BTreeMap::new())
            .await
            .unwrap();
        assert_eq!(result.status, CheckStatus::Pass);
        let prep = &result.raw_evidence.unwrap()["preparations"][0];
        assert_eq!(prep["assigned_days"], 28);
        assert_eq!(prep["limit_days"], 35);
    }

    #[tokio::test]
    async fn bud_beyond_limit_fails() {
        let mut rx = compounded_prescription();
        compound_mut(&mut rx).beyond_use_date = NaiveDate::from_ymd_opt(2026, 5, 3);
        let result = BudValidationUnit::new()
            .evaluate(&rx, &BTreeMap::new())
            .await
            .unwrap();
        assert_eq!(result.status, CheckStatus::Fail);
        assert_eq!(result.findings[0].code, "bud-exceeds-limit");
    }

    #[tokio::test]
    async fn bud_before_compounding_and_passed_fail() {
        let mut rx = compounded_prescription();
        compound_mut(&mut rx).beyond_use_date = NaiveDate::from_ymd_opt(2026, 3, 1);
        let result = BudValidationUnit::new()
            .evaluate(&rx, &BTreeMap::new())
            .await
            .unwrap();
        let codes: Vec<&str> = result.findings.iter().map(|f| f.code.as_str()).collect();
        assert_eq!(codes, vec!["bud-before-compounding", "bud-passed"]);
    }

    #[tokio::test]
    async fn missing_bud_is_critical() {
        let mut rx = compounded_prescription();
        compound_mut(&mut rx).beyond_use_date = None;
        compound_mut(&mut rx).preparation = None;
        let result = BudValidationUnit::new()
            .evaluate(&rx, &BTreeMap::new())
            .await
            .unwrap();
        assert_eq!(result.status, CheckStatus::Fail);
        assert_eq!(result.confidence, 0.7);
        assert_eq!(result.findings[1].code, "bud-missing");
    }

    #[test]
    fn sterile_limit_is_shortest() {
        assert!(max_bud_days(PreparationKind::Sterile) < max_bud_days(PreparationKind::NonSterileAqueous));
    }
}
