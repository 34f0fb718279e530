//! Compounding compliance: ingredient list completeness and substances that
//! may not be compounded.

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

pub struct CompoundingComplianceUnit {
    lookup: Arc<dyn ReferenceLookup>,
}

impl CompoundingComplianceUnit {
    pub fn new(lookup: Arc<dyn ReferenceLookup>) -> Self {
        Self { lookup }
    }
}

#[async_trait]
impl CheckUnit for CompoundingComplianceUnit {
    fn kind(&self) -> CheckKind {
        CheckKind::CompoundingCompliance
    }

    async fn evaluate(
        &self,
        prescription: &PrescriptionData,
        dependencies: &DependencyResults,
    ) -> Result<CheckResult, CheckError> {
        if prescription.compounds().next().is_none() {
            return Ok(CheckResult::new(
                CheckKind::CompoundingCompliance,
                CheckStatus::Pass,
                vec![Finding::info(
                    "no-compounded-preparations",
                    "no compounded preparations",
                )],
                0.95,
            ));
        }

        let mut findings = Vec::new();
        let mut controlled_ingredients = Vec::new();

        for (med, compounding) in prescription.compounds() {
            if compounding.ingredients.is_empty() {
                findings.push(Finding::critical(
                    "ingredients-missing",
                    format!("{}: compounded preparation lists no ingredients", med.name),
                ));
                continue;
            }
            for ingredient in &compounding.ingredients {
                if ingredient
                    .strength
                    .as_deref()
                    .map_or(true, |s| s.trim().is_empty())
                {
                    findings.push(Finding::warning(
                        "ingredient-strength-missing",
                        format!("{}: no strength given for {}", med.name, ingredient.name),
                    ));
                }
                let Some(profile) = self.lookup.drug_profile(&ingredient.name).await? else {
                    continue;
                };
                if profile.compounding_prohibited {
                    findings.push(Finding::critical(
                        "ingredient-not-compoundable",
                        format!(
                            "{}: {} is on the list of substances that may not be compounded",
                            med.name, ingredient.name
                        ),
                    ));
                }
                if let Some(schedule) = profile.schedule {
                    controlled_ingredients.push(json!({
                        "preparation": med.name,
                        "ingredient": ingredient.name,
                        "schedule": schedule,
                    }));
                    findings.push(Finding::info(
                        "controlled-ingredient",
                        format!(
                            "{}: {} is schedule {}",
                            med.name,
                            ingredient.name,
                            schedule.as_str()
                        ),
                    ));
                }
            }
            if med.directions.as_deref().map_or(true, |d| d.trim().is_empty()) {
                findings.push(Finding::warning(
                    "compound-directions-missing",
                    format!("{}: no directions for use", med.name),
                ));
            }
        }

        let mut confidence = 0.9;
        match dependency_status(dependencies, CheckKind::BudValidation) {
            Some(CheckStatus::Pass) | Some(CheckStatus::Warning) => {}
            Some(CheckStatus::Fail) => findings.push(Finding::info(
                "bud-invalid",
                "beyond-use dating failed validation; see BUD validation",
            )),
            _ => {
                findings.push(Finding::warning(
                    "bud-unverified",
                    "beyond-use dating could not be validated",
                ));
                confidence = 0.6;
            }
        }

        Ok(CheckResult::new(
            CheckKind::CompoundingCompliance,
            status_from(&findings),
            findings,
            confidence,
        )
        .with_evidence(json!({ "controlled_ingredients": controlled_ingredients })))
    }
}
