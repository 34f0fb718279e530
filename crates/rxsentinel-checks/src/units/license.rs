//! Prescriber license verification against the state board registry.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;
use serde_json::json;
use tracing::debug;

use rxsentinel_contracts::{
    check::{CheckKind, CheckResult, CheckStatus, DependencyResults, Finding},
    error::CheckError,
    prescription::PrescriptionData,
};
use rxsentinel_core::traits::CheckUnit;

use super::{status_from, surname};
use crate::lookup::{LicenseStatus, ReferenceLookup};

/// Licenses expiring within this many days of the reference date are flagged.
const EXPIRY_NOTICE_DAYS: i64 = 30;

pub struct LicenseVerificationUnit {
    lookup: Arc<dyn ReferenceLookup>,
}

impl LicenseVerificationUnit {
    pub fn new(lookup: Arc<dyn ReferenceLookup>) -> Self {
        Self { lookup }
    }
}

#[async_trait]
impl CheckUnit for LicenseVerificationUnit {
    fn kind(&self) -> CheckKind {
        CheckKind::License
    }

    async fn evaluate(
        &self,
        prescription: &PrescriptionData,
        _dependencies: &DependencyResults,
    ) -> Result<CheckResult, CheckError> {
        let prescriber = &prescription.prescriber;
        let (Some(number), Some(state)) = (
            prescriber.license_number.as_deref(),
            prescriber.license_state.as_deref(),
        ) else {
            return Ok(CheckResult::new(
                CheckKind::License,
                CheckStatus::Inconclusive,
                vec![Finding::warning(
                    "license-not-provided",
                    "prescriber license number or state is missing from the prescription",
                )],
                0.3,
            ));
        };

        let Some(record) = self.lookup.license(number, state).await? else {
            return Ok(CheckResult::new(
                CheckKind::License,
                CheckStatus::Fail,
                vec![Finding::critical(
                    "license-not-found",
                    format!("no {state} license {number} in the state board registry"),
                )],
                0.9,
            ));
        };
        debug!(license = number, status = record.status.as_str(), "license record found");

        let mut findings = Vec::new();
        match (record.status, prescription.reference_date()) {
            (LicenseStatus::Expired, _) => findings.push(Finding::critical(
                "license-expired",
                format!("license {number} expired on {}", record.expires),
            )),
            (LicenseStatus::Suspended | LicenseStatus::Revoked, _) => {
                findings.push(Finding::critical(
                    format!("license-{}", record.status.as_str()),
                    format!("{state} license {number} is {}", record.status.as_str()),
                ))
            }
            (LicenseStatus::Active, Some(as_of)) if record.expires < as_of => {
                findings.push(Finding::critical(
                    "license-expired",
                    format!("license {number} expired on {}", record.expires),
                ))
            }
            (LicenseStatus::Active, Some(as_of))
                if record.expires - as_of <= Duration::days(EXPIRY_NOTICE_DAYS) =>
            {
                findings.push(Finding::warning(
                    "license-expiring-soon",
                    format!("license {number} expires on {}", record.expires),
                ))
            }
            (LicenseStatus::Active, Some(_)) => {}
            (LicenseStatus::Active, None) => findings.push(Finding::info(
                "no-reference-date",
                "prescription carries no dates; expiry judged by registry status only",
            )),
        }

        if surname(&record.holder_name) != surname(&prescriber.name) {
            findings.push(Finding::warning(
                "prescriber-name-mismatch",
                format!(
                    "license holder '{}' does not match prescriber '{}'",
                    record.holder_name, prescriber.name
                ),
            ));
        }
        if let (Some(on_rx), Some(on_file)) = (prescriber.npi.as_deref(), record.npi.as_deref()) {
            if on_rx.trim() != on_file {
                findings.push(Finding::warning(
                    "npi-mismatch",
                    format!("NPI {on_rx} on the prescription, {on_file} on file"),
                ));
            }
        }

        let status = status_from(&findings);
        let confidence = if status == CheckStatus::Warning { 0.8 } else { 0.95 };
        if status == CheckStatus::Pass {
            findings.push(Finding::info(
                "license-active",
                format!("{state} license {number} active until {}", record.expires),
            ));
        }

        Ok(
            CheckResult::new(CheckKind::License, status, findings, confidence).with_evidence(json!({
                "license_number": record.license_number,
                "state": record.state,
                "holder_name": record.holder_name,
                "status": record.status,
                "expires": record.expires,
            })),
        )
    }
}
