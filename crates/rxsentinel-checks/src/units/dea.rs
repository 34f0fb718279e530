//! DEA registration verification.
//!
//! The number is validated offline first (shape, registrant letter, check
//! digit) and only then looked up, so a mistyped number is reported as such
//! rather than as "not registered".

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use rxsentinel_contracts::{
    check::{CheckKind, CheckResult, CheckStatus, DependencyResults, Finding},
    error::CheckError,
    prescription::PrescriptionData,
};
use rxsentinel_core::traits::CheckUnit;

use super::{status_from, surname};
use crate::lookup::ReferenceLookup;

/// First letters the DEA assigns to practitioner and mid-level registrants.
const REGISTRANT_TYPES: &str = "ABCDEFGHJKLMPRSTUX";

pub struct DeaVerificationUnit {
    lookup: Arc<dyn ReferenceLookup>,
}

impl DeaVerificationUnit {
    pub fn new(lookup: Arc<dyn ReferenceLookup>) -> Self {
        Self { lookup }
    }
}

/// Why a DEA number failed offline validation.
#[derive(Debug, PartialEq)]
pub(crate) enum DeaFormatError {
    Shape,
    RegistrantType(char),
    CheckDigit { expected: u32, found: u32 },
}

/// Validate shape and check digit of a DEA number.
///
/// Two letters then seven digits. With digits d1..d7, the last digit of
/// `(d1 + d3 + d5) + 2 * (d2 + d4 + d6)` must equal d7.
pub(crate) fn validate_dea_number(number: &str) -> Result<(), DeaFormatError> {
    let chars: Vec<char> = number.trim().to_ascii_uppercase().chars().collect();
    if chars.len() != 9
        || !chars[..2].iter().all(|c| c.is_ascii_alphanumeric())
        || !chars[0].is_ascii_alphabetic()
    {
        return Err(DeaFormatError::Shape);
    }
    let digits: Vec<u32> = chars[2..].iter().filter_map(|c| c.to_digit(10)).collect();
    if digits.len() != 7 {
        return Err(DeaFormatError::Shape);
    }
    if !REGISTRANT_TYPES.contains(chars[0]) {
        return Err(DeaFormatError::RegistrantType(chars[0]));
    }

    let sum = digits[0] + digits[2] + digits[4] + 2 * (digits[1] + digits[3] + digits[5]);
    let expected = sum % 10;
    if expected != digits[6] {
        return Err(DeaFormatError::CheckDigit {
            expected,
            found: digits[6],
        });
    }
    Ok(())
}

#[async_trait]
impl CheckUnit for DeaVerificationUnit {
    fn kind(&self) -> CheckKind {
        CheckKind::Dea
    }

    async fn evaluate(
        &self,
        prescription: &PrescriptionData,
        _dependencies: &DependencyResults,
    ) -> Result<CheckResult, CheckError> {
        let Some(number) = prescription.prescriber.dea_number.as_deref() else {
            // Whether a registration was required is the controlled substance
            // check's call.
            return Ok(CheckResult::new(
                CheckKind::Dea,
                CheckStatus::Pass,
                vec![Finding::info(
                    "dea-not-provided",
                    "no DEA number on the prescription",
                )],
                0.9,
            )
            .with_evidence(json!({ "dea_number": null, "schedules": [] })));
        };

        if let Err(e) = validate_dea_number(number) {
            let message = match e {
                DeaFormatError::Shape => {
                    format!("DEA number '{number}' is not two letters followed by seven digits")
                }
                DeaFormatError::RegistrantType(c) => {
                    format!("DEA number '{number}' has unknown registrant type '{c}'")
                }
                DeaFormatError::CheckDigit { expected, found } => format!(
                    "DEA number '{number}' has check digit {found}, expected {expected}"
                ),
            };
            return Ok(CheckResult::new(
                CheckKind::Dea,
                CheckStatus::Fail,
                vec![Finding::critical("dea-number-invalid", message)],
                0.98,
            ));
        }

        let mut findings = Vec::new();
        let second = number.trim().chars().nth(1).map(|c| c.to_ascii_lowercase());
        let initial = surname(&prescription.prescriber.name).and_then(|s| s.chars().next());
        if second.is_some_and(|c| c.is_ascii_alphabetic()) && second != initial {
            findings.push(Finding::warning(
                "dea-name-initial-mismatch",
                format!(
                    "second letter of DEA number '{number}' does not match the prescriber's surname"
                ),
            ));
        }

        let Some(record) = self.lookup.dea_registration(number).await? else {
            return Ok(CheckResult::new(
                CheckKind::Dea,
                CheckStatus::Fail,
                vec![Finding::critical(
                    "dea-not-registered",
                    format!("DEA number {number} has no active registration"),
                )],
                0.9,
            ));
        };

        if let Some(as_of) = prescription.reference_date() {
            if record.expires < as_of {
                findings.push(Finding::critical(
                    "dea-expired",
                    format!("DEA registration {number} expired on {}", record.expires),
                ));
            }
        }

        let status = status_from(&findings);
        if status == CheckStatus::Pass {
            let schedules: Vec<&str> = record.schedules.iter().map(|s| s.as_str()).collect();
            findings.push(Finding::info(
                "dea-active",
                format!("DEA registration {number} covers {}", schedules.join(", ")),
            ));
        }
        let confidence = if status == CheckStatus::Warning { 0.8 } else { 0.95 };

        Ok(
            CheckResult::new(CheckKind::Dea, status, findings, confidence).with_evidence(json!({
                "dea_number": record.dea_number,
                "registrant_name": record.registrant_name,
                "schedules": record.schedules,
                "expires": record.expires,
            })),
        )
    }
}
