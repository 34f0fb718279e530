//! Clinical documentation completeness.
//!
//! The prescription is serialized to JSON and run through a `FieldVerifier`;
//! each violation becomes a finding with the rule's id as its code.

use async_trait::async_trait;
use serde_json::{json, Value};

use rxsentinel_contracts::{
    check::{CheckKind, CheckResult, DependencyResults, Finding, Severity},
    error::CheckError,
    prescription::PrescriptionData,
};
use rxsentinel_core::traits::CheckUnit;
use rxsentinel_verify::{DocumentSchema, FieldRule, FieldRuleKind, FieldVerifier};

use super::status_from;

pub const DOCUMENTATION_SCHEMA_ID: &str = "prescription-documentation-v1";

fn required(id: &str, description: &str, severity: Severity, path: &str) -> FieldRule {
    FieldRule::new(
        id,
        description,
        severity,
        FieldRuleKind::RequiredField {
            field_path: path.to_string(),
        },
    )
}

fn custom(id: &str, description: &str, severity: Severity) -> FieldRule {
    FieldRule::new(
        id,
        description,
        severity,
        FieldRuleKind::Custom {
            function_name: id.to_string(),
        },
    )
}

/// The documentation rules applied to every prescription.
pub fn documentation_schema() -> DocumentSchema {
    DocumentSchema {
        schema_id: DOCUMENTATION_SCHEMA_ID.to_string(),
        json_schema: json!({
            "$schema": "http://json-schema.org/draft-07/schema#",
            "type": "object",
            "required": ["prescriber", "patient", "medications"],
            "properties": {
                "medications": { "type": "array", "minItems": 1 }
            }
        }),
        structural_severity: Severity::Critical,
        rules: vec![
            required("prescriber-name", "Prescriber is named", Severity::Critical, "prescriber.name"),
            required("patient-name", "Patient is named", Severity::Critical, "patient.name"),
            required("date-written", "Prescription is dated", Severity::Critical, "date_written"),
            required(
                "directions-present",
                "Every medication has directions",
                Severity::Critical,
                "medications.*.directions",
            ),
            required(
                "quantity-present",
                "Every medication has a quantity",
                Severity::Warning,
                "medications.*.quantity",
            ),
            required(
                "patient-dob",
                "Patient date of birth is recorded",
                Severity::Warning,
                "patient.date_of_birth",
            ),
            required("diagnosis-present", "A diagnosis or indication is recorded", Severity::Warning, "diagnosis"),
            FieldRule::new(
                "directions-specific",
                "Directions state how to take the medication",
                Severity::Warning,
                FieldRuleKind::ForbiddenPattern {
                    field_path: "medications.*.directions".to_string(),
                    pattern: "as directed".to_string(),
                },
            ),
            custom("signature-present", "The prescription is signed", Severity::Critical),
            custom(
                "prescriber-identified",
                "The prescriber carries an NPI or license number",
                Severity::Warning,
            ),
        ],
    }
}

fn signature_present(doc: &Value) -> Option<String> {
    match doc.get("signature_present").and_then(Value::as_bool) {
        Some(true) => None,
        _ => Some("prescription is not signed".to_string()),
    }
}

fn prescriber_identified(doc: &Value) -> Option<String> {
    let has = |key: &str| {
        doc.pointer(&format!("/prescriber/{key}"))
            .and_then(Value::as_str)
            .is_some_and(|s| !s.trim().is_empty())
    };
    if has("npi") || has("license_number") {
        None
    } else {
        Some("prescriber has neither an NPI nor a license number".to_string())
    }
}

pub struct ClinicalDocumentationUnit {
    verifier: FieldVerifier,
    schema: DocumentSchema,
}

impl ClinicalDocumentationUnit {
    pub fn new() -> Self {
        Self {
            verifier: FieldVerifier::new()
                .with_rule("signature-present", Box::new(signature_present))
                .with_rule("prescriber-identified", Box::new(prescriber_identified)),
            schema: documentation_schema(),
        }
    }
}

impl Default for ClinicalDocumentationUnit {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CheckUnit for ClinicalDocumentationUnit {
    fn kind(&self) -> CheckKind {
        CheckKind::ClinicalDocumentation
    }

    async fn evaluate(
        &self,
        prescription: &PrescriptionData,
        _dependencies: &DependencyResults,
    ) -> Result<CheckResult, CheckError> {
        let document = serde_json::to_value(prescription)
            .map_err(|e| CheckError::terminal(format!("prescription not serializable: {e}")))?;
        let report = self.verifier.verify(&document, &self.schema);

        let mut findings: Vec<Finding> = report
            .violations
            .iter()
            .map(|v| Finding::new(v.severity, v.rule_id.clone(), v.message.clone()))
            .collect();
        let status = status_from(&findings);
        let confidence = if report.passed() { 0.95 } else { 0.9 };
        if report.passed() {
            findings.push(Finding::info(
                "documentation-complete",
                "all documentation rules satisfied",
            ));
        }

        Ok(
            CheckResult::new(CheckKind::ClinicalDocumentation, status, findings, confidence)
                .with_evidence(json!({
                    "schema_id": report.schema_id,
                    "violations": report.violations.len(),
                })),
        )
    }
}
