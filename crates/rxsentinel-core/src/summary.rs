//! Case summary generation.
//!
//! The summary is a pure function of the aggregated case fields. No clock,
//! no randomness: re-summarizing a finalized case reproduces the same text.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use rxsentinel_contracts::{
    case::{Alert, ApprovalStatus, CaseId},
    check::{CheckKind, CheckResult, CheckStatus, Severity},
    error::{SentinelError, SentinelResult},
    prescription::PrescriptionData,
};

use crate::traits::SummaryGenerator;

/// A borrowed view of a case before its summary exists.
#[derive(Debug, Clone, Copy)]
pub struct SummaryInput<'a> {
    pub case_id: &'a CaseId,
    pub prescription: Option<&'a PrescriptionData>,
    pub check_results: &'a BTreeMap<CheckKind, CheckResult>,
    pub alerts: &'a [Alert],
    pub confidence_score: f64,
    pub approval_status: ApprovalStatus,
}

/// The default summary generator: a fixed narrative template.
#[derive(Debug, Clone, Default)]
pub struct TemplateSummaryGenerator {
    /// How many non-info alerts to quote verbatim.
    pub max_listed_alerts: usize,
}

impl TemplateSummaryGenerator {
    pub fn new() -> Self {
        Self {
            max_listed_alerts: 5,
        }
    }
}

impl SummaryGenerator for TemplateSummaryGenerator {
    fn summarize(&self, input: &SummaryInput<'_>) -> SentinelResult<String> {
        let prescription = input.prescription.ok_or_else(|| SentinelError::SummaryFailed {
            reason: "no prescription data to summarize".to_string(),
        })?;
        if prescription.medications.is_empty() {
            return Err(SentinelError::SummaryFailed {
                reason: "prescription lists no medications".to_string(),
            });
        }

        let drugs = prescription
            .medications
            .iter()
            .map(|m| match &m.strength {
                Some(strength) => format!("{} {}", m.name, strength),
                None => m.name.clone(),
            })
            .collect::<Vec<_>>()
            .join(", ");

        let mut out = String::new();
        self.write_summary(&mut out, input, prescription, &drugs)
            .map_err(|e| SentinelError::SummaryFailed {
                reason: format!("failed to format summary: {e}"),
            })?;
        Ok(out.trim_end().to_string())
    }
}

impl TemplateSummaryGenerator {
    fn write_summary(
        &self,
        out: &mut String,
        input: &SummaryInput<'_>,
        prescription: &PrescriptionData,
        drugs: &str,
    ) -> std::fmt::Result {
        writeln!(
            out,
            "Case {}: {} (confidence {:.2}).",
            input.case_id,
            headline(input.approval_status),
            input.confidence_score
        )?;
        writeln!(
            out,
            "Prescription for {} written by {}: {}.",
            non_empty_or(&prescription.patient.name, "unnamed patient"),
            non_empty_or(&prescription.prescriber.name, "unnamed prescriber"),
            drugs
        )?;
        writeln!(out, "{}", status_tally(input.check_results))?;

        let notable: Vec<&Alert> = input
            .alerts
            .iter()
            .filter(|a| a.severity != Severity::Info)
            .collect();
        if notable.is_empty() {
            writeln!(out, "No warnings or critical issues were raised.")?;
        } else {
            writeln!(out, "Issues requiring attention:")?;
            for alert in notable.iter().take(self.max_listed_alerts) {
                let source = alert.source_check.map(CheckKind::label).unwrap_or("Pipeline");
                writeln!(
                    out,
                    "- [{}] {}: {}",
                    alert.severity.as_str().to_uppercase(),
                    source,
                    alert.message
                )?;
            }
            if notable.len() > self.max_listed_alerts {
                writeln!(
                    out,
                    "- … and {} more",
                    notable.len() - self.max_listed_alerts
                )?;
            }
        }
        Ok(())
    }
}

/// The summary used when the generator fails. Never fails itself.
pub fn fallback_summary(input: &SummaryInput<'_>) -> String {
    let critical = input
        .alerts
        .iter()
        .filter(|a| a.severity == Severity::Critical)
        .count();
    let warnings = input
        .alerts
        .iter()
        .filter(|a| a.severity == Severity::Warning)
        .count();
    format!(
        "Case {}: {} (confidence {:.2}). {} of {} checks completed; {} critical and {} warning alerts. \
         A detailed summary could not be generated; review the per-check results.",
        input.case_id,
        headline(input.approval_status),
        input.confidence_score,
        input.check_results.len(),
        CheckKind::ALL.len(),
        critical,
        warnings
    )
}

fn headline(status: ApprovalStatus) -> &'static str {
    match status {
        ApprovalStatus::Approved => "APPROVED",
        ApprovalStatus::Rejected => "REJECTED",
        ApprovalStatus::NeedsReview => "NEEDS REVIEW",
    }
}

fn non_empty_or<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    if value.trim().is_empty() {
        fallback
    } else {
        value
    }
}

fn status_tally(results: &BTreeMap<CheckKind, CheckResult>) -> String {
    let count = |status: CheckStatus| results.values().filter(|r| r.status == status).count();
    format!(
        "Checks: {} passed, {} warning, {} failed, {} inconclusive.",
        count(CheckStatus::Pass),
        count(CheckStatus::Warning),
        count(CheckStatus::Fail),
        count(CheckStatus::Inconclusive)
    )
}
