//! Check identities, statuses, findings, and results.
//!
//! The set of checks is closed: `CheckKind` enumerates exactly the eight
//! compliance checks the pipeline runs, in their fixed order. Results are keyed
//! by `CheckKind`, never by free-form strings, so a misspelled or missing check
//! is caught when the pipeline is built rather than silently skipped.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// One of the eight compliance checks.
///
/// Declaration order is the fixed check order: it drives alert tie-breaking
/// and the iteration order of `BTreeMap<CheckKind, _>`. Every check's
/// dependencies appear before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckKind {
    #[serde(rename = "license_verification")]
    License,
    #[serde(rename = "dea_verification")]
    Dea,
    StateCompliance,
    #[serde(rename = "controlled_substance_check")]
    ControlledSubstance,
    DosageMonitoring,
    #[serde(rename = "bud_validation")]
    BudValidation,
    CompoundingCompliance,
    ClinicalDocumentation,
}

impl CheckKind {
    /// All checks, in the fixed check order.
    pub const ALL: [CheckKind; 8] = [
        CheckKind::License,
        CheckKind::Dea,
        CheckKind::StateCompliance,
        CheckKind::ControlledSubstance,
        CheckKind::DosageMonitoring,
        CheckKind::BudValidation,
        CheckKind::CompoundingCompliance,
        CheckKind::ClinicalDocumentation,
    ];

    /// Stable machine name, identical to the serialized form.
    pub fn name(self) -> &'static str {
        match self {
            CheckKind::License => "license_verification",
            CheckKind::Dea => "dea_verification",
            CheckKind::StateCompliance => "state_compliance",
            CheckKind::ControlledSubstance => "controlled_substance_check",
            CheckKind::DosageMonitoring => "dosage_monitoring",
            CheckKind::BudValidation => "bud_validation",
            CheckKind::CompoundingCompliance => "compounding_compliance",
            CheckKind::ClinicalDocumentation => "clinical_documentation",
        }
    }

    /// Human-readable label for reports.
    pub fn label(self) -> &'static str {
        match self {
            CheckKind::License => "License Verification",
            CheckKind::Dea => "DEA Verification",
            CheckKind::StateCompliance => "State Compliance",
            CheckKind::ControlledSubstance => "Controlled Substance Monitoring",
            CheckKind::DosageMonitoring => "Dosage Monitoring",
            CheckKind::BudValidation => "BUD Validation",
            CheckKind::CompoundingCompliance => "Compounding Compliance",
            CheckKind::ClinicalDocumentation => "Clinical Documentation",
        }
    }

    /// The checks whose results must be available before this one runs.
    ///
    /// Controlled-substance and dosage checks reason about the bounds of the
    /// prescriber's authority, so they wait for license and DEA verification.
    pub fn dependencies(self) -> &'static [CheckKind] {
        match self {
            CheckKind::License | CheckKind::Dea => &[],
            CheckKind::StateCompliance => &[CheckKind::License],
            CheckKind::ControlledSubstance | CheckKind::DosageMonitoring => {
                &[CheckKind::License, CheckKind::Dea]
            }
            CheckKind::BudValidation => &[],
            CheckKind::CompoundingCompliance => &[CheckKind::BudValidation],
            CheckKind::ClinicalDocumentation => &[],
        }
    }

    /// Zero-based position in the fixed check order.
    pub fn position(self) -> usize {
        self as usize
    }

    /// Parse a machine name back into a `CheckKind`.
    pub fn from_name(name: &str) -> Option<CheckKind> {
        CheckKind::ALL.into_iter().find(|k| k.name() == name)
    }
}

impl fmt::Display for CheckKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The verdict of a single check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Pass,
    Fail,
    Warning,
    /// The check could not reach a verdict (missing evidence, unavailable
    /// collaborator, skipped dependency, timeout).
    Inconclusive,
}

impl CheckStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CheckStatus::Pass => "pass",
            CheckStatus::Fail => "fail",
            CheckStatus::Warning => "warning",
            CheckStatus::Inconclusive => "inconclusive",
        }
    }
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity of a finding or alert. Ordered `Info < Warning < Critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single structured issue or observation produced by a check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub severity: Severity,
    /// Short stable identifier, e.g. "license-expired".
    pub code: String,
    pub message: String,
}

impl Finding {
    pub fn new(severity: Severity, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity,
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn info(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Severity::Info, code, message)
    }

    pub fn warning(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, code, message)
    }

    pub fn critical(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Severity::Critical, code, message)
    }
}

/// The output of one check invocation. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    pub check_name: CheckKind,
    pub status: CheckStatus,
    /// Ordered findings; the order is preserved into the case alerts.
    pub findings: Vec<Finding>,
    /// The unit's self-assessed certainty in [0, 1].
    pub confidence: f64,
    /// Whatever evidence the unit wants to expose (lookup records, parsed
    /// doses). Dependents may read it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_evidence: Option<serde_json::Value>,
}

impl CheckResult {
    /// Build a result, clamping `confidence` into [0, 1]. NaN becomes 0.
    pub fn new(
        check_name: CheckKind,
        status: CheckStatus,
        findings: Vec<Finding>,
        confidence: f64,
    ) -> Self {
        Self {
            check_name,
            status,
            findings,
            confidence: clamp_unit(confidence),
            raw_evidence: None,
        }
    }

    /// An inconclusive result carrying a single explanatory finding and zero
    /// confidence.
    pub fn inconclusive(check_name: CheckKind, finding: Finding) -> Self {
        Self::new(check_name, CheckStatus::Inconclusive, vec![finding], 0.0)
    }

    pub fn with_evidence(mut self, evidence: serde_json::Value) -> Self {
        self.raw_evidence = Some(evidence);
        self
    }

    /// The most severe finding, if any.
    pub fn max_severity(&self) -> Option<Severity> {
        self.findings.iter().map(|f| f.severity).max()
    }
}

/// Clamp into [0, 1]; NaN maps to 0.
pub fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Results of a check's declared dependencies, handed to `evaluate`.
pub type DependencyResults = BTreeMap<CheckKind, CheckResult>;
