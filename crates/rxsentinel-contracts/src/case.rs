//! Case-level types: identity, alerts, audit entries, and the final result.
//!
//! `CaseResult` is the root aggregate the pipeline hands to the record store.
//! Its serialized form is self-contained: per-check results, alerts, audit
//! trail, confidence, and summary can all be reconstructed from the JSON
//! document without re-running the pipeline.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    check::{CheckKind, CheckResult, CheckStatus, Severity},
    prescription::PrescriptionData,
};

/// Identifier for one end-to-end verification run.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CaseId(pub String);

impl CaseId {
    /// A fresh random case id.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for CaseId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for CaseId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for CaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A finding elevated to case-level visibility.
///
/// `source_check` is `None` only for pipeline-level alerts that no single
/// check produced (extraction failure, incomplete case).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub severity: Severity,
    pub source_check: Option<CheckKind>,
    pub message: String,
}

/// The final decision for a case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Approved,
    Rejected,
    NeedsReview,
}

impl ApprovalStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ApprovalStatus::Approved => "approved",
            ApprovalStatus::Rejected => "rejected",
            ApprovalStatus::NeedsReview => "needs_review",
        }
    }
}

impl fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One immutable entry in a case's audit trail.
///
/// Entries form a SHA-256 hash chain: `entry_hash` commits to every other
/// field including `prev_hash`, so editing or removing any entry breaks the
/// chain from that point on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Position in the case's trail, starting at 1, contiguous.
    pub sequence_number: u64,
    /// The check or pipeline component that acted.
    pub agent: String,
    /// What happened, e.g. "license_verification started".
    pub action: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    /// `entry_hash` of the previous entry, or the genesis hash for entry 1.
    pub prev_hash: String,
    pub entry_hash: String,
}

/// The finalized output of one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseResult {
    pub case_id: CaseId,
    /// `None` only when extraction failed and no checks ran.
    pub prescription_data: Option<PrescriptionData>,
    pub check_results: BTreeMap<CheckKind, CheckResult>,
    /// Most severe first; ties keep the fixed check order.
    pub alerts: Vec<Alert>,
    pub confidence_score: f64,
    pub approval_status: ApprovalStatus,
    pub case_summary: String,
    /// Ordered by `sequence_number`.
    pub audit_trail: Vec<AuditEntry>,
}

impl CaseResult {
    /// The checks that have no entry in `check_results`.
    pub fn missing_checks(&self) -> Vec<CheckKind> {
        CheckKind::ALL
            .into_iter()
            .filter(|k| !self.check_results.contains_key(k))
            .collect()
    }

    /// Number of alerts at exactly `severity`.
    pub fn alert_count(&self, severity: Severity) -> usize {
        self.alerts.iter().filter(|a| a.severity == severity).count()
    }

    /// Number of check results with `status`.
    pub fn status_count(&self, status: CheckStatus) -> usize {
        self.check_results
            .values()
            .filter(|r| r.status == status)
            .count()
    }
}
