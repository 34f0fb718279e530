//! Core trait definitions for the RxSentinel pipeline.
//!
//! These traits define every seam the orchestrator depends on:
//!
//! - `CheckUnit`         - one compliance check (may call an external collaborator)
//! - `Aggregator`        - turns check results into alerts, score, and status
//! - `SummaryGenerator`  - renders the case synopsis
//! - `ExtractionService` - document bytes to structured prescription data
//! - `RecordStore`       - write-only persistence of finalized cases
//!
//! Swapping the internals of any implementation never requires touching the
//! orchestrator.

use std::collections::BTreeMap;

use async_trait::async_trait;

use rxsentinel_contracts::{
    case::{Alert, ApprovalStatus, CaseId, CaseResult},
    check::{CheckKind, CheckResult, DependencyResults},
    error::{CheckError, ExtractionError, SentinelResult},
    prescription::PrescriptionData,
};

use crate::summary::SummaryInput;

/// A single compliance check.
///
/// `evaluate` must not touch pipeline state. A unit may call one external
/// collaborator (a registry lookup, a reasoning service); that call is its
/// only side effect. Units resolve their own internal failures to an
/// `Inconclusive` result. They return `Err` only to tell the orchestrator
/// how to react: `Transient` to be retried, `Terminal` to give up and skip
/// dependents.
#[async_trait]
pub trait CheckUnit: Send + Sync {
    /// Which of the eight checks this unit implements.
    fn kind(&self) -> CheckKind;

    /// Evaluate the prescription.
    ///
    /// `dependencies` holds exactly the results of `self.kind().dependencies()`.
    async fn evaluate(
        &self,
        prescription: &PrescriptionData,
        dependencies: &DependencyResults,
    ) -> Result<CheckResult, CheckError>;
}

/// The combined verdict over all check results.
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregation {
    pub alerts: Vec<Alert>,
    pub confidence_score: f64,
    pub approval_status: ApprovalStatus,
    /// Identifier of the decision rule that produced `approval_status`.
    pub decided_by: String,
}

/// Combines check results into a case-level decision.
///
/// Implementations must be deterministic and total: every input, including
/// an incomplete result map, yields an `Aggregation`.
pub trait Aggregator: Send + Sync {
    fn aggregate(
        &self,
        case_id: &CaseId,
        results: &BTreeMap<CheckKind, CheckResult>,
    ) -> Aggregation;
}

/// Renders the human-readable case summary.
///
/// Must be deterministic for the same input. An `Err` never changes the
/// decision; the orchestrator substitutes a templated fallback.
pub trait SummaryGenerator: Send + Sync {
    fn summarize(&self, input: &SummaryInput<'_>) -> SentinelResult<String>;
}

/// Turns a submitted document into structured prescription data.
#[async_trait]
pub trait ExtractionService: Send + Sync {
    async fn extract(&self, document: &[u8]) -> Result<PrescriptionData, ExtractionError>;
}

/// Persists finalized cases. The pipeline never reads back through it.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn save(&self, case: &CaseResult) -> SentinelResult<CaseId>;
}
