//! End-to-end case processing: extract, verify, persist.

use std::sync::Arc;

use tracing::{error, info};

use rxsentinel_contracts::{
    case::{CaseId, CaseResult},
    error::SentinelResult,
};

use crate::{
    orchestrator::Orchestrator,
    traits::{ExtractionService, RecordStore},
};

/// The outcome of submitting one document.
///
/// `result` is always a finalized case. Persistence is reported separately:
/// a store failure never changes the verdict.
#[derive(Debug)]
pub struct Submission {
    pub result: CaseResult,
    pub saved_as: SentinelResult<CaseId>,
}

/// Wires an extraction service, an orchestrator, and a record store.
pub struct VerificationService {
    extraction: Arc<dyn ExtractionService>,
    orchestrator: Arc<Orchestrator>,
    store: Arc<dyn RecordStore>,
}

impl VerificationService {
    pub fn new(
        extraction: Arc<dyn ExtractionService>,
        orchestrator: Arc<Orchestrator>,
        store: Arc<dyn RecordStore>,
    ) -> Self {
        Self {
            extraction,
            orchestrator,
            store,
        }
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    /// Process one submitted document under `case_id`.
    pub async fn process(&self, document: &[u8], case_id: CaseId) -> Submission {
        let result = match self.extraction.extract(document).await {
            Ok(prescription) => self.orchestrator.run(prescription, case_id).await,
            Err(e) => self.orchestrator.extraction_failed(case_id, &e),
        };

        let saved_as = self.store.save(&result).await;
        match &saved_as {
            Ok(id) => info!(case_id = %id, "case saved"),
            Err(e) => error!(case_id = %result.case_id, error = %e, "case could not be saved"),
        }

        Submission { result, saved_as }
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
