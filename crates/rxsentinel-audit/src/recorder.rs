//! Per-case, append-only audit recorder.
//!
//! One `CaseAuditRecorder` exists per pipeline run. Checks running on
//! different tasks record into it concurrently; sequence assignment and
//! hash linking happen under a single `Mutex`, so the trail is totally
//! ordered with no gaps or duplicates. Different cases never share a
//! recorder.

use std::sync::Mutex;

use chrono::Utc;
use tracing::{error, info};

use rxsentinel_contracts::{
    case::{AuditEntry, CaseId},
    error::{SentinelError, SentinelResult},
};

use crate::{
    chain::{hash_entry, verify_chain, GENESIS_HASH},
    trail::AuditTrail,
};

/// The mutable interior of a `CaseAuditRecorder`.
pub(crate) struct RecorderState {
    pub(crate) entries: Vec<AuditEntry>,
    pub(crate) last_hash: String,
}

/// Append-only audit recorder for a single case.
pub struct CaseAuditRecorder {
    case_id: CaseId,
    pub(crate) state: Mutex<RecorderState>,
}

impl CaseAuditRecorder {
    pub fn new(case_id: CaseId) -> Self {
        Self {
            case_id,
            state: Mutex::new(RecorderState {
                entries: Vec::new(),
                last_hash: GENESIS_HASH.to_string(),
            }),
        }
    }

    pub fn case_id(&self) -> &CaseId {
        &self.case_id
    }

    /// Append one entry and return it.
    ///
    /// Refuses entries addressed to another case: a recorder's trail belongs
    /// to exactly one case.
    pub fn record(
        &self,
        case_id: &CaseId,
        agent: &str,
        action: &str,
        data: Option<serde_json::Value>,
    ) -> SentinelResult<AuditEntry> {
        if case_id != &self.case_id {
            return Err(SentinelError::AuditWriteFailed {
                reason: format!(
                    "recorder for case '{}' cannot record for case '{}'",
                    self.case_id, case_id
                ),
            });
        }

        let mut state = self.state.lock().map_err(|e| SentinelError::AuditWriteFailed {
            reason: format!("audit state lock poisoned: {e}"),
        })?;

        let mut entry = AuditEntry {
            sequence_number: state.entries.len() as u64 + 1,
            agent: agent.to_string(),
            action: action.to_string(),
            timestamp: Utc::now(),
            data,
            prev_hash: state.last_hash.clone(),
            entry_hash: String::new(),
        };
        entry.entry_hash = hash_entry(self.case_id.as_str(), &entry);

        state.last_hash = entry.entry_hash.clone();
        state.entries.push(entry.clone());

        Ok(entry)
    }

    /// Snapshot of all entries recorded so far.
    pub fn entries(&self) -> Vec<AuditEntry> {
        match self.state.lock() {
            Ok(state) => state.entries.clone(),
            Err(poisoned) => poisoned.into_inner().entries.clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True when the recorded chain verifies.
    pub fn verify_integrity(&self) -> bool {
        verify_chain(self.case_id.as_str(), &self.entries()).is_ok()
    }

    /// Seal the trail: verify the chain and return it with its terminal hash.
    ///
    /// A broken chain is logged, not repaired. The trail is returned as-is so
    /// it still reflects exactly what was recorded.
    pub fn finalize(&self) -> AuditTrail {
        let entries = self.entries();
        if let Err(violation) = verify_chain(self.case_id.as_str(), &entries) {
            error!(
                case_id = %self.case_id,
                ?violation,
                "audit chain failed verification at finalization"
            );
        }

        let terminal_hash = entries
            .last()
            .map(|e| e.entry_hash.clone())
            .unwrap_or_default();

        info!(
            case_id = %self.case_id,
            entry_count = entries.len(),
            terminal_hash = %terminal_hash,
            "audit trail finalized"
        );

        AuditTrail {
            case_id: self.case_id.clone(),
            entries,
            finalized_at: Utc::now(),
            terminal_hash,
        }
    }
}
