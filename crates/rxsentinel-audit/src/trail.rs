//! The sealed audit trail produced when a case finalizes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use rxsentinel_contracts::case::{AuditEntry, CaseId};

use crate::chain::{verify_chain, ChainViolation};

/// A sealed trail for one case.
///
/// `terminal_hash` is the `entry_hash` of the last entry and commits to the
/// whole trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditTrail {
    pub case_id: CaseId,
    /// All entries, sequence 1 first.
    pub entries: Vec<AuditEntry>,
    pub finalized_at: DateTime<Utc>,
    /// Empty string if the trail is empty.
    pub terminal_hash: String,
}

impl AuditTrail {
    pub fn verify(&self) -> Result<(), ChainViolation> {
        verify_chain(self.case_id.as_str(), &self.entries)
    }
}
