//! Hash-chain primitives: hashing and chain integrity verification.
//!
//! Hash input layout (bytes, in order):
//!   1. case_id as UTF-8 bytes
//!   2. sequence_number as 8-byte little-endian
//!   3. prev_hash as UTF-8 bytes (64 ASCII hex chars)
//!   4. agent, a 0x1f separator, action, a 0x1f separator
//!   5. timestamp as RFC 3339 with nanoseconds
//!   6. canonical JSON of data (`null` when absent)

use chrono::SecondsFormat;
use sha2::{Digest, Sha256};

use rxsentinel_contracts::case::AuditEntry;

/// The `prev_hash` of the first entry in every case trail.
pub const GENESIS_HASH: &str =
    "0000000000000000000000000000000000000000000000000000000000000000";

const FIELD_SEPARATOR: [u8; 1] = [0x1f];

/// Compute the SHA-256 hash (lowercase hex) of an entry's content.
///
/// `entry.entry_hash` is ignored; every other field is committed to.
pub fn hash_entry(case_id: &str, entry: &AuditEntry) -> String {
    let data = entry
        .data
        .as_ref()
        .map(|v| v.to_string())
        .unwrap_or_else(|| "null".to_string());

    let mut hasher = Sha256::new();
    hasher.update(case_id.as_bytes());
    hasher.update(entry.sequence_number.to_le_bytes());
    hasher.update(entry.prev_hash.as_bytes());
    hasher.update(entry.agent.as_bytes());
    hasher.update(FIELD_SEPARATOR);
    hasher.update(entry.action.as_bytes());
    hasher.update(FIELD_SEPARATOR);
    hasher.update(
        entry
            .timestamp
            .to_rfc3339_opts(SecondsFormat::Nanos, true)
            .as_bytes(),
    );
    hasher.update(data.as_bytes());

    hex::encode(hasher.finalize())
}

/// Why a trail failed verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainViolation {
    /// Entry at `index` does not carry sequence number `index + 1`.
    SequenceGap { index: usize, found: u64 },
    /// Entry's `prev_hash` is not the previous entry's hash.
    BrokenLink { sequence_number: u64 },
    /// Entry's stored hash does not match its content.
    HashMismatch { sequence_number: u64 },
}

/// Verify a case trail. An empty trail is valid.
///
/// Checks, for every entry in order: the sequence number is exactly its
/// 1-based position, `prev_hash` links to the previous entry (or genesis),
/// and `entry_hash` matches the recomputed hash.
pub fn verify_chain(case_id: &str, entries: &[AuditEntry]) -> Result<(), ChainViolation> {
    let mut expected_prev = GENESIS_HASH.to_string();

    for (index, entry) in entries.iter().enumerate() {
        if entry.sequence_number != index as u64 + 1 {
            return Err(ChainViolation::SequenceGap {
                index,
                found: entry.sequence_number,
            });
        }
        if entry.prev_hash != expected_prev {
            return Err(ChainViolation::BrokenLink {
                sequence_number: entry.sequence_number,
            });
        }
        if entry.entry_hash != hash_entry(case_id, entry) {
            return Err(ChainViolation::HashMismatch {
                sequence_number: entry.sequence_number,
            });
        }
        expected_prev = entry.entry_hash.clone();
    }

    Ok(())
}
