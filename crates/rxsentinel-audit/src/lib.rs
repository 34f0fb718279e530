//! # rxsentinel-audit
//!
//! Append-only, SHA-256 hash-chained audit trail for RxSentinel cases.
//!
//! ## Overview
//!
//! Every event the orchestrator records for a case becomes an `AuditEntry`
//! whose hash commits to the previous entry. Sequence numbers start at 1 and
//! are contiguous. Tampering with any entry, even a single byte of its data
//! payload, breaks the chain and is detected by `verify_chain`.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use rxsentinel_audit::CaseAuditRecorder;
//!
//! let recorder = CaseAuditRecorder::new(case_id.clone());
//! recorder.record(&case_id, "license_verification", "license_verification started", None)?;
//! let trail = recorder.finalize();
//! assert!(trail.verify().is_ok());
//! ```

pub mod chain;
pub mod recorder;
pub mod trail;

pub use chain::{hash_entry, verify_chain, ChainViolation, GENESIS_HASH};
pub use recorder::CaseAuditRecorder;
pub use trail::AuditTrail;

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use rxsentinel_contracts::case::CaseId;

    use super::{verify_chain, CaseAuditRecorder, ChainViolation, GENESIS_HASH};

    fn recorder_with(case: &str, actions: &[&str]) -> CaseAuditRecorder {
        let case_id = CaseId::from(case);
        let recorder = CaseAuditRecorder::new(case_id.clone());
        for (i, action) in actions.iter().enumerate() {
            recorder
                .record(&case_id, "pipeline", action, Some(json!({ "i": i })))
                .unwrap();
        }
        recorder
    }

    /// Writing three entries and verifying produces a valid chain.
    #[test]
    fn test_hash_chain_integrity() {
        let recorder = recorder_with("case-integrity", &["a", "b", "c"]);
        assert!(recorder.verify_integrity());
    }

    /// Sequence numbers must be 1, 2, 3, … with no gaps.
    #[test]
    fn test_sequence_starts_at_one_and_is_contiguous() {
        let recorder = recorder_with("case-seq", &["a", "b", "c", "d"]);
        let numbers: Vec<u64> = recorder.entries().iter().map(|e| e.sequence_number).collect();
        assert_eq!(numbers, vec![1, 2, 3, 4]);
    }

    /// The first entry's `prev_hash` must be the genesis sentinel.
    #[test]
    fn test_genesis_hash() {
        let recorder = recorder_with("case-genesis", &["first"]);
        assert_eq!(recorder.entries()[0].prev_hash, GENESIS_HASH);
    }

    /// Mutating a stored payload breaks the chain at that entry.
    #[test]
    fn test_tamper_detection() {
        let recorder = recorder_with("case-tamper", &["a", "b", "c"]);
        {
            let mut state = recorder.state.lock().unwrap();
            state.entries[1].data = Some(json!({ "i": "TAMPERED" }));
        }
        assert!(!recorder.verify_integrity());

        let entries = recorder.entries();
        assert_eq!(
            verify_chain("case-tamper", &entries),
            Err(ChainViolation::HashMismatch { sequence_number: 2 })
        );
    }

    /// Removing an entry is detected as a sequence gap.
    #[test]
    fn test_removal_detection() {
        let recorder = recorder_with("case-remove", &["a", "b", "c"]);
        let mut entries = recorder.entries();
        entries.remove(1);
        assert_eq!(
            verify_chain("case-remove", &entries),
            Err(ChainViolation::SequenceGap { index: 1, found: 3 })
        );
    }

    /// A trail verified under a different case id does not verify.
    #[test]
    fn test_chain_is_bound_to_case_id() {
        let recorder = recorder_with("case-a", &["a"]);
        assert!(verify_chain("case-b", &recorder.entries()).is_err());
    }

    /// A recorder refuses entries addressed to a different case.
    #[test]
    fn test_record_for_foreign_case_is_refused() {
        let recorder = CaseAuditRecorder::new(CaseId::from("case-own"));
        let result = recorder.record(&CaseId::from("case-other"), "pipeline", "x", None);
        assert!(result.is_err());
        assert!(recorder.is_empty());
    }

    /// Concurrent writers still produce a gap-free, verifiable chain.
    #[test]
    fn test_concurrent_records_are_serialized() {
        let case_id = CaseId::from("case-concurrent");
        let recorder = Arc::new(CaseAuditRecorder::new(case_id.clone()));

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let recorder = Arc::clone(&recorder);
                let case_id = case_id.clone();
                std::thread::spawn(move || {
                    for i in 0..25 {
                        recorder
                            .record(&case_id, &format!("worker-{t}"), "tick", Some(json!(i)))
                            .unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let trail = recorder.finalize();
        assert_eq!(trail.entries.len(), 200);
        assert!(trail.verify().is_ok());
        assert_eq!(trail.terminal_hash, trail.entries.last().unwrap().entry_hash);
    }

    /// A trail survives a JSON round trip and still verifies.
    #[test]
    fn test_trail_verifies_after_json_round_trip() {
        let recorder = recorder_with("case-json", &["a", "b"]);
        let json = serde_json::to_string(&recorder.entries()).unwrap();
        let decoded: Vec<rxsentinel_contracts::case::AuditEntry> =
            serde_json::from_str(&json).unwrap();
        assert!(verify_chain("case-json", &decoded).is_ok());
    }

    /// Scores with full-precision mantissas must parse back to the exact
    /// same f64, or the reloaded trail hashes differently.
    #[test]
    fn test_trail_with_arbitrary_scores_verifies_after_json_round_trip() {
        let case_id = CaseId::from("case-scores");
        let recorder = CaseAuditRecorder::new(case_id.clone());

        // xorshift64
        let mut state: u64 = 0x9e37_79b9_7f4a_7c15;
        let mut next = move || {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            (state >> 11) as f64 / (1u64 << 53) as f64
        };
        for i in 0..5_000 {
            let score = next();
            let weighted = next() * 0.125 + next() * 0.075;
            recorder
                .record(
                    &case_id,
                    "pipeline",
                    "decision made",
                    Some(json!({ "i": i, "confidence_score": score, "confidence": weighted })),
                )
                .unwrap();
        }
        let entries = recorder.entries();

        let json = serde_json::to_string_pretty(&entries).unwrap();
        let decoded: Vec<rxsentinel_contracts::case::AuditEntry> =
            serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, entries);
        assert_eq!(verify_chain("case-scores", &decoded), Ok(()));
    }

    /// An empty trail is trivially valid.
    #[test]
    fn test_verify_empty() {
        let recorder = CaseAuditRecorder::new(CaseId::from("case-empty"));
        assert!(recorder.verify_integrity());
        assert_eq!(recorder.finalize().terminal_hash, "");
    }
}
