//! Verification of exported case documents.
//!
//! A finalized `CaseResult` is persisted and shared as JSON. Before a case
//! document is written or trusted, it is checked for structure (JSON Schema),
//! for a decision consistent with its own results, and for a contiguous audit
//! sequence. Hash-chain verification needs the audit crate and is done by the
//! caller.

use serde_json::{json, Value};

use rxsentinel_contracts::{
    check::{CheckKind, Severity},
    error::{SentinelError, SentinelResult},
};

use crate::{
    engine::FieldVerifier,
    schema::{DocumentSchema, FieldRule, FieldRuleKind, VerificationReport},
};

pub const CASE_DOCUMENT_SCHEMA_ID: &str = "case-document-v1";

/// JSON Schema for a serialized `CaseResult`.
pub fn case_json_schema() -> Value {
    let check_names: Vec<&str> = CheckKind::ALL.iter().map(|k| k.name()).collect();
    let alert_sources: Vec<Value> = check_names
        .iter()
        .map(|n| json!(n))
        .chain([Value::Null])
        .collect();
    let severity = json!({ "enum": ["info", "warning", "critical"] });
    let unit = json!({ "type": "number", "minimum": 0, "maximum": 1 });
    let hash = json!({ "type": "string", "pattern": "^[0-9a-f]{64}$" });

    json!({
        "$schema": "http://json-schema.org/draft-07/schema#",
        "type": "object",
        "required": [
            "case_id", "prescription_data", "check_results", "alerts",
            "confidence_score", "approval_status", "case_summary", "audit_trail"
        ],
        "properties": {
            "case_id": { "type": "string", "minLength": 1 },
            "prescription_data": { "type": ["object", "null"] },
            "check_results": {
                "type": "object",
                "propertyNames": { "enum": check_names },
                "additionalProperties": {
                    "type": "object",
                    "required": ["check_name", "status", "findings", "confidence"],
                    "properties": {
                        "check_name": { "enum": check_names },
                        "status": { "enum": ["pass", "fail", "warning", "inconclusive"] },
                        "findings": {
                            "type": "array",
                            "items": {
                                "type": "object",
                                "required": ["severity", "code", "message"],
                                "properties": { "severity": severity }
                            }
                        },
                        "confidence": unit
                    }
                }
            },
            "alerts": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["severity", "source_check", "message"],
                    "properties": {
                        "severity": severity,
                        "source_check": { "enum": alert_sources },
                        "message": { "type": "string" }
                    }
                }
            },
            "confidence_score": unit,
            "approval_status": { "enum": ["approved", "rejected", "needs_review"] },
            "case_summary": { "type": "string" },
            "audit_trail": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": [
                        "sequence_number", "agent", "action", "timestamp",
                        "prev_hash", "entry_hash"
                    ],
                    "properties": {
                        "sequence_number": { "type": "integer", "minimum": 1 },
                        "agent": { "type": "string" },
                        "action": { "type": "string" },
                        "timestamp": { "type": "string" },
                        "prev_hash": hash,
                        "entry_hash": hash
                    }
                }
            }
        }
    })
}

/// Schema plus consistency rules for case documents.
pub fn case_document_schema() -> DocumentSchema {
    DocumentSchema {
        schema_id: CASE_DOCUMENT_SCHEMA_ID.to_string(),
        json_schema: case_json_schema(),
        structural_severity: Severity::Critical,
        rules: vec![
            FieldRule::new(
                "approval-consistent",
                "An approved case has no failed check and no critical alert",
                Severity::Critical,
                FieldRuleKind::Custom {
                    function_name: "approval-consistent".to_string(),
                },
            ),
            FieldRule::new(
                "audit-sequence-contiguous",
                "Audit sequence numbers run 1..N without gaps",
                Severity::Critical,
                FieldRuleKind::Custom {
                    function_name: "audit-sequence-contiguous".to_string(),
                },
            ),
            FieldRule::new(
                "summary-present",
                "Every finalized case carries a summary",
                Severity::Warning,
                FieldRuleKind::RequiredField {
                    field_path: "case_summary".to_string(),
                },
            ),
        ],
    }
}

/// A verifier with the case-document custom rules registered.
pub fn case_document_verifier() -> FieldVerifier {
    FieldVerifier::new()
        .with_rule("approval-consistent", Box::new(approval_consistent))
        .with_rule("audit-sequence-contiguous", Box::new(audit_sequence_contiguous))
}

/// Verify an exported case document.
pub fn verify_case_document(document: &Value) -> VerificationReport {
    case_document_verifier().verify(document, &case_document_schema())
}

/// Like `verify_case_document`, but any critical violation is an error.
pub fn ensure_valid_case_document(document: &Value) -> SentinelResult<()> {
    let report = verify_case_document(document);
    if report.max_severity() == Some(Severity::Critical) {
        return Err(SentinelError::DocumentInvalid {
            reason: report.summary(),
        });
    }
    Ok(())
}

fn approval_consistent(document: &Value) -> Option<String> {
    if document.get("approval_status").and_then(Value::as_str) != Some("approved") {
        return None;
    }
    let failed = document
        .get("check_results")
        .and_then(Value::as_object)
        .map(|results| {
            results
                .values()
                .any(|r| r.get("status").and_then(Value::as_str) == Some("fail"))
        })
        .unwrap_or(false);
    let critical = document
        .get("alerts")
        .and_then(Value::as_array)
        .map(|alerts| {
            alerts
                .iter()
                .any(|a| a.get("severity").and_then(Value::as_str) == Some("critical"))
        })
        .unwrap_or(false);

    match (failed, critical) {
        (false, false) => None,
        (true, _) => Some("case is approved but a check failed".to_string()),
        (false, true) => Some("case is approved but carries a critical alert".to_string()),
    }
}

fn audit_sequence_contiguous(document: &Value) -> Option<String> {
    let entries = document.get("audit_trail").and_then(Value::as_array)?;
    for (i, entry) in entries.iter().enumerate() {
        let expected = i as u64 + 1;
        let found = entry.get("sequence_number").and_then(Value::as_u64);
        if found != Some(expected) {
            return Some(format!(
                "audit entry at position {i} has sequence number {}, expected {expected}",
                found.map_or_else(|| "none".to_string(), |n| n.to_string())
            ));
        }
    }
    None
}

// ── Tests ─────────────────────────────────────────────────────────────────────
