//! Document schema, rule, and report types.
//!
//! A `DocumentSchema` pairs a JSON Schema document (structural checks) with
//! field rules that go beyond what JSON Schema can express. Every rule
//! carries the severity its violation is reported at, so callers can map a
//! report straight onto check findings.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use rxsentinel_contracts::check::Severity;

/// Rule id used for structural (JSON Schema) violations.
pub const JSON_SCHEMA_RULE: &str = "json-schema";

/// What a JSON document is checked against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentSchema {
    /// Unique identifier, e.g. "prescription-documentation-v1".
    pub schema_id: String,
    /// JSON Schema document. `Value::Null` means no structural constraint.
    pub json_schema: Value,
    /// Severity of structural violations.
    #[serde(default = "critical")]
    pub structural_severity: Severity,
    /// Evaluated in order after structural validation.
    pub rules: Vec<FieldRule>,
}

fn critical() -> Severity {
    Severity::Critical
}

/// A single field rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldRule {
    /// Referenced in violations; becomes the finding code.
    pub rule_id: String,
    pub description: String,
    pub severity: Severity,
    pub kind: FieldRuleKind,
}

impl FieldRule {
    pub fn new(rule_id: &str, description: &str, severity: Severity, kind: FieldRuleKind) -> Self {
        Self {
            rule_id: rule_id.to_string(),
            description: description.to_string(),
            severity,
            kind,
        }
    }
}

/// The rule kinds the verifier supports.
///
/// Field paths are dotted (`"prescriber.npi"`). A `*` segment fans out over
/// every element of an array (`"medications.*.directions"`); the rule then
/// applies to each element.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum FieldRuleKind {
    /// Present, non-null, and not an empty or blank string.
    RequiredField { field_path: String },

    /// Must equal one of `allowed`.
    AllowedValues {
        field_path: String,
        allowed: Vec<Value>,
    },

    /// String values must not contain `pattern` (ASCII case-insensitive).
    /// Absent and non-string values pass.
    ForbiddenPattern { field_path: String, pattern: String },

    /// Delegate to a function registered on the verifier.
    Custom { function_name: String },
}

/// One rule violation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    pub rule_id: String,
    pub severity: Severity,
    pub message: String,
}

/// Every violation found in one verification run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationReport {
    pub schema_id: String,
    pub violations: Vec<Violation>,
}

impl VerificationReport {
    pub fn passed(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn max_severity(&self) -> Option<Severity> {
        self.violations.iter().map(|v| v.severity).max()
    }

    /// All violation messages joined into one line.
    pub fn summary(&self) -> String {
        self.violations
            .iter()
            .map(|v| format!("[{}] {}", v.rule_id, v.message))
            .collect::<Vec<_>>()
            .join("; ")
    }
}
