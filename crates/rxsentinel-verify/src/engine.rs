//! Field-rule verifier for JSON documents.
//!
//! `FieldVerifier` checks a JSON value against a `DocumentSchema` in two
//! phases:
//!
//! 1. **Structural**: the value is validated against `json_schema` using the
//!    `jsonschema` crate.
//! 2. **Semantic**: each `FieldRule` is evaluated in order. All violations
//!    are collected before returning.
//!
//! Custom rules delegate to named functions registered via `register_rule`.

use std::collections::HashMap;

use serde_json::Value;
use tracing::{debug, warn};

use crate::schema::{
    DocumentSchema, FieldRuleKind, VerificationReport, Violation, JSON_SCHEMA_RULE,
};

/// A caller-supplied verification function.
///
/// Receives the whole document. Returns `Some(message)` on violation.
pub type CustomRuleFn = Box<dyn Fn(&Value) -> Option<String> + Send + Sync>;

/// The field-rule verifier.
pub struct FieldVerifier {
    custom_rules: HashMap<String, CustomRuleFn>,
}

impl FieldVerifier {
    pub fn new() -> Self {
        Self {
            custom_rules: HashMap::new(),
        }
    }

    /// Register a custom rule function under `name`. Registering the same
    /// name twice replaces the previous function.
    pub fn register_rule(&mut self, name: impl Into<String>, f: CustomRuleFn) {
        self.custom_rules.insert(name.into(), f);
    }

    /// Builder form of `register_rule`.
    pub fn with_rule(mut self, name: impl Into<String>, f: CustomRuleFn) -> Self {
        self.register_rule(name, f);
        self
    }

    /// Verify `document` against `schema`.
    pub fn verify(&self, document: &Value, schema: &DocumentSchema) -> VerificationReport {
        let mut violations: Vec<Violation> = Vec::new();

        // ── Phase 1: JSON Schema structural validation ────────────────────────
        if !schema.json_schema.is_null() {
            match jsonschema::validator_for(&schema.json_schema) {
                Ok(validator) => {
                    for error in validator.iter_errors(document) {
                        let message = format!(
                            "JSON Schema violation at '{}': {}",
                            error.instance_path, error
                        );
                        warn!(schema_id = %schema.schema_id, %message, "structural validation failure");
                        violations.push(Violation {
                            rule_id: JSON_SCHEMA_RULE.to_string(),
                            severity: schema.structural_severity,
                            message,
                        });
                    }
                }
                Err(e) => {
                    let message = format!("invalid JSON Schema document: {e}");
                    warn!(schema_id = %schema.schema_id, %message, "schema compilation failure");
                    violations.push(Violation {
                        rule_id: JSON_SCHEMA_RULE.to_string(),
                        severity: schema.structural_severity,
                        message,
                    });
                }
            }
        }

        // ── Phase 2: Field rules ──────────────────────────────────────────────
        for rule in &schema.rules {
            debug!(
                rule_id = %rule.rule_id,
                description = %rule.description,
                "evaluating field rule"
            );

            let failure: Option<String> = match &rule.kind {
                FieldRuleKind::RequiredField { field_path } => {
                    let found = resolve_all(document, field_path);
                    let missing = found.is_empty() || found.iter().any(|v| !is_present(*v));
                    missing.then(|| format!("required field '{field_path}' is missing or empty"))
                }

                FieldRuleKind::AllowedValues {
                    field_path,
                    allowed,
                } => {
                    let found = resolve_all(document, field_path);
                    if found.is_empty() || found.iter().any(|v| v.is_none()) {
                        Some(format!(
                            "field '{field_path}' is missing; cannot check allowed values"
                        ))
                    } else {
                        found
                            .iter()
                            .flatten()
                            .find(|v| !allowed.contains(v))
                            .map(|actual| {
                                format!(
                                    "field '{field_path}' has value {actual} which is not in the allowed set"
                                )
                            })
                    }
                }

                FieldRuleKind::ForbiddenPattern {
                    field_path,
                    pattern,
                } => {
                    let needle = pattern.to_ascii_lowercase();
                    let hit = resolve_all(document, field_path)
                        .into_iter()
                        .flatten()
                        .filter_map(Value::as_str)
                        .any(|s| s.to_ascii_lowercase().contains(&needle));
                    hit.then(|| format!("field '{field_path}' contains forbidden pattern '{pattern}'"))
                }

                FieldRuleKind::Custom { function_name } => {
                    match self.custom_rules.get(function_name.as_str()) {
                        Some(f) => f(document),
                        None => Some(format!(
                            "no custom rule registered for function name '{function_name}'"
                        )),
                    }
                }
            };

            if let Some(message) = failure {
                debug!(rule_id = %rule.rule_id, %message, "field rule violated");
                violations.push(Violation {
                    rule_id: rule.rule_id.clone(),
                    severity: rule.severity,
                    message,
                });
            }
        }

        debug!(
            schema_id = %schema.schema_id,
            passed = violations.is_empty(),
            violation_count = violations.len(),
            "verification complete"
        );

        VerificationReport {
            schema_id: schema.schema_id.clone(),
            violations,
        }
    }
}

impl Default for FieldVerifier {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolve a dotted path, fanning out over arrays at `*` segments.
///
/// Returns one entry per branch: `Some` with the value (possibly null) where
/// the path resolved, `None` where a segment was missing. An empty vector
/// means a `*` met an empty array or a non-array.
fn resolve_all<'v>(value: &'v Value, path: &str) -> Vec<Option<&'v Value>> {
    let mut branches: Vec<Option<&'v Value>> = vec![Some(value)];
    for segment in path.split('.') {
        let mut next = Vec::with_capacity(branches.len());
        for branch in branches {
            match branch {
                None => next.push(None),
                Some(v) if segment == "*" => {
                    if let Some(items) = v.as_array() {
                        next.extend(items.iter().map(Some));
                    }
                }
                Some(v) => next.push(v.get(segment)),
            }
        }
        branches = next;
    }
    branches
}

fn is_present(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.trim().is_empty(),
        Some(_) => true,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use rxsentinel_contracts::check::Severity;

    use super::FieldVerifier;
    use crate::schema::{DocumentSchema, FieldRule, FieldRuleKind};

    // ── Builder helpers ───────────────────────────────────────────────────────

    fn make_schema(json_schema: Value, rules: Vec<FieldRule>) -> DocumentSchema {
        DocumentSchema {
            schema_id: "test-schema-v1".to_string(),
            json_schema,
            structural_severity: Severity::Critical,
            rules,
        }
    }

    fn rule(id: &str, severity: Severity, kind: FieldRuleKind) -> FieldRule {
        FieldRule::new(id, "test rule", severity, kind)
    }

    fn required(path: &str) -> FieldRuleKind {
        FieldRuleKind::RequiredField {
            field_path: path.to_string(),
        }
    }

    // ── JSON Schema tests ─────────────────────────────────────────────────────

    #[test]
    fn test_schema_pass() {
        let json_schema = json!({
            "type": "object",
            "properties": { "status": { "type": "string" } },
            "required": ["status"]
        });
        let report = FieldVerifier::new().verify(&json!({ "status": "ok" }), &make_schema(json_schema, vec![]));
        assert!(report.passed(), "expected pass, violations: {:?}", report.violations);
    }

    #[test]
    fn test_schema_fail_uses_structural_severity() {
        let json_schema = json!({
            "type": "object",
            "properties": { "status": { "type": "string" } },
            "required": ["status"]
        });
        let mut schema = make_schema(json_schema, vec![]);
        schema.structural_severity = Severity::Warning;

        let report = FieldVerifier::new().verify(&json!({ "other_field": 42 }), &schema);

        assert!(!report.passed());
        assert_eq!(report.violations[0].rule_id, "json-schema");
        assert_eq!(report.violations[0].severity, Severity::Warning);
    }

    // ── RequiredField tests ───────────────────────────────────────────────────

    #[test]
    fn test_required_field() {
        let schema = make_schema(
            Value::Null,
            vec![rule("req-npi", Severity::Warning, required("prescriber.npi"))],
        );
        let verifier = FieldVerifier::new();

        assert!(verifier
            .verify(&json!({ "prescriber": { "npi": "1234567893" } }), &schema)
            .passed());

        for doc in [
            json!({ "prescriber": {} }),
            json!({ "prescriber": { "npi": null } }),
            json!({ "prescriber": { "npi": "   " } }),
            json!({ "other": 1 }),
        ] {
            let report = verifier.verify(&doc, &schema);
            assert_eq!(report.violations.len(), 1, "{doc}");
            assert_eq!(report.violations[0].rule_id, "req-npi");
            assert_eq!(report.max_severity(), Some(Severity::Warning));
            assert!(report.violations[0].message.contains("prescriber.npi"));
        }
    }

    /// A `*` segment applies the rule to every array element.
    #[test]
    fn test_required_field_over_array() {
        let schema = make_schema(
            Value::Null,
            vec![rule(
                "req-directions",
                Severity::Critical,
                required("medications.*.directions"),
            )],
        );
        let verifier = FieldVerifier::new();

        let complete = json!({ "medications": [
            { "directions": "take 1 tablet daily" },
            { "directions": "apply twice daily" }
        ]});
        assert!(verifier.verify(&complete, &schema).passed());

        let one_missing = json!({ "medications": [
            { "directions": "take 1 tablet daily" },
            { "name": "cream" }
        ]});
        assert!(!verifier.verify(&one_missing, &schema).passed());

        let empty = json!({ "medications": [] });
        assert!(!verifier.verify(&empty, &schema).passed());
    }

    // ── AllowedValues tests ───────────────────────────────────────────────────

    #[test]
    fn test_allowed_values() {
        let schema = make_schema(
            Value::Null,
            vec![rule(
                "allowed-status",
                Severity::Critical,
                FieldRuleKind::AllowedValues {
                    field_path: "status".to_string(),
                    allowed: vec![json!("approved"), json!("pending")],
                },
            )],
        );
        let verifier = FieldVerifier::new();

        assert!(verifier.verify(&json!({ "status": "approved" }), &schema).passed());
        let report = verifier.verify(&json!({ "status": "rejected" }), &schema);
        assert_eq!(report.violations[0].rule_id, "allowed-status");
        assert!(!verifier.verify(&json!({}), &schema).passed());
    }

    // ── ForbiddenPattern tests ────────────────────────────────────────────────

    #[test]
    fn test_forbidden_pattern_is_case_insensitive() {
        let schema = make_schema(
            Value::Null,
            vec![rule(
                "sig-as-directed",
                Severity::Warning,
                FieldRuleKind::ForbiddenPattern {
                    field_path: "medications.*.directions".to_string(),
                    pattern: "as directed".to_string(),
                },
            )],
        );
        let verifier = FieldVerifier::new();

        let vague = json!({ "medications": [{ "directions": "Use As Directed" }] });
        let report = verifier.verify(&vague, &schema);
        assert_eq!(report.violations.len(), 1);
        assert!(report.violations[0].message.contains("as directed"));

        let clear = json!({ "medications": [{ "directions": "take 1 tablet at bedtime" }] });
        assert!(verifier.verify(&clear, &schema).passed());

        // Absent field: nothing to check.
        assert!(verifier.verify(&json!({ "medications": [{}] }), &schema).passed());
    }

    // ── Custom rule tests ─────────────────────────────────────────────────────

    #[test]
    fn test_custom_rules() {
        let verifier = FieldVerifier::new()
            .with_rule("always-pass", Box::new(|_doc: &Value| None))
            .with_rule(
                "signed",
                Box::new(|doc: &Value| {
                    (doc.get("signature_present") != Some(&json!(true)))
                        .then(|| "prescription is not signed".to_string())
                }),
            );
        let schema = make_schema(
            Value::Null,
            vec![
                rule(
                    "pass",
                    Severity::Info,
                    FieldRuleKind::Custom {
                        function_name: "always-pass".to_string(),
                    },
                ),
                rule(
                    "signature",
                    Severity::Critical,
                    FieldRuleKind::Custom {
                        function_name: "signed".to_string(),
                    },
                ),
            ],
        );

        assert!(verifier.verify(&json!({ "signature_present": true }), &schema).passed());
        let report = verifier.verify(&json!({ "signature_present": false }), &schema);
        assert_eq!(report.violations.len(), 1);
        assert_eq!(report.violations[0].rule_id, "signature");
        assert!(report.summary().contains("not signed"));
    }

    /// An unregistered custom function is itself a violation.
    #[test]
    fn test_unregistered_custom_rule() {
        let schema = make_schema(
            Value::Null,
            vec![rule(
                "phantom-check",
                Severity::Warning,
                FieldRuleKind::Custom {
                    function_name: "does-not-exist".to_string(),
                },
            )],
        );
        let report = FieldVerifier::new().verify(&json!({}), &schema);
        assert_eq!(report.violations[0].rule_id, "phantom-check");
        assert!(report.violations[0].message.contains("does-not-exist"));
    }

    /// Violations keep rule order.
    #[test]
    fn test_all_violations_are_collected_in_order() {
        let schema = make_schema(
            Value::Null,
            vec![
                rule("first", Severity::Warning, required("a")),
                rule("second", Severity::Critical, required("b")),
            ],
        );
        let report = FieldVerifier::new().verify(&json!({}), &schema);
        let ids: Vec<&str> = report.violations.iter().map(|v| v.rule_id.as_str()).collect();
        assert_eq!(ids, vec!["first", "second"]);
        assert_eq!(report.max_severity(), Some(Severity::Critical));
    }
}
