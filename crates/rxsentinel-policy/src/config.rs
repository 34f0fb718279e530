//! Pipeline configuration loaded from TOML.
//!
//! One file configures both the orchestrator (`[orchestrator]`) and the
//! aggregation policy (`[aggregation]`). Every key is optional; omitted keys
//! take the built-in defaults. Values are validated at load time, so an
//! orchestrator is never built from a policy that could, for example, approve
//! a failed case.

use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use rxsentinel_contracts::{
    case::ApprovalStatus,
    check::CheckKind,
    error::{SentinelError, SentinelResult},
};
use rxsentinel_core::OrchestratorConfig;

use crate::rule::{default_rules, Condition, DecisionRule};

/// The policy file shipped with the crate.
pub const DEFAULT_POLICY: &str = include_str!("../policies/default.toml");

/// Relative weight of each check in the confidence score.
///
/// Keyed by check name in TOML:
/// ```toml
/// [aggregation.weights]
/// license_verification = 0.20
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CheckWeights {
    pub license_verification: f64,
    pub dea_verification: f64,
    pub state_compliance: f64,
    pub controlled_substance_check: f64,
    pub dosage_monitoring: f64,
    pub bud_validation: f64,
    pub compounding_compliance: f64,
    pub clinical_documentation: f64,
}

impl Default for CheckWeights {
    fn default() -> Self {
        Self {
            license_verification: 0.20,
            dea_verification: 0.20,
            state_compliance: 0.10,
            controlled_substance_check: 0.125,
            dosage_monitoring: 0.125,
            bud_validation: 0.075,
            compounding_compliance: 0.075,
            clinical_documentation: 0.10,
        }
    }
}

impl CheckWeights {
    pub fn weight(&self, kind: CheckKind) -> f64 {
        match kind {
            CheckKind::License => self.license_verification,
            CheckKind::Dea => self.dea_verification,
            CheckKind::StateCompliance => self.state_compliance,
            CheckKind::ControlledSubstance => self.controlled_substance_check,
            CheckKind::DosageMonitoring => self.dosage_monitoring,
            CheckKind::BudValidation => self.bud_validation,
            CheckKind::CompoundingCompliance => self.compounding_compliance,
            CheckKind::ClinicalDocumentation => self.clinical_documentation,
        }
    }

    pub fn total(&self) -> f64 {
        CheckKind::ALL.into_iter().map(|k| self.weight(k)).sum()
    }
}

/// How check results are combined into a decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregationPolicy {
    /// Cases scoring below this need review.
    pub review_threshold: f64,
    /// Fraction of its weight an inconclusive result contributes.
    pub inconclusive_weight_factor: f64,
    pub weights: CheckWeights,
    /// Decision table, first match wins.
    pub rules: Vec<DecisionRule>,
}

impl Default for AggregationPolicy {
    fn default() -> Self {
        Self {
            review_threshold: 0.75,
            inconclusive_weight_factor: 0.5,
            weights: CheckWeights::default(),
            rules: default_rules(),
        }
    }
}

impl AggregationPolicy {
    pub fn validate(&self) -> SentinelResult<()> {
        unit_range("aggregation.review_threshold", self.review_threshold)?;
        unit_range(
            "aggregation.inconclusive_weight_factor",
            self.inconclusive_weight_factor,
        )?;

        for kind in CheckKind::ALL {
            let w = self.weights.weight(kind);
            if !w.is_finite() || w < 0.0 {
                return Err(config_error(format!(
                    "aggregation.weights.{kind} must be a non-negative number, got {w}"
                )));
            }
        }
        if self.weights.total() <= 0.0 {
            return Err(config_error(
                "aggregation.weights must not all be zero".to_string(),
            ));
        }

        self.validate_rules()
    }

    /// The table must be total, and every rule ahead of full `any-fail` and
    /// `any-critical` coverage must reject.
    fn validate_rules(&self) -> SentinelResult<()> {
        let Some(last) = self.rules.last() else {
            return Err(config_error("aggregation.rules must not be empty".to_string()));
        };
        if !last.is_unconditional() {
            return Err(config_error(format!(
                "last decision rule '{}' must match \"always\"",
                last.id
            )));
        }

        let mut ids = BTreeSet::new();
        let mut guarded = BTreeSet::new();
        for rule in &self.rules {
            if !ids.insert(rule.id.as_str()) {
                return Err(config_error(format!("duplicate decision rule id '{}'", rule.id)));
            }
            if rule.when.is_empty() {
                return Err(config_error(format!(
                    "decision rule '{}' has no conditions and can never match",
                    rule.id
                )));
            }
            if rule.verdict == ApprovalStatus::Rejected {
                if rule.is_unconditional() {
                    guarded.extend(REJECTION_GUARDS);
                } else {
                    guarded.extend(rule.when.iter().copied());
                }
                continue;
            }
            if let Some(unguarded) = REJECTION_GUARDS.into_iter().find(|c| !guarded.contains(c)) {
                return Err(config_error(format!(
                    "decision rule '{}' decides {} before any rejecting rule handles {:?}",
                    rule.id, rule.verdict, unguarded
                )));
            }
        }
        Ok(())
    }
}

/// Conditions that must reach a `rejected` rule before any other verdict.
const REJECTION_GUARDS: [Condition; 2] = [Condition::AnyFail, Condition::AnyCritical];

/// The full contents of a pipeline TOML file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub orchestrator: OrchestratorConfig,
    pub aggregation: AggregationPolicy,
}

impl PipelineConfig {
    /// Parse and validate a TOML document.
    ///
    /// Returns `SentinelError::ConfigError` for malformed TOML, unknown
    /// weight keys, or values that fail validation.
    pub fn from_toml_str(s: &str) -> SentinelResult<Self> {
        let config: PipelineConfig = toml::from_str(s).map_err(|e| SentinelError::ConfigError {
            reason: format!("failed to parse pipeline TOML: {e}"),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> SentinelResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| SentinelError::ConfigError {
            reason: format!("failed to read pipeline config '{}': {}", path.display(), e),
        })?;
        Self::from_toml_str(&contents)
    }

    /// The policy shipped in `policies/default.toml`.
    pub fn builtin() -> SentinelResult<Self> {
        Self::from_toml_str(DEFAULT_POLICY)
    }

    pub fn validate(&self) -> SentinelResult<()> {
        self.orchestrator.validate()?;
        self.aggregation.validate()
    }
}

fn unit_range(key: &str, value: f64) -> SentinelResult<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(config_error(format!("{key} must be within [0, 1], got {value}")))
    }
}

fn config_error(reason: String) -> SentinelError {
    SentinelError::ConfigError { reason }
}
