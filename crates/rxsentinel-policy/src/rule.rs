//! Decision rule types.
//!
//! The approval decision is an ordered table of `DecisionRule`s. Rules are
//! evaluated in declaration order and the first matching rule decides the
//! case. A table is only accepted if its last rule matches unconditionally,
//! so every case gets a decision.

use serde::{Deserialize, Serialize};

use rxsentinel_contracts::case::ApprovalStatus;

/// A fact about the checked case that a rule can match on.
///
/// Expressed as kebab-case strings in TOML:
/// ```toml
/// when = ["any-fail", "any-critical"]
/// when = ["always"]
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Condition {
    /// At least one check returned `fail`.
    AnyFail,
    /// At least one alert is `critical`.
    AnyCritical,
    /// At least one check is `inconclusive`.
    AnyInconclusive,
    /// At least one of the eight checks has no result.
    Incomplete,
    /// The confidence score is below `review_threshold`.
    BelowThreshold,
    /// Matches every case.
    Always,
}

/// The facts the rules are matched against, computed once per case.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecisionSignals {
    pub any_fail: bool,
    pub any_critical: bool,
    pub any_inconclusive: bool,
    pub incomplete: bool,
    pub below_threshold: bool,
}

impl DecisionSignals {
    pub fn holds(&self, condition: Condition) -> bool {
        match condition {
            Condition::AnyFail => self.any_fail,
            Condition::AnyCritical => self.any_critical,
            Condition::AnyInconclusive => self.any_inconclusive,
            Condition::Incomplete => self.incomplete,
            Condition::BelowThreshold => self.below_threshold,
            Condition::Always => true,
        }
    }
}

/// One row of the decision table.
///
/// Example in TOML:
/// ```toml
/// [[aggregation.rules]]
/// id = "reject-on-failure"
/// description = "A failed check or a critical alert rejects the case"
/// when = ["any-fail", "any-critical"]
/// verdict = "rejected"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRule {
    /// Stable identifier, reported as `decided_by` and written to the audit
    /// trail.
    pub id: String,

    #[serde(default)]
    pub description: String,

    /// The rule matches when ANY listed condition holds.
    pub when: Vec<Condition>,

    pub verdict: ApprovalStatus,
}

impl DecisionRule {
    pub fn new(
        id: &str,
        description: &str,
        when: &[Condition],
        verdict: ApprovalStatus,
    ) -> Self {
        Self {
            id: id.to_string(),
            description: description.to_string(),
            when: when.to_vec(),
            verdict,
        }
    }

    pub fn matches(&self, signals: &DecisionSignals) -> bool {
        self.when.iter().any(|c| signals.holds(*c))
    }

    pub fn is_unconditional(&self) -> bool {
        self.when.contains(&Condition::Always)
    }
}

/// The built-in table: reject on failure, review on uncertainty, approve.
pub fn default_rules() -> Vec<DecisionRule> {
    vec![
        DecisionRule::new(
            "reject-on-failure",
            "A failed check or a critical alert rejects the case",
            &[Condition::AnyFail, Condition::AnyCritical],
            ApprovalStatus::Rejected,
        ),
        DecisionRule::new(
            "review-on-uncertainty",
            "Inconclusive or missing checks, or low confidence, need a reviewer",
            &[
                Condition::AnyInconclusive,
                Condition::Incomplete,
                Condition::BelowThreshold,
            ],
            ApprovalStatus::NeedsReview,
        ),
        DecisionRule::new(
            "approve",
            "Everything passed with sufficient confidence",
            &[Condition::Always],
            ApprovalStatus::Approved,
        ),
    ]
}
