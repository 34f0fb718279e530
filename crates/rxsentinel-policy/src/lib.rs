//! # rxsentinel-policy
//!
//! TOML-driven aggregation policy for the RxSentinel pipeline.
//!
//! ## Overview
//!
//! This crate provides [`PolicyAggregator`], which implements the
//! [`Aggregator`](rxsentinel_core::traits::Aggregator) trait, and
//! [`PipelineConfig`], which loads orchestrator settings and the aggregation
//! policy from one TOML file. Check weights, the review threshold, and the
//! approval decision table are all configuration.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use std::path::Path;
//! use rxsentinel_policy::{PipelineConfig, PolicyAggregator};
//!
//! let config = PipelineConfig::from_file(Path::new("policies/default.toml"))?;
//! let aggregator = PolicyAggregator::new(config.aggregation.clone())?;
//! ```
//!
//! ## Decision table
//!
//! Rules are applied in declaration order; the first match wins. A table is
//! rejected at load time unless its last rule is `when = ["always"]` and no
//! rule with another verdict comes before rejecting rules covering both
//! `any-fail` and `any-critical`.

pub mod aggregator;
pub mod config;
pub mod rule;

pub use aggregator::PolicyAggregator;
pub use config::{AggregationPolicy, CheckWeights, PipelineConfig, DEFAULT_POLICY};
pub use rule::{default_rules, Condition, DecisionRule, DecisionSignals};

// ── Tests ─────────────────────────────────────────────────────────────────────


// ── Properties ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod properties {
    use std::collections::BTreeMap;

    use proptest::prelude::*;

    use rxsentinel_contracts::{
        case::{ApprovalStatus, CaseId},
        check::{CheckKind, CheckResult, CheckStatus, Finding, Severity},
    };
    use rxsentinel_core::traits::Aggregator;

    use crate::{AggregationPolicy, Condition, DecisionRule, PolicyAggregator};

    fn status() -> impl Strategy<Value = CheckStatus> {
        prop_oneof![
            Just(CheckStatus::Pass),
            Just(CheckStatus::Fail),
            Just(CheckStatus::Warning),
            Just(CheckStatus::Inconclusive),
        ]
    }

    fn severity() -> impl Strategy<Value = Severity> {
        prop_oneof![
            Just(Severity::Info),
            Just(Severity::Warning),
            Just(Severity::Critical),
        ]
    }

    /// Mostly in range, sometimes out of it or not a number at all.
    fn confidence() -> impl Strategy<Value = f64> {
        prop_oneof![
            4 => 0.0..=1.0f64,
            1 => -5.0..5.0f64,
            1 => Just(f64::NAN),
            1 => Just(f64::INFINITY),
            1 => Just(f64::NEG_INFINITY),
        ]
    }

    fn verdict() -> impl Strategy<Value = ApprovalStatus> {
        prop_oneof![
            Just(ApprovalStatus::Approved),
            Just(ApprovalStatus::Rejected),
            Just(ApprovalStatus::NeedsReview),
        ]
    }

    fn condition() -> impl Strategy<Value = Condition> {
        prop_oneof![
            Just(Condition::AnyFail),
            Just(Condition::AnyCritical),
            Just(Condition::AnyInconclusive),
            Just(Condition::Incomplete),
            Just(Condition::BelowThreshold),
            Just(Condition::Always),
        ]
    }

    /// Up to eight results; a `None` slot leaves that check missing.
    fn results() -> impl Strategy<Value = BTreeMap<CheckKind, CheckResult>> {
        let slot = proptest::option::weighted(
            0.85,
            (status(), confidence(), proptest::collection::vec(severity(), 0..3)),
        );
        proptest::collection::vec(slot, CheckKind::ALL.len()).prop_map(|slots| {
            CheckKind::ALL
                .into_iter()
                .zip(slots)
                .filter_map(|(kind, slot)| {
                    slot.map(|(status, confidence, severities)| {
                        let findings = severities
                            .into_iter()
                            .enumerate()
                            .map(|(i, s)| Finding::new(s, format!("finding-{i}"), "generated"))
                            .collect();
                        (kind, CheckResult::new(kind, status, findings, confidence))
                    })
                })
                .collect()
        })
    }

    /// A table that passes validation: rejecting rules covering failures
    /// first, then arbitrary rules, then an unconditional fallback.
    fn valid_table() -> impl Strategy<Value = Vec<DecisionRule>> {
        let guards = prop_oneof![
            Just(vec![vec![Condition::AnyFail, Condition::AnyCritical]]),
            Just(vec![vec![Condition::AnyCritical], vec![Condition::AnyFail]]),
            Just(vec![
                vec![Condition::AnyFail, Condition::AnyInconclusive],
                vec![Condition::AnyCritical, Condition::BelowThreshold],
            ]),
        ];
        let middle = proptest::collection::vec(
            (proptest::collection::vec(condition(), 1..3), verdict()),
            0..4,
        );
        (guards, middle, verdict()).prop_map(|(guards, middle, fallback)| {
            let mut rules: Vec<DecisionRule> = guards
                .iter()
                .enumerate()
                .map(|(i, when)| {
                    DecisionRule::new(&format!("guard-{i}"), "", when, ApprovalStatus::Rejected)
                })
                .collect();
            rules.extend(middle.iter().enumerate().map(|(i, (when, verdict))| {
                DecisionRule::new(&format!("rule-{i}"), "", when, *verdict)
            }));
            rules.push(DecisionRule::new("fallback", "", &[Condition::Always], fallback));
            rules
        })
    }

    fn any_fail(results: &BTreeMap<CheckKind, CheckResult>) -> bool {
        results.values().any(|r| r.status == CheckStatus::Fail)
    }

    fn any_critical(results: &BTreeMap<CheckKind, CheckResult>) -> bool {
        results
            .values()
            .flat_map(|r| &r.findings)
            .any(|f| f.severity == Severity::Critical)
    }

    proptest! {
        #[test]
        fn score_is_always_in_unit_range(results in results()) {
            let aggregator = PolicyAggregator::new(AggregationPolicy::default()).unwrap();
            let score = aggregator.aggregate(&CaseId::from("prop"), &results).confidence_score;
            prop_assert!((0.0..=1.0).contains(&score), "score {}", score);
        }

        #[test]
        fn failures_and_critical_alerts_always_reject(results in results()) {
            let aggregator = PolicyAggregator::new(AggregationPolicy::default()).unwrap();
            let aggregation = aggregator.aggregate(&CaseId::from("prop"), &results);
            if any_fail(&results) || any_critical(&results) {
                prop_assert_eq!(aggregation.approval_status, ApprovalStatus::Rejected);
            }
        }

        #[test]
        fn approval_implies_a_clean_complete_case(results in results()) {
            let policy = AggregationPolicy::default();
            let threshold = policy.review_threshold;
            let aggregator = PolicyAggregator::new(policy).unwrap();
            let aggregation = aggregator.aggregate(&CaseId::from("prop"), &results);
            if aggregation.approval_status == ApprovalStatus::Approved {
                prop_assert!(!any_fail(&results));
                prop_assert!(!any_critical(&results));
                prop_assert_eq!(results.len(), CheckKind::ALL.len());
                prop_assert!(results.values().all(|r| r.status != CheckStatus::Inconclusive));
                prop_assert!(aggregation.confidence_score >= threshold);
            }
        }

        #[test]
        fn aggregation_is_deterministic(results in results()) {
            let aggregator = PolicyAggregator::new(AggregationPolicy::default()).unwrap();
            let first = aggregator.aggregate(&CaseId::from("prop"), &results);
            let second = aggregator.aggregate(&CaseId::from("prop"), &results);
            prop_assert_eq!(first, second);
        }

        #[test]
        fn valid_custom_tables_still_reject_failures(
            rules in valid_table(),
            results in results(),
        ) {
            let policy = AggregationPolicy { rules, ..AggregationPolicy::default() };
            let aggregator = PolicyAggregator::new(policy)
                .map_err(|e| TestCaseError::fail(format!("valid table refused: {e}")))?;

            let aggregation = aggregator.aggregate(&CaseId::from("prop"), &results);
            if any_fail(&results) || any_critical(&results) {
                prop_assert_eq!(aggregation.approval_status, ApprovalStatus::Rejected);
            }
        }

        #[test]
        fn tables_deciding_before_the_guard_are_refused(
            when in proptest::collection::vec(condition(), 1..3),
            verdict in prop_oneof![Just(ApprovalStatus::Approved), Just(ApprovalStatus::NeedsReview)],
        ) {
            let mut rules = vec![DecisionRule::new("early", "", &when, verdict)];
            rules.extend(crate::default_rules());
            let policy = AggregationPolicy { rules, ..AggregationPolicy::default() };
            prop_assert!(PolicyAggregator::new(policy).is_err());
        }
    }
}
