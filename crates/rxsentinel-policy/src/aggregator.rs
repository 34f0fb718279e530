//! Policy-driven aggregator implementation.
//!
//! `PolicyAggregator` implements the `Aggregator` trait from rxsentinel-core:
//!
//! 1. Every finding becomes an alert attributed to its check. Alerts are
//!    ordered most severe first; ties keep the fixed check order, then
//!    finding order. Missing checks add one `warning` alert with no source.
//! 2. The confidence score is the weighted mean of check confidences.
//!    Inconclusive results count at `inconclusive_weight_factor` of their
//!    weight. A zero total weight scores 0.
//! 3. The decision table is evaluated top to bottom; the first matching rule
//!    sets the approval status.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use rxsentinel_contracts::{
    case::{Alert, ApprovalStatus, CaseId},
    check::{clamp_unit, CheckKind, CheckResult, CheckStatus, Severity},
    error::SentinelResult,
};
use rxsentinel_core::traits::{Aggregation, Aggregator};

use crate::{config::AggregationPolicy, rule::DecisionSignals};

/// An `Aggregator` driven by an `AggregationPolicy`.
///
/// ```rust,ignore
/// use rxsentinel_policy::{PipelineConfig, PolicyAggregator};
///
/// let config = PipelineConfig::builtin()?;
/// let aggregator = PolicyAggregator::new(config.aggregation)?;
/// ```
#[derive(Debug, Clone)]
pub struct PolicyAggregator {
    policy: AggregationPolicy,
}

impl PolicyAggregator {
    /// Validate `policy` and build an aggregator around it.
    pub fn new(policy: AggregationPolicy) -> SentinelResult<Self> {
        policy.validate()?;
        Ok(Self { policy })
    }

    pub fn policy(&self) -> &AggregationPolicy {
        &self.policy
    }

    fn alerts(&self, results: &BTreeMap<CheckKind, CheckResult>) -> Vec<Alert> {
        // BTreeMap iteration is already in fixed check order.
        let mut alerts: Vec<Alert> = results
            .iter()
            .flat_map(|(kind, result)| {
                result.findings.iter().map(move |f| Alert {
                    severity: f.severity,
                    source_check: Some(*kind),
                    message: f.message.clone(),
                })
            })
            .collect();

        let missing: Vec<&str> = CheckKind::ALL
            .into_iter()
            .filter(|k| !results.contains_key(k))
            .map(CheckKind::name)
            .collect();
        if !missing.is_empty() {
            alerts.push(Alert {
                severity: Severity::Warning,
                source_check: None,
                message: format!("incomplete: no result for {}", missing.join(", ")),
            });
        }

        // Stable: equal severities keep check order.
        alerts.sort_by(|a, b| b.severity.cmp(&a.severity));
        alerts
    }

    fn confidence(&self, results: &BTreeMap<CheckKind, CheckResult>) -> f64 {
        let (weighted, total) = results.iter().fold((0.0, 0.0), |(sum, total), (kind, r)| {
            let mut w = self.policy.weights.weight(*kind);
            if r.status == CheckStatus::Inconclusive {
                w *= self.policy.inconclusive_weight_factor;
            }
            (sum + w * clamp_unit(r.confidence), total + w)
        });
        if total <= 0.0 {
            0.0
        } else {
            clamp_unit(weighted / total)
        }
    }
}

impl Aggregator for PolicyAggregator {
    fn aggregate(
        &self,
        case_id: &CaseId,
        results: &BTreeMap<CheckKind, CheckResult>,
    ) -> Aggregation {
        let alerts = self.alerts(results);
        let confidence_score = self.confidence(results);

        let signals = DecisionSignals {
            any_fail: results.values().any(|r| r.status == CheckStatus::Fail),
            any_critical: alerts.iter().any(|a| a.severity == Severity::Critical),
            any_inconclusive: results
                .values()
                .any(|r| r.status == CheckStatus::Inconclusive),
            incomplete: results.len() < CheckKind::ALL.len(),
            below_threshold: confidence_score < self.policy.review_threshold,
        };

        let (approval_status, decided_by) =
            match self.policy.rules.iter().find(|r| r.matches(&signals)) {
                Some(rule) => (rule.verdict, rule.id.clone()),
                None => {
                    // Unreachable for a validated table.
                    warn!(case_id = %case_id, ?signals, "no decision rule matched");
                    (ApprovalStatus::NeedsReview, "no-rule-matched".to_string())
                }
            };

        debug!(
            case_id = %case_id,
            rule = %decided_by,
            approval_status = %approval_status,
            confidence_score,
            alerts = alerts.len(),
            "case aggregated"
        );

        Aggregation {
            alerts,
            confidence_score,
            approval_status,
            decided_by,
        }
    }
}
