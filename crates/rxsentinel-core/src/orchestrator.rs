//! The RxSentinel orchestrator: dependency-ordered, bounded-concurrency
//! execution of the eight compliance checks for one case.
//!
//! One call to `run` drives a case through:
//!
//!   accept → [checks, dependency order, ≤ max_concurrency at once] → aggregate
//!          → summarize → seal audit trail → CaseResult
//!
//! Every check reaches a terminal result no matter what its unit does:
//!
//! | unit behaviour                     | result                     | dependents |
//! |------------------------------------|----------------------------|------------|
//! | `Ok(result)`                       | result, normalized         | run        |
//! | `Transient`, retries exhausted     | inconclusive + warning     | run        |
//! | `Terminal`                         | inconclusive + critical    | skipped    |
//! | panic                              | inconclusive + critical    | skipped    |
//! | attempt exceeds `check_timeout`    | inconclusive + warning     | skipped    |
//! | case exceeds `case_timeout`        | inconclusive + warning     | -          |
//!
//! Each run owns a fresh `CaseAuditRecorder`, so re-running a case never
//! appends to an earlier trail.

use std::collections::{BTreeMap, BTreeSet};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use serde_json::{json, Value};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use rxsentinel_audit::CaseAuditRecorder;
use rxsentinel_contracts::{
    case::{Alert, ApprovalStatus, CaseId, CaseResult},
    check::{clamp_unit, CheckKind, CheckResult, DependencyResults, Finding, Severity},
    error::{CheckError, ExtractionError, SentinelResult},
    prescription::PrescriptionData,
};

use crate::{
    config::OrchestratorConfig,
    registry::CheckRegistry,
    summary::{fallback_summary, SummaryInput},
    traits::{Aggregator, CheckUnit, SummaryGenerator},
};

const PIPELINE_AGENT: &str = "orchestrator";
const EXTRACTION_AGENT: &str = "extraction";

/// Drives cases through the check pipeline.
///
/// Holds no per-case state; one orchestrator can run many cases, including
/// concurrently.
pub struct Orchestrator {
    registry: CheckRegistry,
    aggregator: Arc<dyn Aggregator>,
    summarizer: Arc<dyn SummaryGenerator>,
    config: OrchestratorConfig,
}

/// A settled check and whether its dependents may still run.
#[derive(Debug, Clone)]
struct Settlement {
    result: CheckResult,
    blocks_dependents: bool,
}

impl Settlement {
    fn completed(result: CheckResult) -> Self {
        Self {
            result,
            blocks_dependents: false,
        }
    }

    fn blocking(result: CheckResult) -> Self {
        Self {
            result,
            blocks_dependents: true,
        }
    }
}

/// Scheduling state for one case.
struct CaseRun {
    case_id: CaseId,
    prescription: Arc<PrescriptionData>,
    recorder: Arc<CaseAuditRecorder>,
    semaphore: Arc<Semaphore>,
    settled: BTreeMap<CheckKind, Settlement>,
    launched: BTreeSet<CheckKind>,
    tasks: JoinSet<(CheckKind, Settlement)>,
}

/// Everything one spawned check task needs. Owned so the task is `'static`.
struct CheckTask {
    kind: CheckKind,
    unit: Arc<dyn CheckUnit>,
    prescription: Arc<PrescriptionData>,
    dependencies: DependencyResults,
    recorder: Arc<CaseAuditRecorder>,
    semaphore: Arc<Semaphore>,
    config: OrchestratorConfig,
}

impl Orchestrator {
    /// Build an orchestrator. Fails only if `config` is invalid.
    pub fn new(
        registry: CheckRegistry,
        aggregator: Arc<dyn Aggregator>,
        summarizer: Arc<dyn SummaryGenerator>,
        config: OrchestratorConfig,
    ) -> SentinelResult<Self> {
        config.validate()?;
        Ok(Self {
            registry,
            aggregator,
            summarizer,
            config,
        })
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Run every check for one case and return the finalized result.
    ///
    /// Never fails: unit errors, panics, and timeouts all become inconclusive
    /// check results, and the case still reaches a decision.
    pub async fn run(&self, prescription: PrescriptionData, case_id: CaseId) -> CaseResult {
        let recorder = Arc::new(CaseAuditRecorder::new(case_id.clone()));
        audit(
            &recorder,
            PIPELINE_AGENT,
            "case accepted",
            Some(json!({
                "checks": CheckKind::ALL.len(),
                "max_concurrency": self.config.max_concurrency,
            })),
        );
        info!(case_id = %case_id, "case accepted");

        let mut run = CaseRun {
            case_id: case_id.clone(),
            prescription: Arc::new(prescription),
            recorder: Arc::clone(&recorder),
            semaphore: Arc::new(Semaphore::new(self.config.max_concurrency)),
            settled: BTreeMap::new(),
            launched: BTreeSet::new(),
            tasks: JoinSet::new(),
        };

        let timed_out = tokio::time::timeout(self.config.case_timeout(), self.drive(&mut run))
            .await
            .is_err();
        if timed_out {
            warn!(
                case_id = %case_id,
                timeout_ms = self.config.case_timeout_ms,
                settled = run.settled.len(),
                "case timeout reached, cancelling unfinished checks"
            );
            run.tasks.abort_all();
            // Tasks that finished before the abort landed still count.
            while let Some(joined) = run.tasks.join_next().await {
                if let Ok((kind, settlement)) = joined {
                    run.settled.insert(kind, settlement);
                }
            }
        }
        self.settle_unfinished(&mut run, timed_out);

        let check_results: BTreeMap<CheckKind, CheckResult> = run
            .settled
            .into_iter()
            .map(|(kind, s)| (kind, s.result))
            .collect();
        let prescription = Arc::try_unwrap(run.prescription).unwrap_or_else(|arc| (*arc).clone());

        let aggregation = self.aggregator.aggregate(&case_id, &check_results);
        let confidence_score = clamp_unit(aggregation.confidence_score);
        audit(
            &recorder,
            PIPELINE_AGENT,
            "decision made",
            Some(json!({
                "approval_status": aggregation.approval_status,
                "confidence_score": confidence_score,
                "decided_by": aggregation.decided_by,
                "alerts": aggregation.alerts.len(),
            })),
        );

        let input = SummaryInput {
            case_id: &case_id,
            prescription: Some(&prescription),
            check_results: &check_results,
            alerts: &aggregation.alerts,
            confidence_score,
            approval_status: aggregation.approval_status,
        };
        let case_summary = match self.summarizer.summarize(&input) {
            Ok(summary) => summary,
            Err(e) => {
                warn!(case_id = %case_id, error = %e, "summary generation failed, using fallback");
                audit(
                    &recorder,
                    PIPELINE_AGENT,
                    "summary fallback used",
                    Some(json!({ "reason": e.to_string() })),
                );
                fallback_summary(&input)
            }
        };

        let trail = recorder.finalize();
        info!(
            case_id = %case_id,
            approval_status = %aggregation.approval_status,
            confidence_score,
            decided_by = %aggregation.decided_by,
            "case completed"
        );

        CaseResult {
            case_id,
            prescription_data: Some(prescription),
            check_results,
            alerts: aggregation.alerts,
            confidence_score,
            approval_status: aggregation.approval_status,
            case_summary,
            audit_trail: trail.entries,
        }
    }

    /// The result for a case whose document could not be extracted.
    ///
    /// No checks run. The trail holds exactly one entry.
    pub fn extraction_failed(&self, case_id: CaseId, error: &ExtractionError) -> CaseResult {
        let recorder = CaseAuditRecorder::new(case_id.clone());
        audit(
            &recorder,
            EXTRACTION_AGENT,
            "extraction failed",
            Some(json!({ "error": error.to_string() })),
        );
        warn!(case_id = %case_id, error = %error, "extraction failed, no checks run");

        let alerts = vec![Alert {
            severity: Severity::Critical,
            source_check: None,
            message: format!("extraction failed: {error}"),
        }];
        let check_results = BTreeMap::new();
        let case_summary = fallback_summary(&SummaryInput {
            case_id: &case_id,
            prescription: None,
            check_results: &check_results,
            alerts: &alerts,
            confidence_score: 0.0,
            approval_status: ApprovalStatus::NeedsReview,
        });

        CaseResult {
            audit_trail: recorder.finalize().entries,
            case_id,
            prescription_data: None,
            check_results,
            alerts,
            confidence_score: 0.0,
            approval_status: ApprovalStatus::NeedsReview,
            case_summary,
        }
    }

    // ── Scheduling ───────────────────────────────────────────────────────────

    /// Launch ready checks and collect results until nothing is left to run.
    async fn drive(&self, run: &mut CaseRun) {
        self.launch_ready(run);
        while let Some(joined) = run.tasks.join_next().await {
            match joined {
                Ok((kind, settlement)) => {
                    debug!(
                        case_id = %run.case_id,
                        check = %kind,
                        status = %settlement.result.status,
                        "check settled"
                    );
                    run.settled.insert(kind, settlement);
                }
                Err(e) => {
                    // Panics are caught inside the task; this is an abort.
                    error!(case_id = %run.case_id, error = %e, "check task ended without a result");
                }
            }
            self.launch_ready(run);
        }
    }

    /// One pass in fixed check order. Dependencies precede dependents in that
    /// order, so a skip cascades within the same pass.
    fn launch_ready(&self, run: &mut CaseRun) {
        for kind in CheckKind::ALL {
            if run.settled.contains_key(&kind) || run.launched.contains(&kind) {
                continue;
            }
            let deps = kind.dependencies();

            let blocked: Vec<CheckKind> = deps
                .iter()
                .copied()
                .filter(|d| run.settled.get(d).is_some_and(|s| s.blocks_dependents))
                .collect();
            if !blocked.is_empty() {
                let names = blocked.iter().map(|d| d.name()).collect::<Vec<_>>();
                warn!(case_id = %run.case_id, check = %kind, blocked_by = ?names, "skipping check");
                audit(
                    &run.recorder,
                    kind.name(),
                    &format!("{kind} skipped"),
                    Some(json!({ "reason": "dependency unavailable", "dependencies": names })),
                );
                let finding = Finding::warning(
                    "dependency-unavailable",
                    format!("not evaluated: {} did not complete", names.join(", ")),
                );
                run.settled
                    .insert(kind, Settlement::blocking(CheckResult::inconclusive(kind, finding)));
                continue;
            }

            if !deps.iter().all(|d| run.settled.contains_key(d)) {
                continue;
            }

            let dependencies: DependencyResults = deps
                .iter()
                .filter_map(|d| run.settled.get(d).map(|s| (*d, s.result.clone())))
                .collect();
            let task = CheckTask {
                kind,
                unit: self.registry.unit(kind),
                prescription: Arc::clone(&run.prescription),
                dependencies,
                recorder: Arc::clone(&run.recorder),
                semaphore: Arc::clone(&run.semaphore),
                config: self.config.clone(),
            };
            debug!(case_id = %run.case_id, check = %kind, "launching check");
            run.launched.insert(kind);
            run.tasks.spawn(task.execute());
        }
    }

    /// Give every check without a result an inconclusive one.
    ///
    /// Launched checks were cancelled mid-flight; the rest never started.
    fn settle_unfinished(&self, run: &mut CaseRun, timed_out: bool) {
        for kind in CheckKind::ALL {
            if run.settled.contains_key(&kind) {
                continue;
            }
            let cancelled = run.launched.contains(&kind);
            let action = if cancelled {
                format!("{kind} cancelled")
            } else {
                format!("{kind} skipped")
            };
            let finding = if timed_out {
                Finding::warning(
                    "case-timeout",
                    format!(
                        "not completed within the case timeout of {} ms",
                        self.config.case_timeout_ms
                    ),
                )
            } else {
                Finding::warning("check-aborted", "check task ended without a result")
            };
            audit(
                &run.recorder,
                kind.name(),
                &action,
                Some(json!({ "reason": finding.code })),
            );
            run.settled
                .insert(kind, Settlement::blocking(CheckResult::inconclusive(kind, finding)));
        }
    }
}

// ── Check execution ──────────────────────────────────────────────────────────

impl CheckTask {
    async fn execute(self) -> (CheckKind, Settlement) {
        let kind = self.kind;
        // The semaphore is never closed, so acquisition only fails if it is.
        let _permit = self.semaphore.acquire_owned().await.ok();

        audit(&self.recorder, kind.name(), &format!("{kind} started"), None);

        let mut attempts: u32 = 0;
        let settlement = loop {
            attempts += 1;
            let call = AssertUnwindSafe(self.unit.evaluate(&self.prescription, &self.dependencies))
                .catch_unwind();

            match tokio::time::timeout(self.config.check_timeout(), call).await {
                Ok(Ok(Ok(result))) => break Settlement::completed(normalize(kind, result)),
                Ok(Ok(Err(CheckError::Transient { reason }))) => {
                    if attempts > self.config.max_retries {
                        warn!(check = %kind, attempts, reason = %reason, "retries exhausted");
                        break Settlement::completed(CheckResult::inconclusive(
                            kind,
                            Finding::warning(
                                "retries-exhausted",
                                format!("{reason} (gave up after {attempts} attempts)"),
                            ),
                        ));
                    }
                    let delay = self.config.backoff(attempts);
                    warn!(
                        check = %kind,
                        attempt = attempts,
                        delay_ms = delay.as_millis() as u64,
                        reason = %reason,
                        "transient check error, retrying"
                    );
                    audit(
                        &self.recorder,
                        kind.name(),
                        &format!("{kind} retrying"),
                        Some(json!({ "attempt": attempts, "reason": reason })),
                    );
                    tokio::time::sleep(delay).await;
                }
                Ok(Ok(Err(CheckError::Terminal { reason }))) => {
                    warn!(check = %kind, reason = %reason, "terminal check error");
                    break Settlement::blocking(CheckResult::inconclusive(
                        kind,
                        Finding::critical("check-error", reason),
                    ));
                }
                Ok(Err(panic)) => {
                    let message = panic_message(panic.as_ref());
                    error!(check = %kind, panic = %message, "check unit panicked");
                    break Settlement::blocking(CheckResult::inconclusive(
                        kind,
                        Finding::critical("check-panicked", format!("check unit panicked: {message}")),
                    ));
                }
                Err(_elapsed) => {
                    warn!(
                        check = %kind,
                        timeout_ms = self.config.check_timeout_ms,
                        "check attempt timed out"
                    );
                    break Settlement::blocking(CheckResult::inconclusive(
                        kind,
                        Finding::warning(
                            "check-timeout",
                            format!("no result within {} ms", self.config.check_timeout_ms),
                        ),
                    ));
                }
            }
        };

        audit(
            &self.recorder,
            kind.name(),
            &format!("{kind} finished"),
            Some(json!({
                "status": settlement.result.status,
                "confidence": settlement.result.confidence,
                "attempts": attempts,
            })),
        );
        (kind, settlement)
    }
}

/// Force the result to name the unit that produced it, with a unit-range
/// confidence.
fn normalize(kind: CheckKind, mut result: CheckResult) -> CheckResult {
    if result.check_name != kind {
        warn!(check = %kind, reported = %result.check_name, "unit reported a foreign check name");
        result.check_name = kind;
    }
    result.confidence = clamp_unit(result.confidence);
    result
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Append to the case trail. A failed write is logged and the case goes on;
/// the gap shows up when the trail is verified.
fn audit(recorder: &CaseAuditRecorder, agent: &str, action: &str, data: Option<Value>) {
    if let Err(e) = recorder.record(recorder.case_id(), agent, action, data) {
        error!(
            case_id = %recorder.case_id(),
            agent,
            action,
            error = %e,
            "audit write failed"
        );
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;

    use rxsentinel_audit::verify_chain;
    use rxsentinel_contracts::{
        case::{Alert, ApprovalStatus, CaseId},
        check::{CheckKind, CheckResult, CheckStatus, DependencyResults, Finding, Severity},
        error::{CheckError, ExtractionError, SentinelError, SentinelResult},
        prescription::{Medication, PrescriptionData},
    };

    use crate::{
        config::OrchestratorConfig,
        registry::CheckRegistry,
        summary::{SummaryInput, TemplateSummaryGenerator},
        traits::{Aggregation, Aggregator, CheckUnit, SummaryGenerator},
    };

    use super::Orchestrator;

    // ── Mock helpers ─────────────────────────────────────────────────────────

    /// What a stub unit does on each call. The last behaviour repeats.
    #[derive(Clone)]
    enum Behaviour {
        Pass(f64),
        Fail(f64),
        Transient,
        Terminal,
        Panic,
        Sleep(Duration),
        Raw(CheckResult),
    }

    /// A check unit that follows a script and counts its calls.
    struct StubUnit {
        kind: CheckKind,
        script: Vec<Behaviour>,
        calls: Arc<Mutex<u32>>,
        seen_dependencies: Arc<Mutex<Vec<CheckKind>>>,
        in_flight: Arc<Mutex<(u32, u32)>>,
        hold: Duration,
    }

    impl StubUnit {
        fn new(kind: CheckKind, script: Vec<Behaviour>) -> Self {
            Self {
                kind,
                script,
                calls: Arc::new(Mutex::new(0)),
                seen_dependencies: Arc::new(Mutex::new(vec![])),
                in_flight: Arc::new(Mutex::new((0, 0))),
                hold: Duration::ZERO,
            }
        }
    }

    #[async_trait]
    impl CheckUnit for StubUnit {
        fn kind(&self) -> CheckKind {
            self.kind
        }

        async fn evaluate(
            &self,
            _prescription: &PrescriptionData,
            dependencies: &DependencyResults,
        ) -> Result<CheckResult, CheckError> {
            let call = {
                let mut calls = self.calls.lock().unwrap();
                *calls += 1;
                *calls as usize
            };
            *self.seen_dependencies.lock().unwrap() = dependencies.keys().copied().collect();

            {
                let mut flight = self.in_flight.lock().unwrap();
                flight.0 += 1;
                flight.1 = flight.1.max(flight.0);
            }
            if !self.hold.is_zero() {
                tokio::time::sleep(self.hold).await;
            }
            self.in_flight.lock().unwrap().0 -= 1;

            let behaviour = self.script[(call - 1).min(self.script.len() - 1)].clone();
            match behaviour {
                Behaviour::Pass(c) => Ok(CheckResult::new(self.kind, CheckStatus::Pass, vec![], c)),
                Behaviour::Fail(c) => Ok(CheckResult::new(
                    self.kind,
                    CheckStatus::Fail,
                    vec![Finding::critical("stub-fail", format!("{} failed", self.kind))],
                    c,
                )),
                Behaviour::Transient => Err(CheckError::transient("registry unavailable")),
                Behaviour::Terminal => Err(CheckError::terminal("cannot interpret input")),
                Behaviour::Panic => panic!("stub unit exploded"),
                Behaviour::Sleep(d) => {
                    tokio::time::sleep(d).await;
                    Ok(CheckResult::new(self.kind, CheckStatus::Pass, vec![], 0.95))
                }
                Behaviour::Raw(result) => Ok(result),
            }
        }
    }

    /// Reject on fail or critical, review on inconclusive or low mean, else
    /// approve. Alerts mirror findings, most severe first.
    struct StubAggregator;

    impl Aggregator for StubAggregator {
        fn aggregate(
            &self,
            _case_id: &CaseId,
            results: &BTreeMap<CheckKind, CheckResult>,
        ) -> Aggregation {
            let mut alerts: Vec<Alert> = results
                .values()
                .flat_map(|r| {
                    r.findings.iter().map(move |f| Alert {
                        severity: f.severity,
                        source_check: Some(r.check_name),
                        message: f.message.clone(),
                    })
                })
                .collect();
            alerts.sort_by(|a, b| b.severity.cmp(&a.severity));

            let mean = if results.is_empty() {
                0.0
            } else {
                results.values().map(|r| r.confidence).sum::<f64>() / results.len() as f64
            };
            let (status, rule) = if results.values().any(|r| r.status == CheckStatus::Fail)
                || alerts.iter().any(|a| a.severity == Severity::Critical)
            {
                (ApprovalStatus::Rejected, "reject-on-failure")
            } else if results.len() < CheckKind::ALL.len()
                || results.values().any(|r| r.status == CheckStatus::Inconclusive)
                || mean < 0.75
            {
                (ApprovalStatus::NeedsReview, "review-on-uncertainty")
            } else {
                (ApprovalStatus::Approved, "approve")
            };
            Aggregation {
                alerts,
                confidence_score: mean,
                approval_status: status,
                decided_by: rule.to_string(),
            }
        }
    }

    struct FailingSummary;

    impl SummaryGenerator for FailingSummary {
        fn summarize(&self, _input: &SummaryInput<'_>) -> SentinelResult<String> {
            Err(SentinelError::SummaryFailed {
                reason: "model offline".to_string(),
            })
        }
    }

    fn fast_config() -> OrchestratorConfig {
        OrchestratorConfig {
            max_retries: 2,
            retry_backoff_ms: 1,
            max_concurrency: 4,
            case_timeout_ms: 5_000,
            check_timeout_ms: 1_000,
        }
    }

    fn prescription() -> PrescriptionData {
        PrescriptionData {
            medications: vec![Medication {
                name: "lisinopril".to_string(),
                strength: Some("10 mg".to_string()),
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    /// Eight passing stubs, with per-kind overrides.
    fn units_with(overrides: Vec<StubUnit>) -> Vec<Arc<StubUnit>> {
        let mut by_kind: BTreeMap<CheckKind, StubUnit> = CheckKind::ALL
            .into_iter()
            .map(|k| (k, StubUnit::new(k, vec![Behaviour::Pass(0.95)])))
            .collect();
        for unit in overrides {
            by_kind.insert(unit.kind, unit);
        }
        by_kind.into_values().map(Arc::new).collect()
    }

    fn orchestrator(units: &[Arc<StubUnit>], config: OrchestratorConfig) -> Orchestrator {
        orchestrator_with_summary(units, config, Arc::new(TemplateSummaryGenerator::new()))
    }

    fn orchestrator_with_summary(
        units: &[Arc<StubUnit>],
        config: OrchestratorConfig,
        summarizer: Arc<dyn SummaryGenerator>,
    ) -> Orchestrator {
        let dyn_units: Vec<Arc<dyn CheckUnit>> = units
            .iter()
            .map(|u| Arc::clone(u) as Arc<dyn CheckUnit>)
            .collect();
        Orchestrator::new(
            CheckRegistry::new(dyn_units).unwrap(),
            Arc::new(StubAggregator),
            summarizer,
            config,
        )
        .unwrap()
    }

    fn unit(units: &[Arc<StubUnit>], kind: CheckKind) -> &Arc<StubUnit> {
        units.iter().find(|u| u.kind == kind).unwrap()
    }

    fn actions(result: &rxsentinel_contracts::case::CaseResult) -> Vec<String> {
        result.audit_trail.iter().map(|e| e.action.clone()).collect()
    }

    // ── Test cases ────────────────────────────────────────────────────────────

    /// All eight pass at 0.95: approved, no warning or critical alerts.
    #[tokio::test]
    async fn test_all_pass_is_approved() {
        let units = units_with(vec![]);
        let result = orchestrator(&units, fast_config())
            .run(prescription(), CaseId::from("case-clean"))
            .await;

        assert_eq!(result.approval_status, ApprovalStatus::Approved);
        assert_eq!(result.check_results.len(), 8);
        assert!((result.confidence_score - 0.95).abs() < 1e-9);
        assert_eq!(result.alert_count(Severity::Critical), 0);
        assert_eq!(result.alert_count(Severity::Warning), 0);
        assert!(result.case_summary.contains("APPROVED"));
    }

    /// Sequence numbers run 1..N and the chain verifies.
    #[tokio::test]
    async fn test_audit_trail_is_contiguous_and_verifies() {
        let units = units_with(vec![]);
        let result = orchestrator(&units, fast_config())
            .run(prescription(), CaseId::from("case-audit"))
            .await;

        let numbers: Vec<u64> = result.audit_trail.iter().map(|e| e.sequence_number).collect();
        let expected: Vec<u64> = (1..=result.audit_trail.len() as u64).collect();
        assert_eq!(numbers, expected);
        assert!(verify_chain("case-audit", &result.audit_trail).is_ok());

        // accepted + 8 × (started, finished) + decision
        assert_eq!(result.audit_trail.len(), 1 + 16 + 1);
        let acts = actions(&result);
        assert_eq!(acts.first().unwrap(), "case accepted");
        assert_eq!(acts.last().unwrap(), "decision made");
        for kind in CheckKind::ALL {
            let started = acts.iter().position(|a| *a == format!("{kind} started")).unwrap();
            let finished = acts.iter().position(|a| *a == format!("{kind} finished")).unwrap();
            assert!(started < finished);
        }
    }

    /// License fails with 0.95, everything else passes.
    #[tokio::test]
    async fn test_license_failure_rejects_with_one_critical_alert() {
        let units = units_with(vec![StubUnit::new(
            CheckKind::License,
            vec![Behaviour::Fail(0.95)],
        )]);
        let result = orchestrator(&units, fast_config())
            .run(prescription(), CaseId::from("case-license"))
            .await;

        assert_eq!(result.approval_status, ApprovalStatus::Rejected);
        assert_eq!(result.alert_count(Severity::Critical), 1);
        assert_eq!(result.alerts[0].source_check, Some(CheckKind::License));
        // A fail is a completed result: dependents still run.
        assert_eq!(*unit(&units, CheckKind::StateCompliance).calls.lock().unwrap(), 1);
    }

    /// DEA exceeds the per-check timeout: it and both dependents end up
    /// inconclusive and the case needs review.
    #[tokio::test]
    async fn test_dea_timeout_skips_dependents() {
        let units = units_with(vec![StubUnit::new(
            CheckKind::Dea,
            vec![Behaviour::Sleep(Duration::from_secs(10))],
        )]);
        let config = OrchestratorConfig {
            check_timeout_ms: 50,
            ..fast_config()
        };
        let result = orchestrator(&units, config)
            .run(prescription(), CaseId::from("case-dea-timeout"))
            .await;

        for kind in [
            CheckKind::Dea,
            CheckKind::ControlledSubstance,
            CheckKind::DosageMonitoring,
        ] {
            assert_eq!(result.check_results[&kind].status, CheckStatus::Inconclusive, "{kind}");
        }
        assert_eq!(result.check_results[&CheckKind::License].status, CheckStatus::Pass);
        assert_eq!(result.approval_status, ApprovalStatus::NeedsReview);
        assert_eq!(result.check_results[&CheckKind::Dea].findings[0].code, "check-timeout");
        assert_eq!(*unit(&units, CheckKind::ControlledSubstance).calls.lock().unwrap(), 0);

        let acts = actions(&result);
        assert!(acts.contains(&"controlled_substance_check skipped".to_string()));
        assert!(acts.contains(&"dosage_monitoring skipped".to_string()));
    }

    /// A transient error followed by success is retried and audited.
    #[tokio::test]
    async fn test_transient_error_is_retried() {
        let units = units_with(vec![StubUnit::new(
            CheckKind::Dea,
            vec![Behaviour::Transient, Behaviour::Pass(0.9)],
        )]);
        let result = orchestrator(&units, fast_config())
            .run(prescription(), CaseId::from("case-retry"))
            .await;

        assert_eq!(*unit(&units, CheckKind::Dea).calls.lock().unwrap(), 2);
        assert_eq!(result.check_results[&CheckKind::Dea].status, CheckStatus::Pass);
        let retries = actions(&result)
            .iter()
            .filter(|a| *a == "dea_verification retrying")
            .count();
        assert_eq!(retries, 1);
        assert_eq!(result.approval_status, ApprovalStatus::Approved);
    }

    /// Exhausted retries give a warning-level inconclusive; dependents still
    /// run and see it.
    #[tokio::test]
    async fn test_exhausted_retries_keep_dependents_running() {
        let units = units_with(vec![StubUnit::new(CheckKind::Dea, vec![Behaviour::Transient])]);
        let result = orchestrator(&units, fast_config())
            .run(prescription(), CaseId::from("case-exhausted"))
            .await;

        // first attempt + max_retries
        assert_eq!(*unit(&units, CheckKind::Dea).calls.lock().unwrap(), 3);
        let dea = &result.check_results[&CheckKind::Dea];
        assert_eq!(dea.status, CheckStatus::Inconclusive);
        assert_eq!(dea.findings[0].severity, Severity::Warning);
        assert_eq!(dea.findings[0].code, "retries-exhausted");

        let controlled = unit(&units, CheckKind::ControlledSubstance);
        assert_eq!(*controlled.calls.lock().unwrap(), 1);
        assert_eq!(
            *controlled.seen_dependencies.lock().unwrap(),
            vec![CheckKind::License, CheckKind::Dea]
        );
        assert_eq!(result.approval_status, ApprovalStatus::NeedsReview);
    }

    /// A terminal error skips every transitive dependent.
    #[tokio::test]
    async fn test_terminal_error_skips_dependents() {
        let units = units_with(vec![StubUnit::new(CheckKind::License, vec![Behaviour::Terminal])]);
        let result = orchestrator(&units, fast_config())
            .run(prescription(), CaseId::from("case-terminal"))
            .await;

        assert_eq!(*unit(&units, CheckKind::License).calls.lock().unwrap(), 1);
        let license = &result.check_results[&CheckKind::License];
        assert_eq!(license.status, CheckStatus::Inconclusive);
        assert_eq!(license.findings[0].severity, Severity::Critical);

        for kind in [
            CheckKind::StateCompliance,
            CheckKind::ControlledSubstance,
            CheckKind::DosageMonitoring,
        ] {
            let r = &result.check_results[&kind];
            assert_eq!(r.status, CheckStatus::Inconclusive);
            assert_eq!(r.findings[0].code, "dependency-unavailable");
            assert_eq!(*unit(&units, kind).calls.lock().unwrap(), 0);
        }
        // Independent checks are unaffected.
        assert_eq!(result.check_results[&CheckKind::Dea].status, CheckStatus::Pass);
        assert_eq!(result.check_results.len(), 8);
        // The critical finding rejects the case.
        assert_eq!(result.approval_status, ApprovalStatus::Rejected);
    }

    /// A panicking unit is contained and treated as a terminal error.
    #[tokio::test]
    async fn test_panic_is_treated_as_terminal() {
        let units = units_with(vec![StubUnit::new(
            CheckKind::BudValidation,
            vec![Behaviour::Panic],
        )]);
        let result = orchestrator(&units, fast_config())
            .run(prescription(), CaseId::from("case-panic"))
            .await;

        let bud = &result.check_results[&CheckKind::BudValidation];
        assert_eq!(bud.status, CheckStatus::Inconclusive);
        assert_eq!(bud.findings[0].code, "check-panicked");
        assert!(bud.findings[0].message.contains("stub unit exploded"));
        assert_eq!(
            result.check_results[&CheckKind::CompoundingCompliance].findings[0].code,
            "dependency-unavailable"
        );
        assert!(actions(&result).contains(&"bud_validation finished".to_string()));
    }

    /// The case timeout cancels in-flight checks, skips unstarted ones, and
    /// still produces a complete, decided case.
    #[tokio::test]
    async fn test_case_timeout_finalizes_with_partial_results() {
        let units = units_with(vec![StubUnit::new(
            CheckKind::License,
            vec![Behaviour::Sleep(Duration::from_secs(10))],
        )]);
        let config = OrchestratorConfig {
            case_timeout_ms: 100,
            check_timeout_ms: 5_000,
            ..fast_config()
        };
        let result = orchestrator(&units, config)
            .run(prescription(), CaseId::from("case-timeout"))
            .await;

        assert_eq!(result.check_results.len(), 8);
        assert_eq!(result.check_results[&CheckKind::Dea].status, CheckStatus::Pass);
        let license = &result.check_results[&CheckKind::License];
        assert_eq!(license.status, CheckStatus::Inconclusive);
        assert_eq!(license.findings[0].code, "case-timeout");
        assert_eq!(result.approval_status, ApprovalStatus::NeedsReview);

        let acts = actions(&result);
        assert!(acts.contains(&"license_verification cancelled".to_string()));
        assert!(acts.contains(&"state_compliance skipped".to_string()));
        assert!(verify_chain("case-timeout", &result.audit_trail).is_ok());
    }

    /// No more than `max_concurrency` units evaluate at once.
    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let in_flight = Arc::new(Mutex::new((0u32, 0u32)));
        let overrides = CheckKind::ALL
            .into_iter()
            .map(|k| {
                let mut u = StubUnit::new(k, vec![Behaviour::Pass(0.95)]);
                u.in_flight = Arc::clone(&in_flight);
                u.hold = Duration::from_millis(20);
                u
            })
            .collect();
        let units = units_with(overrides);
        let config = OrchestratorConfig {
            max_concurrency: 2,
            ..fast_config()
        };
        let result = orchestrator(&units, config)
            .run(prescription(), CaseId::from("case-bounded"))
            .await;

        assert_eq!(result.approval_status, ApprovalStatus::Approved);
        let peak = in_flight.lock().unwrap().1;
        assert!(peak <= 2, "peak concurrency was {peak}");
        assert!(peak >= 1);
    }

    /// Units receive exactly their declared dependencies.
    #[tokio::test]
    async fn test_dependencies_are_delivered() {
        let units = units_with(vec![]);
        orchestrator(&units, fast_config())
            .run(prescription(), CaseId::from("case-deps"))
            .await;

        for kind in CheckKind::ALL {
            assert_eq!(
                *unit(&units, kind).seen_dependencies.lock().unwrap(),
                kind.dependencies().to_vec(),
                "{kind}"
            );
        }
    }

    /// Foreign check names are overwritten and confidence is clamped.
    #[tokio::test]
    async fn test_results_are_normalized() {
        let mut rogue = CheckResult::new(CheckKind::Dea, CheckStatus::Pass, vec![], 0.9);
        rogue.confidence = 1.7;
        let units = units_with(vec![StubUnit::new(
            CheckKind::ClinicalDocumentation,
            vec![Behaviour::Raw(rogue)],
        )]);
        let result = orchestrator(&units, fast_config())
            .run(prescription(), CaseId::from("case-normalize"))
            .await;

        let clinical = &result.check_results[&CheckKind::ClinicalDocumentation];
        assert_eq!(clinical.check_name, CheckKind::ClinicalDocumentation);
        assert_eq!(clinical.confidence, 1.0);
        assert_eq!(result.check_results[&CheckKind::Dea].confidence, 0.95);
    }

    /// Running the same input twice yields the same decision and a fresh trail.
    #[tokio::test]
    async fn test_rerun_is_idempotent() {
        let units = units_with(vec![StubUnit::new(
            CheckKind::StateCompliance,
            vec![Behaviour::Pass(0.6)],
        )]);
        let orchestrator = orchestrator(&units, fast_config());
        let first = orchestrator.run(prescription(), CaseId::from("case-twice")).await;
        let second = orchestrator.run(prescription(), CaseId::from("case-twice")).await;

        assert_eq!(first.approval_status, second.approval_status);
        assert_eq!(first.confidence_score, second.confidence_score);
        assert_eq!(first.audit_trail.len(), second.audit_trail.len());
        assert_eq!(second.audit_trail[0].sequence_number, 1);
    }

    /// A failing summary generator falls back without touching the decision.
    #[tokio::test]
    async fn test_summary_failure_uses_fallback() {
        let units = units_with(vec![]);
        let result = orchestrator_with_summary(&units, fast_config(), Arc::new(FailingSummary))
            .run(prescription(), CaseId::from("case-summary"))
            .await;

        assert_eq!(result.approval_status, ApprovalStatus::Approved);
        assert!(result.case_summary.contains("could not be generated"));
        assert_eq!(actions(&result).last().unwrap(), "summary fallback used");
    }

    /// Extraction failure: no checks, one audit entry, one critical alert.
    #[tokio::test]
    async fn test_extraction_failure_result() {
        let units = units_with(vec![]);
        let result = orchestrator(&units, fast_config()).extraction_failed(
            CaseId::from("case-unreadable"),
            &ExtractionError::Unparseable {
                reason: "no prescriber block".to_string(),
            },
        );

        assert_eq!(result.approval_status, ApprovalStatus::NeedsReview);
        assert_eq!(result.confidence_score, 0.0);
        assert!(result.prescription_data.is_none());
        assert!(result.check_results.is_empty());
        assert_eq!(result.audit_trail.len(), 1);
        assert_eq!(result.audit_trail[0].agent, "extraction");
        assert_eq!(result.audit_trail[0].action, "extraction failed");
        assert_eq!(result.alerts.len(), 1);
        assert_eq!(result.alerts[0].severity, Severity::Critical);
        assert_eq!(result.alerts[0].source_check, None);
        for unit in &units {
            assert_eq!(*unit.calls.lock().unwrap(), 0);
        }
    }

    /// An invalid configuration is refused at construction.
    #[test]
    fn test_invalid_config_is_refused() {
        let units = units_with(vec![]);
        let dyn_units: Vec<Arc<dyn CheckUnit>> = units
            .iter()
            .map(|u| Arc::clone(u) as Arc<dyn CheckUnit>)
            .collect();
        let config = OrchestratorConfig {
            max_concurrency: 0,
            ..fast_config()
        };
        let result = Orchestrator::new(
            CheckRegistry::new(dyn_units).unwrap(),
            Arc::new(StubAggregator),
            Arc::new(TemplateSummaryGenerator::new()),
            config,
        );
        assert!(matches!(result, Err(SentinelError::ConfigError { .. })));
    }

    /// The registry refuses duplicate and missing units.
    #[test]
    fn test_registry_rejects_incomplete_sets() {
        let one: Vec<Arc<dyn CheckUnit>> = vec![Arc::new(StubUnit::new(
            CheckKind::License,
            vec![Behaviour::Pass(0.9)],
        ))];
        assert!(matches!(
            CheckRegistry::new(one),
            Err(SentinelError::RegistryError { .. })
        ));

        let mut dup: Vec<Arc<dyn CheckUnit>> = units_with(vec![])
            .into_iter()
            .map(|u| u as Arc<dyn CheckUnit>)
            .collect();
        dup.push(Arc::new(StubUnit::new(CheckKind::Dea, vec![Behaviour::Pass(0.9)])));
        assert!(matches!(
            CheckRegistry::new(dup),
            Err(SentinelError::RegistryError { .. })
        ));
    }
}
