//! The eight reference check units.
//!
//! Each unit evaluates one `CheckKind` against the prescription. Units that
//! need registry or compendium data hold an `Arc<dyn ReferenceLookup>` and
//! propagate lookup errors with `?`; everything else they can't determine is
//! reported as findings.

use std::sync::Arc;

use rxsentinel_contracts::check::{CheckKind, CheckStatus, DependencyResults, Finding, Severity};
use rxsentinel_core::traits::CheckUnit;

use crate::lookup::ReferenceLookup;

pub mod bud;
pub mod clinical;
pub mod compounding;
pub mod controlled;
pub mod dea;
pub mod dosage;
pub mod license;
pub mod state;

pub use bud::BudValidationUnit;
pub use clinical::ClinicalDocumentationUnit;
pub use compounding::CompoundingComplianceUnit;
pub use controlled::ControlledSubstanceUnit;
pub use dea::DeaVerificationUnit;
pub use dosage::DosageMonitoringUnit;
pub use license::LicenseVerificationUnit;
pub use state::StateComplianceUnit;

/// One unit per check, all sharing `lookup`.
pub fn default_units(lookup: Arc<dyn ReferenceLookup>) -> Vec<Arc<dyn CheckUnit>> {
    vec![
        Arc::new(LicenseVerificationUnit::new(Arc::clone(&lookup))),
        Arc::new(DeaVerificationUnit::new(Arc::clone(&lookup))),
        Arc::new(StateComplianceUnit::new(Arc::clone(&lookup))),
        Arc::new(ControlledSubstanceUnit::new(Arc::clone(&lookup))),
        Arc::new(DosageMonitoringUnit::new(Arc::clone(&lookup))),
        Arc::new(BudValidationUnit::new()),
        Arc::new(CompoundingComplianceUnit::new(lookup)),
        Arc::new(ClinicalDocumentationUnit::new()),
    ]
}

/// Fail on any critical finding, warn on any warning, otherwise pass.
pub(crate) fn status_from(findings: &[Finding]) -> CheckStatus {
    match findings.iter().map(|f| f.severity).max() {
        Some(Severity::Critical) => CheckStatus::Fail,
        Some(Severity::Warning) => CheckStatus::Warning,
        _ => CheckStatus::Pass,
    }
}

/// Status of a settled dependency, if it was delivered.
pub(crate) fn dependency_status(
    dependencies: &DependencyResults,
    kind: CheckKind,
) -> Option<CheckStatus> {
    dependencies.get(&kind).map(|r| r.status)
}

/// Lowercased surname from a printed name ("Dr. Alicia Rivera, MD" -> "rivera").
pub(crate) fn surname(name: &str) -> Option<String> {
    const SUFFIXES: [&str; 6] = ["md", "do", "np", "pa", "jr", "dds"];
    name.split(|c: char| c.is_whitespace() || c == ',')
        .map(|w| w.trim_matches('.').to_ascii_lowercase())
        .filter(|w| !w.is_empty() && !SUFFIXES.contains(&w.as_str()))
        .last()
}
