//! Wiring: reference units + policy aggregator + template summaries.

use std::sync::Arc;

use rxsentinel_contracts::error::SentinelResult;
use rxsentinel_core::{
    traits::RecordStore, CheckRegistry, Orchestrator, TemplateSummaryGenerator,
    VerificationService,
};
use rxsentinel_policy::{PipelineConfig, PolicyAggregator};

use crate::extraction::DocumentExtractor;
use crate::lookup::ReferenceLookup;
use crate::units::default_units;

/// An orchestrator running the eight reference units against `lookup`.
pub fn build_orchestrator(
    config: &PipelineConfig,
    lookup: Arc<dyn ReferenceLookup>,
) -> SentinelResult<Orchestrator> {
    let registry = CheckRegistry::new(default_units(lookup))?;
    let aggregator = PolicyAggregator::new(config.aggregation.clone())?;
    Orchestrator::new(
        registry,
        Arc::new(aggregator),
        Arc::new(TemplateSummaryGenerator::new()),
        config.orchestrator.clone(),
    )
}

/// Extraction, orchestration, and persistence in one service.
pub fn build_service(
    config: &PipelineConfig,
    lookup: Arc<dyn ReferenceLookup>,
    store: Arc<dyn RecordStore>,
) -> SentinelResult<VerificationService> {
    let orchestrator = build_orchestrator(config, lookup)?;
    Ok(VerificationService::new(
        Arc::new(DocumentExtractor::new()),
        Arc::new(orchestrator),
        store,
    ))
}
