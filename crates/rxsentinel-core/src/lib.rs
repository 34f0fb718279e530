//! # rxsentinel-core
//!
//! The verification pipeline runtime for RxSentinel.
//!
//! This crate provides:
//! - The collaborator traits (`CheckUnit`, `Aggregator`, `SummaryGenerator`,
//!   `ExtractionService`, `RecordStore`)
//! - The `CheckRegistry`, which guarantees exactly one unit per check
//! - The `Orchestrator`, which runs checks in dependency order with bounded
//!   concurrency, retries, and timeouts, and seals the audit trail
//! - The `VerificationService`, which wires extraction, orchestration, and
//!   persistence into one call
//!
//! ## Usage
//!
//! ```rust,ignore
//! use rxsentinel_core::{CheckRegistry, Orchestrator, OrchestratorConfig, TemplateSummaryGenerator};
//!
//! let orchestrator = Orchestrator::new(
//!     CheckRegistry::new(units)?,
//!     aggregator,
//!     Arc::new(TemplateSummaryGenerator::new()),
//!     OrchestratorConfig::default(),
//! )?;
//! let case = orchestrator.run(prescription, CaseId::new()).await;
//! ```

pub mod config;
pub mod orchestrator;
pub mod registry;
pub mod service;
pub mod summary;
pub mod traits;

pub use config::OrchestratorConfig;
pub use orchestrator::Orchestrator;
pub use registry::CheckRegistry;
pub use service::{Submission, VerificationService};
pub use summary::{fallback_summary, SummaryInput, TemplateSummaryGenerator};
pub use traits::{Aggregation, Aggregator, CheckUnit, ExtractionService, RecordStore, SummaryGenerator};
