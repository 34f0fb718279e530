//! Error types for the RxSentinel pipeline.
//!
//! Three families, kept apart because the orchestrator treats them
//! differently:
//!
//! - `CheckError`: raised by a check unit. `Transient` is retried, `Terminal`
//!   turns the check inconclusive and skips its dependents.
//! - `ExtractionError`: raised by the extraction service. Fatal for the case:
//!   no checks run.
//! - `SentinelError`: infrastructure faults (configuration, registry
//!   construction, audit, record store). These never replace a verdict; they
//!   surface at construction time or from the record store.

use thiserror::Error;

/// The unified infrastructure error type.
#[derive(Debug, Error)]
pub enum SentinelError {
    /// A required configuration value is missing or invalid.
    #[error("configuration error: {reason}")]
    ConfigError { reason: String },

    /// The set of check units handed to the orchestrator is not exactly the
    /// eight known checks.
    #[error("check registry error: {reason}")]
    RegistryError { reason: String },

    /// The audit recorder could not append an entry.
    #[error("audit write failed: {reason}")]
    AuditWriteFailed { reason: String },

    /// The record store could not persist a case.
    #[error("record store error: {reason}")]
    StoreError { reason: String },

    /// The summary generator could not produce a summary.
    #[error("summary generation failed: {reason}")]
    SummaryFailed { reason: String },

    /// A case document did not validate against its schema or rules.
    #[error("case document invalid: {reason}")]
    DocumentInvalid { reason: String },

    /// JSON (de)serialization failed.
    #[error("serialization error: {reason}")]
    Serialization { reason: String },
}

/// Convenience alias used throughout the RxSentinel crates.
pub type SentinelResult<T> = Result<T, SentinelError>;

impl From<serde_json::Error> for SentinelError {
    fn from(e: serde_json::Error) -> Self {
        SentinelError::Serialization {
            reason: e.to_string(),
        }
    }
}

/// An error signalled by a check unit instead of a `CheckResult`.
///
/// Units decide which class applies: a collaborator that is briefly
/// unavailable is `Transient`; input the unit cannot interpret is `Terminal`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CheckError {
    /// Retry may succeed (collaborator unavailable, rate limited).
    #[error("transient check error: {reason}")]
    Transient { reason: String },

    /// Retry cannot succeed (malformed input).
    #[error("terminal check error: {reason}")]
    Terminal { reason: String },
}

impl CheckError {
    pub fn transient(reason: impl Into<String>) -> Self {
        CheckError::Transient {
            reason: reason.into(),
        }
    }

    pub fn terminal(reason: impl Into<String>) -> Self {
        CheckError::Terminal {
            reason: reason.into(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, CheckError::Transient { .. })
    }
}

/// The extraction service could not turn a document into prescription data.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractionError {
    #[error("document is empty")]
    EmptyDocument,

    #[error("document is not valid UTF-8 text")]
    NotText,

    #[error("document could not be parsed: {reason}")]
    Unparseable { reason: String },

    #[error("required field '{field}' could not be extracted")]
    MissingField { field: String },

    #[error("extraction service unavailable: {reason}")]
    Unavailable { reason: String },
}
