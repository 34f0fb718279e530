//! Orchestrator tuning knobs.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use rxsentinel_contracts::error::{SentinelError, SentinelResult};

/// Retry, concurrency, and timeout settings for one orchestrator.
///
/// Deserialized from the `[orchestrator]` table of the pipeline TOML; any
/// omitted key takes its default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Retries after the first attempt for a transient check error.
    pub max_retries: u32,
    /// Linear backoff step: the n-th retry waits `n * retry_backoff_ms`.
    pub retry_backoff_ms: u64,
    /// Checks allowed to run at the same time within one case.
    pub max_concurrency: usize,
    /// Upper bound on the whole scheduling phase of a case.
    pub case_timeout_ms: u64,
    /// Upper bound on a single evaluation attempt.
    pub check_timeout_ms: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            retry_backoff_ms: 250,
            max_concurrency: 4,
            case_timeout_ms: 60_000,
            check_timeout_ms: 20_000,
        }
    }
}

impl OrchestratorConfig {
    pub fn validate(&self) -> SentinelResult<()> {
        if self.max_concurrency == 0 {
            return Err(SentinelError::ConfigError {
                reason: "orchestrator.max_concurrency must be at least 1".to_string(),
            });
        }
        if self.case_timeout_ms == 0 || self.check_timeout_ms == 0 {
            return Err(SentinelError::ConfigError {
                reason: "orchestrator timeouts must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    pub fn case_timeout(&self) -> Duration {
        Duration::from_millis(self.case_timeout_ms)
    }

    pub fn check_timeout(&self) -> Duration {
        Duration::from_millis(self.check_timeout_ms)
    }

    /// Delay before retry number `retry` (1-based).
    pub fn backoff(&self, retry: u32) -> Duration {
        Duration::from_millis(self.retry_backoff_ms.saturating_mul(u64::from(retry)))
    }
}
