use crate::fanout::BoundedFanout;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Dispatch budget and pool settings.
///
/// # Example Configuration
///
/// ```toml
/// [orchestrator]
/// source_timeout_ms = 5000
/// check_ceiling_ms = 10000
/// max_concurrent_dispatches = 4
/// dedup_inflight = true
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Time budget for a single source query, including permit wait (default: 5000).
    #[serde(default = "default_source_timeout_ms")]
    pub source_timeout_ms: u64,

    /// Overall ceiling for one check; sources still running are recorded as timed out
    /// (default: 10000).
    #[serde(default = "default_check_ceiling_ms")]
    pub check_ceiling_ms: u64,

    /// Source queries in flight across all checks (default: half the available cores).
    #[serde(default = "BoundedFanout::default_width")]
    pub max_concurrent_dispatches: usize,

    /// Share one dispatch between concurrent checks of the same key (default: true).
    #[serde(default = "default_dedup_inflight")]
    pub dedup_inflight: bool,
}

fn default_source_timeout_ms() -> u64 {
    5_000
}

fn default_check_ceiling_ms() -> u64 {
    10_000
}

fn default_dedup_inflight() -> bool {
    true
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            source_timeout_ms: default_source_timeout_ms(),
            check_ceiling_ms: default_check_ceiling_ms(),
            max_concurrent_dispatches: BoundedFanout::default_width(),
            dedup_inflight: default_dedup_inflight(),
        }
    }
}

impl OrchestratorConfig {
    #[must_use]
    pub fn source_timeout(&self) -> Duration {
        Duration::from_millis(self.source_timeout_ms)
    }

    #[must_use]
    pub fn check_ceiling(&self) -> Duration {
        Duration::from_millis(self.check_ceiling_ms)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error message if a budget is zero or the ceiling is below the per-source
    /// timeout.
    pub fn validate(&self) -> Result<(), String> {
        if self.source_timeout_ms == 0 {
            return Err("source_timeout_ms must be greater than 0".to_string());
        }
        if self.check_ceiling_ms == 0 {
            return Err("check_ceiling_ms must be greater than 0".to_string());
        }
        if self.check_ceiling_ms < self.source_timeout_ms {
            return Err(format!(
                "check_ceiling_ms ({}) must not be smaller than source_timeout_ms ({})",
                self.check_ceiling_ms, self.source_timeout_ms
            ));
        }
        if self.max_concurrent_dispatches == 0 {
            return Err("max_concurrent_dispatches must be greater than 0".to_string());
        }
        Ok(())
    }
}
