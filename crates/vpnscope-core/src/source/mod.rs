//! Reputation sources and the wrapper the orchestrator dispatches through.
//!
//! A provider plugs in by implementing [`Source`]; nothing else in the crate needs to change.
//! On registration the source is wrapped in a [`SourceHandle`] which owns everything the
//! provider should not have to reimplement:
//!
//! - [`quota::QuotaWindow`]: per-source request quota with a fixed-window reset ticker
//! - [`health::SourceHealth`]: hard-failure cooldown / disable bookkeeping
//! - a concurrency semaphore sized by [`Source::max_concurrency`]
//!
//! ```text
//! dispatch(key)
//!   │
//!   ├─ health gate ──── cooling down / disabled ──► Failed { hard: true }
//!   ├─ concurrency permit (inside the per-source timeout)
//!   ├─ quota acquire ── window exhausted ─────────► Failed { hard: false }
//!   ├─ query(key) ───── elapsed ──────────────────► TimedOut
//!   │                 └ Err(e) ──────────────────► Failed { hard: e.is_hard() }
//!   └─ Ok(true) / Ok(false) ──────────────────────► Positive / Negative
//! ```

pub mod blocklist;
pub mod handle;
pub mod health;
pub mod quota;

pub use blocklist::{BlocklistError, BlocklistSource};
pub use handle::{SourceHandle, SourceSettings};
pub use health::{Availability, HardFailurePolicy, HealthConfig, HealthStatus, SourceHealth};
pub use quota::{QuotaStatus, QuotaWindow};

use crate::{errors::SourceError, key::Key};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Contract every reputation provider implements.
///
/// `query` may suspend on network I/O. Implementations return `Ok(false)` for a clean key and
/// reserve `Err` for infrastructure problems; see [`SourceError::is_hard`] for how errors are
/// classified.
#[async_trait]
pub trait Source: Send + Sync {
    /// Unique name of the source.
    fn name(&self) -> &str;

    /// Whether the provider needs an API key or similar credential.
    fn requires_credential(&self) -> bool;

    /// Requests allowed per quota window, `None` for unlimited.
    fn daily_quota(&self) -> Option<u64> {
        None
    }

    /// Concurrent queries the provider tolerates. Defaults to serialized access.
    fn max_concurrency(&self) -> usize {
        1
    }

    /// Whether the source can answer for this key. Unsupported keys are never dispatched.
    fn supports(&self, _key: &Key) -> bool {
        true
    }

    /// Returns `true` if the key is flagged (VPN/proxy, leaked account).
    async fn query(&self, key: &Key) -> Result<bool, SourceError>;
}

/// Outcome of one source query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceOutcome {
    /// The source flagged the key.
    Positive,
    /// The source answered and did not flag the key.
    Negative,
    /// Infrastructure failure. Excluded from reduction.
    Failed { reason: String, hard: bool },
    /// The query did not finish within its time budget. Excluded from reduction.
    TimedOut,
}

impl SourceOutcome {
    /// Returns `true` for answers that count toward a verdict (positive or negative).
    #[must_use]
    pub fn is_contributing(&self) -> bool {
        matches!(self, Self::Positive | Self::Negative)
    }

    #[must_use]
    pub fn is_positive(&self) -> bool {
        matches!(self, Self::Positive)
    }

    #[must_use]
    pub fn from_error(error: &SourceError) -> Self {
        Self::Failed { reason: error.to_string(), hard: error.is_hard() }
    }

    /// Returns a static string representation for metrics labels.
    #[must_use]
    pub fn as_metric_str(&self) -> &'static str {
        match self {
            Self::Positive => "positive",
            Self::Negative => "negative",
            Self::Failed { hard: true, .. } => "failed_hard",
            Self::Failed { hard: false, .. } => "failed_soft",
            Self::TimedOut => "timed_out",
        }
    }
}

impl From<bool> for SourceOutcome {
    fn from(flagged: bool) -> Self {
        if flagged {
            Self::Positive
        } else {
            Self::Negative
        }
    }
}

/// Result of querying one source for one key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceResult {
    pub source: Arc<str>,
    pub outcome: SourceOutcome,
    /// Wall-clock time spent in dispatch, including permit wait.
    pub elapsed_ms: u64,
}

impl SourceResult {
    #[must_use]
    pub fn new(source: impl Into<Arc<str>>, outcome: SourceOutcome) -> Self {
        Self { source: source.into(), outcome, elapsed_ms: 0 }
    }

    #[must_use]
    pub fn with_elapsed_ms(mut self, elapsed_ms: u64) -> Self {
        self.elapsed_ms = elapsed_ms;
        self
    }
}
