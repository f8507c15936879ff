//! Hard-failure bookkeeping for a single source.
//!
//! A hard failure (missing or rejected credential, provider-side disable) means the source is
//! structurally broken. Depending on [`HardFailurePolicy`] the source either sits out for a
//! cooldown period or stays disabled until an administrator re-enables it.
//!
//! # Example Configuration
//!
//! ```toml
//! [health]
//! hard_failure_policy = "cooldown"
//! cooldown_seconds = 300
//! ```

use crate::clock::Clock;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Duration};
use tokio::time::Instant;
use tracing::{info, warn};

/// What happens to a source after a hard failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HardFailurePolicy {
    /// Skip the source for `cooldown_seconds`, then retry.
    #[default]
    Cooldown,
    /// Skip the source until it is explicitly re-enabled.
    Disable,
}

/// Configuration for hard-failure handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthConfig {
    #[serde(default)]
    pub hard_failure_policy: HardFailurePolicy,

    /// Sit-out duration after a hard failure (default: 300).
    #[serde(default = "default_cooldown_seconds")]
    pub cooldown_seconds: u64,
}

fn default_cooldown_seconds() -> u64 {
    300
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            hard_failure_policy: HardFailurePolicy::default(),
            cooldown_seconds: default_cooldown_seconds(),
        }
    }
}

impl HealthConfig {
    #[must_use]
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_seconds)
    }
}

/// Whether a source may be dispatched right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Availability {
    Available,
    CoolingDown { remaining: Duration },
    Disabled,
}

/// Serializable snapshot of a source's health.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthStatus {
    pub hard_failures: u64,
    pub disabled: bool,
    pub cooldown_remaining_secs: Option<u64>,
    pub last_error: Option<String>,
}

#[derive(Debug, Default)]
struct HealthState {
    cooldown_until: Option<Instant>,
    disabled: bool,
    hard_failures: u64,
    last_error: Option<String>,
}

/// Tracks hard failures for one source.
pub struct SourceHealth {
    source: Arc<str>,
    config: HealthConfig,
    clock: Arc<dyn Clock>,
    state: Mutex<HealthState>,
}

impl std::fmt::Debug for SourceHealth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceHealth")
            .field("source", &self.source)
            .field("config", &self.config)
            .field("state", &*self.state.lock())
            .finish_non_exhaustive()
    }
}

impl SourceHealth {
    #[must_use]
    pub fn new(source: Arc<str>, config: HealthConfig, clock: Arc<dyn Clock>) -> Self {
        Self { source, config, clock, state: Mutex::new(HealthState::default()) }
    }

    #[must_use]
    pub fn availability(&self) -> Availability {
        let state = self.state.lock();
        if state.disabled {
            return Availability::Disabled;
        }

        let now = self.clock.now();
        match state.cooldown_until {
            Some(until) if now < until => Availability::CoolingDown { remaining: until - now },
            _ => Availability::Available,
        }
    }

    /// Records a hard failure and applies the configured policy.
    pub fn record_hard_failure(&self, reason: &str) {
        let mut state = self.state.lock();
        state.hard_failures += 1;
        state.last_error = Some(reason.to_string());

        match self.config.hard_failure_policy {
            HardFailurePolicy::Cooldown => {
                state.cooldown_until = Some(self.clock.now() + self.config.cooldown());
                warn!(
                    source = %self.source,
                    reason = %reason,
                    cooldown_seconds = self.config.cooldown_seconds,
                    "source hard failure, cooling down"
                );
            }
            HardFailurePolicy::Disable => {
                state.disabled = true;
                warn!(source = %self.source, reason = %reason, "source hard failure, disabled");
            }
        }
    }

    /// Clears any cooldown or disable flag.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        if state.disabled || state.cooldown_until.is_some() {
            info!(source = %self.source, "source health cleared");
        }
        state.disabled = false;
        state.cooldown_until = None;
    }

    #[must_use]
    pub fn status(&self) -> HealthStatus {
        let availability = self.availability();
        let state = self.state.lock();
        HealthStatus {
            hard_failures: state.hard_failures,
            disabled: state.disabled,
            cooldown_remaining_secs: match availability {
                Availability::CoolingDown { remaining } => Some(remaining.as_secs()),
                _ => None,
            },
            last_error: state.last_error.clone(),
        }
    }
}
