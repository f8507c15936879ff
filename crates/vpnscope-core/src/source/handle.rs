use super::{
    health::{Availability, HealthConfig, HealthStatus, SourceHealth},
    quota::{QuotaStatus, QuotaTicker, QuotaWindow, DEFAULT_RESET_INTERVAL},
    Source, SourceOutcome, SourceResult,
};
use crate::{
    clock::Clock, errors::SourceError, fanout::panic_message, key::Key, metrics::MetricsCollector,
};
use futures_util::FutureExt;
use std::{panic::AssertUnwindSafe, sync::Arc, time::Duration};
use tokio::{
    sync::Semaphore,
    task::JoinHandle,
    time::{timeout, Instant},
};
use tracing::{debug, warn};

/// Per-source overrides applied at registration.
#[derive(Debug, Clone)]
pub struct SourceSettings {
    pub enabled: bool,
    /// Overrides [`Source::daily_quota`] when set.
    pub daily_quota: Option<u64>,
    /// Overrides [`Source::max_concurrency`] when set.
    pub max_concurrency: Option<usize>,
    pub reset_interval: Duration,
    pub health: HealthConfig,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            daily_quota: None,
            max_concurrency: None,
            reset_interval: DEFAULT_RESET_INTERVAL,
            health: HealthConfig::default(),
        }
    }
}

impl SourceSettings {
    #[must_use]
    pub fn disabled() -> Self {
        Self { enabled: false, ..Self::default() }
    }

    #[must_use]
    pub fn with_daily_quota(mut self, quota: u64) -> Self {
        self.daily_quota = Some(quota);
        self
    }

    #[must_use]
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = Some(max_concurrency);
        self
    }

    #[must_use]
    pub fn with_health(mut self, health: HealthConfig) -> Self {
        self.health = health;
        self
    }

    #[must_use]
    pub fn with_reset_interval(mut self, reset_interval: Duration) -> Self {
        self.reset_interval = reset_interval;
        self
    }
}

/// A registered source together with the state the orchestrator needs to dispatch it safely.
///
/// The quota ticker is owned by the handle and aborted when the handle is dropped or
/// [`SourceHandle::shutdown`] is called.
pub struct SourceHandle {
    name: Arc<str>,
    source: Arc<dyn Source>,
    quota: Arc<QuotaWindow>,
    permits: Semaphore,
    max_concurrency: usize,
    health: SourceHealth,
    ticker: Option<JoinHandle<()>>,
    clock: Arc<dyn Clock>,
    metrics: MetricsCollector,
}

impl std::fmt::Debug for SourceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceHandle")
            .field("name", &self.name)
            .field("quota", &self.quota)
            .field("max_concurrency", &self.max_concurrency)
            .field("health", &self.health)
            .finish_non_exhaustive()
    }
}

impl SourceHandle {
    /// Wraps a source and starts its quota reset ticker.
    #[must_use]
    pub fn new(
        source: Arc<dyn Source>,
        settings: &SourceSettings,
        clock: Arc<dyn Clock>,
        metrics: MetricsCollector,
    ) -> Self {
        let name: Arc<str> = Arc::from(source.name());
        let limit = settings.daily_quota.or_else(|| source.daily_quota());
        let max_concurrency =
            settings.max_concurrency.unwrap_or_else(|| source.max_concurrency()).max(1);

        let quota = Arc::new(QuotaWindow::new(limit, clock.now()));
        let ticker = QuotaTicker::start(
            Arc::clone(&name),
            Arc::clone(&quota),
            settings.reset_interval,
            Arc::clone(&clock),
        );
        let health = SourceHealth::new(Arc::clone(&name), settings.health, Arc::clone(&clock));

        Self {
            name,
            source,
            quota,
            permits: Semaphore::new(max_concurrency),
            max_concurrency,
            health,
            ticker,
            clock,
            metrics,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn source(&self) -> &Arc<dyn Source> {
        &self.source
    }

    #[must_use]
    pub fn requires_credential(&self) -> bool {
        self.source.requires_credential()
    }

    #[must_use]
    pub fn supports(&self, key: &Key) -> bool {
        self.source.supports(key)
    }

    #[must_use]
    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    #[must_use]
    pub fn quota_status(&self) -> QuotaStatus {
        self.quota.status(self.clock.now())
    }

    #[must_use]
    pub fn health_status(&self) -> HealthStatus {
        self.health.status()
    }

    #[must_use]
    pub fn availability(&self) -> Availability {
        self.health.availability()
    }

    pub(crate) fn health(&self) -> &SourceHealth {
        &self.health
    }

    /// Queries the source for `key`, never failing.
    ///
    /// `timeout` bounds the permit wait and the query together. Quota is only consumed once a
    /// permit is held, immediately before the source is invoked, so the counter equals the
    /// number of real dispatches.
    pub async fn dispatch(&self, key: &Key, timeout_after: Duration) -> SourceResult {
        let started = Instant::now();
        let outcome = self.dispatch_outcome(key, timeout_after).await;

        match &outcome {
            SourceOutcome::Failed { reason, hard: true } => {
                warn!(source = %self.name, key = %key, error = %reason, "source hard failure");
            }
            SourceOutcome::Failed { reason, hard: false } => {
                debug!(source = %self.name, key = %key, error = %reason, "source soft failure");
            }
            SourceOutcome::TimedOut => {
                debug!(
                    source = %self.name,
                    key = %key,
                    timeout_ms = timeout_after.as_millis(),
                    "source query timed out"
                );
            }
            SourceOutcome::Positive | SourceOutcome::Negative => {}
        }
        self.metrics.record_source_outcome(&self.name, &outcome);

        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        SourceResult::new(Arc::clone(&self.name), outcome).with_elapsed_ms(elapsed_ms)
    }

    async fn dispatch_outcome(&self, key: &Key, timeout_after: Duration) -> SourceOutcome {
        match self.health.availability() {
            Availability::Available => {}
            Availability::CoolingDown { remaining } => {
                return SourceOutcome::Failed {
                    reason: format!("cooling down after hard failure ({}s left)", remaining.as_secs()),
                    hard: true,
                };
            }
            Availability::Disabled => {
                return SourceOutcome::Failed {
                    reason: "disabled after hard failure".to_string(),
                    hard: true,
                };
            }
        }

        let attempt = async {
            let Ok(_permit) = self.permits.acquire().await else {
                return SourceOutcome::Failed {
                    reason: "source is shut down".to_string(),
                    hard: false,
                };
            };

            if !self.quota.try_acquire() {
                let limit = self.quota.limit().unwrap_or_default();
                return SourceOutcome::from_error(&SourceError::QuotaExceeded { limit });
            }
            self.metrics.record_quota_used(&self.name, self.quota.used());

            match AssertUnwindSafe(self.source.query(key)).catch_unwind().await {
                Ok(Ok(flagged)) => SourceOutcome::from(flagged),
                Ok(Err(e)) => {
                    if e.is_hard() {
                        self.health.record_hard_failure(&e.to_string());
                    }
                    SourceOutcome::from_error(&e)
                }
                Err(panic) => SourceOutcome::Failed {
                    reason: format!("source panicked: {}", panic_message(panic.as_ref())),
                    hard: false,
                },
            }
        };

        timeout(timeout_after, attempt).await.unwrap_or(SourceOutcome::TimedOut)
    }

    /// Stops the quota ticker and rejects further dispatches.
    pub fn shutdown(&self) {
        if let Some(ticker) = &self.ticker {
            ticker.abort();
        }
        self.permits.close();
    }
}

impl Drop for SourceHandle {
    fn drop(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
        }
    }
}
