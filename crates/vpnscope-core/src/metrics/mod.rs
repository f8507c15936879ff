//! # Metrics
//!
//! Lock-free Prometheus counters, gauges and histograms recorded through the `metrics` facade.
//! Without an installed recorder every call is a no-op, so the library never requires an
//! exporter. The CLI installs one with [`MetricsCollector::with_prometheus`].
//!
//! | Metric | Type | Labels |
//! |--------|------|--------|
//! | `vpnscope_checks_total` | counter | `algorithm`, `outcome` |
//! | `vpnscope_check_duration_seconds` | histogram | `algorithm` |
//! | `vpnscope_cache_hits_total` | counter | |
//! | `vpnscope_cache_misses_total` | counter | |
//! | `vpnscope_source_outcomes_total` | counter | `source`, `outcome` |
//! | `vpnscope_source_quota_used` | gauge | `source` |
//! | `vpnscope_unverified_checks_total` | counter | |
//! | `vpnscope_inflight_joins_total` | counter | |
//!
//! Source names are interned; the pool is bounded by the number of registered sources.

use crate::{source::SourceOutcome, verdict::AlgorithmMethod};
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::{borrow::Cow, sync::OnceLock, time::Duration};

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

static SOURCE_NAME_POOL: OnceLock<dashmap::DashMap<String, &'static str>> = OnceLock::new();

#[inline]
fn source_to_static(source: &str) -> Cow<'static, str> {
    let pool = SOURCE_NAME_POOL.get_or_init(dashmap::DashMap::new);

    if let Some(interned) = pool.get(source) {
        return Cow::Borrowed(*interned);
    }

    let owned = source.to_string();
    let leaked: &'static str = Box::leak(owned.clone().into_boxed_str());
    pool.insert(owned, leaked);
    Cow::Borrowed(leaked)
}

fn install_prometheus_recorder() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| match PrometheusBuilder::new().install_recorder() {
            Ok(handle) => handle,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "failed to install global Prometheus recorder, metrics will not be exported"
                );
                PrometheusBuilder::new().build_recorder().handle()
            }
        })
        .clone()
}

/// Records aggregation metrics.
#[derive(Clone, Default)]
pub struct MetricsCollector {
    prometheus_handle: Option<PrometheusHandle>,
}

impl std::fmt::Debug for MetricsCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsCollector")
            .field("prometheus", &self.prometheus_handle.is_some())
            .finish()
    }
}

impl MetricsCollector {
    /// Collector that records into whatever recorder is globally installed, if any.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Collector backed by a process-wide Prometheus recorder, installed on first use.
    #[must_use]
    pub fn with_prometheus() -> Self {
        Self { prometheus_handle: Some(install_prometheus_recorder()) }
    }

    /// Renders the Prometheus exposition text, if a recorder is attached.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.prometheus_handle.as_ref().map(PrometheusHandle::render)
    }

    pub fn record_check(&self, algorithm: AlgorithmMethod, flagged: bool, duration: Duration) {
        let outcome = if flagged { "flagged" } else { "clean" };
        counter!("vpnscope_checks_total", "algorithm" => algorithm.as_str(), "outcome" => outcome)
            .increment(1);
        histogram!("vpnscope_check_duration_seconds", "algorithm" => algorithm.as_str())
            .record(duration.as_secs_f64());
    }

    pub fn record_cache_hit(&self) {
        counter!("vpnscope_cache_hits_total").increment(1);
    }

    pub fn record_cache_miss(&self) {
        counter!("vpnscope_cache_misses_total").increment(1);
    }

    pub fn record_source_outcome(&self, source: &str, outcome: &SourceOutcome) {
        counter!(
            "vpnscope_source_outcomes_total",
            "source" => source_to_static(source),
            "outcome" => outcome.as_metric_str()
        )
        .increment(1);
    }

    #[allow(clippy::cast_precision_loss)]
    pub fn record_quota_used(&self, source: &str, used: u64) {
        gauge!("vpnscope_source_quota_used", "source" => source_to_static(source)).set(used as f64);
    }

    /// Records a check where no source contributed an answer.
    pub fn record_unverified_check(&self) {
        counter!("vpnscope_unverified_checks_total").increment(1);
    }

    /// Records a check that joined another in-flight dispatch for the same key.
    pub fn record_inflight_join(&self) {
        counter!("vpnscope_inflight_joins_total").increment(1);
    }
}
