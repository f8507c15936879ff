//! Test Helper Functions and Utilities

use super::MockSource;
use std::{net::IpAddr, sync::Arc, time::Duration};
use uuid::Uuid;
use vpnscope_core::{
    analytics::Member,
    cache::{CacheConfig, ResultCache},
    key::Key,
    orchestrator::{OrchestratorConfig, QueryOrchestrator},
    registry::SourceRegistry,
    source::{Source, SourceSettings},
    verdict::AlgorithmMethod,
};

/// Parses a key, panicking on malformed input.
#[must_use]
pub fn key(raw: &str) -> Key {
    raw.parse().unwrap_or_else(|e| panic!("bad test key {raw}: {e}"))
}

/// `10.0.0.{n}`.
#[must_use]
pub fn ip(n: u8) -> IpAddr {
    IpAddr::from([10, 0, 0, n])
}

/// A member with a deterministic player id and the address `10.0.0.{n}`, or none.
#[must_use]
pub fn member(n: u8, with_ip: bool) -> Member {
    Member::new(Uuid::from_u128(u128::from(n)), with_ip.then(|| ip(n)))
}

/// Orchestrator budgets short enough for real-time tests.
#[must_use]
pub fn fast_config() -> OrchestratorConfig {
    OrchestratorConfig {
        source_timeout_ms: 200,
        check_ceiling_ms: 1_000,
        max_concurrent_dispatches: 8,
        dedup_inflight: true,
    }
}

/// Registry with `sources` registered in order under default settings.
#[must_use]
pub fn registry_with(
    algorithm: AlgorithmMethod,
    min_consensus: f64,
    sources: Vec<Arc<MockSource>>,
) -> Arc<SourceRegistry> {
    let registry = SourceRegistry::new(algorithm, min_consensus);
    for source in sources {
        let name = source.name().to_string();
        registry
            .register(source as Arc<dyn Source>, SourceSettings::default())
            .unwrap_or_else(|e| panic!("failed to register {name}: {e}"));
    }
    Arc::new(registry)
}

/// Orchestrator over `registry` with an in-memory cache.
#[must_use]
pub fn orchestrator(registry: Arc<SourceRegistry>, config: OrchestratorConfig) -> QueryOrchestrator {
    let cache: Arc<dyn ResultCache> = CacheConfig::default().build();
    QueryOrchestrator::new(registry, cache, Duration::from_secs(3600), config)
}
