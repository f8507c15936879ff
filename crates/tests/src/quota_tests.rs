//! Tests for per-source quota windows.
//!
//! Quota is consumed once per real dispatch, refused atomically at the limit, and reset by a
//! ticker anchored at registration time. Rollover tests run on tokio's paused clock.

use crate::mock_infrastructure::{fast_config, key, orchestrator, MockSource};
use std::{sync::Arc, time::Duration};
use tokio::task::JoinSet;
use vpnscope_core::{
    errors::SourceError,
    registry::SourceRegistry,
    source::{Source, SourceOutcome, SourceSettings},
    verdict::AlgorithmMethod,
};

const DAY: Duration = Duration::from_secs(24 * 60 * 60);

fn registry_with_settings(source: Arc<MockSource>, settings: SourceSettings) -> Arc<SourceRegistry> {
    let registry = SourceRegistry::new(AlgorithmMethod::Consensus, 0.6);
    registry.register(source as Arc<dyn Source>, settings).unwrap();
    Arc::new(registry)
}

fn is_quota_failure(outcome: &SourceOutcome) -> bool {
    matches!(outcome, SourceOutcome::Failed { reason, hard: false } if reason.contains("quota exceeded"))
}

#[tokio::test]
async fn test_quota_refuses_after_limit() {
    let source = MockSource::new("teoh").with_daily_quota(2).into_arc();
    let registry = registry_with_settings(source.clone(), SourceSettings::default());
    let orchestrator = orchestrator(registry.clone(), fast_config());

    for n in 1..=2 {
        let verdict = orchestrator.check(&key(&format!("198.51.100.{n}"))).await;
        assert_eq!(verdict.results[0].outcome, SourceOutcome::Negative);
    }

    let verdict = orchestrator.check(&key("198.51.100.3")).await;
    assert!(is_quota_failure(&verdict.results[0].outcome));
    assert!(!verdict.is_verified());
    assert_eq!(source.calls(), 2, "refused dispatches never reach the source");

    let status = registry.source("teoh").unwrap().quota_status();
    assert_eq!(status.used, 2);
    assert_eq!(status.limit, Some(2));
    assert_eq!(status.remaining(), Some(0));
}

#[tokio::test]
async fn test_settings_override_source_quota() {
    let source = MockSource::new("teoh").with_daily_quota(100).into_arc();
    let registry =
        registry_with_settings(source.clone(), SourceSettings::default().with_daily_quota(1));
    let orchestrator = orchestrator(registry, fast_config());

    orchestrator.check(&key("198.51.100.1")).await;
    let verdict = orchestrator.check(&key("198.51.100.2")).await;
    assert!(is_quota_failure(&verdict.results[0].outcome));
    assert_eq!(source.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_checks_never_exceed_quota() {
    let source = MockSource::new("teoh")
        .with_daily_quota(5)
        .with_max_concurrency(16)
        .with_delay(Duration::from_millis(10))
        .into_arc();
    let registry = registry_with_settings(source.clone(), SourceSettings::default());
    let orchestrator = Arc::new(orchestrator(registry.clone(), fast_config()));

    let mut checks = JoinSet::new();
    for n in 1..=20u8 {
        let orchestrator = Arc::clone(&orchestrator);
        checks.spawn(async move { orchestrator.check(&key(&format!("198.51.100.{n}"))).await });
    }

    let mut refused = 0;
    while let Some(verdict) = checks.join_next().await {
        if is_quota_failure(&verdict.unwrap().results[0].outcome) {
            refused += 1;
        }
    }

    assert_eq!(source.calls(), 5);
    assert_eq!(refused, 15);
    assert_eq!(registry.source("teoh").unwrap().quota_status().used, 5);
}

#[tokio::test(start_paused = true)]
async fn test_quota_resets_after_a_day() {
    let source = MockSource::new("teoh").with_daily_quota(1).into_arc();
    let registry = registry_with_settings(source.clone(), SourceSettings::default());
    let orchestrator = orchestrator(registry.clone(), fast_config());

    orchestrator.check(&key("198.51.100.1")).await;
    let refused = orchestrator.check(&key("198.51.100.2")).await;
    assert!(is_quota_failure(&refused.results[0].outcome));

    tokio::time::advance(DAY - Duration::from_secs(1)).await;
    tokio::task::yield_now().await;
    assert_eq!(registry.source("teoh").unwrap().quota_status().resets, 0);

    tokio::time::advance(Duration::from_secs(2)).await;
    tokio::time::sleep(Duration::from_millis(1)).await;

    let status = registry.source("teoh").unwrap().quota_status();
    assert_eq!(status.resets, 1);
    assert_eq!(status.used, 0);

    let verdict = orchestrator.check(&key("198.51.100.3")).await;
    assert_eq!(verdict.results[0].outcome, SourceOutcome::Negative);
    assert_eq!(source.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_custom_reset_interval() {
    let source = MockSource::new("hourly").with_daily_quota(1).into_arc();
    let registry = registry_with_settings(
        source.clone(),
        SourceSettings::default().with_reset_interval(Duration::from_secs(3600)),
    );

    tokio::time::advance(Duration::from_secs(3601)).await;
    tokio::time::sleep(Duration::from_millis(1)).await;
    assert_eq!(registry.source("hourly").unwrap().quota_status().resets, 1);
}

#[tokio::test]
async fn test_gated_dispatch_does_not_consume_quota() {
    let source = MockSource::new("teoh")
        .with_daily_quota(10)
        .failing(SourceError::MissingCredential("teoh".to_string()))
        .into_arc();
    let registry = registry_with_settings(source.clone(), SourceSettings::default());
    let orchestrator = orchestrator(registry.clone(), fast_config());

    for n in 1..=3 {
        orchestrator.check(&key(&format!("198.51.100.{n}"))).await;
    }

    assert_eq!(source.calls(), 1);
    assert_eq!(registry.source("teoh").unwrap().quota_status().used, 1);
}

#[tokio::test]
async fn test_unlimited_source_still_counts() {
    let source = MockSource::new("local").into_arc();
    let registry = registry_with_settings(source, SourceSettings::default());
    let orchestrator = orchestrator(registry.clone(), fast_config());

    for n in 1..=3 {
        orchestrator.check(&key(&format!("198.51.100.{n}"))).await;
    }

    let status = registry.source("local").unwrap().quota_status();
    assert_eq!(status.used, 3);
    assert_eq!(status.limit, None);
    assert_eq!(status.remaining(), None);
}
