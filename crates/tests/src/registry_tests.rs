//! Tests for registry administration while checks are running.
//!
//! Administrative changes publish a fresh snapshot. Checks that already loaded the previous
//! snapshot finish with it; checks that start afterwards see the change.

use crate::mock_infrastructure::{fast_config, key, orchestrator, registry_with, MockSource};
use std::{sync::Arc, time::Duration};
use vpnscope_core::{
    errors::SourceError,
    registry::{RegistryError, SourceRegistry},
    source::{HardFailurePolicy, HealthConfig, Source, SourceOutcome, SourceSettings},
    verdict::AlgorithmMethod,
};

fn names(verdict: &vpnscope_core::verdict::Verdict) -> Vec<String> {
    verdict.results.iter().map(|r| r.source.to_string()).collect()
}

#[tokio::test(start_paused = true)]
async fn test_disable_does_not_affect_inflight_check() {
    let slow = MockSource::new("slow").with_delay(Duration::from_millis(100)).answering(true).into_arc();
    let registry = registry_with(AlgorithmMethod::Consensus, 0.6, vec![slow.clone()]);
    let orchestrator = Arc::new(orchestrator(registry.clone(), fast_config()));

    let inflight = {
        let orchestrator = Arc::clone(&orchestrator);
        tokio::spawn(async move { orchestrator.check(&key("203.0.113.1")).await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(slow.calls(), 1, "check is in flight");

    registry.set_enabled("slow", false).unwrap();

    let verdict = inflight.await.unwrap();
    assert_eq!(names(&verdict), vec!["slow"]);
    assert!(verdict.flagged);

    let after = orchestrator.check(&key("203.0.113.2")).await;
    assert!(after.results.is_empty());
    assert_eq!(slow.calls(), 1);
}

#[tokio::test]
async fn test_register_unregister_and_replace() {
    let registry = registry_with(
        AlgorithmMethod::Consensus,
        0.6,
        vec![MockSource::new("a").into_arc(), MockSource::new("b").into_arc()],
    );

    let duplicate = registry.register(MockSource::new("a").into_arc(), SourceSettings::default());
    assert!(matches!(duplicate, Err(RegistryError::DuplicateSource(name)) if name == "a"));

    registry.unregister("a").unwrap();
    assert!(matches!(registry.unregister("a"), Err(RegistryError::UnknownSource(_))));
    assert_eq!(registry.len(), 1);

    let replacement: Vec<(Arc<dyn Source>, SourceSettings)> = vec![
        (MockSource::new("x").into_arc() as Arc<dyn Source>, SourceSettings::default()),
        (MockSource::new("y").into_arc() as Arc<dyn Source>, SourceSettings::disabled()),
    ];
    registry.replace_sources(replacement).unwrap();

    let statuses = registry.statuses();
    let listed: Vec<_> = statuses.iter().map(|s| (s.name.as_str(), s.enabled)).collect();
    assert_eq!(listed, vec![("x", true), ("y", false)]);
    assert_eq!(registry.enabled_sources().len(), 1);
}

#[tokio::test]
async fn test_replace_rejects_duplicates_and_keeps_old_set() {
    let registry = registry_with(AlgorithmMethod::Consensus, 0.6, vec![MockSource::new("a").into_arc()]);

    let replacement: Vec<(Arc<dyn Source>, SourceSettings)> = vec![
        (MockSource::new("x").into_arc() as Arc<dyn Source>, SourceSettings::default()),
        (MockSource::new("x").into_arc() as Arc<dyn Source>, SourceSettings::default()),
    ];
    assert!(matches!(registry.replace_sources(replacement), Err(RegistryError::DuplicateSource(_))));
    assert!(registry.source("a").is_some());
}

#[tokio::test]
async fn test_algorithm_and_threshold_changes_apply_to_next_check() {
    let registry = registry_with(
        AlgorithmMethod::Consensus,
        0.6,
        vec![MockSource::new("a").answering(true).into_arc(), MockSource::new("b").into_arc()],
    );
    let orchestrator = orchestrator(registry.clone(), fast_config());

    assert!(!orchestrator.check(&key("203.0.113.1")).await.flagged);

    registry.set_min_consensus(0.5).unwrap();
    let verdict = orchestrator.check(&key("203.0.113.1")).await;
    assert!(verdict.flagged, "cached result set is re-reduced at the new threshold");
    assert!(verdict.from_cache);

    registry.set_min_consensus(0.9).unwrap();
    registry.set_algorithm(AlgorithmMethod::Cascade);
    let verdict = orchestrator.check(&key("203.0.113.2")).await;
    assert!(verdict.flagged);
    assert_eq!(verdict.algorithm, AlgorithmMethod::Cascade);

    assert!(matches!(registry.set_min_consensus(1.5), Err(RegistryError::InvalidThreshold(_))));
    assert!(matches!(registry.set_min_consensus(f64::NAN), Err(RegistryError::InvalidThreshold(_))));
    assert!((registry.min_consensus_threshold() - 0.9).abs() < f64::EPSILON);
}

#[tokio::test]
async fn test_disable_policy_holds_until_reenabled() {
    let broken = MockSource::new("teoh")
        .failing(SourceError::HttpStatus(403, "forbidden".to_string()))
        .into_arc();
    let registry = SourceRegistry::new(AlgorithmMethod::Consensus, 0.6);
    registry
        .register(
            broken.clone() as Arc<dyn Source>,
            SourceSettings::default().with_health(HealthConfig {
                hard_failure_policy: HardFailurePolicy::Disable,
                cooldown_seconds: 300,
            }),
        )
        .unwrap();
    let registry = Arc::new(registry);
    let orchestrator = orchestrator(registry.clone(), fast_config());

    orchestrator.check(&key("203.0.113.1")).await;
    let skipped = orchestrator.check(&key("203.0.113.2")).await;
    match &skipped.results[0].outcome {
        SourceOutcome::Failed { reason, hard: true } => assert!(reason.contains("disabled")),
        other => panic!("expected disabled source, got {other:?}"),
    }
    assert_eq!(broken.calls(), 1);
    assert!(registry.source("teoh").unwrap().health_status().disabled);

    registry.set_enabled("teoh", true).unwrap();
    assert!(!registry.source("teoh").unwrap().health_status().disabled);

    orchestrator.check(&key("203.0.113.3")).await;
    assert_eq!(broken.calls(), 2, "re-enabled source is queried again");
}

#[tokio::test(start_paused = true)]
async fn test_cooldown_expires_with_time() {
    let broken = MockSource::new("teoh")
        .failing(SourceError::MissingCredential("teoh".to_string()))
        .into_arc();
    let registry = registry_with(AlgorithmMethod::Consensus, 0.6, vec![broken.clone()]);
    let orchestrator = orchestrator(registry.clone(), fast_config());

    orchestrator.check(&key("203.0.113.1")).await;
    orchestrator.check(&key("203.0.113.2")).await;
    assert_eq!(broken.calls(), 1);
    let remaining = registry.source("teoh").unwrap().health_status().cooldown_remaining_secs;
    assert!(matches!(remaining, Some(secs) if secs >= 299), "remaining {remaining:?}");

    tokio::time::advance(Duration::from_secs(301)).await;
    orchestrator.check(&key("203.0.113.3")).await;
    assert_eq!(broken.calls(), 2);
}

#[tokio::test]
async fn test_unknown_source_admin() {
    let registry = registry_with(AlgorithmMethod::Consensus, 0.6, Vec::new());
    assert!(matches!(registry.set_enabled("ghost", true), Err(RegistryError::UnknownSource(_))));
    assert!(registry.source("ghost").is_none());
    assert!(registry.is_empty());
}
