//! Tests for roster analytics: batch counts, per-member flags and the provider table.

use crate::mock_infrastructure::{fast_config, ip, member, orchestrator, registry_with, MockSource};
use std::{sync::Arc, time::Duration};
use uuid::Uuid;
use vpnscope_core::{
    analytics::{
        AnalyticsConfig, ProviderId, ProviderKind, ProviderValue, RosterAnalytics, Subject,
        PROVIDERS,
    },
    key::{Key, KeyKind},
    orchestrator::OrchestratorConfig,
    verdict::AlgorithmMethod,
};

fn analytics_over(
    source: Arc<MockSource>,
    config: OrchestratorConfig,
    analytics: &AnalyticsConfig,
) -> RosterAnalytics {
    let registry = registry_with(AlgorithmMethod::Cascade, 0.6, vec![source]);
    RosterAnalytics::new(Arc::new(orchestrator(registry, config)), analytics)
}

fn default_analytics(source: Arc<MockSource>) -> RosterAnalytics {
    analytics_over(source, fast_config(), &AnalyticsConfig::default())
}

#[tokio::test]
async fn test_count_vpn_users_skips_members_without_address() {
    let source = MockSource::new("local")
        .flagging([Key::Ip(ip(2)), Key::Ip(ip(4)), Key::Ip(ip(6))])
        .into_arc();
    let analytics = default_analytics(source.clone());

    let roster: Vec<_> = (1..=5).map(|n| member(n, true)).chain([member(6, false)]).collect();

    assert_eq!(analytics.count_vpn_users(&roster).await, 2);
    assert_eq!(source.calls(), 5, "member without an address is never checked");
}

#[tokio::test]
async fn test_count_leaked_accounts() {
    let leaked = Uuid::from_u128(3);
    let source = MockSource::new("mcleaks")
        .supporting(KeyKind::Player)
        .flagging([Key::Player(leaked)])
        .into_arc();
    let analytics = default_analytics(source.clone());

    let roster: Vec<_> = (1..=4).map(|n| member(n, n % 2 == 0)).collect();

    assert_eq!(analytics.count_leaked_accounts(&roster).await, 1);
    assert_eq!(analytics.count_vpn_users(&roster).await, 0);
    assert_eq!(source.calls(), 4, "address checks are not dispatched to a player-only source");
}

#[tokio::test]
async fn test_empty_roster_counts_zero() {
    let source = MockSource::new("local").answering(true).into_arc();
    let analytics = default_analytics(source.clone());

    assert_eq!(analytics.count_vpn_users(&[]).await, 0);
    assert_eq!(analytics.count_leaked_accounts(&[]).await, 0);
    assert_eq!(source.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_batch_ceiling_abandons_slow_checks() {
    let source = MockSource::new("slow")
        .answering(true)
        .with_delay(Duration::from_secs(5))
        .into_arc();
    let orchestrator_config = OrchestratorConfig {
        source_timeout_ms: 60_000,
        check_ceiling_ms: 120_000,
        ..fast_config()
    };
    let analytics = analytics_over(
        source,
        orchestrator_config,
        &AnalyticsConfig { batch_ceiling_seconds: 1, max_concurrent_checks: 4 },
    );

    let roster: Vec<_> = (1..=3).map(|n| member(n, true)).collect();
    assert_eq!(analytics.count_vpn_users(&roster).await, 0, "abandoned checks count as not flagged");
}

#[tokio::test(start_paused = true)]
async fn test_batch_within_ceiling_counts_everything() {
    let source = MockSource::new("slowish")
        .answering(true)
        .with_delay(Duration::from_millis(50))
        .into_arc();
    let analytics = analytics_over(
        source,
        fast_config(),
        &AnalyticsConfig { batch_ceiling_seconds: 1, max_concurrent_checks: 2 },
    );

    let roster: Vec<_> = (1..=6).map(|n| member(n, true)).collect();
    assert_eq!(analytics.count_vpn_users(&roster).await, 6);
}

#[tokio::test]
async fn test_uses_vpn_without_address_is_false() {
    let source = MockSource::new("local").answering(true).into_arc();
    let analytics = default_analytics(source.clone());

    assert!(!analytics.uses_vpn(&member(1, false)).await);
    assert_eq!(source.calls(), 0);

    assert!(analytics.uses_vpn(&member(2, true)).await);
    assert!(analytics.is_leaked(Uuid::from_u128(2)).await);
}

#[tokio::test]
async fn test_evaluate_matches_subject_to_provider_kind() {
    let source = MockSource::new("local").flagging([Key::Ip(ip(1))]).into_arc();
    let analytics = default_analytics(source);

    let roster = vec![member(1, true), member(2, true)];
    let flagged = &roster[0];

    for provider in PROVIDERS {
        let subject = match provider.kind {
            ProviderKind::Number => Subject::Roster(&roster),
            ProviderKind::Boolean => Subject::Member(flagged),
        };
        assert!(analytics.evaluate(provider.id, subject).await.is_some(), "{:?}", provider.id);
    }

    assert_eq!(
        analytics.evaluate(ProviderId::VpnUsers, Subject::Roster(&roster)).await,
        Some(ProviderValue::Number(1))
    );
    assert_eq!(
        analytics.evaluate(ProviderId::UsesVpn, Subject::Member(flagged)).await,
        Some(ProviderValue::Boolean(true))
    );
    assert_eq!(
        analytics.evaluate(ProviderId::LeakedAccount, Subject::Member(flagged)).await,
        Some(ProviderValue::Boolean(false))
    );

    assert_eq!(analytics.evaluate(ProviderId::VpnUsers, Subject::Member(flagged)).await, None);
    assert_eq!(analytics.evaluate(ProviderId::UsesVpn, Subject::Roster(&roster)).await, None);
}

#[tokio::test]
async fn test_shutdown_abandons_later_batches() {
    let source = MockSource::new("local").answering(true).into_arc();
    let analytics = default_analytics(source.clone());

    analytics.shutdown();

    let roster: Vec<_> = (1..=3).map(|n| member(n, true)).collect();
    assert_eq!(analytics.count_vpn_users(&roster).await, 0);
    assert_eq!(source.calls(), 0);
}
