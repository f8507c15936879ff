//! Roster analytics for host integrations.
//!
//! Hosts with an analytics dashboard typically want four values: how many online members are
//! on a VPN, how many use a leaked account, and the two per-member flags. [`PROVIDERS`]
//! describes them so a host adapter can register them with whatever metric API it exposes,
//! and [`RosterAnalytics::evaluate`] computes them.
//!
//! Roster-wide counts run through a dedicated [`BoundedFanout`] bounded by a batch ceiling;
//! checks still running at the ceiling are not counted.
//!
//! # Example Configuration
//!
//! ```toml
//! [analytics]
//! batch_ceiling_seconds = 40
//! max_concurrent_checks = 4
//! ```

use crate::{
    fanout::{BoundedFanout, TaskOutcome},
    key::Key,
    orchestrator::QueryOrchestrator,
};
use serde::{Deserialize, Serialize};
use std::{net::IpAddr, sync::Arc, time::Duration};
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyticsConfig {
    /// Upper bound for one roster-wide count (default: 40).
    #[serde(default = "default_batch_ceiling_seconds")]
    pub batch_ceiling_seconds: u64,

    /// Member checks in flight at once (default: half the available cores).
    #[serde(default = "BoundedFanout::default_width")]
    pub max_concurrent_checks: usize,
}

fn default_batch_ceiling_seconds() -> u64 {
    40
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            batch_ceiling_seconds: default_batch_ceiling_seconds(),
            max_concurrent_checks: BoundedFanout::default_width(),
        }
    }
}

impl AnalyticsConfig {
    #[must_use]
    pub fn batch_ceiling(&self) -> Duration {
        Duration::from_secs(self.batch_ceiling_seconds)
    }
}

/// An online member of the host application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub player_id: Uuid,
    /// `None` when the host does not know the member's address.
    pub ip: Option<IpAddr>,
}

impl Member {
    #[must_use]
    pub fn new(player_id: Uuid, ip: Option<IpAddr>) -> Self {
        Self { player_id, ip }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderId {
    VpnUsers,
    LeakedUsers,
    UsesVpn,
    LeakedAccount,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Roster-wide count.
    Number,
    /// Per-member flag.
    Boolean,
}

/// Static description of one analytics value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProviderDescriptor {
    pub id: ProviderId,
    pub kind: ProviderKind,
    pub text: &'static str,
    pub description: &'static str,
    pub icon: &'static str,
    /// Display order among number providers, higher first.
    pub priority: u8,
}

pub const PROVIDERS: [ProviderDescriptor; 4] = [
    ProviderDescriptor {
        id: ProviderId::VpnUsers,
        kind: ProviderKind::Number,
        text: "VPN Users",
        description: "Number of online VPN users.",
        icon: "user-shield",
        priority: 2,
    },
    ProviderDescriptor {
        id: ProviderId::LeakedUsers,
        kind: ProviderKind::Number,
        text: "MCLeaks Users",
        description: "Number of online MCLeaks users.",
        icon: "users",
        priority: 1,
    },
    ProviderDescriptor {
        id: ProviderId::UsesVpn,
        kind: ProviderKind::Boolean,
        text: "VPN",
        description: "Using a VPN or proxy.",
        icon: "user-shield",
        priority: 0,
    },
    ProviderDescriptor {
        id: ProviderId::LeakedAccount,
        kind: ProviderKind::Boolean,
        text: "MCLeaks",
        description: "Using an MCLeaks account.",
        icon: "users",
        priority: 0,
    },
];

/// What a provider is evaluated against.
#[derive(Debug, Clone, Copy)]
pub enum Subject<'a> {
    Roster(&'a [Member]),
    Member(&'a Member),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ProviderValue {
    Number(usize),
    Boolean(bool),
}

pub struct RosterAnalytics {
    orchestrator: Arc<QueryOrchestrator>,
    fanout: BoundedFanout,
    batch_ceiling: Duration,
}

impl std::fmt::Debug for RosterAnalytics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RosterAnalytics")
            .field("fanout_width", &self.fanout.width())
            .field("batch_ceiling", &self.batch_ceiling)
            .finish_non_exhaustive()
    }
}

impl RosterAnalytics {
    #[must_use]
    pub fn new(orchestrator: Arc<QueryOrchestrator>, config: &AnalyticsConfig) -> Self {
        Self {
            orchestrator,
            fanout: BoundedFanout::new(config.max_concurrent_checks),
            batch_ceiling: config.batch_ceiling(),
        }
    }

    /// Members whose address is flagged. Members without an address are skipped.
    pub async fn count_vpn_users(&self, roster: &[Member]) -> usize {
        let keys = roster.iter().filter_map(|m| m.ip).map(Key::Ip).collect();
        self.count_flagged(keys).await
    }

    /// Members whose player id is flagged.
    pub async fn count_leaked_accounts(&self, roster: &[Member]) -> usize {
        let keys = roster.iter().map(|m| Key::Player(m.player_id)).collect();
        self.count_flagged(keys).await
    }

    pub async fn uses_vpn(&self, member: &Member) -> bool {
        match member.ip {
            Some(ip) => self.orchestrator.check(&Key::Ip(ip)).await.flagged,
            None => false,
        }
    }

    pub async fn is_leaked(&self, player_id: Uuid) -> bool {
        self.orchestrator.check(&Key::Player(player_id)).await.flagged
    }

    /// Computes a provider value. Returns `None` when the subject does not fit the provider
    /// kind (a roster for a per-member flag or vice versa).
    pub async fn evaluate(&self, id: ProviderId, subject: Subject<'_>) -> Option<ProviderValue> {
        match (id, subject) {
            (ProviderId::VpnUsers, Subject::Roster(roster)) => {
                Some(ProviderValue::Number(self.count_vpn_users(roster).await))
            }
            (ProviderId::LeakedUsers, Subject::Roster(roster)) => {
                Some(ProviderValue::Number(self.count_leaked_accounts(roster).await))
            }
            (ProviderId::UsesVpn, Subject::Member(member)) => {
                Some(ProviderValue::Boolean(self.uses_vpn(member).await))
            }
            (ProviderId::LeakedAccount, Subject::Member(member)) => {
                Some(ProviderValue::Boolean(self.is_leaked(member.player_id).await))
            }
            _ => None,
        }
    }

    /// Closes the analytics pool.
    pub fn shutdown(&self) {
        self.fanout.shutdown();
    }

    async fn count_flagged(&self, keys: Vec<Key>) -> usize {
        let total = keys.len();
        let orchestrator = Arc::clone(&self.orchestrator);
        let outcomes = self
            .fanout
            .run(keys, self.batch_ceiling, move |key| {
                let orchestrator = Arc::clone(&orchestrator);
                async move { orchestrator.check(&key).await.flagged }
            })
            .await;

        let abandoned = outcomes.iter().filter(|o| !matches!(o, TaskOutcome::Completed(_))).count();
        let flagged = outcomes.into_iter().filter(|o| *o == TaskOutcome::Completed(true)).count();
        debug!(total, flagged, abandoned, "roster batch complete");
        flagged
    }
}
