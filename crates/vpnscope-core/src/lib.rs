//! # vpnscope Core
//!
//! Aggregation core for VPN, proxy and leaked-account reputation checks.
//!
//! A check asks every enabled reputation source about one key (an IP address or a player id)
//! and reduces the answers into a single [`Verdict`](verdict::Verdict). This crate provides:
//!
//! - **[`source`]**: The source contract, per-source quota windows, concurrency limits and
//!   hard-failure health, plus the built-in offline [`BlocklistSource`](source::BlocklistSource).
//!
//! - **[`registry`]**: Snapshot-swapped source registry with the administrative surface
//!   (register, enable/disable, algorithm and threshold changes).
//!
//! - **[`orchestrator`]**: Bounded concurrent dispatch, verdict caching and in-flight
//!   de-duplication.
//!
//! - **[`verdict`]**: Consensus and cascade reduction.
//!
//! - **[`analytics`]**: Roster-wide counts for host dashboards.
//!
//! - **[`runtime`]**: Configuration-driven wiring and lifecycle.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        VpnScopeRuntime                       │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────┐   │
//! │  │ RosterAnalytics │─►│QueryOrchestrator│  │   Metrics   │   │
//! │  └─────────────────┘  └──┬──────┬─────┬─┘  └──────┬──────┘   │
//! │              ┌───────────┘      │     └──────┐    │          │
//! │  ┌───────────▼─────┐  ┌─────────▼┐  ┌────────▼────▼───────┐  │
//! │  │  ResultCache    │  │ Reducers │  │   SourceRegistry    │  │
//! │  │  (moka)         │  │ consensus│  │   SourceHandle      │  │
//! │  │                 │  │ cascade  │  │   quota / health    │  │
//! │  └─────────────────┘  └──────────┘  └─────────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Check Flow
//!
//! ```text
//! check_str(raw)
//!       │
//!       ▼
//! ┌─────────────┐
//! │  Key parse  │ ─── Invalid ──► CheckError::InvalidKey
//! └──────┬──────┘
//!        │ Valid
//!        ▼
//! ┌─────────────┐
//! │ Cache Check │ ─── Hit ──► Cached verdict (re-reduced if settings changed)
//! └──────┬──────┘
//!        │ Miss
//!        ▼
//! ┌──────────────────┐
//! │ Enabled sources  │ ── health gate ── permit ── quota ── query (timeout)
//! └────────┬─────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │  Reduce         │ ─── nothing contributed ──► unverified, not cached
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │  Cache Insert   │
//! └────────┬────────┘
//!          │
//!          ▼
//!       Verdict
//! ```
//!
//! ## Feature Flags
//!
//! - `test-helpers`: Exposes `clock::MockClock` for downstream test suites

pub mod analytics;
pub mod cache;
pub mod clock;
pub mod config;
pub mod errors;
pub mod fanout;
pub mod key;
pub mod metrics;
pub mod orchestrator;
pub mod registry;
pub mod runtime;
pub mod source;
pub mod verdict;
