//! Integration Tests for vpnscope
//!
//! This crate contains various test modules:
//!
//! - `orchestrator_tests`: Dispatch, reduction, caching and de-duplication through the public API
//! - `quota_tests`: Quota enforcement and the periodic window reset
//! - `registry_tests`: Administrative operations while checks are running
//! - `analytics_tests`: Roster-wide counts and per-member flags
//! - `runtime_tests`: Runtime building from configuration, reconfiguration and shutdown
//! - `mock_infrastructure`: Reusable scripted sources and fixtures
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test --package tests
//! ```


#[cfg(test)]
mod quota_tests;

#[cfg(test)]
mod registry_tests;

#[cfg(test)]
mod analytics_tests;


/// Mock infrastructure for testing
pub mod mock_infrastructure;
