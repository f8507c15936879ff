//! Mock Infrastructure for Testing vpnscope
//!
//! Reusable sources and fixtures for exercising the orchestrator without third-party APIs.
//!
//! ## Components
//!
//! - `MockSource`: Scripted source with call counting, delays, hangs and panics
//! - Test helpers for keys, rosters and registries
//!
//! ## Usage
//!
//! ```ignore
//! use tests::mock_infrastructure::{Behavior, MockSource};
//!
//! let source = MockSource::new("flaky")
//!     .then(Behavior::Fail(SourceError::Network("reset".into())))
//!     .answering(true)
//!     .into_arc();
//! ```

pub mod mock_source;
pub mod test_helpers;

pub use mock_source::{Behavior, MockSource};
pub use test_helpers::*;
