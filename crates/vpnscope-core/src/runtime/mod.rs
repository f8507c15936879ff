//! vpnscope runtime initialization and lifecycle management.
//!
//! Wires the registry, verdict cache, orchestrator and analytics adapter from an
//! [`AppConfig`](crate::config::AppConfig), and owns their shutdown.
//!
//! # Examples
//!
//! ## Host Plugin
//!
//! ```no_run
//! use std::{path::Path, sync::Arc};
//! use vpnscope_core::{config::AppConfig, runtime::VpnScopeRuntime, source::BlocklistSource};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AppConfig::load()?;
//!
//!     // Sources implemented by the host are supplied in code; `[[sources]]` entries of
//!     // kind `plugin` configure them by name.
//!     let runtime = VpnScopeRuntime::builder()
//!         .with_config(config)
//!         .with_source(Arc::new(BlocklistSource::from_file("staff-list", Path::new("staff.txt"))?))
//!         .build()?;
//!
//!     let verdict = runtime.orchestrator().check_str("203.0.113.7").await?;
//!     println!("flagged: {}", verdict.flagged);
//!
//!     runtime.shutdown();
//!     Ok(())
//! }
//! ```

pub mod builder;
pub mod lifecycle;

pub use builder::{BuildError, VpnScopeRuntimeBuilder};
pub use lifecycle::VpnScopeRuntime;
