//! # pager-server
//!
//! HTTP front end for the Pager relay: configuration, handlers and metrics.
//! The `pager` binary wires these together; tests drive [`build_router`]
//! directly.

pub mod config;
pub mod handlers;
pub mod metrics;

pub use config::Config;
pub use handlers::{build_router, run_server, AppState};
