//! ---
//! vlink_section: "01-core-functionality"
//! vlink_subsection: "module"
//! vlink_type: "source"
//! vlink_scope: "code"
//! vlink_description: "Shared primitives and utilities for the core runtime."
//! vlink_version: "v0.0.0-prealpha"
//! vlink_owner: "tbd"
//! ---
//! Shared primitives for the V-Link bridge workspace.
//! This crate exposes the runtime configuration type and the tracing
//! initialisation consumed by the daemon binary and the integration tests.

pub mod config;
pub mod logging;

pub use config::Config;
pub use logging::{init_tracing, LogFormat};
