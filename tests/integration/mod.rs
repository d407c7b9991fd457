//! Integration suite for the relaycheck harness
//!
//! Exercises the scenario runner, supervisor, and resolver end-to-end
//! against the bundled stub relay.

pub mod infrastructure;
pub mod scenarios;

// Re-export commonly used fixtures for convenience
pub use infrastructure::{init_tracing, stub_relay_config, stub_relay_path};
