//! Main integration test file for relaycheck
//!
//! This file contains the entry point for integration tests.
//! Individual test scenarios are organized in the integration module.

mod integration;

// Re-export for convenience
pub use integration::*;

// A basic smoke test to verify the harness end-to-end against the stub relay
#[tokio::test]
async fn test_harness_smoke_test() -> relaycheck::Result<()> {
    use integration::infrastructure::{init_tracing, stub_relay_config};

    init_tracing();

    let cfg = stub_relay_config(0);
    relaycheck::scenario::client_sends(&cfg, b"hello through the relay").await
}
