//! Raw TCP conformance scenarios against the stub relay: one-directional
//! transfers in both directions for small, empty, and bulk payloads, plus
//! the half-duplex echo script.

use crate::infrastructure::{init_tracing, stub_relay_config};
use relaycheck::scenario::{self, BULK_LEN};
use relaycheck::Result;

#[tokio::test]
async fn client_send_server_recv_small() -> Result<()> {
    init_tracing();
    scenario::client_sends(&stub_relay_config(1), b"testdata").await
}

#[tokio::test]
async fn client_send_server_recv_empty() -> Result<()> {
    init_tracing();
    scenario::client_sends(&stub_relay_config(1), b"").await
}

#[tokio::test]
async fn client_send_server_recv_blob() -> Result<()> {
    init_tracing();
    let cfg = stub_relay_config(1);
    let blob = cfg.blob(BULK_LEN);
    scenario::client_sends(&cfg, &blob).await
}

#[tokio::test]
async fn client_recv_server_send_small() -> Result<()> {
    init_tracing();
    scenario::server_sends(&stub_relay_config(2), b"testdata").await
}

#[tokio::test]
async fn client_recv_server_send_empty() -> Result<()> {
    init_tracing();
    scenario::server_sends(&stub_relay_config(2), b"").await
}

#[tokio::test]
async fn client_recv_server_send_blob() -> Result<()> {
    init_tracing();
    let cfg = stub_relay_config(2);
    let blob = cfg.blob(BULK_LEN);
    scenario::server_sends(&cfg, &blob).await
}

#[tokio::test]
async fn echo_server() -> Result<()> {
    init_tracing();
    scenario::echo(&stub_relay_config(2)).await
}
