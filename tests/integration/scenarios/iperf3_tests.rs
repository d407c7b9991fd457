//! Black-box bulk-transfer smoke test delegated to iperf3.

use crate::infrastructure::{init_tracing, stub_relay_config};
use relaycheck::scenario;
use relaycheck::Result;

#[tokio::test]
#[ignore = "requires iperf3 on PATH"]
async fn iperf3_bidirectional_smoke() -> Result<()> {
    init_tracing();
    scenario::iperf3_smoke(&stub_relay_config(7)).await
}
