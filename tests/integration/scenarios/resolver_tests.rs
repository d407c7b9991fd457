//! Listen-address discovery against live processes.

use std::time::{Duration, Instant};

use crate::infrastructure::{init_tracing, stub_relay_path};
use relaycheck::error::HarnessError;
use relaycheck::resolver;
use relaycheck::scenario::{self, ScenarioConfig};
use relaycheck::supervisor::Supervisor;
use relaycheck::Result;

#[tokio::test]
async fn resolves_stub_relay_listen_address() -> Result<()> {
    init_tracing();

    let sup = Supervisor::default();
    let mut relay = sup.launch(stub_relay_path(), &["127.0.0.1", "0", "127.0.0.1", "9"])?;

    let addr = resolver::wait_for_listen(&mut relay, None).await?;
    assert!(addr.ip().is_loopback());
    assert_ne!(addr.port(), 0);

    // the discovered address accepts connections
    let conn = tokio::time::timeout(
        Duration::from_secs(5),
        tokio::net::TcpStream::connect(addr),
    )
    .await;
    assert!(matches!(conn, Ok(Ok(_))));

    relay.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn port_filter_only_matches_the_requested_port() -> Result<()> {
    init_tracing();

    let sup = Supervisor::default();
    let mut relay = sup.launch(stub_relay_path(), &["127.0.0.1", "0", "127.0.0.1", "9"])?;

    let addr = resolver::wait_for_listen(&mut relay, None).await?;
    let filtered = resolver::wait_for_listen(&mut relay, Some(addr.port())).await?;
    assert_eq!(filtered.port(), addr.port());

    // a port the process does not own never matches, so the wait runs until
    // the caller's deadline instead of returning a wrong socket
    let missing = tokio::time::timeout(
        Duration::from_millis(200),
        resolver::wait_for_listen(&mut relay, Some(addr.port().wrapping_add(1))),
    )
    .await;
    assert!(missing.is_err());

    relay.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn exited_process_fails_fast() -> Result<()> {
    init_tracing();

    let sup = Supervisor::default();
    let mut child = sup.launch("true", &[] as &[&str])?;

    let started = Instant::now();
    let err = resolver::wait_for_listen(&mut child, None).await.unwrap_err();
    assert!(matches!(err, HarnessError::ProcessNotListening { .. }));
    assert!(started.elapsed() < Duration::from_secs(2));
    Ok(())
}

#[tokio::test]
async fn relay_that_never_listens_fails_the_scenario() -> Result<()> {
    init_tracing();

    // `false` exits immediately, so the scenario must fail with
    // ProcessNotListening and still tear everything down
    let cfg = ScenarioConfig::new(vec!["false".to_string()]);
    let err = scenario::client_sends(&cfg, b"x").await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<HarnessError>(),
        Some(HarnessError::ProcessNotListening { .. })
    ));
    Ok(())
}
