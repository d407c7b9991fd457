//! Process lifecycle behavior: shutdown escalation, idempotence, and the
//! stub relay's clean response to SIGTERM.

use std::time::{Duration, Instant};

use crate::infrastructure::{init_tracing, stub_relay_path};
use relaycheck::resolver;
use relaycheck::supervisor::Supervisor;
use relaycheck::Result;

#[tokio::test]
async fn stub_relay_exits_cleanly_on_term() -> Result<()> {
    init_tracing();

    let sup = Supervisor::default();
    let mut relay = sup.launch(stub_relay_path(), &["127.0.0.1", "0", "127.0.0.1", "9"])?;
    resolver::wait_for_listen(&mut relay, None).await?;

    // the ladder's first SIGTERM is enough; exit status must be clean
    let status = relay.shutdown().await?;
    assert!(status.success(), "relay exited with {status}");
    Ok(())
}

#[tokio::test]
async fn shutdown_twice_returns_the_same_status() -> Result<()> {
    init_tracing();

    let sup = Supervisor::default();
    let mut relay = sup.launch(stub_relay_path(), &["127.0.0.1", "0", "127.0.0.1", "9"])?;
    resolver::wait_for_listen(&mut relay, None).await?;

    let first = relay.shutdown().await?;
    let second = relay.shutdown().await?;
    assert_eq!(first.code(), second.code());
    Ok(())
}

#[tokio::test]
async fn shutdown_of_a_oneshot_child_needs_no_signals() -> Result<()> {
    init_tracing();

    // `true` is already gone by the time the ladder starts; the grace-period
    // wait picks up the status without any SIGTERM
    let sup = Supervisor::default();
    let mut child = sup.launch("true", &[] as &[&str])?;
    let status = child.shutdown().await?;
    assert!(status.success());
    Ok(())
}

#[tokio::test]
async fn ladder_completes_within_its_escalation_budget() -> Result<()> {
    init_tracing();

    // a TERM-immune child forces the full ladder: grace, TERM, TERM, KILL
    let grace = Duration::from_millis(100);
    let sup = Supervisor::new(grace);
    let mut child = sup.launch("sh", &["-c", "trap '' TERM; sleep 30"])?;
    tokio::time::sleep(Duration::from_millis(100)).await;

    let started = Instant::now();
    let status = child.shutdown().await?;
    assert!(!status.success());
    // four grace-period waits plus scheduling slack
    assert!(
        started.elapsed() < grace * 4 + Duration::from_secs(2),
        "ladder took {:?}",
        started.elapsed()
    );
    Ok(())
}
