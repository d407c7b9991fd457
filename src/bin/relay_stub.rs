//! Minimal known-good TCP relay used by the integration suite.
//!
//! `relay-stub <bind-host> <bind-port> <target-host> <target-port>` accepts
//! any number of client connections and forwards bytes in both directions to
//! the configured target. Exits 0 on SIGINT/SIGTERM, so lifecycle scenarios
//! see the same clean-shutdown contract a production relay is expected to
//! honor. Not part of the conformance surface.

use std::net::SocketAddr;

use eyre::{eyre, WrapErr};
use tokio::io::copy_bidirectional;
use tokio::net::{lookup_host, TcpListener, TcpStream};
use tokio::select;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

type Result<T> = color_eyre::eyre::Result<T>;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let [bind_host, bind_port, target_host, target_port] = args.as_slice() else {
        return Err(eyre!(
            "usage: relay-stub <bind-host> <bind-port> <target-host> <target-port>"
        ));
    };

    let listener = TcpListener::bind((bind_host.as_str(), bind_port.parse::<u16>()?))
        .await
        .wrap_err_with(|| format!("failed to bind {bind_host}:{bind_port}"))?;
    info!("listening on {}", listener.local_addr()?);

    let target = resolve(target_host, target_port.parse()?).await?;
    info!("forwarding to {target}");

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    loop {
        select! {
            _ = sigterm.recv() => {
                info!("SIGTERM, exiting");
                return Ok(());
            }
            _ = sigint.recv() => {
                info!("SIGINT, exiting");
                return Ok(());
            }
            accepted = listener.accept() => {
                let (mut client, peer_addr) = accepted?;
                debug!("new client {peer_addr}");
                tokio::spawn(async move {
                    match TcpStream::connect(target).await {
                        Ok(mut upstream) => {
                            if let Err(e) = copy_bidirectional(&mut client, &mut upstream).await {
                                debug!("session {peer_addr} ended: {e}");
                            }
                        }
                        Err(e) => warn!("failed to reach target {target}: {e}"),
                    }
                });
            }
        }
    }
}

async fn resolve(host: &str, port: u16) -> Result<SocketAddr> {
    lookup_host((host, port))
        .await?
        .next()
        .ok_or_else(|| eyre!("no addresses for {host}:{port}"))
}
