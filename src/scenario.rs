//! End-to-end conformance scenarios.
//!
//! Every scenario follows the same script: bind an upstream peer listener on
//! an ephemeral port, launch the relay pointed at it, resolve the relay's own
//! ephemeral address, drive a traffic pattern through the relay with the peer
//! role on its own task, then compare what each side observed and tear the
//! relay down through the supervisor ladder.

use std::net::SocketAddr;
use std::time::Duration;

use eyre::{ensure, eyre, WrapErr};
use rand::rngs::SmallRng;
use rand::{RngCore, SeedableRng};
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info};

use crate::chunk_io::{self, ChunkBounds, MAX_CHUNK};
use crate::error::HarnessError;
use crate::resolver;
use crate::supervisor::{ManagedProcess, Supervisor, DEFAULT_GRACE};

/// Number of bytes pushed through the relay by the bulk scenarios.
pub const BULK_LEN: usize = 20_000_000;

/// Parameters shared by every scenario in a run.
#[derive(Debug, Clone)]
pub struct ScenarioConfig {
    /// Relay launch command: program plus any leading arguments. The harness
    /// appends `<bind-host> 0 <target-host> <target-port>`.
    pub proxy_command: Vec<String>,
    /// Host the relay is asked to bind on.
    pub bind_host: String,
    /// Bounds for the randomized chunk sizes on both roles.
    pub chunk_bounds: ChunkBounds,
    /// Deadline applied to every blocking network operation.
    pub io_timeout: Duration,
    /// Grace period between shutdown escalation steps.
    pub grace: Duration,
    /// Base seed; each role derives its own generator from it.
    pub seed: u64,
}

impl ScenarioConfig {
    pub fn new(proxy_command: Vec<String>) -> Self {
        Self {
            proxy_command,
            bind_host: "localhost".to_string(),
            chunk_bounds: ChunkBounds::default(),
            io_timeout: Duration::from_secs(10),
            grace: DEFAULT_GRACE,
            seed: 0,
        }
    }

    // Sender and receiver roles never share a chunk plan: the client derives
    // from the base seed, the peer from seed+1, payloads from seed+2.
    fn client_rng(&self) -> SmallRng {
        SmallRng::seed_from_u64(self.seed)
    }

    fn peer_rng(&self) -> SmallRng {
        SmallRng::seed_from_u64(self.seed.wrapping_add(1))
    }

    /// Deterministic payload for the bulk scenarios, reproducible from the
    /// base seed alone.
    pub fn blob(&self, len: usize) -> Vec<u8> {
        let mut payload = vec![0u8; len];
        SmallRng::seed_from_u64(self.seed.wrapping_add(2)).fill_bytes(&mut payload);
        payload
    }

    fn supervisor(&self) -> Supervisor {
        Supervisor::new(self.grace)
    }
}

/// One conformance check, selectable by name from the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scenario {
    ClientSendsSmall,
    ClientSendsEmpty,
    ClientSendsBulk,
    ServerSendsSmall,
    ServerSendsEmpty,
    ServerSendsBulk,
    Echo,
    Iperf3,
}

impl Scenario {
    pub const ALL: [Scenario; 8] = [
        Scenario::ClientSendsSmall,
        Scenario::ClientSendsEmpty,
        Scenario::ClientSendsBulk,
        Scenario::ServerSendsSmall,
        Scenario::ServerSendsEmpty,
        Scenario::ServerSendsBulk,
        Scenario::Echo,
        Scenario::Iperf3,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Scenario::ClientSendsSmall => "client-sends-small",
            Scenario::ClientSendsEmpty => "client-sends-empty",
            Scenario::ClientSendsBulk => "client-sends-bulk",
            Scenario::ServerSendsSmall => "server-sends-small",
            Scenario::ServerSendsEmpty => "server-sends-empty",
            Scenario::ServerSendsBulk => "server-sends-bulk",
            Scenario::Echo => "echo",
            Scenario::Iperf3 => "iperf3",
        }
    }

    pub fn from_name(name: &str) -> Option<Scenario> {
        Scenario::ALL.into_iter().find(|s| s.name() == name)
    }

    pub async fn run(self, cfg: &ScenarioConfig) -> crate::Result<()> {
        match self {
            Scenario::ClientSendsSmall => client_sends(cfg, b"testdata").await,
            Scenario::ClientSendsEmpty => client_sends(cfg, b"").await,
            Scenario::ClientSendsBulk => client_sends(cfg, &cfg.blob(BULK_LEN)).await,
            Scenario::ServerSendsSmall => server_sends(cfg, b"testdata").await,
            Scenario::ServerSendsEmpty => server_sends(cfg, b"").await,
            Scenario::ServerSendsBulk => server_sends(cfg, &cfg.blob(BULK_LEN)).await,
            Scenario::Echo => echo(cfg).await,
            Scenario::Iperf3 => iperf3_smoke(cfg).await,
        }
    }
}

/// Message script for the echo scenario; the last message fills the whole
/// default chunk ceiling so a single read can never cover it.
pub fn echo_messages() -> Vec<Vec<u8>> {
    vec![
        b"testdata".to_vec(),
        b"m".to_vec(),
        b"biiiiiiiiiiiiiiiiiiiiiiiiiiiiiiiiiiiiiiigmsg".to_vec(),
        vec![b'z'; MAX_CHUNK],
    ]
}

/// Peer-role task handle that aborts the task if the scenario unwinds
/// before joining it, so no accept/recv keeps a socket alive past its scope.
struct PeerTask<T> {
    handle: Option<JoinHandle<Result<T, HarnessError>>>,
}

impl<T> PeerTask<T> {
    fn new(handle: JoinHandle<Result<T, HarnessError>>) -> Self {
        Self {
            handle: Some(handle),
        }
    }

    async fn join(mut self) -> crate::Result<T> {
        let handle = self.handle.take().expect("peer task joined twice");
        let observed = handle.await.wrap_err("peer task panicked")??;
        Ok(observed)
    }
}

impl<T> Drop for PeerTask<T> {
    fn drop(&mut self) {
        if let Some(handle) = &self.handle {
            handle.abort();
        }
    }
}

/// Binds the upstream peer listener on an ephemeral loopback port.
fn peer_listener() -> crate::Result<TcpListener> {
    let socket = Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP))?;
    socket.bind(&SocketAddr::from(([127, 0, 0, 1], 0)).into())?;
    socket.listen(16)?;
    socket.set_nonblocking(true)?;
    TcpListener::from_std(socket.into()).wrap_err("failed to register peer listener")
}

/// Launches the relay pointed at `target` and resolves its public address.
async fn start_proxy(
    cfg: &ScenarioConfig,
    sup: &Supervisor,
    target: SocketAddr,
) -> crate::Result<(ManagedProcess, SocketAddr)> {
    let (program, leading) = cfg
        .proxy_command
        .split_first()
        .ok_or_else(|| eyre!("relay command is empty"))?;
    let mut args: Vec<String> = leading.to_vec();
    args.extend([
        cfg.bind_host.clone(),
        "0".to_string(),
        target.ip().to_string(),
        target.port().to_string(),
    ]);

    let mut proxy = sup.launch(program, &args)?;
    let addr = timeout(cfg.io_timeout, resolver::wait_for_listen(&mut proxy, None))
        .await
        .map_err(|_| HarnessError::Timeout {
            what: "relay listen",
            after: cfg.io_timeout,
        })??;
    info!("relay {} listening on {}", proxy.pid(), addr);
    Ok((proxy, addr))
}

async fn connect(cfg: &ScenarioConfig, addr: SocketAddr) -> Result<TcpStream, HarnessError> {
    timeout(cfg.io_timeout, TcpStream::connect(addr))
        .await
        .map_err(|_| HarnessError::Timeout {
            what: "connect",
            after: cfg.io_timeout,
        })?
        .map_err(Into::into)
}

async fn accept(
    listener: &TcpListener,
    io_timeout: Duration,
) -> Result<TcpStream, HarnessError> {
    let (sock, addr) = timeout(io_timeout, listener.accept())
        .await
        .map_err(|_| HarnessError::Timeout {
            what: "peer accept",
            after: io_timeout,
        })??;
    debug!("peer accepted connection from {addr}");
    Ok(sock)
}

/// Stops the relay via the escalation ladder and checks it exited cleanly.
async fn stop_proxy(mut proxy: ManagedProcess) -> crate::Result<()> {
    let status = proxy.shutdown().await?;
    ensure!(status.success(), "relay exited with {status}");
    debug!("relay torn down cleanly");
    Ok(())
}

/// One-directional client→peer: the client pushes `payload` through the
/// relay and closes; the peer receives until close and must observe exactly
/// the payload.
pub async fn client_sends(cfg: &ScenarioConfig, payload: &[u8]) -> crate::Result<()> {
    let sup = cfg.supervisor();
    let listener = peer_listener()?;
    let peer_addr = listener.local_addr()?;
    debug!("peer listening on {peer_addr}");

    let io_timeout = cfg.io_timeout;
    let bounds = cfg.chunk_bounds;
    let mut peer_rng = cfg.peer_rng();
    let peer = PeerTask::new(tokio::spawn(async move {
        let mut sock = accept(&listener, io_timeout).await?;
        chunk_io::recv_chunked(&mut sock, &mut peer_rng, None, bounds, io_timeout).await
    }));

    let (proxy, proxy_addr) = start_proxy(cfg, &sup, peer_addr).await?;

    {
        let mut client = connect(cfg, proxy_addr).await?;
        let mut rng = cfg.client_rng();
        debug!("sending {} bytes through the relay", payload.len());
        chunk_io::send_chunked(&mut client, payload, &mut rng, bounds, io_timeout).await?;
    } // close, the relay propagates EOF to the peer

    let observed = peer.join().await?;
    if observed != payload {
        return Err(HarnessError::mismatch("client->peer", payload, &observed).into());
    }
    info!("verified {} bytes client->peer", payload.len());

    stop_proxy(proxy).await
}

/// One-directional peer→client: the peer sends `payload` and closes; the
/// client receives until close through the relay.
pub async fn server_sends(cfg: &ScenarioConfig, payload: &[u8]) -> crate::Result<()> {
    let sup = cfg.supervisor();
    let listener = peer_listener()?;
    let peer_addr = listener.local_addr()?;
    debug!("peer listening on {peer_addr}");

    let io_timeout = cfg.io_timeout;
    let bounds = cfg.chunk_bounds;
    let mut peer_rng = cfg.peer_rng();
    let data = payload.to_vec();
    let peer = PeerTask::new(tokio::spawn(async move {
        let mut sock = accept(&listener, io_timeout).await?;
        chunk_io::send_chunked(&mut sock, &data, &mut peer_rng, bounds, io_timeout).await
        // sock drops here, closing the upstream side
    }));

    let (proxy, proxy_addr) = start_proxy(cfg, &sup, peer_addr).await?;

    let mut client = connect(cfg, proxy_addr).await?;
    let mut rng = cfg.client_rng();
    let observed = chunk_io::recv_chunked(&mut client, &mut rng, None, bounds, io_timeout).await?;
    drop(client);

    peer.join().await?;
    if observed != payload {
        return Err(HarnessError::mismatch("peer->client", payload, &observed).into());
    }
    info!("verified {} bytes peer->client", payload.len());

    stop_proxy(proxy).await
}

/// Half-duplex echo: the client sends each message and reads it back; the
/// peer echoes whatever it actually received, and the scenario checks both
/// views after the join.
pub async fn echo(cfg: &ScenarioConfig) -> crate::Result<()> {
    let messages = echo_messages();
    let sup = cfg.supervisor();
    let listener = peer_listener()?;
    let peer_addr = listener.local_addr()?;
    debug!("peer listening on {peer_addr}");

    let io_timeout = cfg.io_timeout;
    let bounds = cfg.chunk_bounds;
    let mut peer_rng = cfg.peer_rng();
    let script = messages.clone();
    let peer = PeerTask::new(tokio::spawn(async move {
        let mut sock = accept(&listener, io_timeout).await?;
        let mut observed = Vec::with_capacity(script.len());
        for msg in &script {
            let recvd =
                chunk_io::recv_chunked(&mut sock, &mut peer_rng, Some(msg.len()), bounds, io_timeout)
                    .await?;
            chunk_io::send_chunked(&mut sock, &recvd, &mut peer_rng, bounds, io_timeout).await?;
            observed.push(recvd);
        }
        Ok::<_, HarnessError>(observed)
    }));

    let (proxy, proxy_addr) = start_proxy(cfg, &sup, peer_addr).await?;

    let mut client = connect(cfg, proxy_addr).await?;
    let mut rng = cfg.client_rng();
    for msg in &messages {
        chunk_io::send_chunked(&mut client, msg, &mut rng, bounds, io_timeout).await?;
        let back =
            chunk_io::recv_chunked(&mut client, &mut rng, Some(msg.len()), bounds, io_timeout)
                .await?;
        if back != *msg {
            return Err(HarnessError::mismatch("echo round-trip", msg, &back).into());
        }
    }
    drop(client);

    let observed = peer.join().await?;
    for (msg, got) in messages.iter().zip(&observed) {
        if got != msg {
            return Err(HarnessError::mismatch("client->peer", msg, got).into());
        }
    }
    info!("verified {} echo messages", messages.len());

    stop_proxy(proxy).await
}

/// High-concurrency bidirectional smoke test delegated to the external
/// iperf3 benchmark: a one-off iperf3 server upstream, the relay in front of
/// it, and an iperf3 client with 16 parallel bidirectional streams.
pub async fn iperf3_smoke(cfg: &ScenarioConfig) -> crate::Result<()> {
    let sup = cfg.supervisor();

    let mut server = sup.launch("iperf3", &["--server", "--one-off", "--bind", "127.0.0.1"])?;
    let server_addr = timeout(cfg.io_timeout, resolver::wait_for_listen(&mut server, None))
        .await
        .map_err(|_| HarnessError::Timeout {
            what: "iperf3 server listen",
            after: cfg.io_timeout,
        })??;
    debug!("iperf3 server on {server_addr}");

    let (proxy, proxy_addr) = start_proxy(cfg, &sup, server_addr).await?;

    let host = proxy_addr.ip().to_string();
    let port = proxy_addr.port().to_string();
    let mut client = sup.launch(
        "iperf3",
        &[
            "--client",
            host.as_str(),
            "--port",
            port.as_str(),
            "--parallel",
            "16",
            "--bidir",
        ],
    )?;

    // the benchmark itself runs ~10s, so give it headroom beyond io_timeout
    let bench_deadline = cfg.io_timeout * 3;
    let client_status = client
        .wait_timeout(bench_deadline)
        .await?
        .ok_or(HarnessError::Timeout {
            what: "iperf3 client",
            after: bench_deadline,
        })?;
    ensure!(client_status.success(), "iperf3 client exited with {client_status}");

    // the one-off server exits on its own once the client run completes
    let server_status = server
        .wait_timeout(cfg.io_timeout)
        .await?
        .ok_or(HarnessError::Timeout {
            what: "iperf3 server exit",
            after: cfg.io_timeout,
        })?;
    ensure!(server_status.success(), "iperf3 server exited with {server_status}");

    stop_proxy(proxy).await
}
