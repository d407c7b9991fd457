//! Discovers the listening address of a freshly launched process.
//!
//! No cooperation from the target is required beyond what the OS already
//! exposes: the process's socket table is polled until a TCP socket in
//! LISTEN state shows up. This works for any unmodified binary at the cost
//! of the polling granularity.

use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use tokio::time::sleep;
use tracing::debug;

use crate::error::HarnessError;
use crate::supervisor::ManagedProcess;

/// How often the socket table is re-read while waiting for a listener.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Connection-state code for LISTEN in procfs socket tables.
const TCP_LISTEN: &str = "0A";

/// Waits until `proc` has a TCP socket in LISTEN state and returns its local
/// address.
///
/// With `port` given, only a listener on that exact port matches; otherwise
/// the first listening socket found is returned, in unspecified order —
/// callers that need one socket among several must pass `port`.
///
/// Fails with [`HarnessError::ProcessNotListening`] within one poll interval
/// of the process exiting; it never hangs on a dead process. The caller
/// bounds the overall wait with its own deadline.
pub async fn wait_for_listen(
    proc: &mut ManagedProcess,
    port: Option<u16>,
) -> Result<SocketAddr, HarnessError> {
    wait_for_listen_with(proc, port, DEFAULT_POLL_INTERVAL).await
}

/// [`wait_for_listen`] with an explicit poll interval.
pub async fn wait_for_listen_with(
    proc: &mut ManagedProcess,
    port: Option<u16>,
    poll_interval: Duration,
) -> Result<SocketAddr, HarnessError> {
    let proc_root = Path::new("/proc");
    loop {
        if let Some(status) = proc.try_wait()? {
            return Err(HarnessError::ProcessNotListening {
                pid: proc.pid().as_raw(),
                status,
            });
        }

        if let Some(addr) = scan_once(proc_root, proc.pid().as_raw(), port)? {
            debug!("process {} listening on {}", proc.pid(), addr);
            return Ok(addr);
        }

        sleep(poll_interval).await;
    }
}

/// One pass over the process's socket table; recomputed fresh on every poll.
fn scan_once(
    proc_root: &Path,
    pid: i32,
    port: Option<u16>,
) -> Result<Option<SocketAddr>, HarnessError> {
    let inodes = match socket_inodes(proc_root, pid) {
        Ok(inodes) => inodes,
        // The fd table vanishes while the process tears down; the next
        // poll's exit check reports that case properly.
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    if inodes.is_empty() {
        return Ok(None);
    }

    // The per-pid tables show the process's own network namespace.
    for table in ["net/tcp", "net/tcp6"] {
        let path = proc_root.join(pid.to_string()).join(table);
        let contents = match std::fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => return Err(e.into()),
        };

        for entry in parse_listen_entries(&contents) {
            if !inodes.contains(&entry.inode) {
                continue;
            }
            if port.is_some_and(|p| entry.addr.port() != p) {
                continue;
            }
            return Ok(Some(entry.addr));
        }
    }

    Ok(None)
}

/// Inode numbers of every socket the process holds open, read from the
/// `socket:[N]` symlink targets under `/proc/<pid>/fd`.
fn socket_inodes(proc_root: &Path, pid: i32) -> std::io::Result<HashSet<u64>> {
    let fd_dir = proc_root.join(pid.to_string()).join("fd");
    let mut inodes = HashSet::new();

    for entry in std::fs::read_dir(fd_dir)? {
        let Ok(entry) = entry else { continue };
        // fds close under us mid-scan; skip rather than fail
        let Ok(target) = std::fs::read_link(entry.path()) else {
            continue;
        };
        let target = target.to_string_lossy();
        if let Some(inode) = target
            .strip_prefix("socket:[")
            .and_then(|t| t.strip_suffix(']'))
        {
            if let Ok(inode) = inode.parse::<u64>() {
                inodes.insert(inode);
            }
        }
    }

    Ok(inodes)
}

#[derive(Debug, PartialEq, Eq)]
struct ListenEntry {
    addr: SocketAddr,
    inode: u64,
}

/// Extracts the LISTEN rows from a procfs `net/tcp`/`net/tcp6` table.
///
/// Row shape, after the header line:
/// `sl local_address rem_address st tx:rx tr:tm->when retrnsmt uid timeout inode ...`
fn parse_listen_entries(table: &str) -> Vec<ListenEntry> {
    let mut entries = Vec::new();
    for line in table.lines().skip(1) {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 10 {
            continue;
        }
        if fields[3] != TCP_LISTEN {
            continue;
        }
        let Some(addr) = parse_local_address(fields[1]) else {
            continue;
        };
        let Ok(inode) = fields[9].parse::<u64>() else {
            continue;
        };
        entries.push(ListenEntry { addr, inode });
    }
    entries
}

/// Decodes a procfs `ADDR:PORT` hex pair.
///
/// The kernel prints addresses as native-endian 32-bit words, so bytes come
/// out reversed within each word; the port is plain big-endian hex.
fn parse_local_address(field: &str) -> Option<SocketAddr> {
    let (addr_hex, port_hex) = field.split_once(':')?;
    let port = u16::from_str_radix(port_hex, 16).ok()?;

    let ip = match addr_hex.len() {
        8 => {
            let word = u32::from_str_radix(addr_hex, 16).ok()?;
            IpAddr::V4(Ipv4Addr::from(word.to_ne_bytes()))
        }
        32 => {
            let mut octets = [0u8; 16];
            for (i, group) in addr_hex.as_bytes().chunks(8).enumerate() {
                let group = std::str::from_utf8(group).ok()?;
                let word = u32::from_str_radix(group, 16).ok()?;
                octets[i * 4..(i + 1) * 4].copy_from_slice(&word.to_ne_bytes());
            }
            IpAddr::V6(Ipv6Addr::from(octets))
        }
        _ => return None,
    };

    Some(SocketAddr::new(ip, port))
}
