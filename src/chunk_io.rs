use std::time::Duration;

use rand::rngs::SmallRng;
use rand::Rng;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;

use crate::error::HarnessError;

/// Smallest chunk the harness will request per read or write.
pub const MIN_CHUNK: usize = 1;

/// Largest chunk the harness will request per read or write.
pub const MAX_CHUNK: usize = 8192;

/// Inclusive bounds for randomized chunk sizes.
///
/// Both bounds are re-clamped against the remaining transfer length on every
/// iteration; the remaining length shrinks, so a one-time clamp would request
/// reads past the end of the payload.
#[derive(Debug, Clone, Copy)]
pub struct ChunkBounds {
    pub min: usize,
    pub max: usize,
}

impl ChunkBounds {
    /// Validated bounds; `min` must be at least 1 and no larger than `max`.
    pub fn new(min: usize, max: usize) -> crate::Result<Self> {
        eyre::ensure!(min >= 1, "min chunk must be at least 1, got {min}");
        eyre::ensure!(min <= max, "chunk bounds inverted: {min} > {max}");
        Ok(Self { min, max })
    }
}

impl Default for ChunkBounds {
    fn default() -> Self {
        Self {
            min: MIN_CHUNK,
            max: MAX_CHUNK,
        }
    }
}

/// Receives data from `stream` in randomly sized chunks.
///
/// With `max_len` bounded, reads stop once exactly that many bytes have
/// accumulated; in either mode a zero-length read (orderly close) ends the
/// transfer. Every read request is sized uniformly within `bounds`, clamped
/// to the remaining length. Each individual read is guarded by `io_timeout`
/// and expiry surfaces as [`HarnessError::Timeout`].
pub async fn recv_chunked<R>(
    stream: &mut R,
    rng: &mut SmallRng,
    max_len: Option<usize>,
    bounds: ChunkBounds,
    io_timeout: Duration,
) -> Result<Vec<u8>, HarnessError>
where
    R: AsyncRead + Unpin,
{
    let mut data = Vec::new();
    let mut buf = vec![0u8; bounds.max];

    loop {
        let (lo, hi) = match max_len {
            Some(target) => {
                let remaining = target - data.len();
                if remaining == 0 {
                    break;
                }
                (bounds.min.min(remaining), bounds.max.min(remaining))
            }
            None => (bounds.min, bounds.max),
        };

        let want = rng.gen_range(lo..=hi);
        let n = timeout(io_timeout, stream.read(&mut buf[..want]))
            .await
            .map_err(|_| HarnessError::Timeout {
                what: "recv",
                after: io_timeout,
            })??;
        if n == 0 {
            break;
        }
        data.extend_from_slice(&buf[..n]);
    }

    Ok(data)
}

/// Sends all of `data` over `stream` in randomly sized chunks.
///
/// Each iteration draws a chunk size within `bounds` clamped to the remaining
/// length, issues a single `write`, and advances by however many bytes the
/// stream actually accepted; short writes are expected. Empty payloads
/// terminate immediately without touching the stream.
pub async fn send_chunked<W>(
    stream: &mut W,
    data: &[u8],
    rng: &mut SmallRng,
    bounds: ChunkBounds,
    io_timeout: Duration,
) -> Result<(), HarnessError>
where
    W: AsyncWrite + Unpin,
{
    let mut offset = 0;

    while offset < data.len() {
        let remaining = data.len() - offset;
        let lo = bounds.min.min(remaining);
        let hi = bounds.max.min(remaining);
        let size = rng.gen_range(lo..=hi);

        let n = timeout(io_timeout, stream.write(&data[offset..offset + size]))
            .await
            .map_err(|_| HarnessError::Timeout {
                what: "send",
                after: io_timeout,
            })??;
        if n == 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                "stream closed mid-send",
            )
            .into());
        }
        offset += n;
    }

    timeout(io_timeout, stream.flush())
        .await
        .map_err(|_| HarnessError::Timeout {
            what: "flush",
            after: io_timeout,
        })??;
    Ok(())
}
