use std::process::ExitStatus;
use std::time::Duration;

use thiserror::Error;

/// Failure classes the harness keeps apart when reporting a scenario.
///
/// `DataMismatch` is the conformance failure the whole harness exists to
/// detect; `ProcessSurvivedKill` is a harness-integrity fault and is never
/// suppressed by an earlier assertion failure.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// An I/O or readiness wait exceeded its deadline.
    #[error("{what} timed out after {after:?}")]
    Timeout {
        /// The operation that was cut off.
        what: &'static str,
        /// The deadline that expired.
        after: Duration,
    },

    /// The process exited before exposing the expected listening socket.
    #[error("process {pid} exited ({status}) before listening")]
    ProcessNotListening {
        /// PID of the exited process.
        pid: i32,
        /// Its exit status.
        status: ExitStatus,
    },

    /// The shutdown escalation ladder ran out: the process is still alive
    /// after SIGKILL.
    #[error("process {pid} survived SIGKILL")]
    ProcessSurvivedKill {
        /// PID of the unkillable process.
        pid: i32,
    },

    /// Observed bytes differ from what the other side sent.
    #[error("{direction}: observed {actual} bytes, expected {expected}{}", describe_divergence(.first_divergence))]
    DataMismatch {
        /// Which half of the transfer diverged.
        direction: &'static str,
        /// Bytes the sender pushed in.
        expected: usize,
        /// Bytes the receiver got out.
        actual: usize,
        /// Offset of the first differing byte, if the prefixes differ.
        first_divergence: Option<usize>,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl HarnessError {
    /// Builds a [`HarnessError::DataMismatch`] from the two byte views.
    pub fn mismatch(direction: &'static str, expected: &[u8], actual: &[u8]) -> Self {
        HarnessError::DataMismatch {
            direction,
            expected: expected.len(),
            actual: actual.len(),
            first_divergence: first_divergence(expected, actual),
        }
    }
}

/// Index of the first byte where `a` and `b` differ.
///
/// A strict prefix relationship reports the shorter length; identical slices
/// report `None`.
pub fn first_divergence(a: &[u8], b: &[u8]) -> Option<usize> {
    a.iter()
        .zip(b.iter())
        .position(|(x, y)| x != y)
        .or_else(|| (a.len() != b.len()).then(|| a.len().min(b.len())))
}

fn describe_divergence(offset: &Option<usize>) -> String {
    match offset {
        Some(offset) => format!(" (first divergence at byte {offset})"),
        None => String::new(),
    }
}
