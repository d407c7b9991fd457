//! Black-box conformance harness for TCP relays.
//!
//! The relay under test is launched as a real OS process and asked to bind an
//! ephemeral port; its actual listening address is discovered by polling the
//! process's socket table, traffic is pushed through it in randomized chunks,
//! and the harness asserts byte-exact bidirectional transparency plus clean
//! process lifecycle behavior.

pub type Result<T> = color_eyre::eyre::Result<T>;

pub mod chunk_io;
pub mod cli;
pub mod error;
pub mod resolver;
pub mod scenario;
pub mod supervisor;
