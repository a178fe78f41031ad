//! Deterministic simulation harness for cmlink session testing.
//!
//! In-memory implementations of the session's seams (protocol library,
//! socket, environment, host) for deterministic, reproducible testing of
//! read chunking, logon sequencing and roster/chat bookkeeping.
//!
//! # Invariant Testing
//!
//! The `invariants` module provides behavioral testing through invariant
//! checks. Invariants verify WHAT must be true across all execution paths, not
//! specific scenarios. Use [`InvariantRegistry::standard()`] for the session
//! invariants.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod host;
pub mod invariants;
pub mod scripted;
pub mod sim_driver;
pub mod sim_env;
pub mod socket;

pub use host::{RecordingHost, RoomView};
pub use invariants::{
    AliasGroupIffRoom, HostAccepted, Invariant, InvariantRegistry, InvariantResult,
    ReadOffsetInBounds, SessionSnapshot, TornDownCleanly, Violation,
};
pub use scripted::{HEADER_LEN, KEEPALIVE, Request, ScriptedProtocol, frame, logged_on_reply};
pub use sim_driver::{ConnectPlan, SimDriver, SimDriverError};
pub use sim_env::{SimEnv, SimInstant};
pub use socket::{ChunkedSocket, ReadStep};

/// Install a test subscriber honoring `RUST_LOG`.
///
/// Safe to call from every test; only the first call installs.
pub fn init_test_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_test_writer().try_init();
}
