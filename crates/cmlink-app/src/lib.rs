//! Application layer for cmlink
//!
//! Generic runtime that drives a [`cmlink_client::Session`] from a host event
//! loop, so deterministic simulation runs the same orchestration code as
//! production.
//!
//! # Components
//!
//! - [`Driver`]: trait for the host's I/O (connector, readiness, timer,
//!   roster UI)
//! - [`Runtime`]: orchestration loop feeding driver events into the session
//!   and executing the resulting actions
//! - [`SystemEnv`]: production environment (system clock, OS randomness)
//!
//! # Transport (optional)
//!
//! With the `transport` feature enabled, this crate also provides
//! [`transport::TcpDriver`], a tokio driver over a non-blocking TCP stream.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod config;
mod driver;
mod runtime;
mod system_env;

#[cfg(feature = "transport")]
pub mod transport;

pub use config::{DEFAULT_CONNECT_TIMEOUT, RuntimeConfig};
pub use driver::{Driver, DriverEvent};
pub use runtime::Runtime;
pub use system_env::SystemEnv;
