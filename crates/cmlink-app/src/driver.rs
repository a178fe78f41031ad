//! Driver trait for abstracting host I/O.
//!
//! The [`Driver`] trait decouples the runtime from the host's event loop.
//! Each host implements the trait to provide the connector, socket readiness,
//! timers and the roster UI, while the generic [`crate::Runtime`] handles all
//! orchestration.

use std::{
    future::Future,
    io::{Read, Write},
    ops::Sub,
    time::Duration,
};

use cmlink_client::{Endpoint, HostCommand, SessionAction};

/// Event delivered by a driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverEvent<I> {
    /// The watched socket has data (or EOF).
    Readable,
    /// The socket can take more bytes after a partial flush.
    Writable,
    /// The keepalive timer fired.
    Tick {
        /// Current time
        now: I,
    },
    /// The user did something.
    Command(HostCommand),
    /// The host is going away; close the session.
    Shutdown,
}

/// Abstracts host I/O for the runtime.
///
/// Implementations provide platform-specific I/O while the generic
/// [`Runtime`](crate::Runtime) handles orchestration. The same orchestration
/// code runs over tokio in production and over in-memory sockets in
/// simulation.
///
/// # Implementations
///
/// - **TCP**: tokio stream with readiness polling (`transport` feature)
/// - **Simulation**: scripted backend with virtual time
///
/// # Readiness
///
/// `watch_socket` and `watch_writable` are requests: `wait` must not report
/// [`DriverEvent::Readable`] unless the socket is watched, and reports
/// [`DriverEvent::Writable`] once per `watch_writable` call.
pub trait Driver: Send {
    /// Platform-specific error type.
    type Error: std::error::Error + Send + 'static;

    /// Socket handed to the session after a successful connect.
    type Socket: Read + Write + Send;

    /// Time instant type. Enables virtual time in simulation.
    type Instant: Copy + Ord + Send + Sync + Sub<Output = Duration>;

    /// Open a transport to the endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint cannot be reached. The runtime turns
    /// it into a connection failure for the session rather than aborting.
    fn connect(
        &mut self,
        endpoint: &Endpoint,
    ) -> impl Future<Output = Result<Self::Socket, Self::Error>> + Send;

    /// Wait for the next event.
    ///
    /// # Errors
    ///
    /// Returns an error if the host's event sources fail.
    fn wait(&mut self) -> impl Future<Output = Result<DriverEvent<Self::Instant>, Self::Error>> + Send;

    /// Start reporting readability of the current socket.
    fn watch_socket(&mut self);

    /// Stop reporting socket readiness and forget the socket.
    fn unwatch_socket(&mut self);

    /// Report writability once.
    fn watch_writable(&mut self);

    /// Deliver ticks every `interval`, replacing any armed timer.
    fn arm_timer(&mut self, interval: Duration);

    /// Stop delivering ticks.
    fn cancel_timer(&mut self);

    /// Show a host-visible action (roster, chat, prompts, errors).
    ///
    /// # Errors
    ///
    /// Returns an error if the host UI is gone.
    fn apply(&mut self, action: SessionAction) -> Result<(), Self::Error>;
}
