//! TCP driver over tokio.
//!
//! [`TcpDriver`] implements [`Driver`] with a non-blocking
//! [`tokio::net::TcpStream`]. The session reads and writes through
//! [`TcpSocket`], which maps onto `try_read`/`try_write` so a full kernel
//! buffer surfaces as `WouldBlock` instead of blocking the loop. The host UI
//! talks to the driver through a pair of unbounded channels.

use std::{
    io::{self, Read, Write},
    sync::Arc,
    time::{Duration, Instant},
};

use cmlink_client::{Endpoint, HostCommand, SessionAction};
use thiserror::Error;
use tokio::{
    io::{Interest, Ready},
    net::TcpStream,
    sync::mpsc,
    time::{Interval, MissedTickBehavior},
};

use crate::{Driver, DriverEvent, RuntimeConfig};

/// TCP driver errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// I/O error from the socket.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Connect did not finish in time.
    #[error("connect to {endpoint} timed out after {timeout:?}")]
    Timeout {
        /// Endpoint being dialed
        endpoint: Endpoint,
        /// Configured timeout
        timeout: Duration,
    },

    /// The host dropped its action receiver.
    #[error("host UI is gone")]
    HostGone,
}

/// Socket handed to the session.
#[derive(Debug, Clone)]
pub struct TcpSocket(Arc<TcpStream>);

impl Read for TcpSocket {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.try_read(buf)
    }
}

impl Write for TcpSocket {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.try_write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Host side of a [`TcpDriver`].
#[derive(Debug)]
pub struct HostChannels {
    /// Commands from the UI. Dropping it shuts the session down.
    pub commands: mpsc::UnboundedSender<HostCommand>,
    /// Actions for the UI to show.
    pub actions: mpsc::UnboundedReceiver<SessionAction>,
}

enum Wake {
    Command(Option<HostCommand>),
    Ready(io::Result<Ready>),
    Tick(Instant),
}

/// Tokio TCP driver implementing the [`Driver`] trait.
pub struct TcpDriver {
    connect_timeout: Duration,
    commands: mpsc::UnboundedReceiver<HostCommand>,
    actions: mpsc::UnboundedSender<SessionAction>,
    stream: Option<Arc<TcpStream>>,
    read_watch: bool,
    write_watch: bool,
    timer: Option<Interval>,
}

impl TcpDriver {
    /// Create a driver and the channels the host UI uses to talk to it.
    pub fn new(config: &RuntimeConfig) -> (Self, HostChannels) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (action_tx, action_rx) = mpsc::unbounded_channel();
        let driver = Self {
            connect_timeout: config.connect_timeout,
            commands: command_rx,
            actions: action_tx,
            stream: None,
            read_watch: false,
            write_watch: false,
            timer: None,
        };
        (driver, HostChannels { commands: command_tx, actions: action_rx })
    }

    fn interest(&self) -> Option<Interest> {
        match (self.read_watch, self.write_watch) {
            (true, true) => Some(Interest::READABLE | Interest::WRITABLE),
            (true, false) => Some(Interest::READABLE),
            (false, true) => Some(Interest::WRITABLE),
            (false, false) => None,
        }
    }
}

async fn ready(stream: Option<Arc<TcpStream>>, interest: Option<Interest>) -> io::Result<Ready> {
    match (stream, interest) {
        (Some(stream), Some(interest)) => stream.ready(interest).await,
        _ => std::future::pending().await,
    }
}

async fn tick(timer: Option<&mut Interval>) -> Instant {
    match timer {
        Some(timer) => timer.tick().await.into_std(),
        None => std::future::pending().await,
    }
}

impl Driver for TcpDriver {
    type Error = TransportError;
    type Socket = TcpSocket;
    type Instant = Instant;

    async fn connect(&mut self, endpoint: &Endpoint) -> Result<Self::Socket, Self::Error> {
        let dial = TcpStream::connect((endpoint.host.as_str(), endpoint.port));
        let stream = tokio::time::timeout(self.connect_timeout, dial)
            .await
            .map_err(|_| TransportError::Timeout {
                endpoint: endpoint.clone(),
                timeout: self.connect_timeout,
            })??;
        stream.set_nodelay(true)?;

        let stream = Arc::new(stream);
        self.stream = Some(Arc::clone(&stream));
        Ok(TcpSocket(stream))
    }

    async fn wait(&mut self) -> Result<DriverEvent<Self::Instant>, Self::Error> {
        loop {
            let stream = self.stream.clone();
            let interest = self.interest();
            let wake = tokio::select! {
                command = self.commands.recv() => Wake::Command(command),
                ready = ready(stream, interest) => Wake::Ready(ready),
                now = tick(self.timer.as_mut()) => Wake::Tick(now),
            };

            match wake {
                Wake::Command(Some(command)) => return Ok(DriverEvent::Command(command)),
                Wake::Command(None) => return Ok(DriverEvent::Shutdown),
                Wake::Tick(now) => return Ok(DriverEvent::Tick { now }),
                Wake::Ready(ready) => {
                    let ready = ready?;
                    if self.write_watch && ready.is_writable() {
                        self.write_watch = false;
                        return Ok(DriverEvent::Writable);
                    }
                    if self.read_watch && (ready.is_readable() || ready.is_read_closed()) {
                        return Ok(DriverEvent::Readable);
                    }
                    tracing::trace!(?ready, "spurious readiness");
                },
            }
        }
    }

    fn watch_socket(&mut self) {
        self.read_watch = true;
    }

    fn unwatch_socket(&mut self) {
        self.read_watch = false;
        self.write_watch = false;
        self.stream = None;
    }

    fn watch_writable(&mut self) {
        self.write_watch = true;
    }

    fn arm_timer(&mut self, interval: Duration) {
        let start = tokio::time::Instant::now() + interval;
        let mut timer = tokio::time::interval_at(start, interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.timer = Some(timer);
    }

    fn cancel_timer(&mut self) {
        self.timer = None;
    }

    fn apply(&mut self, action: SessionAction) -> Result<(), Self::Error> {
        tracing::debug!(?action, "host action");
        self.actions.send(action).map_err(|_| TransportError::HostGone)
    }
}

#[cfg(test)]
mod tests {
    use tokio::{io::AsyncReadExt, net::TcpListener};

    use super::*;

    #[tokio::test]
    async fn socket_reads_and_writes_without_blocking() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (mut driver, _host) = TcpDriver::new(&RuntimeConfig::default());

        let endpoint = Endpoint::new(addr.ip().to_string(), addr.port());
        let mut socket = driver.connect(&endpoint).await.unwrap();
        let (mut peer, _) = listener.accept().await.unwrap();

        let mut buf = [0u8; 8];
        let err = socket.read(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WouldBlock);

        driver.watch_writable();
        assert_eq!(driver.wait().await.unwrap(), DriverEvent::Writable);
        assert_eq!(socket.write(b"ping").unwrap(), 4);

        let mut received = [0u8; 4];
        peer.read_exact(&mut received).await.unwrap();
        assert_eq!(&received, b"ping");
    }

    #[tokio::test]
    async fn dropped_command_sender_shuts_down() {
        let (mut driver, host) = TcpDriver::new(&RuntimeConfig::default());
        drop(host.commands);

        assert_eq!(driver.wait().await.unwrap(), DriverEvent::Shutdown);
    }

    #[tokio::test]
    async fn commands_are_forwarded() {
        let (mut driver, host) = TcpDriver::new(&RuntimeConfig::default());
        host.commands.send(HostCommand::LogOff).unwrap();

        assert_eq!(driver.wait().await.unwrap(), DriverEvent::Command(HostCommand::LogOff));
    }
}
