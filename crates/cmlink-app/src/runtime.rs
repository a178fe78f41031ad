//! Generic runtime for session orchestration.
//!
//! The Runtime drives the event loop, coordinating between:
//! - [`Session`]: connection state machine
//! - [`Driver`]: platform-specific I/O

use std::collections::VecDeque;

use cmlink_client::{
    CredentialStore, Credentials, Environment, HostCommand, Session, SessionAction, SessionEvent,
};
use cmlink_core::protocol::ProtocolSession;

use crate::{Driver, DriverEvent};

type Event<D, E> = SessionEvent<<D as Driver>::Socket, <E as Environment>::Instant>;

/// Generic runtime that orchestrates a Session and a Driver.
///
/// # Type Parameters
///
/// - `D`: Platform-specific I/O driver
/// - `P`: Protocol library session
/// - `C`: Credential store
/// - `E`: Environment for time and randomness
pub struct Runtime<D, P, C, E>
where
    D: Driver,
    E: Environment,
{
    driver: D,
    session: Session<P, D::Socket, C, E>,
}

impl<D, P, C, E> Runtime<D, P, C, E>
where
    D: Driver<Instant = E::Instant>,
    P: ProtocolSession,
    C: CredentialStore,
    E: Environment,
{
    /// Create a runtime around an idle session.
    pub fn new(driver: D, session: Session<P, D::Socket, C, E>) -> Self {
        Self { driver, session }
    }

    /// Log on and run until the session closes.
    ///
    /// Non-fatal session errors (a command that does not apply right now) are
    /// logged and the loop continues. Fatal errors reach the host through
    /// [`Driver::apply`] as a connection error followed by the close.
    ///
    /// # Errors
    ///
    /// Returns an error if the driver encounters an I/O error.
    pub async fn run(&mut self, credentials: Credentials) -> Result<(), D::Error> {
        let mut pending: VecDeque<Event<D, E>> = VecDeque::new();
        pending.push_back(SessionEvent::LogIn(credentials));

        while !self.session.is_closed() {
            let event = match pending.pop_front() {
                Some(event) => event,
                None => self.next_event().await?,
            };

            match self.session.handle(event) {
                Ok(actions) => self.process_actions(actions, &mut pending).await?,
                Err(err) => tracing::warn!(error = %err, "session rejected event"),
            }
        }

        tracing::info!("session closed");
        Ok(())
    }

    async fn next_event(&mut self) -> Result<Event<D, E>, D::Error> {
        let event = match self.driver.wait().await? {
            DriverEvent::Readable => SessionEvent::Readable,
            DriverEvent::Writable => SessionEvent::Writable,
            DriverEvent::Tick { now } => SessionEvent::Tick { now },
            DriverEvent::Command(command) => SessionEvent::Command(command),
            DriverEvent::Shutdown => SessionEvent::Command(HostCommand::Close),
        };
        Ok(event)
    }

    /// Execute session actions in order.
    ///
    /// Connect results are queued as the next session events so they are
    /// handled before anything else the driver reports.
    async fn process_actions(
        &mut self,
        actions: Vec<SessionAction>,
        pending: &mut VecDeque<Event<D, E>>,
    ) -> Result<(), D::Error> {
        for action in actions {
            match action {
                SessionAction::Connect(endpoint) => match self.driver.connect(&endpoint).await {
                    Ok(socket) => pending.push_back(SessionEvent::Connected(socket)),
                    Err(err) => {
                        tracing::warn!(%endpoint, error = %err, "connect failed");
                        pending.push_back(SessionEvent::ConnectFailed { reason: err.to_string() });
                    },
                },
                SessionAction::WatchSocket => self.driver.watch_socket(),
                SessionAction::UnwatchSocket => self.driver.unwatch_socket(),
                SessionAction::WatchWritable => self.driver.watch_writable(),
                SessionAction::ArmTimer { interval } => self.driver.arm_timer(interval),
                SessionAction::CancelTimer => self.driver.cancel_timer(),
                other => self.driver.apply(other)?,
            }
        }
        Ok(())
    }

    /// Get a reference to the session
    pub fn session(&self) -> &Session<P, D::Socket, C, E> {
        &self.session
    }

    /// Get a reference to the driver
    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Get a mutable reference to the driver
    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }
}
