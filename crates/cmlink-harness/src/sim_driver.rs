//! Simulation driver implementing the Driver trait.
//!
//! `SimDriver` provides the same interface as the TCP driver but for
//! deterministic testing. It implements [`Driver`] so the same
//! [`cmlink_app::Runtime`] orchestration code runs in both production and
//! simulation.
//!
//! # Event order
//!
//! `wait` reports, in priority order: a pending writability request, socket
//! data, injected host events, a timer tick (only while the tick budget
//! lasts), and finally [`DriverEvent::Shutdown`] once nothing is left, so
//! every simulated run terminates.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use cmlink_app::{Driver, DriverEvent};
use cmlink_client::{Endpoint, HostCommand, SessionAction};
use cmlink_core::env::Environment;

use crate::{
    host::RecordingHost,
    sim_env::{SimEnv, SimInstant},
    socket::ChunkedSocket,
};

/// Error type for simulation driver.
#[derive(Debug, Clone)]
pub struct SimDriverError(pub String);

impl std::fmt::Display for SimDriverError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SimDriverError: {}", self.0)
    }
}

impl std::error::Error for SimDriverError {}

/// Outcome of the next connect attempt.
#[derive(Debug, Clone)]
pub enum ConnectPlan {
    /// Hand this socket to the session.
    Accept(ChunkedSocket),
    /// Fail with this message.
    Refuse(String),
}

#[derive(Default)]
struct SharedState {
    events: VecDeque<DriverEvent<SimInstant>>,
    connects: VecDeque<ConnectPlan>,
    dialed: Vec<Endpoint>,
    socket: Option<ChunkedSocket>,
    read_watch: bool,
    write_watch: bool,
    timer: Option<(Duration, SimInstant)>,
    tick_budget: usize,
    host: RecordingHost,
}

/// Simulation driver for deterministic testing.
///
/// Clones share state, so a test can keep a handle for injection while the
/// runtime owns the driver.
#[derive(Clone)]
pub struct SimDriver {
    env: SimEnv,
    state: Arc<Mutex<SharedState>>,
}

impl SimDriver {
    /// Create a driver on the given environment's clock.
    pub fn new(env: SimEnv) -> Self {
        Self { env, state: Arc::new(Mutex::new(SharedState::default())) }
    }

    /// Script the outcome of the next connect.
    pub fn plan_connect(&self, plan: ConnectPlan) {
        self.lock().connects.push_back(plan);
    }

    /// Inject a host command.
    pub fn inject_command(&self, command: HostCommand) {
        self.lock().events.push_back(DriverEvent::Command(command));
    }

    /// Inject any driver event.
    pub fn inject_event(&self, event: DriverEvent<SimInstant>) {
        self.lock().events.push_back(event);
    }

    /// Allow `n` more timer ticks before the driver winds down.
    pub fn allow_ticks(&self, n: usize) {
        self.lock().tick_budget += n;
    }

    /// Endpoints dialed so far.
    pub fn dialed(&self) -> Vec<Endpoint> {
        self.lock().dialed.clone()
    }

    /// Host model built from applied actions.
    pub fn host(&self) -> RecordingHost {
        self.lock().host.clone()
    }

    /// Whether the socket is watched.
    pub fn is_watching(&self) -> bool {
        self.lock().read_watch
    }

    /// Whether the keepalive timer is armed.
    pub fn timer_armed(&self) -> bool {
        self.lock().timer.is_some()
    }

    fn lock(&self) -> MutexGuard<'_, SharedState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn next_event(&self) -> DriverEvent<SimInstant> {
        let mut state = self.lock();

        let socket = state.socket.clone();
        if state.write_watch && socket.as_ref().is_some_and(ChunkedSocket::is_writable) {
            state.write_watch = false;
            return DriverEvent::Writable;
        }
        if state.read_watch && socket.as_ref().is_some_and(ChunkedSocket::is_readable) {
            return DriverEvent::Readable;
        }
        if let Some(event) = state.events.pop_front() {
            return event;
        }
        if state.tick_budget > 0
            && let Some((interval, deadline)) = state.timer
        {
            state.tick_budget -= 1;
            state.timer = Some((interval, deadline + interval));
            let now = self.env.advance_to(deadline);
            return DriverEvent::Tick { now };
        }
        DriverEvent::Shutdown
    }
}

impl Driver for SimDriver {
    type Error = SimDriverError;
    type Socket = ChunkedSocket;
    type Instant = SimInstant;

    async fn connect(&mut self, endpoint: &Endpoint) -> Result<Self::Socket, Self::Error> {
        let mut state = self.lock();
        state.dialed.push(endpoint.clone());
        match state.connects.pop_front() {
            Some(ConnectPlan::Accept(socket)) => {
                state.socket = Some(socket.clone());
                Ok(socket)
            },
            Some(ConnectPlan::Refuse(reason)) => Err(SimDriverError(reason)),
            None => Err(SimDriverError(format!("no route to {endpoint}"))),
        }
    }

    async fn wait(&mut self) -> Result<DriverEvent<Self::Instant>, Self::Error> {
        Ok(self.next_event())
    }

    fn watch_socket(&mut self) {
        self.lock().read_watch = true;
    }

    fn unwatch_socket(&mut self) {
        let mut state = self.lock();
        state.read_watch = false;
        state.write_watch = false;
        state.socket = None;
    }

    fn watch_writable(&mut self) {
        self.lock().write_watch = true;
    }

    fn arm_timer(&mut self, interval: Duration) {
        let deadline = self.env.now() + interval;
        self.lock().timer = Some((interval, deadline));
    }

    fn cancel_timer(&mut self) {
        self.lock().timer = None;
    }

    fn apply(&mut self, action: SessionAction) -> Result<(), Self::Error> {
        self.lock().host.apply(action);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block_on<F: std::future::Future>(future: F) -> F::Output {
        let waker = std::task::Waker::noop();
        let mut cx = std::task::Context::from_waker(waker);
        let mut future = std::pin::pin!(future);
        loop {
            if let std::task::Poll::Ready(output) = future.as_mut().poll(&mut cx) {
                return output;
            }
        }
    }

    #[test]
    fn idle_driver_shuts_down() {
        let mut driver = SimDriver::new(SimEnv::default());
        assert_eq!(block_on(driver.wait()).unwrap(), DriverEvent::Shutdown);
    }

    #[test]
    fn readable_only_while_watched() {
        let mut driver = SimDriver::new(SimEnv::default());
        let socket = ChunkedSocket::new();
        socket.push_inbound(b"x");
        driver.plan_connect(ConnectPlan::Accept(socket));
        block_on(driver.connect(&Endpoint::new("cm", 27017))).unwrap();

        assert_eq!(block_on(driver.wait()).unwrap(), DriverEvent::Shutdown);
        driver.watch_socket();
        assert_eq!(block_on(driver.wait()).unwrap(), DriverEvent::Readable);
    }

    #[test]
    fn ticks_advance_the_clock_to_the_deadline() {
        let env = SimEnv::default();
        let mut driver = SimDriver::new(env.clone());
        driver.arm_timer(Duration::from_secs(9));
        driver.allow_ticks(2);

        let first = block_on(driver.wait()).unwrap();
        assert_eq!(first, DriverEvent::Tick { now: SimInstant::from_elapsed(Duration::from_secs(9)) });
        let second = block_on(driver.wait()).unwrap();
        assert_eq!(
            second,
            DriverEvent::Tick { now: SimInstant::from_elapsed(Duration::from_secs(18)) }
        );
        assert_eq!(block_on(driver.wait()).unwrap(), DriverEvent::Shutdown);
        assert_eq!(env.now().elapsed(), Duration::from_secs(18));
    }

    #[test]
    fn unplanned_connect_fails() {
        let mut driver = SimDriver::new(SimEnv::default());
        let err = block_on(driver.connect(&Endpoint::new("cm", 1))).unwrap_err();
        assert!(err.0.contains("cm:1"));
        assert_eq!(driver.dialed().len(), 1);
    }
}
