//! Runtime orchestration over the simulation driver.
//!
//! The same `Runtime` that drives a TCP connection in production runs here
//! against `SimDriver`, a scripted protocol and virtual time.

use cmlink_app::Runtime;
use cmlink_client::{
    Credentials, Endpoint, ErrorReason, HostCommand, Identity, MemoryCredentialStore, Session,
    SessionAction, SessionConfig,
};
use cmlink_core::{
    AccountKind,
    protocol::{ProtocolEvent, ProtocolOutput},
};
use cmlink_harness::{
    ChunkedSocket, ConnectPlan, Request, ScriptedProtocol, SimDriver, SimEnv, frame,
    init_test_tracing, logged_on_reply,
};

type SimRuntime = Runtime<SimDriver, ScriptedProtocol, MemoryCredentialStore, SimEnv>;

fn me() -> Identity {
    Identity::from_parts(1, AccountKind::Individual, 1, 1000)
}

fn endpoint() -> Endpoint {
    Endpoint::new("cm0.example.net", 27017)
}

struct Fixture {
    runtime: SimRuntime,
    driver: SimDriver,
    protocol: ScriptedProtocol,
}

impl Fixture {
    fn new() -> Self {
        init_test_tracing();
        let env = SimEnv::with_seed(42);
        let protocol = ScriptedProtocol::new();
        let driver = SimDriver::new(env.clone());
        let config = SessionConfig::with_endpoints([endpoint()]);
        let session = Session::new(env, config, protocol.clone(), MemoryCredentialStore::new());
        Self { runtime: Runtime::new(driver.clone(), session), driver, protocol }
    }

    /// Queue one backend frame on `socket` that decodes to `outputs`.
    fn backend(&self, socket: &ChunkedSocket, outputs: Vec<ProtocolOutput>) {
        self.protocol.reply(outputs);
        socket.push_inbound(&frame(b"event"));
    }

    /// A socket whose backend completes the handshake and logs us on.
    fn accepting_socket(&self) -> ChunkedSocket {
        let socket = ChunkedSocket::new();
        self.backend(&socket, vec![ProtocolOutput::Event(ProtocolEvent::HandshakeReady)]);
        self.backend(&socket, logged_on_reply(me()));
        socket
    }

    async fn run(&mut self) {
        self.runtime.run(Credentials::new("alice", "hunter2")).await.unwrap();
    }
}

#[tokio::test]
async fn logs_on_and_closes_on_shutdown() {
    let mut fx = Fixture::new();
    let socket = fx.accepting_socket();
    fx.driver.plan_connect(ConnectPlan::Accept(socket.clone()));

    fx.run().await;

    let host = fx.driver.host();
    assert_eq!(host.logged_on, Some(me()));
    assert!(host.errors.is_empty());
    assert!(host.closed);
    assert!(host.complaints.is_empty(), "{:?}", host.complaints);

    assert_eq!(fx.driver.dialed(), vec![endpoint()]);
    assert!(!fx.driver.is_watching());
    assert!(!fx.driver.timer_armed());
    assert!(fx.runtime.session().is_closed());
    assert_eq!(socket.handles(), 1, "nothing may keep the socket alive");

    assert_eq!(
        fx.protocol.requests(),
        vec![Request::LogOn { account: "alice".to_string(), sentry: None, step_up_code: None }]
    );
    assert_eq!(socket.take_outbound(), frame(b"logon").to_vec());
}

#[tokio::test]
async fn refused_connection_is_reported_to_the_host() {
    let mut fx = Fixture::new();
    fx.driver.plan_connect(ConnectPlan::Refuse("connection refused".to_string()));

    fx.run().await;

    let host = fx.driver.host();
    assert_eq!(
        host.errors,
        vec![(ErrorReason::Network, "connection failed: connection refused".to_string())]
    );
    assert!(host.closed);
    assert_eq!(host.actions.last(), Some(&SessionAction::Closed));
    assert!(fx.protocol.requests().is_empty());
}

#[tokio::test]
async fn unreachable_endpoint_is_reported_to_the_host() {
    let mut fx = Fixture::new();

    fx.run().await;

    let host = fx.driver.host();
    let message = "connection failed: SimDriverError: no route to cm0.example.net:27017";
    assert_eq!(host.errors, vec![(ErrorReason::Network, message.to_string())]);
}

#[tokio::test]
async fn step_up_code_reconnects_through_the_driver() {
    let mut fx = Fixture::new();

    let first = ChunkedSocket::new();
    fx.backend(&first, vec![ProtocolOutput::Event(ProtocolEvent::HandshakeReady)]);
    fx.backend(&first, vec![ProtocolOutput::Event(ProtocolEvent::LogOnResult {
        code: 63,
        identity: me(),
    })]);
    let second = fx.accepting_socket();

    fx.driver.plan_connect(ConnectPlan::Accept(first.clone()));
    fx.driver.plan_connect(ConnectPlan::Accept(second.clone()));
    fx.driver.inject_command(HostCommand::StepUpCode("ABCDE".to_string()));

    fx.run().await;

    let host = fx.driver.host();
    assert_eq!(host.prompts, vec!["alice".to_string()]);
    assert_eq!(host.logged_on, Some(me()));
    assert!(host.errors.is_empty());

    assert_eq!(fx.driver.dialed(), vec![endpoint(), endpoint()]);
    assert_eq!(fx.protocol.connects(), 2);
    assert_eq!(
        fx.protocol.requests(),
        vec![
            Request::LogOn { account: "alice".to_string(), sentry: None, step_up_code: None },
            Request::LogOn {
                account: "alice".to_string(),
                sentry: None,
                step_up_code: Some("ABCDE".to_string()),
            },
        ]
    );
    assert_eq!(first.handles(), 1);
    assert_eq!(second.handles(), 1);
}

#[tokio::test]
async fn timer_ticks_send_heartbeats() {
    let mut fx = Fixture::new();
    let socket = fx.accepting_socket();
    fx.driver.plan_connect(ConnectPlan::Accept(socket.clone()));
    fx.driver.allow_ticks(3);

    fx.run().await;

    let heartbeats =
        fx.protocol.requests().into_iter().filter(|request| *request == Request::Heartbeat).count();
    assert_eq!(heartbeats, 3);
    assert!(fx.driver.host().closed);
}

#[tokio::test]
async fn rejected_commands_do_not_stop_the_loop() {
    let mut fx = Fixture::new();
    // Delivered once the socket drains, after logon; no such room is joined.
    fx.driver.inject_command(HostCommand::LeaveRoom(me()));
    let socket = fx.accepting_socket();
    fx.driver.plan_connect(ConnectPlan::Accept(socket));

    fx.run().await;

    let host = fx.driver.host();
    assert_eq!(host.logged_on, Some(me()));
    assert!(host.errors.is_empty());
    assert!(host.closed);
}
