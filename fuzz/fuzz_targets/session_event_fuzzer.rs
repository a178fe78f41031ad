//! Fuzz target for session event handling
//!
//! # Strategy
//!
//! - Log on against a scripted backend, then interleave backend events
//!   (room entry, membership changes, relationship snapshots, profile
//!   updates, messages, log-off) with host commands
//! - Small identity spaces so rooms and users collide often
//! - Raw codes for relationships, membership changes and logon results
//!
//! # Invariants
//!
//! - Every alias group belongs to a tracked room and vice versa
//! - The read offset never passes the expected frame length
//! - A closed session holds no socket, timer, watcher or room
//! - The recording host never sees an operation it would reject

#![no_main]

use arbitrary::Arbitrary;
use cmlink_client::{
    Credentials, Endpoint, HostCommand, Identity, MemoryCredentialStore, Session, SessionConfig,
    SessionEvent, StatusPrimitive,
};
use cmlink_core::{
    AccountKind,
    protocol::{
        MembershipChange, ProtocolEvent, ProtocolOutput, RelationshipSnapshot, RoomEntry, UserInfo,
    },
};
use cmlink_harness::{
    ChunkedSocket, InvariantRegistry, RecordingHost, ScriptedProtocol, SessionSnapshot, SimEnv,
    SimInstant, frame, logged_on_reply,
};
use libfuzzer_sys::fuzz_target;

type FuzzSession = Session<ScriptedProtocol, ChunkedSocket, MemoryCredentialStore, SimEnv>;

const MAX_READABLE: usize = 10_000;

fn user(n: u8) -> Identity {
    Identity::from_parts(1, AccountKind::Individual, 1, u32::from(n % 8))
}

fn room(n: u8) -> Identity {
    Identity::from_parts(1, AccountKind::Chat, 0, u32::from(n % 4))
}

#[derive(Debug, Clone, Arbitrary)]
enum Op {
    Enter { room: u8, response: u8, members: Vec<u8> },
    Change { room: u8, subject: Option<u8>, code: u8 },
    Relationships { incremental: bool, users: Vec<u8>, kinds: Vec<u8> },
    UserInfo { user: u8, source: Option<u8>, name: Option<String>, state: Option<u8> },
    ChatMessage { room: u8, sender: u8 },
    PrivateMessage { sender: u8 },
    LoggedOff { code: u8 },
    Leave(u8),
    Join(u8),
    JoinByName(String),
    Send(u8),
    SetStatus(u8),
    Tick(u16),
    LogOff,
    Close,
}

struct Fuzz {
    session: FuzzSession,
    protocol: ScriptedProtocol,
    socket: ChunkedSocket,
    env: SimEnv,
    host: RecordingHost,
    invariants: InvariantRegistry,
    me: Identity,
}

impl Fuzz {
    fn new() -> Self {
        let env = SimEnv::with_seed(0);
        let protocol = ScriptedProtocol::new();
        let config = SessionConfig::with_endpoints([Endpoint::new("cm0.example.net", 27017)]);
        let store = MemoryCredentialStore::new();
        Self {
            session: Session::new(env.clone(), config, protocol.clone(), store),
            protocol,
            socket: ChunkedSocket::new(),
            env,
            host: RecordingHost::new(),
            invariants: InvariantRegistry::standard(),
            me: Identity::from_parts(1, AccountKind::Individual, 1, 1000),
        }
    }

    fn handle(&mut self, event: SessionEvent<ChunkedSocket, SimInstant>) {
        if let Ok(actions) = self.session.handle(event) {
            self.host.apply_all(actions);
        }
        let snapshot = SessionSnapshot::capture(&self.session, &self.host);
        self.invariants.assert_all(&snapshot, "after event");
    }

    fn backend(&mut self, event: ProtocolEvent) {
        self.protocol.reply(vec![ProtocolOutput::Event(event)]);
        self.socket.push_inbound(&frame(b"event"));
        for _ in 0..MAX_READABLE {
            if !(self.session.is_watching() && self.socket.is_readable()) {
                break;
            }
            self.handle(SessionEvent::Readable);
        }
    }

    fn command(&mut self, command: HostCommand) {
        self.handle(SessionEvent::Command(command));
    }

    fn log_on(&mut self) {
        self.handle(SessionEvent::LogIn(Credentials::new("alice", "hunter2")));
        self.handle(SessionEvent::Connected(self.socket.clone()));
        self.backend(ProtocolEvent::HandshakeReady);
        self.protocol.reply(logged_on_reply(self.me));
        self.socket.push_inbound(&frame(b"event"));
        self.handle(SessionEvent::Readable);
        self.handle(SessionEvent::Readable);
    }

    fn apply(&mut self, op: Op) {
        match op {
            Op::Enter { room: r, response, members } => {
                self.backend(ProtocolEvent::RoomEntered(RoomEntry {
                    room: room(r),
                    response: u32::from(response % 4),
                    name: format!("room {r}"),
                    members: members.into_iter().map(user).collect(),
                }));
            },
            Op::Change { room: r, subject, code } => {
                let subject = subject.map_or(self.me, user);
                self.backend(ProtocolEvent::MembershipChanged(MembershipChange {
                    room: room(r),
                    actor: user(0),
                    subject,
                    change: u32::from(code),
                }));
            },
            Op::Relationships { incremental, users, kinds } => {
                self.backend(ProtocolEvent::Relationships(RelationshipSnapshot {
                    incremental,
                    users: users.into_iter().map(user).collect(),
                    kinds: kinds.into_iter().map(|kind| u32::from(kind % 6)).collect(),
                }));
            },
            Op::UserInfo { user: u, source, name, state } => {
                self.backend(ProtocolEvent::UserInfo(UserInfo {
                    user: user(u),
                    source: source.map(room),
                    name,
                    state: state.map(|s| u32::from(s % 10)),
                }));
            },
            Op::ChatMessage { room: r, sender } => {
                self.backend(ProtocolEvent::ChatMessage {
                    room: room(r),
                    sender: user(sender),
                    text: "hi".to_string(),
                });
            },
            Op::PrivateMessage { sender } => {
                self.backend(ProtocolEvent::PrivateMessage {
                    sender: user(sender),
                    text: "hi".to_string(),
                });
            },
            Op::LoggedOff { code } => {
                self.backend(ProtocolEvent::LoggedOff { code: u32::from(code) });
            },
            Op::Leave(r) => self.command(HostCommand::LeaveRoom(room(r))),
            Op::Join(r) => self.command(HostCommand::JoinRoom(room(r))),
            Op::JoinByName(name) => self.command(HostCommand::JoinRoomByName(name)),
            Op::Send(r) => self.command(HostCommand::SendChatMessage {
                room: room(r),
                text: "gg".to_string(),
            }),
            Op::SetStatus(s) => {
                let status = match s % 4 {
                    0 => StatusPrimitive::Available,
                    1 => StatusPrimitive::Away,
                    2 => StatusPrimitive::ExtendedAway,
                    _ => StatusPrimitive::Invisible,
                };
                self.command(HostCommand::SetStatus(status));
            },
            Op::Tick(secs) => {
                let now = self.env.advance(std::time::Duration::from_secs(u64::from(secs)));
                self.handle(SessionEvent::Tick { now });
            },
            Op::LogOff => self.command(HostCommand::LogOff),
            Op::Close => self.command(HostCommand::Close),
        }
    }
}

fuzz_target!(|ops: Vec<Op>| {
    let mut fuzz = Fuzz::new();
    fuzz.log_on();

    for op in ops {
        if fuzz.session.is_closed() {
            break;
        }
        fuzz.apply(op);
    }

    assert!(fuzz.host.complaints.is_empty(), "{:?}", fuzz.host.complaints);
    if fuzz.session.is_closed() {
        assert!(fuzz.host.closed);
        assert_eq!(fuzz.socket.handles(), 1);
    }
});
