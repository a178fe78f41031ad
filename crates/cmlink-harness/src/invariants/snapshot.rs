//! Observable state snapshots for invariant checking.
//!
//! Snapshots capture the observable state of a session and its host at a
//! point in time. Invariants operate on snapshots rather than live state to
//! ensure consistent, atomic checks.

use std::{
    collections::BTreeSet,
    io::{Read, Write},
};

use cmlink_client::{CredentialStore, Environment, Identity, Session};
use cmlink_core::protocol::ProtocolSession;

use crate::host::RecordingHost;

/// Snapshot of one session and the host it drives.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSnapshot {
    /// Rooms the session tracks.
    pub rooms: BTreeSet<Identity>,
    /// Alias groups the session tracks, by name.
    pub alias_groups: BTreeSet<String>,
    /// Alias groups the host holds, by name.
    pub host_groups: BTreeSet<String>,
    /// Room conversations the host has open.
    pub host_rooms: BTreeSet<Identity>,
    /// Pump read offset.
    pub read_offset: usize,
    /// Length of the frame being read.
    pub expected_len: usize,
    /// Whether the pump is armed.
    pub pump_started: bool,
    /// Whether the session holds a socket.
    pub has_socket: bool,
    /// Whether the host was told to watch the socket.
    pub watching: bool,
    /// Whether the keepalive timer is armed.
    pub timer_armed: bool,
    /// Whether the session has closed.
    pub closed: bool,
    /// Complaints the host recorded.
    pub host_complaints: Vec<String>,
}

impl SessionSnapshot {
    /// Capture a session without a host model.
    pub fn from_session<P, S, C, E>(session: &Session<P, S, C, E>) -> Self
    where
        P: ProtocolSession,
        S: Read + Write,
        C: CredentialStore,
        E: Environment,
    {
        let chats = session.chats();
        let pump = session.pump();
        Self {
            rooms: chats.rooms().map(|room| room.id()).collect(),
            alias_groups: chats.rooms().map(|room| room.aliases().name().to_string()).collect(),
            read_offset: pump.offset(),
            expected_len: pump.expected_len(),
            pump_started: pump.is_started(),
            has_socket: session.has_socket(),
            watching: session.is_watching(),
            timer_armed: session.timer().is_armed(),
            closed: session.is_closed(),
            ..Self::default()
        }
    }

    /// Capture a session and the host it drives.
    pub fn capture<P, S, C, E>(session: &Session<P, S, C, E>, host: &RecordingHost) -> Self
    where
        P: ProtocolSession,
        S: Read + Write,
        C: CredentialStore,
        E: Environment,
    {
        let mut snapshot = Self::from_session(session);
        snapshot.with_host(host);
        snapshot
    }

    /// Add the host's view.
    pub fn with_host(&mut self, host: &RecordingHost) {
        self.host_groups = host.groups.keys().cloned().collect();
        self.host_rooms = host.rooms.keys().copied().collect();
        self.host_complaints = host.complaints.clone();
    }
}
