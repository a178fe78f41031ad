//! Boundary to the backend protocol library.
//!
//! The protocol library owns the encryption handshake and message
//! (de)serialization. The session only needs to know two things from it:
//! how many bytes the next frame needs, and what a completed frame meant.
//! Everything it wants to put on the wire comes back as
//! [`ProtocolOutput::Send`] and is written through the frame pump.

use std::{fmt, time::Duration};

use bytes::Bytes;
use zeroize::Zeroizing;

use crate::{error::ProtocolError, identity::Identity, presence::PresenceState};

/// Opaque device token pushed by the backend and presented at logon.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct SentryToken(Vec<u8>);

impl SentryToken {
    /// Wrap raw token bytes.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Raw token bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for SentryToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SentryToken({} bytes)", self.0.len())
    }
}

/// Everything the protocol library needs to log on.
#[derive(Clone, PartialEq, Eq)]
pub struct LogOnRequest {
    /// Account name.
    pub account: String,
    /// Account secret.
    pub secret: Zeroizing<String>,
    /// Device token from an earlier session, if any.
    pub sentry: Option<SentryToken>,
    /// Step-up code supplied by the user for this attempt.
    pub step_up_code: Option<String>,
}

impl fmt::Debug for LogOnRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogOnRequest")
            .field("account", &self.account)
            .field("secret", &"<redacted>")
            .field("sentry", &self.sentry)
            .field("step_up_code", &self.step_up_code.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Profile update for one user. Every field besides `user` is optional.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserInfo {
    /// User the update is about.
    pub user: Identity,
    /// Chat room the update was observed in, if any.
    pub source: Option<Identity>,
    /// Display name.
    pub name: Option<String>,
    /// Raw presence state code.
    pub state: Option<u32>,
}

/// Batch of relationship entries, as two parallel arrays.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationshipSnapshot {
    /// `false` for a full snapshot replacing the roster.
    pub incremental: bool,
    /// Users the entries are about.
    pub users: Vec<Identity>,
    /// Raw relationship codes, one per user.
    pub kinds: Vec<u32>,
}

/// Answer to a room join.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomEntry {
    /// Room that was entered.
    pub room: Identity,
    /// Raw room-enter response code.
    pub response: u32,
    /// Room display name.
    pub name: String,
    /// Members present at entry.
    pub members: Vec<Identity>,
}

/// Someone entered or left a room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MembershipChange {
    /// Room the change happened in.
    pub room: Identity,
    /// User who caused the change (e.g. the moderator for a kick).
    pub actor: Identity,
    /// User whose membership changed.
    pub subject: Identity,
    /// Raw change bits.
    pub change: u32,
}

/// Semantic events decoded from completed frames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolEvent {
    /// Encryption handshake finished; logon may be sent.
    HandshakeReady,
    /// Answer to a logon request.
    LogOnResult {
        /// Raw result code.
        code: u32,
        /// Identity assigned to the session.
        identity: Identity,
    },
    /// Backend pushed a new device token.
    SentryUpdated(SentryToken),
    /// Profile update.
    UserInfo(UserInfo),
    /// Relationship batch.
    Relationships(RelationshipSnapshot),
    /// Room join answer.
    RoomEntered(RoomEntry),
    /// Room membership change.
    MembershipChanged(MembershipChange),
    /// Message posted to a room.
    ChatMessage {
        /// Room the message was posted to.
        room: Identity,
        /// Author.
        sender: Identity,
        /// Message text.
        text: String,
    },
    /// Direct message.
    PrivateMessage {
        /// Author.
        sender: Identity,
        /// Message text.
        text: String,
    },
    /// Remote user is typing.
    Typing {
        /// User who is typing.
        sender: Identity,
    },
    /// Backend ended the session.
    LoggedOff {
        /// Raw result code.
        code: u32,
    },
}

/// Outputs drained from the protocol session after every call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolOutput {
    /// Complete frame to write to the socket.
    Send(Bytes),
    /// Decoded event.
    Event(ProtocolEvent),
    /// Call [`ProtocolSession::heartbeat`] every `interval`.
    ScheduleKeepalive(Duration),
}

/// Backend protocol library, as seen by the session.
///
/// Request methods queue their frames internally; the session drains them
/// with [`ProtocolSession::take_outputs`] after every call.
pub trait ProtocolSession {
    /// A fresh transport is up. Resets per-connection state and returns the
    /// length of the first frame.
    fn connected(&mut self) -> usize;

    /// Process one complete frame and return the length of the next one.
    ///
    /// # Errors
    ///
    /// - `ProtocolError` if the frame cannot be decoded
    fn frame_complete(&mut self, frame: &[u8]) -> Result<usize, ProtocolError>;

    /// Drain everything produced since the last call.
    fn take_outputs(&mut self) -> Vec<ProtocolOutput>;

    /// Queue a logon request.
    ///
    /// # Errors
    ///
    /// - `ProtocolError` if the request cannot be encoded
    fn log_on(&mut self, request: &LogOnRequest) -> Result<(), ProtocolError>;

    /// Queue a log-off.
    ///
    /// # Errors
    ///
    /// - `ProtocolError` if the request cannot be encoded
    fn log_off(&mut self) -> Result<(), ProtocolError>;

    /// Announce the local presence state.
    ///
    /// # Errors
    ///
    /// - `ProtocolError` if the request cannot be encoded
    fn set_presence(&mut self, state: PresenceState) -> Result<(), ProtocolError>;

    /// Ask for profile updates about `users`.
    ///
    /// # Errors
    ///
    /// - `ProtocolError` if the request cannot be encoded
    fn request_user_info(&mut self, users: &[Identity]) -> Result<(), ProtocolError>;

    /// Send a direct message.
    ///
    /// # Errors
    ///
    /// - `ProtocolError` if the request cannot be encoded
    fn send_private_message(&mut self, to: Identity, text: &str) -> Result<(), ProtocolError>;

    /// Tell `to` that we are typing.
    ///
    /// # Errors
    ///
    /// - `ProtocolError` if the request cannot be encoded
    fn send_typing(&mut self, to: Identity) -> Result<(), ProtocolError>;

    /// Post a message to a room.
    ///
    /// # Errors
    ///
    /// - `ProtocolError` if the request cannot be encoded
    fn send_chat_message(&mut self, room: Identity, text: &str) -> Result<(), ProtocolError>;

    /// Ask to join a room.
    ///
    /// # Errors
    ///
    /// - `ProtocolError` if the request cannot be encoded
    fn join_room(&mut self, room: Identity) -> Result<(), ProtocolError>;

    /// Leave a room.
    ///
    /// # Errors
    ///
    /// - `ProtocolError` if the request cannot be encoded
    fn leave_room(&mut self, room: Identity) -> Result<(), ProtocolError>;

    /// Keepalive tick.
    ///
    /// # Errors
    ///
    /// - `ProtocolError` if the heartbeat cannot be encoded
    fn heartbeat(&mut self) -> Result<(), ProtocolError>;
}
