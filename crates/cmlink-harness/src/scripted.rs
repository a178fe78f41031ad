//! Programmable protocol session.
//!
//! `ScriptedProtocol` stands in for the backend protocol library. Its wire
//! format is a toy one: every frame is a 4-byte big-endian length header
//! followed by a body of that length. The body content is ignored; each body
//! frame pops the next scripted reply, so a test controls exactly which
//! events the session sees and in which read they complete.
//!
//! Requests from the session are recorded and also encoded as outbound
//! frames, so tests can check both what was asked and what hit the socket.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use bytes::{BufMut, Bytes, BytesMut};
use cmlink_core::{
    Identity, PresenceState, ProtocolError,
    protocol::{LogOnRequest, ProtocolEvent, ProtocolOutput, ProtocolSession},
};

/// Length of the frame header on the scripted wire.
pub const HEADER_LEN: usize = 4;

/// Encode a frame for the scripted wire.
pub fn frame(body: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(HEADER_LEN + body.len());
    buf.put_u32(body.len() as u32);
    buf.put_slice(body);
    buf.freeze()
}

/// Request recorded by [`ScriptedProtocol`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Logon
    LogOn {
        /// Account name
        account: String,
        /// Sentry token presented, if any
        sentry: Option<Vec<u8>>,
        /// Step-up code presented, if any
        step_up_code: Option<String>,
    },
    /// Log-off
    LogOff,
    /// Presence announcement
    SetPresence(PresenceState),
    /// Profile request
    RequestUserInfo(Vec<Identity>),
    /// Direct message
    PrivateMessage {
        /// Recipient
        to: Identity,
        /// Text
        text: String,
    },
    /// Typing notice
    Typing(Identity),
    /// Room message
    ChatMessage {
        /// Room
        room: Identity,
        /// Text
        text: String,
    },
    /// Room join
    JoinRoom(Identity),
    /// Room leave
    LeaveRoom(Identity),
    /// Keepalive
    Heartbeat,
}

impl Request {
    fn tag(&self) -> &'static [u8] {
        match self {
            Self::LogOn { .. } => b"logon",
            Self::LogOff => b"logoff",
            Self::SetPresence(_) => b"presence",
            Self::RequestUserInfo(_) => b"userinfo",
            Self::PrivateMessage { .. } => b"msg",
            Self::Typing(_) => b"typing",
            Self::ChatMessage { .. } => b"chatmsg",
            Self::JoinRoom(_) => b"join",
            Self::LeaveRoom(_) => b"leave",
            Self::Heartbeat => b"heartbeat",
        }
    }
}

#[derive(Default)]
struct Script {
    replies: VecDeque<Result<Vec<ProtocolOutput>, ProtocolError>>,
    in_body: bool,
    outputs: Vec<ProtocolOutput>,
    requests: Vec<Request>,
    connects: usize,
    frames: usize,
    reject_requests: Option<ProtocolError>,
}

/// Protocol session driven by a script.
///
/// Clones share the script, so a test keeps one handle while the session owns
/// the other.
#[derive(Clone, Default)]
pub struct ScriptedProtocol {
    script: Arc<Mutex<Script>>,
}

impl ScriptedProtocol {
    /// Protocol with an empty script.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the outputs produced by the next body frame.
    pub fn reply(&self, outputs: Vec<ProtocolOutput>) {
        self.lock().replies.push_back(Ok(outputs));
    }

    /// Queue a single event for the next body frame.
    pub fn reply_event(&self, event: ProtocolEvent) {
        self.reply(vec![ProtocolOutput::Event(event)]);
    }

    /// Make the next body frame fail to decode.
    pub fn reply_malformed(&self, reason: &str) {
        self.lock().replies.push_back(Err(ProtocolError::Malformed(reason.to_string())));
    }

    /// Make every request fail with `err` until cleared.
    pub fn reject_requests(&self, err: Option<ProtocolError>) {
        self.lock().reject_requests = err;
    }

    /// Requests recorded so far.
    pub fn requests(&self) -> Vec<Request> {
        self.lock().requests.clone()
    }

    /// Take the recorded requests.
    pub fn take_requests(&self) -> Vec<Request> {
        std::mem::take(&mut self.lock().requests)
    }

    /// Number of transports reported through [`ProtocolSession::connected`].
    pub fn connects(&self) -> usize {
        self.lock().connects
    }

    /// Number of body frames processed.
    pub fn frames(&self) -> usize {
        self.lock().frames
    }

    /// Scripted replies not yet consumed.
    pub fn pending_replies(&self) -> usize {
        self.lock().replies.len()
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&mut self, request: Request) -> Result<(), ProtocolError> {
        let mut script = self.lock();
        if let Some(err) = script.reject_requests.clone() {
            return Err(err);
        }
        let wire = frame(request.tag());
        script.requests.push(request);
        script.outputs.push(ProtocolOutput::Send(wire));
        Ok(())
    }
}

impl std::fmt::Debug for ScriptedProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let script = self.lock();
        f.debug_struct("ScriptedProtocol")
            .field("pending_replies", &script.replies.len())
            .field("requests", &script.requests.len())
            .finish_non_exhaustive()
    }
}

impl ProtocolSession for ScriptedProtocol {
    fn connected(&mut self) -> usize {
        let mut script = self.lock();
        script.connects += 1;
        script.in_body = false;
        script.outputs.clear();
        HEADER_LEN
    }

    fn frame_complete(&mut self, frame: &[u8]) -> Result<usize, ProtocolError> {
        let mut script = self.lock();
        if !script.in_body {
            let header: [u8; HEADER_LEN] = frame
                .try_into()
                .map_err(|_| ProtocolError::Malformed(format!("header of {} bytes", frame.len())))?;
            script.in_body = true;
            return Ok(u32::from_be_bytes(header) as usize);
        }

        script.in_body = false;
        script.frames += 1;
        match script.replies.pop_front() {
            Some(Ok(outputs)) => script.outputs.extend(outputs),
            Some(Err(err)) => return Err(err),
            None => tracing::debug!(len = frame.len(), "unscripted frame"),
        }
        Ok(HEADER_LEN)
    }

    fn take_outputs(&mut self) -> Vec<ProtocolOutput> {
        std::mem::take(&mut self.lock().outputs)
    }

    fn log_on(&mut self, request: &LogOnRequest) -> Result<(), ProtocolError> {
        self.record(Request::LogOn {
            account: request.account.clone(),
            sentry: request.sentry.as_ref().map(|token| token.as_bytes().to_vec()),
            step_up_code: request.step_up_code.clone(),
        })
    }

    fn log_off(&mut self) -> Result<(), ProtocolError> {
        self.record(Request::LogOff)
    }

    fn set_presence(&mut self, state: PresenceState) -> Result<(), ProtocolError> {
        self.record(Request::SetPresence(state))
    }

    fn request_user_info(&mut self, users: &[Identity]) -> Result<(), ProtocolError> {
        self.record(Request::RequestUserInfo(users.to_vec()))
    }

    fn send_private_message(&mut self, to: Identity, text: &str) -> Result<(), ProtocolError> {
        self.record(Request::PrivateMessage { to, text: text.to_string() })
    }

    fn send_typing(&mut self, to: Identity) -> Result<(), ProtocolError> {
        self.record(Request::Typing(to))
    }

    fn send_chat_message(&mut self, room: Identity, text: &str) -> Result<(), ProtocolError> {
        self.record(Request::ChatMessage { room, text: text.to_string() })
    }

    fn join_room(&mut self, room: Identity) -> Result<(), ProtocolError> {
        self.record(Request::JoinRoom(room))
    }

    fn leave_room(&mut self, room: Identity) -> Result<(), ProtocolError> {
        self.record(Request::LeaveRoom(room))
    }

    fn heartbeat(&mut self) -> Result<(), ProtocolError> {
        self.record(Request::Heartbeat)
    }
}

/// Keepalive interval used by [`logged_on_reply`].
pub const KEEPALIVE: Duration = Duration::from_secs(9);

/// Outputs of a successful logon: the result and the keepalive request.
pub fn logged_on_reply(identity: Identity) -> Vec<ProtocolOutput> {
    vec![
        ProtocolOutput::Event(ProtocolEvent::LogOnResult { code: 1, identity }),
        ProtocolOutput::ScheduleKeepalive(KEEPALIVE),
    ]
}
