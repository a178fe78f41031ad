//! Session events and actions.

use std::time::Duration;

use cmlink_core::{
    ErrorReason, Identity, StatusPrimitive, auth::Credentials, chat::ChatAction,
    roster::RosterAction,
};

use crate::config::Endpoint;

/// Typing state reported by the host for an open conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypingState {
    /// Not typing.
    NotTyping,
    /// Actively typing.
    Typing,
    /// Stopped typing with text still entered.
    Typed,
}

/// Commands issued by the host UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostCommand {
    /// The user entered the step-up code.
    StepUpCode(String),
    /// The user dismissed the step-up prompt.
    StepUpCancelled,
    /// The user picked a status.
    SetStatus(StatusPrimitive),
    /// Send a direct message.
    SendPrivateMessage {
        /// Recipient.
        to: Identity,
        /// Message text.
        text: String,
    },
    /// Typing state changed in a direct conversation.
    SendTyping {
        /// The other party.
        to: Identity,
        /// New state.
        state: TypingState,
    },
    /// Post to a room.
    SendChatMessage {
        /// Room.
        room: Identity,
        /// Message text.
        text: String,
    },
    /// Join a room.
    JoinRoom(Identity),
    /// Join a room given its identity as typed by the user.
    JoinRoomByName(String),
    /// Leave a room.
    LeaveRoom(Identity),
    /// Log off gracefully and close once the backend hangs up.
    LogOff,
    /// Close immediately.
    Close,
}

/// Events the caller feeds into the session.
///
/// Generic over the socket type `S` and the instant type `I`, so the same
/// session runs over a tokio stream in production and an in-memory socket
/// with virtual time in simulation.
#[derive(Debug)]
pub enum SessionEvent<S, I = std::time::Instant> {
    /// Start logging on.
    LogIn(Credentials),
    /// The transport requested by [`SessionAction::Connect`] is up.
    Connected(S),
    /// The transport requested by [`SessionAction::Connect`] failed.
    ConnectFailed {
        /// Connector's explanation.
        reason: String,
    },
    /// The socket is readable.
    Readable,
    /// The socket is writable again after a partial flush.
    Writable,
    /// Time passed.
    Tick {
        /// Current time from the environment.
        now: I,
    },
    /// Host command.
    Command(HostCommand),
}

/// Actions the session produces for the host to execute, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionAction {
    /// Open a transport to this endpoint and answer with
    /// [`SessionEvent::Connected`] or [`SessionEvent::ConnectFailed`].
    Connect(Endpoint),
    /// Start delivering [`SessionEvent::Readable`].
    WatchSocket,
    /// Stop delivering socket readiness.
    UnwatchSocket,
    /// Deliver one [`SessionEvent::Writable`] when the socket can take more.
    WatchWritable,
    /// Deliver [`SessionEvent::Tick`] at least every `interval`.
    ArmTimer {
        /// Keepalive interval
        interval: Duration,
    },
    /// Stop delivering ticks.
    CancelTimer,
    /// Logon succeeded.
    LoggedOn {
        /// Identity assigned by the backend
        identity: Identity,
        /// Name to show for the connection
        display_name: String,
    },
    /// Ask the user for a step-up code and answer with
    /// [`HostCommand::StepUpCode`] or [`HostCommand::StepUpCancelled`].
    PromptStepUp {
        /// Account the code is for
        account: String,
    },
    /// Roster change.
    Roster(RosterAction),
    /// Chat room change.
    Chat(ChatAction),
    /// Show a direct message.
    PrivateMessage {
        /// Author
        sender: Identity,
        /// Text
        text: String,
    },
    /// Show a typing notice.
    Typing {
        /// User who is typing
        sender: Identity,
        /// How long to show the notice
        timeout: Duration,
    },
    /// The session failed. Always followed by [`SessionAction::Closed`].
    ConnectionError {
        /// Classification
        reason: ErrorReason,
        /// Human-readable message
        message: String,
    },
    /// The session is over; no further events are accepted.
    Closed,
}
