//! Session errors.

use cmlink_core::{
    AuthError, ChatError, ErrorReason, ProtocolError, PumpError, ReconcileError,
    auth::AuthFailure,
};
use thiserror::Error;

/// Errors from [`crate::Session::handle`].
///
/// Fatal errors never reach the caller: the session tears itself down and
/// reports them as a [`crate::SessionAction::ConnectionError`]. Only
/// non-fatal errors (a command that makes no sense right now) are returned.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Frame pump fault
    #[error(transparent)]
    Pump(#[from] PumpError),

    /// Protocol session rejected a request
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Inconsistent snapshot from the backend
    #[error("protocol error: {0}")]
    Reconcile(#[from] ReconcileError),

    /// Backend event arrived in the wrong auth state
    #[error("protocol error: {0}")]
    OutOfSequence(AuthError),

    /// Logon attempt ended
    #[error("{}", .0.message())]
    LogOnFailed(AuthFailure),

    /// Connector could not reach the endpoint
    #[error("connection failed: {0}")]
    Connect(String),

    /// Endpoint pool is empty
    #[error("no backend endpoints configured")]
    NoEndpoints,

    /// Backend ended the session
    #[error("Logged off by server")]
    LoggedOff {
        /// Raw result code
        code: u32,
    },

    /// Host command in the wrong auth state
    #[error(transparent)]
    Command(AuthError),

    /// Chat bookkeeping refused the operation
    #[error(transparent)]
    Chat(#[from] ChatError),

    /// Command needs a logged-on session
    #[error("not logged on")]
    NotLoggedOn,

    /// Session already closed
    #[error("session closed")]
    Closed,

    /// Room or user identity could not be parsed
    #[error("invalid identity {input:?}")]
    InvalidIdentity {
        /// What the user typed
        input: String,
    },
}

impl SessionError {
    /// Whether the session must be torn down.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Pump(_)
            | Self::Protocol(_)
            | Self::Reconcile(_)
            | Self::OutOfSequence(_)
            | Self::LogOnFailed(_)
            | Self::Connect(_)
            | Self::NoEndpoints
            | Self::LoggedOff { .. } => true,
            // Removing a non-empty group would corrupt the host's roster.
            Self::Chat(err) => matches!(err, ChatError::GroupNotEmpty { .. }),
            Self::Command(_) | Self::NotLoggedOn | Self::Closed | Self::InvalidIdentity { .. } => {
                false
            },
        }
    }

    /// Classification shown to the host.
    pub fn reason(&self) -> ErrorReason {
        match self {
            Self::LogOnFailed(failure) => failure.reason(),
            Self::Pump(_)
            | Self::Protocol(_)
            | Self::Reconcile(_)
            | Self::OutOfSequence(_)
            | Self::Connect(_)
            | Self::LoggedOff { .. } => ErrorReason::Network,
            Self::NoEndpoints
            | Self::Command(_)
            | Self::Chat(_)
            | Self::NotLoggedOn
            | Self::Closed
            | Self::InvalidIdentity { .. } => ErrorReason::Other,
        }
    }
}
