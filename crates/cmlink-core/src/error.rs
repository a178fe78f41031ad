//! Error types for the cmlink core.
//!
//! One enum per layer: frame pump (transport and framing faults), protocol
//! session (malformed frames), auth sequencing (out-of-order calls),
//! reconciliation (inconsistent snapshots) and chat bookkeeping.
//!
//! Faults the host should see are classified with [`ErrorReason`], which is
//! what ends up in the single connection error a session surfaces.

use std::io;

use thiserror::Error;

use crate::{auth::AuthState, identity::Identity};

/// Coarse classification of a session-ending fault, as shown to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorReason {
    /// Transport or protocol fault; the user may retry later.
    Network,
    /// Credentials were rejected; retrying without changes will not help.
    AuthenticationFailed,
    /// Anything not covered above.
    Other,
}

/// Errors reported by the protocol session for frames it cannot process.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Frame could not be decoded
    #[error("malformed frame: {0}")]
    Malformed(String),

    /// Encryption handshake failed
    #[error("handshake failed: {0}")]
    Handshake(String),
}

/// Errors from the frame pump.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PumpError {
    /// Read or flush attempted before [`crate::pump::FramePump::start`]
    #[error("frame pump not started")]
    NotStarted,

    /// Protocol session asked for a frame length we refuse to buffer
    #[error("invalid frame length {len} (max {max})")]
    InvalidFrameLength {
        /// Requested length
        len: usize,
        /// Configured maximum
        max: usize,
    },

    /// Peer closed the stream without a log-off
    #[error("unexpected end of stream at {offset} of {expected} bytes")]
    UnexpectedEof {
        /// Bytes of the current frame already received
        offset: usize,
        /// Length of the current frame
        expected: usize,
    },

    /// Socket accepted zero bytes for a non-empty write
    #[error("socket accepted zero bytes")]
    WriteZero,

    /// Underlying socket error
    #[error("transport error: {0}")]
    Io(String),

    /// Protocol session rejected a completed frame
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

impl PumpError {
    /// Transport faults, as opposed to protocol faults.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::UnexpectedEof { .. } | Self::WriteZero | Self::Io(_))
    }
}

/// Convert `PumpError` to `io::Error` for async I/O adapters.
///
/// Only for boundary conversion; internally we use `PumpError`.
impl From<PumpError> for io::Error {
    fn from(err: PumpError) -> Self {
        let kind = match &err {
            PumpError::UnexpectedEof { .. } => io::ErrorKind::UnexpectedEof,
            PumpError::WriteZero => io::ErrorKind::WriteZero,
            PumpError::NotStarted => io::ErrorKind::NotConnected,
            PumpError::InvalidFrameLength { .. } | PumpError::Protocol(_) => {
                io::ErrorKind::InvalidData
            },
            PumpError::Io(_) => io::ErrorKind::Other,
        };
        Self::new(kind, err.to_string())
    }
}

/// Convert `io::Error` to `PumpError` (for transport errors).
impl From<io::Error> for PumpError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::WriteZero => Self::WriteZero,
            _ => Self::Io(err.to_string()),
        }
    }
}

/// Errors from the auth sequencer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Operation called in a state where it makes no sense
    #[error("invalid auth transition: cannot {operation} from {state:?}")]
    InvalidState {
        /// State when the call was made
        state: AuthState,
        /// Operation that was attempted
        operation: String,
    },
}

/// Errors from roster reconciliation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReconcileError {
    /// Relationship snapshot arrays do not line up
    #[error("relationship snapshot has {users} users but {kinds} kinds")]
    MismatchedLengths {
        /// Number of identities
        users: usize,
        /// Number of relationship codes
        kinds: usize,
    },
}

/// Errors from chat membership bookkeeping.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChatError {
    /// Room is not tracked locally
    #[error("not in room {0}")]
    UnknownRoom(Identity),

    /// Alias group still holds records
    #[error("alias group {group} still has {remaining} records")]
    GroupNotEmpty {
        /// Group name
        group: String,
        /// Records left in the group
        remaining: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_faults_are_classified() {
        assert!(PumpError::UnexpectedEof { offset: 3, expected: 8 }.is_transport());
        assert!(PumpError::WriteZero.is_transport());
        assert!(PumpError::Io("reset".to_string()).is_transport());

        assert!(!PumpError::InvalidFrameLength { len: 0, max: 16 }.is_transport());
        assert!(!PumpError::Protocol(ProtocolError::Malformed("bad".to_string())).is_transport());
        assert!(!PumpError::NotStarted.is_transport());
    }

    #[test]
    fn io_conversion_keeps_kind() {
        let err: io::Error = PumpError::UnexpectedEof { offset: 0, expected: 4 }.into();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);

        let err: io::Error = PumpError::InvalidFrameLength { len: 0, max: 16 }.into();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);

        let back = PumpError::from(io::Error::from(io::ErrorKind::WriteZero));
        assert_eq!(back, PumpError::WriteZero);
    }

    #[test]
    fn protocol_error_text_is_prefixed() {
        let err = PumpError::from(ProtocolError::Malformed("short header".to_string()));
        assert_eq!(err.to_string(), "protocol error: malformed frame: short header");
    }
}
