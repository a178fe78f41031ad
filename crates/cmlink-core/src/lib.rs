//! Core state machines for cmlink.
//!
//! Everything in this crate is Sans-IO: the state machines take bytes, backend
//! events and time as input and return actions for the caller to execute. No
//! component owns a socket, a clock or an event loop, which keeps them
//! deterministic and trivially testable.
//!
//! # Components
//!
//! - [`pump::FramePump`]: turns a non-blocking byte stream into frames whose
//!   length is dictated by the protocol session, and serializes outgoing
//!   frames through a single-writer queue
//! - [`protocol::ProtocolSession`]: boundary to the backend protocol library
//! - [`auth::AuthSequencer`]: handshake, logon and step-up sequencing
//! - [`roster::Roster`]: relationship snapshots, presence and display names
//! - [`chat::ChatTracker`]: chat room membership and per-room alias groups
//! - [`timer::IntervalTimer`]: the keepalive registration

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod auth;
pub mod chat;
pub mod env;
pub mod error;
pub mod identity;
pub mod presence;
pub mod protocol;
pub mod pump;
pub mod roster;
pub mod timer;

pub use error::{AuthError, ChatError, ErrorReason, ProtocolError, PumpError, ReconcileError};
pub use identity::{AccountKind, Identity};
pub use presence::{PresenceState, StatusPrimitive};
