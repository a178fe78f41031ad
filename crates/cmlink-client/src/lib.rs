//! Client session
//!
//! One logical connection to the backend, composed from the [`cmlink_core`]
//! state machines: the frame pump, the auth sequencer, the roster reconciler,
//! the chat membership tracker and the keepalive timer.
//!
//! # Architecture
//!
//! The session follows the same Sans-IO and action-based patterns as the
//! core. It receives events ([`SessionEvent`]): socket readiness, timer ticks
//! and host commands. It returns actions ([`SessionAction`]) for the host to
//! execute. The session owns the socket handle, but only ever performs
//! non-blocking reads and writes on it when told it is ready.
//!
//! # Components
//!
//! - [`Session`]: the per-connection state machine
//! - [`SessionConfig`]: endpoint pool and limits
//! - [`CredentialStore`]: where the device token is persisted
//! - [`SessionEvent`] / [`SessionAction`]: the host boundary

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod config;
mod error;
mod event;
mod session;
mod store;

pub use cmlink_core::{
    ErrorReason, Identity, PresenceState, StatusPrimitive, auth::Credentials, chat::ChatAction,
    env::Environment, roster::RosterAction,
};
pub use config::{DEFAULT_TYPING_TIMEOUT, Endpoint, SessionConfig};
pub use error::SessionError;
pub use event::{HostCommand, SessionAction, SessionEvent, TypingState};
pub use session::Session;
pub use store::{CredentialStore, MemoryCredentialStore};
