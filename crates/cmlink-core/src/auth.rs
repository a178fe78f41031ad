//! Logon sequencing.
//!
//! Drives one logon attempt from transport connect to a logged-on session,
//! including the step-up ("enter the code we mailed you") detour, which
//! needs a brand new connection.
//!
//! # State Machine
//!
//! ```text
//! ┌──────────────┐ begin ┌────────────┐ connected ┌───────────────────┐
//! │ Disconnected │──────>│ Connecting │──────────>│ AwaitingHandshake │
//! └──────────────┘       └────────────┘           └───────────────────┘
//!                              ↑                            │ handshake ready
//!                              │ supply_step_up             ↓
//!                     ┌────────────────┐  denied     ┌───────────┐  ok  ┌──────────┐
//!                     │ AwaitingStepUp │<────────────│ LoggingOn │─────>│ LoggedOn │
//!                     └────────────────┘             └───────────┘      └──────────┘
//!                                                          │ other
//!                                                          ↓
//!                                                    ┌──────────┐
//!                                                    │  Failed  │
//!                                                    └──────────┘
//! ```
//!
//! Like the rest of the core, the sequencer performs no I/O. Each transition
//! returns [`AuthAction`]s for the session to execute in order.

use std::fmt;

use zeroize::Zeroizing;

use crate::{
    error::{AuthError, ErrorReason},
    identity::Identity,
    presence::PresenceState,
    protocol::{LogOnRequest, SentryToken},
};

/// Decoded answer to a logon request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogOnResult {
    /// Logged on.
    Ok,
    /// Account name or secret rejected.
    InvalidPassword,
    /// Backend service is down.
    ServiceUnavailable,
    /// This endpoint cannot serve us; another one might.
    TryAnotherEndpoint,
    /// Step-up code required.
    StepUpRequired,
    /// Any other result code.
    Other(u32),
}

impl LogOnResult {
    /// Decode a backend result code.
    pub fn from_code(code: u32) -> Self {
        match code {
            1 => Self::Ok,
            5 => Self::InvalidPassword,
            20 => Self::ServiceUnavailable,
            48 => Self::TryAnotherEndpoint,
            63 => Self::StepUpRequired,
            other => Self::Other(other),
        }
    }
}

/// Why a logon attempt ended for good.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailure {
    /// Credentials rejected.
    InvalidCredential,
    /// Backend service is down.
    ServiceUnavailable,
    /// Endpoint refused to serve us.
    TryAnotherEndpoint,
    /// User dismissed the step-up prompt.
    StepUpCancelled,
    /// Unrecognized result code.
    Unknown(u32),
}

impl AuthFailure {
    /// Classification shown to the host.
    pub fn reason(self) -> ErrorReason {
        match self {
            Self::InvalidCredential | Self::StepUpCancelled => ErrorReason::AuthenticationFailed,
            Self::ServiceUnavailable | Self::TryAnotherEndpoint => ErrorReason::Network,
            Self::Unknown(_) => ErrorReason::Other,
        }
    }

    /// Message shown to the host.
    pub fn message(self) -> &'static str {
        match self {
            Self::InvalidCredential => "Invalid password",
            Self::ServiceUnavailable => "Service is down",
            Self::TryAnotherEndpoint => "This server is down",
            Self::StepUpCancelled => "Step-up code required",
            Self::Unknown(_) => "Unknown error",
        }
    }
}

/// Auth sequencer state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    /// No attempt in progress.
    Disconnected,
    /// Waiting for a transport.
    Connecting,
    /// Transport up, encryption handshake running.
    AwaitingHandshake,
    /// Logon sent.
    LoggingOn,
    /// Logged on.
    LoggedOn,
    /// Transport closed; waiting for the user's step-up code.
    AwaitingStepUp,
    /// Attempt ended.
    Failed(AuthFailure),
}

/// Account name and secret for one attempt.
#[derive(Clone)]
pub struct Credentials {
    /// Account name.
    pub account: String,
    /// Account secret, wiped on drop.
    pub secret: Zeroizing<String>,
}

impl Credentials {
    /// Bundle an account name and secret.
    pub fn new(account: impl Into<String>, secret: impl Into<String>) -> Self {
        Self { account: account.into(), secret: Zeroizing::new(secret.into()) }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("account", &self.account)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// The in-flight attempt.
#[derive(Debug, Clone)]
pub struct PendingAuth {
    credentials: Credentials,
    step_up_code: Option<Zeroizing<String>>,
}

impl PendingAuth {
    /// Account the attempt is for.
    pub fn account(&self) -> &str {
        &self.credentials.account
    }

    /// Whether a step-up code will accompany the next logon.
    pub fn has_step_up_code(&self) -> bool {
        self.step_up_code.is_some()
    }
}

/// Actions returned by the auth sequencer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthAction {
    /// Open a fresh transport.
    Connect,
    /// Send this logon.
    LogOn(LogOnRequest),
    /// Announce the local presence.
    SetPresence(PresenceState),
    /// Logon succeeded.
    LoggedOn {
        /// Identity assigned by the backend
        identity: Identity,
        /// Name to show until a profile update arrives
        display_name: String,
    },
    /// Close the transport and stop watching it.
    CloseTransport,
    /// Ask the user for a step-up code.
    PromptStepUp {
        /// Account the code is for
        account: String,
    },
    /// Store the device token for the account.
    PersistSentry {
        /// Account the token belongs to
        account: String,
        /// Token to store
        token: SentryToken,
    },
    /// The attempt failed for good.
    Fail(AuthFailure),
}

/// Logon state machine for one session.
#[derive(Debug, Clone)]
pub struct AuthSequencer {
    state: AuthState,
    pending: Option<PendingAuth>,
    identity: Option<Identity>,
}

impl Default for AuthSequencer {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthSequencer {
    /// Create a sequencer in [`AuthState::Disconnected`].
    pub fn new() -> Self {
        Self { state: AuthState::Disconnected, pending: None, identity: None }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> AuthState {
        self.state
    }

    /// The in-flight attempt, if any.
    #[must_use]
    pub fn pending(&self) -> Option<&PendingAuth> {
        self.pending.as_ref()
    }

    /// Identity assigned at logon.
    #[must_use]
    pub fn identity(&self) -> Option<Identity> {
        self.identity
    }

    /// Whether the session is logged on.
    #[must_use]
    pub fn is_logged_on(&self) -> bool {
        self.state == AuthState::LoggedOn
    }

    /// Start an attempt.
    ///
    /// # Errors
    ///
    /// - `AuthError::InvalidState` unless disconnected or failed
    pub fn begin(&mut self, credentials: Credentials) -> Result<Vec<AuthAction>, AuthError> {
        if !matches!(self.state, AuthState::Disconnected | AuthState::Failed(_)) {
            return Err(self.invalid("begin"));
        }

        tracing::info!(account = %credentials.account, "logon attempt started");
        self.pending = Some(PendingAuth { credentials, step_up_code: None });
        self.identity = None;
        self.state = AuthState::Connecting;
        Ok(vec![AuthAction::Connect])
    }

    /// The transport requested by [`AuthAction::Connect`] is up.
    ///
    /// # Errors
    ///
    /// - `AuthError::InvalidState` unless connecting
    pub fn transport_connected(&mut self) -> Result<Vec<AuthAction>, AuthError> {
        if self.state != AuthState::Connecting {
            return Err(self.invalid("transport_connected"));
        }
        self.state = AuthState::AwaitingHandshake;
        Ok(Vec::new())
    }

    /// Encryption handshake finished; emit exactly one logon.
    ///
    /// # Errors
    ///
    /// - `AuthError::InvalidState` unless awaiting the handshake
    pub fn handshake_ready(
        &mut self,
        sentry: Option<SentryToken>,
    ) -> Result<Vec<AuthAction>, AuthError> {
        if self.state != AuthState::AwaitingHandshake {
            return Err(self.invalid("handshake_ready"));
        }
        let Some(pending) = self.pending.as_ref() else {
            return Err(self.invalid("handshake_ready"));
        };

        let request = LogOnRequest {
            account: pending.credentials.account.clone(),
            secret: pending.credentials.secret.clone(),
            sentry,
            step_up_code: pending.step_up_code.as_ref().map(|code| code.as_str().to_owned()),
        };

        tracing::debug!(with_step_up = request.step_up_code.is_some(), "sending logon");
        self.state = AuthState::LoggingOn;
        Ok(vec![AuthAction::LogOn(request)])
    }

    /// Handle the backend's answer to the logon.
    ///
    /// # Errors
    ///
    /// - `AuthError::InvalidState` unless logging on
    pub fn logon_result(
        &mut self,
        code: u32,
        identity: Identity,
    ) -> Result<Vec<AuthAction>, AuthError> {
        if self.state != AuthState::LoggingOn {
            return Err(self.invalid("logon_result"));
        }

        // A code is good for one logon; a retry needs a fresh one.
        if let Some(pending) = self.pending.as_mut() {
            pending.step_up_code = None;
        }

        let failure = match LogOnResult::from_code(code) {
            LogOnResult::Ok => {
                tracing::info!(%identity, "logged on");
                self.state = AuthState::LoggedOn;
                self.identity = Some(identity);
                return Ok(vec![
                    AuthAction::SetPresence(PresenceState::Online),
                    AuthAction::LoggedOn { identity, display_name: identity.to_string() },
                ]);
            },
            LogOnResult::StepUpRequired => {
                tracing::info!("step-up code required");
                self.state = AuthState::AwaitingStepUp;
                let account = self.account().unwrap_or_default().to_owned();
                return Ok(vec![AuthAction::CloseTransport, AuthAction::PromptStepUp { account }]);
            },
            LogOnResult::InvalidPassword => AuthFailure::InvalidCredential,
            LogOnResult::ServiceUnavailable => AuthFailure::ServiceUnavailable,
            LogOnResult::TryAnotherEndpoint => AuthFailure::TryAnotherEndpoint,
            LogOnResult::Other(code) => {
                tracing::error!(code, "unrecognized logon result");
                AuthFailure::Unknown(code)
            },
        };

        tracing::warn!(?failure, "logon failed");
        self.state = AuthState::Failed(failure);
        Ok(vec![AuthAction::Fail(failure)])
    }

    /// The user entered a step-up code; reconnect and log on with it.
    ///
    /// # Errors
    ///
    /// - `AuthError::InvalidState` unless awaiting a step-up code
    pub fn supply_step_up(&mut self, code: String) -> Result<Vec<AuthAction>, AuthError> {
        if self.state != AuthState::AwaitingStepUp {
            return Err(self.invalid("supply_step_up"));
        }
        let Some(pending) = self.pending.as_mut() else {
            return Err(self.invalid("supply_step_up"));
        };

        pending.step_up_code = Some(Zeroizing::new(code.trim().to_owned()));
        self.state = AuthState::Connecting;
        Ok(vec![AuthAction::Connect])
    }

    /// The user dismissed the step-up prompt.
    ///
    /// # Errors
    ///
    /// - `AuthError::InvalidState` unless awaiting a step-up code
    pub fn cancel_step_up(&mut self) -> Result<Vec<AuthAction>, AuthError> {
        if self.state != AuthState::AwaitingStepUp {
            return Err(self.invalid("cancel_step_up"));
        }
        let failure = AuthFailure::StepUpCancelled;
        self.state = AuthState::Failed(failure);
        Ok(vec![AuthAction::Fail(failure)])
    }

    /// The backend pushed a device token; persist it for the account.
    ///
    /// # Errors
    ///
    /// - `AuthError::InvalidState` if no attempt is in flight
    pub fn sentry_updated(&mut self, token: SentryToken) -> Result<Vec<AuthAction>, AuthError> {
        let Some(account) = self.account() else {
            return Err(self.invalid("sentry_updated"));
        };
        Ok(vec![AuthAction::PersistSentry { account: account.to_owned(), token }])
    }

    /// The session was torn down. Terminal states are kept so the failure
    /// stays observable.
    pub fn transport_lost(&mut self) {
        if matches!(self.state, AuthState::Failed(_) | AuthState::AwaitingStepUp) {
            return;
        }
        tracing::debug!(state = ?self.state, "transport lost");
        self.state = AuthState::Disconnected;
    }

    fn account(&self) -> Option<&str> {
        self.pending.as_ref().map(PendingAuth::account)
    }

    fn invalid(&self, operation: &str) -> AuthError {
        AuthError::InvalidState { state: self.state, operation: operation.to_string() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ME: Identity = Identity::from_raw(76_561_198_006_409_530);

    fn logging_on() -> AuthSequencer {
        let mut auth = AuthSequencer::new();
        auth.begin(Credentials::new("alice", "hunter2")).unwrap();
        auth.transport_connected().unwrap();
        auth.handshake_ready(None).unwrap();
        auth
    }

    #[test]
    fn successful_logon() {
        let mut auth = AuthSequencer::new();

        assert_eq!(auth.begin(Credentials::new("alice", "hunter2")).unwrap(), vec![
            AuthAction::Connect
        ]);
        assert!(auth.transport_connected().unwrap().is_empty());

        let actions = auth.handshake_ready(Some(SentryToken::new(vec![1, 2]))).unwrap();
        let [AuthAction::LogOn(request)] = actions.as_slice() else {
            panic!("expected one logon, got {actions:?}");
        };
        assert_eq!(request.account, "alice");
        assert_eq!(request.secret.as_str(), "hunter2");
        assert_eq!(request.sentry, Some(SentryToken::new(vec![1, 2])));
        assert_eq!(request.step_up_code, None);

        assert_eq!(auth.logon_result(1, ME).unwrap(), vec![
            AuthAction::SetPresence(PresenceState::Online),
            AuthAction::LoggedOn { identity: ME, display_name: "76561198006409530".to_string() },
        ]);
        assert!(auth.is_logged_on());
        assert_eq!(auth.identity(), Some(ME));
    }

    #[test]
    fn step_up_closes_transport_before_prompting() {
        let mut auth = logging_on();

        assert_eq!(auth.logon_result(63, ME).unwrap(), vec![
            AuthAction::CloseTransport,
            AuthAction::PromptStepUp { account: "alice".to_string() },
        ]);
        assert_eq!(auth.state(), AuthState::AwaitingStepUp);

        auth.transport_lost();
        assert_eq!(auth.state(), AuthState::AwaitingStepUp);
    }

    #[test]
    fn step_up_code_rides_the_next_logon_only() {
        let mut auth = logging_on();
        auth.logon_result(63, ME).unwrap();

        assert_eq!(auth.supply_step_up(" X7KQ2 ".to_string()).unwrap(), vec![AuthAction::Connect]);
        auth.transport_connected().unwrap();

        let actions = auth.handshake_ready(None).unwrap();
        let [AuthAction::LogOn(request)] = actions.as_slice() else {
            panic!("expected one logon, got {actions:?}");
        };
        assert_eq!(request.step_up_code.as_deref(), Some("X7KQ2"));

        auth.logon_result(1, ME).unwrap();
        assert!(!auth.pending().unwrap().has_step_up_code());
    }

    #[test]
    fn failures_are_classified() {
        let cases = [
            (5, AuthFailure::InvalidCredential, ErrorReason::AuthenticationFailed, "Invalid password"),
            (20, AuthFailure::ServiceUnavailable, ErrorReason::Network, "Service is down"),
            (48, AuthFailure::TryAnotherEndpoint, ErrorReason::Network, "This server is down"),
            (2, AuthFailure::Unknown(2), ErrorReason::Other, "Unknown error"),
        ];

        for (code, failure, reason, message) in cases {
            let mut auth = logging_on();
            assert_eq!(auth.logon_result(code, ME).unwrap(), vec![AuthAction::Fail(failure)]);
            assert_eq!(auth.state(), AuthState::Failed(failure));
            assert_eq!(failure.reason(), reason);
            assert_eq!(failure.message(), message);
        }
    }

    #[test]
    fn cancelling_step_up_fails_the_attempt() {
        let mut auth = logging_on();
        auth.logon_result(63, ME).unwrap();

        assert_eq!(auth.cancel_step_up().unwrap(), vec![AuthAction::Fail(
            AuthFailure::StepUpCancelled
        )]);
        assert_eq!(AuthFailure::StepUpCancelled.reason(), ErrorReason::AuthenticationFailed);
    }

    #[test]
    fn sentry_is_persisted_every_time() {
        let mut auth = logging_on();
        for byte in [1u8, 2] {
            assert_eq!(auth.sentry_updated(SentryToken::new(vec![byte])).unwrap(), vec![
                AuthAction::PersistSentry {
                    account: "alice".to_string(),
                    token: SentryToken::new(vec![byte]),
                }
            ]);
        }
    }

    #[test]
    fn out_of_order_calls_are_rejected() {
        let mut auth = AuthSequencer::new();
        assert!(matches!(
            auth.handshake_ready(None),
            Err(AuthError::InvalidState { state: AuthState::Disconnected, .. })
        ));
        assert!(auth.logon_result(1, ME).is_err());
        assert!(auth.supply_step_up("code".to_string()).is_err());
        assert!(auth.sentry_updated(SentryToken::new(vec![1])).is_err());

        let mut auth = logging_on();
        assert!(auth.begin(Credentials::new("bob", "pw")).is_err());
    }

    #[test]
    fn debug_output_redacts_secret() {
        let rendered = format!("{:?}", Credentials::new("alice", "hunter2"));
        assert!(!rendered.contains("hunter2"));
    }
}
