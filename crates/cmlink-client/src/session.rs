//! Session state machine.
//!
//! The `Session` owns one logical connection: the socket handle, the frame
//! pump, the keepalive timer and the auth, roster and chat state machines.
//! Every host interaction goes through [`Session::handle`], which runs to
//! completion and returns the host operations to perform, in order.
//!
//! # Teardown
//!
//! All exit paths (log-off, fatal error, the step-up reconnect) share one
//! teardown routine. It unregisters the read watcher, cancels the timer,
//! drops the socket and releases the pump buffers, in that order.

use std::io::{Read, Write};

use cmlink_core::{
    Identity, PresenceState,
    auth::{AuthAction, AuthSequencer, Credentials},
    chat::{ChatAction, ChatTracker},
    env::Environment,
    error::ErrorReason,
    protocol::{ProtocolEvent, ProtocolOutput, ProtocolSession},
    pump::{FlushProgress, FramePump, ReadProgress},
    roster::{Roster, RosterAction},
    timer::IntervalTimer,
};

use crate::{
    config::SessionConfig,
    error::SessionError,
    event::{HostCommand, SessionAction, SessionEvent, TypingState},
    store::CredentialStore,
};

/// One logical connection to the backend.
///
/// Generic over the protocol library `P`, the socket `S`, the credential
/// store `C` and the environment `E`.
pub struct Session<P, S, C, E: Environment> {
    env: E,
    config: SessionConfig,
    protocol: P,
    store: C,
    socket: Option<S>,
    pump: FramePump,
    /// Whether the host was told to watch the socket
    watching: bool,
    timer: IntervalTimer<E::Instant>,
    auth: AuthSequencer,
    roster: Roster,
    chats: ChatTracker,
    closed: bool,
}

impl<P, S, C, E> Session<P, S, C, E>
where
    P: ProtocolSession,
    S: Read + Write,
    C: CredentialStore,
    E: Environment,
{
    /// Create an idle session. Feed it [`SessionEvent::LogIn`] to start.
    pub fn new(env: E, config: SessionConfig, protocol: P, store: C) -> Self {
        let pump = FramePump::new(config.pump);
        Self {
            env,
            config,
            protocol,
            store,
            socket: None,
            pump,
            watching: false,
            timer: IntervalTimer::new(),
            auth: AuthSequencer::new(),
            roster: Roster::new(),
            chats: ChatTracker::new(),
            closed: false,
        }
    }

    /// Session configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Auth sequencer.
    pub fn auth(&self) -> &AuthSequencer {
        &self.auth
    }

    /// Identity assigned at logon.
    pub fn identity(&self) -> Option<Identity> {
        self.auth.identity()
    }

    /// Roster view.
    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    /// Joined rooms.
    pub fn chats(&self) -> &ChatTracker {
        &self.chats
    }

    /// Frame pump.
    pub fn pump(&self) -> &FramePump {
        &self.pump
    }

    /// Keepalive timer.
    pub fn timer(&self) -> &IntervalTimer<E::Instant> {
        &self.timer
    }

    /// Protocol session.
    pub fn protocol(&self) -> &P {
        &self.protocol
    }

    /// Credential store.
    pub fn store(&self) -> &C {
        &self.store
    }

    /// Whether the host is watching the socket.
    pub fn is_watching(&self) -> bool {
        self.watching
    }

    /// Whether a socket is held.
    pub fn has_socket(&self) -> bool {
        self.socket.is_some()
    }

    /// Whether the session has ended.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Process an event and return the resulting actions.
    ///
    /// Fatal faults are not returned: the session tears down and reports them
    /// through [`SessionAction::ConnectionError`] followed by
    /// [`SessionAction::Closed`].
    ///
    /// # Errors
    ///
    /// - `SessionError::Closed` once the session has ended
    /// - non-fatal errors for commands that do not apply right now
    pub fn handle(
        &mut self,
        event: SessionEvent<S, E::Instant>,
    ) -> Result<Vec<SessionAction>, SessionError> {
        if self.closed {
            return Err(SessionError::Closed);
        }

        let mut actions = Vec::new();
        match self.dispatch(event, &mut actions) {
            Ok(()) => Ok(actions),
            Err(err) if err.is_fatal() => {
                tracing::error!(error = %err, "session failed");
                self.fail(err.reason(), err.to_string(), &mut actions);
                Ok(actions)
            },
            Err(err) => {
                tracing::debug!(error = %err, "event rejected");
                Err(err)
            },
        }
    }

    fn dispatch(
        &mut self,
        event: SessionEvent<S, E::Instant>,
        actions: &mut Vec<SessionAction>,
    ) -> Result<(), SessionError> {
        match event {
            SessionEvent::LogIn(credentials) => self.handle_log_in(credentials, actions)?,
            SessionEvent::Connected(socket) => self.handle_connected(socket, actions)?,
            SessionEvent::ConnectFailed { reason } => return Err(SessionError::Connect(reason)),
            SessionEvent::Readable => self.handle_readable(actions)?,
            SessionEvent::Writable => {},
            SessionEvent::Tick { now } => self.handle_tick(now),
            SessionEvent::Command(command) => self.handle_command(command, actions)?,
        }

        if !self.closed {
            self.drain(actions)?;
        }
        Ok(())
    }

    fn handle_log_in(
        &mut self,
        credentials: Credentials,
        actions: &mut Vec<SessionAction>,
    ) -> Result<(), SessionError> {
        let auth_actions = self.auth.begin(credentials).map_err(SessionError::Command)?;
        self.run_auth(auth_actions, actions)
    }

    fn handle_connected(
        &mut self,
        socket: S,
        actions: &mut Vec<SessionAction>,
    ) -> Result<(), SessionError> {
        // Dropping `socket` on rejection closes it.
        self.auth.transport_connected().map_err(SessionError::Command)?;

        let first_len = self.protocol.connected();
        self.socket = Some(socket);
        self.pump.start(first_len)?;
        self.watching = true;
        actions.push(SessionAction::WatchSocket);
        tracing::info!("transport connected");
        Ok(())
    }

    fn handle_readable(&mut self, actions: &mut Vec<SessionAction>) -> Result<(), SessionError> {
        let Some(socket) = self.socket.as_mut() else {
            tracing::debug!("readable without a socket");
            return Ok(());
        };

        if self.pump.on_readable(socket, &mut self.protocol)? == ReadProgress::Closed {
            tracing::info!("logged off");
            self.close(actions);
        }
        Ok(())
    }

    fn handle_tick(&mut self, now: E::Instant) {
        if !self.timer.poll(now) {
            return;
        }
        if let Err(err) = self.protocol.heartbeat() {
            tracing::warn!(error = %err, "keepalive failed");
        }
    }

    fn handle_command(
        &mut self,
        command: HostCommand,
        actions: &mut Vec<SessionAction>,
    ) -> Result<(), SessionError> {
        match command {
            HostCommand::StepUpCode(code) => {
                let auth_actions = self.auth.supply_step_up(code).map_err(SessionError::Command)?;
                self.run_auth(auth_actions, actions)?;
            },
            HostCommand::StepUpCancelled => {
                let auth_actions = self.auth.cancel_step_up().map_err(SessionError::Command)?;
                self.run_auth(auth_actions, actions)?;
            },
            HostCommand::SetStatus(primitive) => {
                self.logged_on()?;
                self.protocol.set_presence(PresenceState::from_primitive(primitive))?;
            },
            HostCommand::SendPrivateMessage { to, text } => {
                self.logged_on()?;
                self.protocol.send_private_message(to, &text)?;
            },
            HostCommand::SendTyping { to, state } => {
                self.logged_on()?;
                if state == TypingState::Typing {
                    self.protocol.send_typing(to)?;
                }
            },
            HostCommand::SendChatMessage { room, text } => {
                let me = self.logged_on()?;
                let echo = self.chats.message_sent(room, me, &text)?;
                self.protocol.send_chat_message(room, &text)?;
                self.forward_chat(echo, actions)?;
            },
            HostCommand::JoinRoom(room) => {
                self.logged_on()?;
                self.protocol.join_room(room)?;
            },
            HostCommand::JoinRoomByName(input) => {
                let room = input
                    .parse::<Identity>()
                    .map_err(|_| SessionError::InvalidIdentity { input: input.clone() })?;
                self.logged_on()?;
                self.protocol.join_room(room)?;
            },
            HostCommand::LeaveRoom(room) => {
                self.logged_on()?;
                let chat_actions = self.chats.leave_room(room)?;
                self.forward_chat(chat_actions, actions)?;
            },
            HostCommand::LogOff => {
                if self.auth.is_logged_on() && self.socket.is_some() {
                    tracing::info!("logging off");
                    self.protocol.log_off()?;
                    self.pump.expect_close();
                } else {
                    self.close(actions);
                }
            },
            HostCommand::Close => self.close(actions),
        }
        Ok(())
    }

    fn logged_on(&self) -> Result<Identity, SessionError> {
        match self.auth.identity() {
            Some(identity) if self.auth.is_logged_on() => Ok(identity),
            _ => Err(SessionError::NotLoggedOn),
        }
    }

    /// Process protocol outputs until none are left, then flush.
    ///
    /// Outputs produced after the transport was closed belong to a dead
    /// connection and are discarded.
    fn drain(&mut self, actions: &mut Vec<SessionAction>) -> Result<(), SessionError> {
        loop {
            let outputs = self.protocol.take_outputs();
            if outputs.is_empty() {
                break;
            }
            for output in outputs {
                if self.socket.is_none() {
                    tracing::debug!(?output, "discarding output without transport");
                    continue;
                }
                self.on_output(output, actions)?;
            }
        }
        self.flush(actions)
    }

    fn on_output(
        &mut self,
        output: ProtocolOutput,
        actions: &mut Vec<SessionAction>,
    ) -> Result<(), SessionError> {
        match output {
            ProtocolOutput::Send(frame) => self.pump.queue(frame),
            ProtocolOutput::ScheduleKeepalive(interval) => {
                self.timer.schedule(interval, self.env.now());
                if self.timer.is_armed() {
                    actions.push(SessionAction::ArmTimer { interval });
                }
            },
            ProtocolOutput::Event(event) => self.on_event(event, actions)?,
        }
        Ok(())
    }

    fn on_event(
        &mut self,
        event: ProtocolEvent,
        actions: &mut Vec<SessionAction>,
    ) -> Result<(), SessionError> {
        match event {
            ProtocolEvent::HandshakeReady => {
                let sentry = self
                    .auth
                    .pending()
                    .and_then(|pending| self.store.sentry_token(pending.account()));
                let auth_actions =
                    self.auth.handshake_ready(sentry).map_err(SessionError::OutOfSequence)?;
                self.run_auth(auth_actions, actions)?;
            },
            ProtocolEvent::LogOnResult { code, identity } => {
                let auth_actions =
                    self.auth.logon_result(code, identity).map_err(SessionError::OutOfSequence)?;
                self.run_auth(auth_actions, actions)?;
            },
            ProtocolEvent::SentryUpdated(token) => {
                let auth_actions =
                    self.auth.sentry_updated(token).map_err(SessionError::OutOfSequence)?;
                self.run_auth(auth_actions, actions)?;
            },
            ProtocolEvent::UserInfo(info) => {
                if let Some(source) = info.source
                    && source.is_chat()
                {
                    let chat_actions = self.chats.user_seen_in_room(source, info.user);
                    self.forward_chat(chat_actions, actions)?;
                }
                let roster_actions = self.roster.apply_user_info(&info, self.auth.identity());
                self.forward_roster(roster_actions, actions)?;
            },
            ProtocolEvent::Relationships(snapshot) => {
                let roster_actions = self.roster.apply_relationships(&snapshot)?;
                self.forward_roster(roster_actions, actions)?;
            },
            ProtocolEvent::RoomEntered(entry) => {
                let chat_actions = self.chats.room_entered(&entry);
                self.forward_chat(chat_actions, actions)?;
            },
            ProtocolEvent::MembershipChanged(change) => {
                let chat_actions = self.chats.membership_changed(&change, self.auth.identity())?;
                self.forward_chat(chat_actions, actions)?;
            },
            ProtocolEvent::ChatMessage { room, sender, text } => {
                let chat_actions = self.chats.chat_message(room, sender, &text);
                self.forward_chat(chat_actions, actions)?;
            },
            ProtocolEvent::PrivateMessage { sender, text } => {
                actions.push(SessionAction::PrivateMessage { sender, text });
            },
            ProtocolEvent::Typing { sender } => {
                actions.push(SessionAction::Typing { sender, timeout: self.config.typing_timeout });
            },
            ProtocolEvent::LoggedOff { code } => {
                if self.pump.is_closing() {
                    tracing::debug!(code, "log-off acknowledged");
                } else {
                    return Err(SessionError::LoggedOff { code });
                }
            },
        }
        Ok(())
    }

    fn run_auth(
        &mut self,
        auth_actions: Vec<AuthAction>,
        actions: &mut Vec<SessionAction>,
    ) -> Result<(), SessionError> {
        for action in auth_actions {
            match action {
                AuthAction::Connect => {
                    let index = self
                        .env
                        .random_index(self.config.endpoints.len())
                        .ok_or(SessionError::NoEndpoints)?;
                    let endpoint = self.config.endpoints[index].clone();
                    tracing::info!(%endpoint, "connecting");
                    actions.push(SessionAction::Connect(endpoint));
                },
                AuthAction::LogOn(request) => self.protocol.log_on(&request)?,
                AuthAction::SetPresence(state) => self.protocol.set_presence(state)?,
                AuthAction::LoggedOn { identity, display_name } => {
                    actions.push(SessionAction::LoggedOn { identity, display_name });
                },
                AuthAction::CloseTransport => self.teardown(actions),
                AuthAction::PromptStepUp { account } => {
                    actions.push(SessionAction::PromptStepUp { account });
                },
                AuthAction::PersistSentry { account, token } => {
                    self.store.set_sentry_token(&account, token);
                },
                AuthAction::Fail(failure) => return Err(SessionError::LogOnFailed(failure)),
            }
        }
        Ok(())
    }

    fn forward_roster(
        &mut self,
        roster_actions: Vec<RosterAction>,
        actions: &mut Vec<SessionAction>,
    ) -> Result<(), SessionError> {
        for action in roster_actions {
            match action {
                RosterAction::RequestUserInfo(users) => self.protocol.request_user_info(&users)?,
                other => actions.push(SessionAction::Roster(other)),
            }
        }
        Ok(())
    }

    fn forward_chat(
        &mut self,
        chat_actions: Vec<ChatAction>,
        actions: &mut Vec<SessionAction>,
    ) -> Result<(), SessionError> {
        for action in chat_actions {
            match action {
                ChatAction::SendLeaveRoom(room) => self.protocol.leave_room(room)?,
                other => actions.push(SessionAction::Chat(other)),
            }
        }
        Ok(())
    }

    fn flush(&mut self, actions: &mut Vec<SessionAction>) -> Result<(), SessionError> {
        let Some(socket) = self.socket.as_mut() else {
            return Ok(());
        };
        match self.pump.flush(socket)? {
            FlushProgress::Flushed => {},
            FlushProgress::Pending { queued } => {
                tracing::debug!(queued, "socket full, waiting for writability");
                actions.push(SessionAction::WatchWritable);
            },
        }
        Ok(())
    }

    fn teardown(&mut self, actions: &mut Vec<SessionAction>) {
        if self.watching {
            self.watching = false;
            actions.push(SessionAction::UnwatchSocket);
        }
        if self.timer.is_armed() {
            self.timer.cancel();
            actions.push(SessionAction::CancelTimer);
        }
        if self.socket.take().is_some() {
            tracing::debug!("transport closed");
        }
        self.pump.reset();
    }

    fn close(&mut self, actions: &mut Vec<SessionAction>) {
        self.teardown(actions);
        self.auth.transport_lost();
        self.chats.clear();
        self.closed = true;
        actions.push(SessionAction::Closed);
    }

    fn fail(&mut self, reason: ErrorReason, message: String, actions: &mut Vec<SessionAction>) {
        self.teardown(actions);
        self.auth.transport_lost();
        self.chats.clear();
        self.closed = true;
        actions.push(SessionAction::ConnectionError { reason, message });
        actions.push(SessionAction::Closed);
    }
}
