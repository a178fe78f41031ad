//! In-memory host model.
//!
//! `RecordingHost` applies [`SessionAction`]s the way a messaging client's
//! roster and conversation windows would, and records everything it saw.
//! Actions that a real host would reject (removing a group that still has
//! records, a member change for a room it never opened) are kept as
//! complaints so tests can assert there are none.

use std::collections::{BTreeMap, BTreeSet};

use cmlink_client::{ChatAction, ErrorReason, Identity, RosterAction, SessionAction};
use cmlink_core::{StatusPrimitive, chat::MemberChange, roster::Relationship};

/// Open room conversation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoomView {
    /// Display name
    pub name: String,
    /// Member list
    pub members: BTreeSet<Identity>,
    /// Messages as `(sender, text, outgoing)`
    pub messages: Vec<(Identity, String, bool)>,
}

/// Host model built from session actions.
#[derive(Debug, Clone, Default)]
pub struct RecordingHost {
    /// Every action applied, in order
    pub actions: Vec<SessionAction>,
    /// Roster buddies
    pub buddies: BTreeSet<Identity>,
    /// Buddy aliases
    pub aliases: BTreeMap<Identity, String>,
    /// Buddy statuses
    pub statuses: BTreeMap<Identity, StatusPrimitive>,
    /// Pending friend-request notices
    pub notices: Vec<(Identity, Relationship)>,
    /// Alias of the local account
    pub account_alias: Option<String>,
    /// Alias groups and their records
    pub groups: BTreeMap<String, BTreeSet<Identity>>,
    /// Open room conversations
    pub rooms: BTreeMap<Identity, RoomView>,
    /// Rooms left, with how
    pub left: Vec<(Identity, MemberChange)>,
    /// Rooms that refused entry
    pub entry_failures: Vec<Identity>,
    /// Direct messages received
    pub private_messages: Vec<(Identity, String)>,
    /// Users shown as typing
    pub typing: Vec<Identity>,
    /// Step-up prompts shown
    pub prompts: Vec<String>,
    /// Logon notifications
    pub logged_on: Option<Identity>,
    /// Connection errors shown
    pub errors: Vec<(ErrorReason, String)>,
    /// Whether the session reported the close
    pub closed: bool,
    /// Actions a real host would have rejected
    pub complaints: Vec<String>,
}

impl RecordingHost {
    /// Empty host.
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a batch of actions in order.
    pub fn apply_all(&mut self, actions: impl IntoIterator<Item = SessionAction>) {
        for action in actions {
            self.apply(action);
        }
    }

    /// Apply one action.
    pub fn apply(&mut self, action: SessionAction) {
        if self.closed {
            self.complaints.push(format!("{action:?} after close"));
        }
        match &action {
            SessionAction::LoggedOn { identity, .. } => self.logged_on = Some(*identity),
            SessionAction::PromptStepUp { account } => self.prompts.push(account.clone()),
            SessionAction::Roster(roster) => self.apply_roster(roster.clone()),
            SessionAction::Chat(chat) => self.apply_chat(chat.clone()),
            SessionAction::PrivateMessage { sender, text } => {
                self.private_messages.push((*sender, text.clone()));
            },
            SessionAction::Typing { sender, .. } => self.typing.push(*sender),
            SessionAction::ConnectionError { reason, message } => {
                self.errors.push((*reason, message.clone()));
            },
            SessionAction::Closed => self.closed = true,
            SessionAction::Connect(_)
            | SessionAction::WatchSocket
            | SessionAction::UnwatchSocket
            | SessionAction::WatchWritable
            | SessionAction::ArmTimer { .. }
            | SessionAction::CancelTimer => {},
        }
        self.actions.push(action);
    }

    fn apply_roster(&mut self, action: RosterAction) {
        match action {
            RosterAction::AddBuddy(who) => {
                if !self.buddies.insert(who) {
                    self.complaints.push(format!("buddy {who} added twice"));
                }
            },
            RosterAction::RemoveBuddy(who) => {
                if !self.buddies.remove(&who) {
                    self.complaints.push(format!("unknown buddy {who} removed"));
                }
                self.aliases.remove(&who);
                self.statuses.remove(&who);
            },
            RosterAction::RequestUserInfo(_) => {
                self.complaints.push("user-info request leaked to the host".to_string());
            },
            RosterAction::RelationshipNotice { who, relationship } => {
                self.notices.push((who, relationship));
            },
            RosterAction::SetAlias { who, name } => {
                self.aliases.insert(who, name);
            },
            RosterAction::SetAccountAlias(name) => self.account_alias = Some(name),
            RosterAction::SetStatus { who, status, .. } => {
                self.statuses.insert(who, status);
            },
        }
    }

    fn apply_chat(&mut self, action: ChatAction) {
        match action {
            ChatAction::AddGroup { group } => {
                if self.groups.insert(group.clone(), BTreeSet::new()).is_some() {
                    self.complaints.push(format!("group {group} added twice"));
                }
            },
            ChatAction::RemoveGroup { group } => match self.groups.remove(&group) {
                Some(records) if !records.is_empty() => {
                    self.complaints.push(format!("group {group} removed with {} records", records.len()));
                },
                Some(_) => {},
                None => self.complaints.push(format!("unknown group {group} removed")),
            },
            ChatAction::AddAliasRecord { group, who } => match self.groups.get_mut(&group) {
                Some(records) => {
                    records.insert(who);
                },
                None => self.complaints.push(format!("record for {who} in unknown group {group}")),
            },
            ChatAction::RemoveAliasRecord { group, who } => {
                let removed = self.groups.get_mut(&group).is_some_and(|records| records.remove(&who));
                if !removed {
                    self.complaints.push(format!("unknown record {who} removed from {group}"));
                }
            },
            ChatAction::JoinedRoom { room, name } => {
                self.rooms.insert(room, RoomView { name, ..RoomView::default() });
            },
            ChatAction::RoomEntryFailed { room, .. } => self.entry_failures.push(room),
            ChatAction::AddMember { room, who, .. } => match self.rooms.get_mut(&room) {
                Some(view) => {
                    view.members.insert(who);
                },
                None => self.complaints.push(format!("member {who} added to closed room {room}")),
            },
            ChatAction::RemoveMember { room, who } => match self.rooms.get_mut(&room) {
                Some(view) => {
                    view.members.remove(&who);
                },
                None => self.complaints.push(format!("member {who} removed from closed room {room}")),
            },
            ChatAction::LeftRoom { room, change } => {
                self.rooms.remove(&room);
                self.left.push((room, change));
            },
            ChatAction::SendLeaveRoom(room) => {
                self.complaints.push(format!("leave request for {room} leaked to the host"));
            },
            ChatAction::DeliverChatMessage { room, sender, text, outgoing } => {
                match self.rooms.get_mut(&room) {
                    Some(view) => view.messages.push((sender, text, outgoing)),
                    None => self.complaints.push(format!("message for closed room {room}")),
                }
            },
        }
    }

    /// Whether any action matches `predicate`.
    pub fn saw(&self, predicate: impl Fn(&SessionAction) -> bool) -> bool {
        self.actions.iter().any(predicate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: u32) -> Identity {
        Identity::from_raw(u64::from(n))
    }

    #[test]
    fn removing_a_populated_group_is_a_complaint() {
        let mut host = RecordingHost::new();
        host.apply_all([
            SessionAction::Chat(ChatAction::AddGroup { group: "7".to_string() }),
            SessionAction::Chat(ChatAction::AddAliasRecord { group: "7".to_string(), who: id(1) }),
            SessionAction::Chat(ChatAction::RemoveGroup { group: "7".to_string() }),
        ]);

        assert_eq!(host.complaints.len(), 1);
    }

    #[test]
    fn actions_after_close_are_complaints() {
        let mut host = RecordingHost::new();
        host.apply(SessionAction::Closed);
        host.apply(SessionAction::WatchSocket);

        assert!(host.closed);
        assert_eq!(host.complaints.len(), 1);
    }
}
