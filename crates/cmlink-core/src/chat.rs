//! Chat room membership tracking.
//!
//! Every joined room carries an auxiliary alias group named after the room's
//! decimal identity. The group holds one record per user seen in the room so
//! the host can scope display aliases to that room. The group exists exactly
//! as long as the room is tracked locally.
//!
//! Hosts refuse to remove a group that still has records, so every teardown
//! path removes the records one by one before the group itself. The
//! [`AliasGroup`] type enforces that order: it can only be turned into a
//! removal once empty.

use std::{
    collections::{BTreeMap, BTreeSet, btree_map::Entry},
    fmt,
};

use crate::{
    error::ChatError,
    identity::Identity,
    protocol::{MembershipChange, RoomEntry},
};

/// Room-enter response code for a successful join.
pub const ENTER_SUCCESS: u32 = 1;

/// Why a room join was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoomEntryFailureReason {
    /// Room does not exist.
    DoesntExist,
    /// Not allowed to join.
    NotAllowed,
    /// Room is full.
    Full,
    /// Generic backend error.
    Error,
    /// Banned from the room.
    Banned,
    /// Limited account.
    Limited,
    /// Group chat is disabled for the clan.
    ClanDisabled,
    /// Community ban.
    CommunityBan,
    /// A member blocked us.
    MemberBlockedYou,
    /// We blocked a member.
    YouBlockedMember,
    /// Unrecognized response code.
    Unknown(u32),
}

impl RoomEntryFailureReason {
    /// Decode a failed room-enter response code.
    pub fn from_code(code: u32) -> Self {
        match code {
            2 => Self::DoesntExist,
            3 => Self::NotAllowed,
            4 => Self::Full,
            5 => Self::Error,
            6 => Self::Banned,
            7 => Self::Limited,
            8 => Self::ClanDisabled,
            9 => Self::CommunityBan,
            10 => Self::MemberBlockedYou,
            11 => Self::YouBlockedMember,
            other => Self::Unknown(other),
        }
    }
}

impl fmt::Display for RoomEntryFailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DoesntExist => f.write_str("room does not exist"),
            Self::NotAllowed => f.write_str("not allowed to join"),
            Self::Full => f.write_str("room is full"),
            Self::Error => f.write_str("backend error"),
            Self::Banned => f.write_str("banned from room"),
            Self::Limited => f.write_str("account is limited"),
            Self::ClanDisabled => f.write_str("group chat is disabled"),
            Self::CommunityBan => f.write_str("community banned"),
            Self::MemberBlockedYou => f.write_str("a member has blocked you"),
            Self::YouBlockedMember => f.write_str("you have blocked a member"),
            Self::Unknown(code) => write!(f, "unknown response {code}"),
        }
    }
}

/// Kind of membership change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemberChange {
    /// Joined the room.
    Entered,
    /// Left voluntarily.
    Left,
    /// Lost connection.
    Disconnected,
    /// Kicked by a moderator.
    Kicked,
    /// Banned by a moderator.
    Banned,
    /// Unrecognized change bits.
    Other(u32),
}

impl MemberChange {
    /// Decode backend change bits.
    pub fn from_code(code: u32) -> Self {
        match code {
            0x01 => Self::Entered,
            0x02 => Self::Left,
            0x04 => Self::Disconnected,
            0x08 => Self::Kicked,
            0x10 => Self::Banned,
            other => Self::Other(other),
        }
    }
}

/// Per-room container of alias records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AliasGroup {
    name: String,
    records: BTreeSet<Identity>,
}

impl AliasGroup {
    /// Empty group for `room`.
    pub fn new(room: Identity) -> Self {
        Self { name: room.to_string(), records: BTreeSet::new() }
    }

    /// Group name (the room's decimal identity).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether `who` has a record.
    pub fn contains(&self, who: Identity) -> bool {
        self.records.contains(&who)
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the group holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records in identity order.
    pub fn records(&self) -> impl Iterator<Item = Identity> + '_ {
        self.records.iter().copied()
    }

    fn insert(&mut self, who: Identity) -> bool {
        self.records.insert(who)
    }

    fn remove(&mut self, who: Identity) -> bool {
        self.records.remove(&who)
    }

    /// Consume the group for removal, returning its name.
    ///
    /// # Errors
    ///
    /// - `ChatError::GroupNotEmpty` if records remain
    pub fn into_removal(self) -> Result<String, ChatError> {
        if !self.records.is_empty() {
            return Err(ChatError::GroupNotEmpty { group: self.name, remaining: self.records.len() });
        }
        Ok(self.name)
    }
}

/// A joined chat room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatRoom {
    id: Identity,
    name: String,
    members: BTreeSet<Identity>,
    aliases: AliasGroup,
}

impl ChatRoom {
    fn new(id: Identity, name: String) -> Self {
        Self { id, name, members: BTreeSet::new(), aliases: AliasGroup::new(id) }
    }

    /// Room identity.
    pub fn id(&self) -> Identity {
        self.id
    }

    /// Display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current members.
    pub fn members(&self) -> &BTreeSet<Identity> {
        &self.members
    }

    /// The room's alias group.
    pub fn aliases(&self) -> &AliasGroup {
        &self.aliases
    }
}

/// Chat operations for the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatAction {
    /// Create an alias group.
    AddGroup {
        /// Group name
        group: String,
    },
    /// Remove an empty alias group.
    RemoveGroup {
        /// Group name
        group: String,
    },
    /// Add an alias record to a group.
    AddAliasRecord {
        /// Group name
        group: String,
        /// User the record is for
        who: Identity,
    },
    /// Remove an alias record from a group.
    RemoveAliasRecord {
        /// Group name
        group: String,
        /// User the record is for
        who: Identity,
    },
    /// Open the room's conversation.
    JoinedRoom {
        /// Room
        room: Identity,
        /// Display name
        name: String,
    },
    /// A join was refused.
    RoomEntryFailed {
        /// Room
        room: Identity,
        /// Why
        reason: RoomEntryFailureReason,
    },
    /// Add a user to the room's member list.
    AddMember {
        /// Room
        room: Identity,
        /// User
        who: Identity,
        /// Show a join notice
        announce: bool,
    },
    /// Remove a user from the room's member list.
    RemoveMember {
        /// Room
        room: Identity,
        /// User
        who: Identity,
    },
    /// We are no longer in the room.
    LeftRoom {
        /// Room
        room: Identity,
        /// How we left
        change: MemberChange,
    },
    /// Tell the backend we leave the room.
    SendLeaveRoom(Identity),
    /// Show a room message.
    DeliverChatMessage {
        /// Room
        room: Identity,
        /// Author
        sender: Identity,
        /// Text
        text: String,
        /// Sent by the local user
        outgoing: bool,
    },
}

/// Joined rooms and their alias groups.
#[derive(Debug, Clone, Default)]
pub struct ChatTracker {
    rooms: BTreeMap<Identity, ChatRoom>,
}

impl ChatTracker {
    /// Tracker with no rooms.
    pub fn new() -> Self {
        Self::default()
    }

    /// Room by identity.
    #[must_use]
    pub fn room(&self, room: Identity) -> Option<&ChatRoom> {
        self.rooms.get(&room)
    }

    /// All joined rooms in identity order.
    pub fn rooms(&self) -> impl Iterator<Item = &ChatRoom> {
        self.rooms.values()
    }

    /// Whether `room` is joined.
    #[must_use]
    pub fn contains(&self, room: Identity) -> bool {
        self.rooms.contains_key(&room)
    }

    /// Handle the answer to a join.
    ///
    /// Entering a room that is already tracked merges the member list.
    pub fn room_entered(&mut self, entry: &RoomEntry) -> Vec<ChatAction> {
        let room_id = entry.room;
        let mut actions = Vec::new();

        if entry.response != ENTER_SUCCESS {
            let reason = RoomEntryFailureReason::from_code(entry.response);
            tracing::warn!(room = %room_id, %reason, "room entry refused");
            actions.push(ChatAction::RoomEntryFailed { room: room_id, reason });
            return actions;
        }

        let room = match self.rooms.entry(room_id) {
            Entry::Occupied(occupied) => {
                tracing::debug!(room = %room_id, "room re-entered, merging members");
                let room = occupied.into_mut();
                room.name.clone_from(&entry.name);
                room
            },
            Entry::Vacant(vacant) => {
                tracing::info!(room = %room_id, name = %entry.name, "joined room");
                let room = vacant.insert(ChatRoom::new(room_id, entry.name.clone()));
                actions.push(ChatAction::AddGroup { group: room.aliases.name.clone() });
                actions.push(ChatAction::JoinedRoom { room: room_id, name: entry.name.clone() });
                room
            },
        };

        for &who in &entry.members {
            if room.members.insert(who) {
                actions.push(ChatAction::AddMember { room: room_id, who, announce: false });
            }
            if room.aliases.insert(who) {
                actions
                    .push(ChatAction::AddAliasRecord { group: room.aliases.name.clone(), who });
            }
        }

        actions
    }

    /// Handle a membership change.
    ///
    /// # Errors
    ///
    /// - `ChatError::GroupNotEmpty` if the alias group survives record removal
    pub fn membership_changed(
        &mut self,
        change: &MembershipChange,
        self_identity: Option<Identity>,
    ) -> Result<Vec<ChatAction>, ChatError> {
        let room_id = change.room;
        let subject = change.subject;
        let kind = MemberChange::from_code(change.change);
        let mut actions = Vec::new();

        let Some(room) = self.rooms.get_mut(&room_id) else {
            tracing::warn!(room = %room_id, ?kind, "membership change for unknown room");
            return Ok(actions);
        };

        if kind == MemberChange::Entered {
            if room.members.insert(subject) {
                actions.push(ChatAction::AddMember { room: room_id, who: subject, announce: true });
            }
            if room.aliases.insert(subject) {
                actions.push(ChatAction::AddAliasRecord {
                    group: room.aliases.name.clone(),
                    who: subject,
                });
            }
            return Ok(actions);
        }

        if self_identity == Some(subject) {
            tracing::info!(room = %room_id, ?kind, actor = %change.actor, "removed from room");
            actions.push(ChatAction::LeftRoom { room: room_id, change: kind });
            if let Some(room) = self.rooms.remove(&room_id) {
                dismantle(room, &mut actions)?;
            }
            return Ok(actions);
        }

        if room.members.remove(&subject) {
            actions.push(ChatAction::RemoveMember { room: room_id, who: subject });
        }
        if room.aliases.remove(subject) {
            actions
                .push(ChatAction::RemoveAliasRecord { group: room.aliases.name.clone(), who: subject });
        }
        Ok(actions)
    }

    /// A profile update for `who` was observed in `room`; make sure the room's
    /// alias group has a record for them. Unknown rooms are ignored.
    pub fn user_seen_in_room(&mut self, room: Identity, who: Identity) -> Vec<ChatAction> {
        let Some(tracked) = self.rooms.get_mut(&room) else {
            tracing::debug!(%room, %who, "user seen in unknown room");
            return Vec::new();
        };
        if !tracked.aliases.insert(who) {
            return Vec::new();
        }
        vec![ChatAction::AddAliasRecord { group: tracked.aliases.name.clone(), who }]
    }

    /// Leave a room at the local user's request.
    ///
    /// # Errors
    ///
    /// - `ChatError::UnknownRoom` if the room is not joined
    pub fn leave_room(&mut self, room: Identity) -> Result<Vec<ChatAction>, ChatError> {
        let tracked = self.rooms.remove(&room).ok_or(ChatError::UnknownRoom(room))?;
        tracing::info!(%room, "leaving room");

        let mut actions = vec![ChatAction::SendLeaveRoom(room)];
        dismantle(tracked, &mut actions)?;
        Ok(actions)
    }

    /// Deliver a message posted to a room. Messages for unknown rooms are
    /// dropped.
    pub fn chat_message(&self, room: Identity, sender: Identity, text: &str) -> Vec<ChatAction> {
        if !self.contains(room) {
            tracing::warn!(%room, %sender, "dropping message for unknown room");
            return Vec::new();
        }
        vec![ChatAction::DeliverChatMessage {
            room,
            sender,
            text: text.to_owned(),
            outgoing: false,
        }]
    }

    /// Echo a message the local user posted; the backend does not.
    ///
    /// # Errors
    ///
    /// - `ChatError::UnknownRoom` if the room is not joined
    pub fn message_sent(
        &self,
        room: Identity,
        sender: Identity,
        text: &str,
    ) -> Result<Vec<ChatAction>, ChatError> {
        if !self.contains(room) {
            return Err(ChatError::UnknownRoom(room));
        }
        Ok(vec![ChatAction::DeliverChatMessage {
            room,
            sender,
            text: text.to_owned(),
            outgoing: true,
        }])
    }

    /// Forget every room without emitting host operations.
    pub fn clear(&mut self) {
        self.rooms.clear();
    }
}

/// Remove every alias record, then the emptied group.
fn dismantle(mut room: ChatRoom, actions: &mut Vec<ChatAction>) -> Result<(), ChatError> {
    let records: Vec<_> = room.aliases.records().collect();
    for who in records {
        room.aliases.remove(who);
        actions.push(ChatAction::RemoveAliasRecord { group: room.aliases.name.clone(), who });
    }
    let group = room.aliases.into_removal()?;
    actions.push(ChatAction::RemoveGroup { group });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::AccountKind;

    fn user(n: u32) -> Identity {
        Identity::from_parts(1, AccountKind::Individual, 1, n)
    }

    fn room() -> Identity {
        Identity::from_parts(1, AccountKind::Chat, 0x80000, 42)
    }

    fn entered(members: &[Identity]) -> RoomEntry {
        RoomEntry {
            room: room(),
            response: ENTER_SUCCESS,
            name: "Lobby".to_string(),
            members: members.to_vec(),
        }
    }

    fn change(subject: Identity, bits: u32) -> MembershipChange {
        MembershipChange { room: room(), actor: user(100), subject, change: bits }
    }

    #[test]
    fn entry_creates_room_group_and_members() {
        let (a, b, c) = (user(1), user(2), user(3));
        let mut chats = ChatTracker::new();
        let group = room().to_string();

        let actions = chats.room_entered(&entered(&[a, b, c, a]));

        assert_eq!(&actions[..2], &[
            ChatAction::AddGroup { group: group.clone() },
            ChatAction::JoinedRoom { room: room(), name: "Lobby".to_string() },
        ]);
        assert_eq!(actions.len(), 2 + 3 * 2);

        let tracked = chats.room(room()).unwrap();
        assert_eq!(tracked.members().iter().copied().collect::<Vec<_>>(), vec![a, b, c]);
        assert_eq!(tracked.aliases().len(), 3);
        assert_eq!(tracked.aliases().name(), group);
    }

    #[test]
    fn re_entry_merges_without_second_group() {
        let mut chats = ChatTracker::new();
        chats.room_entered(&entered(&[user(1)]));

        let actions = chats.room_entered(&entered(&[user(1), user(2)]));

        assert!(!actions.iter().any(|a| matches!(a, ChatAction::AddGroup { .. })));
        assert_eq!(chats.room(room()).unwrap().members().len(), 2);
    }

    #[test]
    fn refused_entry_tracks_nothing() {
        let mut chats = ChatTracker::new();
        let entry = RoomEntry { response: 4, ..entered(&[user(1)]) };

        assert_eq!(chats.room_entered(&entry), vec![ChatAction::RoomEntryFailed {
            room: room(),
            reason: RoomEntryFailureReason::Full,
        }]);
        assert!(!chats.contains(room()));
    }

    #[test]
    fn entered_adds_member_with_notice() {
        let mut chats = ChatTracker::new();
        chats.room_entered(&entered(&[user(1), user(2), user(3)]));

        let actions = chats.membership_changed(&change(user(4), 0x01), Some(user(1))).unwrap();

        assert_eq!(actions, vec![
            ChatAction::AddMember { room: room(), who: user(4), announce: true },
            ChatAction::AddAliasRecord { group: room().to_string(), who: user(4) },
        ]);
        assert_eq!(chats.room(room()).unwrap().members().len(), 4);
    }

    #[test]
    fn other_member_leaving_is_removed() {
        let mut chats = ChatTracker::new();
        chats.room_entered(&entered(&[user(1), user(2)]));

        let actions = chats.membership_changed(&change(user(2), 0x04), Some(user(1))).unwrap();

        assert_eq!(actions, vec![
            ChatAction::RemoveMember { room: room(), who: user(2) },
            ChatAction::RemoveAliasRecord { group: room().to_string(), who: user(2) },
        ]);
    }

    #[test]
    fn kicked_self_leaves_without_member_removals() {
        let me = user(1);
        let mut chats = ChatTracker::new();
        chats.room_entered(&entered(&[me, user(2)]));

        let actions = chats.membership_changed(&change(me, 0x08), Some(me)).unwrap();

        assert_eq!(actions[0], ChatAction::LeftRoom { room: room(), change: MemberChange::Kicked });
        assert!(!actions.iter().any(|a| matches!(a, ChatAction::RemoveMember { .. })));
        assert_eq!(actions.last(), Some(&ChatAction::RemoveGroup { group: room().to_string() }));
        assert!(!chats.contains(room()));
    }

    #[test]
    fn leaving_removes_records_before_group() {
        let (a, b) = (user(1), user(2));
        let group = room().to_string();
        let mut chats = ChatTracker::new();
        chats.room_entered(&entered(&[a, b]));

        assert_eq!(chats.leave_room(room()).unwrap(), vec![
            ChatAction::SendLeaveRoom(room()),
            ChatAction::RemoveAliasRecord { group: group.clone(), who: a },
            ChatAction::RemoveAliasRecord { group: group.clone(), who: b },
            ChatAction::RemoveGroup { group },
        ]);
        assert_eq!(chats.leave_room(room()), Err(ChatError::UnknownRoom(room())));
    }

    #[test]
    fn non_empty_group_refuses_removal() {
        let mut group = AliasGroup::new(room());
        group.insert(user(1));

        assert_eq!(
            group.into_removal(),
            Err(ChatError::GroupNotEmpty { group: room().to_string(), remaining: 1 })
        );
    }

    #[test]
    fn user_seen_only_in_known_rooms() {
        let mut chats = ChatTracker::new();
        assert!(chats.user_seen_in_room(room(), user(5)).is_empty());

        chats.room_entered(&entered(&[user(1)]));
        assert_eq!(chats.user_seen_in_room(room(), user(5)), vec![ChatAction::AddAliasRecord {
            group: room().to_string(),
            who: user(5),
        }]);
        assert!(chats.user_seen_in_room(room(), user(5)).is_empty());
    }

    #[test]
    fn changes_for_unknown_rooms_are_ignored() {
        let mut chats = ChatTracker::new();
        assert!(chats.membership_changed(&change(user(1), 0x02), None).unwrap().is_empty());
    }

    #[test]
    fn outgoing_messages_are_echoed() {
        let mut chats = ChatTracker::new();
        assert_eq!(chats.message_sent(room(), user(1), "hi"), Err(ChatError::UnknownRoom(room())));

        chats.room_entered(&entered(&[user(1)]));
        assert_eq!(chats.message_sent(room(), user(1), "hi").unwrap(), vec![
            ChatAction::DeliverChatMessage {
                room: room(),
                sender: user(1),
                text: "hi".to_string(),
                outgoing: true,
            }
        ]);
    }
}
