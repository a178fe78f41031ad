//! Relationship and presence reconciliation.
//!
//! The backend sends relationships as batches of parallel `(user, code)`
//! arrays. A full batch replaces the roster; an incremental one is merged by
//! key. The reconciler keeps the local view and returns the roster operations
//! the host must perform to match it.

use std::collections::HashMap;

use crate::{
    error::ReconcileError,
    identity::Identity,
    presence::{PresenceState, StatusPrimitive},
    protocol::{RelationshipSnapshot, UserInfo},
};

/// Relationship between the local user and another user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Relationship {
    /// No relationship; the entry is removed.
    None,
    /// They sent us a friend request.
    RequestReceived,
    /// Mutual friends.
    Friend,
    /// We sent them a friend request.
    RequestSent,
}

impl Relationship {
    /// Decode a backend relationship code. `None` for unrecognized codes.
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(Self::None),
            2 => Some(Self::RequestReceived),
            3 => Some(Self::Friend),
            4 => Some(Self::RequestSent),
            _ => None,
        }
    }

    /// Wire value of this relationship.
    pub fn code(self) -> u32 {
        match self {
            Self::None => 0,
            Self::RequestReceived => 2,
            Self::Friend => 3,
            Self::RequestSent => 4,
        }
    }
}

/// Roster operations for the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RosterAction {
    /// Add a buddy to the roster.
    AddBuddy(Identity),
    /// Remove a buddy from the roster.
    RemoveBuddy(Identity),
    /// Ask the backend for profile updates about these users.
    RequestUserInfo(Vec<Identity>),
    /// A pending friend request changed.
    RelationshipNotice {
        /// The other user
        who: Identity,
        /// Request direction
        relationship: Relationship,
    },
    /// Set the display alias of a user.
    SetAlias {
        /// The user
        who: Identity,
        /// New alias
        name: String,
    },
    /// Set the alias of the local account.
    SetAccountAlias(String),
    /// Set the displayed status of a user.
    SetStatus {
        /// The user
        who: Identity,
        /// Backend state
        state: PresenceState,
        /// Host primitive for `state`
        status: StatusPrimitive,
    },
}

/// Local view of relationships, presence and display names.
#[derive(Debug, Clone, Default)]
pub struct Roster {
    relationships: HashMap<Identity, Relationship>,
    presence: HashMap<Identity, PresenceState>,
    names: HashMap<Identity, String>,
}

impl Roster {
    /// Create an empty roster.
    pub fn new() -> Self {
        Self::default()
    }

    /// Relationship recorded for `who`.
    #[must_use]
    pub fn relationship(&self, who: Identity) -> Option<Relationship> {
        self.relationships.get(&who).copied()
    }

    /// Whether `who` is a friend.
    #[must_use]
    pub fn is_friend(&self, who: Identity) -> bool {
        self.relationship(who) == Some(Relationship::Friend)
    }

    /// Friends, in identity order.
    #[must_use]
    pub fn friends(&self) -> Vec<Identity> {
        let mut friends: Vec<_> = self
            .relationships
            .iter()
            .filter(|(_, rel)| **rel == Relationship::Friend)
            .map(|(who, _)| *who)
            .collect();
        friends.sort_unstable();
        friends
    }

    /// Number of recorded relationships.
    #[must_use]
    pub fn len(&self) -> usize {
        self.relationships.len()
    }

    /// Whether no relationships are recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.relationships.is_empty()
    }

    /// Last presence state seen for `who`.
    #[must_use]
    pub fn presence(&self, who: Identity) -> Option<PresenceState> {
        self.presence.get(&who).copied()
    }

    /// Last display name seen for `who`.
    #[must_use]
    pub fn name(&self, who: Identity) -> Option<&str> {
        self.names.get(&who).map(String::as_str)
    }

    /// Apply a relationship batch.
    ///
    /// # Errors
    ///
    /// - `ReconcileError::MismatchedLengths` if the arrays differ in length;
    ///   nothing is applied
    pub fn apply_relationships(
        &mut self,
        snapshot: &RelationshipSnapshot,
    ) -> Result<Vec<RosterAction>, ReconcileError> {
        if snapshot.users.len() != snapshot.kinds.len() {
            return Err(ReconcileError::MismatchedLengths {
                users: snapshot.users.len(),
                kinds: snapshot.kinds.len(),
            });
        }

        let mut actions = Vec::new();

        if !snapshot.incremental {
            actions.extend(self.friends().into_iter().map(RosterAction::RemoveBuddy));
            self.relationships.clear();
        }

        for (&who, &code) in snapshot.users.iter().zip(&snapshot.kinds) {
            let Some(relationship) = Relationship::from_code(code) else {
                tracing::warn!(%who, code, "ignoring unrecognized relationship");
                continue;
            };
            self.apply_entry(who, relationship, &mut actions);
        }

        if !snapshot.incremental && !snapshot.users.is_empty() {
            // Profile updates only arrive unprompted for online friends.
            actions.push(RosterAction::RequestUserInfo(snapshot.users.clone()));
        }

        tracing::debug!(
            incremental = snapshot.incremental,
            entries = snapshot.users.len(),
            friends = self.friends().len(),
            "relationships applied"
        );
        Ok(actions)
    }

    fn apply_entry(
        &mut self,
        who: Identity,
        relationship: Relationship,
        actions: &mut Vec<RosterAction>,
    ) {
        let was_friend = self.is_friend(who);

        match relationship {
            Relationship::None => {
                self.relationships.remove(&who);
                if was_friend {
                    actions.push(RosterAction::RemoveBuddy(who));
                }
            },
            Relationship::Friend => {
                self.relationships.insert(who, Relationship::Friend);
                if !was_friend {
                    actions.push(RosterAction::AddBuddy(who));
                }
            },
            Relationship::RequestSent | Relationship::RequestReceived => {
                let previous = self.relationships.insert(who, relationship);
                if was_friend {
                    actions.push(RosterAction::RemoveBuddy(who));
                }
                if previous != Some(relationship) {
                    actions.push(RosterAction::RelationshipNotice { who, relationship });
                }
            },
        }
    }

    /// Apply a profile update.
    ///
    /// A name for `self_identity` also becomes the account alias.
    pub fn apply_user_info(
        &mut self,
        info: &UserInfo,
        self_identity: Option<Identity>,
    ) -> Vec<RosterAction> {
        let who = info.user;
        let mut actions = Vec::new();

        if let Some(name) = &info.name {
            self.names.insert(who, name.clone());
            actions.push(RosterAction::SetAlias { who, name: name.clone() });
            if self_identity == Some(who) {
                actions.push(RosterAction::SetAccountAlias(name.clone()));
            }
        }

        if let Some(code) = info.state {
            match PresenceState::from_code(code) {
                Some(state) => {
                    self.presence.insert(who, state);
                    actions.push(RosterAction::SetStatus { who, state, status: state.primitive() });
                },
                None => tracing::warn!(%who, code, "ignoring unrecognized presence state"),
            }
        }

        actions
    }

    /// Forget everything.
    pub fn clear(&mut self) {
        self.relationships.clear();
        self.presence.clear();
        self.names.clear();
    }
}
