//! Presence states and their mapping onto host status primitives.
//!
//! The backend knows seven presence states; hosts usually only render a
//! handful of primitives. Several backend states therefore collapse onto the
//! same primitive ("looking to trade" looks like "available").

use serde::{Deserialize, Serialize};

/// Backend presence state of a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PresenceState {
    /// Offline or invisible.
    Offline,
    /// Online.
    Online,
    /// Busy.
    Busy,
    /// Away.
    Away,
    /// Away for a long time.
    Snooze,
    /// Online and looking to trade.
    LookingToTrade,
    /// Online and looking to play.
    LookingToPlay,
}

impl PresenceState {
    /// Decode a backend state code. `None` for codes this crate does not know.
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(Self::Offline),
            1 => Some(Self::Online),
            2 => Some(Self::Busy),
            3 => Some(Self::Away),
            4 => Some(Self::Snooze),
            5 => Some(Self::LookingToTrade),
            6 => Some(Self::LookingToPlay),
            _ => None,
        }
    }

    /// Wire value of this state.
    pub fn code(self) -> u32 {
        match self {
            Self::Offline => 0,
            Self::Online => 1,
            Self::Busy => 2,
            Self::Away => 3,
            Self::Snooze => 4,
            Self::LookingToTrade => 5,
            Self::LookingToPlay => 6,
        }
    }

    /// Host primitive used to display this state.
    pub fn primitive(self) -> StatusPrimitive {
        match self {
            Self::Offline => StatusPrimitive::Offline,
            Self::Online | Self::LookingToTrade | Self::LookingToPlay => StatusPrimitive::Available,
            Self::Busy => StatusPrimitive::Unavailable,
            Self::Away => StatusPrimitive::Away,
            Self::Snooze => StatusPrimitive::ExtendedAway,
        }
    }

    /// State to announce when the local user picks a host status.
    pub fn from_primitive(primitive: StatusPrimitive) -> Self {
        match primitive {
            StatusPrimitive::Available => Self::Online,
            StatusPrimitive::Unavailable => Self::Busy,
            StatusPrimitive::Away => Self::Away,
            StatusPrimitive::ExtendedAway => Self::Snooze,
            StatusPrimitive::Invisible | StatusPrimitive::Offline => Self::Offline,
        }
    }
}

/// Status primitive understood by the host UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatusPrimitive {
    /// Offline.
    Offline,
    /// Available.
    Available,
    /// Unavailable (busy).
    Unavailable,
    /// Away.
    Away,
    /// Extended away.
    ExtendedAway,
    /// Invisible to others.
    Invisible,
}

impl StatusPrimitive {
    /// Host identifier used when a status type has no id of its own.
    pub fn id(self) -> &'static str {
        match self {
            Self::Offline => "offline",
            Self::Available => "available",
            Self::Unavailable => "unavailable",
            Self::Away => "away",
            Self::ExtendedAway => "extended_away",
            Self::Invisible => "invisible",
        }
    }
}

/// A status the host may offer in its status selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusType {
    /// Primitive the status renders as.
    pub primitive: StatusPrimitive,
    /// Explicit id, if the status is a variant of its primitive.
    pub id: Option<&'static str>,
    /// Human-readable name.
    pub name: &'static str,
    /// Whether the local user may pick this status.
    pub user_settable: bool,
}

impl StatusType {
    /// Host identifier of this status type.
    pub fn id(&self) -> &'static str {
        self.id.unwrap_or_else(|| self.primitive.id())
    }
}

/// Status types offered to the host.
///
/// "Looking to trade/play" are shown when other users report them but cannot
/// be picked locally.
pub const STATUS_TYPES: [StatusType; 7] = [
    StatusType {
        primitive: StatusPrimitive::Available,
        id: None,
        name: "Online",
        user_settable: true,
    },
    StatusType {
        primitive: StatusPrimitive::Offline,
        id: None,
        name: "Offline",
        user_settable: true,
    },
    StatusType {
        primitive: StatusPrimitive::Unavailable,
        id: None,
        name: "Busy",
        user_settable: true,
    },
    StatusType { primitive: StatusPrimitive::Away, id: None, name: "Away", user_settable: true },
    StatusType {
        primitive: StatusPrimitive::ExtendedAway,
        id: None,
        name: "Snoozing",
        user_settable: true,
    },
    StatusType {
        primitive: StatusPrimitive::Available,
        id: Some("trade"),
        name: "Looking to Trade",
        user_settable: false,
    },
    StatusType {
        primitive: StatusPrimitive::Available,
        id: Some("play"),
        name: "Looking to Play",
        user_settable: false,
    },
];

/// Status types offered to the host, in selector order.
pub fn status_types() -> &'static [StatusType] {
    &STATUS_TYPES
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_round_trip() {
        for code in 0..7 {
            let state = PresenceState::from_code(code).unwrap();
            assert_eq!(state.code(), code);
        }
        assert_eq!(PresenceState::from_code(7), None);
        assert_eq!(PresenceState::from_code(u32::MAX), None);
    }

    #[test]
    fn looking_states_render_as_available() {
        assert_eq!(PresenceState::LookingToTrade.primitive(), StatusPrimitive::Available);
        assert_eq!(PresenceState::LookingToPlay.primitive(), StatusPrimitive::Available);
        assert_eq!(PresenceState::Snooze.primitive(), StatusPrimitive::ExtendedAway);
    }

    #[test]
    fn invisible_is_announced_as_offline() {
        assert_eq!(PresenceState::from_primitive(StatusPrimitive::Invisible), PresenceState::Offline);
        assert_eq!(
            PresenceState::from_primitive(StatusPrimitive::ExtendedAway),
            PresenceState::Snooze
        );
    }

    #[test]
    fn status_type_ids_are_unique() {
        let mut ids: Vec<_> = status_types().iter().map(StatusType::id).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), STATUS_TYPES.len());
        assert!(STATUS_TYPES.iter().filter(|t| !t.user_settable).all(|t| t.id.is_some()));
    }
}
