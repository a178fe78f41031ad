//! 64-bit account and room identifiers.
//!
//! Users and chat rooms share one identifier space. The backend packs the
//! identifier as:
//!
//! ```text
//! 63        56 55    52 51             32 31                      0
//! ┌──────────┬────────┬─────────────────┬──────────────────────────┐
//! │ universe │  kind  │    instance     │        account id        │
//! └──────────┴────────┴─────────────────┴──────────────────────────┘
//! ```
//!
//! Identities are assigned by the backend and never change. Hosts see them
//! as the decimal rendering of the raw `u64`.

use std::{fmt, num::ParseIntError, str::FromStr};

use serde::{Deserialize, Serialize};

const ACCOUNT_ID_MASK: u64 = 0xFFFF_FFFF;
const INSTANCE_SHIFT: u32 = 32;
const INSTANCE_MASK: u64 = 0x000F_FFFF;
const KIND_SHIFT: u32 = 52;
const KIND_MASK: u64 = 0xF;
const UNIVERSE_SHIFT: u32 = 56;

/// Kind of account encoded in the high bits of an [`Identity`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccountKind {
    /// Not a valid account.
    Invalid,
    /// Regular user account.
    Individual,
    /// Multiseat (e.g. cybercafe) account.
    Multiseat,
    /// Persistent game server.
    GameServer,
    /// Anonymous game server.
    AnonGameServer,
    /// Pending account.
    Pending,
    /// Content server.
    ContentServer,
    /// Clan (group).
    Clan,
    /// Chat room.
    Chat,
    /// Console user.
    ConsoleUser,
    /// Anonymous user.
    AnonUser,
    /// Kind value this crate does not know about.
    Unknown(u8),
}

impl AccountKind {
    /// Decode the 4-bit kind field.
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => Self::Invalid,
            1 => Self::Individual,
            2 => Self::Multiseat,
            3 => Self::GameServer,
            4 => Self::AnonGameServer,
            5 => Self::Pending,
            6 => Self::ContentServer,
            7 => Self::Clan,
            8 => Self::Chat,
            9 => Self::ConsoleUser,
            10 => Self::AnonUser,
            other => Self::Unknown(other),
        }
    }

    /// Wire value of this kind.
    pub fn code(self) -> u8 {
        match self {
            Self::Invalid => 0,
            Self::Individual => 1,
            Self::Multiseat => 2,
            Self::GameServer => 3,
            Self::AnonGameServer => 4,
            Self::Pending => 5,
            Self::ContentServer => 6,
            Self::Clan => 7,
            Self::Chat => 8,
            Self::ConsoleUser => 9,
            Self::AnonUser => 10,
            Self::Unknown(code) => code,
        }
    }
}

/// Opaque 64-bit identifier for a user or a chat room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(u64);

impl Identity {
    /// Wrap a raw identifier as received from the backend.
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Build an identifier from its packed fields.
    ///
    /// Fields wider than their slot are truncated to fit.
    pub fn from_parts(universe: u8, kind: AccountKind, instance: u32, account_id: u32) -> Self {
        let raw = (u64::from(universe) << UNIVERSE_SHIFT)
            | ((u64::from(kind.code()) & KIND_MASK) << KIND_SHIFT)
            | ((u64::from(instance) & INSTANCE_MASK) << INSTANCE_SHIFT)
            | u64::from(account_id);
        Self(raw)
    }

    /// Raw 64-bit value.
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Low 32 bits: the account number within its universe and kind.
    pub fn account_id(self) -> u32 {
        (self.0 & ACCOUNT_ID_MASK) as u32
    }

    /// Instance field (20 bits).
    pub fn instance(self) -> u32 {
        ((self.0 >> INSTANCE_SHIFT) & INSTANCE_MASK) as u32
    }

    /// Account kind field.
    pub fn kind(self) -> AccountKind {
        AccountKind::from_code(((self.0 >> KIND_SHIFT) & KIND_MASK) as u8)
    }

    /// Universe field (top 8 bits).
    pub fn universe(self) -> u8 {
        (self.0 >> UNIVERSE_SHIFT) as u8
    }

    /// Whether this identifier names a chat room.
    pub fn is_chat(self) -> bool {
        self.kind() == AccountKind::Chat
    }
}

impl From<u64> for Identity {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

impl From<Identity> for u64 {
    fn from(id: Identity) -> Self {
        id.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Identity {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<u64>().map(Self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packs_and_unpacks_fields() {
        let id = Identity::from_parts(1, AccountKind::Individual, 1, 46_143_802);
        assert_eq!(id.raw(), 76_561_198_006_409_530);
        assert_eq!(id.universe(), 1);
        assert_eq!(id.kind(), AccountKind::Individual);
        assert_eq!(id.instance(), 1);
        assert_eq!(id.account_id(), 46_143_802);
        assert!(!id.is_chat());
    }

    #[test]
    fn chat_rooms_are_recognized_by_kind() {
        let room = Identity::from_parts(1, AccountKind::Chat, 0x80000, 1234);
        assert!(room.is_chat());
        assert_eq!(room.instance(), 0x80000);
    }

    #[test]
    fn unknown_kind_round_trips_through_code() {
        let id = Identity::from_parts(1, AccountKind::Unknown(13), 0, 7);
        assert_eq!(id.kind(), AccountKind::Unknown(13));
        assert_eq!(id.kind().code(), 13);
    }

    #[test]
    fn displays_and_parses_as_decimal() {
        let id = Identity::from_raw(76_561_198_006_409_530);
        assert_eq!(id.to_string(), "76561198006409530");
        assert_eq!(" 76561198006409530 ".parse::<Identity>(), Ok(id));
        assert!("not-a-number".parse::<Identity>().is_err());
    }
}
