//! Standard invariant checks.
//!
//! These invariants capture behavioral properties that must always hold.
//! They verify WHAT must be true, not specific test scenarios.

use super::{Invariant, InvariantResult, SessionSnapshot, Violation};

/// A room's alias group exists iff the room is tracked.
///
/// Checked on both sides: the session's own groups must match its rooms, and
/// while the session is open the host must hold exactly those groups. A group
/// left behind on the host after a leave shows up as a stray contact folder.
/// Once closed, the host drops the account's groups on its own.
pub struct AliasGroupIffRoom;

impl Invariant for AliasGroupIffRoom {
    fn name(&self) -> &'static str {
        "alias_group_iff_room"
    }

    fn check(&self, state: &SessionSnapshot) -> InvariantResult {
        let expected: std::collections::BTreeSet<String> =
            state.rooms.iter().map(ToString::to_string).collect();

        if state.alias_groups != expected {
            return Err(Violation {
                invariant: self.name(),
                message: format!(
                    "session groups {:?} do not match rooms {:?}",
                    state.alias_groups, state.rooms
                ),
            });
        }
        if !state.closed && state.host_groups != expected {
            return Err(Violation {
                invariant: self.name(),
                message: format!(
                    "host groups {:?} do not match rooms {:?}",
                    state.host_groups, state.rooms
                ),
            });
        }
        Ok(())
    }
}

/// The read offset never passes the expected frame length.
pub struct ReadOffsetInBounds;

impl Invariant for ReadOffsetInBounds {
    fn name(&self) -> &'static str {
        "read_offset_in_bounds"
    }

    fn check(&self, state: &SessionSnapshot) -> InvariantResult {
        if state.read_offset > state.expected_len {
            return Err(Violation {
                invariant: self.name(),
                message: format!(
                    "offset {} past expected length {}",
                    state.read_offset, state.expected_len
                ),
            });
        }
        Ok(())
    }
}

/// A closed session holds no resources.
///
/// After close: no socket, no watcher, no timer, pump idle, no rooms.
pub struct TornDownCleanly;

impl Invariant for TornDownCleanly {
    fn name(&self) -> &'static str {
        "torn_down_cleanly"
    }

    fn check(&self, state: &SessionSnapshot) -> InvariantResult {
        if !state.closed {
            return Ok(());
        }

        let mut leaks = Vec::new();
        if state.has_socket {
            leaks.push("socket");
        }
        if state.watching {
            leaks.push("watcher");
        }
        if state.timer_armed {
            leaks.push("timer");
        }
        if state.pump_started || state.expected_len > 0 {
            leaks.push("pump buffers");
        }
        if !state.rooms.is_empty() {
            leaks.push("rooms");
        }

        if leaks.is_empty() {
            Ok(())
        } else {
            Err(Violation {
                invariant: self.name(),
                message: format!("closed session still holds {}", leaks.join(", ")),
            })
        }
    }
}

/// The host never saw an action it would have rejected.
pub struct HostAccepted;

impl Invariant for HostAccepted {
    fn name(&self) -> &'static str {
        "host_accepted"
    }

    fn check(&self, state: &SessionSnapshot) -> InvariantResult {
        match state.host_complaints.first() {
            None => Ok(()),
            Some(first) => Err(Violation {
                invariant: self.name(),
                message: format!("{} complaints, first: {first}", state.host_complaints.len()),
            }),
        }
    }
}
