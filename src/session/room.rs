//! Room and role assignment.
//!
//! A participant whose location carries a room marker (`?room=<id>`) joins
//! that room as the [`Role::Guest`]. Without the marker the participant is the
//! [`Role::Host`] and waits for the signaling server to allocate a room.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which side of the call this participant is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Created the room and waits for someone to join.
    Host,
    /// Joined an existing room through an invitation link.
    Guest,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Host => f.write_str("host"),
            Role::Guest => f.write_str("guest"),
        }
    }
}

/// Opaque room identifier shared by both participants.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(String);

impl RoomId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Outcome of inspecting the participant's location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomAssignment {
    /// Join the given room; an invite must be announced on the channel.
    Join(RoomId),
    /// Host a new room; the channel will deliver the allocated id.
    AwaitRoom,
}

impl RoomAssignment {
    /// Inspect `location` for `room_param`.
    ///
    /// Accepts a full URL or a bare query string. A present but empty value is
    /// treated the same as an absent one.
    pub fn from_location(location: &str, room_param: &str) -> Self {
        match room_from_location(location, room_param) {
            Some(room) => RoomAssignment::Join(room),
            None => RoomAssignment::AwaitRoom,
        }
    }

    /// Role implied by this assignment. Without a room parameter the
    /// participant hosts, even before the server allocates the room.
    pub fn role(&self) -> Role {
        match self {
            RoomAssignment::Join(_) => Role::Guest,
            RoomAssignment::AwaitRoom => Role::Host,
        }
    }
}

fn room_from_location(location: &str, room_param: &str) -> Option<RoomId> {
    let query = match location.split_once('?') {
        Some((_, query)) => query,
        None => location,
    };
    let query = query.split('#').next().unwrap_or_default();

    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| *key == room_param)
        .and_then(|(_, value)| {
            let value = urlencoding::decode(value).ok()?;
            let value = value.trim();
            (!value.is_empty()).then(|| RoomId::new(value))
        })
}

/// Build the link a host shares so a guest can join `room`.
pub fn invite_link(base_url: &str, room_param: &str, room: &RoomId) -> String {
    let base = base_url.split('?').next().unwrap_or_default();
    format!(
        "{}?{}={}",
        base,
        room_param,
        urlencoding::encode(room.as_str())
    )
}
