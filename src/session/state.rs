//! Session state machine.
//!
//! All gating decisions go through [`next_state`], a single function of the
//! current state, the role, the readiness flags and the trigger. The Host and
//! Guest start paths are two branches of it.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::room::{Role, RoomId};

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EndReason {
    /// The local user hung up.
    LocalHangUp,
    /// The remote participant sent `bye`.
    RemoteLeft,
    /// Local media could not be acquired before the session started.
    CaptureFailed,
    /// The peer session could not be created after entering Connecting.
    SetupFailed,
}

/// Current state of the call session.
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
pub enum SessionState {
    /// Waiting for readiness or for the first signal from the host.
    #[default]
    Idle,
    /// Peer session created, negotiation in progress.
    Connecting { started_at: DateTime<Utc> },
    /// Remote stream attached.
    Active {
        started_at: DateTime<Utc>,
        connected_at: DateTime<Utc>,
    },
    /// Session over. Terminal, except that a host whose partner left may
    /// start again through [`Trigger::Rejoin`].
    Ended {
        reason: EndReason,
        ended_at: DateTime<Utc>,
        duration_secs: Option<i64>,
    },
}

impl SessionState {
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    pub fn is_connecting(&self) -> bool {
        matches!(self, Self::Connecting { .. })
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active { .. })
    }

    pub fn is_ended(&self) -> bool {
        matches!(self, Self::Ended { .. })
    }

    /// Connecting or Active: a peer session handle is live.
    pub fn is_in_progress(&self) -> bool {
        self.is_connecting() || self.is_active()
    }

    pub fn end_reason(&self) -> Option<EndReason> {
        match self {
            Self::Ended { reason, .. } => Some(*reason),
            _ => None,
        }
    }
}

/// Local readiness flags. Each flips to `true` once and never reverts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Readiness {
    media: bool,
    channel: bool,
}

impl Readiness {
    pub fn media_ready(&self) -> bool {
        self.media
    }

    pub fn channel_ready(&self) -> bool {
        self.channel
    }

    /// Both local media and the signaling channel are available.
    pub fn is_ready(&self) -> bool {
        self.media && self.channel
    }

    /// Returns `true` only on the first call.
    pub fn mark_media(&mut self) -> bool {
        !std::mem::replace(&mut self.media, true)
    }

    /// Returns `true` only on the first call.
    pub fn mark_channel(&mut self) -> bool {
        !std::mem::replace(&mut self.channel, true)
    }
}

/// Events that may move the session between states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Readiness gate evaluation.
    StartGate,
    /// First real signaling payload arrived.
    FirstSignal,
    RemoteStreamAdded,
    HangUp,
    RemoteBye,
    CaptureFailed,
    SetupFailed,
    /// A new partner signalled into a room whose previous partner left.
    Rejoin,
}

#[derive(Debug, Clone)]
pub struct InvalidTransition {
    pub current_state: String,
    pub attempted: String,
}

impl std::fmt::Display for InvalidTransition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "invalid transition {} in state {}",
            self.attempted, self.current_state
        )
    }
}

impl std::error::Error for InvalidTransition {}

fn ended(reason: EndReason, started_at: Option<DateTime<Utc>>) -> SessionState {
    let now = Utc::now();
    SessionState::Ended {
        reason,
        ended_at: now,
        duration_secs: started_at.map(|t| now.signed_duration_since(t).num_seconds()),
    }
}

/// Compute the state that follows `current` on `trigger`.
///
/// The Host path enters Connecting through [`Trigger::StartGate`] once both
/// readiness flags hold. The Guest path may also enter Connecting through
/// [`Trigger::FirstSignal`], regardless of readiness. Either way the role must
/// already be known. After the partner leaves, the remaining participant
/// answers the next one as Host through [`Trigger::Rejoin`].
pub fn next_state(
    current: &SessionState,
    role: Option<Role>,
    readiness: Readiness,
    trigger: Trigger,
) -> Result<SessionState, InvalidTransition> {
    let next = match (current, role, trigger) {
        (SessionState::Idle, Some(_), Trigger::StartGate) if readiness.is_ready() => {
            SessionState::Connecting {
                started_at: Utc::now(),
            }
        }
        (SessionState::Idle, Some(Role::Guest), Trigger::FirstSignal) => {
            SessionState::Connecting {
                started_at: Utc::now(),
            }
        }
        (SessionState::Connecting { started_at }, _, Trigger::RemoteStreamAdded) => {
            SessionState::Active {
                started_at: *started_at,
                connected_at: Utc::now(),
            }
        }
        (SessionState::Active { .. }, _, Trigger::RemoteStreamAdded) => current.clone(),
        (SessionState::Connecting { started_at }, _, Trigger::HangUp) => {
            ended(EndReason::LocalHangUp, Some(*started_at))
        }
        (SessionState::Active { connected_at, .. }, _, Trigger::HangUp) => {
            ended(EndReason::LocalHangUp, Some(*connected_at))
        }
        (SessionState::Connecting { started_at }, _, Trigger::RemoteBye) => {
            ended(EndReason::RemoteLeft, Some(*started_at))
        }
        (SessionState::Active { connected_at, .. }, _, Trigger::RemoteBye) => {
            ended(EndReason::RemoteLeft, Some(*connected_at))
        }
        (SessionState::Idle, _, Trigger::CaptureFailed) => ended(EndReason::CaptureFailed, None),
        (SessionState::Connecting { started_at }, _, Trigger::SetupFailed) => {
            ended(EndReason::SetupFailed, Some(*started_at))
        }
        (
            SessionState::Ended {
                reason: EndReason::RemoteLeft,
                ..
            },
            Some(Role::Host),
            Trigger::Rejoin,
        ) => SessionState::Connecting {
            started_at: Utc::now(),
        },
        (current, role, trigger) => {
            return Err(InvalidTransition {
                current_state: format!("{:?} (role: {:?}, {:?})", current, role, readiness),
                attempted: format!("{:?}", trigger),
            });
        }
    };
    Ok(next)
}

/// The single owned record of everything the controller decides on.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionRecord {
    pub role: Option<Role>,
    pub room: Option<RoomId>,
    pub readiness: Readiness,
    pub state: SessionState,
    /// A session attempt is in progress (a peer session handle is live).
    pub started: bool,
}

impl SessionRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a trigger. The record is unchanged on error.
    pub fn apply(&mut self, trigger: Trigger) -> Result<(), InvalidTransition> {
        let next = next_state(&self.state, self.role, self.readiness, trigger)?;
        self.started = next.is_in_progress();
        self.state = next;
        Ok(())
    }

    /// Whether [`Trigger::StartGate`] would currently succeed. A host has its
    /// role from the start but must wait for the room.
    pub fn gate_open(&self) -> bool {
        !self.started
            && self.role.is_some()
            && self.room.is_some()
            && self.state.is_idle()
            && self.readiness.is_ready()
    }

    /// The partner left and the room is still held for a new one.
    pub fn awaiting_partner(&self) -> bool {
        self.room.is_some() && self.state.end_reason() == Some(EndReason::RemoteLeft)
    }

    /// Ended with nothing left to wait for.
    pub fn is_finished(&self) -> bool {
        self.state.is_ended() && !self.awaiting_partner()
    }
}
