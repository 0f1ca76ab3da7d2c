//! Two-party call establishment.
//!
//! A session moves through `Idle → Connecting → Active → Ended`. The host
//! starts negotiating once local media and the signaling channel are both
//! ready; the guest starts as soon as the host's first signal arrives.
//! When the partner leaves, the room stays open and the next partner's first
//! signal starts a new session with the remaining participant as host.
//!
//! # Architecture
//!
//! - [`RoomAssignment`]: decides Host or Guest from the participant's location
//! - [`SessionRecord`] & [`next_state`]: the owned state record and the single
//!   transition function every gating decision goes through
//! - [`SessionController`]: reacts to channel, media and peer session events
//! - [`CallSession`]: event loop running a controller on one task
//! - [`CallHandle`]: hang-up and status subscription for the user interface

mod controller;
mod error;
mod notice;
mod room;
mod runner;
mod state;

pub use controller::SessionController;
pub use error::{CaptureError, SessionError};
pub use notice::SessionNotice;
pub use room::{Role, RoomAssignment, RoomId, invite_link};
pub use runner::{CallHandle, CallSession, SessionCommand};
pub use state::{
    EndReason, InvalidTransition, Readiness, SessionRecord, SessionState, Trigger, next_state,
};
