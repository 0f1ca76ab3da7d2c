pub mod config;
pub mod media;
pub mod peer;
pub mod session;
pub mod signaling;

pub use config::SessionConfig;
pub use session::{
    CallHandle, CallSession, Role, RoomAssignment, RoomId, SessionController, SessionError,
    SessionNotice, SessionState,
};
