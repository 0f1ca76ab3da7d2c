//! Session-related error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("invalid session state transition: {0}")]
    InvalidTransition(#[from] super::state::InvalidTransition),

    #[error("signaling channel error: {0}")]
    Channel(String),

    #[error("peer session error: {0}")]
    PeerSession(String),

    #[error("media capture failed: {0}")]
    Capture(#[from] CaptureError),

    #[error("session is no longer running")]
    Closed,
}

/// Reasons a local media stream could not be acquired.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CaptureError {
    #[error("access to camera and microphone was denied")]
    PermissionDenied,

    #[error("no capture device is available")]
    NoDevice,

    #[error("failed to get access to local media, error code was {0}")]
    Device(i32),
}
