//! Status updates for the presentation layer.

use crate::media::{LocalStream, RemoteStream};

use super::room::RoomId;

/// Something the user interface should reflect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionNotice {
    /// Host is waiting; share `invite_link` with the other participant.
    WaitingForPeer { room: RoomId, invite_link: String },
    /// Guest announced itself and is waiting for the host.
    Initializing,
    LocalStreamReady(LocalStream),
    Connecting,
    /// Remote media is flowing; hang-up is available.
    InSession { remote: RemoteStream },
    RemoteStreamRemoved,
    PartnerLeft,
    CallEnded,
    /// Local media could not be captured. `message` is meant for the user.
    CaptureFailed { message: String },
}
