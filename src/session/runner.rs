//! Event loop driving a [`SessionController`].
//!
//! Everything the controller reacts to (media acquisition, channel events,
//! peer session callbacks, user commands) is multiplexed onto one task, so
//! the controller is only ever touched by one event at a time.

use log::{debug, info, warn};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};

use super::controller::SessionController;
use super::error::SessionError;
use super::notice::SessionNotice;
use super::room::RoomAssignment;
use super::state::SessionState;
use crate::config::SessionConfig;
use crate::media::{MediaConstraints, MediaSource};
use crate::peer::{PeerEvent, PeerEventSink, PeerSessionFactory};
use crate::signaling::{ChannelEvent, SignalingConnector};

/// Requests from the user to a running session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCommand {
    HangUp,
}

/// User-facing handle to a running [`CallSession`].
#[derive(Clone)]
pub struct CallHandle {
    commands: mpsc::Sender<SessionCommand>,
    notices: broadcast::Sender<SessionNotice>,
}

impl CallHandle {
    pub async fn hang_up(&self) -> Result<(), SessionError> {
        self.commands
            .send(SessionCommand::HangUp)
            .await
            .map_err(|_| SessionError::Closed)
    }

    /// Status notices published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionNotice> {
        self.notices.subscribe()
    }
}

/// A call session wired to its capabilities, ready to [`run`](Self::run).
pub struct CallSession {
    controller: SessionController,
    assignment: RoomAssignment,
    media: Arc<dyn MediaSource>,
    constraints: MediaConstraints,
    channel_events: mpsc::Receiver<ChannelEvent>,
    peer_events: mpsc::UnboundedReceiver<PeerEvent>,
    commands: mpsc::Receiver<SessionCommand>,
}

impl CallSession {
    /// Open the signaling channel and inspect `location` for a room.
    pub async fn connect(
        config: SessionConfig,
        location: &str,
        connector: &dyn SignalingConnector,
        media: Arc<dyn MediaSource>,
        peers: Arc<dyn PeerSessionFactory>,
    ) -> Result<(Self, CallHandle), SessionError> {
        let assignment = RoomAssignment::from_location(location, &config.room_param);
        let (channel, channel_events) = connector
            .connect()
            .await
            .map_err(|e| SessionError::Channel(format!("{e:#}")))?;

        let (sink, peer_events) = PeerEventSink::channel();
        let (command_tx, commands) = mpsc::channel(config.command_capacity.max(1));
        let constraints = config.media;
        let controller = SessionController::new(config, channel, peers, sink);

        let handle = CallHandle {
            commands: command_tx,
            notices: controller.notice_sender(),
        };
        let session = Self {
            controller,
            assignment,
            media,
            constraints,
            channel_events,
            peer_events,
            commands,
        };
        Ok((session, handle))
    }

    /// Drive the session until it ends or every event source is gone, then
    /// release the signaling channel.
    pub async fn run(self) -> Result<SessionState, SessionError> {
        let Self {
            mut controller,
            assignment,
            media,
            constraints,
            mut channel_events,
            mut peer_events,
            mut commands,
        } = self;

        if let Err(e) = controller.start(assignment).await {
            controller.shutdown().await;
            return Err(e);
        }

        info!("Requested access to local media.");
        let capture = media.acquire(constraints);
        tokio::pin!(capture);
        let mut capture_pending = true;
        let mut channel_open = true;
        let mut commands_open = true;

        while !controller.record().is_finished() {
            let result = tokio::select! {
                result = &mut capture, if capture_pending => {
                    capture_pending = false;
                    match result {
                        Ok(stream) => controller.on_media_acquired(stream),
                        Err(e) => controller.on_media_failed(e),
                    }
                }
                event = channel_events.recv(), if channel_open => match event {
                    Some(event) => controller.handle_channel_event(event),
                    None => {
                        channel_open = false;
                        controller.on_channel_closed();
                        Ok(())
                    }
                },
                Some(event) = peer_events.recv() => controller.handle_peer_event(event).await,
                command = commands.recv(), if commands_open => match command {
                    Some(SessionCommand::HangUp) => controller.hang_up().await,
                    None => {
                        debug!("All call handles dropped");
                        commands_open = false;
                        // Nobody is left to hang up on a new partner.
                        controller.leave_room();
                        Ok(())
                    }
                },
                else => {
                    warn!("No event sources left, leaving session in {:?}", controller.state());
                    break;
                }
            };

            if let Err(e) = result {
                warn!("Session event failed: {}", e);
            }
        }

        controller.shutdown().await;
        Ok(controller.state().clone())
    }
}
