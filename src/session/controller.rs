//! Session controller.
//!
//! Owns the [`SessionRecord`] and the single live [`PeerSessionHandle`], and
//! reacts to one event at a time. It is driven by [`super::CallSession`], but
//! every handler can be called directly, which is how the tests exercise it.

use log::{debug, error, info, warn};
use std::sync::Arc;
use tokio::sync::broadcast;

use super::error::{CaptureError, SessionError};
use super::notice::SessionNotice;
use super::room::{Role, RoomAssignment, RoomId, invite_link};
use super::state::{Readiness, SessionRecord, SessionState, Trigger};
use crate::config::SessionConfig;
use crate::media::{LocalStream, RemoteStream};
use crate::peer::{PeerEvent, PeerEventSink, PeerSessionFactory, PeerSessionHandle};
use crate::signaling::{ChannelEvent, OutboundEvent, SignalingChannel};

pub struct SessionController {
    config: SessionConfig,
    record: SessionRecord,
    channel: Arc<dyn SignalingChannel>,
    peers: Arc<dyn PeerSessionFactory>,
    /// Handed to every peer session this controller creates.
    peer_events: PeerEventSink,
    local_stream: Option<LocalStream>,
    handle: Option<PeerSessionHandle>,
    notices: broadcast::Sender<SessionNotice>,
}

impl SessionController {
    pub fn new(
        config: SessionConfig,
        channel: Arc<dyn SignalingChannel>,
        peers: Arc<dyn PeerSessionFactory>,
        peer_events: PeerEventSink,
    ) -> Self {
        let (notices, _) = broadcast::channel(config.notice_capacity.max(1));
        Self {
            config,
            record: SessionRecord::new(),
            channel,
            peers,
            peer_events,
            local_stream: None,
            handle: None,
            notices,
        }
    }

    pub fn record(&self) -> &SessionRecord {
        &self.record
    }

    pub fn state(&self) -> &SessionState {
        &self.record.state
    }

    pub fn role(&self) -> Option<Role> {
        self.record.role
    }

    pub fn room(&self) -> Option<&RoomId> {
        self.record.room.as_ref()
    }

    pub fn readiness(&self) -> Readiness {
        self.record.readiness
    }

    pub fn has_peer_session(&self) -> bool {
        self.handle.is_some()
    }

    pub fn local_stream(&self) -> Option<&LocalStream> {
        self.local_stream.as_ref()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionNotice> {
        self.notices.subscribe()
    }

    pub(crate) fn notice_sender(&self) -> broadcast::Sender<SessionNotice> {
        self.notices.clone()
    }

    fn notify(&self, notice: SessionNotice) {
        // No subscribers is fine; nobody is watching the status surface.
        let _ = self.notices.send(notice);
    }

    // Takes `&mut self` so the future only needs the controller to be `Send`.
    async fn emit(&mut self, event: OutboundEvent) -> Result<(), SessionError> {
        self.channel
            .emit(event)
            .await
            .map_err(|e| SessionError::Channel(format!("{e:#}")))
    }

    /// Apply the outcome of inspecting the participant's location.
    pub async fn start(&mut self, assignment: RoomAssignment) -> Result<(), SessionError> {
        match assignment {
            RoomAssignment::Join(room) => {
                info!("Joining room {} as guest", room);
                self.record.role = Some(Role::Guest);
                self.record.room = Some(room.clone());
                self.notify(SessionNotice::Initializing);
                self.emit(OutboundEvent::Invite(room)).await?;
            }
            RoomAssignment::AwaitRoom => {
                debug!("No room in location, hosting once a room is assigned");
                self.record.role = Some(Role::Host);
            }
        }
        Ok(())
    }

    /// The server allocated a room for this host.
    pub fn on_room_assigned(&mut self, room: RoomId) -> Result<(), SessionError> {
        if !self.record.state.is_idle()
            || self.record.role == Some(Role::Guest)
            || self.record.room.is_some()
        {
            debug!(
                "Ignoring room assignment {} (role: {:?}, state: {:?})",
                room, self.record.role, self.record.state
            );
            return Ok(());
        }

        info!("Room {} assigned, hosting", room);
        let link = invite_link(&self.config.base_url, &self.config.room_param, &room);
        self.record.role = Some(Role::Host);
        self.record.room = Some(room.clone());
        self.notify(SessionNotice::WaitingForPeer {
            room,
            invite_link: link,
        });
        self.evaluate_start_gate()
    }

    pub fn on_channel_open(&mut self) -> Result<(), SessionError> {
        if self.record.readiness.mark_channel() {
            info!("Channel opened.");
        } else {
            debug!("Channel reconnected");
        }
        self.evaluate_start_gate()
    }

    pub fn on_media_acquired(&mut self, stream: LocalStream) -> Result<(), SessionError> {
        if self.record.is_finished() {
            debug!("Local media {} arrived after the session ended", stream.id());
            return Ok(());
        }

        info!("User has granted access to local media.");
        debug!(
            "Local stream {} (audio: {}, video: {})",
            stream.id(),
            stream.has_audio(),
            stream.has_video()
        );
        self.record.readiness.mark_media();
        self.local_stream = Some(stream.clone());
        self.notify(SessionNotice::LocalStreamReady(stream.clone()));

        // The guest may already be negotiating without local media.
        if let Some(handle) = self.handle.as_mut() {
            if !handle.has_local_stream() {
                info!("Adding local stream.");
                handle.attach_local_stream(&stream);
            }
        }

        self.evaluate_start_gate()
    }

    pub fn on_media_failed(&mut self, err: CaptureError) -> Result<(), SessionError> {
        error!("Failed to get access to local media: {}", err);
        self.notify(SessionNotice::CaptureFailed {
            message: err.to_string(),
        });

        if self.record.state.is_idle() {
            self.record.apply(Trigger::CaptureFailed)?;
        }
        Ok(())
    }

    /// Start the peer session if the readiness gate is open. A no-op otherwise,
    /// including when a session was already started.
    pub fn evaluate_start_gate(&mut self) -> Result<(), SessionError> {
        if !self.record.gate_open() {
            debug!(
                "Start gate closed (role: {:?}, {:?}, state: {:?})",
                self.record.role, self.record.readiness, self.record.state
            );
            return Ok(());
        }
        self.begin_session(Trigger::StartGate)
    }

    fn begin_session(&mut self, trigger: Trigger) -> Result<(), SessionError> {
        if self.handle.is_some() {
            warn!("Peer session already live, ignoring {:?}", trigger);
            return Ok(());
        }

        self.record.apply(trigger)?;
        self.notify(SessionNotice::Connecting);

        info!("Creating PeerConnection.");
        let session = match self.peers.create(self.peer_events.clone()) {
            Ok(session) => session,
            Err(e) => {
                error!("Failed to create peer session: {:#}", e);
                self.record.apply(Trigger::SetupFailed)?;
                self.local_stream = None;
                self.notify(SessionNotice::CallEnded);
                return Err(SessionError::PeerSession(format!("{e:#}")));
            }
        };

        let mut handle = PeerSessionHandle::new(session);
        if let Some(stream) = &self.local_stream {
            info!("Adding local stream.");
            handle.attach_local_stream(stream);
        }
        self.handle = Some(handle);
        Ok(())
    }

    pub fn on_incoming_message(&mut self, payload: String) -> Result<(), SessionError> {
        if payload.is_empty() || payload.contains(self.config.error_sentinel.as_str()) {
            debug!("Dropping error payload from channel");
            return Ok(());
        }

        if self.record.state.is_idle() && self.record.role == Some(Role::Guest) {
            // A real signal proves the host is ready.
            self.begin_session(Trigger::FirstSignal)?;
        } else if self.record.awaiting_partner() {
            // Whoever signals into the room next is answered as its host.
            info!("New partner signalling, restarting session");
            self.record.role = Some(Role::Host);
            self.begin_session(Trigger::Rejoin)?;
        } else if !self.record.state.is_in_progress() {
            debug!("Dropping signal received in state {:?}", self.record.state);
            return Ok(());
        }

        match self.handle.as_mut() {
            Some(handle) => handle
                .process_message(&payload)
                .map_err(|e| SessionError::PeerSession(format!("{e:#}"))),
            None => {
                warn!("Signal received with no peer session, dropping");
                Ok(())
            }
        }
    }

    /// Relay a payload produced by the peer session, verbatim and unbuffered.
    pub async fn on_outgoing_signal(&mut self, payload: String) -> Result<(), SessionError> {
        if self.handle.is_none() {
            debug!("Dropping signal from a discarded peer session");
            return Ok(());
        }
        self.emit(OutboundEvent::Message(payload)).await
    }

    pub fn on_remote_stream_added(&mut self, remote: RemoteStream) {
        info!("Remote stream added.");
        let was_connecting = self.record.state.is_connecting();
        match self.record.apply(Trigger::RemoteStreamAdded) {
            Ok(()) if was_connecting => self.notify(SessionNotice::InSession { remote }),
            Ok(()) => debug!("Remote stream {} added while already active", remote.id),
            Err(e) => debug!("Ignoring remote stream: {}", e),
        }
    }

    /// Presentation only; the remote side stays reachable until bye or close.
    pub fn on_remote_stream_removed(&mut self) {
        info!("Remote stream removed.");
        if self.record.state.is_in_progress() {
            self.notify(SessionNotice::RemoteStreamRemoved);
        }
    }

    pub fn on_remote_bye(&mut self) {
        if let Err(e) = self.record.apply(Trigger::RemoteBye) {
            debug!("Ignoring bye: {}", e);
            return;
        }

        // The remote already tore down its side; discard without closing.
        drop(self.handle.take());
        // The room and local stream are kept for the next partner; the role
        // is decided again when one signals.
        self.record.role = None;

        info!("Session terminated.");
        self.notify(SessionNotice::PartnerLeft);
    }

    /// User-initiated teardown. Leaves the room if the partner already left,
    /// otherwise a no-op unless Connecting or Active.
    pub async fn hang_up(&mut self) -> Result<(), SessionError> {
        if self.record.awaiting_partner() {
            info!("Leaving room after partner left.");
            self.leave_room();
            self.notify(SessionNotice::CallEnded);
            return self.emit(OutboundEvent::Exit).await;
        }

        if !self.record.state.is_in_progress() {
            debug!("Hang-up with no session in progress");
            return Ok(());
        }

        info!("Hanging up.");
        let handle = self.handle.take();
        self.record.apply(Trigger::HangUp)?;
        if let Some(handle) = handle {
            handle.close();
        }
        self.local_stream = None;
        self.notify(SessionNotice::CallEnded);

        self.emit(OutboundEvent::Exit).await
    }

    /// Stop holding the room for a new partner.
    pub fn leave_room(&mut self) {
        if self.record.awaiting_partner() {
            self.record.room = None;
            self.local_stream = None;
        }
    }

    /// Release everything still held once the session loop stops.
    pub async fn shutdown(&mut self) {
        if let Some(handle) = self.handle.take() {
            warn!("Closing peer session left open in {:?}", self.record.state);
            handle.close();
        }
        debug!("Disconnecting signaling channel");
        self.channel.disconnect().await;
    }

    pub fn on_channel_error(&mut self, diagnostic: &str) {
        warn!("Channel error: {}", diagnostic);
    }

    pub fn on_channel_closed(&mut self) {
        info!("Channel closed.");
    }

    pub fn handle_channel_event(&mut self, event: ChannelEvent) -> Result<(), SessionError> {
        match event {
            ChannelEvent::Connected => self.on_channel_open(),
            ChannelEvent::Message(payload) => self.on_incoming_message(payload),
            ChannelEvent::Bye => {
                self.on_remote_bye();
                Ok(())
            }
            ChannelEvent::Error(diagnostic) => {
                self.on_channel_error(&diagnostic);
                Ok(())
            }
            ChannelEvent::Closed => {
                self.on_channel_closed();
                Ok(())
            }
            ChannelEvent::RoomAssigned(room) => self.on_room_assigned(room),
        }
    }

    pub async fn handle_peer_event(&mut self, event: PeerEvent) -> Result<(), SessionError> {
        match event {
            PeerEvent::OutgoingSignal(payload) => return self.on_outgoing_signal(payload).await,
            PeerEvent::Connecting => info!("Session connecting."),
            PeerEvent::Opened => info!("Session opened."),
            PeerEvent::RemoteStreamAdded(remote) => self.on_remote_stream_added(remote),
            PeerEvent::RemoteStreamRemoved => self.on_remote_stream_removed(),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::MediaConstraints;
    use crate::peer::mock::MockPeerFactory;
    use crate::session::state::EndReason;
    use crate::signaling::mock::MockChannel;

    struct Fixture {
        controller: SessionController,
        channel: Arc<MockChannel>,
        peers: MockPeerFactory,
        notices: broadcast::Receiver<SessionNotice>,
    }

    fn fixture() -> Fixture {
        fixture_with(MockChannel::new(), MockPeerFactory::new())
    }

    fn fixture_with(channel: MockChannel, peers: MockPeerFactory) -> Fixture {
        let _ = env_logger::builder().is_test(true).try_init();
        let channel = Arc::new(channel);
        let (sink, _rx) = PeerEventSink::channel();
        let controller = SessionController::new(
            SessionConfig::default(),
            channel.clone(),
            Arc::new(peers.clone()),
            sink,
        );
        let notices = controller.subscribe();
        Fixture {
            controller,
            channel,
            peers,
            notices,
        }
    }

    fn stream(id: &str) -> LocalStream {
        LocalStream::new(id, MediaConstraints::default())
    }

    fn drain(rx: &mut broadcast::Receiver<SessionNotice>) -> Vec<SessionNotice> {
        let mut out = Vec::new();
        while let Ok(notice) = rx.try_recv() {
            out.push(notice);
        }
        out
    }

    async fn active_host() -> Fixture {
        let mut f = fixture();
        f.controller.start(RoomAssignment::AwaitRoom).await.unwrap();
        f.controller.on_room_assigned(RoomId::new("R1")).unwrap();
        f.controller.on_media_acquired(stream("cam")).unwrap();
        f.controller.on_channel_open().unwrap();
        f.controller.on_remote_stream_added(RemoteStream::new("remote"));
        assert!(f.controller.state().is_active());
        f
    }

    /// Host opens the page, gets R1, media then channel → Connecting once.
    #[tokio::test]
    async fn test_host_scenario() {
        let mut f = fixture();

        f.controller.start(RoomAssignment::AwaitRoom).await.unwrap();
        assert_eq!(f.controller.role(), Some(Role::Host));
        assert_eq!(f.controller.room(), None);
        assert!(f.channel.sent().is_empty());

        f.controller.on_room_assigned(RoomId::new("R1")).unwrap();
        assert_eq!(f.controller.role(), Some(Role::Host));
        assert_eq!(f.controller.room(), Some(&RoomId::new("R1")));

        let notices = drain(&mut f.notices);
        match notices.first() {
            Some(SessionNotice::WaitingForPeer { invite_link, .. }) => {
                assert!(invite_link.contains("R1"), "link was {}", invite_link);
            }
            other => panic!("expected invite link notice, got {:?}", other),
        }

        f.controller.on_media_acquired(stream("cam")).unwrap();
        assert!(f.controller.state().is_idle());

        f.controller.on_channel_open().unwrap();
        assert!(f.controller.state().is_connecting());
        assert!(f.controller.has_peer_session());

        let log = f.peers.log();
        assert_eq!(log.created, 1);
        assert_eq!(log.attached, vec!["cam".to_string()]);
        let local = f.controller.local_stream().unwrap();
        assert!(local.has_audio() && local.has_video());
    }

    #[tokio::test]
    async fn test_host_waits_for_room_before_starting() {
        let mut f = fixture();
        f.controller.start(RoomAssignment::AwaitRoom).await.unwrap();
        f.controller.on_media_acquired(stream("cam")).unwrap();
        f.controller.on_channel_open().unwrap();
        assert!(f.controller.state().is_idle());
        assert_eq!(f.peers.log().created, 0);

        f.controller.on_room_assigned(RoomId::new("R1")).unwrap();
        assert!(f.controller.state().is_connecting());

        // A second assignment does not move the host to another room.
        f.controller.on_room_assigned(RoomId::new("R2")).unwrap();
        assert_eq!(f.controller.room(), Some(&RoomId::new("R1")));
        assert_eq!(f.peers.log().created, 1);
    }

    /// Every ordering of room assignment, media and channel open starts exactly once.
    #[tokio::test]
    async fn test_all_readiness_interleavings_start_once() {
        #[derive(Clone, Copy, Debug)]
        enum Step {
            Room,
            Media,
            Channel,
        }
        let orders = [
            [Step::Room, Step::Media, Step::Channel],
            [Step::Room, Step::Channel, Step::Media],
            [Step::Media, Step::Room, Step::Channel],
            [Step::Media, Step::Channel, Step::Room],
            [Step::Channel, Step::Room, Step::Media],
            [Step::Channel, Step::Media, Step::Room],
        ];

        for order in orders {
            let mut f = fixture();
            f.controller.start(RoomAssignment::AwaitRoom).await.unwrap();
            for step in order {
                match step {
                    Step::Room => f.controller.on_room_assigned(RoomId::new("R1")).unwrap(),
                    Step::Media => f.controller.on_media_acquired(stream("cam")).unwrap(),
                    Step::Channel => f.controller.on_channel_open().unwrap(),
                }
            }
            // Duplicate readiness callbacks, e.g. a reconnect.
            f.controller.on_channel_open().unwrap();
            f.controller.on_media_acquired(stream("cam")).unwrap();

            assert!(f.controller.state().is_connecting(), "order {:?}", order);
            assert_eq!(f.peers.log().created, 1, "order {:?}", order);
            assert_eq!(f.peers.log().attached.len(), 1, "order {:?}", order);
        }
    }

    #[tokio::test]
    async fn test_evaluate_start_gate_twice_creates_one_handle() {
        let mut f = fixture();
        f.controller.start(RoomAssignment::AwaitRoom).await.unwrap();
        f.controller.on_room_assigned(RoomId::new("R1")).unwrap();
        f.controller.on_media_acquired(stream("cam")).unwrap();
        f.controller.on_channel_open().unwrap();

        f.controller.evaluate_start_gate().unwrap();
        f.controller.evaluate_start_gate().unwrap();
        assert_eq!(f.peers.log().created, 1);
    }

    /// Guest with R1: invite sent, message before media → Connecting via message.
    #[tokio::test]
    async fn test_guest_scenario() {
        let mut f = fixture();

        f.controller
            .start(RoomAssignment::Join(RoomId::new("R1")))
            .await
            .unwrap();
        assert_eq!(f.controller.role(), Some(Role::Guest));
        assert_eq!(f.channel.sent(), vec![OutboundEvent::Invite(RoomId::new("R1"))]);

        f.controller.on_channel_open().unwrap();
        assert!(f.controller.state().is_idle());

        f.controller.on_incoming_message("OFFER".into()).unwrap();
        assert!(f.controller.state().is_connecting());
        let log = f.peers.log();
        assert_eq!(log.created, 1);
        assert_eq!(log.processed, vec!["OFFER".to_string()]);
        assert!(log.attached.is_empty());

        // Media arriving later is attached to the live session.
        f.controller.on_media_acquired(stream("cam")).unwrap();
        let log = f.peers.log();
        assert_eq!(log.created, 1);
        assert_eq!(log.attached, vec!["cam".to_string()]);
    }

    #[tokio::test]
    async fn test_incoming_messages_forwarded_in_order() {
        let mut f = fixture();
        f.controller
            .start(RoomAssignment::Join(RoomId::new("R1")))
            .await
            .unwrap();

        for payload in ["OFFER", "CANDIDATE 1", "CANDIDATE 2"] {
            f.controller.on_incoming_message(payload.into()).unwrap();
        }
        assert_eq!(
            f.peers.log().processed,
            vec!["OFFER", "CANDIDATE 1", "CANDIDATE 2"]
        );
        assert_eq!(f.peers.log().created, 1);
    }

    #[tokio::test]
    async fn test_error_sentinel_is_dropped() {
        let mut f = fixture();
        f.controller
            .start(RoomAssignment::Join(RoomId::new("R1")))
            .await
            .unwrap();

        f.controller
            .on_incoming_message(r#"{"messageType":"ERROR","code":3}"#.to_string())
            .unwrap();
        f.controller.on_incoming_message(String::new()).unwrap();

        assert!(f.controller.state().is_idle());
        assert_eq!(f.peers.log().created, 0);
    }

    #[tokio::test]
    async fn test_host_drops_signal_before_gate() {
        let mut f = fixture();
        f.controller.start(RoomAssignment::AwaitRoom).await.unwrap();
        f.controller.on_room_assigned(RoomId::new("R1")).unwrap();

        f.controller.on_incoming_message("ANSWER".into()).unwrap();
        assert!(f.controller.state().is_idle());
        assert_eq!(f.peers.log().created, 0);
    }

    #[tokio::test]
    async fn test_outgoing_signals_relayed_verbatim_in_order() {
        let mut f = active_host().await;

        for payload in ["SDP OFFER", "CANDIDATE a", "CANDIDATE b"] {
            f.controller.on_outgoing_signal(payload.into()).await.unwrap();
        }
        assert_eq!(
            f.channel.sent(),
            vec![
                OutboundEvent::Message("SDP OFFER".into()),
                OutboundEvent::Message("CANDIDATE a".into()),
                OutboundEvent::Message("CANDIDATE b".into()),
            ]
        );
    }

    /// Active session, remote bye → Ended, handle discarded without close.
    #[tokio::test]
    async fn test_remote_bye_scenario() {
        let mut f = active_host().await;
        drain(&mut f.notices);

        f.controller.on_remote_bye();

        assert_eq!(f.controller.state().end_reason(), Some(EndReason::RemoteLeft));
        assert!(!f.controller.has_peer_session());
        assert_eq!(f.controller.role(), None);
        assert_eq!(f.controller.room(), Some(&RoomId::new("R1")));
        assert!(!f.controller.record().started);

        let log = f.peers.log();
        assert_eq!(log.closed, 0);
        assert_eq!(log.dropped, 1);
        assert_eq!(drain(&mut f.notices), vec![SessionNotice::PartnerLeft]);

        // Readiness flags and stray room assignments do not restart anything.
        f.controller.on_channel_open().unwrap();
        f.controller.on_media_acquired(stream("cam")).unwrap();
        f.controller.on_room_assigned(RoomId::new("R1")).unwrap();
        f.controller.evaluate_start_gate().unwrap();
        f.controller.on_incoming_message(r#"{"type":"ERROR"}"#.into()).unwrap();
        assert!(f.controller.state().is_ended());
        assert_eq!(f.peers.log().created, 1);
    }

    #[tokio::test]
    async fn test_new_partner_rejoins_after_bye() {
        let mut f = active_host().await;
        f.controller.on_remote_bye();
        drain(&mut f.notices);

        f.controller.on_incoming_message("OFFER2".into()).unwrap();
        f.controller.on_incoming_message("CANDIDATE".into()).unwrap();

        assert!(f.controller.state().is_connecting());
        assert_eq!(f.controller.role(), Some(Role::Host));
        assert_eq!(f.controller.room(), Some(&RoomId::new("R1")));
        let log = f.peers.log();
        assert_eq!(log.created, 2);
        assert_eq!(log.attached, vec!["cam".to_string(), "cam".to_string()]);
        assert_eq!(log.processed, vec!["OFFER2", "CANDIDATE"]);
        assert_eq!(drain(&mut f.notices), vec![SessionNotice::Connecting]);

        f.controller.on_remote_stream_added(RemoteStream::new("remote2"));
        assert!(f.controller.state().is_active());
    }

    #[tokio::test]
    async fn test_hang_up_after_bye_leaves_room() {
        let mut f = active_host().await;
        f.controller.on_remote_bye();

        f.controller.hang_up().await.unwrap();
        assert_eq!(f.controller.room(), None);
        assert!(f.controller.record().is_finished());
        assert_eq!(f.channel.count(&OutboundEvent::Exit), 1);

        f.controller.on_incoming_message("OFFER2".into()).unwrap();
        assert_eq!(f.peers.log().created, 1);

        // Nothing left to leave.
        f.controller.hang_up().await.unwrap();
        assert_eq!(f.channel.count(&OutboundEvent::Exit), 1);
    }

    #[tokio::test]
    async fn test_shutdown_disconnects_channel() {
        let mut f = fixture();
        f.controller
            .start(RoomAssignment::Join(RoomId::new("R1")))
            .await
            .unwrap();
        f.controller.on_incoming_message("OFFER".into()).unwrap();

        f.controller.shutdown().await;
        assert_eq!(f.channel.disconnects(), 1);
        assert!(!f.controller.has_peer_session());
        assert_eq!(f.peers.log().closed, 1);
    }

    #[tokio::test]
    async fn test_bye_while_idle_is_ignored() {
        let mut f = fixture();
        f.controller.start(RoomAssignment::AwaitRoom).await.unwrap();
        f.controller.on_room_assigned(RoomId::new("R1")).unwrap();

        f.controller.on_remote_bye();
        assert!(f.controller.state().is_idle());
        assert_eq!(f.controller.role(), Some(Role::Host));
    }

    /// Active session, user hangs up twice → one close, one exit.
    #[tokio::test]
    async fn test_hang_up_scenario() {
        let mut f = active_host().await;

        f.controller.hang_up().await.unwrap();
        f.controller.hang_up().await.unwrap();

        assert_eq!(f.controller.state().end_reason(), Some(EndReason::LocalHangUp));
        assert!(!f.controller.has_peer_session());
        assert_eq!(f.peers.log().closed, 1);
        assert_eq!(f.channel.count(&OutboundEvent::Exit), 1);
        assert!(drain(&mut f.notices).contains(&SessionNotice::CallEnded));
    }

    #[tokio::test]
    async fn test_hang_up_while_idle_is_noop() {
        let mut f = fixture();
        f.controller.start(RoomAssignment::AwaitRoom).await.unwrap();

        f.controller.hang_up().await.unwrap();
        assert!(f.controller.state().is_idle());
        assert!(f.channel.sent().is_empty());
    }

    #[tokio::test]
    async fn test_signals_after_hang_up_are_dropped() {
        let mut f = active_host().await;
        f.controller.hang_up().await.unwrap();

        f.controller.on_outgoing_signal("LATE".into()).await.unwrap();
        f.controller.on_incoming_message("LATE".into()).unwrap();

        assert_eq!(f.channel.count(&OutboundEvent::Message("LATE".into())), 0);
        assert!(!f.peers.log().processed.contains(&"LATE".to_string()));
    }

    #[tokio::test]
    async fn test_exit_send_failure_still_ends_session() {
        let mut f = fixture_with(MockChannel::failing(), MockPeerFactory::new());
        f.controller.start(RoomAssignment::AwaitRoom).await.unwrap();
        f.controller.on_room_assigned(RoomId::new("R1")).unwrap();
        f.controller.on_media_acquired(stream("cam")).unwrap();
        f.controller.on_channel_open().unwrap();

        let result = f.controller.hang_up().await;
        assert!(matches!(result, Err(SessionError::Channel(_))));
        assert!(f.controller.state().is_ended());
        assert!(!f.controller.has_peer_session());
        assert_eq!(f.peers.log().closed, 1);
    }

    #[tokio::test]
    async fn test_capture_failure_ends_idle_session() {
        let mut f = fixture();
        f.controller.start(RoomAssignment::AwaitRoom).await.unwrap();

        f.controller
            .on_media_failed(CaptureError::PermissionDenied)
            .unwrap();

        assert_eq!(f.controller.state().end_reason(), Some(EndReason::CaptureFailed));
        assert!(drain(&mut f.notices).iter().any(|n| matches!(
            n,
            SessionNotice::CaptureFailed { message } if message.contains("denied")
        )));
    }

    #[tokio::test]
    async fn test_peer_setup_failure_ends_session() {
        let mut f = fixture_with(MockChannel::new(), MockPeerFactory::failing());
        f.controller.start(RoomAssignment::AwaitRoom).await.unwrap();
        f.controller.on_room_assigned(RoomId::new("R1")).unwrap();
        f.controller.on_media_acquired(stream("cam")).unwrap();

        let result = f.controller.on_channel_open();
        assert!(matches!(result, Err(SessionError::PeerSession(_))));
        assert_eq!(f.controller.state().end_reason(), Some(EndReason::SetupFailed));
        assert!(!f.controller.has_peer_session());
    }

    #[tokio::test]
    async fn test_channel_error_and_close_only_log() {
        let mut f = active_host().await;

        f.controller
            .handle_channel_event(ChannelEvent::Error("transport reset".into()))
            .unwrap();
        f.controller.handle_channel_event(ChannelEvent::Closed).unwrap();

        assert!(f.controller.state().is_active());
        assert!(f.controller.has_peer_session());
    }

    #[tokio::test]
    async fn test_remote_stream_events() {
        let mut f = fixture();
        f.controller
            .start(RoomAssignment::Join(RoomId::new("R1")))
            .await
            .unwrap();
        f.controller.on_incoming_message("OFFER".into()).unwrap();
        drain(&mut f.notices);

        f.controller.on_remote_stream_added(RemoteStream::new("r"));
        f.controller.on_remote_stream_added(RemoteStream::new("r"));
        f.controller.on_remote_stream_removed();

        assert!(f.controller.state().is_active(), "removal does not end the session");
        assert_eq!(
            drain(&mut f.notices),
            vec![
                SessionNotice::InSession {
                    remote: RemoteStream::new("r")
                },
                SessionNotice::RemoteStreamRemoved,
            ]
        );
    }

    #[tokio::test]
    async fn test_guest_ignores_room_assignment() {
        let mut f = fixture();
        f.controller
            .start(RoomAssignment::Join(RoomId::new("R1")))
            .await
            .unwrap();

        f.controller.on_room_assigned(RoomId::new("R2")).unwrap();
        assert_eq!(f.controller.role(), Some(Role::Guest));
        assert_eq!(f.controller.room(), Some(&RoomId::new("R1")));
    }
}
