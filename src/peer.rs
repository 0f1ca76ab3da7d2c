//! Peer session boundary.
//!
//! The negotiation primitive (SDP/ICE) lives behind [`PeerSession`]. It is
//! created with a [`PeerEventSink`] and reports everything it produces through
//! that sink: signaling payloads to relay, remote streams, lifecycle callbacks.

use log::debug;
use tokio::sync::mpsc;

use crate::media::{LocalStream, RemoteStream};

/// Callbacks raised by a peer session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerEvent {
    /// A signaling payload to deliver to the remote participant.
    OutgoingSignal(String),
    /// Negotiation started.
    Connecting,
    /// Negotiation completed.
    Opened,
    RemoteStreamAdded(RemoteStream),
    RemoteStreamRemoved,
}

/// Where a peer session delivers its [`PeerEvent`]s.
#[derive(Debug, Clone)]
pub struct PeerEventSink {
    tx: mpsc::UnboundedSender<PeerEvent>,
}

impl PeerEventSink {
    pub fn new(tx: mpsc::UnboundedSender<PeerEvent>) -> Self {
        Self { tx }
    }

    /// Create a sink and the receiver the event loop reads from.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<PeerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    pub fn emit(&self, event: PeerEvent) {
        if self.tx.send(event).is_err() {
            debug!("Peer event dropped, session loop is gone");
        }
    }

    pub fn outgoing_signal(&self, payload: impl Into<String>) {
        self.emit(PeerEvent::OutgoingSignal(payload.into()));
    }
}

/// A live negotiation with the remote participant.
pub trait PeerSession: Send {
    /// Lend the local stream. It stays owned by the caller and outlives the session.
    fn attach_local_stream(&mut self, stream: &LocalStream);

    /// Feed an incoming signaling payload into negotiation.
    fn process_message(&mut self, payload: &str) -> Result<(), anyhow::Error>;

    /// Release negotiation resources. Safe to call mid-negotiation.
    fn close(&mut self);
}

/// Creates peer sessions.
pub trait PeerSessionFactory: Send + Sync {
    fn create(&self, events: PeerEventSink) -> Result<Box<dyn PeerSession>, anyhow::Error>;
}

/// Exclusively owned peer session plus the bookkeeping the controller needs.
pub struct PeerSessionHandle {
    session: Box<dyn PeerSession>,
    local_attached: bool,
}

impl PeerSessionHandle {
    pub fn new(session: Box<dyn PeerSession>) -> Self {
        Self {
            session,
            local_attached: false,
        }
    }

    pub fn has_local_stream(&self) -> bool {
        self.local_attached
    }

    pub fn attach_local_stream(&mut self, stream: &LocalStream) {
        self.session.attach_local_stream(stream);
        self.local_attached = true;
    }

    pub fn process_message(&mut self, payload: &str) -> Result<(), anyhow::Error> {
        self.session.process_message(payload)
    }

    /// Close the session, consuming the handle so it cannot be reused.
    pub fn close(mut self) {
        self.session.close();
    }
}

impl std::fmt::Debug for PeerSessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerSessionHandle")
            .field("local_attached", &self.local_attached)
            .finish()
    }
}

pub mod mock {
    use super::*;
    use std::sync::{Arc, Mutex, PoisonError};

    /// Everything the mock peer sessions were asked to do.
    #[derive(Debug, Default, Clone)]
    pub struct PeerLog {
        pub created: usize,
        pub attached: Vec<String>,
        pub processed: Vec<String>,
        pub closed: usize,
        pub dropped: usize,
    }

    #[derive(Default)]
    struct Shared {
        log: Mutex<PeerLog>,
        sinks: Mutex<Vec<PeerEventSink>>,
    }

    impl Shared {
        fn with_log<R>(&self, f: impl FnOnce(&mut PeerLog) -> R) -> R {
            let mut log = self.log.lock().unwrap_or_else(PoisonError::into_inner);
            f(&mut log)
        }
    }

    /// Records peer session activity and lets tests raise peer events.
    #[derive(Clone, Default)]
    pub struct MockPeerFactory {
        shared: Arc<Shared>,
        fail_create: bool,
    }

    impl MockPeerFactory {
        pub fn new() -> Self {
            Self::default()
        }

        /// A factory whose `create` always fails.
        pub fn failing() -> Self {
            Self {
                fail_create: true,
                ..Self::default()
            }
        }

        pub fn log(&self) -> PeerLog {
            self.shared.with_log(|log| log.clone())
        }

        /// Sink handed to the most recently created session.
        pub fn last_sink(&self) -> Option<PeerEventSink> {
            self.shared
                .sinks
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .last()
                .cloned()
        }
    }

    impl PeerSessionFactory for MockPeerFactory {
        fn create(&self, events: PeerEventSink) -> Result<Box<dyn PeerSession>, anyhow::Error> {
            if self.fail_create {
                return Err(anyhow::anyhow!("peer connection unavailable"));
            }
            self.shared.with_log(|log| log.created += 1);
            self.shared
                .sinks
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(events);
            Ok(Box::new(MockPeerSession {
                shared: Arc::clone(&self.shared),
            }))
        }
    }

    struct MockPeerSession {
        shared: Arc<Shared>,
    }

    impl PeerSession for MockPeerSession {
        fn attach_local_stream(&mut self, stream: &LocalStream) {
            let id = stream.id().to_string();
            self.shared.with_log(|log| log.attached.push(id));
        }

        fn process_message(&mut self, payload: &str) -> Result<(), anyhow::Error> {
            self.shared
                .with_log(|log| log.processed.push(payload.to_string()));
            Ok(())
        }

        fn close(&mut self) {
            self.shared.with_log(|log| log.closed += 1);
        }
    }

    impl Drop for MockPeerSession {
        fn drop(&mut self) {
            self.shared.with_log(|log| log.dropped += 1);
        }
    }
}
