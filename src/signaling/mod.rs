//! Signaling channel boundary.
//!
//! The session talks to the other participant through a publish/subscribe
//! channel. Inbound traffic arrives as [`ChannelEvent`]s on an mpsc receiver;
//! outbound traffic goes through [`SignalingChannel::emit`].

pub mod frame;

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::session::RoomId;

pub use frame::{FrameError, decode_frame, encode_frame};

/// An event delivered by the signaling channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// The channel is connected. May repeat on reconnect.
    Connected,
    /// Opaque signaling payload from the remote participant.
    Message(String),
    /// The remote participant left.
    Bye,
    /// Transport-level diagnostic.
    Error(String),
    /// The channel was closed.
    Closed,
    /// The server allocated a room for this (host) participant.
    RoomAssigned(RoomId),
}

/// An event sent to the signaling channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundEvent {
    /// Announce intent to join `room`.
    Invite(RoomId),
    /// Relay a signaling payload to the remote participant.
    Message(String),
    /// Leave the call.
    Exit,
}

/// Sending half of a connected signaling channel.
#[async_trait]
pub trait SignalingChannel: Send + Sync {
    async fn emit(&self, event: OutboundEvent) -> Result<(), anyhow::Error>;

    /// Close the underlying transport.
    async fn disconnect(&self);
}

/// Opens signaling channels.
#[async_trait]
pub trait SignalingConnector: Send + Sync {
    /// Open a channel and return it along with its stream of events.
    async fn connect(
        &self,
    ) -> Result<(Arc<dyn SignalingChannel>, mpsc::Receiver<ChannelEvent>), anyhow::Error>;
}

pub mod mock {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Mutex, PoisonError};

    /// A channel that records everything emitted on it.
    #[derive(Default)]
    pub struct MockChannel {
        sent: Mutex<Vec<OutboundEvent>>,
        disconnects: AtomicUsize,
        fail_sends: bool,
    }

    impl MockChannel {
        pub fn new() -> Self {
            Self::default()
        }

        /// A channel whose sends always fail.
        pub fn failing() -> Self {
            Self {
                fail_sends: true,
                ..Self::default()
            }
        }

        pub fn sent(&self) -> Vec<OutboundEvent> {
            self.sent
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        }

        /// How many times `disconnect` was called.
        pub fn disconnects(&self) -> usize {
            self.disconnects.load(Ordering::SeqCst)
        }

        /// Number of emitted events equal to `event`.
        pub fn count(&self, event: &OutboundEvent) -> usize {
            self.sent().iter().filter(|e| *e == event).count()
        }
    }

    #[async_trait]
    impl SignalingChannel for MockChannel {
        async fn emit(&self, event: OutboundEvent) -> Result<(), anyhow::Error> {
            if self.fail_sends {
                return Err(anyhow::anyhow!("socket is closed"));
            }
            self.sent
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(event);
            Ok(())
        }

        async fn disconnect(&self) {
            self.disconnects.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Connector handing out a shared [`MockChannel`]; tests push inbound
    /// events through the sender returned by [`MockConnector::new`].
    pub struct MockConnector {
        channel: Arc<MockChannel>,
        events: Mutex<Option<mpsc::Receiver<ChannelEvent>>>,
    }

    impl MockConnector {
        pub fn new(channel: Arc<MockChannel>) -> (Self, mpsc::Sender<ChannelEvent>) {
            let (tx, rx) = mpsc::channel(64);
            let connector = Self {
                channel,
                events: Mutex::new(Some(rx)),
            };
            (connector, tx)
        }
    }

    #[async_trait]
    impl SignalingConnector for MockConnector {
        async fn connect(
            &self,
        ) -> Result<(Arc<dyn SignalingChannel>, mpsc::Receiver<ChannelEvent>), anyhow::Error>
        {
            let rx = self
                .events
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take()
                .ok_or_else(|| anyhow::anyhow!("mock connector already used"))?;
            let channel: Arc<dyn SignalingChannel> = self.channel.clone();
            Ok((channel, rx))
        }
    }
}
