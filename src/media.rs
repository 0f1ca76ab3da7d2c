//! Local media acquisition.
//!
//! Capturing a camera/microphone stream is platform work; the session only
//! needs a [`MediaSource`] that eventually yields a [`LocalStream`] or a
//! [`CaptureError`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::session::CaptureError;

/// What to request from the capture device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaConstraints {
    pub audio: bool,
    pub video: bool,
}

impl Default for MediaConstraints {
    fn default() -> Self {
        Self {
            audio: true,
            video: true,
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
struct StreamInfo {
    id: String,
    audio: bool,
    video: bool,
}

/// Locally captured audio/video stream.
///
/// Cloning is cheap and shares the same underlying stream, so the session can
/// lend it to a peer session while keeping ownership.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalStream(Arc<StreamInfo>);

impl LocalStream {
    pub fn new(id: impl Into<String>, constraints: MediaConstraints) -> Self {
        Self(Arc::new(StreamInfo {
            id: id.into(),
            audio: constraints.audio,
            video: constraints.video,
        }))
    }

    pub fn id(&self) -> &str {
        &self.0.id
    }

    pub fn has_audio(&self) -> bool {
        self.0.audio
    }

    pub fn has_video(&self) -> bool {
        self.0.video
    }
}

/// Stream received from the remote participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteStream {
    pub id: String,
}

impl RemoteStream {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// Asynchronous source of the local media stream.
#[async_trait]
pub trait MediaSource: Send + Sync {
    /// Request access to local media. Resolves once, with the stream or the
    /// reason it could not be captured.
    async fn acquire(&self, constraints: MediaConstraints) -> Result<LocalStream, CaptureError>;
}

pub mod mock {
    use super::*;
    use std::time::Duration;

    /// A media source that resolves after an optional delay.
    pub struct MockMediaSource {
        result: Result<String, CaptureError>,
        delay: Duration,
    }

    impl MockMediaSource {
        /// Succeeds with a stream named `id`.
        pub fn granting(id: impl Into<String>) -> Self {
            Self {
                result: Ok(id.into()),
                delay: Duration::ZERO,
            }
        }

        /// Fails with `error`.
        pub fn failing(error: CaptureError) -> Self {
            Self {
                result: Err(error),
                delay: Duration::ZERO,
            }
        }

        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }
    }

    #[async_trait]
    impl MediaSource for MockMediaSource {
        async fn acquire(
            &self,
            constraints: MediaConstraints,
        ) -> Result<LocalStream, CaptureError> {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.result
                .clone()
                .map(|id| LocalStream::new(id, constraints))
        }
    }

    /// A media source that never resolves, standing in for an unanswered
    /// permission prompt.
    #[derive(Default)]
    pub struct PendingMediaSource;

    #[async_trait]
    impl MediaSource for PendingMediaSource {
        async fn acquire(
            &self,
            _constraints: MediaConstraints,
        ) -> Result<LocalStream, CaptureError> {
            std::future::pending::<Result<LocalStream, CaptureError>>().await
        }
    }
}
