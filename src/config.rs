use crate::media::MediaConstraints;

/// Configuration for a call session.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Page URL the invitation link is built from.
    pub base_url: String,
    /// Location parameter that selects the guest path.
    pub room_param: String,
    /// Incoming payloads containing this marker are dropped.
    pub error_sentinel: String,
    /// Media requested from the capture device.
    pub media: MediaConstraints,
    /// Buffered status notices per subscriber.
    pub notice_capacity: usize,
    /// Pending user commands (hang-up).
    pub command_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8888/".to_string(),
            room_param: "room".to_string(),
            error_sentinel: "\"ERROR\"".to_string(),
            media: MediaConstraints::default(),
            notice_capacity: 32,
            command_capacity: 8,
        }
    }
}
