//! JSON text frames exchanged with the signaling server.
//!
//! Every frame is `{"event": <name>, "data": <value>}`. Inbound names are
//! `message`, `bye`, `error`, `close` and `getRoom`; outbound names are
//! `invite`, `message` and `exit`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use super::{ChannelEvent, OutboundEvent};
use crate::session::RoomId;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("malformed frame: {0}")]
    Json(#[from] serde_json::Error),

    #[error("room assignment without a room id")]
    MissingRoomId,
}

#[derive(Deserialize)]
struct InboundFrame {
    event: String,
    #[serde(default)]
    data: Value,
}

#[derive(Serialize)]
#[serde(tag = "event", content = "data", rename_all = "lowercase")]
enum OutboundFrame<'a> {
    Invite(&'a str),
    Message(&'a str),
    Exit,
}

fn value_to_text(value: Value) -> String {
    match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Decode one inbound text frame.
///
/// Returns `Ok(None)` for event names this session does not consume.
pub fn decode_frame(text: &str) -> Result<Option<ChannelEvent>, FrameError> {
    let frame: InboundFrame = serde_json::from_str(text)?;
    let event = match frame.event.as_str() {
        "message" => ChannelEvent::Message(value_to_text(frame.data)),
        "bye" => ChannelEvent::Bye,
        "error" => ChannelEvent::Error(value_to_text(frame.data)),
        "close" => ChannelEvent::Closed,
        "getRoom" => {
            let room = match frame.data.get("roomId") {
                Some(Value::String(s)) if !s.is_empty() => s.clone(),
                Some(Value::Number(n)) => n.to_string(),
                _ => return Err(FrameError::MissingRoomId),
            };
            ChannelEvent::RoomAssigned(RoomId::new(room))
        }
        // Includes chat history and slide sync, which are not part of call setup.
        _ => return Ok(None),
    };
    Ok(Some(event))
}

/// Encode one outbound event as a text frame.
pub fn encode_frame(event: &OutboundEvent) -> Result<String, FrameError> {
    let frame = match event {
        OutboundEvent::Invite(room) => OutboundFrame::Invite(room.as_str()),
        OutboundEvent::Message(payload) => OutboundFrame::Message(payload),
        OutboundEvent::Exit => OutboundFrame::Exit,
    };
    Ok(serde_json::to_string(&frame)?)
}
