//! Wire encoding for P2P frames.
//!
//! # Wire format
//!
//! Every message travels as a length-delimited frame:
//!
//! ```text
//! [len: u32 BE][topic: u8][body: borsh]
//! ```
//!
//! The topic tag selects the body type:
//!
//! - `0x01`: RainTree envelope (broadcast traffic)
//! - `0x02`: bare HotStuff message (direct sends, e.g. votes to the leader)

use monsoon_core::{HotstuffMessage, OutboundMessage};
use monsoon_p2p::RainTreeEnvelope;
use thiserror::Error;

/// Topic tag for RainTree envelopes.
pub const TOPIC_RAINTREE: u8 = 0x01;
/// Topic tag for direct HotStuff messages.
pub const TOPIC_DIRECT: u8 = 0x02;

/// Upper bound on a frame body; anything larger is rejected before decode.
pub const MAX_FRAME_BYTES: usize = 8 * 1024 * 1024;

/// Errors from frame encoding and decoding.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("frame too short")]
    FrameTooShort,

    #[error("frame of {0} bytes exceeds the {MAX_FRAME_BYTES}-byte limit")]
    FrameTooLarge(usize),

    #[error("unknown topic tag {0:#04x}")]
    UnknownTopic(u8),

    #[error("body decode failed: {0}")]
    Decode(String),

    #[error("body encode failed: {0}")]
    Encode(String),
}

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Envelope(RainTreeEnvelope),
    Direct(HotstuffMessage),
}

/// Encode a RainTree envelope into a full frame.
pub fn encode_envelope(envelope: &RainTreeEnvelope) -> Result<Vec<u8>, CodecError> {
    let body = borsh::to_vec(envelope).map_err(|e| CodecError::Encode(e.to_string()))?;
    Ok(frame(TOPIC_RAINTREE, &body))
}

/// Encode a direct HotStuff message into a full frame.
pub fn encode_direct(message: &HotstuffMessage) -> Result<Vec<u8>, CodecError> {
    let body = borsh::to_vec(message).map_err(|e| CodecError::Encode(e.to_string()))?;
    Ok(frame(TOPIC_DIRECT, &body))
}

/// Serialize an outbound message into RainTree payload bytes.
pub fn encode_payload(message: &OutboundMessage) -> Result<Vec<u8>, CodecError> {
    borsh::to_vec(message).map_err(|e| CodecError::Encode(e.to_string()))
}

/// Decode RainTree payload bytes back into an outbound message.
pub fn decode_payload(bytes: &[u8]) -> Result<OutboundMessage, CodecError> {
    borsh::from_slice(bytes).map_err(|e| CodecError::Decode(e.to_string()))
}

fn frame(topic: u8, body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + 1 + body.len());
    out.extend_from_slice(&((body.len() + 1) as u32).to_be_bytes());
    out.push(topic);
    out.extend_from_slice(body);
    out
}

/// Decode one frame's contents (the bytes after the length prefix).
pub fn decode_frame(data: &[u8]) -> Result<Inbound, CodecError> {
    if data.is_empty() {
        return Err(CodecError::FrameTooShort);
    }
    if data.len() > MAX_FRAME_BYTES {
        return Err(CodecError::FrameTooLarge(data.len()));
    }
    let body = &data[1..];
    match data[0] {
        TOPIC_RAINTREE => borsh::from_slice(body)
            .map(Inbound::Envelope)
            .map_err(|e| CodecError::Decode(e.to_string())),
        TOPIC_DIRECT => borsh::from_slice(body)
            .map(Inbound::Direct)
            .map_err(|e| CodecError::Decode(e.to_string())),
        other => Err(CodecError::UnknownTopic(other)),
    }
}

/// Split the length prefix off a buffered stream. Returns the frame
/// contents and the bytes consumed, or `None` when more data is needed.
pub fn split_frame(buffer: &[u8]) -> Result<Option<(&[u8], usize)>, CodecError> {
    if buffer.len() < 4 {
        return Ok(None);
    }
    let len = u32::from_be_bytes([buffer[0], buffer[1], buffer[2], buffer[3]]) as usize;
    if len > MAX_FRAME_BYTES {
        return Err(CodecError::FrameTooLarge(len));
    }
    if buffer.len() < 4 + len {
        return Ok(None);
    }
    Ok(Some((&buffer[4..4 + len], 4 + len)))
}
