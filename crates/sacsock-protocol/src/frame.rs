//! Encoding/decoding of a single event frame.
//!
//! One websocket message carries exactly one named event:
//!
//! ```text
//! <event_name> SOH <type_tag> STX <payload>
//!
//! event_name : UTF-8 bytes, must be non-empty and contain no STX
//! SOH        : 0x01
//! type_tag   : one of 'S' | 'B' | 'J'
//! STX        : 0x02
//! payload    : remaining bytes, opaque
//! ```
//!
//! The decoder splits at the **first** STX: everything before it is the
//! header, everything after it is the payload, so the payload may freely
//! contain STX bytes. Frames tagged `'B'` travel as binary websocket
//! messages; the other two tags travel as text.
//!
//! Decoding failures are reported, not fatal: the caller is expected to
//! drop the message and keep the connection open.

use std::fmt;

use sacsock_core::Payload;
use tracing::error;

use crate::wire::{PayloadTag, SOH, STX};

/// Errors that can arise when decoding a frame.
#[derive(Debug, PartialEq, Eq)]
pub enum FrameError {
    /// No STX separator; there is no payload boundary.
    MissingStx,
    /// The header has no SOH separator between event name and type tag.
    MissingSoh,
    /// The event name before the SOH is empty.
    EmptyEventName,
    /// The event name is not valid UTF-8.
    InvalidEventName,
    /// The byte between SOH and STX is not a known type tag.
    UnknownTypeTag(u8),
    /// The header carries something other than exactly one tag byte.
    MalformedHeader,
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameError::MissingStx => write!(f, "frame has no STX separator"),
            FrameError::MissingSoh => write!(f, "frame header has no SOH separator"),
            FrameError::EmptyEventName => write!(f, "frame has an empty event name"),
            FrameError::InvalidEventName => write!(f, "event name is not valid UTF-8"),
            FrameError::UnknownTypeTag(t) => write!(f, "unknown payload type tag: 0x{t:02x}"),
            FrameError::MalformedHeader => write!(f, "frame header is malformed"),
        }
    }
}

impl std::error::Error for FrameError {}

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedFrame {
    pub event: String,
    pub tag: PayloadTag,
    pub payload: Vec<u8>,
}

/// An encoded outbound frame, already split by websocket message kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireFrame {
    Text(String),
    Binary(Vec<u8>),
}

impl WireFrame {
    pub fn is_binary(&self) -> bool {
        matches!(self, WireFrame::Binary(_))
    }

    /// The raw message body, regardless of frame kind.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            WireFrame::Text(s) => s.as_bytes(),
            WireFrame::Binary(b) => b,
        }
    }
}

/// Encode one event into a websocket message body.
///
/// The payload variant selects the type tag and the frame kind. The event
/// name must not contain STX; names that do will fail to round-trip.
pub fn encode_frame(event: &str, payload: &Payload) -> WireFrame {
    match payload {
        Payload::Bin(data) => {
            let mut buf = Vec::with_capacity(event.len() + 3 + data.len());
            buf.extend_from_slice(event.as_bytes());
            buf.push(SOH);
            buf.push(PayloadTag::Bin as u8);
            buf.push(STX);
            buf.extend_from_slice(data);
            WireFrame::Binary(buf)
        }
        Payload::Str(s) => WireFrame::Text(text_frame(event, PayloadTag::Str, s)),
        Payload::Json(value) => {
            let body = match serde_json::to_string(value) {
                Ok(body) => body,
                Err(e) => {
                    // A Value can always be serialized in practice; an empty
                    // payload still beats dropping the event on the floor.
                    error!(event, error = %e, "failed to serialize JSON payload");
                    String::new()
                }
            };
            WireFrame::Text(text_frame(event, PayloadTag::Json, &body))
        }
    }
}

fn text_frame(event: &str, tag: PayloadTag, body: &str) -> String {
    let mut out = String::with_capacity(event.len() + 3 + body.len());
    out.push_str(event);
    out.push(SOH as char);
    out.push(tag.as_char());
    out.push(STX as char);
    out.push_str(body);
    out
}

/// Decode one websocket message body into an event frame.
pub fn decode_frame(data: &[u8]) -> Result<DecodedFrame, FrameError> {
    let stx = data
        .iter()
        .position(|&b| b == STX)
        .ok_or(FrameError::MissingStx)?;
    let header = &data[..stx];
    let payload = data[stx + 1..].to_vec();

    let soh = header
        .iter()
        .position(|&b| b == SOH)
        .ok_or(FrameError::MissingSoh)?;

    let name = &header[..soh];
    if name.is_empty() {
        return Err(FrameError::EmptyEventName);
    }
    let event = std::str::from_utf8(name)
        .map_err(|_| FrameError::InvalidEventName)?
        .to_string();

    let tag = match &header[soh + 1..] {
        [t] => PayloadTag::from_u8(*t).ok_or(FrameError::UnknownTypeTag(*t))?,
        _ => return Err(FrameError::MalformedHeader),
    };

    Ok(DecodedFrame {
        event,
        tag,
        payload,
    })
}
