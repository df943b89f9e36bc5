//! Broker↔worker message codec.
//!
//! Every frame payload is classified exactly once, here, into an
//! [`InboundMessage`]. Nothing past this boundary inspects raw payload bytes.
//!
//! | Direction      | Payload                                          |
//! |----------------|--------------------------------------------------|
//! | worker→broker  | first frame: UTF-8 filter name (registration)    |
//! | both           | zero-length frame (heartbeat probe / ack)        |
//! | broker→worker  | JSON [`DispatchEnvelope`]                        |
//! | worker→broker  | JSON [`ReplyEnvelope`]                           |

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use super::work_unit::WorkUnit;
use crate::constants::protocol::MAX_FILTER_NAME_LEN;

/// Work sent to a worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchEnvelope {
    pub request_id: String,
    pub filter_name: String,
    pub payload: Vec<u8>,
}

/// A worker's answer. An empty `result_set` means "no answer".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplyEnvelope {
    pub request_id: String,
    #[serde(default)]
    pub result_set: Vec<serde_json::Value>,
    pub filter_name: String,
}

impl ReplyEnvelope {
    pub fn has_result(&self) -> bool {
        !self.result_set.is_empty()
    }
}

/// A decoded frame from a worker connection
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    Registration { filter_name: String },
    Heartbeat,
    Reply(ReplyEnvelope),
}

#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("Registration is not valid UTF-8: {0}")]
    RegistrationNotUtf8(#[from] std::str::Utf8Error),

    #[error("Invalid filter name {name:?}: {reason}")]
    InvalidFilterName { name: String, reason: &'static str },

    #[error("Malformed reply envelope: {0}")]
    MalformedReply(#[source] serde_json::Error),

    #[error("Failed to encode dispatch envelope: {0}")]
    EncodeFailed(#[source] serde_json::Error),

    #[error("Frame of {len} bytes exceeds maximum of {max}")]
    FrameTooLarge { len: usize, max: u32 },

    #[error("Connection I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Decode a frame from a connection. `registered` selects how a non-empty
/// payload is read: a filter name before registration, a reply after.
pub fn decode_inbound(registered: bool, payload: &[u8]) -> Result<InboundMessage, WireError> {
    if !registered {
        let filter_name = decode_registration(payload)?;
        return Ok(InboundMessage::Registration { filter_name });
    }

    if payload.is_empty() {
        return Ok(InboundMessage::Heartbeat);
    }

    serde_json::from_slice(payload)
        .map(InboundMessage::Reply)
        .map_err(WireError::MalformedReply)
}

/// Parse a registration payload as a filter name
pub fn decode_registration(payload: &[u8]) -> Result<String, WireError> {
    let raw = std::str::from_utf8(payload)?;
    let name = raw.trim();

    if name.is_empty() {
        return Err(WireError::InvalidFilterName {
            name: raw.to_string(),
            reason: "filter name is empty",
        });
    }
    if name.len() > MAX_FILTER_NAME_LEN {
        return Err(WireError::InvalidFilterName {
            name: name.chars().take(32).collect(),
            reason: "filter name is too long",
        });
    }
    if name.chars().any(char::is_control) {
        return Err(WireError::InvalidFilterName {
            name: name.escape_debug().to_string(),
            reason: "filter name contains control characters",
        });
    }

    Ok(name.to_string())
}

pub fn encode_dispatch(unit: &WorkUnit, filter: &str) -> Result<Bytes, WireError> {
    let envelope = DispatchEnvelope {
        request_id: unit.metadata.request_id.clone(),
        filter_name: filter.to_string(),
        payload: unit.payload.clone(),
    };
    serde_json::to_vec(&envelope)
        .map(Bytes::from)
        .map_err(WireError::EncodeFailed)
}

pub fn encode_reply(reply: &ReplyEnvelope) -> Result<Bytes, WireError> {
    serde_json::to_vec(reply)
        .map(Bytes::from)
        .map_err(WireError::EncodeFailed)
}

pub fn heartbeat_frame() -> Bytes {
    Bytes::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_first_frame_is_registration() {
        let message = decode_inbound(false, b"thumbnail\n").unwrap();
        assert_eq!(
            message,
            InboundMessage::Registration {
                filter_name: "thumbnail".to_string()
            }
        );
    }

    #[test]
    fn test_malformed_registrations() {
        assert!(matches!(
            decode_registration(&[0xff, 0xfe]),
            Err(WireError::RegistrationNotUtf8(_))
        ));
        assert!(matches!(
            decode_registration(b"   "),
            Err(WireError::InvalidFilterName { .. })
        ));
        assert!(matches!(
            decode_registration(b""),
            Err(WireError::InvalidFilterName { .. })
        ));
        assert!(matches!(
            decode_registration(b"bad\x07name"),
            Err(WireError::InvalidFilterName { .. })
        ));
        let long = vec![b'a'; MAX_FILTER_NAME_LEN + 1];
        assert!(decode_registration(&long).is_err());
    }

    #[test]
    fn test_empty_frame_after_registration_is_heartbeat() {
        assert_eq!(decode_inbound(true, b"").unwrap(), InboundMessage::Heartbeat);
    }

    #[test]
    fn test_reply_decoding() {
        let payload = json!({
            "request_id": "r-1",
            "result_set": [{"label": "cat", "score": 0.93}],
            "filter_name": "classify"
        })
        .to_string();

        match decode_inbound(true, payload.as_bytes()).unwrap() {
            InboundMessage::Reply(reply) => {
                assert_eq!(reply.request_id, "r-1");
                assert!(reply.has_result());
            }
            other => panic!("expected reply, got {other:?}"),
        }
    }

    #[test]
    fn test_reply_without_result_set_is_empty() {
        let payload = br#"{"request_id":"r-2","filter_name":"classify"}"#;
        match decode_inbound(true, payload).unwrap() {
            InboundMessage::Reply(reply) => assert!(!reply.has_result()),
            other => panic!("expected reply, got {other:?}"),
        }
    }

    #[test]
    fn test_garbage_reply_is_decode_failure() {
        assert!(matches!(
            decode_inbound(true, b"{not json"),
            Err(WireError::MalformedReply(_))
        ));
    }
}
