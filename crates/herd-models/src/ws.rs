//! Real-time stream message types.
//!
//! These messages keep compatibility with the browser live-camera client:
//! every frame is a JSON text message carrying a base64 image, and every
//! inbound message produces exactly one outbound message.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Number;

use crate::detection::Detection;

/// Inbound message envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamRequest {
    /// A frame to run detection on
    Frame {
        /// Base64 image, optionally prefixed with a data URL header
        #[serde(default)]
        data: String,
        /// Client clock value, echoed back unchanged
        #[serde(default = "default_timestamp")]
        #[schemars(with = "f64")]
        timestamp: Number,
    },

    /// Keepalive
    Ping,
}

fn default_timestamp() -> Number {
    Number::from(0)
}

impl StreamRequest {
    /// Parse a text frame into a request envelope.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// Strip a `data:<mime>;base64,` prefix if present.
pub fn strip_data_url_prefix(data: &str) -> &str {
    match data.find("base64,") {
        Some(idx) => &data[idx + "base64,".len()..],
        None => data,
    }
}

/// Outbound message types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum StreamMessageType {
    Detection,
    Pong,
    Error,
}

impl StreamMessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamMessageType::Detection => "detection",
            StreamMessageType::Pong => "pong",
            StreamMessageType::Error => "error",
        }
    }
}

/// Outbound message envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamMessage {
    /// Detection result for one submitted frame
    Detection {
        /// 1-based count of frames processed on this connection
        frame_number: u64,
        cows_count: usize,
        detections: Vec<Detection>,
        /// Echo of the request timestamp
        #[schemars(with = "f64")]
        timestamp: Number,
    },

    /// Keepalive acknowledgement
    Pong,

    /// Content-level error; the connection stays open
    Error { message: String },
}

impl StreamMessage {
    /// Create a detection message.
    pub fn detection(frame_number: u64, detections: Vec<Detection>, timestamp: Number) -> Self {
        StreamMessage::Detection {
            frame_number,
            cows_count: detections.len(),
            detections,
            timestamp,
        }
    }

    /// Create an error message.
    pub fn error(message: impl Into<String>) -> Self {
        StreamMessage::Error {
            message: message.into(),
        }
    }

    /// Get the message type.
    pub fn message_type(&self) -> StreamMessageType {
        match self {
            StreamMessage::Detection { .. } => StreamMessageType::Detection,
            StreamMessage::Pong => StreamMessageType::Pong,
            StreamMessage::Error { .. } => StreamMessageType::Error,
        }
    }
}

/// Classification of the last content-level error seen by a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum StreamErrorKind {
    /// The envelope was not a recognised JSON message
    InvalidMessage,
    /// The frame payload could not be decoded into an image
    UndecodableFrame,
    /// The detection engine failed on the frame
    EngineFailure,
}

impl StreamErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamErrorKind::InvalidMessage => "invalid_message",
            StreamErrorKind::UndecodableFrame => "undecodable_frame",
            StreamErrorKind::EngineFailure => "engine_failure",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::BoundingBox;

    #[test]
    fn test_parse_frame_request() {
        let req = StreamRequest::parse(r#"{"type":"frame","data":"abcd","timestamp":1712.5}"#).unwrap();
        match req {
            StreamRequest::Frame { data, timestamp } => {
                assert_eq!(data, "abcd");
                assert_eq!(timestamp.as_f64(), Some(1712.5));
            }
            other => panic!("Expected frame, got {:?}", other),
        }
    }

    #[test]
    fn test_frame_timestamp_defaults_to_zero() {
        let req = StreamRequest::parse(r#"{"type":"frame","data":"abcd"}"#).unwrap();
        assert_eq!(
            req,
            StreamRequest::Frame {
                data: "abcd".to_string(),
                timestamp: Number::from(0)
            }
        );
    }

    #[test]
    fn test_parse_ping() {
        assert_eq!(StreamRequest::parse(r#"{"type":"ping"}"#).unwrap(), StreamRequest::Ping);
    }

    #[test]
    fn test_unknown_or_malformed_envelopes_are_rejected() {
        assert!(StreamRequest::parse("not json").is_err());
        assert!(StreamRequest::parse(r#"{"type":"subscribe"}"#).is_err());
        assert!(StreamRequest::parse(r#"{"data":"abcd"}"#).is_err());
        assert!(StreamRequest::parse(r#"{"type":"frame","timestamp":"soon"}"#).is_err());
    }

    #[test]
    fn test_strip_data_url_prefix() {
        assert_eq!(strip_data_url_prefix("data:image/jpeg;base64,QUJD"), "QUJD");
        assert_eq!(strip_data_url_prefix("QUJD"), "QUJD");
    }

    #[test]
    fn test_detection_message_serialization() {
        let det = Detection::new("cow", 0.5, BoundingBox::new(1.0, 2.0, 3.0, 4.0));
        let msg = StreamMessage::detection(7, vec![det], Number::from(1234));
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"detection\""));
        assert!(json.contains("\"frame_number\":7"));
        assert!(json.contains("\"cows_count\":1"));
        assert!(json.contains("\"timestamp\":1234"));
        assert_eq!(msg.message_type(), StreamMessageType::Detection);
    }

    #[test]
    fn test_pong_and_error_serialization() {
        assert_eq!(serde_json::to_string(&StreamMessage::Pong).unwrap(), r#"{"type":"pong"}"#);
        assert_eq!(
            serde_json::to_string(&StreamMessage::error("invalid message format")).unwrap(),
            r#"{"type":"error","message":"invalid message format"}"#
        );
    }
}
