//! Shared data models for the herdwatch backend.
//!
//! This crate provides Serde-serializable types for:
//! - Detections and bounding boxes
//! - Per-frame results and video analysis timelines
//! - Real-time stream message schemas
//! - Detection records kept by the record store

pub mod analysis;
pub mod detection;
pub mod record;
pub mod ws;

// Re-export common types
pub use analysis::{
    AnalysisCompletion, FrameResult, PartialReason, TimelineAccumulator, VideoAnalysis,
};
pub use detection::{BoundingBox, Detection};
pub use record::{DetectionStats, Recognition, RecognitionSummary};
pub use ws::{
    strip_data_url_prefix, StreamErrorKind, StreamMessage, StreamMessageType, StreamRequest,
};
