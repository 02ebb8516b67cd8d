//! Video analysis results.
//!
//! A [`VideoAnalysis`] is built over a single decode pass by feeding each
//! sampled frame's [`FrameResult`] into a [`TimelineAccumulator`]. The wire
//! names keep compatibility with the existing frontend (`cows_count`,
//! `detections_by_time`, ...).

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::detection::Detection;

/// Detection result for one sampled frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FrameResult {
    /// Zero-based index of the frame in decode order
    pub frame_index: u64,
    /// Presentation time in seconds (`frame_index / fps`)
    pub timestamp: f64,
    /// Number of detections in this frame
    #[serde(rename = "cows_count")]
    pub count: usize,
    pub detections: Vec<Detection>,
}

impl FrameResult {
    pub fn new(frame_index: u64, timestamp: f64, detections: Vec<Detection>) -> Self {
        Self {
            frame_index,
            timestamp,
            count: detections.len(),
            detections,
        }
    }
}

/// Why an analysis pass stopped before the end of the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum PartialReason {
    /// The decoder failed mid-stream
    DecodeFailure,
    /// The detection engine failed on a sampled frame
    EngineFailure,
    /// The pass was cancelled by the caller
    Cancelled,
}

impl PartialReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            PartialReason::DecodeFailure => "decode_failure",
            PartialReason::EngineFailure => "engine_failure",
            PartialReason::Cancelled => "cancelled",
        }
    }
}

/// Whether the timeline covers the whole video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AnalysisCompletion {
    Complete,
    Partial {
        reason: PartialReason,
        message: String,
    },
}

impl AnalysisCompletion {
    pub fn partial(reason: PartialReason, message: impl Into<String>) -> Self {
        AnalysisCompletion::Partial {
            reason,
            message: message.into(),
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, AnalysisCompletion::Complete)
    }
}

/// Aggregated result of one video analysis pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct VideoAnalysis {
    /// Duration in seconds
    pub duration: f64,
    /// Frame rate (fps)
    pub fps: f64,
    pub width: u32,
    pub height: u32,
    /// Frames in the container (never less than the frames decoded)
    pub total_frames: u64,
    /// Frames submitted for detection
    pub analyzed_frames: u64,
    pub total_cows_detected: u64,
    pub max_cows_in_frame: u64,
    pub average_cows_per_frame: f64,
    /// Per-sample results in decode order
    pub detections_by_time: Vec<FrameResult>,
    pub completion: AnalysisCompletion,
}

impl VideoAnalysis {
    pub fn is_complete(&self) -> bool {
        self.completion.is_complete()
    }
}

/// Incremental builder for a [`VideoAnalysis`] timeline.
#[derive(Debug, Default)]
pub struct TimelineAccumulator {
    timeline: Vec<FrameResult>,
    total_detections: u64,
    max_detections: u64,
}

impl TimelineAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a result. Entries must arrive in decode order.
    pub fn push(&mut self, result: FrameResult) {
        debug_assert!(
            self.timeline
                .last()
                .map_or(true, |last| last.timestamp <= result.timestamp),
            "timeline timestamps must be non-decreasing"
        );
        let count = result.count as u64;
        self.total_detections += count;
        self.max_detections = self.max_detections.max(count);
        self.timeline.push(result);
    }

    pub fn analyzed_frames(&self) -> u64 {
        self.timeline.len() as u64
    }

    pub fn total_detections(&self) -> u64 {
        self.total_detections
    }

    /// Finish the pass and produce the immutable analysis.
    #[allow(clippy::too_many_arguments)]
    pub fn finish(
        self,
        duration: f64,
        fps: f64,
        width: u32,
        height: u32,
        total_frames: u64,
        completion: AnalysisCompletion,
    ) -> VideoAnalysis {
        let analyzed_frames = self.timeline.len() as u64;
        let average_cows_per_frame = if analyzed_frames > 0 {
            self.total_detections as f64 / analyzed_frames as f64
        } else {
            0.0
        };

        VideoAnalysis {
            duration,
            fps,
            width,
            height,
            total_frames: total_frames.max(analyzed_frames),
            analyzed_frames,
            total_cows_detected: self.total_detections,
            max_cows_in_frame: self.max_detections,
            average_cows_per_frame,
            detections_by_time: self.timeline,
            completion,
        }
    }
}
