#![deny(unreachable_patterns)]
//! Media pipeline for the herdwatch backend.
//!
//! This crate provides:
//! - The detection engine adapter contract and its wrappers
//! - Image and stream-payload decoding into RGB rasters
//! - FFprobe metadata and an FFmpeg rawvideo frame source
//! - Fixed-cadence video analysis with cancellation support

pub mod analyzer;
pub mod decode;
pub mod detector;
pub mod error;
pub mod frame;
pub mod frame_source;
pub mod probe;

pub use analyzer::{AnalyzerConfig, VideoAnalyzer, DEFAULT_MAX_DURATION_SECS};
pub use decode::{decode_base64_frame, decode_image};
pub use detector::{
    filter_target_class, BlockingDetector, BlockingEngine, Detector, SerializedDetector,
    StaticDetector,
};
pub use error::{MediaError, MediaResult};
pub use frame::RasterFrame;
pub use frame_source::{FfmpegFrameSource, FrameSource};
pub use probe::{probe_video, VideoInfo};
