//! Fixed-cadence video analysis.
//!
//! One decode pass over the video: every frame is read, but only frames at
//! least `sample_interval` seconds after the previously sampled frame are
//! materialised and sent to the detector. Results are accumulated into a
//! [`VideoAnalysis`] timeline.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use herd_models::{AnalysisCompletion, FrameResult, PartialReason, TimelineAccumulator, VideoAnalysis};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::detector::Detector;
use crate::error::{MediaError, MediaResult};
use crate::frame_source::{FfmpegFrameSource, FrameSource};

/// Longest video accepted for analysis, in seconds.
pub const DEFAULT_MAX_DURATION_SECS: f64 = 600.0;

/// Analyzer settings.
#[derive(Debug, Clone)]
pub struct AnalyzerConfig {
    /// Videos longer than this are rejected; before decoding when the
    /// container reports a duration, otherwise as soon as decode passes it
    pub max_duration_secs: f64,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            max_duration_secs: DEFAULT_MAX_DURATION_SECS,
        }
    }
}

/// Samples a video at a fixed cadence and runs detection on each sample.
pub struct VideoAnalyzer {
    detector: Arc<dyn Detector>,
    config: AnalyzerConfig,
    cancel_rx: Option<watch::Receiver<bool>>,
}

impl VideoAnalyzer {
    pub fn new(detector: Arc<dyn Detector>, config: AnalyzerConfig) -> Self {
        Self {
            detector,
            config,
            cancel_rx: None,
        }
    }

    /// Set cancellation signal.
    pub fn with_cancel(mut self, cancel_rx: watch::Receiver<bool>) -> Self {
        self.cancel_rx = Some(cancel_rx);
        self
    }

    /// Analyze the video at `path`, sampling one frame every `sample_interval` seconds.
    pub async fn analyze(
        &self,
        path: impl AsRef<Path>,
        sample_interval: f64,
    ) -> MediaResult<VideoAnalysis> {
        validate_interval(sample_interval)?;
        let mut source = FfmpegFrameSource::open(path).await?;
        self.analyze_source(&mut source, sample_interval).await
    }

    /// Analyze an already opened frame source. The source is closed on return.
    pub async fn analyze_source(
        &self,
        source: &mut dyn FrameSource,
        sample_interval: f64,
    ) -> MediaResult<VideoAnalysis> {
        let result = self.run(source, sample_interval).await;
        source.close().await;
        result
    }

    async fn run(
        &self,
        source: &mut dyn FrameSource,
        sample_interval: f64,
    ) -> MediaResult<VideoAnalysis> {
        validate_interval(sample_interval)?;

        let info = source.info().clone();
        let max_secs = self.config.max_duration_secs;
        if let Some(duration) = info.duration.filter(|d| *d > max_secs) {
            return Err(MediaError::DurationExceeded {
                duration_secs: duration,
                max_secs,
            });
        }
        if !(info.fps.is_finite() && info.fps > 0.0) {
            return Err(MediaError::unreadable("Cannot determine video frame rate"));
        }

        info!(
            duration = info.duration,
            fps = info.fps,
            width = info.width,
            height = info.height,
            frames = info.frame_count,
            sample_interval,
            detector = self.detector.name(),
            "Starting video analysis"
        );

        let started = Instant::now();
        let mut timeline = TimelineAccumulator::new();
        let mut last_sampled = -sample_interval;
        let mut decoded: u64 = 0;
        let mut cancel_rx = self.cancel_rx.clone();

        let completion = loop {
            let advanced = match cancel_rx.as_mut() {
                Some(rx) => {
                    if *rx.borrow() {
                        break cancelled();
                    }
                    let advanced = tokio::select! {
                        biased;
                        _ = wait_for_cancel(rx) => None,
                        advanced = source.advance() => Some(advanced),
                    };
                    match advanced {
                        Some(advanced) => advanced,
                        None => break cancelled(),
                    }
                }
                None => source.advance().await,
            };

            match advanced {
                Ok(true) => {}
                Ok(false) => break AnalysisCompletion::Complete,
                Err(e @ MediaError::FfmpegNotFound) => return Err(e),
                Err(e) if decoded == 0 => return Err(e),
                Err(e) => {
                    warn!(frame = decoded, "Decode failed mid-stream: {}", e);
                    break AnalysisCompletion::partial(PartialReason::DecodeFailure, e.to_string());
                }
            }

            let frame_index = decoded;
            decoded += 1;
            let timestamp = frame_index as f64 / info.fps;
            if timestamp > max_secs {
                warn!(frame = frame_index, timestamp, "Decode ran past the duration cap");
                return Err(MediaError::DurationExceeded {
                    duration_secs: timestamp,
                    max_secs,
                });
            }
            if timestamp - last_sampled < sample_interval {
                continue;
            }
            last_sampled = timestamp;

            let frame = match source.current_frame() {
                Ok(frame) => frame,
                Err(e) => {
                    break AnalysisCompletion::partial(PartialReason::DecodeFailure, e.to_string())
                }
            };

            let detections = match self.detector.detect(&frame).await {
                Ok(detections) => detections,
                Err(e) => {
                    warn!(frame = frame_index, timestamp, "Detector failed: {}", e);
                    break AnalysisCompletion::partial(PartialReason::EngineFailure, e.to_string());
                }
            };
            drop(frame);

            debug!(
                frame = frame_index,
                timestamp,
                count = detections.len(),
                "Sampled frame"
            );
            metrics::counter!("herd_analysis_frames_sampled_total").increment(1);
            timeline.push(FrameResult::new(frame_index, timestamp, detections));
        };

        let duration = info.duration.unwrap_or(decoded as f64 / info.fps);
        let analysis = timeline.finish(
            duration,
            info.fps,
            info.width,
            info.height,
            info.frame_count.max(decoded),
            completion,
        );

        info!(
            analyzed_frames = analysis.analyzed_frames,
            decoded_frames = decoded,
            total_detections = analysis.total_cows_detected,
            max_in_frame = analysis.max_cows_in_frame,
            complete = analysis.is_complete(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Video analysis finished"
        );

        Ok(analysis)
    }
}

fn validate_interval(sample_interval: f64) -> MediaResult<()> {
    if sample_interval.is_finite() && sample_interval > 0.0 {
        Ok(())
    } else {
        Err(MediaError::InvalidSampleInterval(sample_interval))
    }
}

fn cancelled() -> AnalysisCompletion {
    info!("Video analysis cancelled");
    AnalysisCompletion::partial(PartialReason::Cancelled, "analysis cancelled")
}

/// Resolves once the cancel flag is set. Pends forever if the sender is gone.
async fn wait_for_cancel(rx: &mut watch::Receiver<bool>) {
    if rx.wait_for(|cancelled| *cancelled).await.is_err() {
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::StaticDetector;
    use crate::frame::RasterFrame;
    use crate::probe::VideoInfo;
    use async_trait::async_trait;
    use herd_models::{BoundingBox, Detection};

    /// In-memory source producing `frames` tiny frames.
    struct SyntheticSource {
        info: VideoInfo,
        frames: u64,
        position: u64,
        fail_at: Option<u64>,
        stall_at: Option<u64>,
        closed: bool,
    }

    impl SyntheticSource {
        fn new(fps: f64, frames: u64) -> Self {
            Self {
                info: VideoInfo {
                    duration: Some(frames as f64 / fps),
                    width: 2,
                    height: 2,
                    fps,
                    frame_count: frames,
                    codec: "raw".to_string(),
                    size: 0,
                },
                frames,
                position: 0,
                fail_at: None,
                stall_at: None,
                closed: false,
            }
        }
    }

    #[async_trait]
    impl FrameSource for SyntheticSource {
        fn info(&self) -> &VideoInfo {
            &self.info
        }

        async fn advance(&mut self) -> MediaResult<bool> {
            if self.closed || self.position >= self.frames {
                return Ok(false);
            }
            if self.fail_at == Some(self.position) {
                return Err(MediaError::unreadable("corrupt packet"));
            }
            if self.stall_at == Some(self.position) {
                std::future::pending::<()>().await;
            }
            self.position += 1;
            Ok(true)
        }

        fn current_frame(&self) -> MediaResult<RasterFrame> {
            RasterFrame::from_rgb(2, 2, vec![0; 12])
        }

        async fn close(&mut self) {
            self.closed = true;
        }
    }

    fn cow() -> Detection {
        Detection::new("cow", 0.8, BoundingBox::new(0.0, 0.0, 1.0, 1.0))
    }

    fn analyzer(detector: Arc<StaticDetector>) -> VideoAnalyzer {
        VideoAnalyzer::new(detector, AnalyzerConfig::default())
    }

    #[tokio::test]
    async fn test_samples_once_per_second() {
        let detector = Arc::new(StaticDetector::new(vec![cow(), cow()]));
        let mut source = SyntheticSource::new(30.0, 90);

        let analysis = analyzer(detector.clone())
            .analyze_source(&mut source, 1.0)
            .await
            .unwrap();

        let indices: Vec<u64> = analysis
            .detections_by_time
            .iter()
            .map(|r| r.frame_index)
            .collect();
        assert_eq!(indices, vec![0, 30, 60]);
        assert_eq!(analysis.analyzed_frames, 3);
        assert_eq!(analysis.total_frames, 90);
        assert_eq!(analysis.total_cows_detected, 6);
        assert_eq!(analysis.max_cows_in_frame, 2);
        assert!((analysis.average_cows_per_frame - 2.0).abs() < 1e-9);
        assert!(analysis.is_complete());
        assert_eq!(detector.calls(), 3);
        assert!(source.closed);
    }

    #[tokio::test]
    async fn test_first_frame_always_sampled() {
        let detector = Arc::new(StaticDetector::new(vec![]));
        let mut source = SyntheticSource::new(25.0, 10);

        let analysis = analyzer(detector)
            .analyze_source(&mut source, 5.0)
            .await
            .unwrap();
        assert_eq!(analysis.analyzed_frames, 1);
        assert_eq!(analysis.detections_by_time[0].frame_index, 0);
        assert_eq!(analysis.detections_by_time[0].timestamp, 0.0);
        assert_eq!(analysis.average_cows_per_frame, 0.0);
    }

    #[tokio::test]
    async fn test_interval_shorter_than_frame_period_samples_every_frame() {
        let detector = Arc::new(StaticDetector::new(vec![cow()]));
        let mut source = SyntheticSource::new(10.0, 20);

        let analysis = analyzer(detector)
            .analyze_source(&mut source, 0.01)
            .await
            .unwrap();
        assert_eq!(analysis.analyzed_frames, 20);
        let timestamps: Vec<f64> = analysis
            .detections_by_time
            .iter()
            .map(|r| r.timestamp)
            .collect();
        assert!(timestamps.windows(2).all(|w| w[0] <= w[1]));
    }

    #[tokio::test]
    async fn test_duration_cap_rejects_before_detection() {
        let detector = Arc::new(StaticDetector::new(vec![cow()]));
        // 601 seconds at 1 fps
        let mut source = SyntheticSource::new(1.0, 601);

        let err = analyzer(detector.clone())
            .analyze_source(&mut source, 1.0)
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::DurationExceeded { .. }));
        assert_eq!(detector.calls(), 0);
        assert_eq!(source.position, 0);
        assert!(source.closed);
    }

    #[tokio::test]
    async fn test_duration_cap_enforced_during_decode_when_unknown() {
        let detector = Arc::new(StaticDetector::new(vec![cow()]));
        // Two hours at 1 fps with no reported duration
        let mut source = SyntheticSource::new(1.0, 7200);
        source.info.duration = None;
        source.info.frame_count = 0;

        let err = analyzer(detector.clone())
            .analyze_source(&mut source, 1.0)
            .await
            .unwrap_err();
        match err {
            MediaError::DurationExceeded {
                duration_secs,
                max_secs,
            } => {
                assert!(duration_secs > max_secs);
                assert_eq!(max_secs, DEFAULT_MAX_DURATION_SECS);
            }
            other => panic!("expected DurationExceeded, got {:?}", other),
        }
        // Frames 0..=600 decoded, detection stopped at the cap
        assert_eq!(source.position, 602);
        assert_eq!(detector.calls(), 601);
        assert!(source.closed);
    }

    #[tokio::test]
    async fn test_unknown_duration_within_cap_uses_decoded_length() {
        let detector = Arc::new(StaticDetector::new(vec![]));
        let mut source = SyntheticSource::new(10.0, 45);
        source.info.duration = None;
        source.info.frame_count = 0;

        let analysis = analyzer(detector)
            .analyze_source(&mut source, 1.0)
            .await
            .unwrap();
        assert!(analysis.is_complete());
        assert!((analysis.duration - 4.5).abs() < 1e-9);
        assert_eq!(analysis.total_frames, 45);
        assert_eq!(analysis.analyzed_frames, 5);
    }

    #[tokio::test]
    async fn test_invalid_interval_rejected() {
        let detector = Arc::new(StaticDetector::new(vec![]));
        for interval in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let mut source = SyntheticSource::new(30.0, 30);
            let err = analyzer(detector.clone())
                .analyze_source(&mut source, interval)
                .await
                .unwrap_err();
            assert!(matches!(err, MediaError::InvalidSampleInterval(_)));
        }
        assert_eq!(detector.calls(), 0);
    }

    #[tokio::test]
    async fn test_zero_fps_is_unreadable() {
        let detector = Arc::new(StaticDetector::new(vec![]));
        let mut source = SyntheticSource::new(30.0, 30);
        source.info.fps = 0.0;
        source.info.duration = Some(1.0);

        let err = analyzer(detector)
            .analyze_source(&mut source, 1.0)
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::UnreadableMedia(_)));
    }

    #[tokio::test]
    async fn test_mid_stream_decode_failure_returns_partial() {
        let detector = Arc::new(StaticDetector::new(vec![cow()]));
        let mut source = SyntheticSource::new(10.0, 50);
        source.fail_at = Some(25);

        let analysis = analyzer(detector)
            .analyze_source(&mut source, 1.0)
            .await
            .unwrap();
        assert_eq!(analysis.analyzed_frames, 3);
        assert!(matches!(
            analysis.completion,
            AnalysisCompletion::Partial {
                reason: PartialReason::DecodeFailure,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_decode_failure_on_first_frame_is_error() {
        let detector = Arc::new(StaticDetector::new(vec![]));
        let mut source = SyntheticSource::new(10.0, 50);
        source.fail_at = Some(0);

        let err = analyzer(detector)
            .analyze_source(&mut source, 1.0)
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::UnreadableMedia(_)));
    }

    #[tokio::test]
    async fn test_engine_failure_returns_partial() {
        let detector = Arc::new(StaticDetector::failing("inference crashed"));
        let mut source = SyntheticSource::new(10.0, 50);

        let analysis = analyzer(detector.clone())
            .analyze_source(&mut source, 1.0)
            .await
            .unwrap();
        assert_eq!(analysis.analyzed_frames, 0);
        assert_eq!(detector.calls(), 1);
        match analysis.completion {
            AnalysisCompletion::Partial { reason, message } => {
                assert_eq!(reason, PartialReason::EngineFailure);
                assert!(message.contains("inference crashed"));
            }
            other => panic!("expected partial, got {:?}", other),
        }
        assert!(source.closed);
    }

    #[tokio::test]
    async fn test_cancel_before_start() {
        let detector = Arc::new(StaticDetector::new(vec![cow()]));
        let (tx, rx) = watch::channel(true);
        let mut source = SyntheticSource::new(10.0, 50);

        let analysis = analyzer(detector.clone())
            .with_cancel(rx)
            .analyze_source(&mut source, 1.0)
            .await
            .unwrap();
        drop(tx);
        assert_eq!(analysis.analyzed_frames, 0);
        assert_eq!(detector.calls(), 0);
        assert!(matches!(
            analysis.completion,
            AnalysisCompletion::Partial {
                reason: PartialReason::Cancelled,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_cancel_unblocks_pending_read() {
        let detector = Arc::new(StaticDetector::new(vec![cow()]));
        let (tx, rx) = watch::channel(false);
        let mut source = SyntheticSource::new(10.0, 50);
        source.stall_at = Some(15);

        let analyzer = analyzer(detector).with_cancel(rx);
        let canceller = tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            tx.send(true).unwrap();
            tx
        });

        let analysis = analyzer.analyze_source(&mut source, 1.0).await.unwrap();
        let _tx = canceller.await.unwrap();

        assert_eq!(analysis.analyzed_frames, 2);
        assert!(matches!(
            analysis.completion,
            AnalysisCompletion::Partial {
                reason: PartialReason::Cancelled,
                ..
            }
        ));
        assert!(source.closed);
    }
}
