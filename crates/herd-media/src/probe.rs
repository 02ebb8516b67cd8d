//! FFprobe video information.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

use crate::error::{MediaError, MediaResult};

/// Video file information.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoInfo {
    /// Duration in seconds, `None` when neither the container nor the stream reports one
    pub duration: Option<f64>,
    /// Display width in pixels (after rotation metadata is applied)
    pub width: u32,
    /// Display height in pixels (after rotation metadata is applied)
    pub height: u32,
    /// Frame rate (fps)
    pub fps: f64,
    /// Frames in the video stream (reported or estimated from duration, 0 if unknown)
    pub frame_count: u64,
    /// Video codec
    pub codec: String,
    /// File size in bytes
    pub size: u64,
}

impl VideoInfo {
    /// Bytes of one RGB24 frame at the native resolution.
    pub fn frame_bytes(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }
}

/// FFprobe JSON output format.
#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    format: Option<FfprobeFormat>,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
    size: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: String,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
    nb_frames: Option<String>,
    duration: Option<String>,
    #[serde(default)]
    side_data_list: Vec<FfprobeSideData>,
    #[serde(default)]
    tags: Option<FfprobeStreamTags>,
}

#[derive(Debug, Deserialize)]
struct FfprobeSideData {
    rotation: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStreamTags {
    rotate: Option<String>,
}

impl FfprobeStream {
    /// Rotation in degrees from the display matrix, or the legacy `rotate` tag.
    fn rotation(&self) -> f64 {
        self.side_data_list
            .iter()
            .find_map(|sd| sd.rotation)
            .or_else(|| {
                self.tags
                    .as_ref()
                    .and_then(|t| t.rotate.as_deref())
                    .and_then(|r| r.trim().parse::<f64>().ok())
            })
            .filter(|r| r.is_finite())
            .unwrap_or(0.0)
    }
}

/// Probe a video file for information.
pub async fn probe_video(path: impl AsRef<Path>) -> MediaResult<VideoInfo> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(MediaError::FileNotFound(path.to_path_buf()));
    }

    // Check FFprobe exists
    which::which("ffprobe").map_err(|_| MediaError::FfprobeNotFound)?;

    let output = Command::new("ffprobe")
        .args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await?;

    if !output.status.success() {
        return Err(MediaError::unreadable(format!(
            "Cannot open video file: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    parse_probe_output(&output.stdout)
}

/// Parse FFprobe JSON into [`VideoInfo`].
fn parse_probe_output(stdout: &[u8]) -> MediaResult<VideoInfo> {
    let probe: FfprobeOutput = serde_json::from_slice(stdout)
        .map_err(|e| MediaError::unreadable(format!("Cannot open video file: {}", e)))?;

    // Find video stream
    let video_stream = probe
        .streams
        .iter()
        .find(|s| s.codec_type == "video")
        .ok_or_else(|| MediaError::unreadable("No video stream found"))?;

    let coded_width = video_stream.width.unwrap_or(0);
    let coded_height = video_stream.height.unwrap_or(0);
    if coded_width == 0 || coded_height == 0 {
        return Err(MediaError::unreadable("Video stream has no frame size"));
    }

    // FFmpeg autorotates on decode, so quarter turns swap the output dimensions
    let quarter_turns = (video_stream.rotation() / 90.0).round() as i64;
    let (width, height) = if quarter_turns.rem_euclid(2) == 1 {
        (coded_height, coded_width)
    } else {
        (coded_width, coded_height)
    };

    // Prefer the average rate; r_frame_rate can be a field rate for interlaced input
    let fps = video_stream
        .avg_frame_rate
        .as_deref()
        .and_then(parse_frame_rate)
        .or_else(|| video_stream.r_frame_rate.as_deref().and_then(parse_frame_rate))
        .ok_or_else(|| MediaError::unreadable("Cannot determine video frame rate"))?;

    let format = probe.format.as_ref();

    let reported_frames = video_stream
        .nb_frames
        .as_deref()
        .and_then(|n| n.parse::<u64>().ok())
        .filter(|n| *n > 0);

    // Container duration, then stream duration, then frames / fps
    let duration = format
        .and_then(|f| f.duration.as_deref())
        .or(video_stream.duration.as_deref())
        .and_then(|d| d.parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d >= 0.0)
        .or_else(|| reported_frames.map(|n| n as f64 / fps));

    let frame_count = reported_frames
        .or_else(|| duration.map(|d| (d * fps).round() as u64))
        .unwrap_or(0);

    let size = format
        .and_then(|f| f.size.as_deref())
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(0);

    Ok(VideoInfo {
        duration,
        width,
        height,
        fps,
        frame_count,
        codec: video_stream.codec_name.clone().unwrap_or_default(),
        size,
    })
}

/// Parse frame rate string (e.g., "30/1" or "29.97"). Zero rates yield `None`.
fn parse_frame_rate(s: &str) -> Option<f64> {
    let rate = if let Some((num, den)) = s.split_once('/') {
        let num: f64 = num.parse().ok()?;
        let den: f64 = den.parse().ok()?;
        if den <= 0.0 {
            return None;
        }
        num / den
    } else {
        s.parse().ok()?
    };
    (rate.is_finite() && rate > 0.0).then_some(rate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_frame_rate() {
        assert!((parse_frame_rate("30/1").unwrap() - 30.0).abs() < 0.01);
        assert!((parse_frame_rate("30000/1001").unwrap() - 29.97).abs() < 0.01);
        assert!((parse_frame_rate("29.97").unwrap() - 29.97).abs() < 0.01);
        assert!(parse_frame_rate("0/0").is_none());
        assert!(parse_frame_rate("0/1").is_none());
    }

    #[test]
    fn test_parse_probe_output() {
        let json = br#"{
            "streams": [
                {"codec_type": "audio", "codec_name": "aac"},
                {"codec_type": "video", "codec_name": "h264", "width": 1280, "height": 720,
                 "r_frame_rate": "25/1", "avg_frame_rate": "25/1", "nb_frames": "250"}
            ],
            "format": {"duration": "10.000000", "size": "1048576"}
        }"#;
        let info = parse_probe_output(json).unwrap();
        assert_eq!(info.width, 1280);
        assert_eq!(info.height, 720);
        assert!((info.fps - 25.0).abs() < 1e-9);
        assert_eq!(info.frame_count, 250);
        assert!((info.duration.unwrap() - 10.0).abs() < 1e-9);
        assert_eq!(info.codec, "h264");
        assert_eq!(info.size, 1_048_576);
        assert_eq!(info.frame_bytes(), 1280 * 720 * 3);
    }

    #[test]
    fn test_frame_count_estimated_when_missing() {
        let json = br#"{
            "streams": [{"codec_type": "video", "width": 64, "height": 48, "avg_frame_rate": "30/1"}],
            "format": {"duration": "2.5"}
        }"#;
        let info = parse_probe_output(json).unwrap();
        assert_eq!(info.frame_count, 75);
    }

    #[test]
    fn test_duration_from_frames_when_container_silent() {
        let json = br#"{
            "streams": [{"codec_type": "video", "width": 64, "height": 48,
                         "avg_frame_rate": "0/0", "r_frame_rate": "20/1", "nb_frames": "100"}],
            "format": {}
        }"#;
        let info = parse_probe_output(json).unwrap();
        assert!((info.fps - 20.0).abs() < 1e-9);
        assert!((info.duration.unwrap() - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_unknown_duration_stays_unknown() {
        // MediaRecorder WebM: no container duration, no frame count
        let json = br#"{
            "streams": [{"codec_type": "video", "codec_name": "vp8", "width": 640, "height": 480,
                         "avg_frame_rate": "30/1"}],
            "format": {}
        }"#;
        let info = parse_probe_output(json).unwrap();
        assert_eq!(info.duration, None);
        assert_eq!(info.frame_count, 0);
    }

    #[test]
    fn test_rotation_swaps_dimensions() {
        let json = br#"{
            "streams": [{"codec_type": "video", "width": 1920, "height": 1080,
                         "avg_frame_rate": "30/1",
                         "side_data_list": [{"side_data_type": "Display Matrix", "rotation": -90}]}],
            "format": {"duration": "4.0"}
        }"#;
        let info = parse_probe_output(json).unwrap();
        assert_eq!((info.width, info.height), (1080, 1920));
        assert_eq!(info.frame_bytes(), 1080 * 1920 * 3);

        let json = br#"{
            "streams": [{"codec_type": "video", "width": 1280, "height": 720,
                         "avg_frame_rate": "30/1", "tags": {"rotate": "270"}}],
            "format": {"duration": "4.0"}
        }"#;
        let info = parse_probe_output(json).unwrap();
        assert_eq!((info.width, info.height), (720, 1280));

        let json = br#"{
            "streams": [{"codec_type": "video", "width": 1280, "height": 720,
                         "avg_frame_rate": "30/1",
                         "side_data_list": [{"rotation": 180}]}],
            "format": {"duration": "4.0"}
        }"#;
        let info = parse_probe_output(json).unwrap();
        assert_eq!((info.width, info.height), (1280, 720));
    }

    #[test]
    fn test_no_video_stream_is_unreadable() {
        let json = br#"{"streams": [{"codec_type": "audio"}], "format": {"duration": "3.0"}}"#;
        assert!(matches!(
            parse_probe_output(json),
            Err(MediaError::UnreadableMedia(_))
        ));
        assert!(matches!(
            parse_probe_output(b"garbage"),
            Err(MediaError::UnreadableMedia(_))
        ));
    }

    #[tokio::test]
    async fn test_probe_missing_file() {
        let err = probe_video("/definitely/not/here.mp4").await.unwrap_err();
        assert!(matches!(err, MediaError::FileNotFound(_)));
    }
}
