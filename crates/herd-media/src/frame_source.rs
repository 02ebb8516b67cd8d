//! Sequential frame sources.
//!
//! A [`FrameSource`] yields the frames of one video in presentation order.
//! Advancing only moves bytes into the source's own buffer; a raster is
//! materialised only when [`FrameSource::current_frame`] is called, so frames
//! the sampler skips cost nothing beyond the pipe read.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{Child, ChildStdout, Command};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::{MediaError, MediaResult};
use crate::frame::RasterFrame;
use crate::probe::{probe_video, VideoInfo};

/// Lines of decoder stderr kept for error reports.
const STDERR_TAIL_LINES: usize = 8;

/// Ordered source of decoded frames for one video.
#[async_trait]
pub trait FrameSource: Send {
    /// Container metadata, available before any decode work.
    fn info(&self) -> &VideoInfo;

    /// Read the next frame. Returns `false` at end of stream.
    async fn advance(&mut self) -> MediaResult<bool>;

    /// Materialise the frame read by the last successful `advance`.
    fn current_frame(&self) -> MediaResult<RasterFrame>;

    /// Release the decode resource. Idempotent.
    async fn close(&mut self);
}

/// Frame source backed by an FFmpeg child process writing RGB24 rawvideo.
///
/// The decoder is spawned lazily on the first `advance`, so a source that is
/// rejected on its metadata never starts decoding. The child is killed on
/// `close` and on drop.
pub struct FfmpegFrameSource {
    path: PathBuf,
    info: VideoInfo,
    child: Option<Child>,
    stdout: Option<BufReader<ChildStdout>>,
    stderr_task: Option<JoinHandle<String>>,
    buffer: Vec<u8>,
    frames_read: u64,
    finished: bool,
}

impl FfmpegFrameSource {
    /// Probe a video and prepare a source for it.
    pub async fn open(path: impl AsRef<Path>) -> MediaResult<Self> {
        let path = path.as_ref().to_path_buf();
        let info = probe_video(&path).await?;
        Ok(Self::with_info(path, info))
    }

    /// Build a source from already-probed metadata.
    pub fn with_info(path: PathBuf, info: VideoInfo) -> Self {
        Self {
            path,
            info,
            child: None,
            stdout: None,
            stderr_task: None,
            buffer: Vec::new(),
            frames_read: 0,
            finished: false,
        }
    }

    /// Frames read from the decoder so far.
    pub fn frames_read(&self) -> u64 {
        self.frames_read
    }

    fn spawn_decoder(&mut self) -> MediaResult<()> {
        which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)?;

        let mut child = Command::new("ffmpeg")
            .args(["-hide_banner", "-loglevel", "error", "-nostdin", "-i"])
            .arg(&self.path)
            .args([
                "-map",
                "0:v:0",
                "-vsync",
                "passthrough",
                "-f",
                "rawvideo",
                "-pix_fmt",
                "rgb24",
                "-",
            ])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| MediaError::internal("Failed to capture FFmpeg stdout"))?;

        // Drain stderr so the decoder never blocks on a full pipe
        self.stderr_task = child.stderr.take().map(|stderr| {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
                while let Ok(Some(line)) = lines.next_line().await {
                    if tail.len() == STDERR_TAIL_LINES {
                        tail.pop_front();
                    }
                    tail.push_back(line);
                }
                Vec::from(tail).join("\n")
            })
        });

        debug!(path = %self.path.display(), "Spawned FFmpeg frame decoder");

        self.buffer = vec![0u8; self.info.frame_bytes()];
        self.stdout = Some(BufReader::with_capacity(self.buffer.len().min(1 << 20), stdout));
        self.child = Some(child);
        Ok(())
    }

    async fn stderr_tail(&mut self) -> String {
        match self.stderr_task.take() {
            Some(task) => task.await.unwrap_or_default(),
            None => String::new(),
        }
    }
}

#[async_trait]
impl FrameSource for FfmpegFrameSource {
    fn info(&self) -> &VideoInfo {
        &self.info
    }

    async fn advance(&mut self) -> MediaResult<bool> {
        if self.finished {
            return Ok(false);
        }
        if self.stdout.is_none() {
            self.spawn_decoder()?;
        }

        let stdout = self
            .stdout
            .as_mut()
            .ok_or_else(|| MediaError::internal("Decoder not running"))?;

        let mut filled = 0;
        while filled < self.buffer.len() {
            let n = stdout.read(&mut self.buffer[filled..]).await?;
            if n == 0 {
                break;
            }
            filled += n;
        }

        if filled == self.buffer.len() {
            self.frames_read += 1;
            return Ok(true);
        }

        // End of pipe: either a clean end of stream or a decoder failure
        self.finished = true;
        self.stdout = None;
        let status = match self.child.as_mut() {
            Some(child) => Some(child.wait().await?),
            None => None,
        };
        self.child = None;
        let stderr = self.stderr_tail().await;

        if filled > 0 {
            return Err(MediaError::unreadable(format!(
                "Truncated frame {} ({} of {} bytes)",
                self.frames_read,
                filled,
                self.buffer.len()
            )));
        }

        match status {
            Some(status) if !status.success() => {
                warn!(
                    path = %self.path.display(),
                    frames = self.frames_read,
                    "FFmpeg decoder exited with {}", status
                );
                Err(MediaError::unreadable(format!(
                    "Decoder exited with {} after {} frames: {}",
                    status, self.frames_read, stderr
                )))
            }
            _ => Ok(false),
        }
    }

    fn current_frame(&self) -> MediaResult<RasterFrame> {
        if self.frames_read == 0 || self.stdout.is_none() {
            return Err(MediaError::internal("No frame has been read"));
        }
        RasterFrame::from_rgb(self.info.width, self.info.height, self.buffer.clone())
    }

    async fn close(&mut self) {
        self.finished = true;
        self.stdout = None;
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.start_kill() {
                debug!("FFmpeg decoder already gone: {}", e);
            }
            let _ = child.wait().await;
        }
        if let Some(task) = self.stderr_task.take() {
            task.abort();
        }
    }
}
