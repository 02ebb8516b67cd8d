//! Detection engine seam.
//!
//! Pipelines depend on [`Detector`] only. Engines that are not safe for
//! concurrent use are wrapped in [`SerializedDetector`] (async engines) or
//! [`BlockingDetector`] (synchronous, CPU-bound engines), which serialize
//! access so one loaded model can be shared by every request and session.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use herd_models::Detection;
use tokio::sync::Mutex;

use crate::error::{MediaError, MediaResult};
use crate::frame::RasterFrame;

/// Object detector over one RGB raster.
#[async_trait]
pub trait Detector: Send + Sync {
    /// Short engine name for logs.
    fn name(&self) -> &'static str;

    /// Detect objects of the configured target class in a frame.
    async fn detect(&self, frame: &RasterFrame) -> MediaResult<Vec<Detection>>;
}

#[async_trait]
impl<D: Detector + ?Sized> Detector for Arc<D> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    async fn detect(&self, frame: &RasterFrame) -> MediaResult<Vec<Detection>> {
        (**self).detect(frame).await
    }
}

/// Keep only detections of `target_class` (case-insensitive). An empty
/// target keeps everything.
pub fn filter_target_class(detections: Vec<Detection>, target_class: &str) -> Vec<Detection> {
    if target_class.is_empty() {
        return detections;
    }
    detections
        .into_iter()
        .filter(|d| d.is_class(target_class))
        .collect()
}

/// Serializes calls into a detector that must not run concurrently.
pub struct SerializedDetector<D> {
    inner: Mutex<D>,
}

impl<D: Detector> SerializedDetector<D> {
    pub fn new(inner: D) -> Self {
        Self {
            inner: Mutex::new(inner),
        }
    }
}

#[async_trait]
impl<D: Detector> Detector for SerializedDetector<D> {
    fn name(&self) -> &'static str {
        "serialized"
    }

    async fn detect(&self, frame: &RasterFrame) -> MediaResult<Vec<Detection>> {
        let inner = self.inner.lock().await;
        inner.detect(frame).await
    }
}

/// Synchronous inference engine, e.g. an in-process model runtime.
pub trait BlockingEngine: Send + 'static {
    fn detect_blocking(&mut self, frame: &RasterFrame) -> MediaResult<Vec<Detection>>;
}

/// Runs a [`BlockingEngine`] on the blocking thread pool, one call at a time.
pub struct BlockingDetector<E> {
    engine: Arc<std::sync::Mutex<E>>,
}

impl<E: BlockingEngine> BlockingDetector<E> {
    pub fn new(engine: E) -> Self {
        Self {
            engine: Arc::new(std::sync::Mutex::new(engine)),
        }
    }
}

#[async_trait]
impl<E: BlockingEngine> Detector for BlockingDetector<E> {
    fn name(&self) -> &'static str {
        "blocking"
    }

    async fn detect(&self, frame: &RasterFrame) -> MediaResult<Vec<Detection>> {
        let engine = Arc::clone(&self.engine);
        let frame = frame.clone();

        tokio::task::spawn_blocking(move || {
            let mut engine = engine
                .lock()
                .map_err(|_| MediaError::engine_failure("detection engine poisoned"))?;
            engine.detect_blocking(&frame)
        })
        .await
        .map_err(|e| MediaError::engine_failure(format!("detection task failed: {}", e)))?
    }
}

/// Detector returning a fixed set of detections for every frame.
///
/// Used when no inference service is configured and in tests.
#[derive(Debug, Default)]
pub struct StaticDetector {
    detections: Vec<Detection>,
    fail_with: Option<String>,
    calls: AtomicUsize,
}

impl StaticDetector {
    pub fn new(detections: Vec<Detection>) -> Self {
        Self {
            detections,
            fail_with: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// A detector whose every call fails with an engine failure.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            detections: Vec::new(),
            fail_with: Some(message.into()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of `detect` calls made so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Detector for StaticDetector {
    fn name(&self) -> &'static str {
        "static"
    }

    async fn detect(&self, _frame: &RasterFrame) -> MediaResult<Vec<Detection>> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        match &self.fail_with {
            Some(message) => Err(MediaError::engine_failure(message.clone())),
            None => Ok(self.detections.clone()),
        }
    }
}
