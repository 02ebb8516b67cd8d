//! Detection service HTTP client.

use std::time::Duration;

use async_trait::async_trait;
use herd_media::{filter_target_class, Detector, MediaResult, RasterFrame};
use herd_models::Detection;
use reqwest::Client;
use tracing::{debug, warn};

use crate::error::{MlError, MlResult};
use crate::types::{DetectResponse, HealthResponse};

/// Configuration for the remote detector.
#[derive(Debug, Clone)]
pub struct MlClientConfig {
    /// Base URL of the detection service
    pub base_url: String,
    /// Class to keep; empty keeps every class
    pub target_class: String,
    /// Connection timeout. Detection calls themselves are not bounded.
    pub connect_timeout: Duration,
}

impl Default for MlClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:9000".to_string(),
            target_class: "cow".to_string(),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl MlClientConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: std::env::var("DETECTOR_URL").unwrap_or(defaults.base_url),
            target_class: std::env::var("DETECTOR_TARGET_CLASS").unwrap_or(defaults.target_class),
            connect_timeout: defaults.connect_timeout,
        }
    }
}

/// [`Detector`] backed by the remote detection service.
///
/// Frames are posted as raw RGB24 bytes with their dimensions in headers.
#[derive(Debug, Clone)]
pub struct RemoteDetector {
    http: Client,
    base_url: String,
    target_class: String,
}

impl RemoteDetector {
    pub fn new(config: MlClientConfig) -> MlResult<Self> {
        let base_url = config.base_url.trim_end_matches('/').to_string();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(MlError::Config(format!(
                "detector URL must be http(s): {:?}",
                config.base_url
            )));
        }

        let http = Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()?;

        Ok(Self {
            http,
            base_url,
            target_class: config.target_class,
        })
    }

    /// Create from environment variables.
    pub fn from_env() -> MlResult<Self> {
        Self::new(MlClientConfig::from_env())
    }

    pub fn target_class(&self) -> &str {
        &self.target_class
    }

    /// Check if the detection service is healthy.
    pub async fn health_check(&self) -> bool {
        let url = format!("{}/health", self.base_url);

        match self.http.get(&url).send().await {
            Ok(response) if response.status().is_success() => {
                match response.json::<HealthResponse>().await {
                    Ok(health) => health.status == "healthy" || health.status == "ok",
                    Err(e) => {
                        warn!("Detection service health response invalid: {}", e);
                        false
                    }
                }
            }
            Ok(response) => {
                warn!("Detection service health check failed: {}", response.status());
                false
            }
            Err(e) => {
                warn!("Detection service health check error: {}", e);
                false
            }
        }
    }

    /// Send one frame to the service and return the target-class detections.
    pub async fn detect_frame(&self, frame: &RasterFrame) -> MlResult<Vec<Detection>> {
        let url = format!("{}/v1/detect", self.base_url);
        debug!(
            width = frame.width(),
            height = frame.height(),
            "Sending frame to detection service"
        );

        let response = self
            .http
            .post(&url)
            .header("X-Frame-Width", frame.width().to_string())
            .header("X-Frame-Height", frame.height().to_string())
            .header("X-Pixel-Format", "rgb24")
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(frame.as_bytes().to_vec())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MlError::RequestFailed {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await?;
        let parsed: DetectResponse = serde_json::from_slice(&bytes)
            .map_err(|e| MlError::InvalidResponse(e.to_string()))?;

        let detections = parsed.detections.into_iter().map(Detection::from).collect();
        Ok(filter_target_class(detections, &self.target_class))
    }
}

#[async_trait]
impl Detector for RemoteDetector {
    fn name(&self) -> &'static str {
        "remote"
    }

    async fn detect(&self, frame: &RasterFrame) -> MediaResult<Vec<Detection>> {
        Ok(self.detect_frame(frame).await?)
    }
}
