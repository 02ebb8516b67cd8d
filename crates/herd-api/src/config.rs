//! API configuration.

use std::path::PathBuf;
use std::str::FromStr;

use herd_media::DEFAULT_MAX_DURATION_SECS;

const MIB: usize = 1024 * 1024;

/// Which detection engine the server talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorBackend {
    /// HTTP detection service at `detector_url`
    Remote,
    /// In-process stub that reports no detections (development only)
    Static,
}

impl FromStr for DetectorBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "remote" => Ok(DetectorBackend::Remote),
            "static" => Ok(DetectorBackend::Static),
            other => Err(format!("unknown detector backend: {}", other)),
        }
    }
}

/// Where detection records are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordBackend {
    /// SQLite database at `database_path`
    Sqlite,
    /// Process memory; lost on restart
    Memory,
}

impl FromStr for RecordBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sqlite" => Ok(RecordBackend::Sqlite),
            "memory" => Ok(RecordBackend::Memory),
            other => Err(format!("unknown record backend: {}", other)),
        }
    }
}

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// CORS origins
    pub cors_origins: Vec<String>,
    /// General rate limit, requests per second per IP
    pub rate_limit_rps: u32,
    /// Rate limit for detection and analysis uploads, requests per minute per IP
    pub processing_rate_limit_per_minute: u32,
    /// Directory for uploaded images and videos
    pub upload_dir: PathBuf,
    /// Max image upload size
    pub max_image_bytes: usize,
    /// Max video upload size
    pub max_video_bytes: usize,
    /// Max request body size (largest upload plus multipart overhead)
    pub max_body_size: usize,
    /// Longest video accepted for analysis
    pub max_video_duration_secs: f64,
    /// Sample interval used when the request does not give one
    pub default_sample_interval: f64,
    pub detector_backend: DetectorBackend,
    pub detector_url: String,
    /// Class kept from detector output; empty keeps all
    pub detector_target_class: String,
    pub record_backend: RecordBackend,
    /// SQLite file for detection records
    pub database_path: PathBuf,
    /// Environment (development/production)
    pub environment: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        let max_video_bytes = 200 * MIB;
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            cors_origins: vec!["*".to_string()],
            rate_limit_rps: 10,
            processing_rate_limit_per_minute: 10,
            upload_dir: PathBuf::from("./uploads"),
            max_image_bytes: 20 * MIB,
            max_video_bytes,
            max_body_size: max_video_bytes + MIB,
            max_video_duration_secs: DEFAULT_MAX_DURATION_SECS,
            default_sample_interval: 1.0,
            detector_backend: DetectorBackend::Remote,
            detector_url: "http://localhost:9000".to_string(),
            detector_target_class: "cow".to_string(),
            record_backend: RecordBackend::Sqlite,
            database_path: PathBuf::from("./data/herdwatch.db"),
            environment: "development".to_string(),
        }
    }
}

impl ApiConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let max_image_bytes = env_parse("MAX_IMAGE_BYTES").unwrap_or(defaults.max_image_bytes);
        let max_video_bytes = env_parse("MAX_VIDEO_BYTES").unwrap_or(defaults.max_video_bytes);

        Self {
            host: std::env::var("API_HOST").unwrap_or(defaults.host),
            port: env_parse("API_PORT").unwrap_or(defaults.port),
            cors_origins: std::env::var("CORS_ORIGINS")
                .map(|s| s.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or(defaults.cors_origins),
            rate_limit_rps: env_parse("RATE_LIMIT_RPS").unwrap_or(defaults.rate_limit_rps),
            processing_rate_limit_per_minute: env_parse("PROCESSING_RATE_LIMIT_PER_MINUTE")
                .unwrap_or(defaults.processing_rate_limit_per_minute),
            upload_dir: std::env::var("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.upload_dir),
            max_image_bytes,
            max_video_bytes,
            max_body_size: max_image_bytes.max(max_video_bytes) + MIB,
            max_video_duration_secs: env_parse::<f64>("MAX_VIDEO_DURATION_SECS")
                .filter(|v| v.is_finite() && *v > 0.0)
                .unwrap_or(defaults.max_video_duration_secs),
            default_sample_interval: env_parse::<f64>("DEFAULT_SAMPLE_INTERVAL")
                .filter(|v| v.is_finite() && *v > 0.0)
                .unwrap_or(defaults.default_sample_interval),
            detector_backend: env_parse("DETECTOR_BACKEND").unwrap_or(defaults.detector_backend),
            detector_url: std::env::var("DETECTOR_URL").unwrap_or(defaults.detector_url),
            detector_target_class: std::env::var("DETECTOR_TARGET_CLASS")
                .unwrap_or(defaults.detector_target_class),
            record_backend: env_parse("RECORD_BACKEND").unwrap_or(defaults.record_backend),
            database_path: std::env::var("DATABASE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.database_path),
            environment: std::env::var("ENVIRONMENT").unwrap_or(defaults.environment),
        }
    }

    /// Check if running in production mode.
    pub fn is_production(&self) -> bool {
        self.environment.to_lowercase() == "production"
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}
