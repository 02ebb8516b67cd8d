//! Application state.

use std::sync::Arc;

use anyhow::Context;
use herd_media::{AnalyzerConfig, Detector, StaticDetector, VideoAnalyzer};
use herd_ml_client::{MlClientConfig, RemoteDetector};
use herd_storage::{LocalFileStore, MemoryRecordStore, RecordStore, SqliteRecordStore};
use tracing::{info, warn};

use crate::config::{ApiConfig, DetectorBackend, RecordBackend};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub files: Arc<LocalFileStore>,
    pub records: Arc<dyn RecordStore>,
    pub detector: Arc<dyn Detector>,
    /// Set when the detector is the remote service, for readiness checks
    pub remote: Option<Arc<RemoteDetector>>,
}

impl AppState {
    /// Create new application state.
    pub async fn new(config: ApiConfig) -> anyhow::Result<Self> {
        let files = LocalFileStore::new(&config.upload_dir)
            .await
            .with_context(|| format!("creating upload dir {}", config.upload_dir.display()))?;

        let (detector, remote): (Arc<dyn Detector>, Option<Arc<RemoteDetector>>) =
            match config.detector_backend {
                DetectorBackend::Remote => {
                    let remote = Arc::new(
                        RemoteDetector::new(MlClientConfig {
                            base_url: config.detector_url.clone(),
                            target_class: config.detector_target_class.clone(),
                            ..Default::default()
                        })
                        .context("configuring remote detector")?,
                    );
                    info!(url = %config.detector_url, "Using remote detection service");
                    (remote.clone() as Arc<dyn Detector>, Some(remote))
                }
                DetectorBackend::Static => {
                    warn!("Using static detector; every frame reports no detections");
                    (Arc::new(StaticDetector::default()) as Arc<dyn Detector>, None)
                }
            };

        let records: Arc<dyn RecordStore> = match config.record_backend {
            RecordBackend::Sqlite => Arc::new(
                SqliteRecordStore::open(&config.database_path)
                    .await
                    .with_context(|| {
                        format!("opening record database {}", config.database_path.display())
                    })?,
            ),
            RecordBackend::Memory => {
                warn!("Using in-memory record store; history is lost on restart");
                Arc::new(MemoryRecordStore::new())
            }
        };

        Ok(Self::with_components(config, Arc::new(files), records, detector).with_remote(remote))
    }

    /// Assemble state from already-built components.
    pub fn with_components(
        config: ApiConfig,
        files: Arc<LocalFileStore>,
        records: Arc<dyn RecordStore>,
        detector: Arc<dyn Detector>,
    ) -> Self {
        Self {
            config,
            files,
            records,
            detector,
            remote: None,
        }
    }

    fn with_remote(mut self, remote: Option<Arc<RemoteDetector>>) -> Self {
        self.remote = remote;
        self
    }

    /// Video analyzer sharing this state's detector.
    pub fn analyzer(&self) -> VideoAnalyzer {
        VideoAnalyzer::new(
            Arc::clone(&self.detector),
            AnalyzerConfig {
                max_duration_secs: self.config.max_video_duration_secs,
            },
        )
    }
}
