//! Detection service request/response types.

use herd_models::{BoundingBox, Detection};
use serde::{Deserialize, Serialize};

/// One detection as reported by the service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireDetection {
    pub class_name: String,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

impl From<WireDetection> for Detection {
    fn from(wire: WireDetection) -> Self {
        Detection::new(wire.class_name, wire.confidence, wire.bbox)
    }
}

/// Response from `POST /v1/detect`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectResponse {
    #[serde(default)]
    pub detections: Vec<WireDetection>,
}

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub model: Option<String>,
}
