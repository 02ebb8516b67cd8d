//! Detection records kept by the record store.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::detection::Detection;

/// A stored single-image detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Recognition {
    pub id: u64,
    /// Stored file name of the uploaded image
    pub image_path: String,
    pub cows_count: usize,
    pub result: Vec<Detection>,
    pub created_at: DateTime<Utc>,
}

impl Recognition {
    pub fn summary(&self) -> RecognitionSummary {
        RecognitionSummary {
            id: self.id,
            image_path: self.image_path.clone(),
            cows_count: self.cows_count,
            created_at: self.created_at,
        }
    }
}

/// List view of a [`Recognition`] without the detections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RecognitionSummary {
    pub id: u64,
    pub image_path: String,
    pub cows_count: usize,
    pub created_at: DateTime<Utc>,
}

/// Aggregate statistics over all records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DetectionStats {
    pub total_detections: u64,
    pub total_cows: u64,
    pub average_cows_per_image: f64,
}

impl DetectionStats {
    pub fn new(total_detections: u64, total_cows: u64) -> Self {
        let average = if total_detections > 0 {
            total_cows as f64 / total_detections as f64
        } else {
            0.0
        };
        Self {
            total_detections,
            total_cows,
            // Two decimals, as the dashboard displays it
            average_cows_per_image: (average * 100.0).round() / 100.0,
        }
    }
}
