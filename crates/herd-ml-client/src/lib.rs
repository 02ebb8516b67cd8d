//! Client for the remote object detection service.
//!
//! The inference model runs out of process behind a small HTTP API. This
//! crate sends raw RGB24 frames to it and adapts the replies to the
//! [`herd_media::Detector`] contract, so pipelines never see the transport.

pub mod client;
pub mod error;
pub mod types;

pub use client::{MlClientConfig, RemoteDetector};
pub use error::{MlError, MlResult};
pub use types::{DetectResponse, HealthResponse};
