//! Wire types for the Face++ style `detect` / `compare` endpoints.
//! Only the fields this crate reads are modelled; the rest is ignored.

use serde::Deserialize;
use std::collections::BTreeMap;

use crate::models::FaceRectangle;

/// Error code the provider returns when too many calls are in flight.
pub const CONCURRENCY_LIMIT_EXCEEDED: &str = "CONCURRENCY_LIMIT_EXCEEDED";

#[derive(Debug, Deserialize)]
pub struct ProviderErrorBody {
    #[serde(default)]
    pub error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DetectResponse {
    #[serde(default)]
    pub request_id: Option<String>,
    #[serde(default)]
    pub faces: Vec<DetectedFace>,
}

#[derive(Debug, Deserialize)]
pub struct DetectedFace {
    pub face_token: String,
    #[serde(default)]
    pub attributes: serde_json::Value,
    #[serde(default)]
    pub landmark: serde_json::Value,
    #[serde(default)]
    pub face_rectangle: FaceRectangle,
}

#[derive(Debug, Deserialize)]
pub struct CompareResponse {
    #[serde(default)]
    pub request_id: Option<String>,
    /// Absent when the provider could not compare (e.g. an expired token).
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub thresholds: BTreeMap<String, f64>,
}
