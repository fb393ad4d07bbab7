use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use super::comparison::{ConfidenceAnalysis, MatchLevel};
use super::face::FaceQuality;

pub const DEFAULT_CACHE_KEY: &str = "default_reference";

/// Per-call knobs for `FaceVerifier::verify_faces`.
#[derive(Debug, Clone)]
pub struct VerifyOptions {
    /// Key the reference face token is cached under.
    pub cache_key: String,
    /// Continue even when the captured face is rated `Poor`.
    pub skip_quality_check: bool,
    /// Additionally require the high-confidence floor (85 by default).
    pub require_high_confidence: bool,
    /// Overrides the configured token max age for this call.
    pub max_cache_age: Option<Duration>,
}

impl Default for VerifyOptions {
    fn default() -> Self {
        Self {
            cache_key: DEFAULT_CACHE_KEY.to_string(),
            skip_quality_check: false,
            require_high_confidence: false,
            max_cache_age: None,
        }
    }
}

impl VerifyOptions {
    pub fn with_cache_key(cache_key: impl Into<String>) -> Self {
        Self {
            cache_key: cache_key.into(),
            ..Self::default()
        }
    }
}

/// Progress of one verification run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationStage {
    Idle,
    CapturingAnalyzed,
    ReferenceResolving,
    Comparing,
    Done,
    Failed,
}

impl VerificationStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationStage::Idle => "idle",
            VerificationStage::CapturingAnalyzed => "capturing_analyzed",
            VerificationStage::ReferenceResolving => "reference_resolving",
            VerificationStage::Comparing => "comparing",
            VerificationStage::Done => "done",
            VerificationStage::Failed => "failed",
        }
    }
}

/// Outcome handed back to the caller. Not persisted here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationResult {
    pub verified: bool,
    pub confidence: f64,
    pub match_level: MatchLevel,
    pub analysis: ConfidenceAnalysis,
    pub captured_face_quality: FaceQuality,
    pub processing_time_ms: u64,
    pub thresholds: BTreeMap<String, f64>,
    /// RFC 3339.
    pub timestamp: String,
}
