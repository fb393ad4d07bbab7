//! Detected-face data and the local quality heuristic.
//!
//! The provider returns attribute scores as percentages (0-100). The quality
//! heuristic is advisory: it never rejects an image by itself, the verifier
//! decides whether a `Poor` rating aborts the run.

use serde::{Deserialize, Serialize};

/// Provider face-quality score below which lighting is flagged.
const FACE_QUALITY_FAIR: f64 = 70.0;
const FACE_QUALITY_POOR: f64 = 50.0;
/// Normalised eye-open confidence below which eyes count as not visible.
const EYE_OPEN_MIN: f64 = 0.8;
const EYES_SCORE_CAP: u8 = 70;
const HAPPINESS_MAX: f64 = 90.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QualityLevel {
    Good,
    Fair,
    Poor,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceQuality {
    pub overall: QualityLevel,
    /// 0-100.
    pub score: u8,
    pub issues: Vec<String>,
    pub recommendations: Vec<String>,
}

impl Default for FaceQuality {
    fn default() -> Self {
        Self {
            overall: QualityLevel::Good,
            score: 100,
            issues: Vec::new(),
            recommendations: Vec::new(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct QualityAttributes {
    #[serde(default)]
    facequality: Option<ScoreWithThreshold>,
    #[serde(default)]
    eyestatus: Option<EyeStatusPair>,
    #[serde(default)]
    emotion: Option<Emotion>,
}

#[derive(Debug, Deserialize)]
struct ScoreWithThreshold {
    value: f64,
}

#[derive(Debug, Deserialize)]
struct EyeStatusPair {
    #[serde(default)]
    left_eye_status: Option<EyeStatus>,
    #[serde(default)]
    right_eye_status: Option<EyeStatus>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct EyeStatus {
    no_glass_eye_open: f64,
    normal_glass_eye_open: f64,
}

impl EyeStatus {
    /// Open-eye confidence on a 0-1 scale, with or without glasses.
    fn open_confidence(&self) -> f64 {
        (self.no_glass_eye_open + self.normal_glass_eye_open) / 100.0
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Emotion {
    happiness: f64,
}

impl FaceQuality {
    /// Rate a detected face from the provider's `attributes` object.
    /// Missing attributes are treated as fine.
    pub fn from_attributes(attributes: &serde_json::Value) -> Self {
        let attrs: QualityAttributes =
            serde_json::from_value(attributes.clone()).unwrap_or_default();
        let mut quality = FaceQuality::default();

        if let Some(fq) = &attrs.facequality {
            if fq.value < FACE_QUALITY_FAIR {
                quality.score = fq.value.clamp(0.0, 100.0).round() as u8;
                quality.overall = if fq.value < FACE_QUALITY_POOR {
                    QualityLevel::Poor
                } else {
                    QualityLevel::Fair
                };
                quality
                    .issues
                    .push("Low image quality or poor lighting".to_string());
                quality
                    .recommendations
                    .push("Move to a well-lit area and hold the camera steady".to_string());
            }
        }

        if let Some(eyes) = &attrs.eyestatus {
            let left = eyes.left_eye_status.as_ref().map_or(1.0, EyeStatus::open_confidence);
            let right = eyes.right_eye_status.as_ref().map_or(1.0, EyeStatus::open_confidence);
            if left < EYE_OPEN_MIN || right < EYE_OPEN_MIN {
                quality.score = quality.score.min(EYES_SCORE_CAP);
                if quality.overall == QualityLevel::Good {
                    quality.overall = QualityLevel::Fair;
                }
                quality.issues.push("Eyes not clearly visible".to_string());
                quality
                    .recommendations
                    .push("Keep your eyes open and look directly at the camera".to_string());
            }
        }

        if let Some(emotion) = &attrs.emotion {
            if emotion.happiness > HAPPINESS_MAX {
                quality
                    .recommendations
                    .push("Try a neutral expression for best results".to_string());
            }
        }

        quality
    }

    pub fn is_poor(&self) -> bool {
        self.overall == QualityLevel::Poor
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaceRectangle {
    pub top: u32,
    pub left: u32,
    pub width: u32,
    pub height: u32,
}

/// One detected face. The token is only valid for as long as the provider
/// retains it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaceTokenData {
    pub token: String,
    pub attributes: serde_json::Value,
    pub quality: FaceQuality,
    pub landmarks: serde_json::Value,
    pub rectangle: FaceRectangle,
}
