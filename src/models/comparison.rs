use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchLevel {
    #[serde(rename = "Very Strong Match")]
    VeryStrong,
    #[serde(rename = "Strong Match")]
    Strong,
    #[serde(rename = "Good Match")]
    Good,
    #[serde(rename = "Weak Match")]
    Weak,
    #[serde(rename = "No Match")]
    NoMatch,
}

impl MatchLevel {
    pub fn from_confidence(confidence: f64) -> Self {
        if confidence >= 90.0 {
            MatchLevel::VeryStrong
        } else if confidence >= 80.0 {
            MatchLevel::Strong
        } else if confidence >= 70.0 {
            MatchLevel::Good
        } else if confidence >= 60.0 {
            MatchLevel::Weak
        } else {
            MatchLevel::NoMatch
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MatchLevel::VeryStrong => "Very Strong Match",
            MatchLevel::Strong => "Strong Match",
            MatchLevel::Good => "Good Match",
            MatchLevel::Weak => "Weak Match",
            MatchLevel::NoMatch => "No Match",
        }
    }
}

impl fmt::Display for MatchLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnalysisLevel {
    Excellent,
    #[serde(rename = "Very Good")]
    VeryGood,
    Good,
    Fair,
    Poor,
}

impl AnalysisLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisLevel::Excellent => "Excellent",
            AnalysisLevel::VeryGood => "Very Good",
            AnalysisLevel::Good => "Good",
            AnalysisLevel::Fair => "Fair",
            AnalysisLevel::Poor => "Poor",
        }
    }
}

impl fmt::Display for AnalysisLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceAnalysis {
    pub level: AnalysisLevel,
    pub description: String,
    pub recommendation: String,
}

impl ConfidenceAnalysis {
    /// Same breakpoints as `MatchLevel` (90/80/70/60).
    pub fn from_confidence(confidence: f64) -> Self {
        let (level, description, recommendation) = if confidence >= 90.0 {
            (
                AnalysisLevel::Excellent,
                "Very high similarity. The faces almost certainly belong to the same person.",
                "Verification passed with high confidence.",
            )
        } else if confidence >= 80.0 {
            (
                AnalysisLevel::VeryGood,
                "High similarity. The faces very likely belong to the same person.",
                "Verification passed.",
            )
        } else if confidence >= 70.0 {
            (
                AnalysisLevel::Good,
                "Moderate similarity. The faces probably belong to the same person.",
                "Consider retaking the photo in better lighting for a stronger result.",
            )
        } else if confidence >= 60.0 {
            (
                AnalysisLevel::Fair,
                "Some similarity, but not enough to confirm identity.",
                "Retake the photo facing the camera directly with even lighting.",
            )
        } else {
            (
                AnalysisLevel::Poor,
                "Low similarity. The faces do not appear to match.",
                "Make sure you are using a recent photo of yourself and try again.",
            )
        };
        Self {
            level,
            description: description.to_string(),
            recommendation: recommendation.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonResult {
    /// 0-100.
    pub confidence: f64,
    /// Provider reference values keyed by false-accept rate (e.g. `1e-5`).
    pub thresholds: BTreeMap<String, f64>,
    pub is_match: bool,
    pub match_level: MatchLevel,
    pub analysis: ConfidenceAnalysis,
}

impl ComparisonResult {
    pub fn classify(confidence: f64, thresholds: BTreeMap<String, f64>, threshold: f64) -> Self {
        Self {
            confidence,
            thresholds,
            is_match: confidence >= threshold,
            match_level: MatchLevel::from_confidence(confidence),
            analysis: ConfidenceAnalysis::from_confidence(confidence),
        }
    }
}
