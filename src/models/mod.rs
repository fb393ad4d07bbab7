pub mod comparison;
pub mod face;
pub mod verification;

pub use comparison::{AnalysisLevel, ComparisonResult, ConfidenceAnalysis, MatchLevel};
pub use face::{FaceQuality, FaceRectangle, FaceTokenData, QualityLevel};
pub use verification::{VerificationResult, VerificationStage, VerifyOptions, DEFAULT_CACHE_KEY};
