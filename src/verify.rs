//! End-to-end selfie verification.
//!
//! `FaceVerifier` is the composition root: it owns the rate limiter, the
//! image preparer, the provider client and the token cache, and wires them
//! into one `verify_faces` call:
//!
//! ```text
//! Idle → CapturingAnalyzed → ReferenceResolving → Comparing → Done
//!                      \              \               \
//!                       └──────────────┴───────────────┴──→ Failed
//! ```

use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::cache::KeyValueStore;
use crate::compare::FaceComparator;
use crate::config::FaceApiConfig;
use crate::detect::FaceTokenFetcher;
use crate::errors::{FaceVerifyError, Result, VerificationFailure};
use crate::imaging::{ImagePreparer, ImageRef};
use crate::models::{
    ComparisonResult, FaceQuality, FaceTokenData, VerificationResult, VerificationStage,
    VerifyOptions,
};
use crate::provider::FaceApiClient;
use crate::rate_limit::RateLimiter;
use crate::token_cache::TokenCache;

const HIGH_CONFIDENCE_RECOMMENDATION: &str =
    "Confidence is below the level required for high-assurance verification. \
     Please retake the photo facing the camera in good, even lighting.";

pub struct FaceVerifier {
    fetcher: FaceTokenFetcher,
    comparator: FaceComparator,
    tokens: TokenCache,
    high_confidence_threshold: f64,
}

impl FaceVerifier {
    pub fn new(config: FaceApiConfig, store: Arc<dyn KeyValueStore>) -> Result<Self> {
        let limiter = Arc::new(RateLimiter::new(config.min_request_interval));
        let api = Arc::new(FaceApiClient::new(&config, limiter)?);
        let preparer = Arc::new(ImagePreparer::new(&config, store.clone())?);

        Ok(Self {
            fetcher: FaceTokenFetcher::new(
                api.clone(),
                preparer,
                config.max_detect_attempts,
                config.retry_base_delay,
            ),
            comparator: FaceComparator::new(
                api,
                config.confidence_threshold,
                config.concurrency_retry_delay,
                config.concurrency_max_retries,
            ),
            tokens: TokenCache::new(store, config.token_max_age),
            high_confidence_threshold: config.high_confidence_threshold,
        })
    }

    /// Detect a single face, e.g. to pre-check a capture before verifying.
    pub async fn detect_face(&self, image: &ImageRef) -> Result<FaceTokenData> {
        self.fetcher.detect(image).await
    }

    pub async fn compare_tokens(&self, face_token1: &str, face_token2: &str) -> Result<ComparisonResult> {
        self.comparator.compare(face_token1, face_token2).await
    }

    pub async fn clear_cache(&self) -> Result<usize> {
        Ok(self.tokens.clear().await?)
    }

    /// Verify `captured` against `reference`.
    pub async fn verify_faces(
        &self,
        captured: &ImageRef,
        reference: &ImageRef,
        options: &VerifyOptions,
    ) -> Result<VerificationResult, VerificationFailure> {
        let start = Instant::now();
        let mut stage = VerificationStage::Idle;

        match self.run(captured, reference, options, &mut stage).await {
            Ok((quality, comparison)) => {
                let result = self.finish(quality, comparison, options, start);
                info!(
                    verified = result.verified,
                    confidence = result.confidence,
                    match_level = %result.match_level,
                    processing_time_ms = result.processing_time_ms,
                    "face verification {}",
                    VerificationStage::Done.as_str()
                );
                Ok(result)
            }
            Err(error) => {
                let failure = VerificationFailure::new(error, start.elapsed().as_millis() as u64);
                warn!(
                    stage = stage.as_str(),
                    error = %failure.error,
                    processing_time_ms = failure.processing_time_ms,
                    "face verification {}",
                    VerificationStage::Failed.as_str()
                );
                Err(failure)
            }
        }
    }

    async fn run(
        &self,
        captured: &ImageRef,
        reference: &ImageRef,
        options: &VerifyOptions,
        stage: &mut VerificationStage,
    ) -> Result<(FaceQuality, ComparisonResult)> {
        *stage = VerificationStage::CapturingAnalyzed;
        debug!(stage = stage.as_str(), image = %captured, "analyzing captured image");
        let captured_face = self.fetcher.detect(captured).await?;

        if captured_face.quality.is_poor() && !options.skip_quality_check {
            return Err(FaceVerifyError::PoorQuality {
                score: captured_face.quality.score,
                issues: captured_face.quality.issues.clone(),
            });
        }

        *stage = VerificationStage::ReferenceResolving;
        debug!(stage = stage.as_str(), cache_key = %options.cache_key, "resolving reference token");
        let reference_token = self.reference_token(reference, options).await?;

        *stage = VerificationStage::Comparing;
        debug!(stage = stage.as_str(), "comparing faces");
        let comparison = self
            .comparator
            .compare(&captured_face.token, &reference_token)
            .await?;

        Ok((captured_face.quality, comparison))
    }

    /// Cached reference token, or a fresh detection that is then cached.
    /// Cache failures are logged and never abort the run.
    async fn reference_token(&self, reference: &ImageRef, options: &VerifyOptions) -> Result<String> {
        match self.tokens.get(&options.cache_key, options.max_cache_age).await {
            Ok(Some(token)) => {
                debug!(cache_key = %options.cache_key, "using cached reference token");
                return Ok(token);
            }
            Ok(None) => {}
            Err(e) => warn!(cache_key = %options.cache_key, error = %e, "reference token lookup failed"),
        }

        let face = self.fetcher.detect(reference).await?;
        if let Err(e) = self.tokens.put(&options.cache_key, &face.token).await {
            warn!(cache_key = %options.cache_key, error = %e, "failed to cache reference token");
        }
        Ok(face.token)
    }

    fn finish(
        &self,
        quality: FaceQuality,
        comparison: ComparisonResult,
        options: &VerifyOptions,
        start: Instant,
    ) -> VerificationResult {
        let ComparisonResult {
            confidence,
            thresholds,
            mut is_match,
            match_level,
            mut analysis,
        } = comparison;

        if options.require_high_confidence && confidence < self.high_confidence_threshold {
            is_match = false;
            analysis.recommendation = HIGH_CONFIDENCE_RECOMMENDATION.to_string();
        }

        VerificationResult {
            verified: is_match,
            confidence,
            match_level,
            analysis,
            captured_face_quality: quality,
            processing_time_ms: start.elapsed().as_millis() as u64,
            thresholds,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}
