use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::errors::{FaceVerifyError, Result};
use crate::models::ComparisonResult;
use crate::provider::FaceApiClient;

/// Compares two face tokens and classifies the confidence.
///
/// The provider's concurrency-limit error is the only one retried here,
/// after a fixed delay.
pub struct FaceComparator {
    api: Arc<FaceApiClient>,
    confidence_threshold: f64,
    concurrency_retry_delay: Duration,
    concurrency_max_retries: u32,
}

impl FaceComparator {
    pub fn new(
        api: Arc<FaceApiClient>,
        confidence_threshold: f64,
        concurrency_retry_delay: Duration,
        concurrency_max_retries: u32,
    ) -> Self {
        Self {
            api,
            confidence_threshold,
            concurrency_retry_delay,
            concurrency_max_retries,
        }
    }

    pub async fn compare(&self, face_token1: &str, face_token2: &str) -> Result<ComparisonResult> {
        let mut retries = 0;

        loop {
            match self.api.compare(face_token1, face_token2).await {
                Ok(resp) => {
                    let confidence = resp
                        .confidence
                        .ok_or_else(|| {
                            FaceVerifyError::InvalidResponse("compare response missing confidence".into())
                        })?
                        .clamp(0.0, 100.0);

                    let result =
                        ComparisonResult::classify(confidence, resp.thresholds, self.confidence_threshold);
                    info!(
                        confidence,
                        is_match = result.is_match,
                        match_level = %result.match_level,
                        "faces compared"
                    );
                    return Ok(result);
                }
                Err(FaceVerifyError::ConcurrencyLimit) if retries < self.concurrency_max_retries => {
                    retries += 1;
                    warn!(
                        "Provider concurrency limit hit ({}/{}). Retrying in {:?}...",
                        retries, self.concurrency_max_retries, self.concurrency_retry_delay
                    );
                    sleep(self.concurrency_retry_delay).await;
                }
                Err(FaceVerifyError::ConcurrencyLimit) if retries > 0 => {
                    return Err(FaceVerifyError::RetriesExhausted {
                        operation: "face comparison",
                        attempts: retries + 1,
                        source: Box::new(FaceVerifyError::ConcurrencyLimit),
                    });
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FaceApiConfig;
    use crate::models::{AnalysisLevel, MatchLevel};
    use crate::rate_limit::RateLimiter;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn comparator(server: &MockServer, max_retries: u32) -> FaceComparator {
        let config = FaceApiConfig {
            base_url: server.uri(),
            ..FaceApiConfig::default()
        };
        let api = Arc::new(
            FaceApiClient::new(&config, Arc::new(RateLimiter::new(Duration::ZERO))).unwrap(),
        );
        FaceComparator::new(api, 75.0, Duration::from_millis(10), max_retries)
    }

    fn busy() -> ResponseTemplate {
        ResponseTemplate::new(403).set_body_string(r#"{"error_message":"CONCURRENCY_LIMIT_EXCEEDED"}"#)
    }

    #[tokio::test]
    async fn test_compare_classifies_confidence() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/compare"))
            .and(body_string_contains("tok-a"))
            .and(body_string_contains("tok-b"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"confidence":92.4,"thresholds":{"1e-3":62.3,"1e-4":69.1,"1e-5":73.9}}"#,
            ))
            .mount(&server)
            .await;

        let result = comparator(&server, 3).compare("tok-a", "tok-b").await.unwrap();
        assert!(result.is_match);
        assert_eq!(result.match_level, MatchLevel::VeryStrong);
        assert_eq!(result.analysis.level, AnalysisLevel::Excellent);
        assert_eq!(result.thresholds.get("1e-5"), Some(&73.9));
    }

    #[tokio::test]
    async fn test_concurrency_limit_is_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/compare"))
            .respond_with(busy())
            .up_to_n_times(2)
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/compare"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"confidence":65.0}"#))
            .expect(1)
            .mount(&server)
            .await;

        let result = comparator(&server, 3).compare("a", "b").await.unwrap();
        assert!(!result.is_match);
        assert_eq!(result.match_level, MatchLevel::Weak);
    }

    #[tokio::test]
    async fn test_concurrency_retries_are_bounded() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/compare"))
            .respond_with(busy())
            .expect(4) // 1 original + 3 retries
            .mount(&server)
            .await;

        let err = comparator(&server, 3).compare("a", "b").await.unwrap_err();
        assert!(matches!(
            err,
            FaceVerifyError::RetriesExhausted { attempts: 4, .. }
        ));
        assert!(err.user_message().contains("busy"));
    }

    #[tokio::test]
    async fn test_other_errors_are_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/compare"))
            .respond_with(
                ResponseTemplate::new(400).set_body_string(r#"{"error_message":"INVALID_FACE_TOKEN"}"#),
            )
            .expect(1)
            .mount(&server)
            .await;

        let err = comparator(&server, 3).compare("a", "b").await.unwrap_err();
        assert!(matches!(err, FaceVerifyError::Provider(_)));
    }

    #[tokio::test]
    async fn test_missing_confidence_is_invalid_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/compare"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"request_id":"r"}"#))
            .mount(&server)
            .await;

        let err = comparator(&server, 3).compare("a", "b").await.unwrap_err();
        assert!(matches!(err, FaceVerifyError::InvalidResponse(_)));
    }
}
