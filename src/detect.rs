use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::errors::{FaceVerifyError, Result};
use crate::imaging::{ImagePreparer, ImageRef};
use crate::models::{FaceQuality, FaceTokenData};
use crate::provider::FaceApiClient;

/// Sends an image to the detect endpoint and returns the first face.
///
/// Transient failures are retried with linear backoff
/// (`retry_base_delay * attempt`). Missing faces and local image problems
/// fail immediately.
pub struct FaceTokenFetcher {
    api: Arc<FaceApiClient>,
    preparer: Arc<ImagePreparer>,
    max_attempts: u32,
    retry_base_delay: Duration,
}

impl FaceTokenFetcher {
    pub fn new(
        api: Arc<FaceApiClient>,
        preparer: Arc<ImagePreparer>,
        max_attempts: u32,
        retry_base_delay: Duration,
    ) -> Self {
        Self {
            api,
            preparer,
            max_attempts: max_attempts.max(1),
            retry_base_delay,
        }
    }

    pub async fn detect(&self, image: &ImageRef) -> Result<FaceTokenData> {
        let mut attempt = 0;

        loop {
            attempt += 1;

            match self.detect_once(image).await {
                Ok(face) => {
                    debug!(image = %image, attempt, score = face.quality.score, "face detected");
                    return Ok(face);
                }
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => {
                    if attempt >= self.max_attempts {
                        return Err(FaceVerifyError::RetriesExhausted {
                            operation: "face detection",
                            attempts: attempt,
                            source: Box::new(e),
                        });
                    }

                    let wait = self.retry_base_delay * attempt;
                    warn!(
                        "Detect attempt {}/{} failed: {}. Retrying in {:?}...",
                        attempt, self.max_attempts, e, wait
                    );
                    sleep(wait).await;
                }
            }
        }
    }

    async fn detect_once(&self, image: &ImageRef) -> Result<FaceTokenData> {
        let prepared = self.preparer.prepare(image).await?;
        let encoded = prepared.read_base64().await?;

        let resp = self.api.detect(encoded).await?;
        let face = resp
            .faces
            .into_iter()
            .next()
            .ok_or(FaceVerifyError::NoFaceDetected)?;

        Ok(FaceTokenData {
            quality: FaceQuality::from_attributes(&face.attributes),
            token: face.face_token,
            attributes: face.attributes,
            landmarks: face.landmark,
            rectangle: face.face_rectangle,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryStore;
    use crate::config::FaceApiConfig;
    use crate::models::QualityLevel;
    use crate::rate_limit::RateLimiter;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct Fixture {
        fetcher: FaceTokenFetcher,
        image: ImageRef,
        _dir: tempfile::TempDir,
    }

    fn fixture(server: &MockServer, max_attempts: u32) -> Fixture {
        fixture_with_delay(server, max_attempts, Duration::from_millis(10))
    }

    fn fixture_with_delay(server: &MockServer, max_attempts: u32, retry_base_delay: Duration) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let config = FaceApiConfig {
            base_url: server.uri(),
            cache_dir: dir.path().join("cache"),
            ..FaceApiConfig::default()
        };
        let limiter = Arc::new(RateLimiter::new(Duration::ZERO));
        let api = Arc::new(FaceApiClient::new(&config, limiter).unwrap());
        let preparer = Arc::new(ImagePreparer::new(&config, Arc::new(MemoryStore::new())).unwrap());
        let selfie = dir.path().join("selfie.jpg");
        std::fs::write(&selfie, b"selfie").unwrap();
        Fixture {
            fetcher: FaceTokenFetcher::new(api, preparer, max_attempts, retry_base_delay),
            image: ImageRef::Local(selfie),
            _dir: dir,
        }
    }

    #[tokio::test]
    async fn test_detect_returns_first_face_with_quality() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/detect"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"faces":[
                    {"face_token":"first","attributes":{"facequality":{"value":55.0}},
                     "face_rectangle":{"top":1,"left":2,"width":3,"height":4}},
                    {"face_token":"second"}
                ]}"#,
            ))
            .expect(1)
            .mount(&server)
            .await;

        let fx = fixture(&server, 3);
        let face = fx.fetcher.detect(&fx.image).await.unwrap();
        assert_eq!(face.token, "first");
        assert_eq!(face.rectangle.height, 4);
        assert_eq!(face.quality.overall, QualityLevel::Fair);
    }

    #[tokio::test]
    async fn test_retries_exactly_max_attempts() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/detect"))
            .respond_with(ResponseTemplate::new(500).set_body_string("oops"))
            .expect(3)
            .mount(&server)
            .await;

        let fx = fixture(&server, 3);
        let err = fx.fetcher.detect(&fx.image).await.unwrap_err();
        assert!(matches!(
            err,
            FaceVerifyError::RetriesExhausted { attempts: 3, .. }
        ));
        assert!(err.to_string().contains("after 3 attempts"), "got: {}", err);
    }

    #[tokio::test]
    async fn test_backoff_grows_linearly() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/detect"))
            .respond_with(ResponseTemplate::new(500).set_body_string("oops"))
            .expect(3)
            .mount(&server)
            .await;

        let fx = fixture_with_delay(&server, 3, Duration::from_millis(50));
        let start = std::time::Instant::now();
        fx.fetcher.detect(&fx.image).await.unwrap_err();
        let elapsed = start.elapsed();

        // 50 ms after the first attempt, 100 ms after the second; a constant
        // delay would finish after 100 ms
        assert!(
            elapsed >= Duration::from_millis(145),
            "expected 1x + 2x base delay, got {:?}",
            elapsed
        );
    }

    #[tokio::test]
    async fn test_transient_failure_then_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/detect"))
            .respond_with(
                ResponseTemplate::new(403)
                    .set_body_string(r#"{"error_message":"CONCURRENCY_LIMIT_EXCEEDED"}"#),
            )
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/detect"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(r#"{"faces":[{"face_token":"ok"}]}"#),
            )
            .expect(1)
            .mount(&server)
            .await;

        let fx = fixture(&server, 3);
        let face = fx.fetcher.detect(&fx.image).await.unwrap();
        assert_eq!(face.token, "ok");
    }

    #[tokio::test]
    async fn test_no_face_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/detect"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"faces":[]}"#))
            .expect(1)
            .mount(&server)
            .await;

        let fx = fixture(&server, 3);
        let err = fx.fetcher.detect(&fx.image).await.unwrap_err();
        assert!(matches!(err, FaceVerifyError::NoFaceDetected));
        assert!(err.to_string().contains("No face detected"));
    }

    #[tokio::test]
    async fn test_missing_image_never_reaches_provider() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let fx = fixture(&server, 3);
        let err = fx
            .fetcher
            .detect(&ImageRef::Local("/definitely/not/here.jpg".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, FaceVerifyError::FileMissing(_)));
    }
}
