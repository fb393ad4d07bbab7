//! Face provider client — multipart form POSTs with key/secret in the body.
//!
//! Every call goes through the shared `RateLimiter` first. Provider errors
//! arrive as `{"error_message": "..."}` with a 4xx status; they are turned
//! into typed errors here so callers never inspect message text.

use reqwest::multipart::Form;
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::sync::Arc;

use super::types::*;
use crate::config::FaceApiConfig;
use crate::errors::{FaceVerifyError, Result};
use crate::rate_limit::RateLimiter;

/// Longest slice of an unexpected body kept in error messages.
const MAX_ERROR_BODY: usize = 200;

pub struct FaceApiClient {
    http: Client,
    limiter: Arc<RateLimiter>,
    detect_url: String,
    compare_url: String,
    api_key: String,
    api_secret: String,
    return_attributes: String,
}

impl FaceApiClient {
    pub fn new(config: &FaceApiConfig, limiter: Arc<RateLimiter>) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(std::time::Duration::from_secs(5))
            .user_agent(concat!("faceverify/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FaceVerifyError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            limiter,
            detect_url: config.detect_url(),
            compare_url: config.compare_url(),
            api_key: config.api_key.clone(),
            api_secret: config.api_secret.clone(),
            return_attributes: config.return_attributes.clone(),
        })
    }

    fn credentials(&self) -> Form {
        Form::new()
            .text("api_key", self.api_key.clone())
            .text("api_secret", self.api_secret.clone())
    }

    /// One `detect` call with a base64-encoded image.
    pub async fn detect(&self, image_base64: String) -> Result<DetectResponse> {
        let form = self
            .credentials()
            .text("image_base64", image_base64)
            .text("return_landmark", "1")
            .text("return_attributes", self.return_attributes.clone());

        let resp: DetectResponse = self.post_form(&self.detect_url, form).await?;
        tracing::debug!(
            request_id = resp.request_id.as_deref().unwrap_or("-"),
            faces = resp.faces.len(),
            "detect completed"
        );
        Ok(resp)
    }

    /// One `compare` call for two face tokens.
    pub async fn compare(&self, face_token1: &str, face_token2: &str) -> Result<CompareResponse> {
        let form = self
            .credentials()
            .text("face_token1", face_token1.to_string())
            .text("face_token2", face_token2.to_string());

        let resp: CompareResponse = self.post_form(&self.compare_url, form).await?;
        tracing::debug!(
            request_id = resp.request_id.as_deref().unwrap_or("-"),
            confidence = resp.confidence,
            "compare completed"
        );
        Ok(resp)
    }

    async fn post_form<T: DeserializeOwned>(&self, url: &str, form: Form) -> Result<T> {
        self.limiter.acquire().await;

        let resp = self.http.post(url).multipart(form).send().await?;
        let status = resp.status();
        let body = resp.text().await?;

        if let Ok(ProviderErrorBody {
            error_message: Some(message),
        }) = serde_json::from_str::<ProviderErrorBody>(&body)
        {
            tracing::warn!(status = status.as_u16(), error = %message, "provider returned error");
            return Err(classify_provider_error(message));
        }

        if !status.is_success() {
            return Err(FaceVerifyError::HttpStatus {
                status: status.as_u16(),
                body: truncate(&body),
            });
        }

        serde_json::from_str(&body).map_err(|e| {
            FaceVerifyError::InvalidResponse(format!("{} (body: {})", e, truncate(&body)))
        })
    }
}

fn classify_provider_error(message: String) -> FaceVerifyError {
    if message.starts_with(CONCURRENCY_LIMIT_EXCEEDED) {
        FaceVerifyError::ConcurrencyLimit
    } else {
        FaceVerifyError::Provider(message)
    }
}

fn truncate(body: &str) -> String {
    match body.char_indices().nth(MAX_ERROR_BODY) {
        Some((idx, _)) => format!("{}…", &body[..idx]),
        None => body.to_string(),
    }
}
