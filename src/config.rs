use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://api-us.faceplusplus.com/facepp/v3";

/// Attributes requested from the detect endpoint. The quality heuristic
/// reads `facequality`, `eyestatus` and `emotion`.
pub const DEFAULT_RETURN_ATTRIBUTES: &str =
    "gender,age,smiling,headpose,facequality,blur,eyestatus,emotion,mouthstatus,eyegaze";

/// Settings for the provider client, image preparation and caching.
#[derive(Debug, Clone)]
pub struct FaceApiConfig {
    pub base_url: String,
    pub api_key: String,
    pub api_secret: String,
    pub return_attributes: String,
    /// Minimum confidence (0-100) for `is_match`.
    pub confidence_threshold: f64,
    /// Floor applied when a caller asks for high confidence.
    pub high_confidence_threshold: f64,
    /// Total detect attempts, including the first.
    pub max_detect_attempts: u32,
    /// Detect backoff is `retry_base_delay * attempt`.
    pub retry_base_delay: Duration,
    pub concurrency_retry_delay: Duration,
    pub concurrency_max_retries: u32,
    /// Minimum spacing between provider calls.
    pub min_request_interval: Duration,
    pub max_image_bytes: u64,
    pub max_image_width: u32,
    pub jpeg_quality: u8,
    /// Where downloaded, copied and compressed images are written.
    pub cache_dir: PathBuf,
    /// Root for `asset:` image references.
    pub asset_dir: PathBuf,
    pub token_max_age: Duration,
    pub request_timeout: Duration,
}

impl Default for FaceApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: String::new(),
            api_secret: String::new(),
            return_attributes: DEFAULT_RETURN_ATTRIBUTES.to_string(),
            confidence_threshold: 75.0,
            high_confidence_threshold: 85.0,
            max_detect_attempts: 3,
            retry_base_delay: Duration::from_secs(1),
            concurrency_retry_delay: Duration::from_secs(2),
            concurrency_max_retries: 3,
            min_request_interval: Duration::from_secs(1),
            max_image_bytes: 2 * 1024 * 1024,
            max_image_width: 1024,
            jpeg_quality: 70,
            cache_dir: std::env::temp_dir().join("faceverify"),
            asset_dir: PathBuf::from("assets"),
            token_max_age: Duration::from_secs(24 * 60 * 60),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl FaceApiConfig {
    pub fn detect_url(&self) -> String {
        format!("{}/detect", self.base_url.trim_end_matches('/'))
    }

    pub fn compare_url(&self) -> String {
        format!("{}/compare", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub face: FaceApiConfig,
    /// When set, cached tokens and image paths live in Redis instead of memory.
    pub redis_url: Option<String>,
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

pub fn load() -> anyhow::Result<Config> {
    dotenvy::dotenv().ok();

    let defaults = FaceApiConfig::default();

    let api_key = std::env::var("FACEVERIFY_API_KEY").unwrap_or_default();
    let api_secret = std::env::var("FACEVERIFY_API_SECRET").unwrap_or_default();

    if api_key.is_empty() || api_secret.is_empty() {
        let env_mode = std::env::var("FACEVERIFY_ENV")
            .or_else(|_| std::env::var("RUST_ENV"))
            .unwrap_or_default();
        if env_mode == "production" {
            anyhow::bail!(
                "FACEVERIFY_API_KEY and FACEVERIFY_API_SECRET must be set in production."
            );
        }
        tracing::warn!("FACEVERIFY_API_KEY / FACEVERIFY_API_SECRET not set — provider calls will be rejected");
    }

    let face = FaceApiConfig {
        base_url: std::env::var("FACEVERIFY_BASE_URL").unwrap_or(defaults.base_url),
        api_key,
        api_secret,
        return_attributes: std::env::var("FACEVERIFY_RETURN_ATTRIBUTES")
            .unwrap_or(defaults.return_attributes),
        confidence_threshold: env_parse("FACEVERIFY_CONFIDENCE_THRESHOLD")
            .unwrap_or(defaults.confidence_threshold),
        high_confidence_threshold: env_parse("FACEVERIFY_HIGH_CONFIDENCE_THRESHOLD")
            .unwrap_or(defaults.high_confidence_threshold),
        max_detect_attempts: env_parse("FACEVERIFY_MAX_ATTEMPTS")
            .unwrap_or(defaults.max_detect_attempts)
            .max(1),
        retry_base_delay: env_parse("FACEVERIFY_RETRY_DELAY_MS")
            .map(Duration::from_millis)
            .unwrap_or(defaults.retry_base_delay),
        concurrency_retry_delay: defaults.concurrency_retry_delay,
        concurrency_max_retries: defaults.concurrency_max_retries,
        min_request_interval: env_parse("FACEVERIFY_MIN_INTERVAL_MS")
            .map(Duration::from_millis)
            .unwrap_or(defaults.min_request_interval),
        max_image_bytes: env_parse("FACEVERIFY_MAX_IMAGE_BYTES").unwrap_or(defaults.max_image_bytes),
        max_image_width: env_parse("FACEVERIFY_MAX_IMAGE_WIDTH").unwrap_or(defaults.max_image_width),
        jpeg_quality: defaults.jpeg_quality,
        cache_dir: std::env::var("FACEVERIFY_CACHE_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.cache_dir),
        asset_dir: std::env::var("FACEVERIFY_ASSET_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.asset_dir),
        token_max_age: env_parse("FACEVERIFY_TOKEN_MAX_AGE_SECS")
            .map(Duration::from_secs)
            .unwrap_or(defaults.token_max_age),
        request_timeout: defaults.request_timeout,
    };

    Ok(Config {
        face,
        redis_url: std::env::var("REDIS_URL").ok().filter(|s| !s.is_empty()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_urls_tolerate_trailing_slash() {
        let cfg = FaceApiConfig {
            base_url: "http://127.0.0.1:9000/facepp/v3/".into(),
            ..FaceApiConfig::default()
        };
        assert_eq!(cfg.detect_url(), "http://127.0.0.1:9000/facepp/v3/detect");
        assert_eq!(cfg.compare_url(), "http://127.0.0.1:9000/facepp/v3/compare");
    }

    #[test]
    fn test_defaults_match_provider_free_tier() {
        let cfg = FaceApiConfig::default();
        assert_eq!(cfg.confidence_threshold, 75.0);
        assert_eq!(cfg.max_image_bytes, 2 * 1024 * 1024);
        assert_eq!(cfg.max_image_width, 1024);
        assert_eq!(cfg.min_request_interval, Duration::from_secs(1));
        assert_eq!(cfg.token_max_age, Duration::from_secs(86_400));
    }
}
