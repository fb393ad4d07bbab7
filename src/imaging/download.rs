/// HTTP client for fetching remote reference photos.
/// Uses reqwest-middleware so transient transport failures are retried
/// before the download is reported as failed.
use reqwest::StatusCode;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use std::path::Path;
use std::time::Duration;
use url::Url;

use crate::errors::{FaceVerifyError, Result};

pub struct Downloader {
    client: ClientWithMiddleware,
}

impl Downloader {
    pub fn new(timeout: Duration) -> Result<Self> {
        let reqwest_client = reqwest::Client::builder()
            .use_rustls_tls()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| FaceVerifyError::Config(format!("failed to build download client: {}", e)))?;

        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(2);

        let client = ClientBuilder::new(reqwest_client)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Ok(Self { client })
    }

    /// Fetch `url` into `dest`. Anything other than `200 OK` is a failure.
    /// Returns the number of bytes written.
    pub async fn download(&self, url: &Url, dest: &Path) -> Result<u64> {
        let failed = |reason: String| FaceVerifyError::Download {
            url: url.to_string(),
            reason,
        };

        let resp = self
            .client
            .get(url.as_str())
            .send()
            .await
            .map_err(|e| failed(e.to_string()))?;

        let status = resp.status();
        if status != StatusCode::OK {
            return Err(failed(format!("HTTP {}", status.as_u16())));
        }

        let bytes = resp.bytes().await.map_err(|e| failed(e.to_string()))?;
        tokio::fs::write(dest, &bytes).await?;

        tracing::debug!(url = %url, bytes = bytes.len(), dest = %dest.display(), "downloaded image");
        Ok(bytes.len() as u64)
    }
}
