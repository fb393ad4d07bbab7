//! Reference face-token cache.
//!
//! Stores `{token, timestamp}` JSON under `face_token_<key>` so a reference
//! photo is only sent to the detect endpoint once per `max_age`.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::cache::KeyValueStore;

pub const TOKEN_PREFIX: &str = "face_token_";
pub const ASSET_PREFIX: &str = "asset_uri_";
pub const REMOTE_IMAGE_PREFIX: &str = "remote_image_";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedToken {
    pub token: String,
    /// Epoch milliseconds.
    pub timestamp: i64,
}

impl CachedToken {
    fn age(&self, now_ms: i64) -> Duration {
        Duration::from_millis(now_ms.saturating_sub(self.timestamp).max(0) as u64)
    }
}

#[derive(Clone)]
pub struct TokenCache {
    store: Arc<dyn KeyValueStore>,
    default_max_age: Duration,
}

impl TokenCache {
    pub fn new(store: Arc<dyn KeyValueStore>, default_max_age: Duration) -> Self {
        Self {
            store,
            default_max_age,
        }
    }

    fn key(cache_key: &str) -> String {
        format!("{}{}", TOKEN_PREFIX, cache_key)
    }

    pub async fn put(&self, cache_key: &str, token: &str) -> anyhow::Result<()> {
        let entry = CachedToken {
            token: token.to_string(),
            timestamp: chrono::Utc::now().timestamp_millis(),
        };
        let json = serde_json::to_string(&entry)?;
        // the store TTL only bounds garbage; freshness is judged on read
        self.store
            .put(&Self::key(cache_key), json, Some(self.default_max_age))
            .await
    }

    /// Fresh token for `cache_key`, or `None`. Stale and unreadable entries
    /// are deleted.
    pub async fn get(&self, cache_key: &str, max_age: Option<Duration>) -> anyhow::Result<Option<String>> {
        let key = Self::key(cache_key);
        let Some(raw) = self.store.get(&key).await? else {
            return Ok(None);
        };

        let entry: CachedToken = match serde_json::from_str(&raw) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "dropping unreadable cached face token");
                self.store.delete(&key).await?;
                return Ok(None);
            }
        };

        let max_age = max_age.unwrap_or(self.default_max_age);
        let age = entry.age(chrono::Utc::now().timestamp_millis());
        if age > max_age {
            tracing::debug!(key = %key, age_secs = age.as_secs(), "cached face token expired");
            self.store.delete(&key).await?;
            return Ok(None);
        }

        Ok(Some(entry.token))
    }

    /// Remove cached tokens, copied asset paths and downloaded image paths.
    pub async fn clear(&self) -> anyhow::Result<usize> {
        let mut removed = 0;
        for prefix in [TOKEN_PREFIX, ASSET_PREFIX, REMOTE_IMAGE_PREFIX] {
            removed += self.store.delete_prefix(prefix).await?;
        }
        tracing::info!(removed, "cleared face verification cache");
        Ok(removed)
    }
}
