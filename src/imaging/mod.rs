//! Image preparation: turns a local path, remote URL or bundled asset into a
//! local file the provider can receive, compressing oversized images.
//!
//! Resolved locations are remembered in the key-value store:
//! - `remote_image_<url>` → downloaded file
//! - `asset_uri_<name>` → copied asset
//!
//! A remembered path is only reused while the file still exists. Compressed
//! copies live at one path per source image, so `cache_dir` holds at most one
//! per source.

pub mod compress;
pub mod download;

use base64::Engine;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use url::Url;
use uuid::Uuid;

use crate::cache::KeyValueStore;
use crate::config::FaceApiConfig;
use crate::errors::{FaceVerifyError, Result};
use crate::token_cache::{ASSET_PREFIX, REMOTE_IMAGE_PREFIX};

use download::Downloader;

const ASSET_SCHEME: &str = "asset:";

/// Where an image comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageRef {
    Local(PathBuf),
    Remote(Url),
    /// Name relative to the configured asset directory.
    Asset(String),
}

impl FromStr for ImageRef {
    type Err = FaceVerifyError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(FaceVerifyError::Config("empty image reference".into()));
        }
        if let Some(name) = s.strip_prefix(ASSET_SCHEME) {
            let name = name.trim_start_matches('/');
            if name.is_empty() {
                return Err(FaceVerifyError::Config(format!("invalid asset reference: {}", s)));
            }
            return Ok(ImageRef::Asset(name.to_string()));
        }
        if s.starts_with("http://") || s.starts_with("https://") {
            let url = Url::parse(s)
                .map_err(|e| FaceVerifyError::Config(format!("invalid image URL {}: {}", s, e)))?;
            return Ok(ImageRef::Remote(url));
        }
        if s.starts_with("file://") {
            let path = Url::parse(s)
                .ok()
                .and_then(|u| u.to_file_path().ok())
                .ok_or_else(|| FaceVerifyError::Config(format!("invalid file URI: {}", s)))?;
            return Ok(ImageRef::Local(path));
        }
        Ok(ImageRef::Local(PathBuf::from(s)))
    }
}

impl From<PathBuf> for ImageRef {
    fn from(path: PathBuf) -> Self {
        ImageRef::Local(path)
    }
}

impl From<&Path> for ImageRef {
    fn from(path: &Path) -> Self {
        ImageRef::Local(path.to_path_buf())
    }
}

impl std::fmt::Display for ImageRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImageRef::Local(p) => write!(f, "{}", p.display()),
            ImageRef::Remote(u) => write!(f, "{}", u),
            ImageRef::Asset(name) => write!(f, "{}{}", ASSET_SCHEME, name),
        }
    }
}

/// A local file ready to be sent to the provider.
#[derive(Debug, Clone)]
pub struct PreparedImage {
    pub path: PathBuf,
    pub size_bytes: u64,
    /// True when `path` is a re-encoded copy of the original.
    pub compressed: bool,
}

impl PreparedImage {
    /// Standard-alphabet base64 of the file contents, for `image_base64`.
    pub async fn read_base64(&self) -> Result<String> {
        let bytes = tokio::fs::read(&self.path).await?;
        Ok(base64::engine::general_purpose::STANDARD.encode(bytes))
    }
}

pub struct ImagePreparer {
    store: Arc<dyn KeyValueStore>,
    downloader: Downloader,
    cache_dir: PathBuf,
    asset_dir: PathBuf,
    max_image_bytes: u64,
    max_image_width: u32,
    jpeg_quality: u8,
}

impl ImagePreparer {
    pub fn new(config: &FaceApiConfig, store: Arc<dyn KeyValueStore>) -> Result<Self> {
        Ok(Self {
            store,
            downloader: Downloader::new(config.request_timeout)?,
            cache_dir: config.cache_dir.clone(),
            asset_dir: config.asset_dir.clone(),
            max_image_bytes: config.max_image_bytes,
            max_image_width: config.max_image_width,
            jpeg_quality: config.jpeg_quality,
        })
    }

    /// Resolve `image` to a local file and compress it if it is larger than
    /// the configured limit.
    pub async fn prepare(&self, image: &ImageRef) -> Result<PreparedImage> {
        let path = self.resolve(image).await?;
        let size_bytes = tokio::fs::metadata(&path).await?.len();

        if size_bytes <= self.max_image_bytes {
            return Ok(PreparedImage {
                path,
                size_bytes,
                compressed: false,
            });
        }

        self.compress(path, size_bytes).await
    }

    /// Turn any reference into an existing local path.
    pub async fn resolve(&self, image: &ImageRef) -> Result<PathBuf> {
        match image {
            ImageRef::Local(path) => {
                if file_exists(path).await {
                    Ok(path.clone())
                } else {
                    Err(FaceVerifyError::FileMissing(path.clone()))
                }
            }
            ImageRef::Remote(url) => self.resolve_remote(url).await,
            ImageRef::Asset(name) => self.resolve_asset(name).await,
        }
    }

    async fn resolve_remote(&self, url: &Url) -> Result<PathBuf> {
        let key = format!("{}{}", REMOTE_IMAGE_PREFIX, url);
        if let Some(path) = self.remembered(&key).await {
            tracing::debug!(url = %url, path = %path.display(), "reusing downloaded image");
            return Ok(path);
        }

        tokio::fs::create_dir_all(&self.cache_dir).await?;
        let dest = self
            .cache_dir
            .join(format!("remote_{}.{}", Uuid::new_v4(), extension_of(url.path())));

        if let Err(e) = self.downloader.download(url, &dest).await {
            // never leave a partial file behind
            let _ = tokio::fs::remove_file(&dest).await;
            return Err(e);
        }

        if !file_exists(&dest).await {
            return Err(FaceVerifyError::Download {
                url: url.to_string(),
                reason: "file missing after download".into(),
            });
        }

        self.remember(&key, &dest).await;
        Ok(dest)
    }

    async fn resolve_asset(&self, name: &str) -> Result<PathBuf> {
        let key = format!("{}{}", ASSET_PREFIX, name);
        if let Some(path) = self.remembered(&key).await {
            return Ok(path);
        }

        let src = self.asset_dir.join(name);
        if !file_exists(&src).await {
            return Err(FaceVerifyError::FileMissing(src));
        }

        tokio::fs::create_dir_all(&self.cache_dir).await?;
        let dest = self
            .cache_dir
            .join(format!("asset_{}", name.replace(['/', '\\'], "_")));
        tokio::fs::copy(&src, &dest).await?;

        tracing::debug!(asset = name, path = %dest.display(), "copied bundled asset");
        self.remember(&key, &dest).await;
        Ok(dest)
    }

    /// Re-encode `original` into its deterministic slot in the cache
    /// directory. A slot newer than the source is reused, so repeated
    /// preparation of one image keeps a single compressed copy.
    async fn compress(&self, original: PathBuf, original_size: u64) -> Result<PreparedImage> {
        tokio::fs::create_dir_all(&self.cache_dir).await?;
        let dest = self.compressed_path(&original);

        if let Some(size_bytes) = fresh_copy_size(&original, &dest).await {
            if size_bytes <= self.max_image_bytes {
                tracing::debug!(path = %dest.display(), "reusing compressed image");
                return Ok(PreparedImage {
                    path: dest,
                    size_bytes,
                    compressed: true,
                });
            }
        }

        let tmp = self
            .cache_dir
            .join(format!("compressing_{}.jpg", Uuid::new_v4()));
        let (src, out) = (original.clone(), tmp.clone());
        let (max_width, quality) = (self.max_image_width, self.jpeg_quality);
        let encoded = tokio::task::spawn_blocking(move || {
            compress::compress_to_jpeg(&src, &out, max_width, quality)
        })
        .await
        .map_err(|e| FaceVerifyError::ImageProcessing(e.to_string()));

        let compressed_size = match encoded {
            Ok(Ok(size)) => size,
            Ok(Err(e)) | Err(e) => {
                let _ = tokio::fs::remove_file(&tmp).await;
                return Err(e);
            }
        };

        if compressed_size > self.max_image_bytes {
            let _ = tokio::fs::remove_file(&tmp).await;
            tracing::warn!(
                original_size,
                compressed_size,
                limit = self.max_image_bytes,
                "image still too large after compression"
            );
            return Err(FaceVerifyError::ImageTooLarge {
                size: compressed_size,
                limit: self.max_image_bytes,
            });
        }

        if let Err(e) = tokio::fs::rename(&tmp, &dest).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }

        tracing::info!(
            original_size,
            compressed_size,
            max_width,
            "compressed oversized image"
        );
        Ok(PreparedImage {
            path: dest,
            size_bytes: compressed_size,
            compressed: true,
        })
    }

    fn compressed_path(&self, original: &Path) -> PathBuf {
        let id = Uuid::new_v5(
            &Uuid::NAMESPACE_URL,
            original.to_string_lossy().as_bytes(),
        );
        self.cache_dir.join(format!("compressed_{}.jpg", id))
    }

    /// Path remembered under `key`, if the file is still there.
    async fn remembered(&self, key: &str) -> Option<PathBuf> {
        match self.store.get(key).await {
            Ok(Some(p)) => {
                let path = PathBuf::from(p);
                if file_exists(&path).await {
                    Some(path)
                } else {
                    let _ = self.store.delete(key).await;
                    None
                }
            }
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(key, error = %e, "image cache lookup failed");
                None
            }
        }
    }

    async fn remember(&self, key: &str, path: &Path) {
        let value = path.to_string_lossy().into_owned();
        if let Err(e) = self.store.put(key, value, None).await {
            tracing::warn!(key, error = %e, "failed to cache image path");
        }
    }
}

async fn file_exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}

/// Size of `copy` if it exists and was written after `source` last changed.
async fn fresh_copy_size(source: &Path, copy: &Path) -> Option<u64> {
    let copy_meta = tokio::fs::metadata(copy).await.ok()?;
    let source_modified = tokio::fs::metadata(source).await.ok()?.modified().ok()?;
    if copy_meta.modified().ok()? >= source_modified {
        Some(copy_meta.len())
    } else {
        None
    }
}

fn extension_of(path: &str) -> &str {
    path.rsplit('/')
        .next()
        .and_then(|name| name.rsplit_once('.'))
        .map(|(_, ext)| ext)
        .filter(|ext| !ext.is_empty() && ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or("jpg")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryStore;
    use rand::Rng;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn preparer(dir: &Path, store: &MemoryStore) -> ImagePreparer {
        preparer_with_limit(dir, store, FaceApiConfig::default().max_image_bytes)
    }

    fn preparer_with_limit(dir: &Path, store: &MemoryStore, max_image_bytes: u64) -> ImagePreparer {
        let config = FaceApiConfig {
            cache_dir: dir.join("cache"),
            asset_dir: dir.join("assets"),
            max_image_bytes,
            ..FaceApiConfig::default()
        };
        ImagePreparer::new(&config, Arc::new(store.clone())).unwrap()
    }

    /// Random pixels do not compress losslessly, so a 1400x1400 PNG of them
    /// is well over 2 MiB.
    fn write_noise_png(path: &Path) -> u64 {
        let mut rng = rand::thread_rng();
        let img = image::RgbImage::from_fn(1400, 1400, |_, _| {
            image::Rgb([rng.gen(), rng.gen(), rng.gen()])
        });
        img.save(path).unwrap();
        std::fs::metadata(path).unwrap().len()
    }

    fn files_in(dir: &Path) -> usize {
        std::fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
    }

    #[test]
    fn test_parse_image_refs() {
        assert_eq!(
            "/tmp/selfie.jpg".parse::<ImageRef>().unwrap(),
            ImageRef::Local(PathBuf::from("/tmp/selfie.jpg"))
        );
        assert_eq!(
            "file:///tmp/selfie.jpg".parse::<ImageRef>().unwrap(),
            ImageRef::Local(PathBuf::from("/tmp/selfie.jpg"))
        );
        assert!(matches!(
            "https://cdn.example.com/p/1.jpg".parse::<ImageRef>().unwrap(),
            ImageRef::Remote(_)
        ));
        assert_eq!(
            "asset:reference/default.png".parse::<ImageRef>().unwrap(),
            ImageRef::Asset("reference/default.png".into())
        );
        assert!("".parse::<ImageRef>().is_err());
        assert!("asset:".parse::<ImageRef>().is_err());
    }

    #[test]
    fn test_extension_of() {
        assert_eq!(extension_of("/photos/a.png"), "png");
        assert_eq!(extension_of("/photos/a"), "jpg");
        assert_eq!(extension_of("/photos.d/a"), "jpg");
        assert_eq!(extension_of("/a.weird?ext"), "jpg");
    }

    #[tokio::test]
    async fn test_missing_local_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::new();
        let p = preparer(dir.path(), &store);
        let err = p
            .prepare(&ImageRef::Local(dir.path().join("nope.jpg")))
            .await
            .unwrap_err();
        assert!(matches!(err, FaceVerifyError::FileMissing(_)));
    }

    #[tokio::test]
    async fn test_small_local_file_is_passed_through() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::new();
        let p = preparer(dir.path(), &store);
        let src = dir.path().join("selfie.jpg");
        std::fs::write(&src, b"tiny").unwrap();

        let prepared = p.prepare(&ImageRef::Local(src.clone())).await.unwrap();
        assert_eq!(prepared.path, src);
        assert!(!prepared.compressed);
        assert_eq!(prepared.read_base64().await.unwrap(), "dGlueQ==");
    }

    #[tokio::test]
    async fn test_oversized_image_is_compressed() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::new();
        let p = preparer(dir.path(), &store);

        let src = dir.path().join("big.png");
        let original = write_noise_png(&src);
        assert!(original > 2 * 1024 * 1024);

        let prepared = p.prepare(&ImageRef::Local(src.clone())).await.unwrap();
        assert!(prepared.compressed);
        assert!(prepared.size_bytes <= original);
        assert!(prepared.path.exists());
        let (w, h) = image::image_dimensions(&prepared.path).unwrap();
        assert_eq!((w, h), (1024, 1024));
    }

    #[tokio::test]
    async fn test_repeated_compression_keeps_one_copy() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::new();
        let p = preparer(dir.path(), &store);
        let src = dir.path().join("big.png");
        write_noise_png(&src);

        let first = p.prepare(&ImageRef::Local(src.clone())).await.unwrap();
        for _ in 0..2 {
            let again = p.prepare(&ImageRef::Local(src.clone())).await.unwrap();
            assert!(again.compressed);
            assert_eq!(again.path, first.path);
        }
        assert_eq!(files_in(&dir.path().join("cache")), 1);
    }

    #[tokio::test]
    async fn test_image_over_limit_after_compression_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::new();
        let p = preparer_with_limit(dir.path(), &store, 100 * 1024);
        let src = dir.path().join("big.png");
        write_noise_png(&src);

        let err = p.prepare(&ImageRef::Local(src)).await.unwrap_err();
        match &err {
            FaceVerifyError::ImageTooLarge { size, limit } => {
                assert_eq!(*limit, 100 * 1024);
                assert!(*size > *limit);
            }
            other => panic!("expected oversized image error, got {:?}", other),
        }
        assert_eq!(err.kind(), crate::errors::ErrorKind::Io);
        assert!(!err.is_retryable());
        assert_eq!(files_in(&dir.path().join("cache")), 0);
    }

    #[tokio::test]
    async fn test_remote_image_downloaded_once() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/photos/ref.jpg"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"jpeg-bytes".to_vec()))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::new();
        let p = preparer(dir.path(), &store);
        let url = format!("{}/photos/ref.jpg", server.uri());
        let image: ImageRef = url.parse().unwrap();

        let first = p.prepare(&image).await.unwrap();
        let second = p.prepare(&image).await.unwrap();
        assert_eq!(first.path, second.path);
        assert_eq!(std::fs::read(&first.path).unwrap(), b"jpeg-bytes");

        let key = format!("remote_image_{}", url);
        assert_eq!(
            store.get(&key).await.unwrap(),
            Some(first.path.to_string_lossy().into_owned())
        );
    }

    #[tokio::test]
    async fn test_remote_redownloads_when_file_deleted() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/photos/ref.jpg"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"jpeg-bytes".to_vec()))
            .expect(2)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::new();
        let p = preparer(dir.path(), &store);
        let image: ImageRef = format!("{}/photos/ref.jpg", server.uri()).parse().unwrap();

        let first = p.prepare(&image).await.unwrap();
        std::fs::remove_file(&first.path).unwrap();
        let second = p.prepare(&image).await.unwrap();
        assert_ne!(first.path, second.path);
        assert!(second.path.exists());
    }

    #[tokio::test]
    async fn test_failed_download_is_not_cached() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/photos/missing.jpg"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::new();
        let p = preparer(dir.path(), &store);
        let image: ImageRef = format!("{}/photos/missing.jpg", server.uri()).parse().unwrap();

        let err = p.prepare(&image).await.unwrap_err();
        match err {
            FaceVerifyError::Download { reason, .. } => assert_eq!(reason, "HTTP 404"),
            other => panic!("expected download error, got {:?}", other),
        }
        assert!(store.is_empty());
        let leftovers: Vec<_> = std::fs::read_dir(dir.path().join("cache")).unwrap().collect();
        assert!(leftovers.is_empty(), "partial download left behind");
    }

    #[tokio::test]
    async fn test_asset_copied_once() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("assets/reference")).unwrap();
        std::fs::write(dir.path().join("assets/reference/default.jpg"), b"asset").unwrap();
        let store = MemoryStore::new();
        let p = preparer(dir.path(), &store);
        let image: ImageRef = "asset:reference/default.jpg".parse().unwrap();

        let first = p.prepare(&image).await.unwrap();
        assert!(first.path.starts_with(dir.path().join("cache")));
        assert_eq!(std::fs::read(&first.path).unwrap(), b"asset");
        assert!(store
            .get("asset_uri_reference/default.jpg")
            .await
            .unwrap()
            .is_some());

        // the copy is reused even if the bundled source disappears
        std::fs::remove_file(dir.path().join("assets/reference/default.jpg")).unwrap();
        let second = p.prepare(&image).await.unwrap();
        assert_eq!(first.path, second.path);
    }

    #[tokio::test]
    async fn test_missing_asset() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::new();
        let p = preparer(dir.path(), &store);
        let err = p
            .prepare(&ImageRef::Asset("nope.png".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, FaceVerifyError::FileMissing(_)));
    }
}
