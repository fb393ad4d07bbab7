//! faceverify — selfie-vs-reference face verification over a Face++ style
//! detect/compare HTTP API.
//!
//! Build a [`FaceVerifier`] once (it owns the rate limiter and caches) and
//! call [`FaceVerifier::verify_faces`] per capture.

pub mod cache;
pub mod compare;
pub mod config;
pub mod detect;
pub mod errors;
pub mod imaging;
pub mod models;
pub mod provider;
pub mod rate_limit;
pub mod token_cache;
pub mod verify;

pub use cache::{KeyValueStore, MemoryStore, RedisStore};
pub use config::FaceApiConfig;
pub use errors::{ErrorKind, FaceVerifyError, VerificationFailure};
pub use imaging::ImageRef;
pub use models::{VerificationResult, VerifyOptions};
pub use verify::FaceVerifier;
