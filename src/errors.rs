use std::path::PathBuf;

use thiserror::Error;

/// Coarse classification used by retry loops and callers deciding what to
/// show. Derived from the variant, never from the message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Provider throttling or flaky transport. Safe to retry.
    Transient,
    /// The image itself is unusable (no face, poor quality).
    Input,
    /// Local file or download problems.
    Io,
    /// Provider schema surprises, configuration, storage.
    Unexpected,
}

#[derive(Debug, Error)]
pub enum FaceVerifyError {
    #[error("No face detected in image")]
    NoFaceDetected,

    #[error("poor face quality: {}", .issues.join("; "))]
    PoorQuality { score: u8, issues: Vec<String> },

    #[error("provider concurrency limit exceeded")]
    ConcurrencyLimit,

    #[error("provider error: {0}")]
    Provider(String),

    #[error("provider returned HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("failed to download image from {url}: {reason}")]
    Download { url: String, reason: String },

    #[error("image file not found: {}", .0.display())]
    FileMissing(PathBuf),

    #[error("image processing failed: {0}")]
    ImageProcessing(String),

    #[error("image is {size} bytes after compression, limit is {limit}")]
    ImageTooLarge { size: u64, limit: u64 },

    #[error("invalid provider response: {0}")]
    InvalidResponse(String),

    #[error("{operation} failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        operation: &'static str,
        attempts: u32,
        #[source]
        source: Box<FaceVerifyError>,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("storage error: {0}")]
    Storage(#[from] anyhow::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl FaceVerifyError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FaceVerifyError::NoFaceDetected | FaceVerifyError::PoorQuality { .. } => {
                ErrorKind::Input
            }
            FaceVerifyError::ConcurrencyLimit
            | FaceVerifyError::Provider(_)
            | FaceVerifyError::HttpStatus { .. }
            | FaceVerifyError::Network(_) => ErrorKind::Transient,
            FaceVerifyError::Download { .. }
            | FaceVerifyError::FileMissing(_)
            | FaceVerifyError::ImageProcessing(_)
            | FaceVerifyError::ImageTooLarge { .. }
            | FaceVerifyError::Io(_) => ErrorKind::Io,
            FaceVerifyError::RetriesExhausted { source, .. } => source.kind(),
            FaceVerifyError::InvalidResponse(_)
            | FaceVerifyError::Config(_)
            | FaceVerifyError::Storage(_) => ErrorKind::Unexpected,
        }
    }

    /// Whether the detection loop should spend another attempt on this error.
    /// Malformed responses are retried too: the provider occasionally returns
    /// truncated bodies under load.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Transient)
            || matches!(self, FaceVerifyError::InvalidResponse(_))
    }

    /// Text safe to show to the end user.
    pub fn user_message(&self) -> &'static str {
        match self {
            FaceVerifyError::NoFaceDetected => {
                "No face detected. Please ensure your face is clearly visible and well lit."
            }
            FaceVerifyError::PoorQuality { .. } => {
                "Photo quality is too low. Please retake the photo in better lighting."
            }
            FaceVerifyError::ConcurrencyLimit => {
                "The verification service is busy. Please try again in a moment."
            }
            FaceVerifyError::Network(_) | FaceVerifyError::Download { .. } => {
                "Network problem. Please check your connection and try again."
            }
            FaceVerifyError::FileMissing(_) | FaceVerifyError::ImageProcessing(_) => {
                "We could not read that photo. Please choose or take another one."
            }
            FaceVerifyError::ImageTooLarge { .. } => {
                "That photo is too large. Please choose a smaller one."
            }
            FaceVerifyError::RetriesExhausted { source, .. } => source.user_message(),
            _ => "Verification failed. Please try again.",
        }
    }
}

/// Error returned by a full verification run: the technical cause plus the
/// text to show and how long the attempt took.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct VerificationFailure {
    #[source]
    pub error: FaceVerifyError,
    pub user_message: String,
    pub processing_time_ms: u64,
}

impl VerificationFailure {
    pub fn new(error: FaceVerifyError, processing_time_ms: u64) -> Self {
        Self {
            user_message: error.user_message().to_string(),
            error,
            processing_time_ms,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.error.kind()
    }
}

impl From<reqwest::Error> for FaceVerifyError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            FaceVerifyError::InvalidResponse(e.to_string())
        } else {
            FaceVerifyError::Network(e.to_string())
        }
    }
}

pub type Result<T, E = FaceVerifyError> = std::result::Result<T, E>;
