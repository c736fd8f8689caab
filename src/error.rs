use std::path::PathBuf;
use thiserror::Error;

/// Errors that abort a whole sync run.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("No buckets found for this account")]
    NoBuckets,

    #[error("Bucket not found: {0}")]
    BucketNotFound(String),

    #[error("Listing failed: {0}")]
    Listing(String),

    #[error("Manifest {path}: {reason}")]
    Manifest { path: PathBuf, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SyncError {
    pub fn manifest(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::Manifest {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

/// Per-object metadata failures. These never abort a run.
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("Request failed: {0}")]
    Fetch(String),

    #[error("HTTP {status} for {url}")]
    Status { status: u16, url: String },

    #[error("Object exceeds {limit} bytes")]
    TooLarge { limit: u64 },

    #[error("Tag parse failed: {0}")]
    Parse(String),
}

impl From<lofty::error::LoftyError> for ExtractError {
    fn from(err: lofty::error::LoftyError) -> Self {
        Self::Parse(err.to_string())
    }
}

impl From<std::io::Error> for ExtractError {
    fn from(err: std::io::Error) -> Self {
        Self::Parse(err.to_string())
    }
}

/// Per-object thumbnail failures. These never abort a run.
#[derive(Error, Debug)]
pub enum CoverError {
    #[error("Image processing failed: {0}")]
    Image(#[from] image::ImageError),

    #[error("Cannot write thumbnail: {0}")]
    Io(#[from] std::io::Error),

    #[error("Base name has no usable characters")]
    EmptySlug,
}

pub type Result<T> = std::result::Result<T, SyncError>;
