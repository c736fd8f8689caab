//! Object storage access.
//!
//! - [`B2Lister`]: Backblaze B2 native API (default)
//! - [`S3Lister`]: any S3-compatible endpoint through `aws-sdk-s3`
//!
//! The sync pipeline only sees `dyn BucketLister`, so tests drive it with
//! in-memory stubs.

pub mod b2;
pub mod s3;

pub use b2::B2Lister;
pub use s3::S3Lister;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

use crate::error::{Result, SyncError};

/// A bucket resolved on the storage side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketRef {
    pub id: String,
    pub name: String,
}

/// One entry of a bucket listing.
#[derive(Debug, Clone, PartialEq)]
pub struct BucketObject {
    pub name: String,
    pub size: u64,
    pub uploaded_at: Option<DateTime<Utc>>,
}

/// A page of objects plus the cursor for the next page, `None` at the end.
#[derive(Debug, Clone, Default)]
pub struct ObjectPage {
    pub objects: Vec<BucketObject>,
    pub next_cursor: Option<String>,
}

/// Something that can enumerate a bucket page by page.
///
/// Implementations authenticate when they are constructed; every error they
/// return is fatal for the run.
#[async_trait]
pub trait BucketLister: Send + Sync {
    /// Short backend name for logs ("b2", "s3").
    fn backend_name(&self) -> &str;

    /// Look up the named bucket, or the first bucket of the account.
    async fn resolve_bucket(&self, name: Option<&str>) -> Result<BucketRef>;

    async fn list_page(
        &self,
        bucket: &BucketRef,
        cursor: Option<&str>,
        page_size: u32,
    ) -> Result<ObjectPage>;

    /// Public retrieval URL for an object.
    fn object_url(&self, bucket: &BucketRef, object_name: &str) -> String;
}

/// Full listing of a bucket.
#[derive(Debug, Clone, Default)]
pub struct Listing {
    pub objects: Vec<BucketObject>,
    pub pages: usize,
}

/// Follow cursors until the lister reports no next page.
pub async fn list_all(
    lister: &dyn BucketLister,
    bucket: &BucketRef,
    page_size: u32,
) -> Result<Listing> {
    let mut listing = Listing::default();
    let mut cursor: Option<String> = None;

    loop {
        let page = lister
            .list_page(bucket, cursor.as_deref(), page_size)
            .await?;
        listing.pages += 1;
        debug!(
            page = listing.pages,
            objects = page.objects.len(),
            "Listed bucket page"
        );
        listing.objects.extend(page.objects);

        match page.next_cursor {
            Some(next) if cursor.as_deref() == Some(next.as_str()) => {
                return Err(SyncError::Listing(format!(
                    "{} returned cursor {:?} twice",
                    lister.backend_name(),
                    next
                )));
            }
            Some(next) => cursor = Some(next),
            None => break,
        }
    }

    Ok(listing)
}

/// Whether `name` ends with one of `extensions` (no dot, case-insensitive).
pub fn has_extension(name: &str, extensions: &[String]) -> bool {
    let Some((_, ext)) = name.rsplit_once('.') else {
        return false;
    };
    extensions.iter().any(|e| e.eq_ignore_ascii_case(ext))
}
