//! The sync pipeline: list the bucket, extract what the manifest lacks,
//! merge, write.
//!
//! Per object the flow is `Discovered -> Carried` when the manifest already
//! has it, otherwise `Discovered -> Extracting -> Appended` (with placeholder
//! metadata if extraction failed). Listing and manifest errors abort the run;
//! everything per object is soft.

use std::collections::HashSet;
use std::path::PathBuf;

use chrono::{TimeDelta, Utc};
use futures_util::{stream, StreamExt};
use tracing::{debug, info, warn};

use crate::bucket::{self, BucketLister, BucketObject, BucketRef};
use crate::error::Result;
use crate::manifest::{self, ManifestIndex, MergePolicy, PersistOutcome};
use crate::metadata::MetadataExtractor;
use crate::slug::{base_name, slugify};
use crate::song::SongRecord;

pub const DEFAULT_MANIFEST: &str = "public/songs.json";
pub const DEFAULT_COVER: &str = "covers/default.jpg";
pub const DEFAULT_PAGE_SIZE: u32 = 1000;

const SIDECAR_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub manifest_path: PathBuf,
    /// `None` picks the first bucket of the account.
    pub bucket_name: Option<String>,
    pub page_size: u32,
    /// Extensions without the dot, matched case-insensitively.
    pub audio_extensions: Vec<String>,
    pub default_cover: String,
    /// Re-extract objects already in the manifest.
    pub force: bool,
    /// Case-insensitive object name prefix.
    pub only: Option<String>,
    /// Maximum number of objects to extract, 0 for no limit.
    pub limit: usize,
    /// Only objects uploaded within this window are candidates.
    pub recent: Option<TimeDelta>,
    pub concurrency: usize,
    pub dry_run: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            manifest_path: PathBuf::from(DEFAULT_MANIFEST),
            bucket_name: None,
            page_size: DEFAULT_PAGE_SIZE,
            audio_extensions: vec!["mp3".to_string()],
            default_cover: DEFAULT_COVER.to_string(),
            force: false,
            only: None,
            limit: 0,
            recent: None,
            concurrency: 1,
            dry_run: false,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    pub bucket: String,
    pub pages: usize,
    pub listed: usize,
    pub candidates: usize,
    pub carried: usize,
    pub appended: usize,
    pub refreshed: usize,
    pub extraction_failures: usize,
    pub covers_written: usize,
    pub sidecar_covers: usize,
    pub total: usize,
    /// `None` on a dry run.
    pub persisted: Option<PersistOutcome>,
}

struct Processed {
    record: SongRecord,
    failed: bool,
    cover_created: bool,
    sidecar: bool,
}

pub struct SongSync<'a> {
    lister: &'a dyn BucketLister,
    extractor: &'a MetadataExtractor,
    options: SyncOptions,
}

impl<'a> SongSync<'a> {
    pub fn new(
        lister: &'a dyn BucketLister,
        extractor: &'a MetadataExtractor,
        options: SyncOptions,
    ) -> Self {
        Self {
            lister,
            extractor,
            options,
        }
    }

    pub async fn run(&self) -> Result<SyncReport> {
        let opts = &self.options;
        let existing = manifest::load(&opts.manifest_path)?;
        info!(
            path = %opts.manifest_path.display(),
            records = existing.len(),
            "Loaded manifest"
        );

        let bucket = self
            .lister
            .resolve_bucket(opts.bucket_name.as_deref())
            .await?;
        info!(backend = self.lister.backend_name(), bucket = %bucket.name, "Scanning bucket");

        let listing = bucket::list_all(self.lister, &bucket, opts.page_size).await?;
        let mut report = SyncReport {
            bucket: bucket.name.clone(),
            pages: listing.pages,
            listed: listing.objects.len(),
            ..Default::default()
        };

        let all_names: HashSet<&str> = listing.objects.iter().map(|o| o.name.as_str()).collect();
        let candidates = self.select(&listing.objects, &existing);
        report.candidates = candidates.len();
        info!(
            listed = report.listed,
            pages = report.pages,
            new = candidates.len(),
            "Listing complete"
        );

        let total = candidates.len();
        let (bucket_ref, names) = (&bucket, &all_names);
        let processed: Vec<Processed> = stream::iter(candidates.into_iter().enumerate())
            .map(move |(idx, object)| {
                info!("[{}/{}] Processing {}", idx + 1, total, object.name);
                self.process(bucket_ref, object, names)
            })
            .buffered(opts.concurrency.max(1))
            .collect()
            .await;

        let mut fresh = Vec::with_capacity(processed.len());
        for p in processed {
            report.extraction_failures += usize::from(p.failed);
            report.covers_written += usize::from(p.cover_created);
            report.sidecar_covers += usize::from(p.sidecar);

            // Placeholders never replace a record we already have.
            if p.failed && existing.contains(&p.record.file) {
                warn!(file = %p.record.file, "Refresh failed, keeping existing entry");
                continue;
            }
            fresh.push(p.record);
        }

        let policy = if opts.force {
            MergePolicy::Refresh
        } else {
            MergePolicy::KeepExisting
        };
        let merged = manifest::merge(existing, fresh, policy, &opts.default_cover);
        report.carried = merged.carried;
        report.appended = merged.appended;
        report.refreshed = merged.refreshed;
        report.total = merged.records.len();

        if opts.dry_run {
            info!(records = report.total, "Dry run, manifest not written");
        } else {
            let outcome = manifest::persist(&opts.manifest_path, &merged.records)?;
            match outcome {
                PersistOutcome::Written => {
                    info!(path = %opts.manifest_path.display(), records = report.total, "Manifest written")
                }
                PersistOutcome::Unchanged => info!("Manifest unchanged"),
            }
            report.persisted = Some(outcome);
        }

        Ok(report)
    }

    /// Audio objects that need extraction, in listing order.
    fn select<'o>(
        &self,
        objects: &'o [BucketObject],
        existing: &ManifestIndex,
    ) -> Vec<&'o BucketObject> {
        let opts = &self.options;
        let only = opts.only.as_ref().map(|p| p.to_lowercase());
        let now = Utc::now();

        let mut selected = Vec::new();
        for object in objects {
            if !bucket::has_extension(&object.name, &opts.audio_extensions) {
                continue;
            }
            if let Some(ref prefix) = only {
                if !object.name.to_lowercase().starts_with(prefix.as_str()) {
                    continue;
                }
            }
            if let Some(window) = opts.recent {
                match object.uploaded_at {
                    Some(at) if now - at <= window => {}
                    _ => continue,
                }
            }

            if existing.contains(&object.name) {
                if !opts.force {
                    debug!(file = %object.name, "Skip (already in manifest)");
                    continue;
                }
            } else if let Some(similar) = existing.find_similar(&object.name, base_name(&object.name)) {
                warn!(file = %object.name, similar, "New object looks like an existing entry");
            }

            selected.push(object);
            if opts.limit > 0 && selected.len() >= opts.limit {
                break;
            }
        }
        selected
    }

    async fn process(
        &self,
        bucket: &BucketRef,
        object: &BucketObject,
        all_names: &HashSet<&str>,
    ) -> Processed {
        let url = self.lister.object_url(bucket, &object.name);
        let slug = slugify(base_name(&object.name));
        let extraction = self.extractor.extract(&url, &slug).await;
        let mut metadata = extraction.metadata;

        let mut sidecar = false;
        if metadata.cover.is_none() {
            if let Some(image) = sidecar_cover(&object.name, all_names) {
                debug!(file = %object.name, cover = image, "Using sidecar cover");
                metadata.cover = Some(self.lister.object_url(bucket, image));
                sidecar = true;
            }
        }

        Processed {
            record: SongRecord::from_metadata(
                object.name.clone(),
                url,
                metadata,
                &self.options.default_cover,
            ),
            failed: extraction.failed,
            cover_created: extraction.cover_created,
            sidecar,
        }
    }
}

/// An image object next to `audio_name` with the same stem, if listed.
fn sidecar_cover<'n>(audio_name: &str, all_names: &HashSet<&'n str>) -> Option<&'n str> {
    let (stem, _) = audio_name.rsplit_once('.')?;
    SIDECAR_EXTENSIONS
        .iter()
        .find_map(|ext| all_names.get(format!("{}.{}", stem, ext).as_str()).copied())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sidecar_prefers_jpg_then_jpeg_then_png() {
        let names: HashSet<&str> = ["dir/Song.mp3", "dir/Song.png", "dir/Song.jpeg", "Song.jpg"]
            .into_iter()
            .collect();
        assert_eq!(sidecar_cover("dir/Song.mp3", &names), Some("dir/Song.jpeg"));
        assert_eq!(sidecar_cover("Other.mp3", &names), None);
    }
}
