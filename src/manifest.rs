//! The persisted song manifest: load, merge, write.
//!
//! The manifest is a pretty-printed JSON array of [`SongRecord`]s keyed by
//! `file`. It is read once at the start of a run and written once at the end.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{Result, SyncError};
use crate::song::SongRecord;

// ---------------------------------------------------------------------------
// Index
// ---------------------------------------------------------------------------

/// Existing records indexed by `file`, in byte-wise file order.
#[derive(Debug, Clone, Default)]
pub struct ManifestIndex {
    records: BTreeMap<String, SongRecord>,
}

impl ManifestIndex {
    /// Index records; the first record for a given `file` wins.
    pub fn from_records(records: Vec<SongRecord>) -> Self {
        let mut index = BTreeMap::new();
        for record in records {
            match index.entry(record.file.clone()) {
                Entry::Vacant(slot) => {
                    slot.insert(record);
                }
                Entry::Occupied(_) => {
                    warn!(file = %record.file, "Duplicate manifest entry dropped");
                }
            }
        }
        Self { records: index }
    }

    pub fn contains(&self, file: &str) -> bool {
        self.records.contains_key(file)
    }

    pub fn get(&self, file: &str) -> Option<&SongRecord> {
        self.records.get(file)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// An existing file whose lower-cased name contains `base` but is not
    /// `file` itself. Used to flag likely re-uploads under a new name.
    pub fn find_similar(&self, file: &str, base: &str) -> Option<&str> {
        let needle = base.trim().to_lowercase();
        if needle.is_empty() {
            return None;
        }
        self.records
            .keys()
            .find(|existing| existing.as_str() != file && existing.to_lowercase().contains(&needle))
            .map(String::as_str)
    }

    pub fn into_records(self) -> Vec<SongRecord> {
        self.records.into_values().collect()
    }
}

/// Read the manifest at `path`. A missing or blank file is an empty manifest;
/// a file that is not a JSON array of records is an error.
pub fn load(path: &Path) -> Result<ManifestIndex> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "No manifest yet, starting empty");
            return Ok(ManifestIndex::default());
        }
        Err(e) => return Err(SyncError::manifest(path, e)),
    };

    if raw.trim().is_empty() {
        return Ok(ManifestIndex::default());
    }

    let records: Vec<SongRecord> =
        serde_json::from_str(&raw).map_err(|e| SyncError::manifest(path, e))?;
    Ok(ManifestIndex::from_records(records))
}

// ---------------------------------------------------------------------------
// Merge
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergePolicy {
    /// Existing records are carried over untouched.
    KeepExisting,
    /// Fresh records replace existing ones, keeping an existing real cover
    /// and any unknown keys.
    Refresh,
}

#[derive(Debug, Clone, Default)]
pub struct MergeOutcome {
    pub records: Vec<SongRecord>,
    pub carried: usize,
    pub appended: usize,
    pub refreshed: usize,
}

/// Union of `existing` and `fresh`, ordered by `file`.
pub fn merge(
    existing: ManifestIndex,
    fresh: Vec<SongRecord>,
    policy: MergePolicy,
    default_cover: &str,
) -> MergeOutcome {
    let mut outcome = MergeOutcome {
        carried: existing.len(),
        ..Default::default()
    };
    let mut records = existing.records;

    for mut record in fresh {
        match records.entry(record.file.clone()) {
            Entry::Vacant(slot) => {
                slot.insert(record);
                outcome.appended += 1;
            }
            Entry::Occupied(mut slot) => {
                if policy == MergePolicy::KeepExisting {
                    continue;
                }
                let old = slot.get();
                if old.has_real_cover(default_cover) && !record.has_real_cover(default_cover) {
                    record.cover = old.cover.clone();
                }
                for (key, value) in &old.extra {
                    record.extra.entry(key.clone()).or_insert_with(|| value.clone());
                }
                slot.insert(record);
                outcome.carried -= 1;
                outcome.refreshed += 1;
            }
        }
    }

    outcome.records = records.into_values().collect();
    outcome
}

// ---------------------------------------------------------------------------
// Persist
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistOutcome {
    Written,
    Unchanged,
}

/// Pretty-printed (2-space) JSON with a trailing newline.
pub fn render(records: &[SongRecord]) -> Result<String> {
    let mut out = serde_json::to_string_pretty(records)
        .map_err(|e| SyncError::manifest("<memory>", e))?;
    out.push('\n');
    Ok(out)
}

/// Write `records` to `path` through a sibling temp file and a rename.
/// Nothing is written when the content is already identical.
pub fn persist(path: &Path, records: &[SongRecord]) -> Result<PersistOutcome> {
    let rendered = render(records)?;

    if let Ok(current) = fs::read_to_string(path) {
        if current == rendered {
            return Ok(PersistOutcome::Unchanged);
        }
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| SyncError::manifest(path, e))?;
    }

    let tmp = temp_path(path);
    let write = || -> std::io::Result<()> {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(rendered.as_bytes())?;
        file.sync_all()?;
        fs::rename(&tmp, path)
    };

    if let Err(e) = write() {
        fs::remove_file(&tmp).ok();
        return Err(SyncError::manifest(path, e));
    }

    Ok(PersistOutcome::Written)
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "manifest".into());
    name.push(".tmp");
    path.with_file_name(name)
}
