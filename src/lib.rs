//! Keeps a player's `songs.json` in step with an object-storage bucket.
//!
//! A run lists the bucket, extracts tags and cover thumbnails for audio
//! objects the manifest does not know yet, merges them in and writes the
//! manifest back. See [`sync::SongSync`].

pub mod bucket;
pub mod config;
pub mod cover;
pub mod error;
pub mod logging;
pub mod manifest;
pub mod metadata;
pub mod slug;
pub mod song;
pub mod sync;

pub use error::{Result, SyncError};
pub use song::SongRecord;
pub use sync::{SongSync, SyncOptions, SyncReport};
