use std::path::PathBuf;
use std::time::Duration;

use chrono::TimeDelta;
use clap::{Parser, ValueEnum};

use crate::bucket::s3::S3Settings;
use crate::error::{Result, SyncError};
use crate::sync::{SyncOptions, DEFAULT_COVER, DEFAULT_MANIFEST, DEFAULT_PAGE_SIZE};

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    /// Backblaze B2 native API
    B2,
    /// S3-compatible API
    S3,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "songs-sync",
    about = "Sync a bucket of audio files into the player's songs.json"
)]
pub struct Args {
    /// Manifest to read and update
    #[arg(long, default_value = DEFAULT_MANIFEST)]
    pub manifest: PathBuf,

    /// Directory thumbnails are written to
    #[arg(long, default_value = "public/covers")]
    pub covers_dir: PathBuf,

    /// Bucket to scan (default: B2_BUCKET_NAME, else the first bucket)
    #[arg(long)]
    pub bucket: Option<String>,

    /// Storage API to talk to
    #[arg(long, value_enum, default_value = "b2")]
    pub backend: Backend,

    /// Objects requested per listing call
    #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
    pub page_size: u32,

    /// Re-extract songs already in the manifest
    #[arg(long)]
    pub force: bool,

    /// Only objects whose name starts with this prefix (case insensitive)
    #[arg(long)]
    pub only: Option<String>,

    /// Extract at most N new objects (0 = no limit)
    #[arg(long, default_value = "0")]
    pub limit: usize,

    /// Only consider objects uploaded within the last N minutes
    #[arg(long)]
    pub recent: Option<u32>,

    /// Objects extracted in parallel
    #[arg(long, default_value = "1")]
    pub concurrency: usize,

    /// Do everything except writing the manifest
    #[arg(long)]
    pub dry_run: bool,

    /// Debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

pub const MAX_PAGE_SIZE: u32 = 10_000;
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_MAX_OBJECT_BYTES: u64 = 256 * 1024 * 1024;

#[derive(Debug, Clone)]
pub enum Credentials {
    B2 { key_id: String, app_key: String },
    S3(S3Settings),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub credentials: Credentials,
    pub covers_dir: PathBuf,
    /// Prefix written into the manifest for thumbnails, e.g. `covers`.
    pub cover_url_prefix: String,
    pub http_timeout: Duration,
    pub max_object_bytes: u64,
    pub sync: SyncOptions,
}

/// Load `.env` from the working directory, falling back to `PROJECT_ROOT`.
pub fn load_dotenv() {
    let local = PathBuf::from(".env");
    if local.exists() {
        dotenvy::from_path(&local).ok();
        return;
    }

    if let Ok(project_root) = std::env::var("PROJECT_ROOT") {
        let env_path = PathBuf::from(&project_root).join(".env");
        if env_path.exists() {
            dotenvy::from_path(env_path).ok();
        }
    }
}

impl Config {
    pub fn from_env(args: Args) -> Result<Self> {
        Self::resolve(args, |key| std::env::var(key).ok())
    }

    /// Combine CLI flags with values from `lookup` (normally the process
    /// environment). Flags win.
    pub fn resolve(args: Args, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let required = |key: &str| {
            var(key).ok_or_else(|| SyncError::Config(format!("{} is not set", key)))
        };

        let credentials = match args.backend {
            Backend::B2 => Credentials::B2 {
                key_id: required("B2_KEY_ID")?,
                app_key: required("B2_APP_KEY")?,
            },
            Backend::S3 => Credentials::S3(S3Settings {
                access_key: required("S3_ACCESS_KEY_ID")?,
                secret_key: required("S3_SECRET_ACCESS_KEY")?,
                region: var("S3_REGION").unwrap_or_else(|| "us-east-1".to_string()),
                endpoint: var("S3_ENDPOINT"),
                public_url: required("S3_PUBLIC_URL")?,
            }),
        };

        let bucket_name = args.bucket.clone().or_else(|| match args.backend {
            Backend::B2 => var("B2_BUCKET_NAME"),
            Backend::S3 => var("S3_BUCKET").or_else(|| var("B2_BUCKET_NAME")),
        });

        let audio_extensions: Vec<String> = var("SONGS_AUDIO_EXTENSIONS")
            .map(|raw| {
                raw.split(',')
                    .map(|e| e.trim().trim_start_matches('.').to_lowercase())
                    .filter(|e| !e.is_empty())
                    .collect()
            })
            .unwrap_or_else(|| vec!["mp3".to_string()]);
        if audio_extensions.is_empty() {
            return Err(SyncError::Config(
                "SONGS_AUDIO_EXTENSIONS has no extensions".to_string(),
            ));
        }

        let http_timeout = match var("SONGS_HTTP_TIMEOUT_SECS") {
            Some(raw) => raw.parse::<u64>().map(Duration::from_secs).map_err(|_| {
                SyncError::Config(format!("SONGS_HTTP_TIMEOUT_SECS is not a number: {}", raw))
            })?,
            None => Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        };

        let sync = SyncOptions {
            manifest_path: args.manifest,
            bucket_name,
            page_size: args.page_size.clamp(1, MAX_PAGE_SIZE),
            audio_extensions,
            default_cover: var("SONGS_DEFAULT_COVER").unwrap_or_else(|| DEFAULT_COVER.to_string()),
            force: args.force,
            only: args.only.filter(|p| !p.is_empty()),
            limit: args.limit,
            recent: args.recent.map(|m| TimeDelta::minutes(i64::from(m))),
            concurrency: args.concurrency.max(1),
            dry_run: args.dry_run,
        };

        Ok(Self {
            credentials,
            covers_dir: args.covers_dir,
            cover_url_prefix: var("SONGS_COVER_PREFIX").unwrap_or_else(|| "covers".to_string()),
            http_timeout,
            max_object_bytes: DEFAULT_MAX_OBJECT_BYTES,
            sync,
        })
    }
}
