//! Tag extraction for remote audio objects.
//!
//! [`MetadataExtractor`] fetches an object, parses its tags and thumbnails
//! the embedded picture. It never fails: fetch and parse errors turn into
//! placeholder metadata and a warning, so one bad file cannot stop a run.

use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;
use lofty::config::ParseOptions;
use lofty::prelude::*;
use lofty::probe::Probe;
use reqwest::Client;
use tracing::{debug, warn};

use crate::cover::CoverStore;
use crate::error::ExtractError;
use crate::song::{TrackMetadata, UNKNOWN_ALBUM, UNKNOWN_ARTIST, UNKNOWN_GENRE, UNKNOWN_TITLE};

// ---------------------------------------------------------------------------
// Fetching
// ---------------------------------------------------------------------------

/// Something that can download an object by URL.
#[async_trait]
pub trait ObjectFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Bytes, ExtractError>;
}

/// reqwest-backed fetcher with a hard cap on body size.
pub struct HttpFetcher {
    client: Client,
    max_bytes: u64,
}

impl HttpFetcher {
    pub fn new(client: Client, max_bytes: u64) -> Self {
        Self { client, max_bytes }
    }
}

#[async_trait]
impl ObjectFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Bytes, ExtractError> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ExtractError::Fetch(e.to_string()))?;

        let status = resp.status().as_u16();
        if status != 200 {
            return Err(ExtractError::Status {
                status,
                url: url.to_string(),
            });
        }

        if resp.content_length().is_some_and(|len| len > self.max_bytes) {
            return Err(ExtractError::TooLarge {
                limit: self.max_bytes,
            });
        }

        let mut body = BytesMut::new();
        let mut stream = resp.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| ExtractError::Fetch(e.to_string()))?;
            if (body.len() + chunk.len()) as u64 > self.max_bytes {
                return Err(ExtractError::TooLarge {
                    limit: self.max_bytes,
                });
            }
            body.extend_from_slice(&chunk);
        }

        Ok(body.freeze())
    }
}

// ---------------------------------------------------------------------------
// Tag parsing
// ---------------------------------------------------------------------------

/// Raw tag values, `None` where the source had nothing usable.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedTags {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub genre: Option<String>,
    pub duration: Option<Duration>,
    /// Embedded pictures, first one preferred.
    pub pictures: Vec<Vec<u8>>,
}

impl ParsedTags {
    /// Fill gaps with placeholders. Duration is rounded to whole seconds.
    pub fn into_metadata(self) -> (TrackMetadata, Option<Vec<u8>>) {
        let meta = TrackMetadata {
            title: self.title.unwrap_or_else(|| UNKNOWN_TITLE.to_string()),
            artist: self.artist.unwrap_or_else(|| UNKNOWN_ARTIST.to_string()),
            album: self.album.unwrap_or_else(|| UNKNOWN_ALBUM.to_string()),
            genre: self.genre.unwrap_or_else(|| UNKNOWN_GENRE.to_string()),
            duration: self
                .duration
                .map(|d| d.as_secs_f64().round() as u64)
                .unwrap_or(0),
            cover: None,
        };
        (meta, self.pictures.into_iter().next())
    }
}

pub trait TagParser: Send + Sync {
    fn parse(&self, data: &[u8]) -> Result<ParsedTags, ExtractError>;
}

/// `lofty`-backed parser. The format is detected from content, not the name.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoftyParser;

fn clean(value: Option<std::borrow::Cow<'_, str>>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl TagParser for LoftyParser {
    fn parse(&self, data: &[u8]) -> Result<ParsedTags, ExtractError> {
        let parse_opts = ParseOptions::new().read_properties(true);
        let tagged_file = Probe::new(Cursor::new(data))
            .options(parse_opts)
            .guess_file_type()?
            .read()?;

        let mut parsed = ParsedTags::default();

        // Primary tag first, then whatever else the file carries.
        for tag in tagged_file.primary_tag().into_iter().chain(tagged_file.tags()) {
            if parsed.title.is_none() {
                parsed.title = clean(tag.title());
            }
            if parsed.artist.is_none() {
                parsed.artist = clean(tag.artist());
            }
            if parsed.album.is_none() {
                parsed.album = clean(tag.album());
            }
            if parsed.genre.is_none() {
                parsed.genre = clean(tag.genre());
            }
            if parsed.pictures.is_empty() {
                parsed.pictures = tag.pictures().iter().map(|p| p.data().to_vec()).collect();
            }
        }

        let duration = tagged_file.properties().duration();
        if !duration.is_zero() {
            parsed.duration = Some(duration);
        }

        Ok(parsed)
    }
}

// ---------------------------------------------------------------------------
// Extractor
// ---------------------------------------------------------------------------

/// Outcome of extracting one object.
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub metadata: TrackMetadata,
    /// Fetch or parse failed and `metadata` holds placeholders.
    pub failed: bool,
    /// A new thumbnail file was written.
    pub cover_created: bool,
}

pub struct MetadataExtractor {
    fetcher: Arc<dyn ObjectFetcher>,
    parser: Arc<dyn TagParser>,
    covers: CoverStore,
}

impl MetadataExtractor {
    pub fn new(
        fetcher: Arc<dyn ObjectFetcher>,
        parser: Arc<dyn TagParser>,
        covers: CoverStore,
    ) -> Self {
        Self {
            fetcher,
            parser,
            covers,
        }
    }

    async fn fetch_and_parse(&self, url: &str) -> Result<ParsedTags, ExtractError> {
        let data = self.fetcher.fetch(url).await?;
        debug!(url, bytes = data.len(), "Fetched object");

        let parser = Arc::clone(&self.parser);
        tokio::task::spawn_blocking(move || parser.parse(&data))
            .await
            .map_err(|e| ExtractError::Parse(e.to_string()))?
    }

    /// Metadata for the object at `url`; `slug` names its thumbnail.
    pub async fn extract(&self, url: &str, slug: &str) -> Extraction {
        let tags = match self.fetch_and_parse(url).await {
            Ok(tags) => tags,
            Err(e) => {
                warn!(url, error = %e, "Metadata unavailable, using placeholders");
                return Extraction {
                    metadata: TrackMetadata::unknown(),
                    failed: true,
                    cover_created: false,
                };
            }
        };

        let (mut metadata, picture) = tags.into_metadata();
        let mut cover_created = false;

        if let Some(picture) = picture {
            let store = self.covers.clone();
            let name = slug.to_string();
            match tokio::task::spawn_blocking(move || store.store(&picture, &name)).await {
                Ok(Ok(stored)) => {
                    cover_created = stored.created;
                    metadata.cover = Some(stored.path);
                }
                Ok(Err(e)) => warn!(slug, error = %e, "Cover not produced"),
                Err(e) => warn!(slug, error = %e, "Cover task failed"),
            }
        }

        Extraction {
            metadata,
            failed: false,
            cover_created,
        }
    }
}
