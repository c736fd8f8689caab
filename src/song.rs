use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

pub const UNKNOWN_TITLE: &str = "Unknown Title";
pub const UNKNOWN_ARTIST: &str = "Unknown Artist";
pub const UNKNOWN_ALBUM: &str = "Unknown Album";
pub const UNKNOWN_GENRE: &str = "Unknown Genre";

/// One entry of the manifest consumed by the player.
///
/// `file` is the merge key. Every other field is optional so that records
/// written by older tools survive a load/save cycle unchanged; keys this
/// struct does not know about are kept in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SongRecord {
    pub file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub album: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub genre: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

impl SongRecord {
    /// Build a fresh record from extracted metadata. `default_cover` is used
    /// when extraction produced no cover at all.
    pub fn from_metadata(
        file: impl Into<String>,
        url: impl Into<String>,
        meta: TrackMetadata,
        default_cover: &str,
    ) -> Self {
        Self {
            file: file.into(),
            url: Some(url.into()),
            title: Some(meta.title),
            artist: Some(meta.artist),
            album: Some(meta.album),
            genre: Some(meta.genre),
            duration: Some(meta.duration),
            cover: Some(meta.cover.unwrap_or_else(|| default_cover.to_string())),
            extra: Map::new(),
        }
    }

    /// True when the record points at a real thumbnail rather than nothing
    /// or the configured placeholder.
    pub fn has_real_cover(&self, default_cover: &str) -> bool {
        matches!(self.cover.as_deref(), Some(c) if !c.trim().is_empty() && c != default_cover)
    }
}

/// Metadata for one audio object, always fully populated.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackMetadata {
    pub title: String,
    pub artist: String,
    pub album: String,
    pub genre: String,
    /// Whole seconds, rounded.
    pub duration: u64,
    pub cover: Option<String>,
}

impl TrackMetadata {
    /// Placeholder result used when an object could not be fetched or parsed.
    pub fn unknown() -> Self {
        Self {
            title: UNKNOWN_TITLE.to_string(),
            artist: UNKNOWN_ARTIST.to_string(),
            album: UNKNOWN_ALBUM.to_string(),
            genre: UNKNOWN_GENRE.to_string(),
            duration: 0,
            cover: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_fields_survive_a_round_trip() {
        let raw = r#"{"file":"a.mp3","title":"A","plays":12,"tags":["x"]}"#;
        let record: SongRecord = serde_json::from_str(raw).unwrap();
        assert_eq!(record.extra.get("plays"), Some(&JsonValue::from(12)));
        assert!(record.artist.is_none());

        let back = serde_json::to_value(&record).unwrap();
        assert_eq!(back, serde_json::from_str::<JsonValue>(raw).unwrap());
    }

    #[test]
    fn from_metadata_falls_back_to_default_cover() {
        let record = SongRecord::from_metadata(
            "a.mp3",
            "https://host/file/b/a.mp3",
            TrackMetadata::unknown(),
            "covers/default.jpg",
        );
        assert_eq!(record.cover.as_deref(), Some("covers/default.jpg"));
        assert_eq!(record.duration, Some(0));
        assert_eq!(record.title.as_deref(), Some(UNKNOWN_TITLE));
        assert!(!record.has_real_cover("covers/default.jpg"));
    }

    #[test]
    fn real_cover_detection() {
        let mut record = SongRecord::from_metadata("a.mp3", "u", TrackMetadata::unknown(), "d.jpg");
        record.cover = Some("covers/a.jpg".into());
        assert!(record.has_real_cover("d.jpg"));
        record.cover = Some("  ".into());
        assert!(!record.has_real_cover("d.jpg"));
        record.cover = None;
        assert!(!record.has_real_cover("d.jpg"));
    }
}
