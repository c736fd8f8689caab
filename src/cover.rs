use std::fs;
use std::path::PathBuf;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::DynamicImage;

use crate::error::CoverError;

pub const THUMBNAIL_MAX: u32 = 300;
pub const THUMBNAIL_QUALITY: u8 = 70;

/// A thumbnail available under the covers directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredCover {
    /// Path as written into the manifest, e.g. `covers/song-name.jpg`.
    pub path: String,
    /// False when an existing file was reused.
    pub created: bool,
}

/// Flat directory of `<slug>.jpg` thumbnails.
///
/// Files are cached by name only: an existing thumbnail is never regenerated,
/// even if the source picture changed.
#[derive(Debug, Clone)]
pub struct CoverStore {
    dir: PathBuf,
    url_prefix: String,
    max_dim: u32,
    quality: u8,
}

impl CoverStore {
    pub fn new(dir: impl Into<PathBuf>, url_prefix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            url_prefix: url_prefix.into(),
            max_dim: THUMBNAIL_MAX,
            quality: THUMBNAIL_QUALITY,
        }
    }

    pub fn relative_path(&self, slug: &str) -> String {
        let prefix = self.url_prefix.trim_end_matches('/');
        if prefix.is_empty() {
            format!("{}.jpg", slug)
        } else {
            format!("{}/{}.jpg", prefix, slug)
        }
    }

    /// Thumbnail `picture` as `<slug>.jpg`, or reuse the file already there.
    pub fn store(&self, picture: &[u8], slug: &str) -> Result<StoredCover, CoverError> {
        if slug.is_empty() {
            return Err(CoverError::EmptySlug);
        }

        let out_path = self.dir.join(format!("{}.jpg", slug));
        if out_path.exists() {
            return Ok(StoredCover {
                path: self.relative_path(slug),
                created: false,
            });
        }

        let jpeg = make_thumbnail(picture, self.max_dim, self.quality)?;
        fs::create_dir_all(&self.dir)?;
        fs::write(&out_path, jpeg)?;

        Ok(StoredCover {
            path: self.relative_path(slug),
            created: true,
        })
    }
}

/// Decode `picture`, shrink it to fit inside `max_dim`×`max_dim` keeping the
/// aspect ratio, and re-encode as RGB JPEG. Smaller images are not enlarged.
pub fn make_thumbnail(picture: &[u8], max_dim: u32, quality: u8) -> Result<Vec<u8>, CoverError> {
    let img = image::load_from_memory(picture)?;

    let img = if img.width() > max_dim || img.height() > max_dim {
        img.resize(max_dim, max_dim, FilterType::Lanczos3)
    } else {
        img
    };

    let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
    let mut out = Vec::new();
    rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut out, quality))?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GenericImageView, ImageFormat, RgbaImage};
    use std::io::Cursor;

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(
            width,
            height,
            image::Rgba([200, 40, 40, 128]),
        ));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png).unwrap();
        buf
    }

    #[test]
    fn large_images_fit_inside_bounds() {
        let jpeg = make_thumbnail(&png(900, 600), 300, 70).unwrap();
        let thumb = image::load_from_memory(&jpeg).unwrap();
        assert_eq!(thumb.dimensions(), (300, 200));

        let jpeg = make_thumbnail(&png(400, 1200), 300, 70).unwrap();
        let thumb = image::load_from_memory(&jpeg).unwrap();
        assert_eq!(thumb.dimensions(), (100, 300));
    }

    #[test]
    fn small_images_are_not_enlarged() {
        let jpeg = make_thumbnail(&png(120, 80), 300, 70).unwrap();
        let thumb = image::load_from_memory_with_format(&jpeg, ImageFormat::Jpeg).unwrap();
        assert_eq!(thumb.dimensions(), (120, 80));
    }

    #[test]
    fn corrupt_picture_is_an_error() {
        assert!(matches!(
            make_thumbnail(b"definitely not an image", 300, 70),
            Err(CoverError::Image(_))
        ));
    }

    #[test]
    fn store_writes_once_and_reuses_by_name() {
        let dir = tempfile::tempdir().unwrap();
        let store = CoverStore::new(dir.path().join("covers"), "covers");

        let first = store.store(&png(640, 640), "song-a").unwrap();
        assert_eq!(
            first,
            StoredCover {
                path: "covers/song-a.jpg".into(),
                created: true
            }
        );

        let on_disk = dir.path().join("covers/song-a.jpg");
        let bytes = fs::read(&on_disk).unwrap();

        // A different picture under the same name is not picked up.
        let second = store.store(&png(50, 50), "song-a").unwrap();
        assert!(!second.created);
        assert_eq!(fs::read(&on_disk).unwrap(), bytes);
        assert_eq!(fs::read_dir(dir.path().join("covers")).unwrap().count(), 1);
    }

    #[test]
    fn empty_slug_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let store = CoverStore::new(dir.path(), "covers");
        assert!(matches!(store.store(&png(10, 10), ""), Err(CoverError::EmptySlug)));
    }
}
