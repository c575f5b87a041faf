use image::{DynamicImage, ImageFormat, imageops::FilterType};
use std::fs;
use std::io::{BufWriter, Cursor, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use crate::error::{Error, Result};

/// Paths of a cover persisted by [`CoverCache::store`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredCover {
    pub cover_path: PathBuf,
    pub thumb_path: PathBuf,
}

/// Cover images kept on local disk, one full-size file and one thumbnail
/// per item.
#[derive(Debug, Clone)]
pub struct CoverCache {
    cover_dir: PathBuf,
    thumb_size: u32,
}

impl CoverCache {
    pub fn new(cover_dir: PathBuf, thumb_size: u32) -> Self {
        Self {
            cover_dir,
            thumb_size: thumb_size.max(1),
        }
    }

    pub fn thumb_size(&self) -> u32 {
        self.thumb_size
    }

    /// A cached thumbnail is usable when its path is set, non-empty, and
    /// names an existing regular file.
    pub fn is_usable(path: Option<&str>) -> bool {
        match path {
            Some(p) if !p.is_empty() => {
                let path = Path::new(p);
                path.exists() && !path.is_dir()
            }
            _ => false,
        }
    }

    pub fn load(&self, path: &Path) -> Result<DynamicImage> {
        if !path.is_file() {
            return Err(Error::UnusableCover(path.to_path_buf()));
        }

        let bytes = fs::read(path)?;
        let image = image::ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()?
            .decode()?;
        Ok(image)
    }

    /// Writes the full-size cover and its thumbnail for `item_id`.
    pub fn store(&self, item_id: i64, image: &DynamicImage) -> Result<StoredCover> {
        fs::create_dir_all(&self.cover_dir)?;

        let cover_path = self.cover_dir.join(format!("{}.jpg", item_id));
        let thumb_path = self.cover_dir.join(format!("{}-thumb.jpg", item_id));

        let thumbnail = image.resize(self.thumb_size, self.thumb_size, FilterType::Lanczos3);

        // JPEG has no alpha channel.
        self.write_jpeg(&DynamicImage::ImageRgb8(image.to_rgb8()), &cover_path)?;
        self.write_jpeg(&DynamicImage::ImageRgb8(thumbnail.to_rgb8()), &thumb_path)?;

        Ok(StoredCover {
            cover_path,
            thumb_path,
        })
    }

    /// Encodes into a temp file next to `path` and renames it into place, so
    /// a reader of `path` sees either the previous file or the complete new
    /// one. Several fetches for the same item may store at once.
    fn write_jpeg(&self, image: &DynamicImage, path: &Path) -> Result<()> {
        let tmp = NamedTempFile::new_in(&self.cover_dir)?;
        {
            let mut writer = BufWriter::new(tmp.as_file());
            image.write_to(&mut writer, ImageFormat::Jpeg)?;
            writer.flush()?;
        }
        tmp.persist(path).map_err(|e| e.error)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn sample(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([200, 40, 40])))
    }

    #[test]
    fn usable_paths() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("thumb.jpg");
        fs::write(&file, b"x").unwrap();

        assert!(!CoverCache::is_usable(None));
        assert!(!CoverCache::is_usable(Some("")));
        assert!(!CoverCache::is_usable(dir.path().to_str()));
        assert!(!CoverCache::is_usable(dir.path().join("missing.jpg").to_str()));
        assert!(CoverCache::is_usable(file.to_str()));
    }

    #[test]
    fn store_writes_cover_and_thumbnail() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CoverCache::new(dir.path().join("covers"), 32);

        let stored = cache.store(5, &sample(400, 600)).unwrap();
        assert!(stored.cover_path.is_file());
        assert!(stored.thumb_path.is_file());

        let cover = cache.load(&stored.cover_path).unwrap();
        assert_eq!((cover.width(), cover.height()), (400, 600));

        let thumb = cache.load(&stored.thumb_path).unwrap();
        assert!(thumb.width() <= 32 && thumb.height() <= 32);
        assert_eq!(thumb.height(), 32);
    }

    #[test]
    fn store_replaces_files_without_leftovers() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CoverCache::new(dir.path().join("covers"), 16);

        cache.store(2, &sample(40, 40)).unwrap();
        let stored = cache.store(2, &sample(80, 20)).unwrap();

        let cover = cache.load(&stored.cover_path).unwrap();
        assert_eq!((cover.width(), cover.height()), (80, 20));
        let mut names: Vec<String> = fs::read_dir(dir.path().join("covers"))
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, vec!["2-thumb.jpg", "2.jpg"]);
    }

    #[test]
    fn corrupt_file_fails_to_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.jpg");
        fs::write(&path, b"definitely not an image").unwrap();

        let cache = CoverCache::new(dir.path().to_path_buf(), 16);
        assert!(cache.load(&path).is_err());
        assert!(matches!(
            cache.load(dir.path()),
            Err(Error::UnusableCover(_))
        ));
    }
}
