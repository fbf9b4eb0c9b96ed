//! Still image frame source.
//!
//! Decodes a local image file and serves it as the camera image on every tick.
//! Only local paths are accepted; URLs are rejected.

use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};

use super::{CameraFrameSource, CameraImage};

/// Serves one decoded image file as the camera feed.
pub struct StillImageSource {
    path: PathBuf,
    label: String,
    image: CameraImage,
}

impl StillImageSource {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = path.to_string_lossy();
        if raw.trim().is_empty() || raw.contains("://") {
            return Err(anyhow!(
                "still image source only supports local paths (got '{}')",
                raw
            ));
        }
        let decoded = image::open(path)
            .with_context(|| format!("decode image {}", path.display()))?
            .into_rgba8();
        let (width, height) = decoded.dimensions();
        log::info!(
            "StillImageSource: loaded {} ({}x{})",
            path.display(),
            width,
            height
        );
        Ok(Self {
            path: path.to_path_buf(),
            label: path.display().to_string(),
            image: CameraImage::rgba(width, height, decoded.into_raw()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CameraFrameSource for StillImageSource {
    fn name(&self) -> &str {
        &self.label
    }

    fn try_acquire_latest(&mut self) -> Result<Option<CameraImage>> {
        Ok(Some(self.image.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_urls() {
        assert!(StillImageSource::open("http://example.com/frame.jpg").is_err());
    }

    #[test]
    fn loads_png_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.png");
        image::RgbaImage::from_pixel(3, 2, image::Rgba([10, 20, 30, 255]))
            .save(&path)
            .unwrap();

        let mut source = StillImageSource::open(&path).unwrap();
        let frame = source.try_acquire_latest().unwrap().unwrap();
        assert_eq!((frame.width, frame.height), (3, 2));
        assert_eq!(&frame.planes[0].data[..4], &[10, 20, 30, 255]);
        assert_eq!(source.path(), path.as_path());
    }
}
