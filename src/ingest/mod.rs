//! Camera frame sources.
//!
//! This module provides sources for CPU-accessible camera images:
//! - Synthetic frames (`stub://`), for tests and demos
//! - Still image files, for replaying a captured photo through the pipeline
//!
//! A source hands out the latest camera image on request, or `None` when the
//! camera has nothing new. Sources do not encode; `FrameCapture` converts every
//! image to RGBA and JPEG.

pub mod file;
pub mod synthetic;

pub use file::StillImageSource;
pub use synthetic::{SyntheticConfig, SyntheticSource};

use anyhow::{anyhow, Result};

/// Pixel layout of a camera image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelFormat {
    Rgba8,
    Rgb8,
    Luma8,
    /// YUV 4:2:0 with separate Y, U, V planes. U/V may be interleaved
    /// (pixel stride 2), which covers NV12/NV21 style buffers.
    Yuv420,
}

impl PixelFormat {
    pub fn plane_count(self) -> usize {
        match self {
            PixelFormat::Yuv420 => 3,
            _ => 1,
        }
    }

    /// Bytes read per sample from each plane.
    pub fn sample_bytes(self) -> usize {
        match self {
            PixelFormat::Rgba8 => 4,
            PixelFormat::Rgb8 => 3,
            PixelFormat::Luma8 | PixelFormat::Yuv420 => 1,
        }
    }
}

/// One plane of a camera image.
#[derive(Clone, Debug)]
pub struct ImagePlane {
    pub data: Vec<u8>,
    /// Bytes between the starts of consecutive rows.
    pub row_stride: usize,
    /// Bytes between consecutive samples in a row.
    pub pixel_stride: usize,
}

impl ImagePlane {
    /// Tightly packed plane.
    pub fn packed(data: Vec<u8>, width: u32, bytes_per_pixel: usize) -> Self {
        Self {
            data,
            row_stride: width as usize * bytes_per_pixel,
            pixel_stride: bytes_per_pixel,
        }
    }
}

/// A CPU-side camera image as delivered by the platform.
#[derive(Clone, Debug)]
pub struct CameraImage {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub planes: Vec<ImagePlane>,
}

impl CameraImage {
    /// Packed RGBA image.
    pub fn rgba(width: u32, height: u32, pixels: Vec<u8>) -> Self {
        Self {
            width,
            height,
            format: PixelFormat::Rgba8,
            planes: vec![ImagePlane::packed(pixels, width, 4)],
        }
    }

    /// Check that the planes are large enough for the declared dimensions.
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(anyhow!("camera image has zero dimensions"));
        }
        if self.planes.len() != self.format.plane_count() {
            return Err(anyhow!(
                "{:?} image needs {} planes, got {}",
                self.format,
                self.format.plane_count(),
                self.planes.len()
            ));
        }
        for (index, plane) in self.planes.iter().enumerate() {
            let (w, h) = self.plane_dimensions(index);
            if w == 0 || h == 0 {
                continue;
            }
            let needed = (h - 1) * plane.row_stride + (w - 1) * plane.pixel_stride
                + self.format.sample_bytes();
            if plane.data.len() < needed {
                return Err(anyhow!(
                    "plane {} too small: {} bytes, need {}",
                    index,
                    plane.data.len(),
                    needed
                ));
            }
        }
        Ok(())
    }

    /// Sample grid of a plane (chroma planes are subsampled 2x2).
    pub(crate) fn plane_dimensions(&self, index: usize) -> (usize, usize) {
        let (w, h) = (self.width as usize, self.height as usize);
        match (self.format, index) {
            (PixelFormat::Yuv420, 1) | (PixelFormat::Yuv420, 2) => (w.div_ceil(2), h.div_ceil(2)),
            _ => (w, h),
        }
    }
}

/// Platform camera feed.
pub trait CameraFrameSource: Send {
    /// Source identifier for logs.
    fn name(&self) -> &str;

    /// Latest CPU image, or `None` when no frame is available right now.
    fn try_acquire_latest(&mut self) -> Result<Option<CameraImage>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_rejects_short_planes() {
        let image = CameraImage::rgba(4, 4, vec![0u8; 10]);
        assert!(image.validate().is_err());
    }

    #[test]
    fn validate_accepts_subsampled_chroma() {
        let image = CameraImage {
            width: 5,
            height: 3,
            format: PixelFormat::Yuv420,
            planes: vec![
                ImagePlane::packed(vec![0u8; 15], 5, 1),
                ImagePlane::packed(vec![0u8; 6], 3, 1),
                ImagePlane::packed(vec![0u8; 6], 3, 1),
            ],
        };
        image.validate().unwrap();
    }

    #[test]
    fn validate_rejects_wrong_plane_count() {
        let image = CameraImage {
            width: 2,
            height: 2,
            format: PixelFormat::Yuv420,
            planes: vec![ImagePlane::packed(vec![0u8; 4], 2, 1)],
        };
        assert!(image.validate().is_err());
    }
}
