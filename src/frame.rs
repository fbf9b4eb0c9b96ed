//! Frame capture.
//!
//! - `CapturedFrame`: latest RGBA pixels plus their JPEG encoding.
//! - `FrameCapture`: pulls a camera image per tick, converts it to RGBA,
//!   encodes JPEG, and keeps only the latest result.
//!
//! The frame buffer has a single writer and is overwritten in place on every
//! capture. Anything that must outlive the next capture (an upload, for
//! instance) takes a copy via `latest_encoded()`.

use std::path::PathBuf;

use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;

use crate::error::{PipelineError, PipelineResult};
use crate::ingest::{CameraFrameSource, CameraImage, PixelFormat};

/// Default JPEG quality used for uploads.
pub const DEFAULT_JPEG_QUALITY: u8 = 75;

// ----------------------------------------------------------------------------
// CapturedFrame
// ----------------------------------------------------------------------------

/// The most recent capture.
#[derive(Clone, Debug, Default)]
pub struct CapturedFrame {
    /// Packed RGBA8 pixels, row-major, top row first.
    pub pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// JPEG encoding of `pixels`.
    pub encoded: Vec<u8>,
}

// ----------------------------------------------------------------------------
// FrameCapture
// ----------------------------------------------------------------------------

/// Capture settings.
#[derive(Clone, Debug)]
pub struct CaptureSettings {
    /// JPEG quality, 1..=100.
    pub jpeg_quality: u8,
    /// Reverse row order after conversion (bottom-up camera buffers).
    pub mirror_y: bool,
    /// Write every encoded frame here for debugging.
    pub dump_path: Option<PathBuf>,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            mirror_y: false,
            dump_path: None,
        }
    }
}

/// Single-writer capture buffer.
pub struct FrameCapture {
    settings: CaptureSettings,
    latest: Option<CapturedFrame>,
    frames_captured: u64,
}

impl FrameCapture {
    pub fn new(settings: CaptureSettings) -> Self {
        Self {
            settings,
            latest: None,
            frames_captured: 0,
        }
    }

    /// Pull the latest camera image and overwrite the buffer with it.
    ///
    /// Returns `Ok(false)` when the camera had no frame; the previous capture,
    /// if any, stays in place.
    pub fn capture(&mut self, source: &mut dyn CameraFrameSource) -> PipelineResult<bool> {
        let image = source
            .try_acquire_latest()
            .map_err(|e| PipelineError::CaptureFailed(format!("{}: {:#}", source.name(), e)))?;
        let Some(image) = image else {
            log::debug!("{}: no camera frame available", source.name());
            return Ok(false);
        };
        self.store(&image)?;
        Ok(true)
    }

    /// Convert and encode an image into the buffer, reusing its allocations.
    pub fn store(&mut self, image: &CameraImage) -> PipelineResult<()> {
        image
            .validate()
            .map_err(|e| PipelineError::CaptureFailed(e.to_string()))?;

        let mut frame = self.latest.take().unwrap_or_default();
        convert_to_rgba(image, &mut frame.pixels);
        if self.settings.mirror_y {
            mirror_rows(&mut frame.pixels, image.width as usize * 4);
        }
        frame.width = image.width;
        frame.height = image.height;
        encode_jpeg(
            &frame.pixels,
            image.width,
            image.height,
            self.settings.jpeg_quality,
            &mut frame.encoded,
        )?;
        self.frames_captured += 1;

        if let Some(path) = &self.settings.dump_path {
            if let Err(e) = std::fs::write(path, &frame.encoded) {
                log::warn!("failed to dump capture to {}: {}", path.display(), e);
            }
        }
        log::debug!(
            "captured frame {} ({}x{}, {} jpeg bytes)",
            self.frames_captured,
            frame.width,
            frame.height,
            frame.encoded.len()
        );
        self.latest = Some(frame);
        Ok(())
    }

    pub fn latest(&self) -> Option<&CapturedFrame> {
        self.latest.as_ref()
    }

    /// Copy of the latest JPEG bytes, safe to hold across the next capture.
    pub fn latest_encoded(&self) -> Option<Vec<u8>> {
        self.latest.as_ref().map(|frame| frame.encoded.clone())
    }

    pub fn frames_captured(&self) -> u64 {
        self.frames_captured
    }
}

// ----------------------------------------------------------------------------
// Conversion
// ----------------------------------------------------------------------------

/// Convert any supported camera layout to packed RGBA8. `image` must be valid.
fn convert_to_rgba(image: &CameraImage, out: &mut Vec<u8>) {
    let (w, h) = (image.width as usize, image.height as usize);
    out.clear();
    out.reserve(w * h * 4);

    match image.format {
        PixelFormat::Rgba8 | PixelFormat::Rgb8 | PixelFormat::Luma8 => {
            let plane = &image.planes[0];
            for y in 0..h {
                for x in 0..w {
                    let at = y * plane.row_stride + x * plane.pixel_stride;
                    let px = &plane.data[at..];
                    match image.format {
                        PixelFormat::Rgba8 => out.extend_from_slice(&px[..4]),
                        PixelFormat::Rgb8 => out.extend_from_slice(&[px[0], px[1], px[2], 255]),
                        _ => out.extend_from_slice(&[px[0], px[0], px[0], 255]),
                    }
                }
            }
        }
        PixelFormat::Yuv420 => {
            let (luma, u, v) = (&image.planes[0], &image.planes[1], &image.planes[2]);
            for y in 0..h {
                for x in 0..w {
                    let yy = luma.data[y * luma.row_stride + x * luma.pixel_stride];
                    let (cx, cy) = (x / 2, y / 2);
                    let uu = u.data[cy * u.row_stride + cx * u.pixel_stride];
                    let vv = v.data[cy * v.row_stride + cx * v.pixel_stride];
                    let [r, g, b] = yuv_to_rgb(yy, uu, vv);
                    out.extend_from_slice(&[r, g, b, 255]);
                }
            }
        }
    }
}

/// BT.601 full-range YUV to RGB.
fn yuv_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
    let y = y as f32;
    let u = u as f32 - 128.0;
    let v = v as f32 - 128.0;
    let r = y + 1.402 * v;
    let g = y - 0.344_136 * u - 0.714_136 * v;
    let b = y + 1.772 * u;
    [clamp_u8(r), clamp_u8(g), clamp_u8(b)]
}

fn clamp_u8(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

fn mirror_rows(pixels: &mut [u8], row_bytes: usize) {
    let rows = pixels.len() / row_bytes;
    for top in 0..rows / 2 {
        let bottom = rows - 1 - top;
        let (head, tail) = pixels.split_at_mut(bottom * row_bytes);
        head[top * row_bytes..(top + 1) * row_bytes].swap_with_slice(&mut tail[..row_bytes]);
    }
}

fn encode_jpeg(
    rgba: &[u8],
    width: u32,
    height: u32,
    quality: u8,
    out: &mut Vec<u8>,
) -> PipelineResult<()> {
    // JPEG has no alpha channel.
    let rgb: Vec<u8> = rgba
        .chunks_exact(4)
        .flat_map(|px| [px[0], px[1], px[2]])
        .collect();
    out.clear();
    let mut encoder = JpegEncoder::new_with_quality(&mut *out, quality.clamp(1, 100));
    encoder
        .encode(&rgb, width, height, ExtendedColorType::Rgb8)
        .map_err(|e| PipelineError::CaptureFailed(format!("jpeg encode: {}", e)))
}
