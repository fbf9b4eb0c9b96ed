//! Synthetic frame source (`stub://`).

use anyhow::{anyhow, Result};

use super::{CameraFrameSource, CameraImage};

/// Configuration for a synthetic source.
#[derive(Clone, Debug)]
pub struct SyntheticConfig {
    /// Source URL, must start with `stub://`.
    pub url: String,
    pub width: u32,
    pub height: u32,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            url: "stub://ar_camera".to_string(),
            width: 640,
            height: 480,
        }
    }
}

/// Generates a moving RGBA gradient every tick.
pub struct SyntheticSource {
    config: SyntheticConfig,
    frame_count: u64,
}

impl SyntheticSource {
    pub fn new(config: SyntheticConfig) -> Result<Self> {
        if !config.url.starts_with("stub://") {
            return Err(anyhow!(
                "synthetic source expects a stub:// url, got '{}'",
                config.url
            ));
        }
        if config.width == 0 || config.height == 0 {
            return Err(anyhow!("synthetic source needs non-zero dimensions"));
        }
        log::info!(
            "SyntheticSource: {} ({}x{})",
            config.url,
            config.width,
            config.height
        );
        Ok(Self {
            config,
            frame_count: 0,
        })
    }

    pub fn frames_generated(&self) -> u64 {
        self.frame_count
    }

    fn generate_pixels(&self) -> Vec<u8> {
        let (w, h) = (self.config.width as usize, self.config.height as usize);
        let shift = self.frame_count as usize;
        let mut pixels = vec![0u8; w * h * 4];
        for (i, pixel) in pixels.chunks_exact_mut(4).enumerate() {
            let (x, y) = (i % w, i / w);
            pixel[0] = ((x + shift) % 256) as u8;
            pixel[1] = ((y + shift) % 256) as u8;
            pixel[2] = ((x + y) % 256) as u8;
            pixel[3] = 255;
        }
        pixels
    }
}

impl CameraFrameSource for SyntheticSource {
    fn name(&self) -> &str {
        &self.config.url
    }

    fn try_acquire_latest(&mut self) -> Result<Option<CameraImage>> {
        self.frame_count += 1;
        let pixels = self.generate_pixels();
        Ok(Some(CameraImage::rgba(
            self.config.width,
            self.config.height,
            pixels,
        )))
    }
}
