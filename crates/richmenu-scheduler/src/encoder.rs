//! Size-bounded JPEG encoding for rich menu images.
//!
//! LINE caps rich menu content size, and editor uploads are often large PNGs
//! with an alpha channel. Images are flattened to RGB and re-encoded as JPEG,
//! stepping quality down from `start_quality` until the payload fits
//! `max_bytes` or `min_quality` is reached. The result at `min_quality` is
//! used even if it is still too large; LINE will reject it and the error is
//! recorded on the job.

use std::path::Path;

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, RgbImage};
use richmenu_core::config::EncoderConfig;
use tracing::debug;

use crate::error::Result;

pub const JPEG_CONTENT_TYPE: &str = "image/jpeg";

/// Encoded payload plus the quality that produced it.
#[derive(Debug, Clone)]
pub struct EncodedImage {
    pub bytes: Vec<u8>,
    pub quality: u8,
}

impl EncodedImage {
    pub fn content_type(&self) -> &'static str {
        JPEG_CONTENT_TYPE
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ImageEncoder {
    pub max_bytes: usize,
    pub start_quality: u8,
    pub min_quality: u8,
    pub quality_step: u8,
}

impl From<&EncoderConfig> for ImageEncoder {
    fn from(cfg: &EncoderConfig) -> Self {
        Self {
            max_bytes: cfg.max_bytes,
            start_quality: cfg.start_quality,
            min_quality: cfg.min_quality,
            quality_step: cfg.quality_step,
        }
    }
}

impl Default for ImageEncoder {
    fn default() -> Self {
        Self::from(&EncoderConfig::default())
    }
}

impl ImageEncoder {
    pub fn encode_file(&self, path: &Path) -> Result<EncodedImage> {
        let img = image::open(path)?;
        self.encode(&img)
    }

    pub fn encode(&self, img: &DynamicImage) -> Result<EncodedImage> {
        // JPEG has no alpha channel.
        let rgb = img.to_rgb8();
        let floor = self.min_quality.clamp(1, 100);
        let step = self.quality_step.max(1);
        let mut quality = self.start_quality.clamp(floor, 100);

        loop {
            let bytes = encode_jpeg(&rgb, quality)?;
            debug!(quality, size = bytes.len(), budget = self.max_bytes, "encoded image");
            if bytes.len() <= self.max_bytes || quality <= floor {
                return Ok(EncodedImage { bytes, quality });
            }
            quality = quality.saturating_sub(step).max(floor);
        }
    }
}

fn encode_jpeg(rgb: &RgbImage, quality: u8) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, quality).encode_image(rgb)?;
    Ok(buf)
}
