// SPDX-License-Identifier: GPL-3.0-only

//! Raw buffer to compressed bytes
//!
//! Hardware JPEG buffers are copied straight out of their single plane. YUV
//! 4:2:0 buffers go through the [`JpegEncoder`] collaborator. Either way the
//! source image is dropped (and therefore released) before returning.

use super::encoding::{ImageCrateJpegEncoder, JpegEncoder};
use crate::backends::camera::types::{ImageFormat, RawImage};
use crate::constants::JPEG_QUALITY;
use crate::errors::{CaptureError, CaptureResult};
use std::sync::Arc;
use tracing::debug;

/// Turns delivered images into JPEG bytes
#[derive(Clone)]
pub struct ImageExtractor {
    encoder: Arc<dyn JpegEncoder>,
    quality: u8,
}

impl ImageExtractor {
    pub fn new(encoder: Arc<dyn JpegEncoder>, quality: u8) -> Self {
        Self {
            encoder,
            quality: quality.clamp(1, 100),
        }
    }

    /// Extract compressed bytes, consuming (and releasing) the image
    pub fn extract(&self, image: RawImage) -> CaptureResult<Vec<u8>> {
        match image.format {
            ImageFormat::Jpeg => {
                let plane = image.planes.first().ok_or_else(|| {
                    CaptureError::Encode("JPEG image carries no data plane".to_string())
                })?;
                debug!(size = plane.data.len(), "Passing through hardware JPEG");
                Ok(plane.data.clone())
            }
            ImageFormat::Yuv420 => {
                let capacity = image.width as usize * image.height as usize * 3;
                let mut out = vec![0u8; capacity];
                let written = self.encoder.compress_yuv420(&image, self.quality, &mut out);
                if written < 0 {
                    return Err(CaptureError::Encode(format!(
                        "encoder returned {} for {}x{} image",
                        written, image.width, image.height
                    )));
                }
                out.truncate(written as usize);
                debug!(
                    size = out.len(),
                    width = image.width,
                    height = image.height,
                    "Compressed YUV capture"
                );
                Ok(out)
            }
            other => Err(CaptureError::UnsupportedFormat(other.to_string())),
        }
    }
}

impl Default for ImageExtractor {
    fn default() -> Self {
        Self::new(Arc::new(ImageCrateJpegEncoder::new()), JPEG_QUALITY)
    }
}

impl std::fmt::Debug for ImageExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageExtractor")
            .field("quality", &self.quality)
            .finish()
    }
}
