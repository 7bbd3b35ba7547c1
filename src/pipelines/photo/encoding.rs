// SPDX-License-Identifier: GPL-3.0-only

//! Software JPEG encoding for planar YUV captures
//!
//! The extractor only depends on the [`JpegEncoder`] call contract: write the
//! compressed image into a caller-provided buffer and return the number of
//! bytes written, or a negative value on failure. [`ImageCrateJpegEncoder`]
//! is the default implementation, built on the `image` crate.

use crate::backends::camera::types::{ImageFormat, RawImage};
use image::RgbImage;
use tracing::{debug, warn};

/// Encoder collaborator used for raw planar captures
pub trait JpegEncoder: Send + Sync {
    /// Compress a YUV 4:2:0 image into `out`
    ///
    /// Returns the number of bytes written, or a negative value if the image
    /// could not be compressed (including when `out` is too small).
    fn compress_yuv420(&self, image: &RawImage, quality: u8, out: &mut [u8]) -> i64;
}

/// JPEG encoder backed by `image::codecs::jpeg`
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageCrateJpegEncoder;

impl ImageCrateJpegEncoder {
    pub fn new() -> Self {
        Self
    }
}

impl JpegEncoder for ImageCrateJpegEncoder {
    fn compress_yuv420(&self, image: &RawImage, quality: u8, out: &mut [u8]) -> i64 {
        if image.format != ImageFormat::Yuv420 {
            warn!(format = %image.format, "Software encoder only accepts YUV_420_888");
            return -1;
        }

        let Some(rgb) = yuv420_to_rgb(image) else {
            warn!(
                width = image.width,
                height = image.height,
                planes = image.planes.len(),
                "YUV planes do not cover the image"
            );
            return -1;
        };

        let mut buffer = Vec::new();
        let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(
            &mut buffer,
            quality.clamp(1, 100),
        );
        if let Err(e) = encoder.encode(
            rgb.as_raw(),
            rgb.width(),
            rgb.height(),
            image::ExtendedColorType::Rgb8,
        ) {
            warn!(error = %e, "JPEG encoding failed");
            return -1;
        }

        if buffer.len() > out.len() {
            warn!(
                encoded = buffer.len(),
                capacity = out.len(),
                "Encoded JPEG does not fit the output buffer"
            );
            return -1;
        }

        out[..buffer.len()].copy_from_slice(&buffer);
        debug!(size = buffer.len(), quality, "Software JPEG encoding complete");
        buffer.len() as i64
    }
}

/// Convert a three-plane YUV 4:2:0 image to packed RGB
///
/// Honors each plane's row and pixel stride, so both planar (I420) and
/// semi-planar (NV12/NV21 style, pixel stride 2) layouts work.
/// Uses BT.601 coefficients. Returns `None` when a plane is missing or too
/// short for the declared dimensions.
pub fn yuv420_to_rgb(image: &RawImage) -> Option<RgbImage> {
    let [y_plane, u_plane, v_plane] = image.planes.as_slice() else {
        return None;
    };
    let width = image.width as usize;
    let height = image.height as usize;
    if width == 0 || height == 0 {
        return None;
    }

    let sample = |plane: &crate::backends::camera::types::ImagePlane, col: usize, row: usize| {
        let pixel_stride = plane.pixel_stride.max(1);
        plane.data.get(row * plane.row_stride + col * pixel_stride).copied()
    };

    let mut rgb = Vec::with_capacity(width * height * 3);
    for row in 0..height {
        for col in 0..width {
            let y = sample(y_plane, col, row)? as f32;
            let u = sample(u_plane, col / 2, row / 2)? as f32 - 128.0;
            let v = sample(v_plane, col / 2, row / 2)? as f32 - 128.0;

            rgb.push((y + 1.402 * v).clamp(0.0, 255.0) as u8);
            rgb.push((y - 0.344 * u - 0.714 * v).clamp(0.0, 255.0) as u8);
            rgb.push((y + 1.772 * u).clamp(0.0, 255.0) as u8);
        }
    }

    RgbImage::from_raw(image.width, image.height, rgb)
}
