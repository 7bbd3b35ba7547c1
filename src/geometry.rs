// SPDX-License-Identifier: GPL-3.0-only

//! Zoom and metering region geometry
//!
//! Pure functions mapping zoom factors and normalized preview coordinates
//! onto the sensor's active pixel array. Nothing here touches engine state.

use crate::backends::camera::types::{MeteringRectangle, Rect};
use crate::constants::{METERING_WEIGHT_MAX, METERING_WEIGHT_MIN};

/// Crop region sampled for a given zoom factor
///
/// The region is `active / zoom` in each dimension and centered on the
/// active array. Factors below 1 (or non-finite ones) are treated as 1 so
/// the result always stays inside `active`.
pub fn crop_region(zoom: f32, active: Rect) -> Rect {
    let zoom = if zoom.is_finite() { zoom.max(1.0) } else { 1.0 };

    let zoom_width = active.width() as f32 / zoom;
    let zoom_height = active.height() as f32 / zoom;
    let zoom_left = active.left as f32 + (active.width() as f32 - zoom_width) / 2.0;
    let zoom_top = active.top as f32 + (active.height() as f32 - zoom_height) / 2.0;

    Rect::new(
        zoom_left as i32,
        zoom_top as i32,
        (zoom_left + zoom_width) as i32,
        (zoom_top + zoom_height) as i32,
    )
}

/// Metering region for a tap at normalized preview coordinates `(nx, ny)`
///
/// The preview is in portrait orientation while the sensor is landscape, so
/// the point is rotated 90° into sensor space (`x = width * ny`,
/// `y = height * (1 - nx)`). When zoomed in, the point is first pulled toward
/// the center by `1 / zoom` so it lands on what the user actually sees.
///
/// The square region has an edge of `edge_fraction * max(width, height)`,
/// is centered on the converted point and clipped to the active array.
pub fn metering_region(
    nx: f32,
    ny: f32,
    zoom: f32,
    active: Rect,
    edge_fraction: f32,
    weight_fraction: f32,
) -> MeteringRectangle {
    let mut px = clamp_unit(nx);
    let mut py = clamp_unit(ny);

    if zoom.is_finite() && zoom > 1.0 {
        px = 0.5 + (px - 0.5) / zoom;
        py = 0.5 + (py - 0.5) / zoom;
    }

    let width = active.width();
    let height = active.height();
    let edge = (edge_fraction.clamp(0.0, 1.0) * width.max(height) as f32) as i32;

    let center_x = active.left + (width as f32 * py) as i32;
    let center_y = active.top + (height as f32 * (1.0 - px)) as i32;
    let start_x = center_x - edge / 2;
    let start_y = center_y - edge / 2;

    let max_x = (active.right - 1).max(active.left);
    let max_y = (active.bottom - 1).max(active.top);
    let x0 = start_x.clamp(active.left, max_x);
    let x1 = (start_x + edge).clamp(active.left, max_x);
    let y0 = start_y.clamp(active.top, max_y);
    let y1 = (start_y + edge).clamp(active.top, max_y);

    MeteringRectangle::new(x0, y0, x1 - x0, y1 - y0, region_weight(weight_fraction))
}

/// Interpolate a metering weight between the allowed minimum and maximum
pub fn region_weight(weight_fraction: f32) -> i32 {
    let fraction = weight_fraction.clamp(0.0, 1.0);
    ((1.0 - fraction) * METERING_WEIGHT_MIN as f32 + fraction * METERING_WEIGHT_MAX as f32) as i32
}

/// Aspect ratio (width / height) of a full-resolution capture
pub fn full_size_aspect_ratio(active: Rect) -> f64 {
    if active.height() == 0 {
        return 0.0;
    }
    active.width() as f64 / active.height() as f64
}

fn clamp_unit(value: f32) -> f32 {
    if value.is_nan() {
        0.5
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Current digital zoom and the crop region derived from it
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoomState {
    factor: f32,
    crop: Rect,
}

impl ZoomState {
    /// Unzoomed state covering the whole active array
    pub fn new(active: Rect) -> Self {
        Self {
            factor: 1.0,
            crop: active,
        }
    }

    pub fn factor(&self) -> f32 {
        self.factor
    }

    pub fn crop(&self) -> Rect {
        self.crop
    }

    /// Apply a new factor, clamped into `[1, max_zoom]`
    ///
    /// Returns the factor actually applied.
    pub fn set(&mut self, factor: f32, max_zoom: f32, active: Rect) -> f32 {
        let max_zoom = if max_zoom.is_finite() {
            max_zoom.max(1.0)
        } else {
            1.0
        };
        let factor = if factor.is_finite() {
            factor.clamp(1.0, max_zoom)
        } else {
            1.0
        };
        self.factor = factor;
        self.crop = crop_region(factor, active);
        factor
    }
}
