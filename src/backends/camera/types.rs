// SPDX-License-Identifier: GPL-3.0-only
// Shared types for the capture device abstraction

//! Shared types for capture devices
//!
//! Geometry, request and result metadata passed between the engine and a
//! [`CaptureDevice`](super::CaptureDevice) implementation.

use crate::constants::{METERING_WEIGHT_MAX, METERING_WEIGHT_MIN};
use serde::{Deserialize, Serialize};

/// Integer rectangle in sensor coordinates (right/bottom exclusive)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Rect {
    pub const fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    pub fn height(&self) -> i32 {
        self.bottom - self.top
    }

    /// Check whether `other` lies entirely inside this rectangle
    pub fn contains(&self, other: &Rect) -> bool {
        other.left >= self.left
            && other.top >= self.top
            && other.right <= self.right
            && other.bottom <= self.bottom
    }
}

impl std::fmt::Display for Rect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "({}, {}, {}, {})",
            self.left, self.top, self.right, self.bottom
        )
    }
}

/// Output size in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

impl std::fmt::Display for Size {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Weighted rectangle used for both AE and AF metering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MeteringRectangle {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
    pub weight: i32,
}

impl MeteringRectangle {
    /// Zero-weight region, used to hand metering back to the device
    pub const ZERO_WEIGHT: MeteringRectangle = MeteringRectangle {
        x: 0,
        y: 0,
        width: 1,
        height: 1,
        weight: METERING_WEIGHT_MIN,
    };

    pub fn new(x: i32, y: i32, width: i32, height: i32, weight: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
            weight: weight.clamp(METERING_WEIGHT_MIN, METERING_WEIGHT_MAX),
        }
    }

    pub fn is_zero_weight(&self) -> bool {
        self.weight == METERING_WEIGHT_MIN
    }

    /// Center point of the region
    pub fn center(&self) -> (i32, i32) {
        (self.x + self.width / 2, self.y + self.height / 2)
    }
}

/// Which way the lens faces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LensFacing {
    Front,
    #[default]
    Back,
    External,
}

/// Image format of a capture output or a delivered buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageFormat {
    /// Compressed by the device
    Jpeg,
    /// Three-plane YUV 4:2:0, compressed in software
    #[default]
    Yuv420,
    /// Anything else, identified by the device's numeric format code
    Other(u32),
}

impl std::fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImageFormat::Jpeg => write!(f, "JPEG"),
            ImageFormat::Yuv420 => write!(f, "YUV_420_888"),
            ImageFormat::Other(code) => write!(f, "format 0x{:x}", code),
        }
    }
}

/// Static description of a capture device
#[derive(Debug, Clone, PartialEq)]
pub struct CameraCharacteristics {
    /// Sensor active pixel array
    pub active_array: Rect,
    /// Largest supported digital zoom factor
    pub max_digital_zoom: f32,
    /// Clockwise rotation of the sensor relative to the device's natural orientation
    pub sensor_orientation: u32,
    pub lens_facing: LensFacing,
    /// Output sizes supported for each capture format
    pub stream_configurations: Vec<(ImageFormat, Size)>,
}

impl CameraCharacteristics {
    /// Output sizes available for the given format, largest first
    pub fn output_sizes(&self, format: ImageFormat) -> Vec<Size> {
        let mut sizes: Vec<Size> = self
            .stream_configurations
            .iter()
            .filter(|(f, _)| *f == format)
            .map(|(_, size)| *size)
            .collect();
        sizes.sort_by_key(|s| std::cmp::Reverse(s.area()));
        sizes
    }
}

/// Native AF mode as requested from and reported by the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlAfMode {
    Off,
    Auto,
    Macro,
    ContinuousVideo,
    ContinuousPicture,
    Edof,
}

/// Native AF state reported in result metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ControlAfState {
    #[default]
    Inactive,
    PassiveScan,
    PassiveFocused,
    ActiveScan,
    FocusedLocked,
    NotFocusedLocked,
    PassiveUnfocused,
}

/// AF trigger carried by a single request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AfTrigger {
    #[default]
    Idle,
    Start,
    Cancel,
}

/// Overall 3A control mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ControlMode {
    Off,
    #[default]
    Auto,
}

/// Auto-exposure mode, which also decides how the flash is driven
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AeMode {
    On,
    OnAutoFlash,
    OnAlwaysFlash,
}

/// Flash unit control
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashControl {
    Off,
    Single,
}

/// Request template, picks the device's baseline tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestTemplate {
    Preview,
    StillCapture,
}

/// Tag attached to single-shot requests and echoed back in their results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestTag {
    /// Focus trigger issued right before a capture
    PreshotTriggeredAf,
    /// Still capture (logging only)
    Capture,
    /// Tap to focus (logging only)
    TapToFocus,
}

/// Caller-owned surface the preview is rendered to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PreviewSurface {
    pub id: u32,
    pub size: Size,
}

/// Output a request writes into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputTarget {
    Preview(PreviewSurface),
    /// The device-side still image reader
    StillCapture,
}

/// Identifies one session setup attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "session#{}", self.0)
    }
}

/// A fully built capture request
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureRequest {
    pub template: RequestTemplate,
    pub targets: Vec<OutputTarget>,
    pub tag: Option<RequestTag>,
    pub control_mode: ControlMode,
    pub af_mode: ControlAfMode,
    pub af_trigger: AfTrigger,
    pub af_regions: Vec<MeteringRectangle>,
    pub ae_regions: Vec<MeteringRectangle>,
    pub crop_region: Option<Rect>,
    pub ae_mode: Option<AeMode>,
    pub flash: Option<FlashControl>,
    pub jpeg_quality: Option<u8>,
    pub jpeg_orientation: Option<u32>,
}

impl CaptureRequest {
    /// Start building a request from a template
    pub fn builder(template: RequestTemplate) -> CaptureRequestBuilder {
        CaptureRequestBuilder {
            request: CaptureRequest {
                template,
                targets: Vec::new(),
                tag: None,
                control_mode: ControlMode::Auto,
                af_mode: ControlAfMode::ContinuousPicture,
                af_trigger: AfTrigger::Idle,
                af_regions: Vec::new(),
                ae_regions: Vec::new(),
                crop_region: None,
                ae_mode: None,
                flash: None,
                jpeg_quality: None,
                jpeg_orientation: None,
            },
        }
    }

    /// Whether this request produces a still image
    pub fn targets_still_capture(&self) -> bool {
        self.targets.contains(&OutputTarget::StillCapture)
    }
}

/// Builder returned by [`CaptureDevice::create_request`](super::CaptureDevice::create_request)
#[derive(Debug, Clone)]
pub struct CaptureRequestBuilder {
    request: CaptureRequest,
}

impl CaptureRequestBuilder {
    pub fn add_target(&mut self, target: OutputTarget) -> &mut Self {
        if !self.request.targets.contains(&target) {
            self.request.targets.push(target);
        }
        self
    }

    pub fn tag(&mut self, tag: Option<RequestTag>) -> &mut Self {
        self.request.tag = tag;
        self
    }

    pub fn control_mode(&mut self, mode: ControlMode) -> &mut Self {
        self.request.control_mode = mode;
        self
    }

    pub fn af_mode(&mut self, mode: ControlAfMode) -> &mut Self {
        self.request.af_mode = mode;
        self
    }

    pub fn af_trigger(&mut self, trigger: AfTrigger) -> &mut Self {
        self.request.af_trigger = trigger;
        self
    }

    /// Set the same region for AF and AE
    pub fn metering_region(&mut self, region: MeteringRectangle) -> &mut Self {
        self.request.af_regions = vec![region];
        self.request.ae_regions = vec![region];
        self
    }

    pub fn crop_region(&mut self, crop: Rect) -> &mut Self {
        self.request.crop_region = Some(crop);
        self
    }

    pub fn ae_mode(&mut self, mode: AeMode) -> &mut Self {
        self.request.ae_mode = Some(mode);
        self
    }

    pub fn flash(&mut self, flash: FlashControl) -> &mut Self {
        self.request.flash = Some(flash);
        self
    }

    pub fn jpeg_quality(&mut self, quality: u8) -> &mut Self {
        self.request.jpeg_quality = Some(quality);
        self
    }

    pub fn jpeg_orientation(&mut self, degrees: u32) -> &mut Self {
        self.request.jpeg_orientation = Some(degrees);
        self
    }

    pub fn build(&self) -> CaptureRequest {
        self.request.clone()
    }
}

/// Per-frame result metadata
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultMetadata {
    /// Monotonic frame counter assigned by the device
    pub frame_number: u64,
    /// Tag of the request that produced this frame
    pub tag: Option<RequestTag>,
    pub af_mode: Option<ControlAfMode>,
    pub af_state: Option<ControlAfState>,
    /// Lens focus distance in diopters, when reported
    pub focus_distance: Option<f32>,
}

/// One plane of a delivered image
#[derive(Debug, Clone, Default)]
pub struct ImagePlane {
    pub data: Vec<u8>,
    pub row_stride: usize,
    pub pixel_stride: usize,
}

/// Image buffer delivered by the device's still-capture output
///
/// Dropping the image releases it back to the source, which mirrors
/// closing a buffer on real hardware.
pub struct RawImage {
    pub width: u32,
    pub height: u32,
    pub format: ImageFormat,
    pub planes: Vec<ImagePlane>,
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl RawImage {
    pub fn new(width: u32, height: u32, format: ImageFormat, planes: Vec<ImagePlane>) -> Self {
        Self {
            width,
            height,
            format,
            planes,
            release: None,
        }
    }

    /// Run `on_release` once the image is dropped
    pub fn with_release<F>(mut self, on_release: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        self.release = Some(Box::new(on_release));
        self
    }
}

impl Drop for RawImage {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl std::fmt::Debug for RawImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawImage")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format)
            .field("planes", &self.planes.len())
            .finish()
    }
}
