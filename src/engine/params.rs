// SPDX-License-Identifier: GPL-3.0-only

//! Per-capture parameters and the caller's capture session

use crate::backends::camera::types::{AeMode, CaptureRequestBuilder, FlashControl};
use crate::errors::{CaptureError, CaptureResult};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

/// Flash behaviour for a single capture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlashMode {
    #[default]
    Auto,
    On,
    Off,
}

impl FlashMode {
    /// Write the matching AE and flash keys into a still-capture request
    pub fn apply(self, builder: &mut CaptureRequestBuilder) {
        match self {
            FlashMode::On => {
                builder.ae_mode(AeMode::OnAlwaysFlash).flash(FlashControl::Single);
            }
            FlashMode::Off => {
                builder.ae_mode(AeMode::On).flash(FlashControl::Off);
            }
            FlashMode::Auto => {
                builder.ae_mode(AeMode::OnAutoFlash);
            }
        }
    }
}

impl std::str::FromStr for FlashMode {
    type Err = CaptureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(FlashMode::Auto),
            "on" => Ok(FlashMode::On),
            "off" => Ok(FlashMode::Off),
            other => Err(CaptureError::Validation(format!(
                "unknown flash mode '{}'",
                other
            ))),
        }
    }
}

/// Heading value meaning "no compass reading"
pub const HEADING_UNKNOWN: i32 = -1;

/// Caller-supplied parameters for one capture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhotoCaptureParameters {
    /// Device orientation in degrees, one of 0, 90, 180 or 270
    pub orientation: u32,
    /// Compass heading in degrees, or [`HEADING_UNKNOWN`]
    pub heading: i32,
    pub flash_mode: FlashMode,
}

impl Default for PhotoCaptureParameters {
    fn default() -> Self {
        Self {
            orientation: 0,
            heading: HEADING_UNKNOWN,
            flash_mode: FlashMode::Auto,
        }
    }
}

impl PhotoCaptureParameters {
    pub fn check_sanity(&self) -> CaptureResult<()> {
        if !matches!(self.orientation, 0 | 90 | 180 | 270) {
            return Err(CaptureError::Validation(format!(
                "orientation must be a multiple of 90 below 360, got {}",
                self.orientation
            )));
        }
        if self.heading != HEADING_UNKNOWN && !(0..360).contains(&self.heading) {
            return Err(CaptureError::Validation(format!(
                "heading must be in 0..360 or {}, got {}",
                HEADING_UNKNOWN, self.heading
            )));
        }
        Ok(())
    }
}

/// A finished capture
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedImage {
    /// Compressed JPEG bytes
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub orientation: u32,
    pub heading: i32,
}

/// Receives the outcome of one `take_picture` call
///
/// Exactly one of `on_picture_taken` / `on_picture_failed` is called, from
/// the delivery stage, in the order the captures were requested. A session
/// whose capture is abandoned (the camera closed first) is dropped without
/// either call.
pub trait CaptureSession: Send + 'static {
    /// The image for this capture has arrived and is being compressed
    fn start_empty(&mut self) {}

    fn on_picture_taken(self: Box<Self>, image: CapturedImage);

    fn on_picture_failed(self: Box<Self>, error: CaptureError);
}

/// Resolve a oneshot channel; the receiver sees `RecvError` if abandoned
impl CaptureSession for oneshot::Sender<CaptureResult<CapturedImage>> {
    fn on_picture_taken(self: Box<Self>, image: CapturedImage) {
        let _ = (*self).send(Ok(image));
    }

    fn on_picture_failed(self: Box<Self>, error: CaptureError) {
        let _ = (*self).send(Err(error));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::camera::types::{CaptureRequest, RequestTemplate};

    fn flash_request(mode: FlashMode) -> CaptureRequest {
        let mut builder = CaptureRequest::builder(RequestTemplate::StillCapture);
        mode.apply(&mut builder);
        builder.build()
    }

    #[test]
    fn test_flash_mode_mapping() {
        let on = flash_request(FlashMode::On);
        assert_eq!(on.ae_mode, Some(AeMode::OnAlwaysFlash));
        assert_eq!(on.flash, Some(FlashControl::Single));

        let off = flash_request(FlashMode::Off);
        assert_eq!(off.ae_mode, Some(AeMode::On));
        assert_eq!(off.flash, Some(FlashControl::Off));

        let auto = flash_request(FlashMode::Auto);
        assert_eq!(auto.ae_mode, Some(AeMode::OnAutoFlash));
        assert_eq!(auto.flash, None);
    }

    #[test]
    fn test_flash_mode_parsing() {
        assert_eq!("ON".parse::<FlashMode>().unwrap(), FlashMode::On);
        assert!("strobe".parse::<FlashMode>().is_err());
    }

    #[test]
    fn test_sanity_accepts_defaults_and_right_angles() {
        assert!(PhotoCaptureParameters::default().check_sanity().is_ok());
        for orientation in [0, 90, 180, 270] {
            let params = PhotoCaptureParameters {
                orientation,
                heading: 359,
                ..Default::default()
            };
            assert!(params.check_sanity().is_ok());
        }
    }

    #[test]
    fn test_sanity_rejects_bad_orientation_and_heading() {
        let bad_orientation = PhotoCaptureParameters {
            orientation: 45,
            ..Default::default()
        };
        assert!(matches!(
            bad_orientation.check_sanity(),
            Err(CaptureError::Validation(_))
        ));

        for heading in [-2, 360] {
            let bad_heading = PhotoCaptureParameters {
                heading,
                ..Default::default()
            };
            assert!(bad_heading.check_sanity().is_err(), "heading {}", heading);
        }
    }

    #[tokio::test]
    async fn test_oneshot_session_resolves() {
        let (tx, rx) = oneshot::channel::<CaptureResult<CapturedImage>>();
        let session: Box<dyn CaptureSession> = Box::new(tx);
        session.on_picture_failed(CaptureError::Encode("boom".into()));
        assert_eq!(rx.await.unwrap(), Err(CaptureError::Encode("boom".into())));
    }
}
