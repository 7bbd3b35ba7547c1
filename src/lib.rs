// SPDX-License-Identifier: GPL-3.0-only

//! Camera Capture - autofocus and still-capture coordination
//!
//! This library decides, for every still capture, whether to fire right away,
//! run a focus scan first or wait for a running scan to settle, while keeping
//! a FIFO of outstanding captures, computing zoom and metering regions and
//! turning delivered buffers into JPEG bytes.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`engine`]: The [`OneCamera`] handle, its serial worker and the focus state machine
//! - [`backends`]: Capture device abstraction and a simulated device
//! - [`pipelines`]: Still image extraction and JPEG encoding
//! - [`geometry`]: Crop and metering region math
//! - [`config`]: User configuration handling
//!
//! # Example
//!
//! ```ignore
//! let camera = OneCamera::open(SimulatedCamera::default(), CaptureConfig::default())?;
//! camera.start_preview(surface, |result| println!("preview: {:?}", result))?;
//!
//! let (tx, rx) = tokio::sync::oneshot::channel();
//! camera.take_picture(PhotoCaptureParameters::default(), tx)?;
//! let image = rx.await??;
//! ```

pub mod backends;
pub mod config;
pub mod constants;
pub mod engine;
pub mod errors;
pub mod geometry;
pub mod pipelines;

// Re-export commonly used types
pub use backends::camera::{CaptureDevice, PreviewSurface, SimulatedCamera, SimulatedCameraConfig};
pub use config::CaptureConfig;
pub use engine::{
    AutoFocusMode, AutoFocusState, CaptureSession, CapturedImage, FlashMode, OneCamera,
    PhotoCaptureParameters,
};
pub use errors::{CaptureError, CaptureResult};
