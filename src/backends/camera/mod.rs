// SPDX-License-Identifier: GPL-3.0-only

//! Capture device abstraction
//!
//! The engine never talks to hardware directly. It drives a [`CaptureDevice`]
//! and receives everything the device reports back through an [`EventSink`].
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────┐
//! │  OneCamera (engine) │  ← Serial worker, owns all mutable state
//! └──────────┬──────────┘
//!            │ requests            ▲ DeviceEvent
//!            ▼                     │
//! ┌─────────────────────┐    ┌─────┴─────┐
//! │ CaptureDevice Trait │───▶│ EventSink │
//! └──────────┬──────────┘    └───────────┘
//!            │
//!            ▼
//!      ┌───────────┐
//!      │ Simulated │  ← Concrete implementation
//!      └───────────┘
//! ```

pub mod simulated;
pub mod types;

pub use simulated::{SimulatedCamera, SimulatedCameraConfig, SimulatedProbe};
pub use types::*;

use crate::errors::DeviceResult;
use std::sync::Arc;

/// Everything a device reports asynchronously
///
/// Results and images must be posted in the order their requests were
/// submitted; the capture queue relies on it.
#[derive(Debug)]
pub enum DeviceEvent {
    /// Session created by `create_session` is ready for requests
    ConfigureSucceeded(SessionId),
    /// Session could not be created
    ConfigureFailed(SessionId),
    /// Early metadata for a frame
    PartialResult(ResultMetadata),
    /// Complete metadata for a frame
    FullResult(ResultMetadata),
    /// Still image for the oldest outstanding still-capture request
    ImageReady(RawImage),
    /// Device finished closing
    Closed,
}

/// Channel back into the engine's serial worker
///
/// Cheap to clone. Posting never blocks; it returns `false` once the
/// receiving side has gone away.
#[derive(Clone)]
pub struct EventSink {
    post: Arc<dyn Fn(DeviceEvent) -> bool + Send + Sync>,
}

impl EventSink {
    pub fn new<F>(post: F) -> Self
    where
        F: Fn(DeviceEvent) -> bool + Send + Sync + 'static,
    {
        Self {
            post: Arc::new(post),
        }
    }

    /// Hand an event to the engine
    pub fn post(&self, event: DeviceEvent) -> bool {
        (self.post)(event)
    }
}

impl std::fmt::Debug for EventSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("EventSink")
    }
}

/// Capability set a camera must provide to the engine
///
/// All methods are called from the engine's serial worker and must not
/// block. Failures are synchronous; everything else arrives later as a
/// [`DeviceEvent`] on the sink passed to [`open`](CaptureDevice::open).
pub trait CaptureDevice: Send {
    /// Static device description
    fn characteristics(&self) -> &CameraCharacteristics;

    /// Attach the sink that receives every event from this device
    ///
    /// Called once by the engine before any other request. Results, images
    /// and the final `Closed` are all posted here.
    fn open(&mut self, events: EventSink) -> DeviceResult<()>;

    /// Asynchronously create a capture session writing into `outputs`
    ///
    /// Any previous session is discarded. The outcome is reported as
    /// `ConfigureSucceeded(id)` or `ConfigureFailed(id)`. Still captures are
    /// delivered in `still_format`.
    fn create_session(
        &mut self,
        id: SessionId,
        outputs: &[OutputTarget],
        still_format: ImageFormat,
    ) -> DeviceResult<()>;

    /// Create a request builder seeded from a template
    fn create_request(&self, template: RequestTemplate) -> DeviceResult<CaptureRequestBuilder> {
        Ok(CaptureRequest::builder(template))
    }

    /// Submit a request that is processed exactly once
    fn submit_once(&mut self, request: CaptureRequest) -> DeviceResult<()>;

    /// Replace the repeating request driving the preview stream
    fn submit_repeating(&mut self, request: CaptureRequest) -> DeviceResult<()>;

    /// Drop every queued or in-flight request, best effort
    fn abort_all(&mut self) -> DeviceResult<()>;

    /// Release the device; `Closed` is posted once it is done
    fn close(&mut self);
}
