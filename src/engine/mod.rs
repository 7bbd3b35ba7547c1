// SPDX-License-Identifier: GPL-3.0-only

//! Camera engine
//!
//! [`OneCamera`] is the caller-facing handle. Every operation is posted to a
//! single serial worker task and returns immediately; the worker owns the
//! [`AutoFocusCoordinator`] and with it all mutable camera state. Device
//! events, focus-hold timer firings and delivery notifications arrive on the
//! same channel, so caller intents and hardware callbacks never race.
//!
//! ```text
//!  OneCamera ──Command──┐
//!  CaptureDevice ─Event─┼──▶ serial worker ──▶ AutoFocusCoordinator
//!  RevertTimer ─────────┤                          │ ImageReady
//!  DeliveryStage ───────┘◀── CaptureDelivered ─────┘
//! ```

pub mod capture_queue;
pub mod coordinator;
pub mod delivery;
pub mod focus;
pub mod params;
pub mod revert_timer;
pub mod session;

pub use capture_queue::{CaptureQueue, CaptureRequestContext};
pub use coordinator::{AutoFocusCoordinator, Flow, PendingTrigger};
pub use focus::{AutoFocusMode, AutoFocusState};
pub use params::{CaptureSession, CapturedImage, FlashMode, HEADING_UNKNOWN, PhotoCaptureParameters};
pub use session::SessionLifecycleState;

use crate::backends::camera::{
    CameraCharacteristics, CaptureDevice, DeviceEvent, EventSink, ImageFormat, LensFacing,
    PreviewSurface, Size,
};
use crate::config::CaptureConfig;
use crate::errors::{CaptureError, CaptureResult};
use crate::geometry;
use crate::pipelines::photo::{ImageCrateJpegEncoder, ImageExtractor, JpegEncoder};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Called with the reported mode and state whenever either changes
pub type FocusStateListener = Box<dyn Fn(AutoFocusMode, AutoFocusState) + Send>;

/// Called with `false` when a capture starts and `true` once the camera can take another
pub type ReadyStateListener = Box<dyn Fn(bool) + Send>;

/// Resolves a `start_preview` call
pub type SetupCallback = Box<dyn FnOnce(CaptureResult<()>) + Send>;

/// Runs once the device has closed
pub type CloseCallback = Box<dyn FnOnce() + Send>;

/// Caller intent posted to the serial worker
pub enum Command {
    StartPreview {
        surface: PreviewSurface,
        callback: SetupCallback,
    },
    TakePicture {
        params: PhotoCaptureParameters,
        session: Box<dyn CaptureSession>,
    },
    SetZoom(f32),
    TriggerAutoFocus,
    TriggerFocusAndMeterAt {
        x: f32,
        y: f32,
    },
    SetFocusStateListener(Option<FocusStateListener>),
    SetReadyStateListener(Option<ReadyStateListener>),
    Close(Option<CloseCallback>),
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::StartPreview { surface, .. } => {
                f.debug_struct("StartPreview").field("surface", surface).finish()
            }
            Command::TakePicture { params, .. } => {
                f.debug_struct("TakePicture").field("params", params).finish()
            }
            Command::SetZoom(factor) => f.debug_tuple("SetZoom").field(factor).finish(),
            Command::TriggerAutoFocus => f.write_str("TriggerAutoFocus"),
            Command::TriggerFocusAndMeterAt { x, y } => f
                .debug_struct("TriggerFocusAndMeterAt")
                .field("x", x)
                .field("y", y)
                .finish(),
            Command::SetFocusStateListener(listener) => f
                .debug_tuple("SetFocusStateListener")
                .field(&listener.is_some())
                .finish(),
            Command::SetReadyStateListener(listener) => f
                .debug_tuple("SetReadyStateListener")
                .field(&listener.is_some())
                .finish(),
            Command::Close(_) => f.write_str("Close"),
        }
    }
}

/// Everything the serial worker consumes
#[derive(Debug)]
pub enum Message {
    Command(Command),
    Device(DeviceEvent),
    /// The focus hold scheduled with this generation elapsed
    RevertFocusHold(u64),
    /// The delivery stage finished one capture
    CaptureDelivered,
}

/// Handle to one open camera
///
/// Dropping the handle closes the camera.
pub struct OneCamera {
    messages: mpsc::UnboundedSender<Message>,
    characteristics: CameraCharacteristics,
    capture_format: ImageFormat,
    worker: Option<JoinHandle<()>>,
}

impl OneCamera {
    /// Open `device` with the default software encoder
    ///
    /// Must be called from within a tokio runtime.
    pub fn open<D>(device: D, config: CaptureConfig) -> CaptureResult<Self>
    where
        D: CaptureDevice + 'static,
    {
        Self::open_with_encoder(device, config, Arc::new(ImageCrateJpegEncoder::new()))
    }

    /// Open `device`, compressing YUV captures with `encoder`
    pub fn open_with_encoder<D>(
        mut device: D,
        config: CaptureConfig,
        encoder: Arc<dyn JpegEncoder>,
    ) -> CaptureResult<Self>
    where
        D: CaptureDevice + 'static,
    {
        if tokio::runtime::Handle::try_current().is_err() {
            return Err(CaptureError::Configuration(
                "camera engine needs a tokio runtime".to_string(),
            ));
        }

        let config = config.sanitized();
        let (messages, receiver) = mpsc::unbounded_channel();

        let events = messages.downgrade();
        device.open(EventSink::new(move |event| match events.upgrade() {
            Some(messages) => messages.send(Message::Device(event)).is_ok(),
            None => false,
        }))?;

        let characteristics = device.characteristics().clone();
        let extractor = ImageExtractor::new(encoder, config.jpeg_quality);
        let coordinator = AutoFocusCoordinator::new(
            Box::new(device),
            &config,
            extractor,
            messages.downgrade(),
        );
        let worker = tokio::spawn(run_worker(coordinator, receiver));

        info!(
            facing = ?characteristics.lens_facing,
            active_array = %characteristics.active_array,
            max_zoom = characteristics.max_digital_zoom,
            format = %config.capture_format,
            "Camera opened"
        );

        Ok(Self {
            messages,
            characteristics,
            capture_format: config.capture_format,
            worker: Some(worker),
        })
    }

    /// Request a still capture
    ///
    /// Parameters are validated before anything is posted. The outcome is
    /// reported to `session`; if another capture is already waiting on focus
    /// the request is dropped.
    pub fn take_picture<S>(&self, params: PhotoCaptureParameters, session: S) -> CaptureResult<()>
    where
        S: CaptureSession,
    {
        params.check_sanity()?;
        self.post(Command::TakePicture {
            params,
            session: Box::new(session),
        })
    }

    /// Configure a session rendering to `surface` and start the preview
    pub fn start_preview<F>(&self, surface: PreviewSurface, callback: F) -> CaptureResult<()>
    where
        F: FnOnce(CaptureResult<()>) + Send + 'static,
    {
        self.post(Command::StartPreview {
            surface,
            callback: Box::new(callback),
        })
    }

    /// Set digital zoom; clamped to `[1, max_zoom()]`
    pub fn set_zoom(&self, factor: f32) -> CaptureResult<()> {
        self.post(Command::SetZoom(factor))
    }

    /// Run a focus scan on the whole frame
    pub fn trigger_auto_focus(&self) -> CaptureResult<()> {
        self.post(Command::TriggerAutoFocus)
    }

    /// Focus and meter on a point of the portrait preview, both axes in `[0, 1]`
    pub fn trigger_focus_and_meter_at_point(&self, nx: f32, ny: f32) -> CaptureResult<()> {
        self.post(Command::TriggerFocusAndMeterAt { x: nx, y: ny })
    }

    pub fn set_focus_state_listener(
        &self,
        listener: Option<FocusStateListener>,
    ) -> CaptureResult<()> {
        self.post(Command::SetFocusStateListener(listener))
    }

    pub fn set_ready_state_listener(
        &self,
        listener: Option<ReadyStateListener>,
    ) -> CaptureResult<()> {
        self.post(Command::SetReadyStateListener(listener))
    }

    /// Close the camera; `callback` runs once the device has closed
    ///
    /// Only the first call has any effect.
    pub fn close<F>(&self, callback: F) -> CaptureResult<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.post(Command::Close(Some(Box::new(callback))))
    }

    /// Wait for the serial worker to exit
    pub async fn stopped(&mut self) {
        if let Some(worker) = self.worker.take()
            && let Err(e) = worker.await
        {
            error!(error = %e, "Camera engine worker panicked");
        }
    }

    pub fn is_running(&self) -> bool {
        self.worker
            .as_ref()
            .is_some_and(|worker| !worker.is_finished())
    }

    pub fn characteristics(&self) -> &CameraCharacteristics {
        &self.characteristics
    }

    /// Still-capture sizes for the configured capture format, largest first
    pub fn supported_sizes(&self) -> Vec<Size> {
        self.characteristics.output_sizes(self.capture_format)
    }

    pub fn full_size_aspect_ratio(&self) -> f64 {
        geometry::full_size_aspect_ratio(self.characteristics.active_array)
    }

    pub fn max_zoom(&self) -> f32 {
        self.characteristics.max_digital_zoom
    }

    pub fn is_front_facing(&self) -> bool {
        self.characteristics.lens_facing == LensFacing::Front
    }

    pub fn is_back_facing(&self) -> bool {
        self.characteristics.lens_facing == LensFacing::Back
    }

    fn post(&self, command: Command) -> CaptureResult<()> {
        self.messages
            .send(Message::Command(command))
            .map_err(|rejected| {
                warn!(command = ?rejected.0, "Camera engine stopped, dropping command");
                CaptureError::EngineStopped
            })
    }
}

impl Drop for OneCamera {
    fn drop(&mut self) {
        let _ = self.messages.send(Message::Command(Command::Close(None)));
    }
}

async fn run_worker(
    mut coordinator: AutoFocusCoordinator,
    mut messages: mpsc::UnboundedReceiver<Message>,
) {
    debug!("Camera engine worker started");

    while let Some(message) = messages.recv().await {
        match coordinator.handle(message) {
            Ok(Flow::Continue) => {}
            Ok(Flow::Stop) => {
                info!("Camera engine stopped");
                return;
            }
            Err(e) => {
                error!(error = %e, "Unrecoverable camera engine fault, shutting down");
                coordinator.shutdown();
                return;
            }
        }
    }

    debug!("All camera handles dropped, shutting down");
    coordinator.shutdown();
}
