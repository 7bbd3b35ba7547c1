// SPDX-License-Identifier: GPL-3.0-only

//! Capture session lifecycle and request construction
//!
//! ```text
//! Unconfigured ──setup──▶ Configuring ──▶ Ready
//!                              │
//!                              └────────▶ Failed
//!
//! any state ──close──▶ Closing ──device closed──▶ Closed
//! ```
//!
//! Every setup attempt gets a fresh [`SessionId`]; events carrying an older
//! id belong to a superseded attempt and are ignored.

use super::focus::AutoFocusMode;
use super::params::PhotoCaptureParameters;
use super::{CloseCallback, SetupCallback};
use crate::backends::camera::{
    AfTrigger, CameraCharacteristics, CaptureDevice, CaptureRequestBuilder, ControlMode,
    ImageFormat, LensFacing, MeteringRectangle, OutputTarget, PreviewSurface, Rect, RequestTag,
    RequestTemplate, SessionId,
};
use crate::errors::{CaptureError, DeviceError, DeviceResult};
use tracing::{debug, info, warn};

/// Where the hardware session currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionLifecycleState {
    #[default]
    Unconfigured,
    Configuring,
    Ready,
    Closing,
    Closed,
    Failed,
}

/// Baseline keys shared by every request the engine builds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RequestControls {
    pub af_mode: AutoFocusMode,
    pub region: MeteringRectangle,
    pub crop: Rect,
    /// Tag carried by the repeating preview
    pub tag: Option<RequestTag>,
}

/// Owns the device and the session built on top of it
pub struct CameraSessionManager {
    device: Box<dyn CaptureDevice>,
    characteristics: CameraCharacteristics,
    state: SessionLifecycleState,
    current: Option<SessionId>,
    next_id: u64,
    preview: Option<PreviewSurface>,
    pending_setup: Option<SetupCallback>,
    close_callback: Option<CloseCallback>,
    capture_format: ImageFormat,
    jpeg_quality: u8,
}

impl CameraSessionManager {
    pub fn new(
        device: Box<dyn CaptureDevice>,
        capture_format: ImageFormat,
        jpeg_quality: u8,
    ) -> Self {
        let characteristics = device.characteristics().clone();
        Self {
            device,
            characteristics,
            state: SessionLifecycleState::Unconfigured,
            current: None,
            next_id: 0,
            preview: None,
            pending_setup: None,
            close_callback: None,
            capture_format,
            jpeg_quality,
        }
    }

    pub fn state(&self) -> SessionLifecycleState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == SessionLifecycleState::Ready
    }

    pub fn is_closing_or_closed(&self) -> bool {
        matches!(
            self.state,
            SessionLifecycleState::Closing | SessionLifecycleState::Closed
        )
    }

    pub fn characteristics(&self) -> &CameraCharacteristics {
        &self.characteristics
    }

    /// Whether `id` is the attempt currently being configured
    pub fn is_configuring(&self, id: SessionId) -> bool {
        self.state == SessionLifecycleState::Configuring && self.current == Some(id)
    }

    /// Discard any existing session and request a new one rendering to `surface`
    pub fn setup(&mut self, surface: PreviewSurface, callback: SetupCallback) {
        if self.is_closing_or_closed() {
            callback(Err(CaptureError::Configuration(
                "camera is closed".to_string(),
            )));
            return;
        }

        if let Some(superseded) = self.pending_setup.take() {
            superseded(Err(CaptureError::Configuration(
                "superseded by a newer setup".to_string(),
            )));
        }

        if self.current.is_some()
            && let Err(e) = self.device.abort_all()
        {
            debug!(error = %e, "Abort before session setup failed");
        }

        self.next_id += 1;
        let id = SessionId(self.next_id);
        self.current = Some(id);
        self.preview = Some(surface);
        self.state = SessionLifecycleState::Configuring;

        let outputs = [OutputTarget::Preview(surface), OutputTarget::StillCapture];
        match self.device.create_session(id, &outputs, self.capture_format) {
            Ok(()) => {
                info!(session = %id, preview = %surface.size, "Configuring capture session");
                self.pending_setup = Some(callback);
            }
            Err(e) => {
                warn!(session = %id, error = %e, "Could not create capture session");
                self.state = SessionLifecycleState::Failed;
                callback(Err(CaptureError::Configuration(e.to_string())));
            }
        }
    }

    /// The device finished configuring `id`; start the preview
    ///
    /// Setup only reports success once the repeating preview was accepted.
    pub fn on_configured(&mut self, id: SessionId, controls: &RequestControls) {
        if !self.is_configuring(id) {
            debug!(session = %id, "Ignoring configuration of superseded session");
            return;
        }

        self.state = SessionLifecycleState::Ready;
        let result = match self.repeating_preview(controls) {
            Ok(()) => {
                info!(session = %id, "Capture session ready");
                Ok(())
            }
            Err(e) => {
                warn!(session = %id, error = %e, "Could not start preview");
                self.state = SessionLifecycleState::Failed;
                Err(CaptureError::Configuration(format!(
                    "preview could not be started: {}",
                    e
                )))
            }
        };
        if let Some(callback) = self.pending_setup.take() {
            callback(result);
        }
    }

    pub fn on_configure_failed(&mut self, id: SessionId) {
        if !self.is_configuring(id) {
            debug!(session = %id, "Ignoring failure of superseded session");
            return;
        }

        warn!(session = %id, "Capture session configuration failed");
        self.state = SessionLifecycleState::Failed;
        if let Some(callback) = self.pending_setup.take() {
            callback(Err(CaptureError::Configuration(
                "device could not configure the session".to_string(),
            )));
        }
    }

    /// Rebuild and resubmit the repeating preview request
    pub fn repeating_preview(&mut self, controls: &RequestControls) -> DeviceResult<()> {
        let surface = self.ready_surface()?;
        let mut builder = self.device.create_request(RequestTemplate::Preview)?;
        builder
            .add_target(OutputTarget::Preview(surface))
            .control_mode(ControlMode::Auto)
            .tag(controls.tag);
        apply_baseline(&mut builder, controls);

        self.device.submit_repeating(builder.build())?;
        debug!(
            af_mode = ?controls.af_mode,
            crop = %controls.crop,
            tag = ?controls.tag,
            "Sent repeating preview request"
        );
        Ok(())
    }

    /// Submit the single-frame request that starts a focus scan
    pub fn submit_af_trigger(
        &mut self,
        controls: &RequestControls,
        tag: Option<RequestTag>,
    ) -> DeviceResult<()> {
        let surface = self.ready_surface()?;
        let mut builder = self.device.create_request(RequestTemplate::Preview)?;
        builder
            .add_target(OutputTarget::Preview(surface))
            .control_mode(ControlMode::Auto);
        apply_baseline(
            &mut builder,
            &RequestControls {
                af_mode: AutoFocusMode::SingleTrigger,
                ..*controls
            },
        );
        builder.af_trigger(AfTrigger::Start).tag(tag);

        self.device.submit_once(builder.build())?;
        debug!(tag = ?tag, "Sent autofocus trigger");
        Ok(())
    }

    /// Submit a still capture for `params`
    pub fn submit_still_capture(
        &mut self,
        controls: &RequestControls,
        params: &PhotoCaptureParameters,
    ) -> DeviceResult<()> {
        let surface = self.ready_surface()?;
        let mut builder = self.device.create_request(RequestTemplate::StillCapture)?;
        builder
            .add_target(OutputTarget::Preview(surface))
            .add_target(OutputTarget::StillCapture);
        apply_baseline(&mut builder, controls);
        builder.tag(Some(RequestTag::Capture));
        params.flash_mode.apply(&mut builder);

        if self.capture_format == ImageFormat::Jpeg {
            builder
                .jpeg_quality(self.jpeg_quality)
                .jpeg_orientation(self.jpeg_orientation(params.orientation));
        }

        self.device.submit_once(builder.build())
    }

    /// Clockwise rotation to store in the JPEG for a device orientation
    pub fn jpeg_orientation(&self, device_orientation: u32) -> u32 {
        let sensor = self.characteristics.sensor_orientation % 360;
        let device = device_orientation % 360;
        match self.characteristics.lens_facing {
            LensFacing::Front => (sensor + 360 - device) % 360,
            LensFacing::Back | LensFacing::External => (sensor + device) % 360,
        }
    }

    /// Begin closing the device
    ///
    /// Returns `false` (and touches nothing) if close was already requested.
    pub fn close(&mut self, callback: Option<CloseCallback>) -> bool {
        if self.is_closing_or_closed() {
            debug!("Close already requested");
            return false;
        }

        if let Some(setup) = self.pending_setup.take() {
            setup(Err(CaptureError::Configuration(
                "camera closed during setup".to_string(),
            )));
        }

        if self.current.is_some()
            && let Err(e) = self.device.abort_all()
        {
            warn!(error = %e, "Could not abort captures while closing");
        }

        self.state = SessionLifecycleState::Closing;
        self.close_callback = callback;
        self.device.close();
        info!("Closing camera");
        true
    }

    /// The device confirmed it is closed
    pub fn on_closed(&mut self) {
        self.state = SessionLifecycleState::Closed;
        self.current = None;
        if let Some(callback) = self.close_callback.take() {
            callback();
        }
        info!("Camera closed");
    }

    /// Tear down after an unrecoverable fault, without a close callback
    pub fn abort(&mut self) {
        if self.is_closing_or_closed() {
            return;
        }
        if let Err(e) = self.device.abort_all() {
            debug!(error = %e, "Abort during shutdown failed");
        }
        self.state = SessionLifecycleState::Closing;
        self.device.close();
    }

    fn ready_surface(&self) -> DeviceResult<PreviewSurface> {
        match (self.state, self.preview) {
            (SessionLifecycleState::Ready, Some(surface)) => Ok(surface),
            _ => Err(DeviceError::NoSession),
        }
    }
}

fn apply_baseline(builder: &mut CaptureRequestBuilder, controls: &RequestControls) {
    builder
        .metering_region(controls.region)
        .crop_region(controls.crop)
        .af_mode(controls.af_mode.to_native())
        .af_trigger(AfTrigger::Idle);
}
